//! Application layer: the transfer coordinator and the retry boundary around it.
//!
//! `TransferEngine` is the primary entry point. It runs each transfer through
//! `RetryPolicy`, which re-invokes `TransferCoordinator` from scratch on
//! transient failures.

pub mod cancel;
pub mod coordinator;
pub mod engine;
pub mod retry;
