//! Atomic transfers between balance-holding records.
//!
//! Moves an amount between two accounts and appends an audit record, all
//! inside one optimistic session: either every write becomes visible or none
//! does. See [`application::engine::TransferEngine`] for the entry point.

pub mod application;
pub mod domain;
pub mod error;
pub mod infrastructure;
pub mod interfaces;
pub mod logging;
