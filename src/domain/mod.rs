//! Domain model: accounts, audit records, sessions and the storage ports.

pub mod account;
pub mod ports;
pub mod session;
pub mod transfer;
