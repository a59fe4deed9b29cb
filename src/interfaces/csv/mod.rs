//! CSV adapters for the command-line front end.

pub mod account_reader;
pub mod account_writer;
pub mod audit_writer;
pub mod transfer_reader;
