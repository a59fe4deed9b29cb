use crate::domain::account::AccountKey;
use crate::error::{Result, TransferError};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::io::Read;

/// One requested transfer, as read from input.
///
/// The amount is kept raw; the coordinator rejects non-positive values.
#[derive(Debug, Deserialize, PartialEq, Clone)]
pub struct TransferRequest {
    pub from: AccountKey,
    pub to: AccountKey,
    pub amount: Decimal,
}

/// Reads transfer requests from a CSV source with a `from,to,amount` header.
///
/// This reader wraps `csv::Reader` and provides an iterator over `Result<TransferRequest>`.
/// It handles whitespace trimming and flexible record lengths automatically.
pub struct TransferReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> TransferReader<R> {
    /// Creates a new `TransferReader` from any `Read` source (e.g., File, Stdin).
    pub fn new(source: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(source);
        Self { reader }
    }

    /// Returns an iterator that lazily reads and deserializes requests.
    pub fn requests(self) -> impl Iterator<Item = Result<TransferRequest>> {
        self.reader
            .into_deserialize()
            .map(|result| result.map_err(TransferError::from))
    }
}
