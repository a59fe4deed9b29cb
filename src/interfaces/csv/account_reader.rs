use crate::domain::account::{Account, AccountKey, Balance};
use crate::error::{Result, TransferError};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::io::Read;

#[derive(Debug, Deserialize)]
struct AccountRow {
    account: AccountKey,
    balance: Decimal,
}

/// Reads initial account balances from a CSV source with an
/// `account,balance` header.
pub struct AccountReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> AccountReader<R> {
    pub fn new(source: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(source);
        Self { reader }
    }

    /// Yields accounts lazily. Negative opening balances are rejected.
    pub fn accounts(self) -> impl Iterator<Item = Result<Account>> {
        self.reader.into_deserialize().map(|row| {
            let row: AccountRow = row?;
            if row.balance < Decimal::ZERO {
                return Err(TransferError::InvalidArgument(format!(
                    "opening balance of {} is negative",
                    row.account
                )));
            }
            Ok(Account::new(row.account, Balance::new(row.balance)))
        })
    }
}
