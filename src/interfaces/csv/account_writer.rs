use crate::domain::account::Account;
use crate::error::Result;
use std::io::Write;

/// Writes account balances as `account,balance` CSV.
pub struct AccountWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> AccountWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(sink),
        }
    }

    pub fn write_accounts(&mut self, accounts: impl IntoIterator<Item = Account>) -> Result<()> {
        self.writer.write_record(["account", "balance"])?;
        for account in accounts {
            let balance = account.balance.to_string();
            self.writer
                .write_record([account.key.as_str(), balance.as_str()])?;
        }
        self.writer.flush()?;
        Ok(())
    }
}
