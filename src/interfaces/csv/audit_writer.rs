use crate::domain::transfer::{TransferId, TransferRecord, TransferStatus};
use crate::error::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::io::Write;

#[derive(Serialize)]
struct AuditRow<'a> {
    id: TransferId,
    from: &'a str,
    to: &'a str,
    amount: String,
    timestamp: DateTime<Utc>,
    status: TransferStatus,
}

impl<'a> From<&'a TransferRecord> for AuditRow<'a> {
    fn from(record: &'a TransferRecord) -> Self {
        Self {
            id: record.id,
            from: record.from_account.as_str(),
            to: record.to_account.as_str(),
            amount: record.amount.to_string(),
            timestamp: record.timestamp,
            status: record.status,
        }
    }
}

/// Writes audit records as CSV, one row per record.
///
/// The header is always written, so an empty log still names its columns.
pub struct AuditWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> AuditWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            writer: csv::WriterBuilder::new()
                .has_headers(false)
                .from_writer(sink),
        }
    }

    pub fn write_records(&mut self, records: &[TransferRecord]) -> Result<()> {
        self.writer
            .write_record(["id", "from", "to", "amount", "timestamp", "status"])?;
        for record in records {
            self.writer.serialize(AuditRow::from(record))?;
        }
        self.writer.flush()?;
        Ok(())
    }
}
