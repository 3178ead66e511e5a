use crate::domain::payment::PaymentRecord;
use crate::error::Result;
use serde::Serialize;
use std::io::Write;
use uuid::Uuid;

/// The final state of one payment, flattened for output.
#[derive(Debug, Serialize)]
struct PaymentRow<'a> {
    payment_id: Uuid,
    order_id: Uuid,
    amount: u64,
    submitted: bool,
    transaction_id: Option<Uuid>,
    success: Option<bool>,
    reason: Option<&'a str>,
}

impl<'a> From<&'a PaymentRecord> for PaymentRow<'a> {
    fn from(record: &'a PaymentRecord) -> Self {
        let outcome = record.last_outcome();
        Self {
            payment_id: record.payment_id,
            order_id: record.order_id,
            amount: record.amount.value(),
            submitted: record.is_submitted(),
            transaction_id: outcome
                .map(|outcome| outcome.transaction_id)
                .or_else(|| record.last_submission().map(|s| s.transaction_id)),
            success: outcome.map(|outcome| outcome.success),
            reason: outcome.and_then(|outcome| outcome.reason.as_deref()),
        }
    }
}

/// Writes payment records as CSV, one row per payment.
pub struct PaymentWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> PaymentWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(sink),
        }
    }

    pub fn write_payments(&mut self, records: &[PaymentRecord]) -> Result<()> {
        for record in records {
            self.writer.serialize(PaymentRow::from(record))?;
        }
        self.writer.flush()?;
        Ok(())
    }
}
