use crate::domain::payment::Amount;
use crate::error::{PaymentError, Result};
use serde::Deserialize;
use std::io::Read;
use std::time::Duration;
use uuid::Uuid;

/// One order to pay, as read from the input file.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct OrderRow {
    /// A fresh id is minted when the column is empty.
    pub order_id: Option<Uuid>,
    pub amount: Amount,
    /// Time the payment has to complete, counted from submission.
    pub ttl_ms: u64,
}

impl OrderRow {
    pub fn ttl(&self) -> Duration {
        Duration::from_millis(self.ttl_ms)
    }
}

/// Reads orders from a CSV source.
///
/// Whitespace around fields is trimmed and short rows are accepted, so a missing
/// trailing column surfaces as a per-row error instead of aborting the stream.
pub struct OrderReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> OrderReader<R> {
    pub fn new(source: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(source);
        Self { reader }
    }

    /// Lazily deserializes the rows; a malformed row yields an error and the
    /// iterator moves on to the next one.
    pub fn orders(self) -> impl Iterator<Item = Result<OrderRow>> {
        self.reader
            .into_deserialize()
            .map(|result| result.map_err(PaymentError::from))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reader_valid_stream() {
        let order_id = Uuid::new_v4();
        let data = format!("order_id, amount, ttl_ms\n{order_id}, 100, 5000\n, 7, 80000");
        let reader = OrderReader::new(data.as_bytes());
        let results: Vec<Result<OrderRow>> = reader.orders().collect();

        assert_eq!(results.len(), 2);
        let first = results[0].as_ref().unwrap();
        assert_eq!(first.order_id, Some(order_id));
        assert_eq!(first.amount, Amount::new(100).unwrap());
        assert_eq!(first.ttl(), Duration::from_secs(5));
        let second = results[1].as_ref().unwrap();
        assert_eq!(second.order_id, None);
        assert_eq!(second.amount.value(), 7);
    }

    #[test]
    fn test_reader_malformed_lines() {
        let data = "order_id, amount, ttl_ms\nnot-a-uuid, 1, 1\n, 0, 1000\n, 5\n, 5, 1000";
        let reader = OrderReader::new(data.as_bytes());
        let results: Vec<Result<OrderRow>> = reader.orders().collect();

        assert_eq!(results.len(), 4);
        assert!(results[0].is_err());
        assert!(results[1].is_err());
        assert!(results[2].is_err());
        assert!(results[3].is_ok());
    }
}
