use crate::error::PaymentError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

/// A positive payment amount in the smallest currency unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u64", into = "u64")]
pub struct Amount(u64);

impl Amount {
    pub fn new(value: u64) -> Result<Self, PaymentError> {
        if value > 0 {
            Ok(Self(value))
        } else {
            Err(PaymentError::Validation(
                "Amount must be positive".to_string(),
            ))
        }
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

impl TryFrom<u64> for Amount {
    type Error = PaymentError;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Amount> for u64 {
    fn from(amount: Amount) -> Self {
        amount.0
    }
}

impl std::fmt::Display for Amount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// A payment requested by an order, as handed to the dispatch layer.
///
/// Each call to the provider mints its own transaction id, so an attempt never
/// carries one until the adapter submits it.
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentAttempt {
    pub payment_id: Uuid,
    pub order_id: Uuid,
    pub amount: Amount,
    pub created_at: DateTime<Utc>,
    pub deadline: DateTime<Utc>,
}

/// The provider's answer to a single payment call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExternalSysResponse {
    pub transaction_id: String,
    pub payment_id: String,
    pub result: bool,
    #[serde(default)]
    pub message: Option<String>,
}

impl ExternalSysResponse {
    pub fn failed(transaction_id: Uuid, payment_id: Uuid, message: impl Into<String>) -> Self {
        Self {
            transaction_id: transaction_id.to_string(),
            payment_id: payment_id.to_string(),
            result: false,
            message: Some(message.into()),
        }
    }
}

/// Static configuration of one provider account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AccountProperties {
    pub service_name: String,
    pub account_name: String,
    pub average_processing_time_ms: u64,
    pub rate_limit_per_sec: u32,
    pub parallel_requests: u32,
    pub price: u64,
    pub enabled: bool,
}

impl AccountProperties {
    pub fn average_processing_time(&self) -> Duration {
        Duration::from_millis(self.average_processing_time_ms)
    }
}

impl Default for AccountProperties {
    fn default() -> Self {
        Self {
            service_name: "onlineStore".to_string(),
            account_name: "default".to_string(),
            average_processing_time_ms: 1000,
            rate_limit_per_sec: 11,
            parallel_requests: 30,
            price: 100,
            enabled: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Submission {
    pub transaction_id: Uuid,
    pub success: bool,
    pub at: DateTime<Utc>,
    /// Time between the payment's creation and its submission.
    pub spent: Duration,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProcessingOutcome {
    pub transaction_id: Uuid,
    pub success: bool,
    pub at: DateTime<Utc>,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PaymentEvent {
    Submitted(Submission),
    Processed(ProcessingOutcome),
}

/// Everything recorded about one payment, events in the order they happened.
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentRecord {
    pub payment_id: Uuid,
    pub order_id: Uuid,
    pub amount: Amount,
    pub created_at: DateTime<Utc>,
    pub events: Vec<PaymentEvent>,
}

impl PaymentRecord {
    pub fn new(attempt: &PaymentAttempt) -> Self {
        Self {
            payment_id: attempt.payment_id,
            order_id: attempt.order_id,
            amount: attempt.amount,
            created_at: attempt.created_at,
            events: Vec::new(),
        }
    }

    pub fn last_submission(&self) -> Option<&Submission> {
        self.events.iter().rev().find_map(|event| match event {
            PaymentEvent::Submitted(submission) => Some(submission),
            PaymentEvent::Processed(_) => None,
        })
    }

    pub fn last_outcome(&self) -> Option<&ProcessingOutcome> {
        self.events.iter().rev().find_map(|event| match event {
            PaymentEvent::Processed(outcome) => Some(outcome),
            PaymentEvent::Submitted(_) => None,
        })
    }

    pub fn is_submitted(&self) -> bool {
        self.last_submission().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_amount_must_be_positive() {
        assert!(Amount::new(0).is_err());
        assert_eq!(Amount::new(42).unwrap().value(), 42);
    }

    #[test]
    fn test_external_response_deserialization() {
        let body = r#"{"transactionId":"t","paymentId":"p","result":true,"message":null}"#;
        let response: ExternalSysResponse = serde_json::from_str(body).unwrap();
        assert!(response.result);
        assert_eq!(response.transaction_id, "t");
        assert_eq!(response.message, None);

        let body = r#"{"transactionId":"t","paymentId":"p","result":false}"#;
        let response: ExternalSysResponse = serde_json::from_str(body).unwrap();
        assert!(!response.result);
    }

    #[test]
    fn test_record_tracks_latest_events() {
        let attempt = PaymentAttempt {
            payment_id: Uuid::new_v4(),
            order_id: Uuid::new_v4(),
            amount: Amount::new(100).unwrap(),
            created_at: Utc::now(),
            deadline: Utc::now(),
        };
        let mut record = PaymentRecord::new(&attempt);
        assert!(!record.is_submitted());

        let first = Uuid::new_v4();
        let second = Uuid::new_v4();
        record.events.push(PaymentEvent::Processed(ProcessingOutcome {
            transaction_id: first,
            success: false,
            at: Utc::now(),
            reason: Some("declined".to_string()),
        }));
        record.events.push(PaymentEvent::Submitted(Submission {
            transaction_id: second,
            success: true,
            at: Utc::now(),
            spent: Duration::from_millis(3),
        }));

        assert!(record.is_submitted());
        assert_eq!(record.last_outcome().unwrap().transaction_id, first);
        assert_eq!(record.last_submission().unwrap().transaction_id, second);
    }
}
