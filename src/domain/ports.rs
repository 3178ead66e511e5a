use super::payment::{
    Amount, PaymentAttempt, PaymentRecord, ProcessingOutcome, Submission,
};
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use uuid::Uuid;

/// Records payment state changes. The durable implementation lives outside this crate.
#[async_trait]
pub trait PaymentStore: Send + Sync {
    async fn create(&self, attempt: PaymentAttempt) -> Result<()>;
    async fn log_submission(&self, payment_id: Uuid, submission: Submission) -> Result<()>;
    async fn log_processing(&self, payment_id: Uuid, outcome: ProcessingOutcome) -> Result<()>;
    async fn get(&self, payment_id: Uuid) -> Result<Option<PaymentRecord>>;
    async fn all_payments(&self) -> Result<Vec<PaymentRecord>>;
}

pub type PaymentStoreRef = Arc<dyn PaymentStore>;

/// One provider account able to carry out payment attempts.
#[async_trait]
pub trait PaymentExternalSystemAdapter: Send + Sync {
    /// Runs a single payment attempt to completion.
    ///
    /// Only a failure to get a concurrency slot is returned as an error; every
    /// other outcome is recorded against the payment.
    async fn perform_payment(
        &self,
        payment_id: Uuid,
        amount: Amount,
        payment_started_at: DateTime<Utc>,
        deadline: DateTime<Utc>,
    ) -> Result<()>;

    fn price(&self) -> u64;
    fn is_enabled(&self) -> bool;
    fn name(&self) -> &str;
}

pub type PaymentAdapterRef = Arc<dyn PaymentExternalSystemAdapter>;
