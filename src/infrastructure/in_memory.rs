use crate::domain::payment::{
    PaymentAttempt, PaymentEvent, PaymentRecord, ProcessingOutcome, Submission,
};
use crate::domain::ports::PaymentStore;
use crate::error::{PaymentError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// A thread-safe in-memory payment store.
///
/// Keeps one [`PaymentRecord`] per payment with its events in arrival order.
/// Records are never removed.
#[derive(Default, Clone)]
pub struct InMemoryPaymentStore {
    payments: Arc<RwLock<HashMap<Uuid, PaymentRecord>>>,
}

impl InMemoryPaymentStore {
    pub fn new() -> Self {
        Self::default()
    }

    async fn append(&self, payment_id: Uuid, event: PaymentEvent) -> Result<()> {
        let mut payments = self.payments.write().await;
        let record = payments
            .get_mut(&payment_id)
            .ok_or_else(|| PaymentError::Store(format!("Payment {payment_id} not found")))?;
        record.events.push(event);
        Ok(())
    }
}

#[async_trait]
impl PaymentStore for InMemoryPaymentStore {
    async fn create(&self, attempt: PaymentAttempt) -> Result<()> {
        let mut payments = self.payments.write().await;
        if payments.contains_key(&attempt.payment_id) {
            return Err(PaymentError::Store(format!(
                "Payment {} already exists",
                attempt.payment_id
            )));
        }
        payments.insert(attempt.payment_id, PaymentRecord::new(&attempt));
        Ok(())
    }

    async fn log_submission(&self, payment_id: Uuid, submission: Submission) -> Result<()> {
        self.append(payment_id, PaymentEvent::Submitted(submission))
            .await
    }

    async fn log_processing(&self, payment_id: Uuid, outcome: ProcessingOutcome) -> Result<()> {
        self.append(payment_id, PaymentEvent::Processed(outcome))
            .await
    }

    async fn get(&self, payment_id: Uuid) -> Result<Option<PaymentRecord>> {
        let payments = self.payments.read().await;
        Ok(payments.get(&payment_id).cloned())
    }

    async fn all_payments(&self) -> Result<Vec<PaymentRecord>> {
        let payments = self.payments.read().await;
        let mut records: Vec<_> = payments.values().cloned().collect();
        records.sort_by_key(|record| record.created_at);
        Ok(records)
    }
}
