use crate::dispatch::with_context;
use crate::domain::payment::{AccountProperties, Amount, ProcessingOutcome, Submission};
use crate::domain::ports::{PaymentExternalSystemAdapter, PaymentStoreRef};
use crate::error::{PaymentError, Result};
use crate::infrastructure::http_client::ExternalPaymentClient;
use crate::limiter::ParallelRequestsLimiter;
use crate::metrics::{AdapterMetrics, Outcome};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};
use uuid::Uuid;

/// Carries out payment attempts against one provider account.
///
/// Every attempt is recorded as submitted before anything else happens. The
/// provider is only called while holding a slot of the parallel-requests window.
pub struct PaymentExternalSystemAdapterImpl {
    properties: Arc<AccountProperties>,
    store: PaymentStoreRef,
    limiter: Arc<ParallelRequestsLimiter>,
    acquire_timeout: Duration,
    client: ExternalPaymentClient,
    metrics: AdapterMetrics,
}

impl PaymentExternalSystemAdapterImpl {
    pub fn new(
        properties: Arc<AccountProperties>,
        store: PaymentStoreRef,
        limiter: Arc<ParallelRequestsLimiter>,
        acquire_timeout: Duration,
        client: ExternalPaymentClient,
        metrics: AdapterMetrics,
    ) -> Self {
        Self {
            properties,
            store,
            limiter,
            acquire_timeout,
            client,
            metrics,
        }
    }

    async fn submit(
        &self,
        transaction_id: Uuid,
        payment_id: Uuid,
        amount: Amount,
        payment_started_at: DateTime<Utc>,
        deadline: DateTime<Utc>,
    ) -> Result<()> {
        let account = self.properties.account_name.as_str();
        info!(
            account,
            time_left_ms = (deadline - Utc::now()).num_milliseconds(),
            "Submitting payment request"
        );

        // Submission must be observable whatever the outcome.
        let now = Utc::now();
        let spent = (now - payment_started_at).to_std().unwrap_or_default();
        self.metrics.submitted(spent);
        if let Err(e) = self
            .store
            .log_submission(
                payment_id,
                Submission {
                    transaction_id,
                    success: true,
                    at: now,
                    spent,
                },
            )
            .await
        {
            error!(account, "Failed to record submission: {}", e);
        }

        let wait_started = Instant::now();
        self.metrics.wait_started();
        let Some(permit) = self.limiter.try_acquire(self.acquire_timeout).await else {
            self.metrics.wait_finished(false, wait_started.elapsed());
            warn!(
                account,
                pending = self.limiter.pending_count(),
                "Dropped payment, timeout for acquiring a slot reached"
            );
            return Err(PaymentError::TooManyParallelPayments(
                "Parallel requests limit was reached".to_string(),
            ));
        };
        self.metrics.wait_finished(true, wait_started.elapsed());

        let (success, reason) = match self
            .client
            .execute_payment(transaction_id, payment_id, amount, deadline)
            .await
        {
            Ok(response) => {
                self.metrics.outcome(if response.result {
                    Outcome::Success
                } else {
                    Outcome::Fail
                });
                (response.result, response.message)
            }
            Err(e @ PaymentError::ExternalResourceTimeout { .. }) => {
                error!(account, "Payment timeout: {}", e);
                self.metrics.outcome(Outcome::Timeout);
                (false, Some("Request timeout.".to_string()))
            }
            Err(e) if e.is_client_failure() => {
                warn!(account, "Payment failed: {}", e);
                self.metrics.outcome(Outcome::Error);
                (false, Some(e.to_string()))
            }
            Err(e) => {
                error!(account, "Payment failed: {}", e);
                self.metrics.outcome(Outcome::Error);
                (false, Some(e.to_string()))
            }
        };

        if let Err(e) = self
            .store
            .log_processing(
                payment_id,
                ProcessingOutcome {
                    transaction_id,
                    success,
                    at: Utc::now(),
                    reason,
                },
            )
            .await
        {
            error!(account, "Failed to record outcome: {}", e);
        }

        permit.release();
        info!(
            account,
            time_left_ms = (deadline - Utc::now()).num_milliseconds(),
            "Payment finished and released its slot"
        );
        Ok(())
    }
}

#[async_trait]
impl PaymentExternalSystemAdapter for PaymentExternalSystemAdapterImpl {
    async fn perform_payment(
        &self,
        payment_id: Uuid,
        amount: Amount,
        payment_started_at: DateTime<Utc>,
        deadline: DateTime<Utc>,
    ) -> Result<()> {
        let transaction_id = Uuid::new_v4();
        with_context(
            |ctx| {
                ctx.with_payment_id(payment_id)
                    .with_transaction_id(transaction_id)
            },
            self.submit(transaction_id, payment_id, amount, payment_started_at, deadline),
        )
        .await
    }

    fn price(&self) -> u64 {
        self.properties.price
    }

    fn is_enabled(&self) -> bool {
        self.properties.enabled
    }

    fn name(&self) -> &str {
        &self.properties.account_name
    }
}
