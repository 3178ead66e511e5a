use crate::dispatch::{BoundedExecutor, with_context};
use crate::domain::payment::{Amount, PaymentAttempt};
use crate::domain::ports::{PaymentAdapterRef, PaymentStoreRef};
use crate::error::{PaymentError, Result};
use crate::limiter::SlidingWindowRateLimiter;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, trace, warn};
use uuid::Uuid;

/// Inbound admission: requests over the rate are refused instead of queued.
struct Admission {
    limiter: SlidingWindowRateLimiter,
    retry_after: Duration,
}

/// Accepts payments for orders and submits them off the caller's path.
///
/// `process_payment` only creates the payment attempt and hands the submission
/// to the executor; the provider call happens on a worker (or on the caller when
/// the executor's backlog is full).
pub struct OrderPayer {
    store: PaymentStoreRef,
    adapter: PaymentAdapterRef,
    executor: BoundedExecutor,
    admission: Option<Admission>,
}

impl OrderPayer {
    /// Creates a new `OrderPayer`.
    ///
    /// # Arguments
    ///
    /// * `store` - Where payment attempts and their events are recorded.
    /// * `adapter` - The provider account payments are submitted to.
    /// * `executor` - Runs submissions off the caller's path.
    pub fn new(store: PaymentStoreRef, adapter: PaymentAdapterRef, executor: BoundedExecutor) -> Self {
        Self {
            store,
            adapter,
            executor,
            admission: None,
        }
    }

    /// Refuses submissions beyond `limiter`'s rate with a `ResourceExhausted`
    /// error carrying `now + retry_after`.
    pub fn with_admission(mut self, limiter: SlidingWindowRateLimiter, retry_after: Duration) -> Self {
        self.admission = Some(Admission {
            limiter,
            retry_after,
        });
        self
    }

    /// Creates a payment attempt for `order_id` and schedules its submission.
    ///
    /// Returns the attempt's creation time. Failures of the submission itself
    /// (no free slot, provider errors) are logged and recorded, never returned here.
    pub async fn process_payment(
        &self,
        order_id: Uuid,
        amount: Amount,
        payment_id: Uuid,
        deadline: DateTime<Utc>,
    ) -> Result<DateTime<Utc>> {
        if let Some(admission) = &self.admission
            && !admission.limiter.tick()
        {
            error!(
                %order_id,
                %payment_id,
                admitted = admission.limiter.admitted(),
                "Resource exhausted, rejecting payment"
            );
            return Err(PaymentError::resource_exhausted(admission.retry_after));
        }

        let created_at = Utc::now();
        let attempt = PaymentAttempt {
            payment_id,
            order_id,
            amount,
            created_at,
            deadline,
        };
        let store = Arc::clone(&self.store);
        let adapter = Arc::clone(&self.adapter);

        self.executor
            .execute(with_context(
                move |ctx| ctx.with_payment_id(payment_id),
                async move {
                    if let Err(e) = store.create(attempt).await {
                        error!("Failed to create payment: {}", e);
                        return;
                    }
                    trace!(%order_id, "Payment created");

                    if let Err(e) = adapter
                        .perform_payment(payment_id, amount, created_at, deadline)
                        .await
                    {
                        warn!(account = adapter.name(), "Payment was not submitted: {}", e);
                    }
                },
            ))
            .await?;
        trace!(executor = self.executor.name(), %payment_id, "Payment scheduled");

        Ok(created_at)
    }

    /// Stops accepting payments and waits for scheduled submissions to finish.
    pub async fn shutdown(&self) {
        self.executor.shutdown().await;
    }
}
