//! Application layer: payment orchestration and its wiring.
//!
//! [`PaymentGateway`] assembles the admission pipeline from an [`AppConfig`]:
//! inbound admission and dispatch in [`OrderPayer`], then the parallel-requests
//! window, outbound rate limiter and provider client behind the adapter.

pub mod adapter;
pub mod order_payer;

use crate::config::AppConfig;
use crate::dispatch::BoundedExecutor;
use crate::domain::ports::{PaymentAdapterRef, PaymentStoreRef};
use crate::error::Result;
use crate::infrastructure::http_client::ExternalPaymentClient;
use crate::limiter::RateLimiter;
use crate::metrics::PaymentMetrics;
use adapter::PaymentExternalSystemAdapterImpl;
use order_payer::OrderPayer;
use prometheus::Registry;
use std::sync::Arc;
use tracing::info;

/// A fully wired payment pipeline for one provider account.
pub struct PaymentGateway {
    payer: OrderPayer,
    adapter: PaymentAdapterRef,
    outbound: Option<Arc<RateLimiter>>,
}

impl PaymentGateway {
    /// Builds the pipeline. Must run inside a tokio runtime: the executor's
    /// workers and a leaky bucket's leak task are spawned here.
    ///
    /// # Arguments
    ///
    /// * `config` - Validated application configuration.
    /// * `store` - Where payment attempts and their events are recorded.
    /// * `registry` - Registry the payment metrics are registered on.
    pub fn build(config: &AppConfig, store: PaymentStoreRef, registry: &Registry) -> Result<Self> {
        config.validate()?;

        let properties = Arc::new(config.account.clone());
        let outbound = config
            .outbound_rate_limiter
            .as_ref()
            .map(|outbound| Arc::new(outbound.build()));
        let client = ExternalPaymentClient::new(
            Arc::clone(&properties),
            config.provider.host_port.clone(),
            config.provider.token.clone(),
            config.provider.retry_amount,
            outbound.clone(),
        )?;
        let metrics = PaymentMetrics::register(registry)?.for_service(&properties.account_name);
        let limiter = Arc::new(config.parallel_limiter.build(&properties));

        let adapter: PaymentAdapterRef = Arc::new(PaymentExternalSystemAdapterImpl::new(
            Arc::clone(&properties),
            Arc::clone(&store),
            limiter,
            config.parallel_limiter.acquire_timeout(),
            client,
            metrics,
        ));

        let executor = BoundedExecutor::new(
            config.dispatch.name.clone(),
            config.dispatch.workers,
            config.dispatch.backlog,
        )?;
        let mut payer = OrderPayer::new(store, Arc::clone(&adapter), executor);
        if let Some(inbound) = &config.inbound_rate_limiter {
            payer = payer.with_admission(inbound.build(), inbound.retry_after());
        }

        info!(
            account = %properties.account_name,
            host_port = %config.provider.host_port,
            "Payment gateway ready"
        );
        Ok(Self {
            payer,
            adapter,
            outbound,
        })
    }

    pub fn payer(&self) -> &OrderPayer {
        &self.payer
    }

    pub fn adapter(&self) -> &PaymentAdapterRef {
        &self.adapter
    }

    /// Drains scheduled submissions, then stops the outbound limiter.
    pub async fn shutdown(&self) {
        self.payer.shutdown().await;
        if let Some(outbound) = &self.outbound {
            outbound.shutdown();
        }
    }
}
