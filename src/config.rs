use crate::domain::payment::AccountProperties;
use crate::error::{PaymentError, Result};
use crate::limiter::{
    LeakyBucketRateLimiter, NonBlockingOngoingWindow, OngoingWindow, ParallelRequestsLimiter,
    RateLimiter, SlidingWindowRateLimiter,
};
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Yaml},
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

pub const ENV_PREFIX: &str = "PAYGATE_";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub host_port: String,
    pub token: String,
    /// Total number of attempts per payment, including the first one.
    pub retry_amount: u32,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            host_port: "localhost:1234".to_string(),
            token: String::new(),
            retry_amount: 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowKind {
    #[default]
    Blocking,
    NonBlocking,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParallelLimiterConfig {
    pub kind: WindowKind,
    /// Falls back to the account's `parallel_requests`.
    pub max_size: Option<u32>,
    pub acquire_timeout_ms: u64,
}

impl Default for ParallelLimiterConfig {
    fn default() -> Self {
        Self {
            kind: WindowKind::Blocking,
            max_size: None,
            acquire_timeout_ms: 10_000,
        }
    }
}

impl ParallelLimiterConfig {
    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_millis(self.acquire_timeout_ms)
    }

    pub fn build(&self, account: &AccountProperties) -> ParallelRequestsLimiter {
        let max_size = self.max_size.unwrap_or(account.parallel_requests) as usize;
        match self.kind {
            WindowKind::Blocking => ParallelRequestsLimiter::Blocking(OngoingWindow::new(max_size)),
            WindowKind::NonBlocking => {
                ParallelRequestsLimiter::NonBlocking(NonBlockingOngoingWindow::new(max_size))
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RateLimiterConfig {
    SlidingWindow {
        rate: u32,
        window_ms: u64,
    },
    LeakyBucket {
        rate: u32,
        window_ms: u64,
        bucket_size: usize,
    },
}

impl RateLimiterConfig {
    /// Builds the limiter. A leaky bucket starts its leak task, so this must run
    /// inside a tokio runtime.
    pub fn build(&self) -> RateLimiter {
        match *self {
            Self::SlidingWindow { rate, window_ms } => RateLimiter::SlidingWindow(
                SlidingWindowRateLimiter::new(rate, Duration::from_millis(window_ms)),
            ),
            Self::LeakyBucket {
                rate,
                window_ms,
                bucket_size,
            } => RateLimiter::LeakyBucket(LeakyBucketRateLimiter::start(
                rate,
                Duration::from_millis(window_ms),
                bucket_size,
            )),
        }
    }

    fn validate(&self) -> Result<()> {
        let (rate, window_ms) = match *self {
            Self::SlidingWindow { rate, window_ms } => (rate, window_ms),
            Self::LeakyBucket {
                rate,
                window_ms,
                bucket_size,
            } => {
                if bucket_size == 0 {
                    return Err(invalid("outbound_rate_limiter.bucket_size must be positive"));
                }
                (rate, window_ms)
            }
        };
        if rate == 0 || window_ms == 0 {
            return Err(invalid("outbound_rate_limiter needs a positive rate and window"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InboundLimiterConfig {
    pub rate: u32,
    pub window_ms: u64,
    pub retry_after_ms: u64,
}

impl Default for InboundLimiterConfig {
    fn default() -> Self {
        Self {
            rate: 11,
            window_ms: 1000,
            retry_after_ms: 1000,
        }
    }
}

impl InboundLimiterConfig {
    pub fn build(&self) -> SlidingWindowRateLimiter {
        SlidingWindowRateLimiter::new(self.rate, Duration::from_millis(self.window_ms))
    }

    pub fn retry_after(&self) -> Duration {
        Duration::from_millis(self.retry_after_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    pub name: String,
    pub workers: usize,
    pub backlog: usize,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            name: "payment-submission-executor".to_string(),
            workers: 50,
            backlog: 8000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub provider: ProviderConfig,
    pub account: AccountProperties,
    pub parallel_limiter: ParallelLimiterConfig,
    pub outbound_rate_limiter: Option<RateLimiterConfig>,
    pub inbound_rate_limiter: Option<InboundLimiterConfig>,
    pub dispatch: DispatchConfig,
}

impl AppConfig {
    // Defaults, then the optional YAML file, then the environment.
    pub fn figment(path: Option<&Path>) -> Figment {
        let mut figment = Figment::from(Serialized::defaults(AppConfig::default()));
        if let Some(path) = path {
            figment = figment.merge(Yaml::file(path));
        }
        figment.merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config: AppConfig = Self::figment(path).extract()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.provider.retry_amount == 0 {
            return Err(invalid("provider.retry_amount must be at least 1"));
        }
        if self.account.average_processing_time_ms == 0 {
            return Err(invalid("account.average_processing_time_ms must be positive"));
        }
        let max_size = self
            .parallel_limiter
            .max_size
            .unwrap_or(self.account.parallel_requests);
        if max_size == 0 {
            return Err(invalid("parallel limiter size must be positive"));
        }
        if let Some(outbound) = &self.outbound_rate_limiter {
            outbound.validate()?;
        }
        if let Some(inbound) = &self.inbound_rate_limiter
            && (inbound.rate == 0 || inbound.window_ms == 0)
        {
            return Err(invalid("inbound_rate_limiter needs a positive rate and window"));
        }
        if self.dispatch.workers == 0 || self.dispatch.backlog == 0 {
            return Err(invalid("dispatch.workers and dispatch.backlog must be positive"));
        }
        Ok(())
    }
}

fn invalid(message: &str) -> PaymentError {
    PaymentError::InvalidConfig(message.to_string())
}
