use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

pub type Result<T, E = PaymentError> = std::result::Result<T, E>;

#[derive(Error, Debug)]
pub enum PaymentError {
    #[error("Resource exhausted, retry after {retry_after}")]
    ResourceExhausted { retry_after: DateTime<Utc> },
    #[error("Too many parallel payments: {0}")]
    TooManyParallelPayments(String),
    #[error("External resource timeout, retry after {retry_after}")]
    ExternalResourceTimeout { retry_after: DateTime<Utc> },
    #[error("Not enough time for payment {payment_id}, time left: {time_left_ms}ms")]
    DeadlineExceeded { payment_id: Uuid, time_left_ms: i64 },
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("Configuration error: {0}")]
    Config(#[from] Box<figment::Error>),
    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Store error: {0}")]
    Store(String),
    #[error("Executor is shut down")]
    ExecutorShutdown,
    #[error("Rate limiter is shut down")]
    LimiterShutdown,
}

impl PaymentError {
    pub fn resource_exhausted(delay: Duration) -> Self {
        Self::ResourceExhausted {
            retry_after: retry_after(delay),
        }
    }

    pub fn external_timeout(delay: Duration) -> Self {
        Self::ExternalResourceTimeout {
            retry_after: retry_after(delay),
        }
    }

    /// Whether the caller may try the same operation again later.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ResourceExhausted { .. }
                | Self::ExternalResourceTimeout { .. }
                | Self::TooManyParallelPayments(_)
        )
    }

    /// Failures that end a single payment attempt without affecting the process.
    pub fn is_client_failure(&self) -> bool {
        matches!(self, Self::DeadlineExceeded { .. } | Self::Transport(_))
    }

    pub fn retry_after(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::ResourceExhausted { retry_after } | Self::ExternalResourceTimeout { retry_after } => {
                Some(*retry_after)
            }
            _ => None,
        }
    }

    /// Maps capacity-related failures to a "too many requests" answer for upstream layers.
    ///
    /// Anything else is not a capacity problem and yields `None`.
    pub fn rejection(&self) -> Option<Rejection> {
        match self {
            Self::TooManyParallelPayments(_) => Some(Rejection {
                status: Rejection::TOO_MANY_REQUESTS,
                retry_after_ms: None,
            }),
            Self::ResourceExhausted { retry_after } | Self::ExternalResourceTimeout { retry_after } => {
                Some(Rejection {
                    status: Rejection::TOO_MANY_REQUESTS,
                    retry_after_ms: Some(retry_after.timestamp_millis()),
                })
            }
            _ => None,
        }
    }
}

impl From<figment::Error> for PaymentError {
    fn from(err: figment::Error) -> Self {
        Self::Config(Box::new(err))
    }
}

/// Status plus optional `Retry-After` (absolute epoch milliseconds).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rejection {
    pub status: u16,
    pub retry_after_ms: Option<i64>,
}

impl Rejection {
    pub const TOO_MANY_REQUESTS: u16 = 429;
}

fn retry_after(delay: Duration) -> DateTime<Utc> {
    let now = Utc::now();
    ChronoDuration::from_std(delay)
        .ok()
        .and_then(|delay| now.checked_add_signed(delay))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}
