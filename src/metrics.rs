use crate::error::Result;
use prometheus::{
    Encoder, Histogram, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry,
    TextEncoder,
};
use std::time::Duration;

/// Metric families of the payment path, registered once per registry.
#[derive(Clone)]
pub struct PaymentMetrics {
    semaphore_wait_duration: HistogramVec,
    semaphore_wait_counter: IntCounterVec,
    submission_latency: HistogramVec,
    outcome_counter: IntCounterVec,
}

impl PaymentMetrics {
    pub fn register(registry: &Registry) -> Result<Self> {
        let semaphore_wait_duration = HistogramVec::new(
            HistogramOpts::new(
                "semaphore_wait_duration",
                "Time spent waiting for a parallel-requests slot, in seconds",
            ),
            &["service", "outcome"],
        )?;
        let semaphore_wait_counter = IntCounterVec::new(
            Opts::new(
                "semaphore_wait_counter",
                "Payments that started and finished waiting for a slot",
            ),
            &["service", "outcome"],
        )?;
        let submission_latency = HistogramVec::new(
            HistogramOpts::new(
                "payment_submission_latency",
                "Time from payment creation to submission, in seconds",
            ),
            &["service"],
        )?;
        let outcome_counter = IntCounterVec::new(
            Opts::new("payment_outcome_counter", "Payment attempts by outcome"),
            &["service", "outcome"],
        )?;

        registry.register(Box::new(semaphore_wait_duration.clone()))?;
        registry.register(Box::new(semaphore_wait_counter.clone()))?;
        registry.register(Box::new(submission_latency.clone()))?;
        registry.register(Box::new(outcome_counter.clone()))?;

        Ok(Self {
            semaphore_wait_duration,
            semaphore_wait_counter,
            submission_latency,
            outcome_counter,
        })
    }

    pub fn for_service(&self, service: &str) -> AdapterMetrics {
        AdapterMetrics {
            wait_success: self
                .semaphore_wait_duration
                .with_label_values(&[service, "SUCCESS"]),
            wait_fail: self
                .semaphore_wait_duration
                .with_label_values(&[service, "FAIL"]),
            wait_started: self
                .semaphore_wait_counter
                .with_label_values(&[service, "WAIT"]),
            wait_finished: self
                .semaphore_wait_counter
                .with_label_values(&[service, "FINISH"]),
            submission_latency: self.submission_latency.with_label_values(&[service]),
            outcomes: [
                Outcome::Success,
                Outcome::Fail,
                Outcome::Timeout,
                Outcome::Error,
            ]
            .map(|outcome| {
                self.outcome_counter
                    .with_label_values(&[service, outcome.as_str()])
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Fail,
    Timeout,
    Error,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Success => "SUCCESS",
            Outcome::Fail => "FAIL",
            Outcome::Timeout => "TIMEOUT",
            Outcome::Error => "ERROR",
        }
    }

    fn index(&self) -> usize {
        *self as usize
    }
}

/// Handles bound to one provider account.
#[derive(Clone)]
pub struct AdapterMetrics {
    wait_success: Histogram,
    wait_fail: Histogram,
    wait_started: IntCounter,
    wait_finished: IntCounter,
    submission_latency: Histogram,
    outcomes: [IntCounter; 4],
}

impl AdapterMetrics {
    pub fn wait_started(&self) {
        self.wait_started.inc();
    }

    pub fn wait_finished(&self, acquired: bool, waited: Duration) {
        let timer = if acquired {
            &self.wait_success
        } else {
            &self.wait_fail
        };
        timer.observe(waited.as_secs_f64());
        self.wait_finished.inc();
    }

    pub fn submitted(&self, latency: Duration) {
        self.submission_latency.observe(latency.as_secs_f64());
    }

    pub fn outcome(&self, outcome: Outcome) {
        self.outcomes[outcome.index()].inc();
    }
}

/// Renders the registry in the Prometheus text exposition format.
pub fn encode_text(registry: &Registry) -> Result<String> {
    let mut buffer = Vec::new();
    TextEncoder::new().encode(&registry.gather(), &mut buffer)?;
    Ok(String::from_utf8_lossy(&buffer).into_owned())
}
