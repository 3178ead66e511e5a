use super::lock;
use crate::error::{PaymentError, Result};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Admits at most `rate` ticks within any trailing `window`.
///
/// Keeps the instants of the ticks admitted in the current window; the oldest one
/// is the window start. Decisions are taken under a single lock, so two callers can
/// never both see the last free unit.
#[derive(Debug)]
pub struct SlidingWindowRateLimiter {
    rate: usize,
    window: Duration,
    admitted: Mutex<VecDeque<Instant>>,
}

impl SlidingWindowRateLimiter {
    pub fn new(rate: u32, window: Duration) -> Self {
        let rate = rate as usize;
        Self {
            rate,
            window,
            admitted: Mutex::new(VecDeque::with_capacity(rate)),
        }
    }

    pub fn tick(&self) -> bool {
        self.try_tick().is_ok()
    }

    /// Like [`tick`](Self::tick), but a denial carries the time until a unit frees up.
    pub fn try_tick(&self) -> Result<(), Duration> {
        let now = Instant::now();
        let mut admitted = lock(&self.admitted);

        while let Some(start) = admitted.front() {
            if now.duration_since(*start) >= self.window {
                admitted.pop_front();
            } else {
                break;
            }
        }

        if admitted.len() < self.rate {
            admitted.push_back(now);
            return Ok(());
        }

        let wait = admitted
            .front()
            .map(|start| self.window.saturating_sub(now.duration_since(*start)))
            .unwrap_or(self.window);
        Err(wait)
    }

    /// Ticks admitted within the window ending now.
    pub fn admitted(&self) -> usize {
        let now = Instant::now();
        lock(&self.admitted)
            .iter()
            .filter(|start| now.duration_since(**start) < self.window)
            .count()
    }
}

type Ticket = oneshot::Sender<()>;

/// Bounded FIFO of waiters drained by `rate` every `window`.
///
/// The leak runs on its own task from [`start`](Self::start) until [`shutdown`](Self::shutdown)
/// is called or the limiter is dropped.
#[derive(Debug)]
pub struct LeakyBucketRateLimiter {
    window: Duration,
    bucket_size: usize,
    queue: Arc<Mutex<VecDeque<Ticket>>>,
    shutdown: CancellationToken,
}

impl LeakyBucketRateLimiter {
    /// Creates the limiter and spawns its leak task. Must be called inside a tokio runtime.
    pub fn start(rate: u32, window: Duration, bucket_size: usize) -> Self {
        let queue = Arc::new(Mutex::new(VecDeque::with_capacity(bucket_size)));
        let shutdown = CancellationToken::new();

        tokio::spawn(leak(
            Arc::clone(&queue),
            rate as usize,
            window,
            shutdown.clone(),
        ));

        Self {
            window,
            bucket_size,
            queue,
            shutdown,
        }
    }

    /// Waits for a ticket released by the leak.
    ///
    /// Fails at once with `ResourceExhausted` when `bucket_size` callers are already
    /// queued, and with `LimiterShutdown` if the limiter stops before releasing us.
    pub async fn acquire_or_throw(&self) -> Result<()> {
        let (ticket, released) = oneshot::channel();
        {
            let mut queue = lock(&self.queue);
            if self.shutdown.is_cancelled() {
                return Err(PaymentError::LimiterShutdown);
            }
            // Waiters that gave up no longer hold a place in the bucket.
            queue.retain(|ticket| !ticket.is_closed());
            if queue.len() >= self.bucket_size {
                info!(queue_size = queue.len(), "Rejected request, bucket is full");
                return Err(PaymentError::resource_exhausted(self.window));
            }
            queue.push_back(ticket);
        }

        released.await.map_err(|_| PaymentError::LimiterShutdown)?;
        debug!(queue_size = self.queued(), "Ticket released");
        Ok(())
    }

    pub fn queued(&self) -> usize {
        lock(&self.queue).len()
    }

    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }
}

impl Drop for LeakyBucketRateLimiter {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

async fn leak(
    queue: Arc<Mutex<VecDeque<Ticket>>>,
    rate: usize,
    window: Duration,
    shutdown: CancellationToken,
) {
    let mut ticker = tokio::time::interval_at(Instant::now() + window, window);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {
                let mut queue = lock(&queue);
                let before = queue.len();
                let mut released = 0;
                // Waiters that gave up do not count against the quota.
                while released < rate {
                    match queue.pop_front() {
                        Some(ticket) => {
                            if ticket.send(()).is_ok() {
                                released += 1;
                            }
                        }
                        None => break,
                    }
                }
                debug!(before, after = queue.len(), released, "Bucket leaked");
            }
        }
    }

    let abandoned = lock(&queue).drain(..).count();
    if abandoned > 0 {
        warn!(abandoned, "Leaky bucket stopped with queued waiters");
    }
}

/// An outbound rate limiter, one of the two available strategies.
#[derive(Debug)]
pub enum RateLimiter {
    SlidingWindow(SlidingWindowRateLimiter),
    LeakyBucket(LeakyBucketRateLimiter),
}

impl RateLimiter {
    /// Passes once the strategy admits the caller.
    ///
    /// The sliding window never waits and denies with `ResourceExhausted`; the leaky
    /// bucket queues the caller until its ticket is released.
    pub async fn acquire(&self) -> Result<()> {
        match self {
            Self::SlidingWindow(limiter) => limiter
                .try_tick()
                .map_err(PaymentError::resource_exhausted),
            Self::LeakyBucket(limiter) => limiter.acquire_or_throw().await,
        }
    }

    pub fn shutdown(&self) {
        if let Self::LeakyBucket(limiter) = self {
            limiter.shutdown();
        }
    }
}
