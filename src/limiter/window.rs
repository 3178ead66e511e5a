use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// A slot in a parallel-requests window.
///
/// Dropping the permit (or calling [`release`](Self::release)) gives the slot back
/// exactly once. A denied acquire hands out no permit, so there is nothing to release.
#[must_use = "dropping a permit releases its slot immediately"]
#[derive(Debug)]
pub struct WindowPermit {
    inner: PermitInner,
}

#[derive(Debug)]
enum PermitInner {
    Semaphore(#[allow(dead_code)] OwnedSemaphorePermit),
    Counter(Arc<AtomicUsize>),
}

impl WindowPermit {
    pub fn release(self) {}
}

impl Drop for WindowPermit {
    fn drop(&mut self) {
        if let PermitInner::Counter(size) = &self.inner {
            size.fetch_sub(1, Ordering::AcqRel);
        }
    }
}

/// Counts callers blocked on the window while alive.
struct Waiting<'a>(&'a AtomicUsize);

impl<'a> Waiting<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::AcqRel);
        Self(counter)
    }
}

impl Drop for Waiting<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Semaphore-backed window: callers wait up to a timeout for a free slot.
#[derive(Debug)]
pub struct OngoingWindow {
    max_size: usize,
    semaphore: Arc<Semaphore>,
    waiting: AtomicUsize,
}

impl OngoingWindow {
    pub fn new(max_size: usize) -> Self {
        Self {
            max_size,
            semaphore: Arc::new(Semaphore::new(max_size)),
            waiting: AtomicUsize::new(0),
        }
    }

    pub async fn try_acquire(&self, timeout: Duration) -> Option<WindowPermit> {
        if let Ok(permit) = Arc::clone(&self.semaphore).try_acquire_owned() {
            return Some(WindowPermit {
                inner: PermitInner::Semaphore(permit),
            });
        }

        let _waiting = Waiting::enter(&self.waiting);
        match tokio::time::timeout(timeout, Arc::clone(&self.semaphore).acquire_owned()).await {
            Ok(Ok(permit)) => Some(WindowPermit {
                inner: PermitInner::Semaphore(permit),
            }),
            _ => None,
        }
    }

    /// Callers currently blocked waiting for a slot.
    pub fn pending_count(&self) -> usize {
        self.waiting.load(Ordering::Acquire)
    }

    pub fn in_flight(&self) -> usize {
        self.max_size - self.semaphore.available_permits()
    }
}

#[derive(Debug)]
pub enum WindowResponse {
    Success {
        permit: WindowPermit,
        current_size: usize,
    },
    Fail {
        current_size: usize,
    },
}

/// Lock-free window for call sites that must never stall.
#[derive(Debug)]
pub struct NonBlockingOngoingWindow {
    max_size: usize,
    size: Arc<AtomicUsize>,
}

impl NonBlockingOngoingWindow {
    pub fn new(max_size: usize) -> Self {
        Self {
            max_size,
            size: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn put_into_window(&self) -> WindowResponse {
        let mut current = self.size.load(Ordering::Acquire);
        loop {
            if current >= self.max_size {
                return WindowResponse::Fail {
                    current_size: current,
                };
            }
            match self.size.compare_exchange_weak(
                current,
                current + 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    return WindowResponse::Success {
                        permit: WindowPermit {
                            inner: PermitInner::Counter(Arc::clone(&self.size)),
                        },
                        current_size: current + 1,
                    };
                }
                Err(actual) => current = actual,
            }
        }
    }

    pub fn current_size(&self) -> usize {
        self.size.load(Ordering::Acquire)
    }
}

/// Bounds the number of in-flight provider calls, one of the two window strategies.
#[derive(Debug)]
pub enum ParallelRequestsLimiter {
    Blocking(OngoingWindow),
    NonBlocking(NonBlockingOngoingWindow),
}

impl ParallelRequestsLimiter {
    /// Returns a permit, or `None` when no slot freed up in time.
    ///
    /// The non-blocking window ignores `timeout` and answers immediately.
    pub async fn try_acquire(&self, timeout: Duration) -> Option<WindowPermit> {
        match self {
            Self::Blocking(window) => window.try_acquire(timeout).await,
            Self::NonBlocking(window) => match window.put_into_window() {
                WindowResponse::Success { permit, .. } => Some(permit),
                WindowResponse::Fail { .. } => None,
            },
        }
    }

    pub fn pending_count(&self) -> usize {
        match self {
            Self::Blocking(window) => window.pending_count(),
            Self::NonBlocking(_) => 0,
        }
    }

    pub fn in_flight(&self) -> usize {
        match self {
            Self::Blocking(window) => window.in_flight(),
            Self::NonBlocking(window) => window.current_size(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_full_window_times_out() {
        let window = OngoingWindow::new(30);
        let mut permits = Vec::new();
        for _ in 0..30 {
            permits.push(window.try_acquire(Duration::from_secs(10)).await.unwrap());
        }
        assert_eq!(window.in_flight(), 30);

        let started = tokio::time::Instant::now();
        assert!(window.try_acquire(Duration::from_secs(10)).await.is_none());
        assert!(started.elapsed() >= Duration::from_secs(10));
        assert_eq!(window.pending_count(), 0);
        assert_eq!(window.in_flight(), 30);
    }

    #[tokio::test(start_paused = true)]
    async fn test_release_within_timeout_admits_waiter() {
        let window = Arc::new(OngoingWindow::new(30));
        let mut permits = Vec::new();
        for _ in 0..30 {
            permits.push(window.try_acquire(Duration::from_secs(10)).await.unwrap());
        }

        let waiter = {
            let window = Arc::clone(&window);
            tokio::spawn(async move { window.try_acquire(Duration::from_secs(10)).await })
        };
        while window.pending_count() < 1 {
            tokio::task::yield_now().await;
        }

        tokio::time::sleep(Duration::from_secs(2)).await;
        permits.pop().unwrap().release();

        let permit = waiter.await.unwrap();
        assert!(permit.is_some());
        assert_eq!(window.pending_count(), 0);
        assert_eq!(window.in_flight(), 30);

        drop(permit);
        drop(permits);
        assert_eq!(window.in_flight(), 0);
    }

    #[test]
    fn test_non_blocking_window_fails_fast_with_current_size() {
        let window = NonBlockingOngoingWindow::new(2);

        let first = window.put_into_window();
        let second = window.put_into_window();
        assert!(matches!(first, WindowResponse::Success { current_size: 1, .. }));
        assert!(matches!(second, WindowResponse::Success { current_size: 2, .. }));
        assert!(matches!(
            window.put_into_window(),
            WindowResponse::Fail { current_size: 2 }
        ));

        drop(first);
        assert_eq!(window.current_size(), 1);
        drop(second);
        assert_eq!(window.current_size(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_in_flight_never_exceeds_capacity() {
        for limiter in [
            ParallelRequestsLimiter::Blocking(OngoingWindow::new(5)),
            ParallelRequestsLimiter::NonBlocking(NonBlockingOngoingWindow::new(5)),
        ] {
            let limiter = Arc::new(limiter);
            let peak = Arc::new(AtomicUsize::new(0));

            let tasks: Vec<_> = (0..64)
                .map(|i| {
                    let limiter = Arc::clone(&limiter);
                    let peak = Arc::clone(&peak);
                    tokio::spawn(async move {
                        let Some(permit) = limiter.try_acquire(Duration::from_secs(5)).await else {
                            return;
                        };
                        peak.fetch_max(limiter.in_flight(), Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(2)).await;
                        // Failing work still gives the slot back.
                        if i % 3 == 0 {
                            return;
                        }
                        permit.release();
                    })
                })
                .collect();
            for task in tasks {
                task.await.unwrap();
            }

            assert!(peak.load(Ordering::SeqCst) <= 5);
            assert_eq!(limiter.in_flight(), 0);
        }
    }
}
