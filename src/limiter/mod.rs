//! Admission control for outbound provider calls.
//!
//! Two independent concerns, each with two interchangeable strategies:
//! - [`RateLimiter`] bounds how many calls start per time window
//!   (sliding window or leaky bucket).
//! - [`ParallelRequestsLimiter`] bounds how many calls are in flight at once
//!   (blocking semaphore window or lock-free counter window).

pub mod rate;
pub mod window;

pub use rate::{LeakyBucketRateLimiter, RateLimiter, SlidingWindowRateLimiter};
pub use window::{
    NonBlockingOngoingWindow, OngoingWindow, ParallelRequestsLimiter, WindowPermit,
    WindowResponse,
};

use std::sync::{Mutex, MutexGuard, PoisonError};

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
