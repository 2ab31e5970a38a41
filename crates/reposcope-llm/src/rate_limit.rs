//! Admission control shared by every outbound remote call.
//!
//! The limiter remembers the instants of the last `max_rate` admissions. A
//! call is admitted only once the oldest of them is at least `time_period`
//! old, so any interval of length `time_period` contains at most `max_rate`
//! admissions regardless of where it starts. Waiters queue on a fair mutex
//! and are admitted in arrival order.

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::error::{LlmError, Result};

pub const DEFAULT_MAX_RATE: u32 = 10;
pub const DEFAULT_TIME_PERIOD: Duration = Duration::from_secs(1);

/// Admission instants still inside the trailing `time_period`, oldest first.
type AdmissionLog = VecDeque<Instant>;

pub struct RateLimiter {
    max_rate: u32,
    time_period: Duration,
    admitted: Mutex<AdmissionLog>,
    in_flight: AtomicUsize,
}

impl fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RateLimiter")
            .field("max_rate", &self.max_rate)
            .field("time_period", &self.time_period)
            .field("in_flight", &self.in_flight())
            .finish_non_exhaustive()
    }
}

impl RateLimiter {
    /// # Errors
    ///
    /// Returns `LlmError::InvalidRateLimit` if `max_rate` or `time_period` is zero.
    pub fn new(max_rate: u32, time_period: Duration) -> Result<Self> {
        if max_rate == 0 {
            return Err(LlmError::InvalidRateLimit(
                "max_rate must be greater than zero".into(),
            ));
        }
        if time_period.is_zero() {
            return Err(LlmError::InvalidRateLimit(
                "time_period must be greater than zero".into(),
            ));
        }
        Ok(Self {
            max_rate,
            time_period,
            admitted: Mutex::new(VecDeque::with_capacity(max_rate as usize)),
            in_flight: AtomicUsize::new(0),
        })
    }

    /// Build a limiter from a period expressed in (possibly fractional) seconds.
    ///
    /// # Errors
    ///
    /// Returns `LlmError::InvalidRateLimit` if the period is not a positive finite number.
    pub fn from_secs_f64(max_rate: u32, time_period_secs: f64) -> Result<Self> {
        if !time_period_secs.is_finite() || time_period_secs <= 0.0 {
            return Err(LlmError::InvalidRateLimit(format!(
                "time_period must be a positive number of seconds, got {time_period_secs}"
            )));
        }
        Self::new(max_rate, Duration::from_secs_f64(time_period_secs))
    }

    #[must_use]
    pub fn max_rate(&self) -> u32 {
        self.max_rate
    }

    #[must_use]
    pub fn time_period(&self) -> Duration {
        self.time_period
    }

    /// Number of permits currently held.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Wait until admission would keep the trailing window within `max_rate`.
    ///
    /// The returned permit must be held for the duration of the remote call.
    /// Dropping the future while it waits consumes nothing.
    pub async fn acquire(&self) -> RatePermit<'_> {
        let capacity = self.max_rate as usize;
        let mut admitted = self.admitted.lock().await;
        loop {
            let now = Instant::now();
            while admitted
                .front()
                .is_some_and(|&at| now.saturating_duration_since(at) >= self.time_period)
            {
                admitted.pop_front();
            }
            match admitted.front() {
                Some(&oldest) if admitted.len() >= capacity => {
                    let ready_at = oldest + self.time_period;
                    tracing::trace!(
                        wait_ms = ready_at.saturating_duration_since(now).as_millis(),
                        "rate limit reached, waiting for the oldest admission to expire"
                    );
                    tokio::time::sleep_until(ready_at).await;
                }
                _ => {
                    admitted.push_back(now);
                    break;
                }
            }
        }
        drop(admitted);

        self.in_flight.fetch_add(1, Ordering::AcqRel);
        RatePermit { limiter: self }
    }
}

/// Scoped admission for one remote call.
#[must_use = "a permit is released as soon as it is dropped"]
pub struct RatePermit<'a> {
    limiter: &'a RateLimiter,
}

impl fmt::Debug for RatePermit<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RatePermit").finish_non_exhaustive()
    }
}

impl Drop for RatePermit<'_> {
    fn drop(&mut self) {
        self.limiter.in_flight.fetch_sub(1, Ordering::AcqRel);
    }
}
