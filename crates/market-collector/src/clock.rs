//! Time source and sleep primitive.
//!
//! Every wait in the collector goes through `Clock` so retry loops and the
//! sampling cadence can be driven by `ManualClock` in tests.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Largest single sleep before the shutdown flag is re-checked
const SHUTDOWN_CHECK_INTERVAL: Duration = Duration::from_secs(1);

#[async_trait]
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    async fn sleep(&self, duration: Duration);
}

/// Wall clock backed by `tokio::time`
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

#[async_trait]
impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Clock that only moves when slept on.
///
/// `sleep` advances the shared time instantly, so a 30s backoff costs nothing.
#[derive(Clone, Debug)]
pub struct ManualClock {
    now: Arc<Mutex<DateTime<Utc>>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self { now: Arc::new(Mutex::new(start)) }
    }

    /// Move time forward without sleeping
    pub fn advance(&self, duration: Duration) {
        let step = chrono::Duration::from_std(duration).unwrap_or_else(|_| chrono::Duration::zero());
        if let Ok(mut now) = self.now.lock() {
            *now += step;
        }
    }

    pub fn set(&self, to: DateTime<Utc>) {
        if let Ok(mut now) = self.now.lock() {
            *now = to;
        }
    }
}

#[async_trait]
impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        self.now.lock().map(|now| *now).unwrap_or_else(|poisoned| *poisoned.into_inner())
    }

    async fn sleep(&self, duration: Duration) {
        self.advance(duration);
        tokio::task::yield_now().await;
    }
}

/// Sleep for `duration` in slices, returning `false` as soon as shutdown is requested.
pub async fn sleep_unless_shutdown(clock: &dyn Clock, duration: Duration, shutdown: &AtomicBool) -> bool {
    let mut remaining = duration;
    while !remaining.is_zero() {
        if shutdown.load(Ordering::Relaxed) {
            return false;
        }
        let slice = remaining.min(SHUTDOWN_CHECK_INTERVAL);
        clock.sleep(slice).await;
        remaining -= slice;
    }
    !shutdown.load(Ordering::Relaxed)
}
