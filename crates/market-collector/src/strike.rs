//! Strike resolution
//!
//! The strike of an hourly market is the open of the 1h candle that starts one
//! hour before settlement. The candle only appears once that hour has begun, so
//! resolution polls on a fixed backoff until it is published. There is no retry
//! cap: the only way out without a strike is settlement passing, at which point
//! the session is abandoned rather than tracked with a guessed reference.

use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, DurationRound, TimeDelta, Utc};
use rust_decimal::Decimal;
use tracing::{info, warn};

use crate::clock::{sleep_unless_shutdown, Clock};
use crate::feeds::BinanceClient;
use crate::types::StrikeOutcome;

/// Historical candle lookup
#[async_trait]
pub trait CandleSource: Send + Sync {
    /// Open of the one-hour interval starting at `start`, `Ok(None)` if not published yet
    async fn hour_open(&self, start: DateTime<Utc>) -> anyhow::Result<Option<Decimal>>;
}

#[async_trait]
impl CandleSource for BinanceClient {
    async fn hour_open(&self, start: DateTime<Utc>) -> anyhow::Result<Option<Decimal>> {
        BinanceClient::hour_open(self, start).await
    }
}

/// Start of the strike candle: one hour before settlement, truncated to the hour
pub fn strike_window_start(settlement: DateTime<Utc>) -> DateTime<Utc> {
    let prior = settlement - TimeDelta::hours(1);
    prior.duration_trunc(TimeDelta::hours(1)).unwrap_or(prior)
}

pub struct StrikeResolver {
    candles: Box<dyn CandleSource>,
    clock: Arc<dyn Clock>,
    backoff: Duration,
}

impl StrikeResolver {
    pub fn new(candles: Box<dyn CandleSource>, clock: Arc<dyn Clock>, backoff: Duration) -> Self {
        Self { candles, clock, backoff }
    }

    /// Poll for the strike until it is published, settlement passes, or shutdown
    pub async fn resolve(&self, settlement: DateTime<Utc>, shutdown: &AtomicBool) -> StrikeOutcome {
        let window = strike_window_start(settlement);

        loop {
            if self.clock.now() > settlement {
                warn!("Market expired before strike found (candle {})", window.format("%H:%M"));
                return StrikeOutcome::Aborted;
            }

            match self.candles.hour_open(window).await {
                Ok(Some(strike)) => {
                    info!("Strike price found: ${} (candle {})", strike, window.format("%H:%M"));
                    return StrikeOutcome::Resolved(strike);
                }
                Ok(None) => {
                    warn!(
                        "Waiting for 1h candle open at {}... retrying in {}s",
                        window.format("%H:%M"),
                        self.backoff.as_secs()
                    );
                }
                Err(e) => {
                    warn!("Candle query failed: {:#}. Retrying in {}s", e, self.backoff.as_secs());
                }
            }

            if !sleep_unless_shutdown(self.clock.as_ref(), self.backoff, shutdown).await {
                return StrikeOutcome::Interrupted;
            }
        }
    }
}
