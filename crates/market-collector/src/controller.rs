//! Session Controller - hourly market lifecycle
//!
//! # Design Principles
//! 1. Exactly one live `MarketSession`, owned here and moved through each transition
//! 2. No strike, no samples: a session whose strike never resolves is discarded
//! 3. A tick is all-or-nothing: both feeds or no record
//! 4. All waiting goes through the injected `Clock`
//!
//! # State Machine
//! Discovering -> ResolvingStrike (metadata found for a candidate slug)
//! ResolvingStrike -> Tracking (strike resolved) | Discovering (aborted, fresh session)
//! Tracking -> Expired (now > settlement)
//! Expired -> Discovering (rollover, fresh session)

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tracing::{debug, error, info, warn};

use crate::clock::{sleep_unless_shutdown, Clock, SystemClock};
use crate::config::CollectorConfig;
use crate::error::CollectorError;
use crate::feeds::{BinanceClient, ClobClient, LiveFeeds, PriceFeed};
use crate::gamma::{ClockSlugResolver, GammaClient, MarketCatalog, MarketDiscoveryClient};
use crate::store::{RecordStore, SessionFile};
use crate::strike::{CandleSource, StrikeResolver};
use crate::types::{
    DiscoveryOutcome, MarketSession, Record, SessionMetadata, SessionOutcome, SessionReport,
    SessionState, SessionStats, StrikeOutcome,
};

/// Drives discover -> resolve -> track -> rollover forever
pub struct SessionController {
    slugs: ClockSlugResolver,
    catalog: Box<dyn MarketCatalog>,
    strikes: StrikeResolver,
    feeds: Box<dyn PriceFeed>,
    store: RecordStore,
    clock: Arc<dyn Clock>,

    poll_interval: Duration,
    discovery_backoff: Duration,
    shutdown: Arc<AtomicBool>,

    // Observability
    phase: SessionState,
    current: Option<String>,
    stats: SessionStats,
}

impl SessionController {
    /// Controller wired to the live Gamma, Binance and CLOB endpoints
    pub fn from_config(config: &CollectorConfig, shutdown: Arc<AtomicBool>) -> Result<Self, CollectorError> {
        config.validate()?;

        let gamma = GammaClient::with_timeout(&config.gamma_base_url, config.catalog_timeout)?;
        let binance = BinanceClient::with_timeouts(
            &config.binance_base_url,
            &config.symbol,
            config.feed_timeout,
            config.catalog_timeout,
        )?;
        let clob = ClobClient::with_timeout(&config.clob_base_url, config.feed_timeout)?;

        Ok(Self::with_components(
            config,
            Box::new(MarketDiscoveryClient::new(gamma)),
            Box::new(binance.clone()),
            Box::new(LiveFeeds::new(binance, clob)),
            Arc::new(SystemClock),
            shutdown,
        ))
    }

    /// Controller with caller-supplied data sources and clock
    pub fn with_components(
        config: &CollectorConfig,
        catalog: Box<dyn MarketCatalog>,
        candles: Box<dyn CandleSource>,
        feeds: Box<dyn PriceFeed>,
        clock: Arc<dyn Clock>,
        shutdown: Arc<AtomicBool>,
    ) -> Self {
        Self {
            slugs: ClockSlugResolver::new(
                &config.slug_prefix,
                config.timezone,
                config.look_ahead_hours,
                config.candidate_hours,
            ),
            catalog,
            strikes: StrikeResolver::new(candles, clock.clone(), config.strike_backoff),
            feeds,
            store: RecordStore::new(config.data_root.clone()),
            clock,
            poll_interval: config.poll_interval,
            discovery_backoff: config.discovery_backoff,
            shutdown,
            phase: SessionState::Discovering,
            current: None,
            stats: SessionStats::default(),
        }
    }

    /// Get current phase
    pub fn phase(&self) -> SessionState {
        self.phase
    }

    /// Identifier of the live session (if any)
    pub fn current(&self) -> Option<&str> {
        self.current.as_deref()
    }

    /// Get statistics
    pub fn stats(&self) -> &SessionStats {
        &self.stats
    }

    /// Run sessions back to back until shutdown is requested.
    ///
    /// Returns early only on a persistence failure.
    pub async fn run(&mut self) -> Result<(), CollectorError> {
        info!("Starting collector (poll interval {:?})", self.poll_interval);

        while !self.shutdown.load(Ordering::Relaxed) {
            let report = match self.run_session().await {
                Ok(report) => report,
                Err(e) => {
                    error!("Collector stopping: {}", e);
                    return Err(e);
                }
            };

            match report.outcome {
                SessionOutcome::Completed => {
                    info!(
                        "Session {} complete: {} rows, {} skipped ticks. Rolling over...",
                        report.identifier.as_deref().unwrap_or("?"),
                        report.rows_written,
                        report.skipped_ticks
                    );
                }
                SessionOutcome::Aborted => {
                    info!("Session discarded, restarting discovery");
                }
                SessionOutcome::Interrupted => break,
            }

            debug!("{}", self.status_line());
        }

        info!("Collector stopped. {}", self.status_line());
        Ok(())
    }

    /// One full session: discover, resolve strike, track until expiry.
    pub async fn run_session(&mut self) -> Result<SessionReport, CollectorError> {
        let session = MarketSession::new();
        self.phase = session.state();
        self.current = None;

        // Discovering
        let metadata = match self.discover().await {
            Some(m) => m,
            None => return Ok(interrupted_report(None)),
        };
        let session = session.discovered(metadata.clone())?;
        self.enter(&session);

        // ResolvingStrike
        let strike = match self.strikes.resolve(metadata.settlement_time, &self.shutdown).await {
            StrikeOutcome::Resolved(strike) => strike,
            StrikeOutcome::Aborted => {
                self.stats.sessions_aborted += 1;
                return Ok(SessionReport {
                    identifier: Some(metadata.identifier),
                    outcome: SessionOutcome::Aborted,
                    rows_written: 0,
                    skipped_ticks: 0,
                    path: None,
                });
            }
            StrikeOutcome::Interrupted => return Ok(interrupted_report(Some(metadata.identifier))),
        };
        let session = session.with_strike(strike)?;
        self.enter(&session);

        // Tracking
        info!("TRACKING: {} (Strike: ${})", metadata.question, strike);
        let folder_prefix = self.slugs.settlement_folder_prefix(metadata.settlement_time);
        let path = self.store.session_path(&metadata, &folder_prefix, self.clock.now());
        let mut file = self.store.open(path);

        let (outcome, skipped_ticks) = match self.track(&session, &metadata, strike, &mut file).await {
            Ok(result) => result,
            Err(e) => {
                if let Err(close_err) = file.close().await {
                    warn!("Failed to close record file after error: {}", close_err);
                }
                return Err(e);
            }
        };

        let rows_written = file.rows_written();
        let path = file.is_open().then(|| file.path().to_path_buf());
        file.close().await?;

        if outcome == SessionOutcome::Completed {
            let session = session.expire()?;
            self.enter(&session);
            self.stats.sessions_completed += 1;
        }

        Ok(SessionReport {
            identifier: Some(metadata.identifier),
            outcome,
            rows_written,
            skipped_ticks,
            path,
        })
    }

    /// Probe the candidate slugs for `asof` once, in order, stopping at the first
    /// market that has not settled yet. Returns every attempt made.
    pub async fn probe(&self, asof: DateTime<Utc>) -> Vec<(String, DiscoveryOutcome)> {
        let mut attempts = Vec::new();

        for identifier in self.slugs.candidates(asof) {
            info!("Scanning slug: {}", identifier);
            let outcome = self.catalog.discover(&identifier).await;
            let usable = matches!(&outcome, DiscoveryOutcome::Found(meta) if meta.settlement_time > asof);

            match &outcome {
                DiscoveryOutcome::Found(meta) if !usable => {
                    debug!("{} already settled at {}, skipping", identifier, meta.settlement_time);
                }
                DiscoveryOutcome::Found(_) => {}
                DiscoveryOutcome::NotFoundYet => {
                    debug!("{} not listed yet", identifier);
                }
                DiscoveryOutcome::Failure(reason) => {
                    warn!("Discovery error for {}: {}", identifier, reason);
                }
            }

            attempts.push((identifier, outcome));
            if usable {
                break;
            }
        }

        attempts
    }

    /// Retry discovery on a fixed backoff until a live market is found or shutdown
    async fn discover(&mut self) -> Option<SessionMetadata> {
        loop {
            if self.shutdown.load(Ordering::Relaxed) {
                return None;
            }

            let now = self.clock.now();
            let attempts = self.probe(now).await;
            self.stats.discovery_attempts += attempts.len() as u64;

            if let Some((_, DiscoveryOutcome::Found(meta))) = attempts.into_iter().last() {
                if meta.settlement_time > now {
                    return Some(meta);
                }
            }

            warn!("No active market found. Retrying in {}s...", self.discovery_backoff.as_secs());
            if !sleep_unless_shutdown(self.clock.as_ref(), self.discovery_backoff, &self.shutdown).await {
                return None;
            }
        }
    }

    /// Sample both feeds on a drift-corrected cadence until settlement passes
    async fn track(
        &mut self,
        session: &MarketSession,
        metadata: &SessionMetadata,
        strike: Decimal,
        file: &mut SessionFile,
    ) -> Result<(SessionOutcome, u64), CollectorError> {
        let mut skipped: u64 = 0;
        info!("Starting collection into {}", file.path().display());

        loop {
            if self.shutdown.load(Ordering::Relaxed) {
                info!("Shutdown requested, closing {}", file.path().display());
                return Ok((SessionOutcome::Interrupted, skipped));
            }

            let tick_start = self.clock.now();
            if session.is_past_settlement(tick_start) {
                info!("Market expired: {}", metadata.identifier);
                return Ok((SessionOutcome::Completed, skipped));
            }

            let (price, probability) = tokio::join!(
                self.feeds.underlying_price(),
                self.feeds.implied_probability(&metadata.instrument_handle)
            );

            match (price, probability) {
                (Some(underlying_price), Some(implied_probability)) => {
                    let record = Record {
                        captured_at: tick_start,
                        underlying_price,
                        strike,
                        implied_probability,
                    };
                    file.append(&record).await?;
                    self.stats.rows_written += 1;

                    let time_left = metadata.settlement_time - tick_start;
                    info!("{}", progress_line(&record, time_left));
                }
                (price, probability) => {
                    skipped += 1;
                    self.stats.skipped_ticks += 1;
                    debug!(
                        "Tick skipped (spot: {}, midpoint: {})",
                        if price.is_some() { "ok" } else { "unavailable" },
                        if probability.is_some() { "ok" } else { "unavailable" }
                    );
                }
            }

            let elapsed = (self.clock.now() - tick_start).to_std().unwrap_or_default();
            let wait = self.poll_interval.saturating_sub(elapsed);
            if !wait.is_zero() {
                sleep_unless_shutdown(self.clock.as_ref(), wait, &self.shutdown).await;
            }
        }
    }

    fn enter(&mut self, session: &MarketSession) {
        debug!("Session {:?} -> {:?}", session.identifier(), session.state());
        self.phase = session.state();
        self.current = session.identifier().map(str::to_string);
    }

    /// Format status line for observability
    pub fn status_line(&self) -> String {
        let now = self.clock.now().format("%H:%M:%S");
        format!(
            "[{}] phase={:?} current={} completed={} aborted={} rows={} skipped={}",
            now,
            self.phase,
            self.current.as_deref().unwrap_or("None"),
            self.stats.sessions_completed,
            self.stats.sessions_aborted,
            self.stats.rows_written,
            self.stats.skipped_ticks
        )
    }
}

/// `BTC: $91300.1 | Strike: $91234.50 | Yes: 0.62 (62%) | Time: 12m 5s`
pub fn progress_line(record: &Record, time_left: chrono::Duration) -> String {
    let secs = time_left.num_seconds().max(0);
    let percent = match record.implied_probability.checked_mul(Decimal::ONE_HUNDRED) {
        Some(p) => p.round().to_string(),
        None => "?".to_string(),
    };
    format!(
        "BTC: ${} | Strike: ${} | Yes: {} ({}%) | Time: {}m {}s",
        record.underlying_price.round_dp(2),
        record.strike.round_dp(2),
        record.implied_probability.round_dp(2),
        percent,
        secs / 60,
        secs % 60
    )
}

fn interrupted_report(identifier: Option<String>) -> SessionReport {
    SessionReport {
        identifier,
        outcome: SessionOutcome::Interrupted,
        rows_written: 0,
        skipped_ticks: 0,
        path: None,
    }
}
