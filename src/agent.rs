//! The polling loop.
//!
//! `Agent::tick` runs one fetch -> evaluate -> persist cycle against an
//! explicit [`AgentState`] value. A tick either commits all of its effects
//! (new point, signals, `last_check`) to disk and memory, or none of them.
//! `Agent::run` schedules ticks on a fixed interval and checks the stop
//! signal only between ticks, so an in-flight fetch always completes or times
//! out before shutdown.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Instant;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::config::AgentConfig;
use crate::error::AgentError;
use crate::signal::{Assessment, SignalEngine};
use crate::source::{PriceSource, SourceError};
use crate::state::AgentState;
use crate::store::StateStore;
use crate::telemetry::{
    TelemetryHandle, TelemetrySnapshot, FETCH_FAILURES, FETCH_LATENCY_MS, PERSIST_RETRIES,
    TICKS_COMPLETED, TICKS_SKIPPED,
};
use crate::types::{AssetPair, PricePoint, Signal, SignalKind};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AgentStatus {
    Running,
    Stopped,
}

#[derive(Clone, Debug, PartialEq)]
pub enum TickOutcome {
    Recorded {
        point: PricePoint,
        signals: Vec<Signal>,
    },
    Skipped {
        reason: String,
    },
}

#[derive(Clone, Debug, Serialize)]
pub struct AgentSummary {
    pub asset_pair: AssetPair,
    pub started_at: DateTime<Utc>,
    pub uptime_seconds: i64,
    pub total_signals: usize,
    pub signal_breakdown: BTreeMap<SignalKind, usize>,
    pub last_check: Option<DateTime<Utc>>,
    pub history_len: usize,
    pub rolling_volatility_pct: Option<Decimal>,
    pub telemetry: TelemetrySnapshot,
}

pub struct Agent<S> {
    config: AgentConfig,
    source: S,
    store: StateStore,
    engine: SignalEngine,
    state: AgentState,
    status: AgentStatus,
    telemetry: TelemetryHandle,
    signals_at_last_summary: usize,
}

impl<S: PriceSource> Agent<S> {
    pub fn new(
        config: AgentConfig,
        source: S,
        store: StateStore,
        mut state: AgentState,
        telemetry: TelemetryHandle,
    ) -> Self {
        let trimmed = state.history.enforce_limit(config.max_history);
        if trimmed > 0 {
            info!(trimmed, max_history = config.max_history, "trimmed persisted history");
        }
        let engine = SignalEngine::from_config(&config);
        let signals_at_last_summary = state.signals.len();
        Self {
            config,
            source,
            store,
            engine,
            state,
            status: AgentStatus::Running,
            telemetry,
            signals_at_last_summary,
        }
    }

    pub fn state(&self) -> &AgentState {
        &self.state
    }

    pub fn status(&self) -> AgentStatus {
        self.status
    }

    pub fn telemetry(&self) -> &TelemetryHandle {
        &self.telemetry
    }

    /// Persist the current state. Used at startup to prove the target is writable.
    pub fn checkpoint(&self) -> Result<(), AgentError> {
        self.persist(&self.state)
    }

    /// One fetch -> evaluate -> persist cycle. Recoverable failures are logged
    /// and reported as [`TickOutcome::Skipped`] with the state untouched.
    pub async fn tick(&mut self) -> Result<TickOutcome, AgentError> {
        match self.try_tick().await {
            Ok(outcome) => Ok(outcome),
            Err(err) if err.is_recoverable() => {
                warn!(pair = %self.config.asset_pair, error = %err, "tick skipped");
                self.telemetry.record_counter(TICKS_SKIPPED, 1)?;
                Ok(TickOutcome::Skipped {
                    reason: err.to_string(),
                })
            }
            Err(err) => Err(err),
        }
    }

    async fn try_tick(&mut self) -> Result<TickOutcome, AgentError> {
        let price = self.fetch().await?;

        let point = PricePoint::new(self.state.next_timestamp(Utc::now()), price);
        let Assessment { change, signals } = self.engine.assess(&self.state.history, &point)?;

        let mut next = self.state.clone();
        let signals = next
            .record_tick(point, signals, self.config.max_history)
            .to_vec();
        self.persist(&next)?;
        self.state = next;

        self.telemetry.record_counter(TICKS_COMPLETED, 1)?;
        for signal in &signals {
            self.telemetry
                .record_counter(&format!("signals.{}", signal.kind.as_str().to_lowercase()), 1)?;
        }
        self.report_tick(&point, change, &signals);
        Ok(TickOutcome::Recorded { point, signals })
    }

    async fn fetch(&self) -> Result<Decimal, AgentError> {
        let started = Instant::now();
        let fetched = tokio::time::timeout(
            self.config.fetch_timeout(),
            self.source.fetch_price(&self.config.asset_pair),
        )
        .await
        .unwrap_or_else(|_| {
            Err(SourceError::Unavailable(format!(
                "no response within {}s",
                self.config.fetch_timeout_seconds
            )))
        });
        match fetched {
            Ok(price) => {
                self.telemetry
                    .record_latency_ms(FETCH_LATENCY_MS, started.elapsed().as_millis() as u64);
                Ok(price)
            }
            Err(err) => {
                self.telemetry.record_counter(FETCH_FAILURES, 1)?;
                Err(err.into())
            }
        }
    }

    /// Save, retrying once before giving up.
    fn persist(&self, state: &AgentState) -> Result<(), AgentError> {
        if let Err(first) = self.store.save(state) {
            warn!(error = %first, "persisting state failed, retrying once");
            self.telemetry.record_counter(PERSIST_RETRIES, 1)?;
            self.store.save(state)?;
        }
        Ok(())
    }

    fn report_tick(&mut self, point: &PricePoint, change: Option<Decimal>, signals: &[Signal]) {
        let volatility = self.state.history.rolling_volatility_pct();
        match change {
            Some(change) => info!(
                pair = %self.config.asset_pair,
                price = %point.price,
                change_pct = %change.round_dp(2),
                volatility_pct = %volatility.unwrap_or_default(),
                "price checked"
            ),
            None => info!(
                pair = %self.config.asset_pair,
                price = %point.price,
                "first observation, seeding history"
            ),
        }
        for signal in signals {
            warn!(
                kind = %signal.kind,
                strength = ?signal.strength,
                previous = %signal.previous_price,
                price = %signal.reference_price,
                change_pct = %signal.percent_change.round_dp(2),
                volatility_pct = ?signal.volatility_pct,
                "trading signal"
            );
        }

        let every = self.config.summary_every_signals;
        let total = self.state.signals.len();
        if every > 0 && total / every > self.signals_at_last_summary / every {
            self.signals_at_last_summary = total;
            log_summary("periodic summary", &self.summary(Utc::now()));
        }
    }

    pub fn summary(&self, now: DateTime<Utc>) -> AgentSummary {
        AgentSummary {
            asset_pair: self.config.asset_pair.clone(),
            started_at: self.state.started_at,
            uptime_seconds: (now - self.state.started_at).num_seconds().max(0),
            total_signals: self.state.signals.len(),
            signal_breakdown: self.state.signal_breakdown(),
            last_check: self.state.last_check,
            history_len: self.state.history.len(),
            rolling_volatility_pct: self.state.history.rolling_volatility_pct(),
            telemetry: self.telemetry.snapshot(),
        }
    }

    /// Tick every `poll_interval_seconds` until `stop` flips to `true` or
    /// `max_ticks` ticks have run. Fatal errors stop the agent and are returned.
    pub async fn run(
        &mut self,
        mut stop: watch::Receiver<bool>,
        max_ticks: Option<u64>,
    ) -> Result<AgentSummary, AgentError> {
        info!(
            pair = %self.config.asset_pair,
            source = self.source.name(),
            interval_s = self.config.poll_interval_seconds,
            sell_pct = %self.config.sell_threshold_pct,
            buy_pct = %self.config.buy_threshold_pct,
            volatility_pct = %self.config.volatility_threshold_pct,
            "agent starting"
        );
        self.status = AgentStatus::Running;
        let result = self.run_ticks(&mut stop, max_ticks).await;
        self.status = AgentStatus::Stopped;
        result?;

        let summary = self.summary(Utc::now());
        log_summary("final summary", &summary);
        Ok(summary)
    }

    async fn run_ticks(
        &mut self,
        stop: &mut watch::Receiver<bool>,
        max_ticks: Option<u64>,
    ) -> Result<(), AgentError> {
        let mut ticks = 0u64;
        loop {
            if *stop.borrow() {
                info!("stop requested");
                return Ok(());
            }
            self.tick().await?;
            ticks += 1;
            if max_ticks.is_some_and(|max| ticks >= max) {
                info!(ticks, "tick limit reached");
                return Ok(());
            }
            debug!(seconds = self.config.poll_interval_seconds, "sleeping until next tick");
            if wait_or_stop(self.config.poll_interval(), stop).await {
                info!("stop requested");
                return Ok(());
            }
        }
    }
}

/// Sleep for `interval`; returns `true` early if a stop is signalled.
async fn wait_or_stop(interval: std::time::Duration, stop: &mut watch::Receiver<bool>) -> bool {
    let sleep = tokio::time::sleep(interval);
    tokio::pin!(sleep);
    loop {
        tokio::select! {
            _ = &mut sleep => return false,
            changed = stop.changed() => match changed {
                Ok(()) if *stop.borrow() => return true,
                Ok(()) => continue,
                // Sender gone: nobody can ask us to stop any more.
                Err(_) => {
                    (&mut sleep).await;
                    return false;
                }
            },
        }
    }
}

fn log_summary(label: &str, summary: &AgentSummary) {
    info!(
        pair = %summary.asset_pair,
        uptime_s = summary.uptime_seconds,
        total_signals = summary.total_signals,
        breakdown = ?summary.signal_breakdown,
        last_check = ?summary.last_check,
        history = summary.history_len,
        volatility_pct = ?summary.rolling_volatility_pct,
        counters = ?summary.telemetry.counters,
        "{label}"
    );
}
