//! Durable agent state: bounded price history plus the append-only signal log.

use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, MathematicalOps};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};

use crate::types::{PricePoint, Signal, SignalKind};

/// On-disk layout version written into every state file.
pub const SCHEMA_VERSION: u32 = 1;

/// Chronological price points, oldest first. Eviction is plain FIFO.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PriceHistory {
    points: VecDeque<PricePoint>,
}

impl PriceHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `point` and drop the oldest entries beyond `max_len`.
    /// Returns how many points were evicted.
    pub fn push(&mut self, point: PricePoint, max_len: usize) -> usize {
        self.points.push_back(point);
        let mut evicted = 0;
        while self.points.len() > max_len {
            self.points.pop_front();
            evicted += 1;
        }
        evicted
    }

    /// Trim to `max_len`, e.g. after `max_history` was lowered between runs.
    pub fn enforce_limit(&mut self, max_len: usize) -> usize {
        let excess = self.points.len().saturating_sub(max_len);
        self.points.drain(..excess);
        excess
    }

    pub fn latest(&self) -> Option<&PricePoint> {
        self.points.back()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PricePoint> {
        self.points.iter()
    }

    /// Population standard deviation of the retained prices as a percent of
    /// their mean. `None` with fewer than two points, a non-positive mean, or
    /// prices too far apart to square within `Decimal` range.
    pub fn rolling_volatility_pct(&self) -> Option<Decimal> {
        if self.points.len() < 2 {
            return None;
        }
        let n = Decimal::from(self.points.len());
        let mean = self
            .points
            .iter()
            .try_fold(Decimal::ZERO, |acc, p| acc.checked_add(p.price))?
            .checked_div(n)?;
        if mean <= Decimal::ZERO {
            return None;
        }
        let variance = self
            .points
            .iter()
            .try_fold(Decimal::ZERO, |acc, p| {
                let d = p.price.checked_sub(mean)?;
                acc.checked_add(d.checked_mul(d)?)
            })?
            .checked_div(n)?;
        let std_dev = variance.sqrt()?;
        let pct = std_dev.checked_div(mean)?.checked_mul(Decimal::ONE_HUNDRED)?;
        Some(pct.round_dp(4))
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentState {
    pub schema_version: u32,
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub last_check: Option<DateTime<Utc>>,
    pub history: PriceHistory,
    pub signals: Vec<Signal>,
}

impl AgentState {
    pub fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            started_at,
            last_check: None,
            history: PriceHistory::new(),
            signals: Vec::new(),
        }
    }

    /// Timestamp for the next recorded point, never earlier than anything
    /// already in history or the signal log.
    pub fn next_timestamp(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let floor = self
            .history
            .latest()
            .map(|p| p.timestamp)
            .into_iter()
            .chain(self.signals.last().map(|s| s.timestamp))
            .max();
        match floor {
            Some(floor) if floor > now => floor,
            _ => now,
        }
    }

    /// Apply one tick's results. The caller is expected to have evaluated
    /// `signals` against the history as it was before `point`. Each signal is
    /// stamped with the rolling volatility including `point`; the stamped
    /// signals are returned.
    pub fn record_tick(
        &mut self,
        point: PricePoint,
        mut signals: Vec<Signal>,
        max_history: usize,
    ) -> &[Signal] {
        self.history.push(point, max_history);
        let volatility = self.history.rolling_volatility_pct();
        for signal in &mut signals {
            signal.volatility_pct = volatility;
        }
        let from = self.signals.len();
        self.signals.extend(signals);
        self.last_check = Some(point.timestamp);
        &self.signals[from..]
    }

    /// Content checks a deserialized state must pass before it is trusted:
    /// positive prices, and non-decreasing timestamps in history and signals.
    pub fn check_consistency(&self) -> Result<(), String> {
        if let Some(bad) = self.history.iter().find(|p| p.price <= Decimal::ZERO) {
            return Err(format!("non-positive price {} at {}", bad.price, bad.timestamp));
        }
        let history_regresses = self
            .history
            .iter()
            .zip(self.history.iter().skip(1))
            .any(|(a, b)| b.timestamp < a.timestamp);
        if history_regresses {
            return Err("history timestamps go backwards".into());
        }
        if self.signals.windows(2).any(|w| w[1].timestamp < w[0].timestamp) {
            return Err("signal timestamps go backwards".into());
        }
        Ok(())
    }

    pub fn signal_breakdown(&self) -> BTreeMap<SignalKind, usize> {
        let mut out = BTreeMap::new();
        for signal in &self.signals {
            *out.entry(signal.kind).or_default() += 1;
        }
        out
    }
}
