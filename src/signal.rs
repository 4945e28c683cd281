//! Threshold signal engine.
//!
//! Each new price is compared with the immediately preceding point only; there
//! is no rolling average. Policy:
//! - move <= `sell_threshold_pct` emits SELL, otherwise move >= `buy_threshold_pct`
//!   emits BUY;
//! - independently, |move| >= `volatility_threshold_pct` emits VOLATILITY, which
//!   may accompany either BUY or SELL.

use rust_decimal::Decimal;
use thiserror::Error;

use crate::config::AgentConfig;
use crate::state::PriceHistory;
use crate::types::{PricePoint, Signal, SignalKind, SignalStrength};

/// SELL at or below this move is reported as strong.
const STRONG_SELL_PCT: Decimal = Decimal::from_parts(10, 0, 0, true, 0);
/// BUY at or above this move is reported as strong.
const STRONG_BUY_PCT: Decimal = Decimal::from_parts(20, 0, 0, false, 0);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SignalError {
    #[error("invalid reference price {price}: must be positive")]
    InvalidPrice { price: Decimal },
    #[error("change from {old} to {new} is outside the representable range")]
    Overflow { old: Decimal, new: Decimal },
}

/// `(new - old) / old * 100`. Fails instead of dividing by a non-positive `old`
/// or overflowing on an extreme ratio.
pub fn percent_change(old: Decimal, new: Decimal) -> Result<Decimal, SignalError> {
    if old <= Decimal::ZERO {
        return Err(SignalError::InvalidPrice { price: old });
    }
    new.checked_sub(old)
        .and_then(|delta| delta.checked_div(old))
        .and_then(|ratio| ratio.checked_mul(Decimal::ONE_HUNDRED))
        .ok_or(SignalError::Overflow { old, new })
}

/// Result of comparing a new point with the latest recorded one.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Assessment {
    /// `None` when there was nothing to compare against.
    pub change: Option<Decimal>,
    pub signals: Vec<Signal>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SignalThresholds {
    pub sell_pct: Decimal,
    pub buy_pct: Decimal,
    pub volatility_pct: Decimal,
    pub enable_buy: bool,
    pub enable_volatility: bool,
}

impl From<&AgentConfig> for SignalThresholds {
    fn from(cfg: &AgentConfig) -> Self {
        Self {
            sell_pct: cfg.sell_threshold_pct,
            buy_pct: cfg.buy_threshold_pct,
            volatility_pct: cfg.volatility_threshold_pct,
            enable_buy: cfg.enable_buy_signals,
            enable_volatility: cfg.enable_volatility_signals,
        }
    }
}

#[derive(Clone, Debug)]
pub struct SignalEngine {
    thresholds: SignalThresholds,
}

impl SignalEngine {
    pub fn new(thresholds: SignalThresholds) -> Self {
        Self { thresholds }
    }

    pub fn from_config(cfg: &AgentConfig) -> Self {
        Self::new(SignalThresholds::from(cfg))
    }

    /// Signals for `new_point` given the history recorded before it.
    /// The first observation only seeds history and yields nothing.
    pub fn evaluate(
        &self,
        history: &PriceHistory,
        new_point: &PricePoint,
    ) -> Result<Vec<Signal>, SignalError> {
        self.assess(history, new_point).map(|assessment| assessment.signals)
    }

    /// Like [`evaluate`](Self::evaluate), also returning the percent change.
    pub fn assess(
        &self,
        history: &PriceHistory,
        new_point: &PricePoint,
    ) -> Result<Assessment, SignalError> {
        let Some(prev) = history.latest() else {
            return Ok(Assessment::default());
        };
        let change = percent_change(prev.price, new_point.price)?;
        let th = &self.thresholds;

        let signal = |kind: SignalKind, strength: SignalStrength| Signal {
            kind,
            timestamp: new_point.timestamp,
            reference_price: new_point.price,
            previous_price: prev.price,
            percent_change: change,
            strength,
            volatility_pct: None,
        };

        let mut out = Vec::new();
        if change <= th.sell_pct {
            let strength = if change <= STRONG_SELL_PCT {
                SignalStrength::Strong
            } else {
                SignalStrength::Moderate
            };
            out.push(signal(SignalKind::Sell, strength));
        } else if th.enable_buy && change >= th.buy_pct {
            let strength = if change >= STRONG_BUY_PCT {
                SignalStrength::Strong
            } else {
                SignalStrength::Moderate
            };
            out.push(signal(SignalKind::Buy, strength));
        }

        if th.enable_volatility && change.abs() >= th.volatility_pct {
            out.push(signal(SignalKind::Volatility, SignalStrength::Warning));
        }
        Ok(Assessment {
            change: Some(change),
            signals: out,
        })
    }
}

/// Convenience wrapper over [`SignalEngine::evaluate`] for one-off checks.
pub fn evaluate(
    history: &PriceHistory,
    new_point: &PricePoint,
    cfg: &AgentConfig,
) -> Result<Vec<Signal>, SignalError> {
    SignalEngine::from_config(cfg).evaluate(history, new_point)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};
    use rust_decimal_macros::dec;

    fn t(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn cfg(sell: Decimal, buy: Decimal, vol: Decimal) -> AgentConfig {
        AgentConfig {
            sell_threshold_pct: sell,
            buy_threshold_pct: buy,
            volatility_threshold_pct: vol,
            ..AgentConfig::sample()
        }
    }

    fn history_with(price: Decimal) -> PriceHistory {
        let mut history = PriceHistory::new();
        history.push(PricePoint::new(t(0), price), 10);
        history
    }

    fn kinds(signals: &[Signal]) -> Vec<SignalKind> {
        signals.iter().map(|s| s.kind).collect()
    }

    #[test]
    fn empty_history_only_seeds() {
        let out = evaluate(
            &PriceHistory::new(),
            &PricePoint::new(t(1), dec!(50)),
            &AgentConfig::sample(),
        )
        .unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn drop_of_ten_percent_sells() {
        let out = evaluate(
            &history_with(dec!(100)),
            &PricePoint::new(t(1), dec!(90)),
            &cfg(dec!(-5), dec!(5), dec!(50)),
        )
        .unwrap();
        assert_eq!(kinds(&out), vec![SignalKind::Sell]);
        assert_eq!(out[0].percent_change, dec!(-10));
        assert_eq!(out[0].strength, SignalStrength::Strong);
        assert_eq!(out[0].reference_price, dec!(90));
        assert_eq!(out[0].previous_price, dec!(100));
    }

    #[test]
    fn surge_emits_buy_and_volatility() {
        let out = evaluate(
            &history_with(dec!(100)),
            &PricePoint::new(t(1), dec!(108)),
            &cfg(dec!(-5), dec!(5), dec!(6)),
        )
        .unwrap();
        assert_eq!(kinds(&out), vec![SignalKind::Buy, SignalKind::Volatility]);
        assert!(out.iter().all(|s| s.percent_change == dec!(8)));
        assert_eq!(out[0].strength, SignalStrength::Moderate);
        assert_eq!(out[1].strength, SignalStrength::Warning);
    }

    #[test]
    fn volatility_accompanies_sell() {
        let out = evaluate(
            &history_with(dec!(100)),
            &PricePoint::new(t(1), dec!(93)),
            &cfg(dec!(-5), dec!(5), dec!(6)),
        )
        .unwrap();
        assert_eq!(kinds(&out), vec![SignalKind::Sell, SignalKind::Volatility]);
    }

    #[test]
    fn move_between_thresholds_is_silent() {
        let out = evaluate(
            &history_with(dec!(100)),
            &PricePoint::new(t(1), dec!(102)),
            &cfg(dec!(-5), dec!(5), dec!(6)),
        )
        .unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn thresholds_are_inclusive() {
        let out = evaluate(
            &history_with(dec!(100)),
            &PricePoint::new(t(1), dec!(95)),
            &cfg(dec!(-5), dec!(5), dec!(5)),
        )
        .unwrap();
        assert_eq!(kinds(&out), vec![SignalKind::Sell, SignalKind::Volatility]);
    }

    #[test]
    fn disabled_kinds_are_suppressed() {
        let mut config = cfg(dec!(-5), dec!(5), dec!(6));
        config.enable_buy_signals = false;
        config.enable_volatility_signals = false;
        let out = evaluate(
            &history_with(dec!(100)),
            &PricePoint::new(t(1), dec!(130)),
            &config,
        )
        .unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn zero_reference_price_is_rejected() {
        let err = evaluate(
            &history_with(dec!(0)),
            &PricePoint::new(t(1), dec!(10)),
            &AgentConfig::sample(),
        )
        .unwrap_err();
        assert_eq!(err, SignalError::InvalidPrice { price: dec!(0) });
    }

    #[test]
    fn extreme_ratio_is_an_error_not_a_panic() {
        let old = dec!(0.0000000001);
        let new = dec!(100000000000000000000);
        assert_eq!(percent_change(old, new), Err(SignalError::Overflow { old, new }));

        let err = evaluate(
            &history_with(old),
            &PricePoint::new(t(1), new),
            &AgentConfig::sample(),
        )
        .unwrap_err();
        assert!(matches!(err, SignalError::Overflow { .. }));
    }

    #[test]
    fn assess_reports_change_even_without_signals() {
        let engine = SignalEngine::from_config(&cfg(dec!(-5), dec!(5), dec!(6)));
        let seed = engine
            .assess(&PriceHistory::new(), &PricePoint::new(t(0), dec!(100)))
            .unwrap();
        assert_eq!(seed, Assessment::default());

        let quiet = engine
            .assess(&history_with(dec!(100)), &PricePoint::new(t(1), dec!(102)))
            .unwrap();
        assert_eq!(quiet.change, Some(dec!(2)));
        assert!(quiet.signals.is_empty());
    }

    #[test]
    fn sign_of_change_follows_direction() {
        let pairs = [
            (dec!(1), dec!(2)),
            (dec!(100), dec!(99.99)),
            (dec!(0.0001), dec!(0.00011)),
            (dec!(65000), dec!(64000.5)),
            (dec!(3), dec!(3)),
        ];
        for (old, new) in pairs {
            let change = percent_change(old, new).unwrap();
            assert_eq!(change.is_sign_positive() && !change.is_zero(), new > old, "{old} -> {new}");
            assert_eq!(change.is_zero(), new == old, "{old} -> {new}");
        }
    }
}
