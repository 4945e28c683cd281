use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// `<asset-id>/<quote-currency>`, e.g. `bitcoin/usd`.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AssetPair(pub String);

impl AssetPair {
    pub fn new(pair: impl Into<String>) -> Self {
        Self(pair.into())
    }

    /// Split into `(asset, quote)`. `None` when either side is empty.
    pub fn parts(&self) -> Option<(&str, &str)> {
        let (asset, quote) = self.0.split_once('/')?;
        let (asset, quote) = (asset.trim(), quote.trim());
        if asset.is_empty() || quote.is_empty() || quote.contains('/') {
            return None;
        }
        Some((asset, quote))
    }
}

impl fmt::Display for AssetPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricePoint {
    pub timestamp: DateTime<Utc>,
    pub price: Decimal,
}

impl PricePoint {
    pub fn new(timestamp: DateTime<Utc>, price: Decimal) -> Self {
        Self { timestamp, price }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SignalKind {
    Buy,
    Sell,
    Volatility,
}

impl SignalKind {
    pub fn as_str(self) -> &'static str {
        match self {
            SignalKind::Buy => "BUY",
            SignalKind::Sell => "SELL",
            SignalKind::Volatility => "VOLATILITY",
        }
    }
}

impl fmt::Display for SignalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SignalStrength {
    Strong,
    Moderate,
    Warning,
}

/// A discrete threshold crossing. Never mutated once recorded.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signal {
    pub kind: SignalKind,
    pub timestamp: DateTime<Utc>,
    /// Price observed on the tick that triggered the signal.
    pub reference_price: Decimal,
    /// Price of the point it was compared against.
    pub previous_price: Decimal,
    pub percent_change: Decimal,
    pub strength: SignalStrength,
    /// Rolling volatility of the history the signal was recorded into.
    #[serde(default)]
    pub volatility_pct: Option<Decimal>,
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({:?}) {} -> {} ({:+.2}%)",
            self.kind,
            self.strength,
            self.previous_price,
            self.reference_price,
            self.percent_change
        )
    }
}
