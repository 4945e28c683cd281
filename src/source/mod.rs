use async_trait::async_trait;
use rust_decimal::Decimal;
use thiserror::Error;

use crate::types::AssetPair;

pub mod coingecko;
pub mod simulated;

pub use coingecko::CoinGeckoSource;
pub use simulated::RandomWalkSource;

/// Transient failures of a price source. Both variants skip the current tick.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("price source unavailable: {0}")]
    Unavailable(String),
    #[error("price source returned malformed data: {0}")]
    Malformed(String),
}

#[async_trait]
pub trait PriceSource: Send + Sync {
    /// Current positive price for `pair`.
    async fn fetch_price(&self, pair: &AssetPair) -> Result<Decimal, SourceError>;

    /// Short label for logs.
    fn name(&self) -> &str;
}

#[async_trait]
impl<S: PriceSource + ?Sized> PriceSource for Box<S> {
    async fn fetch_price(&self, pair: &AssetPair) -> Result<Decimal, SourceError> {
        (**self).fetch_price(pair).await
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}
