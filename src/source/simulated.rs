use async_trait::async_trait;
use parking_lot::Mutex;
use rand::Rng;
use rust_decimal::Decimal;

use crate::source::{PriceSource, SourceError};
use crate::types::AssetPair;

/// Offline random walk used by `--simulate`.
///
/// Each fetch moves the last price by a uniform step of up to `max_step_bps`
/// basis points in either direction.
pub struct RandomWalkSource {
    last: Mutex<Decimal>,
    max_step_bps: i64,
}

impl RandomWalkSource {
    pub fn new(start: Decimal, max_step_bps: u32) -> Self {
        Self {
            last: Mutex::new(start),
            max_step_bps: i64::from(max_step_bps),
        }
    }
}

#[async_trait]
impl PriceSource for RandomWalkSource {
    async fn fetch_price(&self, _pair: &AssetPair) -> Result<Decimal, SourceError> {
        let step_bps = rand::thread_rng().gen_range(-self.max_step_bps..=self.max_step_bps);
        let mut last = self.last.lock();
        let next = (*last * (Decimal::ONE + Decimal::new(step_bps, 4))).round_dp(8);
        if next <= Decimal::ZERO {
            return Err(SourceError::Malformed(format!(
                "random walk reached non-positive price {next}"
            )));
        }
        *last = next;
        Ok(next)
    }

    fn name(&self) -> &str {
        "simulated"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn walk_stays_within_step_bound() {
        let source = RandomWalkSource::new(dec!(100), 50);
        let pair = AssetPair::new("sim/usd");
        let mut prev = dec!(100);
        for _ in 0..100 {
            let next = source.fetch_price(&pair).await.unwrap();
            let change = crate::signal::percent_change(prev, next).unwrap();
            // 50 bps plus rounding slack
            assert!(change.abs() <= dec!(0.5001), "step {change}");
            prev = next;
        }
    }
}
