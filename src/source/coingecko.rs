use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::Decimal;
use serde_json::Value;
use std::str::FromStr;
use std::time::{Duration, Instant};
use tracing::debug;

use crate::source::{PriceSource, SourceError};
use crate::types::AssetPair;

const USER_AGENT: &str = concat!("price-signal-agent/", env!("CARGO_PKG_VERSION"));

/// CoinGecko `simple/price` quote endpoint.
///
/// Expects `GET {api_url}?ids=<asset>&vs_currencies=<quote>` to answer with
/// `{"<asset>": {"<quote>": <number>}}`.
pub struct CoinGeckoSource {
    client: Client,
    api_url: String,
}

impl CoinGeckoSource {
    pub fn new(api_url: impl Into<String>, timeout: Duration) -> Result<Self, SourceError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| SourceError::Unavailable(format!("build http client: {e}")))?;
        Ok(Self {
            client,
            api_url: api_url.into(),
        })
    }
}

#[async_trait]
impl PriceSource for CoinGeckoSource {
    async fn fetch_price(&self, pair: &AssetPair) -> Result<Decimal, SourceError> {
        let (asset, quote) = pair
            .parts()
            .ok_or_else(|| SourceError::Malformed(format!("bad asset pair {pair}")))?;

        let started = Instant::now();
        let response = self
            .client
            .get(&self.api_url)
            .query(&[("ids", asset), ("vs_currencies", quote)])
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| SourceError::Unavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SourceError::Unavailable(format!(
                "HTTP {status}: {}",
                truncate(&body, 200)
            )));
        }

        let text = response
            .text()
            .await
            .map_err(|e| SourceError::Unavailable(format!("read body: {e}")))?;
        debug!(
            %pair,
            elapsed_ms = started.elapsed().as_millis() as u64,
            bytes = text.len(),
            "price quote received"
        );

        let body: Value = serde_json::from_str(&text)
            .map_err(|e| SourceError::Malformed(format!("invalid JSON: {e}")))?;
        parse_quote(&body, asset, quote)
    }

    fn name(&self) -> &str {
        "coingecko"
    }
}

/// Pull `body[asset][quote]` out as a positive decimal.
pub fn parse_quote(body: &Value, asset: &str, quote: &str) -> Result<Decimal, SourceError> {
    let raw = body
        .get(asset)
        .and_then(|entry| entry.get(quote))
        .ok_or_else(|| SourceError::Malformed(format!("no {asset}/{quote} quote in payload")))?;

    let text = match raw {
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        other => {
            return Err(SourceError::Malformed(format!(
                "quote is not numeric: {other}"
            )))
        }
    };
    let price = Decimal::from_str(&text)
        .or_else(|_| Decimal::from_scientific(&text))
        .map_err(|e| SourceError::Malformed(format!("unparsable price {text:?}: {e}")))?;
    if price <= Decimal::ZERO {
        return Err(SourceError::Malformed(format!(
            "non-positive price {price}"
        )));
    }
    Ok(price)
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
