use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::types::AssetPair;

/// Keys that must be present in the config file. Everything else has a default.
pub const REQUIRED_KEYS: [&str; 6] = [
    "poll_interval_seconds",
    "sell_threshold_pct",
    "buy_threshold_pct",
    "volatility_threshold_pct",
    "max_history",
    "asset_pair",
];

pub const DEFAULT_API_URL: &str = "https://api.coingecko.com/api/v3/simple/price";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unable to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse JSON config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("missing required config key `{0}`")]
    MissingKey(&'static str),
    #[error("configuration invalid: {0}")]
    Validation(String),
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct AgentConfig {
    pub poll_interval_seconds: u64,
    /// Percent move at or below which a SELL is emitted. Must be negative.
    pub sell_threshold_pct: Decimal,
    /// Percent move at or above which a BUY is emitted. Must be positive.
    pub buy_threshold_pct: Decimal,
    /// Absolute percent move at or above which a VOLATILITY signal is emitted.
    pub volatility_threshold_pct: Decimal,
    pub max_history: usize,
    pub asset_pair: AssetPair,

    #[serde(default = "default_fetch_timeout_seconds")]
    pub fetch_timeout_seconds: u64,
    #[serde(default = "default_api_url")]
    pub api_url: String,
    #[serde(default = "default_enabled")]
    pub enable_buy_signals: bool,
    #[serde(default = "default_enabled")]
    pub enable_volatility_signals: bool,
    /// Log a run summary every N signals; 0 disables it.
    #[serde(default = "default_summary_every_signals")]
    pub summary_every_signals: usize,
}

const fn default_fetch_timeout_seconds() -> u64 {
    10
}

fn default_api_url() -> String {
    DEFAULT_API_URL.to_string()
}

const fn default_enabled() -> bool {
    true
}

const fn default_summary_every_signals() -> usize {
    10
}

impl AgentConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.poll_interval_seconds == 0 {
            return Err(ConfigError::Validation(
                "poll_interval_seconds must be greater than zero".into(),
            ));
        }
        if self.sell_threshold_pct >= Decimal::ZERO {
            return Err(ConfigError::Validation(format!(
                "sell_threshold_pct must be negative (got {})",
                self.sell_threshold_pct
            )));
        }
        if self.buy_threshold_pct <= Decimal::ZERO {
            return Err(ConfigError::Validation(format!(
                "buy_threshold_pct must be positive (got {})",
                self.buy_threshold_pct
            )));
        }
        if self.volatility_threshold_pct <= Decimal::ZERO {
            return Err(ConfigError::Validation(format!(
                "volatility_threshold_pct must be positive (got {})",
                self.volatility_threshold_pct
            )));
        }
        if self.max_history == 0 {
            return Err(ConfigError::Validation(
                "max_history must be greater than zero".into(),
            ));
        }
        if self.asset_pair.parts().is_none() {
            return Err(ConfigError::Validation(format!(
                "asset_pair must look like `<asset>/<quote>` (got {:?})",
                self.asset_pair.0
            )));
        }
        if self.fetch_timeout_seconds == 0 {
            return Err(ConfigError::Validation(
                "fetch_timeout_seconds must be greater than zero".into(),
            ));
        }
        let api_url = Url::parse(&self.api_url)
            .map_err(|err| ConfigError::Validation(format!("api_url is not a valid URL: {err}")))?;
        if !matches!(api_url.scheme(), "http" | "https") {
            return Err(ConfigError::Validation(format!(
                "api_url must be http(s) (got {})",
                api_url.scheme()
            )));
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_seconds)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_seconds)
    }

    /// Values matching the original five-minute polling defaults.
    pub fn sample() -> Self {
        Self {
            poll_interval_seconds: 300,
            sell_threshold_pct: Decimal::new(-5, 0),
            buy_threshold_pct: Decimal::new(10, 0),
            volatility_threshold_pct: Decimal::new(15, 0),
            max_history: 288,
            asset_pair: AssetPair::new("bitcoin/usd"),
            fetch_timeout_seconds: default_fetch_timeout_seconds(),
            api_url: default_api_url(),
            enable_buy_signals: true,
            enable_volatility_signals: true,
            summary_every_signals: default_summary_every_signals(),
        }
    }
}

/// Parse and validate a config document.
pub fn parse_config(contents: &str) -> Result<AgentConfig, ConfigError> {
    let raw: serde_json::Value = serde_json::from_str(contents)?;
    let Some(object) = raw.as_object() else {
        return Err(ConfigError::Validation(
            "config root must be a JSON object".into(),
        ));
    };
    if let Some(missing) = REQUIRED_KEYS
        .iter()
        .copied()
        .find(|key| !object.contains_key(*key))
    {
        return Err(ConfigError::MissingKey(missing));
    }
    let config: AgentConfig = serde_json::from_value(raw)?;
    config.validate()?;
    Ok(config)
}

pub fn load_config(path: &Path) -> Result<AgentConfig, ConfigError> {
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_config(&contents)
}
