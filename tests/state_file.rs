use chrono::{DateTime, TimeZone, Utc};
use pretty_assertions::assert_eq;
use price_signal_agent::config::DEFAULT_API_URL;
use price_signal_agent::types::{PricePoint, Signal, SignalKind, SignalStrength};
use price_signal_agent::{load_config, AgentState, ConfigError, StateStore, SCHEMA_VERSION};
use rust_decimal_macros::dec;
use std::fs;
use tempfile::tempdir;

fn t(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
}

fn populated_state() -> AgentState {
    let mut state = AgentState::new(t(0));
    state.record_tick(PricePoint::new(t(60), dec!(100)), vec![], 10);
    let sell = Signal {
        kind: SignalKind::Sell,
        timestamp: t(120),
        reference_price: dec!(90),
        previous_price: dec!(100),
        percent_change: dec!(-10),
        strength: SignalStrength::Strong,
        volatility_pct: None,
    };
    let volatility = Signal {
        kind: SignalKind::Volatility,
        strength: SignalStrength::Warning,
        ..sell.clone()
    };
    state.record_tick(PricePoint::new(t(120), dec!(90)), vec![sell, volatility], 10);
    state
}

#[test]
fn save_then_load_round_trips() {
    let dir = tempdir().unwrap();
    let store = StateStore::new(dir.path().join("agent_state.json"));
    let state = populated_state();

    store.save(&state).unwrap();
    assert_eq!(store.load(), state);

    // Saving what was loaded rewrites the same document.
    let first = fs::read_to_string(store.path()).unwrap();
    store.save(&store.load()).unwrap();
    assert_eq!(fs::read_to_string(store.path()).unwrap(), first);
}

#[test]
fn state_file_is_versioned_json() {
    let dir = tempdir().unwrap();
    let store = StateStore::new(dir.path().join("agent_state.json"));
    store.save(&populated_state()).unwrap();

    let raw: serde_json::Value = serde_json::from_slice(&fs::read(store.path()).unwrap()).unwrap();
    assert_eq!(raw["schema_version"], u64::from(SCHEMA_VERSION));
    assert_eq!(raw["history"].as_array().map(Vec::len), Some(2));
    assert_eq!(raw["signals"][0]["kind"], "SELL");
    assert_eq!(raw["signals"][1]["strength"], "WARNING");
    // mean 95, population std dev 5
    assert_eq!(raw["signals"][0]["volatility_pct"], "5.2632");
}

#[test]
fn truncated_state_file_loads_as_fresh_state() {
    let dir = tempdir().unwrap();
    let store = StateStore::new(dir.path().join("agent_state.json"));
    store.save(&populated_state()).unwrap();

    let full = fs::read(store.path()).unwrap();
    fs::write(store.path(), &full[..full.len() / 2]).unwrap();

    let state = store.load_at(t(500));
    assert_eq!(state, AgentState::new(t(500)));
    let preserved = fs::read_dir(dir.path())
        .unwrap()
        .filter_map(Result::ok)
        .filter(|e| e.file_name().to_string_lossy().contains(".corrupt-"))
        .count();
    assert_eq!(preserved, 1);
}

#[test]
fn shipped_sample_config_is_valid() {
    let path = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("configs/agent_config.json");
    let config = load_config(&path).unwrap();
    assert_eq!(config.asset_pair.parts(), Some(("bitcoin", "usd")));
    assert_eq!(config.sell_threshold_pct, dec!(-5));
    assert_eq!(config.api_url, DEFAULT_API_URL);
}

#[test]
fn missing_config_file_is_an_io_error() {
    let dir = tempdir().unwrap();
    let err = load_config(&dir.path().join("nope.json")).unwrap_err();
    assert!(matches!(err, ConfigError::Io { .. }), "{err}");
}

#[test]
fn unknown_config_keys_are_rejected() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("agent_config.json");
    fs::write(
        &path,
        r#"{
            "poll_interval_seconds": 60,
            "sell_threshold_pct": -5,
            "buy_threshold_pct": 5,
            "volatility_threshold_pct": 6,
            "max_history": 10,
            "asset_pair": "bitcoin/usd",
            "check_interval": 300
        }"#,
    )
    .unwrap();
    assert!(matches!(load_config(&path), Err(ConfigError::Parse(_))));
}
