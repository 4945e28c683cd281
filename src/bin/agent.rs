use anyhow::Context;
use clap::{Parser, ValueEnum};
use price_signal_agent::source::{CoinGeckoSource, PriceSource, RandomWalkSource};
use price_signal_agent::telemetry::TelemetryHandle;
use price_signal_agent::{load_config, Agent, StateStore};
use rust_decimal::Decimal;
use std::path::PathBuf;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Parser, Debug)]
#[command(
    name = "agent",
    version,
    about = "Polls an asset price and emits BUY/SELL/VOLATILITY signals"
)]
struct Args {
    /// Path to the JSON configuration file.
    #[arg(long, env = "AGENT_CONFIG", default_value = "agent_config.json")]
    config: PathBuf,

    /// Where agent state is persisted between runs.
    #[arg(long, env = "AGENT_STATE", default_value = "agent_state.json")]
    state: PathBuf,

    /// Use an offline random-walk price source instead of the HTTP endpoint.
    #[arg(long)]
    simulate: bool,

    /// Largest per-tick move of the simulated walk, in basis points.
    #[arg(long, default_value_t = 150)]
    sim_step_bps: u32,

    /// Stop after this many ticks instead of waiting for Ctrl-C.
    #[arg(long)]
    max_ticks: Option<u64>,

    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.log_format);

    let config = load_config(&args.config)
        .with_context(|| format!("loading config {}", args.config.display()))?;

    let store = StateStore::new(&args.state);
    let state = store.load();

    let source: Box<dyn PriceSource> = if args.simulate {
        let start = state
            .history
            .latest()
            .map(|p| p.price)
            .unwrap_or(Decimal::ONE_HUNDRED);
        Box::new(RandomWalkSource::new(start, args.sim_step_bps))
    } else {
        Box::new(
            CoinGeckoSource::new(&config.api_url, config.fetch_timeout())
                .context("building price source")?,
        )
    };

    let mut agent = Agent::new(config, source, store, state, TelemetryHandle::new());
    agent
        .checkpoint()
        .with_context(|| format!("state file {} is not writable", args.state.display()))?;

    let (stop_tx, stop_rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("interrupt received, stopping after the current tick");
                let _ = stop_tx.send(true);
            }
            Err(err) => warn!(error = %err, "cannot listen for Ctrl-C"),
        }
    });

    let summary = agent.run(stop_rx, args.max_ticks).await?;
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
