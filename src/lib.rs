//! Price-polling signal agent primitives.
//!
//! The agent polls a single asset pair on a fixed interval, compares each new
//! price with the one before it, and emits BUY / SELL / VOLATILITY signals when
//! the percentage move crosses configured thresholds. History and emitted
//! signals survive restarts through a versioned JSON state file.

pub mod agent;
pub mod config;
pub mod error;
pub mod signal;
pub mod source;
pub mod state;
pub mod store;
pub mod telemetry;
pub mod types;

pub use crate::agent::{Agent, AgentStatus, AgentSummary, TickOutcome};
pub use crate::config::{load_config, AgentConfig, ConfigError};
pub use crate::error::AgentError;
pub use crate::signal::{percent_change, Assessment, SignalEngine, SignalError};
pub use crate::source::{PriceSource, SourceError};
pub use crate::state::{AgentState, PriceHistory, SCHEMA_VERSION};
pub use crate::store::{PersistenceError, StateStore};
