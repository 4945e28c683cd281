use thiserror::Error;

use crate::config::ConfigError;
use crate::signal::SignalError;
use crate::source::SourceError;
use crate::store::PersistenceError;
use crate::telemetry::TelemetryError;

#[derive(Debug, Error)]
pub enum AgentError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error(transparent)]
    Signal(#[from] SignalError),
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
    #[error(transparent)]
    Telemetry(#[from] TelemetryError),
}

impl AgentError {
    /// Recoverable errors skip the tick; everything else stops the agent.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, AgentError::Source(_) | AgentError::Signal(_))
    }
}
