//! Errors raised by listeners and by host composition.

use thiserror::Error;

use super::function::FunctionId;
use crate::config::ConfigError;

/// Failure reported by a concrete listener or listener factory.
#[derive(Debug, Clone, Error)]
pub enum ListenerError {
    #[error("listener failed to start: {0}")]
    Start(String),

    #[error("listener failed to stop: {0}")]
    Stop(String),

    #[error("listener factory failed: {0}")]
    Create(String),

    #[error("listener panicked: {0}")]
    Panicked(String),
}

/// Host-level failure; these abort host startup.
#[derive(Debug, Error)]
pub enum HostError {
    #[error("listener for function '{function}' faulted: {source}")]
    ListenerFaulted {
        function: FunctionId,
        #[source]
        source: ListenerError,
    },

    #[error(transparent)]
    Config(#[from] ConfigError),
}
