//! Error types for the application context

use std::time::Duration;

use thiserror::Error;
use trellis_di::DIError;
use trellis_events::EventError;

use crate::context::ContextState;

/// Result alias used by the context and application
pub type ContextResult<T> = Result<T, ContextError>;

#[derive(Debug, Error)]
pub enum ContextError {
    #[error(transparent)]
    Bean(#[from] DIError),

    #[error(transparent)]
    Event(#[from] EventError),

    #[error("Application context status error, current: {state}")]
    AlreadyStarted { state: ContextState },

    #[error("Context is initializing, cannot register new beans")]
    RegistrationClosed,

    #[error("Processor {name} failed: {message}")]
    Processor { name: String, message: String },

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Application did not close within {timeout:?}")]
    QuitTimeout { timeout: Duration },

    #[error("Shutdown task failed: {0}")]
    Shutdown(#[from] tokio::task::JoinError),
}

impl ContextError {
    pub(crate) fn processor(name: &str, err: anyhow::Error) -> Self {
        ContextError::Processor {
            name: name.to_string(),
            message: format!("{:#}", err),
        }
    }
}
