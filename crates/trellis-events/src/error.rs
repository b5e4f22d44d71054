//! Error types for event publishing

use thiserror::Error;

use crate::processor::ProcessorState;

pub type EventResult<T> = Result<T, EventError>;

#[derive(Debug, Error)]
pub enum EventError {
    #[error("Event queue is full")]
    QueueFull,

    #[error("Event processor is closed")]
    Closed,

    #[error("Event post cancelled")]
    Cancelled,

    #[error("Event processing is disabled")]
    Disabled,

    #[error("Event processor cannot start from state {state}")]
    InvalidState { state: ProcessorState },

    #[error("Event consumer registration failed: {message}")]
    Consumer { message: String },

    #[error("Failed to spawn event worker: {0}")]
    Spawn(#[from] std::io::Error),
}
