use std::sync::Arc;

use thiserror::Error;

/// Error type returned by a failing event handler.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Result type every event handler returns.
pub type HandlerResult = Result<(), HandlerError>;

#[derive(Error, Debug, Clone)]
pub enum EventBusError {
    #[error("Subscriber {subscriber} has no handlers called onEvent")]
    NoHandlersFound { subscriber: String },

    #[error("Subscriber {subscriber} already registered to event {event_type}")]
    DuplicateSubscription {
        subscriber: String,
        event_type: String,
    },

    #[error("Illegal onEvent handler, check for typos: {subscriber}.{handler}")]
    IllegalHandlerName { subscriber: String, handler: String },

    #[error("Illegal cancellation: {0}")]
    IllegalCancellation(String),

    #[error("Invoking subscriber {subscriber} for event {event_type} failed: {source}")]
    HandlerInvocationFailure {
        event_type: String,
        subscriber: String,
        #[source]
        source: Arc<dyn std::error::Error + Send + Sync>,
    },

    #[error("Internal error: {0}")]
    InternalInvariantViolation(String),

    #[error("Failed to schedule delivery: {0}")]
    ScheduleFailed(String),

    #[error("Default instance already exists. It may be only set once before it's used the first time to ensure consistent behavior.")]
    DefaultInstanceExists,

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type EventBusResult<T> = Result<T, EventBusError>;

impl EventBusError {
    pub fn internal<S: Into<String>>(message: S) -> Self {
        EventBusError::InternalInvariantViolation(message.into())
    }

    pub fn illegal_cancellation<S: Into<String>>(message: S) -> Self {
        EventBusError::IllegalCancellation(message.into())
    }
}
