//! Error types for the event bus.

use crate::types::HandlerError;
use thiserror::Error;

/// Main error type for bus operations.
#[derive(Debug, Error)]
pub enum BusError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Handler for {event_type} failed: {source}")]
    Handler {
        event_type: &'static str,
        #[source]
        source: HandlerError,
    },

    #[error("Transaction already committed or discarded")]
    TransactionClosed,
}

impl BusError {
    /// Wrap a subscriber failure raised while dispatching `event_type`.
    pub(crate) fn handler(event_type: &'static str, source: HandlerError) -> Self {
        BusError::Handler { event_type, source }
    }

    /// True if this error came out of a subscriber rather than the bus.
    pub fn is_handler_failure(&self) -> bool {
        matches!(self, BusError::Handler { .. })
    }
}

/// Result type for bus operations.
pub type Result<T> = std::result::Result<T, BusError>;
