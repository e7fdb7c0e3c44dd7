//! The `{ message, data }` wrapper used for every API response.

use serde::{Deserialize, Serialize};

/// Message used for successful reads.
pub const OK_MESSAGE: &str = "OK";

/// JSON response envelope.
///
/// `data` carries the payload on success and error detail on failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope<T> {
    /// Human-readable outcome.
    pub message: String,
    pub data: T,
}

impl<T> Envelope<T> {
    /// Creates an envelope with the given message and payload.
    pub fn new(message: impl Into<String>, data: T) -> Self {
        Self {
            message: message.into(),
            data,
        }
    }

    /// Creates an envelope for a successful read.
    pub fn ok(data: T) -> Self {
        Self::new(OK_MESSAGE, data)
    }
}
