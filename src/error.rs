//! Error types for the AT-command transport.
//!
//! This module defines the primary error type, `AtError`, for the transport
//! core. Using the `thiserror` crate, it provides a centralized and
//! consistent way to handle the failure modes of a command exchange.
//!
//! ## Error Hierarchy
//!
//! `AtError` is an enum that consolidates the transport's failure sources:
//!
//! - **`UnknownCommand`**: the caller passed an identifier that is not in
//!   the command table. This is a programmer error; it is raised before the
//!   serial channel is touched and is never retried internally.
//! - **`Timeout`**: the command's overall deadline elapsed without any
//!   response line matching the success pattern. Whether to retry is the
//!   caller's decision.
//! - **`Protocol`**: the module answered, but the response carried an error
//!   marker (or a structurally matching line did). The offending response
//!   text is included for diagnostics.
//! - **`Cancelled`**: a cancellation token fired while the command was in
//!   flight. Only produced by the cancellable execution path.
//! - **`InvalidDescriptor`**: a command table entry violates the descriptor
//!   invariants (empty literal, zero timeout). Caught when the table is
//!   built, not at execution time.
//! - **`Io`**: wraps `std::io::Error`, from the underlying serial channel
//!   or from reading a command table file.
//! - **`TableParse`**: wraps TOML deserialization errors from loading a
//!   command table file.
//!
//! By using `#[from]`, `AtError` can be seamlessly created from underlying
//! error types, simplifying error handling throughout the crate with the
//! `?` operator.

use std::time::Duration;

use thiserror::Error;

/// Convenience alias for results using the transport error type.
pub type AtResult<T> = std::result::Result<T, AtError>;

/// Failure modes of one command exchange.
#[derive(Error, Debug)]
pub enum AtError {
    #[error("Unknown command identifier: {0}")]
    UnknownCommand(String),

    #[error("Command '{id}' timed out after {timeout:?}")]
    Timeout {
        /// Identifier of the command that timed out.
        id: String,
        /// The overall deadline that elapsed.
        timeout: Duration,
    },

    #[error("Command '{id}' failed: module reported an error: {response}")]
    Protocol {
        /// Identifier of the failing command.
        id: String,
        /// Accumulated response text, for diagnostics.
        response: String,
    },

    #[error("Command '{id}' was cancelled")]
    Cancelled {
        /// Identifier of the cancelled command.
        id: String,
    },

    #[error("Invalid descriptor for command '{id}': {reason}")]
    InvalidDescriptor {
        /// Identifier of the offending table entry.
        id: String,
        /// What the entry violates.
        reason: String,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Command table parse error: {0}")]
    TableParse(#[from] toml::de::Error),
}

impl AtError {
    /// True when the error is the overall-timeout outcome, the one retryable
    /// failure a caller may reasonably loop on.
    pub fn is_timeout(&self) -> bool {
        matches!(self, AtError::Timeout { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_command_display() {
        let err = AtError::UnknownCommand("warp".to_string());
        assert_eq!(err.to_string(), "Unknown command identifier: warp");
    }

    #[test]
    fn test_timeout_display() {
        let err = AtError::Timeout {
            id: "join".into(),
            timeout: Duration::from_secs(20),
        };
        assert!(err.to_string().contains("join"));
        assert!(err.to_string().contains("20s"));
        assert!(err.is_timeout());
    }

    #[test]
    fn test_protocol_display() {
        let err = AtError::Protocol {
            id: "join".into(),
            response: "+JOIN: ERROR".into(),
        };
        assert!(err.to_string().contains("+JOIN: ERROR"));
        assert!(!err.is_timeout());
    }
}
