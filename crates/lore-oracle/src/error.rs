//! Oracle error types

use thiserror::Error;

/// Errors that can occur during an oracle call
///
/// None of these is evidence against the current state of a rule. Callers
/// treat every variant as "unchanged".
#[derive(Error, Debug, Clone, PartialEq)]
pub enum OracleError {
    /// No response within the configured bound
    #[error("Oracle timed out after {secs}s ({subject})")]
    Timeout {
        /// Request subject
        subject: String,
        /// Configured bound in seconds
        secs: u64,
    },

    /// Response did not match the request kind's schema
    #[error("Malformed oracle response: {0}")]
    MalformedResponse(String),

    /// Backend could not be reached or refused the request
    #[error("Oracle transport error: {0}")]
    Transport(String),
}

impl OracleError {
    /// Whether this is a timeout
    pub fn is_timeout(&self) -> bool {
        matches!(self, OracleError::Timeout { .. })
    }

    /// Whether this is a malformed response
    pub fn is_malformed(&self) -> bool {
        matches!(self, OracleError::MalformedResponse(_))
    }
}

impl From<serde_json::Error> for OracleError {
    fn from(e: serde_json::Error) -> Self {
        OracleError::MalformedResponse(format!("JSON parse error: {}", e))
    }
}
