//! Raw text backend seam

use crate::OracleError;
use async_trait::async_trait;

/// A text-completion backend
///
/// Backends only move text. Timeouts, schema validation and request
/// shaping live in [`OracleGateway`](crate::OracleGateway).
#[async_trait]
pub trait OracleBackend: Send + Sync {
    /// Send a prompt and return the raw completion
    async fn complete(&self, prompt: &str) -> Result<String, OracleError>;

    /// Backend name for logs
    fn name(&self) -> &str;
}
