//! Ollama backend
//!
//! Sends prompts to a local Ollama instance in JSON mode.
//!
//! # Examples
//!
//! ```no_run
//! use lore_oracle::{GatewayConfig, OllamaBackend, OracleGateway};
//!
//! let config = GatewayConfig::default();
//! let backend = OllamaBackend::new(&config.endpoint, &config.model).unwrap();
//! let gateway = OracleGateway::new(backend, config);
//! ```

use crate::backend::OracleBackend;
use crate::error::OracleError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Default Ollama API endpoint
pub const DEFAULT_ENDPOINT: &str = "http://localhost:11434";

/// Default model
pub const DEFAULT_MODEL: &str = "llama3";

/// Ollama API backend
///
/// Performs a single attempt per call. Deadlines are enforced by the
/// gateway, not the HTTP client.
#[derive(Debug, Clone)]
pub struct OllamaBackend {
    endpoint: String,
    model: String,
    client: reqwest::Client,
}

/// Request body for the generate API
#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    format: &'a str,
}

/// Response from the generate API
#[derive(Deserialize)]
struct GenerateResponse {
    response: String,
}

impl OllamaBackend {
    /// Create a backend for an endpoint and model
    pub fn new(endpoint: impl Into<String>, model: impl Into<String>) -> Result<Self, OracleError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| OracleError::Transport(format!("Failed to build client: {}", e)))?;

        Ok(Self {
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            model: model.into(),
            client,
        })
    }

    /// Configured endpoint
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Configured model
    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl OracleBackend for OllamaBackend {
    async fn complete(&self, prompt: &str) -> Result<String, OracleError> {
        let url = format!("{}/api/generate", self.endpoint);
        let body = GenerateRequest {
            model: &self.model,
            prompt,
            stream: false,
            format: "json",
        };

        debug!("POST {} (model {})", url, self.model);
        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| OracleError::Transport(format!("Request failed: {}", e)))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(OracleError::Transport(format!(
                "Model not available: {}",
                self.model
            )));
        }
        if !status.is_success() {
            let text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(OracleError::Transport(format!("HTTP {}: {}", status, text)));
        }

        let parsed: GenerateResponse = response.json().await.map_err(|e| {
            OracleError::MalformedResponse(format!("Failed to parse response: {}", e))
        })?;
        Ok(parsed.response)
    }

    fn name(&self) -> &str {
        "ollama"
    }
}
