//! The gateway and the capability traits it implements

use crate::backend::OracleBackend;
use crate::config::GatewayConfig;
use crate::error::OracleError;
use crate::parser::parse_response;
use crate::prompt::build_prompt;
use crate::types::{
    Adjudication, ConflictRequest, MergeRequest, MergeVerdict, OracleRequest, OracleResponse,
    TagRequest, TagSuggestion,
};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::time::timeout;
use tracing::debug;

/// Capability: suggest tags for a rule
#[async_trait]
pub trait ProposeTags: Send + Sync {
    /// Ask for a tag suggestion
    async fn propose_tags(&self, request: &TagRequest) -> Result<TagSuggestion, OracleError>;
}

/// Capability: adjudicate a contradiction
#[async_trait]
pub trait AdjudicateConflict: Send + Sync {
    /// Ask which rule of a pair to keep
    async fn adjudicate(&self, request: &ConflictRequest) -> Result<Adjudication, OracleError>;
}

/// Capability: confirm a borderline merge
#[async_trait]
pub trait ReviewMerge: Send + Sync {
    /// Ask whether two rules are equivalent
    async fn review_merge(&self, request: &MergeRequest) -> Result<MergeVerdict, OracleError>;
}

/// Every oracle capability at once
pub trait Oracle: ProposeTags + AdjudicateConflict + ReviewMerge {}

impl<T: ProposeTags + AdjudicateConflict + ReviewMerge> Oracle for T {}

/// Bounded-latency wrapper around an [`OracleBackend`]
///
/// Enforces the configured timeout and validates every response against
/// the request kind's schema. Never retries.
pub struct OracleGateway<B: OracleBackend> {
    backend: Arc<B>,
    config: GatewayConfig,
}

impl<B: OracleBackend> OracleGateway<B> {
    /// Create a gateway over a backend
    pub fn new(backend: B, config: GatewayConfig) -> Self {
        Self {
            backend: Arc::new(backend),
            config,
        }
    }

    /// Gateway configuration
    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Send one request and validate the response
    pub async fn propose(&self, request: &OracleRequest) -> Result<OracleResponse, OracleError> {
        let subject = request.subject();
        let prompt = build_prompt(request);

        debug!(
            "Oracle {} request for {} via {} ({} chars)",
            request.kind(),
            subject,
            self.backend.name(),
            prompt.len()
        );

        let raw = timeout(self.config.timeout(), self.backend.complete(&prompt))
            .await
            .map_err(|_| OracleError::Timeout {
                subject: subject.clone(),
                secs: self.config.timeout_secs,
            })??;

        debug!("Oracle response for {}: {} chars", subject, raw.len());

        parse_response(request, &raw)
    }
}

fn unexpected(kind: &str) -> OracleError {
    OracleError::MalformedResponse(format!("Response does not answer a {} request", kind))
}

#[async_trait]
impl<B: OracleBackend> ProposeTags for OracleGateway<B> {
    async fn propose_tags(&self, request: &TagRequest) -> Result<TagSuggestion, OracleError> {
        match self.propose(&OracleRequest::TagSuggestion(request.clone())).await? {
            OracleResponse::Tags(suggestion) => Ok(suggestion),
            _ => Err(unexpected("tag_suggestion")),
        }
    }
}

#[async_trait]
impl<B: OracleBackend> AdjudicateConflict for OracleGateway<B> {
    async fn adjudicate(&self, request: &ConflictRequest) -> Result<Adjudication, OracleError> {
        match self
            .propose(&OracleRequest::ConflictAdjudication(request.clone()))
            .await?
        {
            OracleResponse::Adjudication(adjudication) => Ok(adjudication),
            _ => Err(unexpected("conflict_adjudication")),
        }
    }
}

#[async_trait]
impl<B: OracleBackend> ReviewMerge for OracleGateway<B> {
    async fn review_merge(&self, request: &MergeRequest) -> Result<MergeVerdict, OracleError> {
        match self.propose(&OracleRequest::MergeReview(request.clone())).await? {
            OracleResponse::Merge(verdict) => Ok(verdict),
            _ => Err(unexpected("merge_review")),
        }
    }
}
