//! Lore Oracle Gateway
//!
//! Bounded-latency request/response wrapper around the external reasoning
//! oracle. The oracle is untrusted: every response passes through timeout
//! enforcement and per-kind schema validation before a caller sees it.
//!
//! # Architecture
//!
//! ```text
//! caller → capability trait → OracleGateway → prompt → OracleBackend
//!                                   ↑                        │
//!                                   └── timeout + parser ←───┘
//! ```
//!
//! Callers depend on the capability traits ([`ProposeTags`],
//! [`AdjudicateConflict`], [`ReviewMerge`]) and never on a concrete
//! backend, so tests inject [`ScriptedOracle`].
//!
//! # Failure semantics
//!
//! [`OracleError::Timeout`] and [`OracleError::MalformedResponse`] mean
//! "no information": callers leave the subject unchanged. The gateway never
//! retries; retries cost budget and are a caller decision.
//!
//! # Examples
//!
//! ```
//! use lore_domain::{RuleId, RuleType};
//! use lore_oracle::{MockBackend, OracleGateway, GatewayConfig, ProposeTags, TagRequest};
//!
//! # tokio_test::block_on(async {
//! let backend = MockBackend::new(r#"{"tags": ["pagination"], "confidence": 0.9}"#);
//! let gateway = OracleGateway::new(backend, GatewayConfig::default());
//!
//! let request = TagRequest::new(RuleId::new(RuleType::Decision, 1), "Use cursor pagination", "api");
//! let suggestion = gateway.propose_tags(&request).await.unwrap();
//! assert_eq!(suggestion.tags, vec!["pagination"]);
//! # });
//! ```

#![warn(missing_docs)]

mod backend;
mod config;
mod error;
mod fake;
mod gateway;
pub mod ollama;
mod parser;
mod prompt;
mod types;

pub use backend::OracleBackend;
pub use config::GatewayConfig;
pub use error::OracleError;
pub use fake::{MockBackend, Scripted, ScriptedOracle};
pub use gateway::{AdjudicateConflict, Oracle, OracleGateway, ProposeTags, ReviewMerge};
pub use ollama::OllamaBackend;
pub use parser::extract_json;
pub use prompt::{build_prompt, PROMPT_FORBIDDEN_LIMIT, PROMPT_MAPPING_LIMIT, PROMPT_TAG_LIMIT};
pub use types::{
    pair_subject, Adjudication, ConflictRequest, MergeRequest, MergeVerdict, OracleRequest,
    OracleResponse, RequestKind, RuleBrief, TagRequest, TagSuggestion,
};
