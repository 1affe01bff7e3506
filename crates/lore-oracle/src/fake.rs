//! Deterministic fakes for tests and offline runs
//!
//! - [`MockBackend`] fakes the raw text backend, so the gateway's timeout
//!   and parsing are exercised for real.
//! - [`ScriptedOracle`] fakes the capability traits directly with
//!   per-subject scripts.

use crate::backend::OracleBackend;
use crate::error::OracleError;
use crate::gateway::{AdjudicateConflict, ProposeTags, ReviewMerge};
use crate::types::{
    pair_subject, Adjudication, ConflictRequest, MergeRequest, MergeVerdict, RequestKind,
    TagRequest, TagSuggestion,
};
use async_trait::async_trait;
use lore_domain::RuleId;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Mock text backend
///
/// Returns a fixed response unless the prompt contains a registered needle.
/// Clones share responses and the call counter.
///
/// # Examples
///
/// ```
/// use lore_oracle::{MockBackend, OracleBackend};
///
/// let mut backend = MockBackend::new("{}");
/// backend.add_response("decision-7", r#"{"tags": ["x"]}"#);
/// # tokio_test::block_on(async {
/// assert_eq!(backend.complete("rule decision-7").await.unwrap(), r#"{"tags": ["x"]}"#);
/// assert_eq!(backend.complete("anything else").await.unwrap(), "{}");
/// # });
/// ```
#[derive(Debug, Clone)]
pub struct MockBackend {
    default_response: String,
    responses: Arc<Mutex<Vec<(String, Option<String>)>>>,
    call_count: Arc<Mutex<usize>>,
    delay: Option<Duration>,
}

impl MockBackend {
    /// Create a backend with a fixed response for all prompts
    pub fn new(response: impl Into<String>) -> Self {
        Self {
            default_response: response.into(),
            responses: Arc::new(Mutex::new(Vec::new())),
            call_count: Arc::new(Mutex::new(0)),
            delay: None,
        }
    }

    /// Delay every response (to exercise timeouts)
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Respond with `response` when the prompt contains `needle`
    pub fn add_response(&mut self, needle: impl Into<String>, response: impl Into<String>) {
        lock(&self.responses).push((needle.into(), Some(response.into())));
    }

    /// Fail with a transport error when the prompt contains `needle`
    pub fn add_error(&mut self, needle: impl Into<String>) {
        lock(&self.responses).push((needle.into(), None));
    }

    /// Number of completed calls
    pub fn call_count(&self) -> usize {
        *lock(&self.call_count)
    }
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new("{}")
    }
}

#[async_trait]
impl OracleBackend for MockBackend {
    async fn complete(&self, prompt: &str) -> Result<String, OracleError> {
        *lock(&self.call_count) += 1;

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let matched = lock(&self.responses)
            .iter()
            .find(|(needle, _)| prompt.contains(needle.as_str()))
            .map(|(_, response)| response.clone());

        match matched {
            Some(Some(response)) => Ok(response),
            Some(None) => Err(OracleError::Transport("Mock error".to_string())),
            None => Ok(self.default_response.clone()),
        }
    }

    fn name(&self) -> &str {
        "mock"
    }
}

/// One scripted oracle outcome
#[derive(Debug, Clone, PartialEq)]
pub enum Scripted<T> {
    /// Return this value
    Reply(T),
    /// Fail with a timeout
    Timeout,
    /// Fail with a malformed response
    Malformed,
}

/// Per-subject queue; the last outcome repeats once the others are used
type Script<T> = HashMap<String, VecDeque<Scripted<T>>>;

#[derive(Debug, Default)]
struct ScriptState {
    tags: Script<TagSuggestion>,
    adjudications: Script<Adjudication>,
    merges: Script<MergeVerdict>,
    default_tags: Option<Scripted<TagSuggestion>>,
    calls: Vec<(RequestKind, String)>,
    in_flight: usize,
    max_in_flight: usize,
}

fn next_outcome<T: Clone>(script: &mut Script<T>, subject: &str) -> Option<Scripted<T>> {
    let queue = script.get_mut(subject)?;
    if queue.len() > 1 {
        queue.pop_front()
    } else {
        queue.front().cloned()
    }
}

fn check_score(name: &str, value: f64) -> Result<(), OracleError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(OracleError::MalformedResponse(format!(
            "'{}' out of range: {}",
            name, value
        )))
    }
}

/// Deterministic fake implementing every capability trait
///
/// Outcomes are scripted per subject: the rule id for tag suggestions, the
/// sorted id pair for adjudications and merge reviews. Unscripted subjects
/// get the default tag outcome if one is set, otherwise a malformed
/// response. Scores are range-checked like the real gateway does.
///
/// Clones share scripts and the call log.
#[derive(Debug, Clone, Default)]
pub struct ScriptedOracle {
    state: Arc<Mutex<ScriptState>>,
    delay: Option<Duration>,
}

impl ScriptedOracle {
    /// Create an oracle with no scripts
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every call (to observe concurrency)
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Outcome for tag requests whose subject has no script
    pub fn with_default_tags(self, outcome: Scripted<TagSuggestion>) -> Self {
        lock(&self.state).default_tags = Some(outcome);
        self
    }

    /// Script tag suggestions for a rule, in call order
    pub fn script_tags<I>(&self, rule: &RuleId, outcomes: I)
    where
        I: IntoIterator<Item = Scripted<TagSuggestion>>,
    {
        lock(&self.state)
            .tags
            .insert(rule.to_string(), outcomes.into_iter().collect());
    }

    /// Script the adjudication of a pair
    pub fn script_adjudication(&self, a: &RuleId, b: &RuleId, outcome: Scripted<Adjudication>) {
        lock(&self.state)
            .adjudications
            .entry(pair_subject(a, b))
            .or_default()
            .push_back(outcome);
    }

    /// Script the merge review of a pair
    pub fn script_merge(&self, a: &RuleId, b: &RuleId, outcome: Scripted<MergeVerdict>) {
        lock(&self.state)
            .merges
            .entry(pair_subject(a, b))
            .or_default()
            .push_back(outcome);
    }

    /// Total calls across all kinds
    pub fn call_count(&self) -> usize {
        lock(&self.state).calls.len()
    }

    /// Calls of one kind
    pub fn calls_of(&self, kind: RequestKind) -> usize {
        lock(&self.state).calls.iter().filter(|(k, _)| *k == kind).count()
    }

    /// Calls for one subject (rule id or pair key)
    pub fn calls_for(&self, subject: &str) -> usize {
        lock(&self.state).calls.iter().filter(|(_, s)| s == subject).count()
    }

    /// Highest number of calls observed in flight at once
    pub fn max_in_flight(&self) -> usize {
        lock(&self.state).max_in_flight
    }

    async fn enter(&self, kind: RequestKind, subject: &str) {
        {
            let mut state = lock(&self.state);
            state.calls.push((kind, subject.to_string()));
            state.in_flight += 1;
            state.max_in_flight = state.max_in_flight.max(state.in_flight);
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        lock(&self.state).in_flight -= 1;
    }

    fn resolve<T>(outcome: Option<Scripted<T>>, subject: &str) -> Result<T, OracleError> {
        match outcome {
            Some(Scripted::Reply(value)) => Ok(value),
            Some(Scripted::Timeout) => Err(OracleError::Timeout {
                subject: subject.to_string(),
                secs: 0,
            }),
            Some(Scripted::Malformed) => Err(OracleError::MalformedResponse(
                "Scripted malformed response".to_string(),
            )),
            None => Err(OracleError::MalformedResponse(format!(
                "No script for {}",
                subject
            ))),
        }
    }
}

#[async_trait]
impl ProposeTags for ScriptedOracle {
    async fn propose_tags(&self, request: &TagRequest) -> Result<TagSuggestion, OracleError> {
        let subject = request.rule_id.to_string();
        self.enter(RequestKind::TagSuggestion, &subject).await;

        let outcome = {
            let mut state = lock(&self.state);
            let default = state.default_tags.clone();
            next_outcome(&mut state.tags, &subject).or(default)
        };
        let suggestion = Self::resolve(outcome, &subject)?;
        check_score("confidence", suggestion.confidence)?;
        if let Some(coherence) = suggestion.coherence {
            check_score("coherence", coherence)?;
        }
        Ok(suggestion)
    }
}

#[async_trait]
impl AdjudicateConflict for ScriptedOracle {
    async fn adjudicate(&self, request: &ConflictRequest) -> Result<Adjudication, OracleError> {
        let subject = pair_subject(&request.first.id, &request.second.id);
        self.enter(RequestKind::ConflictAdjudication, &subject).await;

        let outcome = next_outcome(&mut lock(&self.state).adjudications, &subject);
        let adjudication = Self::resolve(outcome, &subject)?;
        check_score("confidence", adjudication.confidence)?;
        if !request.candidates().contains(&adjudication.keep) {
            return Err(OracleError::MalformedResponse(format!(
                "'keep' names a rule outside the pair: {}",
                adjudication.keep
            )));
        }
        Ok(adjudication)
    }
}

#[async_trait]
impl ReviewMerge for ScriptedOracle {
    async fn review_merge(&self, request: &MergeRequest) -> Result<MergeVerdict, OracleError> {
        let subject = pair_subject(&request.first.id, &request.second.id);
        self.enter(RequestKind::MergeReview, &subject).await;

        let outcome = next_outcome(&mut lock(&self.state).merges, &subject);
        let verdict = Self::resolve(outcome, &subject)?;
        check_score("confidence", verdict.confidence)?;
        Ok(verdict)
    }
}
