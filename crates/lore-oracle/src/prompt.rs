//! Prompt construction for each request kind

use crate::types::{ConflictRequest, MergeRequest, OracleRequest, RuleBrief, TagRequest};
use std::fmt::Write;

/// Tier-2 tags listed in a tag prompt
pub const PROMPT_TAG_LIMIT: usize = 10;

/// Synonym mappings listed in a tag prompt
pub const PROMPT_MAPPING_LIMIT: usize = 5;

/// Forbidden stopwords listed in a tag prompt
pub const PROMPT_FORBIDDEN_LIMIT: usize = 20;

const TAG_INSTRUCTIONS: &str = "You assign tier-2 tags to a curated engineering rule.
Prefer existing tags from the list below. Propose a new tag only when none fits;
new tags must be lowercase words joined by hyphens. Never use a forbidden word.";

const TAG_FORMAT: &str = r#"Respond with a single JSON object and nothing else:
{"tags": ["tag-one", "tag-two"], "confidence": 0.0-1.0, "coherence": 0.0-1.0, "rationale": "one sentence"}
"confidence" is how sure you are the tags describe the rule.
"coherence" is how well the tags fit the existing vocabulary of the domain."#;

const CONFLICT_INSTRUCTIONS: &str = "Two curated engineering rules appear to contradict each other.
Decide which one should be kept. The other will be archived.";

const CONFLICT_FORMAT: &str = r#"Respond with a single JSON object and nothing else:
{"keep": "<rule id>", "confidence": 0.0-1.0, "rationale": "one sentence"}"#;

const MERGE_INSTRUCTIONS: &str = "Two curated engineering rules look similar.
Decide whether they state the same thing and can be merged into one.";

const MERGE_FORMAT: &str = r#"Respond with a single JSON object and nothing else:
{"equivalent": true|false, "confidence": 0.0-1.0, "rationale": "one sentence"}"#;

/// Build the prompt text for a request
pub fn build_prompt(request: &OracleRequest) -> String {
    match request {
        OracleRequest::TagSuggestion(r) => tag_prompt(r),
        OracleRequest::ConflictAdjudication(r) => conflict_prompt(r),
        OracleRequest::MergeReview(r) => merge_prompt(r),
    }
}

fn tag_prompt(request: &TagRequest) -> String {
    let mut prompt = String::new();
    prompt.push_str(TAG_INSTRUCTIONS);
    prompt.push_str("\n\n");

    let _ = writeln!(prompt, "Domain: {}", request.domain);
    let _ = writeln!(prompt, "Vocabulary version: {}", request.vocabulary_version);

    if request.domain_tags.is_empty() {
        prompt.push_str("Existing tags: (none yet)\n");
    } else {
        let tags: Vec<&str> = request
            .domain_tags
            .iter()
            .take(PROMPT_TAG_LIMIT)
            .map(String::as_str)
            .collect();
        let _ = writeln!(prompt, "Existing tags: {}", tags.join(", "));
    }

    if !request.mappings.is_empty() {
        prompt.push_str("Synonyms (use the canonical form):\n");
        for (synonym, canonical) in request.mappings.iter().take(PROMPT_MAPPING_LIMIT) {
            let _ = writeln!(prompt, "- {} -> {}", synonym, canonical);
        }
    }

    if !request.forbidden.is_empty() {
        let forbidden: Vec<&str> = request
            .forbidden
            .iter()
            .take(PROMPT_FORBIDDEN_LIMIT)
            .map(String::as_str)
            .collect();
        let _ = writeln!(prompt, "Forbidden words: {}", forbidden.join(", "));
    }

    prompt.push_str("\nRule:\n---\n");
    prompt.push_str(&request.text);
    prompt.push_str("\n---\n\n");
    prompt.push_str(TAG_FORMAT);
    prompt
}

fn write_rule(prompt: &mut String, rule: &RuleBrief) {
    let _ = writeln!(
        prompt,
        "[{}] (domain: {}, tags: {}, salience: {:.2})\n{}\n",
        rule.id,
        rule.domain,
        if rule.tags.is_empty() { "-".to_string() } else { rule.tags.join(", ") },
        rule.salience,
        rule.text
    );
}

fn conflict_prompt(request: &ConflictRequest) -> String {
    let mut prompt = String::new();
    prompt.push_str(CONFLICT_INSTRUCTIONS);
    prompt.push_str("\n\n");
    write_rule(&mut prompt, &request.first);
    write_rule(&mut prompt, &request.second);
    if !request.evidence.is_empty() {
        prompt.push_str("Evidence:\n");
        for item in &request.evidence {
            let _ = writeln!(prompt, "- {}", item);
        }
        prompt.push('\n');
    }
    prompt.push_str(CONFLICT_FORMAT);
    prompt
}

fn merge_prompt(request: &MergeRequest) -> String {
    let mut prompt = String::new();
    prompt.push_str(MERGE_INSTRUCTIONS);
    prompt.push_str("\n\n");
    write_rule(&mut prompt, &request.first);
    write_rule(&mut prompt, &request.second);
    let _ = writeln!(prompt, "Lexical similarity: {:.2}\n", request.similarity);
    prompt.push_str(MERGE_FORMAT);
    prompt
}
