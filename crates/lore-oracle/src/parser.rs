//! Parse and validate raw oracle output

use crate::error::OracleError;
use crate::types::{
    Adjudication, ConflictRequest, MergeVerdict, OracleRequest, OracleResponse, TagSuggestion,
};
use lore_domain::RuleId;
use serde_json::{Map, Value};

/// Confidence assumed when a tag suggestion omits it
const DEFAULT_TAG_CONFIDENCE: f64 = 0.5;

/// Extract a JSON object from a response, handling markdown code blocks
///
/// # Examples
///
/// ```
/// use lore_oracle::extract_json;
///
/// let raw = "```json\n{\"tags\": []}\n```";
/// assert_eq!(extract_json(raw).unwrap(), "{\"tags\": []}");
/// ```
pub fn extract_json(response: &str) -> Result<String, OracleError> {
    let trimmed = response.trim();

    let body = if trimmed.starts_with("```") {
        let lines: Vec<&str> = trimmed.lines().collect();
        if lines.len() < 2 {
            return Err(OracleError::MalformedResponse("Empty code block".to_string()));
        }
        // Skip the opening fence and a closing fence if present
        let end = if lines[lines.len() - 1].trim_start().starts_with("```") {
            lines.len() - 1
        } else {
            lines.len()
        };
        lines[1..end].join("\n")
    } else {
        trimmed.to_string()
    };

    let body = body.trim();
    if body.starts_with('{') {
        return Ok(body.to_string());
    }

    // Prose around the object: take the outermost braces
    match (body.find('{'), body.rfind('}')) {
        (Some(start), Some(end)) if start < end => Ok(body[start..=end].to_string()),
        _ => Err(OracleError::MalformedResponse(
            "No JSON object in response".to_string(),
        )),
    }
}

/// Parse a raw response according to the request kind
pub(crate) fn parse_response(
    request: &OracleRequest,
    raw: &str,
) -> Result<OracleResponse, OracleError> {
    let json: Value = serde_json::from_str(&extract_json(raw)?)?;
    let obj = json
        .as_object()
        .ok_or_else(|| OracleError::MalformedResponse("Expected JSON object".to_string()))?;

    match request {
        OracleRequest::TagSuggestion(_) => parse_tag_suggestion(obj).map(OracleResponse::Tags),
        OracleRequest::ConflictAdjudication(r) => {
            parse_adjudication(obj, r).map(OracleResponse::Adjudication)
        }
        OracleRequest::MergeReview(_) => parse_merge_verdict(obj).map(OracleResponse::Merge),
    }
}

fn malformed(msg: impl Into<String>) -> OracleError {
    OracleError::MalformedResponse(msg.into())
}

/// Read an optional score; present values must be numbers in [0, 1]
fn score(obj: &Map<String, Value>, key: &str) -> Result<Option<f64>, OracleError> {
    match obj.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(v) => {
            let value = v
                .as_f64()
                .ok_or_else(|| malformed(format!("'{}' is not a number", key)))?;
            if !(0.0..=1.0).contains(&value) {
                return Err(malformed(format!("'{}' out of range: {}", key, value)));
            }
            Ok(Some(value))
        }
    }
}

fn rationale(obj: &Map<String, Value>) -> String {
    obj.get("rationale")
        .or_else(|| obj.get("reasoning"))
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn parse_tag_suggestion(obj: &Map<String, Value>) -> Result<TagSuggestion, OracleError> {
    let tags = obj
        .get("tags")
        .and_then(Value::as_array)
        .ok_or_else(|| malformed("Missing or invalid 'tags'"))?
        .iter()
        .map(|t| {
            t.as_str()
                .map(str::to_string)
                .ok_or_else(|| malformed("'tags' must contain only strings"))
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(TagSuggestion {
        tags,
        confidence: score(obj, "confidence")?.unwrap_or(DEFAULT_TAG_CONFIDENCE),
        coherence: score(obj, "coherence")?,
        rationale: rationale(obj),
    })
}

fn parse_adjudication(
    obj: &Map<String, Value>,
    request: &ConflictRequest,
) -> Result<Adjudication, OracleError> {
    let keep = obj
        .get("keep")
        .and_then(Value::as_str)
        .ok_or_else(|| malformed("Missing or invalid 'keep'"))?;
    let keep = RuleId::parse(keep).map_err(malformed)?;
    if !request.candidates().contains(&keep) {
        return Err(malformed(format!("'keep' names a rule outside the pair: {}", keep)));
    }

    let confidence =
        score(obj, "confidence")?.ok_or_else(|| malformed("Missing 'confidence'"))?;

    Ok(Adjudication {
        keep,
        confidence,
        rationale: rationale(obj),
    })
}

fn parse_merge_verdict(obj: &Map<String, Value>) -> Result<MergeVerdict, OracleError> {
    let equivalent = obj
        .get("equivalent")
        .and_then(Value::as_bool)
        .ok_or_else(|| malformed("Missing or invalid 'equivalent'"))?;
    let confidence =
        score(obj, "confidence")?.ok_or_else(|| malformed("Missing 'confidence'"))?;

    Ok(MergeVerdict {
        equivalent,
        confidence,
        rationale: rationale(obj),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{RuleBrief, TagRequest};
    use lore_domain::RuleType;

    fn tag_request() -> OracleRequest {
        OracleRequest::TagSuggestion(TagRequest::new(RuleId::new(RuleType::Decision, 1), "t", "api"))
    }

    fn conflict_request() -> OracleRequest {
        let brief = |seq| RuleBrief {
            id: RuleId::new(RuleType::Decision, seq),
            text: String::new(),
            domain: "api".to_string(),
            tags: Vec::new(),
            salience: 0.5,
        };
        OracleRequest::ConflictAdjudication(ConflictRequest {
            first: brief(1),
            second: brief(2),
            evidence: Vec::new(),
        })
    }

    fn tags(raw: &str) -> Result<TagSuggestion, OracleError> {
        match parse_response(&tag_request(), raw)? {
            OracleResponse::Tags(s) => Ok(s),
            other => panic!("unexpected response {:?}", other),
        }
    }

    #[test]
    fn test_extract_json_variants() {
        assert_eq!(extract_json("  {\"a\": 1}  ").unwrap(), "{\"a\": 1}");
        assert_eq!(extract_json("```\n{\"a\": 1}\n```").unwrap(), "{\"a\": 1}");
        assert_eq!(extract_json("Sure! {\"a\": 1} Hope that helps.").unwrap(), "{\"a\": 1}");
        assert!(extract_json("no json here").is_err());
        assert!(extract_json("```").is_err());
    }

    #[test]
    fn test_parse_full_suggestion() {
        let s = tags(r#"{"tags": ["a", "b"], "confidence": 0.7, "coherence": 0.3, "rationale": "fits"}"#).unwrap();
        assert_eq!(s.tags, vec!["a", "b"]);
        assert_eq!(s.confidence, 0.7);
        assert_eq!(s.coherence, Some(0.3));
        assert_eq!(s.rationale, "fits");
    }

    #[test]
    fn test_missing_confidence_defaults() {
        let s = tags(r#"{"tags": ["a"], "reasoning": "r"}"#).unwrap();
        assert_eq!(s.confidence, 0.5);
        assert_eq!(s.coherence, None);
        assert_eq!(s.rationale, "r");
    }

    #[test]
    fn test_malformed_suggestions() {
        assert!(tags(r#"{"tags": "a"}"#).unwrap_err().is_malformed());
        assert!(tags(r#"{"tags": [1]}"#).unwrap_err().is_malformed());
        assert!(tags(r#"{"confidence": 0.9}"#).unwrap_err().is_malformed());
        assert!(tags(r#"{"tags": [], "confidence": 1.2}"#).unwrap_err().is_malformed());
        assert!(tags(r#"{"tags": [], "coherence": -0.1}"#).unwrap_err().is_malformed());
        assert!(tags(r#"{"tags": [], "confidence": "high"}"#).unwrap_err().is_malformed());
        assert!(tags(r#"["a"]"#).unwrap_err().is_malformed());
        assert!(tags("{not json}").unwrap_err().is_malformed());
    }

    #[test]
    fn test_adjudication_must_name_pair_member() {
        let ok = parse_response(&conflict_request(), r#"{"keep": "decision-2", "confidence": 0.85}"#).unwrap();
        assert_eq!(
            ok,
            OracleResponse::Adjudication(Adjudication {
                keep: RuleId::new(RuleType::Decision, 2),
                confidence: 0.85,
                rationale: String::new(),
            })
        );

        let outside = parse_response(&conflict_request(), r#"{"keep": "decision-9", "confidence": 0.9}"#);
        assert!(outside.unwrap_err().is_malformed());

        let no_confidence = parse_response(&conflict_request(), r#"{"keep": "decision-1"}"#);
        assert!(no_confidence.unwrap_err().is_malformed());
    }

    #[test]
    fn test_merge_verdict() {
        let request = OracleRequest::MergeReview(crate::types::MergeRequest {
            first: RuleBrief {
                id: RuleId::new(RuleType::Pattern, 1),
                text: String::new(),
                domain: "api".to_string(),
                tags: Vec::new(),
                salience: 0.5,
            },
            second: RuleBrief {
                id: RuleId::new(RuleType::Pattern, 2),
                text: String::new(),
                domain: "api".to_string(),
                tags: Vec::new(),
                salience: 0.5,
            },
            similarity: 0.6,
        });
        let verdict = parse_response(&request, r#"{"equivalent": true, "confidence": 0.9}"#).unwrap();
        assert!(matches!(verdict, OracleResponse::Merge(MergeVerdict { equivalent: true, .. })));
        assert!(parse_response(&request, r#"{"equivalent": "yes", "confidence": 0.9}"#).is_err());
    }
}
