//! Chunk refinement
//!
//! A refiner maps one article chunk to zero or more speech-ready segment
//! strings via a remote text-cleanup backend. Calls are stateless and
//! carry no internal retry; failures are handled at the pipeline level.

mod http;

pub use http::{HttpRefiner, RefinerOptions};

use async_trait::async_trait;
use thiserror::Error;

/// Per-chunk refinement error. Recovered at the pipeline level; a single
/// failed chunk never aborts a run.
#[derive(Error, Debug, Clone)]
pub enum RefineError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("backend returned status {0}")]
    Status(u16),

    #[error("unparseable refiner response: {0}")]
    Parse(String),
}

/// Remote text-cleanup call mapping one chunk to segment strings
#[async_trait]
pub trait Refiner: Send + Sync {
    /// Refine one chunk into zero or more trimmed, non-empty segments
    async fn refine(&self, chunk: &str) -> Result<Vec<String>, RefineError>;

    /// Cheap reachability probe, run once before a pipeline dispatches work
    async fn preflight(&self) -> Result<(), RefineError>;
}

/// Parse a refiner completion into segments.
///
/// The content must be a JSON array of strings, optionally wrapped in a
/// triple-backtick fence. Entries are trimmed; empties are dropped. An
/// empty array is a valid zero-segment result (e.g. a heading-only
/// chunk).
pub fn parse_segment_array(content: &str) -> Result<Vec<String>, RefineError> {
    let stripped = strip_code_fence(content);
    let parsed: Vec<String> =
        serde_json::from_str(stripped).map_err(|e| RefineError::Parse(e.to_string()))?;
    Ok(parsed
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect())
}

/// Strip an optional ```-fence, regardless of its language tag
fn strip_code_fence(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Everything up to the first newline is the language tag, if any.
    let rest = match rest.find('\n') {
        Some(i) => &rest[i + 1..],
        None => rest.trim_start_matches(|c: char| c.is_ascii_alphabetic()),
    };
    let rest = rest.strip_suffix("```").unwrap_or(rest);
    rest.trim()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_array() {
        let segments = parse_segment_array(r#"["One.", "Two."]"#).unwrap();
        assert_eq!(segments, vec!["One.", "Two."]);
    }

    #[test]
    fn test_parse_fenced_array() {
        let content = "```json\n[\"First line.\", \"Second line.\"]\n```";
        let segments = parse_segment_array(content).unwrap();
        assert_eq!(segments, vec!["First line.", "Second line."]);
    }

    #[test]
    fn test_parse_fence_with_other_language_tags() {
        let upper = "```JSON\n[\"Line.\"]\n```";
        assert_eq!(parse_segment_array(upper).unwrap(), vec!["Line."]);
        let js = "```javascript\n[\"Other.\"]\n```";
        assert_eq!(parse_segment_array(js).unwrap(), vec!["Other."]);
    }

    #[test]
    fn test_parse_bare_fence() {
        let content = "```\n[\"Only.\"]\n```";
        assert_eq!(parse_segment_array(content).unwrap(), vec!["Only."]);
    }

    #[test]
    fn test_empty_array_is_zero_segments() {
        assert!(parse_segment_array("[]").unwrap().is_empty());
    }

    #[test]
    fn test_entries_trimmed_and_empties_dropped() {
        let segments = parse_segment_array(r#"["  padded  ", "", "   "]"#).unwrap();
        assert_eq!(segments, vec!["padded"]);
    }

    #[test]
    fn test_non_array_rejected() {
        assert!(parse_segment_array("not json").is_err());
        assert!(parse_segment_array(r#"{"segments": []}"#).is_err());
        assert!(parse_segment_array("[1, 2]").is_err());
    }
}
