//! Heuristic extraction of the caller's name and purpose from a final
//! transcript.
//!
//! Used opportunistically to pre-seed the turn context before the first
//! model invocation; when nothing matches, both fields stay unset and the
//! model works from the raw transcript alone.

use once_cell::sync::Lazy;
use regex::Regex;

static NAME_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?i)(?:hi|hello|hey),?\s*(?:this is|it's|i'm|my name is)\s+([A-Z][a-z]+(?:\s+[A-Z][a-z]+)?)",
        r"(?i)(?:this is|it's|i'm)\s+([A-Z][a-z]+(?:\s+[A-Z][a-z]+)?)\s+(?:calling|here|from)",
        r"(?i)([A-Z][a-z]+(?:\s+[A-Z][a-z]+)?)\s+(?:here|calling|speaking)",
    ]
    .iter()
    .map(|pattern| Regex::new(pattern).expect("name pattern must compile"))
    .collect()
});

static PURPOSE_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?i)(?:calling|call)\s+(?:about|regarding|for)\s+(.+?)(?:\.|$)",
        r"(?i)(?:wanted to|want to|need to)\s+(?:talk|speak|discuss|ask)\s+(?:about|regarding)?\s*(.+?)(?:\.|$)",
        r"(?i)(?:following up|checking)\s+(?:on|about)\s+(.+?)(?:\.|$)",
        r"(?i)(?:question|inquiry)\s+(?:about|regarding)\s+(.+?)(?:\.|$)",
    ]
    .iter()
    .map(|pattern| Regex::new(pattern).expect("purpose pattern must compile"))
    .collect()
});

/// Fields extracted from one transcript. Either may be absent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallerInfo {
    pub name: Option<String>,
    pub purpose: Option<String>,
}

/// Scan the transcript against the introduction and purpose patterns,
/// first match wins per field.
pub fn extract_caller_info(transcript: &str) -> CallerInfo {
    let mut info = CallerInfo::default();

    for pattern in NAME_PATTERNS.iter() {
        if let Some(captures) = pattern.captures(transcript) {
            if let Some(name) = captures.get(1) {
                info.name = Some(name.as_str().trim().to_string());
                break;
            }
        }
    }

    for pattern in PURPOSE_PATTERNS.iter() {
        if let Some(captures) = pattern.captures(transcript) {
            if let Some(purpose) = captures.get(1) {
                info.purpose = Some(purpose.as_str().trim().to_string());
                break;
            }
        }
    }

    info
}
