//! Retrieval result types and the per-turn context object.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Cap on contact hits carried into a reasoning turn.
pub const MAX_CONTACT_HITS: usize = 3;

/// Cap on email hits carried into a reasoning turn.
pub const MAX_EMAIL_HITS: usize = 3;

/// One retrieval match: content plus source metadata and a similarity
/// score in `[0, 1]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    /// Stable identifier of the source record.
    pub id: String,
    pub content: String,
    pub score: f32,
    pub metadata: HashMap<String, String>,
}

impl SearchHit {
    pub fn new(id: impl Into<String>, content: impl Into<String>, score: f32) -> Self {
        Self {
            id: id.into(),
            content: content.into(),
            score,
            metadata: HashMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// Sort strictly by descending score; ties break by ascending source id so
/// result order is total and reproducible.
pub fn sort_hits(hits: &mut [SearchHit]) {
    hits.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.id.cmp(&b.id))
    });
}

/// Drop later duplicates of the same source id, preserving order.
pub fn dedup_hits(hits: Vec<SearchHit>) -> Vec<SearchHit> {
    let mut seen = std::collections::HashSet::new();
    hits.into_iter()
        .filter(|hit| seen.insert(hit.id.clone()))
        .collect()
}

/// Outcome of one retrieval axis.
///
/// Provider failures degrade to an empty axis instead of aborting the
/// turn; the reason exists for logging only, never for control flow.
#[derive(Debug, Clone)]
pub enum Retrieved {
    Hits(Vec<SearchHit>),
    Degraded { reason: String },
}

impl Retrieved {
    pub fn hits(&self) -> &[SearchHit] {
        match self {
            Retrieved::Hits(hits) => hits,
            Retrieved::Degraded { .. } => &[],
        }
    }

    pub fn into_hits(self) -> Vec<SearchHit> {
        match self {
            Retrieved::Hits(hits) => hits,
            Retrieved::Degraded { .. } => Vec::new(),
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, Retrieved::Degraded { .. })
    }
}

/// Compact, turn-local grounding context. Immutable once built for the
/// turn.
#[derive(Debug, Clone, Default)]
pub struct CallerContext {
    pub identified_name: Option<String>,
    pub inferred_purpose: Option<String>,
    pub contacts: Vec<SearchHit>,
    pub emails: Vec<SearchHit>,
    pub transcript_tail: Vec<String>,
}

impl CallerContext {
    pub fn is_empty(&self) -> bool {
        self.identified_name.is_none()
            && self.inferred_purpose.is_none()
            && self.contacts.is_empty()
            && self.emails.is_empty()
    }
}
