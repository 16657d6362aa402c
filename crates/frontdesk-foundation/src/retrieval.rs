//! Adaptive retrieval over contacts and emails.
//!
//! Each axis is triggered only when the corresponding caller-information
//! field is present: a name drives the contact search, a purpose drives
//! the email search, both drive both in parallel. A failing axis degrades
//! to empty results; it never aborts the turn.

use std::sync::Arc;
use tracing::warn;

use frontdesk_kernel::embedding::{EmbeddingClient, EmbeddingError};
use frontdesk_kernel::error::CallFailure;
use frontdesk_kernel::retrieval::{
    dedup_hits, sort_hits, CallerContext, Retrieved, SearchHit, MAX_CONTACT_HITS, MAX_EMAIL_HITS,
};
use frontdesk_kernel::store::DocumentStore;

/// Retrieval over the document store, grounded by the embedding client.
pub struct RetrievalEngine {
    store: Arc<dyn DocumentStore>,
    embeddings: Arc<dyn EmbeddingClient>,
}

impl RetrievalEngine {
    pub fn new(store: Arc<dyn DocumentStore>, embeddings: Arc<dyn EmbeddingClient>) -> Self {
        Self { store, embeddings }
    }

    /// The embedding client this engine grounds email search with.
    pub fn embeddings(&self) -> Arc<dyn EmbeddingClient> {
        self.embeddings.clone()
    }

    /// Name-based contact lookup. No embedding involved.
    pub async fn search_contacts(&self, name: &str) -> Retrieved {
        if name.trim().is_empty() {
            return Retrieved::Hits(Vec::new());
        }

        match self.store.name_search_contacts(name, MAX_CONTACT_HITS).await {
            Ok(hits) => Retrieved::Hits(cap(hits, MAX_CONTACT_HITS)),
            Err(err) => Retrieved::Degraded {
                reason: format!("contact search failed: {}", err),
            },
        }
    }

    /// Vector-similarity email lookup for the caller's stated purpose.
    pub async fn search_emails(&self, purpose: &str) -> Retrieved {
        let query = match self.embeddings.embed(purpose).await {
            Ok(vector) => vector,
            Err(EmbeddingError::InvalidInput) => return Retrieved::Hits(Vec::new()),
            Err(err) => {
                return Retrieved::Degraded {
                    reason: format!("embedding failed: {}", err),
                }
            }
        };

        match self.store.vector_search_emails(&query, MAX_EMAIL_HITS).await {
            Ok(hits) => Retrieved::Hits(cap(hits, MAX_EMAIL_HITS)),
            Err(err) => Retrieved::Degraded {
                reason: format!("email search failed: {}", err),
            },
        }
    }

    /// Build the turn context, querying only the axes that are present.
    /// Both axes run in parallel when both are present.
    pub async fn build_context(
        &self,
        identified_name: Option<&str>,
        inferred_purpose: Option<&str>,
        transcript_tail: Vec<String>,
    ) -> CallerContext {
        let contacts_fut = async {
            match identified_name {
                Some(name) if !name.trim().is_empty() => Some(self.search_contacts(name).await),
                _ => None,
            }
        };
        let emails_fut = async {
            match inferred_purpose {
                Some(purpose) if !purpose.trim().is_empty() => {
                    Some(self.search_emails(purpose).await)
                }
                _ => None,
            }
        };

        let (contacts, emails) = tokio::join!(contacts_fut, emails_fut);

        let contacts = contacts.map(|r| drain_axis("contacts", r)).unwrap_or_default();
        let emails = emails.map(|r| drain_axis("emails", r)).unwrap_or_default();

        CallerContext {
            identified_name: identified_name.map(str::to_string),
            inferred_purpose: inferred_purpose.map(str::to_string),
            contacts,
            emails,
            transcript_tail,
        }
    }
}

/// Unwrap one retrieval axis, logging degradation. The reason is read
/// here for logging only; callers see an empty axis either way.
fn drain_axis(axis: &'static str, retrieved: Retrieved) -> Vec<SearchHit> {
    if let Retrieved::Degraded { reason } = &retrieved {
        let failure = CallFailure::RetrievalUnavailable(reason.clone());
        warn!(axis, error = %failure, "axis degraded to empty");
    }
    retrieved.into_hits()
}

fn cap(hits: Vec<SearchHit>, limit: usize) -> Vec<SearchHit> {
    let mut hits = dedup_hits(hits);
    sort_hits(&mut hits);
    hits.truncate(limit);
    hits
}
