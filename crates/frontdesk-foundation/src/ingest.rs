//! Email and contact ingestion with embedding.
//!
//! Embeddings are computed exactly once per ingest, from the combined
//! subject and body; re-ingesting the same id overwrites the stored record
//! and recomputes. Bulk ingestion continues past individual failures and
//! reports them.

use std::sync::Arc;
use thiserror::Error;
use tracing::warn;

use frontdesk_kernel::embedding::{EmbeddingClient, EmbeddingError};
use frontdesk_kernel::store::{ContactRecord, DocumentStore, EmailRecord, StoreError};

#[derive(Debug, Error)]
pub enum IngestError {
    #[error(transparent)]
    Embedding(#[from] EmbeddingError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Result of a bulk ingest run.
#[derive(Debug, Default)]
pub struct IngestReport {
    pub imported: usize,
    pub total: usize,
    pub errors: Vec<String>,
}

/// Writes emails and contacts through the embedding pipeline into the
/// store.
pub struct DataIngestion {
    store: Arc<dyn DocumentStore>,
    embeddings: Arc<dyn EmbeddingClient>,
}

impl DataIngestion {
    pub fn new(store: Arc<dyn DocumentStore>, embeddings: Arc<dyn EmbeddingClient>) -> Self {
        Self { store, embeddings }
    }

    /// Embed (if not already embedded) and upsert one email.
    pub async fn ingest_email(&self, mut email: EmailRecord) -> Result<(), IngestError> {
        email.validate()?;
        if email.embedding.is_none() {
            email.embedding = Some(self.embeddings.embed(&email.embedding_text()).await?);
        }
        self.store.upsert_email(email).await?;
        Ok(())
    }

    /// Upsert one contact. Contacts carry no embedding.
    pub async fn ingest_contact(&self, contact: ContactRecord) -> Result<(), IngestError> {
        contact.validate()?;
        self.store.upsert_contact(contact).await?;
        Ok(())
    }

    /// Ingest a batch of emails, skipping records that fail and collecting
    /// their errors.
    pub async fn bulk_ingest_emails(&self, emails: Vec<EmailRecord>) -> IngestReport {
        let mut report = IngestReport {
            total: emails.len(),
            ..Default::default()
        };

        for email in emails {
            let id = email.id.clone();
            match self.ingest_email(email).await {
                Ok(()) => report.imported += 1,
                Err(err) => {
                    warn!(email_id = %id, error = %err, "skipping email during bulk ingest");
                    report.errors.push(format!("{}: {}", id, err));
                }
            }
        }

        report
    }

    /// Ingest a batch of contacts, collecting per-record failures.
    pub async fn bulk_ingest_contacts(&self, contacts: Vec<ContactRecord>) -> IngestReport {
        let mut report = IngestReport {
            total: contacts.len(),
            ..Default::default()
        };

        for contact in contacts {
            let id = contact.id.clone();
            match self.ingest_contact(contact).await {
                Ok(()) => report.imported += 1,
                Err(err) => {
                    warn!(contact_id = %id, error = %err, "skipping contact during bulk ingest");
                    report.errors.push(format!("{}: {}", id, err));
                }
            }
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Utc;
    use frontdesk_kernel::embedding::EMBEDDING_DIMENSIONS;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::store::memory::MemoryStore;

    struct CountingEmbeddings {
        calls: AtomicUsize,
    }

    impl CountingEmbeddings {
        fn new() -> Arc<Self> {
            Arc::new(Self { calls: AtomicUsize::new(0) })
        }
    }

    #[async_trait]
    impl EmbeddingClient for CountingEmbeddings {
        async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
            if text.trim().is_empty() {
                return Err(EmbeddingError::InvalidInput);
            }
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(vec![0.5f32; EMBEDDING_DIMENSIONS])
        }
    }

    fn email(id: &str, body: &str) -> EmailRecord {
        EmailRecord::new(id, "sender@example.com", "Subject", body, Utc::now())
    }

    #[tokio::test]
    async fn ingest_embeds_exactly_once() {
        let store = Arc::new(MemoryStore::new());
        let embeddings = CountingEmbeddings::new();
        let ingestion = DataIngestion::new(store.clone(), embeddings.clone());

        ingestion.ingest_email(email("E1", "body")).await.unwrap();
        assert_eq!(embeddings.calls.load(Ordering::SeqCst), 1);

        let stored = store.find_email("E1").await.unwrap().unwrap();
        assert!(stored.is_searchable());
    }

    #[tokio::test]
    async fn reingest_recomputes_and_overwrites() {
        let store = Arc::new(MemoryStore::new());
        let embeddings = CountingEmbeddings::new();
        let ingestion = DataIngestion::new(store.clone(), embeddings.clone());

        ingestion.ingest_email(email("E1", "B1")).await.unwrap();
        ingestion.ingest_email(email("E1", "B2")).await.unwrap();

        // one embedding per ingest, one stored record with the second body
        assert_eq!(embeddings.calls.load(Ordering::SeqCst), 2);
        assert_eq!(store.count_emails().await.unwrap(), 1);
        assert_eq!(store.find_email("E1").await.unwrap().unwrap().body, "B2");
    }

    #[tokio::test]
    async fn preembedded_email_is_not_reembedded() {
        let store = Arc::new(MemoryStore::new());
        let embeddings = CountingEmbeddings::new();
        let ingestion = DataIngestion::new(store, embeddings.clone());

        let mut record = email("E1", "body");
        record.embedding = Some(vec![0.1f32; EMBEDDING_DIMENSIONS]);
        ingestion.ingest_email(record).await.unwrap();

        assert_eq!(embeddings.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn bulk_ingest_skips_bad_records() {
        let store = Arc::new(MemoryStore::new());
        let ingestion = DataIngestion::new(store.clone(), CountingEmbeddings::new());

        let batch = vec![
            email("E1", "good"),
            EmailRecord::new("E2", "sender@example.com", "   ", "blank subject", Utc::now()),
            email("E3", "also good"),
        ];
        let report = ingestion.bulk_ingest_emails(batch).await;

        assert_eq!(report.total, 3);
        assert_eq!(report.imported, 2);
        assert_eq!(report.errors.len(), 1);
        assert!(report.errors[0].starts_with("E2"));
        assert_eq!(store.count_emails().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn contact_ingest_round_trips() {
        let store = Arc::new(MemoryStore::new());
        let ingestion = DataIngestion::new(store.clone(), CountingEmbeddings::new());

        ingestion
            .ingest_contact(ContactRecord::new("C1", "Sarah Chen", "sarah@acme.example"))
            .await
            .unwrap();
        assert!(store.find_contact("C1").await.unwrap().is_some());

        let report = ingestion
            .bulk_ingest_contacts(vec![
                ContactRecord::new("C2", "Ann", "ann@example.com"),
                ContactRecord::new("C3", "", "no-name@example.com"),
            ])
            .await;
        assert_eq!(report.imported, 1);
        assert_eq!(report.errors.len(), 1);
    }
}
