//! Document store seam: emails, contacts, calls, business identity.

use crate::call::CallRecord;
use crate::embedding::EMBEDDING_DIMENSIONS;
use crate::retrieval::SearchHit;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// The backing store is unreachable. Retrieval callers treat this as
    /// empty results; call persistence retries once and then proceeds.
    #[error("document store unavailable: {0}")]
    Unavailable(String),

    /// The record failed validation and was not written.
    #[error("invalid record: {0}")]
    InvalidRecord(String),
}

/// An ingested email with its embedding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailRecord {
    pub id: String,
    pub sender: String,
    pub subject: String,
    pub body: String,
    pub timestamp: DateTime<Utc>,
    /// Computed once at ingest; recomputed only on re-ingest of the same
    /// id.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
}

impl EmailRecord {
    pub fn new(
        id: impl Into<String>,
        sender: impl Into<String>,
        subject: impl Into<String>,
        body: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            sender: sender.into(),
            subject: subject.into(),
            body: body.into(),
            timestamp,
            embedding: None,
        }
    }

    pub fn validate(&self) -> Result<(), StoreError> {
        for (field, value) in [
            ("id", &self.id),
            ("sender", &self.sender),
            ("subject", &self.subject),
            ("body", &self.body),
        ] {
            if value.trim().is_empty() {
                return Err(StoreError::InvalidRecord(format!(
                    "email {} is required and cannot be empty",
                    field
                )));
            }
        }
        if let Some(embedding) = &self.embedding {
            if embedding.len() != EMBEDDING_DIMENSIONS {
                return Err(StoreError::InvalidRecord(format!(
                    "email embedding must have exactly {} dimensions",
                    EMBEDDING_DIMENSIONS
                )));
            }
        }
        Ok(())
    }

    /// Subject and body combined, the text the embedding is computed from.
    pub fn embedding_text(&self) -> String {
        format!("{}\n\n{}", self.subject, self.body)
    }

    /// Eligible for vector search: a full-length, finite embedding.
    pub fn is_searchable(&self) -> bool {
        self.embedding
            .as_ref()
            .map(|e| e.len() == EMBEDDING_DIMENSIONS && e.iter().all(|v| v.is_finite()))
            .unwrap_or(false)
    }
}

/// A contact maintained by the administrator. Never mutated by the call
/// pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContactRecord {
    pub id: String,
    pub name: String,
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,
}

impl ContactRecord {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        email: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            email: email.into(),
            phone: None,
            company: None,
        }
    }

    pub fn with_phone(mut self, phone: impl Into<String>) -> Self {
        self.phone = Some(phone.into());
        self
    }

    pub fn with_company(mut self, company: impl Into<String>) -> Self {
        self.company = Some(company.into());
        self
    }

    pub fn validate(&self) -> Result<(), StoreError> {
        for (field, value) in [("id", &self.id), ("name", &self.name), ("email", &self.email)] {
            if value.trim().is_empty() {
                return Err(StoreError::InvalidRecord(format!(
                    "contact {} is required and cannot be empty",
                    field
                )));
            }
        }
        Ok(())
    }
}

/// Singleton business configuration injected into the assistant's system
/// prompt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusinessIdentity {
    pub principal_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub company_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub company_description: Option<String>,
}

impl BusinessIdentity {
    pub fn new(principal_name: impl Into<String>) -> Self {
        Self {
            principal_name: principal_name.into(),
            company_name: None,
            company_description: None,
        }
    }

    pub fn validate(&self) -> Result<(), StoreError> {
        if self.principal_name.trim().is_empty() {
            return Err(StoreError::InvalidRecord(
                "principal name is required and cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Typed access to the three persisted collections plus the business
/// identity singleton.
///
/// Upserts are keyed by stable identifier and idempotent: re-ingesting the
/// same id overwrites the previous payload. Vector search returns at most
/// `k` hits in strictly descending score order (ties broken by ascending
/// id); name search is a case-insensitive substring match over the contact
/// display name.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn upsert_email(&self, email: EmailRecord) -> Result<(), StoreError>;
    async fn upsert_contact(&self, contact: ContactRecord) -> Result<(), StoreError>;
    async fn delete_email(&self, id: &str) -> Result<bool, StoreError>;
    async fn delete_contact(&self, id: &str) -> Result<bool, StoreError>;
    async fn find_email(&self, id: &str) -> Result<Option<EmailRecord>, StoreError>;
    async fn find_contact(&self, id: &str) -> Result<Option<ContactRecord>, StoreError>;
    async fn list_emails(&self, limit: usize, skip: usize) -> Result<Vec<EmailRecord>, StoreError>;
    async fn list_contacts(
        &self,
        limit: usize,
        skip: usize,
    ) -> Result<Vec<ContactRecord>, StoreError>;

    async fn vector_search_emails(
        &self,
        query: &[f32],
        k: usize,
    ) -> Result<Vec<SearchHit>, StoreError>;
    async fn name_search_contacts(
        &self,
        name: &str,
        k: usize,
    ) -> Result<Vec<SearchHit>, StoreError>;

    async fn persist_call(&self, record: CallRecord) -> Result<(), StoreError>;
    async fn find_call(&self, call_sid: &str) -> Result<Option<CallRecord>, StoreError>;
    async fn list_calls(&self, limit: usize, skip: usize) -> Result<Vec<CallRecord>, StoreError>;

    async fn load_business_identity(&self) -> Result<Option<BusinessIdentity>, StoreError>;
    async fn save_business_identity(&self, identity: BusinessIdentity) -> Result<(), StoreError>;

    async fn count_emails(&self) -> Result<usize, StoreError>;
    async fn count_contacts(&self) -> Result<usize, StoreError>;
    async fn count_calls_since(&self, since: DateTime<Utc>) -> Result<usize, StoreError>;
}
