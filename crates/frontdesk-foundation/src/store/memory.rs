//! Process-local document store with brute-force vector search.
//!
//! Backs the three logical collections (emails, contacts, calls) plus the
//! business-identity singleton. Vector search scans every searchable email
//! and scores it by normalized cosine similarity; this is the contract
//! implementation an external Atlas-style store must match, and the
//! substrate every integration test runs against.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;

use frontdesk_kernel::call::CallRecord;
use frontdesk_kernel::retrieval::{sort_hits, SearchHit};
use frontdesk_kernel::store::{
    BusinessIdentity, ContactRecord, DocumentStore, EmailRecord, StoreError,
};

use super::similarity::cosine_score;

#[derive(Default)]
struct Collections {
    emails: HashMap<String, EmailRecord>,
    contacts: HashMap<String, ContactRecord>,
    calls: HashMap<String, CallRecord>,
    identity: Option<BusinessIdentity>,
}

/// In-memory [`DocumentStore`].
///
/// Cheap to clone behind an `Arc`; all operations take the inner lock for
/// the duration of one map access only.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Collections>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn upsert_email(&self, email: EmailRecord) -> Result<(), StoreError> {
        email.validate()?;
        let mut inner = self.inner.write().await;
        inner.emails.insert(email.id.clone(), email);
        Ok(())
    }

    async fn upsert_contact(&self, contact: ContactRecord) -> Result<(), StoreError> {
        contact.validate()?;
        let mut inner = self.inner.write().await;
        inner.contacts.insert(contact.id.clone(), contact);
        Ok(())
    }

    async fn delete_email(&self, id: &str) -> Result<bool, StoreError> {
        Ok(self.inner.write().await.emails.remove(id).is_some())
    }

    async fn delete_contact(&self, id: &str) -> Result<bool, StoreError> {
        Ok(self.inner.write().await.contacts.remove(id).is_some())
    }

    async fn find_email(&self, id: &str) -> Result<Option<EmailRecord>, StoreError> {
        Ok(self.inner.read().await.emails.get(id).cloned())
    }

    async fn find_contact(&self, id: &str) -> Result<Option<ContactRecord>, StoreError> {
        Ok(self.inner.read().await.contacts.get(id).cloned())
    }

    async fn list_emails(&self, limit: usize, skip: usize) -> Result<Vec<EmailRecord>, StoreError> {
        let inner = self.inner.read().await;
        let mut emails: Vec<EmailRecord> = inner.emails.values().cloned().collect();
        emails.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then_with(|| a.id.cmp(&b.id)));
        Ok(emails.into_iter().skip(skip).take(limit).collect())
    }

    async fn list_contacts(
        &self,
        limit: usize,
        skip: usize,
    ) -> Result<Vec<ContactRecord>, StoreError> {
        let inner = self.inner.read().await;
        let mut contacts: Vec<ContactRecord> = inner.contacts.values().cloned().collect();
        contacts.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
        Ok(contacts.into_iter().skip(skip).take(limit).collect())
    }

    async fn vector_search_emails(
        &self,
        query: &[f32],
        k: usize,
    ) -> Result<Vec<SearchHit>, StoreError> {
        if query.is_empty() {
            return Ok(Vec::new());
        }

        let inner = self.inner.read().await;
        let mut hits: Vec<SearchHit> = inner
            .emails
            .values()
            .filter(|email| email.is_searchable())
            .map(|email| {
                let embedding = email.embedding.as_deref().unwrap_or(&[]);
                let mut hit = SearchHit::new(&email.id, &email.body, cosine_score(embedding, query))
                    .with_metadata("sender", &email.sender)
                    .with_metadata("subject", &email.subject);
                hit.metadata
                    .insert("timestamp".to_string(), email.timestamp.to_rfc3339());
                hit
            })
            .collect();

        sort_hits(&mut hits);
        hits.truncate(k);
        Ok(hits)
    }

    async fn name_search_contacts(
        &self,
        name: &str,
        k: usize,
    ) -> Result<Vec<SearchHit>, StoreError> {
        let needle = name.trim().to_lowercase();
        if needle.is_empty() {
            return Ok(Vec::new());
        }

        let inner = self.inner.read().await;
        let mut hits: Vec<SearchHit> = inner
            .contacts
            .values()
            .filter(|contact| contact.name.to_lowercase().contains(&needle))
            .map(|contact| {
                let mut content = format!("{} - {}", contact.name, contact.email);
                if let Some(company) = &contact.company {
                    content.push_str(&format!(" ({})", company));
                }
                let mut hit = SearchHit::new(&contact.id, content, 1.0)
                    .with_metadata("name", &contact.name)
                    .with_metadata("email", &contact.email);
                if let Some(phone) = &contact.phone {
                    hit.metadata.insert("phone".to_string(), phone.clone());
                }
                if let Some(company) = &contact.company {
                    hit.metadata.insert("company".to_string(), company.clone());
                }
                hit
            })
            .collect();

        sort_hits(&mut hits);
        hits.truncate(k);
        Ok(hits)
    }

    async fn persist_call(&self, record: CallRecord) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        inner.calls.insert(record.call_sid.clone(), record);
        Ok(())
    }

    async fn find_call(&self, call_sid: &str) -> Result<Option<CallRecord>, StoreError> {
        Ok(self.inner.read().await.calls.get(call_sid).cloned())
    }

    async fn list_calls(&self, limit: usize, skip: usize) -> Result<Vec<CallRecord>, StoreError> {
        let inner = self.inner.read().await;
        let mut calls: Vec<CallRecord> = inner.calls.values().cloned().collect();
        calls.sort_by(|a, b| {
            b.started_at
                .cmp(&a.started_at)
                .then_with(|| a.call_sid.cmp(&b.call_sid))
        });
        Ok(calls.into_iter().skip(skip).take(limit).collect())
    }

    async fn load_business_identity(&self) -> Result<Option<BusinessIdentity>, StoreError> {
        Ok(self.inner.read().await.identity.clone())
    }

    async fn save_business_identity(&self, identity: BusinessIdentity) -> Result<(), StoreError> {
        identity.validate()?;
        self.inner.write().await.identity = Some(identity);
        Ok(())
    }

    async fn count_emails(&self) -> Result<usize, StoreError> {
        Ok(self.inner.read().await.emails.len())
    }

    async fn count_contacts(&self) -> Result<usize, StoreError> {
        Ok(self.inner.read().await.contacts.len())
    }

    async fn count_calls_since(&self, since: DateTime<Utc>) -> Result<usize, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner
            .calls
            .values()
            .filter(|call| call.started_at >= since)
            .count())
    }
}
