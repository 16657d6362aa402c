//! Consumed admin surface: contacts, emails, calls, business identity,
//! health and stats.
//!
//! Only the shapes the core publishes are modeled here; the admin UI
//! itself is an external collaborator. Validation failures are 400s,
//! missing records 404s, and store outages 503s.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

use frontdesk_foundation::ingest::IngestError;
use frontdesk_kernel::call::CallRecord;
use frontdesk_kernel::embedding::EmbeddingError;
use frontdesk_kernel::store::{BusinessIdentity, ContactRecord, EmailRecord, StoreError};

use crate::state::AppState;

// ─────────────────────────────────────────────────────────────────────────────
// Errors
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Invalid(String),

    #[error("store unavailable: {0}")]
    StoreUnavailable(String),
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Unavailable(msg) => ApiError::StoreUnavailable(msg),
            StoreError::InvalidRecord(msg) => ApiError::Invalid(msg),
        }
    }
}

impl From<IngestError> for ApiError {
    fn from(err: IngestError) -> Self {
        match err {
            IngestError::Store(err) => err.into(),
            IngestError::Embedding(EmbeddingError::InvalidInput) => {
                ApiError::Invalid("cannot embed empty text".to_string())
            }
            IngestError::Embedding(err) => ApiError::StoreUnavailable(err.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Invalid(_) => StatusCode::BAD_REQUEST,
            ApiError::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        };
        (status, Json(json!({"error": self.to_string()}))).into_response()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// DTOs
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct Pagination {
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default)]
    pub skip: usize,
}

fn default_limit() -> usize {
    100
}

#[derive(Debug, Deserialize)]
pub struct ContactInput {
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub company: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ContactDto {
    pub id: String,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub company: Option<String>,
}

impl From<ContactRecord> for ContactDto {
    fn from(record: ContactRecord) -> Self {
        Self {
            id: record.id,
            name: record.name,
            email: record.email,
            phone: record.phone,
            company: record.company,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct EmailInput {
    pub sender: String,
    pub subject: String,
    pub body: String,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub struct EmailDto {
    pub id: String,
    pub sender: String,
    pub subject: String,
    pub body: String,
    pub timestamp: DateTime<Utc>,
}

impl From<EmailRecord> for EmailDto {
    fn from(record: EmailRecord) -> Self {
        Self {
            id: record.id,
            sender: record.sender,
            subject: record.subject,
            body: record.body,
            timestamp: record.timestamp,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct BulkEmailImport {
    pub emails: Vec<EmailInput>,
}

#[derive(Debug, Serialize)]
pub struct ImportSummary {
    pub imported: usize,
    pub total: usize,
    pub errors: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct BusinessIdentityInput {
    pub principal_name: String,
    #[serde(default)]
    pub company_name: Option<String>,
    #[serde(default)]
    pub company_description: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct StatsDto {
    pub calls_today: usize,
    pub total_contacts: usize,
    pub emails_indexed: usize,
    pub active_calls: usize,
}

// ─────────────────────────────────────────────────────────────────────────────
// Contacts
// ─────────────────────────────────────────────────────────────────────────────

pub async fn list_contacts(
    State(state): State<Arc<AppState>>,
    Query(page): Query<Pagination>,
) -> Result<Json<Vec<ContactDto>>, ApiError> {
    let contacts = state.store.list_contacts(page.limit, page.skip).await?;
    Ok(Json(contacts.into_iter().map(ContactDto::from).collect()))
}

pub async fn create_contact(
    State(state): State<Arc<AppState>>,
    Json(input): Json<ContactInput>,
) -> Result<(StatusCode, Json<ContactDto>), ApiError> {
    let record = contact_from_input(Uuid::new_v4().to_string(), input);
    state.ingestion.ingest_contact(record.clone()).await?;
    Ok((StatusCode::CREATED, Json(record.into())))
}

pub async fn get_contact(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<ContactDto>, ApiError> {
    let contact = state
        .store
        .find_contact(&id)
        .await?
        .ok_or_else(|| ApiError::NotFound("contact not found".to_string()))?;
    Ok(Json(contact.into()))
}

pub async fn update_contact(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(input): Json<ContactInput>,
) -> Result<Json<ContactDto>, ApiError> {
    if state.store.find_contact(&id).await?.is_none() {
        return Err(ApiError::NotFound("contact not found".to_string()));
    }
    let record = contact_from_input(id, input);
    state.ingestion.ingest_contact(record.clone()).await?;
    Ok(Json(record.into()))
}

pub async fn delete_contact(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    if state.store.delete_contact(&id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound("contact not found".to_string()))
    }
}

fn contact_from_input(id: String, input: ContactInput) -> ContactRecord {
    ContactRecord {
        id,
        name: input.name,
        email: input.email,
        phone: input.phone,
        company: input.company,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Emails
// ─────────────────────────────────────────────────────────────────────────────

pub async fn list_emails(
    State(state): State<Arc<AppState>>,
    Query(page): Query<Pagination>,
) -> Result<Json<Vec<EmailDto>>, ApiError> {
    let emails = state.store.list_emails(page.limit, page.skip).await?;
    Ok(Json(emails.into_iter().map(EmailDto::from).collect()))
}

pub async fn create_email(
    State(state): State<Arc<AppState>>,
    Json(input): Json<EmailInput>,
) -> Result<(StatusCode, Json<EmailDto>), ApiError> {
    let record = email_from_input(Uuid::new_v4().to_string(), input);
    state.ingestion.ingest_email(record.clone()).await?;
    Ok((StatusCode::CREATED, Json(record.into())))
}

pub async fn import_emails(
    State(state): State<Arc<AppState>>,
    Json(bulk): Json<BulkEmailImport>,
) -> Json<ImportSummary> {
    let records = bulk
        .emails
        .into_iter()
        .map(|input| email_from_input(Uuid::new_v4().to_string(), input))
        .collect();
    let report = state.ingestion.bulk_ingest_emails(records).await;
    Json(ImportSummary {
        imported: report.imported,
        total: report.total,
        errors: report.errors.into_iter().take(10).collect(),
    })
}

pub async fn get_email(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<EmailDto>, ApiError> {
    let email = state
        .store
        .find_email(&id)
        .await?
        .ok_or_else(|| ApiError::NotFound("email not found".to_string()))?;
    Ok(Json(email.into()))
}

pub async fn delete_email(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    if state.store.delete_email(&id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound("email not found".to_string()))
    }
}

fn email_from_input(id: String, input: EmailInput) -> EmailRecord {
    EmailRecord::new(
        id,
        input.sender,
        input.subject,
        input.body,
        input.timestamp.unwrap_or_else(Utc::now),
    )
}

// ─────────────────────────────────────────────────────────────────────────────
// Calls
// ─────────────────────────────────────────────────────────────────────────────

pub async fn list_calls(
    State(state): State<Arc<AppState>>,
    Query(page): Query<Pagination>,
) -> Result<Json<Vec<CallRecord>>, ApiError> {
    Ok(Json(state.store.list_calls(page.limit, page.skip).await?))
}

pub async fn get_call(
    State(state): State<Arc<AppState>>,
    Path(call_sid): Path<String>,
) -> Result<Json<CallRecord>, ApiError> {
    let call = state
        .store
        .find_call(&call_sid)
        .await?
        .ok_or_else(|| ApiError::NotFound("call not found".to_string()))?;
    Ok(Json(call))
}

// ─────────────────────────────────────────────────────────────────────────────
// Business identity
// ─────────────────────────────────────────────────────────────────────────────

pub async fn get_business_identity(
    State(state): State<Arc<AppState>>,
) -> Result<Json<BusinessIdentity>, ApiError> {
    let identity = state
        .store
        .load_business_identity()
        .await?
        .ok_or_else(|| ApiError::NotFound("business identity not configured".to_string()))?;
    Ok(Json(identity))
}

pub async fn put_business_identity(
    State(state): State<Arc<AppState>>,
    Json(input): Json<BusinessIdentityInput>,
) -> Result<Json<BusinessIdentity>, ApiError> {
    let identity = BusinessIdentity {
        principal_name: input.principal_name,
        company_name: input.company_name,
        company_description: input.company_description,
    };
    state.store.save_business_identity(identity.clone()).await?;
    Ok(Json(identity))
}

// ─────────────────────────────────────────────────────────────────────────────
// Health & stats
// ─────────────────────────────────────────────────────────────────────────────

pub async fn health(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let store_ok = state.store.count_contacts().await.is_ok();
    Json(json!({
        "status": "healthy",
        "service": "frontdesk",
        "components": {
            "store": store_ok,
            "active_calls": state.calls.active_count().await,
        }
    }))
}

pub async fn stats(State(state): State<Arc<AppState>>) -> Result<Json<StatsDto>, ApiError> {
    let today_start = Utc::now()
        .date_naive()
        .and_hms_opt(0, 0, 0)
        .map(|naive| naive.and_utc())
        .unwrap_or_else(Utc::now);

    Ok(Json(StatsDto {
        calls_today: state.store.count_calls_since(today_start).await?,
        total_contacts: state.store.count_contacts().await?,
        emails_indexed: state.store.count_emails().await?,
        active_calls: state.calls.active_count().await,
    }))
}
