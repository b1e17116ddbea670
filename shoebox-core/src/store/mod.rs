//! Store gateway: typed CRUD over the per-category record collections.

pub mod notion;
pub mod schema;

use crate::llm::oracle::FieldMap;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use schema::Category;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store request failed: {0}")]
    Http(String),
    #[error("store API error: {0}")]
    Api(String),
}

/// A record as returned by a collection search.
#[derive(Debug, Clone, PartialEq)]
pub struct StoreRecord {
    pub id: String,
    pub name: String,
    /// Alternate names, only populated for person records.
    pub nicknames: Vec<String>,
}

/// One row of the capture audit log. Written for every classification
/// attempt, whether or not anything was filed.
#[derive(Debug, Clone)]
pub struct AuditEntry {
    pub original_text: String,
    pub name: String,
    pub confidence: f64,
    /// Destination category, or `needs_review` when nothing was auto-filed.
    pub destination: String,
}

/// The destination-store CRUD surface the state machine depends on.
///
/// Field maps use logical names; implementations translate them through
/// [`Category::field_specs`].
#[async_trait]
pub trait StoreGateway: Send + Sync {
    /// Create a record, returning its id.
    async fn create(
        &self,
        category: Category,
        name: &str,
        fields: &FieldMap,
    ) -> Result<String, StoreError>;

    /// Substring search on record titles within one category.
    async fn search_by_title(
        &self,
        category: Category,
        query: &str,
    ) -> Result<Vec<StoreRecord>, StoreError>;

    /// Substring search on the person collection's alternate-name field.
    async fn search_by_nickname(&self, query: &str) -> Result<Vec<StoreRecord>, StoreError>;

    /// Patch the given logical fields on an existing record.
    async fn update(
        &self,
        category: Category,
        page_id: &str,
        fields: &FieldMap,
    ) -> Result<(), StoreError>;

    /// Append text to the category's note field on an existing record.
    async fn append_note(
        &self,
        category: Category,
        page_id: &str,
        text: &str,
    ) -> Result<(), StoreError>;

    /// Best-effort audit row; callers log failures but never abort on them.
    async fn audit(&self, entry: &AuditEntry) -> Result<(), StoreError>;

    /// Records created after `since`, newest first. Used by the digests.
    async fn recent(
        &self,
        category: Category,
        since: DateTime<Utc>,
    ) -> Result<Vec<StoreRecord>, StoreError>;
}
