//! Notion-backed store gateway.
//!
//! Each category maps to one Notion database; records are pages whose `Name`
//! is the title property and whose remaining properties are rich text. The
//! audit log is a fifth database.

use crate::config::constants::HTTP_TIMEOUT_SECS;
use crate::config::StoreConfig;
use crate::llm::oracle::FieldMap;
use crate::store::schema::Category;
use crate::store::{AuditEntry, StoreError, StoreGateway, StoreRecord};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client as HttpClient;
use serde_json::{json, Map, Value};
use std::time::Duration;

const NOTION_VERSION: &str = "2022-06-28";

pub struct NotionStore {
    api_key: String,
    http_client: HttpClient,
    base_url: String,
    config: StoreConfig,
}

impl NotionStore {
    pub fn new(api_key: String, config: StoreConfig) -> Result<Self, StoreError> {
        let http_client = HttpClient::builder()
            .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
            .build()
            .map_err(|err| StoreError::Http(err.to_string()))?;
        Ok(Self {
            api_key,
            http_client,
            base_url: "https://api.notion.com/v1".to_string(),
            config,
        })
    }

    fn database_id(&self, category: Category) -> &str {
        self.config.database_id(category)
    }

    async fn post(&self, path: &str, body: Value) -> Result<Value, StoreError> {
        self.request(reqwest::Method::POST, path, body).await
    }

    async fn patch(&self, path: &str, body: Value) -> Result<Value, StoreError> {
        self.request(reqwest::Method::PATCH, path, body).await
    }

    async fn get(&self, path: &str) -> Result<Value, StoreError> {
        let url = format!("{}{path}", self.base_url);
        let response = self
            .http_client
            .get(&url)
            .bearer_auth(&self.api_key)
            .header("Notion-Version", NOTION_VERSION)
            .send()
            .await
            .map_err(|err| StoreError::Http(err.to_string()))?;
        Self::into_json(response).await
    }

    async fn request(
        &self,
        method: reqwest::Method,
        path: &str,
        body: Value,
    ) -> Result<Value, StoreError> {
        let url = format!("{}{path}", self.base_url);
        let response = self
            .http_client
            .request(method, &url)
            .bearer_auth(&self.api_key)
            .header("Notion-Version", NOTION_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(|err| StoreError::Http(err.to_string()))?;
        Self::into_json(response).await
    }

    async fn into_json(response: reqwest::Response) -> Result<Value, StoreError> {
        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(StoreError::Api(format!("HTTP {status}: {text}")));
        }
        response
            .json()
            .await
            .map_err(|err| StoreError::Api(format!("invalid response body: {err}")))
    }

    /// Translate logical fields into Notion page properties. Unknown logical
    /// names are skipped; `name` is always the title property.
    fn build_properties(category: Category, name: Option<&str>, fields: &FieldMap) -> Value {
        let mut properties = Map::new();
        if let Some(name) = name {
            properties.insert("Name".to_string(), title_property(name));
        }
        for (logical, value) in fields {
            if logical == "name" {
                continue;
            }
            if let Some(store_name) = category.store_field(logical) {
                properties.insert(store_name.to_string(), rich_text_property(value));
            } else {
                tracing::warn!(category = %category, field = %logical, "dropping unmapped field");
            }
        }
        Value::Object(properties)
    }

    fn parse_records(body: &Value) -> Vec<StoreRecord> {
        body.get("results")
            .and_then(Value::as_array)
            .map(|results| {
                results
                    .iter()
                    .filter_map(|page| {
                        let id = page.get("id")?.as_str()?.to_string();
                        let name = plain_text(page.pointer("/properties/Name/title"));
                        let nicknames =
                            plain_text(page.pointer("/properties/Nicknames/rich_text"));
                        Some(StoreRecord {
                            id,
                            name,
                            nicknames: split_nicknames(&nicknames),
                        })
                    })
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[async_trait]
impl StoreGateway for NotionStore {
    async fn create(
        &self,
        category: Category,
        name: &str,
        fields: &FieldMap,
    ) -> Result<String, StoreError> {
        let body = json!({
            "parent": {"database_id": self.database_id(category)},
            "properties": Self::build_properties(category, Some(name), fields),
        });
        let created = self.post("/pages", body).await?;
        created
            .get("id")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| StoreError::Api("created page had no id".into()))
    }

    async fn search_by_title(
        &self,
        category: Category,
        query: &str,
    ) -> Result<Vec<StoreRecord>, StoreError> {
        let body = json!({
            "filter": {"property": "Name", "title": {"contains": query}},
        });
        let path = format!("/databases/{}/query", self.database_id(category));
        let results = self.post(&path, body).await?;
        Ok(Self::parse_records(&results))
    }

    async fn search_by_nickname(&self, query: &str) -> Result<Vec<StoreRecord>, StoreError> {
        let body = json!({
            "filter": {"property": "Nicknames", "rich_text": {"contains": query}},
        });
        let path = format!("/databases/{}/query", self.database_id(Category::Person));
        let results = self.post(&path, body).await?;
        Ok(Self::parse_records(&results))
    }

    async fn update(
        &self,
        category: Category,
        page_id: &str,
        fields: &FieldMap,
    ) -> Result<(), StoreError> {
        let name = fields.get("name").map(String::as_str);
        let body = json!({
            "properties": Self::build_properties(category, name, fields),
        });
        self.patch(&format!("/pages/{page_id}"), body).await?;
        Ok(())
    }

    async fn append_note(
        &self,
        category: Category,
        page_id: &str,
        text: &str,
    ) -> Result<(), StoreError> {
        let note_field = category.note_field();
        let page = self.get(&format!("/pages/{page_id}")).await?;
        let existing = plain_text(page.pointer(&format!("/properties/{note_field}/rich_text")));
        let combined = if existing.is_empty() {
            text.to_string()
        } else {
            format!("{existing}\n{text}")
        };
        let body = json!({
            "properties": {note_field: rich_text_property(&combined)},
        });
        self.patch(&format!("/pages/{page_id}"), body).await?;
        Ok(())
    }

    async fn audit(&self, entry: &AuditEntry) -> Result<(), StoreError> {
        let body = json!({
            "parent": {"database_id": self.config.audit_database_id},
            "properties": {
                "Name": title_property(&entry.name),
                "Original Text": rich_text_property(&entry.original_text),
                "Confidence": {"number": entry.confidence},
                "Destination": rich_text_property(&entry.destination),
            },
        });
        self.post("/pages", body).await?;
        Ok(())
    }

    async fn recent(
        &self,
        category: Category,
        since: DateTime<Utc>,
    ) -> Result<Vec<StoreRecord>, StoreError> {
        let body = json!({
            "filter": {
                "timestamp": "created_time",
                "created_time": {"after": since.to_rfc3339()},
            },
            "sorts": [{"timestamp": "created_time", "direction": "descending"}],
        });
        let path = format!("/databases/{}/query", self.database_id(category));
        let results = self.post(&path, body).await?;
        Ok(Self::parse_records(&results))
    }
}

fn title_property(text: &str) -> Value {
    json!({"title": [{"text": {"content": text}}]})
}

fn rich_text_property(text: &str) -> Value {
    json!({"rich_text": [{"text": {"content": text}}]})
}

/// Concatenate the plain_text runs of a title/rich_text property value.
fn plain_text(value: Option<&Value>) -> String {
    value
        .and_then(Value::as_array)
        .map(|runs| {
            runs.iter()
                .filter_map(|run| run.get("plain_text").and_then(Value::as_str))
                .collect::<Vec<_>>()
                .join("")
        })
        .unwrap_or_default()
}

fn split_nicknames(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
