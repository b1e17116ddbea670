//! Typed contract for the classification oracle.
//!
//! The oracle is a remote LLM treated as a black box: prompt in, JSON out.
//! Everything it returns is validated here at the boundary and turned into
//! the tagged types the state machine works with. Missing discriminants or
//! required fields become [`OracleError::Malformed`], except where the
//! contract defines an explicit fallback (message intent falls back to
//! `capture` at 0.5 confidence, thread intent falls back to `Unclear`).

use crate::store::schema::Category;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;

/// Logical field name to value, as extracted by the oracle.
pub type FieldMap = BTreeMap<String, String>;

#[derive(Debug, thiserror::Error)]
pub enum OracleError {
    #[error("oracle returned malformed output: {0}")]
    Malformed(String),
    #[error("oracle request timed out")]
    Timeout,
    #[error("oracle request failed: {0}")]
    Http(String),
}

/// The oracle's answer for a fresh capture.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Classification {
    pub category: Category,
    pub confidence: f64,
    pub name: String,
    #[serde(default)]
    pub fields: FieldMap,
}

impl Classification {
    /// Validate a raw oracle response. Category, confidence and name are all
    /// required; anything else under `fields` is kept as-is.
    pub fn from_json(value: &Value) -> Result<Self, OracleError> {
        let category = value
            .get("category")
            .and_then(Value::as_str)
            .ok_or_else(|| OracleError::Malformed("missing category".into()))?
            .parse::<Category>()
            .map_err(|err| OracleError::Malformed(err.to_string()))?;
        let confidence = value
            .get("confidence")
            .and_then(Value::as_f64)
            .ok_or_else(|| OracleError::Malformed("missing confidence".into()))?;
        if !confidence.is_finite() {
            return Err(OracleError::Malformed("confidence is not finite".into()));
        }
        let name = value
            .get("name")
            .and_then(Value::as_str)
            .filter(|name| !name.is_empty())
            .ok_or_else(|| OracleError::Malformed("missing name".into()))?
            .to_string();

        Ok(Self {
            category,
            confidence: confidence.clamp(0.0, 1.0),
            name,
            fields: fields_from_json(value.get("fields")),
        })
    }
}

/// Capture-vs-query routing for a fresh top-level message.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MessageIntent {
    pub kind: MessageIntentKind,
    pub confidence: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageIntentKind {
    Capture,
    Query,
}

impl MessageIntent {
    /// Contractual fallback: anything malformed routes to capture at 0.5.
    pub fn from_json(value: &Value) -> Self {
        let kind = match value.get("intent").and_then(Value::as_str) {
            Some("query") => MessageIntentKind::Query,
            Some("capture") => MessageIntentKind::Capture,
            _ => {
                return Self {
                    kind: MessageIntentKind::Capture,
                    confidence: 0.5,
                };
            }
        };
        let confidence = value
            .get("confidence")
            .and_then(Value::as_f64)
            .filter(|c| c.is_finite())
            .map(|c| c.clamp(0.0, 1.0))
            .unwrap_or(0.5);
        Self { kind, confidence }
    }
}

/// What a threaded reply is asking the bot to do.
#[derive(Debug, Clone, PartialEq)]
pub enum ThreadIntent {
    CorrectCategory {
        category: Category,
    },
    UpdateField {
        field: String,
        value: String,
    },
    AddContext {
        context: String,
    },
    CreateRelated {
        category: Category,
        name: String,
        fields: FieldMap,
    },
    Query {
        question: String,
    },
    Unclear,
}

impl ThreadIntent {
    /// Contractual fallback: anything malformed is `Unclear`.
    pub fn from_json(value: &Value) -> Self {
        let details = value.get("details").unwrap_or(&Value::Null);
        match value.get("intent").and_then(Value::as_str) {
            Some("correct_category") => details
                .get("category")
                .and_then(Value::as_str)
                .and_then(|s| s.parse::<Category>().ok())
                .map(|category| ThreadIntent::CorrectCategory { category })
                .unwrap_or(ThreadIntent::Unclear),
            Some("update_field") => {
                match (
                    details.get("field").and_then(Value::as_str),
                    details.get("value").and_then(Value::as_str),
                ) {
                    (Some(field), Some(value)) if !field.is_empty() => {
                        ThreadIntent::UpdateField {
                            field: field.to_string(),
                            value: value.to_string(),
                        }
                    }
                    _ => ThreadIntent::Unclear,
                }
            }
            Some("add_context") => details
                .get("context")
                .and_then(Value::as_str)
                .filter(|c| !c.is_empty())
                .map(|context| ThreadIntent::AddContext {
                    context: context.to_string(),
                })
                .unwrap_or(ThreadIntent::Unclear),
            Some("create_related") => {
                let category = details
                    .get("category")
                    .and_then(Value::as_str)
                    .and_then(|s| s.parse::<Category>().ok());
                let name = details
                    .get("name")
                    .and_then(Value::as_str)
                    .filter(|n| !n.is_empty());
                match (category, name) {
                    (Some(category), Some(name)) => ThreadIntent::CreateRelated {
                        category,
                        name: name.to_string(),
                        fields: fields_from_json(details.get("fields")),
                    },
                    _ => ThreadIntent::Unclear,
                }
            }
            Some("query") => details
                .get("question")
                .and_then(Value::as_str)
                .filter(|q| !q.is_empty())
                .map(|question| ThreadIntent::Query {
                    question: question.to_string(),
                })
                .unwrap_or(ThreadIntent::Unclear),
            _ => ThreadIntent::Unclear,
        }
    }
}

fn fields_from_json(value: Option<&Value>) -> FieldMap {
    let mut fields = FieldMap::new();
    if let Some(Value::Object(map)) = value {
        for (key, entry) in map {
            let text = match entry {
                Value::String(s) => s.clone(),
                Value::Null => continue,
                other => other.to_string(),
            };
            if !text.is_empty() {
                fields.insert(key.clone(), text);
            }
        }
    }
    fields
}

/// A single turn of thread history handed back to the oracle as context.
#[derive(Debug, Clone)]
pub struct HistoryTurn<'a> {
    pub role: &'a str,
    pub content: &'a str,
}

/// The external classification/intent service.
#[async_trait]
pub trait Oracle: Send + Sync {
    /// Classify a fresh capture into a category with extracted fields.
    async fn classify(&self, text: &str) -> Result<Classification, OracleError>;

    /// Route a fresh top-level message to capture or query.
    async fn detect_message_intent(&self, text: &str) -> Result<MessageIntent, OracleError>;

    /// Interpret a threaded reply given the full conversation so far.
    async fn detect_thread_intent(
        &self,
        original: &str,
        classification: &Classification,
        history: &[HistoryTurn<'_>],
        reply: &str,
    ) -> Result<ThreadIntent, OracleError>;

    /// Generate a prose answer to a query given formatted search results.
    async fn answer_query(&self, question: &str, results: &str) -> Result<String, OracleError>;
}
