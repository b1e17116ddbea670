//! In-memory fakes for the oracle, store and messenger, plus helpers for
//! assembling a state machine around them.
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use shoebox_core::chat::payload::ButtonActionPayload;
use shoebox_core::chat::{ButtonOption, ChatError, MessageRef, Messenger};
use shoebox_core::core::{ContextStore, Filer};
use shoebox_core::llm::{
    Classification, FieldMap, HistoryTurn, MessageIntent, MessageIntentKind, Oracle, OracleError,
    ThreadIntent,
};
use shoebox_core::store::schema::Category;
use shoebox_core::store::{AuditEntry, StoreError, StoreGateway, StoreRecord};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub fn classification(category: Category, confidence: f64, name: &str) -> Classification {
    Classification {
        category,
        confidence,
        name: name.to_string(),
        fields: FieldMap::new(),
    }
}

#[derive(Default)]
pub struct MockOracle {
    pub classification: Mutex<Option<Classification>>,
    pub message_intent: Mutex<Option<MessageIntent>>,
    pub thread_intent: Mutex<Option<ThreadIntent>>,
    pub answer: Mutex<String>,
    pub classify_calls: AtomicUsize,
    pub thread_intent_calls: AtomicUsize,
}

impl MockOracle {
    pub fn classifying(classification: Classification) -> Self {
        let oracle = Self::default();
        *oracle.classification.lock().expect("lock") = Some(classification);
        oracle
    }

    pub fn with_thread_intent(intent: ThreadIntent) -> Self {
        let oracle = Self::default();
        *oracle.thread_intent.lock().expect("lock") = Some(intent);
        oracle
    }
}

#[async_trait]
impl Oracle for MockOracle {
    async fn classify(&self, _text: &str) -> Result<Classification, OracleError> {
        self.classify_calls.fetch_add(1, Ordering::SeqCst);
        self.classification
            .lock()
            .expect("lock")
            .clone()
            .ok_or_else(|| OracleError::Malformed("no classification configured".into()))
    }

    async fn detect_message_intent(&self, _text: &str) -> Result<MessageIntent, OracleError> {
        Ok(self
            .message_intent
            .lock()
            .expect("lock")
            .unwrap_or(MessageIntent {
                kind: MessageIntentKind::Capture,
                confidence: 0.9,
            }))
    }

    async fn detect_thread_intent(
        &self,
        _original: &str,
        _classification: &Classification,
        _history: &[HistoryTurn<'_>],
        _reply: &str,
    ) -> Result<ThreadIntent, OracleError> {
        self.thread_intent_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .thread_intent
            .lock()
            .expect("lock")
            .clone()
            .unwrap_or(ThreadIntent::Unclear))
    }

    async fn answer_query(&self, _question: &str, _results: &str) -> Result<String, OracleError> {
        Ok(self.answer.lock().expect("lock").clone())
    }
}

#[derive(Debug, Clone)]
pub struct CreatedRecord {
    pub category: Category,
    pub name: String,
    pub fields: FieldMap,
}

#[derive(Default)]
pub struct MockStore {
    pub title_hits: Mutex<HashMap<Category, Vec<StoreRecord>>>,
    pub nickname_hits: Mutex<Vec<StoreRecord>>,
    pub created: Mutex<Vec<CreatedRecord>>,
    pub updates: Mutex<Vec<(Category, String, FieldMap)>>,
    pub notes: Mutex<Vec<(String, String)>>,
    pub audits: Mutex<Vec<AuditEntry>>,
    pub recent_hits: Mutex<HashMap<Category, Vec<StoreRecord>>>,
    pub failing_recent: Mutex<Vec<Category>>,
}

impl MockStore {
    pub fn with_title_hit(category: Category, id: &str, name: &str) -> Self {
        let store = Self::default();
        store.title_hits.lock().expect("lock").insert(
            category,
            vec![StoreRecord {
                id: id.to_string(),
                name: name.to_string(),
                nicknames: Vec::new(),
            }],
        );
        store
    }

    pub fn created_count(&self) -> usize {
        self.created.lock().expect("lock").len()
    }
}

#[async_trait]
impl StoreGateway for MockStore {
    async fn create(
        &self,
        category: Category,
        name: &str,
        fields: &FieldMap,
    ) -> Result<String, StoreError> {
        let mut created = self.created.lock().expect("lock");
        created.push(CreatedRecord {
            category,
            name: name.to_string(),
            fields: fields.clone(),
        });
        Ok(format!("page-{}", created.len()))
    }

    async fn search_by_title(
        &self,
        category: Category,
        _query: &str,
    ) -> Result<Vec<StoreRecord>, StoreError> {
        Ok(self
            .title_hits
            .lock()
            .expect("lock")
            .get(&category)
            .cloned()
            .unwrap_or_default())
    }

    async fn search_by_nickname(&self, _query: &str) -> Result<Vec<StoreRecord>, StoreError> {
        Ok(self.nickname_hits.lock().expect("lock").clone())
    }

    async fn update(
        &self,
        category: Category,
        page_id: &str,
        fields: &FieldMap,
    ) -> Result<(), StoreError> {
        self.updates
            .lock()
            .expect("lock")
            .push((category, page_id.to_string(), fields.clone()));
        Ok(())
    }

    async fn append_note(
        &self,
        _category: Category,
        page_id: &str,
        text: &str,
    ) -> Result<(), StoreError> {
        self.notes
            .lock()
            .expect("lock")
            .push((page_id.to_string(), text.to_string()));
        Ok(())
    }

    async fn audit(&self, entry: &AuditEntry) -> Result<(), StoreError> {
        self.audits.lock().expect("lock").push(entry.clone());
        Ok(())
    }

    async fn recent(
        &self,
        category: Category,
        _since: DateTime<Utc>,
    ) -> Result<Vec<StoreRecord>, StoreError> {
        if self.failing_recent.lock().expect("lock").contains(&category) {
            return Err(StoreError::Api("recent query failed".into()));
        }
        Ok(self
            .recent_hits
            .lock()
            .expect("lock")
            .get(&category)
            .cloned()
            .unwrap_or_default())
    }
}

#[derive(Debug, Clone)]
pub struct PostedInteractive {
    pub channel: String,
    pub text: String,
    pub labels: Vec<String>,
    pub payloads: Vec<ButtonActionPayload>,
}

#[derive(Default)]
pub struct MockMessenger {
    pub posts: Mutex<Vec<(String, String)>>,
    pub interactives: Mutex<Vec<PostedInteractive>>,
    pub updates: Mutex<Vec<(String, String)>>,
    pub reactions: Mutex<Vec<(String, String)>>,
}

impl MockMessenger {
    pub fn last_post(&self) -> String {
        self.posts
            .lock()
            .expect("lock")
            .last()
            .map(|(_, text)| text.clone())
            .unwrap_or_default()
    }

    pub fn post_count(&self) -> usize {
        self.posts.lock().expect("lock").len()
    }
}

#[async_trait]
impl Messenger for MockMessenger {
    async fn post_message(
        &self,
        channel: &str,
        text: &str,
        _thread_id: Option<&str>,
    ) -> Result<MessageRef, ChatError> {
        let mut posts = self.posts.lock().expect("lock");
        posts.push((channel.to_string(), text.to_string()));
        Ok(MessageRef {
            id: format!("m-{}", posts.len()),
        })
    }

    async fn post_interactive(
        &self,
        channel: &str,
        text: &str,
        options: &[ButtonOption],
        _thread_id: Option<&str>,
    ) -> Result<MessageRef, ChatError> {
        let mut interactives = self.interactives.lock().expect("lock");
        interactives.push(PostedInteractive {
            channel: channel.to_string(),
            text: text.to_string(),
            labels: options.iter().map(|o| o.label.clone()).collect(),
            payloads: options.iter().map(|o| o.payload.clone()).collect(),
        });
        Ok(MessageRef {
            id: format!("i-{}", interactives.len()),
        })
    }

    async fn update_message(
        &self,
        _channel: &str,
        message_id: &str,
        text: &str,
    ) -> Result<(), ChatError> {
        self.updates
            .lock()
            .expect("lock")
            .push((message_id.to_string(), text.to_string()));
        Ok(())
    }

    async fn add_reaction(
        &self,
        _channel: &str,
        message_id: &str,
        emoji: &str,
    ) -> Result<(), ChatError> {
        self.reactions
            .lock()
            .expect("lock")
            .push((message_id.to_string(), emoji.to_string()));
        Ok(())
    }
}

pub struct Harness {
    pub oracle: Arc<MockOracle>,
    pub store: Arc<MockStore>,
    pub messenger: Arc<MockMessenger>,
    pub contexts: Arc<ContextStore>,
    pub filer: Filer,
}

pub fn harness(oracle: MockOracle, store: MockStore) -> Harness {
    let oracle = Arc::new(oracle);
    let store = Arc::new(store);
    let messenger = Arc::new(MockMessenger::default());
    let contexts = Arc::new(ContextStore::in_memory());
    let filer = Filer::new(
        oracle.clone(),
        store.clone(),
        messenger.clone(),
        contexts.clone(),
    );
    Harness {
        oracle,
        store,
        messenger,
        contexts,
        filer,
    }
}
