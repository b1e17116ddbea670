//! Per-thread conversation state.
//!
//! A [`ThreadContext`] exists for a thread exactly when the bot has filed
//! something or asked a question there. All mutation goes through
//! [`ContextStore::apply`], which runs the closure under the map entry lock so
//! per-thread transitions are atomic. The store snapshots to a JSON file after
//! every mutation and reloads it at startup; snapshot failures are logged,
//! never fatal.

use crate::llm::oracle::Classification;
use crate::store::schema::Category;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

#[derive(Debug, thiserror::Error)]
pub enum ContextError {
    #[error("no context recorded for thread {0}")]
    NotFound(String),
    #[error("context snapshot failed: {0}")]
    Snapshot(String),
}

/// Where a thread currently sits in the filing conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThreadState {
    AwaitingCategory,
    AwaitingDuplicateResolution,
    AwaitingDisambiguation,
    Filed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// One turn of the thread's reply history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreadMessage {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

/// A pre-existing record this capture might duplicate, pending resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DuplicateCandidate {
    pub record_id: String,
    pub name: String,
    pub category: Category,
    pub score: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreadContext {
    pub thread_id: String,
    pub channel: String,
    pub original_message: String,
    pub classification: Classification,
    /// Set once filing succeeds; only superseded, never cleared.
    pub page_id: Option<String>,
    pub potential_duplicate: Option<DuplicateCandidate>,
    pub messages: Vec<ThreadMessage>,
    pub state: ThreadState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ThreadContext {
    pub fn new(
        thread_id: &str,
        channel: &str,
        original_message: &str,
        classification: Classification,
        state: ThreadState,
    ) -> Self {
        let now = Utc::now();
        Self {
            thread_id: thread_id.to_string(),
            channel: channel.to_string(),
            original_message: original_message.to_string(),
            classification,
            page_id: None,
            potential_duplicate: None,
            messages: Vec::new(),
            state,
            created_at: now,
            updated_at: now,
        }
    }

    /// Record a bot-only turn, used when a button click resolves a prompt.
    pub fn push_assistant(&mut self, content: &str) {
        self.messages.push(ThreadMessage {
            role: Role::Assistant,
            content: content.to_string(),
            timestamp: Utc::now(),
        });
    }

    /// Record one user reply and the bot's textual response.
    pub fn push_exchange(&mut self, user: &str, assistant: &str) {
        let now = Utc::now();
        self.messages.push(ThreadMessage {
            role: Role::User,
            content: user.to_string(),
            timestamp: now,
        });
        self.messages.push(ThreadMessage {
            role: Role::Assistant,
            content: assistant.to_string(),
            timestamp: now,
        });
    }
}

/// Durable map of thread id to context.
pub struct ContextStore {
    contexts: DashMap<String, ThreadContext>,
    snapshot_path: Option<PathBuf>,
    snapshot_lock: Mutex<()>,
}

impl ContextStore {
    /// Ephemeral store, used in tests.
    pub fn in_memory() -> Self {
        Self {
            contexts: DashMap::new(),
            snapshot_path: None,
            snapshot_lock: Mutex::new(()),
        }
    }

    /// Open a store backed by a JSON snapshot file, loading any existing
    /// snapshot. A missing file is an empty store.
    pub fn open(path: &Path) -> Result<Self, ContextError> {
        let contexts = DashMap::new();
        match std::fs::read(path) {
            Ok(raw) => {
                let loaded: Vec<ThreadContext> = serde_json::from_slice(&raw)
                    .map_err(|err| ContextError::Snapshot(err.to_string()))?;
                for context in loaded {
                    contexts.insert(context.thread_id.clone(), context);
                }
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => return Err(ContextError::Snapshot(err.to_string())),
        }
        Ok(Self {
            contexts,
            snapshot_path: Some(path.to_path_buf()),
            snapshot_lock: Mutex::new(()),
        })
    }

    pub fn len(&self) -> usize {
        self.contexts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contexts.is_empty()
    }

    pub fn get(&self, thread_id: &str) -> Option<ThreadContext> {
        self.contexts.get(thread_id).map(|entry| entry.clone())
    }

    /// Register a context, replacing any previous one for the thread.
    pub fn insert(&self, context: ThreadContext) {
        self.contexts.insert(context.thread_id.clone(), context);
        self.snapshot();
    }

    /// Atomically mutate the context for a thread, returning the updated
    /// copy. The closure runs under the entry lock, so concurrent events for
    /// the same thread cannot lose updates.
    pub fn apply<F>(&self, thread_id: &str, mutate: F) -> Result<ThreadContext, ContextError>
    where
        F: FnOnce(&mut ThreadContext),
    {
        let updated = {
            let mut entry = self
                .contexts
                .get_mut(thread_id)
                .ok_or_else(|| ContextError::NotFound(thread_id.to_string()))?;
            mutate(entry.value_mut());
            entry.updated_at = Utc::now();
            entry.clone()
        };
        self.snapshot();
        Ok(updated)
    }

    /// Evict contexts whose last activity is older than `max_age`. Returns
    /// the number evicted.
    pub fn sweep(&self, max_age: Duration, now: DateTime<Utc>) -> usize {
        let cutoff = now - max_age;
        let before = self.contexts.len();
        self.contexts.retain(|_, context| context.updated_at > cutoff);
        let evicted = before - self.contexts.len();
        if evicted > 0 {
            self.snapshot();
        }
        evicted
    }

    fn snapshot(&self) {
        let Some(path) = &self.snapshot_path else {
            return;
        };
        let _guard = self
            .snapshot_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let all: Vec<ThreadContext> = self
            .contexts
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        let result = serde_json::to_vec_pretty(&all)
            .map_err(|err| err.to_string())
            .and_then(|raw| {
                let tmp = path.with_extension("tmp");
                std::fs::write(&tmp, raw)
                    .and_then(|()| std::fs::rename(&tmp, path))
                    .map_err(|err| err.to_string())
            });
        if let Err(err) = result {
            tracing::warn!(path = %path.display(), error = %err, "context snapshot failed");
        }
    }
}
