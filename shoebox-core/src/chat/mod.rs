//! Messaging gateway: posting into threads, interactive prompts, webhook
//! authenticity, and the button payload codec.

pub mod payload;
pub mod signature;
pub mod slack;

use async_trait::async_trait;
use payload::ButtonActionPayload;

#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("chat request failed: {0}")]
    Http(String),
    #[error("chat API error: {0}")]
    Api(String),
    #[error("webhook signature mismatch")]
    SignatureInvalid,
    #[error("webhook timestamp outside tolerance")]
    StaleTimestamp,
    #[error("button payload could not be decoded: {0}")]
    PayloadDecode(String),
}

/// Identifier of a posted message (the thread timestamp on Slack).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageRef {
    pub id: String,
}

/// One button on an interactive prompt.
#[derive(Debug, Clone)]
pub struct ButtonOption {
    pub label: String,
    pub payload: ButtonActionPayload,
}

/// The chat platform surface the state machine depends on.
#[async_trait]
pub trait Messenger: Send + Sync {
    async fn post_message(
        &self,
        channel: &str,
        text: &str,
        thread_id: Option<&str>,
    ) -> Result<MessageRef, ChatError>;

    async fn post_interactive(
        &self,
        channel: &str,
        text: &str,
        options: &[ButtonOption],
        thread_id: Option<&str>,
    ) -> Result<MessageRef, ChatError>;

    async fn update_message(
        &self,
        channel: &str,
        message_id: &str,
        text: &str,
    ) -> Result<(), ChatError>;

    async fn add_reaction(
        &self,
        channel: &str,
        message_id: &str,
        emoji: &str,
    ) -> Result<(), ChatError>;
}
