//! Self-describing button payloads.
//!
//! Every interactive button carries an opaque token that decodes back to the
//! exact structure encoded at prompt time, so a click can be resolved with no
//! server-side session lookup beyond the thread context itself.

use crate::chat::ChatError;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ButtonAction {
    CategorySelect,
    DuplicateResolve,
    ThreadOption,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ButtonActionPayload {
    pub action: ButtonAction,
    pub thread_id: String,
    pub channel: String,
    #[serde(default)]
    pub data: Value,
}

impl ButtonActionPayload {
    pub fn new(action: ButtonAction, thread_id: &str, channel: &str, data: Value) -> Self {
        Self {
            action,
            thread_id: thread_id.to_string(),
            channel: channel.to_string(),
            data,
        }
    }

    pub fn encode(&self) -> String {
        // Serialization of this struct cannot fail.
        let raw = serde_json::to_vec(self).unwrap_or_default();
        BASE64.encode(raw)
    }

    pub fn decode(encoded: &str) -> Result<Self, ChatError> {
        let raw = BASE64
            .decode(encoded.trim())
            .map_err(|err| ChatError::PayloadDecode(err.to_string()))?;
        serde_json::from_slice(&raw).map_err(|err| ChatError::PayloadDecode(err.to_string()))
    }
}
