//! OpenAI-backed oracle implementation.
//!
//! One chat-completions call per oracle operation, JSON-object response format
//! for the structured calls, plain text for answer generation. Timeouts are
//! owned here; there are no automatic retries.

use crate::config::constants::{llm, HTTP_TIMEOUT_SECS};
use crate::llm::oracle::{
    Classification, HistoryTurn, MessageIntent, Oracle, OracleError, ThreadIntent,
};
use crate::llm::prompts;
use async_trait::async_trait;
use reqwest::Client as HttpClient;
use serde_json::{json, Value};
use std::time::Duration;

pub struct OpenAiOracle {
    api_key: String,
    http_client: HttpClient,
    base_url: String,
    model: String,
}

impl OpenAiOracle {
    pub fn new(api_key: String) -> Result<Self, OracleError> {
        Self::with_model(api_key, llm::DEFAULT_MODEL.to_string())
    }

    pub fn with_model(api_key: String, model: String) -> Result<Self, OracleError> {
        let http_client = HttpClient::builder()
            .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
            .build()
            .map_err(|err| OracleError::Http(err.to_string()))?;
        Ok(Self {
            api_key,
            http_client,
            base_url: llm::OPENAI_BASE_URL.to_string(),
            model,
        })
    }

    async fn chat(&self, system: &str, user: String, json_mode: bool) -> Result<String, OracleError> {
        let mut body = json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": system},
                {"role": "user", "content": user},
            ],
            "temperature": 0.1,
        });
        if json_mode {
            body["response_format"] = json!({"type": "json_object"});
        }

        let url = format!("{}/chat/completions", self.base_url);
        let response = self
            .http_client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|err| {
                if err.is_timeout() {
                    OracleError::Timeout
                } else {
                    OracleError::Http(err.to_string())
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(OracleError::Http(format!("HTTP {status}: {text}")));
        }

        let parsed: Value = response
            .json()
            .await
            .map_err(|err| OracleError::Malformed(err.to_string()))?;
        parsed
            .pointer("/choices/0/message/content")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| OracleError::Malformed("no completion content".into()))
    }

    async fn chat_json(&self, system: &str, user: String) -> Result<Value, OracleError> {
        let content = self.chat(system, user, true).await?;
        serde_json::from_str(&content)
            .map_err(|err| OracleError::Malformed(format!("completion is not JSON: {err}")))
    }
}

#[async_trait]
impl Oracle for OpenAiOracle {
    async fn classify(&self, text: &str) -> Result<Classification, OracleError> {
        let value = self
            .chat_json(prompts::CLASSIFY_SYSTEM, prompts::classify_prompt(text))
            .await?;
        Classification::from_json(&value)
    }

    async fn detect_message_intent(&self, text: &str) -> Result<MessageIntent, OracleError> {
        // Malformed responses fall back to capture at 0.5; transport
        // failures still surface.
        let value = match self
            .chat_json(
                prompts::MESSAGE_INTENT_SYSTEM,
                prompts::message_intent_prompt(text),
            )
            .await
        {
            Ok(value) => value,
            Err(OracleError::Malformed(_)) => Value::Null,
            Err(err) => return Err(err),
        };
        Ok(MessageIntent::from_json(&value))
    }

    async fn detect_thread_intent(
        &self,
        original: &str,
        classification: &Classification,
        history: &[HistoryTurn<'_>],
        reply: &str,
    ) -> Result<ThreadIntent, OracleError> {
        let value = match self
            .chat_json(
                prompts::THREAD_INTENT_SYSTEM,
                prompts::thread_intent_prompt(original, classification, history, reply),
            )
            .await
        {
            Ok(value) => value,
            Err(OracleError::Malformed(_)) => return Ok(ThreadIntent::Unclear),
            Err(err) => return Err(err),
        };
        Ok(ThreadIntent::from_json(&value))
    }

    async fn answer_query(&self, question: &str, results: &str) -> Result<String, OracleError> {
        self.chat(
            prompts::ANSWER_SYSTEM,
            prompts::answer_prompt(question, results),
            false,
        )
        .await
    }
}
