//! Slack Web API messenger.

use crate::chat::{ButtonOption, ChatError, MessageRef, Messenger};
use crate::config::constants::HTTP_TIMEOUT_SECS;
use async_trait::async_trait;
use reqwest::Client as HttpClient;
use serde_json::{json, Value};
use std::time::Duration;

pub struct SlackMessenger {
    bot_token: String,
    http_client: HttpClient,
    base_url: String,
}

impl SlackMessenger {
    pub fn new(bot_token: String) -> Result<Self, ChatError> {
        let http_client = HttpClient::builder()
            .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
            .build()
            .map_err(|err| ChatError::Http(err.to_string()))?;
        Ok(Self {
            bot_token,
            http_client,
            base_url: "https://slack.com/api".to_string(),
        })
    }

    async fn call(&self, method: &str, body: Value) -> Result<Value, ChatError> {
        let url = format!("{}/{method}", self.base_url);
        let response = self
            .http_client
            .post(&url)
            .bearer_auth(&self.bot_token)
            .json(&body)
            .send()
            .await
            .map_err(|err| ChatError::Http(err.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(ChatError::Api(format!("{method} HTTP {status}: {text}")));
        }

        let parsed: Value = response
            .json()
            .await
            .map_err(|err| ChatError::Api(err.to_string()))?;
        // Slack reports failures inside a 200 body.
        if parsed.get("ok").and_then(Value::as_bool) != Some(true) {
            let reason = parsed
                .get("error")
                .and_then(Value::as_str)
                .unwrap_or("unknown");
            return Err(ChatError::Api(format!("{method} failed: {reason}")));
        }
        Ok(parsed)
    }

    fn message_ref(response: &Value) -> Result<MessageRef, ChatError> {
        response
            .get("ts")
            .and_then(Value::as_str)
            .map(|ts| MessageRef { id: ts.to_string() })
            .ok_or_else(|| ChatError::Api("response had no message ts".into()))
    }
}

#[async_trait]
impl Messenger for SlackMessenger {
    async fn post_message(
        &self,
        channel: &str,
        text: &str,
        thread_id: Option<&str>,
    ) -> Result<MessageRef, ChatError> {
        let mut body = json!({"channel": channel, "text": text});
        if let Some(thread_ts) = thread_id {
            body["thread_ts"] = json!(thread_ts);
        }
        let response = self.call("chat.postMessage", body).await?;
        Self::message_ref(&response)
    }

    async fn post_interactive(
        &self,
        channel: &str,
        text: &str,
        options: &[ButtonOption],
        thread_id: Option<&str>,
    ) -> Result<MessageRef, ChatError> {
        let buttons: Vec<Value> = options
            .iter()
            .map(|option| {
                json!({
                    "type": "button",
                    "text": {"type": "plain_text", "text": option.label},
                    "action_id": format!("shoebox_{}", option.label.to_lowercase().replace(' ', "_")),
                    "value": option.payload.encode(),
                })
            })
            .collect();
        let mut body = json!({
            "channel": channel,
            "text": text,
            "blocks": [
                {"type": "section", "text": {"type": "mrkdwn", "text": text}},
                {"type": "actions", "elements": buttons},
            ],
        });
        if let Some(thread_ts) = thread_id {
            body["thread_ts"] = json!(thread_ts);
        }
        let response = self.call("chat.postMessage", body).await?;
        Self::message_ref(&response)
    }

    async fn update_message(
        &self,
        channel: &str,
        message_id: &str,
        text: &str,
    ) -> Result<(), ChatError> {
        // Replacing blocks with an empty list strips the buttons.
        let body = json!({
            "channel": channel,
            "ts": message_id,
            "text": text,
            "blocks": [{"type": "section", "text": {"type": "mrkdwn", "text": text}}],
        });
        self.call("chat.update", body).await?;
        Ok(())
    }

    async fn add_reaction(
        &self,
        channel: &str,
        message_id: &str,
        emoji: &str,
    ) -> Result<(), ChatError> {
        let body = json!({
            "channel": channel,
            "timestamp": message_id,
            "name": emoji,
        });
        self.call("reactions.add", body).await?;
        Ok(())
    }
}
