//! Audio-to-text transcription, a single call-and-return client.

use crate::config::constants::{llm, HTTP_TIMEOUT_SECS};
use crate::llm::oracle::OracleError;
use reqwest::multipart::{Form, Part};
use reqwest::Client as HttpClient;
use serde_json::Value;
use std::time::Duration;

pub struct Transcriber {
    api_key: String,
    http_client: HttpClient,
    base_url: String,
}

impl Transcriber {
    pub fn new(api_key: String) -> Result<Self, OracleError> {
        let http_client = HttpClient::builder()
            .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
            .build()
            .map_err(|err| OracleError::Http(err.to_string()))?;
        Ok(Self {
            api_key,
            http_client,
            base_url: llm::OPENAI_BASE_URL.to_string(),
        })
    }

    /// Transcribe raw audio bytes to text. `filename` only informs the
    /// service of the container format.
    pub async fn transcribe(&self, audio: Vec<u8>, filename: &str) -> Result<String, OracleError> {
        let form = Form::new()
            .text("model", llm::TRANSCRIPTION_MODEL)
            .part(
                "file",
                Part::bytes(audio).file_name(filename.to_string()),
            );

        let url = format!("{}/audio/transcriptions", self.base_url);
        let response = self
            .http_client
            .post(&url)
            .bearer_auth(&self.api_key)
            .multipart(form)
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
            .get("text")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| OracleError::Malformed("transcription response had no text".into()))
    }
}
