//! Webhook server.
//!
//! Two endpoints: `/slack/events` for message events and `/slack/interactions`
//! for button clicks. Both verify the request signature against the raw body
//! before anything is parsed, and both acknowledge immediately - the actual
//! classification and filing work runs in a detached task so the event source
//! never retries on processing latency.

use crate::chat::payload::ButtonActionPayload;
use crate::chat::signature::SignatureVerifier;
use crate::config::constants::HTTP_TIMEOUT_SECS;
use crate::core::filing::Filer;
use crate::llm::transcribe::Transcriber;
use anyhow::Context;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::post;
use axum::Router;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use url::form_urlencoded;

pub struct AppState {
    pub filer: Arc<Filer>,
    pub verifier: SignatureVerifier,
    /// Absent when transcription is not configured; audio messages are then
    /// acknowledged with an explanatory reply path (the text is empty and the
    /// event is dropped).
    pub transcriber: Option<Arc<Transcriber>>,
    /// Token used to fetch private file attachments.
    pub bot_token: String,
    http_client: reqwest::Client,
}

impl AppState {
    pub fn new(
        filer: Arc<Filer>,
        verifier: SignatureVerifier,
        transcriber: Option<Arc<Transcriber>>,
        bot_token: String,
    ) -> anyhow::Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
            .build()
            .context("cannot build attachment download client")?;
        Ok(Self {
            filer,
            verifier,
            transcriber,
            bot_token,
            http_client,
        })
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/slack/events", post(handle_events))
        .route("/slack/interactions", post(handle_interactions))
        .with_state(state)
}

/// Run the server until the task is cancelled.
pub async fn serve(state: Arc<AppState>, host: &str, port: u16) -> anyhow::Result<()> {
    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(addr, "webhook server listening");
    axum::serve(listener, router(state)).await?;
    Ok(())
}

fn verify(state: &AppState, headers: &HeaderMap, body: &[u8]) -> Result<(), Response> {
    let timestamp = header_str(headers, "x-slack-request-timestamp");
    let signature = header_str(headers, "x-slack-signature");
    let (Some(timestamp), Some(signature)) = (timestamp, signature) else {
        return Err((StatusCode::UNAUTHORIZED, "missing signature headers").into_response());
    };
    state
        .verifier
        .verify(timestamp, signature, body, chrono::Utc::now().timestamp())
        .map_err(|err| {
            warn!(error = %err, "rejected webhook");
            (StatusCode::UNAUTHORIZED, "invalid signature").into_response()
        })
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

async fn handle_events(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if let Err(rejection) = verify(&state, &headers, &body) {
        return rejection;
    }
    let envelope: Value = match serde_json::from_slice(&body) {
        Ok(value) => value,
        Err(err) => {
            warn!(error = %err, "unparseable event body");
            return (StatusCode::BAD_REQUEST, "invalid body").into_response();
        }
    };

    // Slack's one-time endpoint handshake.
    if envelope.get("type").and_then(Value::as_str) == Some("url_verification") {
        let challenge = envelope
            .get("challenge")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        return Json(json!({"challenge": challenge})).into_response();
    }

    if envelope.get("type").and_then(Value::as_str) == Some("event_callback") {
        if let Some(event) = envelope.get("event").cloned() {
            let state = Arc::clone(&state);
            // Ack first; the work happens behind the response.
            tokio::spawn(async move {
                dispatch_event(state, event).await;
            });
        }
    }
    StatusCode::OK.into_response()
}

async fn dispatch_event(state: Arc<AppState>, event: Value) {
    if event.get("type").and_then(Value::as_str) != Some("message") {
        return;
    }
    // Ignore our own and other bots' messages.
    if event.get("bot_id").is_some()
        || event.get("subtype").and_then(Value::as_str) == Some("bot_message")
    {
        return;
    }
    let Some(channel) = event.get("channel").and_then(Value::as_str) else {
        return;
    };
    let Some(ts) = event.get("ts").and_then(Value::as_str) else {
        return;
    };
    let mut text = event
        .get("text")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    if text.trim().is_empty() {
        match transcribe_attachment(&state, &event).await {
            Some(transcript) => text = transcript,
            None => return,
        }
    }

    let thread_ts = event.get("thread_ts").and_then(Value::as_str);
    match thread_ts {
        Some(root) if root != ts => state.filer.handle_reply(channel, root, &text).await,
        _ => state.filer.handle_message(channel, ts, &text).await,
    }
}

/// Pull the first audio attachment off a message and transcribe it. Returns
/// `None` when there is nothing transcribable.
async fn transcribe_attachment(state: &AppState, event: &Value) -> Option<String> {
    let transcriber = state.transcriber.as_ref()?;
    let file = event
        .get("files")
        .and_then(Value::as_array)?
        .iter()
        .find(|file| {
            file.get("mimetype")
                .and_then(Value::as_str)
                .is_some_and(|mime| mime.starts_with("audio/"))
        })?;
    let url = file.get("url_private_download").and_then(Value::as_str)?;
    let name = file
        .get("name")
        .and_then(Value::as_str)
        .unwrap_or("voice-note.m4a");

    let audio = match state
        .http_client
        .get(url)
        .bearer_auth(&state.bot_token)
        .send()
        .await
    {
        Ok(response) if response.status().is_success() => match response.bytes().await {
            Ok(bytes) => bytes.to_vec(),
            Err(err) => {
                error!(error = %err, "audio download failed");
                return None;
            }
        },
        Ok(response) => {
            error!(status = %response.status(), "audio download failed");
            return None;
        }
        Err(err) => {
            error!(error = %err, "audio download failed");
            return None;
        }
    };

    match transcriber.transcribe(audio, name).await {
        Ok(transcript) => Some(transcript),
        Err(err) => {
            error!(error = %err, "transcription failed");
            None
        }
    }
}

async fn handle_interactions(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if let Err(rejection) = verify(&state, &headers, &body) {
        return rejection;
    }

    // Interactions arrive form-encoded with the JSON under `payload`.
    let raw_payload = form_urlencoded::parse(&body)
        .find(|(key, _)| key == "payload")
        .map(|(_, value)| value.into_owned());
    let Some(raw_payload) = raw_payload else {
        return (StatusCode::BAD_REQUEST, "missing payload").into_response();
    };
    let interaction: Value = match serde_json::from_str(&raw_payload) {
        Ok(value) => value,
        Err(err) => {
            warn!(error = %err, "unparseable interaction payload");
            return (StatusCode::BAD_REQUEST, "invalid payload").into_response();
        }
    };

    if interaction.get("type").and_then(Value::as_str) == Some("block_actions") {
        let message_id = interaction
            .pointer("/container/message_ts")
            .or_else(|| interaction.pointer("/message/ts"))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let encoded = interaction
            .pointer("/actions/0/value")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let state = Arc::clone(&state);
        tokio::spawn(async move {
            match ButtonActionPayload::decode(&encoded) {
                Ok(payload) => state.filer.handle_button(&payload, &message_id).await,
                Err(err) => warn!(error = %err, "undecodable button payload"),
            }
        });
    }
    StatusCode::OK.into_response()
}
