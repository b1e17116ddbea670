//! # shoebox-core
//!
//! Library behind the shoebox capture bot: take a short natural-language note
//! from chat (or a transcribed voice memo), classify it with an LLM into one
//! of four categories, and file it into the matching structured collection -
//! with a conversational thread for fixing misclassifications afterwards.
//!
//! ## Architecture
//!
//! - `config/`: `shoebox.toml` loader, policy constants, env-based secrets.
//! - `llm/`: the oracle contract (classification, intent detection, answer
//!   generation), its OpenAI-backed implementation, and transcription.
//! - `store/`: category schema and the Notion-backed record CRUD gateway.
//! - `chat/`: Slack messenger, webhook signature verification, and the
//!   button payload codec.
//! - `core/`: the interesting part - the per-thread context store, the
//!   filing state machine, duplicate scoring, the query flow, and digests.
//! - `server/`: axum webhook endpoints with ack-then-spawn dispatch.
//!
//! The state machine only sees the `Oracle`, `StoreGateway` and `Messenger`
//! traits, so the whole decision engine is exercised in tests with in-memory
//! fakes and no network.

pub mod chat;
pub mod config;
pub mod core;
pub mod llm;
pub mod server;
pub mod store;

pub use config::{Secrets, ShoeboxConfig};
pub use core::{ContextStore, Filer};
