//! Oracle contract, prompt text, and the OpenAI-backed implementations.

pub mod openai;
pub mod oracle;
pub mod prompts;
pub mod transcribe;

pub use openai::OpenAiOracle;
pub use oracle::{
    Classification, FieldMap, HistoryTurn, MessageIntent, MessageIntentKind, Oracle, OracleError,
    ThreadIntent,
};
pub use transcribe::Transcriber;
