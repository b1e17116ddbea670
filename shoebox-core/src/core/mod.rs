//! Conversation state and the decision engine built on top of it.

pub mod context;
pub mod digest;
pub mod filing;
pub mod matcher;
pub mod query;

pub use context::{ContextError, ContextStore, ThreadContext, ThreadState};
pub use filing::Filer;
