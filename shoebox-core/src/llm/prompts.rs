//! Prompt text for the oracle calls.
//!
//! Each function returns the full user prompt for one oracle operation; the
//! matching system prompts are the consts below. All oracle calls request a
//! single JSON object back, which `llm::oracle` validates.

use crate::llm::oracle::{Classification, HistoryTurn};

pub const CLASSIFY_SYSTEM: &str = "You classify short personal notes into exactly one of four \
categories: person, project, idea, admin. Extract a concise name and any structured fields you \
can. Respond with a single JSON object: {\"category\": \"person|project|idea|admin\", \
\"confidence\": 0.0-1.0, \"name\": \"...\", \"fields\": {...}}. Allowed fields per category - \
person: context, follow_ups, nicknames; project: next_action, notes, status; idea: one_liner, \
notes; admin: due_date, status. Only include fields actually present in the note.";

pub const MESSAGE_INTENT_SYSTEM: &str = "Decide whether a message is a new fact to capture or a \
question about previously captured facts. Respond with a single JSON object: {\"intent\": \
\"capture|query\", \"confidence\": 0.0-1.0}.";

pub const THREAD_INTENT_SYSTEM: &str = "You interpret a reply in a conversation thread about a \
previously captured note. Respond with a single JSON object: {\"intent\": \"correct_category|\
update_field|add_context|create_related|query|unclear\", \"details\": {...}, \"confidence\": \
0.0-1.0}. Details per intent - correct_category: {category}; update_field: {field, value}; \
add_context: {context}; create_related: {category, name, fields}; query: {question}; unclear: {}.";

pub const ANSWER_SYSTEM: &str = "Answer the user's question using only the search results \
provided. Be brief and conversational. If the results do not contain the answer, say so.";

pub fn classify_prompt(text: &str) -> String {
    format!("Classify this note:\n\n{text}")
}

pub fn message_intent_prompt(text: &str) -> String {
    format!("Message:\n\n{text}")
}

pub fn thread_intent_prompt(
    original: &str,
    classification: &Classification,
    history: &[HistoryTurn<'_>],
    reply: &str,
) -> String {
    let mut prompt = format!(
        "Original note: {original}\nCurrently filed as: {} \"{}\" (confidence {:.2})\n",
        classification.category, classification.name, classification.confidence
    );
    if !history.is_empty() {
        prompt.push_str("\nThread so far:\n");
        for turn in history {
            prompt.push_str(&format!("{}: {}\n", turn.role, turn.content));
        }
    }
    prompt.push_str(&format!("\nNew reply: {reply}"));
    prompt
}

pub fn answer_prompt(question: &str, results: &str) -> String {
    format!("Question: {question}\n\nSearch results:\n{results}")
}
