//! The filing state machine.
//!
//! Routes an inbound capture through classification, the confidence gate, the
//! duplicate gate and the store write; routes thread replies through intent
//! detection; resolves button clicks deterministically from their payloads.
//! Collaborators (oracle, store, messenger) are trait objects so the whole
//! machine runs against in-memory fakes in tests.
//!
//! Failure policy: no oracle or store call is retried here. A capture that
//! fails mid-sequence is reported in-channel and leaves no context behind, so
//! re-posting the message is the recovery path.

use crate::chat::payload::{ButtonAction, ButtonActionPayload};
use crate::chat::{ButtonOption, Messenger};
use crate::config::constants::{CONFIDENCE_THRESHOLD, RELATED_CAPTURE_CONFIDENCE};
use crate::core::context::{
    ContextStore, DuplicateCandidate, ThreadContext, ThreadState,
};
use crate::core::matcher::{self, ScoredMatch};
use crate::core::query;
use crate::llm::oracle::{
    Classification, FieldMap, HistoryTurn, MessageIntentKind, Oracle, ThreadIntent,
};
use crate::store::schema::Category;
use crate::store::{AuditEntry, StoreGateway};
use anyhow::Result;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{error, info, warn};

const NO_CONTEXT_TEXT: &str =
    "I don't have any context for this thread. Please start fresh with a new message.";
const FAILURE_TEXT: &str =
    "Sorry, something went wrong while processing that. Please try again.";
const NOT_FILED_TEXT: &str = "Couldn't update that - nothing has been filed for this thread yet.";

pub struct Filer {
    oracle: Arc<dyn Oracle>,
    store: Arc<dyn StoreGateway>,
    messenger: Arc<dyn Messenger>,
    contexts: Arc<ContextStore>,
}

impl Filer {
    pub fn new(
        oracle: Arc<dyn Oracle>,
        store: Arc<dyn StoreGateway>,
        messenger: Arc<dyn Messenger>,
        contexts: Arc<ContextStore>,
    ) -> Self {
        Self {
            oracle,
            store,
            messenger,
            contexts,
        }
    }

    pub fn contexts(&self) -> &ContextStore {
        &self.contexts
    }

    /// Entry point for a fresh top-level message: route to capture or query.
    pub async fn handle_message(&self, channel: &str, thread_id: &str, text: &str) {
        let intent = match self.oracle.detect_message_intent(text).await {
            Ok(intent) => intent.kind,
            // Transport failure: treat as a capture; classification will
            // surface the error to the user if the oracle stays down.
            Err(err) => {
                warn!(error = %err, "message intent detection failed, assuming capture");
                MessageIntentKind::Capture
            }
        };
        match intent {
            MessageIntentKind::Capture => self.handle_capture(channel, thread_id, text).await,
            MessageIntentKind::Query => {
                if let Err(err) = self.answer_in_thread(channel, thread_id, text).await {
                    error!(error = %err, thread_id, "query flow failed");
                    self.notify_failure(channel, thread_id).await;
                }
            }
        }
    }

    /// Capture path: classify, audit, gates, file, confirm.
    pub async fn handle_capture(&self, channel: &str, thread_id: &str, text: &str) {
        if let Err(err) = self.capture(channel, thread_id, text).await {
            error!(error = %err, thread_id, "capture failed");
            self.notify_failure(channel, thread_id).await;
        }
    }

    async fn capture(&self, channel: &str, thread_id: &str, text: &str) -> Result<()> {
        let classification = self.oracle.classify(text).await?;
        info!(
            category = %classification.category,
            confidence = classification.confidence,
            name = %classification.name,
            "classified capture"
        );

        self.audit(text, &classification).await;

        // Confidence gate: too unsure to pick a destination, ask instead.
        if classification.confidence < CONFIDENCE_THRESHOLD {
            let prompt = format!(
                "I'm only {:.0}% sure how to file \"{}\". Which category should it go under?",
                classification.confidence * 100.0,
                classification.name
            );
            let options: Vec<ButtonOption> = Category::ALL
                .iter()
                .map(|category| ButtonOption {
                    label: category.label().to_string(),
                    payload: ButtonActionPayload::new(
                        ButtonAction::CategorySelect,
                        thread_id,
                        channel,
                        json!({"category": category.as_str()}),
                    ),
                })
                .collect();
            self.messenger
                .post_interactive(channel, &prompt, &options, Some(thread_id))
                .await?;
            let mut context = ThreadContext::new(
                thread_id,
                channel,
                text,
                classification,
                ThreadState::AwaitingCategory,
            );
            context.push_assistant(&prompt);
            self.contexts.insert(context);
            return Ok(());
        }

        // Duplicate gate: a strong match pauses filing until resolved.
        let matches = matcher::find_matches(
            self.store.as_ref(),
            classification.category,
            &classification.name,
        )
        .await?;
        if let Some(top) = matches.first().filter(|m| m.blocks_filing()) {
            let prompt = format!(
                "\"{}\" looks a lot like the existing {} \"{}\" ({:.0}% match). Update the existing record or create a new one?",
                classification.name,
                top.category.label(),
                top.name,
                top.score * 100.0
            );
            let options = vec![
                ButtonOption {
                    label: "Update existing".to_string(),
                    payload: ButtonActionPayload::new(
                        ButtonAction::DuplicateResolve,
                        thread_id,
                        channel,
                        json!({"choice": "update"}),
                    ),
                },
                ButtonOption {
                    label: "Create new".to_string(),
                    payload: ButtonActionPayload::new(
                        ButtonAction::DuplicateResolve,
                        thread_id,
                        channel,
                        json!({"choice": "new"}),
                    ),
                },
            ];
            self.messenger
                .post_interactive(channel, &prompt, &options, Some(thread_id))
                .await?;
            let mut context = ThreadContext::new(
                thread_id,
                channel,
                text,
                classification,
                ThreadState::AwaitingDuplicateResolution,
            );
            context.potential_duplicate = Some(DuplicateCandidate {
                record_id: top.record_id.clone(),
                name: top.name.clone(),
                category: top.category,
                score: top.score,
            });
            context.push_assistant(&prompt);
            self.contexts.insert(context);
            return Ok(());
        }

        // Confident and unique: file it.
        let page_id = self
            .store
            .create(
                classification.category,
                &classification.name,
                &classification.fields,
            )
            .await?;
        let confirmation = confirmation_text(&classification, &matches);
        self.messenger
            .post_message(channel, &confirmation, Some(thread_id))
            .await?;
        // Best-effort checkmark on the original message.
        if let Err(err) = self
            .messenger
            .add_reaction(channel, thread_id, "white_check_mark")
            .await
        {
            warn!(error = %err, "failed to add reaction");
        }

        let mut context = ThreadContext::new(
            thread_id,
            channel,
            text,
            classification,
            ThreadState::Filed,
        );
        context.page_id = Some(page_id);
        context.push_assistant(&confirmation);
        self.contexts.insert(context);
        Ok(())
    }

    /// Thread-reply path: fast-path duplicate resolution, then intent dispatch.
    pub async fn handle_reply(&self, channel: &str, thread_id: &str, text: &str) {
        let Some(context) = self.contexts.get(thread_id) else {
            self.post_soft(channel, thread_id, NO_CONTEXT_TEXT).await;
            return;
        };
        if let Err(err) = self.reply(channel, thread_id, text, context).await {
            error!(error = %err, thread_id, "thread reply failed");
            self.notify_failure(channel, thread_id).await;
        }
    }

    async fn reply(
        &self,
        channel: &str,
        thread_id: &str,
        text: &str,
        context: ThreadContext,
    ) -> Result<()> {
        // Fast path: a pending duplicate plus a literal "update"/"new" reply
        // resolves without an oracle call.
        if context.potential_duplicate.is_some() {
            let lower = text.to_lowercase();
            let choice = if lower.contains("update") {
                Some(DuplicateChoice::UpdateExisting)
            } else if lower.contains("new") {
                Some(DuplicateChoice::CreateNew)
            } else {
                None
            };
            if let Some(choice) = choice {
                let response = self.resolve_duplicate(&context, choice).await?;
                self.contexts.apply(thread_id, |ctx| {
                    ctx.push_exchange(text, &response);
                })?;
                self.messenger
                    .post_message(channel, &response, Some(thread_id))
                    .await?;
                return Ok(());
            }
        }

        let history: Vec<HistoryTurn<'_>> = context
            .messages
            .iter()
            .map(|message| HistoryTurn {
                role: message.role.as_str(),
                content: &message.content,
            })
            .collect();
        let intent = self
            .oracle
            .detect_thread_intent(
                &context.original_message,
                &context.classification,
                &history,
                text,
            )
            .await?;
        info!(thread_id, ?intent, "thread intent detected");

        match intent {
            ThreadIntent::CorrectCategory { category } => {
                let response = self.correct_category(&context, category).await?;
                self.record_exchange(thread_id, text, &response).await?;
                self.messenger
                    .post_message(channel, &response, Some(thread_id))
                    .await?;
            }
            ThreadIntent::UpdateField { field, value } => {
                let response = self.update_field(&context, &field, &value).await?;
                self.record_exchange(thread_id, text, &response).await?;
                self.messenger
                    .post_message(channel, &response, Some(thread_id))
                    .await?;
            }
            ThreadIntent::AddContext { context: note } => {
                let response = self.add_context(&context, &note).await?;
                self.record_exchange(thread_id, text, &response).await?;
                self.messenger
                    .post_message(channel, &response, Some(thread_id))
                    .await?;
            }
            ThreadIntent::CreateRelated {
                category,
                name,
                fields,
            } => {
                let response = self.create_related(category, &name, &fields).await?;
                self.record_exchange(thread_id, text, &response).await?;
                self.messenger
                    .post_message(channel, &response, Some(thread_id))
                    .await?;
            }
            ThreadIntent::Query { question } => {
                let answer =
                    query::run_query(self.oracle.as_ref(), self.store.as_ref(), &question).await?;
                self.contexts.apply(thread_id, |ctx| {
                    ctx.push_exchange(text, &answer);
                })?;
                self.messenger
                    .post_message(channel, &answer, Some(thread_id))
                    .await?;
            }
            ThreadIntent::Unclear => {
                let prompt = "I'm not sure what you'd like to do. Pick an option:";
                let options = self.disambiguation_options(&context, channel, thread_id);
                self.messenger
                    .post_interactive(channel, prompt, &options, Some(thread_id))
                    .await?;
                self.contexts.apply(thread_id, |ctx| {
                    ctx.push_exchange(text, prompt);
                    if ctx.state != ThreadState::Filed {
                        ctx.state = ThreadState::AwaitingDisambiguation;
                    }
                })?;
            }
        }
        Ok(())
    }

    /// Button-click path: decoded payloads re-enter the same transitions
    /// deterministically, bypassing intent detection.
    pub async fn handle_button(&self, payload: &ButtonActionPayload, message_id: &str) {
        let channel = payload.channel.clone();
        let thread_id = payload.thread_id.clone();
        let Some(context) = self.contexts.get(&thread_id) else {
            if let Err(err) = self
                .messenger
                .update_message(&channel, message_id, NO_CONTEXT_TEXT)
                .await
            {
                warn!(error = %err, "failed to report missing context");
            }
            return;
        };
        if let Err(err) = self.button(payload, message_id, context).await {
            error!(error = %err, thread_id, "button action failed");
            self.notify_failure(&channel, &thread_id).await;
        }
    }

    async fn button(
        &self,
        payload: &ButtonActionPayload,
        message_id: &str,
        context: ThreadContext,
    ) -> Result<()> {
        let channel = &payload.channel;
        let thread_id = &payload.thread_id;
        match payload.action {
            ButtonAction::CategorySelect => {
                let category = data_str(&payload.data, "category")
                    .and_then(|raw| raw.parse::<Category>().ok())
                    .ok_or_else(|| anyhow::anyhow!("category_select payload missing category"))?;
                let response = self.file_as(&context, category).await?;
                self.contexts.apply(thread_id, |ctx| {
                    ctx.push_assistant(&response);
                })?;
                self.messenger
                    .update_message(channel, message_id, &response)
                    .await?;
            }
            ButtonAction::DuplicateResolve => {
                let choice = match data_str(&payload.data, "choice") {
                    Some("update") => DuplicateChoice::UpdateExisting,
                    Some("new") => DuplicateChoice::CreateNew,
                    other => anyhow::bail!("duplicate_resolve payload had choice {other:?}"),
                };
                let response = self.resolve_duplicate(&context, choice).await?;
                self.contexts.apply(thread_id, |ctx| {
                    ctx.push_assistant(&response);
                })?;
                self.messenger
                    .update_message(channel, message_id, &response)
                    .await?;
            }
            ButtonAction::ThreadOption => match data_str(&payload.data, "option") {
                Some("change_category") => {
                    let options: Vec<ButtonOption> = Category::ALL
                        .iter()
                        .map(|category| ButtonOption {
                            label: category.label().to_string(),
                            payload: ButtonActionPayload::new(
                                ButtonAction::CategorySelect,
                                thread_id,
                                channel,
                                json!({"category": category.as_str()}),
                            ),
                        })
                        .collect();
                    self.messenger
                        .update_message(channel, message_id, "Pick the right category:")
                        .await?;
                    self.messenger
                        .post_interactive(
                            channel,
                            "Which category should this go under?",
                            &options,
                            Some(thread_id),
                        )
                        .await?;
                }
                Some("edit_fields") => {
                    self.messenger
                        .update_message(
                            channel,
                            message_id,
                            "Reply in this thread with the change, e.g. \"set status to waiting\".",
                        )
                        .await?;
                }
                Some("add_context") => {
                    self.messenger
                        .update_message(
                            channel,
                            message_id,
                            "Reply in this thread with the extra context to add.",
                        )
                        .await?;
                }
                Some("update_existing") | Some("create_new") => {
                    let choice = if data_str(&payload.data, "option") == Some("update_existing") {
                        DuplicateChoice::UpdateExisting
                    } else {
                        DuplicateChoice::CreateNew
                    };
                    let response = self.resolve_duplicate(&context, choice).await?;
                    self.contexts.apply(thread_id, |ctx| {
                        ctx.push_assistant(&response);
                    })?;
                    self.messenger
                        .update_message(channel, message_id, &response)
                        .await?;
                }
                other => anyhow::bail!("thread_option payload had option {other:?}"),
            },
        }
        Ok(())
    }

    /// Answer a query in the originating thread. Persists no context.
    async fn answer_in_thread(&self, channel: &str, thread_id: &str, question: &str) -> Result<()> {
        let answer =
            query::run_query(self.oracle.as_ref(), self.store.as_ref(), question).await?;
        self.messenger
            .post_message(channel, &answer, Some(thread_id))
            .await?;
        Ok(())
    }

    /// File the context's capture under `category`, superseding any earlier
    /// filing. Used by category buttons and category corrections.
    async fn file_as(&self, context: &ThreadContext, category: Category) -> Result<String> {
        let name = context.classification.name.clone();
        let page_id = self
            .store
            .create(category, &name, &context.classification.fields)
            .await?;
        self.contexts.apply(&context.thread_id, |ctx| {
            ctx.classification.category = category;
            ctx.page_id = Some(page_id.clone());
            ctx.potential_duplicate = None;
            ctx.state = ThreadState::Filed;
        })?;
        Ok(format!("Filed as {}: \"{}\".", category.label(), name))
    }

    async fn correct_category(
        &self,
        context: &ThreadContext,
        category: Category,
    ) -> Result<String> {
        // Same category and already filed: nothing to move.
        if context.page_id.is_some() && context.classification.category == category {
            return Ok(format!("Already categorized as {}.", category.label()));
        }
        self.file_as(context, category).await
    }

    async fn update_field(
        &self,
        context: &ThreadContext,
        field: &str,
        value: &str,
    ) -> Result<String> {
        let Some(page_id) = &context.page_id else {
            return Ok(NOT_FILED_TEXT.to_string());
        };
        let category = context.classification.category;
        if category.store_field(field).is_none() {
            return Ok(format!(
                "There's no \"{field}\" field on {} records.",
                category.label()
            ));
        }
        let mut fields = FieldMap::new();
        fields.insert(field.to_string(), value.to_string());
        self.store.update(category, page_id, &fields).await?;
        Ok(format!("Updated {field}."))
    }

    async fn add_context(&self, context: &ThreadContext, note: &str) -> Result<String> {
        let Some(page_id) = &context.page_id else {
            return Ok(NOT_FILED_TEXT.to_string());
        };
        let category = context.classification.category;
        self.store.append_note(category, page_id, note).await?;
        Ok(format!("Added that to {}.", category.note_field()))
    }

    /// File a brand-new, independent record without touching this thread's
    /// own filing.
    async fn create_related(
        &self,
        category: Category,
        name: &str,
        fields: &FieldMap,
    ) -> Result<String> {
        self.store.create(category, name, fields).await?;
        let related = Classification {
            category,
            confidence: RELATED_CAPTURE_CONFIDENCE,
            name: name.to_string(),
            fields: fields.clone(),
        };
        self.audit(name, &related).await;
        Ok(format!("Filed a new {}: \"{}\".", category.label(), name))
    }

    async fn resolve_duplicate(
        &self,
        context: &ThreadContext,
        choice: DuplicateChoice,
    ) -> Result<String> {
        let duplicate = context
            .potential_duplicate
            .clone()
            .ok_or_else(|| anyhow::anyhow!("no duplicate pending for thread"))?;
        let (page_id, response) = match choice {
            DuplicateChoice::UpdateExisting => {
                self.store
                    .update(
                        duplicate.category,
                        &duplicate.record_id,
                        &context.classification.fields,
                    )
                    .await?;
                (
                    duplicate.record_id.clone(),
                    format!(
                        "Updated the existing {} \"{}\".",
                        duplicate.category.label(),
                        duplicate.name
                    ),
                )
            }
            DuplicateChoice::CreateNew => {
                let created = self
                    .store
                    .create(
                        context.classification.category,
                        &context.classification.name,
                        &context.classification.fields,
                    )
                    .await?;
                (
                    created,
                    format!(
                        "Created a new {} \"{}\".",
                        context.classification.category.label(),
                        context.classification.name
                    ),
                )
            }
        };
        self.contexts.apply(&context.thread_id, |ctx| {
            ctx.potential_duplicate = None;
            ctx.page_id = Some(page_id.clone());
            ctx.state = ThreadState::Filed;
        })?;
        Ok(response)
    }

    fn disambiguation_options(
        &self,
        context: &ThreadContext,
        channel: &str,
        thread_id: &str,
    ) -> Vec<ButtonOption> {
        let mut options = vec![
            ("Change category", "change_category"),
            ("Edit fields", "edit_fields"),
            ("Add context", "add_context"),
        ];
        if context.potential_duplicate.is_some() {
            options.push(("Update existing", "update_existing"));
            options.push(("Create new", "create_new"));
        }
        options
            .into_iter()
            .map(|(label, option)| ButtonOption {
                label: label.to_string(),
                payload: ButtonActionPayload::new(
                    ButtonAction::ThreadOption,
                    thread_id,
                    channel,
                    json!({"option": option}),
                ),
            })
            .collect()
    }

    async fn record_exchange(&self, thread_id: &str, user: &str, assistant: &str) -> Result<()> {
        self.contexts.apply(thread_id, |ctx| {
            ctx.push_exchange(user, assistant);
        })?;
        Ok(())
    }

    /// Best-effort audit row; failures are logged and never block filing.
    async fn audit(&self, original_text: &str, classification: &Classification) {
        let destination = if classification.confidence < CONFIDENCE_THRESHOLD {
            "needs_review".to_string()
        } else {
            classification.category.to_string()
        };
        let entry = AuditEntry {
            original_text: original_text.to_string(),
            name: classification.name.clone(),
            confidence: classification.confidence,
            destination,
        };
        if let Err(err) = self.store.audit(&entry).await {
            warn!(error = %err, "audit write failed");
        }
    }

    async fn post_soft(&self, channel: &str, thread_id: &str, text: &str) {
        if let Err(err) = self
            .messenger
            .post_message(channel, text, Some(thread_id))
            .await
        {
            warn!(error = %err, "failed to post soft reply");
        }
    }

    async fn notify_failure(&self, channel: &str, thread_id: &str) {
        self.post_soft(channel, thread_id, FAILURE_TEXT).await;
    }
}

#[derive(Debug, Clone, Copy)]
enum DuplicateChoice {
    UpdateExisting,
    CreateNew,
}

fn data_str<'a>(data: &'a Value, key: &str) -> Option<&'a str> {
    data.get(key).and_then(Value::as_str)
}

fn confirmation_text(classification: &Classification, matches: &[ScoredMatch]) -> String {
    let mut text = format!(
        "Filed as {}: \"{}\" ({:.0}% confident).",
        classification.category.label(),
        classification.name,
        classification.confidence * 100.0
    );
    let weak: Vec<String> = matches
        .iter()
        .filter(|m| m.worth_mentioning() && !m.blocks_filing())
        .map(|m| format!("\"{}\" ({:.0}% match)", m.name, m.score * 100.0))
        .collect();
    if !weak.is_empty() {
        text.push_str(&format!("\nPossibly related: {}.", weak.join(", ")));
    }
    text
}
