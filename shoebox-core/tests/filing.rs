//! End-to-end state machine scenarios against in-memory gateways.

mod common;

use common::{classification, harness, MockOracle, MockStore};
use serde_json::json;
use shoebox_core::chat::payload::{ButtonAction, ButtonActionPayload};
use shoebox_core::core::context::{DuplicateCandidate, ThreadContext, ThreadState};
use shoebox_core::llm::{FieldMap, MessageIntent, MessageIntentKind, ThreadIntent};
use shoebox_core::store::schema::Category;
use std::sync::atomic::Ordering;

const CHANNEL: &str = "C024BE91L";
const THREAD: &str = "1724873.000100";

fn filed_context(h: &common::Harness, category: Category, name: &str, page_id: &str) {
    let mut context = ThreadContext::new(
        THREAD,
        CHANNEL,
        "original capture",
        classification(category, 0.9, name),
        ThreadState::Filed,
    );
    context.page_id = Some(page_id.to_string());
    h.contexts.insert(context);
}

fn duplicate_pending_context(h: &common::Harness, dup_id: &str, dup_name: &str) {
    let mut context = ThreadContext::new(
        THREAD,
        CHANNEL,
        "Met coffee with Sarah",
        classification(Category::Person, 0.9, "Sarah"),
        ThreadState::AwaitingDuplicateResolution,
    );
    context.potential_duplicate = Some(DuplicateCandidate {
        record_id: dup_id.to_string(),
        name: dup_name.to_string(),
        category: Category::Person,
        score: 0.92,
    });
    h.contexts.insert(context);
}

#[tokio::test]
async fn confident_unique_capture_files_exactly_one_record() {
    let h = harness(
        MockOracle::classifying(classification(Category::Person, 0.91, "Sarah")),
        MockStore::default(),
    );

    h.filer
        .handle_capture(CHANNEL, THREAD, "Met coffee with Sarah, she's job hunting")
        .await;

    let created = h.store.created.lock().expect("lock");
    assert_eq!(created.len(), 1);
    assert_eq!(created[0].category, Category::Person);
    assert_eq!(created[0].name, "Sarah");

    let context = h.contexts.get(THREAD).expect("context registered");
    assert_eq!(context.state, ThreadState::Filed);
    assert_eq!(context.page_id.as_deref(), Some("page-1"));
    assert!(context.potential_duplicate.is_none());

    let confirmation = h.messenger.last_post();
    assert!(confirmation.contains("Person"));
    assert!(confirmation.contains("Sarah"));
    assert!(confirmation.contains("91%"));

    // The original message gets a checkmark.
    let reactions = h.messenger.reactions.lock().expect("lock");
    assert_eq!(reactions.len(), 1);
    assert_eq!(reactions[0].0, THREAD);
}

#[tokio::test]
async fn low_confidence_capture_files_nothing_and_asks_for_category() {
    let h = harness(
        MockOracle::classifying(classification(Category::Idea, 0.4, "some thought")),
        MockStore::default(),
    );

    h.filer.handle_capture(CHANNEL, THREAD, "hmm maybe").await;

    assert_eq!(h.store.created_count(), 0);

    let interactives = h.messenger.interactives.lock().expect("lock");
    assert_eq!(interactives.len(), 1);
    assert_eq!(
        interactives[0].labels,
        vec!["Person", "Project", "Idea", "Admin"]
    );

    let context = h.contexts.get(THREAD).expect("context registered");
    assert_eq!(context.state, ThreadState::AwaitingCategory);
    assert!(context.page_id.is_none());
    assert_eq!(context.classification.confidence, 0.4);

    let audits = h.store.audits.lock().expect("lock");
    assert_eq!(audits.len(), 1);
    assert_eq!(audits[0].destination, "needs_review");
}

#[tokio::test]
async fn strong_duplicate_blocks_filing_and_offers_resolution() {
    // "Sarah Connor" vs existing "Sarah Connors": containment, 12/13 ~ 0.92.
    let h = harness(
        MockOracle::classifying(classification(Category::Person, 0.9, "Sarah Connor")),
        MockStore::with_title_hit(Category::Person, "existing-1", "Sarah Connors"),
    );

    h.filer
        .handle_capture(CHANNEL, THREAD, "Sarah Connor pinged me about the role")
        .await;

    assert_eq!(h.store.created_count(), 0);

    let interactives = h.messenger.interactives.lock().expect("lock");
    assert_eq!(interactives.len(), 1);
    assert_eq!(interactives[0].labels, vec!["Update existing", "Create new"]);

    let context = h.contexts.get(THREAD).expect("context registered");
    assert_eq!(context.state, ThreadState::AwaitingDuplicateResolution);
    let duplicate = context.potential_duplicate.expect("duplicate pending");
    assert_eq!(duplicate.record_id, "existing-1");
    assert!(duplicate.score > 0.8);
}

#[tokio::test]
async fn weak_duplicate_is_mentioned_but_does_not_block() {
    // "Sarah" vs "Sarah Connor": 5/12 ~ 0.42 would not be mentioned; use a
    // closer name so the score lands between the thresholds.
    let h = harness(
        MockOracle::classifying(classification(Category::Person, 0.9, "Sarah Con")),
        MockStore::with_title_hit(Category::Person, "existing-1", "Sarah Connor"),
    );

    h.filer.handle_capture(CHANNEL, THREAD, "Sarah Con update").await;

    assert_eq!(h.store.created_count(), 1);
    let confirmation = h.messenger.last_post();
    assert!(confirmation.contains("Possibly related"));
    assert!(confirmation.contains("Sarah Connor"));
}

#[tokio::test]
async fn reply_update_resolves_duplicate_without_intent_detection() {
    let h = harness(MockOracle::default(), MockStore::default());
    duplicate_pending_context(&h, "existing-1", "Sarah Connors");

    h.filer
        .handle_reply(CHANNEL, THREAD, "update the existing one please")
        .await;

    assert_eq!(h.oracle.thread_intent_calls.load(Ordering::SeqCst), 0);
    assert_eq!(h.store.created_count(), 0);

    let updates = h.store.updates.lock().expect("lock");
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0].1, "existing-1");

    let context = h.contexts.get(THREAD).expect("context");
    assert!(context.potential_duplicate.is_none());
    assert_eq!(context.page_id.as_deref(), Some("existing-1"));
    assert_eq!(context.state, ThreadState::Filed);
    assert_eq!(context.messages.len(), 2);
}

#[tokio::test]
async fn reply_new_resolves_duplicate_by_creating() {
    let h = harness(MockOracle::default(), MockStore::default());
    duplicate_pending_context(&h, "existing-1", "Sarah Connors");

    h.filer.handle_reply(CHANNEL, THREAD, "new").await;

    assert_eq!(h.store.created_count(), 1);
    let context = h.contexts.get(THREAD).expect("context");
    assert!(context.potential_duplicate.is_none());
    assert_eq!(context.page_id.as_deref(), Some("page-1"));
}

#[tokio::test]
async fn same_category_correction_does_not_refile() {
    let h = harness(
        MockOracle::with_thread_intent(ThreadIntent::CorrectCategory {
            category: Category::Person,
        }),
        MockStore::default(),
    );
    filed_context(&h, Category::Person, "Sarah", "page-7");

    h.filer.handle_reply(CHANNEL, THREAD, "she's a person").await;

    assert_eq!(h.store.created_count(), 0);
    assert!(h.messenger.last_post().contains("Already categorized as Person"));
    let context = h.contexts.get(THREAD).expect("context");
    assert_eq!(context.page_id.as_deref(), Some("page-7"));
}

#[tokio::test]
async fn category_correction_refiles_under_new_destination() {
    let h = harness(
        MockOracle::with_thread_intent(ThreadIntent::CorrectCategory {
            category: Category::Project,
        }),
        MockStore::default(),
    );
    filed_context(&h, Category::Idea, "Launch newsletter", "page-7");

    h.filer
        .handle_reply(CHANNEL, THREAD, "actually that's a project")
        .await;

    let created = h.store.created.lock().expect("lock");
    assert_eq!(created.len(), 1);
    assert_eq!(created[0].category, Category::Project);
    drop(created);

    let context = h.contexts.get(THREAD).expect("context");
    assert_eq!(context.classification.category, Category::Project);
    assert_eq!(context.page_id.as_deref(), Some("page-1"));
    assert_eq!(context.state, ThreadState::Filed);
}

#[tokio::test]
async fn update_field_patches_only_the_named_field() {
    let h = harness(
        MockOracle::with_thread_intent(ThreadIntent::UpdateField {
            field: "status".into(),
            value: "waiting".into(),
        }),
        MockStore::default(),
    );
    filed_context(&h, Category::Project, "Launch newsletter", "page-7");

    h.filer
        .handle_reply(CHANNEL, THREAD, "set status to waiting")
        .await;

    let updates = h.store.updates.lock().expect("lock");
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0].1, "page-7");
    assert_eq!(updates[0].2.get("status").map(String::as_str), Some("waiting"));
}

#[tokio::test]
async fn update_field_before_filing_fails_softly() {
    let h = harness(
        MockOracle::with_thread_intent(ThreadIntent::UpdateField {
            field: "status".into(),
            value: "waiting".into(),
        }),
        MockStore::default(),
    );
    h.contexts.insert(ThreadContext::new(
        THREAD,
        CHANNEL,
        "hmm",
        classification(Category::Project, 0.4, "Launch newsletter"),
        ThreadState::AwaitingCategory,
    ));

    h.filer.handle_reply(CHANNEL, THREAD, "set status").await;

    assert!(h.store.updates.lock().expect("lock").is_empty());
    assert!(h.messenger.last_post().contains("nothing has been filed"));
}

#[tokio::test]
async fn unknown_field_for_category_fails_softly() {
    let h = harness(
        MockOracle::with_thread_intent(ThreadIntent::UpdateField {
            field: "due_date".into(),
            value: "friday".into(),
        }),
        MockStore::default(),
    );
    filed_context(&h, Category::Idea, "Launch newsletter", "page-7");

    h.filer.handle_reply(CHANNEL, THREAD, "due friday").await;

    assert!(h.store.updates.lock().expect("lock").is_empty());
    assert!(h.messenger.last_post().contains("no \"due_date\" field"));
}

#[tokio::test]
async fn add_context_appends_to_note_field() {
    let h = harness(
        MockOracle::with_thread_intent(ThreadIntent::AddContext {
            context: "met at RustConf".into(),
        }),
        MockStore::default(),
    );
    filed_context(&h, Category::Person, "Sarah", "page-7");

    h.filer.handle_reply(CHANNEL, THREAD, "met at RustConf").await;

    let notes = h.store.notes.lock().expect("lock");
    assert_eq!(notes.len(), 1);
    assert_eq!(notes[0], ("page-7".to_string(), "met at RustConf".to_string()));
}

#[tokio::test]
async fn create_related_files_independent_record() {
    let mut fields = FieldMap::new();
    fields.insert("due_date".into(), "2026-09-15".into());
    let h = harness(
        MockOracle::with_thread_intent(ThreadIntent::CreateRelated {
            category: Category::Admin,
            name: "Renew passport".into(),
            fields,
        }),
        MockStore::default(),
    );
    filed_context(&h, Category::Person, "Sarah", "page-7");

    h.filer
        .handle_reply(CHANNEL, THREAD, "also remind me to renew my passport")
        .await;

    let created = h.store.created.lock().expect("lock");
    assert_eq!(created.len(), 1);
    assert_eq!(created[0].category, Category::Admin);
    drop(created);

    // The thread's own filing is untouched.
    let context = h.contexts.get(THREAD).expect("context");
    assert_eq!(context.page_id.as_deref(), Some("page-7"));

    // Related captures audit with the fixed policy confidence.
    let audits = h.store.audits.lock().expect("lock");
    assert_eq!(audits.len(), 1);
    assert_eq!(audits[0].confidence, 0.9);
}

#[tokio::test]
async fn unclear_reply_presents_option_menu() {
    let h = harness(MockOracle::default(), MockStore::default());
    duplicate_pending_context(&h, "existing-1", "Sarah Connors");

    h.filer.handle_reply(CHANNEL, THREAD, "hmm what").await;

    let interactives = h.messenger.interactives.lock().expect("lock");
    assert_eq!(interactives.len(), 1);
    assert_eq!(
        interactives[0].labels,
        vec![
            "Change category",
            "Edit fields",
            "Add context",
            "Update existing",
            "Create new"
        ]
    );
}

#[tokio::test]
async fn reply_without_context_asks_to_start_fresh() {
    let h = harness(MockOracle::default(), MockStore::default());

    h.filer.handle_reply(CHANNEL, "unknown-thread", "update it").await;

    assert!(h.messenger.last_post().contains("start fresh"));
    assert_eq!(h.store.created_count(), 0);
}

#[tokio::test]
async fn category_button_files_under_selected_category() {
    let h = harness(MockOracle::default(), MockStore::default());
    h.contexts.insert(ThreadContext::new(
        THREAD,
        CHANNEL,
        "hmm maybe",
        classification(Category::Idea, 0.4, "some thought"),
        ThreadState::AwaitingCategory,
    ));

    let payload = ButtonActionPayload::new(
        ButtonAction::CategorySelect,
        THREAD,
        CHANNEL,
        json!({"category": "admin"}),
    );
    h.filer.handle_button(&payload, "msg-1").await;

    let created = h.store.created.lock().expect("lock");
    assert_eq!(created.len(), 1);
    assert_eq!(created[0].category, Category::Admin);
    drop(created);

    let context = h.contexts.get(THREAD).expect("context");
    assert_eq!(context.state, ThreadState::Filed);
    assert_eq!(context.classification.category, Category::Admin);

    // The interactive prompt was replaced with a confirmation.
    let updates = h.messenger.updates.lock().expect("lock");
    assert_eq!(updates.len(), 1);
    assert!(updates[0].1.contains("Admin"));
}

#[tokio::test]
async fn duplicate_button_update_patches_existing_record() {
    let h = harness(MockOracle::default(), MockStore::default());
    duplicate_pending_context(&h, "existing-1", "Sarah Connors");

    let payload = ButtonActionPayload::new(
        ButtonAction::DuplicateResolve,
        THREAD,
        CHANNEL,
        json!({"choice": "update"}),
    );
    h.filer.handle_button(&payload, "msg-1").await;

    assert_eq!(h.store.created_count(), 0);
    let updates = h.store.updates.lock().expect("lock");
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0].1, "existing-1");
    drop(updates);

    let context = h.contexts.get(THREAD).expect("context");
    assert_eq!(context.page_id.as_deref(), Some("existing-1"));
    assert!(context.potential_duplicate.is_none());
}

#[tokio::test]
async fn query_reply_answers_and_appends_history_only() {
    let h = harness(
        MockOracle::with_thread_intent(ThreadIntent::Query {
            question: "what is Sarah up to?".into(),
        }),
        MockStore::default(),
    );
    *h.oracle.answer.lock().expect("lock") = "Sarah is job hunting.".to_string();
    filed_context(&h, Category::Person, "Sarah", "page-7");

    h.filer
        .handle_reply(CHANNEL, THREAD, "what is Sarah up to?")
        .await;

    assert!(h.messenger.last_post().contains("job hunting"));
    let context = h.contexts.get(THREAD).expect("context");
    assert_eq!(context.page_id.as_deref(), Some("page-7"));
    assert_eq!(context.messages.len(), 2);
    assert_eq!(h.store.created_count(), 0);
}

#[tokio::test]
async fn top_level_question_routes_to_query_and_persists_nothing() {
    let h = harness(MockOracle::default(), MockStore::default());
    *h.oracle.message_intent.lock().expect("lock") = Some(MessageIntent {
        kind: MessageIntentKind::Query,
        confidence: 0.9,
    });
    *h.oracle.answer.lock().expect("lock") =
        "Your newsletter idea was about curated links.".to_string();

    h.filer
        .handle_message(CHANNEL, THREAD, "what was that idea about newsletters?")
        .await;

    assert!(h.messenger.last_post().contains("newsletter idea"));
    assert_eq!(h.store.created_count(), 0);
    assert_eq!(h.oracle.classify_calls.load(Ordering::SeqCst), 0);
    assert!(h.contexts.get(THREAD).is_none());
}

#[tokio::test]
async fn top_level_capture_intent_routes_through_classification() {
    let h = harness(
        MockOracle::classifying(classification(Category::Person, 0.91, "Sarah")),
        MockStore::default(),
    );
    *h.oracle.message_intent.lock().expect("lock") = Some(MessageIntent {
        kind: MessageIntentKind::Capture,
        confidence: 0.9,
    });

    h.filer
        .handle_message(CHANNEL, THREAD, "Met coffee with Sarah")
        .await;

    assert_eq!(h.oracle.classify_calls.load(Ordering::SeqCst), 1);
    assert_eq!(h.store.created_count(), 1);
    assert!(h.contexts.get(THREAD).is_some());
}

#[tokio::test]
async fn oracle_failure_during_capture_leaves_no_context() {
    let h = harness(MockOracle::default(), MockStore::default());

    h.filer.handle_capture(CHANNEL, THREAD, "anything").await;

    assert!(h.contexts.get(THREAD).is_none());
    assert_eq!(h.store.created_count(), 0);
    assert!(h.messenger.last_post().contains("something went wrong"));
}
