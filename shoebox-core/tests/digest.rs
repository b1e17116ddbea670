//! Digest job behavior against in-memory gateways.

mod common;

use common::{MockMessenger, MockStore};
use shoebox_core::core::digest::{run_digest, DigestPeriod};
use shoebox_core::store::schema::Category;
use shoebox_core::store::StoreRecord;

const CHANNEL: &str = "C024BE91L";

fn record(id: &str, name: &str) -> StoreRecord {
    StoreRecord {
        id: id.to_string(),
        name: name.to_string(),
        nicknames: Vec::new(),
    }
}

#[tokio::test]
async fn digest_lists_recent_records_per_category() {
    let store = MockStore::default();
    store.recent_hits.lock().expect("lock").insert(
        Category::Person,
        vec![record("p1", "Sarah"), record("p2", "Miguel")],
    );
    store
        .recent_hits
        .lock()
        .expect("lock")
        .insert(Category::Idea, vec![record("i1", "Curated newsletter")]);
    let messenger = MockMessenger::default();

    run_digest(&store, &messenger, CHANNEL, DigestPeriod::Daily).await;

    let text = messenger.last_post();
    assert!(text.contains("Captured in the last day"));
    assert!(text.contains("Person (2)"));
    assert!(text.contains("\"Sarah\""));
    assert!(text.contains("Idea (1)"));
    assert!(text.contains("\"Curated newsletter\""));
}

#[tokio::test]
async fn empty_digest_still_posts() {
    let store = MockStore::default();
    let messenger = MockMessenger::default();

    run_digest(&store, &messenger, CHANNEL, DigestPeriod::Weekly).await;

    assert_eq!(messenger.post_count(), 1);
    assert!(messenger.last_post().contains("nothing new"));
}

#[tokio::test]
async fn failing_category_does_not_sink_the_digest() {
    let store = MockStore::default();
    store
        .failing_recent
        .lock()
        .expect("lock")
        .push(Category::Person);
    store
        .recent_hits
        .lock()
        .expect("lock")
        .insert(Category::Project, vec![record("r1", "Website redesign")]);
    let messenger = MockMessenger::default();

    run_digest(&store, &messenger, CHANNEL, DigestPeriod::Daily).await;

    assert_eq!(messenger.post_count(), 1);
    let text = messenger.last_post();
    assert!(text.contains("Project (1)"));
    assert!(text.contains("\"Website redesign\""));
}
