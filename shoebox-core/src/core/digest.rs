//! Scheduled surfacing: read recent records, summarize, post to the digest
//! channel. Best-effort background work; failures are logged, never surfaced
//! to the user.

use crate::chat::Messenger;
use crate::store::schema::Category;
use crate::store::StoreGateway;
use chrono::{Duration, Utc};
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DigestPeriod {
    Daily,
    Weekly,
}

impl DigestPeriod {
    fn lookback(&self) -> Duration {
        match self {
            DigestPeriod::Daily => Duration::days(1),
            DigestPeriod::Weekly => Duration::days(7),
        }
    }

    fn heading(&self) -> &'static str {
        match self {
            DigestPeriod::Daily => "Captured in the last day",
            DigestPeriod::Weekly => "Captured in the last week",
        }
    }
}

/// Post a digest of recent captures. Returns quietly on failure.
pub async fn run_digest(
    store: &dyn StoreGateway,
    messenger: &dyn Messenger,
    channel: &str,
    period: DigestPeriod,
) {
    let since = Utc::now() - period.lookback();
    let mut sections: Vec<String> = Vec::new();
    let mut total = 0usize;

    for category in Category::ALL {
        match store.recent(category, since).await {
            Ok(records) if !records.is_empty() => {
                total += records.len();
                let names: Vec<String> = records
                    .iter()
                    .map(|record| format!("\"{}\"", record.name))
                    .collect();
                sections.push(format!(
                    "{} ({}): {}",
                    category.label(),
                    records.len(),
                    names.join(", ")
                ));
            }
            Ok(_) => {}
            // Best effort: a failed category read doesn't sink the rest.
            Err(err) => {
                warn!(category = %category, error = %err, "digest read failed");
            }
        }
    }

    let text = if total == 0 {
        format!("{}: nothing new.", period.heading())
    } else {
        format!("{}:\n{}", period.heading(), sections.join("\n"))
    };
    if let Err(err) = messenger.post_message(channel, &text, None).await {
        warn!(error = %err, "digest post failed");
    }
}
