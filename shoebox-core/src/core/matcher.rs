//! Name similarity scoring and store-backed duplicate search.

use crate::config::constants::{
    DUPLICATE_BLOCK_THRESHOLD, NICKNAME_SCALE, WEAK_MATCH_THRESHOLD, WORD_OVERLAP_SCALE,
};
use crate::store::schema::Category;
use crate::store::{StoreError, StoreGateway};

/// A candidate record with its similarity to the query.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredMatch {
    pub record_id: String,
    pub name: String,
    pub category: Category,
    pub score: f64,
}

impl ScoredMatch {
    /// Strong enough to block auto-filing.
    pub fn blocks_filing(&self) -> bool {
        self.score > DUPLICATE_BLOCK_THRESHOLD
    }

    /// Worth mentioning on the confirmation, but never blocking.
    pub fn worth_mentioning(&self) -> bool {
        self.score > WEAK_MATCH_THRESHOLD
    }
}

/// Score how alike two names are.
///
/// Exact case-insensitive match is 1.0. Containment either direction scores
/// by length ratio. Otherwise the fraction of query words that substring-match
/// a candidate word, scaled down; disjoint names score 0.
pub fn similarity(query: &str, candidate: &str) -> f64 {
    let q = query.trim().to_lowercase();
    let c = candidate.trim().to_lowercase();
    if q.is_empty() || c.is_empty() {
        return 0.0;
    }
    if q == c {
        return 1.0;
    }
    if q.contains(&c) || c.contains(&q) {
        let (shorter, longer) = if q.len() < c.len() {
            (q.len(), c.len())
        } else {
            (c.len(), q.len())
        };
        return shorter as f64 / longer as f64;
    }

    let query_words: Vec<&str> = q.split_whitespace().collect();
    let candidate_words: Vec<&str> = c.split_whitespace().collect();
    if query_words.is_empty() {
        return 0.0;
    }
    let overlapping = query_words
        .iter()
        .filter(|qw| {
            candidate_words
                .iter()
                .any(|cw| cw.contains(*qw) || qw.contains(cw))
        })
        .count();
    if overlapping == 0 {
        return 0.0;
    }
    (overlapping as f64 / query_words.len() as f64) * WORD_OVERLAP_SCALE
}

/// Search `category` for records whose name resembles `name`, best first.
///
/// For the person category only, if no title match scores above zero, the
/// alternate-name field is searched as a fallback, taking the single best
/// nickname score per record, scaled down.
pub async fn find_matches(
    store: &dyn StoreGateway,
    category: Category,
    name: &str,
) -> Result<Vec<ScoredMatch>, StoreError> {
    let mut matches: Vec<ScoredMatch> = store
        .search_by_title(category, name)
        .await?
        .into_iter()
        .map(|record| ScoredMatch {
            score: similarity(name, &record.name),
            record_id: record.id,
            name: record.name,
            category,
        })
        .filter(|m| m.score > 0.0)
        .collect();

    if matches.is_empty() && category == Category::Person {
        matches = store
            .search_by_nickname(name)
            .await?
            .into_iter()
            .filter_map(|record| {
                let best = record
                    .nicknames
                    .iter()
                    .map(|nickname| similarity(name, nickname))
                    .fold(0.0_f64, f64::max);
                if best > 0.0 {
                    Some(ScoredMatch {
                        score: best * NICKNAME_SCALE,
                        record_id: record.id,
                        name: record.name,
                        category,
                    })
                } else {
                    None
                }
            })
            .collect();
    }

    matches.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    Ok(matches)
}
