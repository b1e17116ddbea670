//! Free-text query flow: search every collection, hand the hits to the
//! oracle, return its prose answer.

use crate::config::constants::MAX_QUERY_RESULTS;
use crate::core::matcher::{self, ScoredMatch};
use crate::llm::oracle::{Oracle, OracleError};
use crate::store::schema::Category;
use crate::store::StoreGateway;
use futures::future::join_all;

#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    #[error(transparent)]
    Oracle(#[from] OracleError),
    #[error("search failed: {0}")]
    Search(#[from] crate::store::StoreError),
}

/// Answer a question against everything captured so far.
pub async fn run_query(
    oracle: &dyn Oracle,
    store: &dyn StoreGateway,
    question: &str,
) -> Result<String, QueryError> {
    let searches = Category::ALL
        .iter()
        .map(|category| matcher::find_matches(store, *category, question));
    let mut hits: Vec<ScoredMatch> = Vec::new();
    for result in join_all(searches).await {
        hits.extend(result?);
    }
    hits.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    hits.truncate(MAX_QUERY_RESULTS);

    let results_text = format_results(&hits);
    Ok(oracle.answer_query(question, &results_text).await?)
}

pub fn format_results(hits: &[ScoredMatch]) -> String {
    if hits.is_empty() {
        return "(no matching records)".to_string();
    }
    hits.iter()
        .map(|hit| {
            format!(
                "- {}: \"{}\" (match: {:.0}%)",
                hit.category,
                hit.name,
                hit.score * 100.0
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn results_format_as_compact_bullets() {
        let hits = vec![
            ScoredMatch {
                record_id: "r1".into(),
                name: "Sarah Connor".into(),
                category: Category::Person,
                score: 0.85,
            },
            ScoredMatch {
                record_id: "r2".into(),
                name: "Website redesign".into(),
                category: Category::Project,
                score: 0.4,
            },
        ];
        let text = format_results(&hits);
        assert!(text.contains("person: \"Sarah Connor\" (match: 85%)"));
        assert!(text.contains("project: \"Website redesign\" (match: 40%)"));
    }

    #[test]
    fn empty_results_have_a_placeholder() {
        assert_eq!(format_results(&[]), "(no matching records)");
    }
}
