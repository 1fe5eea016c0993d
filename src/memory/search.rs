//! Search orchestration on top of the repository's raw KNN primitive.
//!
//! Four modes share one contract: results are sorted by score descending,
//! ties broken by more-recent `created_at` first.
//!
//! Hybrid and filtered search oversample the vector candidate pool before
//! re-ranking. A naive top-k-then-filter would silently return fewer than
//! requested results (or wrong rankings) whenever the raw vector top-k does
//! not overlap with the text or predicate winners.

use std::collections::HashSet;

use rusqlite::Connection;

use crate::error::{EngramError, Result};
use crate::memory::repository;
use crate::memory::types::{FilterOp, FilterPredicate, SearchResult};

/// Candidate-pool sizing for the oversampled search modes.
#[derive(Debug, Clone, Copy)]
pub struct SearchTuning {
    pub oversample_factor: usize,
    pub min_candidates: usize,
}

impl SearchTuning {
    pub fn candidate_limit(&self, top_k: usize) -> usize {
        (top_k * self.oversample_factor).max(self.min_candidates)
    }
}

impl From<&crate::config::SearchConfig> for SearchTuning {
    fn from(c: &crate::config::SearchConfig) -> Self {
        Self {
            oversample_factor: c.oversample_factor,
            min_candidates: c.min_candidates,
        }
    }
}

/// Pure vector search: score is the raw KNN similarity.
pub fn vector_search(
    conn: &Connection,
    query_embedding: &[f32],
    top_k: usize,
) -> Result<Vec<SearchResult>> {
    let hits = repository::knn(conn, query_embedding, top_k)?;
    let mut results: Vec<SearchResult> = hits
        .into_iter()
        .map(|(memory, score)| SearchResult { memory, score })
        .collect();
    sort_results(&mut results);
    Ok(results)
}

/// Hybrid search: blends vector similarity with a token-overlap text score.
///
/// `final = alpha * vector_score + (1 - alpha) * text_score`. `alpha = 1.0`
/// degenerates to pure vector ranking, `alpha = 0.0` to pure text ranking
/// over the candidate pool.
pub fn hybrid_search(
    conn: &Connection,
    query_embedding: &[f32],
    query_text: &str,
    top_k: usize,
    alpha: f64,
    tuning: SearchTuning,
) -> Result<Vec<SearchResult>> {
    if !(0.0..=1.0).contains(&alpha) {
        return Err(EngramError::Validation(format!(
            "alpha must be within [0.0, 1.0], got {alpha}"
        )));
    }
    if top_k < 1 {
        return Err(EngramError::Validation("top_k must be >= 1".into()));
    }

    let candidates = repository::knn(conn, query_embedding, tuning.candidate_limit(top_k))?;

    let mut results: Vec<SearchResult> = candidates
        .into_iter()
        .map(|(memory, vector_score)| {
            let text = text_score(query_text, &memory.content);
            SearchResult {
                score: alpha * vector_score + (1.0 - alpha) * text,
                memory,
            }
        })
        .collect();

    sort_results(&mut results);
    results.truncate(top_k);
    Ok(results)
}

/// Vector search over an oversampled candidate pool, filtered by a
/// conjunction of metadata predicates, then truncated to `top_k`.
pub fn filtered_search(
    conn: &Connection,
    query_embedding: &[f32],
    top_k: usize,
    filters: &[FilterPredicate],
    tuning: SearchTuning,
) -> Result<Vec<SearchResult>> {
    if top_k < 1 {
        return Err(EngramError::Validation("top_k must be >= 1".into()));
    }

    let candidates = repository::knn(conn, query_embedding, tuning.candidate_limit(top_k))?;

    let mut results: Vec<SearchResult> = candidates
        .into_iter()
        .filter(|(memory, _)| filters.iter().all(|p| matches_predicate(memory, p)))
        .map(|(memory, score)| SearchResult { memory, score })
        .collect();

    sort_results(&mut results);
    results.truncate(top_k);
    Ok(results)
}

/// Find memories similar to an existing one, using its stored embedding as
/// the query vector (no recomputation). The reference memory itself is
/// excluded from the results.
pub fn similar_search(
    conn: &Connection,
    memory_id: &str,
    top_k: usize,
) -> Result<Vec<SearchResult>> {
    if top_k < 1 {
        return Err(EngramError::Validation("top_k must be >= 1".into()));
    }

    let embedding = repository::get_embedding(conn, memory_id)?;

    // Over-fetch by one so excluding the reference still fills top_k.
    let hits = repository::knn(conn, &embedding, top_k + 1)?;
    let mut results: Vec<SearchResult> = hits
        .into_iter()
        .filter(|(memory, _)| memory.id != memory_id)
        .map(|(memory, score)| SearchResult { memory, score })
        .collect();

    sort_results(&mut results);
    results.truncate(top_k);
    Ok(results)
}

/// Token/substring overlap between query and content, normalized to [0, 1].
///
/// The fraction of query tokens that appear in the content, either as a whole
/// token or as a substring (so "deploy" matches "deployed").
pub fn text_score(query: &str, content: &str) -> f64 {
    let query_tokens = tokenize(query);
    if query_tokens.is_empty() {
        return 0.0;
    }

    let content_lower = content.to_lowercase();
    let content_tokens: HashSet<String> = tokenize(content).into_iter().collect();

    let matched = query_tokens
        .iter()
        .filter(|t| content_tokens.contains(*t) || content_lower.contains(*t))
        .count();

    matched as f64 / query_tokens.len() as f64
}

fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// Evaluate one predicate against a memory.
///
/// Field resolution: the built-in fields `client_id`, `content`, and
/// `created_at`, then metadata keys. A missing field or a comparison across
/// incompatible value kinds evaluates to false — it excludes the record
/// rather than raising.
pub fn matches_predicate(memory: &crate::memory::types::Memory, p: &FilterPredicate) -> bool {
    let actual = match p.field.as_str() {
        "client_id" => serde_json::Value::String(memory.client_id.clone()),
        "content" => serde_json::Value::String(memory.content.clone()),
        "created_at" => serde_json::Value::String(memory.created_at.clone()),
        field => match memory
            .metadata
            .as_ref()
            .and_then(|m| m.get(field))
        {
            Some(v) => v.clone(),
            None => return false,
        },
    };
    compare(p.op, &actual, &p.value)
}

fn compare(op: FilterOp, actual: &serde_json::Value, expected: &serde_json::Value) -> bool {
    use serde_json::Value;
    match (actual, expected) {
        (Value::String(a), Value::String(e)) => match op {
            FilterOp::Eq => a == e,
            FilterOp::Neq => a != e,
            FilterOp::Gt => a > e,
            FilterOp::Lt => a < e,
            FilterOp::Gte => a >= e,
            FilterOp::Lte => a <= e,
            FilterOp::Contains => a.contains(e.as_str()),
        },
        (Value::Number(a), Value::Number(e)) => {
            match (a.as_f64(), e.as_f64()) {
                (Some(a), Some(e)) => match op {
                    FilterOp::Eq => a == e,
                    FilterOp::Neq => a != e,
                    FilterOp::Gt => a > e,
                    FilterOp::Lt => a < e,
                    FilterOp::Gte => a >= e,
                    FilterOp::Lte => a <= e,
                    FilterOp::Contains => false,
                },
                _ => false,
            }
        }
        (Value::Bool(a), Value::Bool(e)) => match op {
            FilterOp::Eq => a == e,
            FilterOp::Neq => a != e,
            _ => false,
        },
        (Value::Array(items), e) => match op {
            FilterOp::Contains => items.contains(e),
            FilterOp::Eq => actual == e,
            FilterOp::Neq => actual != e,
            _ => false,
        },
        // Incompatible kinds never match
        _ => false,
    }
}

/// Canonical result ordering: score descending, then created_at descending so
/// more recent memories win ties. Stable and deterministic.
fn sort_results(results: &mut [SearchResult]) {
    results.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| b.memory.created_at.cmp(&a.memory.created_at))
    });
}
