//! Hybrid search: lexical (FTS5) and semantic (vector) candidates merged
//! with fixed weights.
//!
//! Each channel overfetches `2 × limit` candidates, scores are normalized
//! into `[0, 1]`, and the combined score is `0.6 × vec + 0.4 × fts` with a
//! missing channel contributing zero. When the embedding call fails the
//! search degrades to lexical-only rather than erroring.

use std::collections::HashMap;

use sqlx::Row;

use crate::embedding::{self, Embedder};
use crate::error::Result;
use crate::models::SearchResult;
use crate::store::Store;

const VEC_WEIGHT: f64 = 0.6;
const FTS_WEIGHT: f64 = 0.4;
const SNIPPET_CHARS: usize = 500;

/// Rewrite free text into an FTS5 MATCH expression.
///
/// Every whitespace-separated term is double-quoted (with embedded quotes
/// doubled), so user input can never be parsed as FTS5 syntax. Terms are
/// implicitly ANDed.
pub fn fts_match_expr(query: &str) -> String {
    query
        .split_whitespace()
        .map(|term| format!("\"{}\"", term.replace('"', "\"\"")))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Merge per-channel scores into combined scores, one entry per unique id.
pub fn hybrid_scores(
    vec_scores: &[(String, f64)],
    fts_scores: &[(String, f64)],
) -> Vec<(String, f64)> {
    let vec_map: HashMap<&str, f64> = vec_scores.iter().map(|(id, s)| (id.as_str(), *s)).collect();
    let fts_map: HashMap<&str, f64> = fts_scores.iter().map(|(id, s)| (id.as_str(), *s)).collect();

    let mut ids: Vec<&str> = vec_map.keys().chain(fts_map.keys()).copied().collect();
    ids.sort_unstable();
    ids.dedup();

    let mut combined: Vec<(String, f64)> = ids
        .into_iter()
        .map(|id| {
            let v = vec_map.get(id).copied().unwrap_or(0.0);
            let f = fts_map.get(id).copied().unwrap_or(0.0);
            (id.to_string(), VEC_WEIGHT * v + FTS_WEIGHT * f)
        })
        .collect();

    combined.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.0.cmp(&b.0))
    });
    combined
}

/// Run a hybrid search over the store.
///
/// `source_types`, when non-empty, restricts both channels to those
/// source types before ranking.
pub async fn hybrid_search(
    store: &Store,
    embedder: &dyn Embedder,
    query: &str,
    limit: usize,
    source_types: &[String],
) -> Result<Vec<SearchResult>> {
    if query.trim().is_empty() || limit == 0 {
        return Ok(Vec::new());
    }

    let candidate_k = (limit * 2) as i64;

    let fts_scores = fetch_fts_scores(store, query, candidate_k, source_types).await?;

    let vec_scores = match embedder.embed(query).await {
        Ok(query_vec) => fetch_vector_scores(store, &query_vec, candidate_k, source_types).await?,
        Err(err) => {
            tracing::warn!("query embedding failed, using lexical scores only: {}", err);
            Vec::new()
        }
    };

    if fts_scores.is_empty() && vec_scores.is_empty() {
        return Ok(Vec::new());
    }

    let mut combined = hybrid_scores(&vec_scores, &fts_scores);
    combined.truncate(limit * 2);

    // Hydrate rows and re-sort deterministically.
    let mut results: Vec<SearchResult> = Vec::with_capacity(combined.len());
    for (id, score) in &combined {
        let row = sqlx::query(
            r#"
            SELECT id, title, body, source_type, source_url, collection_id,
                   upstream_doc_id, updated_at
            FROM content WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(store.pool())
        .await?;

        if let Some(row) = row {
            let body: String = row.get("body");
            results.push(SearchResult {
                id: row.get("id"),
                title: row.get("title"),
                content: truncate_body(&body),
                source_type: row.get("source_type"),
                source_url: row.get("source_url"),
                collection_id: row.get("collection_id"),
                upstream_doc_id: row.get("upstream_doc_id"),
                score: *score,
                updated_at: row.get("updated_at"),
            });
        }
    }

    // Score desc, updated_at desc, id asc
    results.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(b.updated_at.cmp(&a.updated_at))
            .then(a.id.cmp(&b.id))
    });
    results.truncate(limit);

    Ok(results)
}

/// Lexical candidates with normalized scores.
///
/// FTS5's bm25 rank is negative (more negative is better); the normalized
/// score is `min(|rank| / 100, 1.0)`.
async fn fetch_fts_scores(
    store: &Store,
    query: &str,
    candidate_k: i64,
    source_types: &[String],
) -> Result<Vec<(String, f64)>> {
    let match_expr = fts_match_expr(query);
    if match_expr.is_empty() {
        return Ok(Vec::new());
    }

    // The source-type restriction must sit inside WHERE, before the
    // candidate limit, or matching rows of a rare type get crowded out.
    let mut sql = String::from(
        "SELECT content_fts.content_id AS content_id, content_fts.rank AS rank \
         FROM content_fts \
         JOIN content c ON c.id = content_fts.content_id \
         WHERE content_fts MATCH ?",
    );
    if !source_types.is_empty() {
        let placeholders = vec!["?"; source_types.len()].join(", ");
        sql.push_str(&format!(" AND c.source_type IN ({})", placeholders));
    }
    sql.push_str(" ORDER BY rank LIMIT ?");

    let mut stmt = sqlx::query(&sql).bind(&match_expr);
    for source_type in source_types {
        stmt = stmt.bind(source_type);
    }
    let rows = stmt.bind(candidate_k).fetch_all(store.pool()).await?;

    Ok(rows
        .iter()
        .map(|row| {
            let rank: f64 = row.get("rank");
            (row.get("content_id"), (rank.abs() / 100.0).min(1.0))
        })
        .collect())
}

/// Vector candidates with normalized scores.
///
/// Distance is `1 - cosine_similarity`; the normalized score is
/// `1 / (1 + distance)`, top `candidate_k` by score.
async fn fetch_vector_scores(
    store: &Store,
    query_vec: &[f32],
    candidate_k: i64,
    source_types: &[String],
) -> Result<Vec<(String, f64)>> {
    let rows = sqlx::query(
        r#"
        SELECT v.content_id, v.embedding, c.source_type
        FROM content_vectors v
        JOIN content c ON c.id = v.content_id
        "#,
    )
    .fetch_all(store.pool())
    .await?;

    let mut scored: Vec<(String, f64)> = rows
        .iter()
        .filter(|row| {
            source_types.is_empty() || {
                let st: String = row.get("source_type");
                source_types.contains(&st)
            }
        })
        .map(|row| {
            let blob: Vec<u8> = row.get("embedding");
            let stored = embedding::blob_to_vec(&blob);
            let similarity = embedding::cosine_similarity(query_vec, &stored) as f64;
            let distance = 1.0 - similarity;
            (row.get("content_id"), 1.0 / (1.0 + distance))
        })
        .collect();

    scored.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.0.cmp(&b.0))
    });
    scored.truncate(candidate_k as usize);

    Ok(scored)
}

fn truncate_body(body: &str) -> String {
    if body.chars().count() <= SNIPPET_CHARS {
        return body.to_string();
    }
    let truncated: String = body.chars().take(SNIPPET_CHARS).collect();
    format!("{}...", truncated)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn match_expr_quotes_terms() {
        assert_eq!(fts_match_expr("rust async"), "\"rust\" \"async\"");
        assert_eq!(fts_match_expr("zzz-nomatch"), "\"zzz-nomatch\"");
        assert_eq!(fts_match_expr("say \"hi\""), "\"say\" \"\"\"hi\"\"\"");
        assert_eq!(fts_match_expr("   "), "");
    }

    #[test]
    fn hybrid_weights_compose() {
        let vec_scores = vec![("a".to_string(), 1.0), ("b".to_string(), 0.5)];
        let fts_scores = vec![("a".to_string(), 0.5), ("c".to_string(), 1.0)];
        let merged = hybrid_scores(&vec_scores, &fts_scores);

        let get = |id: &str| merged.iter().find(|(i, _)| i == id).map(|(_, s)| *s);
        assert!((get("a").unwrap() - (0.6 + 0.2)).abs() < 1e-9);
        assert!((get("b").unwrap() - 0.3).abs() < 1e-9);
        assert!((get("c").unwrap() - 0.4).abs() < 1e-9);
        // Sorted by combined score
        assert_eq!(merged[0].0, "a");
        assert_eq!(merged[1].0, "c");
        assert_eq!(merged[2].0, "b");
    }

    #[test]
    fn hybrid_one_channel_empty() {
        let vec_scores = vec![("a".to_string(), 0.8)];
        let merged = hybrid_scores(&vec_scores, &[]);
        assert_eq!(merged.len(), 1);
        assert!((merged[0].1 - 0.48).abs() < 1e-9);
    }

    #[test]
    fn truncation_preserves_short_bodies() {
        assert_eq!(truncate_body("short"), "short");
        let long = "x".repeat(600);
        let t = truncate_body(&long);
        assert_eq!(t.chars().count(), 503);
        assert!(t.ends_with("..."));
    }
}
