//! Optional retrieval enhancement of search results.
//!
//! An [`Enhancer`] gets the raw results for a query and may re-rank them or
//! add focused passages. [`EnhancedSearch`] wraps any [`SearchClient`] with
//! an enhancer; if the enhancer fails, the raw results are used as-is.

use super::SearchClient;
use crate::error::Result;
use crate::state::SearchResult;
use async_trait::async_trait;
use std::collections::HashSet;

/// Post-processes search results for a query.
#[async_trait]
pub trait Enhancer: Send + Sync {
    /// Return the enhanced results. At most `top_k` extra entries may be added.
    async fn enhance(
        &self,
        query: &str,
        results: Vec<SearchResult>,
        top_k: usize,
    ) -> Result<Vec<SearchResult>>;
}

/// Ranks passages of the result contents by overlap with the query terms.
///
/// Results are reordered by their best passage score, and the `top_k` best
/// passages that are only part of a longer document are appended as extra
/// results pointing at their source.
#[derive(Debug, Clone)]
pub struct PassageRanker {
    chunk_chars: usize,
}

impl Default for PassageRanker {
    fn default() -> Self {
        Self { chunk_chars: 500 }
    }
}

impl PassageRanker {
    pub fn new(chunk_chars: usize) -> Self {
        Self {
            chunk_chars: chunk_chars.max(1),
        }
    }

    /// Split `content` into passages of roughly `chunk_chars` characters on
    /// paragraph and sentence boundaries.
    fn chunks(&self, content: &str) -> Vec<String> {
        let mut chunks = Vec::new();
        let mut current = String::new();

        for sentence in sentences(content) {
            let pending = current.chars().count() + sentence.chars().count();
            if !current.is_empty() && pending > self.chunk_chars {
                chunks.push(std::mem::take(&mut current).trim().to_string());
            }
            current.push_str(sentence);
        }
        if !current.trim().is_empty() {
            chunks.push(current.trim().to_string());
        }
        chunks
    }

    fn score(query_terms: &HashSet<String>, passage: &str) -> f64 {
        if query_terms.is_empty() {
            return 0.0;
        }
        let passage_terms = terms(passage);
        let hits = query_terms.intersection(&passage_terms).count();
        hits as f64 / query_terms.len() as f64
    }
}

/// Split text after sentence terminators, keeping the terminators.
fn sentences(text: &str) -> impl Iterator<Item = &str> {
    text.split_inclusive(['.', '!', '?', '\n', '。', '！', '？'])
        .filter(|s| !s.trim().is_empty())
}

fn terms(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.chars().count() >= 2)
        .map(|t| t.to_lowercase())
        .collect()
}

#[async_trait]
impl Enhancer for PassageRanker {
    async fn enhance(
        &self,
        query: &str,
        results: Vec<SearchResult>,
        top_k: usize,
    ) -> Result<Vec<SearchResult>> {
        let query_terms = terms(query);

        // (source index, passage, score) for passages of multi-passage documents
        let mut passages: Vec<(usize, String, f64)> = Vec::new();
        let mut best = vec![0.0_f64; results.len()];
        for (idx, result) in results.iter().enumerate() {
            let chunks = self.chunks(&result.content);
            let single = chunks.len() <= 1;
            for chunk in chunks {
                let score = Self::score(&query_terms, &chunk);
                best[idx] = best[idx].max(score);
                if !single && score > 0.0 {
                    passages.push((idx, chunk, score));
                }
            }
        }
        passages.sort_by(|a, b| b.2.total_cmp(&a.2));

        let extra: Vec<SearchResult> = passages
            .into_iter()
            .take(top_k)
            .enumerate()
            .map(|(n, (idx, chunk, score))| {
                let source = &results[idx];
                SearchResult::new(
                    query,
                    format!("{}#passage-{}", source.url, n + 1),
                    format!("{} (passage {})", source.title, n + 1),
                    chunk,
                )
                .with_score(score)
            })
            .collect();

        let mut ranked: Vec<(SearchResult, f64)> = results.into_iter().zip(best).collect();
        // sort_by is stable: ties keep provider order
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1));

        Ok(ranked
            .into_iter()
            .map(|(mut result, score)| {
                result.score.get_or_insert(score);
                result
            })
            .chain(extra)
            .collect())
    }
}

/// A search client whose results pass through an [`Enhancer`].
pub struct EnhancedSearch<S, E> {
    inner: S,
    enhancer: E,
    top_k: usize,
}

impl<S, E> EnhancedSearch<S, E> {
    pub fn new(inner: S, enhancer: E, top_k: usize) -> Self {
        Self {
            inner,
            enhancer,
            top_k,
        }
    }
}

#[async_trait]
impl<S, E> SearchClient for EnhancedSearch<S, E>
where
    S: SearchClient,
    E: Enhancer,
{
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn search(
        &self,
        query: &str,
        max_results: usize,
        max_content_length: usize,
    ) -> Result<Vec<SearchResult>> {
        let results = self
            .inner
            .search(query, max_results, max_content_length)
            .await?;
        if results.is_empty() {
            return Ok(results);
        }

        match self.enhancer.enhance(query, results.clone(), self.top_k).await {
            Ok(enhanced) => Ok(enhanced
                .into_iter()
                .map(|r| r.truncated(max_content_length))
                .collect()),
            Err(e) => {
                tracing::warn!(error = %e, query, "Result enhancement failed; using raw results");
                Ok(results)
            }
        }
    }
}
