//! Web search providers.

mod rag;
mod tavily;

pub use rag::{EnhancedSearch, Enhancer, PassageRanker};
pub use tavily::TavilyClient;

use crate::error::Result;
use crate::state::SearchResult;
use async_trait::async_trait;
use std::sync::Arc;

/// Issues a query and returns a bounded list of results.
///
/// Implementations return at most `max_results` results, each with
/// `content` capped to `max_content_length` characters.
#[async_trait]
pub trait SearchClient: Send + Sync {
    /// Short provider name for logs.
    fn name(&self) -> &str;

    async fn search(
        &self,
        query: &str,
        max_results: usize,
        max_content_length: usize,
    ) -> Result<Vec<SearchResult>>;
}

#[async_trait]
impl<T: SearchClient + ?Sized> SearchClient for Arc<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    async fn search(
        &self,
        query: &str,
        max_results: usize,
        max_content_length: usize,
    ) -> Result<Vec<SearchResult>> {
        (**self).search(query, max_results, max_content_length).await
    }
}

/// Apply the result-count and content-length bounds.
pub fn bound_results(
    results: impl IntoIterator<Item = SearchResult>,
    max_results: usize,
    max_content_length: usize,
) -> Vec<SearchResult> {
    results
        .into_iter()
        .take(max_results)
        .map(|r| r.truncated(max_content_length))
        .collect()
}
