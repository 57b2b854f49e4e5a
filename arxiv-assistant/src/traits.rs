use crate::types::{Paper, Result};
use async_trait::async_trait;

/// A paper repository that can be paged through one category at a time,
/// newest submissions first.
#[async_trait]
pub trait PaperSource: Send + Sync {
    /// Human-readable name for this source
    fn source_name(&self) -> String;

    /// Fetch up to `page_size` papers of `category`, skipping the first
    /// `start` results. An empty page means the listing is exhausted.
    async fn fetch_page(&self, category: &str, start: usize, page_size: usize) -> Result<Vec<Paper>>;
}
