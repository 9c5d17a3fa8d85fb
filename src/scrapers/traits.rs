use crate::error::FetchError;
use crate::models::{ListingRecord, SearchPage, Source};
use async_trait::async_trait;

/// Common trait for all listing sources.
/// Each source fetches and parses its own pages; reconciliation only sees this.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// Fetch one page (1-based) of search results for an area.
    async fn search(&self, area: &str, page: u32) -> Result<SearchPage, FetchError>;

    /// Fetch and normalize the full details of one listing.
    async fn fetch_detail(&self, id: &str, search_area: &str) -> Result<ListingRecord, FetchError>;

    /// Which source this adapter reads from
    fn source(&self) -> Source;
}
