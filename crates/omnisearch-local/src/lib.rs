//! Network side of omnisearch: HTTP classification, retry, job polling, the provider
//! skeletons and every concrete upstream provider.

use std::time::Duration;

pub mod base;
pub mod dispatch;
pub mod extract;
pub mod firecrawl;
pub mod http;
pub mod jina;
pub mod kagi;
pub mod perplexity;
pub mod polling;
pub mod retry;
pub mod search;

pub use base::{ProcessingBase, ProcessingOptions, ProviderCore, SearchBase, SearchOptions};
pub use dispatch::{
    Dispatcher, UnifiedEnhancement, UnifiedEnhancementParams, UnifiedProcessing,
    UnifiedProcessingParams, UnifiedSearch, UnifiedSearchParams,
};
pub use extract::TavilyExtractProvider;
pub use firecrawl::{FirecrawlCrawlProvider, FirecrawlExtractProvider, FirecrawlScrapeProvider};
pub use http::{HttpClient, Method, ResponseBody};
pub use jina::{JinaGroundingProvider, JinaReaderProvider};
pub use kagi::{KagiEnrichmentProvider, KagiFastGptProvider, KagiSummarizerProvider};
pub use perplexity::PerplexitySearchProvider;
pub use polling::PollStatus;
pub use retry::{retry_with_backoff, retry_with_backoff_when, RetryPolicy};
pub use search::{
    BraveSearchProvider, ExaSearchProvider, KagiSearchProvider, TavilySearchProvider,
};

/// Shared reqwest client. Per-request timeouts come from each provider's config.
pub fn build_client() -> omnisearch_core::Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(concat!("omnisearch/", env!("CARGO_PKG_VERSION")))
        .connect_timeout(Duration::from_secs(10))
        .build()
        .map_err(|e| {
            omnisearch_core::ProviderError::provider(
                format!("HTTP client setup failed: {e}"),
                "omnisearch",
            )
        })
}
