#[cfg(feature = "browser")]
pub mod browser;
pub mod cleaner;
pub mod detail;
#[cfg(test)]
pub mod fixtures;
#[cfg(any(test, feature = "browser"))]
pub mod handles;
pub mod http_client;
pub mod parsers;

use crate::config::{FetcherBackend, ScraperConfig};
use crate::error::FetchError;
use async_trait::async_trait;
use scraper::Html;
use std::sync::Arc;
use std::time::Duration;

// ── Page ──────────────────────────────────────────────────────────────────────

/// A loaded page: the document as rendered when the fetcher handed it over.
#[derive(Debug, Clone)]
pub struct Page {
    pub id: u64,
    pub url: String,
    pub html: String,
}

impl Page {
    /// Parse the page for querying. `Html` is not `Send`; keep it out of awaits.
    pub fn document(&self) -> Html {
        Html::parse_document(&self.html)
    }

    pub fn has_challenge(&self) -> bool {
        parsers::has_challenge(&self.document())
    }
}

// ── Fetcher capability ────────────────────────────────────────────────────────

/// Swappable page-rendering engine.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Navigate to `url` and wait for the initial document, bounded by `timeout`.
    ///
    /// Callers may also drop this future early (an outer deadline). Anything the
    /// engine allocated for the page must then be released without a `close`.
    async fn open(&self, url: &str, timeout: Duration) -> Result<Page, FetchError>;

    /// Wait, best effort, for an anti-bot interstitial to go away.
    /// Returns whether the page is clear; never fails.
    async fn wait_for_challenge_clear(&self, page: &mut Page, timeout: Duration) -> bool {
        let _ = timeout;
        !page.has_challenge()
    }

    /// Release whatever the engine holds for `page`.
    async fn close(&self, page: Page);
}

/// Build the fetcher selected by `config.backend`.
pub fn build_fetcher(config: &ScraperConfig) -> anyhow::Result<Arc<dyn PageFetcher>> {
    match config.backend {
        FetcherBackend::Http => Ok(Arc::new(http_client::HttpPageFetcher::new(config)?)),
        #[cfg(feature = "browser")]
        FetcherBackend::Browser => Ok(Arc::new(browser::BrowserPageFetcher::launch(config)?)),
        #[cfg(not(feature = "browser"))]
        FetcherBackend::Browser => anyhow::bail!(
            "backend = \"browser\" needs a build with `--features browser`"
        ),
    }
}
