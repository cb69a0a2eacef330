use crate::models::{ListingEntry, ResolvedEntry};
use crate::scraper::parsers::find_marker_link;
use crate::scraper::PageFetcher;
use std::time::Duration;
use tracing::{debug, warn};

/// Why an entry produced no result. Neither case stops the run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Unresolved {
    /// The detail page could not be loaded in time.
    FetchFailed(String),
    /// The page loaded but has no anchor with the marker text.
    NoMarker,
}

/// Follows a listing entry to its detail page and picks out the marker link.
pub struct DetailResolver<'a> {
    fetcher: &'a dyn PageFetcher,
    marker: &'a str,
    base_origin: &'a str,
    timeout: Duration,
}

impl<'a> DetailResolver<'a> {
    pub fn new(
        fetcher: &'a dyn PageFetcher,
        marker: &'a str,
        base_origin: &'a str,
        timeout: Duration,
    ) -> Self {
        Self { fetcher, marker, base_origin, timeout }
    }

    /// Never fails past this call; every opened page is closed before returning.
    pub async fn resolve(&self, entry: &ListingEntry) -> Result<ResolvedEntry, Unresolved> {
        // Covers settling and reading too. A cut-short `open` frees its own page.
        let opened =
            tokio::time::timeout(self.timeout, self.fetcher.open(&entry.detail_url, self.timeout))
                .await;

        let page = match opened {
            Ok(Ok(page)) => page,
            Ok(Err(e)) => {
                warn!("{}: detail page failed: {}", entry.name, e);
                return Err(Unresolved::FetchFailed(e.to_string()));
            }
            Err(_) => {
                warn!("{}: detail page timed out after {:?}", entry.name, self.timeout);
                return Err(Unresolved::FetchFailed(format!(
                    "timed out after {:?}",
                    self.timeout
                )));
            }
        };

        let link = {
            let doc = page.document();
            find_marker_link(&doc, self.marker, self.base_origin)
        };
        self.fetcher.close(page).await;

        match link {
            Some(stream_url) => Ok(ResolvedEntry {
                name: entry.name.clone(),
                stream_url,
            }),
            None => {
                debug!("{}: no {:?} link", entry.name, self.marker);
                Err(Unresolved::NoMarker)
            }
        }
    }
}
