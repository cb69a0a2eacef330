use crate::config::ScraperConfig;
use crate::error::FetchError;
use crate::scraper::{Page, PageFetcher};
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::{Instant, sleep};
use tracing::{debug, info, warn};

const CHALLENGE_POLL: Duration = Duration::from_secs(2);

/// Fetcher that loads pages with a plain HTTP GET. Scripts never run, so the
/// `headless` flag has no meaning here.
pub struct HttpPageFetcher {
    inner: reqwest::Client,
    next_id: AtomicU64,
    challenge_poll: Duration,
}

impl HttpPageFetcher {
    pub fn new(config: &ScraperConfig) -> Result<Self> {
        let inner = reqwest::Client::builder()
            .user_agent(&config.user_agent)
            .gzip(true)
            // Accept cookies so a cleared challenge sticks for later pages
            .cookie_store(true)
            .build()
            .context("Failed to build HTTP client")?;

        if !config.headless {
            info!("headless = false is ignored by the HTTP fetcher");
        }

        Ok(Self {
            inner,
            next_id: AtomicU64::new(1),
            challenge_poll: CHALLENGE_POLL,
        })
    }

    #[cfg(test)]
    pub fn with_challenge_poll(mut self, interval: Duration) -> Self {
        self.challenge_poll = interval;
        self
    }

    async fn get_text(&self, url: &str, timeout: Duration) -> Result<String, FetchError> {
        debug!("GET {}", url);

        let request = async {
            let resp = self
                .inner
                .get(url)
                .timeout(timeout)
                .send()
                .await
                .map_err(|e| classify(url, timeout, e))?;

            let status = resp.status();
            if !status.is_success() {
                return Err(FetchError::Status {
                    url: url.to_string(),
                    status: status.as_u16(),
                });
            }
            resp.text().await.map_err(|e| classify(url, timeout, e))
        };

        tokio::time::timeout(timeout, request)
            .await
            .map_err(|_| FetchError::Timeout {
                url: url.to_string(),
                timeout_ms: timeout.as_millis() as u64,
            })?
    }
}

fn classify(url: &str, timeout: Duration, e: reqwest::Error) -> FetchError {
    if e.is_timeout() {
        FetchError::Timeout {
            url: url.to_string(),
            timeout_ms: timeout.as_millis() as u64,
        }
    } else {
        FetchError::Navigation {
            url: url.to_string(),
            message: e.to_string(),
        }
    }
}

#[async_trait]
impl PageFetcher for HttpPageFetcher {
    async fn open(&self, url: &str, timeout: Duration) -> Result<Page, FetchError> {
        let html = self.get_text(url, timeout).await?;
        Ok(Page {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            url: url.to_string(),
            html,
        })
    }

    /// Re-fetch the page until the interstitial is gone or `timeout` elapses.
    async fn wait_for_challenge_clear(&self, page: &mut Page, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;

        while page.has_challenge() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return false;
            }
            sleep(self.challenge_poll.min(remaining)).await;

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return false;
            }
            match self.get_text(&page.url, remaining).await {
                Ok(html) => page.html = html,
                Err(e) => warn!("Challenge re-check of {} failed: {}", page.url, e),
            }
        }
        true
    }

    async fn close(&self, _page: Page) {}
}
