//! Headless Chrome page fetcher, for listings that only render with scripts.

use crate::config::ScraperConfig;
use crate::error::FetchError;
use crate::scraper::handles::PageHandles;
use crate::scraper::{Page, PageFetcher};
use anyhow::{Context, Result, anyhow, bail};
use async_trait::async_trait;
use headless_chrome::{Browser, LaunchOptions, Tab};
use std::ffi::OsStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, sleep};
use tracing::{debug, info, warn};

const CHALLENGE_POLL: Duration = Duration::from_millis(500);

pub struct BrowserPageFetcher {
    browser: Browser,
    tabs: Arc<PageHandles<Arc<Tab>>>,
    user_agent: String,
    settle: Duration,
}

impl BrowserPageFetcher {
    pub fn launch(config: &ScraperConfig) -> Result<Self> {
        let options = LaunchOptions::default_builder()
            .headless(config.headless)
            .sandbox(false)
            .window_size(Some((1920, 1080)))
            .args(vec![
                OsStr::new("--disable-dev-shm-usage"),
                OsStr::new("--disable-gpu"),
                OsStr::new("--no-first-run"),
            ])
            .build()
            .map_err(|e| anyhow!("invalid browser options: {e}"))?;

        let browser = Browser::new(options).context("Failed to launch Chrome")?;
        info!("Chrome launched (headless = {})", config.headless);

        Ok(Self {
            browser,
            tabs: PageHandles::new(close_abandoned),
            user_agent: config.user_agent.clone(),
            settle: config.settle(),
        })
    }

    async fn content(tab: Arc<Tab>) -> Result<String, FetchError> {
        tokio::task::spawn_blocking(move || tab.get_content())
            .await
            .map_err(|e| FetchError::Browser(e.to_string()))?
            .map_err(|e| FetchError::Browser(e.to_string()))
    }
}

/// Release for a tab whose load was given up before a `Page` reached the caller.
fn close_abandoned(tab: Arc<Tab>) {
    let close = move || {
        if let Err(e) = tab.close(true) {
            warn!("Closing abandoned tab failed: {}", e);
        }
    };
    match tokio::runtime::Handle::try_current() {
        Ok(runtime) => {
            runtime.spawn_blocking(close);
        }
        Err(_) => close(),
    }
}

#[async_trait]
impl PageFetcher for BrowserPageFetcher {
    async fn open(&self, url: &str, timeout: Duration) -> Result<Page, FetchError> {
        // Dropping `reservation` on any early return, or when this future is
        // dropped, closes the tab.
        let reservation = self.tabs.reserve();
        let id = reservation.id();

        let browser = self.browser.clone();
        let tabs = Arc::clone(&self.tabs);
        let target = url.to_string();
        let user_agent = self.user_agent.clone();
        let load = tokio::task::spawn_blocking(move || -> Result<Arc<Tab>> {
            let tab = browser.new_tab()?;
            if let Err(tab) = tabs.attach(id, Arc::clone(&tab)) {
                close_abandoned(tab);
                bail!("load of {target} was abandoned");
            }
            tab.set_default_timeout(timeout);
            tab.set_user_agent(&user_agent, Some("zh-CN"), None)?;
            tab.navigate_to(&target)?.wait_until_navigated()?;
            Ok(tab)
        });

        let tab = match tokio::time::timeout(timeout, load).await {
            Err(_) => {
                return Err(FetchError::Timeout {
                    url: url.to_string(),
                    timeout_ms: timeout.as_millis() as u64,
                });
            }
            Ok(Err(e)) => return Err(FetchError::Browser(e.to_string())),
            Ok(Ok(Err(e))) => {
                return Err(FetchError::Navigation {
                    url: url.to_string(),
                    message: e.to_string(),
                });
            }
            Ok(Ok(Ok(tab))) => tab,
        };

        sleep(self.settle).await;
        let html = Self::content(tab).await?;

        Ok(Page {
            id: reservation.keep(),
            url: url.to_string(),
            html,
        })
    }

    async fn wait_for_challenge_clear(&self, page: &mut Page, timeout: Duration) -> bool {
        let Some(tab) = self.tabs.get(page.id) else {
            return !page.has_challenge();
        };
        let deadline = Instant::now() + timeout;

        while page.has_challenge() {
            if Instant::now() >= deadline {
                return false;
            }
            sleep(CHALLENGE_POLL).await;
            match Self::content(Arc::clone(&tab)).await {
                Ok(html) => page.html = html,
                Err(e) => warn!("Challenge re-check of {} failed: {}", page.url, e),
            }
        }
        true
    }

    async fn close(&self, page: Page) {
        let Some(tab) = self.tabs.remove(page.id) else { return };

        let closed = tokio::task::spawn_blocking(move || tab.close(true)).await;
        match closed {
            Ok(Ok(_)) => debug!("Closed tab for {}", page.url),
            Ok(Err(e)) => warn!("Closing tab for {} failed: {}", page.url, e),
            Err(e) => warn!("Closing tab for {} panicked: {}", page.url, e),
        }
    }
}
