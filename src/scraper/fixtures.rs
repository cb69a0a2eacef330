//! In-memory page fetcher for tests.
//!
//! Behaves like a rendering engine: a page handle is allocated before the load
//! starts, loads longer than the caller's bound fail with `Timeout`, and an
//! optional settle pause after loading is not covered by that bound.

use crate::error::FetchError;
use crate::scraper::handles::PageHandles;
use crate::scraper::{Page, PageFetcher};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::sleep;

pub struct FakeFetcher {
    pages: HashMap<String, String>,
    delays: HashMap<String, Duration>,
    settles: HashMap<String, Duration>,
    panic_on: Option<String>,
    handles: Arc<PageHandles<()>>,
    opened: AtomicUsize,
    requested: Mutex<Vec<String>>,
}

impl Default for FakeFetcher {
    fn default() -> Self {
        Self {
            pages: HashMap::new(),
            delays: HashMap::new(),
            settles: HashMap::new(),
            panic_on: None,
            handles: PageHandles::new(drop::<()>),
            opened: AtomicUsize::new(0),
            requested: Mutex::new(Vec::new()),
        }
    }
}

impl FakeFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page(mut self, url: &str, html: &str) -> Self {
        self.pages.insert(url.to_string(), html.to_string());
        self
    }

    /// Time the load of `url` takes.
    pub fn delay(mut self, url: &str, delay: Duration) -> Self {
        self.delays.insert(url.to_string(), delay);
        self
    }

    /// Pause after `url` has loaded, before its content is read.
    pub fn settle(mut self, url: &str, settle: Duration) -> Self {
        self.settles.insert(url.to_string(), settle);
        self
    }

    /// Simulate the engine crashing when `url` is requested.
    pub fn panic_on(mut self, url: &str) -> Self {
        self.panic_on = Some(url.to_string());
        self
    }

    /// Pages handed to the caller so far.
    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    /// Page handles still allocated, whether handed out or abandoned mid-load.
    pub fn open_pages(&self) -> usize {
        self.handles.len()
    }

    pub fn requested(&self) -> Vec<String> {
        self.requested.lock().unwrap().clone()
    }
}

#[async_trait]
impl PageFetcher for FakeFetcher {
    async fn open(&self, url: &str, timeout: Duration) -> Result<Page, FetchError> {
        self.requested.lock().unwrap().push(url.to_string());
        if self.panic_on.as_deref() == Some(url) {
            panic!("renderer crashed on {url}");
        }

        let reservation = self.handles.reserve();
        self.handles.attach(reservation.id(), ()).unwrap();

        let load = self.delays.get(url).copied().unwrap_or_default();
        if load > timeout {
            sleep(timeout).await;
            return Err(FetchError::Timeout {
                url: url.to_string(),
                timeout_ms: timeout.as_millis() as u64,
            });
        }
        if !load.is_zero() {
            sleep(load).await;
        }

        let Some(html) = self.pages.get(url) else {
            return Err(FetchError::Navigation {
                url: url.to_string(),
                message: "net::ERR_NAME_NOT_RESOLVED".into(),
            });
        };
        if let Some(settle) = self.settles.get(url) {
            sleep(*settle).await;
        }

        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Page {
            id: reservation.keep(),
            url: url.to_string(),
            html: html.clone(),
        })
    }

    async fn close(&self, page: Page) {
        self.handles.remove(page.id);
    }
}
