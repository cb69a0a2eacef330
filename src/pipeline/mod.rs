//! Pipeline orchestrator: listing page → rows → detail pages → artifact.
//!
//! One run is strictly sequential: a single listing load, then one detail page
//! at a time with a randomized pause in between. Per-row and per-entry problems
//! only shrink the result; loading the listing, finding its table and writing
//! the artifact are the only steps that abort a run. The artifact is written
//! once, at the end, so an aborted run leaves the previous one in place.

pub mod rate;

use crate::config::AppConfig;
use crate::error::{FetchError, ScrapeError};
use crate::models::{ListingEntry, ResultSet};
use crate::scraper::detail::{DetailResolver, Unresolved};
use crate::scraper::parsers::{TableSource, extract_rows, locate_table};
use crate::scraper::{Page, PageFetcher};
use crate::storage::ResultStore;
use crate::utils::Timer;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

use self::rate::RateShaper;

// ── Run log ───────────────────────────────────────────────────────────────────

/// Progress lines of a run, kept so the control server can hand them back.
/// Every line also goes to `tracing`.
#[derive(Debug, Clone, Default)]
pub struct RunLog {
    lines: Arc<Mutex<Vec<String>>>,
}

impl RunLog {
    pub fn info(&self, line: impl Into<String>) {
        let line = line.into();
        info!("{}", line);
        self.push(line);
    }

    pub fn warn(&self, line: impl Into<String>) {
        let line = line.into();
        warn!("{}", line);
        self.push(line);
    }

    fn push(&self, line: String) {
        if let Ok(mut lines) = self.lines.lock() {
            lines.push(line);
        }
    }

    pub fn text(&self) -> String {
        self.lines
            .lock()
            .map(|lines| lines.join("\n"))
            .unwrap_or_default()
    }
}

// ── Pipeline ──────────────────────────────────────────────────────────────────

pub struct Pipeline {
    config: AppConfig,
    fetcher: Arc<dyn PageFetcher>,
    store: Arc<ResultStore>,
    log: RunLog,
}

impl Pipeline {
    pub fn new(config: AppConfig, fetcher: Arc<dyn PageFetcher>, store: Arc<ResultStore>) -> Self {
        Self {
            config,
            fetcher,
            store,
            log: RunLog::default(),
        }
    }

    pub fn with_log(mut self, log: RunLog) -> Self {
        self.log = log;
        self
    }

    pub async fn run(&self) -> Result<PipelineStats, ScrapeError> {
        let _t = Timer::start("Extraction run");
        let cfg = &self.config.scraper;
        cfg.validate()?;
        let base_origin = cfg.resolved_base_origin()?;

        // ── 1. Listing page ───────────────────────────────────────────────────
        self.log.info(format!("Loading listing page {}", cfg.listing_url));
        let mut listing = self.open_listing().await?;

        if cfg.wait_for_challenge {
            if self
                .fetcher
                .wait_for_challenge_clear(&mut listing, cfg.challenge_timeout())
                .await
            {
                debug!("No challenge on listing page (or it cleared)");
            } else {
                self.log.warn("Challenge did not clear in time, reading the page anyway");
            }
        }

        // ── 2. Table + rows ───────────────────────────────────────────────────
        let rows = self.listing_rows(&listing, &base_origin);
        let listing_html = std::mem::take(&mut listing.html);
        self.fetcher.close(listing).await;

        let entries = match rows {
            Some(entries) => entries,
            None => return Err(self.table_not_found(&listing_html)),
        };
        self.log.info(format!("{} candidate entries", entries.len()));

        // ── 3. Detail pages, one at a time ────────────────────────────────────
        let shaper = RateShaper::new(cfg.delay_min_ms, cfg.delay_max_ms);
        let resolver = DetailResolver::new(
            self.fetcher.as_ref(),
            &cfg.link_text,
            &base_origin,
            cfg.detail_timeout(),
        );

        let mut results: ResultSet = Vec::with_capacity(entries.len());
        let mut no_marker = 0usize;
        let mut failed = 0usize;

        for (i, entry) in entries.iter().enumerate() {
            shaper.before_fetch(i).await;
            debug!("[{}/{}] {}", i + 1, entries.len(), entry.name);

            match resolver.resolve(entry).await {
                Ok(resolved) => results.push(resolved),
                Err(Unresolved::NoMarker) => no_marker += 1,
                Err(Unresolved::FetchFailed(reason)) => {
                    self.log.warn(format!("{}: skipped ({})", entry.name, reason));
                    failed += 1;
                }
            }
        }

        // ── 4. Persist ────────────────────────────────────────────────────────
        self.store
            .save(&results)
            .map_err(|source| ScrapeError::PersistFailed {
                path: self.store.path().to_path_buf(),
                source,
            })?;

        let stats = PipelineStats {
            candidates: entries.len(),
            no_marker,
            failed,
            results,
        };
        self.log.info(format!(
            "Done: {} of {} entries resolved ({} without link, {} failed), saved to {}",
            stats.results.len(),
            stats.candidates,
            stats.no_marker,
            stats.failed,
            self.store.path().display(),
        ));
        Ok(stats)
    }

    async fn open_listing(&self) -> Result<Page, ScrapeError> {
        let cfg = &self.config.scraper;
        let timeout = cfg.listing_timeout();
        match tokio::time::timeout(timeout, self.fetcher.open(&cfg.listing_url, timeout)).await {
            Ok(Ok(page)) => Ok(page),
            Ok(Err(e)) => Err(ScrapeError::ListingFetch(e)),
            Err(_) => Err(ScrapeError::ListingFetch(FetchError::Timeout {
                url: cfg.listing_url.clone(),
                timeout_ms: cfg.listing_timeout_ms,
            })),
        }
    }

    /// `None` when no acceptable table exists.
    fn listing_rows(&self, listing: &Page, base_origin: &str) -> Option<Vec<ListingEntry>> {
        let cfg = &self.config.scraper;
        let doc = listing.document();
        let located = locate_table(&doc, &cfg.table_selector, cfg.min_table_rows)?;

        if let TableSource::Fallback { rows } = located.source {
            self.log.warn(format!(
                "Primary table selector failed, using largest table ({rows} rows)"
            ));
        }
        Some(extract_rows(located.table, base_origin))
    }

    fn table_not_found(&self, html: &str) -> ScrapeError {
        let snapshot = match self.store.save_snapshot(html) {
            Ok(path) => path,
            Err(e) => {
                warn!("Could not write listing snapshot: {}", e);
                None
            }
        };
        ScrapeError::TableNotFound {
            url: self.config.scraper.listing_url.clone(),
            min_rows: self.config.scraper.min_table_rows,
            snapshot,
        }
    }
}

#[derive(Debug)]
pub struct PipelineStats {
    pub candidates: usize,
    pub no_marker: usize,
    pub failed: usize,
    pub results: ResultSet,
}
