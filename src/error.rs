use std::path::PathBuf;
use thiserror::Error;

/// A single page load that did not produce a usable document.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("timed out after {timeout_ms} ms loading {url}")]
    Timeout { url: String, timeout_ms: u64 },

    #[error("navigation to {url} failed: {message}")]
    Navigation { url: String, message: String },

    #[error("{url} answered HTTP {status}")]
    Status { url: String, status: u16 },

    #[cfg_attr(not(feature = "browser"), allow(dead_code))]
    #[error("browser error: {0}")]
    Browser(String),
}

/// Run-level failures; any of these aborts the extraction run.
#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error("listing page could not be loaded: {0}")]
    ListingFetch(#[source] FetchError),

    #[error("no table with at least {min_rows} rows on {url}{}", snapshot_hint(.snapshot))]
    TableNotFound {
        url: String,
        min_rows: usize,
        snapshot: Option<PathBuf>,
    },

    #[error("could not persist results to {path:?}: {source}")]
    PersistFailed {
        path: PathBuf,
        #[source]
        source: StoreError,
    },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

fn snapshot_hint(snapshot: &Option<PathBuf>) -> String {
    match snapshot {
        Some(path) => format!(" (page snapshot saved to {})", path.display()),
        None => String::new(),
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("artifact is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Outcome of a refresh trigger that did not produce a summary.
#[derive(Debug, Error)]
pub enum RefreshError {
    #[error("an extraction run is already in progress")]
    Conflict,

    #[error("extraction run failed: {message}")]
    Run { message: String, details: String },
}
