use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ── Listing row ───────────────────────────────────────────────────────────────

/// One usable row of the listing table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingEntry {
    pub name: String,
    pub detail_url: String, // absolute
}

// ── Resolved entry ────────────────────────────────────────────────────────────

/// A listing entry whose detail page carried the marker link.
///
/// Serialized as `{ "name": ..., "url": ... }`, which is the artifact format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedEntry {
    pub name: String,
    #[serde(rename = "url")]
    pub stream_url: String,
}

/// Ordered results of one run; order is listing row order.
pub type ResultSet = Vec<ResolvedEntry>;

// ── Run bookkeeping ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub entry_count: usize,
    pub log: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Idle,
    Running,
}

/// Outcome of the most recent finished run, reported by the status endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct LastRun {
    pub finished_at: DateTime<Utc>,
    pub success: bool,
    pub entry_count: Option<usize>,
}
