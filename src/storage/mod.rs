use crate::error::StoreError;
use crate::models::ResultSet;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info};

/// File name used for the listing page dump when table discovery fails.
pub const LISTING_SNAPSHOT: &str = "listing_snapshot.html";

// ── Result store ──────────────────────────────────────────────────────────────

/// The persisted artifact: a JSON array of `{name, url}`, replaced wholesale per run.
#[derive(Debug, Clone)]
pub struct ResultStore {
    path: PathBuf,
    snapshot_dir: Option<PathBuf>,
}

impl ResultStore {
    pub fn new(path: impl Into<PathBuf>, snapshot_dir: Option<PathBuf>) -> Self {
        Self {
            path: path.into(),
            snapshot_dir,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn dir(path: &Path) -> &Path {
        match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        }
    }

    /// `Ok(None)` when no run has persisted anything yet.
    pub fn load(&self) -> Result<Option<ResultSet>, StoreError> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(serde_json::from_slice(&bytes)?))
    }

    /// Write to a temp file beside the artifact, then rename over it, so readers
    /// see either the old or the new array and never a partial one.
    pub fn save(&self, results: &ResultSet) -> Result<(), StoreError> {
        let dir = Self::dir(&self.path);
        fs::create_dir_all(dir)?;

        let json = serde_json::to_vec_pretty(results)?;
        let mut tmp = NamedTempFile::new_in(dir)?;
        tmp.write_all(&json)?;
        tmp.flush()?;
        tmp.as_file_mut().sync_all()?;
        tmp.persist(&self.path).map_err(|e| StoreError::Io(e.error))?;

        info!("Saved {} entries to {:?}", results.len(), self.path);
        Ok(())
    }

    /// Dump a page for post-mortem inspection. `Ok(None)` when snapshots are off.
    pub fn save_snapshot(&self, html: &str) -> Result<Option<PathBuf>, StoreError> {
        let Some(dir) = &self.snapshot_dir else {
            return Ok(None);
        };
        fs::create_dir_all(dir)?;
        let target = dir.join(LISTING_SNAPSHOT);
        fs::write(&target, html)?;
        debug!("Snapshot written to {:?}", target);
        Ok(Some(target))
    }
}
