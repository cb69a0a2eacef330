use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

use crate::error::ScrapeError;

/// Top-level application configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub scraper: ScraperConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

/// Which page-rendering engine backs the fetcher.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FetcherBackend {
    /// Plain HTTP fetch; no script execution.
    #[default]
    Http,
    /// Headless Chrome (requires the `browser` feature).
    Browser,
}

/// Scraper configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ScraperConfig {
    #[serde(default = "default_listing_url")]
    pub listing_url: String,

    /// Origin prepended to relative hrefs. Derived from `listing_url` when unset.
    #[serde(default)]
    pub base_origin: Option<String>,

    #[serde(default = "default_table_selector")]
    pub table_selector: String,

    #[serde(default = "default_link_text")]
    pub link_text: String,

    #[serde(default = "default_min_table_rows")]
    pub min_table_rows: usize,

    #[serde(default = "default_listing_timeout_ms")]
    pub listing_timeout_ms: u64,

    #[serde(default = "default_detail_timeout_ms")]
    pub detail_timeout_ms: u64,

    #[serde(default = "default_true")]
    pub wait_for_challenge: bool,

    #[serde(default = "default_challenge_timeout_ms")]
    pub challenge_timeout_ms: u64,

    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,

    #[serde(default = "default_delay_min_ms")]
    pub delay_min_ms: u64,

    #[serde(default = "default_delay_max_ms")]
    pub delay_max_ms: u64,

    #[serde(default = "default_true")]
    pub headless: bool,

    #[serde(default)]
    pub backend: FetcherBackend,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

/// Storage configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    #[serde(default = "default_output_path")]
    pub output_path: PathBuf,

    /// Where a page snapshot is written when the listing table cannot be found.
    #[serde(default)]
    pub snapshot_dir: Option<PathBuf>,
}

/// How the control server executes an extraction run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunnerKind {
    #[default]
    InProcess,
    /// Re-executes this binary with the `scrape` subcommand.
    ChildProcess,
}

/// Control server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,

    #[serde(default)]
    pub runner: RunnerKind,
}

// ── Defaults ─────────────────────────────────────────────────────────────────

fn default_listing_url() -> String {
    "https://www.lyngsat.com/stream/tvcountry/China.html".to_string()
}
fn default_table_selector() -> String {
    "body > div:nth-child(1) > table > tbody > tr > td:nth-child(2) > table:nth-child(14)"
        .to_string()
}
fn default_link_text() -> String {
    "Linear Streaming".to_string()
}
fn default_min_table_rows() -> usize {
    5
}
fn default_listing_timeout_ms() -> u64 {
    90_000
}
fn default_detail_timeout_ms() -> u64 {
    20_000
}
fn default_challenge_timeout_ms() -> u64 {
    30_000
}
fn default_settle_ms() -> u64 {
    1_000
}
fn default_delay_min_ms() -> u64 {
    200
}
fn default_delay_max_ms() -> u64 {
    500
}
fn default_true() -> bool {
    true
}
fn default_user_agent() -> String {
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) \
     Chrome/121.0.0.0 Safari/537.36"
        .to_string()
}
fn default_output_path() -> PathBuf {
    PathBuf::from("channels.json")
}
fn default_bind() -> String {
    "127.0.0.1:3000".to_string()
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            listing_url: default_listing_url(),
            base_origin: None,
            table_selector: default_table_selector(),
            link_text: default_link_text(),
            min_table_rows: default_min_table_rows(),
            listing_timeout_ms: default_listing_timeout_ms(),
            detail_timeout_ms: default_detail_timeout_ms(),
            wait_for_challenge: true,
            challenge_timeout_ms: default_challenge_timeout_ms(),
            settle_ms: default_settle_ms(),
            delay_min_ms: default_delay_min_ms(),
            delay_max_ms: default_delay_max_ms(),
            headless: true,
            backend: FetcherBackend::default(),
            user_agent: default_user_agent(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            output_path: default_output_path(),
            snapshot_dir: None,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            runner: RunnerKind::default(),
        }
    }
}

// ── Derived values ───────────────────────────────────────────────────────────

impl ScraperConfig {
    /// Origin used to absolutize relative hrefs, without a trailing slash.
    pub fn resolved_base_origin(&self) -> Result<String, ScrapeError> {
        if let Some(origin) = &self.base_origin {
            return Ok(origin.trim_end_matches('/').to_string());
        }
        let url = Url::parse(&self.listing_url).map_err(|e| {
            ScrapeError::InvalidConfig(format!("listing_url {:?}: {}", self.listing_url, e))
        })?;
        Ok(url.origin().ascii_serialization())
    }

    pub fn listing_timeout(&self) -> Duration {
        Duration::from_millis(self.listing_timeout_ms)
    }

    pub fn detail_timeout(&self) -> Duration {
        Duration::from_millis(self.detail_timeout_ms)
    }

    pub fn challenge_timeout(&self) -> Duration {
        Duration::from_millis(self.challenge_timeout_ms)
    }

    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    /// Rejects settings the pipeline cannot run with.
    pub fn validate(&self) -> Result<(), ScrapeError> {
        if self.delay_min_ms > self.delay_max_ms {
            return Err(ScrapeError::InvalidConfig(format!(
                "delay_min_ms ({}) exceeds delay_max_ms ({})",
                self.delay_min_ms, self.delay_max_ms
            )));
        }
        if self.min_table_rows == 0 {
            return Err(ScrapeError::InvalidConfig(
                "min_table_rows must be at least 1".into(),
            ));
        }
        if self.link_text.trim().is_empty() {
            return Err(ScrapeError::InvalidConfig("link_text is empty".into()));
        }
        self.resolved_base_origin()?;
        Ok(())
    }
}

// ── Loader ───────────────────────────────────────────────────────────────────

impl AppConfig {
    /// Load configuration from file + environment overrides
    pub fn load() -> Result<Self> {
        dotenv::dotenv().ok();

        let cfg = config::Config::builder()
            .add_source(
                config::File::with_name("config/default")
                    .required(false)
                    .format(config::FileFormat::Toml),
            )
            .add_source(
                config::File::with_name("config/local")
                    .required(false)
                    .format(config::FileFormat::Toml),
            )
            .add_source(config::Environment::with_prefix("CHANNELS").separator("__"))
            .build()
            .context("Failed to assemble configuration sources")?;

        let app_cfg: AppConfig = cfg
            .try_deserialize()
            .context("Invalid configuration")?;
        app_cfg.scraper.validate()?;
        Ok(app_cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_origin_derived_from_listing_url() {
        let cfg = ScraperConfig::default();
        assert_eq!(cfg.resolved_base_origin().unwrap(), "https://www.lyngsat.com");
    }

    #[test]
    fn test_explicit_base_origin_wins() {
        let cfg = ScraperConfig {
            base_origin: Some("http://localhost:8080/".into()),
            ..Default::default()
        };
        assert_eq!(cfg.resolved_base_origin().unwrap(), "http://localhost:8080");
    }

    #[test]
    fn test_validate_rejects_inverted_delay_window() {
        let cfg = ScraperConfig {
            delay_min_ms: 600,
            delay_max_ms: 100,
            ..Default::default()
        };
        assert!(matches!(cfg.validate(), Err(ScrapeError::InvalidConfig(_))));
    }

    #[test]
    fn test_validate_rejects_unparseable_listing_url() {
        let cfg = ScraperConfig {
            listing_url: "not a url".into(),
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
        assert!(ScraperConfig::default().validate().is_ok());
    }

    #[test]
    fn test_sections_fall_back_to_defaults() {
        let cfg: AppConfig = serde_json::from_str(r#"{"scraper": {"headless": false}}"#).unwrap();
        assert!(!cfg.scraper.headless);
        assert_eq!(cfg.scraper.min_table_rows, 5);
        assert_eq!(cfg.server.runner, RunnerKind::InProcess);
        assert_eq!(cfg.storage.output_path, PathBuf::from("channels.json"));
    }
}
