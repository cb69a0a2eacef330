use crate::config::AppConfig;
use crate::error::RefreshError;
use crate::models::{LastRun, RunState, RunSummary};
use crate::pipeline::{Pipeline, RunLog};
use crate::scraper::PageFetcher;
use crate::storage::ResultStore;
use async_trait::async_trait;
use chrono::Utc;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{info, warn};

// ── Runners ───────────────────────────────────────────────────────────────────

/// Executes one complete extraction run.
#[async_trait]
pub trait PipelineRunner: Send + Sync {
    async fn run(&self) -> Result<RunSummary, RefreshError>;
}

/// Runs the pipeline as a task inside the server process.
pub struct InProcessRunner {
    config: AppConfig,
    fetcher: Arc<dyn PageFetcher>,
    store: Arc<ResultStore>,
}

impl InProcessRunner {
    pub fn new(config: AppConfig, fetcher: Arc<dyn PageFetcher>, store: Arc<ResultStore>) -> Self {
        Self { config, fetcher, store }
    }
}

#[async_trait]
impl PipelineRunner for InProcessRunner {
    async fn run(&self) -> Result<RunSummary, RefreshError> {
        let log = RunLog::default();
        let pipeline = Pipeline::new(
            self.config.clone(),
            Arc::clone(&self.fetcher),
            Arc::clone(&self.store),
        )
        .with_log(log.clone());

        // A panicking run must not take the server down with it.
        match tokio::spawn(async move { pipeline.run().await }).await {
            Ok(Ok(stats)) => Ok(RunSummary {
                entry_count: stats.results.len(),
                log: log.text(),
            }),
            Ok(Err(e)) => {
                log.warn(format!("Run failed: {e}"));
                Err(RefreshError::Run {
                    message: e.to_string(),
                    details: log.text(),
                })
            }
            Err(e) => Err(RefreshError::Run {
                message: format!("extraction task aborted: {e}"),
                details: log.text(),
            }),
        }
    }
}

/// Runs the extraction as a child process (by default this binary with
/// `scrape`) and reports its captured output.
pub struct ChildProcessRunner {
    program: PathBuf,
    args: Vec<String>,
    store: Arc<ResultStore>,
}

impl ChildProcessRunner {
    pub fn new(program: PathBuf, args: Vec<String>, store: Arc<ResultStore>) -> Self {
        Self { program, args, store }
    }

    pub fn current_exe(store: Arc<ResultStore>) -> std::io::Result<Self> {
        Ok(Self::new(std::env::current_exe()?, vec!["scrape".into()], store))
    }
}

#[async_trait]
impl PipelineRunner for ChildProcessRunner {
    async fn run(&self) -> Result<RunSummary, RefreshError> {
        info!("Spawning {:?} {}", self.program, self.args.join(" "));
        let output = tokio::process::Command::new(&self.program)
            .args(&self.args)
            .output()
            .await
            .map_err(|e| RefreshError::Run {
                message: format!("could not start {:?}", self.program),
                details: e.to_string(),
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

        if !output.status.success() {
            return Err(RefreshError::Run {
                message: format!("scraper exited with {}", output.status),
                details: if stderr.trim().is_empty() { stdout } else { stderr },
            });
        }
        if !stderr.trim().is_empty() {
            warn!("Scraper stderr:\n{}", stderr);
        }

        // The count comes from what was actually persisted.
        match self.store.load() {
            Ok(Some(results)) => Ok(RunSummary {
                entry_count: results.len(),
                log: stdout,
            }),
            Ok(None) => Err(RefreshError::Run {
                message: format!(
                    "scraper exited cleanly but wrote no artifact at {}",
                    self.store.path().display()
                ),
                details: stdout,
            }),
            Err(e) => Err(RefreshError::Run {
                message: format!("scraper exited cleanly but the artifact is unreadable: {e}"),
                details: stdout,
            }),
        }
    }
}

// ── Controller ────────────────────────────────────────────────────────────────

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Holds `Running` for as long as it lives.
struct RunGuard {
    state: Arc<Mutex<RunState>>,
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        *lock(&self.state) = RunState::Idle;
    }
}

/// Single-flight gate in front of the pipeline: a trigger while a run is in
/// progress is rejected, never queued.
pub struct RefreshController {
    state: Arc<Mutex<RunState>>,
    last_run: Arc<Mutex<Option<LastRun>>>,
    runner: Arc<dyn PipelineRunner>,
}

impl RefreshController {
    pub fn new(runner: Arc<dyn PipelineRunner>) -> Self {
        Self {
            state: Arc::new(Mutex::new(RunState::Idle)),
            last_run: Arc::new(Mutex::new(None)),
            runner,
        }
    }

    pub fn state(&self) -> RunState {
        *lock(&self.state)
    }

    pub fn last_run(&self) -> Option<LastRun> {
        lock(&self.last_run).clone()
    }

    fn try_acquire(&self) -> Option<RunGuard> {
        let mut state = lock(&self.state);
        if *state == RunState::Running {
            return None;
        }
        *state = RunState::Running;
        Some(RunGuard {
            state: Arc::clone(&self.state),
        })
    }

    /// Run the pipeline once, or fail with `Conflict` if a run is already active.
    pub async fn trigger(&self) -> Result<RunSummary, RefreshError> {
        let guard = self.try_acquire().ok_or(RefreshError::Conflict)?;
        info!("Refresh triggered");

        let runner = Arc::clone(&self.runner);
        let last_run = Arc::clone(&self.last_run);

        // The guard travels with the task: if the caller goes away mid-run, the
        // run still finishes before another one may start. The run itself gets
        // a task of its own so that a panic is recorded before the gate opens.
        let task = tokio::spawn(async move {
            let _guard = guard;
            let outcome = match tokio::spawn(async move { runner.run().await }).await {
                Ok(outcome) => outcome,
                Err(e) => Err(RefreshError::Run {
                    message: "extraction run aborted".into(),
                    details: e.to_string(),
                }),
            };
            *lock(&last_run) = Some(LastRun {
                finished_at: Utc::now(),
                success: outcome.is_ok(),
                entry_count: outcome.as_ref().ok().map(|s| s.entry_count),
            });
            outcome
        });

        task.await.unwrap_or_else(|e| {
            Err(RefreshError::Run {
                message: "extraction run aborted".into(),
                details: e.to_string(),
            })
        })
    }
}
