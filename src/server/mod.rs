//! Control-plane HTTP API: serve the last artifact, trigger re-extraction.

pub mod controller;

use crate::error::RefreshError;
use crate::models::{LastRun, RunState};
use crate::storage::ResultStore;
use anyhow::{Context, Result};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::{error, info, warn};

use self::controller::RefreshController;

const NO_DATA_HINT: &str =
    "No channel data yet. Run `channel-indexer scrape`, or POST /api/scrape to extract it now.";

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<ResultStore>,
    pub controller: Arc<RefreshController>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/channels", get(get_channels))
        .route("/api/scrape", post(trigger_scrape))
        .route("/api/status", get(get_status))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn serve(bind: &str, state: AppState) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("Could not bind {bind}"))?;
    info!("Control API listening on http://{}", listener.local_addr()?);
    info!("  GET  /api/channels  → {}", state.store.path().display());
    info!("  POST /api/scrape    → re-run extraction");

    axum::serve(listener, router(state))
        .await
        .context("HTTP server failed")
}

// ── Handlers ──────────────────────────────────────────────────────────────────

async fn get_channels(State(state): State<AppState>) -> Response {
    match state.store.load() {
        Ok(Some(results)) => Json(results).into_response(),
        Ok(None) => not_found("channel data not found"),
        Err(e) => {
            warn!("Reading {:?} failed: {}", state.store.path(), e);
            not_found("channel data unreadable")
        }
    }
}

fn not_found(error: &str) -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "error": error, "message": NO_DATA_HINT })),
    )
        .into_response()
}

async fn trigger_scrape(State(state): State<AppState>) -> Response {
    info!("Refresh requested");
    match state.controller.trigger().await {
        Ok(summary) => Json(json!({
            "message": "scrape finished",
            "count": summary.entry_count,
            "log": summary.log,
        }))
        .into_response(),
        Err(RefreshError::Conflict) => (
            StatusCode::CONFLICT,
            Json(json!({
                "error": "scrape already running",
                "message": "Retry once the current run has finished.",
            })),
        )
            .into_response(),
        Err(RefreshError::Run { message, details }) => {
            error!("Scrape failed: {}", message);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": message, "details": details })),
            )
                .into_response()
        }
    }
}

#[derive(Serialize)]
struct StatusBody {
    state: RunState,
    last_run: Option<LastRun>,
}

async fn get_status(State(state): State<AppState>) -> Json<StatusBody> {
    Json(StatusBody {
        state: state.controller.state(),
        last_run: state.controller.last_run(),
    })
}
