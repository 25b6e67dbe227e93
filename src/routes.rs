use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;

use crate::error::ApiError;
use crate::models::NewEvent;
use crate::store::EventStore;

/// Browser tracker script, embedded at compile time and served as-is.
const TRACKER_JS: &str = include_str!("../assets/tracker.js");

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<EventStore>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health_check))
        .route("/tracker.js", get(tracker_script))
        .route("/api/events", post(ingest_event))
        .route("/api/events/sessions", get(list_sessions))
        .route("/api/events/sessions/:session_id", get(session_events))
        .route("/api/events/heatmap", get(heatmap))
        .route("/api/events/pages", get(list_pages))
        .with_state(state)
}

async fn root() -> &'static str {
    "User Analytics API v0.1.0"
}

async fn health_check() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "message": "Analytics API is running",
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

async fn tracker_script() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "application/javascript; charset=utf-8")],
        TRACKER_JS,
    )
}

/// Validate and persist one event.
async fn ingest_event(
    State(state): State<AppState>,
    Json(input): Json<NewEvent>,
) -> Result<(StatusCode, Json<serde_json::Value>), ApiError> {
    let event = input.into_event(Utc::now())?;
    state.store.insert(&event)?;

    tracing::info!(
        event_type = event.event_type.as_str(),
        session_id = %event.session_id,
        page_url = %event.page_url,
        "event ingested"
    );

    Ok((
        StatusCode::CREATED,
        Json(json!({ "success": true, "event": event })),
    ))
}

/// All sessions with aggregated stats, most recently active first.
async fn list_sessions(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let sessions = state.store.session_summaries()?;
    Ok(Json(json!({ "sessions": sessions })))
}

/// All events of one session in replay order. A session nobody has seen
/// yields an empty list, not a 404.
async fn session_events(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let events = state.store.session_events(&session_id)?;
    Ok(Json(json!({ "session_id": session_id, "events": events })))
}

#[derive(Debug, Deserialize)]
struct HeatmapParams {
    page_url: Option<String>,
}

/// Click coordinates for one page, for heatmap rendering.
async fn heatmap(
    State(state): State<AppState>,
    Query(params): Query<HeatmapParams>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let page_url = params
        .page_url
        .filter(|u| !u.is_empty())
        .ok_or_else(|| ApiError::Validation("page_url query parameter is required".to_string()))?;

    let clicks = state.store.clicks_for_page(&page_url)?;
    Ok(Json(json!({ "page_url": page_url, "clicks": clicks })))
}

async fn list_pages(State(state): State<AppState>) -> Result<Json<serde_json::Value>, ApiError> {
    let pages = state.store.pages()?;
    Ok(Json(json!({ "pages": pages })))
}
