use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use watch_core::{normalize_url, CycleOutcome, RecipientId, StoredEvent, TargetItem, TargetStatus};

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct RegisterTargetRequest {
    pub recipient_id: RecipientId,
    pub url: String,
    pub name: Option<String>,
}

#[derive(Serialize)]
pub struct RegisterTargetResponse {
    pub recipient_id: RecipientId,
    pub url: String,
}

#[derive(Debug, Deserialize)]
pub struct TargetRef {
    pub recipient_id: RecipientId,
    pub url: String,
}

#[derive(Serialize)]
pub struct TargetsResponse {
    pub targets: Vec<TargetStatus>,
}

#[derive(Serialize)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Serialize)]
pub struct ReportResponse {
    pub recipient_id: RecipientId,
    pub url: String,
    pub report: String,
}

#[derive(Debug, Deserialize)]
pub struct EventsQuery {
    #[serde(default = "default_events_days")]
    pub days: i64,
}

fn default_events_days() -> i64 {
    14
}

#[derive(Serialize)]
pub struct EventsResponse {
    pub events: Vec<StoredEvent>,
}

#[derive(Serialize)]
pub struct CycleResponse {
    pub outcome: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub targets: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub messages: Option<usize>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/targets",
            post(register_target).get(list_targets).delete(remove_target),
        )
        .route("/report", post(send_report))
        .route("/events", get(recent_events))
        .route("/cycle", post(run_cycle))
}

/// Normalize and sanity-check a user-supplied URL.
fn normalized_valid_url(input: &str) -> Result<String, ApiError> {
    let normalized = normalize_url(input);
    let parsed = url::Url::parse(&normalized)
        .map_err(|_| ApiError::BadRequest(format!("Invalid URL: {input}")))?;
    match parsed.host_str() {
        Some(host) if host.contains('.') || host == "localhost" => Ok(normalized),
        _ => Err(ApiError::BadRequest(format!("Invalid URL: {input}"))),
    }
}

/// POST /api/v1/targets
async fn register_target(
    State(state): State<AppState>,
    Json(body): Json<RegisterTargetRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let url = normalized_valid_url(&body.url)?;

    let target = TargetItem {
        recipient: body.recipient_id,
        url: url.clone(),
        display_name: body.name,
    };
    let added = state.store.add_target(target).await?;
    if !added {
        return Err(ApiError::Conflict(format!("Target already registered: {url}")));
    }

    Ok((
        StatusCode::CREATED,
        Json(RegisterTargetResponse {
            recipient_id: body.recipient_id,
            url,
        }),
    ))
}

/// GET /api/v1/targets
async fn list_targets(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let targets = state.store.target_statuses().await?;
    Ok(Json(TargetsResponse { targets }))
}

/// DELETE /api/v1/targets
async fn remove_target(
    State(state): State<AppState>,
    Json(body): Json<TargetRef>,
) -> Result<impl IntoResponse, ApiError> {
    let url = normalize_url(&body.url);
    let removed = state.store.remove_target(body.recipient_id, &url).await?;
    if !removed {
        return Err(ApiError::NotFound(format!("Target not registered: {url}")));
    }
    Ok(Json(MessageResponse {
        message: format!("Removed {url}"),
    }))
}

/// POST /api/v1/report
async fn send_report(
    State(state): State<AppState>,
    Json(body): Json<TargetRef>,
) -> Result<impl IntoResponse, ApiError> {
    let url = normalize_url(&body.url);
    let report = state.checker.status_report(body.recipient_id, &url).await?;
    Ok(Json(ReportResponse {
        recipient_id: body.recipient_id,
        url,
        report,
    }))
}

/// GET /api/v1/events?days=N
async fn recent_events(
    State(state): State<AppState>,
    Query(query): Query<EventsQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let days = query.days.clamp(1, 365);
    let since = chrono::Utc::now() - chrono::Duration::days(days);
    let events = state.store.recent_events(since).await?;
    Ok(Json(EventsResponse { events }))
}

/// POST /api/v1/cycle
async fn run_cycle(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let response = match state.checker.try_run_cycle().await {
        CycleOutcome::Completed { targets, messages } => CycleResponse {
            outcome: "completed",
            targets: Some(targets),
            messages: Some(messages),
        },
        CycleOutcome::Skipped => CycleResponse {
            outcome: "skipped",
            targets: None,
            messages: None,
        },
    };
    Ok(Json(response))
}
