//! HTTP surface — submission, per-run event streaming, and ticket lookup.
//!
//! Thin I/O wrappers over the runner: the submission endpoint answers with a
//! run id immediately, the SSE endpoint drains that run's event channel with
//! heartbeats on idle, and ticket lookup returns a structured not-found for
//! unknown ids.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    Json, Router,
    extract::{Multipart, Path, State},
    http::StatusCode,
    response::{
        IntoResponse, Response,
        sse::{Event, Sse},
    },
    routing::{get, post},
};
use futures::{StreamExt, stream};
use tower_http::cors::CorsLayer;
use tracing::{info, warn};
use uuid::Uuid;

use crate::events::RunEvent;
use crate::store::Database;
use crate::triage::TriageRunner;
use crate::triage::types::AttachmentInfo;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub runner: Arc<TriageRunner>,
    /// Idle timeout before the stream emits a synthetic heartbeat.
    pub heartbeat: Duration,
}

/// Build the Axum router with the triage API routes.
pub fn api_routes(runner: Arc<TriageRunner>, heartbeat: Duration) -> Router {
    let state = AppState { runner, heartbeat };

    Router::new()
        .route("/health", get(health))
        .route("/api/triage", post(submit))
        .route("/api/runs/{run_id}/events", get(stream_events))
        .route("/api/tickets/{ticket_id}", get(get_ticket))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ── Health ──────────────────────────────────────────────────────────

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "mailroom"
    }))
}

// ── Submission ──────────────────────────────────────────────────────

/// Accept a multipart submission (subject, body, attachment files) and
/// return the run id. Attachment content is read only to measure its size —
/// nothing beyond filename/content-type/length is kept.
async fn submit(State(state): State<AppState>, mut multipart: Multipart) -> Response {
    let mut subject = String::new();
    let mut body = String::new();
    let mut attachments: Vec<AttachmentInfo> = Vec::new();

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => {
                warn!(error = %e, "Malformed multipart submission");
                return (
                    StatusCode::BAD_REQUEST,
                    Json(serde_json::json!({"error": format!("invalid multipart body: {e}")})),
                )
                    .into_response();
            }
        };

        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("subject") => subject = field.text().await.unwrap_or_default(),
            Some("body") => body = field.text().await.unwrap_or_default(),
            Some("attachments") => {
                let filename = field.file_name().map(str::to_string).unwrap_or_default();
                let content_type = field
                    .content_type()
                    .map(str::to_string)
                    .unwrap_or_else(|| "application/octet-stream".to_string());
                let bytes = match field.bytes().await {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        warn!(error = %e, "Failed to read attachment field");
                        continue;
                    }
                };
                if filename.is_empty() {
                    continue;
                }
                attachments.push(AttachmentInfo {
                    filename,
                    content_type,
                    size_bytes: bytes.len() as u64,
                });
            }
            _ => {}
        }
    }

    let run_id = state
        .runner
        .spawn(
            subject.trim().to_string(),
            body.trim().to_string(),
            attachments,
        )
        .await;

    (
        StatusCode::ACCEPTED,
        Json(serde_json::json!({"run_id": run_id})),
    )
        .into_response()
}

// ── Event stream ────────────────────────────────────────────────────

fn sse_event(event: &RunEvent) -> Event {
    Event::default()
        .event(event.label())
        .data(serde_json::to_string(event).unwrap_or_default())
}

/// Stream a run's events as SSE.
///
/// Emits an initial connected status, then drains the run channel: idle
/// timeouts become heartbeat statuses, and the stream closes after the
/// terminal `final`/`error` event.
async fn stream_events(
    State(state): State<AppState>,
    Path(run_id): Path<String>,
) -> Response {
    let run_id = match Uuid::parse_str(&run_id) {
        Ok(id) => id,
        Err(_) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({"error": "Invalid run id"})),
            )
                .into_response();
        }
    };

    let Some(rx) = state.runner.registry().subscribe(run_id).await else {
        return (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({"error": "Unknown run id"})),
        )
            .into_response();
    };

    info!(run_id = %run_id, "Event stream attached");
    let heartbeat = state.heartbeat;

    let connected = RunEvent::status("ui", "Connected. Waiting for updates...", 0);
    let stream = stream::once(async move { Ok::<Event, Infallible>(sse_event(&connected)) })
        .chain(stream::unfold(Some(rx), move |rx| async move {
            let mut rx = rx?;
            match tokio::time::timeout(heartbeat, rx.recv()).await {
                Ok(Some(event)) => {
                    let sse = sse_event(&event);
                    let next = if event.is_terminal() { None } else { Some(rx) };
                    Some((Ok(sse), next))
                }
                // Worker gone without a terminal event — close the stream.
                Ok(None) => None,
                Err(_) => Some((Ok(sse_event(&RunEvent::heartbeat())), Some(rx))),
            }
        }));

    Sse::new(stream).into_response()
}

// ── Ticket lookup ───────────────────────────────────────────────────

async fn get_ticket(State(state): State<AppState>, Path(ticket_id): Path<String>) -> Response {
    let ticket_id = ticket_id.trim();

    match state.runner.store().get_ticket(ticket_id).await {
        Ok(Some(record)) => {
            Json(serde_json::json!({"found": true, "data": record})).into_response()
        }
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({"found": false, "ticket_id": ticket_id})),
        )
            .into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({"error": e.to_string()})),
        )
            .into_response(),
    }
}
