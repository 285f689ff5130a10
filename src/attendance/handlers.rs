use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
};
use tracing::{error, instrument, warn};
use uuid::Uuid;

use super::{
    dto::{FrameRequest, ScanHistoryItem, StartedSessionResponse},
    session::{AttendanceScanSession, ScanSettings},
    source::scan_channel,
    ScanError,
};
use crate::state::AppState;

/// Frames buffered per session before new ones are dropped.
const FRAME_BUFFER: usize = 32;

pub fn scan_routes() -> Router<AppState> {
    Router::new()
        .route("/scan-sessions", post(start_session))
        .route("/scan-sessions/:id", delete(stop_session))
        .route("/scan-sessions/:id/frames", post(push_frame))
        .route("/scan-sessions/:id/history", get(session_history))
}

fn scan_error(e: ScanError) -> (StatusCode, String) {
    let status = match e {
        ScanError::DeviceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        ScanError::SessionNotFound(_) => StatusCode::NOT_FOUND,
        ScanError::SessionClosed => StatusCode::GONE,
    };
    (status, e.to_string())
}

#[instrument(skip(state))]
pub async fn start_session(
    State(state): State<AppState>,
) -> Result<(StatusCode, Json<StartedSessionResponse>), (StatusCode, String)> {
    let session = AttendanceScanSession::new(
        state.store.clone(),
        state.clock.clone(),
        ScanSettings {
            windows: state.config.scan,
            utc_offset: state.config.utc_offset,
        },
    );
    let (feed, source) = scan_channel(FRAME_BUFFER);
    let session_id = state
        .scans
        .open(session, feed, source)
        .await
        .map_err(|e| {
            error!(error = %e, "scan session failed to start");
            scan_error(e)
        })?;
    Ok((StatusCode::CREATED, Json(StartedSessionResponse { session_id })))
}

#[instrument(skip(state, payload))]
pub async fn push_frame(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<FrameRequest>,
) -> Result<StatusCode, (StatusCode, String)> {
    let feed = state.scans.feed(id).map_err(scan_error)?;
    feed.push(payload.text).map_err(|e| {
        warn!(session_id = %id, error = %e, "frame for closed session");
        scan_error(e)
    })?;
    Ok(StatusCode::ACCEPTED)
}

#[instrument(skip(state))]
pub async fn session_history(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<ScanHistoryItem>>, (StatusCode, String)> {
    let history = state.scans.history(id).map_err(scan_error)?;
    Ok(Json(history.into_iter().map(ScanHistoryItem::from).collect()))
}

#[instrument(skip(state))]
pub async fn stop_session(State(state): State<AppState>, Path(id): Path<Uuid>) -> StatusCode {
    // Stopping a session that is already gone is not an error.
    state.scans.close(id).await;
    StatusCode::NO_CONTENT
}
