use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    routing::{get, post},
    Json, Router,
};
use futures_util::{stream::BoxStream, Stream, StreamExt};
use serde::Serialize;
use time::{Date, UtcOffset};
use tracing::{error, info, instrument, warn};

use super::{
    dto::{AdminStats, AttendanceTable, TableQuery},
    services::{load_admin_stats, load_attendance_table},
};
use crate::{
    clock::Clock,
    state::AppState,
    store::{subscription::snapshots, AttendanceRecord, Collection, StoreError},
};

pub fn dashboard_routes() -> Router<AppState> {
    Router::new()
        .route("/admin/stats", get(admin_stats))
        .route("/admin/stats/stream", get(admin_stats_stream))
        .route("/attendance", post(record_attendance))
        .route("/attendance/table", get(attendance_table))
        .route("/attendance/table/stream", get(attendance_table_stream))
}

fn local_today(clock: &dyn Clock, offset: UtcOffset) -> Date {
    clock.now_utc().to_offset(offset).date()
}

fn internal(e: StoreError) -> (StatusCode, String) {
    error!(error = %e, "record store failure");
    (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
}

/// Turns a snapshot stream into server-sent events named `event`.
fn sse_events<T>(
    event: &'static str,
    snapshots: BoxStream<'static, Result<T, StoreError>>,
) -> Sse<impl Stream<Item = Result<Event, axum::Error>>>
where
    T: Serialize + Send + 'static,
{
    Sse::new(snapshots.map(move |snapshot| match snapshot {
        Ok(value) => Event::default().event(event).json_data(value),
        Err(e) => {
            warn!(error = %e, event, "snapshot reload failed");
            Ok(Event::default().event("error").data(e.to_string()))
        }
    }))
    .keep_alive(KeepAlive::default())
}

#[instrument(skip(state))]
pub async fn admin_stats(
    State(state): State<AppState>,
) -> Result<Json<AdminStats>, (StatusCode, String)> {
    let today = local_today(state.clock.as_ref(), state.config.utc_offset);
    load_admin_stats(state.store.clone(), today)
        .await
        .map(Json)
        .map_err(internal)
}

#[instrument(skip(state))]
pub async fn admin_stats_stream(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, axum::Error>>> {
    let clock = Arc::clone(&state.clock);
    let offset = state.config.utc_offset;
    let stream = snapshots(
        state.store.clone(),
        &[Collection::Users, Collection::Attendance],
        move |store| load_admin_stats(store, local_today(clock.as_ref(), offset)),
    );
    info!("admin stats subscriber connected");
    sse_events("stats", stream)
}

#[instrument(skip(state))]
pub async fn attendance_table(
    State(state): State<AppState>,
    Query(query): Query<TableQuery>,
) -> Result<Json<AttendanceTable>, (StatusCode, String)> {
    let today = local_today(state.clock.as_ref(), state.config.utc_offset);
    load_attendance_table(state.store.clone(), query, today)
        .await
        .map(Json)
        .map_err(internal)
}

#[instrument(skip(state))]
pub async fn attendance_table_stream(
    State(state): State<AppState>,
    Query(query): Query<TableQuery>,
) -> Sse<impl Stream<Item = Result<Event, axum::Error>>> {
    let clock = Arc::clone(&state.clock);
    let offset = state.config.utc_offset;
    let stream = snapshots(state.store.clone(), &[Collection::Attendance], move |store| {
        load_attendance_table(store, query.clone(), local_today(clock.as_ref(), offset))
    });
    sse_events("table", stream)
}

/// Write path for the process that marks daily attendance.
#[instrument(skip(state, record), fields(date = %record.date, student = %record.student_name))]
pub async fn record_attendance(
    State(state): State<AppState>,
    Json(record): Json<AttendanceRecord>,
) -> Result<StatusCode, (StatusCode, String)> {
    state
        .store
        .insert_attendance(record)
        .await
        .map_err(internal)?;
    Ok(StatusCode::CREATED)
}
