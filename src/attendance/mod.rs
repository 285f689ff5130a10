use crate::state::AppState;
use axum::Router;
use uuid::Uuid;

pub mod classifier;
mod dto;
pub mod handlers;
pub mod registry;
pub mod session;
pub mod source;

pub use registry::ScanSessions;

#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    #[error("scan device unavailable: {0}")]
    DeviceUnavailable(String),
    #[error("scan session {0} not found")]
    SessionNotFound(Uuid),
    #[error("scan session is closed")]
    SessionClosed,
}

pub fn router() -> Router<AppState> {
    handlers::scan_routes()
}
