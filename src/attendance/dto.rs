use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use super::session::ScanOutcome;

#[derive(Debug, Serialize)]
pub struct StartedSessionResponse {
    pub session_id: Uuid,
}

/// One decoded frame delivered by the client's camera decoder.
#[derive(Debug, Deserialize)]
pub struct FrameRequest {
    pub text: String,
}

/// History row as shown to the operator.
#[derive(Debug, Serialize)]
pub struct ScanHistoryItem {
    pub name: String,
    pub identifier: String,
    pub status: &'static str,
    #[serde(with = "time::serde::rfc3339")]
    pub time: OffsetDateTime,
}

impl From<ScanOutcome> for ScanHistoryItem {
    fn from(o: ScanOutcome) -> Self {
        Self {
            status: o.status_label(),
            name: o.name,
            identifier: o.identifier,
            time: o.time,
        }
    }
}
