use std::{
    collections::VecDeque,
    sync::{Arc, Mutex, MutexGuard},
};

use serde::Serialize;
use time::{OffsetDateTime, UtcOffset};
use tokio::sync::oneshot;
use tracing::{debug, error, info, instrument, warn};

use super::{
    classifier::{classify, ScanStatus},
    source::ScanSource,
};
use crate::{
    clock::Clock,
    config::ScanWindows,
    store::{repo_types::normalize_identifier, RecordStore, StoreError},
};

pub const NOT_FOUND_NAME: &str = "User not found";

/// One row of the operator's scan history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScanOutcome {
    pub name: String,
    pub identifier: String,
    /// `None` when the badge matched no user.
    pub status: Option<ScanStatus>,
    #[serde(with = "time::serde::rfc3339")]
    pub time: OffsetDateTime,
}

impl ScanOutcome {
    pub fn status_label(&self) -> &'static str {
        self.status.map_or("-", ScanStatus::label)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ScanSettings {
    pub windows: ScanWindows,
    pub utc_offset: UtcOffset,
}

#[derive(Default)]
struct SessionState {
    last_scanned: Option<String>,
    history: VecDeque<ScanOutcome>,
}

/// Operator-facing scan session: debounces badges, resolves them to users,
/// records attendance transitions and keeps a newest-first history.
///
/// The state lock is never held across store I/O, so two accepted scans can
/// resolve concurrently and land in history in completion order.
pub struct AttendanceScanSession {
    store: Arc<dyn RecordStore>,
    clock: Arc<dyn Clock>,
    settings: ScanSettings,
    state: Mutex<SessionState>,
}

impl AttendanceScanSession {
    pub fn new(store: Arc<dyn RecordStore>, clock: Arc<dyn Clock>, settings: ScanSettings) -> Self {
        Self {
            store,
            clock,
            settings,
            state: Mutex::new(SessionState::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Empty and repeated reads are rejected; anything else becomes the new
    /// debounce key and is returned normalized.
    pub fn accept(&self, raw: &str) -> Option<String> {
        if raw.is_empty() {
            return None;
        }
        let identifier = normalize_identifier(raw);
        let mut state = self.lock();
        if state.last_scanned.as_deref() == Some(identifier.as_str()) {
            debug!(%identifier, "repeat read suppressed");
            return None;
        }
        state.last_scanned = Some(identifier.clone());
        Some(identifier)
    }

    /// Looks the identifier up, applies the classified update and records the
    /// outcome. Store failures leave history untouched.
    #[instrument(skip(self))]
    pub async fn resolve(&self, identifier: String) -> Result<ScanOutcome, StoreError> {
        let now = self.clock.now_utc().to_offset(self.settings.utc_offset);

        let outcome = match self.store.find_user_by_lookup_key(&identifier).await? {
            None => {
                info!(%identifier, "scan did not match any user");
                ScanOutcome {
                    name: NOT_FOUND_NAME.to_string(),
                    identifier,
                    status: None,
                    time: now,
                }
            }
            Some(user) => {
                let decision = classify(now, user.last_break(), &self.settings.windows);
                self.store.apply_update(user.id, decision.update).await?;
                info!(user_id = %user.id, status = %decision.status, "scan recorded");
                ScanOutcome {
                    name: user.participant_name,
                    identifier: user.generated_id.unwrap_or(identifier),
                    status: Some(decision.status),
                    time: now,
                }
            }
        };

        self.lock().history.push_front(outcome.clone());
        Ok(outcome)
    }

    /// [`accept`](Self::accept) then [`resolve`](Self::resolve); `Ok(None)` for rejected reads.
    pub async fn submit_scan(&self, raw: &str) -> Result<Option<ScanOutcome>, StoreError> {
        match self.accept(raw) {
            Some(identifier) => self.resolve(identifier).await.map(Some),
            None => Ok(None),
        }
    }

    /// Newest first.
    pub fn history(&self) -> Vec<ScanOutcome> {
        self.lock().history.iter().cloned().collect()
    }
}

/// Drives a session from a started source until the source runs dry or
/// `shutdown` fires, then stops the source.
///
/// Debounce runs in frame order; each accepted scan resolves on its own task
/// so a slow store does not hold up the camera. Tasks already spawned keep
/// running after shutdown.
pub async fn run_scan_loop<S>(
    session: Arc<AttendanceScanSession>,
    mut source: S,
    mut shutdown: oneshot::Receiver<()>,
) where
    S: ScanSource + 'static,
{
    loop {
        let frame = tokio::select! {
            _ = &mut shutdown => break,
            frame = source.next_decoded() => frame,
        };
        let Some(text) = frame else { break };
        let Some(identifier) = session.accept(&text) else {
            continue;
        };
        let session = Arc::clone(&session);
        tokio::spawn(async move {
            if let Err(e) = session.resolve(identifier).await {
                error!(error = %e, "scan failed; record not updated");
            }
        });
    }

    if let Err(e) = source.stop().await {
        warn!(error = %e, "scan source stop failed");
    }
    debug!("scan loop finished");
}
