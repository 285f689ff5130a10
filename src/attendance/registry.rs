use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};

use tokio::{
    sync::oneshot,
    task::JoinHandle,
    time::{Instant, MissedTickBehavior},
};
use tracing::{info, warn};
use uuid::Uuid;

use super::{
    session::{run_scan_loop, AttendanceScanSession, ScanOutcome},
    source::{ScanFeed, ScanSource},
    ScanError,
};

struct ActiveSession {
    session: Arc<AttendanceScanSession>,
    feed: ScanFeed,
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<()>,
    /// Last open, frame or history request.
    last_seen: Instant,
}

/// Scan sessions currently open on this server, keyed by session id.
#[derive(Clone, Default)]
pub struct ScanSessions {
    inner: Arc<Mutex<HashMap<Uuid, ActiveSession>>>,
}

impl ScanSessions {
    fn lock(&self) -> MutexGuard<'_, HashMap<Uuid, ActiveSession>> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Starts `source` and runs `session` on it. A source that cannot start
    /// is reported before anything is registered.
    pub async fn open<S>(
        &self,
        session: AttendanceScanSession,
        feed: ScanFeed,
        mut source: S,
    ) -> Result<Uuid, ScanError>
    where
        S: ScanSource + 'static,
    {
        source.start().await?;

        let id = Uuid::new_v4();
        let session = Arc::new(session);
        let (shutdown, stop_rx) = oneshot::channel();
        let task = tokio::spawn(run_scan_loop(Arc::clone(&session), source, stop_rx));
        self.lock().insert(
            id,
            ActiveSession {
                session,
                feed,
                shutdown,
                task,
                last_seen: Instant::now(),
            },
        );
        info!(session_id = %id, "scan session started");
        Ok(id)
    }

    pub fn feed(&self, id: Uuid) -> Result<ScanFeed, ScanError> {
        self.lock()
            .get_mut(&id)
            .map(|s| {
                s.last_seen = Instant::now();
                s.feed.clone()
            })
            .ok_or(ScanError::SessionNotFound(id))
    }

    pub fn history(&self, id: Uuid) -> Result<Vec<ScanOutcome>, ScanError> {
        self.lock()
            .get_mut(&id)
            .map(|s| {
                s.last_seen = Instant::now();
                s.session.history()
            })
            .ok_or(ScanError::SessionNotFound(id))
    }

    /// Stops the loop and releases the source. Scans already accepted finish
    /// on their own; closing an unknown session is a no-op.
    pub async fn close(&self, id: Uuid) -> bool {
        let removed = self.lock().remove(&id);
        let Some(active) = removed else {
            return false;
        };
        // The loop may already have ended on its own.
        let _ = active.shutdown.send(());
        if let Err(e) = active.task.await {
            warn!(session_id = %id, error = %e, "scan loop panicked");
        }
        info!(session_id = %id, "scan session stopped");
        true
    }

    /// Closes every session not touched for `max_idle` as of `now`.
    pub async fn reap_idle(&self, now: Instant, max_idle: Duration) -> usize {
        let stale: Vec<Uuid> = self
            .lock()
            .iter()
            .filter(|(_, s)| now.saturating_duration_since(s.last_seen) >= max_idle)
            .map(|(id, _)| *id)
            .collect();

        let mut closed = 0;
        for id in stale {
            if self.close(id).await {
                info!(session_id = %id, "idle scan session closed");
                closed += 1;
            }
        }
        closed
    }

    /// Background task closing sessions abandoned by their client.
    pub fn spawn_reaper(&self, max_idle: Duration) -> JoinHandle<()> {
        let sessions = self.clone();
        let period = (max_idle / 2).max(Duration::from_millis(1));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                sessions.reap_idle(Instant::now(), max_idle).await;
            }
        })
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.lock().len()
    }
}

#[cfg(test)]
mod registry_tests {
    use std::time::Duration;

    use super::*;
    use crate::{
        attendance::{
            session::ScanSettings,
            source::{scan_channel, ChannelScanSource},
        },
        clock::FixedClock,
        config::ScanWindows,
        store::memory::MemoryRecordStore,
    };
    use time::{macros::datetime, UtcOffset};

    fn session(store: Arc<MemoryRecordStore>) -> AttendanceScanSession {
        AttendanceScanSession::new(
            store,
            Arc::new(FixedClock::new(datetime!(2025-12-20 12:00 UTC))),
            ScanSettings {
                windows: ScanWindows::default(),
                utc_offset: UtcOffset::UTC,
            },
        )
    }

    #[tokio::test]
    async fn open_feed_and_close() {
        let store = Arc::new(MemoryRecordStore::new());
        store.seed_user("ANNA", "STU-007");
        let sessions = ScanSessions::default();
        let (feed, source) = scan_channel(8);

        let id = sessions.open(session(store.clone()), feed, source).await.unwrap();
        sessions.feed(id).unwrap().push("STU-007".into()).unwrap();
        tokio::time::timeout(Duration::from_secs(1), async {
            while sessions.history(id).unwrap().is_empty() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("scan resolved");

        assert!(sessions.close(id).await);
        assert!(!sessions.close(id).await);
        assert_eq!(sessions.len(), 0);
        assert!(matches!(sessions.history(id), Err(ScanError::SessionNotFound(_))));
    }

    #[tokio::test]
    async fn device_failure_registers_nothing() {
        let sessions = ScanSessions::default();
        let (feed, _unused) = scan_channel(1);
        let err = sessions
            .open(
                session(Arc::new(MemoryRecordStore::new())),
                feed,
                ChannelScanSource::unavailable(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ScanError::DeviceUnavailable(_)));
        assert_eq!(sessions.len(), 0);
    }

    #[tokio::test]
    async fn idle_session_is_closed_and_its_feed_rejects_frames() {
        let sessions = ScanSessions::default();
        let (feed, source) = scan_channel(8);
        let id = sessions
            .open(session(Arc::new(MemoryRecordStore::new())), feed, source)
            .await
            .unwrap();
        let feed = sessions.feed(id).unwrap();
        let max_idle = Duration::from_secs(60);

        assert_eq!(sessions.reap_idle(Instant::now(), max_idle).await, 0);
        assert_eq!(sessions.len(), 1);

        let later = Instant::now() + max_idle + Duration::from_secs(1);
        assert_eq!(sessions.reap_idle(later, max_idle).await, 1);
        assert_eq!(sessions.len(), 0);
        assert!(matches!(feed.push("STU-007".into()), Err(ScanError::SessionClosed)));
    }

    #[tokio::test]
    async fn reaper_task_closes_abandoned_sessions() {
        let sessions = ScanSessions::default();
        let (feed, source) = scan_channel(8);
        sessions
            .open(session(Arc::new(MemoryRecordStore::new())), feed, source)
            .await
            .unwrap();

        let reaper = sessions.spawn_reaper(Duration::from_millis(20));
        tokio::time::timeout(Duration::from_secs(2), async {
            while sessions.len() > 0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("abandoned session closed");
        reaper.abort();
    }
}
