use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc, Mutex, MutexGuard,
};

use async_trait::async_trait;
use time::{Date, OffsetDateTime};
use tokio::sync::{broadcast, Barrier};
use uuid::Uuid;

use super::{
    AttendanceRecord, Change, Collection, NewUser, ParticipantProfile, RecordStore, StoreError,
    UserRecord, UserUpdate, CHANGE_FEED_CAPACITY,
};

#[derive(Default)]
struct Collections {
    users: Vec<UserRecord>,
    attendance: Vec<AttendanceRecord>,
}

/// In-process record store with outage injection.
pub struct MemoryRecordStore {
    inner: Mutex<Collections>,
    changes: broadcast::Sender<Change>,
    failures_pending: AtomicUsize,
    mutations: AtomicUsize,
    read_gate: Mutex<Option<Arc<Barrier>>>,
}

impl Default for MemoryRecordStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_FEED_CAPACITY);
        Self {
            inner: Mutex::new(Collections::default()),
            changes,
            failures_pending: AtomicUsize::new(0),
            mutations: AtomicUsize::new(0),
            read_gate: Mutex::new(None),
        }
    }

    /// The next `n` operations fail with `StoreError::Unavailable`.
    pub fn fail_next(&self, n: usize) {
        self.failures_pending.store(n, Ordering::SeqCst);
    }

    /// Holds `latest_user` and `find_user_by_lookup_key` until `parties`
    /// callers are waiting, so concurrent callers all read the same state.
    pub fn hold_reads(&self, parties: usize) {
        *self.read_gate.lock().unwrap_or_else(|p| p.into_inner()) =
            Some(Arc::new(Barrier::new(parties)));
    }

    async fn pass_read_gate(&self) {
        let gate = self
            .read_gate
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone();
        if let Some(gate) = gate {
            gate.wait().await;
        }
    }

    /// Number of successful writes so far.
    pub fn mutations(&self) -> usize {
        self.mutations.load(Ordering::SeqCst)
    }

    /// Inserts a user already carrying a scan identifier.
    pub fn seed_user(&self, name: &str, generated_id: &str) -> UserRecord {
        let user = UserRecord {
            id: Uuid::new_v4(),
            student_id: Some(generated_id.to_string()),
            generated_id: Some(generated_id.to_string()),
            generated_id_lowercase: Some(super::repo_types::normalize_identifier(generated_id)),
            qr_value: Some(generated_id.to_string()),
            participant_name: name.to_string(),
            dob: None,
            age: None,
            category: None,
            category_color: None,
            profile: ParticipantProfile::default(),
            breaks: Vec::new(),
            sign_in: None,
            sign_out: None,
            id_generated: true,
            id_generated_at: None,
            created_at: OffsetDateTime::UNIX_EPOCH,
        };
        self.lock().users.push(user.clone());
        user
    }

    pub fn user(&self, id: Uuid) -> Option<UserRecord> {
        self.lock().users.iter().find(|u| u.id == id).cloned()
    }

    fn lock(&self) -> MutexGuard<'_, Collections> {
        // A panicking test thread must not wedge the others.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn check_available(&self) -> Result<(), StoreError> {
        let consumed = self
            .failures_pending
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        match consumed {
            Ok(_) => Err(StoreError::Unavailable("injected outage".into())),
            Err(_) => Ok(()),
        }
    }

    fn written(&self, collection: Collection) {
        self.mutations.fetch_add(1, Ordering::SeqCst);
        let _ = self.changes.send(Change { collection });
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn find_user(&self, id: Uuid) -> Result<Option<UserRecord>, StoreError> {
        self.check_available()?;
        Ok(self.user(id))
    }

    async fn find_user_by_lookup_key(&self, key: &str) -> Result<Option<UserRecord>, StoreError> {
        self.check_available()?;
        self.pass_read_gate().await;
        Ok(self
            .lock()
            .users
            .iter()
            .find(|u| u.generated_id_lowercase.as_deref() == Some(key))
            .cloned())
    }

    async fn latest_user(&self) -> Result<Option<UserRecord>, StoreError> {
        self.check_available()?;
        self.pass_read_gate().await;
        // max_by_key keeps the last maximum, so later insertions win ties.
        Ok(self
            .lock()
            .users
            .iter()
            .max_by_key(|u| u.created_at)
            .cloned())
    }

    async fn list_users(&self) -> Result<Vec<UserRecord>, StoreError> {
        self.check_available()?;
        Ok(self.lock().users.clone())
    }

    async fn insert_user(&self, new: NewUser) -> Result<UserRecord, StoreError> {
        self.check_available()?;
        let user = UserRecord {
            id: Uuid::new_v4(),
            student_id: Some(new.student_id),
            generated_id: None,
            generated_id_lowercase: None,
            qr_value: None,
            participant_name: new.participant_name,
            dob: Some(new.dob),
            age: Some(new.age),
            category: new.category,
            category_color: new.category.map(|c| c.color().to_string()),
            profile: new.profile,
            breaks: Vec::new(),
            sign_in: None,
            sign_out: None,
            id_generated: false,
            id_generated_at: None,
            created_at: new.created_at,
        };
        self.lock().users.push(user.clone());
        self.written(Collection::Users);
        Ok(user)
    }

    async fn apply_update(&self, id: Uuid, update: UserUpdate) -> Result<(), StoreError> {
        self.check_available()?;
        {
            let mut inner = self.lock();
            let user = inner
                .users
                .iter_mut()
                .find(|u| u.id == id)
                .ok_or(StoreError::UserNotFound(id))?;
            match update {
                UserUpdate::SignIn(at) => user.sign_in = Some(at),
                UserUpdate::SignOut(at) => user.sign_out = Some(at),
                UserUpdate::AppendBreak(entry) => user.breaks.push(entry),
                UserUpdate::MarkIdGenerated {
                    generated_id,
                    generated_id_lowercase,
                    qr_value,
                    at,
                } => {
                    user.id_generated = true;
                    user.id_generated_at = Some(at);
                    user.generated_id = Some(generated_id);
                    user.generated_id_lowercase = Some(generated_id_lowercase);
                    user.qr_value = Some(qr_value);
                }
            }
        }
        self.written(Collection::Users);
        Ok(())
    }

    async fn insert_attendance(&self, record: AttendanceRecord) -> Result<(), StoreError> {
        self.check_available()?;
        self.lock().attendance.push(record);
        self.written(Collection::Attendance);
        Ok(())
    }

    async fn list_attendance(
        &self,
        date: Option<Date>,
    ) -> Result<Vec<AttendanceRecord>, StoreError> {
        self.check_available()?;
        Ok(self
            .lock()
            .attendance
            .iter()
            .filter(|a| date.map_or(true, |d| a.date == d))
            .cloned()
            .collect())
    }

    fn changes(&self) -> broadcast::Receiver<Change> {
        self.changes.subscribe()
    }
}

#[cfg(test)]
mod memory_tests {
    use super::*;
    use crate::store::{BreakEntry, BreakKind};
    use time::macros::{date, datetime};

    #[tokio::test]
    async fn lookup_matches_normalized_key_only() {
        let store = MemoryRecordStore::new();
        store.seed_user("ANNA", "STU-007");
        assert!(store.find_user_by_lookup_key("stu-007").await.unwrap().is_some());
        assert!(store.find_user_by_lookup_key("STU-007").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn append_break_keeps_order_and_notifies() {
        let store = MemoryRecordStore::new();
        let user = store.seed_user("ANNA", "STU-007");
        let mut rx = store.changes();

        for (kind, at) in [
            (BreakKind::Out, datetime!(2025-12-20 10:00 UTC)),
            (BreakKind::In, datetime!(2025-12-20 10:20 UTC)),
        ] {
            store
                .apply_update(user.id, UserUpdate::AppendBreak(BreakEntry { kind, time: at }))
                .await
                .unwrap();
        }

        let kinds: Vec<_> = store.user(user.id).unwrap().breaks.iter().map(|b| b.kind).collect();
        assert_eq!(kinds, vec![BreakKind::Out, BreakKind::In]);
        assert_eq!(rx.recv().await.unwrap().collection, Collection::Users);
        assert_eq!(store.mutations(), 2);
    }

    #[tokio::test]
    async fn injected_outage_fails_then_recovers() {
        let store = MemoryRecordStore::new();
        store.fail_next(1);
        let err = store.list_users().await.unwrap_err();
        assert!(matches!(err, StoreError::Unavailable(_)));
        assert!(store.list_users().await.is_ok());
    }

    #[tokio::test]
    async fn update_of_missing_user_is_reported() {
        let store = MemoryRecordStore::new();
        let id = Uuid::new_v4();
        let err = store
            .apply_update(id, UserUpdate::SignIn(datetime!(2025-12-20 09:00 UTC)))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::UserNotFound(missing) if missing == id));
        assert_eq!(store.mutations(), 0);
    }

    #[tokio::test]
    async fn attendance_duplicates_are_kept() {
        let store = MemoryRecordStore::new();
        let rec = AttendanceRecord {
            date: date!(2025-12-20),
            student_name: "ANNA".into(),
            status: "Present".into(),
        };
        store.insert_attendance(rec.clone()).await.unwrap();
        store.insert_attendance(rec).await.unwrap();
        assert_eq!(store.list_attendance(Some(date!(2025-12-20))).await.unwrap().len(), 2);
        assert!(store.list_attendance(Some(date!(2025-12-21))).await.unwrap().is_empty());
    }
}
