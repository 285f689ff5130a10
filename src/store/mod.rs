use async_trait::async_trait;
use time::Date;
use tokio::sync::broadcast;
use uuid::Uuid;

#[cfg(test)]
pub mod memory;
pub mod postgres;
pub mod repo_types;
pub mod subscription;

pub use repo_types::{
    AttendanceRecord, BreakEntry, BreakKind, Category, Change, Collection, NewUser,
    ParticipantProfile, UserRecord, UserUpdate,
};

/// Capacity of the change-event fan-out; slow subscribers lag and reload.
pub(crate) const CHANGE_FEED_CAPACITY: usize = 64;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(sqlx::Error),
    #[error("record store unavailable: {0}")]
    Unavailable(String),
    #[error("user {0} not found")]
    UserNotFound(Uuid),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => {
                StoreError::Unavailable(e.to_string())
            }
            other => StoreError::Database(other),
        }
    }
}

/// Document store holding the `users` and `attendance` collections.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn find_user(&self, id: Uuid) -> Result<Option<UserRecord>, StoreError>;

    /// Equality match on `generated_id_lowercase`; first match wins.
    async fn find_user_by_lookup_key(&self, key: &str) -> Result<Option<UserRecord>, StoreError>;

    /// Most recently created user, if any.
    async fn latest_user(&self) -> Result<Option<UserRecord>, StoreError>;

    async fn list_users(&self) -> Result<Vec<UserRecord>, StoreError>;

    async fn insert_user(&self, new: NewUser) -> Result<UserRecord, StoreError>;

    /// Applies one field-level update atomically to one record.
    async fn apply_update(&self, id: Uuid, update: UserUpdate) -> Result<(), StoreError>;

    async fn insert_attendance(&self, record: AttendanceRecord) -> Result<(), StoreError>;

    /// All attendance records, or only those on `date`.
    async fn list_attendance(&self, date: Option<Date>)
        -> Result<Vec<AttendanceRecord>, StoreError>;

    /// Fresh receiver of change events for every write to either collection.
    fn changes(&self) -> broadcast::Receiver<Change>;
}
