use std::{convert::Infallible, time::Duration};

use async_trait::async_trait;
use sqlx::{postgres::PgListener, types::Json, PgPool};
use time::Date;
use tokio::sync::broadcast;
use tracing::{debug, warn};
use uuid::Uuid;

use super::{
    repo_types::UserRow, AttendanceRecord, Change, Collection, NewUser, RecordStore, StoreError,
    UserRecord, UserUpdate, CHANGE_FEED_CAPACITY,
};

/// Channel the migration's triggers notify with the changed table name.
pub const CHANGE_CHANNEL: &str = "record_changes";
const RECONNECT_DELAY: Duration = Duration::from_secs(2);

macro_rules! user_columns {
    () => {
        r#"id, student_id, generated_id, generated_id_lowercase, qr_value,
           participant_name, dob, age, category, category_color,
           father_name, mother_name, contact_home,
           contact_father_office, contact_father_mobile,
           contact_mother_office, contact_mother_mobile,
           email, residence, parent_agreement, parent_signature,
           medical_conditions, other_condition, medical_notes,
           breaks, sign_in, sign_out, id_generated, id_generated_at, created_at"#
    };
}

#[derive(Clone)]
pub struct PgRecordStore {
    db: PgPool,
    changes: broadcast::Sender<Change>,
}

impl PgRecordStore {
    /// Wraps the pool and starts forwarding `LISTEN` notifications as change events.
    pub fn new(db: PgPool) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_FEED_CAPACITY);
        tokio::spawn(forward_changes(db.clone(), changes.clone()));
        Self { db, changes }
    }
}

async fn forward_changes(db: PgPool, tx: broadcast::Sender<Change>) {
    loop {
        match listen(&db, &tx).await {
            Ok(never) => match never {},
            Err(e) => warn!(error = %e, "change listener dropped; reconnecting"),
        }
        tokio::time::sleep(RECONNECT_DELAY).await;
    }
}

async fn listen(db: &PgPool, tx: &broadcast::Sender<Change>) -> Result<Infallible, sqlx::Error> {
    let mut listener = PgListener::connect_with(db).await?;
    listener.listen(CHANGE_CHANNEL).await?;
    debug!(channel = CHANGE_CHANNEL, "listening for record changes");
    loop {
        let notification = listener.recv().await?;
        match Collection::from_table(notification.payload()) {
            // No subscribers is not an error.
            Some(collection) => {
                let _ = tx.send(Change { collection });
            }
            None => debug!(payload = notification.payload(), "ignoring unknown table"),
        }
    }
}

#[async_trait]
impl RecordStore for PgRecordStore {
    async fn find_user(&self, id: Uuid) -> Result<Option<UserRecord>, StoreError> {
        let row = sqlx::query_as::<_, UserRow>(concat!(
            "SELECT ",
            user_columns!(),
            " FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await?;
        Ok(row.map(UserRecord::from))
    }

    async fn find_user_by_lookup_key(&self, key: &str) -> Result<Option<UserRecord>, StoreError> {
        let row = sqlx::query_as::<_, UserRow>(concat!(
            "SELECT ",
            user_columns!(),
            r#"
            FROM users
            WHERE generated_id_lowercase = $1
            ORDER BY created_at ASC
            LIMIT 1
            "#
        ))
        .bind(key)
        .fetch_optional(&self.db)
        .await?;
        Ok(row.map(UserRecord::from))
    }

    async fn latest_user(&self) -> Result<Option<UserRecord>, StoreError> {
        let row = sqlx::query_as::<_, UserRow>(concat!(
            "SELECT ",
            user_columns!(),
            " FROM users ORDER BY created_at DESC LIMIT 1"
        ))
        .fetch_optional(&self.db)
        .await?;
        Ok(row.map(UserRecord::from))
    }

    async fn list_users(&self) -> Result<Vec<UserRecord>, StoreError> {
        let rows = sqlx::query_as::<_, UserRow>(concat!(
            "SELECT ",
            user_columns!(),
            " FROM users ORDER BY created_at ASC"
        ))
        .fetch_all(&self.db)
        .await?;
        Ok(rows.into_iter().map(UserRecord::from).collect())
    }

    async fn insert_user(&self, new: NewUser) -> Result<UserRecord, StoreError> {
        let p = &new.profile;
        let row = sqlx::query_as::<_, UserRow>(concat!(
            r#"
            INSERT INTO users (
                student_id, participant_name, dob, age, category, category_color,
                father_name, mother_name, contact_home,
                contact_father_office, contact_father_mobile,
                contact_mother_office, contact_mother_mobile,
                email, residence, parent_agreement, parent_signature,
                medical_conditions, other_condition, medical_notes, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11,
                    $12, $13, $14, $15, $16, $17, $18, $19, $20, $21)
            RETURNING "#,
            user_columns!()
        ))
        .bind(&new.student_id)
        .bind(&new.participant_name)
        .bind(new.dob)
        .bind(new.age)
        .bind(new.category.map(|c| c.as_str()))
        .bind(new.category.map(|c| c.color()))
        .bind(&p.father_name)
        .bind(&p.mother_name)
        .bind(&p.contact_home)
        .bind(&p.contact_father_office)
        .bind(&p.contact_father_mobile)
        .bind(&p.contact_mother_office)
        .bind(&p.contact_mother_mobile)
        .bind(&p.email)
        .bind(&p.residence)
        .bind(p.parent_agreement)
        .bind(&p.parent_signature)
        .bind(&p.medical_conditions)
        .bind(&p.other_condition)
        .bind(&p.medical_notes)
        .bind(new.created_at)
        .fetch_one(&self.db)
        .await?;
        Ok(row.into())
    }

    async fn apply_update(&self, id: Uuid, update: UserUpdate) -> Result<(), StoreError> {
        let result = match update {
            UserUpdate::SignIn(at) => {
                sqlx::query("UPDATE users SET sign_in = $2 WHERE id = $1")
                    .bind(id)
                    .bind(at)
                    .execute(&self.db)
                    .await?
            }
            UserUpdate::SignOut(at) => {
                sqlx::query("UPDATE users SET sign_out = $2 WHERE id = $1")
                    .bind(id)
                    .bind(at)
                    .execute(&self.db)
                    .await?
            }
            UserUpdate::AppendBreak(entry) => {
                sqlx::query("UPDATE users SET breaks = breaks || $2 WHERE id = $1")
                    .bind(id)
                    .bind(Json([entry]))
                    .execute(&self.db)
                    .await?
            }
            UserUpdate::MarkIdGenerated {
                generated_id,
                generated_id_lowercase,
                qr_value,
                at,
            } => {
                sqlx::query(
                    r#"
                    UPDATE users
                       SET id_generated = TRUE,
                           id_generated_at = $2,
                           generated_id = $3,
                           generated_id_lowercase = $4,
                           qr_value = $5
                     WHERE id = $1
                    "#,
                )
                .bind(id)
                .bind(at)
                .bind(generated_id)
                .bind(generated_id_lowercase)
                .bind(qr_value)
                .execute(&self.db)
                .await?
            }
        };
        if result.rows_affected() == 0 {
            return Err(StoreError::UserNotFound(id));
        }
        Ok(())
    }

    async fn insert_attendance(&self, record: AttendanceRecord) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO attendance (date, student_name, status)
            VALUES ($1, $2, $3)
            "#,
        )
        .bind(record.date)
        .bind(record.student_name)
        .bind(record.status)
        .execute(&self.db)
        .await?;
        Ok(())
    }

    async fn list_attendance(
        &self,
        date: Option<Date>,
    ) -> Result<Vec<AttendanceRecord>, StoreError> {
        let rows = sqlx::query_as::<_, AttendanceRecord>(
            r#"
            SELECT date, student_name, status
              FROM attendance
             WHERE $1::date IS NULL OR date = $1
             ORDER BY created_at ASC
            "#,
        )
        .bind(date)
        .fetch_all(&self.db)
        .await?;
        Ok(rows)
    }

    fn changes(&self) -> broadcast::Receiver<Change> {
        self.changes.subscribe()
    }
}
