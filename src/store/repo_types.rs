use std::fmt;

use serde::{Deserialize, Serialize};
use sqlx::{types::Json, FromRow};
use time::{Date, OffsetDateTime};
use uuid::Uuid;

/// Direction of a break entry.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BreakKind {
    Out,
    In,
}

/// One break-out or break-in event in a user's break history.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BreakEntry {
    #[serde(rename = "type")]
    pub kind: BreakKind,
    #[serde(with = "time::serde::rfc3339")]
    pub time: OffsetDateTime,
}

/// Age band a participant falls into.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Category {
    Junior,
    Senior,
}

impl Category {
    pub fn as_str(self) -> &'static str {
        match self {
            Category::Junior => "Junior",
            Category::Senior => "Senior",
        }
    }

    /// Badge color printed on the ID card.
    pub fn color(self) -> &'static str {
        match self {
            Category::Junior => "red",
            Category::Senior => "blue",
        }
    }

    /// Unknown labels are dropped rather than guessed.
    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "Junior" => Some(Category::Junior),
            "Senior" => Some(Category::Senior),
            _ => None,
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Free-form participant details collected at registration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq, FromRow)]
pub struct ParticipantProfile {
    pub father_name: String,
    pub mother_name: String,
    pub contact_home: String,
    pub contact_father_office: String,
    pub contact_father_mobile: String,
    pub contact_mother_office: String,
    pub contact_mother_mobile: String,
    pub email: String,
    pub residence: String,
    pub parent_agreement: bool,
    pub parent_signature: String,
    pub medical_conditions: Vec<String>,
    pub other_condition: String,
    pub medical_notes: String,
}

/// A registered participant or volunteer (`users` collection).
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct UserRecord {
    pub id: Uuid,
    pub student_id: Option<String>,
    pub generated_id: Option<String>,
    /// Scan lookup key; always `normalize_identifier(generated_id)`.
    pub generated_id_lowercase: Option<String>,
    pub qr_value: Option<String>,
    pub participant_name: String,
    #[serde(with = "crate::iso_date::option")]
    pub dob: Option<Date>,
    pub age: Option<i32>,
    pub category: Option<Category>,
    pub category_color: Option<String>,
    #[serde(flatten)]
    pub profile: ParticipantProfile,
    pub breaks: Vec<BreakEntry>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub sign_in: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub sign_out: Option<OffsetDateTime>,
    pub id_generated: bool,
    #[serde(with = "time::serde::rfc3339::option")]
    pub id_generated_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl UserRecord {
    pub fn last_break(&self) -> Option<&BreakEntry> {
        self.breaks.last()
    }

    /// Signed in, not signed out and not currently out on a break.
    pub fn in_session(&self) -> bool {
        self.sign_in.is_some()
            && self.sign_out.is_none()
            && self.last_break().map_or(true, |b| b.kind == BreakKind::In)
    }
}

/// Row shape of `users` as stored in Postgres.
#[derive(Debug, FromRow)]
pub struct UserRow {
    pub id: Uuid,
    pub student_id: Option<String>,
    pub generated_id: Option<String>,
    pub generated_id_lowercase: Option<String>,
    pub qr_value: Option<String>,
    pub participant_name: String,
    pub dob: Option<Date>,
    pub age: Option<i32>,
    pub category: Option<String>,
    pub category_color: Option<String>,
    #[sqlx(flatten)]
    pub profile: ParticipantProfile,
    pub breaks: Json<Vec<BreakEntry>>,
    pub sign_in: Option<OffsetDateTime>,
    pub sign_out: Option<OffsetDateTime>,
    pub id_generated: bool,
    pub id_generated_at: Option<OffsetDateTime>,
    pub created_at: OffsetDateTime,
}

impl From<UserRow> for UserRecord {
    fn from(r: UserRow) -> Self {
        Self {
            id: r.id,
            student_id: r.student_id,
            generated_id: r.generated_id,
            generated_id_lowercase: r.generated_id_lowercase,
            qr_value: r.qr_value,
            participant_name: r.participant_name,
            dob: r.dob,
            age: r.age,
            category: r.category.as_deref().and_then(Category::from_label),
            category_color: r.category_color,
            profile: r.profile,
            breaks: r.breaks.0,
            sign_in: r.sign_in,
            sign_out: r.sign_out,
            id_generated: r.id_generated,
            id_generated_at: r.id_generated_at,
            created_at: r.created_at,
        }
    }
}

/// Everything needed to create a user record.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub student_id: String,
    pub participant_name: String,
    pub dob: Date,
    pub age: i32,
    pub category: Option<Category>,
    pub profile: ParticipantProfile,
    pub created_at: OffsetDateTime,
}

/// Field-level mutations applied atomically to one user record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserUpdate {
    SignIn(OffsetDateTime),
    SignOut(OffsetDateTime),
    AppendBreak(BreakEntry),
    MarkIdGenerated {
        generated_id: String,
        generated_id_lowercase: String,
        qr_value: String,
        at: OffsetDateTime,
    },
}

pub const STATUS_PRESENT: &str = "Present";
pub const STATUS_ABSENT: &str = "Absent";

/// One student's status on one day (`attendance` collection).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, FromRow)]
pub struct AttendanceRecord {
    #[serde(with = "crate::iso_date")]
    pub date: Date,
    pub student_name: String,
    pub status: String,
}

impl AttendanceRecord {
    pub fn is_present(&self) -> bool {
        self.status == STATUS_PRESENT
    }

    pub fn is_absent(&self) -> bool {
        self.status == STATUS_ABSENT
    }
}

/// Collections that emit change events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    Users,
    Attendance,
}

impl Collection {
    pub fn as_str(self) -> &'static str {
        match self {
            Collection::Users => "users",
            Collection::Attendance => "attendance",
        }
    }

    pub fn from_table(name: &str) -> Option<Self> {
        match name {
            "users" => Some(Collection::Users),
            "attendance" => Some(Collection::Attendance),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Change {
    pub collection: Collection,
}

/// Scan lookup key: whitespace removed, lowercased.
pub fn normalize_identifier(raw: &str) -> String {
    raw.chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_lowercase()
}
