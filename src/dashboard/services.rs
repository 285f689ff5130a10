use std::{
    cmp::Ordering,
    collections::{BTreeMap, HashSet},
    sync::Arc,
};

use time::Date;

use super::dto::{
    AdminStats, AttendanceSummary, AttendanceTable, TableQuery, TableRow, TableSort,
};
use crate::store::{
    repo_types::{STATUS_ABSENT, STATUS_PRESENT},
    AttendanceRecord, RecordStore, StoreError, UserRecord,
};

fn join_names<'a>(names: impl Iterator<Item = &'a str>) -> String {
    let joined = names.collect::<Vec<_>>().join(", ");
    if joined.is_empty() {
        "-".to_string()
    } else {
        joined
    }
}

/// Headline numbers for the admin dashboard. Duplicate attendance rows count twice.
pub fn admin_stats(users: &[UserRecord], today: &[AttendanceRecord]) -> AdminStats {
    let session_in = users.iter().filter(|u| u.in_session()).count();
    AdminStats {
        total_registers: users.len(),
        session_in,
        session_out: users.len() - session_in,
        total_breaks: users.iter().map(|u| u.breaks.len()).sum(),
        today_present: today.iter().filter(|a| a.is_present()).count(),
        today_absent: today.iter().filter(|a| a.is_absent()).count(),
        present_names: join_names(
            today
                .iter()
                .filter(|a| a.is_present())
                .map(|a| a.student_name.as_str()),
        ),
        absent_names: join_names(
            today
                .iter()
                .filter(|a| a.is_absent())
                .map(|a| a.student_name.as_str()),
        ),
    }
}

pub async fn load_admin_stats(
    store: Arc<dyn RecordStore>,
    today: Date,
) -> Result<AdminStats, StoreError> {
    let users = store.list_users().await?;
    let attendance = store.list_attendance(Some(today)).await?;
    Ok(admin_stats(&users, &attendance))
}

fn summarize(records: &[AttendanceRecord], name: &str) -> AttendanceSummary {
    let mine = records.iter().filter(|r| r.student_name == name);
    let (total, attended) = mine.fold((0usize, 0usize), |(t, p), r| {
        (t + 1, p + usize::from(r.is_present()))
    });
    let percentage = if total > 0 {
        format!("{:.1}", attended as f64 * 100.0 / total as f64)
    } else {
        "0".to_string()
    };
    AttendanceSummary {
        total_classes: total,
        attended,
        absent: total - attended,
        percentage,
    }
}

fn compare_names(a: &str, b: &str) -> Ordering {
    a.to_lowercase().cmp(&b.to_lowercase()).then_with(|| a.cmp(b))
}

/// Per-student view of the whole attendance history for one selected day.
///
/// Students are everyone who appears on any date. A student without a record
/// on the selected day shows as absent. Present rows come first, then absent
/// rows; any other status is left out of the table.
pub fn attendance_table(
    records: &[AttendanceRecord],
    query: &TableQuery,
    today: Date,
) -> AttendanceTable {
    let date = query.date.unwrap_or(today);
    let needle = query.search.as_deref().unwrap_or("").to_lowercase();

    let mut by_date: BTreeMap<Date, Vec<&AttendanceRecord>> = BTreeMap::new();
    for r in records {
        by_date.entry(r.date).or_default().push(r);
    }
    let on_day = by_date.get(&date).map(Vec::as_slice).unwrap_or(&[]);

    let mut seen = HashSet::new();
    let mut rows: Vec<TableRow> = records
        .iter()
        .map(|r| r.student_name.as_str())
        .filter(|name| seen.insert(*name))
        .filter(|name| name.to_lowercase().contains(&needle))
        .map(|name| TableRow {
            name: name.to_string(),
            status: on_day
                .iter()
                .find(|r| r.student_name == name)
                .map_or_else(|| STATUS_ABSENT.to_string(), |r| r.status.clone()),
            summary: summarize(records, name),
        })
        .collect();

    match query.sort {
        TableSort::Name => rows.sort_by(|a, b| compare_names(&a.name, &b.name)),
        TableSort::Status => rows.sort_by(|a, b| compare_names(&a.status, &b.status)),
    }

    let (present, absent): (Vec<_>, Vec<_>) = rows
        .into_iter()
        .filter(|r| r.status == STATUS_PRESENT || r.status == STATUS_ABSENT)
        .partition(|r| r.status == STATUS_PRESENT);

    AttendanceTable {
        date,
        present_count: present.len(),
        absent_count: absent.len(),
        rows: present.into_iter().chain(absent).collect(),
    }
}

pub async fn load_attendance_table(
    store: Arc<dyn RecordStore>,
    query: TableQuery,
    today: Date,
) -> Result<AttendanceTable, StoreError> {
    let records = store.list_attendance(None).await?;
    Ok(attendance_table(&records, &query, today))
}
