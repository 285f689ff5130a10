use serde::{Deserialize, Serialize};
use time::Date;

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct AdminStats {
    pub total_registers: usize,
    pub session_in: usize,
    pub session_out: usize,
    pub total_breaks: usize,
    pub today_present: usize,
    pub today_absent: usize,
    pub present_names: String,
    pub absent_names: String,
}

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TableSort {
    #[default]
    Name,
    Status,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TableQuery {
    #[serde(default, with = "crate::iso_date::option")]
    pub date: Option<Date>,
    #[serde(default)]
    pub search: Option<String>,
    #[serde(default)]
    pub sort: TableSort,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct AttendanceSummary {
    pub total_classes: usize,
    pub attended: usize,
    pub absent: usize,
    /// One decimal place, e.g. `"66.7"`.
    pub percentage: String,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct TableRow {
    pub name: String,
    pub status: String,
    pub summary: AttendanceSummary,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct AttendanceTable {
    #[serde(with = "crate::iso_date")]
    pub date: Date,
    pub present_count: usize,
    pub absent_count: usize,
    pub rows: Vec<TableRow>,
}
