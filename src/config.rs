use std::time::Duration;

use anyhow::Context;
use serde::Deserialize;
use time::{macros::format_description, UtcOffset};

/// Minutes since local midnight before which a scan counts as sign-in (09:30).
pub const DEFAULT_SIGN_IN_BEFORE: u16 = 570;
/// Minutes since local midnight from which a scan counts as sign-out (16:00).
pub const DEFAULT_SIGN_OUT_FROM: u16 = 960;
/// Seconds a scan session may go without frames or history reads before it is closed.
pub const DEFAULT_SCAN_SESSION_IDLE_SECS: u64 = 900;

/// Time-of-day windows used to classify a scan.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
pub struct ScanWindows {
    pub sign_in_before: u16,
    pub sign_out_from: u16,
}

impl Default for ScanWindows {
    fn default() -> Self {
        Self {
            sign_in_before: DEFAULT_SIGN_IN_BEFORE,
            sign_out_from: DEFAULT_SIGN_OUT_FROM,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    /// Offset of the venue's wall clock; scan windows and ages use it.
    pub utc_offset: UtcOffset,
    pub scan: ScanWindows,
    pub scan_session_idle: Duration,
    pub student_id_prefix: String,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL must be set")?;
        let utc_offset = parse_utc_offset(
            &std::env::var("APP_UTC_OFFSET").unwrap_or_else(|_| "+00:00".into()),
        )?;
        let scan = ScanWindows {
            sign_in_before: std::env::var("SCAN_SIGN_IN_BEFORE")
                .ok()
                .and_then(|v| v.parse::<u16>().ok())
                .unwrap_or(DEFAULT_SIGN_IN_BEFORE),
            sign_out_from: std::env::var("SCAN_SIGN_OUT_FROM")
                .ok()
                .and_then(|v| v.parse::<u16>().ok())
                .unwrap_or(DEFAULT_SIGN_OUT_FROM),
        };
        anyhow::ensure!(
            scan.sign_in_before <= scan.sign_out_from && scan.sign_out_from <= 24 * 60,
            "scan windows out of order: sign-in before {} / sign-out from {}",
            scan.sign_in_before,
            scan.sign_out_from
        );
        let idle_secs = std::env::var("SCAN_SESSION_IDLE_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(DEFAULT_SCAN_SESSION_IDLE_SECS);
        anyhow::ensure!(idle_secs > 0, "SCAN_SESSION_IDLE_SECS must be positive");
        let student_id_prefix =
            std::env::var("STUDENT_ID_PREFIX").unwrap_or_else(|_| "STU-".into());

        Ok(Self {
            database_url,
            utc_offset,
            scan,
            scan_session_idle: Duration::from_secs(idle_secs),
            student_id_prefix,
        })
    }
}

/// Parses offsets written as `+04:00` / `-05:30`.
pub fn parse_utc_offset(raw: &str) -> anyhow::Result<UtcOffset> {
    UtcOffset::parse(
        raw.trim(),
        format_description!("[offset_hour sign:mandatory]:[offset_minute]"),
    )
    .with_context(|| format!("invalid APP_UTC_OFFSET {raw:?}"))
}
