use std::fmt;

use serde::Serialize;
use time::OffsetDateTime;

use crate::{
    config::ScanWindows,
    store::{BreakEntry, BreakKind, UserUpdate},
};

/// What a scan means at the time it happened.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub enum ScanStatus {
    #[serde(rename = "Sign-In")]
    SignIn,
    #[serde(rename = "Break Out")]
    BreakOut,
    #[serde(rename = "Break In")]
    BreakIn,
    #[serde(rename = "Sign-Out")]
    SignOut,
}

impl ScanStatus {
    pub fn label(self) -> &'static str {
        match self {
            ScanStatus::SignIn => "Sign-In",
            ScanStatus::BreakOut => "Break Out",
            ScanStatus::BreakIn => "Break In",
            ScanStatus::SignOut => "Sign-Out",
        }
    }
}

impl fmt::Display for ScanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub status: ScanStatus,
    pub update: UserUpdate,
}

/// Classifies a scan from the venue-local time of day and the user's last break.
///
/// Prior sign-in/sign-out state is not consulted: a user who
/// already signed out is classified again purely by the clock, and there is
/// no notion of which day the break history belongs to.
pub fn classify(
    now_local: OffsetDateTime,
    last_break: Option<&BreakEntry>,
    windows: &ScanWindows,
) -> Classification {
    let minutes = u16::from(now_local.hour()) * 60 + u16::from(now_local.minute());

    if minutes < windows.sign_in_before {
        return Classification {
            status: ScanStatus::SignIn,
            update: UserUpdate::SignIn(now_local),
        };
    }
    if minutes >= windows.sign_out_from {
        return Classification {
            status: ScanStatus::SignOut,
            update: UserUpdate::SignOut(now_local),
        };
    }

    let (status, kind) = match last_break.map(|b| b.kind) {
        None | Some(BreakKind::In) => (ScanStatus::BreakOut, BreakKind::Out),
        Some(BreakKind::Out) => (ScanStatus::BreakIn, BreakKind::In),
    };
    Classification {
        status,
        update: UserUpdate::AppendBreak(BreakEntry {
            kind,
            time: now_local,
        }),
    }
}
