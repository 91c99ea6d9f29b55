//! Attendance classification. Pure functions of a ledger row and the
//! session schedule; the accumulated fields are all that is needed.

use classmeet_config::MeetingSettings;
use classmeet_db::models::{AttendanceRecord, AttendanceStatus, Session};

use crate::meeting::window::SessionWindow;

/// Share of the planned duration the participant was present, capped at
/// 100 and rounded to two decimals.
pub fn attendance_percentage(present_seconds: i64, planned_seconds: i64) -> f64 {
    (presence_share(present_seconds, planned_seconds) * 100.0).round() / 100.0
}

/// Unrounded percentage, capped at 100. Thresholds compare against this.
fn presence_share(present_seconds: i64, planned_seconds: i64) -> f64 {
    if planned_seconds <= 0 {
        return if present_seconds > 0 { 100.0 } else { 0.0 };
    }
    let raw = present_seconds.max(0) as f64 / planned_seconds as f64 * 100.0;
    raw.min(100.0)
}

/// `absent`, then `late`, then `partial`, then `present`.
pub fn classify(
    session: &Session,
    record: &AttendanceRecord,
    settings: &MeetingSettings,
) -> AttendanceStatus {
    let Some(first_join) = record.first_join_time else {
        return AttendanceStatus::Absent;
    };

    let window = SessionWindow::for_session(session, settings);
    if window.is_late(first_join) {
        return AttendanceStatus::Late;
    }

    let share = presence_share(record.accumulated_present_seconds, session.planned_seconds());
    if share < settings.attendance_threshold_percent {
        AttendanceStatus::Partial
    } else {
        AttendanceStatus::Present
    }
}
