//! Pure time-window rules. Nothing here reads the clock; callers pass `now`.

use bson::DateTime;
use classmeet_config::MeetingSettings;
use classmeet_db::models::Session;
use classmeet_db::time;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowPhase {
    /// Before the preparation window opens.
    TooEarly,
    /// Preparation window before the scheduled start.
    PreSession,
    /// Between scheduled start and scheduled end.
    Active,
    /// Ending buffer after the scheduled end.
    PostSession,
    Expired,
}

impl WindowPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TooEarly => "too_early",
            Self::PreSession => "pre_session",
            Self::Active => "active",
            Self::PostSession => "post_session",
            Self::Expired => "expired",
        }
    }

    pub fn is_joinable(&self) -> bool {
        matches!(self, Self::PreSession | Self::Active | Self::PostSession)
    }
}

/// The instants that bound a session's phases. Each boundary belongs to the
/// later phase, so `opens_at` is already `PreSession` and `end` is already
/// `PostSession`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SessionWindow {
    pub opens_at: DateTime,
    pub start: DateTime,
    pub end: DateTime,
    pub closes_at: DateTime,
    late_after: DateTime,
    attendance_cap: DateTime,
    keep_alive_until: DateTime,
}

impl SessionWindow {
    pub fn new(start: DateTime, duration_minutes: i64, settings: &MeetingSettings) -> Self {
        let end = time::plus_minutes(start, duration_minutes);
        Self {
            opens_at: time::plus_minutes(start, -settings.preparation_minutes),
            start,
            end,
            closes_at: time::plus_minutes(end, settings.ending_buffer_minutes),
            late_after: time::plus_minutes(start, settings.late_tolerance_minutes),
            attendance_cap: time::plus_minutes(end, settings.post_session_grace_minutes),
            keep_alive_until: time::plus_minutes(end, settings.persistence_grace_minutes),
        }
    }

    pub fn for_session(session: &Session, settings: &MeetingSettings) -> Self {
        Self::new(session.scheduled_start, session.duration_minutes, settings)
    }

    pub fn phase(&self, now: DateTime) -> WindowPhase {
        if now < self.opens_at {
            WindowPhase::TooEarly
        } else if now < self.start {
            WindowPhase::PreSession
        } else if now < self.end {
            WindowPhase::Active
        } else if now < self.closes_at {
            WindowPhase::PostSession
        } else {
            WindowPhase::Expired
        }
    }

    pub fn is_joinable(&self, now: DateTime) -> bool {
        self.phase(now).is_joinable()
    }

    /// A first join strictly after the tolerance counts as late.
    pub fn is_late(&self, first_join: DateTime) -> bool {
        first_join > self.late_after
    }

    /// Latest instant an open attendance interval may be closed at.
    pub fn attendance_cap(&self) -> DateTime {
        self.attendance_cap
    }

    pub fn keep_alive_until(&self) -> DateTime {
        self.keep_alive_until
    }

    pub fn seconds_until_open(&self, now: DateTime) -> i64 {
        time::seconds_between(now, self.opens_at).max(0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmptyRoomDecision {
    /// The session is flagged persistent until the given instant.
    KeepPersistent,
    /// The scheduled window is still imminent or running.
    KeepWithinWindow,
    /// Let the conferencing service collect the room.
    AllowCleanup,
}

impl EmptyRoomDecision {
    pub fn keeps_room(&self) -> bool {
        !matches!(self, Self::AllowCleanup)
    }
}

/// What to do when the last participant leaves. Never completes the session.
pub fn empty_room_decision(
    session: &Session,
    window: &SessionWindow,
    now: DateTime,
) -> EmptyRoomDecision {
    if session.keep_alive_until.is_some_and(|until| until > now) {
        return EmptyRoomDecision::KeepPersistent;
    }
    match window.phase(now) {
        WindowPhase::PreSession | WindowPhase::Active => EmptyRoomDecision::KeepWithinWindow,
        _ => EmptyRoomDecision::AllowCleanup,
    }
}
