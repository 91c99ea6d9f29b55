//! Session state machine rules.
//!
//! `apply` is pure: it decides what a session should look like after an
//! event and leaves persistence to [`super::sessions::SessionService`].
//! Events that come from the conferencing service (`Started`,
//! `RoomFinished`) are tolerant of reordering and never fail; explicit user
//! actions report an `InvalidTransition` with the reason.

use bson::DateTime;
use classmeet_config::MeetingSettings;
use classmeet_db::models::{Session, SessionStatus};
use classmeet_db::time;

use super::window::SessionWindow;
use crate::error::MeetingError;

#[derive(Debug, Clone, PartialEq)]
pub enum LifecycleEvent {
    /// A room was bound or the join window opened.
    RoomReady,
    /// The room started or the first participant joined.
    Started { at: DateTime },
    RoomFinished { at: DateTime, duration_secs: i64 },
    /// Explicit end by the teacher.
    Ended { at: DateTime },
    /// Window expired while the session was still running.
    AutoComplete { at: DateTime },
    Cancel { reason: String },
    Reschedule { to: DateTime },
}

impl LifecycleEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::RoomReady => "room_ready",
            Self::Started { .. } => "started",
            Self::RoomFinished { .. } => "room_finished",
            Self::Ended { .. } => "ended",
            Self::AutoComplete { .. } => "auto_complete",
            Self::Cancel { .. } => "cancel",
            Self::Reschedule { .. } => "reschedule",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    Unchanged,
    Changed(Session),
}

pub fn apply(
    session: &Session,
    event: &LifecycleEvent,
    settings: &MeetingSettings,
) -> Result<Transition, MeetingError> {
    use SessionStatus::*;

    let mut next = session.clone();
    match (session.status, event) {
        (Scheduled, LifecycleEvent::RoomReady) => next.status = Ready,
        (_, LifecycleEvent::RoomReady) => {}

        (Scheduled | Ready | Ongoing, LifecycleEvent::Started { at }) => {
            next.status = Ongoing;
            next.started_at = Some(match session.started_at {
                Some(existing) => time::earliest(existing, *at),
                None => *at,
            });
            next.keep_alive_until =
                Some(SessionWindow::for_session(session, settings).keep_alive_until());
        }
        (Completed | Cancelled, LifecycleEvent::Started { .. }) => {}

        (Ready | Ongoing, LifecycleEvent::RoomFinished { at, duration_secs }) => {
            next.keep_alive_until = None;
            next.ended_at = Some(*at);
            next.actual_duration_secs = Some((*duration_secs).max(0));
            if *duration_secs >= settings.min_activity_secs {
                next.status = Completed;
            }
        }
        (Scheduled | Completed | Cancelled, LifecycleEvent::RoomFinished { .. }) => {}

        (Ongoing, LifecycleEvent::Ended { at }) => {
            complete(&mut next, *at);
        }
        (Completed, LifecycleEvent::Ended { .. }) => {}
        (Cancelled, LifecycleEvent::Ended { .. }) => {
            return Err(invalid("session already cancelled"));
        }
        (Scheduled | Ready, LifecycleEvent::Ended { .. }) => {
            return Err(invalid("session has not started"));
        }

        (Ongoing, LifecycleEvent::AutoComplete { .. }) if is_no_show(session, settings) => {}
        (Ongoing, LifecycleEvent::AutoComplete { at }) => {
            let ended = session.ended_at.unwrap_or(*at);
            complete(&mut next, ended);
        }
        (_, LifecycleEvent::AutoComplete { .. }) => {}

        (_, LifecycleEvent::Cancel { reason }) if reason.trim().is_empty() => {
            return Err(MeetingError::InvalidRequest(
                "a cancellation reason is required".to_string(),
            ));
        }
        (Cancelled, LifecycleEvent::Cancel { .. }) => {}
        (Completed, LifecycleEvent::Cancel { .. }) => {
            return Err(invalid("session already completed"));
        }
        (Scheduled | Ready | Ongoing, LifecycleEvent::Cancel { reason }) => {
            next.status = Cancelled;
            next.cancellation_reason = Some(reason.trim().to_string());
            next.keep_alive_until = None;
        }

        (Scheduled | Ready, LifecycleEvent::Reschedule { to }) => {
            next.status = Scheduled;
            next.rescheduled_from = Some(session.scheduled_start);
            next.rescheduled_to = Some(*to);
            next.scheduled_start = *to;
            next.started_at = None;
            next.ended_at = None;
            next.actual_duration_secs = None;
            next.keep_alive_until = None;
            next.meeting.expires_at = None;
        }
        (Ongoing, LifecycleEvent::Reschedule { .. }) => {
            return Err(invalid("session already in progress"));
        }
        (Completed, LifecycleEvent::Reschedule { .. }) => {
            return Err(invalid("session already completed"));
        }
        (Cancelled, LifecycleEvent::Reschedule { .. }) => {
            return Err(invalid("session already cancelled"));
        }
    }

    if next == *session {
        Ok(Transition::Unchanged)
    } else {
        Ok(Transition::Changed(next))
    }
}

/// The room finished below the minimum activity and nobody ended the
/// session explicitly. Only an explicit end may complete it.
pub fn is_no_show(session: &Session, settings: &MeetingSettings) -> bool {
    session.ended_at.is_some()
        && session
            .actual_duration_secs
            .is_some_and(|secs| secs < settings.min_activity_secs)
}

fn complete(session: &mut Session, ended_at: DateTime) {
    session.status = SessionStatus::Completed;
    session.ended_at = Some(ended_at);
    session.keep_alive_until = None;
    if session.actual_duration_secs.is_none() {
        let started = session.started_at.unwrap_or(session.scheduled_start);
        session.actual_duration_secs = Some(time::seconds_between(started, ended_at).max(0));
    }
}

fn invalid(reason: &str) -> MeetingError {
    MeetingError::InvalidTransition(reason.to_string())
}
