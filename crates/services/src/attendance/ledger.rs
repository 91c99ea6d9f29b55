use std::sync::Arc;

use bson::DateTime;
use classmeet_config::MeetingSettings;
use classmeet_db::models::{
    AttendanceRecord, AttendanceStatus, AttendeeRole, FinalAttendance, Session, SessionKey,
};
use classmeet_db::time;
use tracing::{debug, info, warn};

use super::calculator::{attendance_percentage, classify};
use crate::dao::AttendanceStore;
use crate::error::{MeetingError, MeetingResult};
use crate::meeting::capable::MeetingCapable;
use crate::meeting::window::SessionWindow;

const MAX_CAS_ATTEMPTS: usize = 5;

// ---- Interval rules ------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinEffect {
    Opened,
    /// An interval was already open.
    Reconnect,
    /// A leave arrived before this join; the interval was closed against it.
    ClosedAgainstPendingLeave,
    Finalized,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaveEffect {
    Closed { seconds: i64 },
    /// No open interval and not newer than the last leave.
    Duplicate,
    /// No open interval; kept until the matching join shows up.
    Pending,
    Finalized,
}

/// Opens an interval at `at`, never earlier than the last leave so
/// intervals cannot overlap.
pub fn apply_join(record: &mut AttendanceRecord, at: DateTime) -> JoinEffect {
    if record.finalized.is_some() {
        return JoinEffect::Finalized;
    }

    record.first_join_time = Some(match record.first_join_time {
        Some(first) => time::earliest(first, at),
        None => at,
    });

    if record.open_since.is_some() {
        return JoinEffect::Reconnect;
    }

    let start = record
        .last_leave_time
        .map_or(at, |last| time::latest(last, at));

    if let Some(pending) = record.pending_leave_at.take() {
        if pending > start {
            record.accumulated_present_seconds += time::seconds_between(start, pending);
            record.last_leave_time = Some(pending);
            record.join_count += 1;
            record.leave_count += 1;
            return JoinEffect::ClosedAgainstPendingLeave;
        }
    }

    record.open_since = Some(start);
    record.join_count += 1;
    JoinEffect::Opened
}

/// Closes the open interval, adding `max(0, at - open_since)`.
pub fn apply_leave(record: &mut AttendanceRecord, at: DateTime) -> LeaveEffect {
    if record.finalized.is_some() {
        return LeaveEffect::Finalized;
    }

    match record.open_since.take() {
        Some(open) => {
            let seconds = time::seconds_between(open, at).max(0);
            record.accumulated_present_seconds += seconds;
            record.last_leave_time = Some(time::latest(open, at));
            record.leave_count += 1;
            LeaveEffect::Closed { seconds }
        }
        None if record.last_leave_time.is_some_and(|last| at <= last) => LeaveEffect::Duplicate,
        None => {
            record.pending_leave_at = Some(
                record
                    .pending_leave_at
                    .map_or(at, |pending| time::latest(pending, at)),
            );
            LeaveEffect::Pending
        }
    }
}

/// Closes an open interval at `at` and drops any unmatched leave.
pub fn close_open(record: &mut AttendanceRecord, at: DateTime) -> Option<i64> {
    record.pending_leave_at = None;
    let open = record.open_since.take()?;
    let seconds = time::seconds_between(open, at).max(0);
    record.accumulated_present_seconds += seconds;
    record.last_leave_time = Some(time::latest(open, at));
    record.leave_count += 1;
    Some(seconds)
}

/// Present seconds including the part of a still-open interval up to `now`.
pub fn live_present_seconds(record: &AttendanceRecord, now: DateTime) -> i64 {
    record.accumulated_present_seconds
        + record
            .open_since
            .map_or(0, |open| time::seconds_between(open, now).max(0))
}

// ---- Ledger service ------------------------------------------------------

#[derive(Debug, Clone)]
pub struct AttendanceEntry {
    pub user_id: i64,
    pub participant_identity: Option<String>,
    pub role: AttendeeRole,
    pub status: AttendanceStatus,
    pub percentage: f64,
    pub present_seconds: i64,
    pub first_join_time: Option<DateTime>,
    pub last_leave_time: Option<DateTime>,
    pub join_count: u32,
    pub leave_count: u32,
    pub in_room: bool,
    pub finalized: bool,
}

#[derive(Debug, Clone)]
pub struct AttendanceReport {
    pub session: SessionKey,
    pub planned_seconds: i64,
    pub entries: Vec<AttendanceEntry>,
}

/// Owns attendance rows. Each row is updated with its own revision
/// compare-and-swap, independently of the session record.
pub struct AttendanceLedger {
    store: Arc<dyn AttendanceStore>,
    settings: MeetingSettings,
}

impl AttendanceLedger {
    pub fn new(store: Arc<dyn AttendanceStore>, settings: MeetingSettings) -> Self {
        Self { store, settings }
    }

    pub async fn record_join(
        &self,
        session: &Session,
        user_id: i64,
        identity: &str,
        at: DateTime,
    ) -> MeetingResult<AttendanceRecord> {
        let mut effect = JoinEffect::Opened;
        let record = self
            .mutate(session, user_id, identity, |record| {
                effect = apply_join(record, at);
                effect != JoinEffect::Finalized
            })
            .await?;
        debug!(session = %session.key(), user_id, effect = ?effect, "Join recorded");
        Ok(record)
    }

    pub async fn record_leave(
        &self,
        session: &Session,
        user_id: i64,
        identity: &str,
        at: DateTime,
    ) -> MeetingResult<AttendanceRecord> {
        let mut effect = LeaveEffect::Duplicate;
        let record = self
            .mutate(session, user_id, identity, |record| {
                effect = apply_leave(record, at);
                !matches!(effect, LeaveEffect::Duplicate | LeaveEffect::Finalized)
            })
            .await?;
        debug!(session = %session.key(), user_id, effect = ?effect, "Leave recorded");
        Ok(record)
    }

    /// Closes open intervals at `min(at, scheduled_end + grace)` and stores
    /// the classification of every row. Rows already finalized are left
    /// alone, so calling this twice is harmless.
    pub async fn finalize(
        &self,
        session: &Session,
        at: DateTime,
    ) -> MeetingResult<Vec<AttendanceRecord>> {
        let key = session.key();
        let close_at = time::earliest(
            at,
            SessionWindow::for_session(session, &self.settings).attendance_cap(),
        );

        let mut finalized = Vec::new();
        for row in self.store.list(&key).await? {
            if row.finalized.is_some() {
                finalized.push(row);
                continue;
            }
            let record = self
                .mutate(session, row.user_id, &row.participant_identity, |record| {
                    if record.finalized.is_some() {
                        return false;
                    }
                    close_open(record, close_at);
                    let status = classify(session, record, &self.settings);
                    record.finalized = Some(FinalAttendance {
                        status,
                        percentage: attendance_percentage(
                            record.accumulated_present_seconds,
                            session.planned_seconds(),
                        ),
                        present_seconds: record.accumulated_present_seconds,
                        finalized_at: at,
                    });
                    true
                })
                .await?;
            finalized.push(record);
        }

        info!(session = %key, rows = finalized.len(), "Attendance finalized");
        Ok(finalized)
    }

    pub async fn records(&self, key: &SessionKey) -> MeetingResult<Vec<AttendanceRecord>> {
        Ok(self.store.list(key).await?)
    }

    /// Per-participant view. Open intervals count up to `now`; roster
    /// members without a row are reported absent.
    pub async fn report(&self, session: &Session, now: DateTime) -> MeetingResult<AttendanceReport> {
        let key = session.key();
        let cap = SessionWindow::for_session(session, &self.settings).attendance_cap();
        let records = self.store.list(&key).await?;

        let mut entries: Vec<AttendanceEntry> = records
            .iter()
            .map(|record| match &record.finalized {
                Some(done) => AttendanceEntry {
                    user_id: record.user_id,
                    participant_identity: Some(record.participant_identity.clone()),
                    role: record.role,
                    status: done.status,
                    percentage: done.percentage,
                    present_seconds: done.present_seconds,
                    first_join_time: record.first_join_time,
                    last_leave_time: record.last_leave_time,
                    join_count: record.join_count,
                    leave_count: record.leave_count,
                    in_room: false,
                    finalized: true,
                },
                None => {
                    let mut projected = record.clone();
                    projected.accumulated_present_seconds =
                        live_present_seconds(record, time::earliest(now, cap));
                    AttendanceEntry {
                        user_id: record.user_id,
                        participant_identity: Some(record.participant_identity.clone()),
                        role: record.role,
                        status: classify(session, &projected, &self.settings),
                        percentage: attendance_percentage(
                            projected.accumulated_present_seconds,
                            session.planned_seconds(),
                        ),
                        present_seconds: projected.accumulated_present_seconds,
                        first_join_time: record.first_join_time,
                        last_leave_time: record.last_leave_time,
                        join_count: record.join_count,
                        leave_count: record.leave_count,
                        in_room: record.is_open(),
                        finalized: false,
                    }
                }
            })
            .collect();

        let mut expected = vec![session.teacher_id()];
        expected.extend(session.participant_ids());
        for user_id in expected {
            if records.iter().any(|r| r.user_id == user_id) {
                continue;
            }
            entries.push(AttendanceEntry {
                user_id,
                participant_identity: None,
                role: role_for(session, user_id),
                status: AttendanceStatus::Absent,
                percentage: 0.0,
                present_seconds: 0,
                first_join_time: None,
                last_leave_time: None,
                join_count: 0,
                leave_count: 0,
                in_room: false,
                finalized: false,
            });
        }

        Ok(AttendanceReport {
            session: key,
            planned_seconds: session.planned_seconds(),
            entries,
        })
    }

    /// Loads or creates the row and applies `change` with compare-and-swap.
    /// `change` returns whether it modified the row.
    async fn mutate<F>(
        &self,
        session: &Session,
        user_id: i64,
        identity: &str,
        mut change: F,
    ) -> MeetingResult<AttendanceRecord>
    where
        F: FnMut(&mut AttendanceRecord) -> bool + Send,
    {
        let key = session.key();
        for attempt in 1..=MAX_CAS_ATTEMPTS {
            let current = match self.store.find(&key, user_id).await? {
                Some(current) => current,
                None => {
                    let fresh = AttendanceRecord::new(
                        &key,
                        user_id,
                        identity,
                        role_for(session, user_id),
                    );
                    self.store.insert(fresh).await?;
                    continue;
                }
            };

            let mut next = current.clone();
            if !change(&mut next) {
                return Ok(current);
            }
            if self.store.compare_and_swap(&current, next.clone()).await? {
                next.revision = current.revision + 1;
                return Ok(next);
            }
            debug!(session = %key, user_id, attempt, "Lost attendance compare-and-swap race, retrying");
        }

        warn!(session = %key, user_id, "Giving up after repeated attendance conflicts");
        Err(MeetingError::Contention(format!("{key} user {user_id}")))
    }
}

fn role_for(session: &Session, user_id: i64) -> AttendeeRole {
    if session.teacher_id() == user_id {
        AttendeeRole::Teacher
    } else {
        AttendeeRole::Student
    }
}
