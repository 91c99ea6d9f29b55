use std::sync::Arc;

use bson::DateTime;
use classmeet_db::models::{Session, SessionKey, SessionStatus};
use classmeet_db::time;
use tracing::{info, warn};

use super::access::{MeetingRole, Requester, SessionAccessPolicy};
use super::identity;
use super::lifecycle::{self, LifecycleEvent};
use super::provisioner::{
    ParticipantToken, RoomBinding, RoomOverrides, RoomProvisioner, TokenPermissions,
};
use super::sessions::SessionService;
use super::window::WindowPhase;
use crate::attendance::{AttendanceLedger, AttendanceReport};
use crate::error::{MeetingError, MeetingResult};
use crate::livekit::{ConferencingClient, ParticipantInfo, RoomInfo};

/// Completed sessions older than this are no longer revisited by the sweep.
const FINALIZE_LOOKBACK_SECS: i64 = 24 * 3600;

#[derive(Debug, Clone)]
pub struct RoomDetails {
    pub binding: Option<RoomBinding>,
    pub room: Option<RoomInfo>,
    pub participants: Vec<ParticipantInfo>,
}

#[derive(Debug, Clone)]
pub struct MeetingStatus {
    pub session: Session,
    pub phase: WindowPhase,
    pub can_join: bool,
    pub seconds_until_open: i64,
    pub role: MeetingRole,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub provisioned: usize,
    pub auto_completed: usize,
    pub finalized: usize,
    pub failed: usize,
}

/// Operations behind the meeting endpoints. Every call resolves the session,
/// asks the access policy for the caller's role and then delegates to the
/// lifecycle, provisioner or ledger.
pub struct MeetingService {
    sessions: Arc<SessionService>,
    provisioner: Arc<RoomProvisioner>,
    ledger: Arc<AttendanceLedger>,
    client: Arc<dyn ConferencingClient>,
    policy: Arc<dyn SessionAccessPolicy>,
}

impl MeetingService {
    pub fn new(
        sessions: Arc<SessionService>,
        provisioner: Arc<RoomProvisioner>,
        ledger: Arc<AttendanceLedger>,
        client: Arc<dyn ConferencingClient>,
        policy: Arc<dyn SessionAccessPolicy>,
    ) -> Self {
        Self {
            sessions,
            provisioner,
            ledger,
            client,
            policy,
        }
    }

    pub fn sessions(&self) -> &Arc<SessionService> {
        &self.sessions
    }

    pub fn ledger(&self) -> &Arc<AttendanceLedger> {
        &self.ledger
    }

    pub async fn register(&self, session: Session) -> MeetingResult<Session> {
        self.sessions.register(session).await
    }

    /// Provisions the room for managers. Other members only get an existing
    /// binding and are locked out until someone who may provision does so.
    pub async fn create(
        &self,
        key: &SessionKey,
        requester: &Requester,
        overrides: &RoomOverrides,
    ) -> MeetingResult<RoomBinding> {
        let (session, role) = self.authorize(key, requester).await?;
        if role.is_moderator() {
            return self.provisioner.ensure_room(key, overrides).await;
        }

        match self.provisioner.binding(key).await? {
            Some(binding) if !session.status.is_terminal() => Ok(binding),
            _ => Err(MeetingError::Locked(
                "the meeting has not been opened by the teacher yet".to_string(),
            )),
        }
    }

    pub async fn token(
        &self,
        key: &SessionKey,
        requester: &Requester,
        permissions: TokenPermissions,
    ) -> MeetingResult<ParticipantToken> {
        self.provisioner
            .issue_participant_token(key, requester, permissions)
            .await
    }

    pub async fn room_info(&self, key: &SessionKey, requester: &Requester) -> MeetingResult<RoomDetails> {
        let (session, _) = self.authorize(key, requester).await?;
        let Some(room_name) = session.meeting.room_name.as_deref() else {
            return Ok(RoomDetails {
                binding: None,
                room: None,
                participants: Vec::new(),
            });
        };

        let room = self.client.get_room_info(room_name).await?;
        let participants = if room.is_some() {
            self.client.list_participants(room_name).await?
        } else {
            Vec::new()
        };
        Ok(RoomDetails {
            binding: self.provisioner.binding(key).await?,
            room,
            participants,
        })
    }

    /// Teacher ends the meeting: the room is closed, the session completes
    /// and attendance is finalized.
    pub async fn end(&self, key: &SessionKey, requester: &Requester) -> MeetingResult<Session> {
        let (session, role) = self.authorize(key, requester).await?;
        if !role.is_moderator() {
            return Err(MeetingError::NotAuthorized(
                "only the teacher can end the meeting".to_string(),
            ));
        }
        let Some(room_name) = session.meeting.room_name.clone() else {
            return Err(MeetingError::InvalidTransition(
                "no active meeting to end".to_string(),
            ));
        };

        let now = DateTime::now();
        let event = LifecycleEvent::Ended { at: now };
        // Reject before touching the room when the session cannot end.
        lifecycle::apply(&session, &event, self.sessions.settings())?;

        self.client.delete_room(&room_name).await?;
        let ended = self.sessions.apply(key, event).await?;
        self.ledger.finalize(&ended, now).await?;

        info!(session = %key, room_name = %room_name, user_id = requester.user_id, "Meeting ended");
        Ok(ended)
    }

    /// Client reported leave, used when the webhook is late or lost.
    pub async fn leave(&self, key: &SessionKey, requester: &Requester) -> MeetingResult<()> {
        let (session, _) = self.authorize(key, requester).await?;
        let participant_identity = identity::encode(requester.user_id, &requester.display_name);
        self.ledger
            .record_leave(&session, requester.user_id, &participant_identity, DateTime::now())
            .await?;
        Ok(())
    }

    pub async fn cancel(
        &self,
        key: &SessionKey,
        requester: &Requester,
        reason: &str,
    ) -> MeetingResult<Session> {
        self.authorize_manager(key, requester).await?;
        let cancelled = self
            .sessions
            .apply(
                key,
                LifecycleEvent::Cancel {
                    reason: reason.to_string(),
                },
            )
            .await?;

        if let Some(room_name) = cancelled.meeting.room_name.as_deref() {
            if let Err(e) = self.client.delete_room(room_name).await {
                warn!(session = %key, room_name, error = %e, "Failed to close room of cancelled session");
            }
        }
        info!(session = %key, user_id = requester.user_id, "Session cancelled");
        Ok(cancelled)
    }

    pub async fn reschedule(
        &self,
        key: &SessionKey,
        requester: &Requester,
        to: DateTime,
    ) -> MeetingResult<Session> {
        self.authorize_manager(key, requester).await?;
        let session = self
            .sessions
            .apply(key, LifecycleEvent::Reschedule { to })
            .await?;
        info!(
            session = %key,
            scheduled_start = %time::to_rfc3339(to),
            "Session rescheduled"
        );
        Ok(session)
    }

    /// Current state with window-driven readiness applied. Once the join
    /// window is open a manager's status check provisions a missing room.
    pub async fn status(&self, key: &SessionKey, requester: &Requester) -> MeetingResult<MeetingStatus> {
        let (_, role) = self.authorize(key, requester).await?;
        let now = DateTime::now();
        let mut session = self.sessions.refresh_readiness(key, now).await?;
        let window = self.sessions.window(&session);

        if role.is_moderator()
            && window.is_joinable(now)
            && !session.status.is_terminal()
            && !session.meeting.is_bound()
        {
            match self.provisioner.ensure_room(key, &RoomOverrides::default()).await {
                Ok(_) => session = self.sessions.get(key).await?,
                Err(e) => warn!(session = %key, error = %e, "Room provisioning on status check failed"),
            }
        }

        let phase = window.phase(now);
        Ok(MeetingStatus {
            can_join: phase.is_joinable()
                && session.meeting.is_bound()
                && !session.status.is_terminal(),
            seconds_until_open: window.seconds_until_open(now),
            phase,
            role,
            session,
        })
    }

    /// Managers see every participant, students only their own row.
    pub async fn attendance(&self, key: &SessionKey, requester: &Requester) -> MeetingResult<AttendanceReport> {
        let (session, role) = self.authorize(key, requester).await?;
        let mut report = self.ledger.report(&session, DateTime::now()).await?;
        if !role.is_moderator() {
            report.entries.retain(|entry| entry.user_id == requester.user_id);
        }
        Ok(report)
    }

    /// Periodic pass over non-terminal sessions: provisions rooms once the
    /// join window opens, auto-completes sessions whose window expired while
    /// still running and finalizes attendance of recently completed ones.
    pub async fn sweep(&self, now: DateTime) -> MeetingResult<SweepReport> {
        let mut report = SweepReport::default();

        for session in self
            .sessions
            .list_by_status(&[SessionStatus::Scheduled, SessionStatus::Ready])
            .await?
        {
            let key = session.key();
            if !self.sessions.window(&session).is_joinable(now) || session.meeting.is_bound() {
                continue;
            }
            match self.provisioner.ensure_room(&key, &RoomOverrides::default()).await {
                Ok(_) => report.provisioned += 1,
                Err(e) => {
                    report.failed += 1;
                    warn!(session = %key, error = %e, "Sweep could not provision room");
                }
            }
        }

        for session in self.sessions.list_by_status(&[SessionStatus::Ongoing]).await? {
            let key = session.key();
            if self.sessions.window(&session).phase(now) != WindowPhase::Expired
                || lifecycle::is_no_show(&session, self.sessions.settings())
            {
                continue;
            }
            let result = async {
                let completed = self
                    .sessions
                    .apply(&key, LifecycleEvent::AutoComplete { at: now })
                    .await?;
                self.ledger.finalize(&completed, now).await
            }
            .await;
            match result {
                Ok(_) => {
                    report.auto_completed += 1;
                    info!(session = %key, "Session auto-completed after its window expired");
                }
                Err(e) => {
                    report.failed += 1;
                    warn!(session = %key, error = %e, "Sweep could not auto-complete session");
                }
            }
        }

        let horizon = time::plus_seconds(now, -FINALIZE_LOOKBACK_SECS);
        for session in self.sessions.list_by_status(&[SessionStatus::Completed]).await? {
            let ended = session.ended_at.unwrap_or_else(|| session.scheduled_end());
            if ended < horizon {
                continue;
            }
            let pending = self
                .ledger
                .records(&session.key())
                .await?
                .iter()
                .any(|record| record.finalized.is_none());
            if !pending {
                continue;
            }
            match self.ledger.finalize(&session, ended).await {
                Ok(_) => report.finalized += 1,
                Err(e) => {
                    report.failed += 1;
                    warn!(session = %session.key(), error = %e, "Sweep could not finalize attendance");
                }
            }
        }

        if report != SweepReport::default() {
            info!(
                provisioned = report.provisioned,
                auto_completed = report.auto_completed,
                finalized = report.finalized,
                failed = report.failed,
                "Status sweep finished"
            );
        }
        Ok(report)
    }

    async fn authorize(
        &self,
        key: &SessionKey,
        requester: &Requester,
    ) -> MeetingResult<(Session, MeetingRole)> {
        let session = self.sessions.get(key).await?;
        let role = self
            .policy
            .meeting_role(requester, &session)
            .await
            .ok_or_else(|| MeetingError::NotAuthorized("no relationship to this session".to_string()))?;
        Ok((session, role))
    }

    async fn authorize_manager(&self, key: &SessionKey, requester: &Requester) -> MeetingResult<Session> {
        let session = self.sessions.get(key).await?;
        if !self.policy.can_manage(requester, &session).await {
            return Err(MeetingError::NotAuthorized(
                "only the teacher or an administrator can manage this session".to_string(),
            ));
        }
        Ok(session)
    }
}
