use std::sync::Arc;

use classmeet_db::models::{Session, SessionKey};
use classmeet_db::time;
use tracing::{debug, error, info, warn};

use super::dedup::Deduplicator;
use super::event::{EventKind, TrackKind, WebhookEvent};
use super::signature::WebhookVerifier;
use crate::attendance::AttendanceLedger;
use crate::error::{MeetingError, MeetingResult};
use crate::livekit::ConferencingClient;
use crate::meeting::capable::MeetingCapable;
use crate::meeting::identity;
use crate::meeting::lifecycle::{self, LifecycleEvent, Transition};
use crate::meeting::sessions::SessionService;
use crate::meeting::window::empty_room_decision;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookOutcome {
    Applied,
    Duplicate,
    UnknownRoom,
    Ignored(&'static str),
}

impl WebhookOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Applied => "applied",
            Self::Duplicate => "duplicate",
            Self::UnknownRoom => "unknown_room",
            Self::Ignored(_) => "ignored",
        }
    }
}

pub struct WebhookProcessor {
    verifier: WebhookVerifier,
    dedup: Deduplicator,
    sessions: Arc<SessionService>,
    ledger: Arc<AttendanceLedger>,
    client: Arc<dyn ConferencingClient>,
}

impl WebhookProcessor {
    pub fn new(
        verifier: WebhookVerifier,
        dedup: Deduplicator,
        sessions: Arc<SessionService>,
        ledger: Arc<AttendanceLedger>,
        client: Arc<dyn ConferencingClient>,
    ) -> Self {
        Self {
            verifier,
            dedup,
            sessions,
            ledger,
            client,
        }
    }

    /// Verifies, parses and handles one delivery.
    pub async fn process(
        &self,
        body: &[u8],
        authorization: Option<&str>,
    ) -> MeetingResult<WebhookOutcome> {
        if let Err(e) = self.verifier.verify(body, authorization) {
            warn!(error = %e, "Rejected webhook with invalid signature");
            return Err(e);
        }
        let event = WebhookEvent::parse(body).inspect_err(|e| {
            warn!(error = %e, body_len = body.len(), "Rejected malformed webhook");
        })?;
        self.handle(event).await
    }

    /// Handles events one by one; a failing event does not stop the rest.
    pub async fn process_batch(
        &self,
        events: Vec<WebhookEvent>,
    ) -> Vec<MeetingResult<WebhookOutcome>> {
        let mut outcomes = Vec::with_capacity(events.len());
        for event in events {
            outcomes.push(self.handle(event).await);
        }
        outcomes
    }

    pub async fn handle(&self, event: WebhookEvent) -> MeetingResult<WebhookOutcome> {
        if event.kind == EventKind::Unsupported {
            debug!(event = %event.event_type, "Ignoring unsupported webhook event");
            return Ok(WebhookOutcome::Ignored("unsupported event"));
        }

        if !self.dedup.claim(&event).await.inspect_err(|e| {
            error!(
                event = %event.event_type,
                room_name = %event.room_name,
                identity = event.identity.as_deref().unwrap_or_default(),
                error = %e,
                "Failed to record webhook receipt"
            );
        })? {
            debug!(event = %event.event_type, room_name = %event.room_name, "Duplicate webhook");
            return Ok(WebhookOutcome::Duplicate);
        }

        match self.dispatch(&event).await {
            Ok(outcome) => {
                info!(
                    event = %event.event_type,
                    room_name = %event.room_name,
                    identity = event.identity.as_deref().unwrap_or_default(),
                    outcome = outcome.as_str(),
                    "Webhook processed"
                );
                Ok(outcome)
            }
            Err(e) => {
                error!(
                    event = %event.event_type,
                    room_name = %event.room_name,
                    identity = event.identity.as_deref().unwrap_or_default(),
                    error = %e,
                    "Webhook handling failed"
                );
                self.dedup.release(&event.key).await;
                Err(e)
            }
        }
    }

    async fn dispatch(&self, event: &WebhookEvent) -> MeetingResult<WebhookOutcome> {
        let Some(session) = self.sessions.find_by_room(&event.room_name).await? else {
            info!(event = %event.event_type, room_name = %event.room_name, "Webhook for unknown room");
            return Ok(WebhookOutcome::UnknownRoom);
        };
        let key = session.key();
        let at = event.occurred_at;

        match &event.kind {
            EventKind::RoomStarted => {
                self.sessions.apply(&key, LifecycleEvent::Started { at }).await?;
                Ok(WebhookOutcome::Applied)
            }

            EventKind::RoomFinished {
                duration_secs,
                room_created_at,
            } => {
                let duration = duration_secs
                    .or_else(|| room_created_at.map(|created| time::seconds_between(created, at)))
                    .or_else(|| session.started_at.map(|started| time::seconds_between(started, at)))
                    .unwrap_or(0);
                let updated = self
                    .sessions
                    .apply(
                        &key,
                        LifecycleEvent::RoomFinished {
                            at,
                            duration_secs: duration,
                        },
                    )
                    .await?;
                if updated.status.is_terminal() {
                    self.ledger.finalize(&updated, at).await?;
                }
                Ok(WebhookOutcome::Applied)
            }

            EventKind::ParticipantJoined {
                identity,
                joined_at,
                num_participants,
                ..
            } => {
                let Some(user_id) = identity::parse_user_id(identity) else {
                    return Ok(WebhookOutcome::Ignored("identity carries no user id"));
                };
                let joined_at = joined_at.unwrap_or(at);
                self.ledger
                    .record_join(&session, user_id, identity, joined_at)
                    .await?;
                self.track_join(&key, joined_at, *num_participants).await?;
                Ok(WebhookOutcome::Applied)
            }

            EventKind::ParticipantLeft {
                identity,
                num_participants,
            } => {
                let Some(user_id) = identity::parse_user_id(identity) else {
                    return Ok(WebhookOutcome::Ignored("identity carries no user id"));
                };
                self.ledger
                    .record_leave(&session, user_id, identity, at)
                    .await?;

                let updated = self
                    .sessions
                    .update(&key, |current| {
                        let mut next = current.clone();
                        next.meeting.participant_count = num_participants
                            .unwrap_or_else(|| current.meeting.participant_count.saturating_sub(1));
                        Ok((next != *current).then_some(next))
                    })
                    .await?;

                if updated.meeting.participant_count == 0 {
                    let decision =
                        empty_room_decision(&updated, &self.sessions.window(&updated), at);
                    info!(
                        session = %key,
                        room_name = %event.room_name,
                        status = %updated.status,
                        decision = ?decision,
                        keeps_room = decision.keeps_room(),
                        "Room is empty"
                    );
                }
                Ok(WebhookOutcome::Applied)
            }

            EventKind::RecordingStarted { egress_id } => {
                self.sessions
                    .update(&key, |current| {
                        let mut next = current.clone();
                        next.recording.active = true;
                        next.recording.egress_id = Some(egress_id.clone());
                        next.recording.started_at.get_or_insert(at);
                        Ok((next != *current).then_some(next))
                    })
                    .await?;
                Ok(WebhookOutcome::Applied)
            }

            EventKind::RecordingFinished {
                egress_id,
                download_url,
                size_bytes,
            } => {
                self.sessions
                    .update(&key, |current| {
                        let mut next = current.clone();
                        next.recording.active = false;
                        next.recording.egress_id = Some(egress_id.clone());
                        next.recording.ended_at = Some(at);
                        if download_url.is_some() {
                            next.recording.download_url = download_url.clone();
                        }
                        if size_bytes.is_some() {
                            next.recording.size_bytes = *size_bytes;
                        }
                        Ok((next != *current).then_some(next))
                    })
                    .await?;
                Ok(WebhookOutcome::Applied)
            }

            EventKind::TrackPublished {
                identity,
                track_sid,
                track,
            } => self.enforce_media_policy(&session, identity, track_sid, *track).await,

            EventKind::Unsupported => Ok(WebhookOutcome::Ignored("unsupported event")),
        }
    }

    /// First join moves the session to `ongoing`; the participant count
    /// follows the room when it reports one.
    async fn track_join(
        &self,
        key: &SessionKey,
        at: bson::DateTime,
        num_participants: Option<u32>,
    ) -> MeetingResult<Session> {
        let settings = self.sessions.settings().clone();
        self.sessions
            .update(key, |current| {
                let mut next = match lifecycle::apply(current, &LifecycleEvent::Started { at }, &settings)? {
                    Transition::Changed(next) => next,
                    Transition::Unchanged => current.clone(),
                };
                next.meeting.participant_count =
                    num_participants.unwrap_or(current.meeting.participant_count + 1);
                Ok((next != *current).then_some(next))
            })
            .await
    }

    async fn enforce_media_policy(
        &self,
        session: &Session,
        identity: &str,
        track_sid: &str,
        track: TrackKind,
    ) -> MeetingResult<WebhookOutcome> {
        let Some(user_id) = identity::parse_user_id(identity) else {
            return Ok(WebhookOutcome::Ignored("identity carries no user id"));
        };
        if user_id == session.teacher_id() {
            return Ok(WebhookOutcome::Ignored("teachers are not restricted"));
        }

        let blocked = match track {
            TrackKind::Audio => !session.media_policy.microphone_allowed,
            TrackKind::Video => !session.media_policy.camera_allowed,
            TrackKind::Other => false,
        };
        if !blocked {
            return Ok(WebhookOutcome::Ignored("track allowed"));
        }

        let Some(room_name) = session.room_name() else {
            return Ok(WebhookOutcome::Ignored("session has no room"));
        };
        match self
            .client
            .mute_track(room_name, identity, track_sid, true)
            .await
        {
            Ok(()) => {
                info!(room_name, identity, track_sid, track = ?track, "Muted disallowed student track");
            }
            Err(e) => {
                warn!(room_name, identity, track_sid, error = %e, "Failed to mute student track");
            }
        }
        Ok(WebhookOutcome::Applied)
    }
}
