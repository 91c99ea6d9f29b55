use std::sync::Arc;

use bson::DateTime;
use classmeet_config::LiveKitSettings;
use classmeet_db::models::{Session, SessionKey, SessionStatus};
use classmeet_db::time;
use tracing::{debug, info, warn};

use super::access::{MeetingRole, Requester, SessionAccessPolicy};
use super::identity;
use super::sessions::SessionService;
use crate::error::{MeetingError, MeetingResult};
use crate::livekit::{AccessTokenRequest, ConferencingClient, RoomOptions, VideoGrants};

/// Where a session's meeting lives.
#[derive(Debug, Clone, PartialEq)]
pub struct RoomBinding {
    pub room_name: String,
    pub platform_id: Option<String>,
    pub expires_at: Option<DateTime>,
    pub status: SessionStatus,
}

impl RoomBinding {
    fn from_session(session: &Session) -> Option<Self> {
        Some(Self {
            room_name: session.meeting.room_name.clone()?,
            platform_id: session.meeting.platform_id.clone(),
            expires_at: session.meeting.expires_at,
            status: session.status,
        })
    }
}

/// Per-request room settings; unset fields fall back to configuration.
#[derive(Debug, Clone, Default)]
pub struct RoomOverrides {
    pub max_participants: Option<u32>,
    pub empty_timeout_secs: Option<u32>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TokenPermissions {
    pub can_publish: Option<bool>,
    pub can_subscribe: Option<bool>,
}

#[derive(Debug, Clone)]
pub struct ParticipantToken {
    pub access_token: String,
    pub server_url: String,
    pub room_name: String,
    pub participant_identity: String,
    pub role: MeetingRole,
    pub permissions: VideoGrants,
    pub expires_at: DateTime,
}

pub struct RoomProvisioner {
    sessions: Arc<SessionService>,
    client: Arc<dyn ConferencingClient>,
    policy: Arc<dyn SessionAccessPolicy>,
    livekit: LiveKitSettings,
}

impl RoomProvisioner {
    pub fn new(
        sessions: Arc<SessionService>,
        client: Arc<dyn ConferencingClient>,
        policy: Arc<dyn SessionAccessPolicy>,
        livekit: LiveKitSettings,
    ) -> Self {
        Self {
            sessions,
            client,
            policy,
            livekit,
        }
    }

    /// Makes sure the session has a live room and returns its binding.
    ///
    /// The external room is created before the session record is touched;
    /// the binding is then written with compare-and-swap. Concurrent callers
    /// all end up with the same room name.
    pub async fn ensure_room(
        &self,
        key: &SessionKey,
        overrides: &RoomOverrides,
    ) -> MeetingResult<RoomBinding> {
        let session = self.sessions.get(key).await?;
        if session.status.is_terminal() {
            return Err(MeetingError::InvalidTransition(format!(
                "session already {}",
                session.status
            )));
        }

        let now = DateTime::now();
        if let (Some(name), Some(expires_at)) = (
            session.meeting.room_name.as_deref(),
            session.meeting.expires_at,
        ) {
            if expires_at > now {
                if self.client.get_room_info(name).await?.is_some() {
                    debug!(session = %key, room_name = name, "Room already provisioned");
                    if let Some(binding) = RoomBinding::from_session(&session) {
                        return Ok(binding);
                    }
                }
                info!(session = %key, room_name = name, "Bound room is gone, recreating");
            }
        }

        let room_name = session
            .meeting
            .room_name
            .clone()
            .unwrap_or_else(|| key.room_name());
        let room = self
            .client
            .create_room(&RoomOptions {
                name: room_name.clone(),
                empty_timeout_secs: overrides
                    .empty_timeout_secs
                    .unwrap_or(self.livekit.empty_timeout_secs),
                max_participants: overrides
                    .max_participants
                    .unwrap_or(self.livekit.max_participants),
                metadata: Some(
                    serde_json::json!({
                        "tenant_id": key.tenant_id,
                        "session_type": key.session_type.as_str(),
                        "session_id": key.session_id,
                    })
                    .to_string(),
                ),
            })
            .await
            .map_err(|e| {
                warn!(session = %key, room_name = %room_name, error = %e, "Room creation failed");
                MeetingError::from(e)
            })?;

        let lifetime = self.sessions.settings().room_lifetime_minutes;
        let expires_at = time::plus_minutes(time::latest(session.scheduled_start, now), lifetime);

        let bound = self
            .sessions
            .update(key, |current| {
                if current.status.is_terminal() {
                    return Err(MeetingError::InvalidTransition(format!(
                        "session {} while the room was being created",
                        current.status
                    )));
                }
                if let Some(existing) = current.meeting.room_name.as_deref() {
                    let still_valid = current.meeting.platform_id.as_deref() == Some(room.sid.as_str())
                        && current.meeting.expires_at.is_some_and(|at| at > now);
                    if existing != room_name || still_valid {
                        return Ok(None);
                    }
                }

                let mut next = current.clone();
                next.meeting.room_name = Some(room_name.clone());
                next.meeting.platform_id = Some(room.sid.clone());
                next.meeting.expires_at = Some(expires_at);
                if next.status == SessionStatus::Scheduled {
                    next.status = SessionStatus::Ready;
                }
                Ok((next != *current).then_some(next))
            })
            .await;

        let bound = match bound {
            Ok(session) => session,
            Err(e @ MeetingError::InvalidTransition(_)) => {
                info!(session = %key, room_name = %room_name, "Discarding room created for a closed session");
                if let Err(cleanup) = self.client.delete_room(&room_name).await {
                    warn!(room_name = %room_name, error = %cleanup, "Failed to remove orphaned room");
                }
                return Err(e);
            }
            Err(e) => return Err(e),
        };

        info!(
            session = %key,
            room_name = bound.meeting.room_name.as_deref().unwrap_or_default(),
            status = %bound.status,
            "Room provisioned"
        );
        RoomBinding::from_session(&bound).ok_or(MeetingError::RoomNotReady)
    }

    /// Current binding without provisioning anything.
    pub async fn binding(&self, key: &SessionKey) -> MeetingResult<Option<RoomBinding>> {
        Ok(RoomBinding::from_session(&self.sessions.get(key).await?))
    }

    pub async fn issue_participant_token(
        &self,
        key: &SessionKey,
        requester: &Requester,
        permissions: TokenPermissions,
    ) -> MeetingResult<ParticipantToken> {
        let session = self.sessions.get(key).await?;
        let role = self
            .policy
            .meeting_role(requester, &session)
            .await
            .ok_or_else(|| {
                MeetingError::NotAuthorized("no relationship to this session".to_string())
            })?;
        if session.status.is_terminal() {
            return Err(MeetingError::InvalidTransition(format!(
                "session already {}",
                session.status
            )));
        }
        let room_name = session
            .meeting
            .room_name
            .clone()
            .ok_or(MeetingError::RoomNotReady)?;

        let participant_identity = identity::encode(requester.user_id, &requester.display_name);
        let mut grants = VideoGrants::participant(
            &room_name,
            permissions.can_publish.unwrap_or(true),
            permissions.can_subscribe.unwrap_or(true),
        );
        if role.is_moderator() {
            grants = grants.with_moderation();
        }

        let metadata = serde_json::json!({
            "name": requester.display_name,
            "role": role.as_str(),
            "user_id": requester.user_id,
        })
        .to_string();

        let access_token = self.client.issue_access_token(&AccessTokenRequest {
            identity: participant_identity.clone(),
            name: requester.display_name.clone(),
            metadata,
            grants: grants.clone(),
            ttl_secs: self.livekit.token_ttl_secs,
        })?;

        info!(
            session = %key,
            room_name = %room_name,
            identity = %participant_identity,
            role = role.as_str(),
            "Participant token issued"
        );

        Ok(ParticipantToken {
            access_token,
            server_url: self.client.server_url().to_string(),
            room_name,
            participant_identity,
            role,
            permissions: grants,
            expires_at: time::plus_seconds(DateTime::now(), self.livekit.token_ttl_secs as i64),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::auth::UserRole;
    use crate::dao::InMemorySessionStore;
    use crate::livekit::mock::MockConferencingClient;
    use crate::meeting::access::RosterPolicy;
    use crate::meeting::lifecycle::LifecycleEvent;
    use classmeet_config::MeetingSettings;
    use classmeet_db::models::Roster;

    fn livekit_settings() -> LiveKitSettings {
        LiveKitSettings {
            server_url: "wss://conferencing.test".into(),
            api_url: "http://conferencing.test".into(),
            api_key: "key".into(),
            api_secret: "secret".into(),
            request_timeout_secs: 5,
            token_ttl_secs: 3 * 3600,
            verify_webhooks: true,
            max_participants: 100,
            empty_timeout_secs: 300,
        }
    }

    struct Fixture {
        sessions: Arc<SessionService>,
        client: Arc<MockConferencingClient>,
        provisioner: Arc<RoomProvisioner>,
        key: SessionKey,
    }

    async fn fixture(client: MockConferencingClient) -> Fixture {
        let sessions = Arc::new(SessionService::new(
            Arc::new(InMemorySessionStore::new()),
            MeetingSettings::default(),
        ));
        let client = Arc::new(client);
        let provisioner = Arc::new(RoomProvisioner::new(
            sessions.clone(),
            client.clone(),
            Arc::new(RosterPolicy),
            livekit_settings(),
        ));
        let session = Session::new(
            4,
            321,
            Roster::Group {
                teacher_id: 10,
                group_id: 2,
                member_ids: vec![20, 21],
            },
            DateTime::now(),
            60,
        );
        let key = sessions.register(session).await.unwrap().key();
        Fixture {
            sessions,
            client,
            provisioner,
            key,
        }
    }

    fn requester(user_id: i64, name: &str, role: UserRole) -> Requester {
        Requester {
            user_id,
            display_name: name.to_string(),
            role,
            tenant_id: Some(4),
        }
    }

    #[tokio::test]
    async fn provisions_once_and_reuses() {
        let f = fixture(MockConferencingClient::accepting()).await;

        let first = f
            .provisioner
            .ensure_room(&f.key, &RoomOverrides::default())
            .await
            .unwrap();
        assert_eq!(first.room_name, "t4-group-session-321");
        assert_eq!(first.status, SessionStatus::Ready);
        assert!(first.platform_id.is_some());

        let second = f
            .provisioner
            .ensure_room(&f.key, &RoomOverrides::default())
            .await
            .unwrap();
        assert_eq!(second, first);
        assert_eq!(f.client.create_count(), 1);
    }

    #[tokio::test]
    async fn recreates_a_room_the_service_dropped() {
        let f = fixture(MockConferencingClient::accepting()).await;
        let first = f
            .provisioner
            .ensure_room(&f.key, &RoomOverrides::default())
            .await
            .unwrap();
        f.client.expire_room(&first.room_name);

        let second = f
            .provisioner
            .ensure_room(&f.key, &RoomOverrides::default())
            .await
            .unwrap();
        assert_eq!(second.room_name, first.room_name);
        assert_eq!(f.client.create_count(), 2);
        assert!(f.client.has_room(&first.room_name));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_ensure_room_agrees_on_one_name() {
        let f = fixture(
            MockConferencingClient::accepting().with_create_delay(Duration::from_millis(30)),
        )
        .await;

        let mut handles = Vec::new();
        for _ in 0..8 {
            let provisioner = f.provisioner.clone();
            let key = f.key;
            handles.push(tokio::spawn(async move {
                provisioner
                    .ensure_room(&key, &RoomOverrides::default())
                    .await
            }));
        }

        let mut names = Vec::new();
        for handle in handles {
            names.push(handle.await.unwrap().unwrap().room_name);
        }
        names.dedup();
        assert_eq!(names, vec!["t4-group-session-321".to_string()]);
        assert_eq!(f.client.room_count(), 1);

        let stored = f.sessions.get(&f.key).await.unwrap();
        assert_eq!(
            stored.meeting.room_name.as_deref(),
            Some("t4-group-session-321")
        );
    }

    #[tokio::test]
    async fn cancellation_during_provisioning_wins() {
        let f = fixture(
            MockConferencingClient::accepting().with_create_delay(Duration::from_millis(50)),
        )
        .await;

        let provisioner = f.provisioner.clone();
        let key = f.key;
        let in_flight = tokio::spawn(async move {
            provisioner
                .ensure_room(&key, &RoomOverrides::default())
                .await
        });

        tokio::time::sleep(Duration::from_millis(10)).await;
        f.sessions
            .apply(
                &f.key,
                LifecycleEvent::Cancel {
                    reason: "teacher unavailable".into(),
                },
            )
            .await
            .unwrap();

        let result = in_flight.await.unwrap();
        assert!(matches!(result, Err(MeetingError::InvalidTransition(_))));

        let stored = f.sessions.get(&f.key).await.unwrap();
        assert_eq!(stored.status, SessionStatus::Cancelled);
        assert_eq!(stored.meeting.room_name, None);
        assert_eq!(f.client.room_count(), 0);
    }

    #[tokio::test]
    async fn external_failure_leaves_session_untouched() {
        let f = fixture(MockConferencingClient::failing()).await;
        let result = f
            .provisioner
            .ensure_room(&f.key, &RoomOverrides::default())
            .await;
        assert!(matches!(
            result,
            Err(MeetingError::ExternalServiceUnavailable(_))
        ));
        let stored = f.sessions.get(&f.key).await.unwrap();
        assert_eq!(stored.status, SessionStatus::Scheduled);
        assert_eq!(stored.revision, 0);
    }

    #[tokio::test]
    async fn tokens_require_relationship_and_room() {
        let f = fixture(MockConferencingClient::accepting()).await;
        let student = requester(20, "Omar Said", UserRole::Student);

        assert!(matches!(
            f.provisioner
                .issue_participant_token(&f.key, &student, TokenPermissions::default())
                .await,
            Err(MeetingError::RoomNotReady)
        ));

        f.provisioner
            .ensure_room(&f.key, &RoomOverrides::default())
            .await
            .unwrap();

        let stranger = requester(99, "Someone", UserRole::Student);
        assert!(matches!(
            f.provisioner
                .issue_participant_token(&f.key, &stranger, TokenPermissions::default())
                .await,
            Err(MeetingError::NotAuthorized(_))
        ));

        let token = f
            .provisioner
            .issue_participant_token(&f.key, &student, TokenPermissions::default())
            .await
            .unwrap();
        assert_eq!(token.participant_identity, "20_omar-said");
        assert_eq!(token.role, MeetingRole::Student);
        assert!(token.permissions.can_publish);
        assert!(!token.permissions.room_admin);

        let teacher = requester(10, "Sara Ali", UserRole::Teacher);
        let token = f
            .provisioner
            .issue_participant_token(
                &f.key,
                &teacher,
                TokenPermissions {
                    can_publish: Some(true),
                    can_subscribe: Some(false),
                },
            )
            .await
            .unwrap();
        assert!(token.permissions.room_admin);
        assert!(token.permissions.room_record);
        assert!(!token.permissions.can_subscribe);
    }
}
