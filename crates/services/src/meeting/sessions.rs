use std::sync::Arc;

use bson::DateTime;
use classmeet_config::MeetingSettings;
use classmeet_db::models::{Session, SessionKey, SessionStatus};
use tracing::{debug, info, warn};

use super::lifecycle::{self, LifecycleEvent, Transition};
use super::window::SessionWindow;
use crate::dao::{SessionStore, StoreError};
use crate::error::{MeetingError, MeetingResult};

const MAX_CAS_ATTEMPTS: usize = 5;

/// Applies changes to session records with compare-and-swap on
/// `(status, revision)`. No locks are held across awaits.
pub struct SessionService {
    store: Arc<dyn SessionStore>,
    settings: MeetingSettings,
}

impl SessionService {
    pub fn new(store: Arc<dyn SessionStore>, settings: MeetingSettings) -> Self {
        Self { store, settings }
    }

    pub fn settings(&self) -> &MeetingSettings {
        &self.settings
    }

    pub fn window(&self, session: &Session) -> SessionWindow {
        SessionWindow::for_session(session, &self.settings)
    }

    pub async fn get(&self, key: &SessionKey) -> MeetingResult<Session> {
        self.store
            .find(key)
            .await?
            .ok_or_else(|| MeetingError::SessionNotFound(key.to_string()))
    }

    pub async fn find_by_room(&self, room_name: &str) -> MeetingResult<Option<Session>> {
        Ok(self.store.find_by_room(room_name).await?)
    }

    pub async fn list_by_status(&self, statuses: &[SessionStatus]) -> MeetingResult<Vec<Session>> {
        Ok(self.store.list_by_status(statuses).await?)
    }

    /// Inserts a session pushed by the scheduling system, or refreshes the
    /// roster and display fields of an existing one. Schedule and status
    /// changes of existing sessions go through the lifecycle instead.
    pub async fn register(&self, session: Session) -> MeetingResult<Session> {
        let key = session.key();
        match self.store.insert(session.clone()).await {
            Ok(stored) => {
                info!(session = %key, "Session registered");
                Ok(stored)
            }
            Err(StoreError::DuplicateKey(_)) => {
                self.update(&key, |current| {
                    let mut next = current.clone();
                    next.roster = session.roster.clone();
                    next.timezone = session.timezone.clone();
                    next.media_policy = session.media_policy.clone();
                    if !current.status.is_terminal() && current.status != SessionStatus::Ongoing {
                        next.duration_minutes = session.duration_minutes;
                    }
                    Ok((next != *current).then_some(next))
                })
                .await
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Runs a lifecycle event against the stored session.
    pub async fn apply(&self, key: &SessionKey, event: LifecycleEvent) -> MeetingResult<Session> {
        let settings = self.settings.clone();
        let session = self
            .update(key, |current| {
                match lifecycle::apply(current, &event, &settings)? {
                    Transition::Unchanged => Ok(None),
                    Transition::Changed(next) => Ok(Some(next)),
                }
            })
            .await?;
        debug!(session = %key, event = event.name(), status = %session.status, "Lifecycle event applied");
        Ok(session)
    }

    /// Moves a scheduled session to `ready` once its join window is open.
    pub async fn refresh_readiness(&self, key: &SessionKey, now: DateTime) -> MeetingResult<Session> {
        let session = self.get(key).await?;
        if session.status == SessionStatus::Scheduled && self.window(&session).is_joinable(now) {
            return self.apply(key, LifecycleEvent::RoomReady).await;
        }
        Ok(session)
    }

    /// Re-reads, lets `change` compute the next version and writes it with
    /// compare-and-swap, retrying a bounded number of times on contention.
    /// `change` returning `None` means there is nothing to write.
    pub async fn update<F>(&self, key: &SessionKey, mut change: F) -> MeetingResult<Session>
    where
        F: FnMut(&Session) -> MeetingResult<Option<Session>> + Send,
    {
        for attempt in 1..=MAX_CAS_ATTEMPTS {
            let current = self.get(key).await?;
            let Some(next) = change(&current)? else {
                return Ok(current);
            };

            if self.store.compare_and_swap(&current, next.clone()).await? {
                let mut stored = next;
                stored.revision = current.revision + 1;
                return Ok(stored);
            }
            debug!(session = %key, attempt, "Lost compare-and-swap race, retrying");
        }

        warn!(session = %key, "Giving up after repeated compare-and-swap conflicts");
        Err(MeetingError::Contention(key.to_string()))
    }
}
