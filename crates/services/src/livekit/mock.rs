//! In-memory conferencing client for tests and local development.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;

use super::{
    AccessTokenRequest, ConferencingClient, ConferencingError, ParticipantInfo, RoomInfo,
    RoomOptions, token,
};

pub const MOCK_API_KEY: &str = "mock-key";
pub const MOCK_API_SECRET: &str = "mock-secret";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MuteCall {
    pub room_name: String,
    pub identity: String,
    pub track_sid: String,
    pub muted: bool,
}

pub struct MockConferencingClient {
    rooms: DashMap<String, RoomInfo>,
    participants: DashMap<String, Vec<ParticipantInfo>>,
    mutes: Mutex<Vec<MuteCall>>,
    create_calls: AtomicUsize,
    delete_calls: AtomicUsize,
    failing: AtomicBool,
    create_delay: Duration,
    server_url: String,
}

impl MockConferencingClient {
    /// A mock where every call succeeds.
    pub fn accepting() -> Self {
        Self {
            rooms: DashMap::new(),
            participants: DashMap::new(),
            mutes: Mutex::new(Vec::new()),
            create_calls: AtomicUsize::new(0),
            delete_calls: AtomicUsize::new(0),
            failing: AtomicBool::new(false),
            create_delay: Duration::ZERO,
            server_url: "wss://conferencing.test".to_string(),
        }
    }

    /// A mock where every remote call fails as if the service were down.
    pub fn failing() -> Self {
        let mock = Self::accepting();
        mock.set_failing(true);
        mock
    }

    /// Delays `create_room` so concurrent callers overlap.
    pub fn with_create_delay(mut self, delay: Duration) -> Self {
        self.create_delay = delay;
        self
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn create_count(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }

    pub fn delete_count(&self) -> usize {
        self.delete_calls.load(Ordering::SeqCst)
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    pub fn has_room(&self, room_name: &str) -> bool {
        self.rooms.contains_key(room_name)
    }

    /// Removes a room as if the service had expired it.
    pub fn expire_room(&self, room_name: &str) {
        self.rooms.remove(room_name);
        self.participants.remove(room_name);
    }

    pub fn add_participant(&self, room_name: &str, participant: ParticipantInfo) {
        self.participants
            .entry(room_name.to_string())
            .or_default()
            .push(participant);
        if let Some(mut room) = self.rooms.get_mut(room_name) {
            room.num_participants += 1;
        }
    }

    pub fn mute_calls(&self) -> Vec<MuteCall> {
        self.mutes.lock().clone()
    }

    fn check_available(&self) -> Result<(), ConferencingError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(ConferencingError::Unavailable(
                "mock conferencing service offline".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl ConferencingClient for MockConferencingClient {
    async fn create_room(&self, options: &RoomOptions) -> Result<RoomInfo, ConferencingError> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        if !self.create_delay.is_zero() {
            tokio::time::sleep(self.create_delay).await;
        }
        self.check_available()?;

        let room = self
            .rooms
            .entry(options.name.clone())
            .or_insert_with(|| RoomInfo {
                sid: format!("RM_{}", uuid::Uuid::new_v4().simple()),
                name: options.name.clone(),
                num_participants: 0,
                creation_time: chrono::Utc::now().timestamp(),
                active_recording: false,
                metadata: options.metadata.clone().unwrap_or_default(),
            })
            .clone();
        Ok(room)
    }

    async fn get_room_info(&self, room_name: &str) -> Result<Option<RoomInfo>, ConferencingError> {
        self.check_available()?;
        Ok(self.rooms.get(room_name).map(|r| r.clone()))
    }

    async fn list_participants(
        &self,
        room_name: &str,
    ) -> Result<Vec<ParticipantInfo>, ConferencingError> {
        self.check_available()?;
        Ok(self
            .participants
            .get(room_name)
            .map(|p| p.clone())
            .unwrap_or_default())
    }

    async fn mute_track(
        &self,
        room_name: &str,
        identity: &str,
        track_sid: &str,
        muted: bool,
    ) -> Result<(), ConferencingError> {
        self.check_available()?;
        self.mutes.lock().push(MuteCall {
            room_name: room_name.to_string(),
            identity: identity.to_string(),
            track_sid: track_sid.to_string(),
            muted,
        });
        Ok(())
    }

    async fn delete_room(&self, room_name: &str) -> Result<(), ConferencingError> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;
        self.expire_room(room_name);
        Ok(())
    }

    fn issue_access_token(&self, request: &AccessTokenRequest) -> Result<String, ConferencingError> {
        token::participant_token(MOCK_API_KEY, MOCK_API_SECRET, request)
    }

    fn server_url(&self) -> &str {
        &self.server_url
    }
}
