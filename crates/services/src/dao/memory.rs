//! In-process stores backed by `DashMap`. Used by the integration tests and
//! for running the service without MongoDB.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use bson::{DateTime, oid::ObjectId};
use classmeet_db::models::{AttendanceRecord, Session, SessionKey, SessionStatus, WebhookReceipt};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use super::base::{StoreError, StoreResult};
use super::store::{AttendanceStore, ReceiptStore, SessionStore};

#[derive(Default)]
pub struct InMemorySessionStore {
    sessions: DashMap<SessionKey, Session>,
    failing: AtomicBool,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent write fail with `StoreError::Unavailable`.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn check_available(&self) -> StoreResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("session store offline".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn insert(&self, mut session: Session) -> StoreResult<Session> {
        self.check_available()?;
        match self.sessions.entry(session.key()) {
            Entry::Occupied(_) => Err(StoreError::DuplicateKey(session.key().to_string())),
            Entry::Vacant(slot) => {
                session.id = Some(ObjectId::new());
                slot.insert(session.clone());
                Ok(session)
            }
        }
    }

    async fn find(&self, key: &SessionKey) -> StoreResult<Option<Session>> {
        Ok(self.sessions.get(key).map(|s| s.clone()))
    }

    async fn find_by_room(&self, room_name: &str) -> StoreResult<Option<Session>> {
        Ok(self
            .sessions
            .iter()
            .find(|s| s.meeting.room_name.as_deref() == Some(room_name))
            .map(|s| s.clone()))
    }

    async fn list_by_status(&self, statuses: &[SessionStatus]) -> StoreResult<Vec<Session>> {
        let mut sessions: Vec<Session> = self
            .sessions
            .iter()
            .filter(|s| statuses.contains(&s.status))
            .map(|s| s.clone())
            .collect();
        sessions.sort_by_key(|s| s.scheduled_start);
        Ok(sessions)
    }

    async fn compare_and_swap(&self, current: &Session, mut next: Session) -> StoreResult<bool> {
        self.check_available()?;
        let key = current.key();

        // Unique room name, checked before taking the entry lock.
        if let Some(room) = next.meeting.room_name.as_deref() {
            let taken = self
                .sessions
                .iter()
                .any(|s| *s.key() != key && s.meeting.room_name.as_deref() == Some(room));
            if taken {
                return Err(StoreError::DuplicateKey(room.to_string()));
            }
        }

        let Some(mut stored) = self.sessions.get_mut(&key) else {
            return Ok(false);
        };
        if stored.status != current.status || stored.revision != current.revision {
            return Ok(false);
        }
        next.id = stored.id;
        next.revision = current.revision + 1;
        next.updated_at = DateTime::now();
        *stored = next;
        Ok(true)
    }
}

#[derive(Default)]
pub struct InMemoryAttendanceStore {
    records: DashMap<(SessionKey, i64), AttendanceRecord>,
    failing: AtomicBool,
}

impl InMemoryAttendanceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn check_available(&self) -> StoreResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("attendance store offline".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl AttendanceStore for InMemoryAttendanceStore {
    async fn find(&self, key: &SessionKey, user_id: i64) -> StoreResult<Option<AttendanceRecord>> {
        Ok(self.records.get(&(*key, user_id)).map(|r| r.clone()))
    }

    async fn list(&self, key: &SessionKey) -> StoreResult<Vec<AttendanceRecord>> {
        let mut records: Vec<AttendanceRecord> = self
            .records
            .iter()
            .filter(|r| r.key().0 == *key)
            .map(|r| r.clone())
            .collect();
        records.sort_by_key(|r| (r.first_join_time, r.user_id));
        Ok(records)
    }

    async fn insert(&self, mut record: AttendanceRecord) -> StoreResult<bool> {
        self.check_available()?;
        match self.records.entry((record.session_key(), record.user_id)) {
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(slot) => {
                record.id = Some(ObjectId::new());
                slot.insert(record);
                Ok(true)
            }
        }
    }

    async fn compare_and_swap(
        &self,
        current: &AttendanceRecord,
        mut next: AttendanceRecord,
    ) -> StoreResult<bool> {
        self.check_available()?;
        let Some(mut stored) = self
            .records
            .get_mut(&(current.session_key(), current.user_id))
        else {
            return Ok(false);
        };
        if stored.revision != current.revision {
            return Ok(false);
        }
        next.id = stored.id;
        next.revision = current.revision + 1;
        next.updated_at = DateTime::now();
        *stored = next;
        Ok(true)
    }
}

#[derive(Default)]
pub struct InMemoryReceiptStore {
    receipts: DashMap<String, WebhookReceipt>,
}

impl InMemoryReceiptStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.receipts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.receipts.is_empty()
    }
}

#[async_trait]
impl ReceiptStore for InMemoryReceiptStore {
    async fn claim(&self, receipt: WebhookReceipt) -> StoreResult<bool> {
        match self.receipts.entry(receipt.key.clone()) {
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(slot) => {
                slot.insert(receipt);
                Ok(true)
            }
        }
    }

    async fn release(&self, key: &str) -> StoreResult<()> {
        self.receipts.remove(key);
        Ok(())
    }
}
