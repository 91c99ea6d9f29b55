use async_trait::async_trait;
use classmeet_db::models::{AttendanceRecord, Session, SessionKey, SessionStatus, WebhookReceipt};

use super::base::StoreResult;

/// Session persistence with compare-and-swap writes.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn insert(&self, session: Session) -> StoreResult<Session>;

    async fn find(&self, key: &SessionKey) -> StoreResult<Option<Session>>;

    async fn find_by_room(&self, room_name: &str) -> StoreResult<Option<Session>>;

    async fn list_by_status(&self, statuses: &[SessionStatus]) -> StoreResult<Vec<Session>>;

    /// Writes `next` only if the stored session still has the status and
    /// revision of `current`. The stored revision becomes
    /// `current.revision + 1`. Returns `false` when another writer got there
    /// first.
    async fn compare_and_swap(&self, current: &Session, next: Session) -> StoreResult<bool>;
}

/// Attendance rows, one per (session, user).
#[async_trait]
pub trait AttendanceStore: Send + Sync {
    async fn find(&self, key: &SessionKey, user_id: i64) -> StoreResult<Option<AttendanceRecord>>;

    async fn list(&self, key: &SessionKey) -> StoreResult<Vec<AttendanceRecord>>;

    /// Returns `false` if a row for the same (session, user) already exists.
    async fn insert(&self, record: AttendanceRecord) -> StoreResult<bool>;

    async fn compare_and_swap(
        &self,
        current: &AttendanceRecord,
        next: AttendanceRecord,
    ) -> StoreResult<bool>;
}

/// Persisted webhook idempotency keys.
#[async_trait]
pub trait ReceiptStore: Send + Sync {
    /// Returns `false` if the key was already claimed.
    async fn claim(&self, receipt: WebhookReceipt) -> StoreResult<bool>;

    async fn release(&self, key: &str) -> StoreResult<()>;
}
