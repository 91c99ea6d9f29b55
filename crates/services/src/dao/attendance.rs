use async_trait::async_trait;
use bson::{DateTime, doc};
use classmeet_db::models::{AttendanceRecord, SessionKey};
use mongodb::Database;

use super::base::{BaseDao, StoreError, StoreResult};
use super::store::AttendanceStore;

pub struct AttendanceDao {
    pub base: BaseDao<AttendanceRecord>,
}

impl AttendanceDao {
    pub fn new(db: &Database) -> Self {
        Self {
            base: BaseDao::new(db, AttendanceRecord::COLLECTION),
        }
    }
}

#[async_trait]
impl AttendanceStore for AttendanceDao {
    async fn find(&self, key: &SessionKey, user_id: i64) -> StoreResult<Option<AttendanceRecord>> {
        let mut filter = key.filter();
        filter.insert("user_id", user_id);
        self.base.find_one(filter).await
    }

    async fn list(&self, key: &SessionKey) -> StoreResult<Vec<AttendanceRecord>> {
        self.base
            .find_many(key.filter(), Some(doc! { "first_join_time": 1 }))
            .await
    }

    async fn insert(&self, record: AttendanceRecord) -> StoreResult<bool> {
        match self.base.insert_one(&record).await {
            Ok(_) => Ok(true),
            Err(StoreError::DuplicateKey(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn compare_and_swap(
        &self,
        current: &AttendanceRecord,
        mut next: AttendanceRecord,
    ) -> StoreResult<bool> {
        let id = current.id.ok_or(StoreError::NotFound)?;
        next.id = Some(id);
        next.revision = current.revision + 1;
        next.updated_at = DateTime::now();

        self.base
            .replace_one(doc! { "_id": id, "revision": current.revision }, &next)
            .await
    }
}
