use async_trait::async_trait;
use bson::{Bson, DateTime, doc};
use classmeet_db::models::{Session, SessionKey, SessionStatus};
use mongodb::Database;

use super::base::{BaseDao, StoreError, StoreResult};
use super::store::SessionStore;

pub struct SessionDao {
    pub base: BaseDao<Session>,
}

impl SessionDao {
    pub fn new(db: &Database) -> Self {
        Self {
            base: BaseDao::new(db, Session::COLLECTION),
        }
    }
}

#[async_trait]
impl SessionStore for SessionDao {
    async fn insert(&self, mut session: Session) -> StoreResult<Session> {
        let id = self.base.insert_one(&session).await?;
        session.id = Some(id);
        Ok(session)
    }

    async fn find(&self, key: &SessionKey) -> StoreResult<Option<Session>> {
        self.base.find_one(key.filter()).await
    }

    async fn find_by_room(&self, room_name: &str) -> StoreResult<Option<Session>> {
        self.base
            .find_one(doc! { "meeting.room_name": room_name })
            .await
    }

    async fn list_by_status(&self, statuses: &[SessionStatus]) -> StoreResult<Vec<Session>> {
        let statuses: Vec<Bson> = statuses
            .iter()
            .map(|s| Bson::String(s.as_str().to_string()))
            .collect();
        self.base
            .find_many(
                doc! { "status": { "$in": statuses } },
                Some(doc! { "scheduled_start": 1 }),
            )
            .await
    }

    async fn compare_and_swap(&self, current: &Session, mut next: Session) -> StoreResult<bool> {
        let id = current.id.ok_or(StoreError::NotFound)?;
        next.id = Some(id);
        next.revision = current.revision + 1;
        next.updated_at = DateTime::now();

        self.base
            .replace_one(
                doc! {
                    "_id": id,
                    "status": current.status.as_str(),
                    "revision": current.revision,
                },
                &next,
            )
            .await
    }
}
