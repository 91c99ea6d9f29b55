use bson::{Document, oid::ObjectId};
use futures::TryStreamExt;
use mongodb::{Collection, Database};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("MongoDB error: {0}")]
    Mongo(#[from] mongodb::error::Error),
    #[error("BSON serialization error: {0}")]
    BsonSer(#[from] bson::ser::Error),
    #[error("BSON deserialization error: {0}")]
    BsonDe(#[from] bson::de::Error),
    #[error("Entity not found")]
    NotFound,
    #[error("Duplicate key: {0}")]
    DuplicateKey(String),
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

pub struct BaseDao<T: Send + Sync> {
    collection: Collection<T>,
}

impl<T> BaseDao<T>
where
    T: Serialize + for<'de> Deserialize<'de> + Unpin + Send + Sync,
{
    pub fn new(db: &Database, collection_name: &str) -> Self {
        Self {
            collection: db.collection::<T>(collection_name),
        }
    }

    pub async fn find_one(&self, filter: Document) -> StoreResult<Option<T>> {
        Ok(self.collection.find_one(filter).await?)
    }

    pub async fn find_many(&self, filter: Document, sort: Option<Document>) -> StoreResult<Vec<T>> {
        let mut cursor = if let Some(sort) = sort {
            self.collection.find(filter).sort(sort).await?
        } else {
            self.collection.find(filter).await?
        };

        let mut results = Vec::new();
        while let Some(doc) = cursor.try_next().await? {
            results.push(doc);
        }
        Ok(results)
    }

    pub async fn insert_one(&self, doc: &T) -> StoreResult<ObjectId> {
        let result = self
            .collection
            .insert_one(doc)
            .await
            .map_err(duplicate_or_mongo)?;

        let id = result
            .inserted_id
            .as_object_id()
            .ok_or_else(|| StoreError::Unavailable("inserted_id is not an ObjectId".into()))?;
        debug!(?id, "Inserted document");
        Ok(id)
    }

    /// Replaces the single document matching `filter`. Returns whether a
    /// document matched, which is how the compare-and-swap writes detect a
    /// lost race.
    pub async fn replace_one(&self, filter: Document, doc: &T) -> StoreResult<bool> {
        let result = self
            .collection
            .replace_one(filter, doc)
            .await
            .map_err(duplicate_or_mongo)?;
        Ok(result.matched_count == 1)
    }

    pub async fn delete_one(&self, filter: Document) -> StoreResult<bool> {
        let result = self.collection.delete_one(filter).await?;
        Ok(result.deleted_count > 0)
    }
}

fn duplicate_or_mongo(e: mongodb::error::Error) -> StoreError {
    if let mongodb::error::ErrorKind::Write(mongodb::error::WriteFailure::WriteError(
        ref write_error,
    )) = *e.kind
    {
        if write_error.code == 11000 {
            return StoreError::DuplicateKey(write_error.message.clone());
        }
    }
    StoreError::Mongo(e)
}
