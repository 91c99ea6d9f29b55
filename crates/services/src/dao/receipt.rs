use async_trait::async_trait;
use bson::doc;
use classmeet_db::models::WebhookReceipt;
use mongodb::Database;

use super::base::{BaseDao, StoreError, StoreResult};
use super::store::ReceiptStore;

pub struct ReceiptDao {
    pub base: BaseDao<WebhookReceipt>,
}

impl ReceiptDao {
    pub fn new(db: &Database) -> Self {
        Self {
            base: BaseDao::new(db, WebhookReceipt::COLLECTION),
        }
    }
}

#[async_trait]
impl ReceiptStore for ReceiptDao {
    async fn claim(&self, receipt: WebhookReceipt) -> StoreResult<bool> {
        match self.base.insert_one(&receipt).await {
            Ok(_) => Ok(true),
            Err(StoreError::DuplicateKey(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn release(&self, key: &str) -> StoreResult<()> {
        self.base.delete_one(doc! { "key": key }).await?;
        Ok(())
    }
}
