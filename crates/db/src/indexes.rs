use std::time::Duration;

use mongodb::{Database, IndexModel, options::IndexOptions};
use tracing::info;

use crate::models::{AttendanceRecord, Session, WebhookReceipt};

pub async fn ensure_indexes(db: &Database) -> Result<(), mongodb::error::Error> {
    // Sessions
    create_indexes(
        db,
        Session::COLLECTION,
        vec![
            index_unique(bson::doc! { "tenant_id": 1, "session_type": 1, "session_id": 1 }),
            index_unique_partial(
                bson::doc! { "meeting.room_name": 1 },
                bson::doc! { "meeting.room_name": { "$type": "string" } },
            ),
            index(bson::doc! { "status": 1, "scheduled_start": 1 }),
        ],
    )
    .await?;

    // Attendance
    create_indexes(
        db,
        AttendanceRecord::COLLECTION,
        vec![
            index_unique(
                bson::doc! { "tenant_id": 1, "session_type": 1, "session_id": 1, "user_id": 1 },
            ),
            index(bson::doc! { "tenant_id": 1, "user_id": 1 }),
        ],
    )
    .await?;

    // Webhook receipts
    create_indexes(
        db,
        WebhookReceipt::COLLECTION,
        vec![
            index_unique(bson::doc! { "key": 1 }),
            IndexModel::builder()
                .keys(bson::doc! { "received_at": 1 })
                .options(
                    IndexOptions::builder()
                        .expire_after(Duration::from_secs(WebhookReceipt::RETENTION_SECS))
                        .build(),
                )
                .build(),
        ],
    )
    .await?;

    info!("All indexes ensured");
    Ok(())
}

fn index(keys: bson::Document) -> IndexModel {
    IndexModel::builder().keys(keys).build()
}

fn index_unique(keys: bson::Document) -> IndexModel {
    IndexModel::builder()
        .keys(keys)
        .options(IndexOptions::builder().unique(true).build())
        .build()
}

fn index_unique_partial(keys: bson::Document, filter: bson::Document) -> IndexModel {
    IndexModel::builder()
        .keys(keys)
        .options(
            IndexOptions::builder()
                .unique(true)
                .partial_filter_expression(filter)
                .build(),
        )
        .build()
}

async fn create_indexes(
    db: &Database,
    collection: &str,
    indexes: Vec<IndexModel>,
) -> Result<(), mongodb::error::Error> {
    db.collection::<bson::Document>(collection)
        .create_indexes(indexes)
        .await?;
    info!(collection, "Indexes created");
    Ok(())
}
