use axum::{
    Json,
    body::Bytes,
    extract::State,
    http::{HeaderMap, header},
};

use crate::{error::ApiError, state::AppState};

// ---- POST /api/webhooks/meetings (signature checked) ---------------------

/// Duplicates, unknown rooms and unsupported events are acknowledged with
/// 200 so the sender stops retrying; persistence failures surface as 5xx.
pub async fn meetings(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<serde_json::Value>, ApiError> {
    let authorization = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());

    let outcome = state.webhooks.process(&body, authorization).await?;
    Ok(Json(serde_json::json!({ "status": outcome.as_str() })))
}
