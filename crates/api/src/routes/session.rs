use axum::{Json, extract::State};
use classmeet_db::models::{MediaPolicy, Roster, Session};
use serde::Deserialize;
use validator::Validate;

use super::meeting::{SessionResponse, parse_instant, to_session_response};
use crate::{
    error::ApiError,
    extractors::{auth::AuthUser, tenant::TenantId},
    state::AppState,
};

/// A session as pushed by the scheduling system.
#[derive(Debug, Deserialize, Validate)]
pub struct RegisterSessionRequest {
    pub session_id: i64,
    pub roster: Roster,
    /// RFC 3339 instant.
    pub scheduled_start: String,
    #[validate(range(min = 5, max = 480))]
    pub duration_minutes: i64,
    pub timezone: Option<String>,
    pub media_policy: Option<MediaPolicy>,
}

// ---- PUT /api/tenant/{tenant_id}/sessions --------------------------------

pub async fn register(
    State(state): State<AppState>,
    auth: AuthUser,
    TenantId(tenant_id): TenantId,
    Json(body): Json<RegisterSessionRequest>,
) -> Result<Json<SessionResponse>, ApiError> {
    auth.ensure_tenant(tenant_id)?;
    if !auth.requester.role.is_staff() {
        return Err(ApiError::Forbidden(
            "Only administrators can register sessions".to_string(),
        ));
    }
    body.validate()
        .map_err(|e| ApiError::Validation(e.to_string()))?;

    let start = parse_instant(&body.scheduled_start)?;
    let mut session = Session::new(
        tenant_id,
        body.session_id,
        body.roster,
        start,
        body.duration_minutes,
    );
    session.timezone = body.timezone;
    if let Some(policy) = body.media_policy {
        session.media_policy = policy;
    }

    let stored = state.meetings.register(session).await?;
    Ok(Json(to_session_response(&stored)))
}
