use axum::{
    Json,
    extract::{Query, State},
};
use bson::DateTime;
use classmeet_db::models::{AttendeeRole, Session, SessionKey, SessionType};
use classmeet_db::time::to_rfc3339;
use classmeet_services::attendance::{AttendanceEntry, AttendanceReport};
use classmeet_services::meeting::{
    MeetingStatus, ParticipantToken, RoomBinding, RoomDetails, RoomOverrides, TokenPermissions,
};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::{
    error::ApiError,
    extractors::{auth::AuthUser, tenant::TenantId},
    state::AppState,
};

// ---- Request types -------------------------------------------------------

/// Identifies a session inside the tenant from the path.
#[derive(Debug, Deserialize)]
pub struct SessionRef {
    pub session_type: String,
    pub session_id: i64,
}

impl SessionRef {
    fn key(&self, tenant_id: i64) -> Result<SessionKey, ApiError> {
        let session_type: SessionType = self.session_type.parse().map_err(ApiError::BadRequest)?;
        Ok(SessionKey::new(tenant_id, session_type, self.session_id))
    }
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct MeetingOptions {
    #[validate(range(min = 2, max = 100))]
    pub max_participants: Option<u32>,
    #[validate(range(min = 60, max = 3600))]
    pub empty_timeout_secs: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct CreateMeetingRequest {
    #[serde(flatten)]
    pub session: SessionRef,
    #[serde(default)]
    pub options: MeetingOptions,
}

#[derive(Debug, Default, Deserialize)]
pub struct PermissionsBody {
    pub can_publish: Option<bool>,
    pub can_subscribe: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct TokenRequest {
    #[serde(flatten)]
    pub session: SessionRef,
    #[serde(default)]
    pub permissions: PermissionsBody,
}

#[derive(Debug, Deserialize)]
pub struct CancelRequest {
    #[serde(flatten)]
    pub session: SessionRef,
    #[serde(default)]
    pub reason: String,
}

#[derive(Debug, Deserialize)]
pub struct RescheduleRequest {
    #[serde(flatten)]
    pub session: SessionRef,
    /// RFC 3339 instant.
    pub scheduled_start: String,
}

// ---- Response types ------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct BindingResponse {
    pub room_name: String,
    pub platform: &'static str,
    pub platform_id: Option<String>,
    pub expires_at: Option<String>,
    pub status: String,
}

#[derive(Debug, Serialize)]
pub struct PermissionsResponse {
    pub can_publish: bool,
    pub can_subscribe: bool,
    pub room_admin: bool,
    pub room_record: bool,
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub server_url: String,
    pub room_name: String,
    pub participant_identity: String,
    pub role: String,
    pub permissions: PermissionsResponse,
    pub expires_at: String,
}

#[derive(Debug, Serialize)]
pub struct ParticipantResponse {
    pub identity: String,
    pub name: String,
    pub joined_at: i64,
    pub is_publisher: bool,
}

#[derive(Debug, Serialize)]
pub struct RoomInfoResponse {
    pub room_name: Option<String>,
    pub is_active: bool,
    pub expires_at: Option<String>,
    pub num_participants: u32,
    pub active_recording: bool,
    pub participants: Vec<ParticipantResponse>,
}

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub tenant_id: i64,
    pub session_type: String,
    pub session_id: i64,
    pub status: String,
    pub scheduled_start: String,
    pub duration_minutes: i64,
    pub started_at: Option<String>,
    pub ended_at: Option<String>,
    pub actual_duration_secs: Option<i64>,
    pub cancellation_reason: Option<String>,
    pub rescheduled_from: Option<String>,
    pub room_name: Option<String>,
    pub participant_count: u32,
    pub revision: i64,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub session: SessionResponse,
    pub phase: String,
    pub can_join: bool,
    pub seconds_until_open: i64,
    pub role: String,
}

#[derive(Debug, Serialize)]
pub struct AttendanceEntryResponse {
    pub user_id: i64,
    pub participant_identity: Option<String>,
    pub role: String,
    pub status: String,
    pub percentage: f64,
    pub present_seconds: i64,
    pub first_join_time: Option<String>,
    pub last_leave_time: Option<String>,
    pub join_count: u32,
    pub leave_count: u32,
    pub in_room: bool,
    pub finalized: bool,
}

#[derive(Debug, Serialize)]
pub struct AttendanceResponse {
    pub session_type: String,
    pub session_id: i64,
    pub planned_seconds: i64,
    pub entries: Vec<AttendanceEntryResponse>,
}

// ---- POST /api/tenant/{tenant_id}/meetings/create ------------------------

pub async fn create(
    State(state): State<AppState>,
    auth: AuthUser,
    TenantId(tenant_id): TenantId,
    Json(body): Json<CreateMeetingRequest>,
) -> Result<Json<BindingResponse>, ApiError> {
    auth.ensure_tenant(tenant_id)?;
    body.options
        .validate()
        .map_err(|e| ApiError::Validation(e.to_string()))?;
    let key = body.session.key(tenant_id)?;

    let overrides = RoomOverrides {
        max_participants: body.options.max_participants,
        empty_timeout_secs: body.options.empty_timeout_secs,
    };
    let binding = state.meetings.create(&key, &auth.requester, &overrides).await?;
    Ok(Json(to_binding_response(binding)))
}

// ---- POST /api/tenant/{tenant_id}/meetings/token -------------------------

pub async fn token(
    State(state): State<AppState>,
    auth: AuthUser,
    TenantId(tenant_id): TenantId,
    Json(body): Json<TokenRequest>,
) -> Result<Json<TokenResponse>, ApiError> {
    auth.ensure_tenant(tenant_id)?;
    let key = body.session.key(tenant_id)?;

    let permissions = TokenPermissions {
        can_publish: body.permissions.can_publish,
        can_subscribe: body.permissions.can_subscribe,
    };
    let token = state
        .meetings
        .token(&key, &auth.requester, permissions)
        .await?;
    Ok(Json(to_token_response(token)))
}

// ---- GET /api/tenant/{tenant_id}/meetings/room-info ----------------------

pub async fn room_info(
    State(state): State<AppState>,
    auth: AuthUser,
    TenantId(tenant_id): TenantId,
    Query(query): Query<SessionRef>,
) -> Result<Json<RoomInfoResponse>, ApiError> {
    auth.ensure_tenant(tenant_id)?;
    let key = query.key(tenant_id)?;

    let details = state.meetings.room_info(&key, &auth.requester).await?;
    Ok(Json(to_room_info_response(details)))
}

// ---- POST /api/tenant/{tenant_id}/meetings/end ---------------------------

pub async fn end(
    State(state): State<AppState>,
    auth: AuthUser,
    TenantId(tenant_id): TenantId,
    Json(body): Json<SessionRef>,
) -> Result<Json<SessionResponse>, ApiError> {
    auth.ensure_tenant(tenant_id)?;
    let key = body.key(tenant_id)?;

    let session = state.meetings.end(&key, &auth.requester).await?;
    Ok(Json(to_session_response(&session)))
}

// ---- POST /api/tenant/{tenant_id}/meetings/leave -------------------------

pub async fn leave(
    State(state): State<AppState>,
    auth: AuthUser,
    TenantId(tenant_id): TenantId,
    Json(body): Json<SessionRef>,
) -> Result<Json<serde_json::Value>, ApiError> {
    auth.ensure_tenant(tenant_id)?;
    let key = body.key(tenant_id)?;

    state.meetings.leave(&key, &auth.requester).await?;
    Ok(Json(serde_json::json!({ "left": true })))
}

// ---- POST /api/tenant/{tenant_id}/meetings/cancel ------------------------

pub async fn cancel(
    State(state): State<AppState>,
    auth: AuthUser,
    TenantId(tenant_id): TenantId,
    Json(body): Json<CancelRequest>,
) -> Result<Json<SessionResponse>, ApiError> {
    auth.ensure_tenant(tenant_id)?;
    let key = body.session.key(tenant_id)?;

    let session = state
        .meetings
        .cancel(&key, &auth.requester, &body.reason)
        .await?;
    Ok(Json(to_session_response(&session)))
}

// ---- POST /api/tenant/{tenant_id}/meetings/reschedule --------------------

pub async fn reschedule(
    State(state): State<AppState>,
    auth: AuthUser,
    TenantId(tenant_id): TenantId,
    Json(body): Json<RescheduleRequest>,
) -> Result<Json<SessionResponse>, ApiError> {
    auth.ensure_tenant(tenant_id)?;
    let key = body.session.key(tenant_id)?;
    let to = parse_instant(&body.scheduled_start)?;

    let session = state.meetings.reschedule(&key, &auth.requester, to).await?;
    Ok(Json(to_session_response(&session)))
}

// ---- GET /api/tenant/{tenant_id}/meetings/status -------------------------

pub async fn status(
    State(state): State<AppState>,
    auth: AuthUser,
    TenantId(tenant_id): TenantId,
    Query(query): Query<SessionRef>,
) -> Result<Json<StatusResponse>, ApiError> {
    auth.ensure_tenant(tenant_id)?;
    let key = query.key(tenant_id)?;

    let status = state.meetings.status(&key, &auth.requester).await?;
    Ok(Json(to_status_response(status)))
}

// ---- GET /api/tenant/{tenant_id}/meetings/attendance ---------------------

pub async fn attendance(
    State(state): State<AppState>,
    auth: AuthUser,
    TenantId(tenant_id): TenantId,
    Query(query): Query<SessionRef>,
) -> Result<Json<AttendanceResponse>, ApiError> {
    auth.ensure_tenant(tenant_id)?;
    let key = query.key(tenant_id)?;

    let report = state.meetings.attendance(&key, &auth.requester).await?;
    Ok(Json(to_attendance_response(report)))
}

// ---- Helpers -------------------------------------------------------------

pub(crate) fn parse_instant(value: &str) -> Result<DateTime, ApiError> {
    DateTime::parse_rfc3339_str(value)
        .map_err(|_| ApiError::BadRequest(format!("Invalid RFC 3339 timestamp: {value}")))
}

fn to_binding_response(binding: RoomBinding) -> BindingResponse {
    BindingResponse {
        room_name: binding.room_name,
        platform: "livekit",
        platform_id: binding.platform_id,
        expires_at: binding.expires_at.map(to_rfc3339),
        status: binding.status.to_string(),
    }
}

fn to_token_response(token: ParticipantToken) -> TokenResponse {
    TokenResponse {
        access_token: token.access_token,
        server_url: token.server_url,
        room_name: token.room_name,
        participant_identity: token.participant_identity,
        role: token.role.as_str().to_string(),
        permissions: PermissionsResponse {
            can_publish: token.permissions.can_publish,
            can_subscribe: token.permissions.can_subscribe,
            room_admin: token.permissions.room_admin,
            room_record: token.permissions.room_record,
        },
        expires_at: to_rfc3339(token.expires_at),
    }
}

fn to_room_info_response(details: RoomDetails) -> RoomInfoResponse {
    RoomInfoResponse {
        room_name: details.binding.as_ref().map(|b| b.room_name.clone()),
        is_active: details.room.is_some(),
        expires_at: details
            .binding
            .as_ref()
            .and_then(|b| b.expires_at)
            .map(to_rfc3339),
        num_participants: details
            .room
            .as_ref()
            .map(|r| r.num_participants)
            .unwrap_or_default(),
        active_recording: details.room.as_ref().is_some_and(|r| r.active_recording),
        participants: details
            .participants
            .into_iter()
            .map(|p| ParticipantResponse {
                identity: p.identity,
                name: p.name,
                joined_at: p.joined_at,
                is_publisher: p.is_publisher,
            })
            .collect(),
    }
}

pub(crate) fn to_session_response(session: &Session) -> SessionResponse {
    SessionResponse {
        tenant_id: session.tenant_id,
        session_type: session.session_type.as_str().to_string(),
        session_id: session.session_id,
        status: session.status.to_string(),
        scheduled_start: to_rfc3339(session.scheduled_start),
        duration_minutes: session.duration_minutes,
        started_at: session.started_at.map(to_rfc3339),
        ended_at: session.ended_at.map(to_rfc3339),
        actual_duration_secs: session.actual_duration_secs,
        cancellation_reason: session.cancellation_reason.clone(),
        rescheduled_from: session.rescheduled_from.map(to_rfc3339),
        room_name: session.meeting.room_name.clone(),
        participant_count: session.meeting.participant_count,
        revision: session.revision,
    }
}

fn to_status_response(status: MeetingStatus) -> StatusResponse {
    StatusResponse {
        session: to_session_response(&status.session),
        phase: status.phase.as_str().to_string(),
        can_join: status.can_join,
        seconds_until_open: status.seconds_until_open,
        role: status.role.as_str().to_string(),
    }
}

fn to_attendance_entry(entry: AttendanceEntry) -> AttendanceEntryResponse {
    AttendanceEntryResponse {
        user_id: entry.user_id,
        participant_identity: entry.participant_identity,
        role: match entry.role {
            AttendeeRole::Teacher => "teacher",
            AttendeeRole::Student => "student",
        }
        .to_string(),
        status: entry.status.as_str().to_string(),
        percentage: entry.percentage,
        present_seconds: entry.present_seconds,
        first_join_time: entry.first_join_time.map(to_rfc3339),
        last_leave_time: entry.last_leave_time.map(to_rfc3339),
        join_count: entry.join_count,
        leave_count: entry.leave_count,
        in_room: entry.in_room,
        finalized: entry.finalized,
    }
}

fn to_attendance_response(report: AttendanceReport) -> AttendanceResponse {
    AttendanceResponse {
        session_type: report.session.session_type.as_str().to_string(),
        session_id: report.session.session_id,
        planned_seconds: report.planned_seconds,
        entries: report.entries.into_iter().map(to_attendance_entry).collect(),
    }
}
