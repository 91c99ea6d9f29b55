use bson::{DateTime, oid::ObjectId};
use serde::{Deserialize, Serialize};

use super::session::{SessionKey, SessionType};

/// One participant's presence in one session, built from join/leave events.
///
/// At most one interval is open at a time (`open_since`); closed intervals
/// are folded into `accumulated_present_seconds`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttendanceRecord {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub tenant_id: i64,
    pub session_type: SessionType,
    pub session_id: i64,
    pub user_id: i64,
    pub participant_identity: String,
    #[serde(default)]
    pub role: AttendeeRole,
    pub first_join_time: Option<DateTime>,
    pub last_leave_time: Option<DateTime>,
    pub open_since: Option<DateTime>,
    pub pending_leave_at: Option<DateTime>,
    #[serde(default)]
    pub accumulated_present_seconds: i64,
    #[serde(default)]
    pub join_count: u32,
    #[serde(default)]
    pub leave_count: u32,
    pub finalized: Option<FinalAttendance>,
    #[serde(default)]
    pub revision: i64,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

impl AttendanceRecord {
    pub const COLLECTION: &'static str = "attendance";

    pub fn new(key: &SessionKey, user_id: i64, identity: &str, role: AttendeeRole) -> Self {
        let now = DateTime::now();
        Self {
            id: None,
            tenant_id: key.tenant_id,
            session_type: key.session_type,
            session_id: key.session_id,
            user_id,
            participant_identity: identity.to_string(),
            role,
            first_join_time: None,
            last_leave_time: None,
            open_since: None,
            pending_leave_at: None,
            accumulated_present_seconds: 0,
            join_count: 0,
            leave_count: 0,
            finalized: None,
            revision: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn session_key(&self) -> SessionKey {
        SessionKey::new(self.tenant_id, self.session_type, self.session_id)
    }

    pub fn is_open(&self) -> bool {
        self.open_since.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AttendeeRole {
    Teacher,
    #[default]
    Student,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttendanceStatus {
    Present,
    Late,
    Partial,
    Absent,
}

impl AttendanceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Present => "present",
            Self::Late => "late",
            Self::Partial => "partial",
            Self::Absent => "absent",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalAttendance {
    pub status: AttendanceStatus,
    pub percentage: f64,
    pub present_seconds: i64,
    pub finalized_at: DateTime,
}
