//! Who may join or manage a session.
//!
//! Authorization is owned by an external system; the engine only asks a
//! [`SessionAccessPolicy`]. [`RosterPolicy`] is the default used when no
//! external policy is wired in.

use async_trait::async_trait;
use classmeet_db::models::Session;
use serde::Serialize;

use super::capable::MeetingCapable;
use crate::auth::UserRole;

/// The authenticated caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Requester {
    pub user_id: i64,
    pub display_name: String,
    pub role: UserRole,
    pub tenant_id: Option<i64>,
}

/// Role a requester plays inside one meeting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MeetingRole {
    Teacher,
    Admin,
    Student,
}

impl MeetingRole {
    pub fn is_moderator(&self) -> bool {
        matches!(self, Self::Teacher | Self::Admin)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Teacher => "teacher",
            Self::Admin => "admin",
            Self::Student => "student",
        }
    }
}

#[async_trait]
pub trait SessionAccessPolicy: Send + Sync {
    /// The role the requester would have in the meeting, or `None` if they
    /// have no relationship to the session.
    async fn meeting_role(&self, requester: &Requester, session: &Session) -> Option<MeetingRole>;

    /// Whether the requester may create rooms and end or cancel the session.
    async fn can_manage(&self, requester: &Requester, session: &Session) -> bool {
        self.meeting_role(requester, session)
            .await
            .is_some_and(|role| role.is_moderator())
    }
}

pub struct RosterPolicy;

#[async_trait]
impl SessionAccessPolicy for RosterPolicy {
    async fn meeting_role(&self, requester: &Requester, session: &Session) -> Option<MeetingRole> {
        if requester.user_id == session.teacher_id() {
            return Some(MeetingRole::Teacher);
        }
        if requester.role.is_staff() && requester.tenant_id == Some(session.tenant_id) {
            return Some(MeetingRole::Admin);
        }
        session
            .is_member(requester.user_id)
            .then_some(MeetingRole::Student)
    }
}
