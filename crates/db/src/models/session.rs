use std::fmt;
use std::str::FromStr;

use bson::{DateTime, oid::ObjectId};
use serde::{Deserialize, Serialize};

use crate::time;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub tenant_id: i64,
    pub session_type: SessionType,
    pub session_id: i64,
    pub roster: Roster,
    pub scheduled_start: DateTime,
    pub duration_minutes: i64,
    pub timezone: Option<String>,
    #[serde(default)]
    pub status: SessionStatus,
    pub started_at: Option<DateTime>,
    pub ended_at: Option<DateTime>,
    pub actual_duration_secs: Option<i64>,
    pub cancellation_reason: Option<String>,
    pub rescheduled_from: Option<DateTime>,
    pub rescheduled_to: Option<DateTime>,
    #[serde(default)]
    pub meeting: MeetingBinding,
    #[serde(default)]
    pub recording: RecordingState,
    #[serde(default)]
    pub media_policy: MediaPolicy,
    pub keep_alive_until: Option<DateTime>,
    #[serde(default)]
    pub revision: i64,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

impl Session {
    pub const COLLECTION: &'static str = "sessions";

    pub fn new(
        tenant_id: i64,
        session_id: i64,
        roster: Roster,
        scheduled_start: DateTime,
        duration_minutes: i64,
    ) -> Self {
        let now = DateTime::now();
        Self {
            id: None,
            tenant_id,
            session_type: roster.session_type(),
            session_id,
            roster,
            scheduled_start,
            duration_minutes,
            timezone: None,
            status: SessionStatus::Scheduled,
            started_at: None,
            ended_at: None,
            actual_duration_secs: None,
            cancellation_reason: None,
            rescheduled_from: None,
            rescheduled_to: None,
            meeting: MeetingBinding::default(),
            recording: RecordingState::default(),
            media_policy: MediaPolicy::default(),
            keep_alive_until: None,
            revision: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn key(&self) -> SessionKey {
        SessionKey {
            tenant_id: self.tenant_id,
            session_type: self.session_type,
            session_id: self.session_id,
        }
    }

    pub fn scheduled_end(&self) -> DateTime {
        time::plus_minutes(self.scheduled_start, self.duration_minutes)
    }

    pub fn planned_seconds(&self) -> i64 {
        self.duration_minutes * 60
    }
}

/// Natural key of a session: sessions are owned by an external scheduling
/// system and only referenced here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionKey {
    pub tenant_id: i64,
    pub session_type: SessionType,
    pub session_id: i64,
}

impl SessionKey {
    pub fn new(tenant_id: i64, session_type: SessionType, session_id: i64) -> Self {
        Self {
            tenant_id,
            session_type,
            session_id,
        }
    }

    /// Deterministic conferencing room name.
    pub fn room_name(&self) -> String {
        format!(
            "t{}-{}-session-{}",
            self.tenant_id,
            self.session_type.room_slug(),
            self.session_id
        )
    }

    pub fn filter(&self) -> bson::Document {
        bson::doc! {
            "tenant_id": self.tenant_id,
            "session_type": self.session_type.as_str(),
            "session_id": self.session_id,
        }
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}",
            self.tenant_id,
            self.session_type.as_str(),
            self.session_id
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionType {
    Individual,
    Group,
    Trial,
    InteractiveCourse,
}

impl SessionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Individual => "individual",
            Self::Group => "group",
            Self::Trial => "trial",
            Self::InteractiveCourse => "interactive_course",
        }
    }

    fn room_slug(&self) -> &'static str {
        match self {
            Self::Individual => "individual",
            Self::Group => "group",
            Self::Trial => "trial",
            Self::InteractiveCourse => "interactive-course",
        }
    }
}

impl FromStr for SessionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "individual" | "one_to_one" => Ok(Self::Individual),
            "group" | "circle" => Ok(Self::Group),
            "trial" => Ok(Self::Trial),
            "interactive_course" | "interactive-course" | "interactive" | "course" => {
                Ok(Self::InteractiveCourse)
            }
            other => Err(format!("unknown session type '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    #[default]
    Scheduled,
    Ready,
    Ongoing,
    Completed,
    Cancelled,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Scheduled => "scheduled",
            Self::Ready => "ready",
            Self::Ongoing => "ongoing",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who belongs to a session. The variant doubles as the session subtype.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Roster {
    Individual {
        teacher_id: i64,
        student_id: i64,
    },
    Group {
        teacher_id: i64,
        group_id: i64,
        #[serde(default)]
        member_ids: Vec<i64>,
    },
    Trial {
        teacher_id: i64,
        student_id: i64,
    },
    InteractiveCourse {
        teacher_id: i64,
        course_id: i64,
        #[serde(default)]
        enrolled_ids: Vec<i64>,
    },
}

impl Roster {
    pub fn session_type(&self) -> SessionType {
        match self {
            Self::Individual { .. } => SessionType::Individual,
            Self::Group { .. } => SessionType::Group,
            Self::Trial { .. } => SessionType::Trial,
            Self::InteractiveCourse { .. } => SessionType::InteractiveCourse,
        }
    }

    pub fn teacher_id(&self) -> i64 {
        match self {
            Self::Individual { teacher_id, .. }
            | Self::Group { teacher_id, .. }
            | Self::Trial { teacher_id, .. }
            | Self::InteractiveCourse { teacher_id, .. } => *teacher_id,
        }
    }

    /// Non-teacher participants.
    pub fn learner_ids(&self) -> Vec<i64> {
        match self {
            Self::Individual { student_id, .. } | Self::Trial { student_id, .. } => {
                vec![*student_id]
            }
            Self::Group { member_ids, .. } => member_ids.clone(),
            Self::InteractiveCourse { enrolled_ids, .. } => enrolled_ids.clone(),
        }
    }

    pub fn includes(&self, user_id: i64) -> bool {
        self.teacher_id() == user_id || self.learner_ids().contains(&user_id)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MeetingBinding {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub room_name: Option<String>,
    pub platform_id: Option<String>,
    pub expires_at: Option<DateTime>,
    #[serde(default)]
    pub participant_count: u32,
}

impl MeetingBinding {
    pub fn is_bound(&self) -> bool {
        self.room_name.is_some()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordingState {
    #[serde(default)]
    pub active: bool,
    pub egress_id: Option<String>,
    pub started_at: Option<DateTime>,
    pub ended_at: Option<DateTime>,
    pub download_url: Option<String>,
    pub size_bytes: Option<i64>,
}

/// What students may publish; teachers are never restricted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaPolicy {
    #[serde(default = "bool_true")]
    pub microphone_allowed: bool,
    #[serde(default = "bool_true")]
    pub camera_allowed: bool,
}

impl Default for MediaPolicy {
    fn default() -> Self {
        Self {
            microphone_allowed: true,
            camera_allowed: true,
        }
    }
}

fn bool_true() -> bool {
    true
}
