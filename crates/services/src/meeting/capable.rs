use bson::DateTime;
use classmeet_db::models::{Session, SessionKey, SessionStatus, SessionType};

/// The common view the engine has of any session subtype. Subtype specific
/// data stays in the roster and is only read through this trait.
pub trait MeetingCapable {
    fn session_key(&self) -> SessionKey;
    fn session_type(&self) -> SessionType;
    fn teacher_id(&self) -> i64;
    /// All non-teacher participants expected in the meeting.
    fn participant_ids(&self) -> Vec<i64>;
    fn status(&self) -> SessionStatus;
    fn scheduled_start(&self) -> DateTime;
    fn planned_seconds(&self) -> i64;
    fn room_name(&self) -> Option<&str>;

    fn is_member(&self, user_id: i64) -> bool {
        self.teacher_id() == user_id || self.participant_ids().contains(&user_id)
    }
}

impl MeetingCapable for Session {
    fn session_key(&self) -> SessionKey {
        self.key()
    }

    fn session_type(&self) -> SessionType {
        self.roster.session_type()
    }

    fn teacher_id(&self) -> i64 {
        self.roster.teacher_id()
    }

    fn participant_ids(&self) -> Vec<i64> {
        self.roster.learner_ids()
    }

    fn status(&self) -> SessionStatus {
        self.status
    }

    fn scheduled_start(&self) -> DateTime {
        self.scheduled_start
    }

    fn planned_seconds(&self) -> i64 {
        Session::planned_seconds(self)
    }

    fn room_name(&self) -> Option<&str> {
        self.meeting.room_name.as_deref()
    }
}
