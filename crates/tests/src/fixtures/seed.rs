use bson::DateTime;
use classmeet_db::time;
use classmeet_services::auth::UserRole;
use classmeet_services::webhook::signature::sign_body;
use serde_json::Value;

use super::test_app::TestApp;

pub const TENANT_ID: i64 = 1;

pub struct SeededUser {
    pub user_id: i64,
    pub name: String,
    pub access_token: String,
}

impl SeededUser {
    /// Participant identity the conferencing service reports for this user.
    pub fn identity(&self) -> String {
        classmeet_services::meeting::identity::encode(self.user_id, &self.name)
    }
}

/// A group session registered through the API with its roster.
pub struct SeededSession {
    pub session_id: i64,
    pub scheduled_start: DateTime,
    pub admin: SeededUser,
    pub teacher: SeededUser,
    pub students: Vec<SeededUser>,
    pub outsider: SeededUser,
}

impl SeededSession {
    pub fn session_ref(&self) -> Value {
        serde_json::json!({
            "session_type": "group",
            "session_id": self.session_id,
        })
    }

    pub fn query(&self) -> String {
        format!("session_type=group&session_id={}", self.session_id)
    }

    pub fn room_name(&self) -> String {
        format!("t{TENANT_ID}-group-session-{}", self.session_id)
    }
}

impl TestApp {
    pub fn user(&self, user_id: i64, name: &str, role: UserRole) -> SeededUser {
        let access_token = self
            .state
            .auth
            .generate_access_token(user_id, name, role, Some(TENANT_ID))
            .expect("Failed to issue access token");
        SeededUser {
            user_id,
            name: name.to_string(),
            access_token,
        }
    }

    /// Register a 60 minute group session starting `start_offset_minutes`
    /// from now, with one teacher and two students.
    pub async fn seed_session(&self, session_id: i64, start_offset_minutes: i64) -> SeededSession {
        let admin = self.user(1, "Office Admin", UserRole::Admin);
        let teacher = self.user(10, "Amal Haddad", UserRole::Teacher);
        let students = vec![
            self.user(20, "Sara Ali", UserRole::Student),
            self.user(21, "Omar Nasser", UserRole::Student),
        ];
        let outsider = self.user(99, "Someone Else", UserRole::Student);
        let scheduled_start = time::plus_minutes(DateTime::now(), start_offset_minutes);

        let resp = self
            .auth_put(&format!("/api/tenant/{TENANT_ID}/sessions"), &admin.access_token)
            .json(&serde_json::json!({
                "session_id": session_id,
                "roster": {
                    "kind": "group",
                    "teacher_id": teacher.user_id,
                    "group_id": 7,
                    "member_ids": students.iter().map(|s| s.user_id).collect::<Vec<_>>(),
                },
                "scheduled_start": time::to_rfc3339(scheduled_start),
                "duration_minutes": 60,
            }))
            .send()
            .await
            .expect("Register session request failed");
        assert_eq!(
            resp.status().as_u16(),
            200,
            "Register session failed: {}",
            resp.text().await.unwrap_or_default()
        );

        SeededSession {
            session_id,
            scheduled_start,
            admin,
            teacher,
            students,
            outsider,
        }
    }

    pub fn auth_get(&self, path: &str, token: &str) -> reqwest::RequestBuilder {
        self.client
            .get(self.url(path))
            .header("Authorization", format!("Bearer {}", token))
    }

    pub fn auth_post(&self, path: &str, token: &str) -> reqwest::RequestBuilder {
        self.client
            .post(self.url(path))
            .header("Authorization", format!("Bearer {}", token))
    }

    pub fn auth_put(&self, path: &str, token: &str) -> reqwest::RequestBuilder {
        self.client
            .put(self.url(path))
            .header("Authorization", format!("Bearer {}", token))
    }

    pub fn meeting_path(&self, action: &str) -> String {
        format!("/api/tenant/{TENANT_ID}/meetings/{action}")
    }

    /// Deliver a webhook signed the way the conferencing service signs it.
    pub async fn send_webhook(&self, event: &Value) -> reqwest::Response {
        let body = event.to_string();
        let signature = sign_body(
            &self.settings.livekit.api_key,
            &self.settings.livekit.api_secret,
            body.as_bytes(),
        )
        .expect("Failed to sign webhook");
        self.client
            .post(self.url("/api/webhooks/meetings"))
            .header("Authorization", signature)
            .header("Content-Type", "application/json")
            .body(body)
            .send()
            .await
            .expect("Webhook request failed")
    }

    /// Teacher opens the room; returns the binding JSON.
    pub async fn open_room(&self, seeded: &SeededSession) -> Value {
        let resp = self
            .auth_post(&self.meeting_path("create"), &seeded.teacher.access_token)
            .json(&seeded.session_ref())
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status().as_u16(), 200);
        resp.json().await.unwrap()
    }
}

/// Participant event payload in LiveKit's shape.
pub fn participant_event(event: &str, room: &str, identity: &str, at: DateTime, count: u32) -> Value {
    let ts = at.timestamp_millis() / 1000;
    serde_json::json!({
        "event": event,
        "createdAt": ts,
        "room": {"name": room, "numParticipants": count},
        "participant": {"identity": identity, "joinedAt": ts},
    })
}

pub fn room_event(event: &str, room: &str, at: DateTime, duration_secs: Option<i64>) -> Value {
    let mut room_json = serde_json::json!({"name": room});
    if let Some(duration) = duration_secs {
        room_json["durationSeconds"] = serde_json::json!(duration);
    }
    serde_json::json!({
        "event": event,
        "createdAt": at.timestamp_millis() / 1000,
        "room": room_json,
    })
}
