use crate::fixtures::seed::{TENANT_ID, participant_event};
use crate::fixtures::test_app::TestApp;
use bson::DateTime;
use classmeet_services::auth::UserRole;
use serde_json::Value;

#[tokio::test]
async fn health_check() {
    let app = TestApp::spawn().await;
    let resp = app.client.get(app.url("/health")).send().await.unwrap();
    assert_eq!(resp.status().as_u16(), 200);
    let json: Value = resp.json().await.unwrap();
    assert_eq!(json["status"], "ok");
}

#[tokio::test]
async fn cors_follows_configured_origins() {
    let open = TestApp::spawn().await;
    let resp = open
        .client
        .get(open.url("/health"))
        .header("Origin", "https://school.example")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.headers()["access-control-allow-origin"], "*");

    let app = TestApp::spawn_with_settings(|s| {
        s.app.cors_origins = vec!["https://school.example".to_string()];
    })
    .await;
    let allowed = app
        .client
        .get(app.url("/health"))
        .header("Origin", "https://school.example")
        .send()
        .await
        .unwrap();
    assert_eq!(
        allowed.headers()["access-control-allow-origin"],
        "https://school.example"
    );

    let other = app
        .client
        .get(app.url("/health"))
        .header("Origin", "https://elsewhere.example")
        .send()
        .await
        .unwrap();
    assert!(other.headers().get("access-control-allow-origin").is_none());
}

#[tokio::test]
async fn requests_without_token_are_rejected() {
    let app = TestApp::spawn().await;
    let resp = app
        .client
        .post(app.url(&app.meeting_path("create")))
        .json(&serde_json::json!({"session_type": "group", "session_id": 1}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 401);
}

#[tokio::test]
async fn students_wait_for_the_teacher_to_open_the_room() {
    let app = TestApp::spawn().await;
    let seeded = app.seed_session(100, 5).await;
    let student = &seeded.students[0];

    let resp = app
        .auth_post(&app.meeting_path("create"), &student.access_token)
        .json(&seeded.session_ref())
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 423);

    let opened = app.open_room(&seeded).await;
    assert_eq!(opened["room_name"], seeded.room_name());
    assert_eq!(opened["platform"], "livekit");
    assert_eq!(opened["status"], "ready");
    assert!(opened["expires_at"].as_str().is_some());

    let resp = app
        .auth_post(&app.meeting_path("create"), &student.access_token)
        .json(&seeded.session_ref())
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 200);
    let joined: Value = resp.json().await.unwrap();
    assert_eq!(joined["room_name"], opened["room_name"]);
    assert_eq!(app.conferencing.create_count(), 1);
}

#[tokio::test]
async fn concurrent_creates_bind_a_single_room() {
    let app = TestApp::spawn().await;
    let seeded = app.seed_session(101, 0).await;

    let send = || {
        app.auth_post(&app.meeting_path("create"), &seeded.teacher.access_token)
            .json(&seeded.session_ref())
            .send()
    };
    let (a, b, c, d) = tokio::join!(send(), send(), send(), send());

    let mut names = Vec::new();
    for resp in [a, b, c, d] {
        let resp = resp.unwrap();
        assert_eq!(resp.status().as_u16(), 200);
        let json: Value = resp.json().await.unwrap();
        names.push(json["room_name"].as_str().unwrap().to_string());
    }
    assert!(names.iter().all(|n| *n == seeded.room_name()));
    assert_eq!(app.conferencing.room_count(), 1);
}

#[tokio::test]
async fn create_options_are_validated() {
    let app = TestApp::spawn().await;
    let seeded = app.seed_session(102, 0).await;

    let resp = app
        .auth_post(&app.meeting_path("create"), &seeded.teacher.access_token)
        .json(&serde_json::json!({
            "session_type": "group",
            "session_id": 102,
            "options": {"max_participants": 500},
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 422);
}

#[tokio::test]
async fn token_requires_a_bound_room_and_a_roster_seat() {
    let app = TestApp::spawn().await;
    let seeded = app.seed_session(103, 0).await;
    let student = &seeded.students[0];

    let resp = app
        .auth_post(&app.meeting_path("token"), &student.access_token)
        .json(&seeded.session_ref())
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 409);
    let json: Value = resp.json().await.unwrap();
    assert_eq!(json["message"], "Meeting not ready yet");

    app.open_room(&seeded).await;

    let resp = app
        .auth_post(&app.meeting_path("token"), &seeded.outsider.access_token)
        .json(&seeded.session_ref())
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 403);

    let resp = app
        .auth_post(&app.meeting_path("token"), &student.access_token)
        .json(&serde_json::json!({
            "session_type": "group",
            "session_id": 103,
            "permissions": {"can_publish": false},
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 200);
    let json: Value = resp.json().await.unwrap();
    assert_eq!(json["participant_identity"], "20_sara-ali");
    assert_eq!(json["role"], "student");
    assert_eq!(json["room_name"], seeded.room_name());
    assert_eq!(json["server_url"], "wss://conferencing.test");
    assert_eq!(json["permissions"]["can_publish"], false);
    assert_eq!(json["permissions"]["can_subscribe"], true);
    assert_eq!(json["permissions"]["room_admin"], false);

    let resp = app
        .auth_post(&app.meeting_path("token"), &seeded.teacher.access_token)
        .json(&seeded.session_ref())
        .send()
        .await
        .unwrap();
    let json: Value = resp.json().await.unwrap();
    assert_eq!(json["role"], "teacher");
    assert_eq!(json["permissions"]["room_admin"], true);
    assert_eq!(json["permissions"]["room_record"], true);
}

#[tokio::test]
async fn admins_of_the_tenant_can_moderate() {
    let app = TestApp::spawn().await;
    let seeded = app.seed_session(104, 0).await;
    app.open_room(&seeded).await;

    let resp = app
        .auth_post(&app.meeting_path("token"), &seeded.admin.access_token)
        .json(&seeded.session_ref())
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 200);
    let json: Value = resp.json().await.unwrap();
    assert_eq!(json["role"], "admin");
}

#[tokio::test]
async fn room_info_lists_participants() {
    let app = TestApp::spawn().await;
    let seeded = app.seed_session(105, 0).await;
    let teacher = &seeded.teacher;

    let resp = app
        .auth_get(
            &format!("{}?{}", app.meeting_path("room-info"), seeded.query()),
            &teacher.access_token,
        )
        .send()
        .await
        .unwrap();
    let json: Value = resp.json().await.unwrap();
    assert_eq!(json["is_active"], false);
    assert_eq!(json["participants"].as_array().unwrap().len(), 0);

    app.open_room(&seeded).await;
    app.conferencing.add_participant(
        &seeded.room_name(),
        classmeet_services::livekit::ParticipantInfo {
            sid: "PA_1".into(),
            identity: seeded.students[0].identity(),
            name: seeded.students[0].name.clone(),
            joined_at: 1,
            is_publisher: true,
        },
    );

    let resp = app
        .auth_get(
            &format!("{}?{}", app.meeting_path("room-info"), seeded.query()),
            &teacher.access_token,
        )
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 200);
    let json: Value = resp.json().await.unwrap();
    assert_eq!(json["is_active"], true);
    assert_eq!(json["room_name"], seeded.room_name());
    assert_eq!(json["participants"][0]["identity"], "20_sara-ali");
}

#[tokio::test]
async fn teacher_ends_a_running_meeting() {
    let app = TestApp::spawn().await;
    let seeded = app.seed_session(106, -10).await;
    app.open_room(&seeded).await;

    let resp = app
        .auth_post(&app.meeting_path("end"), &seeded.teacher.access_token)
        .json(&seeded.session_ref())
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 409, "cannot end before it started");

    let joined = participant_event(
        "participant_joined",
        &seeded.room_name(),
        &seeded.teacher.identity(),
        DateTime::now(),
        1,
    );
    assert_eq!(app.send_webhook(&joined).await.status().as_u16(), 200);

    let resp = app
        .auth_post(&app.meeting_path("end"), &seeded.students[0].access_token)
        .json(&seeded.session_ref())
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 403);

    let resp = app
        .auth_post(&app.meeting_path("end"), &seeded.teacher.access_token)
        .json(&seeded.session_ref())
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 200);
    let json: Value = resp.json().await.unwrap();
    assert_eq!(json["status"], "completed");
    assert!(json["ended_at"].as_str().is_some());
    assert!(!app.conferencing.has_room(&seeded.room_name()));

    let resp = app
        .auth_post(&app.meeting_path("token"), &seeded.students[0].access_token)
        .json(&seeded.session_ref())
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 409, "no tokens for a finished lesson");
}

#[tokio::test]
async fn cancel_requires_reason_and_is_repeatable() {
    let app = TestApp::spawn().await;
    let seeded = app.seed_session(107, 60).await;
    let path = app.meeting_path("cancel");

    let mut body = seeded.session_ref();
    body["reason"] = serde_json::json!("  ");
    let resp = app
        .auth_post(&path, &seeded.teacher.access_token)
        .json(&body)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 400);

    body["reason"] = serde_json::json!("teacher unavailable");
    for _ in 0..2 {
        let resp = app
            .auth_post(&path, &seeded.teacher.access_token)
            .json(&body)
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status().as_u16(), 200);
        let json: Value = resp.json().await.unwrap();
        assert_eq!(json["status"], "cancelled");
        assert_eq!(json["cancellation_reason"], "teacher unavailable");
        assert_eq!(json["revision"], 1);
    }

    let resp = app
        .auth_post(&app.meeting_path("create"), &seeded.teacher.access_token)
        .json(&seeded.session_ref())
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 409);
}

#[tokio::test]
async fn reschedule_moves_the_session() {
    let app = TestApp::spawn().await;
    let seeded = app.seed_session(108, 60).await;

    let mut body = seeded.session_ref();
    body["scheduled_start"] = serde_json::json!("2030-01-15T09:00:00Z");
    let resp = app
        .auth_post(&app.meeting_path("reschedule"), &seeded.teacher.access_token)
        .json(&body)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 200);
    let json: Value = resp.json().await.unwrap();
    assert_eq!(json["status"], "scheduled");
    assert!(json["scheduled_start"].as_str().unwrap().starts_with("2030-01-15T09:00:00"));
    assert!(json["rescheduled_from"].as_str().is_some());

    body["scheduled_start"] = serde_json::json!("next tuesday");
    let resp = app
        .auth_post(&app.meeting_path("reschedule"), &seeded.teacher.access_token)
        .json(&body)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 400);
}

#[tokio::test]
async fn status_reports_the_join_window() {
    let app = TestApp::spawn().await;
    let seeded = app.seed_session(109, 5).await;
    let path = format!("{}?{}", app.meeting_path("status"), seeded.query());

    let resp = app
        .auth_get(&path, &seeded.students[0].access_token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 200);
    let json: Value = resp.json().await.unwrap();
    assert_eq!(json["phase"], "pre_session");
    assert_eq!(json["session"]["status"], "ready");
    assert_eq!(json["can_join"], false);

    let resp = app
        .auth_get(&path, &seeded.teacher.access_token)
        .send()
        .await
        .unwrap();
    let json: Value = resp.json().await.unwrap();
    assert_eq!(json["can_join"], true);
    assert_eq!(json["role"], "teacher");
    assert_eq!(json["session"]["room_name"], seeded.room_name());
}

#[tokio::test]
async fn bad_references_are_rejected() {
    let app = TestApp::spawn().await;
    let seeded = app.seed_session(110, 0).await;
    let token = &seeded.teacher.access_token;

    let resp = app
        .auth_get(
            &format!("{}?session_type=webinar&session_id=110", app.meeting_path("status")),
            token,
        )
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 400);

    let resp = app
        .auth_get(
            &format!("{}?session_type=group&session_id=999", app.meeting_path("status")),
            token,
        )
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 404);

    let resp = app
        .auth_get(
            &format!(
                "/api/tenant/{}/meetings/status?{}",
                TENANT_ID + 1,
                seeded.query()
            ),
            token,
        )
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 403);
}

#[tokio::test]
async fn only_staff_register_sessions() {
    let app = TestApp::spawn().await;
    let teacher = app.user(10, "Amal Haddad", UserRole::Teacher);

    let resp = app
        .auth_put(&format!("/api/tenant/{TENANT_ID}/sessions"), &teacher.access_token)
        .json(&serde_json::json!({
            "session_id": 1,
            "roster": {"kind": "trial", "teacher_id": 10, "student_id": 20},
            "scheduled_start": "2030-01-15T09:00:00Z",
            "duration_minutes": 30,
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 403);
}
