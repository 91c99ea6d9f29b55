use crate::fixtures::seed::{participant_event, room_event};
use crate::fixtures::test_app::TestApp;
use bson::DateTime;
use classmeet_db::time;
use serde_json::Value;

async fn session_status(app: &TestApp, seeded: &crate::fixtures::seed::SeededSession) -> Value {
    let resp = app
        .auth_get(
            &format!("{}?{}", app.meeting_path("status"), seeded.query()),
            &seeded.admin.access_token,
        )
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 200);
    let json: Value = resp.json().await.unwrap();
    json["session"].clone()
}

#[tokio::test]
async fn unsigned_webhooks_are_rejected() {
    let app = TestApp::spawn().await;
    let resp = app
        .client
        .post(app.url("/api/webhooks/meetings"))
        .json(&room_event("room_started", "any-room", DateTime::now(), None))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 401);

    let resp = app
        .client
        .post(app.url("/api/webhooks/meetings"))
        .header("Authorization", "Bearer not-a-token")
        .json(&room_event("room_started", "any-room", DateTime::now(), None))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 401);
}

#[tokio::test]
async fn malformed_payloads_are_bad_requests() {
    let app = TestApp::spawn().await;
    let resp = app
        .send_webhook(&serde_json::json!({"event": "participant_joined", "room": {"name": "r"}}))
        .await;
    assert_eq!(resp.status().as_u16(), 400);

    let resp = app.send_webhook(&serde_json::json!({"room": {"name": "r"}})).await;
    assert_eq!(resp.status().as_u16(), 400);
}

#[tokio::test]
async fn unknown_rooms_and_unsupported_events_are_acknowledged() {
    let app = TestApp::spawn().await;

    let resp = app
        .send_webhook(&room_event("room_started", "t9-group-session-1", DateTime::now(), None))
        .await;
    assert_eq!(resp.status().as_u16(), 200);
    let json: Value = resp.json().await.unwrap();
    assert_eq!(json["status"], "unknown_room");

    let resp = app
        .send_webhook(&serde_json::json!({"event": "ingress_started", "createdAt": 1}))
        .await;
    assert_eq!(resp.status().as_u16(), 200);
    let json: Value = resp.json().await.unwrap();
    assert_eq!(json["status"], "ignored");
}

#[tokio::test]
async fn first_join_starts_the_session_once() {
    let app = TestApp::spawn().await;
    let seeded = app.seed_session(200, 0).await;
    app.open_room(&seeded).await;

    let event = participant_event(
        "participant_joined",
        &seeded.room_name(),
        &seeded.students[0].identity(),
        DateTime::now(),
        1,
    );
    let resp = app.send_webhook(&event).await;
    let json: Value = resp.json().await.unwrap();
    assert_eq!(json["status"], "applied");

    let resp = app.send_webhook(&event).await;
    assert_eq!(resp.status().as_u16(), 200);
    let json: Value = resp.json().await.unwrap();
    assert_eq!(json["status"], "duplicate");

    let session = session_status(&app, &seeded).await;
    assert_eq!(session["status"], "ongoing");
    assert_eq!(session["participant_count"], 1);
    assert!(session["started_at"].as_str().is_some());
}

#[tokio::test]
async fn empty_room_does_not_complete_a_running_session() {
    let app = TestApp::spawn().await;
    let seeded = app.seed_session(201, -5).await;
    app.open_room(&seeded).await;
    let now = DateTime::now();
    let identity = seeded.students[0].identity();

    app.send_webhook(&participant_event(
        "participant_joined",
        &seeded.room_name(),
        &identity,
        time::plus_minutes(now, -2),
        1,
    ))
    .await;
    let resp = app
        .send_webhook(&participant_event(
            "participant_left",
            &seeded.room_name(),
            &identity,
            now,
            0,
        ))
        .await;
    assert_eq!(resp.status().as_u16(), 200);

    let session = session_status(&app, &seeded).await;
    assert_eq!(session["status"], "ongoing");
    assert_eq!(session["participant_count"], 0);
}

#[tokio::test]
async fn short_rooms_do_not_count_as_delivered() {
    let app = TestApp::spawn().await;
    let seeded = app.seed_session(202, 0).await;
    app.open_room(&seeded).await;

    let resp = app
        .send_webhook(&room_event(
            "room_finished",
            &seeded.room_name(),
            DateTime::now(),
            Some(40),
        ))
        .await;
    assert_eq!(resp.status().as_u16(), 200);

    let session = session_status(&app, &seeded).await;
    assert_ne!(session["status"], "completed");
    assert_eq!(session["actual_duration_secs"], 40);
}

#[tokio::test]
async fn finished_room_after_a_lesson_completes_it() {
    let app = TestApp::spawn().await;
    let seeded = app.seed_session(203, -60).await;
    app.open_room(&seeded).await;
    let start = seeded.scheduled_start;

    app.send_webhook(&room_event("room_started", &seeded.room_name(), start, None))
        .await;
    let resp = app
        .send_webhook(&room_event(
            "room_finished",
            &seeded.room_name(),
            time::plus_minutes(start, 55),
            Some(55 * 60),
        ))
        .await;
    assert_eq!(resp.status().as_u16(), 200);

    let session = session_status(&app, &seeded).await;
    assert_eq!(session["status"], "completed");
    assert_eq!(session["actual_duration_secs"], 55 * 60);
}

#[tokio::test]
async fn persistence_failures_are_retried_by_the_sender() {
    let app = TestApp::spawn().await;
    let seeded = app.seed_session(204, 0).await;
    app.open_room(&seeded).await;
    let event = room_event("room_started", &seeded.room_name(), DateTime::now(), None);

    app.session_store.set_failing(true);
    let resp = app.send_webhook(&event).await;
    assert_eq!(resp.status().as_u16(), 500);
    assert!(app.receipt_store.is_empty());

    app.session_store.set_failing(false);
    let resp = app.send_webhook(&event).await;
    assert_eq!(resp.status().as_u16(), 200);
    let json: Value = resp.json().await.unwrap();
    assert_eq!(json["status"], "applied");
}
