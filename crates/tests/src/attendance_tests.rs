use crate::fixtures::seed::{SeededSession, participant_event, room_event};
use crate::fixtures::test_app::TestApp;
use bson::DateTime;
use classmeet_db::time;
use serde_json::Value;

async fn report(app: &TestApp, seeded: &SeededSession, token: &str) -> Value {
    let resp = app
        .auth_get(
            &format!("{}?{}", app.meeting_path("attendance"), seeded.query()),
            token,
        )
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 200);
    resp.json().await.unwrap()
}

fn entry(report: &Value, user_id: i64) -> Value {
    report["entries"]
        .as_array()
        .unwrap()
        .iter()
        .find(|e| e["user_id"] == user_id)
        .cloned()
        .unwrap_or(Value::Null)
}

async fn join(app: &TestApp, seeded: &SeededSession, identity: &str, at: DateTime) {
    let resp = app
        .send_webhook(&participant_event(
            "participant_joined",
            &seeded.room_name(),
            identity,
            at,
            1,
        ))
        .await;
    assert_eq!(resp.status().as_u16(), 200);
}

async fn leave(app: &TestApp, seeded: &SeededSession, identity: &str, at: DateTime) {
    let resp = app
        .send_webhook(&participant_event(
            "participant_left",
            &seeded.room_name(),
            identity,
            at,
            0,
        ))
        .await;
    assert_eq!(resp.status().as_u16(), 200);
}

#[tokio::test]
async fn report_covers_roster_and_live_intervals() {
    let app = TestApp::spawn().await;
    let seeded = app.seed_session(300, -30).await;
    app.open_room(&seeded).await;
    let start = seeded.scheduled_start;
    let sara = seeded.students[0].identity();

    join(&app, &seeded, &seeded.teacher.identity(), start).await;
    join(&app, &seeded, &sara, time::plus_minutes(start, 2)).await;
    leave(&app, &seeded, &sara, time::plus_minutes(start, 20)).await;

    let all = report(&app, &seeded, &seeded.teacher.access_token).await;
    assert_eq!(all["planned_seconds"], 3600);
    assert_eq!(all["entries"].as_array().unwrap().len(), 3);

    let sara_entry = entry(&all, 20);
    assert_eq!(sara_entry["present_seconds"], 18 * 60);
    assert_eq!(sara_entry["percentage"], 30.0);
    assert_eq!(sara_entry["status"], "partial");
    assert_eq!(sara_entry["in_room"], false);
    assert_eq!(sara_entry["join_count"], 1);
    assert_eq!(sara_entry["leave_count"], 1);

    let teacher_entry = entry(&all, 10);
    assert_eq!(teacher_entry["role"], "teacher");
    assert_eq!(teacher_entry["in_room"], true);

    let omar = entry(&all, 21);
    assert_eq!(omar["status"], "absent");
    assert_eq!(omar["present_seconds"], 0);

    let own = report(&app, &seeded, &seeded.students[0].access_token).await;
    let entries = own["entries"].as_array().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["user_id"], 20);
}

#[tokio::test]
async fn late_first_join_is_classified_late() {
    let app = TestApp::spawn().await;
    let seeded = app.seed_session(301, -40).await;
    app.open_room(&seeded).await;
    let start = seeded.scheduled_start;
    let sara = seeded.students[0].identity();

    join(&app, &seeded, &sara, time::plus_minutes(start, 20)).await;
    leave(&app, &seeded, &sara, time::plus_minutes(start, 35)).await;

    let all = report(&app, &seeded, &seeded.teacher.access_token).await;
    assert_eq!(entry(&all, 20)["status"], "late");
}

#[tokio::test]
async fn reordered_leave_and_join_converge() {
    let app = TestApp::spawn().await;
    let seeded = app.seed_session(302, -30).await;
    app.open_room(&seeded).await;
    let start = seeded.scheduled_start;
    let sara = seeded.students[0].identity();

    leave(&app, &seeded, &sara, time::plus_minutes(start, 25)).await;
    join(&app, &seeded, &sara, time::plus_minutes(start, 5)).await;

    let all = report(&app, &seeded, &seeded.teacher.access_token).await;
    let sara_entry = entry(&all, 20);
    assert_eq!(sara_entry["present_seconds"], 20 * 60);
    assert_eq!(sara_entry["in_room"], false);
}

#[tokio::test]
async fn duplicate_leave_does_not_double_count() {
    let app = TestApp::spawn().await;
    let seeded = app.seed_session(303, -30).await;
    app.open_room(&seeded).await;
    let start = seeded.scheduled_start;
    let sara = seeded.students[0].identity();

    join(&app, &seeded, &sara, start).await;
    leave(&app, &seeded, &sara, time::plus_minutes(start, 10)).await;
    // Redelivery, then a stray leave with no open interval.
    leave(&app, &seeded, &sara, time::plus_minutes(start, 10)).await;
    leave(&app, &seeded, &sara, time::plus_minutes(start, 12)).await;

    let all = report(&app, &seeded, &seeded.teacher.access_token).await;
    assert_eq!(entry(&all, 20)["present_seconds"], 10 * 60);
}

#[tokio::test]
async fn client_leave_closes_an_open_interval() {
    let app = TestApp::spawn().await;
    let seeded = app.seed_session(304, -30).await;
    app.open_room(&seeded).await;
    let student = &seeded.students[0];

    join(&app, &seeded, &student.identity(), time::plus_minutes(DateTime::now(), -5)).await;

    let resp = app
        .auth_post(&app.meeting_path("leave"), &student.access_token)
        .json(&seeded.session_ref())
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 200);

    let own = report(&app, &seeded, &student.access_token).await;
    let mine = &own["entries"][0];
    assert_eq!(mine["in_room"], false);
    let seconds = mine["present_seconds"].as_i64().unwrap();
    assert!((295..=310).contains(&seconds), "present {seconds}s");
}

#[tokio::test]
async fn completed_lesson_finalizes_attendance() {
    let app = TestApp::spawn().await;
    let seeded = app.seed_session(305, -70).await;
    app.open_room(&seeded).await;
    let start = seeded.scheduled_start;

    join(&app, &seeded, &seeded.teacher.identity(), start).await;
    join(&app, &seeded, &seeded.students[0].identity(), start).await;
    let resp = app
        .send_webhook(&room_event(
            "room_finished",
            &seeded.room_name(),
            time::plus_minutes(start, 60),
            Some(3600),
        ))
        .await;
    assert_eq!(resp.status().as_u16(), 200);

    let all = report(&app, &seeded, &seeded.teacher.access_token).await;
    let sara = entry(&all, 20);
    assert_eq!(sara["finalized"], true);
    assert_eq!(sara["present_seconds"], 3600);
    assert_eq!(sara["status"], "present");
    assert_eq!(sara["percentage"], 100.0);

    // Re-running finalization through a late duplicate changes nothing.
    let resp = app
        .send_webhook(&room_event(
            "room_finished",
            &seeded.room_name(),
            time::plus_minutes(start, 61),
            Some(3660),
        ))
        .await;
    assert_eq!(resp.status().as_u16(), 200);
    let again = report(&app, &seeded, &seeded.teacher.access_token).await;
    assert_eq!(entry(&again, 20)["present_seconds"], 3600);
}
