/// End-to-end normalization: mutations through the router, passes through the
/// in-process runner, the queue worker, or the fallback path.

mod common;

use std::time::Duration;

use axum::http::StatusCode;
use common::{owned, spawn_app};
use serde_json::json;
use skillstack::runtime::{queue::QueueCounts, worker::QueueWorker};

#[tokio::test]
async fn delete_leaves_a_gap_that_normalization_closes() {
    let app = spawn_app(|_| {}).await;
    let roadmap = app.create_roadmap("alice").await;
    let mut ids = Vec::new();
    for title in ["A", "B", "C", "D", "E"] {
        ids.push(app.create_step("alice", &roadmap, title, None).await["id"].clone());
    }

    let (status, _) = app
        .send("DELETE", &format!("/api/roadmap-steps/{}", ids[2].as_str().unwrap()), Some("alice"), None)
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let expected = [("A", 1), ("B", 2), ("D", 3), ("E", 4)];
    assert_eq!(app.wait_for_layout("alice", &roadmap, &expected).await, owned(&expected));
}

#[tokio::test]
async fn colliding_edits_settle_into_a_dense_sequence() {
    let app = spawn_app(|_| {}).await;
    let roadmap = app.create_roadmap("alice").await;
    app.create_step("alice", &roadmap, "A", None).await;
    app.create_step("alice", &roadmap, "B", None).await;
    let c = app.create_step("alice", &roadmap, "C", None).await;
    app.create_step("alice", &roadmap, "X", Some(40)).await;

    let (status, body) = app
        .send(
            "PUT",
            &format!("/api/roadmap-steps/{}", c["id"].as_str().unwrap()),
            Some("alice"),
            Some(json!({ "position": 1 })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["position"], 1);

    // C collides with A at 1; A was inserted first so it keeps the lead
    let expected = [("A", 1), ("C", 2), ("B", 3), ("X", 4)];
    assert_eq!(app.wait_for_layout("alice", &roadmap, &expected).await, owned(&expected));
}

#[tokio::test]
async fn on_demand_normalization_is_accepted() {
    let app = spawn_app(|_| {}).await;
    let roadmap = app.create_roadmap("alice").await;

    let uri = format!("/api/roadmaps/{roadmap}/normalize");
    let (status, body) = app.send("POST", &uri, Some("alice"), None).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["roadmap_id"], json!(roadmap));

    let (status, _) = app.send("POST", &uri, Some("bob"), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn roadmap_delete_cascades_its_steps() {
    let app = spawn_app(|_| {}).await;
    let roadmap = app.create_roadmap("alice").await;
    let step = app.create_step("alice", &roadmap, "A", None).await;

    let (status, _) = app.send("DELETE", &format!("/api/roadmaps/{roadmap}"), Some("alice"), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = app
        .send("GET", &format!("/api/roadmap-steps/{}", step["id"].as_str().unwrap()), Some("alice"), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn unreachable_queue_falls_back_to_in_process() {
    let app = spawn_app(|config| {
        config.normalization.use_queue = true;
        config.database.queue_db_path = "/nonexistent-dir/for/skillstack/queue.db".into();
    })
    .await;
    let roadmap = app.create_roadmap("alice").await;
    let a = app.create_step("alice", &roadmap, "A", None).await;
    app.create_step("alice", &roadmap, "B", None).await;
    app.create_step("alice", &roadmap, "C", None).await;

    let (status, _) = app
        .send("DELETE", &format!("/api/roadmap-steps/{}", a["id"].as_str().unwrap()), Some("alice"), None)
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let expected = [("B", 1), ("C", 2)];
    assert_eq!(app.wait_for_layout("alice", &roadmap, &expected).await, owned(&expected));

    let (_, health) = app.send("GET", "/healthz/dispatch", None, None).await;
    assert_eq!(health["dispatch"]["mode"], "queue");
    assert_eq!(health["dispatch"]["degraded"], true);
    assert!(health["dispatch"]["fallbacks"].as_u64().unwrap_or_default() >= 1);
    assert!(health["queue"]["error"].is_string());
}

#[tokio::test]
async fn queued_jobs_are_drained_by_the_worker() {
    let app = spawn_app(|config| config.normalization.use_queue = true).await;
    let roadmap = app.create_roadmap("alice").await;
    let a = app.create_step("alice", &roadmap, "A", None).await;
    app.create_step("alice", &roadmap, "B", None).await;
    app.create_step("alice", &roadmap, "C", None).await;

    let (status, _) = app
        .send("DELETE", &format!("/api/roadmap-steps/{}", a["id"].as_str().unwrap()), Some("alice"), None)
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let queue = app.services.queue.clone().expect("queue configured");
    let worker = QueueWorker::new(queue.clone(), app.services.engine.clone(), Duration::from_millis(5));

    // nothing normalizes until a worker runs
    assert_eq!(app.layout("alice", &roadmap).await, owned(&[("B", 2), ("C", 3)]));

    let expected = owned(&[("B", 1), ("C", 2)]);
    for _ in 0..200 {
        while worker.process_next().await.expect("worker iteration").is_some() {}
        if app.layout("alice", &roadmap).await == expected {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(app.layout("alice", &roadmap).await, expected);

    let health = app.services.scheduler.health();
    assert_eq!(health.in_process, 0);
    assert_eq!(health.fallbacks, 0);
    assert!(health.queued >= 1);

    tokio::time::sleep(Duration::from_millis(50)).await;
    while worker.process_next().await.expect("worker iteration").is_some() {}
    assert_eq!(queue.counts().await.expect("counts"), QueueCounts::default());
}
