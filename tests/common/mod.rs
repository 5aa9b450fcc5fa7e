#![allow(dead_code)]

/// Shared helpers for driving the router in-process.

use std::time::Duration;

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use serde_json::Value;
use skillstack::{config::Config, create_app, server::Services};
use tower::ServiceExt;

pub struct TestApp {
    pub router: Router,
    pub services: Services,
    _dir: tempfile::TempDir,
}

/// App over a fresh data directory; `tweak` adjusts the config before wiring
pub async fn spawn_app(tweak: impl FnOnce(&mut Config)) -> TestApp {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut config = Config::for_data_dir(dir.path());
    config.normalization.lock_retry_interval = Duration::from_millis(5);
    config.normalization.job_retry_delay = Duration::ZERO;
    tweak(&mut config);

    let (router, services) = create_app(&config).await.expect("app");
    TestApp {
        router,
        services,
        _dir: dir,
    }
}

impl TestApp {
    pub async fn send(&self, method: &str, uri: &str, user: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(user) = user {
            builder = builder.header("x-user-id", user);
        }
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string())),
            None => builder.body(Body::empty()),
        }
        .expect("request");

        let response = self.router.clone().oneshot(request).await.expect("response");
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("body");
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into()))
        };
        (status, value)
    }

    pub async fn create_roadmap(&self, user: &str) -> String {
        let (status, body) = self
            .send("POST", "/api/roadmaps", Some(user), Some(serde_json::json!({ "title": "Rust" })))
            .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        body["id"].as_str().expect("roadmap id").to_string()
    }

    pub async fn create_step(&self, user: &str, roadmap_id: &str, title: &str, position: Option<i64>) -> Value {
        let mut body = serde_json::json!({ "roadmap_id": roadmap_id, "title": title });
        if let Some(position) = position {
            body["position"] = position.into();
        }
        let (status, step) = self.send("POST", "/api/roadmap-steps", Some(user), Some(body)).await;
        assert_eq!(status, StatusCode::CREATED, "{step}");
        step
    }

    /// (title, position) pairs in listing order
    pub async fn layout(&self, user: &str, roadmap_id: &str) -> Vec<(String, i64)> {
        let (status, body) = self
            .send("GET", &format!("/api/roadmap-steps/roadmap/{roadmap_id}"), Some(user), None)
            .await;
        assert_eq!(status, StatusCode::OK, "{body}");
        body.as_array()
            .expect("step list")
            .iter()
            .map(|s| {
                (
                    s["title"].as_str().unwrap_or_default().to_string(),
                    s["position"].as_i64().unwrap_or_default(),
                )
            })
            .collect()
    }

    /// Poll until the listing matches `expected` or give up after ~2s
    pub async fn wait_for_layout(&self, user: &str, roadmap_id: &str, expected: &[(&str, i64)]) -> Vec<(String, i64)> {
        let expected: Vec<(String, i64)> = expected.iter().map(|(t, p)| (t.to_string(), *p)).collect();
        let mut current = Vec::new();
        for _ in 0..200 {
            current = self.layout(user, roadmap_id).await;
            if current == expected {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        current
    }
}

pub fn owned(pairs: &[(&str, i64)]) -> Vec<(String, i64)> {
    pairs.iter().map(|(t, p)| (t.to_string(), *p)).collect()
}
