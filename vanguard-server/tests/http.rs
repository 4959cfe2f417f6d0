use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;
use vanguard_queue::{DynQueueEngine, MemoryBackend, QueueBackend, QueueEngine, ReserveFrom};

fn create_test_app() -> (Router, Arc<DynQueueEngine>) {
    let backend: Arc<dyn QueueBackend> = Arc::new(MemoryBackend::new());
    let engine: Arc<DynQueueEngine> = Arc::new(QueueEngine::new(backend));
    (vanguard_server::router(engine.clone()), engine)
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn empty(method: &str, uri: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

async fn json_body(res: axum::response::Response) -> Value {
    let bytes = res.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn health_returns_ok() {
    let (app, _) = create_test_app();
    let res = app.oneshot(empty("GET", "/health")).await.unwrap();

    assert_eq!(res.status(), StatusCode::OK);
    assert!(res.headers().get("x-request-id").is_some());
    let bytes = res.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(&bytes[..], b"ok");
}

#[tokio::test]
async fn enqueue_then_get() {
    let (app, _) = create_test_app();
    let res = app
        .clone()
        .oneshot(post_json(
            "/jobs",
            json!({
                "queue": "high",
                "payload": {"email": "a@b.c"},
                "correlation_id": "req-1",
                "max_retries": 3
            }),
        ))
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::CREATED);
    let created = json_body(res).await;
    assert_eq!(created["status"], "queued");
    assert_eq!(created["queue"], "high");
    assert_eq!(created["payload"]["email"], "a@b.c");
    assert_eq!(created["max_retries"], 3);

    let id = created["id"].as_str().unwrap();
    let res = app.oneshot(empty("GET", &format!("/jobs/{id}"))).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let fetched = json_body(res).await;
    assert_eq!(fetched["correlation_id"], "req-1");
}

#[tokio::test]
async fn invalid_requests_are_rejected() {
    let (app, _) = create_test_app();

    let res = app
        .clone()
        .oneshot(post_json("/jobs", json!({"queue": "urgent", "payload": {}})))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(res).await["error"], "unknown_queue");

    let res = app
        .clone()
        .oneshot(post_json("/jobs", json!({"queue": "low"})))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(res).await["error"], "empty_payload");

    let big = "x".repeat(300 * 1024);
    let res = app
        .clone()
        .oneshot(post_json("/jobs", json!({"queue": "low", "payload": big})))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(res).await["error"], "payload_too_large");

    let res = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/jobs")
                .header("content-type", "application/json")
                .body(Body::from("{\"queue\":"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(res).await["error"], "bad_request");
}

#[tokio::test]
async fn delayed_job_requires_run_at() {
    let (app, _) = create_test_app();

    let res = app
        .clone()
        .oneshot(post_json("/jobs/delayed", json!({"queue": "default", "payload": 1})))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let res = app
        .clone()
        .oneshot(post_json(
            "/jobs/delayed",
            json!({"queue": "default", "payload": 1, "run_at": "2099-01-01T00:00:00Z"}),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let created = json_body(res).await;
    assert_eq!(created["status"], "delayed");
    assert_eq!(created["scheduled_at"], "2099-01-01T00:00:00Z");

    let res = app
        .oneshot(empty("GET", "/queues/default/stats"))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let stats = json_body(res).await;
    assert_eq!(stats["delayed"], 1);
    assert_eq!(stats["ready"], 0);
}

#[tokio::test]
async fn missing_job_is_404() {
    let (app, _) = create_test_app();
    let res = app.oneshot(empty("GET", "/jobs/does-not-exist")).await.unwrap();

    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    assert_eq!(json_body(res).await["error"], "not_found");
}

#[tokio::test]
async fn cancel_queued_and_processing_jobs() {
    let (app, engine) = create_test_app();

    let res = app
        .clone()
        .oneshot(post_json("/jobs", json!({"queue": "low", "payload": [1, 2]})))
        .await
        .unwrap();
    let id = json_body(res).await["id"].as_str().unwrap().to_string();

    let res = app
        .clone()
        .oneshot(empty("DELETE", &format!("/jobs/{id}?queue=high")))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    let res = app
        .clone()
        .oneshot(empty("DELETE", &format!("/jobs/{id}?queue=low")))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(json_body(res).await["status"], "cancelled");

    app.clone()
        .oneshot(post_json("/jobs", json!({"queue": "low", "payload": "x"})))
        .await
        .unwrap();
    let reserved = engine
        .reserve(ReserveFrom::Any, std::time::Duration::ZERO)
        .await
        .unwrap();

    let res = app
        .oneshot(empty("DELETE", &format!("/jobs/{}", reserved.id)))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CONFLICT);
    assert_eq!(json_body(res).await["error"], "not_cancellable");
}

#[tokio::test]
async fn unknown_queue_stats_is_400() {
    let (app, _) = create_test_app();
    let res = app.oneshot(empty("GET", "/queues/urgent/stats")).await.unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}
