//! Server API tests

use super::*;
use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use backup_core::{OperationLock, Store};
use http_body_util::BodyExt;
use tower::ServiceExt;

fn setup_test_app() -> Router {
    let store = Arc::new(Store::in_memory().unwrap());
    let lock_dir = tempfile::tempdir().unwrap();
    let lock = Arc::new(OperationLock::new(lock_dir.path().join("backup.lock")));
    std::mem::forget(lock_dir); // keep the lock file alive for the test's router lifetime
    let state = Arc::new(AppState {
        store,
        lock,
        notifier: Arc::new(backup_core::NoopNotifier),
        config: ServerConfig::default(),
    });
    create_router(state)
}

async fn get_body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

fn request(method: &str, uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_string(&body).unwrap()))
        .unwrap()
}

#[tokio::test]
async fn health_check_is_unauthenticated() {
    let app = setup_test_app();
    let response = app.oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap()).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn create_and_list_targets() {
    let app = setup_test_app();

    let body = serde_json::json!({
        "name": "pg-main",
        "config": { "db_type": "postgresql", "host": "db", "port": 5432, "database": "app", "user": "svc" },
        "secrets": { "password": "hunter2" }
    });
    let response = app.clone().oneshot(request("POST", "/automation/targets", body)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let created = get_body_json(response).await;
    assert_eq!(created["name"], "pg-main");

    let response = app.oneshot(Request::builder().uri("/automation/targets").body(Body::empty()).unwrap()).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let targets = get_body_json(response).await;
    assert_eq!(targets.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn create_destination_and_schedule_anchors_next_run() {
    let app = setup_test_app();

    let target_body = serde_json::json!({
        "name": "pg-main",
        "config": { "db_type": "postgresql", "host": "db", "port": 5432, "database": "app", "user": "svc" },
        "secrets": { "password": "hunter2" }
    });
    let response = app.clone().oneshot(request("POST", "/automation/targets", target_body)).await.unwrap();
    let target = get_body_json(response).await;
    let target_id = target["id"].as_str().unwrap().to_string();

    let dest_body = serde_json::json!({
        "name": "local-disk",
        "config": { "destination_type": "local", "path": "/tmp/backups" }
    });
    let response = app.clone().oneshot(request("POST", "/automation/destinations", dest_body)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let destination = get_body_json(response).await;
    let destination_id = destination["id"].as_str().unwrap().to_string();

    let schedule_body = serde_json::json!({
        "name": "nightly",
        "target_id": target_id,
        "destination_ids": [destination_id],
        "interval_seconds": 86400,
        "retention": { "mode": "last_n", "min_backups": null, "max_backups": null, "keep_last": 3, "run_at_time": "03:30", "encrypt": false, "encryption_password": null },
        "enabled": true
    });
    let response = app.oneshot(request("POST", "/automation/schedules", schedule_body)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let schedule = get_body_json(response).await;
    assert!(schedule["next_run_at"].is_string());
}

#[tokio::test]
async fn unknown_target_returns_not_found() {
    let app = setup_test_app();
    let response = app.oneshot(Request::builder().uri("/automation/targets/does-not-exist").body(Body::empty()).unwrap()).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn requires_bearer_token_when_configured() {
    let store = Arc::new(Store::in_memory().unwrap());
    let lock_dir = tempfile::tempdir().unwrap();
    let lock = Arc::new(OperationLock::new(lock_dir.path().join("backup.lock")));
    std::mem::forget(lock_dir);
    let state = Arc::new(AppState {
        store,
        lock,
        notifier: Arc::new(backup_core::NoopNotifier),
        config: ServerConfig { auth_token: Some("secret-token".into()), allowed_origins: vec![] },
    });
    let app = create_router(state);

    let unauthenticated = app
        .clone()
        .oneshot(Request::builder().uri("/automation/targets").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(unauthenticated.status(), StatusCode::UNAUTHORIZED);

    let authenticated = app
        .oneshot(
            Request::builder()
                .uri("/automation/targets")
                .header("authorization", "Bearer secret-token")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(authenticated.status(), StatusCode::OK);
}

#[tokio::test]
async fn backup_now_rejects_empty_destinations_without_local_storage() {
    let app = setup_test_app();

    let target_body = serde_json::json!({
        "name": "pg-main",
        "config": { "db_type": "postgresql", "host": "db", "port": 5432, "database": "app", "user": "svc" },
        "secrets": { "password": "hunter2" }
    });
    let response = app.clone().oneshot(request("POST", "/automation/targets", target_body)).await.unwrap();
    let target = get_body_json(response).await;
    let target_id = target["id"].as_str().unwrap().to_string();

    let backup_body = serde_json::json!({
        "target_id": target_id,
        "destination_ids": [],
        "use_local_storage": false
    });
    let response = app.oneshot(request("POST", "/automation/backup-now", backup_body)).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
