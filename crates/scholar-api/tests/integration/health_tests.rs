//! Operational endpoint tests.

use super::common::TestApp;
use axum::http::{Method, StatusCode};

#[tokio::test]
async fn test_health_reports_database() {
    let app = TestApp::new().await;

    let (status, body) = app.send(Method::GET, "/health", None, None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["database"]["connected"], true);
    assert_eq!(body["database"]["driver"], "sqlite");
    assert!(body["version"].is_string());
}

#[tokio::test]
async fn test_probes_need_no_token() {
    let app = TestApp::new().await;

    let (status, _) = app.send(Method::GET, "/live", None, None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = app.send(Method::GET, "/ready", None, None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_unknown_route_is_not_found() {
    let app = TestApp::new().await;

    let (status, _) = app.send(Method::GET, "/api/v1/nope", None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
