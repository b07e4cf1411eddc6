//! Registration, sign-in and token lifecycle.

use super::common::{TestApp, PASSWORD};
use axum::http::{Method, StatusCode};
use scholar_core::auth::Role;
use serde_json::json;

async fn login(app: &TestApp, email: &str) -> (StatusCode, serde_json::Value) {
    app.send(
        Method::POST,
        "/api/v1/auth/login",
        None,
        Some(json!({ "email": email, "password": PASSWORD })),
    )
    .await
}

#[tokio::test]
async fn test_registered_school_signs_in_after_approval() {
    let app = TestApp::new().await;
    let root = app.super_admin().await;

    let (status, body) = app
        .send(
            Method::POST,
            "/api/v1/auth/register",
            None,
            Some(json!({
                "schoolName": "Hillside Primary",
                "schoolCode": "HILL",
                "email": "head@hillside.test",
                "password": PASSWORD,
                "firstName": "Hana",
                "lastName": "Head"
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    assert_eq!(body["school"]["verificationStatus"], "pending");
    assert_eq!(body["user"]["role"], "school_admin");
    assert!(body["user"].get("passwordHash").is_none());
    let school_id = body["school"]["id"].as_str().unwrap().to_string();

    let (status, body) = login(&app, "head@hillside.test").await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["message"], "School has not been verified");

    let (status, _) = app
        .post(
            &format!("/api/v1/schools/{}/verification", school_id),
            &root,
            json!({ "status": "approved" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = login(&app, "HEAD@hillside.test").await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["tokenType"], "Bearer");
    let access = body["accessToken"].as_str().unwrap().to_string();

    let (status, body) = app.get("/api/v1/notifications", &access).await;
    assert_eq!(status, StatusCode::OK);
    let inbox = body["notifications"].as_array().unwrap();
    assert_eq!(inbox.len(), 1);
    assert_eq!(inbox[0]["category"], "verification");
}

#[tokio::test]
async fn test_duplicate_school_code_is_conflict() {
    let app = TestApp::new().await;
    app.school("DUPE").await;

    let (status, _) = app
        .send(
            Method::POST,
            "/api/v1/auth/register",
            None,
            Some(json!({
                "schoolName": "Another",
                "schoolCode": "DUPE",
                "email": "owner@another.test",
                "password": PASSWORD,
                "firstName": "Ann",
                "lastName": "Other"
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_weak_password_is_rejected() {
    let app = TestApp::new().await;

    let (status, body) = app
        .send(
            Method::POST,
            "/api/v1/auth/register",
            None,
            Some(json!({
                "schoolName": "Weak",
                "schoolCode": "WEAK",
                "email": "owner@weak.test",
                "password": "password",
                "firstName": "Will",
                "lastName": "Weak"
            })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn test_wrong_password_is_unauthorized() {
    let app = TestApp::new().await;
    let school = app.school("PWD").await;
    app.account(Some(school.id), Role::Teacher, "t@pwd.test").await;

    let (status, body) = app
        .send(
            Method::POST,
            "/api/v1/auth/login",
            None,
            Some(json!({ "email": "t@pwd.test", "password": "Wrong1234" })),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], "Invalid email or password");

    let (status, _) = login(&app, "nobody@pwd.test").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_refresh_token_is_single_use() {
    let app = TestApp::new().await;
    let school = app.school("REF").await;
    app.account(Some(school.id), Role::Principal, "p@ref.test").await;

    let (_, body) = login(&app, "p@ref.test").await;
    let first = body["refreshToken"].as_str().unwrap().to_string();

    let (status, body) = app
        .send(
            Method::POST,
            "/api/v1/auth/refresh",
            None,
            Some(json!({ "refreshToken": first })),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    let second = body["tokens"]["refreshToken"].as_str().unwrap().to_string();
    assert_ne!(first, second);

    let (status, _) = app
        .send(
            Method::POST,
            "/api/v1/auth/refresh",
            None,
            Some(json!({ "refreshToken": first })),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app
        .send(
            Method::POST,
            "/api/v1/auth/logout",
            None,
            Some(json!({ "refreshToken": second })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = app
        .send(
            Method::POST,
            "/api/v1/auth/refresh",
            None,
            Some(json!({ "refreshToken": second })),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_logout_with_unknown_token_succeeds() {
    let app = TestApp::new().await;

    let (status, _) = app
        .send(
            Method::POST,
            "/api/v1/auth/logout",
            None,
            Some(json!({ "refreshToken": "never-issued" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_resource_routes_require_token() {
    let app = TestApp::new().await;

    let (status, body) = app.send(Method::GET, "/api/v1/students", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "UNAUTHORIZED");

    let (status, _) = app.get("/api/v1/students", "not-a-jwt").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_me_reports_identity() {
    let app = TestApp::new().await;
    let school = app.school("ME").await;
    let (teacher, token) = app.teacher(&school, "t@me.test").await;

    let (status, body) = app.get("/api/v1/auth/me", &token).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user"]["email"], "t@me.test");
    assert_eq!(body["identity"]["teacherId"], teacher.id.to_string());
}

#[tokio::test]
async fn test_deactivated_account_token_is_rejected() {
    let app = TestApp::new().await;
    let school = app.school("OFF").await;
    let admin = app.admin(&school).await;
    let (user, token) = app.account(Some(school.id), Role::Teacher, "t@off.test").await;

    let (status, _) = app
        .post(
            &format!("/api/v1/users/{}/deactivate", user.id),
            &admin,
            json!({}),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = app.get("/api/v1/auth/me", &token).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}
