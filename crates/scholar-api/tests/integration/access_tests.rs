//! Role guards and tenant isolation across resources.

use super::common::{classroom, term, TestApp};
use axum::http::StatusCode;
use scholar_core::auth::Role;
use serde_json::json;

#[tokio::test]
async fn test_role_guard_runs_before_lookup() {
    let app = TestApp::new().await;
    let school_a = app.school("GA").await;
    let school_b = app.school("GB").await;
    let admin_b = app.admin(&school_b).await;
    let (_, parent_a) = app.parent(&school_a, "p@ga.test").await;

    let subject = app
        .create(
            "/api/v1/subjects",
            &admin_b,
            "subject",
            json!({ "name": "History", "code": "HIST" }),
        )
        .await;

    let (status, _) = app
        .delete(&format!("/api/v1/subjects/{}", subject["id"].as_str().unwrap()), &parent_a)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app
        .delete(&format!("/api/v1/subjects/{}", uuid::Uuid::new_v4()), &parent_a)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_other_tenant_rows_are_not_found() {
    let app = TestApp::new().await;
    let school_a = app.school("TA").await;
    let school_b = app.school("TB").await;
    let admin_a = app.admin(&school_a).await;
    let admin_b = app.admin(&school_b).await;

    let subject = app
        .create(
            "/api/v1/subjects",
            &admin_b,
            "subject",
            json!({ "name": "Art", "code": "ART" }),
        )
        .await;
    let uri = format!("/api/v1/subjects/{}", subject["id"].as_str().unwrap());

    let (status, body) = app.get(&uri, &admin_a).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "NOT_FOUND");

    let (status, _) = app.put(&uri, &admin_a, json!({ "name": "Stolen" })).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = app.get("/api/v1/subjects", &admin_a).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["subjects"].as_array().unwrap().is_empty());

    // The same code is free in another tenant.
    let (status, _) = app
        .post(
            "/api/v1/subjects",
            &admin_a,
            json!({ "name": "Art", "code": "ART" }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
}

#[tokio::test]
async fn test_unlinked_teacher_sees_nothing() {
    let app = TestApp::new().await;
    let school = app.school("UNL").await;
    let admin = app.admin(&school).await;
    classroom(&app, &admin, "4A", 4, 3).await;
    let (_, token) = app.account(Some(school.id), Role::Teacher, "t@unl.test").await;

    let (status, body) = app.get("/api/v1/students", &token).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["students"].as_array().unwrap().is_empty());
    assert_eq!(body["pagination"]["total"], 0);
}

#[tokio::test]
async fn test_teacher_sees_only_taught_classes() {
    let app = TestApp::new().await;
    let school = app.school("TCH").await;
    let admin = app.admin(&school).await;
    let taught = classroom(&app, &admin, "5A", 5, 2).await;
    classroom(&app, &admin, "6A", 6, 3).await;
    let (teacher, token) = app.teacher(&school, "t@tch.test").await;

    app.create(
        "/api/v1/timetables",
        &admin,
        "timetable",
        json!({
            "classId": taught.class_id,
            "subjectId": taught.subject_id,
            "teacherId": teacher.id,
            "dayOfWeek": 1,
            "startTime": "08:00",
            "endTime": "08:45"
        }),
    )
    .await;

    let (status, body) = app.get("/api/v1/students", &token).await;
    assert_eq!(status, StatusCode::OK);
    let students = body["students"].as_array().unwrap();
    assert_eq!(students.len(), 2);
    assert!(students.iter().all(|s| s["classId"] == taught.class_id.as_str()));
}

#[tokio::test]
async fn test_parent_sees_only_own_children() {
    let app = TestApp::new().await;
    let school = app.school("FAM").await;
    let admin = app.admin(&school).await;
    let room = classroom(&app, &admin, "3B", 3, 2).await;
    let (parent, token) = app.parent(&school, "mum@fam.test").await;

    let (status, _) = app
        .post(
            &format!("/api/v1/students/{}/guardians", room.student_ids[0]),
            &admin,
            json!({ "parentId": parent.id, "relationship": "mother" }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = app.get("/api/v1/students", &token).await;
    assert_eq!(status, StatusCode::OK);
    let students = body["students"].as_array().unwrap();
    assert_eq!(students.len(), 1);
    assert_eq!(students[0]["id"], room.student_ids[0].as_str());

    let (status, _) = app
        .get(&format!("/api/v1/students/{}", room.student_ids[1]), &token)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_super_admin_writes_name_a_school() {
    let app = TestApp::new().await;
    let school = app.school("SUP").await;
    let root = app.super_admin().await;

    let (status, body) = app
        .post(
            "/api/v1/subjects",
            &root,
            json!({ "name": "Music", "code": "MUS" }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["errors"][0]["field"], "schoolId");

    let subject = app
        .create(
            "/api/v1/subjects",
            &root,
            "subject",
            json!({ "schoolId": school.id, "name": "Music", "code": "MUS" }),
        )
        .await;
    assert_eq!(subject["schoolId"], school.id.to_string());

    let (status, body) = app
        .get(&format!("/api/v1/subjects?schoolId={}", school.id), &root)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["subjects"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_super_admin_write_needs_existing_school() {
    let app = TestApp::new().await;
    let root = app.super_admin().await;

    let (status, body) = app
        .post(
            "/api/v1/students",
            &root,
            json!({
                "schoolId": uuid::Uuid::new_v4(),
                "firstName": "Ghost",
                "lastName": "Pupil",
                "admissionNo": "G-1"
            }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["errors"][0]["field"], "schoolId");
    assert_eq!(body["errors"][0]["code"], "not_found");

    let (status, body) = app.get("/api/v1/students", &root).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["pagination"]["total"], 0);
}

#[tokio::test]
async fn test_unrecognised_role_lists_nothing() {
    let app = TestApp::new().await;
    let school = app.school("ROL").await;
    let admin = app.admin(&school).await;
    let room = classroom(&app, &admin, "5B", 5, 2).await;
    let (user, _) = app.account(Some(school.id), Role::SchoolAdmin, "x@rol.test").await;
    let token = app.token_claiming(&user, "janitor");

    for uri in ["/api/v1/students", "/api/v1/classes", "/api/v1/subjects"] {
        let (status, body) = app.get(uri, &token).await;
        assert_eq!(status, StatusCode::OK, "GET {}", uri);
        assert_eq!(body["pagination"]["total"], 0, "GET {}", uri);
    }

    let (status, _) = app
        .get(&format!("/api/v1/students/{}", room.student_ids[0]), &token)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app
        .post(
            "/api/v1/subjects",
            &token,
            json!({ "name": "Art", "code": "ART" }),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_teacher_cannot_schedule_exam_for_untaught_class() {
    let app = TestApp::new().await;
    let school = app.school("EXA").await;
    let admin = app.admin(&school).await;
    let room = classroom(&app, &admin, "7C", 7, 1).await;
    let term_id = term(&app, &admin).await;
    let (_, token) = app.teacher(&school, "t@exa.test").await;

    let (status, body) = app
        .post(
            "/api/v1/exams",
            &token,
            json!({
                "termId": term_id,
                "classId": room.class_id,
                "subjectId": room.subject_id,
                "title": "Midterm",
                "examDate": "2024-11-04",
                "startTime": "09:00",
                "endTime": "10:30",
                "totalMarks": 100.0,
                "passingMarks": 50.0
            }),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["message"], "You do not teach this class");
}

#[tokio::test]
async fn test_parent_cannot_write_staff_resources() {
    let app = TestApp::new().await;
    let school = app.school("PWR").await;
    let (_, token) = app.parent(&school, "dad@pwr.test").await;

    let (status, _) = app
        .post(
            "/api/v1/grades",
            &token,
            json!({ "level": 1, "name": "Grade 1" }),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app.get("/api/v1/users", &token).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}
