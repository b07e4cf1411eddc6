//! Attendance marking, analytics figures and the dashboard.

use super::common::{classroom, term, TestApp};
use axum::http::StatusCode;
use serde_json::json;

#[tokio::test]
async fn test_attendance_without_records_is_zero_rate() {
    let app = TestApp::new().await;
    let school = app.school("ZERO").await;
    let admin = app.admin(&school).await;
    let room = classroom(&app, &admin, "1Z", 1, 1).await;

    let (status, body) = app
        .get(
            &format!(
                "/api/v1/analytics/attendance?studentId={}&from=2024-09-01&to=2024-09-30",
                room.student_ids[0]
            ),
            &admin,
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["attendance"]["attendance_rate"], "0.00");
    assert_eq!(body["attendance"]["total"], 0);
}

#[tokio::test]
async fn test_marked_attendance_feeds_rates() {
    let app = TestApp::new().await;
    let school = app.school("ATT").await;
    let admin = app.admin(&school).await;
    let room = classroom(&app, &admin, "2T", 2, 2).await;
    let (teacher, teacher_token) = app.teacher(&school, "t@att.test").await;

    let mark = json!({
        "classId": room.class_id,
        "date": "2024-09-16",
        "records": [
            { "studentId": room.student_ids[0], "status": "present" },
            { "studentId": room.student_ids[1], "status": "absent", "remarks": "Ill" }
        ]
    });

    // Marking is limited to teachers of the class.
    let (status, _) = app.post("/api/v1/attendance", &teacher_token, mark.clone()).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    app.put(
        &format!("/api/v1/classes/{}", room.class_id),
        &admin,
        json!({ "supervisorId": teacher.id }),
    )
    .await;
    let (status, body) = app.post("/api/v1/attendance", &teacher_token, mark).await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["attendance"].as_array().unwrap().len(), 2);

    let (_, body) = app
        .get(
            &format!(
                "/api/v1/analytics/attendance?classId={}&from=2024-09-01&to=2024-09-30",
                room.class_id
            ),
            &admin,
        )
        .await;
    assert_eq!(body["attendance"]["present"], 1);
    assert_eq!(body["attendance"]["total"], 2);
    assert_eq!(body["attendance"]["attendance_rate"], "50.00");

    let (_, body) = app
        .get(
            &format!("/api/v1/attendance?studentId={}", room.student_ids[1]),
            &teacher_token,
        )
        .await;
    let records = body["attendance"].as_array().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0]["status"], "absent");
}

#[tokio::test]
async fn test_attendance_for_outsider_is_rejected() {
    let app = TestApp::new().await;
    let school = app.school("OUT").await;
    let admin = app.admin(&school).await;
    let room = classroom(&app, &admin, "3O", 3, 1).await;
    let other = classroom(&app, &admin, "4O", 4, 1).await;

    let (status, body) = app
        .post(
            "/api/v1/attendance",
            &admin,
            json!({
                "classId": room.class_id,
                "date": "2024-09-16",
                "records": [{ "studentId": other.student_ids[0], "status": "present" }]
            }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn test_student_and_class_analytics() {
    let app = TestApp::new().await;
    let school = app.school("ANA").await;
    let admin = app.admin(&school).await;
    let room = classroom(&app, &admin, "6N", 6, 2).await;
    let term_id = term(&app, &admin).await;

    let exam = app
        .create(
            "/api/v1/exams",
            &admin,
            "exam",
            json!({
                "termId": term_id,
                "classId": room.class_id,
                "subjectId": room.subject_id,
                "title": "Fractions",
                "examDate": "2024-10-10",
                "startTime": "09:00",
                "endTime": "10:00",
                "totalMarks": 40.0,
                "passingMarks": 20.0
            }),
        )
        .await;
    app.post(
        &format!("/api/v1/exams/{}/results", exam["id"].as_str().unwrap()),
        &admin,
        json!({ "results": [
            { "studentId": room.student_ids[0], "marksObtained": 36.0 },
            { "studentId": room.student_ids[1], "marksObtained": 10.0 }
        ] }),
    )
    .await;

    let (status, body) = app
        .get(
            &format!("/api/v1/analytics/students/{}", room.student_ids[0]),
            &admin,
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["analytics"]["average_percentage"], 90.0);
    assert_eq!(body["analytics"]["exam_results"], 1);
    assert_eq!(body["analytics"]["subjects"].as_array().unwrap().len(), 1);

    let (status, body) = app
        .get(&format!("/api/v1/analytics/classes/{}", room.class_id), &admin)
        .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["analytics"]["enrolment"], 2);
    assert_eq!(body["analytics"]["average_percentage"], 57.5);
    let struggling = body["analytics"]["struggling_students"].as_array().unwrap();
    assert!(struggling
        .iter()
        .any(|s| s["student_id"] == room.student_ids[1].as_str()));

    let (status, _) = app
        .get(
            &format!("/api/v1/analytics/students/{}", uuid::Uuid::new_v4()),
            &admin,
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_dashboard_counts_follow_caller_scope() {
    let app = TestApp::new().await;
    let school = app.school("DSH").await;
    let other_school = app.school("DSX").await;
    let admin = app.admin(&school).await;
    let other_admin = app.admin(&other_school).await;
    classroom(&app, &admin, "1D", 1, 3).await;
    classroom(&app, &other_admin, "1X", 1, 5).await;
    app.teacher(&school, "t@dsh.test").await;
    let (_, parent_token) = app.parent(&school, "p@dsh.test").await;

    let (status, body) = app.get("/api/v1/dashboard", &admin).await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    let counts = &body["dashboard"]["counts"];
    assert_eq!(counts["students"], 3);
    assert_eq!(counts["teachers"], 1);
    assert_eq!(counts["classes"], 1);
    assert_eq!(counts["subjects"], 1);
    assert_eq!(body["dashboard"]["role"], "school_admin");

    // A parent without linked children sees an empty snapshot.
    let (status, body) = app.get("/api/v1/dashboard", &parent_token).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["dashboard"]["counts"]["students"], 0);
    assert_eq!(body["dashboard"]["attendance"]["attendance_rate"], "0.00");
}
