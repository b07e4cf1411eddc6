//! Resource workflows: calendar, timetable, assessments, shop and inbox.

use super::common::{classroom, term, TestApp};
use axum::http::StatusCode;
use serde_json::json;

#[tokio::test]
async fn test_overlapping_active_terms_conflict() {
    let app = TestApp::new().await;
    let school = app.school("CAL").await;
    let admin = app.admin(&school).await;

    let year = app
        .create(
            "/api/v1/academic-calendar/years",
            &admin,
            "academicYear",
            json!({ "name": "2024/25", "startDate": "2024-09-01", "endDate": "2025-08-31" }),
        )
        .await;
    app.create(
        "/api/v1/academic-calendar/terms",
        &admin,
        "term",
        json!({
            "academicYearId": year["id"],
            "name": "Autumn",
            "startDate": "2024-09-01",
            "endDate": "2024-12-20"
        }),
    )
    .await;

    let (status, body) = app
        .post(
            "/api/v1/academic-calendar/terms",
            &admin,
            json!({
                "academicYearId": year["id"],
                "name": "Overlap",
                "startDate": "2024-12-01",
                "endDate": "2025-03-31"
            }),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["message"].as_str().unwrap().contains("Autumn"));

    let (status, _) = app
        .post(
            "/api/v1/academic-calendar/terms",
            &admin,
            json!({
                "academicYearId": year["id"],
                "name": "Spring",
                "startDate": "2025-01-06",
                "endDate": "2025-03-31"
            }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = app
        .post(
            "/api/v1/academic-calendar/terms",
            &admin,
            json!({
                "academicYearId": year["id"],
                "name": "Outside",
                "startDate": "2025-08-01",
                "endDate": "2025-09-30"
            }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn test_calendar_dates_must_be_ordered() {
    let app = TestApp::new().await;
    let school = app.school("ORD").await;
    let admin = app.admin(&school).await;

    let (status, body) = app
        .post(
            "/api/v1/academic-calendar/years",
            &admin,
            json!({ "name": "Backwards", "startDate": "2025-08-31", "endDate": "2024-09-01" }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["errors"][0]["field"], "endDate");
}

#[tokio::test]
async fn test_subject_with_assignments_cannot_be_deleted() {
    let app = TestApp::new().await;
    let school = app.school("DEP").await;
    let admin = app.admin(&school).await;
    let room = classroom(&app, &admin, "8A", 8, 0).await;

    for n in 1..=3 {
        app.create(
            "/api/v1/assignments",
            &admin,
            "assignment",
            json!({
                "classId": room.class_id,
                "subjectId": room.subject_id,
                "title": format!("Worksheet {}", n),
                "dueDate": "2024-10-01",
                "maxScore": 20.0
            }),
        )
        .await;
    }

    let uri = format!("/api/v1/subjects/{}", room.subject_id);
    let (status, body) = app.delete(&uri, &admin).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "DEPENDENTS_EXIST");
    assert_eq!(
        body["dependents"],
        json!({ "lessons": 0, "assignments": 3, "examQuestions": 0 })
    );

    let (status, _) = app.get(&uri, &admin).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_empty_subject_is_deleted() {
    let app = TestApp::new().await;
    let school = app.school("DEL").await;
    let admin = app.admin(&school).await;
    let subject = app
        .create(
            "/api/v1/subjects",
            &admin,
            "subject",
            json!({ "name": "Latin", "code": "LAT" }),
        )
        .await;
    let uri = format!("/api/v1/subjects/{}", subject["id"].as_str().unwrap());

    let (status, _) = app.delete(&uri, &admin).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = app.get(&uri, &admin).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_timetable_slots_do_not_overlap() {
    let app = TestApp::new().await;
    let school = app.school("TTB").await;
    let admin = app.admin(&school).await;
    let first = classroom(&app, &admin, "9A", 9, 0).await;
    let second = classroom(&app, &admin, "9B", 10, 0).await;
    let (teacher, _) = app.teacher(&school, "t@ttb.test").await;
    let (other, _) = app.teacher(&school, "o@ttb.test").await;

    let lesson = |class_id: &str, subject_id: &str, teacher_id, day, start, end| {
        json!({
            "classId": class_id,
            "subjectId": subject_id,
            "teacherId": teacher_id,
            "dayOfWeek": day,
            "startTime": start,
            "endTime": end
        })
    };

    app.create(
        "/api/v1/timetables",
        &admin,
        "timetable",
        lesson(&first.class_id, &first.subject_id, teacher.id, 1, "08:00", "09:00"),
    )
    .await;

    // Touching boundaries collide for the same class.
    let (status, body) = app
        .post(
            "/api/v1/timetables",
            &admin,
            lesson(&first.class_id, &first.subject_id, other.id, 1, "09:00", "10:00"),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["message"].as_str().unwrap().starts_with("Class"));

    // The same teacher cannot be in two rooms.
    let (status, body) = app
        .post(
            "/api/v1/timetables",
            &admin,
            lesson(&second.class_id, &second.subject_id, teacher.id, 1, "08:30", "09:30"),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["message"].as_str().unwrap().starts_with("Teacher"));

    let (status, _) = app
        .post(
            "/api/v1/timetables",
            &admin,
            lesson(&second.class_id, &second.subject_id, teacher.id, 2, "08:30", "09:30"),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = app
        .post(
            "/api/v1/timetables",
            &admin,
            lesson(&second.class_id, &second.subject_id, other.id, 8, "08:00", "09:00"),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["errors"][0]["field"], "dayOfWeek");

    let (_, body) = app
        .get(&format!("/api/v1/timetables?teacherId={}", teacher.id), &admin)
        .await;
    assert_eq!(body["timetables"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_class_capacity_and_admission_numbers() {
    let app = TestApp::new().await;
    let school = app.school("ADM").await;
    let admin = app.admin(&school).await;
    let grade = app
        .create(
            "/api/v1/grades",
            &admin,
            "grade",
            json!({ "level": 1, "name": "Grade 1" }),
        )
        .await;
    let class = app
        .create(
            "/api/v1/classes",
            &admin,
            "class",
            json!({ "gradeId": grade["id"], "name": "1A", "capacity": 1 }),
        )
        .await;

    let student = |admission_no: &str, class_id: Option<&serde_json::Value>| {
        json!({
            "classId": class_id,
            "firstName": "Kit",
            "lastName": "Pupil",
            "admissionNo": admission_no
        })
    };

    app.create(
        "/api/v1/students",
        &admin,
        "student",
        student("A-1", Some(&class["id"])),
    )
    .await;

    let (status, body) = app
        .post("/api/v1/students", &admin, student("A-2", Some(&class["id"])))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["message"].as_str().unwrap().contains("1A"));

    let (status, _) = app.post("/api/v1/students", &admin, student("A-1", None)).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = app
        .post(
            "/api/v1/grades",
            &admin,
            json!({ "level": 1, "name": "Again" }),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_exam_results_are_validated() {
    let app = TestApp::new().await;
    let school = app.school("RES").await;
    let admin = app.admin(&school).await;
    let room = classroom(&app, &admin, "10A", 11, 2).await;
    let elsewhere = classroom(&app, &admin, "10B", 12, 1).await;
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
                "title": "Algebra test",
                "examDate": "2024-10-15",
                "startTime": "09:00",
                "endTime": "10:00",
                "totalMarks": 50.0,
                "passingMarks": 25.0
            }),
        )
        .await;
    let uri = format!("/api/v1/exams/{}/results", exam["id"].as_str().unwrap());

    let (status, body) = app
        .post(
            &uri,
            &admin,
            json!({ "results": [{ "studentId": room.student_ids[0], "marksObtained": 51.0 }] }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["errors"][0]["field"], "results[0].marksObtained");

    let (status, body) = app
        .post(
            &uri,
            &admin,
            json!({ "results": [{ "studentId": elsewhere.student_ids[0], "marksObtained": 10.0 }] }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["errors"][0]["code"], "not_in_class");

    let (status, body) = app
        .post(
            &uri,
            &admin,
            json!({ "results": [
                { "studentId": room.student_ids[0], "marksObtained": 40.0 },
                { "studentId": room.student_ids[1], "marksObtained": 20.0 }
            ] }),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{}", body);

    // Recording again replaces the mark.
    let (status, _) = app
        .post(
            &uri,
            &admin,
            json!({ "results": [{ "studentId": room.student_ids[1], "marksObtained": 30.0 }] }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (_, body) = app.get(&uri, &admin).await;
    let results = body["results"].as_array().unwrap();
    assert_eq!(results.len(), 2);
    assert!(results.iter().any(|r| r["marksObtained"] == 30.0));
}

#[tokio::test]
async fn test_exam_sessions_are_checked() {
    let app = TestApp::new().await;
    let school = app.school("EXT").await;
    let admin = app.admin(&school).await;
    let room = classroom(&app, &admin, "2A", 2, 0).await;
    let term_id = term(&app, &admin).await;

    let exam = |date: &str, passing: f64| {
        json!({
            "termId": term_id,
            "classId": room.class_id,
            "subjectId": room.subject_id,
            "title": "Spelling",
            "examDate": date,
            "startTime": "09:00",
            "endTime": "10:00",
            "totalMarks": 50.0,
            "passingMarks": passing
        })
    };

    let (status, body) = app.post("/api/v1/exams", &admin, exam("2025-03-10", 60.0)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["errors"][0]["field"], "passingMarks");

    let (status, body) = app.post("/api/v1/exams", &admin, exam("2025-07-15", 25.0)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["errors"][0]["field"], "examDate");

    app.create("/api/v1/exams", &admin, "exam", exam("2025-03-10", 25.0))
        .await;
    let (status, _) = app.post("/api/v1/exams", &admin, exam("2025-03-10", 20.0)).await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_order_approval_takes_stock_and_notifies_parent() {
    let app = TestApp::new().await;
    let school = app.school("SHOP").await;
    let admin = app.admin(&school).await;
    let room = classroom(&app, &admin, "5C", 5, 1).await;
    let (parent, parent_token) = app.parent(&school, "buyer@shop.test").await;
    app.post(
        &format!("/api/v1/students/{}/guardians", room.student_ids[0]),
        &admin,
        json!({ "parentId": parent.id, "relationship": "father" }),
    )
    .await;

    let material = app
        .create(
            "/api/v1/materials",
            &admin,
            "material",
            json!({ "name": "Uniform", "price": 25.5, "stock": 2 }),
        )
        .await;
    let order = |quantity: i64| {
        json!({
            "materialId": material["id"],
            "studentId": room.student_ids[0],
            "quantity": quantity
        })
    };

    let too_many = app
        .create("/api/v1/materials/orders", &parent_token, "order", order(3))
        .await;
    assert_eq!(too_many["status"], "pending");
    let (status, _) = app
        .put(
            &format!("/api/v1/materials/orders/{}/status", too_many["id"].as_str().unwrap()),
            &admin,
            json!({ "status": "approved" }),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let fits = app
        .create("/api/v1/materials/orders", &parent_token, "order", order(2))
        .await;
    let status_uri = format!(
        "/api/v1/materials/orders/{}/status",
        fits["id"].as_str().unwrap()
    );
    let (status, body) = app
        .put(&status_uri, &admin, json!({ "status": "approved" }))
        .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["order"]["status"], "approved");

    let (_, body) = app
        .get(
            &format!("/api/v1/materials/{}", material["id"].as_str().unwrap()),
            &admin,
        )
        .await;
    assert_eq!(body["material"]["stock"], 0);

    let (status, _) = app
        .put(&status_uri, &admin, json!({ "status": "pending" }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, body) = app.get("/api/v1/notifications/unread-count", &parent_token).await;
    assert_eq!(body["count"], 1);
}

#[tokio::test]
async fn test_parent_cannot_order_for_other_children() {
    let app = TestApp::new().await;
    let school = app.school("SHP").await;
    let admin = app.admin(&school).await;
    let room = classroom(&app, &admin, "6B", 6, 1).await;
    let (_, token) = app.parent(&school, "stranger@shp.test").await;
    let material = app
        .create(
            "/api/v1/materials",
            &admin,
            "material",
            json!({ "name": "Atlas", "price": 12.0, "stock": 10 }),
        )
        .await;

    let (status, _) = app
        .post(
            "/api/v1/materials/orders",
            &token,
            json!({
                "materialId": material["id"],
                "studentId": room.student_ids[0],
                "quantity": 1
            }),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_report_card_publication() {
    let app = TestApp::new().await;
    let school = app.school("RPT").await;
    let admin = app.admin(&school).await;
    let room = classroom(&app, &admin, "11A", 13, 1).await;
    let term_id = term(&app, &admin).await;
    let student_id = room.student_ids[0].clone();
    let (parent, parent_token) = app.parent(&school, "mum@rpt.test").await;
    app.post(
        &format!("/api/v1/students/{}/guardians", student_id),
        &admin,
        json!({ "parentId": parent.id, "relationship": "mother" }),
    )
    .await;

    let exam = app
        .create(
            "/api/v1/exams",
            &admin,
            "exam",
            json!({
                "termId": term_id,
                "classId": room.class_id,
                "subjectId": room.subject_id,
                "title": "Final",
                "examDate": "2025-06-02",
                "startTime": "09:00",
                "endTime": "11:00",
                "totalMarks": 100.0,
                "passingMarks": 40.0
            }),
        )
        .await;
    app.post(
        &format!("/api/v1/exams/{}/results", exam["id"].as_str().unwrap()),
        &admin,
        json!({ "results": [{ "studentId": student_id, "marksObtained": 80.0 }] }),
    )
    .await;

    let card = app
        .create(
            "/api/v1/report-cards/generate",
            &admin,
            "reportCard",
            json!({ "studentId": student_id, "termId": term_id, "remarks": "Steady work" }),
        )
        .await;
    assert_eq!(card["status"], "draft");
    assert_eq!(card["averagePercentage"], 80.0);
    assert_eq!(card["attendanceRate"], "0.00");
    let card_uri = format!("/api/v1/report-cards/{}", card["id"].as_str().unwrap());

    // Guardians do not see drafts.
    let (status, _) = app.get(&card_uri, &parent_token).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = app
        .post(&format!("{}/publish", card_uri), &admin, json!({}))
        .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["reportCard"]["status"], "published");

    let (status, _) = app
        .post(&format!("{}/publish", card_uri), &admin, json!({}))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app.get(&card_uri, &parent_token).await;
    assert_eq!(status, StatusCode::OK);
    let (_, body) = app.get("/api/v1/notifications", &parent_token).await;
    assert_eq!(body["notifications"][0]["category"], "report_card");

    let (status, body) = app.delete(&card_uri, &admin).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Published report cards cannot be deleted");
}

#[tokio::test]
async fn test_new_assignment_reaches_class_guardians() {
    let app = TestApp::new().await;
    let school = app.school("HWK").await;
    let admin = app.admin(&school).await;
    let room = classroom(&app, &admin, "4C", 4, 2).await;
    let other_room = classroom(&app, &admin, "4D", 5, 1).await;
    let (teacher, teacher_token) = app.teacher(&school, "t@hwk.test").await;
    let (first, first_token) = app.parent(&school, "one@hwk.test").await;
    let (second, second_token) = app.parent(&school, "two@hwk.test").await;
    let (outsider, outsider_token) = app.parent(&school, "three@hwk.test").await;

    for (student, parent) in [
        (&room.student_ids[0], first.id),
        (&room.student_ids[1], second.id),
        (&other_room.student_ids[0], outsider.id),
    ] {
        app.post(
            &format!("/api/v1/students/{}/guardians", student),
            &admin,
            json!({ "parentId": parent, "relationship": "guardian" }),
        )
        .await;
    }
    app.create(
        "/api/v1/timetables",
        &admin,
        "timetable",
        json!({
            "classId": room.class_id,
            "subjectId": room.subject_id,
            "teacherId": teacher.id,
            "dayOfWeek": 3,
            "startTime": "10:00",
            "endTime": "11:00"
        }),
    )
    .await;

    let assignment = app
        .create(
            "/api/v1/assignments",
            &teacher_token,
            "assignment",
            json!({
                "classId": room.class_id,
                "subjectId": room.subject_id,
                "title": "Book report",
                "dueDate": "2024-11-30",
                "maxScore": 10.0
            }),
        )
        .await;
    assert_eq!(assignment["teacherId"], teacher.id.to_string());

    for token in [&first_token, &second_token] {
        let (_, body) = app.get("/api/v1/notifications/unread-count", token).await;
        assert_eq!(body["count"], 1);
    }
    let (_, body) = app
        .get("/api/v1/notifications/unread-count", &outsider_token)
        .await;
    assert_eq!(body["count"], 0);

    // A guardian hands in work for their child; the teacher grades it.
    let submissions = format!(
        "/api/v1/assignments/{}/submissions",
        assignment["id"].as_str().unwrap()
    );
    let submission = app
        .create(
            &submissions,
            &first_token,
            "submission",
            json!({ "studentId": room.student_ids[0], "content": "Done" }),
        )
        .await;
    let (status, _) = app
        .post(
            &submissions,
            &first_token,
            json!({ "studentId": room.student_ids[1] }),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let grade_uri = format!(
        "{}/{}/grade",
        submissions,
        submission["id"].as_str().unwrap()
    );
    let (status, _) = app
        .put(&grade_uri, &teacher_token, json!({ "score": 11.0 }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, body) = app
        .put(&grade_uri, &teacher_token, json!({ "score": 9.5, "feedback": "Good" }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["submission"]["score"], 9.5);
}

#[tokio::test]
async fn test_inbox_read_state() {
    let app = TestApp::new().await;
    let school = app.school("INB").await;
    let admin = app.admin(&school).await;
    let (_, teacher_token) = app.teacher(&school, "t@inb.test").await;

    let (status, body) = app
        .post(
            "/api/v1/notifications/broadcast",
            &admin,
            json!({ "title": "Closure", "body": "Snow day", "roles": ["teacher"] }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["recipients"], 1);

    let (_, body) = app.get("/api/v1/notifications", &teacher_token).await;
    let id = body["notifications"][0]["id"].as_str().unwrap().to_string();

    let (status, _) = app
        .post(&format!("/api/v1/notifications/{}/read", id), &teacher_token, json!({}))
        .await;
    assert_eq!(status, StatusCode::OK);
    let (_, body) = app
        .get("/api/v1/notifications/unread-count", &teacher_token)
        .await;
    assert_eq!(body["count"], 0);

    // Another user's notification is invisible.
    let (status, _) = app
        .post(&format!("/api/v1/notifications/{}/read", id), &admin, json!({}))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_event_window_must_be_ordered() {
    let app = TestApp::new().await;
    let school = app.school("EVT").await;
    let admin = app.admin(&school).await;
    let room = classroom(&app, &admin, "1E", 1, 1).await;
    let (parent, parent_token) = app.parent(&school, "p@evt.test").await;
    app.post(
        &format!("/api/v1/students/{}/guardians", room.student_ids[0]),
        &admin,
        json!({ "parentId": parent.id, "relationship": "mother" }),
    )
    .await;

    let (status, body) = app
        .post(
            "/api/v1/events",
            &admin,
            json!({
                "title": "Sports day",
                "startAt": "2024-06-01T10:00:00Z",
                "endAt": "2024-06-01T09:00:00Z"
            }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["errors"][0]["field"], "endAt");

    app.create(
        "/api/v1/events",
        &admin,
        "event",
        json!({
            "title": "Sports day",
            "startAt": "2024-06-01T10:00:00Z",
            "endAt": "2024-06-01T15:00:00Z"
        }),
    )
    .await;

    let (_, body) = app.get("/api/v1/notifications/unread-count", &parent_token).await;
    assert_eq!(body["count"], 1);
    let (_, body) = app.get("/api/v1/events", &parent_token).await;
    assert_eq!(body["events"].as_array().unwrap().len(), 1);
}
