use axum::http::StatusCode;
use serde_json::json;

use classroom_api::models::user::UserRole;

mod common;

fn criteria() -> serde_json::Value {
    json!({
        "attendance": 20,
        "participation": 20,
        "assignments": 30,
        "finalProject": 30,
    })
}

#[tokio::test]
async fn test_health_is_public() {
    let app = common::spawn_app();

    let (status, body) = app.request("GET", "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["dependencies"]["store"]["backend"], "memory");
    assert_eq!(body["dependencies"]["whatsapp"]["configured"], false);
}

#[tokio::test]
async fn test_api_requires_valid_token() {
    let app = common::spawn_app();

    let (status, _) = app.request("GET", "/api/v1/programs", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app
        .request("GET", "/api/v1/programs", Some("not-a-jwt"), None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let student = common::token("s1", "student");
    let (status, _) = app
        .request("GET", "/api/v1/programs", Some(&student), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_program_crud_and_delete_guard() {
    let app = common::spawn_app();

    let (status, program) = app
        .admin(
            "POST",
            "/api/v1/programs",
            Some(json!({ "name": "Secundaria", "description": "Ciclo básico" })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let program_id = program["_id"].as_str().unwrap().to_string();
    assert_eq!(program["isActive"], true);

    let (status, updated) = app
        .admin(
            "PATCH",
            &format!("/api/v1/programs/{}", program_id),
            Some(json!({ "name": "Secundaria 2025" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["name"], "Secundaria 2025");

    let (status, classroom) = app
        .admin(
            "POST",
            "/api/v1/classrooms",
            Some(json!({
                "programId": program_id,
                "name": "Historia",
                "evaluationCriteria": criteria(),
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let classroom_id = classroom["_id"].as_str().unwrap().to_string();

    let (status, body) = app
        .admin("DELETE", &format!("/api/v1/programs/{}", program_id), None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["message"].as_str().unwrap().contains("classroom"));

    let (status, _) = app
        .admin("DELETE", &format!("/api/v1/classrooms/{}", classroom_id), None)
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = app
        .admin("DELETE", &format!("/api/v1/programs/{}", program_id), None)
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, body) = app
        .admin("GET", &format!("/api/v1/programs/{}", program_id), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["status"], 404);
}

#[tokio::test]
async fn test_classroom_creation_validates_criteria_and_program() {
    let app = common::spawn_app();
    let program = app.seed_program("Primaria").await;

    let (status, body) = app
        .admin(
            "POST",
            "/api/v1/classrooms",
            Some(json!({
                "programId": program.id,
                "name": "Ciencias",
                "evaluationCriteria": { "attendance": 50, "assignments": 30 },
            })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["message"]
        .as_str()
        .unwrap()
        .contains("deben sumar 100 puntos (actual: 80)"));

    let (status, _) = app
        .admin(
            "POST",
            "/api/v1/classrooms",
            Some(json!({
                "programId": "missing",
                "name": "Ciencias",
                "evaluationCriteria": criteria(),
            })),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, classroom) = app
        .admin(
            "POST",
            "/api/v1/classrooms",
            Some(json!({
                "programId": program.id,
                "name": "Ciencias",
                "evaluationCriteria": criteria(),
                "modules": [
                    { "name": "Células", "weekNumber": 2 },
                    { "name": "Átomos", "weekNumber": 1 },
                ],
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(classroom["isActive"], true);
    assert_eq!(classroom["modules"][0]["name"], "Átomos");
    assert_eq!(classroom["currentModule"], classroom["modules"][0]["id"]);
    assert!(classroom.get("endDate").is_none());

    let (status, program) = app
        .admin("GET", &format!("/api/v1/programs/{}", program.id), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(program["classroomIds"], json!([classroom["_id"]]));
}

#[tokio::test]
async fn test_enrollment_and_teacher_assignment() {
    let app = common::spawn_app();
    let program = app.seed_program("Primaria").await;
    let classroom = app.seed_classroom(&program.id, None, 1).await;
    let student = app.seed_user("Diego", UserRole::Student, None).await;
    let teacher = app.seed_user("Marta", UserRole::Teacher, None).await;
    let replacement = app.seed_user("Luis", UserRole::Teacher, None).await;

    let uri = format!("/api/v1/classrooms/{}/students/{}", classroom.id, student.id);
    let (status, body) = app.admin("POST", &uri, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["studentIds"], json!([student.id]));

    // Enrolling twice keeps a single entry
    app.admin("POST", &uri, None).await;
    assert_eq!(app.classroom(&classroom.id).await.student_ids.len(), 1);
    assert_eq!(app.user(&student.id).await.enrolled_classrooms, vec![classroom.id.clone()]);

    let (status, _) = app
        .admin(
            "PUT",
            &format!("/api/v1/classrooms/{}/teacher", classroom.id),
            Some(json!({ "teacherId": student.id })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    for teacher_id in [&teacher.id, &replacement.id] {
        let (status, body) = app
            .admin(
                "PUT",
                &format!("/api/v1/classrooms/{}/teacher", classroom.id),
                Some(json!({ "teacherId": teacher_id })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["teacherId"], json!(teacher_id));
    }
    assert!(app.user(&teacher.id).await.teaching_classrooms.is_empty());
    assert_eq!(
        app.user(&replacement.id).await.teaching_classrooms,
        vec![classroom.id.clone()]
    );

    let (status, _) = app.admin("DELETE", &uri, None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, body) = app.admin("DELETE", &uri, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["message"], "Student not found in classroom");
    assert!(app.user(&student.id).await.enrolled_classrooms.is_empty());
}

#[tokio::test]
async fn test_user_directory() {
    let app = common::spawn_app();

    let (status, created) = app
        .admin(
            "POST",
            "/api/v1/users",
            Some(json!({ "name": "Elena", "email": "elena@test.com", "role": "teacher" })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["isTeacher"], true);
    let user_id = created["_id"].as_str().unwrap().to_string();

    let (status, _) = app
        .admin(
            "POST",
            "/api/v1/users",
            Some(json!({ "name": "Elena 2", "email": "elena@test.com" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .admin(
            "POST",
            "/api/v1/users",
            Some(json!({ "name": "Sin correo", "email": "not-an-email" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, teachers) = app.admin("GET", "/api/v1/users?isTeacher=true", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(teachers.as_array().unwrap().len(), 1);

    let program = app.seed_program("Primaria").await;
    let classroom = app.seed_classroom(&program.id, Some(&user_id), 1).await;

    let flag_uri = format!("/api/v1/users/{}/teacher-flag", user_id);
    let (status, _) = app
        .admin("PUT", &flag_uri, Some(json!({ "isTeacher": false })))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .admin("DELETE", &format!("/api/v1/users/{}", user_id), None)
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert!(app.classroom(&classroom.id).await.teacher_id.is_none());

    let (status, _) = app
        .admin("GET", &format!("/api/v1/users/{}", user_id), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_module_completion_moves_current_module() {
    let app = common::spawn_app();
    let program = app.seed_program("Primaria").await;
    let teacher = app.seed_user("Marta", UserRole::Teacher, None).await;
    let classroom = app.seed_classroom(&program.id, Some(&teacher.id), 3).await;
    let teacher_token = common::token(&teacher.id, "teacher");
    let modules = classroom.modules_by_week();

    let completion_uri =
        |module_id: &str| format!("/api/v1/classrooms/{}/modules/{}/completion", classroom.id, module_id);

    let (status, body) = app
        .request(
            "PUT",
            &completion_uri(&modules[0].id),
            Some(&teacher_token),
            Some(json!({ "isCompleted": true })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["currentModule"], json!(modules[1].id));

    for module in &modules[1..] {
        app.complete_module(&classroom.id, &module.id).await;
    }
    let updated = app.classroom(&classroom.id).await;
    assert_eq!(updated.current_module.as_deref(), Some(modules[2].id.as_str()));

    let (status, body) = app
        .request(
            "PUT",
            &completion_uri("missing"),
            Some(&teacher_token),
            Some(json!({ "isCompleted": true })),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["message"], "Module not found");
}

#[tokio::test]
async fn test_evaluations_attendance_and_participation() {
    let app = common::spawn_app();
    let program = app.seed_program("Primaria").await;
    let teacher = app.seed_user("Marta", UserRole::Teacher, None).await;
    let classroom = app.seed_classroom(&program.id, Some(&teacher.id), 1).await;
    let student = app.seed_user("Diego", UserRole::Student, None).await;
    let outsider = app.seed_user("Irene", UserRole::Student, None).await;
    app.enroll(&classroom.id, &student.id).await;
    let teacher_token = common::token(&teacher.id, "teacher");

    let evaluation_uri = format!("/api/v1/classrooms/{}/evaluations/{}", classroom.id, student.id);
    let (status, body) = app
        .request(
            "PUT",
            &evaluation_uri,
            Some(&teacher_token),
            Some(json!({
                "attendancePoints": 18,
                "participationPoints": 15,
                "assignmentsPoints": 25,
                "finalProjectPoints": 20,
                "comments": "Buen trabajo",
            })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["totalPoints"], 78.0);
    assert_eq!(body["percentage"], 78.0);
    assert_eq!(body["status"], "evaluated");
    assert_eq!(body["evaluatedBy"], json!(teacher.id));

    // Saving again replaces the evaluation and drops cleared fields
    let (status, body) = app
        .request(
            "PUT",
            &evaluation_uri,
            Some(&teacher_token),
            Some(json!({ "assignmentsPoints": 30, "status": "in_progress" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["totalPoints"], 30.0);
    assert_eq!(body["status"], "in_progress");
    assert!(body.get("comments").is_none());

    let (status, body) = app
        .request(
            "PUT",
            &evaluation_uri,
            Some(&teacher_token),
            Some(json!({ "attendancePoints": 25 })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["message"].as_str().unwrap().contains("between 0 and 20"));

    let (status, _) = app
        .request(
            "PUT",
            &evaluation_uri,
            Some(&teacher_token),
            Some(json!({ "customPoints": { "Quiz": 5 } })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = app
        .request(
            "GET",
            &format!("/api/v1/classrooms/{}/evaluations", classroom.id),
            Some(&teacher_token),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 1);

    let (status, _) = app
        .request(
            "GET",
            &format!("/api/v1/classrooms/{}/evaluations/{}", classroom.id, outsider.id),
            Some(&teacher_token),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let attendance_uri = format!("/api/v1/classrooms/{}/attendance", classroom.id);
    let (status, _) = app
        .request(
            "POST",
            &attendance_uri,
            Some(&teacher_token),
            Some(json!({ "studentId": student.id, "status": "present" })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, _) = app
        .request(
            "POST",
            &attendance_uri,
            Some(&teacher_token),
            Some(json!({ "studentId": outsider.id, "status": "present" })),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = app
        .request(
            "GET",
            &format!("{}?studentId={}", attendance_uri, student.id),
            Some(&teacher_token),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 1);

    let participation_uri = format!("/api/v1/classrooms/{}/participation", classroom.id);
    let (status, body) = app
        .request(
            "POST",
            &participation_uri,
            Some(&teacher_token),
            Some(json!({ "studentId": student.id, "points": 3.5 })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["points"], 3.5);

    let (status, _) = app
        .request(
            "POST",
            &participation_uri,
            Some(&teacher_token),
            Some(json!({ "studentId": student.id, "points": 150 })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
