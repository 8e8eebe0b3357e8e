use axum::http::StatusCode;
use serde_json::json;

use classroom_api::{
    models::{
        collections,
        evaluation::{AttendanceStatus, RecordAttendanceRequest, RecordParticipationRequest},
        lifecycle::FinalizeOptions,
        user::{CompletionStatus, UserRole},
    },
    services::{
        evaluation_service::EvaluationService, finalization_service::FinalizationService,
        restart_service::RestartService, run_history_service::RunHistoryService,
    },
};

mod common;

use common::TestApp;

struct Finalized {
    classroom_id: String,
    teacher_id: String,
    passing_id: String,
    failing_id: String,
}

/// Finalized classroom whose students scored 85 and 60, with some attendance
/// and participation on record.
async fn seed_finalized(app: &TestApp) -> Finalized {
    let program = app.seed_program("Bachillerato").await;
    let teacher = app.seed_user("Teresa", UserRole::Teacher, None).await;
    let classroom = app.seed_classroom(&program.id, Some(&teacher.id), 2).await;
    let passing = app.seed_user("Ana", UserRole::Student, None).await;
    let failing = app.seed_user("Bruno", UserRole::Student, None).await;
    app.enroll(&classroom.id, &passing.id).await;
    app.enroll(&classroom.id, &failing.id).await;

    for module in &classroom.modules {
        app.complete_module(&classroom.id, &module.id).await;
    }

    let evaluations = EvaluationService::new(app.shared());
    for status in [AttendanceStatus::Present, AttendanceStatus::Absent] {
        evaluations
            .record_attendance(
                &classroom.id,
                RecordAttendanceRequest {
                    student_id: passing.id.clone(),
                    module_id: None,
                    date: None,
                    status,
                },
            )
            .await
            .unwrap();
    }
    evaluations
        .record_participation(
            &classroom.id,
            RecordParticipationRequest {
                student_id: passing.id.clone(),
                module_id: None,
                points: 4.0,
                note: Some("Exposición".to_string()),
            },
        )
        .await
        .unwrap();

    app.grade(&classroom.id, &passing.id, 85.0).await;
    app.grade(&classroom.id, &failing.id, 60.0).await;

    let result = FinalizationService::new(app.shared())
        .finalize(&classroom.id, Some("admin-1"), &FinalizeOptions::default())
        .await;
    assert!(result.success, "errors: {:?}", result.errors);

    Finalized {
        classroom_id: classroom.id,
        teacher_id: teacher.id,
        passing_id: passing.id,
        failing_id: failing.id,
    }
}

fn restarts(app: &TestApp) -> RestartService {
    RestartService::new(app.shared())
}

#[tokio::test]
async fn test_restart_rejects_active_classroom() {
    let app = common::spawn_app();
    let program = app.seed_program("Primaria").await;
    let classroom = app.seed_classroom(&program.id, None, 1).await;

    let report = restarts(&app).validate_restart(&classroom.id).await;
    assert!(!report.is_valid);
    assert_eq!(
        report.errors,
        vec![
            "La clase debe estar finalizada antes de reiniciarla".to_string(),
            "La clase no tiene fecha de finalización".to_string(),
        ]
    );

    let result = restarts(&app).restart(&classroom.id, "admin-1", None).await;
    assert!(!result.success);
    assert!(result.run_id.is_none());
    assert!(app.classroom(&classroom.id).await.is_active);

    let missing = restarts(&app).validate_restart("missing").await;
    assert_eq!(missing.errors, vec!["Clase no encontrada".to_string()]);
}

#[tokio::test]
async fn test_restart_archives_run_and_resets_classroom() {
    let app = common::spawn_app();
    let finalized = seed_finalized(&app).await;
    let before = app.classroom(&finalized.classroom_id).await;

    let result = restarts(&app)
        .restart(
            &finalized.classroom_id,
            "admin-1",
            Some("Segundo semestre".to_string()),
        )
        .await;
    assert!(result.success, "errors: {:?}", result.errors);
    assert_eq!(result.run_number, Some(1));

    let run = RunHistoryService::new(app.shared())
        .get_run(result.run_id.as_deref().unwrap())
        .await
        .unwrap();
    assert_eq!(run.run_number, 1);
    assert_eq!(run.total_students, 2);
    assert_eq!(run.program_name, "Bachillerato");
    assert_eq!(run.teacher_name, "Teresa");
    assert_eq!(run.created_by, "admin-1");
    assert_eq!(run.notes.as_deref(), Some("Segundo semestre"));
    assert_eq!(run.end_date, before.end_date);
    assert_eq!(run.modules, before.modules);

    let stats = &run.statistics;
    assert_eq!(stats.pass_rate, 50.0);
    assert_eq!(stats.average_grade, 72.5);
    assert_eq!(stats.highest_grade, 85.0);
    assert_eq!(stats.lowest_grade, 60.0);
    assert_eq!(stats.distribution.excellent, 0);
    assert_eq!(stats.distribution.good, 1);
    assert_eq!(stats.distribution.regular, 0);
    assert_eq!(stats.distribution.poor, 1);
    assert_eq!(stats.total_participation_points, 4.0);

    let passing = run
        .students
        .iter()
        .find(|s| s.student_id == finalized.passing_id)
        .unwrap();
    assert_eq!(passing.final_grade, Some(85.0));
    assert_eq!(passing.status, CompletionStatus::Completed);
    assert_eq!(passing.attendance_rate, 50.0);
    assert_eq!(passing.participation_points, 4.0);

    let failing = run
        .students
        .iter()
        .find(|s| s.student_id == finalized.failing_id)
        .unwrap();
    assert_eq!(failing.status, CompletionStatus::Failed);

    let classroom = app.classroom(&finalized.classroom_id).await;
    assert!(classroom.is_active);
    assert!(classroom.end_date.is_none());
    assert!(classroom.student_ids.is_empty());
    assert!(classroom.modules.iter().all(|m| !m.is_completed));
    assert_eq!(
        classroom.current_module.as_deref(),
        Some(classroom.modules_by_week()[0].id.as_str())
    );
    assert!(classroom.start_date > before.start_date);
    assert_eq!(classroom.teacher_id.as_deref(), Some(finalized.teacher_id.as_str()));
}

#[tokio::test]
async fn test_second_run_leaves_first_untouched() {
    let app = common::spawn_app();
    let finalized = seed_finalized(&app).await;
    let history = RunHistoryService::new(app.shared());

    let first = restarts(&app)
        .restart(&finalized.classroom_id, "admin-1", None)
        .await;
    assert!(first.success);
    let first_run = history
        .get_run(first.run_id.as_deref().unwrap())
        .await
        .unwrap();

    app.enroll(&finalized.classroom_id, &finalized.passing_id).await;
    // Re-enrolling drops the previous student-role completion
    assert!(app
        .user(&finalized.passing_id)
        .await
        .completed_classrooms
        .is_empty());
    app.grade(&finalized.classroom_id, &finalized.passing_id, 95.0).await;

    let finalize = FinalizationService::new(app.shared())
        .finalize(&finalized.classroom_id, None, &FinalizeOptions::default())
        .await;
    assert!(finalize.success, "errors: {:?}", finalize.errors);

    let second = restarts(&app)
        .restart(&finalized.classroom_id, "admin-1", None)
        .await;
    assert!(second.success, "errors: {:?}", second.errors);
    assert_eq!(second.run_number, Some(2));

    let runs = history.list_runs(&finalized.classroom_id).await.unwrap();
    assert_eq!(runs.len(), 2);
    assert_eq!(runs[0].run_number, 2);
    assert_eq!(runs[0].total_students, 1);
    assert_eq!(runs[0].students[0].final_grade, Some(95.0));
    assert_eq!(runs[1], first_run);

    let stats = history.run_stats(&finalized.classroom_id).await.unwrap();
    assert_eq!(stats.total_runs, 2);
    assert_eq!(stats.total_students, 3);
    assert_eq!(stats.best_run.unwrap().run_number, 2);
    assert_eq!(stats.worst_run.unwrap().run_number, 1);
}

#[tokio::test]
async fn test_next_cohort_starts_without_previous_records() {
    let app = common::spawn_app();
    let finalized = seed_finalized(&app).await;
    let evaluations = EvaluationService::new(app.shared());

    let first = restarts(&app)
        .restart(&finalized.classroom_id, "admin-1", None)
        .await;
    assert!(first.success, "errors: {:?}", first.errors);
    assert_eq!(app.store.count(collections::EVALUATIONS).await, 0);
    assert_eq!(app.store.count(collections::ATTENDANCE).await, 0);
    assert_eq!(app.store.count(collections::PARTICIPATIONS).await, 0);

    // Same student in the new cohort, never graded nor marked present
    app.enroll(&finalized.classroom_id, &finalized.passing_id).await;
    assert!(evaluations
        .find_evaluation(&finalized.classroom_id, &finalized.passing_id)
        .await
        .unwrap()
        .is_none());

    let finalization = FinalizationService::new(app.shared());
    let report = finalization
        .validate_finalization(&finalized.classroom_id)
        .await;
    assert!(report
        .warnings
        .contains(&"1 estudiante(s) sin evaluación completa".to_string()));

    let finalize = finalization
        .finalize(&finalized.classroom_id, None, &FinalizeOptions::default())
        .await;
    assert!(finalize.success, "errors: {:?}", finalize.errors);

    let history = app.user(&finalized.passing_id).await.completed_classrooms;
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].status, CompletionStatus::Failed);
    assert_eq!(history[0].final_grade, None);

    let second = restarts(&app)
        .restart(&finalized.classroom_id, "admin-1", None)
        .await;
    assert!(second.success, "errors: {:?}", second.errors);

    let run = RunHistoryService::new(app.shared())
        .get_run(second.run_id.as_deref().unwrap())
        .await
        .unwrap();
    assert_eq!(run.total_students, 1);
    let student = &run.students[0];
    assert_eq!(student.final_grade, None);
    assert_eq!(student.status, CompletionStatus::Failed);
    assert_eq!(student.attendance_rate, 0.0);
    assert_eq!(student.participation_points, 0.0);
    assert_eq!(run.statistics.pass_rate, 0.0);
}

#[tokio::test]
async fn test_revert_after_restart_is_rejected() {
    let app = common::spawn_app();
    let finalized = seed_finalized(&app).await;

    let restart = restarts(&app)
        .restart(&finalized.classroom_id, "admin-1", None)
        .await;
    assert!(restart.success, "errors: {:?}", restart.errors);

    let revert = FinalizationService::new(app.shared())
        .revert(&finalized.classroom_id, None)
        .await;
    assert!(!revert.success);
    assert!(!revert.can_revert);
    assert_eq!(revert.students_restored, 0);
    assert_eq!(
        revert.errors,
        vec!["La clase fue reiniciada después de este snapshot; no se puede revertir".to_string()]
    );

    // Roster and member lists still agree: nobody is enrolled
    let classroom = app.classroom(&finalized.classroom_id).await;
    assert!(classroom.student_ids.is_empty());
    for student_id in [&finalized.passing_id, &finalized.failing_id] {
        let student = app.user(student_id).await;
        assert!(!student
            .enrolled_classrooms
            .contains(&finalized.classroom_id));
        assert_eq!(student.completed_classrooms.len(), 1);
    }
}

#[tokio::test]
async fn test_deleting_classroom_removes_its_records_and_history() {
    let app = common::spawn_app();
    let finalized = seed_finalized(&app).await;

    let restart = restarts(&app)
        .restart(&finalized.classroom_id, "admin-1", None)
        .await;
    assert!(restart.success, "errors: {:?}", restart.errors);
    app.enroll(&finalized.classroom_id, &finalized.passing_id).await;
    app.grade(&finalized.classroom_id, &finalized.passing_id, 90.0).await;

    let (status, _) = app
        .admin(
            "DELETE",
            &format!("/api/v1/classrooms/{}", finalized.classroom_id),
            None,
        )
        .await;
    assert!(status.is_success(), "status: {}", status);

    for collection in [
        collections::CLASSROOMS,
        collections::EVALUATIONS,
        collections::CLASSROOM_RUNS,
        collections::FINALIZATION_SNAPSHOTS,
    ] {
        assert_eq!(app.store.count(collection).await, 0, "{}", collection);
    }
    assert!(app
        .user(&finalized.passing_id)
        .await
        .enrolled_classrooms
        .is_empty());
}

#[tokio::test]
async fn test_restart_skips_deleted_students_with_warning() {
    let app = common::spawn_app();
    let finalized = seed_finalized(&app).await;

    // Classroom still lists the student after the user record is gone
    classroom_api::store::DocumentStore::delete(
        &*app.store,
        classroom_api::models::collections::USERS,
        &finalized.failing_id,
    )
    .await
    .unwrap();

    let result = restarts(&app)
        .restart(&finalized.classroom_id, "admin-1", None)
        .await;
    assert!(result.success);
    assert_eq!(result.warnings.len(), 1);
    assert!(result.warnings[0].contains(&finalized.failing_id));

    let run = RunHistoryService::new(app.shared())
        .get_run(result.run_id.as_deref().unwrap())
        .await
        .unwrap();
    assert_eq!(run.total_students, 1);
}

#[tokio::test]
async fn test_run_endpoints() {
    let app = common::spawn_app();
    let finalized = seed_finalized(&app).await;
    let teacher_token = common::token(&finalized.teacher_id, "teacher");

    let (status, body) = app
        .admin(
            "POST",
            &format!("/api/v1/classrooms/{}/restart", finalized.classroom_id),
            Some(json!({ "notes": "Cohorte 2025" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["runNumber"], 1);
    let run_id = body["runId"].as_str().unwrap().to_string();

    let (status, body) = app
        .request(
            "GET",
            &format!("/api/v1/classrooms/{}/runs", finalized.classroom_id),
            Some(&teacher_token),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 1);
    assert_eq!(body[0]["statistics"]["passRate"], 50.0);

    let (status, body) = app
        .request("GET", &format!("/api/v1/runs/{}", run_id), Some(&teacher_token), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["notes"], "Cohorte 2025");

    let (status, body) = app
        .request("GET", "/api/v1/runs/unknown", Some(&teacher_token), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["status"], 404);

    let (status, body) = app
        .request(
            "GET",
            &format!("/api/v1/classrooms/{}/runs/stats", finalized.classroom_id),
            Some(&teacher_token),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["totalRuns"], 1);

    let student_token = common::token(&finalized.passing_id, "student");
    let (status, _) = app
        .request("GET", &format!("/api/v1/runs/{}", run_id), Some(&student_token), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}
