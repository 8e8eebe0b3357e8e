#![allow(dead_code)]

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use serde_json::Value;
use std::sync::Arc;
use tower::ServiceExt;
use uuid::Uuid;

use classroom_api::{
    config::Config,
    create_router,
    middlewares::auth::{JwtClaims, JwtService},
    models::{
        classroom::{Classroom, CreateClassroomRequest, EvaluationCriteria, ModuleInput},
        evaluation::SaveEvaluationRequest,
        program::{CreateProgramRequest, Program},
        user::{CreateUserRequest, User, UserRole},
    },
    services::{
        classroom_service::ClassroomService, evaluation_service::EvaluationService,
        program_service::ProgramService, user_service::UserService, AppState,
    },
    store::{MemoryStore, SharedStore},
};

pub const JWT_SECRET: &str = "integration-test-secret";

pub struct TestApp {
    pub router: Router,
    pub store: Arc<MemoryStore>,
    pub state: Arc<AppState>,
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

pub fn spawn_app() -> TestApp {
    spawn_app_with_config(Config::in_memory(JWT_SECRET))
}

pub fn spawn_app_with_config(config: Config) -> TestApp {
    init_tracing();

    let store = Arc::new(MemoryStore::new());
    let shared: SharedStore = store.clone();
    let state = Arc::new(AppState::with_store(config, shared).expect("Failed to build app state"));

    TestApp {
        router: create_router(state.clone()),
        store,
        state,
    }
}

pub fn token(user_id: &str, role: &str) -> String {
    JwtService::new(JWT_SECRET)
        .generate_token(&JwtClaims::new(user_id, role, 3600))
        .expect("Failed to sign test token")
}

pub fn admin_token() -> String {
    token("admin-1", "admin")
}

impl TestApp {
    pub fn shared(&self) -> SharedStore {
        self.store.clone()
    }

    /// Sends a request through the router and returns status plus JSON body
    /// (`Value::Null` when the body is empty).
    pub async fn request(
        &self,
        method: &str,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {}", token));
        }
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or_else(|_| {
                Value::String(String::from_utf8_lossy(&bytes).into_owned())
            })
        };
        (status, json)
    }

    pub async fn admin(&self, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        self.request(method, uri, Some(&admin_token()), body).await
    }

    pub async fn seed_program(&self, name: &str) -> Program {
        ProgramService::new(self.shared())
            .create_program(CreateProgramRequest {
                name: name.to_string(),
                description: None,
            })
            .await
            .unwrap()
    }

    pub async fn seed_user(&self, name: &str, role: UserRole, phone: Option<&str>) -> User {
        UserService::new(self.shared())
            .create_user(CreateUserRequest {
                name: name.to_string(),
                email: format!("{}-{}@test.com", name.to_lowercase(), Uuid::new_v4()),
                phone: phone.map(str::to_string),
                role: Some(role),
                is_teacher: false,
            })
            .await
            .unwrap()
    }

    /// Classroom with the standard 20/20/30/30 criteria and one module per week.
    pub async fn seed_classroom(
        &self,
        program_id: &str,
        teacher_id: Option<&str>,
        weeks: u32,
    ) -> Classroom {
        ClassroomService::new(self.shared())
            .create_classroom(CreateClassroomRequest {
                program_id: program_id.to_string(),
                name: "Álgebra I".to_string(),
                subject: "Matemáticas".to_string(),
                teacher_id: teacher_id.map(str::to_string),
                modules: (1..=weeks)
                    .map(|week| ModuleInput {
                        name: format!("Semana {}", week),
                        week_number: week,
                        description: None,
                    })
                    .collect(),
                evaluation_criteria: standard_criteria(),
                schedule: None,
                room: None,
            })
            .await
            .unwrap()
    }

    pub async fn enroll(&self, classroom_id: &str, student_id: &str) -> Classroom {
        UserService::new(self.shared())
            .enroll_student(classroom_id, student_id)
            .await
            .unwrap()
    }

    pub async fn complete_module(&self, classroom_id: &str, module_id: &str) {
        ClassroomService::new(self.shared())
            .set_module_completion(classroom_id, module_id, true)
            .await
            .unwrap();
    }

    /// Evaluation whose percentage equals `total` under the standard criteria.
    pub async fn grade(&self, classroom_id: &str, student_id: &str, total: f64) {
        let assignments = total.min(30.0);
        let final_project = (total - assignments).min(30.0);
        let attendance = (total - assignments - final_project).min(20.0);
        let participation = total - assignments - final_project - attendance;

        EvaluationService::new(self.shared())
            .save_evaluation(
                classroom_id,
                student_id,
                SaveEvaluationRequest {
                    attendance_points: attendance,
                    participation_points: participation,
                    assignments_points: assignments,
                    final_project_points: final_project,
                    ..Default::default()
                },
                Some("teacher-1"),
            )
            .await
            .unwrap();
    }

    pub async fn user(&self, user_id: &str) -> User {
        UserService::new(self.shared()).get_user(user_id).await.unwrap()
    }

    pub async fn classroom(&self, classroom_id: &str) -> Classroom {
        ClassroomService::new(self.shared())
            .get_classroom(classroom_id)
            .await
            .unwrap()
    }
}

pub fn standard_criteria() -> EvaluationCriteria {
    EvaluationCriteria {
        attendance: 20,
        participation: 20,
        assignments: 30,
        final_project: 30,
        custom: vec![],
    }
}
