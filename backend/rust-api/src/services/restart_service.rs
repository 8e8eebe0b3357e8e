use anyhow::{Context, Result};
use chrono::Utc;

use crate::metrics::{status_label, CLASSROOM_RESTARTS_TOTAL};
use crate::models::classroom::{Classroom, Module};
use crate::models::collections::{CLASSROOMS, CLASSROOM_RUNS, PROGRAMS, USERS};
use crate::models::evaluation::{attendance_rate, participation_total};
use crate::models::lifecycle::{RestartResult, ValidationReport};
use crate::models::program::Program;
use crate::models::run::{ClassroomRun, RunStatistics, StudentRunRecord};
use crate::models::user::{CompletionStatus, User};
use crate::models::PASSING_GRADE;
use crate::services::evaluation_service::EvaluationService;
use crate::services::require;
use crate::store::{Query, SharedStore, SortDirection, Update};

/// Archives a finalized cohort as a run and reopens the classroom.
pub struct RestartService {
    store: SharedStore,
}

impl RestartService {
    pub fn new(store: SharedStore) -> Self {
        Self { store }
    }

    pub async fn validate_restart(&self, classroom_id: &str) -> ValidationReport {
        let mut report = ValidationReport::new();

        let classroom = match self.store.get_as::<Classroom>(CLASSROOMS, classroom_id).await {
            Ok(Some(classroom)) => classroom,
            Ok(None) => {
                report.error("Clase no encontrada");
                return report;
            }
            Err(err) => {
                report.error(format!("Error al validar la clase: {}", err));
                return report;
            }
        };

        if classroom.is_active {
            report.error("La clase debe estar finalizada antes de reiniciarla");
        }
        if classroom.end_date.is_none() {
            report.error("La clase no tiene fecha de finalización");
        }

        if let Some(teacher_id) = classroom.teacher_id.as_deref() {
            match self.store.get_as::<User>(USERS, teacher_id).await {
                Ok(Some(teacher)) if !teacher.is_active => {
                    report.warning("El profesor asignado está inactivo");
                }
                Ok(Some(_)) => {}
                Ok(None) => report.warning("El profesor asignado ya no existe"),
                Err(err) => report.warning(format!("No se pudo verificar el profesor: {}", err)),
            }
        }

        report
    }

    pub async fn restart(
        &self,
        classroom_id: &str,
        acting_user: &str,
        notes: Option<String>,
    ) -> RestartResult {
        let mut result = RestartResult::default();

        if let Err(err) = self
            .run_restart(classroom_id, acting_user, notes, &mut result)
            .await
        {
            tracing::error!(classroom_id, "Restart aborted: {:#}", err);
            result.errors.push(format!("Error al reiniciar la clase: {:#}", err));
        }

        result.success = result.errors.is_empty();
        CLASSROOM_RESTARTS_TOTAL
            .with_label_values(&[status_label(result.success)])
            .inc();

        result
    }

    async fn run_restart(
        &self,
        classroom_id: &str,
        acting_user: &str,
        notes: Option<String>,
        result: &mut RestartResult,
    ) -> Result<()> {
        let report = self.validate_restart(classroom_id).await;
        result.warnings.extend(report.warnings);
        if !report.is_valid {
            result.errors.extend(report.errors);
            return Ok(());
        }

        let classroom: Classroom = require(&*self.store, CLASSROOMS, classroom_id, "Classroom").await?;
        let run_number = self.next_run_number(classroom_id).await?;

        let program_name = self
            .store
            .get_as::<Program>(PROGRAMS, &classroom.program_id)
            .await
            .context("Failed to load program")?
            .map(|p| p.name)
            .unwrap_or_default();

        let teacher_name = match classroom.teacher_id.as_deref() {
            Some(teacher_id) => self
                .store
                .get_as::<User>(USERS, teacher_id)
                .await
                .context("Failed to load teacher")?
                .map(|t| t.name)
                .unwrap_or_default(),
            None => String::new(),
        };

        let students = self.student_records(&classroom, &mut result.warnings).await?;
        let statistics = RunStatistics::from_students(&students);

        let run = ClassroomRun {
            id: String::new(),
            classroom_id: classroom.id.clone(),
            classroom_name: classroom.name.clone(),
            subject: classroom.subject.clone(),
            program_id: classroom.program_id.clone(),
            program_name,
            teacher_id: classroom.teacher_id.clone(),
            teacher_name,
            evaluation_criteria: classroom.evaluation_criteria.clone(),
            modules: classroom.modules.clone(),
            total_students: students.len() as u32,
            students,
            statistics,
            run_number,
            start_date: classroom.start_date,
            end_date: classroom.end_date,
            created_at: None,
            created_by: acting_user.to_string(),
            notes,
        };

        let run_id = self
            .store
            .create_from(CLASSROOM_RUNS, &run)
            .await
            .context("Failed to persist classroom run")?;
        result.run_id = Some(run_id.clone());
        result.run_number = Some(run_number);

        // The run holds the cohort's grades now; the next cohort starts clean
        EvaluationService::new(self.store.clone())
            .clear_classroom_records(classroom_id)
            .await?;
        self.reset_classroom(&classroom).await?;

        tracing::info!(classroom_id, run_id = %run_id, run_number, "Classroom restarted");
        Ok(())
    }

    async fn next_run_number(&self, classroom_id: &str) -> Result<u32> {
        let latest: Vec<ClassroomRun> = self
            .store
            .query_as(
                CLASSROOM_RUNS,
                Query::new()
                    .eq("classroomId", classroom_id)
                    .order_by("runNumber", SortDirection::Descending)
                    .limit(1),
            )
            .await
            .context("Failed to query classroom runs")?;

        Ok(latest.first().map(|r| r.run_number + 1).unwrap_or(1))
    }

    async fn student_records(
        &self,
        classroom: &Classroom,
        warnings: &mut Vec<String>,
    ) -> Result<Vec<StudentRunRecord>> {
        let evaluations = EvaluationService::new(self.store.clone());
        let mut records = Vec::with_capacity(classroom.student_ids.len());

        for student_id in &classroom.student_ids {
            let Some(student) = self
                .store
                .get_as::<User>(USERS, student_id)
                .await
                .context("Failed to load student")?
            else {
                warnings.push(format!(
                    "Estudiante {} no encontrado; se omite del registro",
                    student_id
                ));
                continue;
            };

            let final_grade = evaluations
                .find_evaluation(&classroom.id, student_id)
                .await?
                .and_then(|e| e.finite_percentage());
            let attendance = evaluations
                .list_attendance(&classroom.id, Some(student_id))
                .await?;
            let participation = evaluations
                .list_participation(&classroom.id, Some(student_id))
                .await?;

            records.push(StudentRunRecord {
                student_id: student.id,
                name: student.name,
                email: student.email,
                phone: student.phone,
                final_grade,
                status: if final_grade.unwrap_or(0.0) >= PASSING_GRADE {
                    CompletionStatus::Completed
                } else {
                    CompletionStatus::Failed
                },
                attendance_rate: attendance_rate(&attendance),
                participation_points: participation_total(&participation),
                enrolled_at: classroom.start_date,
                completed_at: classroom.end_date,
            });
        }

        Ok(records)
    }

    /// Empty roster, modules pending, open again from now with no end date.
    async fn reset_classroom(&self, classroom: &Classroom) -> Result<()> {
        let modules: Vec<Module> = classroom
            .modules
            .iter()
            .cloned()
            .map(|m| Module {
                is_completed: false,
                ..m
            })
            .collect();

        let mut update = Update::new()
            .set_serialized("studentIds", &Vec::<String>::new())?
            .set_serialized("modules", &modules)?
            .set("isActive", true)
            .set_serialized("startDate", &Utc::now())?
            .unset("endDate");
        update = match classroom.first_module() {
            Some(first) => update.set("currentModule", first.id.as_str()),
            None => update.unset("currentModule"),
        };

        self.store
            .update(CLASSROOMS, &classroom.id, update)
            .await
            .context("Failed to reset classroom")?;
        Ok(())
    }
}
