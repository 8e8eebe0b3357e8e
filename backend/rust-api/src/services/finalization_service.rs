//! Classroom finalization and its undo.
//!
//! Finalize moves the enrolled cohort and the teacher into their history
//! lists. The classroom itself is only closed once every member migrated;
//! otherwise it stays active and the result is flagged partially finalized,
//! so the call can be repeated (history entries are upserted) or undone
//! with the returned snapshot.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};

use crate::metrics::{status_label, CLASSROOM_FINALIZATIONS_TOTAL, CLASSROOM_REVERTS_TOTAL};
use crate::models::classroom::Classroom;
use crate::models::collections::{CLASSROOMS, FINALIZATION_SNAPSHOTS, PROGRAMS, USERS};
use crate::models::evaluation::EvaluationStatus;
use crate::models::lifecycle::{
    CleanupSnapshotsResult, FinalizeOptions, FinalizeResult, RevertResult, ValidationReport,
};
use crate::models::program::Program;
use crate::models::snapshot::{FinalizationSnapshot, StudentListsSnapshot, TeacherListsSnapshot};
use crate::models::user::{
    upsert_history, ClassroomHistory, ClassroomRole, CompletionStatus, User,
};
use crate::models::PASSING_GRADE;
use crate::services::evaluation_service::EvaluationService;
use crate::services::require;
use crate::services::whatsapp_client::WhatsappClient;
use crate::store::{Query, SharedStore, SortDirection, Update};

pub struct FinalizationService {
    store: SharedStore,
    notifier: Option<WhatsappClient>,
}

/// Classroom facts shared by every member migration
struct CompletionContext<'a> {
    classroom: &'a Classroom,
    program_name: String,
    completed_at: DateTime<Utc>,
}

impl CompletionContext<'_> {
    fn history_entry(
        &self,
        role: ClassroomRole,
        status: CompletionStatus,
        final_grade: Option<f64>,
    ) -> ClassroomHistory {
        ClassroomHistory {
            classroom_id: self.classroom.id.clone(),
            classroom_name: self.classroom.name.clone(),
            program_id: self.classroom.program_id.clone(),
            program_name: self.program_name.clone(),
            role,
            enrolled_at: self.classroom.start_date,
            completed_at: self.completed_at,
            status,
            final_grade,
        }
    }
}

impl FinalizationService {
    pub fn new(store: SharedStore) -> Self {
        Self {
            store,
            notifier: None,
        }
    }

    /// Completion messages go out through this client when set
    pub fn with_notifier(mut self, notifier: Option<WhatsappClient>) -> Self {
        self.notifier = notifier;
        self
    }

    pub async fn validate_finalization(&self, classroom_id: &str) -> ValidationReport {
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

        if !classroom.is_active {
            report.warning("La clase ya está inactiva");
        }

        if classroom.student_ids.is_empty() {
            report.warning("La clase no tiene estudiantes inscritos");
        } else {
            let evaluations = EvaluationService::new(self.store.clone());
            let mut pending = 0usize;
            for student_id in &classroom.student_ids {
                match evaluations.find_evaluation(classroom_id, student_id).await {
                    Ok(Some(e)) if e.status == EvaluationStatus::Evaluated => {}
                    Ok(_) => pending += 1,
                    Err(err) => {
                        tracing::warn!(classroom_id, student_id, "Evaluation lookup failed: {:#}", err);
                        pending += 1;
                    }
                }
            }
            if pending > 0 {
                report.warning(format!("{} estudiante(s) sin evaluación completa", pending));
            }
        }

        let incomplete = classroom.incomplete_modules();
        if incomplete > 0 {
            report.warning(format!("{} módulo(s) sin completar", incomplete));
        }

        report
    }

    pub async fn finalize(
        &self,
        classroom_id: &str,
        acting_user: Option<&str>,
        options: &FinalizeOptions,
    ) -> FinalizeResult {
        let mut result = FinalizeResult {
            classroom_id: classroom_id.to_string(),
            ..Default::default()
        };

        if let Err(err) = self
            .run_finalize(classroom_id, acting_user, options, &mut result)
            .await
        {
            tracing::error!(classroom_id, "Finalization aborted: {:#}", err);
            result.errors.push(format!("Error al finalizar la clase: {:#}", err));
        }

        result.success = result.errors.is_empty();
        let outcome = if result.partially_finalized {
            "partial"
        } else {
            status_label(result.success)
        };
        CLASSROOM_FINALIZATIONS_TOTAL
            .with_label_values(&[outcome])
            .inc();

        result
    }

    async fn run_finalize(
        &self,
        classroom_id: &str,
        acting_user: Option<&str>,
        options: &FinalizeOptions,
        result: &mut FinalizeResult,
    ) -> Result<()> {
        let report = self.validate_finalization(classroom_id).await;
        result.warnings.extend(report.warnings);
        if !report.is_valid && !options.force {
            result.errors.extend(report.errors);
            return Ok(());
        }

        let classroom: Classroom = require(&*self.store, CLASSROOMS, classroom_id, "Classroom").await?;

        match self.take_snapshot(&classroom, acting_user).await {
            Ok(snapshot_id) => {
                result.can_revert = true;
                result.snapshot_id = Some(snapshot_id);
            }
            Err(err) => {
                tracing::warn!(classroom_id, "Snapshot not saved: {:#}", err);
                result
                    .warnings
                    .push("No se pudo guardar el snapshot; la finalización no podrá revertirse".to_string());
            }
        }

        let completed_at = options.custom_completion_date.unwrap_or_else(Utc::now);
        result.completion_date = Some(completed_at);

        let program_name = match self.store.get_as::<Program>(PROGRAMS, &classroom.program_id).await {
            Ok(Some(program)) => program.name,
            Ok(None) => String::new(),
            Err(err) => {
                result
                    .warnings
                    .push(format!("No se pudo cargar el programa: {}", err));
                String::new()
            }
        };

        let ctx = CompletionContext {
            classroom: &classroom,
            program_name,
            completed_at,
        };

        for student_id in &classroom.student_ids {
            match self.migrate_student(&ctx, student_id).await {
                Ok(()) => result.students_processed += 1,
                Err(err) => {
                    tracing::warn!(classroom_id, student_id, "Student not finalized: {:#}", err);
                    result
                        .errors
                        .push(format!("Estudiante {}: {:#}", student_id, err));
                }
            }
        }

        if let Some(teacher_id) = classroom.teacher_id.as_deref() {
            match self.migrate_teacher(&ctx, teacher_id).await {
                Ok(()) => result.teacher_processed = true,
                Err(err) => {
                    tracing::warn!(classroom_id, teacher_id, "Teacher not finalized: {:#}", err);
                    result
                        .errors
                        .push(format!("Profesor {}: {:#}", teacher_id, err));
                }
            }
        }

        if !result.errors.is_empty() {
            result.partially_finalized = true;
            tracing::warn!(
                classroom_id,
                failures = result.errors.len(),
                "Classroom left active after partial finalization"
            );
            return Ok(());
        }

        self.store
            .update(
                CLASSROOMS,
                classroom_id,
                Update::new()
                    .set("isActive", false)
                    .set_serialized("endDate", &completed_at)?,
            )
            .await
            .context("Failed to close classroom")?;

        tracing::info!(
            classroom_id,
            students = result.students_processed,
            teacher = result.teacher_processed,
            "Classroom finalized"
        );

        if options.archive_whatsapp_group {
            result
                .warnings
                .push("El archivado del grupo de WhatsApp no está disponible".to_string());
        }

        if !options.skip_notifications {
            if let (Some(client), Some(group_id)) =
                (&self.notifier, classroom.whatsapp_group_id.as_deref())
            {
                if let Err(err) = client
                    .notify_classroom_completion(client.default_session(), &classroom, group_id)
                    .await
                {
                    result
                        .warnings
                        .push(format!("No se pudo enviar la notificación: {}", err));
                }
            }
        }

        Ok(())
    }

    async fn take_snapshot(&self, classroom: &Classroom, acting_user: Option<&str>) -> Result<String> {
        let mut students = Vec::with_capacity(classroom.student_ids.len());
        for student_id in &classroom.student_ids {
            if let Some(user) = self
                .store
                .get_as::<User>(USERS, student_id)
                .await
                .context("Failed to load student for snapshot")?
            {
                students.push(StudentListsSnapshot {
                    user_id: user.id,
                    enrolled_classrooms: user.enrolled_classrooms,
                    completed_classrooms: user.completed_classrooms,
                });
            }
        }

        let teacher = match classroom.teacher_id.as_deref() {
            Some(teacher_id) => self
                .store
                .get_as::<User>(USERS, teacher_id)
                .await
                .context("Failed to load teacher for snapshot")?
                .map(|user| TeacherListsSnapshot {
                    user_id: user.id,
                    teaching_classrooms: user.teaching_classrooms,
                    taught_classrooms: user.taught_classrooms,
                }),
            None => None,
        };

        let snapshot = FinalizationSnapshot {
            id: String::new(),
            classroom_id: classroom.id.clone(),
            classroom: classroom.clone(),
            students,
            teacher,
            created_by: acting_user.map(str::to_string),
            created_at: None,
        };

        let id = self
            .store
            .create_from(FINALIZATION_SNAPSHOTS, &snapshot)
            .await
            .context("Failed to persist finalization snapshot")?;

        tracing::debug!(classroom_id = %classroom.id, snapshot_id = %id, "Finalization snapshot saved");
        Ok(id)
    }

    async fn migrate_student(&self, ctx: &CompletionContext<'_>, student_id: &str) -> Result<()> {
        let classroom_id = ctx.classroom.id.as_str();
        let student: User = require(&*self.store, USERS, student_id, "Student").await?;

        let final_grade = EvaluationService::new(self.store.clone())
            .find_evaluation(classroom_id, student_id)
            .await?
            .and_then(|e| e.finite_percentage());
        let status = if final_grade.unwrap_or(0.0) >= PASSING_GRADE {
            CompletionStatus::Completed
        } else {
            CompletionStatus::Failed
        };

        let enrolled: Vec<String> = student
            .enrolled_classrooms
            .into_iter()
            .filter(|id| id != classroom_id)
            .collect();
        let mut completed = student.completed_classrooms;
        upsert_history(
            &mut completed,
            ctx.history_entry(ClassroomRole::Student, status, final_grade),
        );

        self.store
            .update(
                USERS,
                student_id,
                Update::new()
                    .set_serialized("enrolledClassrooms", &enrolled)?
                    .set_serialized("completedClassrooms", &completed)?,
            )
            .await
            .context("Failed to move classroom to history")?;
        Ok(())
    }

    async fn migrate_teacher(&self, ctx: &CompletionContext<'_>, teacher_id: &str) -> Result<()> {
        let classroom_id = ctx.classroom.id.as_str();
        let teacher: User = require(&*self.store, USERS, teacher_id, "Teacher").await?;

        let teaching: Vec<String> = teacher
            .teaching_classrooms
            .into_iter()
            .filter(|id| id != classroom_id)
            .collect();
        let mut taught = teacher.taught_classrooms;
        upsert_history(
            &mut taught,
            ctx.history_entry(ClassroomRole::Teacher, CompletionStatus::Completed, None),
        );

        self.store
            .update(
                USERS,
                teacher_id,
                Update::new()
                    .set_serialized("teachingClassrooms", &teaching)?
                    .set_serialized("taughtClassrooms", &taught)?,
            )
            .await
            .context("Failed to move classroom to history")?;
        Ok(())
    }

    /// Finalizes each classroom in turn with the same options.
    pub async fn batch_finalize(
        &self,
        classroom_ids: &[String],
        acting_user: Option<&str>,
        options: &FinalizeOptions,
    ) -> Vec<FinalizeResult> {
        let mut results = Vec::with_capacity(classroom_ids.len());
        for classroom_id in classroom_ids {
            results.push(self.finalize(classroom_id, acting_user, options).await);
        }
        results
    }

    /// Restores members' lists from a snapshot and reopens the classroom.
    ///
    /// Without `snapshot_id` the newest snapshot of the classroom is used.
    pub async fn revert(&self, classroom_id: &str, snapshot_id: Option<&str>) -> RevertResult {
        let mut result = RevertResult {
            classroom_id: classroom_id.to_string(),
            ..Default::default()
        };

        if let Err(err) = self.run_revert(classroom_id, snapshot_id, &mut result).await {
            tracing::error!(classroom_id, "Revert aborted: {:#}", err);
            result.errors.push(format!("Error al revertir la finalización: {:#}", err));
        }

        result.success = result.errors.is_empty();
        result.can_revert = result.success;
        CLASSROOM_REVERTS_TOTAL
            .with_label_values(&[status_label(result.success)])
            .inc();

        result
    }

    async fn run_revert(
        &self,
        classroom_id: &str,
        snapshot_id: Option<&str>,
        result: &mut RevertResult,
    ) -> Result<()> {
        let classroom: Classroom = require(&*self.store, CLASSROOMS, classroom_id, "Classroom").await?;

        let snapshot = match snapshot_id {
            Some(id) => {
                let snapshot: FinalizationSnapshot =
                    require(&*self.store, FINALIZATION_SNAPSHOTS, id, "Snapshot").await?;
                if snapshot.classroom_id != classroom_id {
                    result
                        .errors
                        .push("El snapshot no pertenece a esta clase".to_string());
                    return Ok(());
                }
                snapshot
            }
            None => match self.latest_snapshot(classroom_id).await? {
                Some(snapshot) => snapshot,
                None => {
                    result
                        .errors
                        .push("No hay snapshots de finalización para esta clase".to_string());
                    return Ok(());
                }
            },
        };
        result.snapshot_id = Some(snapshot.id.clone());

        // A restart opens a new cohort with a new start date; the snapshot's
        // lists describe the previous one.
        if snapshot.classroom.start_date != classroom.start_date {
            result.errors.push(
                "La clase fue reiniciada después de este snapshot; no se puede revertir".to_string(),
            );
            return Ok(());
        }

        for student in &snapshot.students {
            let restore = async {
                self.store
                    .update(
                        USERS,
                        &student.user_id,
                        Update::new()
                            .set_serialized("enrolledClassrooms", &student.enrolled_classrooms)?
                            .set_serialized("completedClassrooms", &student.completed_classrooms)?,
                    )
                    .await
                    .map_err(anyhow::Error::from)
            };
            match restore.await {
                Ok(()) => result.students_restored += 1,
                Err(err) => {
                    tracing::warn!(classroom_id, student_id = %student.user_id, "Student not restored: {:#}", err);
                    result
                        .errors
                        .push(format!("Estudiante {}: {:#}", student.user_id, err));
                }
            }
        }

        if let Some(teacher) = &snapshot.teacher {
            let restore = async {
                self.store
                    .update(
                        USERS,
                        &teacher.user_id,
                        Update::new()
                            .set_serialized("teachingClassrooms", &teacher.teaching_classrooms)?
                            .set_serialized("taughtClassrooms", &teacher.taught_classrooms)?,
                    )
                    .await
                    .map_err(anyhow::Error::from)
            };
            match restore.await {
                Ok(()) => result.teacher_restored = true,
                Err(err) => {
                    tracing::warn!(classroom_id, teacher_id = %teacher.user_id, "Teacher not restored: {:#}", err);
                    result
                        .errors
                        .push(format!("Profesor {}: {:#}", teacher.user_id, err));
                }
            }
        }

        self.store
            .update(
                CLASSROOMS,
                classroom_id,
                Update::new().set("isActive", true).unset("endDate"),
            )
            .await
            .context("Failed to reopen classroom")?;

        tracing::info!(
            classroom_id,
            snapshot_id = %snapshot.id,
            students = result.students_restored,
            "Classroom finalization reverted"
        );
        Ok(())
    }

    async fn latest_snapshot(&self, classroom_id: &str) -> Result<Option<FinalizationSnapshot>> {
        let mut snapshots: Vec<FinalizationSnapshot> = self
            .store
            .query_as(
                FINALIZATION_SNAPSHOTS,
                Query::new()
                    .eq("classroomId", classroom_id)
                    .order_by("createdAt", SortDirection::Descending)
                    .limit(1),
            )
            .await
            .context("Failed to query finalization snapshots")?;
        Ok(snapshots.pop())
    }

    /// Deletes all but the newest `keep_latest` snapshots of a classroom.
    pub async fn cleanup_snapshots(
        &self,
        classroom_id: &str,
        keep_latest: usize,
    ) -> Result<CleanupSnapshotsResult> {
        require::<Classroom>(&*self.store, CLASSROOMS, classroom_id, "Classroom").await?;

        let snapshots: Vec<FinalizationSnapshot> = self
            .store
            .query_as(
                FINALIZATION_SNAPSHOTS,
                Query::new()
                    .eq("classroomId", classroom_id)
                    .order_by("createdAt", SortDirection::Descending),
            )
            .await
            .context("Failed to query finalization snapshots")?;

        let mut deleted = 0u32;
        for snapshot in snapshots.iter().skip(keep_latest) {
            self.store
                .delete(FINALIZATION_SNAPSHOTS, &snapshot.id)
                .await
                .with_context(|| format!("Failed to delete snapshot {}", snapshot.id))?;
            deleted += 1;
        }

        let kept = snapshots.len().min(keep_latest) as u32;
        tracing::info!(classroom_id, deleted, kept, "Finalization snapshots cleaned up");
        Ok(CleanupSnapshotsResult { deleted, kept })
    }
}

