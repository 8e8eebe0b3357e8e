use anyhow::{anyhow, bail, Context, Result};
use chrono::Utc;

use crate::models::classroom::Classroom;
use crate::models::collections::{ATTENDANCE, CLASSROOMS, EVALUATIONS, PARTICIPATIONS};
use crate::models::evaluation::{
    AttendanceRecord, EvaluationStatus, ParticipationRecord, RecordAttendanceRequest,
    RecordParticipationRequest, SaveEvaluationRequest, StudentEvaluation,
};
use crate::services::require;
use crate::store::{to_document, Query, SharedStore, SortDirection, Update};

/// Attendance, participation and scored evaluations per classroom
pub struct EvaluationService {
    store: SharedStore,
}

impl EvaluationService {
    pub fn new(store: SharedStore) -> Self {
        Self { store }
    }

    async fn enrolled_classroom(&self, classroom_id: &str, student_id: &str) -> Result<Classroom> {
        let classroom: Classroom = require(&*self.store, CLASSROOMS, classroom_id, "Classroom").await?;
        if !classroom.student_ids.iter().any(|id| id == student_id) {
            bail!("Student not found in classroom");
        }
        Ok(classroom)
    }

    pub async fn record_attendance(
        &self,
        classroom_id: &str,
        req: RecordAttendanceRequest,
    ) -> Result<AttendanceRecord> {
        self.enrolled_classroom(classroom_id, &req.student_id).await?;

        let record = AttendanceRecord {
            id: String::new(),
            classroom_id: classroom_id.to_string(),
            student_id: req.student_id,
            module_id: req.module_id,
            date: req.date.unwrap_or_else(Utc::now),
            status: req.status,
        };

        let id = self
            .store
            .create_from(ATTENDANCE, &record)
            .await
            .context("Failed to insert attendance record")?;

        Ok(AttendanceRecord { id, ..record })
    }

    pub async fn list_attendance(
        &self,
        classroom_id: &str,
        student_id: Option<&str>,
    ) -> Result<Vec<AttendanceRecord>> {
        let mut query = Query::new()
            .eq("classroomId", classroom_id)
            .order_by("date", SortDirection::Ascending);
        if let Some(student_id) = student_id {
            query = query.eq("studentId", student_id);
        }

        self.store
            .query_as(ATTENDANCE, query)
            .await
            .context("Failed to query attendance")
    }

    pub async fn record_participation(
        &self,
        classroom_id: &str,
        req: RecordParticipationRequest,
    ) -> Result<ParticipationRecord> {
        self.enrolled_classroom(classroom_id, &req.student_id).await?;

        let record = ParticipationRecord {
            id: String::new(),
            classroom_id: classroom_id.to_string(),
            student_id: req.student_id,
            module_id: req.module_id,
            points: req.points,
            note: req.note,
            recorded_at: Utc::now(),
        };

        let id = self
            .store
            .create_from(PARTICIPATIONS, &record)
            .await
            .context("Failed to insert participation record")?;

        Ok(ParticipationRecord { id, ..record })
    }

    pub async fn list_participation(
        &self,
        classroom_id: &str,
        student_id: Option<&str>,
    ) -> Result<Vec<ParticipationRecord>> {
        let mut query = Query::new()
            .eq("classroomId", classroom_id)
            .order_by("recordedAt", SortDirection::Ascending);
        if let Some(student_id) = student_id {
            query = query.eq("studentId", student_id);
        }

        self.store
            .query_as(PARTICIPATIONS, query)
            .await
            .context("Failed to query participation")
    }

    /// Creates or overwrites the evaluation of a student.
    ///
    /// Each criterion is bounded by the classroom's allocation for it.
    pub async fn save_evaluation(
        &self,
        classroom_id: &str,
        student_id: &str,
        req: SaveEvaluationRequest,
        evaluated_by: Option<&str>,
    ) -> Result<StudentEvaluation> {
        let classroom = self.enrolled_classroom(classroom_id, student_id).await?;
        let criteria = &classroom.evaluation_criteria;

        check_points("attendance", req.attendance_points, criteria.attendance)?;
        check_points("participation", req.participation_points, criteria.participation)?;
        check_points("assignments", req.assignments_points, criteria.assignments)?;
        check_points("finalProject", req.final_project_points, criteria.final_project)?;
        for (name, points) in &req.custom_points {
            let allocation = criteria
                .custom_allocation(name)
                .ok_or_else(|| anyhow!("Unknown criterion: {}", name))?;
            check_points(name, *points, allocation)?;
        }

        let total_points = req.attendance_points
            + req.participation_points
            + req.assignments_points
            + req.final_project_points
            + req.custom_points.values().sum::<f64>();
        let criteria_total = criteria.total_points();
        let percentage = if criteria_total == 0 {
            None
        } else {
            Some(total_points / criteria_total as f64 * 100.0)
        };

        let id = StudentEvaluation::document_id(classroom_id, student_id);
        let evaluation = StudentEvaluation {
            id: id.clone(),
            classroom_id: classroom_id.to_string(),
            student_id: student_id.to_string(),
            attendance_points: req.attendance_points,
            participation_points: req.participation_points,
            assignments_points: req.assignments_points,
            final_project_points: req.final_project_points,
            custom_points: req.custom_points,
            total_points,
            percentage,
            status: req.status.unwrap_or(EvaluationStatus::Evaluated),
            comments: req.comments,
            evaluated_by: evaluated_by.map(str::to_string),
            created_at: None,
            updated_at: None,
        };

        let data = to_document(&evaluation)?;
        let exists = self
            .store
            .get(EVALUATIONS, &id)
            .await
            .context("Failed to load evaluation")?
            .is_some();

        if exists {
            let mut update = Update::new();
            update.set = data;
            for (field, absent) in [
                ("comments", evaluation.comments.is_none()),
                ("evaluatedBy", evaluation.evaluated_by.is_none()),
                ("percentage", evaluation.percentage.is_none()),
            ] {
                if absent {
                    update = update.unset(field);
                }
            }
            self.store
                .update(EVALUATIONS, &id, update)
                .await
                .context("Failed to update evaluation")?;
        } else {
            self.store
                .create_with_id(EVALUATIONS, &id, data)
                .await
                .context("Failed to insert evaluation")?;
        }

        tracing::debug!(classroom_id, student_id, total_points, "Evaluation saved");
        self.get_evaluation(classroom_id, student_id).await
    }

    pub async fn get_evaluation(&self, classroom_id: &str, student_id: &str) -> Result<StudentEvaluation> {
        require(
            &*self.store,
            EVALUATIONS,
            &StudentEvaluation::document_id(classroom_id, student_id),
            "Evaluation",
        )
        .await
    }

    /// Evaluation of a student if one was ever saved
    pub async fn find_evaluation(
        &self,
        classroom_id: &str,
        student_id: &str,
    ) -> Result<Option<StudentEvaluation>> {
        self.store
            .get_as(
                EVALUATIONS,
                &StudentEvaluation::document_id(classroom_id, student_id),
            )
            .await
            .context("Failed to load evaluation")
    }

    pub async fn list_evaluations(&self, classroom_id: &str) -> Result<Vec<StudentEvaluation>> {
        self.store
            .query_as(EVALUATIONS, Query::new().eq("classroomId", classroom_id))
            .await
            .context("Failed to query evaluations")
    }

    /// Deletes every evaluation, attendance and participation record of the
    /// classroom. Returns how many documents were removed.
    pub async fn clear_classroom_records(&self, classroom_id: &str) -> Result<usize> {
        let mut removed = 0usize;
        for collection in [EVALUATIONS, ATTENDANCE, PARTICIPATIONS] {
            removed += self
                .store
                .delete_matching(collection, Query::new().eq("classroomId", classroom_id))
                .await
                .with_context(|| format!("Failed to clear {}", collection))?;
        }

        tracing::debug!(classroom_id, removed, "Classroom records cleared");
        Ok(removed)
    }
}

fn check_points(criterion: &str, points: f64, allocation: u32) -> Result<()> {
    if !points.is_finite() || points < 0.0 || points > allocation as f64 {
        bail!(
            "Points for {} must be between 0 and {} (got {})",
            criterion,
            allocation,
            points
        );
    }
    Ok(())
}
