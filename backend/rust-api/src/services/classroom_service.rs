use anyhow::{anyhow, Context, Result};
use chrono::Utc;

use crate::models::classroom::{
    Classroom, CreateClassroomRequest, ListClassroomsQuery, Module, UpdateClassroomRequest,
};
use crate::models::collections::{CLASSROOMS, CLASSROOM_RUNS, FINALIZATION_SNAPSHOTS, USERS};
use crate::models::user::User;
use crate::services::evaluation_service::EvaluationService;
use crate::services::program_service::ProgramService;
use crate::services::require;
use crate::services::user_service::UserService;
use crate::store::{new_document_id, Query, SharedStore, Update};

pub struct ClassroomService {
    store: SharedStore,
}

impl ClassroomService {
    pub fn new(store: SharedStore) -> Self {
        Self { store }
    }

    pub async fn create_classroom(&self, req: CreateClassroomRequest) -> Result<Classroom> {
        let programs = ProgramService::new(self.store.clone());
        programs.get_program(&req.program_id).await?;

        req.evaluation_criteria
            .validate_total()
            .map_err(|e| anyhow!(e))?;

        let mut modules: Vec<Module> = req
            .modules
            .into_iter()
            .map(|m| Module {
                id: new_document_id(),
                name: m.name,
                week_number: m.week_number,
                is_completed: false,
                description: m.description,
            })
            .collect();
        modules.sort_by_key(|m| m.week_number);

        let classroom = Classroom {
            id: String::new(),
            program_id: req.program_id.clone(),
            name: req.name,
            subject: req.subject,
            teacher_id: None,
            student_ids: Vec::new(),
            current_module: modules.first().map(|m| m.id.clone()),
            modules,
            is_active: true,
            evaluation_criteria: req.evaluation_criteria,
            start_date: Some(Utc::now()),
            end_date: None,
            schedule: req.schedule,
            room: req.room,
            whatsapp_group_id: None,
            created_at: None,
            updated_at: None,
        };

        let id = self
            .store
            .create_from(CLASSROOMS, &classroom)
            .await
            .context("Failed to insert classroom")?;

        programs.attach_classroom(&req.program_id, &id).await?;

        if let Some(teacher_id) = req.teacher_id.as_deref() {
            UserService::new(self.store.clone())
                .assign_teacher(&id, teacher_id)
                .await?;
        }

        tracing::info!(classroom_id = %id, program_id = %req.program_id, "Classroom created");
        self.get_classroom(&id).await
    }

    pub async fn get_classroom(&self, classroom_id: &str) -> Result<Classroom> {
        require(&*self.store, CLASSROOMS, classroom_id, "Classroom").await
    }

    pub async fn list_classrooms(&self, query: ListClassroomsQuery) -> Result<Vec<Classroom>> {
        let mut filter = Query::new();
        if let Some(program_id) = query.program_id {
            filter = filter.eq("programId", program_id);
        }
        if let Some(teacher_id) = query.teacher_id {
            filter = filter.eq("teacherId", teacher_id);
        }
        if let Some(is_active) = query.is_active {
            filter = filter.eq("isActive", is_active);
        }

        self.store
            .query_as(CLASSROOMS, filter)
            .await
            .context("Failed to query classrooms")
    }

    pub async fn update_classroom(
        &self,
        classroom_id: &str,
        req: UpdateClassroomRequest,
    ) -> Result<Classroom> {
        self.get_classroom(classroom_id).await?;

        let mut update = Update::new();
        if let Some(name) = req.name {
            update = update.set("name", name);
        }
        if let Some(subject) = req.subject {
            update = update.set("subject", subject);
        }
        if let Some(criteria) = req.evaluation_criteria {
            criteria.validate_total().map_err(|e| anyhow!(e))?;
            update = update.set_serialized("evaluationCriteria", &criteria)?;
        }
        if let Some(schedule) = req.schedule {
            update = update.set("schedule", schedule);
        }
        if let Some(room) = req.room {
            update = update.set("room", room);
        }

        self.store
            .update(CLASSROOMS, classroom_id, update)
            .await
            .context("Failed to update classroom")?;

        self.get_classroom(classroom_id).await
    }

    /// Removes the classroom with its records, snapshots and runs, its program
    /// link and every member's reference.
    pub async fn delete_classroom(&self, classroom_id: &str) -> Result<()> {
        let classroom = self.get_classroom(classroom_id).await?;

        for student_id in &classroom.student_ids {
            let Some(student) = self
                .store
                .get_as::<User>(USERS, student_id)
                .await
                .context("Failed to load student")?
            else {
                continue;
            };
            let enrolled: Vec<String> = student
                .enrolled_classrooms
                .into_iter()
                .filter(|id| id != classroom_id)
                .collect();
            self.store
                .update(
                    USERS,
                    student_id,
                    Update::new().set_serialized("enrolledClassrooms", &enrolled)?,
                )
                .await
                .context("Failed to detach student")?;
        }

        if let Some(teacher_id) = classroom.teacher_id.as_deref() {
            if let Some(teacher) = self
                .store
                .get_as::<User>(USERS, teacher_id)
                .await
                .context("Failed to load teacher")?
            {
                let teaching: Vec<String> = teacher
                    .teaching_classrooms
                    .into_iter()
                    .filter(|id| id != classroom_id)
                    .collect();
                self.store
                    .update(
                        USERS,
                        teacher_id,
                        Update::new().set_serialized("teachingClassrooms", &teaching)?,
                    )
                    .await
                    .context("Failed to detach teacher")?;
            }
        }

        if let Err(err) = ProgramService::new(self.store.clone())
            .detach_classroom(&classroom.program_id, classroom_id)
            .await
        {
            tracing::warn!(classroom_id, "Program link not removed: {:#}", err);
        }

        EvaluationService::new(self.store.clone())
            .clear_classroom_records(classroom_id)
            .await?;
        for collection in [FINALIZATION_SNAPSHOTS, CLASSROOM_RUNS] {
            self.store
                .delete_matching(collection, Query::new().eq("classroomId", classroom_id))
                .await
                .with_context(|| format!("Failed to delete {}", collection))?;
        }

        self.store
            .delete(CLASSROOMS, classroom_id)
            .await
            .context("Failed to delete classroom")?;

        tracing::info!(classroom_id, "Classroom deleted");
        Ok(())
    }

    /// Flips a module's completion flag and re-points `currentModule` at the
    /// first incomplete module, or the last one once all are complete.
    pub async fn set_module_completion(
        &self,
        classroom_id: &str,
        module_id: &str,
        is_completed: bool,
    ) -> Result<Classroom> {
        let mut classroom = self.get_classroom(classroom_id).await?;

        let module = classroom
            .modules
            .iter_mut()
            .find(|m| m.id == module_id)
            .ok_or_else(|| anyhow!("Module not found"))?;
        module.is_completed = is_completed;

        let current = {
            let ordered = classroom.modules_by_week();
            ordered
                .iter()
                .find(|m| !m.is_completed)
                .or_else(|| ordered.last())
                .map(|m| m.id.clone())
        };

        let mut update = Update::new().set_serialized("modules", &classroom.modules)?;
        update = match current {
            Some(id) => update.set("currentModule", id),
            None => update.unset("currentModule"),
        };

        self.store
            .update(CLASSROOMS, classroom_id, update)
            .await
            .context("Failed to update module completion")?;

        self.get_classroom(classroom_id).await
    }
}
