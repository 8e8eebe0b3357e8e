use anyhow::{anyhow, bail, Context, Result};

use crate::models::classroom::Classroom;
use crate::models::collections::{CLASSROOMS, USERS};
use crate::models::user::{
    ClassroomRole, CreateUserRequest, ListUsersQuery, UpdateUserRequest, User, UserRole,
};
use crate::services::require;
use crate::store::{Query, SharedStore, Update};

/// CRUD over users plus enrollment/teaching bookkeeping
pub struct UserService {
    store: SharedStore,
}

impl UserService {
    pub fn new(store: SharedStore) -> Self {
        Self { store }
    }

    pub async fn create_user(&self, req: CreateUserRequest) -> Result<User> {
        let existing: Vec<User> = self
            .store
            .query_as(USERS, Query::new().eq("email", req.email.as_str()).limit(1))
            .await
            .context("Failed to check existing user")?;
        if !existing.is_empty() {
            bail!("User with this email already exists");
        }

        let role = req.role.unwrap_or_default();
        let user = User {
            id: String::new(),
            name: req.name,
            email: req.email,
            phone: req.phone,
            role,
            is_teacher: req.is_teacher || role == UserRole::Teacher,
            is_active: true,
            enrolled_classrooms: Vec::new(),
            completed_classrooms: Vec::new(),
            teaching_classrooms: Vec::new(),
            taught_classrooms: Vec::new(),
            created_at: None,
            updated_at: None,
        };

        let id = self
            .store
            .create_from(USERS, &user)
            .await
            .context("Failed to insert user")?;

        tracing::info!(user_id = %id, role = role.as_str(), "User created");
        self.get_user(&id).await
    }

    pub async fn get_user(&self, user_id: &str) -> Result<User> {
        require(&*self.store, USERS, user_id, "User").await
    }

    pub async fn list_users(&self, query: ListUsersQuery) -> Result<Vec<User>> {
        let mut filter = Query::new();
        if let Some(role) = query.role {
            filter = filter.eq("role", role.as_str());
        }
        if let Some(is_teacher) = query.is_teacher {
            filter = filter.eq("isTeacher", is_teacher);
        }
        if let Some(classroom_id) = query.classroom_id {
            filter = filter.array_contains("enrolledClassrooms", classroom_id);
        }

        self.store
            .query_as(USERS, filter)
            .await
            .context("Failed to query users")
    }

    pub async fn update_user(&self, user_id: &str, req: UpdateUserRequest) -> Result<User> {
        self.get_user(user_id).await?;

        let mut update = Update::new();
        if let Some(name) = req.name {
            update = update.set("name", name);
        }
        if let Some(email) = req.email {
            update = update.set("email", email);
        }
        if let Some(phone) = req.phone {
            update = update.set("phone", phone);
        }
        if let Some(role) = req.role {
            update = update.set("role", role.as_str());
            if role == UserRole::Teacher {
                update = update.set("isTeacher", true);
            }
        }
        if let Some(is_active) = req.is_active {
            update = update.set("isActive", is_active);
        }

        self.store
            .update(USERS, user_id, update)
            .await
            .context("Failed to update user")?;

        self.get_user(user_id).await
    }

    /// Deletes a user and detaches them from every classroom they sit in.
    pub async fn delete_user(&self, user_id: &str) -> Result<()> {
        let user = self.get_user(user_id).await?;

        for classroom_id in &user.enrolled_classrooms {
            if let Some(classroom) = self
                .store
                .get_as::<Classroom>(CLASSROOMS, classroom_id)
                .await
                .context("Failed to load classroom")?
            {
                let student_ids: Vec<String> = classroom
                    .student_ids
                    .into_iter()
                    .filter(|id| id != user_id)
                    .collect();
                self.store
                    .update(
                        CLASSROOMS,
                        classroom_id,
                        Update::new().set_serialized("studentIds", &student_ids)?,
                    )
                    .await
                    .context("Failed to detach student from classroom")?;
            }
        }

        for classroom_id in &user.teaching_classrooms {
            match self.store.update(CLASSROOMS, classroom_id, Update::new().unset("teacherId")).await {
                Ok(()) | Err(crate::store::StoreError::NotFound { .. }) => {}
                Err(err) => return Err(err).context("Failed to detach teacher from classroom"),
            }
        }

        self.store
            .delete(USERS, user_id)
            .await
            .context("Failed to delete user")?;

        tracing::info!(user_id, "User deleted");
        Ok(())
    }

    pub async fn set_teacher_flag(&self, user_id: &str, is_teacher: bool) -> Result<User> {
        let user = self.get_user(user_id).await?;
        if !is_teacher && !user.teaching_classrooms.is_empty() {
            bail!(
                "User still teaches {} classroom(s)",
                user.teaching_classrooms.len()
            );
        }

        self.store
            .update(USERS, user_id, Update::new().set("isTeacher", is_teacher))
            .await
            .context("Failed to update teacher flag")?;

        self.get_user(user_id).await
    }

    /// Adds a student to a live classroom.
    ///
    /// A previous student-role completion of the same classroom is dropped
    /// from the student's history; the classroom's run records keep it.
    pub async fn enroll_student(&self, classroom_id: &str, student_id: &str) -> Result<Classroom> {
        let classroom: Classroom = require(&*self.store, CLASSROOMS, classroom_id, "Classroom").await?;
        if !classroom.is_active {
            bail!("Cannot enroll into an inactive classroom");
        }
        let student = self.get_user(student_id).await?;
        if !student.is_active {
            bail!("Cannot enroll an inactive user");
        }

        if !classroom.student_ids.iter().any(|id| id == student_id) {
            let mut student_ids = classroom.student_ids.clone();
            student_ids.push(student_id.to_string());
            self.store
                .update(
                    CLASSROOMS,
                    classroom_id,
                    Update::new().set_serialized("studentIds", &student_ids)?,
                )
                .await
                .context("Failed to add student to classroom")?;
        }

        let mut enrolled = student.enrolled_classrooms;
        if !enrolled.iter().any(|id| id == classroom_id) {
            enrolled.push(classroom_id.to_string());
        }
        let completed: Vec<_> = student
            .completed_classrooms
            .into_iter()
            .filter(|h| !(h.classroom_id == classroom_id && h.role == ClassroomRole::Student))
            .collect();

        self.store
            .update(
                USERS,
                student_id,
                Update::new()
                    .set_serialized("enrolledClassrooms", &enrolled)?
                    .set_serialized("completedClassrooms", &completed)?,
            )
            .await
            .context("Failed to update student enrollment")?;

        tracing::info!(classroom_id, student_id, "Student enrolled");
        require(&*self.store, CLASSROOMS, classroom_id, "Classroom").await
    }

    pub async fn unenroll_student(&self, classroom_id: &str, student_id: &str) -> Result<Classroom> {
        let classroom: Classroom = require(&*self.store, CLASSROOMS, classroom_id, "Classroom").await?;
        let student = self.get_user(student_id).await?;

        if !classroom.student_ids.iter().any(|id| id == student_id) {
            return Err(anyhow!("Student not found in classroom"));
        }

        let student_ids: Vec<String> = classroom
            .student_ids
            .into_iter()
            .filter(|id| id != student_id)
            .collect();
        self.store
            .update(
                CLASSROOMS,
                classroom_id,
                Update::new().set_serialized("studentIds", &student_ids)?,
            )
            .await
            .context("Failed to remove student from classroom")?;

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
            .context("Failed to update student enrollment")?;

        tracing::info!(classroom_id, student_id, "Student unenrolled");
        require(&*self.store, CLASSROOMS, classroom_id, "Classroom").await
    }

    /// Moves the classroom from its current teacher (if any) to `teacher_id`.
    pub async fn assign_teacher(&self, classroom_id: &str, teacher_id: &str) -> Result<Classroom> {
        let classroom: Classroom = require(&*self.store, CLASSROOMS, classroom_id, "Classroom").await?;
        let teacher = self.get_user(teacher_id).await?;
        if !teacher.can_teach() {
            bail!("User must have the teacher role or flag");
        }

        if let Some(previous_id) = classroom.teacher_id.as_deref() {
            if previous_id != teacher_id {
                match self.get_user(previous_id).await {
                    Ok(previous) => {
                        let teaching: Vec<String> = previous
                            .teaching_classrooms
                            .into_iter()
                            .filter(|id| id != classroom_id)
                            .collect();
                        self.store
                            .update(
                                USERS,
                                previous_id,
                                Update::new().set_serialized("teachingClassrooms", &teaching)?,
                            )
                            .await
                            .context("Failed to detach previous teacher")?;
                    }
                    Err(err) => {
                        tracing::warn!(previous_id, "Previous teacher not loaded: {}", err);
                    }
                }
            }
        }

        let mut teaching = teacher.teaching_classrooms;
        if !teaching.iter().any(|id| id == classroom_id) {
            teaching.push(classroom_id.to_string());
        }
        let taught: Vec<_> = teacher
            .taught_classrooms
            .into_iter()
            .filter(|h| !(h.classroom_id == classroom_id && h.role == ClassroomRole::Teacher))
            .collect();

        self.store
            .update(
                USERS,
                teacher_id,
                Update::new()
                    .set_serialized("teachingClassrooms", &teaching)?
                    .set_serialized("taughtClassrooms", &taught)?,
            )
            .await
            .context("Failed to update teacher")?;

        self.store
            .update(CLASSROOMS, classroom_id, Update::new().set("teacherId", teacher_id))
            .await
            .context("Failed to assign teacher")?;

        tracing::info!(classroom_id, teacher_id, "Teacher assigned");
        require(&*self.store, CLASSROOMS, classroom_id, "Classroom").await
    }
}
