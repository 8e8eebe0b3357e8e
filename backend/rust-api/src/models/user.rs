use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

/// User record stored in the "users" collection.
///
/// Students carry `enrolledClassrooms`/`completedClassrooms`, teachers carry
/// `teachingClassrooms`/`taughtClassrooms`. A user may be both.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct User {
    #[serde(rename = "_id", default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default)]
    pub role: UserRole,
    #[serde(default)]
    pub is_teacher: bool,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub enrolled_classrooms: Vec<String>,
    #[serde(default)]
    pub completed_classrooms: Vec<ClassroomHistory>,
    #[serde(default)]
    pub teaching_classrooms: Vec<String>,
    #[serde(default)]
    pub taught_classrooms: Vec<ClassroomHistory>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

fn default_true() -> bool {
    true
}

impl User {
    /// Teachers are either `role = teacher` or users flagged `isTeacher`.
    pub fn can_teach(&self) -> bool {
        self.role == UserRole::Teacher || self.is_teacher
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    #[default]
    Student,
    Teacher,
    Admin,
}

impl UserRole {
    pub fn as_str(&self) -> &str {
        match self {
            UserRole::Student => "student",
            UserRole::Teacher => "teacher",
            UserRole::Admin => "admin",
        }
    }
}

/// Role a user held inside one classroom
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ClassroomRole {
    Student,
    Teacher,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CompletionStatus {
    Completed,
    Dropped,
    Failed,
}

/// Entry of `completedClassrooms` / `taughtClassrooms`.
///
/// `finalGrade` is absent when no finite grade exists and always absent on
/// teacher entries.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ClassroomHistory {
    pub classroom_id: String,
    pub classroom_name: String,
    pub program_id: String,
    #[serde(default)]
    pub program_name: String,
    pub role: ClassroomRole,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enrolled_at: Option<DateTime<Utc>>,
    pub completed_at: DateTime<Utc>,
    pub status: CompletionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_grade: Option<f64>,
}

/// Replaces the entry for the same (classroom, role) or appends a new one.
pub fn upsert_history(history: &mut Vec<ClassroomHistory>, entry: ClassroomHistory) {
    match history
        .iter_mut()
        .find(|h| h.classroom_id == entry.classroom_id && h.role == entry.role)
    {
        Some(existing) => *existing = entry,
        None => history.push(entry),
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateUserRequest {
    #[validate(length(
        min = 1,
        max = 100,
        message = "Name must be between 1 and 100 characters"
    ))]
    pub name: String,

    #[validate(email(message = "Invalid email format"))]
    pub email: String,

    #[validate(length(min = 7, max = 20, message = "Phone must be between 7 and 20 characters"))]
    pub phone: Option<String>,

    pub role: Option<UserRole>,

    #[serde(default)]
    pub is_teacher: bool,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateUserRequest {
    #[validate(length(
        min = 1,
        max = 100,
        message = "Name must be between 1 and 100 characters"
    ))]
    pub name: Option<String>,

    #[validate(email(message = "Invalid email format"))]
    pub email: Option<String>,

    #[validate(length(min = 7, max = 20, message = "Phone must be between 7 and 20 characters"))]
    pub phone: Option<String>,

    pub role: Option<UserRole>,

    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListUsersQuery {
    pub role: Option<UserRole>,
    pub is_teacher: Option<bool>,
    /// Students currently enrolled in this classroom
    pub classroom_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeacherFlagRequest {
    pub is_teacher: bool,
}
