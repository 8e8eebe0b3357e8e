use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::classroom::Classroom;
use super::user::ClassroomHistory;

/// Point-in-time copy taken right before a finalization mutates anything.
/// Never updated; consulted by revert.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FinalizationSnapshot {
    #[serde(rename = "_id", default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    pub classroom_id: String,
    pub classroom: Classroom,
    #[serde(default)]
    pub students: Vec<StudentListsSnapshot>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub teacher: Option<TeacherListsSnapshot>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StudentListsSnapshot {
    pub user_id: String,
    #[serde(default)]
    pub enrolled_classrooms: Vec<String>,
    #[serde(default)]
    pub completed_classrooms: Vec<ClassroomHistory>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TeacherListsSnapshot {
    pub user_id: String,
    #[serde(default)]
    pub teaching_classrooms: Vec<String>,
    #[serde(default)]
    pub taught_classrooms: Vec<ClassroomHistory>,
}
