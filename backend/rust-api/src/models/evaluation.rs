use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum EvaluationStatus {
    #[default]
    Pending,
    InProgress,
    Evaluated,
}

/// Scored evaluation of one student in one classroom ("evaluations").
///
/// The document id is derived from the pair, so saving twice overwrites.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StudentEvaluation {
    #[serde(rename = "_id", default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    pub classroom_id: String,
    pub student_id: String,
    #[serde(default)]
    pub attendance_points: f64,
    #[serde(default)]
    pub participation_points: f64,
    #[serde(default)]
    pub assignments_points: f64,
    #[serde(default)]
    pub final_project_points: f64,
    #[serde(default)]
    pub custom_points: BTreeMap<String, f64>,
    #[serde(default)]
    pub total_points: f64,
    /// Total points as a percentage of the criteria total. May be missing or
    /// non-finite on records written by older clients.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub percentage: Option<f64>,
    #[serde(default)]
    pub status: EvaluationStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comments: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evaluated_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl StudentEvaluation {
    pub fn document_id(classroom_id: &str, student_id: &str) -> String {
        format!("{}_{}", classroom_id, student_id)
    }

    /// Percentage usable as a final grade
    pub fn finite_percentage(&self) -> Option<f64> {
        self.percentage.filter(|p| p.is_finite())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AttendanceStatus {
    Present,
    Absent,
    Late,
    Excused,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceRecord {
    #[serde(rename = "_id", default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    pub classroom_id: String,
    pub student_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub module_id: Option<String>,
    pub date: DateTime<Utc>,
    pub status: AttendanceStatus,
}

/// Participation points awarded to a student during a session
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ParticipationRecord {
    #[serde(rename = "_id", default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    pub classroom_id: String,
    pub student_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub module_id: Option<String>,
    pub points: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

/// Attendance as a percentage of all records; 0 when there are none.
pub fn attendance_rate(records: &[AttendanceRecord]) -> f64 {
    if records.is_empty() {
        return 0.0;
    }
    let present = records
        .iter()
        .filter(|r| r.status == AttendanceStatus::Present)
        .count();
    present as f64 / records.len() as f64 * 100.0
}

pub fn participation_total(records: &[ParticipationRecord]) -> f64 {
    records.iter().map(|r| r.points).sum()
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RecordAttendanceRequest {
    #[validate(length(min = 1, message = "Student is required"))]
    pub student_id: String,
    pub module_id: Option<String>,
    pub date: Option<DateTime<Utc>>,
    pub status: AttendanceStatus,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RecordParticipationRequest {
    #[validate(length(min = 1, message = "Student is required"))]
    pub student_id: String,
    pub module_id: Option<String>,
    #[validate(range(min = 0.0, max = 100.0, message = "Points must be between 0 and 100"))]
    pub points: f64,
    pub note: Option<String>,
}

/// Points per criterion; the service checks each against its allocation.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SaveEvaluationRequest {
    #[serde(default)]
    pub attendance_points: f64,
    #[serde(default)]
    pub participation_points: f64,
    #[serde(default)]
    pub assignments_points: f64,
    #[serde(default)]
    pub final_project_points: f64,
    #[serde(default)]
    pub custom_points: BTreeMap<String, f64>,
    pub status: Option<EvaluationStatus>,
    #[validate(length(max = 2000, message = "Comments must be at most 2000 characters"))]
    pub comments: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentRecordsQuery {
    pub student_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attendance(status: AttendanceStatus) -> AttendanceRecord {
        AttendanceRecord {
            id: String::new(),
            classroom_id: "c1".to_string(),
            student_id: "s1".to_string(),
            module_id: None,
            date: Utc::now(),
            status,
        }
    }

    #[test]
    fn attendance_rate_counts_only_present() {
        let records = vec![
            attendance(AttendanceStatus::Present),
            attendance(AttendanceStatus::Late),
            attendance(AttendanceStatus::Present),
            attendance(AttendanceStatus::Absent),
        ];
        assert_eq!(attendance_rate(&records), 50.0);
        assert_eq!(attendance_rate(&[]), 0.0);
    }

    #[test]
    fn non_finite_percentage_is_not_a_grade() {
        let mut evaluation = StudentEvaluation {
            id: String::new(),
            classroom_id: "c1".to_string(),
            student_id: "s1".to_string(),
            attendance_points: 0.0,
            participation_points: 0.0,
            assignments_points: 0.0,
            final_project_points: 0.0,
            custom_points: BTreeMap::new(),
            total_points: 0.0,
            percentage: Some(f64::NAN),
            status: EvaluationStatus::Evaluated,
            comments: None,
            evaluated_by: None,
            created_at: None,
            updated_at: None,
        };
        assert_eq!(evaluation.finite_percentage(), None);

        evaluation.percentage = Some(85.0);
        assert_eq!(evaluation.finite_percentage(), Some(85.0));
    }
}
