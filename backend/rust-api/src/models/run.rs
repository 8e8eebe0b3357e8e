use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::classroom::{EvaluationCriteria, Module};
use super::user::CompletionStatus;
use super::PASSING_GRADE;
use crate::utils::time::round2;

/// Immutable record of one complete execution of a classroom
/// ("classroom_runs"). Created once at restart time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ClassroomRun {
    #[serde(rename = "_id", default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    pub classroom_id: String,
    pub classroom_name: String,
    #[serde(default)]
    pub subject: String,
    pub program_id: String,
    #[serde(default)]
    pub program_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub teacher_id: Option<String>,
    #[serde(default)]
    pub teacher_name: String,
    #[serde(default)]
    pub evaluation_criteria: EvaluationCriteria,
    #[serde(default)]
    pub modules: Vec<Module>,
    #[serde(default)]
    pub students: Vec<StudentRunRecord>,
    pub total_students: u32,
    pub statistics: RunStatistics,
    pub run_number: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub created_by: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StudentRunRecord {
    pub student_id: String,
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_grade: Option<f64>,
    pub status: CompletionStatus,
    pub attendance_rate: f64,
    pub participation_points: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enrolled_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl StudentRunRecord {
    /// Grade used for statistics; students without one count as 0
    pub fn grade(&self) -> f64 {
        self.final_grade.unwrap_or(0.0)
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct GradeDistribution {
    /// >= 90
    pub excellent: u32,
    /// 80..90
    pub good: u32,
    /// 70..80
    pub regular: u32,
    /// < 70
    pub poor: u32,
}

impl GradeDistribution {
    pub fn record(&mut self, grade: f64) {
        if grade >= 90.0 {
            self.excellent += 1;
        } else if grade >= 80.0 {
            self.good += 1;
        } else if grade >= PASSING_GRADE {
            self.regular += 1;
        } else {
            self.poor += 1;
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RunStatistics {
    pub average_grade: f64,
    pub pass_rate: f64,
    pub attendance_rate: f64,
    pub total_participation_points: f64,
    pub highest_grade: f64,
    pub lowest_grade: f64,
    pub distribution: GradeDistribution,
}

impl RunStatistics {
    /// Aggregates over a cohort.
    ///
    /// Average, highest and lowest only consider non-zero grades; pass rate
    /// and distribution are over every student.
    pub fn from_students(students: &[StudentRunRecord]) -> Self {
        if students.is_empty() {
            return Self::default();
        }

        let total = students.len() as f64;
        let graded: Vec<f64> = students
            .iter()
            .map(StudentRunRecord::grade)
            .filter(|g| *g > 0.0)
            .collect();

        let average_grade = if graded.is_empty() {
            0.0
        } else {
            graded.iter().sum::<f64>() / graded.len() as f64
        };
        let highest_grade = graded.iter().cloned().fold(0.0, f64::max);
        let lowest_grade = if graded.is_empty() {
            0.0
        } else {
            graded.iter().cloned().fold(f64::INFINITY, f64::min)
        };

        let passed = students
            .iter()
            .filter(|s| s.grade() >= PASSING_GRADE)
            .count() as f64;

        let mut distribution = GradeDistribution::default();
        for student in students {
            distribution.record(student.grade());
        }

        Self {
            average_grade: round2(average_grade),
            pass_rate: round2(passed / total * 100.0),
            attendance_rate: round2(
                students.iter().map(|s| s.attendance_rate).sum::<f64>() / total,
            ),
            total_participation_points: students.iter().map(|s| s.participation_points).sum(),
            highest_grade,
            lowest_grade,
            distribution,
        }
    }
}

/// Reference to a run inside aggregate statistics
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub run_id: String,
    pub run_number: u32,
    pub average_grade: f64,
}

/// Aggregates across every run of a classroom
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RunHistoryStats {
    pub total_runs: u32,
    pub total_students: u32,
    pub average_grade: f64,
    pub average_pass_rate: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub best_run: Option<RunSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub worst_run: Option<RunSummary>,
}

impl RunHistoryStats {
    pub fn from_runs(runs: &[ClassroomRun]) -> Self {
        if runs.is_empty() {
            return Self::default();
        }

        let count = runs.len() as f64;
        let summary = |run: &ClassroomRun| RunSummary {
            run_id: run.id.clone(),
            run_number: run.run_number,
            average_grade: run.statistics.average_grade,
        };

        let by_grade = |a: &&ClassroomRun, b: &&ClassroomRun| {
            a.statistics
                .average_grade
                .partial_cmp(&b.statistics.average_grade)
                .unwrap_or(std::cmp::Ordering::Equal)
        };

        Self {
            total_runs: runs.len() as u32,
            total_students: runs.iter().map(|r| r.total_students).sum(),
            average_grade: round2(
                runs.iter().map(|r| r.statistics.average_grade).sum::<f64>() / count,
            ),
            average_pass_rate: round2(runs.iter().map(|r| r.statistics.pass_rate).sum::<f64>() / count),
            best_run: runs.iter().max_by(by_grade).map(summary),
            worst_run: runs.iter().min_by(by_grade).map(summary),
        }
    }
}
