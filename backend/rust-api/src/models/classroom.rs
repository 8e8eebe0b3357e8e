use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Points every set of evaluation criteria must add up to
pub const CRITERIA_TOTAL_POINTS: u32 = 100;

/// Classroom stored in the "classrooms" collection.
///
/// Live: `isActive = true` and no `endDate`.
/// Finalized: `isActive = false` and `endDate` set.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Classroom {
    #[serde(rename = "_id", default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    pub program_id: String,
    pub name: String,
    #[serde(default)]
    pub subject: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub teacher_id: Option<String>,
    #[serde(default)]
    pub student_ids: Vec<String>,
    #[serde(default)]
    pub modules: Vec<Module>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_module: Option<String>,
    #[serde(default)]
    pub is_active: bool,
    #[serde(default)]
    pub evaluation_criteria: EvaluationCriteria,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schedule: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub whatsapp_group_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Classroom {
    pub fn is_finalized(&self) -> bool {
        !self.is_active && self.end_date.is_some()
    }

    /// Modules ordered by week number
    pub fn modules_by_week(&self) -> Vec<&Module> {
        let mut modules: Vec<&Module> = self.modules.iter().collect();
        modules.sort_by_key(|m| m.week_number);
        modules
    }

    pub fn first_module(&self) -> Option<&Module> {
        self.modules_by_week().into_iter().next()
    }

    pub fn current_module(&self) -> Option<&Module> {
        let current = self.current_module.as_deref()?;
        self.modules.iter().find(|m| m.id == current)
    }

    /// Module following the current one by week number
    pub fn next_module(&self) -> Option<&Module> {
        let current = self.current_module()?;
        self.modules_by_week()
            .into_iter()
            .find(|m| m.week_number > current.week_number)
    }

    pub fn incomplete_modules(&self) -> usize {
        self.modules.iter().filter(|m| !m.is_completed).count()
    }
}

/// One week/unit of a classroom's curriculum
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Module {
    #[serde(default)]
    pub id: String,
    pub name: String,
    pub week_number: u32,
    #[serde(default)]
    pub is_completed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Point allocation used to grade students; must total 100 points.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationCriteria {
    #[serde(default)]
    pub attendance: u32,
    #[serde(default)]
    pub participation: u32,
    #[serde(default)]
    pub assignments: u32,
    #[serde(default)]
    pub final_project: u32,
    #[serde(default)]
    pub custom: Vec<CustomCriterion>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CustomCriterion {
    pub name: String,
    pub points: u32,
}

impl EvaluationCriteria {
    pub fn total_points(&self) -> u32 {
        self.attendance
            + self.participation
            + self.assignments
            + self.final_project
            + self.custom.iter().map(|c| c.points).sum::<u32>()
    }

    pub fn validate_total(&self) -> Result<(), String> {
        let total = self.total_points();
        if total != CRITERIA_TOTAL_POINTS {
            return Err(format!(
                "Los criterios de evaluación deben sumar {} puntos (actual: {})",
                CRITERIA_TOTAL_POINTS, total
            ));
        }

        let mut seen = HashSet::new();
        for criterion in &self.custom {
            if criterion.name.trim().is_empty() {
                return Err("Los criterios personalizados requieren un nombre".to_string());
            }
            if !seen.insert(criterion.name.as_str()) {
                return Err(format!("Criterio duplicado: {}", criterion.name));
            }
        }
        Ok(())
    }

    pub fn custom_allocation(&self, name: &str) -> Option<u32> {
        self.custom.iter().find(|c| c.name == name).map(|c| c.points)
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateClassroomRequest {
    #[validate(length(min = 1, message = "Program is required"))]
    pub program_id: String,

    #[validate(length(
        min = 1,
        max = 150,
        message = "Name must be between 1 and 150 characters"
    ))]
    pub name: String,

    #[serde(default)]
    pub subject: String,

    pub teacher_id: Option<String>,

    #[serde(default)]
    #[validate(nested)]
    pub modules: Vec<ModuleInput>,

    pub evaluation_criteria: EvaluationCriteria,

    pub schedule: Option<String>,
    pub room: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ModuleInput {
    #[validate(length(min = 1, max = 150, message = "Module name must be between 1 and 150 characters"))]
    pub name: String,
    #[validate(range(min = 1, max = 104, message = "Week number must be between 1 and 104"))]
    pub week_number: u32,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateClassroomRequest {
    #[validate(length(
        min = 1,
        max = 150,
        message = "Name must be between 1 and 150 characters"
    ))]
    pub name: Option<String>,
    pub subject: Option<String>,
    pub evaluation_criteria: Option<EvaluationCriteria>,
    pub schedule: Option<String>,
    pub room: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListClassroomsQuery {
    pub program_id: Option<String>,
    pub teacher_id: Option<String>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignTeacherRequest {
    pub teacher_id: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleCompletionRequest {
    pub is_completed: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn module(id: &str, week: u32, done: bool) -> Module {
        Module {
            id: id.to_string(),
            name: format!("Semana {}", week),
            week_number: week,
            is_completed: done,
            description: None,
        }
    }

    fn classroom(modules: Vec<Module>, current: Option<&str>) -> Classroom {
        Classroom {
            id: "c1".to_string(),
            program_id: "p1".to_string(),
            name: "Aula".to_string(),
            subject: "Matemáticas".to_string(),
            teacher_id: None,
            student_ids: vec![],
            modules,
            current_module: current.map(str::to_string),
            is_active: true,
            evaluation_criteria: EvaluationCriteria::default(),
            start_date: None,
            end_date: None,
            schedule: None,
            room: None,
            whatsapp_group_id: None,
            created_at: None,
            updated_at: None,
        }
    }

    #[test]
    fn criteria_must_total_one_hundred() {
        let criteria = EvaluationCriteria {
            attendance: 20,
            participation: 20,
            assignments: 30,
            final_project: 20,
            custom: vec![CustomCriterion {
                name: "Quiz".to_string(),
                points: 10,
            }],
        };
        assert!(criteria.validate_total().is_ok());

        let short = EvaluationCriteria {
            attendance: 50,
            ..Default::default()
        };
        let err = short.validate_total().unwrap_err();
        assert!(err.contains("actual: 50"));
    }

    #[test]
    fn duplicate_custom_criteria_are_rejected() {
        let criteria = EvaluationCriteria {
            attendance: 80,
            custom: vec![
                CustomCriterion { name: "Quiz".to_string(), points: 10 },
                CustomCriterion { name: "Quiz".to_string(), points: 10 },
            ],
            ..Default::default()
        };
        assert!(criteria.validate_total().unwrap_err().contains("duplicado"));
    }

    #[test]
    fn current_and_next_module_follow_week_order() {
        let c = classroom(
            vec![module("m3", 3, false), module("m1", 1, true), module("m2", 2, false)],
            Some("m1"),
        );
        assert_eq!(c.first_module().unwrap().id, "m1");
        assert_eq!(c.current_module().unwrap().id, "m1");
        assert_eq!(c.next_module().unwrap().id, "m2");
        assert_eq!(c.incomplete_modules(), 2);
    }

    #[test]
    fn finalized_requires_inactive_and_end_date() {
        let mut c = classroom(vec![], None);
        assert!(!c.is_finalized());
        c.is_active = false;
        assert!(!c.is_finalized());
        c.end_date = Some(Utc::now());
        assert!(c.is_finalized());
    }
}
