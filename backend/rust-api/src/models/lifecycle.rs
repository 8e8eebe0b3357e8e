//! Inputs and structured results of the classroom lifecycle operations.
//!
//! Results always carry their errors as data; `success` means "no errors".

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ValidationReport {
    pub is_valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationReport {
    pub fn new() -> Self {
        Self {
            is_valid: true,
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    pub fn error(&mut self, message: impl Into<String>) {
        self.is_valid = false;
        self.errors.push(message.into());
    }

    pub fn warning(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalizeOptions {
    /// Proceed even when validation fails
    #[serde(default)]
    pub force: bool,
    #[serde(default)]
    pub skip_notifications: bool,
    #[serde(default)]
    pub archive_whatsapp_group: bool,
    pub custom_completion_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FinalizeResult {
    pub success: bool,
    pub classroom_id: String,
    pub students_processed: u32,
    pub teacher_processed: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub can_revert: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snapshot_id: Option<String>,
    /// Some migrations failed and the classroom was left active
    pub partially_finalized: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completion_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct BatchFinalizeRequest {
    #[validate(length(min = 1, max = 50, message = "Between 1 and 50 classrooms per batch"))]
    pub classroom_ids: Vec<String>,
    #[serde(default)]
    pub options: FinalizeOptions,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevertRequest {
    /// Snapshot returned by finalize; latest one when absent
    pub snapshot_id: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RevertResult {
    pub success: bool,
    pub classroom_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snapshot_id: Option<String>,
    pub students_restored: u32,
    pub teacher_restored: bool,
    pub errors: Vec<String>,
    pub can_revert: bool,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RestartRequest {
    #[validate(length(max = 2000, message = "Notes must be at most 2000 characters"))]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RestartResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_number: Option<u32>,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanupSnapshotsQuery {
    #[serde(default = "default_keep_latest")]
    pub keep_latest: usize,
}

fn default_keep_latest() -> usize {
    1
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CleanupSnapshotsResult {
    pub deleted: u32,
    pub kept: u32,
}
