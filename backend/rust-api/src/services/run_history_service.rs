use anyhow::{Context, Result};

use crate::models::collections::CLASSROOM_RUNS;
use crate::models::run::{ClassroomRun, RunHistoryStats};
use crate::services::require;
use crate::store::{Query, SharedStore, SortDirection};

/// Read-only access to archived runs
pub struct RunHistoryService {
    store: SharedStore,
}

impl RunHistoryService {
    pub fn new(store: SharedStore) -> Self {
        Self { store }
    }

    /// Runs of a classroom, newest run number first
    pub async fn list_runs(&self, classroom_id: &str) -> Result<Vec<ClassroomRun>> {
        self.store
            .query_as(
                CLASSROOM_RUNS,
                Query::new()
                    .eq("classroomId", classroom_id)
                    .order_by("runNumber", SortDirection::Descending),
            )
            .await
            .context("Failed to query classroom runs")
    }

    pub async fn get_run(&self, run_id: &str) -> Result<ClassroomRun> {
        require(&*self.store, CLASSROOM_RUNS, run_id, "Run").await
    }

    pub async fn run_stats(&self, classroom_id: &str) -> Result<RunHistoryStats> {
        let runs = self.list_runs(classroom_id).await?;
        Ok(RunHistoryStats::from_runs(&runs))
    }
}
