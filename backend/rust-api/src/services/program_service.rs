use anyhow::{bail, Context, Result};

use crate::models::collections::PROGRAMS;
use crate::models::program::{CreateProgramRequest, Program, UpdateProgramRequest};
use crate::services::require;
use crate::store::{Query, SharedStore, SortDirection, Update};

pub struct ProgramService {
    store: SharedStore,
}

impl ProgramService {
    pub fn new(store: SharedStore) -> Self {
        Self { store }
    }

    pub async fn create_program(&self, req: CreateProgramRequest) -> Result<Program> {
        let program = Program {
            id: String::new(),
            name: req.name,
            description: req.description,
            classroom_ids: Vec::new(),
            is_active: true,
            created_at: None,
            updated_at: None,
        };

        let id = self
            .store
            .create_from(PROGRAMS, &program)
            .await
            .context("Failed to insert program")?;

        tracing::info!(program_id = %id, "Program created");
        self.get_program(&id).await
    }

    pub async fn get_program(&self, program_id: &str) -> Result<Program> {
        require(&*self.store, PROGRAMS, program_id, "Program").await
    }

    pub async fn list_programs(&self) -> Result<Vec<Program>> {
        self.store
            .query_as(PROGRAMS, Query::new().order_by("name", SortDirection::Ascending))
            .await
            .context("Failed to query programs")
    }

    pub async fn update_program(&self, program_id: &str, req: UpdateProgramRequest) -> Result<Program> {
        self.get_program(program_id).await?;

        let mut update = Update::new();
        if let Some(name) = req.name {
            update = update.set("name", name);
        }
        if let Some(description) = req.description {
            update = update.set("description", description);
        }
        if let Some(is_active) = req.is_active {
            update = update.set("isActive", is_active);
        }

        self.store
            .update(PROGRAMS, program_id, update)
            .await
            .context("Failed to update program")?;

        self.get_program(program_id).await
    }

    pub async fn delete_program(&self, program_id: &str) -> Result<()> {
        let program = self.get_program(program_id).await?;
        if !program.classroom_ids.is_empty() {
            bail!(
                "Program still has {} classroom(s)",
                program.classroom_ids.len()
            );
        }

        self.store
            .delete(PROGRAMS, program_id)
            .await
            .context("Failed to delete program")?;

        tracing::info!(program_id, "Program deleted");
        Ok(())
    }

    pub(crate) async fn attach_classroom(&self, program_id: &str, classroom_id: &str) -> Result<()> {
        let program = self.get_program(program_id).await?;
        let mut classroom_ids = program.classroom_ids;
        if classroom_ids.iter().any(|id| id == classroom_id) {
            return Ok(());
        }
        classroom_ids.push(classroom_id.to_string());

        self.store
            .update(
                PROGRAMS,
                program_id,
                Update::new().set_serialized("classroomIds", &classroom_ids)?,
            )
            .await
            .context("Failed to attach classroom to program")
    }

    pub(crate) async fn detach_classroom(&self, program_id: &str, classroom_id: &str) -> Result<()> {
        let program = self.get_program(program_id).await?;
        let classroom_ids: Vec<String> = program
            .classroom_ids
            .into_iter()
            .filter(|id| id != classroom_id)
            .collect();

        self.store
            .update(
                PROGRAMS,
                program_id,
                Update::new().set_serialized("classroomIds", &classroom_ids)?,
            )
            .await
            .context("Failed to detach classroom from program")
    }
}
