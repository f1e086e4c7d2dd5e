//! Project CRUD on the `projects` dataset.

use std::sync::Arc;

use chrono::Utc;
use taskmaster_core::csv::write_table;
use taskmaster_core::codec::{encode, Record};
use taskmaster_core::error::CoreError;
use taskmaster_core::project::{NewProject, Project, ProjectPatch, PROJECT_COLUMNS};
use taskmaster_core::query::ProjectQuery;

use crate::medium::DurableMedium;
use crate::store::{Change, Listing, StoreConfig, VersionedStore};
use crate::PROJECTS;

pub struct ProjectRepo {
    store: VersionedStore<Project>,
}

impl ProjectRepo {
    pub fn new(medium: Arc<dyn DurableMedium>, config: StoreConfig) -> Self {
        Self {
            store: VersionedStore::new(medium, PROJECTS, config),
        }
    }

    /// Validate and append a new project.
    ///
    /// The id (client-supplied or generated) is fixed before the first
    /// attempt, so retries never mint a second one.
    pub async fn create(&self, input: NewProject) -> Result<Project, CoreError> {
        let project = Project::create(input, Utc::now())?;
        self.store
            .mutate(|projects| {
                if projects.iter().any(|p| p.id == project.id) {
                    return Err(CoreError::DuplicateId {
                        entity: Project::ENTITY,
                        id: project.id.clone(),
                    });
                }
                projects.push(project.clone());
                Ok(Change::new(
                    project.clone(),
                    format!("Add project: {}", project.name),
                ))
            })
            .await
    }

    pub async fn find_by_id(&self, id: &str) -> Result<Project, CoreError> {
        self.store
            .find(id)
            .await?
            .ok_or_else(|| CoreError::not_found(Project::ENTITY, id))
    }

    /// Filtered, sorted, paged view over one consistent snapshot.
    pub async fn list(&self, query: &ProjectQuery) -> Result<Listing<Project>, CoreError> {
        self.store.list(|projects| query.select(projects)).await
    }

    pub async fn update(&self, id: &str, patch: ProjectPatch) -> Result<Project, CoreError> {
        self.store
            .mutate(|projects| {
                let project = projects
                    .iter_mut()
                    .find(|p| p.id == id)
                    .ok_or_else(|| CoreError::not_found(Project::ENTITY, id))?;
                project.apply_patch(&patch, Utc::now())?;
                let updated = project.clone();
                let description = format!("Update project: {}", updated.name);
                Ok(Change::new(updated, description))
            })
            .await
    }

    /// Remove a project, returning the removed record.
    pub async fn delete(&self, id: &str) -> Result<Project, CoreError> {
        self.store
            .mutate(|projects| {
                let index = projects
                    .iter()
                    .position(|p| p.id == id)
                    .ok_or_else(|| CoreError::not_found(Project::ENTITY, id))?;
                let removed = projects.remove(index);
                Ok(Change::new(removed, format!("Delete project: {id}")))
            })
            .await
    }

    /// The whole dataset as CSV, in persisted column order.
    pub async fn export_csv(&self) -> Result<String, CoreError> {
        let snapshot = self.store.load().await?;
        Ok(write_table(PROJECT_COLUMNS, &encode(&snapshot.records)))
    }

    pub async fn health_check(&self) -> Result<(), CoreError> {
        self.store.medium().health_check().await?;
        Ok(())
    }
}
