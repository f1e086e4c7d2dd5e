use std::sync::Arc;

use taskmaster_db::repositories::{ProjectRepo, UserRepo};
use taskmaster_db::{DurableMedium, StoreConfig};

use crate::config::ServerConfig;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// Cheaply cloneable: everything is behind an `Arc`.
#[derive(Clone)]
pub struct AppState {
    pub projects: Arc<ProjectRepo>,
    pub users: Arc<UserRepo>,
    /// The medium both repositories write to; used for health checks.
    pub medium: Arc<dyn DurableMedium>,
    pub config: Arc<ServerConfig>,
}

impl AppState {
    pub fn new(medium: Arc<dyn DurableMedium>, config: ServerConfig) -> Self {
        let store_config = StoreConfig {
            max_retries: config.store_max_retries,
            ..StoreConfig::default()
        };
        Self {
            projects: Arc::new(ProjectRepo::new(Arc::clone(&medium), store_config)),
            users: Arc::new(UserRepo::new(Arc::clone(&medium), store_config)),
            medium,
            config: Arc::new(config),
        }
    }
}
