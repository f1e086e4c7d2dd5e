use std::path::PathBuf;
use std::sync::Arc;

use taskmaster_db::medium::{
    LocalFileMedium, MemoryMedium, RemoteRepoConfig, RemoteRepoMedium, SqlMedium,
};
use taskmaster_db::store::DEFAULT_MAX_RETRIES;
use taskmaster_db::{DurableMedium, MediumError};

use crate::auth::jwt::JwtConfig;

/// Default minimum password length for registration.
const DEFAULT_MIN_PASSWORD_LENGTH: usize = 8;

/// Server configuration loaded from environment variables.
///
/// All fields except `JWT_SECRET` have defaults suitable for local
/// development.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `5000`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS` env var.
    /// A `*` entry allows any origin.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,
    /// Minimum accepted password length at registration (default: `8`).
    pub min_password_length: usize,
    /// Retries after a version conflict before giving up (default: `3`).
    pub store_max_retries: u32,
    pub jwt: JwtConfig,
    pub storage: StorageConfig,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                | Default                    |
    /// |------------------------|----------------------------|
    /// | `HOST`                 | `0.0.0.0`                  |
    /// | `PORT`                 | `5000`                     |
    /// | `CORS_ORIGINS`         | `http://localhost:5173`    |
    /// | `REQUEST_TIMEOUT_SECS` | `30`                       |
    /// | `MIN_PASSWORD_LENGTH`  | `8`                        |
    /// | `STORE_MAX_RETRIES`    | `3`                        |
    ///
    /// JWT settings come from [`JwtConfig::from_env`], storage settings from
    /// [`StorageConfig::from_env`].
    pub fn from_env() -> Self {
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into());

        let port: u16 = std::env::var("PORT")
            .unwrap_or_else(|_| "5000".into())
            .parse()
            .expect("PORT must be a valid u16");

        let cors_origins: Vec<String> = std::env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:5173".into())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let request_timeout_secs: u64 = std::env::var("REQUEST_TIMEOUT_SECS")
            .unwrap_or_else(|_| "30".into())
            .parse()
            .expect("REQUEST_TIMEOUT_SECS must be a valid u64");

        let min_password_length: usize = std::env::var("MIN_PASSWORD_LENGTH")
            .unwrap_or_else(|_| DEFAULT_MIN_PASSWORD_LENGTH.to_string())
            .parse()
            .expect("MIN_PASSWORD_LENGTH must be a valid usize");

        let store_max_retries: u32 = std::env::var("STORE_MAX_RETRIES")
            .unwrap_or_else(|_| DEFAULT_MAX_RETRIES.to_string())
            .parse()
            .expect("STORE_MAX_RETRIES must be a valid u32");

        Self {
            host,
            port,
            cors_origins,
            request_timeout_secs,
            min_password_length,
            store_max_retries,
            jwt: JwtConfig::from_env(),
            storage: StorageConfig::from_env(),
        }
    }
}

/// Which durable medium backs the datasets. Exactly one per deployment.
#[derive(Debug, Clone)]
pub enum StorageConfig {
    /// CSV files in a local directory.
    Local { data_dir: PathBuf },
    /// CSV files in a remote Git repository.
    Remote(RemoteRepoConfig),
    /// PostgreSQL tables.
    Sql { database_url: String },
    /// Process memory; nothing survives a restart.
    Memory,
}

impl StorageConfig {
    /// Load storage settings.
    ///
    /// | Env Var              | Default                  | Backend |
    /// |----------------------|--------------------------|---------|
    /// | `STORAGE_BACKEND`    | `local`                  | all     |
    /// | `DATA_DIR`           | `./data`                 | local   |
    /// | `GITHUB_TOKEN`       | **required**             | remote  |
    /// | `GITHUB_OWNER`       | **required**             | remote  |
    /// | `GITHUB_REPO`        | **required**             | remote  |
    /// | `GITHUB_BRANCH`      | `main`                   | remote  |
    /// | `GITHUB_PATH_PREFIX` | `assets`                 | remote  |
    /// | `GITHUB_API_BASE`    | `https://api.github.com` | remote  |
    /// | `DATABASE_URL`       | built from `DB_*` vars   | sql     |
    ///
    /// Without `DATABASE_URL`, the SQL backend assembles one from `DB_HOST`,
    /// `DB_PORT` (`5432`), `DB_NAME`, `DB_USER` and `DB_PASSWORD`.
    ///
    /// # Panics
    ///
    /// Panics on an unknown backend name or a missing required variable.
    pub fn from_env() -> Self {
        let backend = std::env::var("STORAGE_BACKEND").unwrap_or_else(|_| "local".into());
        match backend.trim().to_ascii_lowercase().as_str() {
            "local" => Self::Local {
                data_dir: std::env::var("DATA_DIR")
                    .unwrap_or_else(|_| "./data".into())
                    .into(),
            },
            "remote" => Self::Remote(RemoteRepoConfig {
                api_base: std::env::var("GITHUB_API_BASE")
                    .unwrap_or_else(|_| "https://api.github.com".into()),
                owner: required_var("GITHUB_OWNER"),
                repo: required_var("GITHUB_REPO"),
                branch: std::env::var("GITHUB_BRANCH").unwrap_or_else(|_| "main".into()),
                path_prefix: std::env::var("GITHUB_PATH_PREFIX")
                    .unwrap_or_else(|_| "assets".into()),
                token: required_var("GITHUB_TOKEN"),
            }),
            "sql" => Self::Sql {
                database_url: std::env::var("DATABASE_URL").unwrap_or_else(|_| {
                    let host = required_var("DB_HOST");
                    let port = std::env::var("DB_PORT").unwrap_or_else(|_| "5432".into());
                    let name = required_var("DB_NAME");
                    let user = required_var("DB_USER");
                    let password = required_var("DB_PASSWORD");
                    format!("postgres://{user}:{password}@{host}:{port}/{name}")
                }),
            },
            "memory" => Self::Memory,
            other => panic!(
                "Unknown STORAGE_BACKEND '{other}' (expected local, remote, sql or memory)"
            ),
        }
    }

    /// Short backend name for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Local { .. } => "local",
            Self::Remote(_) => "remote",
            Self::Sql { .. } => "sql",
            Self::Memory => "memory",
        }
    }

    /// Construct the configured medium.
    pub async fn open(&self) -> Result<Arc<dyn DurableMedium>, MediumError> {
        let medium: Arc<dyn DurableMedium> = match self {
            Self::Local { data_dir } => Arc::new(LocalFileMedium::open(data_dir.clone()).await?),
            Self::Remote(config) => Arc::new(RemoteRepoMedium::new(config.clone())?),
            Self::Sql { database_url } => Arc::new(SqlMedium::connect(database_url).await?),
            Self::Memory => Arc::new(MemoryMedium::new()),
        };
        Ok(medium)
    }
}

fn required_var(name: &str) -> String {
    let value = std::env::var(name).unwrap_or_else(|_| panic!("{name} must be set"));
    assert!(!value.trim().is_empty(), "{name} must not be empty");
    value
}
