//! Durable media: stateless gateways to the external system of record.
//!
//! Every medium stores whole datasets and supports one conditional write:
//! replace the dataset only if its current [`VersionToken`] equals the one
//! the writer last read. That compare-and-swap is what linearizes
//! concurrent writers; the store retries on [`MediumError::VersionConflict`].

pub mod local;
pub mod memory;
pub mod remote;
pub mod sql;

use async_trait::async_trait;
use taskmaster_core::codec::{Record, Row};
use taskmaster_core::error::CoreError;
use taskmaster_core::version::VersionToken;

pub use local::LocalFileMedium;
pub use memory::MemoryMedium;
pub use remote::{RemoteRepoConfig, RemoteRepoMedium};
pub use sql::SqlMedium;

/// Names a dataset and its persisted column layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dataset {
    pub name: &'static str,
    pub columns: &'static [&'static str],
}

impl Dataset {
    pub const fn of<R: Record>(name: &'static str) -> Self {
        Self {
            name,
            columns: R::COLUMNS,
        }
    }

    /// File name used by text media.
    pub fn file_name(&self) -> String {
        format!("{}.csv", self.name)
    }
}

/// Rows read from a medium together with the version they were read at.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredTable {
    pub rows: Vec<Row>,
    pub version: VersionToken,
}

/// Failures reported by a durable medium.
#[derive(Debug, thiserror::Error)]
pub enum MediumError {
    /// The expected version no longer matches: another writer committed first.
    #[error("Version conflict on dataset '{dataset}'")]
    VersionConflict { dataset: String },

    /// Network, disk, or database failure.
    #[error("Storage medium unavailable: {0}")]
    Unavailable(String),

    /// The stored content could not be parsed into rows.
    #[error("Malformed stored data in field '{field}': {reason}")]
    Malformed { field: String, reason: String },
}

impl MediumError {
    pub fn conflict(dataset: &Dataset) -> Self {
        Self::VersionConflict {
            dataset: dataset.name.to_string(),
        }
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable(message.into())
    }
}

impl From<CoreError> for MediumError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::MalformedData { field, reason } => Self::Malformed { field, reason },
            other => Self::Unavailable(other.to_string()),
        }
    }
}

impl From<MediumError> for CoreError {
    fn from(err: MediumError) -> Self {
        match err {
            MediumError::Unavailable(msg) => CoreError::MediumUnavailable(msg),
            MediumError::Malformed { field, reason } => CoreError::MalformedData { field, reason },
            // The store resolves conflicts itself; one escaping here was not retried.
            MediumError::VersionConflict { .. } => CoreError::TooManyConflicts { attempts: 1 },
        }
    }
}

/// Contract shared by every backing store.
///
/// `write` with `expected = None` creates the dataset and conflicts if it
/// already exists. Implementations must make the version check and the
/// replacement atomic with respect to other writers.
#[async_trait]
pub trait DurableMedium: Send + Sync {
    /// Short backend name for logs and health output.
    fn kind(&self) -> &'static str;

    /// Read a whole dataset. `Ok(None)` means it has never been created.
    async fn read(&self, dataset: &Dataset) -> Result<Option<StoredTable>, MediumError>;

    /// Replace a whole dataset if its current version equals `expected`.
    async fn write(
        &self,
        dataset: &Dataset,
        rows: &[Row],
        expected: Option<&VersionToken>,
        change_description: &str,
    ) -> Result<VersionToken, MediumError>;

    /// Cheap reachability check.
    async fn health_check(&self) -> Result<(), MediumError>;
}

/// Version check shared by the content-hash media.
pub(crate) fn check_expected(
    dataset: &Dataset,
    current: Option<&VersionToken>,
    expected: Option<&VersionToken>,
) -> Result<(), MediumError> {
    if current == expected {
        Ok(())
    } else {
        Err(MediumError::conflict(dataset))
    }
}

/// CSV rendering used by the text media (local file, remote file, memory).
pub(crate) fn render_csv(dataset: &Dataset, rows: &[Row]) -> String {
    taskmaster_core::csv::write_table(dataset.columns, rows)
}

pub(crate) fn parse_csv(dataset: &Dataset, bytes: &[u8]) -> Result<Vec<Row>, MediumError> {
    let text = std::str::from_utf8(bytes).map_err(|e| MediumError::Malformed {
        field: "csv".into(),
        reason: format!("{} is not valid UTF-8: {e}", dataset.file_name()),
    })?;
    Ok(taskmaster_core::csv::parse_table(text, dataset.columns)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn check_expected_requires_exact_match() {
        let dataset = crate::PROJECTS;
        let v1 = VersionToken::new("1");
        let v2 = VersionToken::new("2");

        assert!(check_expected(&dataset, None, None).is_ok());
        assert!(check_expected(&dataset, Some(&v1), Some(&v1)).is_ok());
        assert!(check_expected(&dataset, Some(&v1), Some(&v2)).is_err());
        assert!(check_expected(&dataset, Some(&v1), None).is_err());
        assert!(check_expected(&dataset, None, Some(&v1)).is_err());
    }

    #[test]
    fn medium_errors_map_onto_the_taxonomy() {
        let err: CoreError = MediumError::unavailable("disk full").into();
        assert_eq!(err, CoreError::MediumUnavailable("disk full".into()));

        let err: CoreError = MediumError::Malformed {
            field: "id".into(),
            reason: "missing".into(),
        }
        .into();
        assert_eq!(err.code(), "MALFORMED_DATA");
    }

    #[test]
    fn datasets_use_record_columns() {
        assert_eq!(crate::PROJECTS.columns[0], "id");
        assert_eq!(crate::USERS.file_name(), "users.csv");
    }
}
