//! In-process medium for tests and throwaway deployments.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use taskmaster_core::codec::Row;
use taskmaster_core::version::VersionToken;
use tokio::sync::Mutex;

use super::{check_expected, render_csv, Dataset, DurableMedium, MediumError, StoredTable};

/// Keeps each dataset as rows plus a content-hash token, behind one mutex.
///
/// Tokens are computed exactly as the local file medium computes them, so
/// behaviour under concurrency matches a real text medium.
#[derive(Default)]
pub struct MemoryMedium {
    tables: Mutex<HashMap<&'static str, StoredTable>>,
    unavailable: AtomicBool,
    writes: AtomicUsize,
}

impl MemoryMedium {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call fail with [`MediumError::Unavailable`].
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Number of successful writes so far.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    fn ensure_available(&self) -> Result<(), MediumError> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(MediumError::unavailable("memory medium is offline"))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl DurableMedium for MemoryMedium {
    fn kind(&self) -> &'static str {
        "memory"
    }

    async fn read(&self, dataset: &Dataset) -> Result<Option<StoredTable>, MediumError> {
        self.ensure_available()?;
        Ok(self.tables.lock().await.get(dataset.name).cloned())
    }

    async fn write(
        &self,
        dataset: &Dataset,
        rows: &[Row],
        expected: Option<&VersionToken>,
        change_description: &str,
    ) -> Result<VersionToken, MediumError> {
        self.ensure_available()?;
        let mut tables = self.tables.lock().await;
        let current = tables.get(dataset.name).map(|t| &t.version);
        check_expected(dataset, current, expected)?;

        let version = VersionToken::from_content(render_csv(dataset, rows).as_bytes());
        tables.insert(
            dataset.name,
            StoredTable {
                rows: rows.to_vec(),
                version: version.clone(),
            },
        );
        self.writes.fetch_add(1, Ordering::SeqCst);
        tracing::trace!(dataset = dataset.name, change = change_description, "memory write");
        Ok(version)
    }

    async fn health_check(&self) -> Result<(), MediumError> {
        self.ensure_available()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    const DATASET: Dataset = Dataset {
        name: "things",
        columns: &["id"],
    };

    fn rows(ids: &[&str]) -> Vec<Row> {
        ids.iter().map(|id| vec![Some(id.to_string())]).collect()
    }

    #[tokio::test]
    async fn missing_dataset_reads_as_none() {
        let medium = MemoryMedium::new();
        assert!(medium.read(&DATASET).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn stale_token_conflicts() {
        let medium = MemoryMedium::new();
        let v1 = medium.write(&DATASET, &rows(&["a"]), None, "create").await.unwrap();
        let v2 = medium
            .write(&DATASET, &rows(&["a", "b"]), Some(&v1), "add b")
            .await
            .unwrap();
        assert_ne!(v1, v2);

        let err = medium
            .write(&DATASET, &rows(&["a", "c"]), Some(&v1), "add c")
            .await
            .unwrap_err();
        assert_matches!(err, MediumError::VersionConflict { .. });

        let stored = medium.read(&DATASET).await.unwrap().unwrap();
        assert_eq!(stored.rows, rows(&["a", "b"]));
        assert_eq!(stored.version, v2);
    }

    #[tokio::test]
    async fn create_conflicts_when_dataset_exists() {
        let medium = MemoryMedium::new();
        medium.write(&DATASET, &rows(&["a"]), None, "create").await.unwrap();
        let err = medium.write(&DATASET, &rows(&["b"]), None, "create again").await;
        assert_matches!(err, Err(MediumError::VersionConflict { .. }));
    }

    #[tokio::test]
    async fn offline_medium_is_unavailable() {
        let medium = MemoryMedium::new();
        medium.set_unavailable(true);
        assert_matches!(medium.read(&DATASET).await, Err(MediumError::Unavailable(_)));
        assert_matches!(medium.health_check().await, Err(MediumError::Unavailable(_)));
    }
}
