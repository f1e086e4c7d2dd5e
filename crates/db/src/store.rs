//! Versioned record store.
//!
//! Holds a cached snapshot of one dataset together with the version token
//! it was read at. Every mutation is a compute-and-write cycle against that
//! snapshot; the medium's conditional write rejects it if another writer
//! got there first, in which case the cache is dropped, the dataset re-read
//! and the whole cycle re-run.

use std::sync::Arc;
use std::time::Duration;

use taskmaster_core::codec::{decode, encode, Record};
use taskmaster_core::error::CoreError;
use taskmaster_core::version::VersionToken;
use tokio::sync::RwLock;

use crate::medium::{Dataset, DurableMedium, MediumError};

/// Default number of retries after the first attempt.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Delay before the first retry; doubles on each subsequent one.
pub const DEFAULT_BACKOFF: Duration = Duration::from_millis(10);

/// Upper bound on the delay between attempts.
const MAX_BACKOFF: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy)]
pub struct StoreConfig {
    /// Retries after a version conflict. Total attempts = `1 + max_retries`.
    pub max_retries: u32,
    pub backoff: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            backoff: DEFAULT_BACKOFF,
        }
    }
}

/// Result of one mutation attempt: the value handed back to the caller and
/// the change description passed to the medium (a commit message for the
/// remote repository).
pub struct Change<T> {
    pub output: T,
    pub description: String,
}

impl<T> Change<T> {
    pub fn new(output: T, description: impl Into<String>) -> Self {
        Self {
            output,
            description: description.into(),
        }
    }
}

/// Immutable dataset snapshot paired with its version.
#[derive(Debug)]
pub struct Snapshot<R> {
    pub records: Arc<Vec<R>>,
    /// `None` when the dataset has never been written.
    pub version: Option<VersionToken>,
}

impl<R> Clone for Snapshot<R> {
    fn clone(&self) -> Self {
        Self {
            records: Arc::clone(&self.records),
            version: self.version.clone(),
        }
    }
}

/// Selected records of a snapshot, yielded lazily in selection order.
pub struct Listing<R> {
    snapshot: Arc<Vec<R>>,
    positions: Vec<usize>,
}

impl<R: Clone> Listing<R> {
    pub fn iter(&self) -> impl Iterator<Item = &R> + '_ {
        self.positions.iter().map(|&i| &self.snapshot[i])
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn into_vec(self) -> Vec<R> {
        self.iter().cloned().collect()
    }
}

pub struct VersionedStore<R: Record> {
    medium: Arc<dyn DurableMedium>,
    dataset: Dataset,
    config: StoreConfig,
    cache: RwLock<Option<Snapshot<R>>>,
}

impl<R: Record> VersionedStore<R> {
    pub fn new(medium: Arc<dyn DurableMedium>, dataset: Dataset, config: StoreConfig) -> Self {
        Self {
            medium,
            dataset,
            config,
            cache: RwLock::new(None),
        }
    }

    pub fn medium(&self) -> &Arc<dyn DurableMedium> {
        &self.medium
    }

    pub fn dataset(&self) -> &Dataset {
        &self.dataset
    }

    /// Read the latest dataset from the medium and refresh the cache.
    pub async fn load(&self) -> Result<Snapshot<R>, CoreError> {
        let snapshot = match self.medium.read(&self.dataset).await? {
            Some(table) => Snapshot {
                records: Arc::new(decode::<R>(&table.rows)?),
                version: Some(table.version),
            },
            None => Snapshot {
                records: Arc::new(Vec::new()),
                version: None,
            },
        };
        *self.cache.write().await = Some(snapshot.clone());
        Ok(snapshot)
    }

    /// Latest copy of the record with `id`, if any.
    pub async fn find(&self, id: &str) -> Result<Option<R>, CoreError> {
        let snapshot = self.load().await?;
        Ok(snapshot.records.iter().find(|r| r.id() == id).cloned())
    }

    /// Select records from a fresh snapshot. `select` returns positions
    /// into the snapshot, in the order they should be yielded.
    pub async fn list<F>(&self, select: F) -> Result<Listing<R>, CoreError>
    where
        F: FnOnce(&[R]) -> Vec<usize>,
    {
        let snapshot = self.load().await?;
        let positions = select(&snapshot.records);
        Ok(Listing {
            snapshot: snapshot.records,
            positions,
        })
    }

    /// Run `apply` against the current dataset and write the result.
    ///
    /// `apply` is re-run from scratch on every attempt, so any checks it
    /// makes (uniqueness, existence) always see the dataset the write is
    /// conditioned on. An error from `apply` aborts without writing.
    pub async fn mutate<T, F>(&self, mut apply: F) -> Result<T, CoreError>
    where
        F: FnMut(&mut Vec<R>) -> Result<Change<T>, CoreError> + Send,
        T: Send,
    {
        let attempts = self.config.max_retries.saturating_add(1);
        let mut backoff = self.config.backoff;

        for attempt in 1..=attempts {
            let base = self.cached_or_load().await?;
            let mut working = base.records.as_ref().clone();
            let change = apply(&mut working)?;
            let rows = encode(&working);

            match self
                .medium
                .write(&self.dataset, &rows, base.version.as_ref(), &change.description)
                .await
            {
                Ok(version) => {
                    *self.cache.write().await = Some(Snapshot {
                        records: Arc::new(working),
                        version: Some(version),
                    });
                    tracing::debug!(
                        dataset = self.dataset.name,
                        medium = self.medium.kind(),
                        attempt,
                        change = %change.description,
                        "Dataset written"
                    );
                    return Ok(change.output);
                }
                Err(MediumError::VersionConflict { .. }) => {
                    *self.cache.write().await = None;
                    tracing::warn!(
                        dataset = self.dataset.name,
                        medium = self.medium.kind(),
                        attempt,
                        max_attempts = attempts,
                        "Version conflict, retrying with fresh dataset"
                    );
                    if attempt < attempts {
                        tokio::time::sleep(backoff).await;
                        backoff = backoff.saturating_mul(2).min(MAX_BACKOFF);
                    }
                }
                Err(err) => return Err(err.into()),
            }
        }

        tracing::warn!(
            dataset = self.dataset.name,
            attempts,
            "Giving up after repeated version conflicts"
        );
        Err(CoreError::TooManyConflicts { attempts })
    }

    async fn cached_or_load(&self) -> Result<Snapshot<R>, CoreError> {
        if let Some(snapshot) = self.cache.read().await.as_ref() {
            return Ok(snapshot.clone());
        }
        self.load().await
    }
}
