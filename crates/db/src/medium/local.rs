//! Local CSV files, one per dataset, under a base directory.
//!
//! The version token is the SHA-256 of the file bytes. A write holds an
//! in-process mutex and a `<file>.lock` sidecar (created exclusively, so
//! other processes sharing the directory are excluded too), re-hashes the
//! current file, and only then replaces it via temp file + atomic rename.
//!
//! The lock file holds a random owner token. A writer only ever removes a
//! lock carrying its own token, and a stale lock is reclaimed by renaming it
//! aside first so two reclaimers cannot both delete it.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime};

use async_trait::async_trait;
use taskmaster_core::codec::Row;
use taskmaster_core::version::VersionToken;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use super::{check_expected, parse_csv, render_csv, Dataset, DurableMedium, MediumError, StoredTable};

/// How long a writer waits for another process's lock file.
const LOCK_WAIT: Duration = Duration::from_secs(5);

/// Lock files older than this are assumed to belong to a crashed writer.
const LOCK_STALE_AFTER: Duration = Duration::from_secs(30);

/// Poll interval while waiting for a lock file.
const LOCK_POLL: Duration = Duration::from_millis(10);

pub struct LocalFileMedium {
    dir: PathBuf,
    write_lock: Mutex<()>,
}

impl LocalFileMedium {
    /// Open (creating if needed) the data directory.
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self, MediumError> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await.map_err(|e| {
            MediumError::unavailable(format!("cannot create data dir {}: {e}", dir.display()))
        })?;
        Ok(Self {
            dir,
            write_lock: Mutex::new(()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, dataset: &Dataset) -> PathBuf {
        self.dir.join(dataset.file_name())
    }

    async fn read_bytes(&self, path: &Path) -> Result<Option<Vec<u8>>, MediumError> {
        match tokio::fs::read(path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(MediumError::unavailable(format!(
                "cannot read {}: {e}",
                path.display()
            ))),
        }
    }

    async fn replace(&self, path: &Path, contents: &[u8]) -> Result<(), MediumError> {
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("dataset");
        let tmp = self
            .dir
            .join(format!(".{file_name}.{}.tmp", uuid::Uuid::new_v4()));

        let result = async {
            let mut file = tokio::fs::File::create(&tmp).await?;
            file.write_all(contents).await?;
            file.sync_all().await?;
            drop(file);
            tokio::fs::rename(&tmp, path).await
        }
        .await;

        if let Err(e) = result {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(MediumError::unavailable(format!(
                "cannot write {}: {e}",
                path.display()
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl DurableMedium for LocalFileMedium {
    fn kind(&self) -> &'static str {
        "local"
    }

    async fn read(&self, dataset: &Dataset) -> Result<Option<StoredTable>, MediumError> {
        let path = self.path_for(dataset);
        let Some(bytes) = self.read_bytes(&path).await? else {
            return Ok(None);
        };
        let rows = parse_csv(dataset, &bytes)?;
        Ok(Some(StoredTable {
            rows,
            version: VersionToken::from_content(&bytes),
        }))
    }

    async fn write(
        &self,
        dataset: &Dataset,
        rows: &[Row],
        expected: Option<&VersionToken>,
        change_description: &str,
    ) -> Result<VersionToken, MediumError> {
        let path = self.path_for(dataset);
        let _guard = self.write_lock.lock().await;
        let _file_lock = LockFile::acquire(path.with_extension("csv.lock")).await?;

        let current = self
            .read_bytes(&path)
            .await?
            .map(|bytes| VersionToken::from_content(&bytes));
        check_expected(dataset, current.as_ref(), expected)?;

        let contents = render_csv(dataset, rows);
        self.replace(&path, contents.as_bytes()).await?;

        tracing::debug!(
            path = %path.display(),
            rows = rows.len(),
            change = change_description,
            "Dataset file replaced"
        );
        Ok(VersionToken::from_content(contents.as_bytes()))
    }

    async fn health_check(&self) -> Result<(), MediumError> {
        let meta = tokio::fs::metadata(&self.dir)
            .await
            .map_err(|e| MediumError::unavailable(format!("{}: {e}", self.dir.display())))?;
        if meta.is_dir() {
            Ok(())
        } else {
            Err(MediumError::unavailable(format!(
                "{} is not a directory",
                self.dir.display()
            )))
        }
    }
}

/// Exclusive cross-process lock, held while the sidecar file exists and
/// still carries `owner`.
struct LockFile {
    path: PathBuf,
    owner: String,
}

impl LockFile {
    async fn acquire(path: PathBuf) -> Result<Self, MediumError> {
        let owner = uuid::Uuid::new_v4().to_string();
        let started = Instant::now();
        loop {
            match tokio::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .await
            {
                Ok(mut file) => {
                    if let Err(e) = file.write_all(owner.as_bytes()).await {
                        let _ = tokio::fs::remove_file(&path).await;
                        return Err(MediumError::unavailable(format!(
                            "cannot write lock {}: {e}",
                            path.display()
                        )));
                    }
                    return Ok(Self { path, owner });
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    if Self::is_stale(&path).await {
                        let holder = Self::holder(&path).await.unwrap_or_default();
                        Self::reclaim(&path, &holder).await;
                        continue;
                    }
                    if started.elapsed() > LOCK_WAIT {
                        return Err(MediumError::unavailable(format!(
                            "timed out waiting for lock {}",
                            path.display()
                        )));
                    }
                    tokio::time::sleep(LOCK_POLL).await;
                }
                Err(e) => {
                    return Err(MediumError::unavailable(format!(
                        "cannot create lock {}: {e}",
                        path.display()
                    )))
                }
            }
        }
    }

    async fn holder(path: &Path) -> Option<String> {
        tokio::fs::read_to_string(path).await.ok()
    }

    /// Remove a stale lock last seen holding `holder`.
    ///
    /// The lock is renamed to a unique side path, which only one process
    /// can win. If what was moved is not the stale lock (another process
    /// reclaimed it and took a fresh one in between), it is linked back.
    async fn reclaim(path: &Path, holder: &str) {
        let aside = path.with_extension(format!("lock.{}.stale", uuid::Uuid::new_v4()));
        if tokio::fs::rename(path, &aside).await.is_err() {
            return;
        }

        let moved = Self::holder(&aside).await.unwrap_or_default();
        if moved == holder && Self::is_stale(&aside).await {
            tracing::warn!(path = %path.display(), holder, "Removed stale lock file");
        } else if let Err(e) = tokio::fs::hard_link(&aside, path).await {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "Could not restore a live lock file moved during reclaim"
            );
        }
        let _ = tokio::fs::remove_file(&aside).await;
    }

    async fn is_stale(path: &Path) -> bool {
        let Ok(meta) = tokio::fs::metadata(path).await else {
            return false;
        };
        meta.modified()
            .ok()
            .and_then(|modified| SystemTime::now().duration_since(modified).ok())
            .is_some_and(|age| age > LOCK_STALE_AFTER)
    }
}

impl Drop for LockFile {
    fn drop(&mut self) {
        match std::fs::read_to_string(&self.path) {
            Ok(holder) if holder == self.owner => {
                let _ = std::fs::remove_file(&self.path);
            }
            Ok(_) => {
                tracing::warn!(path = %self.path.display(), "Lock file taken over by another writer");
            }
            Err(_) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    const DATASET: Dataset = Dataset {
        name: "things",
        columns: &["id", "note"],
    };

    fn rows(ids: &[&str]) -> Vec<Row> {
        ids.iter()
            .map(|id| vec![Some(id.to_string()), Some(format!("note, {id}"))])
            .collect()
    }

    #[tokio::test]
    async fn write_then_read_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let medium = LocalFileMedium::open(dir.path()).await.unwrap();

        assert!(medium.read(&DATASET).await.unwrap().is_none());

        let v1 = medium.write(&DATASET, &rows(&["a", "b"]), None, "create").await.unwrap();
        let stored = medium.read(&DATASET).await.unwrap().unwrap();
        assert_eq!(stored.rows, rows(&["a", "b"]));
        assert_eq!(stored.version, v1);

        let on_disk = std::fs::read_to_string(dir.path().join("things.csv")).unwrap();
        assert!(on_disk.starts_with("id,note\n"));
        assert!(on_disk.contains("\"note, a\""));
    }

    #[tokio::test]
    async fn stale_token_is_rejected_and_file_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let medium = LocalFileMedium::open(dir.path()).await.unwrap();

        let v1 = medium.write(&DATASET, &rows(&["a"]), None, "create").await.unwrap();
        medium.write(&DATASET, &rows(&["a", "b"]), Some(&v1), "add b").await.unwrap();

        let err = medium
            .write(&DATASET, &rows(&["a", "c"]), Some(&v1), "add c")
            .await
            .unwrap_err();
        assert_matches!(err, MediumError::VersionConflict { .. });

        let stored = medium.read(&DATASET).await.unwrap().unwrap();
        assert_eq!(stored.rows, rows(&["a", "b"]));
    }

    #[tokio::test]
    async fn external_edit_changes_the_token() {
        let dir = tempfile::tempdir().unwrap();
        let medium = LocalFileMedium::open(dir.path()).await.unwrap();
        let v1 = medium.write(&DATASET, &rows(&["a"]), None, "create").await.unwrap();

        std::fs::write(dir.path().join("things.csv"), "id,note\nz,edited by hand\n").unwrap();

        let err = medium.write(&DATASET, &rows(&["a", "b"]), Some(&v1), "add b").await;
        assert_matches!(err, Err(MediumError::VersionConflict { .. }));
    }

    #[tokio::test]
    async fn lock_file_is_released_after_write() {
        let dir = tempfile::tempdir().unwrap();
        let medium = LocalFileMedium::open(dir.path()).await.unwrap();
        medium.write(&DATASET, &rows(&["a"]), None, "create").await.unwrap();
        assert!(!dir.path().join("things.csv.lock").exists());
    }

    fn age(path: &Path, by: Duration) {
        std::fs::File::options()
            .write(true)
            .open(path)
            .unwrap()
            .set_modified(SystemTime::now() - by)
            .unwrap();
    }

    #[tokio::test]
    async fn stale_lock_from_crashed_writer_is_reclaimed() {
        let dir = tempfile::tempdir().unwrap();
        let medium = LocalFileMedium::open(dir.path()).await.unwrap();
        let lock = dir.path().join("things.csv.lock");
        std::fs::write(&lock, "crashed-writer").unwrap();
        age(&lock, LOCK_STALE_AFTER * 2);

        medium.write(&DATASET, &rows(&["a"]), None, "create").await.unwrap();
        assert!(!lock.exists());
        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .filter(|name| name.ends_with(".stale"))
            .collect();
        assert!(leftovers.is_empty(), "{leftovers:?}");
    }

    #[tokio::test]
    async fn reclaim_restores_a_lock_taken_by_another_writer() {
        let dir = tempfile::tempdir().unwrap();
        let lock = dir.path().join("things.csv.lock");
        // Another process already replaced the stale lock with its own.
        std::fs::write(&lock, "fresh-owner").unwrap();

        LockFile::reclaim(&lock, "crashed-writer").await;

        assert_eq!(std::fs::read_to_string(&lock).unwrap(), "fresh-owner");
    }

    #[tokio::test]
    async fn release_keeps_a_lock_owned_by_someone_else() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("things.csv.lock");

        let lock = LockFile::acquire(path.clone()).await.unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), lock.owner);

        std::fs::write(&path, "other-writer").unwrap();
        drop(lock);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "other-writer");
    }

    #[tokio::test]
    async fn malformed_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("things.csv"), "id,note\n\"unterminated\n").unwrap();
        let medium = LocalFileMedium::open(dir.path()).await.unwrap();
        assert_matches!(
            medium.read(&DATASET).await,
            Err(MediumError::Malformed { .. })
        );
    }

    #[tokio::test]
    async fn health_check_passes_for_directory() {
        let dir = tempfile::tempdir().unwrap();
        let medium = LocalFileMedium::open(dir.path().join("nested")).await.unwrap();
        assert!(medium.health_check().await.is_ok());
    }
}
