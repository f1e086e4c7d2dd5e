//! PostgreSQL medium: one table per dataset plus a revision counter.
//!
//! Each dataset table holds the record columns as `TEXT` and a `position`
//! column preserving row order. `dataset_revisions` carries one row per
//! dataset whose `revision` is the version token. A write locks that row
//! (`SELECT ... FOR UPDATE`), compares, replaces the rows and bumps the
//! revision inside one transaction.

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, QueryBuilder, Row as _, Transaction};
use taskmaster_core::codec::Row;
use taskmaster_core::version::VersionToken;
use tokio::sync::Mutex;

use super::{Dataset, DurableMedium, MediumError, StoredTable};

const MAX_CONNECTIONS: u32 = 10;
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

/// Postgres caps bind parameters per statement at 65535.
const MAX_BIND_PARAMS: usize = 65_535;

pub struct SqlMedium {
    pool: PgPool,
    ensured: Mutex<HashSet<&'static str>>,
}

impl SqlMedium {
    pub async fn connect(database_url: &str) -> Result<Self, MediumError> {
        let pool = PgPoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .acquire_timeout(ACQUIRE_TIMEOUT)
            .connect(database_url)
            .await
            .map_err(db_error)?;
        Ok(Self::from_pool(pool))
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self {
            pool,
            ensured: Mutex::new(HashSet::new()),
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Create the revision table and the dataset table if missing.
    async fn ensure_schema(&self, dataset: &Dataset) -> Result<(), MediumError> {
        let mut ensured = self.ensured.lock().await;
        if ensured.contains(dataset.name) {
            return Ok(());
        }

        validate_identifier(dataset.name)?;
        for column in dataset.columns {
            validate_identifier(column)?;
        }

        let columns = dataset
            .columns
            .iter()
            .map(|c| format!("\"{c}\" TEXT"))
            .collect::<Vec<_>>()
            .join(", ");

        let mut tx = self.pool.begin().await.map_err(db_error)?;
        // Serializes concurrent CREATE TABLE IF NOT EXISTS across processes.
        sqlx::query("SELECT pg_advisory_xact_lock(hashtext('taskmaster_schema'))")
            .execute(&mut *tx)
            .await
            .map_err(db_error)?;
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS dataset_revisions ( \
                dataset TEXT PRIMARY KEY, \
                revision BIGINT NOT NULL, \
                last_change TEXT, \
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW() \
            )",
        )
        .execute(&mut *tx)
        .await
        .map_err(db_error)?;
        sqlx::query(&format!(
            "CREATE TABLE IF NOT EXISTS \"{}\" (position INTEGER PRIMARY KEY, {columns})",
            dataset.name
        ))
        .execute(&mut *tx)
        .await
        .map_err(db_error)?;
        tx.commit().await.map_err(db_error)?;

        ensured.insert(dataset.name);
        tracing::debug!(dataset = dataset.name, "Dataset schema ensured");
        Ok(())
    }

    async fn replace_rows(
        tx: &mut Transaction<'_, Postgres>,
        dataset: &Dataset,
        rows: &[Row],
    ) -> Result<(), MediumError> {
        sqlx::query(&format!("DELETE FROM \"{}\"", dataset.name))
            .execute(&mut **tx)
            .await
            .map_err(db_error)?;

        if rows.is_empty() {
            return Ok(());
        }

        let column_list = dataset
            .columns
            .iter()
            .map(|c| format!("\"{c}\""))
            .collect::<Vec<_>>()
            .join(", ");
        let per_row = dataset.columns.len() + 1;
        let chunk_size = (MAX_BIND_PARAMS / per_row).max(1);

        for (chunk_index, chunk) in rows.chunks(chunk_size).enumerate() {
            let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(format!(
                "INSERT INTO \"{}\" (position, {column_list}) ",
                dataset.name
            ));
            let base = chunk_index * chunk_size;
            builder.push_values(chunk.iter().enumerate(), |mut b, (offset, row)| {
                b.push_bind((base + offset) as i32);
                for i in 0..dataset.columns.len() {
                    b.push_bind(row.get(i).cloned().flatten());
                }
            });
            builder
                .build()
                .execute(&mut **tx)
                .await
                .map_err(db_error)?;
        }
        Ok(())
    }
}

#[async_trait]
impl DurableMedium for SqlMedium {
    fn kind(&self) -> &'static str {
        "sql"
    }

    async fn read(&self, dataset: &Dataset) -> Result<Option<StoredTable>, MediumError> {
        self.ensure_schema(dataset).await?;

        let mut tx = self.pool.begin().await.map_err(db_error)?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ READ ONLY")
            .execute(&mut *tx)
            .await
            .map_err(db_error)?;

        let revision: Option<i64> =
            sqlx::query_scalar("SELECT revision FROM dataset_revisions WHERE dataset = $1")
                .bind(dataset.name)
                .fetch_optional(&mut *tx)
                .await
                .map_err(db_error)?;
        let Some(revision) = revision else {
            tx.commit().await.map_err(db_error)?;
            return Ok(None);
        };

        let column_list = dataset
            .columns
            .iter()
            .map(|c| format!("\"{c}\""))
            .collect::<Vec<_>>()
            .join(", ");
        let records = sqlx::query(&format!(
            "SELECT {column_list} FROM \"{}\" ORDER BY position",
            dataset.name
        ))
        .fetch_all(&mut *tx)
        .await
        .map_err(db_error)?;
        tx.commit().await.map_err(db_error)?;

        let rows = records
            .iter()
            .map(|record| {
                (0..dataset.columns.len())
                    .map(|i| record.try_get::<Option<String>, _>(i))
                    .collect::<Result<Row, _>>()
            })
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| MediumError::Malformed {
                field: dataset.name.to_string(),
                reason: e.to_string(),
            })?;

        Ok(Some(StoredTable {
            rows,
            version: VersionToken::from_revision(revision),
        }))
    }

    async fn write(
        &self,
        dataset: &Dataset,
        rows: &[Row],
        expected: Option<&VersionToken>,
        change_description: &str,
    ) -> Result<VersionToken, MediumError> {
        self.ensure_schema(dataset).await?;

        let mut tx = self.pool.begin().await.map_err(db_error)?;
        let current: Option<i64> = sqlx::query_scalar(
            "SELECT revision FROM dataset_revisions WHERE dataset = $1 FOR UPDATE",
        )
        .bind(dataset.name)
        .fetch_optional(&mut *tx)
        .await
        .map_err(db_error)?;

        let next = match (current, expected) {
            (None, None) => {
                // A concurrent creator blocks here until it commits, then
                // this insert becomes a no-op.
                let inserted = sqlx::query(
                    "INSERT INTO dataset_revisions (dataset, revision, last_change, updated_at) \
                     VALUES ($1, 1, $2, NOW()) ON CONFLICT (dataset) DO NOTHING",
                )
                .bind(dataset.name)
                .bind(change_description)
                .execute(&mut *tx)
                .await
                .map_err(db_error)?;
                if inserted.rows_affected() == 0 {
                    return Err(MediumError::conflict(dataset));
                }
                1
            }
            (Some(revision), Some(expected))
                if VersionToken::from_revision(revision) == *expected =>
            {
                sqlx::query(
                    "UPDATE dataset_revisions \
                     SET revision = $2, last_change = $3, updated_at = NOW() \
                     WHERE dataset = $1",
                )
                .bind(dataset.name)
                .bind(revision + 1)
                .bind(change_description)
                .execute(&mut *tx)
                .await
                .map_err(db_error)?;
                revision + 1
            }
            _ => return Err(MediumError::conflict(dataset)),
        };

        Self::replace_rows(&mut tx, dataset, rows).await?;
        tx.commit().await.map_err(db_error)?;

        tracing::debug!(
            dataset = dataset.name,
            revision = next,
            rows = rows.len(),
            change = change_description,
            "Dataset revision committed"
        );
        Ok(VersionToken::from_revision(next))
    }

    async fn health_check(&self) -> Result<(), MediumError> {
        sqlx::query_scalar::<_, i32>("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .map(|_| ())
            .map_err(db_error)
    }
}

fn db_error(err: sqlx::Error) -> MediumError {
    MediumError::unavailable(format!("database error: {err}"))
}

/// Identifiers are interpolated into DDL, so only `[a-z_][a-z0-9_]*` is allowed.
fn validate_identifier(name: &str) -> Result<(), MediumError> {
    let mut chars = name.chars();
    let valid = matches!(chars.next(), Some(c) if c.is_ascii_lowercase() || c == '_')
        && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(MediumError::unavailable(format!(
            "invalid SQL identifier '{name}'"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn identifiers_are_restricted() {
        assert!(validate_identifier("projects").is_ok());
        assert!(validate_identifier("last_login_at").is_ok());
        assert!(validate_identifier("Projects").is_err());
        assert!(validate_identifier("1abc").is_err());
        assert!(validate_identifier("users; drop table x").is_err());
        assert!(validate_identifier("").is_err());
    }

    const DATASET: Dataset = Dataset {
        name: "things",
        columns: &["id", "note"],
    };

    fn rows(ids: &[&str]) -> Vec<Row> {
        ids.iter()
            .map(|id| vec![Some(id.to_string()), None])
            .collect()
    }

    #[sqlx::test(migrations = false)]
    #[ignore = "requires DATABASE_URL pointing at a PostgreSQL server"]
    async fn revisions_advance_and_guard_writes(pool: PgPool) {
        let medium = SqlMedium::from_pool(pool);
        assert!(medium.read(&DATASET).await.unwrap().is_none());

        let v1 = medium.write(&DATASET, &rows(&["a"]), None, "create").await.unwrap();
        assert_eq!(v1, VersionToken::from_revision(1));

        let v2 = medium
            .write(&DATASET, &rows(&["a", "b"]), Some(&v1), "add b")
            .await
            .unwrap();
        assert_eq!(v2, VersionToken::from_revision(2));

        let stale = medium.write(&DATASET, &rows(&["c"]), Some(&v1), "add c").await;
        assert_matches!(stale, Err(MediumError::VersionConflict { .. }));

        let again = medium.write(&DATASET, &rows(&["d"]), None, "recreate").await;
        assert_matches!(again, Err(MediumError::VersionConflict { .. }));

        let stored = medium.read(&DATASET).await.unwrap().unwrap();
        assert_eq!(stored.version, v2);
        assert_eq!(stored.rows, rows(&["a", "b"]));
    }

    #[sqlx::test(migrations = false)]
    #[ignore = "requires DATABASE_URL pointing at a PostgreSQL server"]
    async fn health_check_runs_a_query(pool: PgPool) {
        let medium = SqlMedium::from_pool(pool);
        assert!(medium.health_check().await.is_ok());
    }
}
