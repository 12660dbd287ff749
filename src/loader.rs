//! Loader: locate the day's snapshot artifact and load it into the raw table
//! inside one transaction, replacing any rows previously loaded that day.
use anyhow::{bail, Context, Result};
use object_store::path::Path as ObjectPath;
use tracing::info;

use crate::datekey::ExecutionDate;
use crate::storage::{self, DynStore};
use crate::util::db::Db;

pub struct Loader {
    db: Db,
    store: DynStore,
    schema: String,
    table: String,
    prefix: String,
}

#[derive(Debug)]
pub struct LoadReport {
    pub location: ObjectPath,
    pub deleted: u64,
    pub inserted: u64,
}

/// Resolve and download the artifact for `date`.
///
/// Fails with a not-found error before any database work when the day's
/// snapshot is absent; no partial load is ever attempted.
pub async fn resolve_artifact(
    store: &DynStore,
    prefix: &str,
    date: &ExecutionDate,
) -> Result<(ObjectPath, String)> {
    let location = date.artifact_path(prefix);
    if !storage::exists(store, &location).await? {
        bail!("snapshot artifact not found: {location}");
    }
    let text = storage::fetch_text(store, &location).await?;
    Ok((location, text))
}

/// Non-blank artifact lines, trimmed. Blank lines are skipped silently.
pub fn payload_lines(text: &str) -> impl Iterator<Item = &str> {
    text.lines().map(str::trim).filter(|l| !l.is_empty())
}

/// Accept plain `[A-Za-z_][A-Za-z0-9_]*` identifiers only; anything else is
/// rejected rather than quoted, since these names are interpolated into DDL.
pub fn checked_ident(name: &str) -> Result<String> {
    let mut chars = name.chars();
    let valid = matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    if !valid {
        bail!("invalid SQL identifier {name:?}");
    }
    Ok(name.to_string())
}

impl Loader {
    /// Identifiers are validated up front so the DDL/DML built from them can
    /// only ever contain plain identifiers.
    pub fn new(db: Db, store: DynStore, schema: &str, table: &str, prefix: &str) -> Result<Self> {
        Ok(Self {
            db,
            store,
            schema: checked_ident(schema)?,
            table: checked_ident(table)?,
            prefix: prefix.to_string(),
        })
    }

    /// Idempotent destination setup; never errors when already present.
    async fn ensure_sink(&self) -> Result<()> {
        sqlx::raw_sql(&format!("CREATE SCHEMA IF NOT EXISTS {}", self.schema))
            .execute(&self.db.pool)
            .await
            .context("failed to ensure raw schema")?;
        sqlx::raw_sql(&format!(
            "CREATE TABLE IF NOT EXISTS {}.{} (data JSONB, loaded_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP)",
            self.schema, self.table
        ))
        .execute(&self.db.pool)
        .await
        .context("failed to ensure raw table")?;
        Ok(())
    }

    /// Load the snapshot for `date`.
    ///
    /// Re-running for the same date replaces that date's generation of rows
    /// (delete-then-insert inside one transaction); any failure rolls the
    /// whole run back, leaving the table exactly as it was.
    pub async fn run(&self, date: &ExecutionDate) -> Result<LoadReport> {
        let (location, text) = resolve_artifact(&self.store, &self.prefix, date).await?;

        self.ensure_sink().await?;

        let (day_start, day_end) = date.day_bounds();
        let loaded_at = date.timestamp();

        let mut tx = self.db.pool.begin().await?;

        let deleted = sqlx::query(&format!(
            "DELETE FROM {}.{} WHERE loaded_at >= $1 AND loaded_at <= $2",
            self.schema, self.table
        ))
        .bind(day_start)
        .bind(day_end)
        .execute(&mut *tx)
        .await
        .context("failed to delete prior generation")?
        .rows_affected();
        if deleted > 0 {
            info!(deleted, date = %date.year_month_day(), "replacing previously loaded rows");
        }

        // Lines are not validated client-side: the JSONB cast in Postgres is
        // the only JSON check, and a malformed line aborts the transaction.
        let insert_sql = format!(
            "INSERT INTO {}.{} (data, loaded_at) VALUES ($1::jsonb, $2)",
            self.schema, self.table
        );
        let mut inserted: u64 = 0;
        for line in payload_lines(&text) {
            sqlx::query(&insert_sql)
                .bind(line)
                .bind(loaded_at)
                .execute(&mut *tx)
                .await
                .context("insert failed; load rolled back")?;
            inserted += 1;
        }

        tx.commit().await.context("failed to commit load")?;
        info!(inserted, deleted, location = %location, "load committed");

        Ok(LoadReport {
            location,
            deleted,
            inserted,
        })
    }
}
