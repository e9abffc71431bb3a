/*!
SQLite Ledger

Async `Ledger` implementation over sqlx/SQLite.

## Behavior

- Uses the serde record models (see `ledger::record`) for run sub-documents;
  effect input/output land as one JSON document each in `input_json` /
  `output_json`, addressed by `(run_id, effect_id)`.
- Write-once-per-key success is enforced in a single conditional upsert, so
  concurrent writers racing on the same effect key never produce two
  different successful outputs.
- When the `sqlite-migrations` feature is enabled (default), embedded
  migrations (`sqlx::migrate!("./migrations")`) run on connect; disabling
  the feature assumes external migration orchestration.

## Schema

- `runs.id` ← `RunRecord.run_id`, with status/cursor columns and JSON
  documents for inputs, artifacts, pending breakpoint, failure, result.
- `effects` keyed by `(run_id, effect_id)` where `effect_id` is the
  `EffectId::encode()` string form.
*/

use std::sync::Arc;

use chrono::{DateTime, Utc};
use miette::Diagnostic;
use sqlx::{Row, SqlitePool, sqlite::SqliteRow};
use thiserror::Error;
use tracing::instrument;

use super::record::{EffectRecord, EffectStatus, PutOutcome, RunRecord};
use super::store::{Ledger, LedgerError, Result};
use crate::types::{EffectId, RunId, RunStatus};

#[derive(Debug, Error, Diagnostic)]
pub enum SqliteLedgerError {
    #[error("SQLx error: {0}")]
    #[diagnostic(
        code(duraloom::sqlite::sqlx),
        help("Ensure the SQLite database URL is valid and accessible.")
    )]
    Sqlx(#[from] sqlx::Error),

    #[error("JSON serialization error: {0}")]
    #[diagnostic(
        code(duraloom::sqlite::serde),
        help("Check the serialized shapes of effect and run documents.")
    )]
    Serde(#[from] serde_json::Error),

    #[error("missing persisted field: {0}")]
    #[diagnostic(
        code(duraloom::sqlite::missing),
        help("Backfill or re-run migrations to populate the missing field.")
    )]
    Missing(&'static str),

    #[error("backend error: {0}")]
    #[diagnostic(code(duraloom::sqlite::backend))]
    Backend(String),
}

impl From<SqliteLedgerError> for LedgerError {
    fn from(e: SqliteLedgerError) -> Self {
        match e {
            SqliteLedgerError::Sqlx(err) => LedgerError::Backend {
                message: err.to_string(),
            },
            SqliteLedgerError::Serde(err) => LedgerError::Serde { source: err },
            SqliteLedgerError::Missing(what) => {
                LedgerError::Other(format!("missing persisted field: {what}"))
            }
            SqliteLedgerError::Backend(msg) => LedgerError::Backend { message: msg },
        }
    }
}

/// SQLite-backed effect ledger.
///
/// Storage grows with `(runs × effects_per_run × document_size)`. Terminal
/// runs can be deleted wholesale; the schema carries timestamps
/// (`created_at` on effects, `updated_at` on runs) to facilitate time-based
/// cleanup policies.
pub struct SqliteLedger {
    /// Shared connection pool for concurrent ledger operations.
    pool: Arc<SqlitePool>,
}

impl std::fmt::Debug for SqliteLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteLedger").finish()
    }
}

impl SqliteLedger {
    /// Connect (or create) a SQLite database at `database_url`.
    /// Example URL: `"sqlite://duraloom.db"`.
    #[must_use = "ledger must be used to persist effects"]
    #[instrument(skip(database_url))]
    pub async fn connect(database_url: &str) -> std::result::Result<Self, LedgerError> {
        let pool = SqlitePool::connect(database_url)
            .await
            .map_err(|e| LedgerError::Backend {
                message: format!("connect error: {e}"),
            })?;
        // Run embedded migrations only if the feature is enabled (idempotent).
        #[cfg(feature = "sqlite-migrations")]
        {
            if let Err(e) = sqlx::migrate!("./migrations").run(&pool).await {
                return Err(LedgerError::Backend {
                    message: format!("migration failure: {e}"),
                });
            }
        }
        #[cfg(not(feature = "sqlite-migrations"))]
        {
            // Feature disabled: assume external migration orchestration already applied schema.
        }
        Ok(Self {
            pool: Arc::new(pool),
        })
    }

    fn effect_from_row(row: &SqliteRow) -> std::result::Result<EffectRecord, SqliteLedgerError> {
        let run_id: String = row.try_get("run_id")?;
        let effect_raw: String = row.try_get("effect_id")?;
        let effect_id = EffectId::decode(&effect_raw)
            .map_err(|_| SqliteLedgerError::Missing("effect_id (undecodable)"))?;
        let task: String = row.try_get("task")?;
        let status_raw: String = row.try_get("status")?;
        let status = EffectStatus::parse(&status_raw)
            .ok_or(SqliteLedgerError::Missing("status (unknown value)"))?;
        let input_json: String = row.try_get("input_json")?;
        let input = serde_json::from_str(&input_json)?;
        let output_json: Option<String> = row.try_get("output_json")?;
        let output = match output_json {
            Some(raw) => Some(serde_json::from_str(&raw)?),
            None => None,
        };
        let error: Option<String> = row.try_get("error")?;
        let created_at: String = row.try_get("created_at")?;
        let completed_at: Option<String> = row.try_get("completed_at")?;

        Ok(EffectRecord {
            run_id: RunId::from(run_id),
            effect_id,
            task,
            status,
            input,
            output,
            error,
            created_at: parse_timestamp(&created_at),
            completed_at: completed_at.as_deref().map(parse_timestamp),
        })
    }

    fn run_from_row(row: &SqliteRow) -> std::result::Result<RunRecord, SqliteLedgerError> {
        let run_id: String = row.try_get("id")?;
        let process: String = row.try_get("process")?;
        let status_raw: String = row.try_get("status")?;
        let status: RunStatus = serde_json::from_value(serde_json::Value::String(status_raw))
            .map_err(|_| SqliteLedgerError::Missing("status (unknown value)"))?;
        let cursor: i64 = row.try_get("cursor")?;
        let inputs_json: String = row.try_get("inputs_json")?;
        let artifacts_json: String = row.try_get("artifacts_json")?;
        let pending_json: Option<String> = row.try_get("pending_breakpoint_json")?;
        let failure_json: Option<String> = row.try_get("failure_json")?;
        let result_json: Option<String> = row.try_get("result_json")?;
        let created_at: String = row.try_get("created_at")?;
        let updated_at: String = row.try_get("updated_at")?;

        Ok(RunRecord {
            run_id: RunId::from(run_id),
            process,
            status,
            cursor: cursor.max(0) as u32,
            inputs: serde_json::from_str(&inputs_json)?,
            artifacts: serde_json::from_str(&artifacts_json)?,
            pending_breakpoint: match pending_json {
                Some(raw) => Some(serde_json::from_str(&raw)?),
                None => None,
            },
            failure: match failure_json {
                Some(raw) => Some(serde_json::from_str(&raw)?),
                None => None,
            },
            result: match result_json {
                Some(raw) => Some(serde_json::from_str(&raw)?),
                None => None,
            },
            created_at: parse_timestamp(&created_at),
            updated_at: parse_timestamp(&updated_at),
        })
    }
}

fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn optional_json<T: serde::Serialize>(
    value: &Option<T>,
) -> std::result::Result<Option<String>, SqliteLedgerError> {
    match value {
        Some(inner) => Ok(Some(serde_json::to_string(inner)?)),
        None => Ok(None),
    }
}

#[async_trait::async_trait]
impl Ledger for SqliteLedger {
    #[instrument(skip(self, record), fields(run = %record.run_id, effect = %record.effect_id), err)]
    async fn put_effect(&self, record: EffectRecord) -> Result<PutOutcome> {
        let input_json =
            serde_json::to_string(&record.input).map_err(SqliteLedgerError::Serde)?;
        let output_json = optional_json(&record.output)?;
        let effect_key = record.effect_id.encode();

        // Single conditional upsert: a row whose status is already
        // 'succeeded' is left untouched, so the first success wins under
        // concurrent duplicate dispatch.
        let result = sqlx::query(
            r#"
            INSERT INTO effects (
                run_id, effect_id, task, status,
                input_json, output_json, error,
                created_at, completed_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            ON CONFLICT(run_id, effect_id) DO UPDATE SET
                task = excluded.task,
                status = excluded.status,
                input_json = excluded.input_json,
                output_json = excluded.output_json,
                error = excluded.error,
                completed_at = excluded.completed_at
            WHERE effects.status != 'succeeded'
            "#,
        )
        .bind(record.run_id.as_str())
        .bind(&effect_key)
        .bind(&record.task)
        .bind(record.status.as_str())
        .bind(&input_json)
        .bind(&output_json)
        .bind(&record.error)
        .bind(record.created_at.to_rfc3339())
        .bind(record.completed_at.map(|t| t.to_rfc3339()))
        .execute(&*self.pool)
        .await
        .map_err(SqliteLedgerError::Sqlx)?;

        if result.rows_affected() > 0 {
            return Ok(PutOutcome::Recorded);
        }

        // The write lost to an earlier success; read back the winner.
        let existing = self
            .get_effect(&record.run_id, &record.effect_id)
            .await?
            .ok_or_else(|| {
                LedgerError::Other("conflicting effect row disappeared".to_string())
            })?;
        Ok(PutOutcome::Conflict { existing })
    }

    #[instrument(skip(self), fields(run = %run_id, effect = %effect_id), err)]
    async fn get_effect(
        &self,
        run_id: &RunId,
        effect_id: &EffectId,
    ) -> Result<Option<EffectRecord>> {
        let row = sqlx::query(
            r#"
            SELECT run_id, effect_id, task, status,
                   input_json, output_json, error,
                   created_at, completed_at
            FROM effects
            WHERE run_id = ?1 AND effect_id = ?2
            "#,
        )
        .bind(run_id.as_str())
        .bind(effect_id.encode())
        .fetch_optional(&*self.pool)
        .await
        .map_err(SqliteLedgerError::Sqlx)?;

        match row {
            Some(row) => Ok(Some(Self::effect_from_row(&row)?)),
            None => Ok(None),
        }
    }

    #[instrument(skip(self, run), fields(run = %run.run_id), err)]
    async fn save_run(&self, run: &RunRecord) -> Result<()> {
        let status =
            serde_json::to_value(run.status).map_err(SqliteLedgerError::Serde)?;
        let status = status.as_str().map(str::to_string).ok_or_else(|| {
            LedgerError::Other("run status did not serialize to a string".to_string())
        })?;
        let inputs_json =
            serde_json::to_string(&run.inputs).map_err(SqliteLedgerError::Serde)?;
        let artifacts_json =
            serde_json::to_string(&run.artifacts).map_err(SqliteLedgerError::Serde)?;
        let pending_json = optional_json(&run.pending_breakpoint)?;
        let failure_json = optional_json(&run.failure)?;
        let result_json = optional_json(&run.result)?;

        sqlx::query(
            r#"
            INSERT OR REPLACE INTO runs (
                id, process, status, cursor,
                inputs_json, artifacts_json,
                pending_breakpoint_json, failure_json, result_json,
                created_at, updated_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            "#,
        )
        .bind(run.run_id.as_str())
        .bind(&run.process)
        .bind(&status)
        .bind(run.cursor as i64)
        .bind(&inputs_json)
        .bind(&artifacts_json)
        .bind(&pending_json)
        .bind(&failure_json)
        .bind(&result_json)
        .bind(run.created_at.to_rfc3339())
        .bind(run.updated_at.to_rfc3339())
        .execute(&*self.pool)
        .await
        .map_err(SqliteLedgerError::Sqlx)?;

        Ok(())
    }

    #[instrument(skip(self), fields(run = %run_id), err)]
    async fn load_run(&self, run_id: &RunId) -> Result<Option<RunRecord>> {
        let row = sqlx::query(
            r#"
            SELECT id, process, status, cursor,
                   inputs_json, artifacts_json,
                   pending_breakpoint_json, failure_json, result_json,
                   created_at, updated_at
            FROM runs
            WHERE id = ?1
            "#,
        )
        .bind(run_id.as_str())
        .fetch_optional(&*self.pool)
        .await
        .map_err(SqliteLedgerError::Sqlx)?;

        match row {
            Some(row) => Ok(Some(Self::run_from_row(&row)?)),
            None => Ok(None),
        }
    }

    #[instrument(skip(self), err)]
    async fn list_runs(&self) -> Result<Vec<RunId>> {
        let rows = sqlx::query("SELECT id FROM runs ORDER BY created_at, id")
            .fetch_all(&*self.pool)
            .await
            .map_err(SqliteLedgerError::Sqlx)?;

        rows.iter()
            .map(|row| {
                let id: String = row.try_get("id").map_err(SqliteLedgerError::Sqlx)?;
                Ok(RunId::from(id))
            })
            .collect()
    }
}
