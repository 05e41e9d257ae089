//! PostgreSQL step ledger implementation.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use sqlx::{PgPool, Row};
use time::OffsetDateTime;
use uuid::Uuid;

use super::ledger::{
    ClaimedRun, FailedRun, LedgerStore, RunSnapshot, RunStatus, StepRecord,
};
use crate::error::{Error, Result};

/// PostgreSQL-backed step ledger for production use.
///
/// # Database schema
///
/// Requires tables in the `bracketflow` schema (see [`migrate`](Self::migrate)):
///
/// | Table       | Purpose                                       |
/// |-------------|-----------------------------------------------|
/// | `runs`      | Workflow run registry, one row per `(kind, key)` |
/// | `run_steps` | Checkpointed step outputs, keyed by run and name |
///
/// # Concurrency
///
/// Claims use `FOR UPDATE SKIP LOCKED`, so multiple workers (and multiple
/// processes) can poll the same ledger without ever executing the same run
/// concurrently. Lease and backoff timestamps are computed in the database
/// to avoid clock skew between app and DB servers.
#[derive(Debug, Clone)]
pub struct PgLedger {
    pool: PgPool,
}

impl PgLedger {
    /// Create a ledger from a connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create the `bracketflow` schema and tables if they do not exist.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::query("CREATE SCHEMA IF NOT EXISTS bracketflow")
            .execute(&self.pool)
            .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS bracketflow.runs (
                id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
                kind TEXT NOT NULL,
                key TEXT NOT NULL,
                payload JSONB NOT NULL,
                status TEXT NOT NULL DEFAULT 'pending',
                attempts INT NOT NULL DEFAULT 0,
                wake_at TIMESTAMPTZ,
                wake_step TEXT,
                locked_by TEXT,
                locked_until TIMESTAMPTZ,
                last_error TEXT,
                created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
                UNIQUE (kind, key)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS bracketflow.run_steps (
                run_id UUID NOT NULL REFERENCES bracketflow.runs (id),
                name TEXT NOT NULL,
                output JSONB NOT NULL,
                recorded_at TIMESTAMPTZ NOT NULL DEFAULT now(),
                PRIMARY KEY (run_id, name)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn load_steps(&self, run_id: Uuid) -> Result<Vec<StepRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT name, output
            FROM bracketflow.run_steps
            WHERE run_id = $1
            ORDER BY recorded_at
            "#,
        )
        .bind(run_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                Ok(StepRecord {
                    name: row.try_get("name")?,
                    output: row.try_get("output")?,
                })
            })
            .collect()
    }
}

fn parse_status(value: &str) -> Result<RunStatus> {
    RunStatus::from_str(value).ok_or_else(|| Error::Ledger(format!("unknown run status {value}")))
}

#[async_trait]
impl LedgerStore for PgLedger {
    async fn enqueue(&self, kind: &str, key: &str, payload: Value) -> Result<Uuid> {
        // ON CONFLICT DO NOTHING returns no row for duplicates, so fall back
        // to reading the existing run's id.
        let inserted = sqlx::query(
            r#"
            INSERT INTO bracketflow.runs (kind, key, payload)
            VALUES ($1, $2, $3)
            ON CONFLICT (kind, key) DO NOTHING
            RETURNING id
            "#,
        )
        .bind(kind)
        .bind(key)
        .bind(&payload)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(row) = inserted {
            return Ok(row.try_get("id")?);
        }

        let existing = sqlx::query("SELECT id FROM bracketflow.runs WHERE kind = $1 AND key = $2")
            .bind(kind)
            .bind(key)
            .fetch_one(&self.pool)
            .await?;
        Ok(existing.try_get("id")?)
    }

    async fn claim_due(&self, worker_id: &str, lease: Duration) -> Result<Option<ClaimedRun>> {
        // RETURNING sees post-update values, so the pre-update wake_step has
        // to come out of the locking CTE instead of the updated row.
        let lease_secs = lease.as_secs_f64();
        let row = sqlx::query(
            r#"
            WITH due AS (
                SELECT id, wake_step FROM bracketflow.runs
                WHERE status IN ('pending', 'sleeping')
                  AND (wake_at IS NULL OR wake_at <= now())
                  AND (locked_until IS NULL OR locked_until < now())
                ORDER BY created_at
                LIMIT 1
                FOR UPDATE SKIP LOCKED
            )
            UPDATE bracketflow.runs AS r
            SET status = 'pending',
                wake_at = NULL,
                wake_step = NULL,
                locked_by = $2,
                locked_until = now() + ($1 * interval '1 second')
            FROM due
            WHERE r.id = due.id
            RETURNING r.id, r.kind, r.key, r.payload, r.attempts, due.wake_step
            "#,
        )
        .bind(lease_secs)
        .bind(worker_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let id: Uuid = row.try_get("id")?;
        let attempts: i32 = row.try_get("attempts")?;

        // A claimed sleeping run has finished its suspension; checkpoint the
        // sleep step so the re-entered body replays past it.
        let wake_step: Option<String> = row.try_get("wake_step")?;
        if let Some(step) = wake_step {
            sqlx::query(
                r#"
                INSERT INTO bracketflow.run_steps (run_id, name, output)
                VALUES ($1, $2, 'null'::jsonb)
                ON CONFLICT (run_id, name) DO NOTHING
                "#,
            )
            .bind(id)
            .bind(&step)
            .execute(&self.pool)
            .await?;
        }

        let steps = self.load_steps(id).await?;

        Ok(Some(ClaimedRun {
            id,
            kind: row.try_get("kind")?,
            key: row.try_get("key")?,
            payload: row.try_get("payload")?,
            attempts: attempts as u32,
            steps,
        }))
    }

    async fn record_step(&self, run_id: Uuid, name: &str, output: Value) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO bracketflow.run_steps (run_id, name, output)
            VALUES ($1, $2, $3)
            ON CONFLICT (run_id, name)
            DO UPDATE SET output = EXCLUDED.output, recorded_at = now()
            "#,
        )
        .bind(run_id)
        .bind(name)
        .bind(&output)
        .execute(&mut *tx)
        .await?;

        sqlx::query("UPDATE bracketflow.runs SET attempts = 0 WHERE id = $1")
            .bind(run_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn complete(&self, run_id: Uuid) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE bracketflow.runs
            SET status = 'completed',
                wake_at = NULL,
                locked_by = NULL,
                locked_until = NULL
            WHERE id = $1
            "#,
        )
        .bind(run_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn suspend(&self, run_id: Uuid, step: &str, wake_at: OffsetDateTime) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE bracketflow.runs
            SET status = 'sleeping',
                wake_at = $2,
                wake_step = $3,
                locked_by = NULL,
                locked_until = NULL
            WHERE id = $1
            "#,
        )
        .bind(run_id)
        .bind(wake_at)
        .bind(step)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn record_retry(&self, run_id: Uuid, error: &str, backoff: Duration) -> Result<()> {
        let backoff_secs = backoff.as_secs_f64();
        sqlx::query(
            r#"
            UPDATE bracketflow.runs
            SET status = 'pending',
                attempts = attempts + 1,
                wake_at = now() + ($2 * interval '1 second'),
                last_error = $3,
                locked_by = NULL,
                locked_until = NULL
            WHERE id = $1
            "#,
        )
        .bind(run_id)
        .bind(backoff_secs)
        .bind(error)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn fail(&self, run_id: Uuid, error: &str) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE bracketflow.runs
            SET status = 'failed',
                wake_at = NULL,
                last_error = $2,
                locked_by = NULL,
                locked_until = NULL
            WHERE id = $1
            "#,
        )
        .bind(run_id)
        .bind(error)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn run_state(&self, run_id: Uuid) -> Result<Option<RunSnapshot>> {
        let row = sqlx::query(
            r#"
            SELECT kind, key, status, attempts, wake_at, last_error
            FROM bracketflow.runs
            WHERE id = $1
            "#,
        )
        .bind(run_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let status: String = row.try_get("status")?;
        let attempts: i32 = row.try_get("attempts")?;
        let steps = self.load_steps(run_id).await?;

        Ok(Some(RunSnapshot {
            id: run_id,
            kind: row.try_get("kind")?,
            key: row.try_get("key")?,
            status: parse_status(&status)?,
            attempts: attempts as u32,
            wake_at: row.try_get("wake_at")?,
            last_error: row.try_get("last_error")?,
            step_names: steps.into_iter().map(|step| step.name).collect(),
        }))
    }

    async fn fetch_failed(&self, limit: u32) -> Result<Vec<FailedRun>> {
        let rows = sqlx::query(
            r#"
            SELECT id, kind, key, payload, attempts, last_error, created_at
            FROM bracketflow.runs
            WHERE status = 'failed'
            ORDER BY created_at
            LIMIT $1
            "#,
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                let attempts: i32 = row.try_get("attempts")?;
                Ok(FailedRun {
                    id: row.try_get("id")?,
                    kind: row.try_get("kind")?,
                    key: row.try_get("key")?,
                    payload: row.try_get("payload")?,
                    attempts: attempts as u32,
                    last_error: row.try_get("last_error")?,
                    created_at: row.try_get("created_at")?,
                })
            })
            .collect()
    }
}
