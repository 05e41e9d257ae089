//! In-memory step ledger for tests and local development.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use time::OffsetDateTime;
use uuid::Uuid;

use super::ledger::{
    ClaimedRun, FailedRun, LedgerStore, RunSnapshot, RunStatus, StepRecord,
};
use crate::error::{Error, Result};

#[derive(Debug)]
struct RunRow {
    id: Uuid,
    kind: String,
    key: String,
    payload: Value,
    status: RunStatus,
    attempts: u32,
    wake_at: Option<OffsetDateTime>,
    wake_step: Option<String>,
    locked_by: Option<String>,
    locked_until: Option<OffsetDateTime>,
    last_error: Option<String>,
    steps: Vec<StepRecord>,
    created_at: OffsetDateTime,
}

/// In-memory [`LedgerStore`].
///
/// Durable only for the lifetime of the process — suitable for tests and
/// local development, not production. Cloning shares the same ledger.
#[derive(Debug, Clone, Default)]
pub struct MemoryLedger {
    inner: Arc<Mutex<Vec<RunRow>>>,
}

impl MemoryLedger {
    /// Make a run immediately claimable, ignoring its wake time and lease.
    ///
    /// Test hook: lets suspension and backoff scenarios resume without
    /// waiting out real wall-clock delays.
    pub fn wake_now(&self, run_id: Uuid) {
        let mut rows = self.inner.lock().expect("ledger lock");
        if let Some(row) = rows.iter_mut().find(|row| row.id == run_id) {
            row.wake_at = None;
            row.locked_by = None;
            row.locked_until = None;
        }
    }

    fn with_row<T>(&self, run_id: Uuid, f: impl FnOnce(&mut RunRow) -> T) -> Result<T> {
        let mut rows = self.inner.lock().expect("ledger lock");
        let row = rows
            .iter_mut()
            .find(|row| row.id == run_id)
            .ok_or_else(|| Error::Ledger(format!("unknown run {run_id}")))?;
        Ok(f(row))
    }
}

fn release(row: &mut RunRow) {
    row.locked_by = None;
    row.locked_until = None;
}

fn to_time(duration: Duration) -> time::Duration {
    time::Duration::new(duration.as_secs() as i64, duration.subsec_nanos() as i32)
}

#[async_trait]
impl LedgerStore for MemoryLedger {
    async fn enqueue(&self, kind: &str, key: &str, payload: Value) -> Result<Uuid> {
        let mut rows = self.inner.lock().expect("ledger lock");

        if let Some(existing) = rows.iter().find(|row| row.kind == kind && row.key == key) {
            return Ok(existing.id);
        }

        let id = Uuid::new_v4();
        rows.push(RunRow {
            id,
            kind: kind.to_owned(),
            key: key.to_owned(),
            payload,
            status: RunStatus::Pending,
            attempts: 0,
            wake_at: None,
            wake_step: None,
            locked_by: None,
            locked_until: None,
            last_error: None,
            steps: Vec::new(),
            created_at: OffsetDateTime::now_utc(),
        });
        Ok(id)
    }

    async fn claim_due(&self, worker_id: &str, lease: Duration) -> Result<Option<ClaimedRun>> {
        let now = OffsetDateTime::now_utc();
        let mut rows = self.inner.lock().expect("ledger lock");

        for row in rows.iter_mut() {
            let claimable = matches!(row.status, RunStatus::Pending | RunStatus::Sleeping)
                && row.wake_at.map_or(true, |wake| wake <= now)
                && row.locked_until.map_or(true, |until| until <= now);

            if claimable {
                row.status = RunStatus::Pending;
                row.wake_at = None;
                row.locked_by = Some(worker_id.to_owned());
                row.locked_until = Some(now + to_time(lease));

                // The suspension this run was parked on is now over.
                if let Some(step) = row.wake_step.take() {
                    if !row.steps.iter().any(|s| s.name == step) {
                        row.steps.push(StepRecord {
                            name: step,
                            output: Value::Null,
                        });
                    }
                }

                return Ok(Some(ClaimedRun {
                    id: row.id,
                    kind: row.kind.clone(),
                    key: row.key.clone(),
                    payload: row.payload.clone(),
                    attempts: row.attempts,
                    steps: row.steps.clone(),
                }));
            }
        }

        Ok(None)
    }

    async fn record_step(&self, run_id: Uuid, name: &str, output: Value) -> Result<()> {
        self.with_row(run_id, |row| {
            match row.steps.iter_mut().find(|step| step.name == name) {
                Some(step) => step.output = output,
                None => row.steps.push(StepRecord {
                    name: name.to_owned(),
                    output,
                }),
            }
            row.attempts = 0;
        })
    }

    async fn complete(&self, run_id: Uuid) -> Result<()> {
        self.with_row(run_id, |row| {
            row.status = RunStatus::Completed;
            row.wake_at = None;
            release(row);
        })
    }

    async fn suspend(&self, run_id: Uuid, step: &str, wake_at: OffsetDateTime) -> Result<()> {
        self.with_row(run_id, |row| {
            row.status = RunStatus::Sleeping;
            row.wake_at = Some(wake_at);
            row.wake_step = Some(step.to_owned());
            release(row);
        })
    }

    async fn record_retry(&self, run_id: Uuid, error: &str, backoff: Duration) -> Result<()> {
        let now = OffsetDateTime::now_utc();
        self.with_row(run_id, |row| {
            row.status = RunStatus::Pending;
            row.attempts += 1;
            row.wake_at = Some(now + to_time(backoff));
            row.last_error = Some(error.to_owned());
            release(row);
        })
    }

    async fn fail(&self, run_id: Uuid, error: &str) -> Result<()> {
        self.with_row(run_id, |row| {
            row.status = RunStatus::Failed;
            row.wake_at = None;
            row.last_error = Some(error.to_owned());
            release(row);
        })
    }

    async fn run_state(&self, run_id: Uuid) -> Result<Option<RunSnapshot>> {
        let rows = self.inner.lock().expect("ledger lock");
        Ok(rows.iter().find(|row| row.id == run_id).map(|row| RunSnapshot {
            id: row.id,
            kind: row.kind.clone(),
            key: row.key.clone(),
            status: row.status,
            attempts: row.attempts,
            wake_at: row.wake_at,
            last_error: row.last_error.clone(),
            step_names: row.steps.iter().map(|step| step.name.clone()).collect(),
        }))
    }

    async fn fetch_failed(&self, limit: u32) -> Result<Vec<FailedRun>> {
        let rows = self.inner.lock().expect("ledger lock");
        Ok(rows
            .iter()
            .filter(|row| row.status == RunStatus::Failed)
            .take(limit as usize)
            .map(|row| FailedRun {
                id: row.id,
                kind: row.kind.clone(),
                key: row.key.clone(),
                payload: row.payload.clone(),
                attempts: row.attempts,
                last_error: row.last_error.clone(),
                created_at: row.created_at,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LEASE: Duration = Duration::from_secs(30);

    #[tokio::test]
    async fn enqueue_deduplicates_on_kind_and_key() {
        let ledger = MemoryLedger::default();

        let first = ledger
            .enqueue("race.scheduled", "m-1:r-1", Value::Null)
            .await
            .unwrap();
        let second = ledger
            .enqueue("race.scheduled", "m-1:r-1", Value::Null)
            .await
            .unwrap();
        let other_kind = ledger
            .enqueue("race.initiate", "m-1:r-1", Value::Null)
            .await
            .unwrap();

        assert_eq!(first, second);
        assert_ne!(first, other_kind);
    }

    #[tokio::test]
    async fn claim_leases_the_run() {
        let ledger = MemoryLedger::default();
        let id = ledger
            .enqueue("race.initiate", "m-1:r-1", Value::Null)
            .await
            .unwrap();

        let claimed = ledger.claim_due("w-1", LEASE).await.unwrap().unwrap();
        assert_eq!(claimed.id, id);

        // Leased: a second worker sees nothing.
        assert!(ledger.claim_due("w-2", LEASE).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn suspended_run_is_not_due_until_woken() {
        let ledger = MemoryLedger::default();
        let id = ledger
            .enqueue("race.initiate", "m-1:r-1", Value::Null)
            .await
            .unwrap();
        let _ = ledger.claim_due("w-1", LEASE).await.unwrap().unwrap();

        let wake = OffsetDateTime::now_utc() + time::Duration::hours(1);
        ledger.suspend(id, "wait-until-10m-prior", wake).await.unwrap();

        assert!(ledger.claim_due("w-1", LEASE).await.unwrap().is_none());
        let snapshot = ledger.run_state(id).await.unwrap().unwrap();
        assert_eq!(snapshot.status, RunStatus::Sleeping);
        assert_eq!(snapshot.wake_at, Some(wake));
        // The sleep step is only recorded once the run actually wakes.
        assert!(snapshot.step_names.is_empty());

        ledger.wake_now(id);
        let reclaimed = ledger.claim_due("w-1", LEASE).await.unwrap().unwrap();
        assert_eq!(reclaimed.id, id);
        assert_eq!(reclaimed.steps.len(), 1);
        assert_eq!(reclaimed.steps[0].name, "wait-until-10m-prior");
        assert_eq!(reclaimed.steps[0].output, Value::Null);
    }

    #[tokio::test]
    async fn retry_backs_off_and_counts_attempts() {
        let ledger = MemoryLedger::default();
        let id = ledger
            .enqueue("race.initiate", "m-1:r-1", Value::Null)
            .await
            .unwrap();
        let _ = ledger.claim_due("w-1", LEASE).await.unwrap().unwrap();

        ledger
            .record_retry(id, "store timeout", Duration::from_secs(60))
            .await
            .unwrap();

        // Backing off: not due yet.
        assert!(ledger.claim_due("w-1", LEASE).await.unwrap().is_none());

        let snapshot = ledger.run_state(id).await.unwrap().unwrap();
        assert_eq!(snapshot.attempts, 1);
        assert_eq!(snapshot.last_error.as_deref(), Some("store timeout"));

        ledger.wake_now(id);
        let reclaimed = ledger.claim_due("w-1", LEASE).await.unwrap().unwrap();
        assert_eq!(reclaimed.attempts, 1);
    }

    #[tokio::test]
    async fn record_step_resets_attempt_budget() {
        let ledger = MemoryLedger::default();
        let id = ledger
            .enqueue("race.initiate", "m-1:r-1", Value::Null)
            .await
            .unwrap();
        let _ = ledger.claim_due("w-1", LEASE).await.unwrap().unwrap();
        ledger
            .record_retry(id, "transient", Duration::ZERO)
            .await
            .unwrap();

        ledger
            .record_step(id, "get-match", Value::Null)
            .await
            .unwrap();

        let snapshot = ledger.run_state(id).await.unwrap().unwrap();
        assert_eq!(snapshot.attempts, 0);
        assert_eq!(snapshot.step_names, vec!["get-match"]);
    }

    #[tokio::test]
    async fn completed_and_failed_runs_are_never_claimed() {
        let ledger = MemoryLedger::default();
        let done = ledger
            .enqueue("race.scheduled", "m-1:r-1", Value::Null)
            .await
            .unwrap();
        let broken = ledger
            .enqueue("race.scheduled", "m-2:r-1", Value::Null)
            .await
            .unwrap();

        let _ = ledger.claim_due("w-1", LEASE).await.unwrap();
        ledger.complete(done).await.unwrap();
        let _ = ledger.claim_due("w-1", LEASE).await.unwrap();
        ledger.fail(broken, "match not found").await.unwrap();

        assert!(ledger.claim_due("w-1", LEASE).await.unwrap().is_none());

        let failed = ledger.fetch_failed(10).await.unwrap();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].id, broken);
        assert_eq!(failed[0].last_error.as_deref(), Some("match not found"));
    }
}
