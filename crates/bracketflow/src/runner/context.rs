//! Durable step execution context.

use std::collections::HashMap;
use std::future::Future;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use time::OffsetDateTime;
use tracing::debug;
use uuid::Uuid;

use super::ledger::LedgerStore;
use crate::error::Error;

/// Result of a durable step or workflow body.
///
/// The error side is an [`Interrupt`], not a plain error: a workflow body
/// can stop for reasons that are not failures at all (suspension until a
/// wall-clock time). `?` inside a workflow propagates whichever interrupt a
/// step produced.
pub type StepOutcome<T> = std::result::Result<T, Interrupt>;

/// Why a workflow body stopped before completing.
#[derive(Debug)]
pub enum Interrupt {
    /// Suspend the run until the given wall-clock time, then re-enter it.
    Suspend {
        /// The `sleep_until` step to checkpoint once the wake time arrives.
        step: String,
        /// When the run becomes due again (UTC).
        wake_at: OffsetDateTime,
    },
    /// A step failed transiently; re-attempt it after a backoff.
    Retry(Error),
    /// A step failed permanently; abort the run.
    Abort(Error),
}

impl From<Error> for Interrupt {
    fn from(error: Error) -> Self {
        if error.is_permanent() {
            Interrupt::Abort(error)
        } else {
            Interrupt::Retry(error)
        }
    }
}

/// Execution context for one entry into a workflow run.
///
/// A workflow body is re-entered from the top after every suspension, retry,
/// or process restart. The context carries the run's checkpointed steps:
/// [`run`](Self::run) replays a recorded step's result instead of executing
/// it again, which is what bounds every step to at most one
/// externally-visible effect across arbitrarily many re-entries.
pub struct RunContext<'a> {
    ledger: &'a dyn LedgerStore,
    run_id: Uuid,
    steps: HashMap<String, Value>,
}

impl<'a> RunContext<'a> {
    /// Create a context for a claimed run.
    pub fn new(ledger: &'a dyn LedgerStore, run_id: Uuid, steps: HashMap<String, Value>) -> Self {
        Self {
            ledger,
            run_id,
            steps,
        }
    }

    /// The run being executed.
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Execute a named durable step.
    ///
    /// If the step is already checkpointed, its recorded result is decoded
    /// and returned without executing `f`. Otherwise `f` runs; on success
    /// the result is checkpointed before it is returned, so a crash after
    /// the checkpoint replays the result instead of re-running the effect.
    ///
    /// Step names must be unique within a workflow and stable across
    /// deployments — they key the checkpoint ledger.
    pub async fn run<T, F, Fut>(&mut self, name: &str, f: F) -> StepOutcome<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = crate::Result<T>>,
    {
        if let Some(recorded) = self.steps.get(name) {
            debug!(run_id = %self.run_id, step = name, "Replaying checkpointed step");
            return serde_json::from_value(recorded.clone()).map_err(|source| {
                Interrupt::Abort(Error::Checkpoint {
                    step: name.to_owned(),
                    source,
                })
            });
        }

        let result = f().await.map_err(Interrupt::from)?;

        let output = serde_json::to_value(&result)
            .map_err(|e| Interrupt::Abort(Error::Serialization(e)))?;
        self.checkpoint(name, output).await?;

        Ok(result)
    }

    /// Suspend the run until an absolute wall-clock time.
    ///
    /// Returns immediately if the target time has already passed (or this
    /// suspension already completed on a previous entry). Otherwise the
    /// workflow body unwinds with [`Interrupt::Suspend`]; the worker parks
    /// the run, and the claim that wakes it checkpoints this step before
    /// re-entering the body.
    pub async fn sleep_until(&mut self, name: &str, wake_at: OffsetDateTime) -> StepOutcome<()> {
        if self.steps.contains_key(name) {
            return Ok(());
        }

        if OffsetDateTime::now_utc() >= wake_at {
            self.checkpoint(name, Value::Null).await?;
            return Ok(());
        }

        debug!(run_id = %self.run_id, step = name, wake_at = %wake_at, "Suspending run");
        Err(Interrupt::Suspend {
            step: name.to_owned(),
            wake_at,
        })
    }

    async fn checkpoint(&mut self, name: &str, output: Value) -> StepOutcome<()> {
        self.ledger
            .record_step(self.run_id, name, output.clone())
            .await
            .map_err(Interrupt::from)?;
        self.steps.insert(name.to_owned(), output);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::runner::MemoryLedger;

    async fn enqueued(ledger: &MemoryLedger) -> Uuid {
        ledger
            .enqueue("race.initiate", "m-1:r-1", Value::Null)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn step_executes_once_and_replays_after() {
        let ledger = MemoryLedger::default();
        let run_id = enqueued(&ledger).await;
        let mut ctx = RunContext::new(&ledger, run_id, HashMap::new());

        let first: u32 = ctx.run("count", || async { Ok(41) }).await.unwrap();
        assert_eq!(first, 41);

        // Re-running the same step must not execute the closure again.
        let second: u32 = ctx
            .run("count", || async { panic!("step re-executed") })
            .await
            .unwrap();
        assert_eq!(second, 41);
    }

    #[tokio::test]
    async fn replay_survives_context_reconstruction() {
        let ledger = MemoryLedger::default();
        let run_id = enqueued(&ledger).await;

        let mut ctx = RunContext::new(&ledger, run_id, HashMap::new());
        let _: String = ctx
            .run("greet", || async { Ok("hello".to_string()) })
            .await
            .unwrap();
        drop(ctx);

        // Fresh context as after a process restart: steps come from the ledger.
        let snapshot = ledger.run_state(run_id).await.unwrap().unwrap();
        assert_eq!(snapshot.step_names, vec!["greet"]);

        let claimed = ledger
            .claim_due("w-test", Duration::from_secs(30))
            .await
            .unwrap()
            .unwrap();
        let mut ctx = RunContext::new(&ledger, run_id, claimed.step_map());
        let replayed: String = ctx
            .run("greet", || async { panic!("step re-executed") })
            .await
            .unwrap();
        assert_eq!(replayed, "hello");
    }

    #[tokio::test]
    async fn transient_error_becomes_retry() {
        let ledger = MemoryLedger::default();
        let run_id = enqueued(&ledger).await;
        let mut ctx = RunContext::new(&ledger, run_id, HashMap::new());

        let outcome: StepOutcome<()> = ctx
            .run("flaky", || async {
                Err(Error::Store("connection reset".into()))
            })
            .await;

        assert!(matches!(outcome, Err(Interrupt::Retry(_))));
        // Nothing checkpointed for the failed step.
        let snapshot = ledger.run_state(run_id).await.unwrap().unwrap();
        assert!(snapshot.step_names.is_empty());
    }

    #[tokio::test]
    async fn permanent_error_becomes_abort() {
        let ledger = MemoryLedger::default();
        let run_id = enqueued(&ledger).await;
        let mut ctx = RunContext::new(&ledger, run_id, HashMap::new());

        let outcome: StepOutcome<()> = ctx
            .run("lookup", || async {
                Err(Error::MatchNotFound("m-404".into()))
            })
            .await;

        assert!(matches!(outcome, Err(Interrupt::Abort(_))));
    }

    #[tokio::test]
    async fn sleep_until_past_time_records_and_continues() {
        let ledger = MemoryLedger::default();
        let run_id = enqueued(&ledger).await;
        let mut ctx = RunContext::new(&ledger, run_id, HashMap::new());

        let past = OffsetDateTime::now_utc() - time::Duration::minutes(5);
        ctx.sleep_until("wait", past).await.unwrap();

        let snapshot = ledger.run_state(run_id).await.unwrap().unwrap();
        assert_eq!(snapshot.step_names, vec!["wait"]);
    }

    #[tokio::test]
    async fn sleep_until_future_time_suspends() {
        let ledger = MemoryLedger::default();
        let run_id = enqueued(&ledger).await;
        let mut ctx = RunContext::new(&ledger, run_id, HashMap::new());

        let future = OffsetDateTime::now_utc() + time::Duration::hours(1);
        let outcome = ctx.sleep_until("wait", future).await;

        match outcome {
            Err(Interrupt::Suspend { step, wake_at }) => {
                assert_eq!(step, "wait");
                assert_eq!(wake_at, future);
            }
            other => panic!("expected suspension, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn checkpoint_type_mismatch_aborts() {
        let ledger = MemoryLedger::default();
        let run_id = enqueued(&ledger).await;
        let mut ctx = RunContext::new(&ledger, run_id, HashMap::new());

        let _: String = ctx
            .run("shape", || async { Ok("text".to_string()) })
            .await
            .unwrap();

        // Same step decoded as a different type: the checkpoint cannot replay.
        let outcome: StepOutcome<u32> = ctx.run("shape", || async { Ok(7) }).await;
        assert!(matches!(
            outcome,
            Err(Interrupt::Abort(Error::Checkpoint { .. }))
        ));
    }
}
