//! Shared fixtures for integration tests: recording fakes for the external
//! systems and a runtime harness with fast polling.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use uuid::Uuid;

use bracketflow::client::{MetaModel, RaceRoomGateway, TournamentStore, WriteMode};
use bracketflow::record::{MatchRecord, Metafields, RaceRecord, RacerRecord};
use bracketflow::runner::{
    MemoryLedger, RetryPolicy, RunSnapshot, RunStatus, TournamentRuntime, WorkerConfig,
};
use bracketflow::workflows::{RaceScheduledWorkflow, RaceStartWorkflow};
use bracketflow::{Error, TournamentConfig};

pub const DEFAULT_TEST_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Initialize tracing for tests. Safe to call multiple times.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("bracketflow=debug")
        .try_init();
}

/// A metafield write observed by the fake store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetafieldWrite {
    pub model: MetaModel,
    pub model_id: String,
    pub key: String,
    pub value: String,
    pub mode: WriteMode,
}

#[derive(Default)]
struct FakeStoreState {
    matches: HashMap<String, MatchRecord>,
    writes: Vec<MetafieldWrite>,
    fetch_calls: usize,
    failing_fetches: u32,
}

/// In-memory [`TournamentStore`] recording every write.
///
/// Writes are applied back to the stored snapshots, so a workflow that
/// re-fetches sees its own earlier effects. Fetch failures can be injected
/// to exercise retry behavior.
#[derive(Clone, Default)]
pub struct FakeStore {
    inner: Arc<Mutex<FakeStoreState>>,
}

impl FakeStore {
    pub fn insert_match(&self, record: MatchRecord) {
        let mut state = self.inner.lock().unwrap();
        state.matches.insert(record.id.clone(), record);
    }

    /// Make the next `count` fetches fail transiently.
    pub fn fail_next_fetches(&self, count: u32) {
        self.inner.lock().unwrap().failing_fetches = count;
    }

    pub fn fetch_calls(&self) -> usize {
        self.inner.lock().unwrap().fetch_calls
    }

    pub fn writes(&self) -> Vec<MetafieldWrite> {
        self.inner.lock().unwrap().writes.clone()
    }

    /// Current value of a match metafield, including applied writes.
    pub fn metafield(&self, match_id: &str, key: &str) -> Option<String> {
        let state = self.inner.lock().unwrap();
        state
            .matches
            .get(match_id)
            .and_then(|record| record.metafields.try_get(key).map(str::to_owned))
    }
}

#[async_trait]
impl TournamentStore for FakeStore {
    async fn fetch_match(&self, match_id: &str) -> bracketflow::Result<Option<MatchRecord>> {
        let mut state = self.inner.lock().unwrap();
        state.fetch_calls += 1;
        if state.failing_fetches > 0 {
            state.failing_fetches -= 1;
            return Err(Error::Store("injected fetch failure".into()));
        }
        Ok(state.matches.get(match_id).cloned())
    }

    async fn put_metafield(
        &self,
        model: MetaModel,
        model_id: &str,
        key: &str,
        value: &str,
        mode: WriteMode,
    ) -> bracketflow::Result<()> {
        let mut state = self.inner.lock().unwrap();
        state.writes.push(MetafieldWrite {
            model,
            model_id: model_id.to_owned(),
            key: key.to_owned(),
            value: value.to_owned(),
            mode,
        });
        if model == MetaModel::Match {
            if let Some(record) = state.matches.get_mut(model_id) {
                record.metafields.set(key, value);
            }
        }
        Ok(())
    }
}

/// Recording [`RaceRoomGateway`].
#[derive(Clone, Default)]
pub struct FakeGateway {
    messages: Arc<Mutex<Vec<(String, String)>>>,
}

impl FakeGateway {
    /// Messages sent so far, as `(room_url, text)` pairs.
    pub fn messages(&self) -> Vec<(String, String)> {
        self.messages.lock().unwrap().clone()
    }
}

#[async_trait]
impl RaceRoomGateway for FakeGateway {
    async fn send_message(&self, room_url: &str, text: &str) -> bracketflow::Result<()> {
        self.messages
            .lock()
            .unwrap()
            .push((room_url.to_owned(), text.to_owned()));
        Ok(())
    }
}

/// Fast worker config for tests.
pub fn test_worker_config() -> WorkerConfig {
    WorkerConfig {
        poll_interval: DEFAULT_POLL_INTERVAL,
        shutdown_timeout: Duration::from_secs(5),
        retry_policy: RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(50),
        },
        ..Default::default()
    }
}

/// Poll until the condition returns `Some(T)` or the timeout expires.
pub async fn wait_until<F, Fut, T>(timeout: Duration, check: F) -> Result<T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<Option<T>>>,
{
    let deadline = tokio::time::Instant::now() + timeout;

    loop {
        if let Some(result) = check().await? {
            return Ok(result);
        }

        if tokio::time::Instant::now() > deadline {
            return Err(anyhow!("timeout waiting for condition"));
        }

        tokio::time::sleep(DEFAULT_POLL_INTERVAL).await;
    }
}

/// Manages the runtime lifecycle for a test. Drop signals shutdown.
pub struct TestApp {
    pub runtime: TournamentRuntime<MemoryLedger>,
    pub store: FakeStore,
    pub gateway: FakeGateway,
    shutdown: watch::Sender<bool>,
    _handle: JoinHandle<()>,
}

impl TestApp {
    /// Spawn a runtime with both workflows registered over fresh fakes.
    pub async fn spawn() -> Result<TestApp> {
        Self::spawn_with(FakeStore::default()).await
    }

    pub async fn spawn_with(store: FakeStore) -> Result<TestApp> {
        init_test_tracing();

        let gateway = FakeGateway::default();
        let runtime = TournamentRuntime::builder(MemoryLedger::default())
            .register(RaceScheduledWorkflow::new(store.clone()))?
            .register(RaceStartWorkflow::new(
                store.clone(),
                gateway.clone(),
                TournamentConfig::default(),
            ))?
            .config(test_worker_config())
            .build();

        let (shutdown, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(runtime.clone().run(shutdown_rx));

        Ok(TestApp {
            runtime,
            store,
            gateway,
            shutdown,
            _handle: handle,
        })
    }

    /// Wait until the run reaches the given status.
    pub async fn wait_for_status(&self, run_id: Uuid, status: RunStatus) -> Result<RunSnapshot> {
        wait_until(DEFAULT_TEST_TIMEOUT, || async {
            let snapshot = self.runtime.run_state(run_id).await?;
            Ok(snapshot.filter(|s| s.status == status))
        })
        .await
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        let _ = self.shutdown.send(true);
    }
}

/// Match fixture with no metafields set.
pub fn match_record(id: &str) -> MatchRecord {
    MatchRecord {
        id: id.to_owned(),
        metafields: Metafields::default(),
        races: Vec::new(),
        racers: Vec::new(),
    }
}

pub fn with_metafields(mut record: MatchRecord, pairs: &[(&str, &str)]) -> MatchRecord {
    record.metafields = Metafields::from_pairs(pairs.iter().copied());
    record
}

pub fn race(
    id: &str,
    ordering: i64,
    scheduled_at: Option<&str>,
    schedule_on_finish: bool,
) -> RaceRecord {
    RaceRecord {
        id: id.to_owned(),
        ordering,
        scheduled_at: scheduled_at.map(str::to_owned),
        schedule_on_finish,
        racetime_url: Some("https://racetime.gg/smr/test-room".to_owned()),
    }
}

pub fn racer(id: &str, seed: &str) -> RacerRecord {
    RacerRecord {
        id: id.to_owned(),
        initial_seed: seed.to_owned(),
    }
}
