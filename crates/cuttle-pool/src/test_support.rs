//! Mock driver shared by the unit tests

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use cuttle_core::{
    Connection, ConnectionArgs, Connector, CuttleError, QueryResult, Result, StatementResult, Value,
};
use parking_lot::Mutex;

use crate::health::ConnectionHooks;

/// Install a test subscriber once; honours `RUST_LOG`
pub(crate) fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Observable state of one mock connection
#[derive(Debug)]
pub(crate) struct MockState {
    pub id: usize,
    pub args: ConnectionArgs,
    closed: AtomicBool,
    dropped: AtomicBool,
    reachable: AtomicBool,
    commits: AtomicUsize,
    executed: Mutex<Vec<String>>,
}

impl MockState {
    pub fn commits(&self) -> usize {
        self.commits.load(Ordering::SeqCst)
    }

    pub fn executed(&self) -> Vec<String> {
        self.executed.lock().clone()
    }

    /// Simulate the server going away: queries fail but the driver has not noticed
    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    /// Simulate the driver noticing a dropped connection
    pub fn mark_closed(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Whether the raw connection has been dropped by its owner
    pub fn is_dropped(&self) -> bool {
        self.dropped.load(Ordering::SeqCst)
    }
}

pub(crate) struct MockConnection {
    state: Arc<MockState>,
}

#[async_trait]
impl Connection for MockConnection {
    fn driver_name(&self) -> &str {
        "mock"
    }

    async fn execute(&self, sql: &str, _params: &[Value]) -> Result<StatementResult> {
        self.check()?;
        self.state.executed.lock().push(sql.to_string());
        Ok(StatementResult { affected_rows: 1 })
    }

    async fn query(&self, sql: &str, _params: &[Value]) -> Result<QueryResult> {
        self.check()?;
        self.state.executed.lock().push(sql.to_string());
        Ok(QueryResult::empty())
    }

    async fn commit(&self) -> Result<()> {
        self.check()?;
        self.state.commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.state.mark_closed();
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.state.is_closed()
    }
}

impl Drop for MockConnection {
    fn drop(&mut self) {
        self.state.dropped.store(true, Ordering::SeqCst);
    }
}

impl MockConnection {
    fn check(&self) -> Result<()> {
        if self.state.is_closed() {
            return Err(CuttleError::Connection("connection closed".into()));
        }
        if !self.state.reachable.load(Ordering::SeqCst) {
            return Err(CuttleError::Connection("server unreachable".into()));
        }
        Ok(())
    }
}

/// Connector recording every connection it opens
#[derive(Default)]
pub(crate) struct MockConnector {
    opened: Mutex<Vec<Arc<MockState>>>,
    delay: Option<Duration>,
    fail: AtomicBool,
}

impl MockConnector {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_delay(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            delay: Some(delay),
            ..Self::default()
        })
    }

    pub fn count(&self) -> usize {
        self.opened.lock().len()
    }

    pub fn connection(&self, index: usize) -> Arc<MockState> {
        self.opened.lock()[index].clone()
    }

    /// Arguments of every connect call, in order
    pub fn calls(&self) -> Vec<ConnectionArgs> {
        self.opened.lock().iter().map(|s| s.args.clone()).collect()
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self, args: &ConnectionArgs) -> Result<Box<dyn Connection>> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(CuttleError::Connection("connection refused".into()));
        }

        let mut opened = self.opened.lock();
        let state = Arc::new(MockState {
            id: opened.len(),
            args: args.clone(),
            closed: AtomicBool::new(false),
            dropped: AtomicBool::new(false),
            reachable: AtomicBool::new(true),
            commits: AtomicUsize::new(0),
            executed: Mutex::new(Vec::new()),
        });
        opened.push(state.clone());
        Ok(Box::new(MockConnection { state }))
    }
}

/// Hooks counting their calls, with a switchable ping result
pub(crate) struct CountingHooks {
    pub pings: AtomicUsize,
    pub normalizes: AtomicUsize,
    alive: AtomicBool,
    fail_normalize: AtomicBool,
}

impl CountingHooks {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            pings: AtomicUsize::new(0),
            normalizes: AtomicUsize::new(0),
            alive: AtomicBool::new(true),
            fail_normalize: AtomicBool::new(false),
        })
    }

    pub fn pings(&self) -> usize {
        self.pings.load(Ordering::SeqCst)
    }

    pub fn normalizes(&self) -> usize {
        self.normalizes.load(Ordering::SeqCst)
    }

    pub fn set_alive(&self, alive: bool) {
        self.alive.store(alive, Ordering::SeqCst);
    }

    pub fn set_fail_normalize(&self, fail: bool) {
        self.fail_normalize.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl ConnectionHooks for CountingHooks {
    async fn ping(&self, _conn: &dyn Connection) -> bool {
        self.pings.fetch_add(1, Ordering::SeqCst);
        self.alive.load(Ordering::SeqCst)
    }

    async fn normalize(&self, _conn: &dyn Connection) -> Result<()> {
        self.normalizes.fetch_add(1, Ordering::SeqCst);
        if self.fail_normalize.load(Ordering::SeqCst) {
            return Err(CuttleError::Driver("could not reset session".into()));
        }
        Ok(())
    }
}
