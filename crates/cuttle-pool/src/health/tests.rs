//! Tests for connection hooks and ping

use std::time::Duration;

use async_trait::async_trait;
use cuttle_core::{Connection, ConnectionArgs, Connector, QueryResult, Result, StatementResult, Value};
use pretty_assertions::assert_eq;

use super::ping::probe_query;
use super::*;
use crate::test_support::MockConnector;

async fn open(connector: &MockConnector) -> Box<dyn Connection> {
    connector
        .connect(&ConnectionArgs::new())
        .await
        .expect("connect")
}

/// Connection whose queries never finish in time
struct SlowConnection;

#[async_trait]
impl Connection for SlowConnection {
    fn driver_name(&self) -> &str {
        "slow"
    }

    async fn execute(&self, _sql: &str, _params: &[Value]) -> Result<StatementResult> {
        Ok(StatementResult::default())
    }

    async fn query(&self, _sql: &str, _params: &[Value]) -> Result<QueryResult> {
        tokio::time::sleep(Duration::from_secs(60)).await;
        Ok(QueryResult::empty())
    }

    async fn commit(&self) -> Result<()> {
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }

    fn is_closed(&self) -> bool {
        false
    }
}

#[test]
fn test_probe_query_per_driver() {
    assert_eq!(probe_query("oracle"), "SELECT 1 FROM DUAL");
    assert_eq!(probe_query("firebird"), "SELECT 1 FROM RDB$DATABASE");
    assert_eq!(probe_query("postgres"), "SELECT 1");
    assert_eq!(probe_query("mock"), "SELECT 1");
}

#[tokio::test]
async fn test_ping_database_runs_query() {
    let connector = MockConnector::new();
    let conn = open(&connector).await;

    let latency = ping_database(conn.as_ref()).await.expect("ping");
    assert!(latency < Duration::from_secs(1));
    assert_eq!(connector.connection(0).executed(), vec!["SELECT 1".to_string()]);
}

#[tokio::test]
async fn test_ping_database_closed_connection() {
    let connector = MockConnector::new();
    let conn = open(&connector).await;
    connector.connection(0).mark_closed();

    let result = ping_database(conn.as_ref()).await;
    assert!(matches!(result, Err(PingError::Closed)));
    assert!(connector.connection(0).executed().is_empty());
}

#[tokio::test]
async fn test_ping_database_unreachable_server() {
    let connector = MockConnector::new();
    let conn = open(&connector).await;
    connector.connection(0).set_reachable(false);

    match ping_database(conn.as_ref()).await {
        Err(PingError::Failed(e)) => assert!(e.is_connection_error()),
        other => panic!("expected a failed probe, got {:?}", other),
    }
}

#[tokio::test]
async fn test_default_hooks_trust_connection() {
    let connector = MockConnector::new();
    let conn = open(&connector).await;

    assert!(DefaultHooks.ping(conn.as_ref()).await);
    DefaultHooks.normalize(conn.as_ref()).await.expect("normalize");
    assert!(connector.connection(0).executed().is_empty());
}

#[tokio::test]
async fn test_query_hooks_ping() {
    let connector = MockConnector::new();
    let conn = open(&connector).await;
    let hooks = QueryHooks::new();

    assert!(hooks.ping(conn.as_ref()).await);
    connector.connection(0).set_reachable(false);
    assert!(!hooks.ping(conn.as_ref()).await);
}

#[tokio::test(start_paused = true)]
async fn test_query_hooks_ping_timeout() {
    let hooks = QueryHooks::new().with_ping_timeout(Duration::from_millis(100));
    assert_eq!(hooks.ping_timeout(), Duration::from_millis(100));

    assert!(!hooks.ping(&SlowConnection).await);
}

#[tokio::test]
async fn test_query_hooks_normalize() {
    let connector = MockConnector::new();
    let conn = open(&connector).await;

    QueryHooks::new()
        .normalize(conn.as_ref())
        .await
        .expect("no reset statement");
    assert!(connector.connection(0).executed().is_empty());

    let hooks = QueryHooks::default().with_reset_statement("ROLLBACK");
    assert_eq!(hooks.reset_statement(), Some("ROLLBACK"));
    hooks.normalize(conn.as_ref()).await.expect("normalize");
    assert_eq!(connector.connection(0).executed(), vec!["ROLLBACK".to_string()]);

    connector.connection(0).set_reachable(false);
    assert!(hooks.normalize(conn.as_ref()).await.is_err());
}
