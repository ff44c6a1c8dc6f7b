//! Tests for host contexts and the unit-of-work stack

use std::sync::Arc;

use cuttle_core::CuttleError;
use parking_lot::Mutex;
use pretty_assertions::assert_eq;

use super::*;
use crate::config::{HostSettings, PoolConfig};
use crate::pool::ConnectionPool;
use crate::registry::ConfigId;
use crate::test_support::MockConnector;

/// Records every teardown it sees as `(label, depth, error)`
struct RecordingHook {
    label: &'static str,
    seen: Arc<Mutex<Vec<(&'static str, usize, Option<String>)>>>,
}

impl TeardownHook for RecordingHook {
    fn teardown(&self, unit: &mut UnitOfWork, error: Option<&CuttleError>) {
        self.seen
            .lock()
            .push((self.label, unit.depth(), error.map(|e| e.to_string())));
    }
}

#[test]
fn test_host_ids_are_unique() {
    let a = HostContext::new("a");
    let b = HostContext::new("a");
    assert_ne!(a.id(), b.id());
    assert_eq!(a.name(), "a");
}

#[test]
fn test_host_settings_are_mutable() {
    let host = HostContext::with_settings("app", HostSettings::new().with("CUTTLEPOOL_HOST", "db1"));
    host.set_setting("CUTTLEPOOL_HOST", "db2");

    assert_eq!(
        host.settings().get("CUTTLEPOOL_HOST"),
        Some(&serde_json::json!("db2"))
    );
}

#[test]
fn test_push_and_pop() {
    let host = HostContext::new("app");
    let mut stack = ContextStack::new();
    assert!(stack.is_empty());
    assert!(stack.current_host().is_none());

    assert_eq!(stack.push(host.clone()), 1);
    assert_eq!(stack.push(host.clone()), 2);
    assert_eq!(stack.depth(), 2);
    assert_eq!(stack.top().map(UnitOfWork::depth), Some(2));
    assert_eq!(stack.current_host().map(|h| h.id()), Some(host.id()));

    assert!(stack.pop(None).is_some());
    assert!(stack.pop(None).is_some());
    assert!(stack.pop(None).is_none());
    assert!(stack.is_empty());
}

#[test]
fn test_teardown_hooks_run_in_order_with_error() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let host = HostContext::new("app");
    host.on_teardown(Arc::new(RecordingHook {
        label: "first",
        seen: seen.clone(),
    }));
    host.on_teardown(Arc::new(RecordingHook {
        label: "second",
        seen: seen.clone(),
    }));

    let mut stack = ContextStack::new();
    stack.push(host.clone());
    stack.push(host.clone());
    stack.pop(Some(&CuttleError::Other("boom".into())));
    stack.pop(None);

    assert_eq!(
        *seen.lock(),
        vec![
            ("first", 2, Some("boom".to_string())),
            ("second", 2, Some("boom".to_string())),
            ("first", 1, None),
            ("second", 1, None),
        ]
    );
}

#[test]
fn test_dropping_stack_ends_every_unit() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let host = HostContext::new("app");
    host.on_teardown(Arc::new(RecordingHook {
        label: "hook",
        seen: seen.clone(),
    }));

    {
        let mut stack = ContextStack::new();
        stack.push(host.clone());
        stack.push(host.clone());
    }

    let depths: Vec<_> = seen.lock().iter().map(|(_, depth, _)| *depth).collect();
    assert_eq!(depths, vec![2, 1]);
}

#[test]
fn test_hooks_of_other_hosts_do_not_run() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let watched = HostContext::new("watched");
    watched.on_teardown(Arc::new(RecordingHook {
        label: "watched",
        seen: seen.clone(),
    }));

    let mut stack = ContextStack::new();
    stack.push(HostContext::new("other"));
    stack.pop(None);

    assert!(seen.lock().is_empty());
}

#[tokio::test]
async fn test_bindings_are_per_unit() {
    let pool = ConnectionPool::new(PoolConfig::new(3, 0), MockConnector::new());
    let config = ConfigId::new();
    let host = HostContext::new("app");

    let mut stack = ContextStack::new();
    stack.push(host.clone());
    let outer = stack.top_mut().expect("unit");
    assert!(outer.bind(config, pool.acquire().await.expect("acquire")).is_none());
    assert_eq!(outer.binding_count(), 1);

    stack.push(host.clone());
    assert!(stack.top().and_then(|u| u.binding(config)).is_none());

    let unit = stack.top_mut().expect("inner");
    unit.bind(config, pool.acquire().await.expect("acquire"));
    let replaced = unit.bind(config, pool.acquire().await.expect("acquire"));
    assert!(replaced.is_some());
    drop(replaced);

    // Connections still bound when a unit ends are closed with it
    stack.pop(None);
    assert_eq!(pool.stats().active(), 1);

    let unbound = stack.top_mut().and_then(|u| u.unbind(config));
    assert!(unbound.is_some());
    assert_eq!(stack.top().map(UnitOfWork::binding_count), Some(0));
}
