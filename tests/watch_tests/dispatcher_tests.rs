//! Tests for watch delivery
//!
//! These tests verify:
//! - Prefix matching and dispatch-time filters
//! - Revision order within and across streams
//! - Unsubscribe on drop, with nothing buffered afterwards

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use etcd3_model::kv::{KvStore, Simulator};
use etcd3_model::watch::{accept_all, EventKind, WatchDispatcher, WatchEvent};
use etcd3_model::Error;

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_simulator() -> Simulator {
    Simulator::builder().reap_interval(None).build()
}

fn drain(stream: &etcd3_model::watch::WatchStream) -> Vec<WatchEvent> {
    let mut events = Vec::new();
    while let Some(event) = stream.try_recv().unwrap() {
        events.push(event);
    }
    events
}

// =============================================================================
// Subscription Tests
// =============================================================================

#[test]
fn test_watch_matches_prefix_only() {
    let sim = setup_simulator();
    let stream = sim.watch("/w/", accept_all()).unwrap();

    sim.put("/w/a", b"1".to_vec()).unwrap();
    sim.put("/x/a", b"2".to_vec()).unwrap();
    sim.put("/w", b"3".to_vec()).unwrap();

    let keys: Vec<_> = drain(&stream).into_iter().map(|e| e.kv.key).collect();
    assert_eq!(keys, ["/w/a"]);
}

#[test]
fn test_watch_starts_at_subscription() {
    let sim = setup_simulator();
    sim.put("/w/before", Vec::new()).unwrap();

    let stream = sim.watch("/w/", accept_all()).unwrap();
    sim.put("/w/after", Vec::new()).unwrap();

    let keys: Vec<_> = drain(&stream).into_iter().map(|e| e.kv.key).collect();
    assert_eq!(keys, ["/w/after"]);
}

#[test]
fn test_put_and_delete_events_carry_previous_value() {
    let sim = setup_simulator();
    let stream = sim.watch("/w/", accept_all()).unwrap();

    sim.put("/w/a", b"1".to_vec()).unwrap();
    sim.put("/w/a", b"2".to_vec()).unwrap();
    sim.delete("/w/a").unwrap();

    let events = drain(&stream);
    assert_eq!(events.len(), 3);

    assert_eq!(events[0].kind, EventKind::Put);
    assert!(events[0].prev_kv.is_none());

    assert_eq!(events[1].kind, EventKind::Put);
    assert_eq!(events[1].prev_kv.as_ref().unwrap().value, b"1");
    assert_eq!(events[1].kv.value, b"2");

    assert_eq!(events[2].kind, EventKind::Delete);
    assert_eq!(events[2].prev_kv.as_ref().unwrap().value, b"2");
    assert_eq!(events[2].revision(), 3);
}

#[test]
fn test_filter_runs_at_dispatch_time() {
    let sim = setup_simulator();
    let puts_only = Arc::new(|event: &WatchEvent| event.is_put());
    let stream = sim.watch("/w/", puts_only).unwrap();

    sim.put("/w/a", Vec::new()).unwrap();
    sim.delete("/w/a").unwrap();
    sim.put("/w/b", Vec::new()).unwrap();

    let events = drain(&stream);
    assert_eq!(events.len(), 2);
    assert!(events.iter().all(WatchEvent::is_put));
}

#[test]
fn test_streams_see_revision_order() {
    let sim = setup_simulator();
    let first = sim.watch("/w/", accept_all()).unwrap();
    let second = sim.watch("/w/", accept_all()).unwrap();

    let writers: Vec<_> = (0..4)
        .map(|t| {
            let sim = sim.clone();
            thread::spawn(move || {
                for n in 0..25 {
                    sim.put(&format!("/w/{}/{}", t, n), Vec::new()).unwrap();
                }
            })
        })
        .collect();
    for writer in writers {
        writer.join().unwrap();
    }

    let first: Vec<u64> = drain(&first).iter().map(WatchEvent::revision).collect();
    let second: Vec<u64> = drain(&second).iter().map(WatchEvent::revision).collect();

    assert_eq!(first.len(), 100);
    assert!(first.windows(2).all(|pair| pair[0] < pair[1]));
    assert_eq!(first, second);
}

// =============================================================================
// Teardown Tests
// =============================================================================

#[test]
fn test_drop_unsubscribes() {
    let sim = setup_simulator();
    let stream = sim.watch("/w/", accept_all()).unwrap();
    assert_eq!(sim.watch_count(), 1);

    drop(stream);
    assert_eq!(sim.watch_count(), 0);

    // Nothing is delivered or buffered after teardown
    sim.put("/w/a", Vec::new()).unwrap();
    assert_eq!(sim.watch_count(), 0);
}

#[test]
fn test_stream_closed_when_dispatcher_unsubscribes() {
    let dispatcher = WatchDispatcher::new();
    let stream = dispatcher.subscribe("/w/", accept_all());

    assert!(dispatcher.unsubscribe(stream.id()));
    assert!(matches!(stream.recv(), Err(Error::WatchClosed)));
    assert!(matches!(stream.try_recv(), Err(Error::WatchClosed)));
}

#[test]
fn test_recv_timeout_returns_none_when_idle() {
    let sim = setup_simulator();
    let stream = sim.watch("/w/", accept_all()).unwrap();

    assert!(stream.recv_timeout(Duration::from_millis(10)).unwrap().is_none());
    assert!(stream.is_empty());
}

#[test]
fn test_blocking_recv_wakes_on_put() {
    let sim = setup_simulator();
    let stream = sim.watch("/w/", accept_all()).unwrap();

    let writer = {
        let sim = sim.clone();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            sim.put("/w/late", Vec::new()).unwrap();
        })
    };

    let event = stream.recv().unwrap();
    assert_eq!(event.key(), "/w/late");
    writer.join().unwrap();
}
