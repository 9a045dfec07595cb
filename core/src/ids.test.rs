use super::*;
use std::sync::Arc;
use std::thread;

#[test]
fn sequential_calls_increase() {
    let counter = AtomicCounter::new();
    assert_eq!(counter.next(), 0);
    assert_eq!(counter.next(), 1);
    assert_eq!(counter.next(), 2);
}

#[test]
fn formats_prefixed_id() {
    let counter = AtomicCounter::new();
    assert_eq!(counter.next_id("task"), "task-0");
    assert_eq!(counter.next_id("task"), "task-1");
}

#[test]
fn concurrent_callers_never_collide() {
    let counter = Arc::new(AtomicCounter::new());
    let mut handles = Vec::new();
    for _ in 0..8 {
        let counter = Arc::clone(&counter);
        handles.push(thread::spawn(move || {
            (0..1000).map(|_| counter.next()).collect::<Vec<_>>()
        }));
    }
    let mut all: Vec<u64> = handles.into_iter().flat_map(|h| h.join().unwrap()).collect();
    all.sort_unstable();
    all.dedup();
    assert_eq!(all.len(), 8 * 1000);
}
