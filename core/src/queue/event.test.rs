use std::sync::Arc;
use std::sync::Mutex;

use super::*;
use crate::protocol::AgentEvent;
use crate::protocol::EventId;

fn envelope(submission_id: Option<&str>, event: AgentEvent) -> EventEnvelope {
    EventEnvelope {
        event_id: EventId::from("evt-1"),
        submission_id: submission_id.map(SubmissionId::from),
        timestamp: chrono::Utc::now(),
        event,
    }
}

fn message(text: &str) -> AgentEvent {
    AgentEvent::AgentMessage {
        content: text.to_string(),
        done: false,
    }
}

#[test]
fn every_listener_receives_every_emit_in_order() {
    let bus = EventQueue::new();
    let received = Arc::new(Mutex::new(Vec::new()));
    let r = Arc::clone(&received);
    bus.subscribe(move |env| {
        if let AgentEvent::AgentMessage { content, .. } = &env.event {
            r.lock().unwrap().push(content.clone());
        }
    });

    bus.emit(envelope(None, message("one")));
    bus.emit(envelope(None, message("two")));

    assert_eq!(*received.lock().unwrap(), vec!["one", "two"]);
}

#[test]
fn unsubscribe_stops_delivery() {
    let bus = EventQueue::new();
    let count = Arc::new(Mutex::new(0));
    let c = Arc::clone(&count);
    let sub = bus.subscribe(move |_| *c.lock().unwrap() += 1);

    bus.emit(envelope(None, message("one")));
    sub.unsubscribe();
    bus.emit(envelope(None, message("two")));

    assert_eq!(*count.lock().unwrap(), 1);
}

#[test]
fn panicking_listener_does_not_stop_other_listeners_or_emit() {
    let bus = EventQueue::new();
    bus.subscribe(|_| panic!("boom"));

    let count = Arc::new(Mutex::new(0));
    let c = Arc::clone(&count);
    bus.subscribe(move |_| *c.lock().unwrap() += 1);

    bus.emit(envelope(None, message("one")));

    assert_eq!(*count.lock().unwrap(), 1);
    assert_eq!(bus.get_recent(10).len(), 1);
}

#[test]
fn subscribe_typed_filters_by_kind() {
    let bus = EventQueue::new();
    let count = Arc::new(Mutex::new(0));
    let c = Arc::clone(&count);
    bus.subscribe_typed(EventKind::BudgetWarning, move |_| *c.lock().unwrap() += 1);

    bus.emit(envelope(None, message("ignored")));
    bus.emit(envelope(
        None,
        AgentEvent::BudgetWarning {
            message: "soft cap".into(),
        },
    ));

    assert_eq!(*count.lock().unwrap(), 1);
}

#[test]
fn subscribe_correlated_filters_by_submission_id() {
    let bus = EventQueue::new();
    let count = Arc::new(Mutex::new(0));
    let c = Arc::clone(&count);
    bus.subscribe_correlated(SubmissionId::from("sub-1"), move |_| {
        *c.lock().unwrap() += 1
    });

    bus.emit(envelope(Some("sub-1"), message("mine")));
    bus.emit(envelope(Some("sub-2"), message("not mine")));

    assert_eq!(*count.lock().unwrap(), 1);
}

#[test]
fn get_recent_caps_at_retention() {
    let bus = EventQueue::with_retention(3);
    for i in 0..10 {
        bus.emit(envelope(None, message(&i.to_string())));
    }
    let recent = bus.get_recent(100);
    assert_eq!(recent.len(), 3);
    let AgentEvent::AgentMessage { content, .. } = &recent[0].event else {
        panic!("wrong variant");
    };
    assert_eq!(content, "7");
}

#[test]
fn get_recent_n_smaller_than_ring() {
    let bus = EventQueue::new();
    bus.emit(envelope(None, message("a")));
    bus.emit(envelope(None, message("b")));
    bus.emit(envelope(None, message("c")));
    assert_eq!(bus.get_recent(2).len(), 2);
}
