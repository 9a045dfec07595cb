use std::sync::Arc;
use std::sync::Mutex;

use super::*;

fn agent(n: u64) -> AgentId {
    AgentId(format!("agent-{n}"))
}

#[test]
fn post_and_query_round_trips_a_finding() {
    let board = Blackboard::new();
    board.post(agent(1), "file:/a.rs", "found a bug", FindingType::Discovery, 0.8, None);
    let results = board.query(None, None);
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].content, "found a bug");
}

#[test]
fn query_filters_by_topic_pattern_and_type() {
    let board = Blackboard::new();
    board.post(agent(1), "file:/a.rs", "a", FindingType::Discovery, 0.8, None);
    board.post(agent(1), "file:/b.rs", "b", FindingType::Blocker, 0.5, None);
    board.post(agent(1), "task:1", "c", FindingType::Progress, 1.0, None);

    let file_findings = board.query(Some("file:*"), None);
    assert_eq!(file_findings.len(), 2);

    let discoveries = board.query(None, Some(FindingType::Discovery));
    assert_eq!(discoveries.len(), 1);
    assert_eq!(discoveries[0].content, "a");
}

#[test]
fn recent_context_returns_only_discovery_and_analysis_newest_first() {
    let board = Blackboard::new();
    board.post(agent(1), "t", "progress note", FindingType::Progress, 1.0, None);
    board.post(agent(1), "t", "first discovery", FindingType::Discovery, 0.8, None);
    board.post(agent(1), "t", "an analysis", FindingType::Analysis, 0.9, None);
    board.post(agent(1), "t", "second discovery", FindingType::Discovery, 0.8, None);

    let context = board.recent_context(5);
    assert_eq!(context.len(), 3);
    assert_eq!(context[0].content, "second discovery");
}

#[test]
fn recent_context_respects_the_limit() {
    let board = Blackboard::new();
    for i in 0..10 {
        board.post(agent(1), "t", format!("discovery {i}"), FindingType::Discovery, 0.8, None);
    }
    assert_eq!(board.recent_context(5).len(), 5);
}

#[test]
fn subscribe_notifies_only_matching_topics() {
    let board = Blackboard::new();
    let received: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let received_task = Arc::clone(&received);
    let _sub = board.subscribe("file:*", move |finding| {
        received_task.lock().unwrap().push(finding.content.clone());
    });

    board.post(agent(1), "file:/a.rs", "matched", FindingType::Discovery, 0.8, None);
    board.post(agent(1), "task:1", "not matched", FindingType::Progress, 1.0, None);

    assert_eq!(*received.lock().unwrap(), vec!["matched".to_string()]);
}

#[test]
fn unsubscribe_stops_delivery() {
    let board = Blackboard::new();
    let count = Arc::new(Mutex::new(0));
    let count_task = Arc::clone(&count);
    let sub = board.subscribe("*", move |_finding| {
        *count_task.lock().unwrap() += 1;
    });
    board.post(agent(1), "x", "one", FindingType::Discovery, 0.8, None);
    board.unsubscribe(sub);
    board.post(agent(1), "x", "two", FindingType::Discovery, 0.8, None);

    assert_eq!(*count.lock().unwrap(), 1);
}

#[test]
fn a_panicking_listener_does_not_prevent_other_listeners_or_posting() {
    let board = Blackboard::new();
    let _panicker = board.subscribe("*", |_finding| panic!("boom"));
    let received = Arc::new(Mutex::new(false));
    let received_task = Arc::clone(&received);
    let _sub = board.subscribe("*", move |_finding| {
        *received_task.lock().unwrap() = true;
    });

    board.post(agent(1), "x", "survives", FindingType::Discovery, 0.8, None);
    assert!(*received.lock().unwrap());
    assert_eq!(board.query(None, None).len(), 1);
}

#[test]
fn claim_is_writer_exclusive() {
    let board = Blackboard::new();
    assert!(board.claim("/shared.rs", agent(1)));
    assert!(!board.claim("/shared.rs", agent(2)));
    assert_eq!(board.is_claimed("/shared.rs"), Some(agent(1)));
}

#[test]
fn release_requires_matching_holder() {
    let board = Blackboard::new();
    board.claim("/shared.rs", agent(1));
    assert!(!board.release("/shared.rs", &agent(2)));
    assert!(board.release("/shared.rs", &agent(1)));
    assert_eq!(board.is_claimed("/shared.rs"), None);
}

#[test]
fn releasing_frees_the_resource_for_another_claimant() {
    let board = Blackboard::new();
    board.claim("/shared.rs", agent(1));
    board.release("/shared.rs", &agent(1));
    assert!(board.claim("/shared.rs", agent(2)));
}
