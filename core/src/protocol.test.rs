use super::*;
use crate::ids::AtomicCounter;

#[test]
fn ids_format_with_prefix() {
    let counter = AtomicCounter::new();
    let id = TaskId::from_counter(&counter);
    assert_eq!(id.0, "task-0");
    assert_eq!(id.to_string(), "task-0");
}

#[test]
fn operation_serde_roundtrip() {
    let op = Operation::UserTurn {
        content: "hello".into(),
    };
    let json = serde_json::to_string(&op).unwrap();
    let back: Operation = serde_json::from_str(&json).unwrap();
    match back {
        Operation::UserTurn { content } => assert_eq!(content, "hello"),
        _ => panic!("wrong variant"),
    }
}

#[test]
fn event_kind_matches_variant() {
    let event = AgentEvent::ToolStarted {
        call_id: "c1".into(),
        name: "read_file".into(),
    };
    assert_eq!(event.kind(), EventKind::ToolStarted);
}

#[test]
fn event_envelope_roundtrip() {
    let env = EventEnvelope {
        event_id: EventId::from("evt-1"),
        submission_id: Some(SubmissionId::from("sub-1")),
        timestamp: chrono::Utc::now(),
        event: AgentEvent::AgentMessage {
            content: "done".into(),
            done: true,
        },
    };
    let json = serde_json::to_string(&env).unwrap();
    let back: EventEnvelope = serde_json::from_str(&json).unwrap();
    assert_eq!(back.event_id, env.event_id);
    assert_eq!(back.submission_id, env.submission_id);
}
