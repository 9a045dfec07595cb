use agent_error::ErrorExt;
use agent_error::StatusCode;

use super::*;

fn sample() -> Vec<Task> {
    vec![
        Task {
            id: TaskId::from("task-1"),
            index: 1,
            subject: "Set up CI".to_string(),
            description: "Wire up the pipeline.\nAdd a lint stage.".to_string(),
            status: TaskStatus::Completed,
            owner: None,
            lease_heartbeat: None,
            blocked_by: Vec::new(),
            blocks: vec![TaskId::from("task-2")],
            metadata: Default::default(),
        },
        Task {
            id: TaskId::from("task-2"),
            index: 2,
            subject: "Ship the feature".to_string(),
            description: "Depends on CI.".to_string(),
            status: TaskStatus::InProgress,
            owner: Some("worker-A".to_string()),
            lease_heartbeat: None,
            blocked_by: vec![TaskId::from("task-1")],
            blocks: Vec::new(),
            metadata: Default::default(),
        },
    ]
}

#[test]
fn round_trips_every_exported_field() {
    let original = sample();
    let text = to_markdown(&original);
    let parsed = from_markdown(&text).unwrap();

    assert_eq!(parsed.len(), original.len());
    for (a, b) in original.iter().zip(parsed.iter()) {
        assert_eq!(a.id, b.id);
        assert_eq!(a.subject, b.subject);
        assert_eq!(a.description, b.description);
        assert_eq!(a.status, b.status);
        assert_eq!(a.owner, b.owner);
        assert_eq!(a.blocked_by, b.blocked_by);
        assert_eq!(a.blocks, b.blocks);
    }
}

#[test]
fn status_markers_match_the_spec_checkbox_convention() {
    let text = to_markdown(&sample());
    assert!(text.contains("## [x] task-1: Set up CI"));
    assert!(text.contains("## [~] task-2: Ship the feature"));
}

#[test]
fn none_owner_round_trips_as_none() {
    let text = to_markdown(&sample());
    let parsed = from_markdown(&text).unwrap();
    assert_eq!(parsed[0].owner, None);
}

#[test]
fn deleted_status_round_trips_with_its_own_marker() {
    let task = Task {
        id: TaskId::from("task-3"),
        index: 3,
        subject: "Abandoned idea".to_string(),
        description: "Not pursuing this.".to_string(),
        status: TaskStatus::Deleted,
        owner: None,
        lease_heartbeat: None,
        blocked_by: Vec::new(),
        blocks: Vec::new(),
        metadata: Default::default(),
    };
    let text = to_markdown(std::slice::from_ref(&task));
    assert!(text.contains("## [d] task-3: Abandoned idea"));

    let parsed = from_markdown(&text).unwrap();
    assert_eq!(parsed[0].status, TaskStatus::Deleted);
}

#[test]
fn malformed_heading_is_rejected() {
    let err = from_markdown("## [x missing-bracket-and-colon\n").unwrap_err();
    assert_eq!(err.status_code(), StatusCode::ParseError);
}

#[test]
fn empty_document_parses_to_no_tasks() {
    assert!(from_markdown("").unwrap().is_empty());
}
