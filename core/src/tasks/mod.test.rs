use agent_error::ErrorExt;
use chrono::Duration as ChronoDuration;
use chrono::Utc;

use super::*;

#[test]
fn create_wires_blocked_by_and_blocks_bidirectionally() {
    let mgr = TaskManager::new();
    let first = mgr.create("Set up CI", "", Vec::new());
    let second = mgr.create("Ship feature", "", vec![first.clone()]);

    let first_task = mgr.get(&first).unwrap();
    assert_eq!(first_task.blocks, vec![second.clone()]);
    let second_task = mgr.get(&second).unwrap();
    assert_eq!(second_task.blocked_by, vec![first]);
}

#[test]
fn list_orders_in_progress_before_pending_before_completed() {
    let mgr = TaskManager::new();
    let a = mgr.create("a", "", Vec::new());
    let b = mgr.create("b", "", Vec::new());
    let c = mgr.create("c", "", Vec::new());
    mgr.claim(&b, "worker-1").unwrap();
    mgr.complete(&c).unwrap();

    let order: Vec<TaskId> = mgr.list().into_iter().map(|t| t.id).collect();
    assert_eq!(order, vec![b, a, c]);
}

#[test]
fn claim_sets_in_progress_owner_and_heartbeat() {
    let mgr = TaskManager::new();
    let id = mgr.create("a", "", Vec::new());
    mgr.claim(&id, "worker-A").unwrap();
    let task = mgr.get(&id).unwrap();
    assert_eq!(task.status, TaskStatus::InProgress);
    assert_eq!(task.owner.as_deref(), Some("worker-A"));
    assert!(task.lease_heartbeat.is_some());
}

#[test]
fn heartbeat_requires_matching_owner() {
    let mgr = TaskManager::new();
    let id = mgr.create("a", "", Vec::new());
    mgr.claim(&id, "worker-A").unwrap();
    let err = mgr.heartbeat(&id, "worker-B").unwrap_err();
    assert_eq!(err.status_code(), agent_error::StatusCode::InvariantViolation);
    assert!(mgr.heartbeat(&id, "worker-A").is_ok());
}

#[test]
fn complete_clears_owner_and_heartbeat() {
    let mgr = TaskManager::new();
    let id = mgr.create("a", "", Vec::new());
    mgr.claim(&id, "worker-A").unwrap();
    mgr.complete(&id).unwrap();
    let task = mgr.get(&id).unwrap();
    assert_eq!(task.status, TaskStatus::Completed);
    assert_eq!(task.owner, None);
    assert_eq!(task.lease_heartbeat, None);
}

#[test]
fn delete_soft_deletes_and_keeps_edges_but_unblocks_dependents() {
    let mgr = TaskManager::new();
    let first = mgr.create("a", "", Vec::new());
    let second = mgr.create("b", "", vec![first.clone()]);
    mgr.delete(&first).unwrap();

    let first_task = mgr.get(&first).unwrap();
    assert_eq!(first_task.status, TaskStatus::Deleted);
    assert_eq!(first_task.owner, None);

    let second_task = mgr.get(&second).unwrap();
    assert_eq!(second_task.blocked_by, vec![first.clone()], "the edge itself is preserved");

    let tasks_map: std::collections::HashMap<TaskId, Task> =
        mgr.list().into_iter().map(|t| (t.id.clone(), t)).collect();
    assert!(second_task.is_available(&tasks_map), "a deleted blocker no longer blocks");
}

#[test]
fn add_dependency_wires_both_sides_and_is_idempotent() {
    let mgr = TaskManager::new();
    let first = mgr.create("a", "", Vec::new());
    let second = mgr.create("b", "", Vec::new());

    mgr.add_dependency(&second, &first).unwrap();
    mgr.add_dependency(&second, &first).unwrap();

    let first_task = mgr.get(&first).unwrap();
    assert_eq!(first_task.blocks, vec![second.clone()]);
    let second_task = mgr.get(&second).unwrap();
    assert_eq!(second_task.blocked_by, vec![first]);
}

#[test]
fn remove_dependency_unwires_both_sides() {
    let mgr = TaskManager::new();
    let first = mgr.create("a", "", Vec::new());
    let second = mgr.create("b", "", vec![first.clone()]);

    mgr.remove_dependency(&second, &first).unwrap();

    let first_task = mgr.get(&first).unwrap();
    assert!(first_task.blocks.is_empty());
    let second_task = mgr.get(&second).unwrap();
    assert!(second_task.blocked_by.is_empty());
}

#[test]
fn add_dependency_requires_both_tasks_to_exist() {
    let mgr = TaskManager::new();
    let first = mgr.create("a", "", Vec::new());
    let missing = TaskId::from("task-404");
    let err = mgr.add_dependency(&first, &missing).unwrap_err();
    assert_eq!(err.status_code(), agent_error::StatusCode::InvalidArguments);
}

#[test]
fn task_is_available_only_once_dependencies_complete() {
    let mgr = TaskManager::new();
    let first = mgr.create("a", "", Vec::new());
    let second = mgr.create("b", "", vec![first.clone()]);

    let tasks_map: std::collections::HashMap<TaskId, Task> =
        mgr.list().into_iter().map(|t| (t.id.clone(), t)).collect();
    let second_task = mgr.get(&second).unwrap();
    assert!(!second_task.is_available(&tasks_map));

    mgr.complete(&first).unwrap();
    let tasks_map: std::collections::HashMap<TaskId, Task> =
        mgr.list().into_iter().map(|t| (t.id.clone(), t)).collect();
    let second_task = mgr.get(&second).unwrap();
    assert!(second_task.is_available(&tasks_map));
}

#[test]
fn reconcile_stale_in_progress_reclaims_and_records_reason() {
    let mgr = TaskManager::new();
    let id = mgr.create("a", "", Vec::new());
    mgr.claim(&id, "worker-A").unwrap();

    {
        let mut state = mgr.lock();
        let task = state.tasks.get_mut(&id).unwrap();
        task.lease_heartbeat = Some(Utc::now() - ChronoDuration::minutes(6));
    }

    let recovered = mgr.reconcile_stale_in_progress(300_000, &[]);
    assert_eq!(recovered, vec![id.clone()]);

    let task = mgr.get(&id).unwrap();
    assert_eq!(task.status, TaskStatus::Pending);
    assert_eq!(task.owner, None);
    assert!(task.metadata.contains_key("recoveryReason"));
}

#[test]
fn reconcile_ignores_active_owners_even_past_stale_threshold() {
    let mgr = TaskManager::new();
    let id = mgr.create("a", "", Vec::new());
    mgr.claim(&id, "worker-A").unwrap();
    {
        let mut state = mgr.lock();
        let task = state.tasks.get_mut(&id).unwrap();
        task.lease_heartbeat = Some(Utc::now() - ChronoDuration::minutes(6));
    }

    let recovered = mgr.reconcile_stale_in_progress(300_000, &["worker-A".to_string()]);
    assert!(recovered.is_empty());
    assert_eq!(mgr.get(&id).unwrap().status, TaskStatus::InProgress);
}

#[test]
fn from_markdown_resets_id_allocator_past_the_max_imported_index() {
    let mgr = TaskManager::new();
    mgr.from_markdown("## [ ] task-7: Old task\n**Status:** pending\n**Owner:** none\n**Blocked by:** none\n**Blocks:** none\n**Description:**\nhi\n\n").unwrap();
    let new_id = mgr.create("fresh", "", Vec::new());
    assert_eq!(new_id.to_string(), "task-8");
}
