use std::sync::Arc;

use agent_error::ErrorExt;
use agent_error::StatusCode;

use super::*;
use crate::llm::Role;

#[test]
fn fork_copies_messages_up_to_the_fork_point_and_becomes_active() {
    let mgr = ThreadManager::new();
    let main = mgr.create_thread();
    mgr.add_message(Role::User, "hi").unwrap();
    let fork_point = mgr.add_message(Role::Assistant, "hello").unwrap();
    mgr.add_message(Role::User, "after the fork point").unwrap();

    let branch = mgr.fork(Some(fork_point.clone())).unwrap();
    assert_eq!(mgr.active_thread_id(), Some(branch.clone()));

    let branch_thread = mgr.get(&branch).unwrap();
    assert_eq!(branch_thread.parent_id, Some(main));
    assert_eq!(branch_thread.fork_point_id, Some(fork_point));
    assert_eq!(branch_thread.messages.len(), 2);
}

#[test]
fn fork_without_explicit_point_uses_the_last_message() {
    let mgr = ThreadManager::new();
    mgr.create_thread();
    mgr.add_message(Role::User, "only message").unwrap();
    let branch = mgr.fork(None).unwrap();
    let branch_thread = mgr.get(&branch).unwrap();
    assert_eq!(branch_thread.messages.len(), 1);
}

#[test]
fn fork_with_no_messages_has_no_fork_point_and_fails() {
    let mgr = ThreadManager::new();
    mgr.create_thread();
    let err = mgr.fork(None).unwrap_err();
    assert_eq!(err.status_code(), StatusCode::InvariantViolation);
}

#[test]
fn append_merge_concatenates_branch_tail_onto_main() {
    let mgr = ThreadManager::new();
    let main = mgr.create_thread();
    mgr.add_message(Role::User, "shared").unwrap();
    let fork_point = mgr.add_message(Role::Assistant, "shared reply").unwrap();

    let branch = mgr.fork(Some(fork_point)).unwrap();
    mgr.add_message(Role::User, "branch-only message").unwrap();

    mgr.merge(&branch, Some(&main), MergeStrategy::Append, false).unwrap();

    let main_thread = mgr.get(&main).unwrap();
    assert_eq!(main_thread.messages.last().unwrap().content, "branch-only message");
    assert_eq!(mgr.active_thread_id(), Some(main.clone()));
    assert_eq!(mgr.get(&branch).unwrap().status, ThreadStatus::Merged);
}

#[test]
fn keep_source_preserves_branch_as_active_candidate() {
    let mgr = ThreadManager::new();
    let main = mgr.create_thread();
    mgr.add_message(Role::User, "hi").unwrap();
    let fork_point = mgr.add_message(Role::Assistant, "hello").unwrap();
    let branch = mgr.fork(Some(fork_point)).unwrap();
    mgr.add_message(Role::User, "branch-only").unwrap();

    mgr.merge(&branch, Some(&main), MergeStrategy::Append, true).unwrap();
    assert_eq!(mgr.get(&branch).unwrap().status, ThreadStatus::Active);
}

#[test]
fn replace_merge_discards_mains_post_divergence_messages() {
    let mgr = ThreadManager::new();
    let main = mgr.create_thread();
    let fork_point = mgr.add_message(Role::User, "shared").unwrap();
    let branch = mgr.fork(Some(fork_point)).unwrap();
    mgr.add_message(Role::User, "branch message").unwrap();
    mgr.switch_thread(&main).unwrap();
    mgr.add_message(Role::User, "main-only, to be discarded").unwrap();

    mgr.merge(&branch, Some(&main), MergeStrategy::Replace, false).unwrap();
    let main_thread = mgr.get(&main).unwrap();
    assert!(!main_thread.messages.iter().any(|m| m.content.contains("discarded")));
    assert!(main_thread.messages.iter().any(|m| m.content == "branch message"));
}

#[test]
fn summarize_merge_synthesizes_one_assistant_message() {
    let mgr = ThreadManager::new();
    let main = mgr.create_thread();
    let fork_point = mgr.add_message(Role::User, "shared").unwrap();
    let branch = mgr.fork(Some(fork_point)).unwrap();
    mgr.add_message(Role::User, "detail one").unwrap();
    mgr.add_message(Role::User, "detail two").unwrap();

    mgr.merge(&branch, Some(&main), MergeStrategy::Summarize, false).unwrap();
    let main_thread = mgr.get(&main).unwrap();
    let last = main_thread.messages.last().unwrap();
    assert_eq!(last.role, Role::Assistant);
    assert!(last.content.contains("detail one"));
    assert!(last.content.contains("detail two"));
}

#[test]
fn custom_merge_delegates_to_the_resolver() {
    let mgr = ThreadManager::new();
    let main = mgr.create_thread();
    let fork_point = mgr.add_message(Role::User, "shared").unwrap();
    let branch = mgr.fork(Some(fork_point)).unwrap();
    mgr.add_message(Role::User, "branch detail").unwrap();

    let resolver = Arc::new(|_main_tail: &[Message], branch_tail: &[Message]| {
        vec![branch_tail[0].clone()]
    });
    mgr.merge(&branch, Some(&main), MergeStrategy::Custom(resolver), false).unwrap();
    let main_thread = mgr.get(&main).unwrap();
    assert_eq!(main_thread.messages.last().unwrap().content, "branch detail");
}

#[test]
fn rollback_to_message_truncates_inclusive() {
    let mgr = ThreadManager::new();
    mgr.create_thread();
    let first = mgr.add_message(Role::User, "one").unwrap();
    mgr.add_message(Role::User, "two").unwrap();
    mgr.add_message(Role::User, "three").unwrap();

    mgr.rollback_to_message(&first).unwrap();
    let active = mgr.get(&mgr.active_thread_id().unwrap()).unwrap();
    assert_eq!(active.messages.len(), 1);
}

#[test]
fn rollback_by_n_drops_the_last_n_messages() {
    let mgr = ThreadManager::new();
    mgr.create_thread();
    mgr.add_message(Role::User, "one").unwrap();
    mgr.add_message(Role::User, "two").unwrap();
    mgr.add_message(Role::User, "three").unwrap();

    mgr.rollback_by(2).unwrap();
    let active = mgr.get(&mgr.active_thread_id().unwrap()).unwrap();
    assert_eq!(active.messages.len(), 1);
    assert_eq!(active.messages[0].content, "one");
}

#[test]
fn rollback_to_fork_point_fails_without_one() {
    let mgr = ThreadManager::new();
    mgr.create_thread();
    mgr.add_message(Role::User, "one").unwrap();
    let err = mgr.rollback_to_fork_point().unwrap_err();
    assert_eq!(err.status_code(), StatusCode::InvariantViolation);
}

#[test]
fn export_import_round_trips_active_thread_and_timestamps() {
    let mgr = ThreadManager::new();
    let main = mgr.create_thread();
    mgr.add_message(Role::User, "hello").unwrap();
    let exported = mgr.export();

    let imported = ThreadManager::new();
    imported.import(exported);

    assert_eq!(imported.active_thread_id(), Some(main.clone()));
    let original = mgr.get(&main).unwrap();
    let round_tripped = imported.get(&main).unwrap();
    assert_eq!(original.messages[0].timestamp, round_tripped.messages[0].timestamp);
}

#[test]
fn export_import_json_round_trip_via_serde() {
    let mgr = ThreadManager::new();
    mgr.create_thread();
    mgr.add_message(Role::User, "hello").unwrap();
    let exported = mgr.export();

    let json = serde_json::to_string(&exported).unwrap();
    let parsed: ThreadsExport = serde_json::from_str(&json).unwrap();

    assert_eq!(parsed.active_thread_id, exported.active_thread_id);
    assert_eq!(parsed.threads.len(), exported.threads.len());
}

#[test]
fn delete_thread_clears_active_if_it_was_active() {
    let mgr = ThreadManager::new();
    let main = mgr.create_thread();
    mgr.delete_thread(&main).unwrap();
    assert_eq!(mgr.active_thread_id(), None);
}

#[test]
fn switch_thread_rejects_a_merged_thread() {
    let mgr = ThreadManager::new();
    let main = mgr.create_thread();
    let fork_point = mgr.add_message(Role::User, "shared").unwrap();
    let branch = mgr.fork(Some(fork_point)).unwrap();
    mgr.add_message(Role::User, "branch-only").unwrap();
    mgr.merge(&branch, Some(&main), MergeStrategy::Append, false).unwrap();

    let err = mgr.switch_thread(&branch).unwrap_err();
    assert_eq!(err.status_code(), StatusCode::InvariantViolation);
    assert_eq!(mgr.active_thread_id(), Some(main));
}

#[test]
fn abandon_clears_active_and_blocks_switching_back() {
    let mgr = ThreadManager::new();
    let main = mgr.create_thread();
    mgr.abandon(&main).unwrap();
    assert_eq!(mgr.active_thread_id(), None);
    assert_eq!(mgr.get(&main).unwrap().status, ThreadStatus::Abandoned);

    let err = mgr.switch_thread(&main).unwrap_err();
    assert_eq!(err.status_code(), StatusCode::InvariantViolation);
}

#[test]
fn archive_clears_active_and_blocks_switching_back() {
    let mgr = ThreadManager::new();
    let main = mgr.create_thread();
    mgr.archive(&main).unwrap();
    assert_eq!(mgr.active_thread_id(), None);
    assert_eq!(mgr.get(&main).unwrap().status, ThreadStatus::Archived);

    let err = mgr.switch_thread(&main).unwrap_err();
    assert_eq!(err.status_code(), StatusCode::InvariantViolation);
}

#[test]
fn archiving_an_inactive_thread_does_not_disturb_the_active_one() {
    let mgr = ThreadManager::new();
    let main = mgr.create_thread();
    mgr.add_message(Role::User, "hi").unwrap();
    let fork_point = mgr.add_message(Role::Assistant, "hello").unwrap();
    let branch = mgr.fork(Some(fork_point)).unwrap();
    mgr.switch_thread(&main).unwrap();

    mgr.archive(&branch).unwrap();
    assert_eq!(mgr.active_thread_id(), Some(main));
}
