use serde_json::json;

use super::*;

fn call(tool: &str, args: Value) -> ToolCall {
    ToolCall::new(tool, args)
}

fn tools_in(batches: &[Vec<ToolCall>]) -> Vec<Vec<String>> {
    batches
        .iter()
        .map(|b| b.iter().map(|c| c.tool.clone()).collect())
        .collect()
}

#[test]
fn parallel_reads_batch_into_one() {
    let calls = vec![
        call("read_file", json!({"path": "/a"})),
        call("read_file", json!({"path": "/b"})),
        call("read_file", json!({"path": "/c"})),
    ];
    let batches = schedule(calls);
    assert_eq!(batches.len(), 1);
    assert_eq!(batches[0].len(), 3);
}

#[test]
fn writes_to_different_files_go_parallel_then_bash_is_sequential() {
    let calls = vec![
        call("write_file", json!({"path": "/a", "content": "x"})),
        call("edit_file", json!({"path": "/b"})),
        call("bash", json!({"command": "npm test"})),
    ];
    let batches = schedule(calls);
    assert_eq!(
        tools_in(&batches),
        vec![vec!["write_file".to_string(), "edit_file".to_string()], vec!["bash".to_string()]]
    );
}

#[test]
fn same_file_writes_serialize() {
    let calls = vec![
        call("write_file", json!({"path": "/a", "content": "1"})),
        call("write_file", json!({"path": "/a", "content": "2"})),
    ];
    let batches = schedule(calls);
    assert_eq!(batches.len(), 2);
    assert_eq!(batches[0].len(), 1);
    assert_eq!(batches[1].len(), 1);
}

#[test]
fn concat_of_batches_reproduces_input_order() {
    let calls = vec![
        call("read_file", json!({"path": "/a"})),
        call("write_file", json!({"path": "/a", "content": "x"})),
        call("bash", json!({"command": "ls"})),
        call("read_file", json!({"path": "/b"})),
        call("write_file", json!({"path": "/b", "content": "y"})),
        call("write_file", json!({"path": "/b", "content": "z"})),
    ];
    let original_tools: Vec<String> = calls.iter().map(|c| c.tool.clone()).collect();
    let batches = schedule(calls);
    let flattened: Vec<String> = batches.iter().flatten().map(|c| c.tool.clone()).collect();
    assert_eq!(flattened, original_tools);
}

#[test]
fn sequential_call_is_always_alone_in_its_batch() {
    let calls = vec![
        call("read_file", json!({"path": "/a"})),
        call("grep", json!({"pattern": "x"})),
        call("task_manager", json!({"op": "create"})),
        call("read_file", json!({"path": "/b"})),
    ];
    let batches = schedule(calls);
    assert_eq!(batches.len(), 3);
    assert_eq!(batches[1].len(), 1);
    assert_eq!(batches[1][0].tool, "task_manager");
}

#[test]
fn write_with_unresolvable_path_is_treated_as_sequential() {
    let calls = vec![
        call("read_file", json!({"path": "/a"})),
        call("write_file", json!({"content": "no path here"})),
        call("read_file", json!({"path": "/b"})),
    ];
    let batches = schedule(calls);
    assert_eq!(batches.len(), 3);
    assert_eq!(batches[1].len(), 1);
    assert_eq!(batches[1][0].tool, "write_file");
}

#[test]
fn nested_input_path_is_recognized_for_conflict_detection() {
    let calls = vec![
        call("edit_file", json!({"input": {"path": "/a"}})),
        call("edit_file", json!({"input": {"path": "/a"}})),
    ];
    let batches = schedule(calls);
    assert_eq!(batches.len(), 2);
}

#[test]
fn reads_and_non_conflicting_writes_coexist_in_one_batch() {
    let calls = vec![
        call("read_file", json!({"path": "/a"})),
        call("write_file", json!({"path": "/b", "content": "x"})),
        call("edit_file", json!({"path": "/c"})),
    ];
    let batches = schedule(calls);
    assert_eq!(batches.len(), 1);
    assert_eq!(batches[0].len(), 3);
}

#[test]
fn empty_input_produces_no_batches() {
    assert!(schedule(Vec::new()).is_empty());
}
