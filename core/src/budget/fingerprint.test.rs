use std::collections::VecDeque;

use super::*;

#[test]
fn unparseable_args_fall_back_to_raw() {
    let fp = fingerprint("bash", "not json{{{");
    assert_eq!(fp, "bash:not json{{{");
}

#[test]
fn read_file_keys_on_path_and_offset() {
    let fp1 = fingerprint("read_file", r#"{"file_path":"/foo","offset":0,"limit":100}"#);
    let fp2 = fingerprint("read_file", r#"{"limit":999,"offset":0,"file_path":"/foo"}"#);
    assert_eq!(fp1, fp2, "key order and unrelated keys must not affect the fingerprint");
}

#[test]
fn read_file_different_offsets_differ() {
    let fp1 = fingerprint("read_file", r#"{"file_path":"/big","offset":0}"#);
    let fp2 = fingerprint("read_file", r#"{"file_path":"/big","offset":100}"#);
    assert_ne!(fp1, fp2);
}

#[test]
fn path_alias_resolves_same_as_file_path() {
    let fp1 = fingerprint("write_file", r#"{"file_path":"/a","content":"x"}"#);
    let fp2 = fingerprint("write_file", r#"{"path":"/a","content":"y"}"#);
    assert_eq!(fp1, fp2, "content differs but is not a primary arg");
}

#[test]
fn bash_keys_on_command_only() {
    let fp1 = fingerprint("bash", r#"{"command":"npm test","cwd":"/a"}"#);
    let fp2 = fingerprint("bash", r#"{"command":"npm test","cwd":"/b"}"#);
    assert_eq!(fp1, fp2);
}

#[test]
fn unknown_tool_falls_back_to_generic_keys() {
    let fp1 = fingerprint("grep", r#"{"query":"TODO","flags":"-i"}"#);
    let fp2 = fingerprint("grep", r#"{"query":"TODO","flags":"-n"}"#);
    assert_eq!(fp1, fp2);
}

#[test]
fn generic_tool_with_multiple_alias_keys_picks_only_the_first_present() {
    let fp1 = fingerprint("search_code", r#"{"id":"same","name":"other-a"}"#);
    let fp2 = fingerprint("search_code", r#"{"id":"same","name":"other-b"}"#);
    assert_eq!(fp1, fp2, "only the first matching alias in the group should be canonicalized");
}

#[test]
fn no_primary_keys_falls_back_to_full_canonical_args() {
    let fp1 = fingerprint("weird_tool", r#"{"a":1,"b":2}"#);
    let fp2 = fingerprint("weird_tool", r#"{"b":2,"a":1}"#);
    assert_eq!(fp1, fp2);
    assert!(fp1.contains("\"a\":1"));
}

#[test]
fn stable_stringify_is_structural() {
    let a: serde_json::Value = serde_json::json!({"x": 1, "y": [1,2,3]});
    let b: serde_json::Value = serde_json::json!({"y": [1,2,3], "x": 1});
    assert_eq!(stable_stringify(&a), stable_stringify(&b));
}

fn ring_of(fps: &[&str]) -> VecDeque<String> {
    let mut ring = VecDeque::new();
    for fp in fps {
        push_ring(&mut ring, (*fp).to_string());
    }
    ring
}

#[test]
fn exact_loop_needs_three_identical_tail_entries() {
    let ring = ring_of(&["a", "read_file:x", "read_file:x", "read_file:x"]);
    assert_eq!(detect_local_doom_loop(&ring), Some(LocalDoomLoopKind::Exact));
}

#[test]
fn two_identical_calls_do_not_trigger_exact() {
    let ring = ring_of(&["read_file:x", "read_file:x"]);
    assert_eq!(detect_local_doom_loop(&ring), None);
}

#[test]
fn chunked_reads_at_different_offsets_are_not_a_loop() {
    let ring = ring_of(&[
        "read_file:{\"file_path\":\"/big\",\"offset\":0}",
        "read_file:{\"file_path\":\"/big\",\"offset\":100}",
        "read_file:{\"file_path\":\"/big\",\"offset\":200}",
    ]);
    assert_eq!(detect_local_doom_loop(&ring), None);
}

#[test]
fn a_different_call_resets_the_pattern() {
    let ring = ring_of(&[
        "read_file:x",
        "read_file:x",
        "write_file:y",
        "read_file:x",
    ]);
    assert_eq!(detect_local_doom_loop(&ring), None);
}

#[test]
fn fuzzy_loop_needs_four_matching_primary_components() {
    let ring = ring_of(&[
        "read_file:same",
        "grep:same",
        "read_file:same",
        "grep:same",
    ]);
    assert_eq!(detect_local_doom_loop(&ring), Some(LocalDoomLoopKind::Fuzzy));
}

#[test]
fn ring_evicts_oldest_past_capacity() {
    let mut ring = VecDeque::new();
    for i in 0..(RING_SIZE + 5) {
        push_ring(&mut ring, format!("tool:{i}"));
    }
    assert_eq!(ring.len(), RING_SIZE);
    assert_eq!(ring.front().unwrap(), &format!("tool:{}", 5));
}
