//! Tool-call fingerprint canonicalization and doom-loop ring detection
//! (spec §4.5e).

use std::collections::VecDeque;

use serde_json::Map;
use serde_json::Value;

/// Size of the fingerprint ring used for doom-loop detection.
pub const RING_SIZE: usize = 10;

/// The outcome of scanning the fingerprint ring for a repeating pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalDoomLoopKind {
    /// The last 3 fingerprints are identical.
    Exact,
    /// The last 4 fingerprints share their primary-args component.
    Fuzzy,
}

/// Returns a canonical, key-sorted JSON string for `value`: two
/// structurally-equal values always produce the same string (spec R3).
pub fn stable_stringify(value: &Value) -> String {
    serde_json::to_string(&sort_value(value)).expect("Value serialization cannot fail")
}

fn sort_value(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut sorted = Map::new();
            for key in keys {
                sorted.insert(key.clone(), sort_value(&map[key]));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(sort_value).collect()),
        other => other.clone(),
    }
}

/// Returns the alias groups that make up the "primary" arguments for
/// `tool`: the subset of arguments that define what the call targets.
fn primary_key_groups(tool: &str) -> Vec<Vec<&'static str>> {
    match tool {
        "read_file" => vec![vec!["file_path", "path"], vec!["offset"]],
        "write_file" | "edit_file" => vec![vec!["file_path", "path"]],
        "bash" => vec![vec!["command"]],
        _ => vec![vec!["path", "file_path", "id", "name", "query"]],
    }
}

/// Extracts the primary-args subset of `args` for `tool`. Returns `None`
/// when no primary key is present, so callers fall back to the full args.
fn extract_primary(tool: &str, args: &Value) -> Option<Value> {
    let Value::Object(map) = args else {
        return None;
    };
    let mut primary = Map::new();
    for group in primary_key_groups(tool) {
        for alias in group {
            if let Some(value) = map.get(alias) {
                primary.insert(alias.to_string(), value.clone());
                break;
            }
        }
    }
    if primary.is_empty() {
        None
    } else {
        Some(Value::Object(primary))
    }
}

/// Computes the canonical fingerprint `"<tool>:<canonical_primary_args>"`
/// for a tool call (spec §4.5e).
///
/// If `args_raw` does not parse as JSON, falls back to `"<tool>:<raw>"`
/// verbatim.
pub fn fingerprint(tool: &str, args_raw: &str) -> String {
    match serde_json::from_str::<Value>(args_raw) {
        Ok(value) => {
            let canonical = match extract_primary(tool, &value) {
                Some(primary) => stable_stringify(&primary),
                None => stable_stringify(&value),
            };
            format!("{tool}:{canonical}")
        }
        Err(_) => format!("{tool}:{args_raw}"),
    }
}

/// Returns the part of a fingerprint after the first `:`, used by fuzzy
/// matching to compare primary-args components across tool names.
fn primary_component(fp: &str) -> &str {
    fp.splitn(2, ':').nth(1).unwrap_or(fp)
}

/// Scans the tail of `ring` (most recent last) for a local doom-loop
/// pattern.
pub fn detect_local_doom_loop(ring: &VecDeque<String>) -> Option<LocalDoomLoopKind> {
    let len = ring.len();
    if len >= 3 {
        let last3: Vec<&String> = ring.iter().skip(len - 3).collect();
        if last3.iter().all(|fp| **fp == *last3[0]) {
            return Some(LocalDoomLoopKind::Exact);
        }
    }
    if len >= 4 {
        let last4: Vec<&String> = ring.iter().skip(len - 4).collect();
        let first = primary_component(last4[0]);
        if last4.iter().all(|fp| primary_component(fp) == first) {
            return Some(LocalDoomLoopKind::Fuzzy);
        }
    }
    None
}

/// Pushes `fp` onto `ring`, evicting the oldest entry once it exceeds
/// [`RING_SIZE`].
pub fn push_ring(ring: &mut VecDeque<String>, fp: String) {
    ring.push_back(fp);
    while ring.len() > RING_SIZE {
        ring.pop_front();
    }
}

#[cfg(test)]
#[path = "fingerprint.test.rs"]
mod tests;
