//! Tool-call batch scheduler (spec §4.7, C7).

use std::collections::HashSet;

use serde_json::Value;

/// One tool call to be scheduled: a tool name plus its raw JSON arguments.
#[derive(Debug, Clone)]
pub struct ToolCall {
    pub tool: String,
    pub args: Value,
}

impl ToolCall {
    pub fn new(tool: impl Into<String>, args: Value) -> Self {
        Self {
            tool: tool.into(),
            args,
        }
    }
}

const PARALLELIZABLE_READS: &[&str] = &[
    "read_file",
    "glob",
    "grep",
    "list_files",
    "search_files",
    "search_code",
    "get_file_info",
];

const CONDITIONALLY_PARALLEL_WRITES: &[&str] = &["write_file", "edit_file"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Class {
    Read,
    Write,
    Sequential,
}

fn classify(tool: &str) -> Class {
    if PARALLELIZABLE_READS.contains(&tool) {
        Class::Read
    } else if CONDITIONALLY_PARALLEL_WRITES.contains(&tool) {
        Class::Write
    } else {
        Class::Sequential
    }
}

/// Extracts the call's target path by checking `path`, `file_path`, and
/// `input.path` in order.
fn extract_path(args: &Value) -> Option<String> {
    let obj = args.as_object()?;
    for key in ["path", "file_path"] {
        if let Some(Value::String(s)) = obj.get(key) {
            return Some(s.clone());
        }
    }
    if let Some(Value::Object(input)) = obj.get("input") {
        if let Some(Value::String(s)) = input.get("path") {
            return Some(s.clone());
        }
    }
    None
}

/// Groups `calls` into ordered batches safe to run concurrently within each
/// batch, via a left-to-right sweep (spec §4.7).
///
/// - Read-only calls accumulate into the current batch freely.
/// - Write-class calls join the current batch only if their target path has
///   not already appeared in it; a conflicting or unresolvable path flushes
///   first.
/// - Any other tool is sequential: it flushes the current batch and forms a
///   batch of exactly one.
pub fn schedule(calls: Vec<ToolCall>) -> Vec<Vec<ToolCall>> {
    let mut batches = Vec::new();
    let mut batch = Vec::new();
    let mut files_in_batch: HashSet<String> = HashSet::new();

    for call in calls {
        match classify(&call.tool) {
            Class::Sequential => {
                if !batch.is_empty() {
                    batches.push(std::mem::take(&mut batch));
                    files_in_batch.clear();
                }
                batches.push(vec![call]);
            }
            Class::Read => {
                batch.push(call);
            }
            Class::Write => match extract_path(&call.args) {
                Some(path) if files_in_batch.contains(&path) => {
                    batches.push(std::mem::take(&mut batch));
                    files_in_batch.clear();
                    files_in_batch.insert(path);
                    batch.push(call);
                }
                Some(path) => {
                    files_in_batch.insert(path);
                    batch.push(call);
                }
                None => {
                    if !batch.is_empty() {
                        batches.push(std::mem::take(&mut batch));
                        files_in_batch.clear();
                    }
                    batches.push(vec![call]);
                }
            },
        }
    }

    if !batch.is_empty() {
        batches.push(batch);
    }

    batches
}

#[cfg(test)]
#[path = "scheduler.test.rs"]
mod tests;
