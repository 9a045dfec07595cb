//! `Task` markdown export/import (spec §4.8, §6): round-trip compatible
//! with every exported field.

use agent_error::ErrorExt;
use agent_error::Location;
use agent_error::StatusCode;
use agent_error::fmt_error_chain;
use snafu::Snafu;

use super::Task;
use super::TaskStatus;
use crate::protocol::TaskId;

#[derive(Snafu)]
#[snafu(visibility(pub(crate)), module)]
pub enum MarkdownError {
    #[snafu(display("malformed task heading: {line}"))]
    MalformedHeading {
        line: String,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("task {task_id} is missing its {field} field"))]
    MissingField {
        task_id: String,
        field: &'static str,
        #[snafu(implicit)]
        location: Location,
    },
}

impl std::fmt::Debug for MarkdownError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        fmt_error_chain(self, f)
    }
}

impl ErrorExt for MarkdownError {
    fn status_code(&self) -> StatusCode {
        StatusCode::ParseError
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

fn status_char(status: TaskStatus) -> &'static str {
    match status {
        TaskStatus::Completed => "x",
        TaskStatus::InProgress => "~",
        TaskStatus::Pending => " ",
        TaskStatus::Deleted => "d",
    }
}

fn status_word(status: TaskStatus) -> &'static str {
    match status {
        TaskStatus::Completed => "completed",
        TaskStatus::InProgress => "in_progress",
        TaskStatus::Pending => "pending",
        TaskStatus::Deleted => "deleted",
    }
}

fn parse_status(word: &str) -> Option<TaskStatus> {
    match word {
        "completed" => Some(TaskStatus::Completed),
        "in_progress" => Some(TaskStatus::InProgress),
        "pending" => Some(TaskStatus::Pending),
        "deleted" => Some(TaskStatus::Deleted),
        _ => None,
    }
}

fn id_list(ids: &[TaskId]) -> String {
    if ids.is_empty() {
        "none".to_string()
    } else {
        ids.iter().map(|id| id.to_string()).collect::<Vec<_>>().join(", ")
    }
}

fn parse_id_list(text: &str) -> Vec<TaskId> {
    let text = text.trim();
    if text.is_empty() || text.eq_ignore_ascii_case("none") {
        return Vec::new();
    }
    text.split(',').map(|s| TaskId::from(s.trim())).collect()
}

pub fn to_markdown(tasks: &[Task]) -> String {
    let mut out = String::new();
    for task in tasks {
        out.push_str(&format!("## [{}] {}: {}\n", status_char(task.status), task.id, task.subject));
        out.push_str(&format!("**Status:** {}\n", status_word(task.status)));
        out.push_str(&format!("**Owner:** {}\n", task.owner.as_deref().unwrap_or("none")));
        out.push_str(&format!("**Blocked by:** {}\n", id_list(&task.blocked_by)));
        out.push_str(&format!("**Blocks:** {}\n", id_list(&task.blocks)));
        out.push_str("**Description:**\n");
        out.push_str(&task.description);
        out.push_str("\n\n");
    }
    out
}

struct RawTask {
    id: TaskId,
    subject: String,
    status: Option<TaskStatus>,
    owner: Option<String>,
    blocked_by: Option<Vec<TaskId>>,
    blocks: Option<Vec<TaskId>>,
    description_lines: Vec<String>,
}

pub fn from_markdown(text: &str) -> std::result::Result<Vec<Task>, MarkdownError> {
    let mut raw: Vec<RawTask> = Vec::new();

    for line in text.lines() {
        if let Some(heading) = line.strip_prefix("## [") {
            let (marker, rest) = heading
                .split_once(']')
                .ok_or_else(|| markdown_error::MalformedHeadingSnafu { line: line.to_string() }.build())?;
            let rest = rest.trim_start();
            let (id_str, subject) = rest
                .split_once(':')
                .ok_or_else(|| markdown_error::MalformedHeadingSnafu { line: line.to_string() }.build())?;
            let status = match marker {
                "x" => Some(TaskStatus::Completed),
                "~" => Some(TaskStatus::InProgress),
                "d" => Some(TaskStatus::Deleted),
                _ => Some(TaskStatus::Pending),
            };
            raw.push(RawTask {
                id: TaskId::from(id_str.trim()),
                subject: subject.trim().to_string(),
                status,
                owner: None,
                blocked_by: None,
                blocks: None,
                description_lines: Vec::new(),
            });
            continue;
        }

        let Some(current) = raw.last_mut() else {
            continue;
        };

        if let Some(value) = line.strip_prefix("**Status:**") {
            current.status = parse_status(value.trim());
        } else if let Some(value) = line.strip_prefix("**Owner:**") {
            let value = value.trim();
            current.owner = (!value.eq_ignore_ascii_case("none")).then(|| value.to_string());
        } else if let Some(value) = line.strip_prefix("**Blocked by:**") {
            current.blocked_by = Some(parse_id_list(value));
        } else if let Some(value) = line.strip_prefix("**Blocks:**") {
            current.blocks = Some(parse_id_list(value));
        } else if line.starts_with("**Description:**") {
            // description body starts on the following lines
        } else if !line.trim().is_empty() || !current.description_lines.is_empty() {
            current.description_lines.push(line.to_string());
        }
    }

    raw.into_iter()
        .map(|r| {
            let index = r
                .id
                .as_ref()
                .rsplit('-')
                .next()
                .and_then(|n| n.parse::<u64>().ok())
                .unwrap_or(0);
            let description = {
                let mut lines = r.description_lines.clone();
                while lines.last().is_some_and(|l| l.is_empty()) {
                    lines.pop();
                }
                lines.join("\n")
            };
            Ok(Task {
                id: r.id.clone(),
                index,
                subject: r.subject,
                description,
                status: r.status.ok_or_else(|| {
                    markdown_error::MissingFieldSnafu {
                        task_id: r.id.to_string(),
                        field: "Status",
                    }
                    .build()
                })?,
                owner: r.owner,
                lease_heartbeat: None,
                blocked_by: r.blocked_by.unwrap_or_default(),
                blocks: r.blocks.unwrap_or_default(),
                metadata: std::collections::HashMap::new(),
            })
        })
        .collect()
}

#[cfg(test)]
#[path = "markdown.test.rs"]
mod tests;
