//! Event types from `codex exec --json` output.
//!
//! Lines are parsed into a loose [`serde_json::Value`] first and then
//! narrowed into [`AgentEvent`] / [`ThreadItem`]. Missing or mistyped fields
//! never fail a line: they degrade to defaults or to the `Unknown` variants,
//! so a protocol change upstream shows up as a tag in the transcript instead
//! of a crash.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Token usage reported on `turn.completed`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Usage {
    pub input_tokens: u64,
    pub cached_input_tokens: u64,
    pub output_tokens: u64,
}

/// What happened to a file in a `file_change` item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeKind {
    Add,
    Update,
    Delete,
    /// Any kind this build does not know, kept verbatim.
    Other(String),
}

impl ChangeKind {
    fn parse(kind: &str) -> Self {
        match kind {
            "add" => Self::Add,
            "update" => Self::Update,
            "delete" => Self::Delete,
            other => Self::Other(other.to_string()),
        }
    }
}

/// A single path touched by a `file_change` item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileChange {
    pub path: String,
    pub kind: ChangeKind,
}

/// A shell command run by the agent.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CommandExecution {
    pub command: String,
    /// Combined stdout/stderr, if the agent reported any.
    pub aggregated_output: Option<String>,
    /// `None` while the command has no known exit status.
    pub exit_code: Option<i64>,
}

/// One step of a `todo_list` plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TodoEntry {
    pub text: String,
    pub completed: bool,
}

/// Payload of `item.*` events, discriminated by `item.type`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ThreadItem {
    AgentMessage { text: String },
    Reasoning { text: String },
    FileChange { changes: Vec<FileChange> },
    CommandExecution(CommandExecution),
    TodoList { items: Vec<TodoEntry> },
    /// Unrecognised or missing `item.type`.
    Unknown { item_type: Option<String> },
}

/// Events emitted by codex on stdout, discriminated by `type`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentEvent {
    ThreadStarted { thread_id: Option<String> },
    TurnStarted,
    TurnCompleted { usage: Option<Usage> },
    TurnFailed { message: Option<String> },
    ItemStarted(ThreadItem),
    ItemUpdated(ThreadItem),
    ItemCompleted(ThreadItem),
    /// Stream-level error reported by the agent.
    Error { message: Option<String> },
    /// Unrecognised or missing `type`.
    Unknown { event_type: Option<String> },
}

impl AgentEvent {
    /// Build an event from an already-parsed JSON value.
    #[must_use]
    pub fn from_value(value: &Value) -> Self {
        let event_type = str_field(value, "type");
        match event_type {
            Some("thread.started") => Self::ThreadStarted {
                thread_id: str_field(value, "thread_id").map(str::to_string),
            },
            Some("turn.started") => Self::TurnStarted,
            Some("turn.completed") => Self::TurnCompleted {
                usage: value
                    .get("usage")
                    .and_then(|u| Usage::deserialize(u).ok()),
            },
            Some("turn.failed") => Self::TurnFailed {
                message: value
                    .get("error")
                    .and_then(|e| str_field(e, "message"))
                    .map(str::to_string),
            },
            Some("item.started") => Self::ItemStarted(ThreadItem::from_event(value)),
            Some("item.updated") => Self::ItemUpdated(ThreadItem::from_event(value)),
            Some("item.completed") => Self::ItemCompleted(ThreadItem::from_event(value)),
            Some("error") => Self::Error {
                message: str_field(value, "message").map(str::to_string),
            },
            other => Self::Unknown {
                event_type: other.map(str::to_string),
            },
        }
    }

    /// The `thread_id` carried by a `thread.started` event, if it is a string.
    #[must_use]
    pub fn thread_id(&self) -> Option<&str> {
        match self {
            Self::ThreadStarted { thread_id } => thread_id.as_deref(),
            _ => None,
        }
    }

    /// Wire name of the event type.
    #[must_use]
    pub fn type_name(&self) -> &str {
        match self {
            Self::ThreadStarted { .. } => "thread.started",
            Self::TurnStarted => "turn.started",
            Self::TurnCompleted { .. } => "turn.completed",
            Self::TurnFailed { .. } => "turn.failed",
            Self::ItemStarted(_) => "item.started",
            Self::ItemUpdated(_) => "item.updated",
            Self::ItemCompleted(_) => "item.completed",
            Self::Error { .. } => "error",
            Self::Unknown { event_type } => event_type.as_deref().unwrap_or("unknown"),
        }
    }
}

impl ThreadItem {
    fn from_event(event: &Value) -> Self {
        event
            .get("item")
            .map_or(Self::Unknown { item_type: None }, Self::from_value)
    }

    /// Build an item from the JSON object under `item`.
    #[must_use]
    pub fn from_value(item: &Value) -> Self {
        match str_field(item, "type") {
            Some("agent_message") => Self::AgentMessage {
                text: str_field(item, "text").unwrap_or_default().to_string(),
            },
            Some("reasoning") => Self::Reasoning {
                text: str_field(item, "text").unwrap_or_default().to_string(),
            },
            Some("file_change") => Self::FileChange {
                changes: parse_changes(item),
            },
            Some("command_execution") => Self::CommandExecution(CommandExecution {
                command: str_field(item, "command").unwrap_or_default().to_string(),
                aggregated_output: str_field(item, "aggregated_output").map(str::to_string),
                exit_code: item.get("exit_code").and_then(Value::as_i64),
            }),
            Some("todo_list") => Self::TodoList {
                items: item
                    .get("items")
                    .and_then(Value::as_array)
                    .map(|entries| entries.iter().filter_map(parse_todo).collect())
                    .unwrap_or_default(),
            },
            other => Self::Unknown {
                item_type: other.map(str::to_string),
            },
        }
    }

    /// Wire name of the item type.
    #[must_use]
    pub fn type_name(&self) -> &str {
        match self {
            Self::AgentMessage { .. } => "agent_message",
            Self::Reasoning { .. } => "reasoning",
            Self::FileChange { .. } => "file_change",
            Self::CommandExecution(_) => "command_execution",
            Self::TodoList { .. } => "todo_list",
            Self::Unknown { item_type } => item_type.as_deref().unwrap_or("unknown"),
        }
    }
}

/// One classified line of child output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamLine {
    Event(AgentEvent),
    /// The line was not valid JSON. Kept for the log and a raw echo.
    NonJson { raw: String, reason: String },
}

/// Classify one logical line.
///
/// Never fails: invalid JSON becomes [`StreamLine::NonJson`], and JSON that
/// is not an object is treated as an unknown event.
#[must_use]
pub fn classify_line(line: &str) -> StreamLine {
    match serde_json::from_str::<Value>(line) {
        Ok(value) => StreamLine::Event(AgentEvent::from_value(&value)),
        Err(e) => {
            tracing::debug!(line = %line, error = %e, "Non-JSON line from codex");
            StreamLine::NonJson {
                raw: line.to_string(),
                reason: e.to_string(),
            }
        }
    }
}

fn str_field<'a>(value: &'a Value, key: &str) -> Option<&'a str> {
    value.get(key).and_then(Value::as_str)
}

fn parse_change(value: &Value) -> Option<FileChange> {
    let path = str_field(value, "path")?;
    Some(FileChange {
        path: path.to_string(),
        kind: ChangeKind::parse(str_field(value, "kind").unwrap_or_default()),
    })
}

/// `changes` array, or the older single `file_change` object.
fn parse_changes(item: &Value) -> Vec<FileChange> {
    if let Some(changes) = item.get("changes").and_then(Value::as_array) {
        return changes.iter().filter_map(parse_change).collect();
    }
    item.get("file_change")
        .and_then(parse_change)
        .into_iter()
        .collect()
}

fn parse_todo(value: &Value) -> Option<TodoEntry> {
    Some(TodoEntry {
        text: str_field(value, "text")?.to_string(),
        completed: value
            .get("completed")
            .and_then(Value::as_bool)
            .unwrap_or(false),
    })
}
