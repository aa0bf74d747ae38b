//! Long-running task model.
//!
//! Tasks execute on the job server; clusters observe them remotely through
//! the poll loop in `swarmlink-core`. The `statuses` field is an
//! append-only progress log of free-form JSON objects -- per poll round
//! only entries beyond the caller's watermark travel over the wire.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Lifecycle state of a task. `Completed` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskState {
    Pending,
    Running,
    Completed,
    Failed,
}

impl TaskState {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskState::Completed | TaskState::Failed)
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskState::Pending => f.write_str("pending"),
            TaskState::Running => f.write_str("running"),
            TaskState::Completed => f.write_str("completed"),
            TaskState::Failed => f.write_str("failed"),
        }
    }
}

/// The entity a task belongs to (a guild or a user).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskFor {
    pub id: String,
    pub target_type: String,
}

/// Reference to a task, as handed out on task creation.
///
/// `task_key` is the access key the job server may demand before
/// releasing task details.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskRef {
    pub task_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_key: Option<String>,
}

/// A unit of long-running work tracked by the job server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub task_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_key: Option<String>,

    /// Whether the task can be observed without authentication.
    #[serde(default)]
    pub allow_unauthenticated: bool,

    pub task_name: String,

    /// Task output descriptor (filename etc.), present once produced.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,

    /// Append-only progress log.
    #[serde(default)]
    pub statuses: Vec<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_for: Option<TaskFor>,

    /// Retention period in seconds; expired tasks are reaped server-side.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry: Option<i64>,

    pub state: TaskState,

    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_task() -> Task {
        Task {
            task_id: "t-123".to_string(),
            task_key: None,
            allow_unauthenticated: false,
            task_name: "guild_backup".to_string(),
            output: None,
            statuses: vec![json!({"level": "info", "msg": "started"})],
            task_for: Some(TaskFor {
                id: "g-1".to_string(),
                target_type: "Server".to_string(),
            }),
            expiry: Some(3600),
            state: TaskState::Running,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn terminal_states() {
        assert!(!TaskState::Pending.is_terminal());
        assert!(!TaskState::Running.is_terminal());
        assert!(TaskState::Completed.is_terminal());
        assert!(TaskState::Failed.is_terminal());
    }

    #[test]
    fn state_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&TaskState::Completed).unwrap(),
            "\"completed\""
        );
        let state: TaskState = serde_json::from_str("\"failed\"").unwrap();
        assert_eq!(state, TaskState::Failed);
    }

    #[test]
    fn task_roundtrip() {
        let task = sample_task();
        let wire = serde_json::to_string(&task).unwrap();
        let back: Task = serde_json::from_str(&wire).unwrap();
        assert_eq!(back, task);
    }

    #[test]
    fn task_without_id_is_rejected() {
        let raw = json!({
            "task_name": "guild_backup",
            "state": "pending",
            "created_at": "2024-01-01T00:00:00Z"
        });
        assert!(serde_json::from_value::<Task>(raw).is_err());
    }

    #[test]
    fn task_ref_omits_missing_key() {
        let task_ref = TaskRef {
            task_id: "t-123".to_string(),
            task_key: None,
        };
        assert_eq!(
            serde_json::to_value(&task_ref).unwrap(),
            json!({"task_id": "t-123"})
        );
    }
}
