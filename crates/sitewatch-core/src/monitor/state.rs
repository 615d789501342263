use serde::{Deserialize, Serialize};

/// Lifecycle of one monitor task. `Stopped` is terminal: a rescheduled
/// site gets a fresh task rather than a restarted one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Running,
    Stopped,
}

impl TaskState {
    pub fn can_transition_to(self, target: TaskState) -> bool {
        matches!((self, target), (TaskState::Running, TaskState::Stopped))
    }

    pub fn is_running(self) -> bool {
        self == TaskState::Running
    }
}

impl std::fmt::Display for TaskState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Running => write!(f, "running"),
            Self::Stopped => write!(f, "stopped"),
        }
    }
}
