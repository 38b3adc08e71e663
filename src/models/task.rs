use std::fmt;

use chrono::{DateTime, Local};

pub type TaskId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    /// Completed, Failed and Cancelled never transition again.
    pub fn is_terminal(self) -> bool {
        !matches!(self, TaskStatus::Running)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            TaskStatus::Running => "Running",
            TaskStatus::Completed => "Completed",
            TaskStatus::Failed => "Failed",
            TaskStatus::Cancelled => "Cancelled",
        };
        f.write_str(label)
    }
}

/// Snapshot of one unit of background work. Records are replaced, never
/// edited in place, so a clone handed to an observer stays consistent.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskRecord {
    pub id: TaskId,
    pub name: String,
    pub duration_secs: u32,
    pub status: TaskStatus,
    pub progress: u8,
    pub started_at: DateTime<Local>,
}

impl TaskRecord {
    pub fn new(id: TaskId, name: String, duration_secs: u32) -> Self {
        Self {
            id,
            name,
            duration_secs,
            status: TaskStatus::Running,
            progress: 0,
            started_at: Local::now(),
        }
    }

    pub fn with_progress(&self, progress: u8) -> Self {
        Self {
            progress,
            ..self.clone()
        }
    }

    pub fn with_status(&self, status: TaskStatus, progress: u8) -> Self {
        Self {
            status,
            progress,
            ..self.clone()
        }
    }

    pub fn is_running(&self) -> bool {
        self.status == TaskStatus::Running
    }
}
