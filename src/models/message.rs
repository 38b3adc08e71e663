use std::fmt;

/// User-facing status text published on each major task transition.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskMessage {
    Started(String),
    Completed(String),
    Failed { name: String, reason: Option<String> },
    Cancelled(String),
    StartError(String),
}

impl fmt::Display for TaskMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskMessage::Started(name) => write!(f, "Task '{}' started successfully!", name),
            TaskMessage::Completed(name) => write!(f, "Task '{}' completed successfully!", name),
            TaskMessage::Failed { name, reason: Some(reason) } => {
                write!(f, "Task '{}' failed: {}", name, reason)
            }
            TaskMessage::Failed { name, reason: None } => write!(f, "Task '{}' failed", name),
            TaskMessage::Cancelled(name) => write!(f, "Task '{}' cancelled successfully!", name),
            TaskMessage::StartError(reason) => write!(f, "Error starting task: {}", reason),
        }
    }
}
