use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TaskError {
    #[error("task name must not be blank")]
    BlankName,
    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[from] io::Error),
    #[error("step {step} failed: {reason}")]
    Step { step: u32, reason: String },
    #[error("worker panicked: {0}")]
    Panicked(String),
    #[error("task registry is shut down")]
    ShutDown,
}

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("{key} must be a positive integer, got '{value}'")]
    InvalidNumber { key: &'static str, value: String },
}

#[derive(Debug, Error, PartialEq)]
pub enum CommandError {
    #[error("Task ID must be specified.")]
    MissingId,
    #[error("Invalid task ID format: '{0}'.")]
    InvalidId(String),
    #[error("Task name must be specified.")]
    MissingName,
    #[error("Unknown command: {0}. Type 'help' for the list of commands.")]
    Unknown(String),
}
