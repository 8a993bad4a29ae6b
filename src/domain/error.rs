use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SchedulingError {
    #[error("Invalid work policy: {0}")]
    InvalidPolicy(String),
    #[error("Invalid task: {0}")]
    InvalidTask(String),
}
