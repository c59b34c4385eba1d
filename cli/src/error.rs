use imgtask_core::api::{ExecutorError, RepoError, TaskError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CliError {
    #[error("config error: {0}")]
    Config(String),

    #[error("invalid task input: {0}")]
    Input(String),

    #[error(transparent)]
    Task(#[from] TaskError),

    #[error(transparent)]
    Repository(#[from] RepoError),

    #[error(transparent)]
    Executor(#[from] ExecutorError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Command(String),
}

impl CliError {
    // 0: task succeeded
    // 2: task ended in failure or killed (returned as a normal exit code)
    // 11: config or argument error
    // 20: io error
    // 50: internal/uncategorized
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) | Self::Input(_) | Self::Task(_) => 11,
            Self::Io(_) | Self::Command(_) => 20,
            Self::Repository(_) | Self::Executor(_) => 50,
        }
    }
}
