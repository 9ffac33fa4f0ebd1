use thiserror::Error;

/// Errors that are fatal to a transaction worker.
///
/// Conflicts and action aborts are deliberately absent: they are resolved
/// internally by rollback and retry and never surface to callers.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StmError {
    #[error("codec error: {0}")]
    Codec(String),

    #[error("cell index out of range: {0}")]
    IndexOutOfRange(usize),

    #[error("worker panicked: {0}")]
    WorkerPanicked(String),
}

pub type StmResult<T> = Result<T, StmError>;
