use thiserror::Error;

#[derive(Debug, Error)]
pub enum SpillError {
    #[error("Corrupt spill data: {0}")]
    Corrupt(String),
    #[error("Invalid partition state: {0}")]
    InvalidState(String),
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    #[error("Internal error: {0}")]
    InternalError(String),
    #[error("I/O error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("Failed to close {} partition(s): {}", .0.len(), describe_close_failures(.0))]
    CloseFailed(Vec<(usize, String)>),
}

fn describe_close_failures(failures: &[(usize, String)]) -> String {
    failures
        .iter()
        .map(|(idx, reason)| format!("partition {idx}: {reason}"))
        .collect::<Vec<_>>()
        .join("; ")
}
