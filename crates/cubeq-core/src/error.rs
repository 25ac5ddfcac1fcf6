use thiserror::Error;

/// Canonical result for every cubeq crate.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, Error)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Planning error: {0}")]
    Plan(String),

    /// A cursor or operator contract was violated (e.g. `value()` before `next()`).
    #[error("Internal invariant failed: {0}")]
    Internal(String),

    // Raised by raw-storage collaborators; operators relay it untouched.
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Job failed: {0}")]
    Job(String),

    #[error("Hashing error: {0}")]
    Hash(String),
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Hash(e.to_string())
    }
}
