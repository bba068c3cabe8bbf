use std::path::PathBuf;
use thiserror::Error as ThisError;

#[derive(Debug, ThisError)]
pub enum StorageError {
    /// The setup transaction never succeeded within the configured budget.
    #[error("opening {} failed after {attempts} attempts: {source}", path.display())]
    OpenExhausted {
        path: PathBuf,
        attempts: usize,
        #[source]
        source: sqlx::Error,
    },

    #[error("statement preparation failed after {attempts} attempts: {source}")]
    Prepare {
        attempts: usize,
        #[source]
        source: sqlx::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Ractor error: {0}")]
    Actor(String),
}
