use std::{fmt, io, path::PathBuf};
use thiserror::Error as ThisError;

/// Filesystem step of a takeover, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TakeoverStep {
    RemoveOld,
    PromoteCandidate,
    PromoteShm,
    PromoteWal,
}

impl fmt::Display for TakeoverStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::RemoveOld => "remove old database",
            Self::PromoteCandidate => "rename candidate database",
            Self::PromoteShm => "rename -shm side file",
            Self::PromoteWal => "rename -wal side file",
        })
    }
}

#[derive(Debug, ThisError)]
#[error("takeover step '{step}' failed on {}: {source}", path.display())]
pub struct TakeoverError {
    pub step: TakeoverStep,
    pub path: PathBuf,
    #[source]
    pub source: io::Error,
}
