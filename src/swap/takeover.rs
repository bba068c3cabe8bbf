use crate::error::{TakeoverError, TakeoverStep};
use std::{
    io,
    path::{Path, PathBuf},
};
use tokio::fs;

/// Write-ahead-log side files, renamed in this order after the main file.
const SIDE_FILES: [(&str, TakeoverStep); 2] = [
    ("-shm", TakeoverStep::PromoteShm),
    ("-wal", TakeoverStep::PromoteWal),
];

/// Promotion of a candidate database to the canonical name.
///
/// Steps run in order and the first failure aborts the rest, which can leave a partially
/// migrated directory behind. Nothing is retried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Takeover {
    canonical: PathBuf,
    candidate: PathBuf,
}

impl Takeover {
    pub fn new(canonical: impl Into<PathBuf>, candidate: impl Into<PathBuf>) -> Self {
        Self {
            canonical: canonical.into(),
            candidate: candidate.into(),
        }
    }

    pub fn canonical(&self) -> &Path {
        &self.canonical
    }

    pub fn candidate(&self) -> &Path {
        &self.candidate
    }

    pub async fn run(&self) -> Result<(), TakeoverError> {
        fs::remove_file(&self.canonical)
            .await
            .map_err(failed(TakeoverStep::RemoveOld, &self.canonical))?;

        fs::rename(&self.candidate, &self.canonical)
            .await
            .map_err(failed(TakeoverStep::PromoteCandidate, &self.candidate))?;

        for (suffix, step) in SIDE_FILES {
            let from = side_file(&self.candidate, suffix);
            let to = side_file(&self.canonical, suffix);
            fs::rename(&from, &to).await.map_err(failed(step, &from))?;
        }
        Ok(())
    }
}

fn failed(step: TakeoverStep, path: &Path) -> impl FnOnce(io::Error) -> TakeoverError + '_ {
    move |source| TakeoverError {
        step,
        path: path.to_path_buf(),
        source,
    }
}

fn side_file(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}
