use serde::{Deserialize, Serialize};
use std::{
    path::{Path, PathBuf},
    time::Duration,
};

/// Storage configuration managed by Figment.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Directory holding the canonical database and every candidate file.
    /// TOML: `storage.data_dir`. Default: `/data`.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// File stem of the canonical database (`<data_dir>/<db_name>.db`).
    /// TOML: `storage.db_name`. Default: `data`.
    #[serde(default = "default_db_name")]
    pub db_name: String,

    /// SQLite busy timeout applied to every connection.
    /// TOML: `storage.busy_timeout_ms`. Default: `10000`.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,

    /// Extra attempts for the setup transaction run when a file is opened.
    /// TOML: `storage.open_retry_times`. Default: `400`.
    #[serde(default = "default_open_retry_times")]
    pub open_retry_times: usize,

    /// Fixed delay between setup transaction attempts.
    /// TOML: `storage.open_retry_delay_ms`. Default: `25`.
    #[serde(default = "default_open_retry_delay_ms")]
    pub open_retry_delay_ms: u64,

    /// Extra attempts for statement preparation on the read path.
    /// TOML: `storage.prepare_retry_times`. Default: `100`.
    #[serde(default = "default_prepare_retry_times")]
    pub prepare_retry_times: usize,

    /// Fixed delay between statement preparation attempts.
    /// TOML: `storage.prepare_retry_delay_ms`. Default: `5`.
    #[serde(default = "default_prepare_retry_delay_ms")]
    pub prepare_retry_delay_ms: u64,
}

impl StorageConfig {
    /// Path every candidate is eventually promoted to.
    pub fn canonical_path(&self) -> PathBuf {
        db_file(&self.data_dir, &self.db_name)
    }

    /// Path a swap candidate named `name` lives at before takeover.
    pub fn candidate_path(&self, name: &str) -> PathBuf {
        db_file(&self.data_dir, name)
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }

    pub fn open_retry_delay(&self) -> Duration {
        Duration::from_millis(self.open_retry_delay_ms)
    }

    pub fn prepare_retry_delay(&self) -> Duration {
        Duration::from_millis(self.prepare_retry_delay_ms)
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            db_name: default_db_name(),
            busy_timeout_ms: default_busy_timeout_ms(),
            open_retry_times: default_open_retry_times(),
            open_retry_delay_ms: default_open_retry_delay_ms(),
            prepare_retry_times: default_prepare_retry_times(),
            prepare_retry_delay_ms: default_prepare_retry_delay_ms(),
        }
    }
}

fn db_file(dir: &Path, stem: &str) -> PathBuf {
    dir.join(format!("{stem}.db"))
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("/data")
}

fn default_db_name() -> String {
    "data".to_string()
}

fn default_busy_timeout_ms() -> u64 {
    10_000
}

fn default_open_retry_times() -> usize {
    400
}

fn default_open_retry_delay_ms() -> u64 {
    25
}

fn default_prepare_retry_times() -> usize {
    100
}

fn default_prepare_retry_delay_ms() -> u64 {
    5
}
