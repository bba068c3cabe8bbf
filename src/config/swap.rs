use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Which broadcast bus implementation the process joins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BusKind {
    /// Redis pub/sub, shared by every instance of the fleet.
    #[default]
    Redis,
    /// In-process channel; only this instance hears its own swaps.
    Local,
}

/// Swap coordination configuration managed by Figment.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SwapConfig {
    /// TOML: `swap.bus`. Default: `redis`.
    #[serde(default)]
    pub bus: BusKind,

    /// Redis connection URL, used when `swap.bus = "redis"`.
    /// TOML: `swap.redis_url`. Default: `redis://redis:6379`.
    #[serde(default = "default_redis_url")]
    pub redis_url: String,

    /// Channel swap requests are published on.
    /// TOML: `swap.channel`. Default: `update-data`.
    #[serde(default = "default_channel")]
    pub channel: String,

    /// Prefix of generated candidate names (`<prefix>-<unix micros>`).
    /// TOML: `swap.candidate_prefix`. Default: `new`.
    #[serde(default = "default_candidate_prefix")]
    pub candidate_prefix: String,

    /// Grace period before the originating instance promotes the candidate file.
    /// TOML: `swap.takeover_grace_ms`. Default: `5000`.
    #[serde(default = "default_takeover_grace_ms")]
    pub takeover_grace_ms: u64,

    /// Extra replace attempts before a failed swap becomes fatal.
    /// TOML: `swap.replace_retry_times`. Default: `0`.
    #[serde(default)]
    pub replace_retry_times: usize,

    /// TOML: `swap.replace_retry_delay_ms`. Default: `100`.
    #[serde(default = "default_replace_retry_delay_ms")]
    pub replace_retry_delay_ms: u64,

    /// Delay before re-subscribing after the bus subscription ends or cannot be opened.
    /// TOML: `swap.resubscribe_delay_ms`. Default: `1000`.
    #[serde(default = "default_resubscribe_delay_ms")]
    pub resubscribe_delay_ms: u64,

    /// Terminate the process on an undecodable swap message instead of dropping it.
    /// TOML: `swap.fatal_on_malformed`. Default: `false`.
    #[serde(default)]
    pub fatal_on_malformed: bool,
}

impl SwapConfig {
    pub fn takeover_grace(&self) -> Duration {
        Duration::from_millis(self.takeover_grace_ms)
    }

    pub fn replace_retry_delay(&self) -> Duration {
        Duration::from_millis(self.replace_retry_delay_ms)
    }

    pub fn resubscribe_delay(&self) -> Duration {
        Duration::from_millis(self.resubscribe_delay_ms)
    }
}

impl Default for SwapConfig {
    fn default() -> Self {
        Self {
            bus: BusKind::default(),
            redis_url: default_redis_url(),
            channel: default_channel(),
            candidate_prefix: default_candidate_prefix(),
            takeover_grace_ms: default_takeover_grace_ms(),
            replace_retry_times: 0,
            replace_retry_delay_ms: default_replace_retry_delay_ms(),
            resubscribe_delay_ms: default_resubscribe_delay_ms(),
            fatal_on_malformed: false,
        }
    }
}

fn default_redis_url() -> String {
    "redis://redis:6379".to_string()
}

fn default_channel() -> String {
    "update-data".to_string()
}

fn default_candidate_prefix() -> String {
    "new".to_string()
}

fn default_takeover_grace_ms() -> u64 {
    5_000
}

fn default_replace_retry_delay_ms() -> u64 {
    100
}

fn default_resubscribe_delay_ms() -> u64 {
    1_000
}
