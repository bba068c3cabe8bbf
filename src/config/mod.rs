mod basic;
mod storage;
mod swap;

pub use basic::BasicConfig;
pub use storage::StorageConfig;
pub use swap::{BusKind, SwapConfig};

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Application configuration managed by Figment.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct Config {
    /// Core server configuration (see `basic` table in config.toml).
    #[serde(default)]
    pub basic: BasicConfig,

    /// Database file location and retry budgets (see `storage` table in config.toml).
    #[serde(default)]
    pub storage: StorageConfig,

    /// Broadcast bus and takeover settings (see `swap` table in config.toml).
    #[serde(default)]
    pub swap: SwapConfig,
}

const DEFAULT_CONFIG_FILE: &str = "config.toml";
const ENV_PREFIX: &str = "SWAPDB_";

impl Config {
    /// Builds a Figment that merges defaults, an optional `config.toml` and `SWAPDB_*` env vars.
    ///
    /// Nested keys use a double underscore, e.g. `SWAPDB_SWAP__REDIS_URL`.
    pub fn figment() -> Figment {
        let mut figment = Figment::new().merge(Serialized::defaults(Config::default()));
        if PathBuf::from(DEFAULT_CONFIG_FILE).is_file() {
            figment = figment.merge(Toml::file(DEFAULT_CONFIG_FILE));
        }
        figment.merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    pub fn load() -> Result<Self, Box<figment::Error>> {
        Self::figment().extract().map_err(Box::new)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_fleet_layout() {
        let cfg = Config::default();
        assert_eq!(cfg.basic.listen_port, 8080);
        assert_eq!(
            cfg.storage.canonical_path(),
            PathBuf::from("/data/data.db")
        );
        assert_eq!(cfg.swap.channel, "update-data");
        assert_eq!(cfg.swap.candidate_prefix, "new");
        assert_eq!(cfg.swap.bus, BusKind::Redis);
        assert!(!cfg.swap.fatal_on_malformed);
    }

    #[test]
    fn toml_overrides_nested_tables() {
        let cfg: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::string(
                r#"
                [storage]
                data_dir = "/srv/state"
                open_retry_times = 3

                [swap]
                bus = "local"
                takeover_grace_ms = 250
                "#,
            ))
            .extract()
            .expect("extract config");

        assert_eq!(cfg.storage.canonical_path(), PathBuf::from("/srv/state/data.db"));
        assert_eq!(cfg.storage.open_retry_times, 3);
        assert_eq!(cfg.swap.bus, BusKind::Local);
        assert_eq!(cfg.swap.takeover_grace().as_millis(), 250);
        // untouched keys keep their defaults
        assert_eq!(cfg.storage.prepare_retry_times, 100);
    }
}
