//! Polls a node's read endpoint in a tight loop and logs every outcome.
//!
//! Run it against an instance while triggering swaps to watch for failed reads.

use figment::{
    Figment,
    providers::{Env, Serialized},
};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};
use url::Url;

/// Poller configuration, read from `POLLER_*` environment variables.
#[derive(Debug, Clone, Deserialize, Serialize)]
struct PollerConfig {
    /// Env: `POLLER_URL`. Default: `http://127.0.0.1:9999/read/1`.
    url: String,
    /// Env: `POLLER_INTERVAL_MS`. Default: `5`.
    interval_ms: u64,
    /// Env: `POLLER_TIMEOUT_MS`. Default: `3000`.
    timeout_ms: u64,
    /// Env: `POLLER_LOGLEVEL`. Default: `info`.
    loglevel: String,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:9999/read/1".to_string(),
            interval_ms: 5,
            timeout_ms: 3_000,
            loglevel: "info".to_string(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cfg: PollerConfig = Figment::new()
        .merge(Serialized::defaults(PollerConfig::default()))
        .merge(Env::prefixed("POLLER_"))
        .extract()?;
    let url = Url::parse(&cfg.url)?;

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(cfg.loglevel.clone()));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().compact().with_target(false))
        .init();

    let client = reqwest::Client::builder()
        .timeout(Duration::from_millis(cfg.timeout_ms))
        .build()?;
    let interval = Duration::from_millis(cfg.interval_ms);

    info!(%url, interval_ms = cfg.interval_ms, "started making requests");

    loop {
        tokio::select! {
            _ = signal::ctrl_c() => break,
            () = tokio::time::sleep(interval) => {}
        }

        let resp = match client.get(url.clone()).send().await {
            Ok(resp) => resp,
            Err(e) => {
                warn!(error = %e, "failed making http request");
                continue;
            }
        };

        let status = resp.status();
        if !status.is_success() {
            warn!(status = status.as_u16(), "failed status code");
            continue;
        }

        match resp.text().await {
            Ok(body) => info!(%body, "response"),
            Err(e) => warn!(error = %e, "failed to read response body"),
        }
    }

    info!("poller stopped");
    Ok(())
}
