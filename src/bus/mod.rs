//! Broadcast bus: fire-and-forget publish/subscribe used to announce swaps.
//!
//! Delivery is at-least-once while a subscriber is connected and nothing is replayed to
//! subscribers that were offline. No ordering holds across publishers.

mod local;
mod redis_bus;

pub use local::LocalBus;
pub use redis_bus::RedisBus;

use crate::config::{BusKind, SwapConfig};
use crate::error::BusError;
use async_trait::async_trait;
use futures::stream::BoxStream;
use std::sync::Arc;

/// Stream of raw payloads received on one channel. An `Err` item is a single failed
/// receive; the stream ending means the subscription is gone and must be re-opened.
pub type Subscription = BoxStream<'static, Result<Vec<u8>, BusError>>;

#[async_trait]
pub trait BroadcastBus: Send + Sync {
    async fn publish(&self, channel: &str, payload: Vec<u8>) -> Result<(), BusError>;

    async fn subscribe(&self, channel: &str) -> Result<Subscription, BusError>;
}

/// Builds the bus selected by `swap.bus`.
pub async fn connect(cfg: &SwapConfig) -> Result<Arc<dyn BroadcastBus>, BusError> {
    match cfg.bus {
        BusKind::Redis => Ok(Arc::new(RedisBus::new(&cfg.redis_url).await?)),
        BusKind::Local => Ok(Arc::new(LocalBus::new())),
    }
}
