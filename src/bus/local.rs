use super::{BroadcastBus, Subscription};
use crate::error::BusError;
use async_trait::async_trait;
use futures::StreamExt;
use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};
use tokio::sync::broadcast;
use tokio_stream::wrappers::{BroadcastStream, errors::BroadcastStreamRecvError};
use tracing::debug;

/// Per-channel capacity; a subscriber further behind than this sees `BusError::Lagged`.
const CHANNEL_CAPACITY: usize = 64;

/// In-process bus on tokio broadcast channels.
///
/// Clones share the same channels, so several coordinators in one process (or test) can
/// talk to each other through it.
#[derive(Clone, Default)]
pub struct LocalBus {
    channels: Arc<Mutex<HashMap<String, broadcast::Sender<Arc<[u8]>>>>>,
}

impl LocalBus {
    pub fn new() -> Self {
        Self::default()
    }

    fn sender(&self, channel: &str) -> broadcast::Sender<Arc<[u8]>> {
        let mut channels = self
            .channels
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        channels
            .entry(channel.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .clone()
    }
}

#[async_trait]
impl BroadcastBus for LocalBus {
    async fn publish(&self, channel: &str, payload: Vec<u8>) -> Result<(), BusError> {
        // No receivers is not an error: offline subscribers simply miss the message.
        if let Err(e) = self.sender(channel).send(Arc::from(payload)) {
            debug!(channel, len = e.0.len(), "Published with no subscribers");
        }
        Ok(())
    }

    async fn subscribe(&self, channel: &str) -> Result<Subscription, BusError> {
        let rx = self.sender(channel).subscribe();
        let stream = BroadcastStream::new(rx).map(|item| match item {
            Ok(payload) => Ok(payload.to_vec()),
            Err(BroadcastStreamRecvError::Lagged(n)) => Err(BusError::Lagged(n)),
        });
        Ok(stream.boxed())
    }
}
