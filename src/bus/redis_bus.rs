use super::{BroadcastBus, Subscription};
use crate::error::BusError;
use async_trait::async_trait;
use futures::StreamExt;
use redis::{AsyncCommands, Client, aio::ConnectionManager};
use tracing::{debug, info};

/// Redis pub/sub bus shared by every instance of the fleet.
///
/// Publishing goes through a `ConnectionManager`, which reconnects on its own. Each
/// subscription owns a dedicated pub/sub connection; when that connection drops the
/// stream ends and the caller re-subscribes.
pub struct RedisBus {
    client: Client,
    conn: ConnectionManager,
}

impl RedisBus {
    /// # Arguments
    /// * `url` - Redis connection URL (e.g., redis://localhost:6379)
    pub async fn new(url: &str) -> Result<Self, BusError> {
        let client = Client::open(url)?;
        let conn = ConnectionManager::new(client.clone()).await?;

        info!(url = %url, "Connected to Redis for swap broadcasts");

        Ok(Self { client, conn })
    }
}

#[async_trait]
impl BroadcastBus for RedisBus {
    async fn publish(&self, channel: &str, payload: Vec<u8>) -> Result<(), BusError> {
        let mut conn = self.conn.clone();
        let receivers: i64 = conn.publish(channel, payload).await?;
        debug!(channel, receivers, "Published to Redis");
        Ok(())
    }

    async fn subscribe(&self, channel: &str) -> Result<Subscription, BusError> {
        let mut pubsub = self.client.get_async_pubsub().await?;
        pubsub.subscribe(channel).await?;

        info!(channel, "Subscribed to Redis channel");

        let stream = pubsub
            .into_on_message()
            .map(|msg| Ok(msg.get_payload_bytes().to_vec()));
        Ok(stream.boxed())
    }
}
