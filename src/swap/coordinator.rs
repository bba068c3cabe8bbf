use super::takeover::Takeover;
use crate::bus::{BroadcastBus, Subscription};
use crate::config::{StorageConfig, SwapConfig};
use crate::error::{IsFatal, StorageError, SwapdbError};
use crate::identity::ProcessIdentity;
use crate::storage::StorageHandle;
use backon::{ConstantBuilder, Retryable};
use chrono::{DateTime, Utc};
use futures::StreamExt;
use std::{
    collections::VecDeque,
    path::{Path, PathBuf},
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};
use swapdb_schema::SwapMessage;
use tokio::{sync::watch, task::JoinHandle, task::JoinSet};
use tracing::{error, info, warn};

/// How many accepted messages are remembered for redelivery detection.
const RECENT_MESSAGES: usize = 64;

/// What the listener did with one received payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SwapOutcome {
    /// Storage now serves `candidate`; the request came from a peer.
    Swapped { candidate: PathBuf },
    /// Storage now serves `candidate`, and this instance will promote it after the grace period.
    TakeoverScheduled { candidate: PathBuf },
    /// The payload was malformed, or a redelivery of an accepted message, and was ignored.
    Dropped,
}

/// Owns the swap protocol for one process.
///
/// Cloning is cheap; clones share the storage handle, the pending takeovers and the
/// shutdown signal.
#[derive(Clone)]
pub struct SwapCoordinator {
    inner: Arc<CoordinatorInner>,
}

struct CoordinatorInner {
    identity: ProcessIdentity,
    storage: StorageHandle,
    bus: Arc<dyn BroadcastBus>,
    storage_cfg: Arc<StorageConfig>,
    cfg: Arc<SwapConfig>,
    takeovers: Mutex<JoinSet<()>>,
    recent: Mutex<RecentMessages>,
    shutdown_tx: watch::Sender<bool>,
}

/// Bounded memory of accepted messages, oldest evicted first.
struct RecentMessages {
    capacity: usize,
    entries: VecDeque<SwapMessage>,
}

impl RecentMessages {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: VecDeque::with_capacity(capacity),
        }
    }

    /// Records `msg`; false when it was already recorded.
    fn insert(&mut self, msg: &SwapMessage) -> bool {
        if self.entries.contains(msg) {
            return false;
        }
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(msg.clone());
        true
    }
}

impl SwapCoordinator {
    pub fn new(
        identity: ProcessIdentity,
        storage: StorageHandle,
        bus: Arc<dyn BroadcastBus>,
        storage_cfg: Arc<StorageConfig>,
        cfg: Arc<SwapConfig>,
    ) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            inner: Arc::new(CoordinatorInner {
                identity,
                storage,
                bus,
                storage_cfg,
                cfg,
                takeovers: Mutex::new(JoinSet::new()),
                recent: Mutex::new(RecentMessages::new(RECENT_MESSAGES)),
                shutdown_tx,
            }),
        }
    }

    pub fn identity(&self) -> &ProcessIdentity {
        &self.inner.identity
    }

    pub fn storage(&self) -> &StorageHandle {
        &self.inner.storage
    }

    /// Publishes a swap request naming a fresh, time-derived candidate.
    ///
    /// The message echoes back to this instance through its own listener, which is where the
    /// swap and the takeover actually happen.
    pub async fn request_swap(&self) -> Result<SwapMessage, SwapdbError> {
        let msg = SwapMessage::new(
            self.inner.identity.as_str(),
            candidate_name(&self.inner.cfg.candidate_prefix, Utc::now()),
        );
        let payload = msg.to_vec()?;
        msg.validate()
            .map_err(|e| SwapdbError::malformed(&payload, e))?;

        self.inner
            .bus
            .publish(&self.inner.cfg.channel, payload)
            .await
            .map_err(SwapdbError::Publish)?;

        info!(
            origin = %msg.origin_id,
            candidate = %msg.candidate_name,
            channel = %self.inner.cfg.channel,
            "Swap requested"
        );
        Ok(msg)
    }

    /// Runs one received payload through validate -> dedup -> replace -> self-check -> schedule.
    ///
    /// A message already accepted is dropped, so a redelivery never reopens a candidate the
    /// takeover has renamed away. Only fatal conditions are returned as `Err`: a failed
    /// replacement, or a malformed payload when `swap.fatal_on_malformed` is set.
    pub async fn handle_message(&self, payload: &[u8]) -> Result<SwapOutcome, SwapdbError> {
        let msg = match decode(payload) {
            Ok(msg) => msg,
            Err(e) if self.inner.cfg.fatal_on_malformed => return Err(e),
            Err(e) => {
                warn!(error = %e, "Dropping malformed swap message");
                return Ok(SwapOutcome::Dropped);
            }
        };

        if !self.remember(&msg) {
            warn!(
                origin = %msg.origin_id,
                candidate = %msg.candidate_name,
                "Dropping redelivered swap message"
            );
            return Ok(SwapOutcome::Dropped);
        }

        info!(
            origin = %msg.origin_id,
            candidate = %msg.candidate_name,
            "Swap message received"
        );

        let candidate = self.inner.storage_cfg.candidate_path(&msg.candidate_name);
        self.replace_storage(&candidate).await?;
        info!(path = %candidate.display(), "Storage connection swapped");

        if !self.inner.identity.is_origin_of(&msg.origin_id) {
            return Ok(SwapOutcome::Swapped { candidate });
        }
        if candidate == self.inner.storage.canonical_path() {
            warn!(
                path = %candidate.display(),
                "Candidate is the canonical file; nothing to take over"
            );
            return Ok(SwapOutcome::Swapped { candidate });
        }

        self.schedule_takeover(candidate.clone());
        Ok(SwapOutcome::TakeoverScheduled { candidate })
    }

    /// Subscribes to the swap channel and spawns the listener loop.
    ///
    /// The first subscription is attempted before returning, so a message published after
    /// this call resolves is seen by this instance. The task ends with `Ok` on shutdown and
    /// with `Err` on a fatal swap failure.
    pub async fn listen(&self) -> JoinHandle<Result<(), SwapdbError>> {
        let channel = self.inner.cfg.channel.as_str();
        let subscription = match self.inner.bus.subscribe(channel).await {
            Ok(sub) => Some(sub),
            Err(e) => {
                warn!(channel, error = %e, "Initial subscribe failed; will retry");
                None
            }
        };

        let this = self.clone();
        tokio::spawn(async move { this.run_listener(subscription).await })
    }

    /// Stops the listener, cancels takeovers still in their grace period and waits for
    /// any takeover already touching the filesystem.
    pub async fn shutdown(&self) {
        self.inner.shutdown_tx.send_replace(true);

        let mut takeovers = std::mem::take(&mut *self.lock_takeovers());
        while let Some(res) = takeovers.join_next().await {
            if let Err(e) = res {
                warn!(error = %e, "Takeover task failed");
            }
        }
        info!("Swap coordinator shut down");
    }

    /// Takeovers scheduled and not yet finished.
    pub fn pending_takeovers(&self) -> usize {
        let mut takeovers = self.lock_takeovers();
        while takeovers.try_join_next().is_some() {}
        takeovers.len()
    }

    async fn run_listener(self, mut subscription: Option<Subscription>) -> Result<(), SwapdbError> {
        let channel = self.inner.cfg.channel.as_str();
        let mut shutdown = self.inner.shutdown_tx.subscribe();

        loop {
            let mut sub = match subscription.take() {
                Some(sub) => sub,
                None => {
                    tokio::select! {
                        () = cancelled(&mut shutdown) => break,
                        () = tokio::time::sleep(self.inner.cfg.resubscribe_delay()) => {}
                    }
                    match self.inner.bus.subscribe(channel).await {
                        Ok(sub) => sub,
                        Err(e) => {
                            warn!(channel, error = %e, "Subscribe failed; will retry");
                            continue;
                        }
                    }
                }
            };

            loop {
                let item = tokio::select! {
                    () = cancelled(&mut shutdown) => {
                        info!(channel, "Swap listener stopped");
                        return Ok(());
                    }
                    item = sub.next() => item,
                };

                match item {
                    Some(Ok(payload)) => match self.handle_message(&payload).await {
                        Ok(_) => {}
                        Err(e) if e.is_fatal() => {
                            error!(channel, error = %e, "Fatal swap failure; listener exiting");
                            return Err(e);
                        }
                        Err(e) => warn!(channel, error = %e, "Swap message failed"),
                    },
                    Some(Err(e)) => warn!(channel, error = %e, "Receive failed"),
                    None => {
                        warn!(channel, "Subscription ended; re-subscribing");
                        break;
                    }
                }
            }
        }

        info!(channel, "Swap listener stopped");
        Ok(())
    }

    async fn replace_storage(&self, candidate: &Path) -> Result<(), SwapdbError> {
        let retry_policy = ConstantBuilder::default()
            .with_delay(self.inner.cfg.replace_retry_delay())
            .with_max_times(self.inner.cfg.replace_retry_times);

        (|| self.inner.storage.replace(candidate.to_path_buf()))
            .retry(retry_policy)
            .notify(|err: &StorageError, delay: Duration| {
                warn!(
                    path = %candidate.display(),
                    error = %err,
                    ?delay,
                    "Storage replace failed (will retry)"
                );
            })
            .await
            .map_err(|source| SwapdbError::ReplaceFailed {
                path: candidate.to_path_buf(),
                source,
            })
    }

    fn schedule_takeover(&self, candidate: PathBuf) {
        let takeover = Takeover::new(self.inner.storage.canonical_path(), candidate);
        let grace = self.inner.cfg.takeover_grace();
        let mut shutdown = self.inner.shutdown_tx.subscribe();

        info!(
            candidate = %takeover.candidate().display(),
            canonical = %takeover.canonical().display(),
            grace_ms = self.inner.cfg.takeover_grace_ms,
            "Takeover scheduled"
        );

        let mut takeovers = self.lock_takeovers();
        while takeovers.try_join_next().is_some() {}
        takeovers.spawn(async move {
            tokio::select! {
                () = cancelled(&mut shutdown) => {
                    info!(candidate = %takeover.candidate().display(), "Takeover cancelled by shutdown");
                }
                () = tokio::time::sleep(grace) => match takeover.run().await {
                    Ok(()) => info!(
                        canonical = %takeover.canonical().display(),
                        "Takeover complete"
                    ),
                    Err(e) => warn!(error = %e, "Takeover aborted"),
                },
            }
        });
    }

    fn remember(&self, msg: &SwapMessage) -> bool {
        self.inner
            .recent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(msg)
    }

    fn lock_takeovers(&self) -> std::sync::MutexGuard<'_, JoinSet<()>> {
        self.inner
            .takeovers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

fn decode(payload: &[u8]) -> Result<SwapMessage, SwapdbError> {
    let msg = SwapMessage::from_slice(payload).map_err(|e| SwapdbError::malformed(payload, e))?;
    msg.validate()
        .map_err(|e| SwapdbError::malformed(payload, e))?;
    Ok(msg)
}

/// Resolves once shutdown is requested; a dropped sender counts as shutdown.
async fn cancelled(rx: &mut watch::Receiver<bool>) {
    let _ = rx.wait_for(|stop| *stop).await;
}

/// Unique-per-epoch candidate name: `<prefix>-<unix micros>`.
fn candidate_name(prefix: &str, now: DateTime<Utc>) -> String {
    format!("{prefix}-{}", now.timestamp_micros())
}
