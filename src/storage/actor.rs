use super::ops::{open_pool, read_record};
use crate::config::StorageConfig;
use crate::error::StorageError;
use ractor::{Actor, ActorProcessingErr, ActorRef, RpcReplyPort};
use sqlx::SqlitePool;
use std::{
    path::{Path, PathBuf},
    sync::Arc,
};
use tracing::{info, warn};

#[derive(Debug)]
pub(crate) enum StorageMessage {
    /// Point lookup; `None` when the key is absent.
    Read(i64, RpcReplyPort<Result<Option<String>, StorageError>>),

    /// Close the live connection and serve the given file instead.
    Replace(PathBuf, RpcReplyPort<Result<(), StorageError>>),

    /// Physical file the live connection points at.
    ActivePath(RpcReplyPort<PathBuf>),

    /// Close the live connection and stop the actor.
    Close(RpcReplyPort<()>),
}

/// Cloneable handle to the process-wide storage actor.
///
/// Every operation is a message, so reads and replacements are applied strictly one at a
/// time: a read can never run against a connection that a replacement is closing.
#[derive(Clone)]
pub struct StorageHandle {
    actor: ActorRef<StorageMessage>,
    canonical_path: Arc<Path>,
}

impl StorageHandle {
    /// Opens (creating if absent) the canonical database and spawns the owning actor.
    ///
    /// Blocks through the bounded setup retry; `StorageError::OpenExhausted` means the file
    /// stayed locked for the whole budget.
    pub async fn open(
        canonical_path: impl Into<PathBuf>,
        cfg: Arc<StorageConfig>,
    ) -> Result<Self, StorageError> {
        let canonical_path = canonical_path.into();
        if let Some(parent) = canonical_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let pool = open_pool(&canonical_path, &cfg).await?;
        let (actor, _jh) = Actor::spawn(
            None,
            StorageActor,
            StorageArgs {
                canonical_path: canonical_path.clone(),
                pool,
                cfg,
            },
        )
        .await
        .map_err(|e| StorageError::Actor(format!("StorageActor spawn failed: {e}")))?;

        Ok(Self {
            actor,
            canonical_path: Arc::from(canonical_path),
        })
    }

    /// Name candidates are promoted to; fixed for the lifetime of the handle.
    pub fn canonical_path(&self) -> &Path {
        &self.canonical_path
    }

    pub async fn read(&self, key: i64) -> Result<Option<String>, StorageError> {
        ractor::call!(self.actor, StorageMessage::Read, key)
            .map_err(|e| StorageError::Actor(format!("StorageActor Read RPC failed: {e}")))?
    }

    pub async fn replace(&self, path: PathBuf) -> Result<(), StorageError> {
        ractor::call!(self.actor, StorageMessage::Replace, path)
            .map_err(|e| StorageError::Actor(format!("StorageActor Replace RPC failed: {e}")))?
    }

    pub async fn active_path(&self) -> Result<PathBuf, StorageError> {
        ractor::call!(self.actor, StorageMessage::ActivePath)
            .map_err(|e| StorageError::Actor(format!("StorageActor ActivePath RPC failed: {e}")))
    }

    /// Releases the connection. Intended to run once at shutdown; later calls fail with
    /// `StorageError::Actor` because the actor is gone.
    pub async fn close(&self) -> Result<(), StorageError> {
        ractor::call!(self.actor, StorageMessage::Close)
            .map_err(|e| StorageError::Actor(format!("StorageActor Close RPC failed: {e}")))
    }
}

struct StorageArgs {
    canonical_path: PathBuf,
    pool: SqlitePool,
    cfg: Arc<StorageConfig>,
}

struct StorageActorState {
    active_path: PathBuf,
    pool: SqlitePool,
    cfg: Arc<StorageConfig>,
}

struct StorageActor;

#[ractor::async_trait]
impl Actor for StorageActor {
    type Msg = StorageMessage;
    type State = StorageActorState;
    type Arguments = StorageArgs;

    async fn pre_start(
        &self,
        _myself: ActorRef<Self::Msg>,
        args: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        info!(path = %args.canonical_path.display(), "StorageActor initialized");
        Ok(StorageActorState {
            active_path: args.canonical_path,
            pool: args.pool,
            cfg: args.cfg,
        })
    }

    async fn handle(
        &self,
        myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            StorageMessage::Read(key, reply) => {
                let res = read_record(&state.pool, key, &state.cfg).await;
                let _ = reply.send(res);
            }
            StorageMessage::Replace(path, reply) => {
                let res = self.replace(state, path).await;
                let _ = reply.send(res);
            }
            StorageMessage::ActivePath(reply) => {
                let _ = reply.send(state.active_path.clone());
            }
            StorageMessage::Close(reply) => {
                state.pool.close().await;
                info!(path = %state.active_path.display(), "Storage closed");
                let _ = reply.send(());
                myself.stop(Some("storage closed".to_string()));
            }
        }
        Ok(())
    }

    async fn post_stop(
        &self,
        _myself: ActorRef<Self::Msg>,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        if !state.pool.is_closed() {
            state.pool.close().await;
        }
        Ok(())
    }
}

impl StorageActor {
    async fn replace(
        &self,
        state: &mut StorageActorState,
        path: PathBuf,
    ) -> Result<(), StorageError> {
        info!(
            from = %state.active_path.display(),
            to = %path.display(),
            "Replacing storage connection"
        );

        state.pool.close().await;
        match open_pool(&path, &state.cfg).await {
            Ok(pool) => {
                state.pool = pool;
                state.active_path = path;
                Ok(())
            }
            Err(e) => {
                warn!(
                    path = %path.display(),
                    error = %e,
                    "Replacement open failed; no live connection"
                );
                Err(e)
            }
        }
    }
}
