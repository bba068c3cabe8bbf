use std::{future::Future, path::Path, sync::Arc, time::Duration};
use swapdb::bus::{BroadcastBus, LocalBus};
use swapdb::config::{StorageConfig, SwapConfig};
use swapdb::error::IsFatal;
use swapdb::{ProcessIdentity, StorageHandle, SwapCoordinator, SwapOutcome, SwapdbError};
use swapdb_schema::SwapMessage;

const CHANNEL: &str = "update-data";

fn storage_cfg(dir: &Path) -> Arc<StorageConfig> {
    Arc::new(StorageConfig {
        data_dir: dir.to_path_buf(),
        db_name: "data".to_string(),
        busy_timeout_ms: 200,
        ..StorageConfig::default()
    })
}

fn swap_cfg(grace_ms: u64) -> SwapConfig {
    SwapConfig {
        channel: CHANNEL.to_string(),
        takeover_grace_ms: grace_ms,
        resubscribe_delay_ms: 50,
        ..SwapConfig::default()
    }
}

async fn node(
    identity: &str,
    dir: &Path,
    bus: Arc<dyn BroadcastBus>,
    cfg: SwapConfig,
) -> SwapCoordinator {
    let storage_cfg = storage_cfg(dir);
    let storage = StorageHandle::open(storage_cfg.canonical_path(), storage_cfg.clone())
        .await
        .unwrap();
    SwapCoordinator::new(
        ProcessIdentity::from(identity),
        storage,
        bus,
        storage_cfg,
        Arc::new(cfg),
    )
}

fn message(origin: &str, candidate: &str) -> Vec<u8> {
    SwapMessage::new(origin, candidate).to_vec().unwrap()
}

/// Polls `check` every 50ms for up to five seconds.
async fn eventually<F, Fut>(what: &str, mut check: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..100 {
        if check().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("timed out waiting for {what}");
}

#[tokio::test]
async fn own_message_swaps_and_promotes_candidate() {
    let dir = tempfile::tempdir().unwrap();
    let x = node("X", dir.path(), Arc::new(LocalBus::new()), swap_cfg(100)).await;
    let canonical = x.storage().canonical_path().to_path_buf();
    let candidate = dir.path().join("new-1.db");

    let outcome = x.handle_message(&message("X", "new-1")).await.unwrap();

    assert_eq!(
        outcome,
        SwapOutcome::TakeoverScheduled {
            candidate: candidate.clone()
        }
    );
    assert_eq!(x.pending_takeovers(), 1);
    assert_eq!(
        x.storage().read(1).await.unwrap(),
        Some(candidate.display().to_string())
    );

    eventually("candidate promotion", || {
        let candidate = candidate.clone();
        async move { !candidate.exists() }
    })
    .await;

    assert!(canonical.exists());
    assert_eq!(x.pending_takeovers(), 0);
    // the open connection follows the renamed inode
    assert_eq!(
        x.storage().read(1).await.unwrap(),
        Some(candidate.display().to_string())
    );

    x.shutdown().await;
    x.storage().close().await.unwrap();
}

#[tokio::test]
async fn duplicate_delivery_in_grace_period_is_applied_once() {
    let dir = tempfile::tempdir().unwrap();
    let x = node("X", dir.path(), Arc::new(LocalBus::new()), swap_cfg(60_000)).await;
    let payload = message("X", "new-1");

    let first = x.handle_message(&payload).await.unwrap();
    let second = x.handle_message(&payload).await.unwrap();

    assert!(matches!(first, SwapOutcome::TakeoverScheduled { .. }));
    assert_eq!(second, SwapOutcome::Dropped);
    assert_eq!(x.pending_takeovers(), 1);

    x.shutdown().await;
    x.storage().close().await.unwrap();
}

#[tokio::test]
async fn redelivery_after_takeover_keeps_promoted_file() {
    let dir = tempfile::tempdir().unwrap();
    let x = node("X", dir.path(), Arc::new(LocalBus::new()), swap_cfg(100)).await;
    let canonical = x.storage().canonical_path().to_path_buf();
    let candidate = dir.path().join("new-1.db");
    let payload = message("X", "new-1");

    x.handle_message(&payload).await.unwrap();
    eventually("candidate promotion", || {
        let candidate = candidate.clone();
        async move { !candidate.exists() }
    })
    .await;

    let outcome = x.handle_message(&payload).await.unwrap();

    assert_eq!(outcome, SwapOutcome::Dropped);
    assert_eq!(x.pending_takeovers(), 0);
    assert!(!candidate.exists());
    assert!(canonical.exists());
    assert_eq!(x.storage().active_path().await.unwrap(), candidate);
    // still served from the promoted file, which carries the candidate's seed
    assert_eq!(
        x.storage().read(1).await.unwrap(),
        Some(candidate.display().to_string())
    );

    x.shutdown().await;
    x.storage().close().await.unwrap();
}

#[tokio::test]
async fn same_candidate_from_another_origin_is_a_new_message() {
    let dir = tempfile::tempdir().unwrap();
    let y = node("Y", dir.path(), Arc::new(LocalBus::new()), swap_cfg(50)).await;

    let from_x = y.handle_message(&message("X", "new-1")).await.unwrap();
    let from_z = y.handle_message(&message("Z", "new-1")).await.unwrap();

    assert!(matches!(from_x, SwapOutcome::Swapped { .. }));
    assert!(matches!(from_z, SwapOutcome::Swapped { .. }));

    y.storage().close().await.unwrap();
}

#[tokio::test]
async fn peer_message_swaps_without_takeover() {
    let dir = tempfile::tempdir().unwrap();
    let y = node("Y", dir.path(), Arc::new(LocalBus::new()), swap_cfg(50)).await;
    let canonical = y.storage().canonical_path().to_path_buf();
    let candidate = dir.path().join("new-1.db");

    let outcome = y.handle_message(&message("X", "new-1")).await.unwrap();

    assert_eq!(
        outcome,
        SwapOutcome::Swapped {
            candidate: candidate.clone()
        }
    );
    assert_eq!(y.pending_takeovers(), 0);
    assert_eq!(y.storage().active_path().await.unwrap(), candidate);

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(canonical.exists());
    assert!(candidate.exists());

    y.storage().close().await.unwrap();
}

#[tokio::test]
async fn candidate_equal_to_canonical_is_not_taken_over() {
    let dir = tempfile::tempdir().unwrap();
    let x = node("X", dir.path(), Arc::new(LocalBus::new()), swap_cfg(50)).await;
    let canonical = x.storage().canonical_path().to_path_buf();

    let outcome = x.handle_message(&message("X", "data")).await.unwrap();

    assert_eq!(outcome, SwapOutcome::Swapped { candidate: canonical });
    assert_eq!(x.pending_takeovers(), 0);

    x.storage().close().await.unwrap();
}

#[tokio::test]
async fn malformed_messages_are_dropped_by_default() {
    let dir = tempfile::tempdir().unwrap();
    let x = node("X", dir.path(), Arc::new(LocalBus::new()), swap_cfg(50)).await;
    let canonical = x.storage().canonical_path().to_path_buf();

    for payload in [
        b"not json".to_vec(),
        br#"{"id":"X"}"#.to_vec(),
        message("X", "../escape"),
        message("X", ""),
    ] {
        assert_eq!(
            x.handle_message(&payload).await.unwrap(),
            SwapOutcome::Dropped
        );
    }

    assert_eq!(x.storage().active_path().await.unwrap(), canonical);
    assert!(!dir.path().parent().unwrap().join("escape.db").exists());

    x.storage().close().await.unwrap();
}

#[tokio::test]
async fn malformed_message_is_fatal_when_configured() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = SwapConfig {
        fatal_on_malformed: true,
        ..swap_cfg(50)
    };
    let x = node("X", dir.path(), Arc::new(LocalBus::new()), cfg).await;

    let err = x.handle_message(b"garbage").await.unwrap_err();

    assert!(matches!(err, SwapdbError::MalformedMessage { .. }));
    assert!(err.is_fatal());

    x.storage().close().await.unwrap();
}

#[tokio::test]
async fn shutdown_cancels_takeover_in_grace_period() {
    let dir = tempfile::tempdir().unwrap();
    let x = node("X", dir.path(), Arc::new(LocalBus::new()), swap_cfg(60_000)).await;
    let canonical = x.storage().canonical_path().to_path_buf();
    let candidate = dir.path().join("new-1.db");

    x.handle_message(&message("X", "new-1")).await.unwrap();
    assert_eq!(x.pending_takeovers(), 1);

    tokio::time::timeout(Duration::from_secs(2), x.shutdown())
        .await
        .expect("shutdown must not wait out the grace period");

    assert_eq!(x.pending_takeovers(), 0);
    assert!(canonical.exists());
    assert!(candidate.exists());

    x.storage().close().await.unwrap();
}

#[tokio::test]
async fn swap_request_reaches_every_listener() {
    let bus = LocalBus::new();
    let dir_x = tempfile::tempdir().unwrap();
    let dir_y = tempfile::tempdir().unwrap();
    let x = node("X", dir_x.path(), Arc::new(bus.clone()), swap_cfg(100)).await;
    let y = node("Y", dir_y.path(), Arc::new(bus.clone()), swap_cfg(100)).await;
    let listener_x = x.listen().await;
    let listener_y = y.listen().await;

    let msg = x.request_swap().await.unwrap();
    assert_eq!(msg.origin_id, "X");
    assert!(msg.candidate_name.starts_with("new-"));

    let candidate_x = dir_x.path().join(format!("{}.db", msg.candidate_name));
    let candidate_y = dir_y.path().join(format!("{}.db", msg.candidate_name));

    eventually("both instances to swap", || {
        let (x, y) = (x.clone(), y.clone());
        let (cx, cy) = (candidate_x.clone(), candidate_y.clone());
        async move {
            x.storage().active_path().await.unwrap() == cx
                && y.storage().active_path().await.unwrap() == cy
        }
    })
    .await;

    // only the originator promotes its candidate
    eventually("originator takeover", || {
        let cx = candidate_x.clone();
        async move { !cx.exists() }
    })
    .await;
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(candidate_y.exists());

    x.shutdown().await;
    y.shutdown().await;
    assert!(listener_x.await.unwrap().is_ok());
    assert!(listener_y.await.unwrap().is_ok());
    x.storage().close().await.unwrap();
    y.storage().close().await.unwrap();
}

#[tokio::test]
async fn listener_survives_malformed_payloads() {
    let bus = LocalBus::new();
    let dir = tempfile::tempdir().unwrap();
    let y = node("Y", dir.path(), Arc::new(bus.clone()), swap_cfg(50)).await;
    let listener = y.listen().await;

    bus.publish(CHANNEL, b"{broken".to_vec()).await.unwrap();
    bus.publish(CHANNEL, message("X", "new-7")).await.unwrap();

    let candidate = dir.path().join("new-7.db");
    eventually("swap after malformed payload", || {
        let (y, candidate) = (y.clone(), candidate.clone());
        async move { y.storage().active_path().await.unwrap() == candidate }
    })
    .await;
    assert!(!listener.is_finished());

    y.shutdown().await;
    assert!(listener.await.unwrap().is_ok());
    y.storage().close().await.unwrap();
}

#[tokio::test]
async fn failed_replacement_stops_the_listener() {
    let bus = LocalBus::new();
    let dir = tempfile::tempdir().unwrap();
    let y = node("Y", dir.path(), Arc::new(bus.clone()), swap_cfg(50)).await;
    let listener = y.listen().await;

    y.storage().close().await.unwrap();
    bus.publish(CHANNEL, message("X", "new-9")).await.unwrap();

    let res = tokio::time::timeout(Duration::from_secs(5), listener)
        .await
        .expect("listener must exit")
        .unwrap();

    let err = res.unwrap_err();
    assert!(matches!(err, SwapdbError::ReplaceFailed { .. }));
    assert!(err.is_fatal());
}
