use mimalloc::MiMalloc;
use std::{future::IntoFuture, net::SocketAddr, sync::Arc};
use swapdb::{
    ProcessIdentity, StorageHandle, SwapCoordinator, bus,
    config::Config,
    server::{AppState, swapdb_router},
};
use tokio::{net::TcpListener, signal, sync::watch};
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};
#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cfg = Config::load()?;

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(cfg.basic.loglevel.clone()));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            tracing_subscriber::fmt::layer()
                .compact()
                .with_level(true)
                .with_target(false),
        )
        .init();

    let identity = ProcessIdentity::generate();
    info!(
        identity = %identity,
        listen_addr = %cfg.basic.listen_addr,
        listen_port = cfg.basic.listen_port,
        loglevel = %cfg.basic.loglevel,
        canonical_path = %cfg.storage.canonical_path().display(),
        busy_timeout_ms = cfg.storage.busy_timeout_ms,
        open_retry_times = cfg.storage.open_retry_times,
        prepare_retry_times = cfg.storage.prepare_retry_times,
        bus = ?cfg.swap.bus,
        channel = %cfg.swap.channel,
        takeover_grace_ms = cfg.swap.takeover_grace_ms,
        fatal_on_malformed = cfg.swap.fatal_on_malformed,
        "swapdb starting"
    );

    let storage_cfg = Arc::new(cfg.storage.clone());
    let swap_cfg = Arc::new(cfg.swap.clone());

    // No storage means nothing to serve: exit and let the supervisor restart us.
    let storage = StorageHandle::open(storage_cfg.canonical_path(), storage_cfg.clone())
        .await
        .inspect_err(|e| error!(error = %e, "Storage open failed"))?;
    let bus = bus::connect(&swap_cfg)
        .await
        .inspect_err(|e| error!(error = %e, "Broadcast bus connect failed"))?;

    let coordinator = SwapCoordinator::new(identity, storage.clone(), bus, storage_cfg, swap_cfg);
    let mut listener_task = coordinator.listen().await;

    let app = swapdb_router(AppState::new(coordinator.clone()));
    let addr = SocketAddr::from((cfg.basic.listen_addr, cfg.basic.listen_port));
    let listener = TcpListener::bind(addr).await?;
    info!("HTTP server listening on {}", addr);

    let (stop_tx, mut stop_rx) = watch::channel(false);
    let server = axum::serve(listener, app).with_graceful_shutdown(async move {
        shutdown_signal().await;
        info!("Gracefully shutting down...");
        stop_tx.send_replace(true);
    });
    let drain_timeout = cfg.basic.shutdown_timeout();
    let drain_deadline = async move {
        let _ = stop_rx.wait_for(|stop| *stop).await;
        tokio::time::sleep(drain_timeout).await;
    };

    let outcome: Result<(), Box<dyn std::error::Error>> = tokio::select! {
        res = server.into_future() => res.map_err(Into::into),
        () = drain_deadline => {
            warn!(timeout = ?drain_timeout, "Drain timeout elapsed; dropping open connections");
            Ok(())
        }
        res = &mut listener_task => match res {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(e.into()),
            Err(e) => Err(e.into()),
        },
    };

    info!("Running cleanup tasks...");
    coordinator.shutdown().await;
    if !listener_task.is_finished() {
        let _ = listener_task.await;
    }
    if let Err(e) = storage.close().await {
        warn!(error = %e, "Storage close failed");
    }

    match &outcome {
        Ok(()) => info!("Server has shut down gracefully."),
        Err(e) => error!(error = %e, "Exiting after fatal error"),
    }
    outcome
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
