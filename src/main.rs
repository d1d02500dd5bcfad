use clap::Parser;
use ratatosk::cache::ReplyCache;
use ratatosk::config::{Cli, Config};
use ratatosk::dispatch::Dispatcher;
use ratatosk::error::{RatatoskError, Result};
use ratatosk::providers;
use ratatosk::server::{ServerContext, run_tcp_server, run_udp_server};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let config = Config::from(Cli::parse());

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_directive()));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    if let Err(e) = run(config).await {
        error!("fatal error: {e}");
        std::process::exit(1);
    }
}

async fn run(config: Config) -> Result<()> {
    let (shutdown_tx, _) = broadcast::channel(1);

    let cache = Arc::new(ReplyCache::new(&config.cache));
    cache.spawn_janitor(shutdown_tx.subscribe());

    let dispatcher = Dispatcher::new();
    for provider in providers::all_providers(&config) {
        providers::start(provider, &dispatcher).await?;
    }

    info!(
        "ratatosk {} listening on {} UDP+TCP",
        env!("CARGO_PKG_VERSION"),
        config.bind
    );
    let ctx = ServerContext { cache, dispatcher };
    let mut udp = tokio::spawn(run_udp_server(config.bind, ctx.clone(), shutdown_tx.subscribe()));
    let mut tcp = tokio::spawn(run_tcp_server(config.bind, ctx, shutdown_tx.subscribe()));

    tokio::select! {
        _ = wait_for_signal() => {
            info!("shutdown signal received, stopping listeners");
            let _ = shutdown_tx.send(());
            let _ = tokio::join!(&mut udp, &mut tcp);
            Ok(())
        }
        // a listener returning early means it could not serve (e.g. bind failure)
        result = &mut udp => flatten_listener(result),
        result = &mut tcp => flatten_listener(result),
    }
}

fn flatten_listener(result: std::result::Result<Result<()>, tokio::task::JoinError>) -> Result<()> {
    match result {
        Ok(inner) => inner,
        Err(e) => Err(RatatoskError::ListenerFailed(e.to_string())),
    }
}

async fn wait_for_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        let mut sigterm = match signal(SignalKind::terminate()) {
            Ok(sigterm) => sigterm,
            Err(e) => {
                error!("cannot install SIGTERM handler: {e}");
                let _ = tokio::signal::ctrl_c().await;
                return;
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
