//! Node lifecycles: build the service, start its background loop, serve
//! HTTP until a shutdown signal arrives.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use tokio::net::TcpListener;
use tracing::{info, warn};
use twinledger_authority::AuthorityService;
use twinledger_executor::ExecutorService;
use twinledger_types::{AuthorityApi, AuthorityConfig, ExecutorConfig, Result};

use crate::authority::authority_router;
use crate::client::AuthorityClient;
use crate::executor::executor_router;

/// Intervals of zero would make `tokio::time::interval` panic.
fn period(secs: u64) -> Duration {
    Duration::from_secs(secs.max(1))
}

/// Run an Authority node.
pub async fn run_authority(config: AuthorityConfig) -> Result<()> {
    let service = Arc::new(AuthorityService::from_config(&config)?);
    let sweeper = Arc::clone(&service).spawn_expiry_sweeper(period(config.sweep_interval_secs));

    let served = serve(config.listen_addr, authority_router(service), "authority").await;
    sweeper.abort();
    served
}

/// Run an Executor node against the Authority at `config.authority_url`.
pub async fn run_executor(config: ExecutorConfig) -> Result<()> {
    let authority = AuthorityClient::new(
        &config.authority_url,
        Duration::from_millis(config.request_timeout_ms),
    )?;
    let service = Arc::new(ExecutorService::from_config(
        &config,
        Arc::new(authority) as Arc<dyn AuthorityApi>,
    )?);
    info!(authority = %config.authority_url, "executor connected to authority");
    let settler = Arc::clone(&service).spawn_settle_loop(period(config.settle_interval_secs));

    let served = serve(config.listen_addr, executor_router(service), "executor").await;
    settler.abort();
    served
}

async fn serve(addr: SocketAddr, router: Router, role: &str) -> Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!(role, addr = %addr, "listening");
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!(role, "shut down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "cannot listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("received Ctrl+C, shutting down"),
        () = terminate => info!("received SIGTERM, shutting down"),
    }
}
