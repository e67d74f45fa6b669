//! Web dashboard for the tracker orchestrator.
//!
//! Loopback-local HTTP API over the plan store plus SSE log tailing and
//! detached worker spawning. No authentication; the listener binds 127.0.0.1
//! only.

mod routes;
mod sse;
mod state;

pub use state::AppState;

use std::net::{Ipv4Addr, SocketAddr};

use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use tracker_core::Result;
use tracker_engine::children;

/// Serve the dashboard until shutdown.
///
/// SIGINT is advisory: the first Ctrl+C is refused while spawned workers are
/// still alive (they are detached and keep running either way); a second
/// Ctrl+C exits immediately. SIGTERM exits immediately.
pub async fn serve(state: AppState, port: u16) -> Result<()> {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = routes::router(state).layer(cors);

    let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "dashboard listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        let mut sigterm = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
        {
            Ok(s) => s,
            Err(e) => {
                warn!(error = %e, "failed to install SIGTERM handler");
                let _ = tokio::signal::ctrl_c().await;
                return;
            }
        };

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                let live = children::live_count();
                if live == 0 {
                    return;
                }
                eprintln!(
                    "{live} spawned worker(s) still running; they are detached and will \
                     continue in the background. Press Ctrl+C again to exit."
                );
                let _ = tokio::signal::ctrl_c().await;
            }
            _ = sigterm.recv() => {
                info!("received SIGTERM, shutting down");
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
