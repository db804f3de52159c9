//! The accept loop.

use crate::{connection::handle_connection, state::AppState};
use anyhow::Result;
use std::{sync::Arc, time::Duration};
use tokio::{net::TcpListener, task::JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Accepts connections until `shutdown` is cancelled, running each one on
/// its own task.
///
/// Cancelling `shutdown` stops the accept loop. Connections that are idle or
/// mid-turn exit at once and drop the unfinished turn. A connection already
/// writing a reply finishes that frame. The configured grace period bounds
/// how long the server waits for those writes before aborting the rest.
pub async fn serve(
    listener: TcpListener,
    state: Arc<AppState>,
    shutdown: CancellationToken,
) -> Result<()> {
    let mut connections = JoinSet::new();
    info!(address = %listener.local_addr()?, "Listening for connections");

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            Some(finished) = connections.join_next(), if !connections.is_empty() => {
                if let Err(e) = finished {
                    warn!(error = %e, "Connection task failed");
                }
            }
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    if let Err(e) = stream.set_nodelay(true) {
                        warn!(%peer, error = %e, "Failed to set TCP_NODELAY");
                    }
                    connections.spawn(handle_connection(
                        stream,
                        peer.to_string(),
                        state.clone(),
                        shutdown.clone(),
                    ));
                }
                Err(e) => {
                    warn!(error = %e, "Failed to accept connection");
                    tokio::time::sleep(Duration::from_millis(100)).await;
                }
            },
        }
    }

    info!(open_connections = connections.len(), "Stopped accepting connections, draining");
    let drain = async { while connections.join_next().await.is_some() {} };
    if tokio::time::timeout(state.config.shutdown_grace, drain)
        .await
        .is_err()
    {
        warn!(
            open_connections = connections.len(),
            "Connections still open after the shutdown grace period, aborting"
        );
        connections.shutdown().await;
    }
    Ok(())
}
