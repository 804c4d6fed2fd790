//! Accepts connections on a single task and hands each to an independently
//! scheduled worker — one tokio task per chain, sharing no mutable state
//! with any other chain.

use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::{error, info, warn};

use stego_core::codec::{CoverPool, StegoCodec};
use stego_core::config::Config;

use crate::client::ClientHandler;
use crate::server::ServerHandler;

/// Runs the stego-client's browser-facing listener until the process is
/// asked to shut down.
pub async fn run_client(config: Arc<Config>, codec: Arc<dyn StegoCodec>, covers: Arc<CoverPool>) -> std::io::Result<()> {
    let listener = TcpListener::bind(config.listen_addr).await?;
    info!(addr = %config.listen_addr, "stego-client listening");
    let handler = ClientHandler::new(config, codec, covers);

    loop {
        let (socket, peer) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                warn!(error = %e, "accept failed");
                continue;
            }
        };
        let handler = handler.clone();
        tokio::spawn(async move {
            info!(peer = %peer, "accepted browser connection");
            handler.handle(socket).await;
        });
    }
}

/// Runs the stego-server's internet-facing listener until the process is
/// asked to shut down.
pub async fn run_server(config: Arc<Config>, codec: Arc<dyn StegoCodec>, covers: Arc<CoverPool>) -> std::io::Result<()> {
    let listener = TcpListener::bind(config.listen_addr).await?;
    info!(addr = %config.listen_addr, "stego-server listening");
    let handler = ServerHandler::new(config, codec, covers);

    loop {
        let (socket, peer) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                error!(error = %e, "accept failed");
                continue;
            }
        };
        let handler = handler.clone();
        tokio::spawn(async move {
            info!(peer = %peer, "accepted stego-client connection");
            handler.handle(socket).await;
        });
    }
}
