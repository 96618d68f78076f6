//! TCP accept loop.

use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::{error, info};

use crate::connection;
use crate::dispatch::Server;

/// Binds the configured address and serves connections until the
/// process exits.
pub async fn run(server: Arc<Server>) -> Result<(), Box<dyn std::error::Error>> {
    let addr = server.config.listen_addr();
    let listener = TcpListener::bind(&addr).await?;
    info!(
        "listening on {addr} with {} databases (append-only: {})",
        server.store.db_count(),
        server.config.append_only
    );

    loop {
        let (stream, peer) = listener.accept().await?;
        let server = Arc::clone(&server);

        tokio::spawn(async move {
            if let Err(e) = connection::handle(stream, server).await {
                error!("connection error from {peer}: {e}");
            }
        });
    }
}
