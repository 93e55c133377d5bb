use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::net::{TcpListener, UnixListener};
use tracing::{info, warn};

use crate::error::HubError;
use crate::hub::Hub;

/// Accept loop for local UI clients connecting over the Hub's Unix domain
/// socket. Binds `path`, removing any stale socket file left behind by an
/// unclean previous exit, and hands every accepted connection to
/// [`Hub::accept_local`].
pub async fn serve_unix(hub: Arc<Hub>, path: &Path) -> Result<(), HubError> {
    if path.exists() {
        let _ = std::fs::remove_file(path);
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| HubError::Connect(e.to_string()))?;
    }
    let listener = UnixListener::bind(path).map_err(|e| HubError::Connect(e.to_string()))?;
    info!(path = %path.display(), "listening for local clients");

    loop {
        match listener.accept().await {
            Ok((stream, _addr)) => {
                let hub = Arc::clone(&hub);
                tokio::spawn(async move { hub.accept_local(stream).await });
            }
            Err(e) => warn!(error = %e, "failed to accept local connection"),
        }
    }
}

/// Optional TCP listener for local clients, for setups where a Unix socket
/// isn't convenient (e.g. a UI running inside a container without a shared
/// mount).
pub async fn serve_tcp(hub: Arc<Hub>, addr: &str) -> Result<(), HubError> {
    let listener = TcpListener::bind(addr).await.map_err(|e| HubError::Connect(e.to_string()))?;
    info!(%addr, "listening for local TCP clients");

    loop {
        match listener.accept().await {
            Ok((stream, _addr)) => {
                let hub = Arc::clone(&hub);
                tokio::spawn(async move { hub.accept_local(stream).await });
            }
            Err(e) => warn!(error = %e, "failed to accept local TCP connection"),
        }
    }
}

/// Best-effort cleanup of the Unix socket file on shutdown.
pub fn unlink(path: &PathBuf) {
    if path.exists() {
        let _ = std::fs::remove_file(path);
    }
}
