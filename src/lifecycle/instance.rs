//! Single-instance detection
//!
//! The IPC socket doubles as the instance lock: if something answers on it,
//! another daemon already owns the hotkey and the clipboard.

use std::path::Path;

use tokio::net::UnixStream;
use tracing::debug;

/// Whether this process may run the daemon
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstanceStatus {
    /// No other daemon answered; any socket file left behind is stale
    Primary,
    /// Another daemon is listening on the socket
    AlreadyRunning,
}

/// Probe the socket for a running daemon
pub async fn probe(socket_path: &Path) -> InstanceStatus {
    match UnixStream::connect(socket_path).await {
        Ok(_) => InstanceStatus::AlreadyRunning,
        Err(e) => {
            debug!(?e, ?socket_path, "no running instance");
            InstanceStatus::Primary
        }
    }
}
