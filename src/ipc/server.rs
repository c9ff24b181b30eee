//! Unix domain socket server for IPC
//!
//! Lets the tray icon and options dialog query status, request a manual
//! convert, ask for a settings reload, and subscribe to trigger events.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::unix::OwnedReadHalf;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{broadcast, mpsc, oneshot, RwLock};
use tracing::{debug, error, info, warn};

use crate::events::TriggerEvent;
use crate::state::{Command, SequenceResult};

use super::protocol::{DaemonStatus, Request, Response, MAX_FRAME_LEN};

/// IPC Server handling client connections
pub struct Server {
    socket_path: PathBuf,
    listener: Option<UnixListener>,
    context: ClientContext,
    shutdown_tx: broadcast::Sender<()>,
}

/// Shared server state
struct ServerState {
    status: DaemonStatus,
    start_time: std::time::Instant,
}

/// Everything a client handler needs, cloned per connection
#[derive(Clone)]
struct ClientContext {
    state: Arc<RwLock<ServerState>>,
    command_tx: mpsc::Sender<Command>,
    event_tx: broadcast::Sender<TriggerEvent>,
}

/// A decoded frame, or the reason it could not be decoded
type Incoming = std::result::Result<Request, String>;

impl Server {
    /// Create a new IPC server
    pub fn new(
        socket_path: &Path,
        command_tx: mpsc::Sender<Command>,
        event_tx: broadcast::Sender<TriggerEvent>,
    ) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = socket_path.parent() {
            std::fs::create_dir_all(parent).context("failed to create socket directory")?;
        }

        // Remove stale socket if it exists
        if socket_path.exists() {
            std::fs::remove_file(socket_path).context("failed to remove stale socket")?;
        }

        let listener = UnixListener::bind(socket_path).context("failed to bind Unix socket")?;

        // Set socket permissions to owner-only (0600)
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(socket_path, std::fs::Permissions::from_mode(0o600))?;
        }

        let (shutdown_tx, _) = broadcast::channel(1);

        let state = Arc::new(RwLock::new(ServerState {
            status: DaemonStatus::default(),
            start_time: std::time::Instant::now(),
        }));

        info!(?socket_path, "IPC server listening");

        Ok(Self {
            socket_path: socket_path.to_owned(),
            listener: Some(listener),
            context: ClientContext {
                state,
                command_tx,
                event_tx,
            },
            shutdown_tx,
        })
    }

    /// Fold a trigger event into the status served to clients
    pub async fn apply_event(&self, event: &TriggerEvent) {
        let mut state = self.context.state.write().await;
        let was_active = state.status.hotkey_active;
        state.status.apply(event);

        if was_active != state.status.hotkey_active {
            info!(
                hotkey = ?state.status.hotkey,
                active = state.status.hotkey_active,
                "IPC server: hotkey status updated"
            );
        }
    }

    /// Run the server, accepting connections
    pub async fn run(&self) -> Result<()> {
        let listener = self.listener.as_ref().context("server not initialized")?;

        loop {
            match listener.accept().await {
                Ok((stream, _addr)) => {
                    debug!("client connected");
                    let context = self.context.clone();
                    let mut shutdown_rx = self.shutdown_tx.subscribe();

                    tokio::spawn(async move {
                        tokio::select! {
                            result = Self::handle_client(stream, context) => {
                                if let Err(e) = result {
                                    warn!(?e, "client handler error");
                                }
                            }
                            _ = shutdown_rx.recv() => {
                                debug!("client handler shutting down");
                            }
                        }
                    });
                }
                Err(e) => {
                    error!(?e, "accept error");
                }
            }
        }
    }

    /// Handle a single client connection.
    ///
    /// Frames are read on their own task so that pushing a notification
    /// never interrupts a half-read request.
    async fn handle_client(stream: UnixStream, context: ClientContext) -> Result<()> {
        let (reader, mut writer) = stream.into_split();
        let (incoming_tx, mut incoming_rx) = mpsc::channel::<Incoming>(8);
        let reader_task = tokio::spawn(Self::read_requests(reader, incoming_tx));

        let mut events: Option<broadcast::Receiver<TriggerEvent>> = None;

        loop {
            tokio::select! {
                incoming = incoming_rx.recv() => {
                    let Some(incoming) = incoming else { break };

                    let response = match incoming {
                        Ok(request) => {
                            debug!(?request, "received request");
                            let (response, subscribe) =
                                Self::process_request(request, &context).await;
                            if subscribe && events.is_none() {
                                events = Some(context.event_tx.subscribe());
                                debug!("client subscribed to notifications");
                            }
                            response
                        }
                        Err(message) => Response::Error {
                            code: "bad_request".into(),
                            message,
                        },
                    };

                    send_message(&mut writer, &response).await?;
                }
                event = next_event(&mut events) => match event {
                    Ok(event) => {
                        send_message(&mut writer, &Response::Notification { event }).await?;
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(skipped = n, "subscriber lagged, notifications dropped");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        events = None;
                    }
                },
            }
        }

        reader_task.await.context("request reader panicked")?
    }

    /// Read length-prefixed requests until the client disconnects
    async fn read_requests(mut reader: OwnedReadHalf, incoming_tx: mpsc::Sender<Incoming>) -> Result<()> {
        loop {
            let body = match read_frame(&mut reader).await? {
                Some(body) => body,
                None => {
                    debug!("client disconnected");
                    return Ok(());
                }
            };

            let incoming = serde_json::from_slice::<Request>(&body).map_err(|e| {
                warn!(?e, "failed to parse request");
                e.to_string()
            });

            if incoming_tx.send(incoming).await.is_err() {
                return Ok(());
            }
        }
    }

    /// Process a request and return a response
    /// Returns (Response, should_subscribe)
    async fn process_request(request: Request, context: &ClientContext) -> (Response, bool) {
        match request {
            Request::Ping => (Response::Pong, false),

            Request::GetStatus => {
                let mut state = context.state.write().await;
                state.status.uptime_secs = state.start_time.elapsed().as_secs();
                (Response::Status(state.status.clone()), false)
            }

            Request::Convert => {
                let (reply, result) = oneshot::channel();
                if context.command_tx.send(Command::Convert { reply }).await.is_err() {
                    return (unavailable(), false);
                }
                match result.await {
                    Ok(SequenceResult::Completed { outcome, .. }) => {
                        info!(%outcome, "manual convert via IPC");
                        (Response::Converted { outcome: Some(outcome) }, false)
                    }
                    Ok(SequenceResult::Ignored) => (Response::Converted { outcome: None }, false),
                    Err(_) => (unavailable(), false),
                }
            }

            Request::Reload => {
                let (reply, result) = oneshot::channel();
                if context.command_tx.send(Command::Reload { reply }).await.is_err() {
                    return (unavailable(), false);
                }
                match result.await {
                    Ok(Ok(hotkey)) => (
                        Response::Reloaded {
                            hotkey: Some(hotkey),
                            error: None,
                        },
                        false,
                    ),
                    Ok(Err(e)) => (
                        Response::Reloaded {
                            hotkey: None,
                            error: Some(e.to_string()),
                        },
                        false,
                    ),
                    Err(_) => (unavailable(), false),
                }
            }

            Request::Subscribe => (Response::Subscribed, true),
        }
    }

    /// Gracefully shutdown the server
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());

        // Remove socket file
        if self.socket_path.exists() {
            if let Err(e) = std::fs::remove_file(&self.socket_path) {
                warn!(?e, "failed to remove socket file");
            }
        }

        info!("IPC server shutdown complete");
    }
}

fn unavailable() -> Response {
    Response::Error {
        code: "unavailable".into(),
        message: "state machine is not running".into(),
    }
}

/// Wait for the next notification, or forever when not subscribed
async fn next_event(
    events: &mut Option<broadcast::Receiver<TriggerEvent>>,
) -> std::result::Result<TriggerEvent, broadcast::error::RecvError> {
    match events {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

/// Read one frame body; `None` on a clean disconnect or an oversized frame
pub async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Option<Vec<u8>>> {
    // Read message length (4-byte little-endian)
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }

    let len = u32::from_le_bytes(len_buf) as usize;
    if len > MAX_FRAME_LEN {
        warn!(len, "message too large, disconnecting");
        return Ok(None);
    }

    let mut body = vec![0u8; len];
    reader.read_exact(&mut body).await?;
    Ok(Some(body))
}

/// Send a length-prefixed JSON message
pub async fn send_message<W: AsyncWrite + Unpin, T: serde::Serialize>(
    writer: &mut W,
    msg: &T,
) -> Result<()> {
    let msg_bytes = serde_json::to_vec(msg)?;
    let msg_len = (msg_bytes.len() as u32).to_le_bytes();

    writer.write_all(&msg_len).await?;
    writer.write_all(&msg_bytes).await?;

    Ok(())
}
