//! puretext-daemon: turns clipboard contents into plain text on a global hotkey
//!
//! This daemon runs in the background and provides:
//! - Global hotkey registration via `global-hotkey`
//! - Clipboard normalization to plain Unicode text
//! - Optional Ctrl+V replay into the focused window
//! - IPC server for the tray icon and options dialog (status, convert,
//!   reload, trigger notifications)

mod clipboard;
mod config;
mod events;
mod hotkey;
mod ipc;
mod lifecycle;
mod replay;
mod state;

use std::sync::Arc;

use anyhow::Result;
use tokio::sync::{broadcast, mpsc};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::clipboard::{ClipboardNormalizer, SystemClipboard};
use crate::config::Config;
use crate::events::TriggerEvent;
use crate::hotkey::{HotkeyCapture, HotkeyListener, SystemHotkeys};
use crate::ipc::Server;
use crate::lifecycle::{InstanceStatus, ShutdownSignal};
use crate::replay::SystemPaste;
use crate::state::{TriggerMachine, TriggerSequence};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "puretext-daemon starting"
    );

    // Load configuration
    let config = Config::load()?;
    config.ensure_dirs()?;
    info!(?config.socket_path, ?config.settings_path, "configuration loaded");

    if lifecycle::probe(&config.socket_path).await == InstanceStatus::AlreadyRunning {
        info!("another instance is already running, exiting");
        return Ok(());
    }

    // Create shutdown signal handler
    let shutdown = ShutdownSignal::new();

    // Create channels for inter-component communication
    // Hotkey listener -> State machine
    let (hotkey_tx, hotkey_rx) = mpsc::channel(32);
    // IPC server -> State machine
    let (command_tx, command_rx) = mpsc::channel(16);
    // State machine -> IPC server (for status and subscribers)
    let (event_tx, _event_rx) = broadcast::channel::<TriggerEvent>(64);

    // Claim the OS hotkey facility; without it only manual converts work
    let capture = match SystemHotkeys::new() {
        Ok(backend) => Some(HotkeyCapture::new(Box::new(backend))),
        Err(e) => {
            error!(%e, "failed to initialise global hotkeys");
            None
        }
    };

    // Create the hotkey listener (runs on dedicated thread)
    let hotkey_listener = capture
        .as_ref()
        .map(|capture| HotkeyListener::new(hotkey_tx, capture.active_id()));

    if let Some(listener) = &hotkey_listener {
        match listener.start() {
            Ok(()) => {
                info!("hotkey listener started");
            }
            Err(e) => {
                error!(?e, "failed to start hotkey listener");
                warn!("continuing without hotkey support");
            }
        }
    }

    // Create the trigger sequence and state machine
    let sequence = Arc::new(TriggerSequence::new(
        ClipboardNormalizer::new(Box::new(SystemClipboard::new())),
        Box::new(SystemPaste),
    ));
    let mut state_machine = TriggerMachine::new(sequence, capture, config.clone(), event_tx.clone());

    // Create IPC server before the first settings are applied so its
    // status sees the initial hotkey event
    let server = Server::new(&config.socket_path, command_tx, event_tx.clone())?;
    let mut ipc_event_rx = event_tx.subscribe();
    let server_for_events = &server;

    // Registration failure is not fatal; it is logged and reported
    let _ = state_machine.apply_settings(config.load_settings());

    info!("daemon initialized, entering main loop");

    // Main event loop
    tokio::select! {
        // Run the state machine (processes hotkey events and IPC commands)
        _ = state_machine.run(hotkey_rx, command_rx) => {
            info!("state machine exited");
        }

        // Run the IPC server (accepts client connections)
        result = server.run() => {
            if let Err(e) = result {
                error!(?e, "IPC server error");
            }
        }

        // Keep the IPC status in step with trigger events
        _ = async {
            loop {
                match ipc_event_rx.recv().await {
                    Ok(event) => {
                        info!(%event, "trigger event");
                        server_for_events.apply_event(&event).await;
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(skipped = n, "trigger event receiver lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        break;
                    }
                }
            }
        } => {
            info!("trigger event handler exited");
        }

        // Wait for shutdown signal
        _ = async {
            if let Err(e) = shutdown.wait().await {
                error!(?e, "failed to install signal handlers");
                std::future::pending::<()>().await;
            }
        } => {
            info!("shutdown signal received");
        }
    }

    // Cleanup
    info!("shutting down...");

    if let Some(listener) = &hotkey_listener {
        listener.stop();
    }
    // Dropping the state machine releases the hotkey registration
    drop(state_machine);
    server.shutdown().await;

    info!("puretext-daemon stopped");

    Ok(())
}
