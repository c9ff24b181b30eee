//! Global hotkey event listener
//!
//! `global-hotkey` delivers OS events on a process-wide channel. A dedicated
//! thread drains it and forwards one `Fired` event per physical press of the
//! active combination into the tokio side.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use global_hotkey::{GlobalHotKeyEvent, HotKeyState};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::capture::NO_REGISTRATION;

/// How often the listener thread re-checks its running flag
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Events sent from the hotkey listener to the state machine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HotkeyEvent {
    /// The active combination was pressed
    Fired { id: u32 },
    /// The OS event channel closed; no further presses will arrive
    Disconnected,
}

/// Forwards OS hotkey presses to the state machine
pub struct HotkeyListener {
    event_tx: mpsc::Sender<HotkeyEvent>,
    active_id: Arc<AtomicU32>,
    running: Arc<AtomicBool>,
}

impl HotkeyListener {
    /// Create a new hotkey listener filtering on the given registration id
    pub fn new(event_tx: mpsc::Sender<HotkeyEvent>, active_id: Arc<AtomicU32>) -> Self {
        Self {
            event_tx,
            active_id,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Start the hotkey listener on a dedicated thread
    pub fn start(&self) -> Result<(), HotkeyError> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(HotkeyError::AlreadyRunning);
        }

        let event_tx = self.event_tx.clone();
        let active_id = Arc::clone(&self.active_id);
        let running = Arc::clone(&self.running);

        thread::Builder::new()
            .name("hotkey-listener".to_string())
            .spawn(move || {
                info!("hotkey listener thread started");

                if let Err(e) = run_event_loop(event_tx, active_id, running.clone()) {
                    error!(?e, "hotkey listener error");
                }

                running.store(false, Ordering::SeqCst);
                info!("hotkey listener thread stopped");
            })
            .map_err(|e| {
                self.running.store(false, Ordering::SeqCst);
                HotkeyError::ThreadSpawn(e.to_string())
            })?;

        Ok(())
    }

    /// Stop the hotkey listener; the thread exits within one poll interval
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    /// Check if the listener is currently running
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

/// Errors that can occur in the hotkey listener
#[derive(Debug, thiserror::Error)]
pub enum HotkeyError {
    #[error("hotkey listener is already running")]
    AlreadyRunning,

    #[error("failed to spawn listener thread: {0}")]
    ThreadSpawn(String),

    #[error("failed to send event to channel")]
    ChannelSend,
}

/// Decide whether an OS event is a press of the active registration.
///
/// Releases are dropped so one physical press yields one event, and ids of
/// replaced registrations are dropped so an old binding no longer fires.
pub fn should_forward(event_id: u32, state: HotKeyState, active_id: u32) -> bool {
    state == HotKeyState::Pressed && active_id != NO_REGISTRATION && event_id == active_id
}

fn run_event_loop(
    event_tx: mpsc::Sender<HotkeyEvent>,
    active_id: Arc<AtomicU32>,
    running: Arc<AtomicBool>,
) -> Result<(), HotkeyError> {
    let receiver = GlobalHotKeyEvent::receiver();

    while running.load(Ordering::SeqCst) {
        let event = match receiver.recv_timeout(POLL_INTERVAL) {
            Ok(event) => event,
            Err(e) if e.is_timeout() => continue,
            Err(_) => {
                warn!("global hotkey event channel closed");
                let _ = event_tx.blocking_send(HotkeyEvent::Disconnected);
                break;
            }
        };

        let current = active_id.load(Ordering::SeqCst);
        if !should_forward(event.id, event.state, current) {
            debug!(id = event.id, state = ?event.state, active = current, "hotkey event dropped");
            continue;
        }

        debug!(id = event.id, "hotkey pressed");

        // We are not in an async context, so block until the state machine has room
        if event_tx
            .blocking_send(HotkeyEvent::Fired { id: event.id })
            .is_err()
        {
            return Err(HotkeyError::ChannelSend);
        }
    }

    Ok(())
}
