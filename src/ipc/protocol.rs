//! IPC message protocol definitions
//!
//! All messages are JSON-encoded, prefixed with a 4-byte little-endian length.

use serde::{Deserialize, Serialize};

use crate::clipboard::NormalizeOutcome;
use crate::events::TriggerEvent;

/// Largest frame body accepted from a client
pub const MAX_FRAME_LEN: usize = 1024 * 1024;

/// Requests from the tray/options UI to the daemon
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Request {
    /// Request current daemon status
    GetStatus,

    /// Convert the clipboard to plain text without pasting
    Convert,

    /// Settings changed on disk; re-read them and re-register the hotkey
    Reload,

    /// Ping to check connectivity
    Ping,

    /// Subscribe to trigger notifications
    Subscribe,
}

/// Responses from daemon to UI
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    /// Current daemon status
    Status(DaemonStatus),

    /// Result of a manual convert; no outcome when a sequence was in flight
    Converted { outcome: Option<NormalizeOutcome> },

    /// Result of a reload; `hotkey` is None when no hotkey is active
    Reloaded {
        hotkey: Option<String>,
        error: Option<String>,
    },

    /// Pong response to ping
    Pong,

    /// Subscription confirmed
    Subscribed,

    /// Push notification for subscribed clients
    Notification { event: TriggerEvent },

    /// Error response
    Error { code: String, message: String },
}

/// Full daemon status snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DaemonStatus {
    /// Daemon version
    pub version: String,

    /// Active hotkey, e.g. "Ctrl+Alt+V"
    pub hotkey: Option<String>,

    /// Whether a hotkey is registered
    pub hotkey_active: bool,

    /// Why the hotkey is inactive, if it is
    pub hotkey_error: Option<String>,

    /// Trigger sequences completed since start
    pub triggers_completed: u64,

    /// Outcome of the most recent sequence
    pub last_outcome: Option<NormalizeOutcome>,

    /// Uptime in seconds
    pub uptime_secs: u64,
}

impl Default for DaemonStatus {
    fn default() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            hotkey: None,
            hotkey_active: false,
            hotkey_error: None,
            triggers_completed: 0,
            last_outcome: None,
            uptime_secs: 0,
        }
    }
}

impl DaemonStatus {
    /// Fold a trigger event into the status snapshot
    pub fn apply(&mut self, event: &TriggerEvent) {
        match event {
            TriggerEvent::HotkeyRegistered { binding } => {
                self.hotkey = Some(binding.clone());
                self.hotkey_active = true;
                self.hotkey_error = None;
            }
            TriggerEvent::HotkeyInactive { reason } => {
                self.hotkey = None;
                self.hotkey_active = false;
                self.hotkey_error = Some(reason.clone());
            }
            TriggerEvent::TriggerCompleted { outcome, .. } => {
                self.triggers_completed += 1;
                self.last_outcome = Some(*outcome);
            }
            TriggerEvent::TriggerIgnored { .. } => {}
        }
    }
}
