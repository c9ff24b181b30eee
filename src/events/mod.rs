//! Events module for trigger notifications
//!
//! Structured events emitted by the state machine when the hotkey
//! registration changes or a trigger sequence finishes. Subscribed IPC
//! clients receive them verbatim, e.g. to play a confirmation sound.

use serde::{Deserialize, Serialize};

use crate::clipboard::NormalizeOutcome;

/// What started a trigger sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerSource {
    /// The global hotkey was pressed
    Hotkey,
    /// A client asked for a convert (tray icon double-click)
    Manual,
}

/// Events emitted by the state machine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TriggerEvent {
    /// A hotkey binding is now active
    HotkeyRegistered { binding: String },

    /// No hotkey is active; only manual triggers work
    HotkeyInactive { reason: String },

    /// A trigger sequence ran to completion
    TriggerCompleted {
        source: TriggerSource,
        outcome: NormalizeOutcome,
        /// Paste keystrokes were sent (errors are not reported)
        paste_attempted: bool,
        /// The presentation layer should play its confirmation sound
        play_sound: bool,
    },

    /// A trigger arrived while another sequence was in flight
    TriggerIgnored { source: TriggerSource },
}

impl std::fmt::Display for TriggerEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TriggerEvent::HotkeyRegistered { binding } => {
                write!(f, "HOTKEY_REGISTERED ({})", binding)
            }
            TriggerEvent::HotkeyInactive { reason } => write!(f, "HOTKEY_INACTIVE ({})", reason),
            TriggerEvent::TriggerCompleted {
                source, outcome, ..
            } => write!(f, "TRIGGER_COMPLETED ({:?}, {})", source, outcome),
            TriggerEvent::TriggerIgnored { source } => {
                write!(f, "TRIGGER_IGNORED ({:?})", source)
            }
        }
    }
}
