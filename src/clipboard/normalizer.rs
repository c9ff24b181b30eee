//! Clipboard read/strip/write cycle
//!
//! Reads the clipboard's plain-text representation once and, if it is not
//! empty, writes it straight back as plain text. Writing replaces every
//! other format the clipboard held, so rich text, HTML or images attached
//! alongside the text are dropped.

use std::sync::Mutex;

use arboard::Clipboard;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Result of one normalization attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NormalizeOutcome {
    /// Clipboard held no text (or could not be read); nothing was written
    Skipped,
    /// Clipboard now holds only the plain text
    Normalized,
}

impl std::fmt::Display for NormalizeOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NormalizeOutcome::Skipped => write!(f, "skipped"),
            NormalizeOutcome::Normalized => write!(f, "normalized"),
        }
    }
}

/// Errors reported by the OS clipboard
#[derive(Debug, thiserror::Error)]
pub enum ClipboardAccessError {
    #[error("clipboard is held by another process")]
    Occupied,

    #[error("clipboard unavailable: {0}")]
    Unavailable(String),
}

/// Plain-text access to the system clipboard
pub trait ClipboardAccess: Send + Sync {
    /// Read the plain Unicode text representation; empty when there is none
    fn read_text(&self) -> Result<String, ClipboardAccessError>;

    /// Replace the whole clipboard content with `text` as plain Unicode text
    fn write_text(&self, text: &str) -> Result<(), ClipboardAccessError>;
}

/// `ClipboardAccess` backed by `arboard`.
///
/// The `Clipboard` instance is kept for the daemon's lifetime: on X11 and
/// Wayland the content we own is only served while it exists.
pub struct SystemClipboard {
    inner: Mutex<Option<Clipboard>>,
}

impl SystemClipboard {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(None),
        }
    }

    fn with_clipboard<T>(
        &self,
        op: impl FnOnce(&mut Clipboard) -> Result<T, arboard::Error>,
    ) -> Result<T, ClipboardAccessError> {
        let mut guard = self.inner.lock().unwrap_or_else(|e| e.into_inner());

        if guard.is_none() {
            let clipboard =
                Clipboard::new().map_err(|e| ClipboardAccessError::Unavailable(e.to_string()))?;
            *guard = Some(clipboard);
        }

        let Some(clipboard) = guard.as_mut() else {
            return Err(ClipboardAccessError::Unavailable("clipboard not open".into()));
        };

        match op(clipboard) {
            Ok(value) => Ok(value),
            Err(arboard::Error::ClipboardOccupied) => Err(ClipboardAccessError::Occupied),
            Err(e) => {
                // Reopen on the next call in case the connection went bad
                *guard = None;
                Err(ClipboardAccessError::Unavailable(e.to_string()))
            }
        }
    }
}

impl Default for SystemClipboard {
    fn default() -> Self {
        Self::new()
    }
}

impl ClipboardAccess for SystemClipboard {
    fn read_text(&self) -> Result<String, ClipboardAccessError> {
        self.with_clipboard(|cb| match cb.get_text() {
            // No text representation (empty, or image only) reads as empty
            Err(arboard::Error::ContentNotAvailable) => Ok(String::new()),
            other => other,
        })
    }

    fn write_text(&self, text: &str) -> Result<(), ClipboardAccessError> {
        self.with_clipboard(|cb| cb.set_text(text))
    }
}

/// Collapses clipboard content to plain Unicode text
pub struct ClipboardNormalizer {
    clipboard: Box<dyn ClipboardAccess>,
}

impl ClipboardNormalizer {
    pub fn new(clipboard: Box<dyn ClipboardAccess>) -> Self {
        Self { clipboard }
    }

    /// Read once, decide, write once.
    ///
    /// Another process may change the clipboard between the read and the
    /// write; the OS offers no transaction so that race is accepted.
    pub fn normalize_clipboard(&self) -> NormalizeOutcome {
        let text = match self.clipboard.read_text() {
            Ok(text) => text,
            Err(e) => {
                warn!(?e, "failed to read clipboard");
                return NormalizeOutcome::Skipped;
            }
        };

        if text.is_empty() {
            debug!("clipboard holds no text, skipping");
            return NormalizeOutcome::Skipped;
        }

        if let Err(e) = self.clipboard.write_text(&text) {
            warn!(?e, "failed to write plain text to clipboard");
            return NormalizeOutcome::Skipped;
        }

        info!(chars = text.chars().count(), "clipboard normalized to plain text");
        NormalizeOutcome::Normalized
    }
}
