//! Synthetic paste keystrokes
//!
//! Sends Control-down, V-down, V-up, Control-up into whatever window has
//! input focus. Failures are logged and swallowed: the clipboard has
//! already been normalized by the time a paste is replayed.

use enigo::{Direction, Enigo, Key, Keyboard, Settings};
use tracing::{debug, warn};

/// Keys used by the paste combination
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PasteKey {
    Control,
    V,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyDirection {
    Down,
    Up,
}

/// Errors reported by the input-simulation facility
#[derive(Debug, thiserror::Error)]
pub enum InputSimulationError {
    #[error("input simulation unavailable: {0}")]
    Unavailable(String),

    #[error("key event rejected: {0}")]
    Rejected(String),
}

/// A sink for synthetic key transitions
pub trait KeySynthesizer {
    fn key(&mut self, key: PasteKey, direction: KeyDirection) -> Result<(), InputSimulationError>;
}

/// `KeySynthesizer` backed by `enigo`
pub struct EnigoSynthesizer {
    enigo: Enigo,
}

impl EnigoSynthesizer {
    pub fn new() -> Result<Self, InputSimulationError> {
        let enigo = Enigo::new(&Settings::default())
            .map_err(|e| InputSimulationError::Unavailable(e.to_string()))?;
        Ok(Self { enigo })
    }
}

impl KeySynthesizer for EnigoSynthesizer {
    fn key(&mut self, key: PasteKey, direction: KeyDirection) -> Result<(), InputSimulationError> {
        let key = match key {
            PasteKey::Control => Key::Control,
            PasteKey::V => Key::Unicode('v'),
        };
        let direction = match direction {
            KeyDirection::Down => Direction::Press,
            KeyDirection::Up => Direction::Release,
        };
        self.enigo
            .key(key, direction)
            .map_err(|e| InputSimulationError::Rejected(e.to_string()))
    }
}

/// Something that can paste into the focused application
pub trait PasteReplay: Send + Sync {
    fn replay_paste(&self);
}

/// Paste replay through a fresh `EnigoSynthesizer` per call.
///
/// `Enigo` is not `Send`, so it cannot live on the shared sequence that
/// runs on tokio's blocking pool.
pub struct SystemPaste;

impl PasteReplay for SystemPaste {
    fn replay_paste(&self) {
        match EnigoSynthesizer::new() {
            Ok(mut synth) => replay_paste(&mut synth),
            Err(e) => warn!(?e, "paste replay skipped"),
        }
    }
}

/// Replay Control+V on `synth`, swallowing errors.
pub fn replay_paste<S: KeySynthesizer + ?Sized>(synth: &mut S) {
    match send_paste(synth) {
        Ok(()) => debug!("paste keystrokes sent"),
        Err(e) => warn!(?e, "paste replay failed"),
    }
}

fn send_paste<S: KeySynthesizer + ?Sized>(synth: &mut S) -> Result<(), InputSimulationError> {
    synth.key(PasteKey::Control, KeyDirection::Down)?;

    let keystroke = synth
        .key(PasteKey::V, KeyDirection::Down)
        .and_then(|()| synth.key(PasteKey::V, KeyDirection::Up));

    // Release the modifier even if V failed, or Control stays held
    let release = synth.key(PasteKey::Control, KeyDirection::Up);
    keystroke.and(release)
}
