//! Hotkey module for global key-combination capture
//!
//! Registers one system-wide combination through `global-hotkey` and
//! forwards its presses to the trigger state machine.

mod capture;
mod keys;
mod listener;

pub use capture::{HotkeyCapture, RegistrationError, SystemHotkeys};
pub use keys::{HotkeyBinding, ModifierSet};
pub use listener::{HotkeyEvent, HotkeyListener};

#[cfg(test)]
pub(crate) use capture::tests as fakes;
