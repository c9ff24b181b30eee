//! State machine module for trigger handling
//!
//! Provides an explicit state machine for one trigger:
//! - Idle: waiting for the hotkey or a manual convert
//! - Normalizing: clipboard rewritten as plain text
//! - Replaying: paste keystrokes sent to the focused window

mod machine;

pub use machine::{Command, SequenceResult, TriggerMachine, TriggerSequence};
