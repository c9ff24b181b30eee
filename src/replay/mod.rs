//! Paste replay into the focused application

mod paste;

pub use paste::{PasteReplay, SystemPaste};

#[cfg(test)]
pub(crate) use paste::tests as fakes;
