//! Clipboard normalization to plain Unicode text

mod normalizer;

pub use normalizer::{
    ClipboardAccess, ClipboardAccessError, ClipboardNormalizer, NormalizeOutcome, SystemClipboard,
};

#[cfg(test)]
pub(crate) use normalizer::tests as fakes;
