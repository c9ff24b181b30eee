//! Ownership of the single global hotkey registration
//!
//! `HotkeyCapture` holds at most one active OS registration at a time and
//! publishes its id so the listener thread can drop events that belong to
//! a binding that has since been replaced.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use global_hotkey::hotkey::HotKey;
use global_hotkey::GlobalHotKeyManager;
use tracing::{debug, info, warn};

use super::keys::HotkeyBinding;

/// Id value meaning "no registration active"
pub const NO_REGISTRATION: u32 = 0;

/// Errors that can occur while registering a global hotkey
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistrationError {
    #[error("hotkey combination is already bound: {0}")]
    AlreadyBound(String),

    #[error("invalid hotkey combination: {0}")]
    InvalidCombination(String),

    #[error("global hotkeys unavailable: {0}")]
    Unavailable(String),
}

/// The OS facility that registers global hotkeys
pub trait HotkeyBackend {
    fn register(&self, hotkey: HotKey) -> Result<(), RegistrationError>;
    fn unregister(&self, hotkey: HotKey) -> Result<(), RegistrationError>;
}

/// `HotkeyBackend` backed by `global-hotkey`
pub struct SystemHotkeys {
    manager: GlobalHotKeyManager,
}

impl SystemHotkeys {
    pub fn new() -> Result<Self, RegistrationError> {
        let manager = GlobalHotKeyManager::new()
            .map_err(|e| RegistrationError::Unavailable(e.to_string()))?;
        Ok(Self { manager })
    }
}

impl HotkeyBackend for SystemHotkeys {
    fn register(&self, hotkey: HotKey) -> Result<(), RegistrationError> {
        self.manager.register(hotkey).map_err(registration_error)
    }

    fn unregister(&self, hotkey: HotKey) -> Result<(), RegistrationError> {
        self.manager
            .unregister(hotkey)
            .map_err(|e| RegistrationError::Unavailable(e.to_string()))
    }
}

/// Map a `global-hotkey` registration failure onto `RegistrationError`.
///
/// `FailedToRegister` means the backend has no scancode for the key.
fn registration_error(e: global_hotkey::Error) -> RegistrationError {
    match e {
        global_hotkey::Error::AlreadyRegistered(hk) => {
            RegistrationError::AlreadyBound(format!("{hk:?}"))
        }
        global_hotkey::Error::FailedToRegister(msg) => RegistrationError::InvalidCombination(msg),
        other => RegistrationError::Unavailable(other.to_string()),
    }
}

/// Opaque handle to an active OS registration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrationHandle {
    id: u32,
    hotkey: HotKey,
}

impl RegistrationHandle {
    /// Id carried by OS events for this registration
    pub fn id(&self) -> u32 {
        self.id
    }
}

/// Owner of the one global hotkey registration
pub struct HotkeyCapture {
    backend: Box<dyn HotkeyBackend>,
    active: Option<(RegistrationHandle, HotkeyBinding)>,
    active_id: Arc<AtomicU32>,
}

impl HotkeyCapture {
    pub fn new(backend: Box<dyn HotkeyBackend>) -> Self {
        Self {
            backend,
            active: None,
            active_id: Arc::new(AtomicU32::new(NO_REGISTRATION)),
        }
    }

    /// Shared view of the active registration id, read by the listener thread
    pub fn active_id(&self) -> Arc<AtomicU32> {
        Arc::clone(&self.active_id)
    }

    /// The binding currently registered, if any
    pub fn binding(&self) -> Option<&HotkeyBinding> {
        self.active.as_ref().map(|(_, binding)| binding)
    }

    pub fn handle(&self) -> Option<&RegistrationHandle> {
        self.active.as_ref().map(|(handle, _)| handle)
    }

    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    /// Register `binding` globally.
    ///
    /// Any registration still active is released first, so at most one
    /// registration exists at any time.
    pub fn register_hotkey(
        &mut self,
        binding: &HotkeyBinding,
    ) -> Result<RegistrationHandle, RegistrationError> {
        self.release_active();

        let hotkey = binding.to_hotkey();
        self.backend.register(hotkey)?;

        let handle = RegistrationHandle {
            id: hotkey.id(),
            hotkey,
        };
        self.active_id.store(handle.id, Ordering::SeqCst);
        self.active = Some((handle.clone(), binding.clone()));

        info!(%binding, id = handle.id, "global hotkey registered");
        Ok(handle)
    }

    /// Release a registration. Stale or already released handles are ignored.
    pub fn unregister_hotkey(&mut self, handle: RegistrationHandle) {
        match &self.active {
            Some((active, _)) if *active == handle => self.release_active(),
            _ => debug!(id = handle.id, "unregister ignored, handle not active"),
        }
    }

    /// Replace the active binding.
    ///
    /// The old registration is released before the new binding is even
    /// looked at, so a malformed binding leaves no hotkey active.
    pub fn reconfigure(
        &mut self,
        binding: Result<HotkeyBinding, RegistrationError>,
    ) -> Result<RegistrationHandle, RegistrationError> {
        self.release_active();
        let binding = binding?;
        self.register_hotkey(&binding)
    }

    fn release_active(&mut self) {
        let Some((handle, binding)) = self.active.take() else {
            return;
        };
        self.active_id.store(NO_REGISTRATION, Ordering::SeqCst);

        match self.backend.unregister(handle.hotkey) {
            Ok(()) => info!(%binding, id = handle.id, "global hotkey unregistered"),
            Err(e) => warn!(%binding, ?e, "failed to unregister global hotkey"),
        }
    }
}

impl Drop for HotkeyCapture {
    fn drop(&mut self) {
        self.release_active();
    }
}
