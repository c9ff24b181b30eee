//! Configuration loading and management

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::hotkey::{HotkeyBinding, ModifierSet, RegistrationError};

/// Environment variable overriding the data directory
const DATA_DIR_ENV: &str = "PURETEXT_DATA_DIR";

/// Daemon configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Path to the Unix domain socket for IPC
    pub socket_path: PathBuf,

    /// Path to the user settings written by the options UI
    pub settings_path: PathBuf,

    /// Directory for runtime data
    pub data_dir: PathBuf,
}

/// User preferences consumed by the daemon
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub modifier_alt: bool,
    pub modifier_control: bool,
    pub modifier_shift: bool,
    pub modifier_meta: bool,
    /// Primary key name, e.g. "V" or "F9"
    pub hotkey: String,
    /// Send Ctrl+V to the focused window after a hotkey conversion
    pub paste_into_active_window: bool,
    /// Ask the presentation layer for a sound after a hotkey conversion
    pub play_sound: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            modifier_alt: true,
            modifier_control: true,
            modifier_shift: false,
            modifier_meta: false,
            hotkey: "V".to_string(),
            paste_into_active_window: true,
            play_sound: false,
        }
    }
}

impl Settings {
    pub fn modifiers(&self) -> ModifierSet {
        ModifierSet {
            alt: self.modifier_alt,
            control: self.modifier_control,
            shift: self.modifier_shift,
            meta: self.modifier_meta,
        }
    }

    /// Decode the configured combination
    pub fn binding(&self) -> Result<HotkeyBinding, RegistrationError> {
        HotkeyBinding::new(self.modifiers(), &self.hotkey)
    }
}

impl Config {
    /// Load configuration from environment and defaults
    pub fn load() -> Result<Self> {
        let data_dir = match std::env::var_os(DATA_DIR_ENV) {
            Some(dir) => PathBuf::from(dir),
            None => {
                let home = std::env::var("HOME").context("HOME is not set")?;
                PathBuf::from(&home)
                    .join(".local")
                    .join("share")
                    .join("puretext")
            }
        };

        Ok(Self::in_dir(data_dir))
    }

    /// Configuration rooted at an explicit data directory
    pub fn in_dir(data_dir: PathBuf) -> Self {
        Self {
            socket_path: data_dir.join("daemon.sock"),
            settings_path: data_dir.join("settings.json"),
            data_dir,
        }
    }

    /// Ensure data directory exists
    pub fn ensure_dirs(&self) -> Result<()> {
        std::fs::create_dir_all(&self.data_dir)
            .with_context(|| format!("failed to create {}", self.data_dir.display()))?;
        Ok(())
    }

    /// Read the settings file.
    ///
    /// A missing file yields defaults, which are written out so the options
    /// UI has something to edit. An unreadable file yields defaults too.
    pub fn load_settings(&self) -> Settings {
        match read_settings(&self.settings_path) {
            Ok(Some(settings)) => settings,
            Ok(None) => {
                let settings = Settings::default();
                match write_settings(&self.settings_path, &settings) {
                    Ok(()) => info!(path = %self.settings_path.display(), "wrote default settings"),
                    Err(e) => warn!(?e, "failed to write default settings"),
                }
                settings
            }
            Err(e) => {
                warn!(?e, path = %self.settings_path.display(), "ignoring unreadable settings");
                Settings::default()
            }
        }
    }
}

fn read_settings(path: &Path) -> Result<Option<Settings>> {
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e).context("failed to read settings"),
    };
    let settings = serde_json::from_str(&contents).context("failed to parse settings")?;
    Ok(Some(settings))
}

fn write_settings(path: &Path, settings: &Settings) -> Result<()> {
    let json = serde_json::to_string_pretty(settings)?;
    std::fs::write(path, json).context("failed to write settings")?;
    Ok(())
}
