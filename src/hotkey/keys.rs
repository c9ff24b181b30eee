//! Hotkey binding definitions and key-name parsing
//!
//! Converts the modifier flags and key name stored in the settings file
//! into a `HotkeyBinding`, and a binding into the `HotKey` value that
//! `global-hotkey` registers with the OS.

use std::fmt;

use global_hotkey::hotkey::{Code, HotKey, Modifiers};

use super::capture::RegistrationError;

/// The set of modifier keys required alongside the primary key
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ModifierSet {
    /// Alt/Option key is required
    pub alt: bool,
    /// Control key is required
    pub control: bool,
    /// Shift key is required
    pub shift: bool,
    /// Meta (Windows/Command/Super) key is required
    pub meta: bool,
}

impl ModifierSet {
    /// Check if no modifier is required
    pub fn is_empty(&self) -> bool {
        !self.alt && !self.control && !self.shift && !self.meta
    }

    /// Encode as `global-hotkey` modifier flags
    pub fn to_modifiers(self) -> Modifiers {
        let mut mods = Modifiers::empty();
        if self.alt {
            mods |= Modifiers::ALT;
        }
        if self.control {
            mods |= Modifiers::CONTROL;
        }
        if self.shift {
            mods |= Modifiers::SHIFT;
        }
        if self.meta {
            mods |= Modifiers::META;
        }
        mods
    }
}

/// One global key combination: a non-empty modifier set plus a primary key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HotkeyBinding {
    modifiers: ModifierSet,
    key: Code,
    key_name: &'static str,
}

impl HotkeyBinding {
    /// Build a binding from a modifier set and a configured key name.
    ///
    /// Fails with `InvalidCombination` when the key name is unknown or no
    /// modifier is set, so that ordinary typing is never hijacked.
    pub fn new(modifiers: ModifierSet, key_name: &str) -> Result<Self, RegistrationError> {
        let (key, canonical) = parse_key_name(key_name).ok_or_else(|| {
            RegistrationError::InvalidCombination(format!("unknown key name {key_name:?}"))
        })?;

        if modifiers.is_empty() {
            return Err(RegistrationError::InvalidCombination(format!(
                "{canonical} requires at least one modifier"
            )));
        }

        Ok(Self {
            modifiers,
            key,
            key_name: canonical,
        })
    }

    /// The `global-hotkey` value registered with the OS
    pub fn to_hotkey(&self) -> HotKey {
        HotKey::new(Some(self.modifiers.to_modifiers()), self.key)
    }
}

impl fmt::Display for HotkeyBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let m = &self.modifiers;
        if m.control {
            write!(f, "Ctrl+")?;
        }
        if m.alt {
            write!(f, "Alt+")?;
        }
        if m.shift {
            write!(f, "Shift+")?;
        }
        if m.meta {
            write!(f, "Meta+")?;
        }
        write!(f, "{}", self.key_name)
    }
}

/// Parse a key name into a key code and its canonical display name.
///
/// Accepts single letters and digits, `F1`-`F12`, and the usual names for
/// navigation and punctuation keys. Matching is case-insensitive.
pub fn parse_key_name(name: &str) -> Option<(Code, &'static str)> {
    let upper = name.trim().to_ascii_uppercase();
    let parsed = match upper.as_str() {
        "A" => (Code::KeyA, "A"),
        "B" => (Code::KeyB, "B"),
        "C" => (Code::KeyC, "C"),
        "D" => (Code::KeyD, "D"),
        "E" => (Code::KeyE, "E"),
        "F" => (Code::KeyF, "F"),
        "G" => (Code::KeyG, "G"),
        "H" => (Code::KeyH, "H"),
        "I" => (Code::KeyI, "I"),
        "J" => (Code::KeyJ, "J"),
        "K" => (Code::KeyK, "K"),
        "L" => (Code::KeyL, "L"),
        "M" => (Code::KeyM, "M"),
        "N" => (Code::KeyN, "N"),
        "O" => (Code::KeyO, "O"),
        "P" => (Code::KeyP, "P"),
        "Q" => (Code::KeyQ, "Q"),
        "R" => (Code::KeyR, "R"),
        "S" => (Code::KeyS, "S"),
        "T" => (Code::KeyT, "T"),
        "U" => (Code::KeyU, "U"),
        "V" => (Code::KeyV, "V"),
        "W" => (Code::KeyW, "W"),
        "X" => (Code::KeyX, "X"),
        "Y" => (Code::KeyY, "Y"),
        "Z" => (Code::KeyZ, "Z"),
        "0" | "D0" => (Code::Digit0, "0"),
        "1" | "D1" => (Code::Digit1, "1"),
        "2" | "D2" => (Code::Digit2, "2"),
        "3" | "D3" => (Code::Digit3, "3"),
        "4" | "D4" => (Code::Digit4, "4"),
        "5" | "D5" => (Code::Digit5, "5"),
        "6" | "D6" => (Code::Digit6, "6"),
        "7" | "D7" => (Code::Digit7, "7"),
        "8" | "D8" => (Code::Digit8, "8"),
        "9" | "D9" => (Code::Digit9, "9"),
        "F1" => (Code::F1, "F1"),
        "F2" => (Code::F2, "F2"),
        "F3" => (Code::F3, "F3"),
        "F4" => (Code::F4, "F4"),
        "F5" => (Code::F5, "F5"),
        "F6" => (Code::F6, "F6"),
        "F7" => (Code::F7, "F7"),
        "F8" => (Code::F8, "F8"),
        "F9" => (Code::F9, "F9"),
        "F10" => (Code::F10, "F10"),
        "F11" => (Code::F11, "F11"),
        "F12" => (Code::F12, "F12"),
        "SPACE" => (Code::Space, "Space"),
        "ENTER" | "RETURN" => (Code::Enter, "Enter"),
        "TAB" => (Code::Tab, "Tab"),
        "ESCAPE" | "ESC" => (Code::Escape, "Escape"),
        "BACKSPACE" | "BACK" => (Code::Backspace, "Backspace"),
        "INSERT" | "INS" => (Code::Insert, "Insert"),
        "DELETE" | "DEL" => (Code::Delete, "Delete"),
        "HOME" => (Code::Home, "Home"),
        "END" => (Code::End, "End"),
        "PAGEUP" | "PRIOR" => (Code::PageUp, "PageUp"),
        "PAGEDOWN" | "NEXT" => (Code::PageDown, "PageDown"),
        "UP" => (Code::ArrowUp, "Up"),
        "DOWN" => (Code::ArrowDown, "Down"),
        "LEFT" => (Code::ArrowLeft, "Left"),
        "RIGHT" => (Code::ArrowRight, "Right"),
        "PAUSE" => (Code::Pause, "Pause"),
        "PRINTSCREEN" | "PRINT" => (Code::PrintScreen, "PrintScreen"),
        "SCROLLLOCK" | "SCROLL" => (Code::ScrollLock, "ScrollLock"),
        "`" | "BACKQUOTE" | "OEMTILDE" => (Code::Backquote, "`"),
        "-" | "MINUS" | "OEMMINUS" => (Code::Minus, "-"),
        "=" | "EQUAL" | "OEMPLUS" => (Code::Equal, "="),
        "[" | "BRACKETLEFT" | "OEMOPENBRACKETS" => (Code::BracketLeft, "["),
        "]" | "BRACKETRIGHT" | "OEMCLOSEBRACKETS" => (Code::BracketRight, "]"),
        "\\" | "BACKSLASH" | "OEMPIPE" => (Code::Backslash, "\\"),
        ";" | "SEMICOLON" | "OEMSEMICOLON" => (Code::Semicolon, ";"),
        "'" | "QUOTE" | "OEMQUOTES" => (Code::Quote, "'"),
        "," | "COMMA" | "OEMCOMMA" => (Code::Comma, ","),
        "." | "PERIOD" | "OEMPERIOD" => (Code::Period, "."),
        "/" | "SLASH" | "OEMQUESTION" => (Code::Slash, "/"),
        _ => return None,
    };
    Some(parsed)
}
