//! Global hotkeys: canonical combinations, the binding registry, the
//! interactive recorder and the raw key-event source they share.
//!
//! Raw events come from /dev/input/event* via evdev (see [`source`]).
//!
//! # Requirements
//! - User must be in the `input` group: `sudo usermod -aG input $USER`
//! - Log out and back in after adding to group

mod detector;
pub mod keys;
pub mod recorder;
pub mod registry;
pub mod source;

pub use recorder::{HotkeyRecorder, RecordingHandle, RecordingOutcome, RecordingSession};
pub use registry::{ActionSink, HotkeyRegistry};
pub use source::{DisabledKeySource, EvdevKeySource};

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;

/// Modifier keys, side-agnostic.
///
/// Declaration order is the canonical (alphabetical) order used when
/// composing combination strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Modifier {
    Alt,
    Ctrl,
    Shift,
    Super,
}

impl Modifier {
    /// Classify an already-normalized key name.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "alt" | "option" | "alt gr" | "altgr" => Some(Modifier::Alt),
            "ctrl" | "control" => Some(Modifier::Ctrl),
            "shift" => Some(Modifier::Shift),
            "super" | "windows" | "win" | "meta" | "cmd" | "command" => Some(Modifier::Super),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Modifier::Alt => "alt",
            Modifier::Ctrl => "ctrl",
            Modifier::Shift => "shift",
            Modifier::Super => "super",
        }
    }
}

impl fmt::Display for Modifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lower-case a key name and drop its side ("left ctrl" -> "ctrl").
pub fn normalize_key_name(raw: &str) -> String {
    let lower = raw.trim().to_lowercase();
    let stripped = lower
        .strip_prefix("left ")
        .or_else(|| lower.strip_prefix("right "))
        .unwrap_or(&lower);
    stripped.to_string()
}

/// Whether a raw key name denotes a modifier, in any side-form.
pub fn is_modifier_name(raw: &str) -> bool {
    Modifier::from_name(&normalize_key_name(raw)).is_some()
}

/// A canonical key chord: sorted modifiers, then sorted non-modifier keys.
///
/// Always holds at least one non-modifier key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Combination {
    modifiers: BTreeSet<Modifier>,
    keys: BTreeSet<String>,
}

impl Combination {
    /// Build a combination from raw key names (any case, any side-form).
    ///
    /// Returns `None` when no non-modifier key is present.
    pub fn from_keys<I, S>(names: I) -> Option<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut modifiers = BTreeSet::new();
        let mut keys = BTreeSet::new();
        for name in names {
            let normalized = normalize_key_name(name.as_ref());
            if normalized.is_empty() {
                continue;
            }
            match Modifier::from_name(&normalized) {
                Some(m) => {
                    modifiers.insert(m);
                }
                None => {
                    keys.insert(normalized);
                }
            }
        }

        if keys.is_empty() {
            None
        } else {
            Some(Self { modifiers, keys })
        }
    }

    /// Parse a "+"-joined combination string such as `ctrl+alt+f10`.
    pub fn parse(s: &str) -> Result<Self, HotkeyError> {
        let tokens: Vec<&str> = s.split('+').map(str::trim).collect();
        if s.trim().is_empty() || tokens.iter().any(|t| t.is_empty()) {
            return Err(HotkeyError::Malformed(s.to_string()));
        }
        Self::from_keys(tokens).ok_or_else(|| HotkeyError::ModifiersOnly(s.to_string()))
    }

    pub fn modifiers(&self) -> impl Iterator<Item = Modifier> + '_ {
        self.modifiers.iter().copied()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.keys.iter().map(String::as_str)
    }

    pub fn has_modifier(&self, modifier: Modifier) -> bool {
        self.modifiers.contains(&modifier)
    }
}

impl fmt::Display for Combination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let modifiers = self.modifiers.iter().map(|m| -> &str { m.as_str() });
        for (i, part) in modifiers.chain(self.keys()).enumerate() {
            if i > 0 {
                f.write_str("+")?;
            }
            f.write_str(part)?;
        }
        Ok(())
    }
}

impl FromStr for Combination {
    type Err = HotkeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// What a bound combination does when pressed.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum HotkeyAction {
    /// Toggle the color filter on/off
    ToggleMain,
    /// Load the named preset into the current settings
    ActivatePreset(String),
}

impl fmt::Display for HotkeyAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HotkeyAction::ToggleMain => write!(f, "toggle"),
            HotkeyAction::ActivatePreset(name) => write!(f, "preset '{}'", name),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyDirection {
    Down,
    Up,
}

/// One raw key transition with its canonical key name ("left ctrl", "f10").
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawKeyEvent {
    pub name: String,
    pub direction: KeyDirection,
    pub timestamp: Instant,
}

impl RawKeyEvent {
    pub fn down(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            direction: KeyDirection::Down,
            timestamp: Instant::now(),
        }
    }

    pub fn up(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            direction: KeyDirection::Up,
            timestamp: Instant::now(),
        }
    }
}

/// Errors raised while installing hotkeys or reading raw events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HotkeyError {
    Malformed(String),
    ModifiersOnly(String),
    UnknownKey(String),
    Duplicate(String),
    DeviceUnavailable(String),
    Interrupted,
}

impl fmt::Display for HotkeyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HotkeyError::Malformed(s) => write!(f, "Malformed hotkey '{}'", s),
            HotkeyError::ModifiersOnly(s) => {
                write!(f, "Hotkey '{}' has no non-modifier key", s)
            }
            HotkeyError::UnknownKey(k) => write!(f, "Unknown key name '{}'", k),
            HotkeyError::Duplicate(s) => write!(f, "Hotkey '{}' is already bound", s),
            HotkeyError::DeviceUnavailable(e) => write!(f, "Keyboard input unavailable: {}", e),
            HotkeyError::Interrupted => write!(f, "Key event read interrupted"),
        }
    }
}

impl std::error::Error for HotkeyError {}

/// Callback invoked from the source's dispatch context when a hotkey fires.
pub type HotkeyHandler = Arc<dyn Fn() + Send + Sync>;

/// OS-level keyboard feed: blocking raw reads for recording, and native
/// hotkey installation for normal dispatch.
pub trait KeyEventSource: Send + Sync + 'static {
    /// Block until the next raw key transition.
    ///
    /// The first call puts the source in capture mode: events are routed
    /// here instead of to installed hotkeys until [`end_capture`] is called.
    /// With `suppress`, the keys are withheld from other applications.
    ///
    /// [`end_capture`]: KeyEventSource::end_capture
    fn read_next(&self, suppress: bool) -> Result<RawKeyEvent, HotkeyError>;

    fn install_hotkey(
        &self,
        combination: &Combination,
        handler: HotkeyHandler,
        suppress: bool,
    ) -> Result<(), HotkeyError>;

    fn uninstall_all_hotkeys(&self);

    /// Leave capture mode and drop anything still queued for `read_next`.
    fn end_capture(&self) {}

    /// Wake a blocked `read_next` with [`HotkeyError::Interrupted`].
    fn interrupt(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_combination_display_is_canonical() {
        let combo = Combination::parse("F10+Ctrl+Alt").unwrap();
        assert_eq!(combo.to_string(), "alt+ctrl+f10");
    }

    #[test]
    fn test_side_forms_collapse() {
        let left = Combination::from_keys(["left ctrl", "a"]).unwrap();
        let right = Combination::from_keys(["right ctrl", "a"]).unwrap();
        assert_eq!(left, right);
        assert_eq!(left.to_string(), "ctrl+a");
    }

    #[test]
    fn test_modifier_aliases() {
        let combo = Combination::parse("cmd+option+k").unwrap();
        assert_eq!(combo.to_string(), "alt+super+k");
        assert!(combo.has_modifier(Modifier::Super));
    }

    #[test]
    fn test_multiple_plain_keys_sorted() {
        let combo = Combination::from_keys(["shift", "z", "b"]).unwrap();
        assert_eq!(combo.to_string(), "shift+b+z");
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert_eq!(
            Combination::parse(""),
            Err(HotkeyError::Malformed(String::new()))
        );
        assert!(matches!(
            Combination::parse("ctrl++a"),
            Err(HotkeyError::Malformed(_))
        ));
    }

    #[test]
    fn test_parse_rejects_modifiers_only() {
        assert!(matches!(
            Combination::parse("ctrl+shift"),
            Err(HotkeyError::ModifiersOnly(_))
        ));
    }

    #[test]
    fn test_is_modifier_name() {
        assert!(is_modifier_name("Right Shift"));
        assert!(is_modifier_name("left windows"));
        assert!(!is_modifier_name("f11"));
    }
}
