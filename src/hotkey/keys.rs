//! Key naming for evdev key codes
//!
//! Names follow the common hotkey-library convention: lower-case, modifiers
//! carry their side ("left ctrl", "right alt"), everything else is the evdev
//! name without its `KEY_` prefix ("f10", "a", "space", "kp1").

use std::collections::HashSet;

use evdev::Key;
use once_cell::sync::Lazy;

/// Highest key code worth naming (KEY_MAX is 0x2ff)
const MAX_KEY_CODE: u16 = 0x2ff;

/// Every nameable key (modifiers included), side-agnostic.
static KNOWN_KEY_NAMES: Lazy<HashSet<String>> = Lazy::new(|| {
    (0..=MAX_KEY_CODE)
        .filter_map(|code| key_name(Key::new(code)))
        .map(|name| super::normalize_key_name(&name))
        .collect()
});

/// Canonical raw name for an evdev key, or `None` for buttons and unknown codes.
pub fn key_name(key: Key) -> Option<String> {
    let name = match key {
        Key::KEY_LEFTCTRL => "left ctrl",
        Key::KEY_RIGHTCTRL => "right ctrl",
        Key::KEY_LEFTSHIFT => "left shift",
        Key::KEY_RIGHTSHIFT => "right shift",
        Key::KEY_LEFTALT => "left alt",
        Key::KEY_RIGHTALT => "right alt",
        Key::KEY_LEFTMETA => "left super",
        Key::KEY_RIGHTMETA => "right super",
        Key::KEY_ESC => "esc",
        _ => {
            let debug = format!("{:?}", key);
            let stripped = debug.strip_prefix("KEY_")?;
            if stripped.is_empty() || stripped == "RESERVED" {
                return None;
            }
            return Some(stripped.to_lowercase());
        }
    };
    Some(name.to_string())
}

/// Whether a normalized name refers to a key evdev can report.
pub fn is_known_key(name: &str) -> bool {
    KNOWN_KEY_NAMES.contains(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_modifier_names_keep_side() {
        assert_eq!(key_name(Key::KEY_LEFTCTRL).as_deref(), Some("left ctrl"));
        assert_eq!(key_name(Key::KEY_RIGHTMETA).as_deref(), Some("right super"));
    }

    #[test]
    fn test_plain_key_names() {
        assert_eq!(key_name(Key::KEY_F10).as_deref(), Some("f10"));
        assert_eq!(key_name(Key::KEY_A).as_deref(), Some("a"));
        assert_eq!(key_name(Key::KEY_SPACE).as_deref(), Some("space"));
    }

    #[test]
    fn test_buttons_are_not_keys() {
        assert_eq!(key_name(Key::BTN_LEFT), None);
    }

    #[test]
    fn test_known_key_table() {
        assert!(is_known_key("f11"));
        assert!(is_known_key("ctrl"));
        assert!(!is_known_key("definitely-not-a-key"));
    }
}
