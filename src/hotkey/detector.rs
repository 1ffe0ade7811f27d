//! Hotkey detection logic with held-key tracking

use std::collections::BTreeSet;

use super::{is_modifier_name, Combination};

/// Detects installed combinations from one device's raw key events
#[derive(Debug, Default)]
pub struct HotkeyDetector {
    /// Raw names of keys currently held on this device
    held: BTreeSet<String>,
}

impl HotkeyDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Process a key event, returning the matching combination if any
    ///
    /// # Arguments
    /// * `name` - Raw key name ("left ctrl", "f10")
    /// * `value` - 0 = released, 1 = pressed, 2 = repeat
    /// * `installed` - Combinations to match against
    ///
    /// # Returns
    /// The matched combination on a fresh (non-repeat) press of a
    /// non-modifier key while exactly its chord is held
    pub fn process_key<'a>(
        &mut self,
        name: &str,
        value: i32,
        installed: impl IntoIterator<Item = &'a Combination>,
    ) -> Option<Combination> {
        match value {
            0 => {
                self.held.remove(name);
                return None;
            }
            1 => {
                self.held.insert(name.to_string());
            }
            _ => return None,
        }

        if is_modifier_name(name) {
            return None;
        }

        let current = Combination::from_keys(&self.held)?;
        installed.into_iter().find(|c| **c == current).cloned()
    }

    /// Track a transition without matching (used while capturing)
    pub fn track(&mut self, name: &str, value: i32) {
        match value {
            0 => {
                self.held.remove(name);
            }
            1 => {
                self.held.insert(name.to_string());
            }
            _ => {}
        }
    }

    /// True when no key is held on this device
    pub fn is_idle(&self) -> bool {
        self.held.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctrl_f10() -> Vec<Combination> {
        vec![Combination::parse("ctrl+f10").unwrap()]
    }

    #[test]
    fn test_ctrl_f10_detection() {
        let installed = ctrl_f10();
        let mut detector = HotkeyDetector::new();

        assert!(detector.process_key("left ctrl", 1, &installed).is_none());
        assert_eq!(
            detector.process_key("f10", 1, &installed),
            Some(installed[0].clone())
        );
        // Release should not trigger again
        assert!(detector.process_key("f10", 0, &installed).is_none());
    }

    #[test]
    fn test_ignores_key_repeat() {
        let installed = ctrl_f10();
        let mut detector = HotkeyDetector::new();

        detector.process_key("left ctrl", 1, &installed);
        assert!(detector.process_key("f10", 1, &installed).is_some());
        assert!(detector.process_key("f10", 2, &installed).is_none());
    }

    #[test]
    fn test_extra_modifier_no_trigger() {
        let installed = ctrl_f10();
        let mut detector = HotkeyDetector::new();

        detector.process_key("left ctrl", 1, &installed);
        detector.process_key("left shift", 1, &installed);
        assert!(detector.process_key("f10", 1, &installed).is_none());
    }

    #[test]
    fn test_right_modifiers_work() {
        let installed = ctrl_f10();
        let mut detector = HotkeyDetector::new();

        detector.process_key("right ctrl", 1, &installed);
        assert!(detector.process_key("f10", 1, &installed).is_some());
    }

    #[test]
    fn test_modifier_release_clears_state() {
        let installed = ctrl_f10();
        let mut detector = HotkeyDetector::new();

        detector.process_key("left ctrl", 1, &installed);
        assert!(detector.process_key("f10", 1, &installed).is_some());
        detector.process_key("f10", 0, &installed);
        detector.process_key("left ctrl", 0, &installed);

        assert!(detector.process_key("f10", 1, &installed).is_none());
        assert!(!detector.is_idle());
        detector.process_key("f10", 0, &installed);
        assert!(detector.is_idle());
    }
}
