//! Binding registry - the single owner of the active combination set

use std::collections::BTreeMap;
use std::sync::Arc;

use super::{Combination, HotkeyAction, HotkeyError, HotkeyHandler, KeyEventSource};

/// Receives the action of every hotkey that fires.
pub type ActionSink = Arc<dyn Fn(HotkeyAction) + Send + Sync>;

/// Maps combinations to actions and keeps the key source's installed
/// hotkeys in step with that map.
///
/// `clear` and `bind` are the only mutators. Duplicates are resolved
/// first-bound-wins, so within [`rebuild_from`](Self::rebuild_from) the
/// main hotkey can never be shadowed by a preset.
pub struct HotkeyRegistry {
    source: Arc<dyn KeyEventSource>,
    sink: ActionSink,
    bindings: BTreeMap<Combination, HotkeyAction>,
}

impl HotkeyRegistry {
    pub fn new(source: Arc<dyn KeyEventSource>, sink: ActionSink) -> Self {
        Self {
            source,
            sink,
            bindings: BTreeMap::new(),
        }
    }

    /// Unregister every binding. Safe to call repeatedly.
    pub fn clear(&mut self) {
        self.source.uninstall_all_hotkeys();
        if !self.bindings.is_empty() {
            log::debug!("Cleared {} hotkey binding(s)", self.bindings.len());
        }
        self.bindings.clear();
    }

    /// Register one binding.
    pub fn bind(&mut self, combination: &str, action: HotkeyAction) -> Result<(), HotkeyError> {
        let combo = Combination::parse(combination)?;
        if let Some(existing) = self.bindings.get(&combo) {
            log::debug!("'{}' already bound to {}", combo, existing);
            return Err(HotkeyError::Duplicate(combo.to_string()));
        }

        let sink = self.sink.clone();
        let fired = action.clone();
        let handler: HotkeyHandler = Arc::new(move || sink(fired.clone()));

        // suppress=false: the chord still reaches other applications
        self.source.install_hotkey(&combo, handler, false)?;

        log::info!("Registered hotkey {} -> {}", combo, action);
        self.bindings.insert(combo, action);
        Ok(())
    }

    /// Clear, then bind the main hotkey and every preset hotkey.
    ///
    /// Each bind is independent: a failure is logged and the rest still
    /// register. Returns the number of bindings now active.
    pub fn rebuild_from(
        &mut self,
        main: Option<&str>,
        presets: &[(String, Option<String>)],
    ) -> usize {
        self.clear();

        if let Some(hotkey) = main.filter(|h| !h.trim().is_empty()) {
            if let Err(e) = self.bind(hotkey, HotkeyAction::ToggleMain) {
                log::warn!("Failed to register main hotkey '{}': {}", hotkey, e);
            }
        }

        for (name, hotkey) in presets {
            let Some(hotkey) = hotkey.as_deref().filter(|h| !h.trim().is_empty()) else {
                continue;
            };
            if let Err(e) = self.bind(hotkey, HotkeyAction::ActivatePreset(name.clone())) {
                log::warn!(
                    "Failed to register hotkey '{}' for preset {}: {}",
                    hotkey,
                    name,
                    e
                );
            }
        }

        self.bindings.len()
    }

    /// Canonical combination strings with their actions, sorted
    pub fn bindings(&self) -> Vec<(String, HotkeyAction)> {
        self.bindings
            .iter()
            .map(|(combo, action)| (combo.to_string(), action.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}
