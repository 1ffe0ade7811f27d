//! Input manager driven through a scripted in-memory key source

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::{Arc, Mutex};

use gammakey::hotkey::{
    ActionSink, Combination, HotkeyAction, HotkeyError, HotkeyHandler, KeyEventSource,
    RawKeyEvent, RecordingOutcome,
};
use gammakey::input::InputManager;
use gammakey::settings::ConfigManager;
use tempfile::TempDir;

/// Key source whose raw events are pushed by the test and whose
/// installed hotkeys are fired by name.
struct FakeSource {
    installed: Mutex<Vec<(Combination, HotkeyHandler)>>,
    feed: Mutex<Sender<Result<RawKeyEvent, HotkeyError>>>,
    reads: Mutex<Receiver<Result<RawKeyEvent, HotkeyError>>>,
    read_suppressed: AtomicBool,
}

impl FakeSource {
    fn new() -> Arc<Self> {
        let (feed, reads) = channel();
        Arc::new(Self {
            installed: Mutex::new(Vec::new()),
            feed: Mutex::new(feed),
            reads: Mutex::new(reads),
            read_suppressed: AtomicBool::new(false),
        })
    }

    /// Press a physical chord; returns how many hotkeys fired
    fn press(&self, combo: &str) -> usize {
        let target = Combination::parse(combo).unwrap();
        let handlers: Vec<HotkeyHandler> = self
            .installed
            .lock()
            .unwrap()
            .iter()
            .filter(|(c, _)| *c == target)
            .map(|(_, h)| h.clone())
            .collect();
        for handler in &handlers {
            handler();
        }
        handlers.len()
    }

    fn installed(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .installed
            .lock()
            .unwrap()
            .iter()
            .map(|(c, _)| c.to_string())
            .collect();
        names.sort();
        names
    }

    fn type_keys(&self, events: &[(&str, bool)]) {
        let feed = self.feed.lock().unwrap();
        for (name, down) in events {
            let event = if *down {
                RawKeyEvent::down(*name)
            } else {
                RawKeyEvent::up(*name)
            };
            feed.send(Ok(event)).unwrap();
        }
    }
}

impl KeyEventSource for FakeSource {
    fn read_next(&self, suppress: bool) -> Result<RawKeyEvent, HotkeyError> {
        self.read_suppressed.store(suppress, Ordering::SeqCst);
        self.reads
            .lock()
            .unwrap()
            .recv()
            .unwrap_or(Err(HotkeyError::Interrupted))
    }

    fn install_hotkey(
        &self,
        combination: &Combination,
        handler: HotkeyHandler,
        _suppress: bool,
    ) -> Result<(), HotkeyError> {
        self.installed
            .lock()
            .unwrap()
            .push((combination.clone(), handler));
        Ok(())
    }

    fn uninstall_all_hotkeys(&self) {
        self.installed.lock().unwrap().clear();
    }

    fn interrupt(&self) {
        let _ = self
            .feed
            .lock()
            .unwrap()
            .send(Err(HotkeyError::Interrupted));
    }
}

struct Fixture {
    dir: TempDir,
    source: Arc<FakeSource>,
    fired: Arc<Mutex<Vec<HotkeyAction>>>,
    manager: InputManager,
}

fn fixture() -> Fixture {
    let dir = TempDir::new().unwrap();
    std::fs::write(
        dir.path().join("settings.json"),
        r#"{"hotkey": "ctrl+f10"}"#,
    )
    .unwrap();
    std::fs::write(
        dir.path().join("presets.json"),
        r#"{"night": {"brightness": 0.3, "hotkey": "ctrl+f11"}, "day": {"brightness": 0.6}}"#,
    )
    .unwrap();

    let config = Arc::new(Mutex::new(ConfigManager::load(dir.path())));
    let source = FakeSource::new();
    let fired = Arc::new(Mutex::new(Vec::new()));
    let log = fired.clone();
    let sink: ActionSink = Arc::new(move |action| log.lock().unwrap().push(action));
    let manager = InputManager::new(config, source.clone(), sink);

    Fixture {
        dir,
        source,
        fired,
        manager,
    }
}

fn startup_bindings() -> Vec<(String, HotkeyAction)> {
    vec![
        ("ctrl+f10".to_string(), HotkeyAction::ToggleMain),
        (
            "ctrl+f11".to_string(),
            HotkeyAction::ActivatePreset("night".to_string()),
        ),
    ]
}

#[test]
fn hotkeys_dispatch_to_their_own_action() {
    let f = fixture();
    assert_eq!(f.manager.active_bindings(), startup_bindings());

    assert_eq!(f.source.press("ctrl+f10"), 1);
    assert_eq!(*f.fired.lock().unwrap(), vec![HotkeyAction::ToggleMain]);

    assert_eq!(f.source.press("ctrl+f11"), 1);
    assert_eq!(
        *f.fired.lock().unwrap(),
        vec![
            HotkeyAction::ToggleMain,
            HotkeyAction::ActivatePreset("night".to_string())
        ]
    );

    assert_eq!(f.source.press("ctrl+f12"), 0);
}

#[test]
fn register_shortcuts_is_idempotent() {
    let f = fixture();
    f.manager.register_shortcuts();
    f.manager.register_shortcuts();

    assert_eq!(f.source.installed(), vec!["ctrl+f10", "ctrl+f11"]);
    assert_eq!(f.source.press("ctrl+f10"), 1);
    assert_eq!(f.fired.lock().unwrap().len(), 1);
}

#[test]
fn recording_captures_chord_and_restores_bindings() {
    let f = fixture();

    let rx = f.manager.begin_recording().expect("recording should start");
    assert!(f.manager.is_recording());
    assert!(f.source.installed().is_empty());
    // Live hotkeys stay off while capturing
    f.manager.register_shortcuts();
    assert!(f.source.installed().is_empty());

    // Re-entrant call is ignored
    assert!(f.manager.begin_recording().is_none());

    f.source.type_keys(&[
        ("left alt", true),
        ("left ctrl", true),
        ("f9", true),
        ("left ctrl", false),
        ("f9", false),
        ("left alt", false),
    ]);

    let outcome = rx.blocking_recv().unwrap();
    assert_eq!(
        outcome.combination().map(|c| c.to_string()),
        Some("alt+ctrl+f9".to_string())
    );
    assert!(f.source.read_suppressed.load(Ordering::SeqCst));
    assert!(!f.manager.is_recording());
    assert_eq!(f.manager.active_bindings(), startup_bindings());

    f.manager.update_main_hotkey(Some("alt+ctrl+f9"));
    assert_eq!(f.source.installed(), vec!["alt+ctrl+f9", "ctrl+f11"]);
    assert_eq!(f.source.press("ctrl+f10"), 0);

    let reloaded = ConfigManager::load(f.dir.path());
    assert_eq!(reloaded.main_hotkey(), Some("alt+ctrl+f9"));
}

#[test]
fn modifier_only_recording_is_invalid() {
    let f = fixture();

    let rx = f.manager.begin_recording().unwrap();
    f.source
        .type_keys(&[("left shift", true), ("left shift", false)]);

    assert_eq!(rx.blocking_recv().unwrap(), RecordingOutcome::Invalid);
    assert_eq!(f.manager.active_bindings(), startup_bindings());
    assert_eq!(f.source.press("ctrl+f10"), 1);
}

#[test]
fn empty_main_hotkey_update_is_a_noop() {
    let f = fixture();
    let settings_path = f.dir.path().join("settings.json");
    std::fs::remove_file(&settings_path).unwrap();

    f.manager.update_main_hotkey(None);
    f.manager.update_main_hotkey(Some(""));

    assert!(!settings_path.exists());
    assert_eq!(f.manager.active_bindings(), startup_bindings());
}

#[test]
fn hotkey_for_deleted_preset_is_ignored() {
    let f = fixture();
    let presets_path = f.dir.path().join("presets.json");
    let before = std::fs::read_to_string(&presets_path).unwrap();

    f.manager.set_preset_hotkey("gone", Some("ctrl+f12"));

    assert_eq!(std::fs::read_to_string(&presets_path).unwrap(), before);
    assert_eq!(f.manager.active_bindings(), startup_bindings());
}

#[test]
fn preset_hotkey_is_stored_and_bound() {
    let f = fixture();
    f.manager.set_preset_hotkey("day", Some("ctrl+f12"));

    assert_eq!(f.source.press("ctrl+f12"), 1);
    assert_eq!(
        *f.fired.lock().unwrap(),
        vec![HotkeyAction::ActivatePreset("day".to_string())]
    );
    let reloaded = ConfigManager::load(f.dir.path());
    assert_eq!(
        reloaded.presets()["day"].hotkey.as_deref(),
        Some("ctrl+f12")
    );
}

#[test]
fn cancelled_recording_aborts_and_restores() {
    let f = fixture();
    assert!(!f.manager.cancel_recording());

    let rx = f.manager.begin_recording().unwrap();
    f.source.type_keys(&[("left ctrl", true)]);
    assert!(f.manager.cancel_recording());

    assert_eq!(rx.blocking_recv().unwrap(), RecordingOutcome::Aborted);
    assert!(!f.manager.is_recording());
    assert_eq!(f.manager.active_bindings(), startup_bindings());
}
