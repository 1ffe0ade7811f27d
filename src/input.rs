//! Input manager: owns the hotkey registry and the recorder, and keeps the
//! active bindings in step with the configuration.
//!
//! Lock order is `state` then `config`. Config is never held while
//! acquiring `state`.

use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::oneshot;
use uuid::Uuid;

use crate::hotkey::{
    ActionSink, HotkeyAction, HotkeyRecorder, HotkeyRegistry, KeyEventSource, RecordingHandle,
    RecordingOutcome,
};
use crate::settings::ConfigManager;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

struct ActiveRecording {
    id: Uuid,
    handle: Option<RecordingHandle>,
}

struct InputState {
    registry: HotkeyRegistry,
    recording: Option<ActiveRecording>,
}

impl InputState {
    fn rebuild(&mut self, config: &Mutex<ConfigManager>) -> usize {
        let (main, presets) = {
            let config = lock(config);
            (config.main_hotkey().map(str::to_string), config.preset_hotkeys())
        };
        let count = self.registry.rebuild_from(main.as_deref(), &presets);
        log::info!("{} hotkey(s) active", count);
        count
    }
}

pub struct InputManager {
    config: Arc<Mutex<ConfigManager>>,
    recorder: HotkeyRecorder,
    state: Arc<Mutex<InputState>>,
}

impl InputManager {
    /// Build the registry over `source` and register the configured hotkeys.
    ///
    /// `sink` receives every fired action, on the source's dispatch context.
    pub fn new(
        config: Arc<Mutex<ConfigManager>>,
        source: Arc<dyn KeyEventSource>,
        sink: ActionSink,
    ) -> Self {
        let manager = Self {
            recorder: HotkeyRecorder::new(source.clone(), true),
            state: Arc::new(Mutex::new(InputState {
                registry: HotkeyRegistry::new(source, sink),
                recording: None,
            })),
            config,
        };
        manager.register_shortcuts();
        manager
    }

    /// Rebuild every binding from the current configuration.
    ///
    /// Does nothing while a recording is in progress; the registry is
    /// restored when the recording ends.
    pub fn register_shortcuts(&self) {
        let mut state = lock(&self.state);
        if state.recording.is_some() {
            log::debug!("Recording in progress, not registering hotkeys");
            return;
        }
        state.rebuild(&self.config);
    }

    /// Start capturing a new combination.
    ///
    /// Returns `None` if a recording is already running. Otherwise the
    /// receiver yields the outcome exactly once, after live hotkeys have
    /// been restored.
    pub fn begin_recording(&self) -> Option<oneshot::Receiver<RecordingOutcome>> {
        let mut state = lock(&self.state);
        if let Some(active) = &state.recording {
            log::debug!("Recording {} already in progress, ignoring", active.id);
            return None;
        }

        let id = Uuid::new_v4();
        // Registered hotkeys must not fire while the chord is captured
        state.registry.clear();
        state.recording = Some(ActiveRecording { id, handle: None });

        let (tx, rx) = oneshot::channel();
        let shared = self.state.clone();
        let config = self.config.clone();

        let spawned = self.recorder.spawn(move |outcome| {
            {
                let mut state = lock(&shared);
                if state.recording.as_ref().map(|r| r.id) == Some(id) {
                    state.recording = None;
                }
                state.rebuild(&config);
            }
            if tx.send(outcome).is_err() {
                log::debug!("Recording {} result dropped (receiver gone)", id);
            }
        });

        match spawned {
            Ok(handle) => {
                log::info!("Recording {} started", id);
                if let Some(active) = state.recording.as_mut() {
                    active.handle = Some(handle);
                }
                Some(rx)
            }
            Err(e) => {
                log::error!("Failed to start hotkey recorder: {}", e);
                state.recording = None;
                state.rebuild(&self.config);

                let (tx, rx) = oneshot::channel();
                let _ = tx.send(RecordingOutcome::Aborted);
                Some(rx)
            }
        }
    }

    /// Abort the running recording, if any. Its receiver gets `Aborted`.
    pub fn cancel_recording(&self) -> bool {
        let state = lock(&self.state);
        match &state.recording {
            Some(active) => {
                log::info!("Cancelling recording {}", active.id);
                if let Some(handle) = &active.handle {
                    handle.cancel();
                }
                true
            }
            None => false,
        }
    }

    pub fn is_recording(&self) -> bool {
        lock(&self.state).recording.is_some()
    }

    /// Canonical combination strings currently bound, with their actions
    pub fn active_bindings(&self) -> Vec<(String, HotkeyAction)> {
        lock(&self.state).registry.bindings()
    }

    /// Store and persist a new main hotkey, then re-register.
    ///
    /// `None` or an empty string leaves everything untouched.
    pub fn update_main_hotkey(&self, combination: Option<&str>) {
        let Some(hotkey) = combination.map(str::trim).filter(|h| !h.is_empty()) else {
            log::debug!("Ignoring empty main hotkey update");
            return;
        };

        {
            let mut config = lock(&self.config);
            config.set_main_hotkey(hotkey);
            if let Err(e) = config.save_settings() {
                log::warn!("Failed to save main hotkey: {}", e);
            }
        }
        log::info!("Main hotkey set to {}", hotkey);
        self.register_shortcuts();
    }

    /// Same as [`update_main_hotkey`](Self::update_main_hotkey) for one
    /// preset. A preset deleted in the meantime is ignored.
    pub fn set_preset_hotkey(&self, preset: &str, combination: Option<&str>) {
        let Some(hotkey) = combination.map(str::trim).filter(|h| !h.is_empty()) else {
            log::debug!("Ignoring empty hotkey for preset {}", preset);
            return;
        };

        {
            let mut config = lock(&self.config);
            if !config.set_preset_hotkey(preset, hotkey) {
                log::info!("Preset {} no longer exists, hotkey not stored", preset);
                return;
            }
            if let Err(e) = config.save_presets() {
                log::warn!("Failed to save hotkey for preset {}: {}", preset, e);
            }
        }
        log::info!("Preset {} hotkey set to {}", preset, hotkey);
        self.register_shortcuts();
    }
}
