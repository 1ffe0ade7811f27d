//! State machine for the gamma toggle daemon
//!
//! All state transitions go through `reduce()`, which returns a new state
//! and a list of effects to execute. Every trigger (hotkey, control socket,
//! CLI) arrives as an `Event` on the same channel.

use uuid::Uuid;

use crate::gamma::ColorSettings;
use crate::hotkey::RecordingOutcome;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Filter {
    #[default]
    Off,
    On,
}

/// Whose hotkey a recording will replace
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordingTarget {
    Main,
    Preset(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingRecording {
    pub id: Uuid,
    pub target: RecordingTarget,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct State {
    pub filter: Filter,
    pub recording: Option<PendingRecording>,
}

impl State {
    pub fn is_active(&self) -> bool {
        self.filter == Filter::On
    }
}

#[derive(Debug, Clone)]
pub enum Event {
    /// Main hotkey, tray or `TOGGLE` datagram
    Toggle,
    ActivatePreset {
        name: String,
    },
    RecordHotkey {
        target: RecordingTarget,
    },
    CancelRecording,
    /// Recorder finished (includes id to prevent stale results)
    RecordingFinished {
        id: Uuid,
        outcome: RecordingOutcome,
    },
    RampFailed {
        err: String,
    },
    SetColor {
        key: String,
        value: f64,
    },
    /// Put one color value back to its default
    ResetColor {
        key: String,
    },
    SavePreset {
        name: String,
    },
    DeletePreset {
        name: String,
    },
    RenamePreset {
        from: String,
        to: String,
    },
    SetAutostart {
        enabled: bool,
    },
    /// Application exit requested
    Exit,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PresetEdit {
    Save { name: String },
    Delete { name: String },
    Rename { from: String, to: String },
}

/// Effects to be executed after a state transition.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    ApplyRamp,
    RestoreRamp,
    /// Copy a preset's colors into the settings; `reapply` if the filter is on
    LoadPreset {
        name: String,
        reapply: bool,
    },
    UpdateColor {
        key: String,
        value: f64,
        reapply: bool,
    },
    BeginRecording {
        id: Uuid,
    },
    CancelRecording,
    StoreHotkey {
        target: RecordingTarget,
        combination: String,
    },
    EditPresets(PresetEdit),
    SetAutostart(bool),
}

/// Reducer function: (state, event) -> (next_state, effects)
///
/// Key rules:
/// - Never mutate state directly
/// - Ignore recording results with stale ids
/// - At most one recording at a time; further requests are dropped
pub fn reduce(state: &State, event: Event) -> (State, Vec<Effect>) {
    use Effect as E;

    let reapply = state.is_active();

    match event {
        Event::Toggle => match state.filter {
            Filter::Off => (
                State {
                    filter: Filter::On,
                    ..state.clone()
                },
                vec![E::ApplyRamp],
            ),
            Filter::On => (
                State {
                    filter: Filter::Off,
                    ..state.clone()
                },
                vec![E::RestoreRamp],
            ),
        },

        Event::ActivatePreset { name } => (state.clone(), vec![E::LoadPreset { name, reapply }]),

        Event::SetColor { key, value } => (
            state.clone(),
            vec![E::UpdateColor {
                key,
                value,
                reapply,
            }],
        ),

        Event::ResetColor { key } => match ColorSettings::default().get(&key) {
            Some(value) => (
                state.clone(),
                vec![E::UpdateColor {
                    key,
                    value,
                    reapply,
                }],
            ),
            None => {
                log::warn!("Cannot reset unknown setting '{}'", key);
                (state.clone(), vec![])
            }
        },

        Event::RampFailed { err } => {
            log::warn!("Color ramp failed, filter off: {}", err);
            (
                State {
                    filter: Filter::Off,
                    ..state.clone()
                },
                vec![],
            )
        }

        // -----------------
        // Hotkey recording
        // -----------------
        Event::RecordHotkey { target } => {
            if let Some(pending) = &state.recording {
                log::debug!(
                    "Recording {} already pending, ignoring request for {:?}",
                    pending.id,
                    target
                );
                return (state.clone(), vec![]);
            }
            let id = Uuid::new_v4();
            (
                State {
                    recording: Some(PendingRecording { id, target }),
                    ..state.clone()
                },
                vec![E::BeginRecording { id }],
            )
        }

        Event::CancelRecording => match state.recording {
            // The recording stays pending until its result arrives
            Some(_) => (state.clone(), vec![E::CancelRecording]),
            None => (state.clone(), vec![]),
        },

        Event::RecordingFinished { id, outcome } => {
            let Some(pending) = state.recording.as_ref().filter(|p| p.id == id) else {
                log::debug!("Ignoring stale recording result {}", id);
                return (state.clone(), vec![]);
            };
            let next = State {
                recording: None,
                ..state.clone()
            };
            match outcome {
                RecordingOutcome::Captured(combination) => (
                    next,
                    vec![E::StoreHotkey {
                        target: pending.target.clone(),
                        combination: combination.to_string(),
                    }],
                ),
                // Previous hotkey stays; the registry was already restored
                RecordingOutcome::Invalid | RecordingOutcome::Aborted => (next, vec![]),
            }
        }

        // -----------------
        // Presets & settings
        // -----------------
        Event::SavePreset { name } => (
            state.clone(),
            vec![E::EditPresets(PresetEdit::Save { name })],
        ),
        Event::DeletePreset { name } => (
            state.clone(),
            vec![E::EditPresets(PresetEdit::Delete { name })],
        ),
        Event::RenamePreset { from, to } => (
            state.clone(),
            vec![E::EditPresets(PresetEdit::Rename { from, to })],
        ),
        Event::SetAutostart { enabled } => (state.clone(), vec![E::SetAutostart(enabled)]),

        // Handled at the loop edge
        Event::Exit => (state.clone(), vec![]),
    }
}
