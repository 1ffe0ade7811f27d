//! Effect runner for the gamma toggle daemon
//!
//! Effects from the reducer run strictly in the order they were produced,
//! on one worker task. Display and file I/O go to the blocking pool.
//! Failures come back to the state loop as events.

use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::gamma::{ColorRamp, RampError};
use crate::hotkey::RecordingOutcome;
use crate::input::InputManager;
use crate::settings::ConfigManager;
use crate::state_machine::{Effect, Event, PresetEdit, RecordingTarget};

/// Trait for running effects asynchronously.
/// Completion events are sent back via the provided channel.
pub trait EffectRunner: Send + Sync + 'static {
    fn spawn(&self, effect: Effect, tx: mpsc::Sender<Event>);
}

/// Creates or removes the start-with-session entry
pub type AutostartSync = Arc<dyn Fn(bool) -> Result<bool, String> + Send + Sync>;

fn lock<T: ?Sized>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

type Job = (Effect, mpsc::Sender<Event>);

/// Everything an effect may touch
#[derive(Clone)]
struct Context {
    config: Arc<Mutex<ConfigManager>>,
    ramp: Arc<Mutex<Box<dyn ColorRamp>>>,
    input: Arc<InputManager>,
    autostart: AutostartSync,
}

impl Context {
    /// Push the current colors to the display
    fn apply_current(&self) -> Result<(), RampError> {
        let colors = lock(&self.config).settings().color;
        lock(&self.ramp).apply(&colors)
    }

    fn save_settings(&self) {
        if let Err(e) = lock(&self.config).save_settings() {
            log::warn!("Failed to save settings: {}", e);
        }
    }

    fn run_blocking(&self, effect: Effect) -> Option<Event> {
        match effect {
            Effect::ApplyRamp => {
                if let Err(e) = self.apply_current() {
                    return Some(Event::RampFailed { err: e.to_string() });
                }
                log::info!("Filter on");
            }

            Effect::RestoreRamp => {
                if let Err(e) = lock(&self.ramp).restore() {
                    log::warn!("Failed to restore display ramp: {}", e);
                }
                log::info!("Filter off");
            }

            Effect::LoadPreset { name, reapply } => {
                let loaded = lock(&self.config).load_preset(&name);
                if !loaded {
                    log::warn!("Preset {} not found", name);
                    return None;
                }
                log::info!("Loaded preset {}", name);
                self.save_settings();
                if reapply {
                    if let Err(e) = self.apply_current() {
                        return Some(Event::RampFailed { err: e.to_string() });
                    }
                }
            }

            Effect::UpdateColor {
                key,
                value,
                reapply,
            } => {
                let updated = lock(&self.config).settings_mut().color.set(&key, value);
                if let Err(e) = updated {
                    log::warn!("Rejected color change: {}", e);
                    return None;
                }
                self.save_settings();
                if reapply {
                    if let Err(e) = self.apply_current() {
                        return Some(Event::RampFailed { err: e.to_string() });
                    }
                }
            }

            Effect::StoreHotkey {
                target,
                combination,
            } => match target {
                RecordingTarget::Main => self.input.update_main_hotkey(Some(&combination)),
                RecordingTarget::Preset(name) => {
                    self.input.set_preset_hotkey(&name, Some(&combination))
                }
            },

            Effect::EditPresets(edit) => {
                let result = {
                    let mut config = lock(&self.config);
                    match &edit {
                        PresetEdit::Save { name } => config.save_preset(name).map(|()| true),
                        PresetEdit::Delete { name } => config.delete_preset(name),
                        PresetEdit::Rename { from, to } => config.rename_preset(from, to),
                    }
                };
                match result {
                    Ok(true) => log::info!("Presets updated: {:?}", edit),
                    Ok(false) => log::warn!("Preset edit had no effect: {:?}", edit),
                    Err(e) => log::error!("Failed to save presets: {}", e),
                }
                // Preset hotkeys may have appeared, moved or gone
                self.input.register_shortcuts();
            }

            Effect::SetAutostart(enabled) => {
                lock(&self.config).settings_mut().autostart = enabled;
                self.save_settings();
                if let Err(e) = (self.autostart)(enabled) {
                    log::error!("Failed to update autostart: {}", e);
                }
            }

            Effect::BeginRecording { .. } | Effect::CancelRecording => {
                log::error!("Recording effects are not blocking work: {:?}", effect);
            }
        }
        None
    }

    async fn run(&self, effect: Effect, tx: &mpsc::Sender<Event>) {
        match effect {
            Effect::BeginRecording { id } => {
                let Some(rx) = self.input.begin_recording() else {
                    log::warn!("Recorder busy, dropping recording {}", id);
                    let _ = tx
                        .send(Event::RecordingFinished {
                            id,
                            outcome: RecordingOutcome::Aborted,
                        })
                        .await;
                    return;
                };
                // Awaited on its own task so later effects (cancel) still run
                let tx = tx.clone();
                tokio::spawn(async move {
                    let outcome = rx.await.unwrap_or(RecordingOutcome::Aborted);
                    let _ = tx.send(Event::RecordingFinished { id, outcome }).await;
                });
            }

            Effect::CancelRecording => {
                if !self.input.cancel_recording() {
                    log::debug!("No recording to cancel");
                }
            }

            other => {
                let ctx = self.clone();
                match tokio::task::spawn_blocking(move || ctx.run_blocking(other)).await {
                    Ok(Some(event)) => {
                        let _ = tx.send(event).await;
                    }
                    Ok(None) => {}
                    Err(e) => log::error!("Effect task failed: {}", e),
                }
            }
        }
    }
}

/// Runs effects one at a time against the display, settings and hotkeys.
pub struct AppEffectRunner {
    ctx: Context,
    queue: Mutex<Option<mpsc::UnboundedSender<Job>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl AppEffectRunner {
    /// Must be called from within a tokio runtime.
    pub fn new(
        config: Arc<Mutex<ConfigManager>>,
        ramp: Box<dyn ColorRamp>,
        input: Arc<InputManager>,
    ) -> Arc<Self> {
        Self::with_autostart(config, ramp, input, Arc::new(crate::autostart::sync))
    }

    pub fn with_autostart(
        config: Arc<Mutex<ConfigManager>>,
        ramp: Box<dyn ColorRamp>,
        input: Arc<InputManager>,
        autostart: AutostartSync,
    ) -> Arc<Self> {
        let ctx = Context {
            config,
            ramp: Arc::new(Mutex::new(ramp)),
            input,
            autostart,
        };

        let (queue, mut jobs) = mpsc::unbounded_channel::<Job>();
        let worker_ctx = ctx.clone();
        let worker = tokio::spawn(async move {
            while let Some((effect, tx)) = jobs.recv().await {
                log::debug!("Running effect: {:?}", effect);
                worker_ctx.run(effect, &tx).await;
            }
            log::debug!("Effect worker stopped");
        });

        Arc::new(Self {
            ctx,
            queue: Mutex::new(Some(queue)),
            worker: Mutex::new(Some(worker)),
        })
    }

    /// Finish queued effects, put the display back and save settings.
    pub async fn shutdown(&self) {
        lock(&self.queue).take();
        let worker = lock(&self.worker).take();
        if let Some(worker) = worker {
            if let Err(e) = worker.await {
                log::error!("Effect worker panicked: {}", e);
            }
        }

        let ctx = self.ctx.clone();
        let cleanup = tokio::task::spawn_blocking(move || {
            ctx.input.cancel_recording();
            {
                let mut ramp = lock(&ctx.ramp);
                if ramp.is_active() {
                    match ramp.restore() {
                        Ok(()) => log::info!("Display ramp restored"),
                        Err(e) => log::warn!("Failed to restore display ramp on exit: {}", e),
                    }
                }
            }
            ctx.save_settings();
        });
        if let Err(e) = cleanup.await {
            log::error!("Shutdown cleanup failed: {}", e);
        }
    }

    pub fn settings_dir(&self) -> PathBuf {
        lock(&self.ctx.config).dir().to_path_buf()
    }
}

impl EffectRunner for AppEffectRunner {
    fn spawn(&self, effect: Effect, tx: mpsc::Sender<Event>) {
        match lock(&self.queue).as_ref() {
            Some(queue) => {
                if queue.send((effect, tx)).is_err() {
                    log::error!("Effect worker is gone");
                }
            }
            None => log::warn!("Shutting down, dropping effect {:?}", effect),
        }
    }
}
