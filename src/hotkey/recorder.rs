//! Interactive hotkey recording
//!
//! A session watches raw key transitions and remembers the largest chord
//! held at any one time. It resolves once at least one key went down and
//! every key is up again.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::{Combination, HotkeyError, KeyDirection, KeyEventSource, RawKeyEvent};

/// How a recording session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordingOutcome {
    /// A usable chord was pressed and released
    Captured(Combination),
    /// Only modifier keys were pressed
    Invalid,
    /// Cancelled, or the key source failed before the chord completed
    Aborted,
}

impl RecordingOutcome {
    pub fn combination(&self) -> Option<&Combination> {
        match self {
            RecordingOutcome::Captured(combo) => Some(combo),
            _ => None,
        }
    }
}

/// State of one capture in progress.
#[derive(Debug, Default)]
pub struct RecordingSession {
    /// Lower-cased physical key names currently down
    held: BTreeSet<String>,
    /// Largest simultaneous set seen so far
    max_combo: BTreeSet<String>,
    started: bool,
}

impl RecordingSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    /// Feed one event; returns the outcome once the session resolves.
    ///
    /// Releases seen before the first press (e.g. the Enter that launched
    /// the recording) are ignored.
    pub fn observe(&mut self, event: &RawKeyEvent) -> Option<RecordingOutcome> {
        let name = event.name.trim().to_lowercase();
        if name.is_empty() {
            return None;
        }

        match event.direction {
            KeyDirection::Down => {
                self.started = true;
                self.held.insert(name);
                if self.held.len() > self.max_combo.len() {
                    self.max_combo = self.held.clone();
                }
                None
            }
            KeyDirection::Up => {
                self.held.remove(&name);
                if self.started && self.held.is_empty() {
                    Some(self.resolve())
                } else {
                    None
                }
            }
        }
    }

    fn resolve(&self) -> RecordingOutcome {
        match Combination::from_keys(&self.max_combo) {
            Some(combo) => RecordingOutcome::Captured(combo),
            None => {
                log::info!(
                    "Invalid hotkey: modifiers only ({})",
                    self.max_combo.iter().cloned().collect::<Vec<_>>().join("+")
                );
                RecordingOutcome::Invalid
            }
        }
    }
}

/// Runs recording sessions against a key source on a dedicated thread.
pub struct HotkeyRecorder {
    source: Arc<dyn KeyEventSource>,
    suppress: bool,
}

/// A running recording thread.
pub struct RecordingHandle {
    source: Arc<dyn KeyEventSource>,
    cancelled: Arc<AtomicBool>,
}

impl RecordingHandle {
    /// Ask the session to end as `Aborted`. Has no effect once it resolved.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.source.interrupt();
    }
}

impl HotkeyRecorder {
    /// `suppress` withholds keys from other applications while capturing,
    /// so e.g. F10 does not open a menu bar.
    pub fn new(source: Arc<dyn KeyEventSource>, suppress: bool) -> Self {
        Self { source, suppress }
    }

    /// Spawn the blocking read loop. `on_done` runs on the recorder thread,
    /// exactly once, after the source has left capture mode.
    pub fn spawn<F>(&self, on_done: F) -> std::io::Result<RecordingHandle>
    where
        F: FnOnce(RecordingOutcome) + Send + 'static,
    {
        let source = self.source.clone();
        let suppress = self.suppress;
        let cancelled = Arc::new(AtomicBool::new(false));
        let flag = cancelled.clone();

        // Detached: the thread ends on its own once the session resolves
        std::thread::Builder::new()
            .name("hotkey-recorder".to_string())
            .spawn(move || {
                let outcome = run_session(source.as_ref(), suppress, &flag);
                source.end_capture();
                on_done(outcome);
            })?;

        Ok(RecordingHandle {
            source: self.source.clone(),
            cancelled,
        })
    }
}

/// Drive one session to completion.
///
/// An interrupt only ends the session when `cancelled` is set; a late
/// interrupt left over from an earlier session is skipped.
pub fn run_session(
    source: &dyn KeyEventSource,
    suppress: bool,
    cancelled: &AtomicBool,
) -> RecordingOutcome {
    let mut session = RecordingSession::new();
    log::info!("Recording hotkey: press the combination, then release");

    loop {
        if cancelled.load(Ordering::SeqCst) {
            log::info!("Recording cancelled");
            return RecordingOutcome::Aborted;
        }

        match source.read_next(suppress) {
            Ok(event) => {
                log::trace!("Recorder saw {:?} {}", event.direction, event.name);
                if let Some(outcome) = session.observe(&event) {
                    log::info!("Recording finished: {:?}", outcome);
                    return outcome;
                }
            }
            Err(HotkeyError::Interrupted) => {
                if !cancelled.load(Ordering::SeqCst) {
                    log::debug!("Ignoring stale capture interrupt");
                }
            }
            Err(e) => {
                log::warn!("Recording aborted: {}", e);
                return RecordingOutcome::Aborted;
            }
        }
    }
}
