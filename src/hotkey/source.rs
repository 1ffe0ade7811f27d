//! evdev key-event source - device monitoring, hotkey dispatch and raw capture

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{self as std_mpsc, Receiver, SyncSender, TryRecvError, TrySendError};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Instant;

use evdev::{Device, InputEventKind, Key};
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use super::detector::HotkeyDetector;
use super::keys::{is_known_key, key_name};
use super::{Combination, HotkeyError, HotkeyHandler, KeyEventSource, RawKeyEvent};

/// Debounce duration to prevent rapid hotkey spam
const DEBOUNCE_MS: u64 = 200;

/// Raw events buffered for a recorder that has not read them yet
const CAPTURE_QUEUE: usize = 64;

/// Shared state for debouncing across all device monitors
struct DebounceState {
    /// Timestamp of last trigger in milliseconds since start
    last_trigger_ms: AtomicU64,
    /// Start time for calculating elapsed time
    start: Instant,
}

impl DebounceState {
    fn new() -> Self {
        Self {
            last_trigger_ms: AtomicU64::new(0),
            start: Instant::now(),
        }
    }

    /// Check if we should trigger and update the last trigger time
    /// Returns true if trigger should proceed (not debounced)
    fn should_trigger(&self) -> bool {
        let now_ms = self.start.elapsed().as_millis() as u64;
        let last = self.last_trigger_ms.load(Ordering::SeqCst);

        if now_ms.saturating_sub(last) >= DEBOUNCE_MS {
            // Only the monitor that wins the CAS fires
            match self.last_trigger_ms.compare_exchange(
                last,
                now_ms,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => true,
                Err(_) => {
                    log::trace!("Hotkey debounce: another device won the race");
                    false
                }
            }
        } else {
            log::trace!(
                "Hotkey debounced ({}ms since last trigger)",
                now_ms.saturating_sub(last)
            );
            false
        }
    }
}

/// Find all keyboard devices on the system
pub fn find_keyboards() -> Vec<(PathBuf, Device)> {
    evdev::enumerate()
        .filter_map(|(path, device)| {
            // A keyboard should support common keys
            let is_keyboard = device.supported_keys().map_or(false, |keys| {
                keys.contains(Key::KEY_ENTER)
                    && keys.contains(Key::KEY_SPACE)
                    && keys.contains(Key::KEY_A)
                    && keys.contains(Key::KEY_Z)
            });

            if is_keyboard {
                let name = device.name().unwrap_or("Unknown");
                log::info!("Found keyboard device: {:?} ({})", path, name);
                Some((path, device))
            } else {
                None
            }
        })
        .collect()
}

/// Check if we have permission to access input devices
/// Takes pre-discovered keyboards to avoid redundant enumeration
pub fn check_permissions(keyboards: &[(PathBuf, Device)]) -> Result<(), String> {
    if keyboards.is_empty() {
        let all_devices: Vec<_> = evdev::enumerate().collect();

        if all_devices.is_empty() {
            return Err(
                "No input devices found. Ensure you are in the 'input' group:\n\
                 sudo usermod -aG input $USER\n\
                 Then log out and back in."
                    .to_string(),
            );
        } else {
            return Err(format!(
                "Found {} input devices but none appear to be keyboards. \
                 This might be a permissions issue or no keyboard is connected.",
                all_devices.len()
            ));
        }
    }

    Ok(())
}

/// Reject combinations naming keys no keyboard can report.
fn validate_keys(combination: &Combination) -> Result<(), HotkeyError> {
    match combination.keys().find(|k| !is_known_key(k)) {
        Some(unknown) => Err(HotkeyError::UnknownKey(unknown.to_string())),
        None => Ok(()),
    }
}

enum SourceMessage {
    /// Tagged with the capture session it was read in
    Key { session: u64, event: RawKeyEvent },
    Interrupted,
}

struct InstalledHotkey {
    combination: Combination,
    handler: HotkeyHandler,
}

/// State shared between the source handle and its device monitors
struct Shared {
    hotkeys: RwLock<Vec<InstalledHotkey>>,
    /// While set, events go to `read_next` and are never matched
    capturing: AtomicBool,
    /// Bumped when a capture ends; queued events from older sessions are dropped
    session: AtomicU64,
    /// Whether devices should be grabbed (keys withheld from other apps)
    grab_tx: watch::Sender<bool>,
    capture_tx: SyncSender<SourceMessage>,
    debounce: DebounceState,
}

impl Shared {
    fn dispatch(&self, name: &str, value: i32, detector: &mut HotkeyDetector) {
        // Read before the flag: `end_capture` clears the flag before bumping it
        let session = self.session.load(Ordering::SeqCst);
        if self.capturing.load(Ordering::SeqCst) {
            detector.track(name, value);
            let event = match value {
                0 => RawKeyEvent::up(name),
                1 => RawKeyEvent::down(name),
                _ => return,
            };
            match self.capture_tx.try_send(SourceMessage::Key { session, event }) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => log::warn!("Capture queue full, dropping key event"),
                Err(TrySendError::Disconnected(_)) => {}
            }
            return;
        }

        let handler = {
            let hotkeys = match self.hotkeys.read() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            let matched =
                detector.process_key(name, value, hotkeys.iter().map(|h| &h.combination));
            let Some(combination) = matched else {
                return;
            };
            log::debug!("Hotkey matched: {}", combination);
            hotkeys
                .iter()
                .find(|h| h.combination == combination)
                .map(|h| h.handler.clone())
        };

        if let Some(handler) = handler {
            if self.debounce.should_trigger() {
                handler();
            }
        }
    }
}

/// Reads every keyboard under /dev/input and serves both dispatch paths.
pub struct EvdevKeySource {
    shared: Arc<Shared>,
    capture_rx: Mutex<Receiver<SourceMessage>>,
    cancel_token: CancellationToken,
    device_count: usize,
}

impl EvdevKeySource {
    /// Start monitoring all keyboards on the given runtime.
    pub fn start(runtime: &Handle) -> Result<Self, String> {
        let keyboards = find_keyboards();
        check_permissions(&keyboards)?;

        let mut source = Self::without_devices();
        let shared = source.shared.clone();
        let cancel_token = source.cancel_token.clone();
        let device_count = keyboards.len();
        source.device_count = device_count;
        log::info!(
            "Starting key monitoring on {} device(s), debounce: {}ms",
            device_count,
            DEBOUNCE_MS
        );

        for (path, device) in keyboards {
            let shared = shared.clone();
            let cancel = cancel_token.clone();
            let grab_rx = shared.grab_tx.subscribe();
            let path_str = path.to_string_lossy().to_string();

            // Event streams register with the reactor, so build them inside it
            runtime.spawn(async move {
                Self::monitor_device(path_str, device, shared, grab_rx, cancel).await;
            });
        }

        Ok(source)
    }

    fn without_devices() -> Self {
        let (capture_tx, capture_rx) = std_mpsc::sync_channel(CAPTURE_QUEUE);
        let (grab_tx, _) = watch::channel(false);
        Self {
            shared: Arc::new(Shared {
                hotkeys: RwLock::new(Vec::new()),
                capturing: AtomicBool::new(false),
                session: AtomicU64::new(0),
                grab_tx,
                capture_tx,
                debounce: DebounceState::new(),
            }),
            capture_rx: Mutex::new(capture_rx),
            cancel_token: CancellationToken::new(),
            device_count: 0,
        }
    }

    pub fn device_count(&self) -> usize {
        self.device_count
    }

    /// Monitor a single keyboard device
    async fn monitor_device(
        path: String,
        device: Device,
        shared: Arc<Shared>,
        mut grab_rx: watch::Receiver<bool>,
        cancel: CancellationToken,
    ) {
        let name = device.name().unwrap_or("Unknown").to_string();
        log::info!("Monitoring keyboard device: {} ({})", path, name);

        let mut detector = HotkeyDetector::new();
        let mut grabbed = false;

        let mut stream = match device.into_event_stream() {
            Ok(s) => s,
            Err(e) => {
                log::error!("Failed to create event stream for {}: {}", path, e);
                return;
            }
        };

        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    log::info!("Key monitoring cancelled for {}", path);
                    break;
                }

                changed = grab_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }

                result = stream.next_event() => {
                    match result {
                        Ok(ev) => {
                            if let InputEventKind::Key(key) = ev.kind() {
                                if let Some(key_name) = key_name(key) {
                                    shared.dispatch(&key_name, ev.value(), &mut detector);
                                }
                            }
                        }
                        Err(e) => {
                            log::warn!("Device read error for {} (disconnected?): {}", path, e);
                            break;
                        }
                    }
                }
            }

            // Grabbing mid-chord would leave keys stuck down in the compositor
            let want_grab = *grab_rx.borrow();
            if want_grab != grabbed && detector.is_idle() {
                let device = stream.device_mut();
                let result = if want_grab { device.grab() } else { device.ungrab() };
                match result {
                    Ok(()) => {
                        grabbed = want_grab;
                        log::debug!("{} {}", if grabbed { "Grabbed" } else { "Released" }, path);
                    }
                    Err(e) => {
                        log::warn!("Failed to change grab on {}: {}", path, e);
                        // Don't retry on every event
                        grabbed = want_grab;
                    }
                }
            }
        }

        if grabbed {
            if let Err(e) = stream.device_mut().ungrab() {
                log::warn!("Failed to release {}: {}", path, e);
            }
        }
        log::info!("Stopped monitoring device: {}", path);
    }

    /// Stop all device monitors
    pub fn stop(&self) {
        log::info!("Stopping key monitoring");
        self.cancel_token.cancel();
    }
}

impl KeyEventSource for EvdevKeySource {
    fn read_next(&self, suppress: bool) -> Result<RawKeyEvent, HotkeyError> {
        self.shared.capturing.store(true, Ordering::SeqCst);
        self.shared.grab_tx.send_if_modified(|grab| {
            let changed = *grab != suppress;
            *grab = suppress;
            changed
        });

        let session = self.shared.session.load(Ordering::SeqCst);
        let rx = match self.capture_rx.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        loop {
            match rx.recv() {
                Ok(SourceMessage::Key { session: from, event }) if from == session => {
                    return Ok(event)
                }
                Ok(SourceMessage::Key { .. }) => {
                    log::trace!("Dropping key event left over from an ended capture");
                }
                Ok(SourceMessage::Interrupted) => return Err(HotkeyError::Interrupted),
                Err(_) => {
                    return Err(HotkeyError::DeviceUnavailable(
                        "key source shut down".to_string(),
                    ))
                }
            }
        }
    }

    fn install_hotkey(
        &self,
        combination: &Combination,
        handler: HotkeyHandler,
        suppress: bool,
    ) -> Result<(), HotkeyError> {
        validate_keys(combination)?;
        if suppress {
            log::debug!("Per-hotkey suppression is not supported by evdev; '{}' passes through", combination);
        }

        let mut hotkeys = match self.shared.hotkeys.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        hotkeys.push(InstalledHotkey {
            combination: combination.clone(),
            handler,
        });
        Ok(())
    }

    fn uninstall_all_hotkeys(&self) {
        let mut hotkeys = match self.shared.hotkeys.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        hotkeys.clear();
    }

    fn end_capture(&self) {
        self.shared.capturing.store(false, Ordering::SeqCst);
        self.shared.session.fetch_add(1, Ordering::SeqCst);
        self.shared.grab_tx.send_if_modified(|grab| {
            let changed = *grab;
            *grab = false;
            changed
        });

        let rx = match self.capture_rx.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        loop {
            match rx.try_recv() {
                Ok(_) => continue,
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
    }

    fn interrupt(&self) {
        if let Err(e) = self.shared.capture_tx.try_send(SourceMessage::Interrupted) {
            log::warn!("Failed to interrupt key capture: {}", e);
        }
    }
}

impl Drop for EvdevKeySource {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Stand-in used when no keyboard is readable; the app keeps running
/// without hotkeys.
pub struct DisabledKeySource {
    reason: String,
}

impl DisabledKeySource {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl KeyEventSource for DisabledKeySource {
    fn read_next(&self, _suppress: bool) -> Result<RawKeyEvent, HotkeyError> {
        Err(HotkeyError::DeviceUnavailable(self.reason.clone()))
    }

    fn install_hotkey(
        &self,
        _combination: &Combination,
        _handler: HotkeyHandler,
        _suppress: bool,
    ) -> Result<(), HotkeyError> {
        Err(HotkeyError::DeviceUnavailable(self.reason.clone()))
    }

    fn uninstall_all_hotkeys(&self) {}
}
