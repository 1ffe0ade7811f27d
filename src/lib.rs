pub mod autostart;
pub mod effects;
pub mod gamma;
pub mod hotkey;
pub mod input;
pub mod ipc;
pub mod logging;
pub mod settings;
pub mod state_machine;

use std::net::UdpSocket as StdUdpSocket;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use effects::{AppEffectRunner, EffectRunner};
use gamma::{ColorRamp, UnavailableRamp, XrandrRamp};
use hotkey::{ActionSink, DisabledKeySource, EvdevKeySource, HotkeyAction, KeyEventSource};
use input::InputManager;
use settings::ConfigManager;
use state_machine::{reduce, Event, State};

/// Run the main state loop
async fn run_state_loop(
    mut rx: mpsc::Receiver<Event>,
    tx: mpsc::Sender<Event>,
    effect_runner: Arc<dyn EffectRunner>,
) {
    let mut state = State::default();
    log::info!("State loop started");

    while let Some(event) = rx.recv().await {
        log::debug!("Received event: {:?}", event);

        // Handle Exit at the edge
        if matches!(event, Event::Exit) {
            log::info!("Exit requested, shutting down state loop");
            break;
        }

        let (next, effects) = reduce(&state, event);
        if next.filter != state.filter {
            log::info!("Filter {:?} -> {:?}", state.filter, next.filter);
        }
        state = next;

        for eff in effects {
            effect_runner.spawn(eff, tx.clone());
        }
    }

    log::info!("State loop ended");
}

/// Forward fired hotkeys into the state loop
fn hotkey_sink(tx: mpsc::Sender<Event>) -> ActionSink {
    Arc::new(move |action| {
        let event = match action {
            HotkeyAction::ToggleMain => Event::Toggle,
            HotkeyAction::ActivatePreset(name) => Event::ActivatePreset { name },
        };
        if let Err(e) = tx.try_send(event) {
            log::error!("Failed to send hotkey event: {}", e);
        }
    })
}

fn detect_ramp() -> Box<dyn ColorRamp> {
    match XrandrRamp::detect() {
        Ok(ramp) => Box::new(ramp),
        Err(e) => {
            log::error!("Display color control unavailable: {}", e);
            // Keep running so hotkeys and presets can still be managed
            Box::new(UnavailableRamp::new(e.to_string()))
        }
    }
}

/// Run the daemon until a quit command or Ctrl+C.
///
/// `control` is the already-bound control socket (see [`ipc::claim_instance`]).
pub fn run(control: StdUdpSocket) -> Result<(), String> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("gammakey")
        .build()
        .map_err(|e| format!("Failed to start async runtime: {}", e))?;

    let config = ConfigManager::load(settings::default_config_dir());
    log::info!("Settings loaded from {:?}", config.dir());
    if let Err(e) = autostart::sync(config.settings().autostart) {
        log::warn!("Failed to sync autostart entry: {}", e);
    }
    let config = Arc::new(Mutex::new(config));
    let ramp = detect_ramp();

    runtime.block_on(async move {
        let (tx, rx) = mpsc::channel::<Event>(32);

        // Start key monitoring; the app continues without hotkeys on failure
        let evdev = match EvdevKeySource::start(&tokio::runtime::Handle::current()) {
            Ok(source) => {
                log::info!("Key monitoring active on {} device(s)", source.device_count());
                Some(Arc::new(source))
            }
            Err(e) => {
                log::error!("Failed to start key monitoring: {}", e);
                None
            }
        };
        let source: Arc<dyn KeyEventSource> = match &evdev {
            Some(source) => source.clone(),
            None => Arc::new(DisabledKeySource::new("no readable keyboard")),
        };

        let input = Arc::new(InputManager::new(
            config.clone(),
            source,
            hotkey_sink(tx.clone()),
        ));
        let effect_runner = AppEffectRunner::new(config, ramp, input);

        let cancel = CancellationToken::new();
        let socket = ipc::into_async(control)?;
        tokio::spawn(ipc::listen(socket, tx.clone(), cancel.clone()));

        let ctrl_c_tx = tx.clone();
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    log::info!("Interrupted, exiting");
                    let _ = ctrl_c_tx.send(Event::Exit).await;
                }
                Err(e) => log::warn!("Failed to listen for Ctrl+C: {}", e),
            }
        });

        log::info!("GammaKey started");
        run_state_loop(rx, tx, effect_runner.clone()).await;

        cancel.cancel();
        effect_runner.shutdown().await;
        if let Some(source) = evdev {
            source.stop();
        }
        log::info!("GammaKey stopped");
        Ok::<(), String>(())
    })
}
