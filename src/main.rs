//! CLI entry point for gammakey
//!
//! Without a subcommand, starts the daemon, or toggles the filter of the
//! instance that is already running.

use clap::{Parser, Subcommand};
use std::process::ExitCode;

use gammakey::ipc::{self, IpcCommand};
use gammakey::settings::{self, ConfigManager};

#[derive(Parser)]
#[command(name = "gammakey")]
#[command(author, version, about = "Hotkey-driven display gamma toggle", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the daemon in the foreground
    Run,

    /// Toggle the color filter
    Toggle,

    /// Load a preset into the current settings
    Preset { name: String },

    /// Record a new hotkey (for the main toggle, or a preset)
    Record {
        #[arg(short, long)]
        preset: Option<String>,
    },

    /// Cancel a hotkey recording in progress
    Cancel,

    /// Set a color value (brightness, contrast, gamma, red_scale, ...)
    Set { key: String, value: f64 },

    /// Put a color value back to its default
    Reset { key: String },

    /// Save the current color values as a preset
    SavePreset { name: String },

    DeletePreset { name: String },

    RenamePreset { old: String, new: String },

    /// Start with the desktop session
    Autostart {
        #[arg(action = clap::ArgAction::Set)]
        enabled: bool,
    },

    /// Show settings, presets and their hotkeys
    List,

    /// Stop the running daemon
    Quit,
}

impl Commands {
    fn into_ipc(self) -> Option<IpcCommand> {
        Some(match self {
            Commands::Toggle => IpcCommand::Toggle,
            Commands::Preset { name } => IpcCommand::Preset { name },
            Commands::Record { preset } => IpcCommand::Record { preset },
            Commands::Cancel => IpcCommand::Cancel,
            Commands::Set { key, value } => IpcCommand::Set { key, value },
            Commands::Reset { key } => IpcCommand::Reset { key },
            Commands::SavePreset { name } => IpcCommand::SavePreset { name },
            Commands::DeletePreset { name } => IpcCommand::DeletePreset { name },
            Commands::RenamePreset { old, new } => IpcCommand::RenamePreset { from: old, to: new },
            Commands::Autostart { enabled } => IpcCommand::Autostart { enabled },
            Commands::Quit => IpcCommand::Quit,
            Commands::Run | Commands::List => return None,
        })
    }
}

fn start_or_toggle(explicit_run: bool) -> Result<(), String> {
    match ipc::claim_instance()? {
        Some(socket) => gammakey::run(socket),
        None if explicit_run => Err("GammaKey is already running".to_string()),
        None => {
            log::info!("GammaKey is already running, sending toggle");
            ipc::send_command(&IpcCommand::Toggle)
        }
    }
}

fn send_to_daemon(command: IpcCommand) -> Result<(), String> {
    // Binding succeeds only if nobody owns the port
    if ipc::claim_instance()?.is_some() {
        return Err("GammaKey is not running".to_string());
    }
    ipc::send_command(&command)
}

fn list() -> Result<(), String> {
    let config = ConfigManager::load(settings::default_config_dir());
    let current = config.settings();

    println!("Settings ({})", config.dir().display());
    for (key, _, _) in gammakey::gamma::ColorSettings::KEYS {
        if let Some(value) = current.color.get(key) {
            println!("  {:<12} {:.2}", key, value);
        }
    }
    println!(
        "  {:<12} {}",
        "hotkey",
        config.main_hotkey().unwrap_or("(none)")
    );
    println!("  {:<12} {}", "autostart", current.autostart);

    if config.presets().is_empty() {
        println!("No presets");
        return Ok(());
    }
    println!("Presets");
    for (name, preset) in config.presets() {
        println!(
            "  {:<16} {}",
            name,
            preset.hotkey.as_deref().unwrap_or("(no hotkey)")
        );
    }
    Ok(())
}

fn main() -> ExitCode {
    // Load .env file if present (for development convenience)
    let _ = dotenvy::dotenv();
    gammakey::logging::init();

    let cli = Cli::parse();
    let result = match cli.command {
        None => start_or_toggle(false),
        Some(Commands::Run) => start_or_toggle(true),
        Some(Commands::List) => list(),
        Some(other) => match other.into_ipc() {
            Some(command) => send_to_daemon(command),
            None => Ok(()),
        },
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
