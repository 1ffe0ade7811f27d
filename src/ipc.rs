//! Local control channel over loopback UDP
//!
//! The running daemon owns `127.0.0.1:65432`. A bare `TOGGLE` datagram
//! toggles the filter; every other command is a JSON object tagged by
//! `command`. There is no authentication: anything local may send.

use serde::{Deserialize, Serialize};
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4, UdpSocket as StdUdpSocket};
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::state_machine::{Event, RecordingTarget};

pub const LOCAL_PORT: u16 = 65432;

/// Plain-text toggle datagram
pub const TOGGLE_DATAGRAM: &str = "TOGGLE";

const MAX_DATAGRAM: usize = 4096;

pub fn local_addr() -> SocketAddr {
    SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::LOCALHOST, LOCAL_PORT))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum IpcCommand {
    Toggle,
    Preset {
        name: String,
    },
    /// Record a new hotkey for the preset, or the main toggle if `None`
    Record {
        #[serde(default)]
        preset: Option<String>,
    },
    Cancel,
    Set {
        key: String,
        value: f64,
    },
    Reset {
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
    Autostart {
        enabled: bool,
    },
    Quit,
}

impl IpcCommand {
    pub fn parse(datagram: &[u8]) -> Result<Self, String> {
        let text = std::str::from_utf8(datagram)
            .map_err(|e| format!("Datagram is not UTF-8: {}", e))?
            .trim();
        if text == TOGGLE_DATAGRAM {
            return Ok(IpcCommand::Toggle);
        }
        serde_json::from_str(text).map_err(|e| format!("Unknown command '{}': {}", text, e))
    }

    pub fn encode(&self) -> Result<Vec<u8>, String> {
        match self {
            IpcCommand::Toggle => Ok(TOGGLE_DATAGRAM.as_bytes().to_vec()),
            other => serde_json::to_vec(other).map_err(|e| e.to_string()),
        }
    }

    pub fn into_event(self) -> Event {
        match self {
            IpcCommand::Toggle => Event::Toggle,
            IpcCommand::Preset { name } => Event::ActivatePreset { name },
            IpcCommand::Record { preset } => Event::RecordHotkey {
                target: match preset {
                    Some(name) => RecordingTarget::Preset(name),
                    None => RecordingTarget::Main,
                },
            },
            IpcCommand::Cancel => Event::CancelRecording,
            IpcCommand::Set { key, value } => Event::SetColor { key, value },
            IpcCommand::Reset { key } => Event::ResetColor { key },
            IpcCommand::SavePreset { name } => Event::SavePreset { name },
            IpcCommand::DeletePreset { name } => Event::DeletePreset { name },
            IpcCommand::RenamePreset { from, to } => Event::RenamePreset { from, to },
            IpcCommand::Autostart { enabled } => Event::SetAutostart { enabled },
            IpcCommand::Quit => Event::Exit,
        }
    }
}

/// Send one command to the daemon at `addr`.
pub fn send_command_to(addr: SocketAddr, command: &IpcCommand) -> Result<(), String> {
    let socket = StdUdpSocket::bind((Ipv4Addr::LOCALHOST, 0))
        .map_err(|e| format!("Failed to open control socket: {}", e))?;
    let payload = command.encode()?;
    socket
        .send_to(&payload, addr)
        .map_err(|e| format!("Failed to send to {}: {}", addr, e))?;
    Ok(())
}

pub fn send_command(command: &IpcCommand) -> Result<(), String> {
    send_command_to(local_addr(), command)
}

/// Try to become the single running instance by binding the control port.
///
/// `Ok(None)` means another instance already holds it.
pub fn claim_instance() -> Result<Option<StdUdpSocket>, String> {
    match StdUdpSocket::bind(local_addr()) {
        Ok(socket) => Ok(Some(socket)),
        Err(e) if e.kind() == std::io::ErrorKind::AddrInUse => Ok(None),
        Err(e) => Err(format!("Failed to bind {}: {}", local_addr(), e)),
    }
}

/// Receive commands until cancelled, forwarding them as events.
pub async fn listen(socket: UdpSocket, tx: mpsc::Sender<Event>, cancel: CancellationToken) {
    let mut buf = vec![0u8; MAX_DATAGRAM];
    match socket.local_addr() {
        Ok(addr) => log::info!("Control channel listening on {}", addr),
        Err(e) => log::warn!("Control channel listening (address unknown: {})", e),
    }

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                log::debug!("Control channel stopped");
                return;
            }
            received = socket.recv_from(&mut buf) => {
                let (len, from) = match received {
                    Ok(r) => r,
                    Err(e) => {
                        log::warn!("Control channel receive error: {}", e);
                        continue;
                    }
                };
                match IpcCommand::parse(&buf[..len]) {
                    Ok(command) => {
                        log::info!("Control command from {}: {:?}", from, command);
                        if tx.send(command.into_event()).await.is_err() {
                            log::debug!("State loop gone, control channel exiting");
                            return;
                        }
                    }
                    Err(e) => log::warn!("Ignoring datagram from {}: {}", from, e),
                }
            }
        }
    }
}

/// Adopt a socket bound by [`claim_instance`] into the runtime.
pub fn into_async(socket: StdUdpSocket) -> Result<UdpSocket, String> {
    socket
        .set_nonblocking(true)
        .map_err(|e| format!("Failed to configure control socket: {}", e))?;
    UdpSocket::from_std(socket).map_err(|e| format!("Failed to register control socket: {}", e))
}
