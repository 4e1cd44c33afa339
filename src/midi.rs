//! MIDI transport to the amplifier
//!
//! Owns the midir input/output connections. Receiving is push-based: the
//! driver callback filters SysEx frames and hands them to a bounded
//! channel; nothing above this layer ever blocks on a read. The two
//! directions connect and fail independently.

use async_trait::async_trait;
use midir::{MidiInput, MidiInputConnection, MidiOutput, MidiOutputConnection};
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::protocol::is_sysex;

/// Capacity of the inbound frame queue. The synchronizer drains it on its
/// own task; a stalled consumer drops frames instead of blocking the
/// driver callback.
const FRAME_QUEUE_CAPACITY: usize = 256;

/// Connection state of the device link, per direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectState {
    /// No matching port was found at all
    AbsentDevice,
    /// Ports exist but no connection attempt succeeded yet
    Disconnected,
    InputOnly,
    OutputOnly,
    Connected,
}

/// Transport-level failures.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConnectError {
    #[error("no MIDI port matching {pattern:?}")]
    AbsentDevice { pattern: String },
    #[error("MIDI input not connected")]
    InputNotConnected,
    #[error("MIDI output not connected")]
    OutputNotConnected,
    #[error("not connected to the device")]
    NotConnected,
    #[error("MIDI backend error: {0}")]
    Backend(String),
}

/// Something that can push SysEx frames toward the device. The
/// synchronizer is written against this seam so tests can drive it with
/// a recording port.
#[async_trait]
pub trait SysexPort: Send {
    fn open(&mut self) -> Result<(), ConnectError>;
    fn close(&mut self);
    async fn send(&mut self, frame: &[u8]) -> Result<(), ConnectError>;
    fn connect_state(&self) -> ConnectState;
}

/// The midir-backed link to the amplifier.
pub struct DeviceLink {
    input_conn: Option<MidiInputConnection<()>>,
    output_conn: Option<Arc<Mutex<MidiOutputConnection>>>,
    frame_tx: mpsc::Sender<Vec<u8>>,
    frame_rx: Option<mpsc::Receiver<Vec<u8>>>,
    input_port_name: String,
    output_port_name: String,
}

impl DeviceLink {
    pub fn new(input_port_name: &str, output_port_name: &str) -> Self {
        let (frame_tx, frame_rx) = mpsc::channel(FRAME_QUEUE_CAPACITY);
        Self {
            input_conn: None,
            output_conn: None,
            frame_tx,
            frame_rx: Some(frame_rx),
            input_port_name: input_port_name.to_string(),
            output_port_name: output_port_name.to_string(),
        }
    }

    /// Open both directions. A failure on one side leaves the other side
    /// connected; the error names the side that refused. If no port
    /// matches either pattern the device is absent.
    pub fn connect(&mut self) -> Result<(), ConnectError> {
        self.disconnect();

        info!(
            input = %self.input_port_name,
            output = %self.output_port_name,
            "Connecting to amplifier"
        );

        let input_result = self.connect_input();
        let output_result = self.connect_output();

        match (input_result, output_result) {
            (Ok(()), Ok(())) => {
                info!("Amplifier connected (both directions)");
                Ok(())
            }
            (Err(ConnectError::AbsentDevice { .. }), Err(ConnectError::AbsentDevice { .. })) => {
                Err(ConnectError::AbsentDevice {
                    pattern: self.input_port_name.clone(),
                })
            }
            (Err(_), _) => Err(ConnectError::InputNotConnected),
            (_, Err(_)) => Err(ConnectError::OutputNotConnected),
        }
    }

    /// Open the input direction and route incoming SysEx frames into the
    /// frame queue.
    pub fn connect_input(&mut self) -> Result<(), ConnectError> {
        let midi_in = MidiInput::new("VTX-GW-Input").map_err(backend)?;

        let (port, port_name) = find_port_in(&midi_in, &self.input_port_name).ok_or_else(|| {
            ConnectError::AbsentDevice {
                pattern: self.input_port_name.clone(),
            }
        })?;
        info!("Connecting to input port: {}", port_name);

        let frame_tx = self.frame_tx.clone();
        let conn = midi_in
            .connect(
                &port,
                "VTX-GW",
                move |_timestamp, data, _| {
                    if !is_sysex(data) {
                        return;
                    }
                    // never block the driver callback
                    if frame_tx.try_send(data.to_vec()).is_err() {
                        warn!("Inbound frame queue full, dropping frame");
                    }
                },
                (),
            )
            .map_err(|e| backend(e.kind()))?;

        self.input_conn = Some(conn);
        Ok(())
    }

    /// Open the output direction.
    pub fn connect_output(&mut self) -> Result<(), ConnectError> {
        let midi_out = MidiOutput::new("VTX-GW-Output").map_err(backend)?;

        let (port, port_name) =
            find_port_out(&midi_out, &self.output_port_name).ok_or_else(|| {
                ConnectError::AbsentDevice {
                    pattern: self.output_port_name.clone(),
                }
            })?;
        info!("Connecting to output port: {}", port_name);

        let conn = midi_out
            .connect(&port, "VTX-GW")
            .map_err(|e| backend(e.kind()))?;
        self.output_conn = Some(Arc::new(Mutex::new(conn)));
        Ok(())
    }

    /// Drop both connections. Idempotent.
    pub fn disconnect(&mut self) {
        if self.input_conn.take().is_some() | self.output_conn.take().is_some() {
            info!("Amplifier disconnected");
        }
    }

    /// Take the inbound frame receiver (consumed by the synchronizer).
    pub fn take_frame_receiver(&mut self) -> Option<mpsc::Receiver<Vec<u8>>> {
        self.frame_rx.take()
    }
}

#[async_trait]
impl SysexPort for DeviceLink {
    fn open(&mut self) -> Result<(), ConnectError> {
        self.connect()
    }

    fn close(&mut self) {
        self.disconnect();
    }

    async fn send(&mut self, frame: &[u8]) -> Result<(), ConnectError> {
        let output = self
            .output_conn
            .as_ref()
            .ok_or(ConnectError::NotConnected)?;

        let mut conn = output.lock().expect("output connection lock poisoned");
        conn.send(frame).map_err(backend)?;
        debug!("Sent {} bytes", frame.len());
        Ok(())
    }

    fn connect_state(&self) -> ConnectState {
        match (self.input_conn.is_some(), self.output_conn.is_some()) {
            (true, true) => ConnectState::Connected,
            (true, false) => ConnectState::InputOnly,
            (false, true) => ConnectState::OutputOnly,
            (false, false) => ConnectState::Disconnected,
        }
    }
}

fn backend(err: impl std::fmt::Display) -> ConnectError {
    ConnectError::Backend(err.to_string())
}

fn find_port_in(midi_in: &MidiInput, pattern: &str) -> Option<(midir::MidiInputPort, String)> {
    for port in midi_in.ports() {
        if let Ok(name) = midi_in.port_name(&port) {
            if name.to_lowercase().contains(&pattern.to_lowercase()) {
                debug!("Found input port '{}' matching '{}'", name, pattern);
                return Some((port, name));
            }
        }
    }
    None
}

fn find_port_out(midi_out: &MidiOutput, pattern: &str) -> Option<(midir::MidiOutputPort, String)> {
    for port in midi_out.ports() {
        if let Ok(name) = midi_out.port_name(&port) {
            if name.to_lowercase().contains(&pattern.to_lowercase()) {
                debug!("Found output port '{}' matching '{}'", name, pattern);
                return Some((port, name));
            }
        }
    }
    None
}

/// Port discovery utilities
pub mod discovery {
    use super::*;

    /// Common Valvetronix port name fragments.
    pub const DEVICE_PATTERNS: [&str; 3] = ["Valvetronix", "VT-X", "VOX"];

    pub fn list_input_ports() -> Result<Vec<String>, ConnectError> {
        let midi_in = MidiInput::new("VTX-GW-Scanner").map_err(backend)?;
        Ok(midi_in
            .ports()
            .iter()
            .filter_map(|p| midi_in.port_name(p).ok())
            .collect())
    }

    pub fn list_output_ports() -> Result<Vec<String>, ConnectError> {
        let midi_out = MidiOutput::new("VTX-GW-Scanner").map_err(backend)?;
        Ok(midi_out
            .ports()
            .iter()
            .filter_map(|p| midi_out.port_name(p).ok())
            .collect())
    }

    /// Find amplifier ports automatically by name pattern.
    pub fn find_device_ports() -> Option<(String, String)> {
        let inputs = list_input_ports().ok()?;
        let outputs = list_output_ports().ok()?;

        for pattern in DEVICE_PATTERNS {
            let input = inputs.iter().find(|n| n.contains(pattern));
            let output = outputs.iter().find(|n| n.contains(pattern));
            if let (Some(input), Some(output)) = (input, output) {
                return Some((input.clone(), output.clone()));
            }
        }
        None
    }
}
