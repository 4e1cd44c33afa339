//! Command and event types for the synchronizer actor
//!
//! Commands are divided into fire-and-forget edits (the hot path) and
//! request-response operations that answer over a oneshot channel.

use std::sync::Arc;
use tokio::sync::oneshot;

use crate::params::{SectionId, VoxMode};
use crate::program::{AmpFx, Program};
use crate::store::{BankKind, DataError, ProgramStore};

/// Lifecycle of the synchronizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    /// Rest state; no transport open
    Disconnected,
    /// Opening the transport directions
    Connecting,
    /// Connected, pulling the initial snapshot from the device
    Querying,
    /// Steady state; model mirrors the device
    Synced,
    /// Gave up after repeated failures; reset or reconnect to leave
    Error,
}

impl std::fmt::Display for SyncState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SyncState::Disconnected => "disconnected",
            SyncState::Connecting => "connecting",
            SyncState::Querying => "querying",
            SyncState::Synced => "synced",
            SyncState::Error => "error",
        };
        f.write_str(s)
    }
}

/// Which transport direction a connection failure names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Input,
    Output,
}

/// Notifications pushed to external collaborators. The synchronizer is
/// the only writer of the model; collaborators react to these instead of
/// polling.
#[derive(Debug, Clone, PartialEq)]
pub enum StatusEvent {
    StateChanged(SyncState),
    /// The device answered; the link is healthy
    CommunicationOk,
    /// The device stopped answering (transient, retry-eligible)
    CommunicationFailure,
    /// No port matched the device at all
    AbsentDevice,
    /// One transport direction refused to open
    NotConnected(Direction),
    /// The device rejected the last command, or sent out-of-range data
    DataError { command: String },
    /// A parameter changed on the device side
    ParameterChanged {
        section: SectionId,
        index: u8,
        value: u16,
    },
    /// The current program was replaced wholesale
    ProgramChanged,
    /// The device switched mode or selected slot
    ModeChanged { mode: VoxMode, slot: u8 },
}

/// Subscriber callback. Must be Send + Sync; invoked on the actor's task.
pub type SubscriberFn = Arc<dyn Fn(&StatusEvent) + Send + Sync>;

/// Commands accepted by the [`Synchronizer`](super::Synchronizer) actor.
pub enum SyncCommand {
    // -------------------------------------------------------------------
    // Lifecycle
    // -------------------------------------------------------------------
    /// Open the transport and start the initial query sequence
    Connect,
    /// Close the transport, flushing pending outbound commands
    Disconnect,
    /// Leave the Error state back to Disconnected
    Reset,
    /// Stop the actor
    Shutdown,

    // -------------------------------------------------------------------
    // Hot path edits (fire-and-forget)
    // -------------------------------------------------------------------
    /// User edit to one parameter; coalesced per parameter while a prior
    /// command is unacknowledged
    SetParameter {
        section: SectionId,
        index: u8,
        value: u16,
    },
    /// Rename the current program (sent as one change per character cell)
    SetProgramName { name: String },
    /// Switch device mode / select a slot
    SetMode { mode: VoxMode, slot: u8 },
    /// Re-request the device's current program
    LoadCurrentProgram,
    /// Replace the edit buffer, locally and on the device (used after an
    /// import or when recalling a locally cached program)
    SetCurrentProgram { program: Program },
    /// Ask the device to store its edit buffer at a user bank slot
    SaveCurrentProgramToDevice { slot: u8 },

    // -------------------------------------------------------------------
    // Request-response
    // -------------------------------------------------------------------
    /// Upload a program into a user bank slot (local store first, then
    /// the device)
    WriteProgramToBank {
        slot: u8,
        program: Program,
        response: oneshot::Sender<Result<(), DataError>>,
    },
    /// Read a program from the local mirror of a bank
    ReadProgramFromBank {
        kind: BankKind,
        slot: u8,
        response: oneshot::Sender<Result<Program, DataError>>,
    },
    /// Upload an AmpFx into one of the custom slots
    WriteAmpFx {
        slot: u8,
        ampfx: AmpFx,
        response: oneshot::Sender<Result<(), DataError>>,
    },
    /// Cache the current program under a local name; refuses an existing
    /// name unless `overwrite` is set
    CacheLocalProgram {
        name: String,
        overwrite: bool,
        response: oneshot::Sender<Result<(), DataError>>,
    },
    /// Snapshot of the current program
    GetCurrentProgram {
        response: oneshot::Sender<Program>,
    },
    /// Full snapshot of the mirrored device state (used by export)
    GetStoreSnapshot {
        response: oneshot::Sender<ProgramStore>,
    },
    /// Current lifecycle state
    GetState {
        response: oneshot::Sender<SyncState>,
    },
    /// Register a status listener
    Subscribe {
        listener: SubscriberFn,
        response: oneshot::Sender<usize>,
    },
}

// Manual Debug because SubscriberFn has no Debug
impl std::fmt::Debug for SyncCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncCommand::Connect => write!(f, "Connect"),
            SyncCommand::Disconnect => write!(f, "Disconnect"),
            SyncCommand::Reset => write!(f, "Reset"),
            SyncCommand::Shutdown => write!(f, "Shutdown"),
            SyncCommand::SetParameter {
                section,
                index,
                value,
            } => f
                .debug_struct("SetParameter")
                .field("section", section)
                .field("index", index)
                .field("value", value)
                .finish(),
            SyncCommand::SetProgramName { name } => f
                .debug_struct("SetProgramName")
                .field("name", name)
                .finish(),
            SyncCommand::SetMode { mode, slot } => f
                .debug_struct("SetMode")
                .field("mode", mode)
                .field("slot", slot)
                .finish(),
            SyncCommand::LoadCurrentProgram => write!(f, "LoadCurrentProgram"),
            SyncCommand::SetCurrentProgram { program } => f
                .debug_struct("SetCurrentProgram")
                .field("name", &program.name)
                .finish_non_exhaustive(),
            SyncCommand::SaveCurrentProgramToDevice { slot } => f
                .debug_struct("SaveCurrentProgramToDevice")
                .field("slot", slot)
                .finish(),
            SyncCommand::WriteProgramToBank { slot, .. } => f
                .debug_struct("WriteProgramToBank")
                .field("slot", slot)
                .finish_non_exhaustive(),
            SyncCommand::ReadProgramFromBank { kind, slot, .. } => f
                .debug_struct("ReadProgramFromBank")
                .field("kind", kind)
                .field("slot", slot)
                .finish_non_exhaustive(),
            SyncCommand::CacheLocalProgram {
                name, overwrite, ..
            } => f
                .debug_struct("CacheLocalProgram")
                .field("name", name)
                .field("overwrite", overwrite)
                .finish_non_exhaustive(),
            SyncCommand::WriteAmpFx { slot, .. } => f
                .debug_struct("WriteAmpFx")
                .field("slot", slot)
                .finish_non_exhaustive(),
            SyncCommand::GetCurrentProgram { .. } => {
                f.debug_struct("GetCurrentProgram").finish_non_exhaustive()
            }
            SyncCommand::GetStoreSnapshot { .. } => {
                f.debug_struct("GetStoreSnapshot").finish_non_exhaustive()
            }
            SyncCommand::GetState { .. } => f.debug_struct("GetState").finish_non_exhaustive(),
            SyncCommand::Subscribe { .. } => f.debug_struct("Subscribe").finish_non_exhaustive(),
        }
    }
}
