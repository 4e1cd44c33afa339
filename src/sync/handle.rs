//! SyncHandle - public API for the synchronizer actor
//!
//! Wraps the command channel with ergonomic methods: fire-and-forget for
//! edits and lifecycle, async request-response for queries.

use tokio::sync::{mpsc, oneshot};

use super::commands::{SubscriberFn, SyncCommand, SyncState};
use crate::params::{SectionId, VoxMode};
use crate::program::{AmpFx, Program};
use crate::store::{BankKind, DataError, ProgramStore};

/// Cloneable handle to the [`Synchronizer`](super::Synchronizer).
#[derive(Clone)]
pub struct SyncHandle {
    cmd_tx: mpsc::UnboundedSender<SyncCommand>,
}

impl SyncHandle {
    pub fn new(cmd_tx: mpsc::UnboundedSender<SyncCommand>) -> Self {
        Self { cmd_tx }
    }

    // =====================================================================
    // Lifecycle (fire-and-forget)
    // =====================================================================

    pub fn connect(&self) {
        let _ = self.cmd_tx.send(SyncCommand::Connect);
    }

    pub fn disconnect(&self) {
        let _ = self.cmd_tx.send(SyncCommand::Disconnect);
    }

    /// Leave the Error state back to Disconnected.
    pub fn reset(&self) {
        let _ = self.cmd_tx.send(SyncCommand::Reset);
    }

    pub fn shutdown(&self) {
        let _ = self.cmd_tx.send(SyncCommand::Shutdown);
    }

    /// False once the actor has terminated.
    pub fn is_alive(&self) -> bool {
        !self.cmd_tx.is_closed()
    }

    // =====================================================================
    // Edits (fire-and-forget)
    // =====================================================================

    /// User edit to one parameter. Applied optimistically to the model
    /// and sent to the device; coalesced per parameter under load.
    pub fn set_parameter(&self, section: SectionId, index: u8, value: u16) {
        let _ = self.cmd_tx.send(SyncCommand::SetParameter {
            section,
            index,
            value,
        });
    }

    pub fn set_program_name(&self, name: impl Into<String>) {
        let _ = self.cmd_tx.send(SyncCommand::SetProgramName { name: name.into() });
    }

    pub fn set_mode(&self, mode: VoxMode, slot: u8) {
        let _ = self.cmd_tx.send(SyncCommand::SetMode { mode, slot });
    }

    /// Re-request the device's edit buffer.
    pub fn load_current_program(&self) {
        let _ = self.cmd_tx.send(SyncCommand::LoadCurrentProgram);
    }

    /// Replace the edit buffer locally and on the device.
    pub fn set_current_program(&self, program: Program) {
        let _ = self.cmd_tx.send(SyncCommand::SetCurrentProgram { program });
    }

    /// Ask the device to store its edit buffer at a user bank slot.
    pub fn save_current_program_to_device(&self, slot: u8) {
        let _ = self
            .cmd_tx
            .send(SyncCommand::SaveCurrentProgramToDevice { slot });
    }

    // =====================================================================
    // Request-response
    // =====================================================================

    /// Upload a program into a user bank slot. Fails fast on bad slots
    /// and factory targets without touching the device.
    pub async fn write_program_to_bank(
        &self,
        slot: u8,
        program: Program,
    ) -> Result<(), DataError> {
        let (response_tx, response_rx) = oneshot::channel();
        let cmd = SyncCommand::WriteProgramToBank {
            slot,
            program,
            response: response_tx,
        };
        if self.cmd_tx.send(cmd).is_err() {
            return Err(DataError::Rejected {
                command: "program write".to_string(),
            });
        }
        response_rx.await.unwrap_or(Err(DataError::Rejected {
            command: "program write".to_string(),
        }))
    }

    pub async fn read_program_from_bank(
        &self,
        kind: BankKind,
        slot: u8,
    ) -> Result<Program, DataError> {
        let (response_tx, response_rx) = oneshot::channel();
        let cmd = SyncCommand::ReadProgramFromBank {
            kind,
            slot,
            response: response_tx,
        };
        if self.cmd_tx.send(cmd).is_err() {
            return Err(DataError::Rejected {
                command: "program read".to_string(),
            });
        }
        response_rx.await.unwrap_or(Err(DataError::Rejected {
            command: "program read".to_string(),
        }))
    }

    /// Upload an AmpFx into one of the custom slots.
    pub async fn write_ampfx(&self, slot: u8, ampfx: AmpFx) -> Result<(), DataError> {
        let (response_tx, response_rx) = oneshot::channel();
        let cmd = SyncCommand::WriteAmpFx {
            slot,
            ampfx,
            response: response_tx,
        };
        if self.cmd_tx.send(cmd).is_err() {
            return Err(DataError::Rejected {
                command: "ampfx write".to_string(),
            });
        }
        response_rx.await.unwrap_or(Err(DataError::Rejected {
            command: "ampfx write".to_string(),
        }))
    }

    /// Cache the current program under a local name. Signals
    /// [`DataError::NameExists`] unless `overwrite` is set.
    pub async fn cache_local_program(
        &self,
        name: impl Into<String>,
        overwrite: bool,
    ) -> Result<(), DataError> {
        let (response_tx, response_rx) = oneshot::channel();
        let cmd = SyncCommand::CacheLocalProgram {
            name: name.into(),
            overwrite,
            response: response_tx,
        };
        if self.cmd_tx.send(cmd).is_err() {
            return Err(DataError::Rejected {
                command: "local cache".to_string(),
            });
        }
        response_rx.await.unwrap_or(Err(DataError::Rejected {
            command: "local cache".to_string(),
        }))
    }

    pub async fn current_program(&self) -> Option<Program> {
        let (response_tx, response_rx) = oneshot::channel();
        let cmd = SyncCommand::GetCurrentProgram {
            response: response_tx,
        };
        if self.cmd_tx.send(cmd).is_err() {
            return None;
        }
        response_rx.await.ok()
    }

    /// Full snapshot of the mirrored device state, for export.
    pub async fn store_snapshot(&self) -> Option<ProgramStore> {
        let (response_tx, response_rx) = oneshot::channel();
        let cmd = SyncCommand::GetStoreSnapshot {
            response: response_tx,
        };
        if self.cmd_tx.send(cmd).is_err() {
            return None;
        }
        response_rx.await.ok()
    }

    pub async fn state(&self) -> Option<SyncState> {
        let (response_tx, response_rx) = oneshot::channel();
        let cmd = SyncCommand::GetState {
            response: response_tx,
        };
        if self.cmd_tx.send(cmd).is_err() {
            return None;
        }
        response_rx.await.ok()
    }

    /// Register a status listener; returns its subscriber id.
    pub async fn subscribe(&self, listener: SubscriberFn) -> Option<usize> {
        let (response_tx, response_rx) = oneshot::channel();
        let cmd = SyncCommand::Subscribe {
            listener,
            response: response_tx,
        };
        if self.cmd_tx.send(cmd).is_err() {
            return None;
        }
        response_rx.await.ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handle_is_clone() {
        fn assert_clone<T: Clone>() {}
        assert_clone::<SyncHandle>();
    }

    #[tokio::test]
    async fn is_alive_tracks_channel() {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = SyncHandle::new(tx);
        assert!(handle.is_alive());
        drop(rx);
        assert!(!handle.is_alive());
    }
}
