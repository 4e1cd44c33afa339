//! In-memory mirror of the device's program storage
//!
//! Holds the edit buffer, the eight user banks, the factory presets, the
//! custom AmpFx slots and the locally cached named programs. Only the
//! synchronizer mutates this store; collaborators read through it.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::program::{AmpFx, Program};

/// Number of user bank slots.
pub const USER_BANKS: usize = 8;

/// Number of factory preset slots.
pub const FACTORY_PROGRAMS: usize = 60;

/// Number of custom AmpFx slots.
pub const AMPFX_SLOTS: usize = 4;

/// User bank display names, in slot order.
pub const BANK_NAMES: [&str; USER_BANKS] = ["A1", "A2", "A3", "A4", "B1", "B2", "B3", "B4"];

/// Bank family a slot belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BankKind {
    User,
    Factory,
}

/// Model-level data failures: bad slot addressing, read-only targets,
/// device rejections and out-of-range device values.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DataError {
    #[error("bank slot {slot} out of range (0..={max})")]
    SlotOutOfRange { slot: u8, max: u8 },
    #[error("factory banks are read-only")]
    FactoryReadOnly,
    #[error("a local program named {0:?} already exists")]
    NameExists(String),
    #[error("{0:?} is not a usable program name")]
    BadName(String),
    #[error("no local program named {0:?}")]
    UnknownProgram(String),
    #[error("device rejected the last {command}")]
    Rejected { command: String },
    #[error("no active device session")]
    NoSession,
    #[error("device sent out-of-range values for {params:?}")]
    OutOfRange { params: Vec<&'static str> },
}

fn check_slot(slot: u8, count: usize) -> Result<usize, DataError> {
    if (slot as usize) < count {
        Ok(slot as usize)
    } else {
        Err(DataError::SlotOutOfRange {
            slot,
            max: count as u8 - 1,
        })
    }
}

/// The application-side copy of everything the device stores.
#[derive(Debug, Clone)]
pub struct ProgramStore {
    current: Program,
    user_banks: [Program; USER_BANKS],
    factory: Vec<Program>,
    ampfxs: [AmpFx; AMPFX_SLOTS],
    local: BTreeMap<String, Program>,
}

impl Default for ProgramStore {
    fn default() -> Self {
        Self {
            current: Program::default(),
            user_banks: Default::default(),
            factory: vec![Program::default(); FACTORY_PROGRAMS],
            ampfxs: Default::default(),
            local: BTreeMap::new(),
        }
    }
}

impl ProgramStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> &Program {
        &self.current
    }

    pub fn current_mut(&mut self) -> &mut Program {
        &mut self.current
    }

    pub fn set_current(&mut self, program: Program) {
        self.current = program;
    }

    /// Read a bank-resident program.
    pub fn read_bank(&self, kind: BankKind, slot: u8) -> Result<&Program, DataError> {
        match kind {
            BankKind::User => Ok(&self.user_banks[check_slot(slot, USER_BANKS)?]),
            BankKind::Factory => Ok(&self.factory[check_slot(slot, FACTORY_PROGRAMS)?]),
        }
    }

    /// Store a program at a user bank slot. Factory banks are rejected;
    /// nothing is mutated on failure.
    pub fn write_bank(
        &mut self,
        kind: BankKind,
        slot: u8,
        program: Program,
    ) -> Result<(), DataError> {
        match kind {
            BankKind::User => {
                let i = check_slot(slot, USER_BANKS)?;
                self.user_banks[i] = program;
                Ok(())
            }
            BankKind::Factory => Err(DataError::FactoryReadOnly),
        }
    }

    /// Populate a factory slot from a device dump. This is the sync path,
    /// not a user write; factory content still never goes back out.
    pub fn populate_factory(&mut self, slot: u8, program: Program) -> Result<(), DataError> {
        let i = check_slot(slot, FACTORY_PROGRAMS)?;
        self.factory[i] = program;
        Ok(())
    }

    pub fn user_banks(&self) -> &[Program; USER_BANKS] {
        &self.user_banks
    }

    pub fn ampfx(&self, slot: u8) -> Result<&AmpFx, DataError> {
        Ok(&self.ampfxs[check_slot(slot, AMPFX_SLOTS)?])
    }

    pub fn set_ampfx(&mut self, slot: u8, ampfx: AmpFx) -> Result<(), DataError> {
        let i = check_slot(slot, AMPFX_SLOTS)?;
        self.ampfxs[i] = ampfx;
        Ok(())
    }

    pub fn ampfxs(&self) -> &[AmpFx; AMPFX_SLOTS] {
        &self.ampfxs
    }

    /// Cache the current program under a local name. Refuses to replace an
    /// existing entry unless `overwrite` is set; the caller owns the
    /// confirmation flow. Names double as file stems on disk, so path
    /// separators are rejected.
    pub fn cache_local(&mut self, name: &str, overwrite: bool) -> Result<(), DataError> {
        if name.is_empty() || name.contains(['/', '\\']) {
            return Err(DataError::BadName(name.to_string()));
        }
        if !overwrite && self.local.contains_key(name) {
            return Err(DataError::NameExists(name.to_string()));
        }
        let mut program = self.current.clone();
        program.name = name.chars().take(crate::program::NAME_LEN).collect();
        self.local.insert(name.to_string(), program);
        Ok(())
    }

    pub fn local(&self, name: &str) -> Result<&Program, DataError> {
        self.local
            .get(name)
            .ok_or_else(|| DataError::UnknownProgram(name.to_string()))
    }

    pub fn insert_local(&mut self, name: String, program: Program) {
        self.local.insert(name, program);
    }

    pub fn local_names(&self) -> Vec<String> {
        self.local.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::AmpModel;

    fn named(name: &str) -> Program {
        Program {
            name: name.to_string(),
            amp_model: AmpModel::VoxAc30,
            ..Program::default()
        }
    }

    #[test]
    fn write_out_of_range_slot_leaves_bank_untouched() {
        let mut store = ProgramStore::new();
        let before = store.user_banks().clone();
        let err = store
            .write_bank(BankKind::User, 8, named("overflow"))
            .unwrap_err();
        assert_eq!(err, DataError::SlotOutOfRange { slot: 8, max: 7 });
        assert_eq!(store.user_banks(), &before);
    }

    #[test]
    fn factory_banks_are_read_only() {
        let mut store = ProgramStore::new();
        assert_eq!(
            store.write_bank(BankKind::Factory, 0, named("nope")),
            Err(DataError::FactoryReadOnly)
        );
        // the sync path may still populate them from dumps
        store.populate_factory(12, named("preset")).unwrap();
        assert_eq!(store.read_bank(BankKind::Factory, 12).unwrap().name, "preset");
    }

    #[test]
    fn user_bank_round_trip() {
        let mut store = ProgramStore::new();
        store.write_bank(BankKind::User, 3, named("slot three")).unwrap();
        assert_eq!(store.read_bank(BankKind::User, 3).unwrap().name, "slot three");
    }

    #[test]
    fn cache_local_requires_overwrite_confirmation() {
        let mut store = ProgramStore::new();
        store.set_current(named("mine"));
        store.cache_local("mine", false).unwrap();
        assert_eq!(
            store.cache_local("mine", false),
            Err(DataError::NameExists("mine".to_string()))
        );
        store.current_mut().noise_gate_sens = 9;
        store.cache_local("mine", true).unwrap();
        assert_eq!(store.local("mine").unwrap().noise_gate_sens, 9);
    }

    #[test]
    fn local_names_must_be_plain_file_stems() {
        let mut store = ProgramStore::new();
        assert_eq!(
            store.cache_local("", false),
            Err(DataError::BadName(String::new()))
        );
        assert_eq!(
            store.cache_local("../escape", false),
            Err(DataError::BadName("../escape".to_string()))
        );
        assert!(store.local_names().is_empty());
    }

    #[test]
    fn ampfx_slots_are_bounded() {
        let mut store = ProgramStore::new();
        let fx = named("x").to_ampfx();
        store.set_ampfx(3, fx.clone()).unwrap();
        assert_eq!(store.ampfx(3).unwrap(), &fx);
        assert!(matches!(
            store.set_ampfx(4, fx),
            Err(DataError::SlotOutOfRange { slot: 4, max: 3 })
        ));
    }
}
