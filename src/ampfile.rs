//! JSON import/export of amp configurations.
//!
//! A full-amp file captures everything the store holds: the eight user
//! banks, the four custom AmpFx slots, and the current program. Narrower
//! documents carry a single program or a single AmpFx. Import never talks
//! to the device; it only mutates the local [`ProgramStore`], and the
//! synchronizer pushes the result out afterwards.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::params::EffectSlot;
use crate::program::{AmpFx, Program};
use crate::store::{BankKind, DataError, ProgramStore, AMPFX_SLOTS, USER_BANKS};

/// File-chooser pattern for amp configuration documents.
pub const JSON_FILTER: &str = "*.json";

#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    #[error("not a valid amp config file")]
    InvalidSchema,
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to write {path}: {source}")]
    Write {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to serialize amp config: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// The full-amp document: all user banks, all AmpFx slots, and the
/// current program.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FullAmpFile {
    pub banks: Vec<Program>,
    pub ampfxs: Vec<AmpFx>,
    pub current_program: Program,
}

impl FullAmpFile {
    pub fn from_store(store: &ProgramStore) -> Self {
        Self {
            banks: store.user_banks().to_vec(),
            ampfxs: store.ampfxs().to_vec(),
            current_program: store.current().clone(),
        }
    }

    /// Schema check beyond what serde enforces: the bank and AmpFx arrays
    /// must have the device's fixed shape.
    fn validate(&self) -> Result<(), ImportError> {
        if self.banks.len() != USER_BANKS || self.ampfxs.len() != AMPFX_SLOTS {
            return Err(ImportError::InvalidSchema);
        }
        Ok(())
    }
}

/// A location a mapping can read from or write to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnitRef {
    CurrentProgram,
    UserBank(u8),
    AmpFx(u8),
}

impl std::fmt::Display for UnitRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UnitRef::CurrentProgram => write!(f, "current program"),
            UnitRef::UserBank(slot) => write!(f, "user bank {}", slot),
            UnitRef::AmpFx(slot) => write!(f, "ampfx {}", slot),
        }
    }
}

/// One caller-selected import step: copy the listed sections from a
/// source unit in the document to a target unit in the store. An empty
/// section list means all four sections.
#[derive(Debug, Clone)]
pub struct ImportMapping {
    pub source: UnitRef,
    pub target: UnitRef,
    pub sections: Vec<EffectSlot>,
}

impl ImportMapping {
    pub fn all_sections(source: UnitRef, target: UnitRef) -> Self {
        Self {
            source,
            target,
            sections: Vec::new(),
        }
    }
}

/// Result of one mapping. `Ok` carries the names of any parameters that
/// were out of range and got clamped on the way in.
#[derive(Debug)]
pub struct MappingOutcome {
    pub source: UnitRef,
    pub target: UnitRef,
    pub result: Result<Vec<&'static str>, DataError>,
}

fn copy_section(src: &AmpFx, dst: &mut AmpFx, slot: EffectSlot) {
    match slot {
        EffectSlot::Amp => {
            dst.amp_model = src.amp_model;
            dst.amp_values = src.amp_values;
        }
        EffectSlot::Pedal1 => {
            dst.pedal1_on = src.pedal1_on;
            dst.pedal1_type = src.pedal1_type;
            dst.pedal1_values = src.pedal1_values;
        }
        EffectSlot::Pedal2 => {
            dst.pedal2_on = src.pedal2_on;
            dst.pedal2_type = src.pedal2_type;
            dst.pedal2_values = src.pedal2_values;
        }
        EffectSlot::Reverb => {
            dst.reverb_on = src.reverb_on;
            dst.reverb_type = src.reverb_type;
            dst.reverb_values = src.reverb_values;
        }
    }
}

fn source_ampfx(file: &FullAmpFile, unit: UnitRef) -> Result<AmpFx, DataError> {
    match unit {
        UnitRef::CurrentProgram => Ok(file.current_program.to_ampfx()),
        UnitRef::UserBank(slot) => file
            .banks
            .get(slot as usize)
            .map(Program::to_ampfx)
            .ok_or(DataError::SlotOutOfRange {
                slot,
                max: (USER_BANKS - 1) as u8,
            }),
        UnitRef::AmpFx(slot) => {
            file.ampfxs
                .get(slot as usize)
                .cloned()
                .ok_or(DataError::SlotOutOfRange {
                    slot,
                    max: (AMPFX_SLOTS - 1) as u8,
                })
        }
    }
}

fn apply_one(
    store: &mut ProgramStore,
    src: &AmpFx,
    target: UnitRef,
    sections: &[EffectSlot],
) -> Result<Vec<&'static str>, DataError> {
    let all = [
        EffectSlot::Amp,
        EffectSlot::Pedal1,
        EffectSlot::Pedal2,
        EffectSlot::Reverb,
    ];
    let sections = if sections.is_empty() { &all[..] } else { sections };

    match target {
        UnitRef::CurrentProgram => {
            let mut fx = store.current().to_ampfx();
            for &slot in sections {
                copy_section(src, &mut fx, slot);
            }
            fx.apply_to(store.current_mut());
            Ok(store.current_mut().clamp_all())
        }
        UnitRef::UserBank(slot) => {
            let mut program = store.read_bank(BankKind::User, slot)?.clone();
            let mut fx = program.to_ampfx();
            for &sec in sections {
                copy_section(src, &mut fx, sec);
            }
            fx.apply_to(&mut program);
            let flagged = program.clamp_all();
            store.write_bank(BankKind::User, slot, program)?;
            Ok(flagged)
        }
        UnitRef::AmpFx(slot) => {
            let mut fx = store.ampfx(slot)?.clone();
            for &sec in sections {
                copy_section(src, &mut fx, sec);
            }
            // AmpFx values get clamped through a scratch program so the
            // same range tables apply.
            let mut scratch = Program::default();
            fx.apply_to(&mut scratch);
            let flagged = scratch.clamp_all();
            store.set_ampfx(slot, scratch.to_ampfx())?;
            Ok(flagged)
        }
    }
}

/// Apply each mapping independently. One failed mapping never aborts the
/// others; callers get a per-mapping outcome report.
pub fn apply_mappings(
    file: &FullAmpFile,
    mappings: &[ImportMapping],
    store: &mut ProgramStore,
) -> Vec<MappingOutcome> {
    mappings
        .iter()
        .map(|mapping| {
            let result = source_ampfx(file, mapping.source)
                .and_then(|src| apply_one(store, &src, mapping.target, &mapping.sections));
            MappingOutcome {
                source: mapping.source,
                target: mapping.target,
                result,
            }
        })
        .collect()
}

fn read_to_string(path: &Path) -> Result<String, ImportError> {
    std::fs::read_to_string(path).map_err(|source| ImportError::Read {
        path: path.display().to_string(),
        source,
    })
}

fn write_string(path: &Path, contents: &str) -> Result<(), ImportError> {
    std::fs::write(path, contents).map_err(|source| ImportError::Write {
        path: path.display().to_string(),
        source,
    })
}

/// Export the whole store as a pretty-printed full-amp document.
pub fn export_full(path: &Path, store: &ProgramStore) -> Result<(), ImportError> {
    let file = FullAmpFile::from_store(store);
    let json = serde_json::to_string_pretty(&file)?;
    write_string(path, &json)
}

/// Load and schema-validate a full-amp document. Nothing in the store is
/// touched here; pass the result to [`apply_mappings`].
pub fn load_full(path: &Path) -> Result<FullAmpFile, ImportError> {
    let raw = read_to_string(path)?;
    let file: FullAmpFile =
        serde_json::from_str(&raw).map_err(|_| ImportError::InvalidSchema)?;
    file.validate()?;
    Ok(file)
}

/// Export a single program.
pub fn export_program(path: &Path, program: &Program) -> Result<(), ImportError> {
    write_string(path, &serde_json::to_string_pretty(program)?)
}

pub fn load_program(path: &Path) -> Result<Program, ImportError> {
    let raw = read_to_string(path)?;
    serde_json::from_str(&raw).map_err(|_| ImportError::InvalidSchema)
}

/// Export a single AmpFx.
pub fn export_ampfx(path: &Path, ampfx: &AmpFx) -> Result<(), ImportError> {
    write_string(path, &serde_json::to_string_pretty(ampfx)?)
}

pub fn load_ampfx(path: &Path) -> Result<AmpFx, ImportError> {
    let raw = read_to_string(path)?;
    serde_json::from_str(&raw).map_err(|_| ImportError::InvalidSchema)
}
