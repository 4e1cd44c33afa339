//! Program snapshots and their dump payload codec
//!
//! A [`Program`] is one complete named configuration of every device
//! section. An [`AmpFx`] is the amplifier+pedal+reverb subset exchanged
//! with the custom AmpFx slots, which carries no name and no noise gate.
//!
//! The byte layouts mirror the device's program data dump payloads. All
//! payload bytes are 7-bit clean; values wider than 7 bits are split into
//! a low/high pair (`lo = v & 0x7F`, `hi = v >> 7`).

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::params::{
    effect_bits, AmpModel, AmpParam, EffectSlot, ParamSpec, Pedal1Type, Pedal2Type, ReverbType,
    SectionId, AMP_PARAMS, NOISE_GATE_SENS, REVERB_PARAMS,
};

/// Length of a full program dump payload.
pub const PROGRAM_DUMP_LEN: usize = 62;

/// Length of an AmpFx dump payload.
pub const AMPFX_DUMP_LEN: usize = 36;

/// Maximum program name length on the device.
pub const NAME_LEN: usize = 16;

/// A structurally invalid dump payload (wrong length or a type byte the
/// capability tables don't know). Out-of-range parameter *values* are not
/// errors at this level; the synchronizer clamps and flags them.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProgramCodecError {
    #[error("dump payload too short: {got} bytes, expected {expected}")]
    TooShort { got: usize, expected: usize },
    #[error("unknown amp model byte 0x{0:02X}")]
    UnknownAmpModel(u8),
    #[error("unknown pedal 1 type byte 0x{0:02X}")]
    UnknownPedal1Type(u8),
    #[error("unknown pedal 2 type byte 0x{0:02X}")]
    UnknownPedal2Type(u8),
    #[error("unknown reverb type byte 0x{0:02X}")]
    UnknownReverbType(u8),
}

/// One complete named configuration of all device sections.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Program {
    pub name: String,
    pub noise_gate_sens: u16,
    pub pedal1_on: bool,
    pub pedal2_on: bool,
    pub reverb_on: bool,
    pub amp_model: AmpModel,
    pub amp_values: [u16; AmpParam::COUNT],
    pub pedal1_type: Pedal1Type,
    pub pedal1_values: [u16; 6],
    pub pedal2_type: Pedal2Type,
    pub pedal2_values: [u16; 6],
    pub reverb_type: ReverbType,
    pub reverb_values: [u16; 5],
}

impl Default for Program {
    fn default() -> Self {
        Self {
            name: String::new(),
            noise_gate_sens: 0,
            pedal1_on: false,
            pedal2_on: false,
            reverb_on: false,
            amp_model: AmpModel::DeluxeClVibrato,
            amp_values: [0; AmpParam::COUNT],
            pedal1_type: Pedal1Type::Comp,
            pedal1_values: [0; 6],
            pedal2_type: Pedal2Type::Flanger,
            pedal2_values: [0; 6],
            reverb_type: ReverbType::Room,
            reverb_values: [0; 5],
        }
    }
}

fn split7(value: u16) -> (u8, u8) {
    ((value & 0x7F) as u8, (value >> 7) as u8)
}

fn join7(lo: u8, hi: u8) -> u16 {
    (lo as u16 & 0x7F) | ((hi as u16 & 0x7F) << 7)
}

/// Render a name as the 16 space-padded ASCII cells of the wire format.
pub fn encode_name(name: &str) -> [u8; NAME_LEN] {
    let mut out = [b' '; NAME_LEN];
    for (slot, ch) in out.iter_mut().zip(name.chars()) {
        *slot = if ch.is_ascii() && !ch.is_ascii_control() {
            (ch as u8) & 0x7F
        } else {
            b'?'
        };
    }
    out
}

pub fn decode_name(bytes: &[u8]) -> String {
    let name: String = bytes.iter().map(|&b| (b & 0x7F) as char).collect();
    name.trim_end().to_string()
}

impl Program {
    /// Encode as a program dump payload.
    pub fn encode_dump(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(PROGRAM_DUMP_LEN);
        out.push(0); // reserved
        out.extend_from_slice(&encode_name(&self.name));
        out.push((self.noise_gate_sens & 0x7F) as u8);
        out.push(self.effect_status_byte());
        out.push(self.amp_model.as_byte());
        for param in [
            AmpParam::Gain,
            AmpParam::Treble,
            AmpParam::Middle,
            AmpParam::Bass,
            AmpParam::Volume,
            AmpParam::Tone,
            AmpParam::Resonance,
            AmpParam::BrightCap,
            AmpParam::LowCut,
            AmpParam::MidBoost,
        ] {
            out.push((self.amp_values[param.index()] & 0x7F) as u8);
        }
        out.push((self.amp_values[AmpParam::BiasShift.index()] & 0x7F) as u8);
        out.push((self.amp_values[AmpParam::Class.index()] & 0x7F) as u8);

        out.push(self.pedal1_type.as_byte());
        let (lo, hi) = split7(self.pedal1_values[0]);
        out.push(lo);
        out.push(hi);
        for &value in &self.pedal1_values[1..6] {
            out.push((value & 0x7F) as u8);
        }

        out.push(self.pedal2_type.as_byte());
        let (lo, hi) = split7(self.pedal2_values[0]);
        out.push(lo);
        out.push(hi);
        for &value in &self.pedal2_values[1..6] {
            out.push((value & 0x7F) as u8);
        }

        out.extend_from_slice(&[0; 8]); // reserved block

        out.push(self.reverb_type.as_byte());
        for &value in &self.reverb_values {
            out.push((value & 0x7F) as u8);
        }

        debug_assert_eq!(out.len(), PROGRAM_DUMP_LEN);
        out
    }

    /// Decode a program dump payload.
    pub fn decode_dump(payload: &[u8]) -> Result<Self, ProgramCodecError> {
        if payload.len() < PROGRAM_DUMP_LEN {
            return Err(ProgramCodecError::TooShort {
                got: payload.len(),
                expected: PROGRAM_DUMP_LEN,
            });
        }

        let mut prog = Program {
            name: decode_name(&payload[1..17]),
            noise_gate_sens: payload[17] as u16,
            ..Program::default()
        };

        let status = payload[18];
        prog.pedal1_on = status & effect_bits::PEDAL1_ON != 0;
        prog.pedal2_on = status & effect_bits::PEDAL2_ON != 0;
        prog.reverb_on = status & effect_bits::REVERB_ON != 0;

        prog.amp_model =
            AmpModel::from_byte(payload[19]).ok_or(ProgramCodecError::UnknownAmpModel(payload[19]))?;
        for i in 0..10 {
            prog.amp_values[i] = payload[20 + i] as u16;
        }
        prog.amp_values[AmpParam::BiasShift.index()] = payload[30] as u16;
        prog.amp_values[AmpParam::Class.index()] = payload[31] as u16;

        prog.pedal1_type = Pedal1Type::from_byte(payload[32])
            .ok_or(ProgramCodecError::UnknownPedal1Type(payload[32]))?;
        prog.pedal1_values[0] = join7(payload[33], payload[34]);
        for i in 1..6 {
            prog.pedal1_values[i] = payload[34 + i] as u16;
        }

        prog.pedal2_type = Pedal2Type::from_byte(payload[40])
            .ok_or(ProgramCodecError::UnknownPedal2Type(payload[40]))?;
        prog.pedal2_values[0] = join7(payload[41], payload[42]);
        for i in 1..6 {
            prog.pedal2_values[i] = payload[42 + i] as u16;
        }

        // bytes 48..56 reserved

        prog.reverb_type = ReverbType::from_byte(payload[56])
            .ok_or(ProgramCodecError::UnknownReverbType(payload[56]))?;
        for i in 0..5 {
            prog.reverb_values[i] = payload[57 + i] as u16;
        }

        Ok(prog)
    }

    fn effect_status_byte(&self) -> u8 {
        let mut status = 0;
        if self.pedal1_on {
            status |= effect_bits::PEDAL1_ON;
        }
        if self.pedal2_on {
            status |= effect_bits::PEDAL2_ON;
        }
        if self.reverb_on {
            status |= effect_bits::REVERB_ON;
        }
        status
    }

    /// Spec for an addressed parameter, resolved against the pedal/reverb
    /// types currently selected in this program.
    pub fn spec_for(&self, section: SectionId, index: u8) -> Option<&'static ParamSpec> {
        let index = index as usize;
        match section {
            SectionId::NoiseGate if index == 0 => Some(&NOISE_GATE_SENS),
            SectionId::Amp => AMP_PARAMS.get(index),
            SectionId::Pedal1 => self.pedal1_type.params().get(index),
            SectionId::Pedal2 => self.pedal2_type.params().get(index),
            SectionId::Reverb => REVERB_PARAMS.get(index),
            _ => None,
        }
    }

    /// Current value of an addressed parameter, if the address is valid
    /// for this program.
    pub fn value_of(&self, section: SectionId, index: u8) -> Option<u16> {
        let i = index as usize;
        match section {
            SectionId::NoiseGate if i == 0 => Some(self.noise_gate_sens),
            SectionId::Amp => self.amp_values.get(i).copied(),
            SectionId::Pedal1 if i < self.pedal1_type.params().len() => {
                self.pedal1_values.get(i).copied()
            }
            SectionId::Pedal2 if i < self.pedal2_type.params().len() => {
                self.pedal2_values.get(i).copied()
            }
            SectionId::Reverb => self.reverb_values.get(i).copied(),
            SectionId::EffectStatus => {
                let slot = EffectSlot::from_byte(index)?;
                Some(self.effect_enabled(slot) as u16)
            }
            SectionId::EffectModel => {
                let slot = EffectSlot::from_byte(index)?;
                Some(match slot {
                    EffectSlot::Amp => self.amp_model.as_byte() as u16,
                    EffectSlot::Pedal1 => self.pedal1_type.as_byte() as u16,
                    EffectSlot::Pedal2 => self.pedal2_type.as_byte() as u16,
                    EffectSlot::Reverb => self.reverb_type.as_byte() as u16,
                })
            }
            _ => None,
        }
    }

    /// Store an addressed parameter value. Returns false if the address
    /// is invalid for this program shape; the value itself is stored as
    /// given (range policy belongs to the caller).
    pub fn set_value(&mut self, section: SectionId, index: u8, value: u16) -> bool {
        let i = index as usize;
        match section {
            SectionId::NoiseGate if i == 0 => {
                self.noise_gate_sens = value;
                true
            }
            SectionId::Amp if i < AmpParam::COUNT => {
                self.amp_values[i] = value;
                true
            }
            SectionId::Pedal1 if i < self.pedal1_type.params().len() => {
                self.pedal1_values[i] = value;
                true
            }
            SectionId::Pedal2 if i < self.pedal2_type.params().len() => {
                self.pedal2_values[i] = value;
                true
            }
            SectionId::Reverb if i < REVERB_PARAMS.len() => {
                self.reverb_values[i] = value;
                true
            }
            SectionId::EffectStatus => match EffectSlot::from_byte(index) {
                Some(slot) => {
                    self.set_effect_enabled(slot, value != 0);
                    true
                }
                None => false,
            },
            SectionId::EffectModel => self.set_effect_model(index, value),
            _ => false,
        }
    }

    fn set_effect_model(&mut self, slot_byte: u8, value: u16) -> bool {
        let byte = (value & 0x7F) as u8;
        match EffectSlot::from_byte(slot_byte) {
            Some(EffectSlot::Amp) => match AmpModel::from_byte(byte) {
                Some(model) => {
                    self.amp_model = model;
                    true
                }
                None => false,
            },
            Some(EffectSlot::Pedal1) => match Pedal1Type::from_byte(byte) {
                Some(t) => {
                    self.pedal1_type = t;
                    true
                }
                None => false,
            },
            Some(EffectSlot::Pedal2) => match Pedal2Type::from_byte(byte) {
                Some(t) => {
                    self.pedal2_type = t;
                    true
                }
                None => false,
            },
            Some(EffectSlot::Reverb) => match ReverbType::from_byte(byte) {
                Some(t) => {
                    self.reverb_type = t;
                    true
                }
                None => false,
            },
            None => false,
        }
    }

    pub fn effect_enabled(&self, slot: EffectSlot) -> bool {
        match slot {
            EffectSlot::Amp => true,
            EffectSlot::Pedal1 => self.pedal1_on,
            EffectSlot::Pedal2 => self.pedal2_on,
            EffectSlot::Reverb => self.reverb_on,
        }
    }

    pub fn set_effect_enabled(&mut self, slot: EffectSlot, on: bool) {
        match slot {
            EffectSlot::Amp => {}
            EffectSlot::Pedal1 => self.pedal1_on = on,
            EffectSlot::Pedal2 => self.pedal2_on = on,
            EffectSlot::Reverb => self.reverb_on = on,
        }
    }

    /// Clamp every value into its legal range. Returns the names of the
    /// parameters that were out of range, so callers can flag the dump as
    /// a data error instead of silently storing garbage.
    pub fn clamp_all(&mut self) -> Vec<&'static str> {
        let mut flagged = Vec::new();

        if !NOISE_GATE_SENS.contains(self.noise_gate_sens) {
            self.noise_gate_sens = NOISE_GATE_SENS.clamp(self.noise_gate_sens);
            flagged.push(NOISE_GATE_SENS.name);
        }
        for (value, spec) in self.amp_values.iter_mut().zip(AMP_PARAMS.iter()) {
            if !spec.contains(*value) {
                *value = spec.clamp(*value);
                flagged.push(spec.name);
            }
        }
        for (value, spec) in self.pedal1_values.iter_mut().zip(self.pedal1_type.params()) {
            if !spec.contains(*value) {
                *value = spec.clamp(*value);
                flagged.push(spec.name);
            }
        }
        for (value, spec) in self.pedal2_values.iter_mut().zip(self.pedal2_type.params()) {
            if !spec.contains(*value) {
                *value = spec.clamp(*value);
                flagged.push(spec.name);
            }
        }
        for (value, spec) in self.reverb_values.iter_mut().zip(REVERB_PARAMS.iter()) {
            if !spec.contains(*value) {
                *value = spec.clamp(*value);
                flagged.push(spec.name);
            }
        }

        flagged
    }

    pub fn to_ampfx(&self) -> AmpFx {
        AmpFx {
            pedal1_on: self.pedal1_on,
            pedal2_on: self.pedal2_on,
            reverb_on: self.reverb_on,
            amp_model: self.amp_model,
            amp_values: self.amp_values,
            pedal1_type: self.pedal1_type,
            pedal1_values: self.pedal1_values,
            pedal2_type: self.pedal2_type,
            pedal2_values: self.pedal2_values,
            reverb_type: self.reverb_type,
            reverb_values: self.reverb_values,
        }
    }
}

/// The amplifier + pedal + reverb subset of a program, exchanged with the
/// custom AmpFx slots. No name, no noise gate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AmpFx {
    pub pedal1_on: bool,
    pub pedal2_on: bool,
    pub reverb_on: bool,
    pub amp_model: AmpModel,
    pub amp_values: [u16; AmpParam::COUNT],
    pub pedal1_type: Pedal1Type,
    pub pedal1_values: [u16; 6],
    pub pedal2_type: Pedal2Type,
    pub pedal2_values: [u16; 6],
    pub reverb_type: ReverbType,
    pub reverb_values: [u16; 5],
}

impl Default for AmpFx {
    fn default() -> Self {
        Program::default().to_ampfx()
    }
}

impl AmpFx {
    /// Encode as an AmpFx dump payload.
    pub fn encode_dump(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(AMPFX_DUMP_LEN);
        let mut status = 0;
        if self.pedal1_on {
            status |= effect_bits::PEDAL1_ON;
        }
        if self.pedal2_on {
            status |= effect_bits::PEDAL2_ON;
        }
        if self.reverb_on {
            status |= effect_bits::REVERB_ON;
        }
        out.push(status);
        out.push(self.amp_model.as_byte());
        for &value in &self.amp_values[..10] {
            out.push((value & 0x7F) as u8);
        }
        out.push((self.amp_values[AmpParam::BiasShift.index()] & 0x7F) as u8);
        out.push((self.amp_values[AmpParam::Class.index()] & 0x7F) as u8);

        out.push(self.pedal1_type.as_byte());
        let (lo, hi) = split7(self.pedal1_values[0]);
        out.push(lo);
        out.push(hi);
        for &value in &self.pedal1_values[1..6] {
            out.push((value & 0x7F) as u8);
        }

        out.push(self.pedal2_type.as_byte());
        let (lo, hi) = split7(self.pedal2_values[0]);
        out.push(lo);
        out.push(hi);
        for &value in &self.pedal2_values[1..6] {
            out.push((value & 0x7F) as u8);
        }

        out.push(self.reverb_type.as_byte());
        for &value in &self.reverb_values {
            out.push((value & 0x7F) as u8);
        }

        debug_assert_eq!(out.len(), AMPFX_DUMP_LEN);
        out
    }

    /// Decode an AmpFx dump payload.
    pub fn decode_dump(payload: &[u8]) -> Result<Self, ProgramCodecError> {
        if payload.len() < AMPFX_DUMP_LEN {
            return Err(ProgramCodecError::TooShort {
                got: payload.len(),
                expected: AMPFX_DUMP_LEN,
            });
        }

        let mut fx = AmpFx::default();
        let status = payload[0];
        fx.pedal1_on = status & effect_bits::PEDAL1_ON != 0;
        fx.pedal2_on = status & effect_bits::PEDAL2_ON != 0;
        fx.reverb_on = status & effect_bits::REVERB_ON != 0;

        fx.amp_model =
            AmpModel::from_byte(payload[1]).ok_or(ProgramCodecError::UnknownAmpModel(payload[1]))?;
        for i in 0..10 {
            fx.amp_values[i] = payload[2 + i] as u16;
        }
        fx.amp_values[AmpParam::BiasShift.index()] = payload[12] as u16;
        fx.amp_values[AmpParam::Class.index()] = payload[13] as u16;

        fx.pedal1_type = Pedal1Type::from_byte(payload[14])
            .ok_or(ProgramCodecError::UnknownPedal1Type(payload[14]))?;
        fx.pedal1_values[0] = join7(payload[15], payload[16]);
        for i in 1..6 {
            fx.pedal1_values[i] = payload[16 + i] as u16;
        }

        fx.pedal2_type = Pedal2Type::from_byte(payload[22])
            .ok_or(ProgramCodecError::UnknownPedal2Type(payload[22]))?;
        fx.pedal2_values[0] = join7(payload[23], payload[24]);
        for i in 1..6 {
            fx.pedal2_values[i] = payload[24 + i] as u16;
        }

        fx.reverb_type = ReverbType::from_byte(payload[30])
            .ok_or(ProgramCodecError::UnknownReverbType(payload[30]))?;
        for i in 0..5 {
            fx.reverb_values[i] = payload[31 + i] as u16;
        }

        Ok(fx)
    }

    /// Merge this AmpFx into a program, leaving name and noise gate alone.
    pub fn apply_to(&self, program: &mut Program) {
        program.pedal1_on = self.pedal1_on;
        program.pedal2_on = self.pedal2_on;
        program.reverb_on = self.reverb_on;
        program.amp_model = self.amp_model;
        program.amp_values = self.amp_values;
        program.pedal1_type = self.pedal1_type;
        program.pedal1_values = self.pedal1_values;
        program.pedal2_type = self.pedal2_type;
        program.pedal2_values = self.pedal2_values;
        program.reverb_type = self.reverb_type;
        program.reverb_values = self.reverb_values;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_program() -> Program {
        let mut prog = Program {
            name: "Clean Lead".to_string(),
            noise_gate_sens: 42,
            pedal1_on: true,
            reverb_on: true,
            amp_model: AmpModel::VoxAc30Tb,
            pedal1_type: Pedal1Type::Chorus,
            pedal2_type: Pedal2Type::TapeEcho,
            reverb_type: ReverbType::Spring,
            ..Program::default()
        };
        prog.amp_values = [58, 70, 55, 40, 80, 62, 35, 1, 0, 1, 2, 1];
        prog.pedal1_values = [9300, 50, 30, 77, 1, 0];
        prog.pedal2_values = [430, 66, 41, 80, 12, 0];
        prog.reverb_values = [20, 16, 40, 10, 57];
        prog
    }

    #[test]
    fn program_dump_round_trip() {
        let prog = sample_program();
        let payload = prog.encode_dump();
        assert_eq!(payload.len(), PROGRAM_DUMP_LEN);
        assert!(payload.iter().all(|&b| b < 0x80), "payload not 7-bit clean");

        let decoded = Program::decode_dump(&payload).unwrap();
        assert_eq!(decoded, prog);
    }

    #[test]
    fn ampfx_dump_round_trip() {
        let fx = sample_program().to_ampfx();
        let payload = fx.encode_dump();
        assert_eq!(payload.len(), AMPFX_DUMP_LEN);
        assert!(payload.iter().all(|&b| b < 0x80));
        assert_eq!(AmpFx::decode_dump(&payload).unwrap(), fx);
    }

    #[test]
    fn name_is_space_padded_and_trimmed() {
        let mut prog = Program::default();
        prog.name = "AC30".to_string();
        let payload = prog.encode_dump();
        assert_eq!(&payload[1..17], b"AC30            ");
        assert_eq!(Program::decode_dump(&payload).unwrap().name, "AC30");

        prog.name = "Un nom beaucoup trop long".to_string();
        let decoded = Program::decode_dump(&prog.encode_dump()).unwrap();
        assert_eq!(decoded.name.len(), NAME_LEN);
    }

    #[test]
    fn short_payload_is_rejected() {
        let err = Program::decode_dump(&[0; 10]).unwrap_err();
        assert_eq!(
            err,
            ProgramCodecError::TooShort {
                got: 10,
                expected: PROGRAM_DUMP_LEN
            }
        );
    }

    #[test]
    fn unknown_model_byte_is_rejected() {
        let mut payload = sample_program().encode_dump();
        payload[19] = 0x55;
        assert_eq!(
            Program::decode_dump(&payload).unwrap_err(),
            ProgramCodecError::UnknownAmpModel(0x55)
        );
    }

    #[test]
    fn clamp_all_flags_out_of_range_values() {
        let mut prog = sample_program();
        prog.amp_values[AmpParam::Gain.index()] = 127;
        prog.reverb_values[2] = 99; // pre delay caps at 70
        let flagged = prog.clamp_all();
        assert_eq!(flagged, vec!["gain", "pre delay"]);
        assert_eq!(prog.amp_values[AmpParam::Gain.index()], 100);
        assert_eq!(prog.reverb_values[2], 70);
        assert!(prog.clamp_all().is_empty());
    }

    #[test]
    fn addressed_access() {
        let mut prog = sample_program();
        assert_eq!(prog.value_of(SectionId::Amp, 0), Some(58));
        assert_eq!(prog.value_of(SectionId::NoiseGate, 0), Some(42));
        // comp has 4 params; index 5 only exists for 6-param types
        prog.pedal1_type = Pedal1Type::Comp;
        assert_eq!(prog.value_of(SectionId::Pedal1, 5), None);

        assert!(prog.set_value(SectionId::Reverb, 1, 33));
        assert_eq!(prog.reverb_values[1], 33);
        assert!(!prog.set_value(SectionId::Reverb, 9, 33));

        assert!(prog.set_value(SectionId::EffectModel, EffectSlot::Pedal2.as_byte(), 1));
        assert_eq!(prog.pedal2_type, Pedal2Type::Phaser);
        assert!(prog.set_value(SectionId::EffectStatus, EffectSlot::Reverb.as_byte(), 0));
        assert!(!prog.reverb_on);
    }

    #[test]
    fn serde_json_round_trip() {
        let prog = sample_program();
        let json = serde_json::to_string_pretty(&prog).unwrap();
        let back: Program = serde_json::from_str(&json).unwrap();
        assert_eq!(back, prog);
    }
}
