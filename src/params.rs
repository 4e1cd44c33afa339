//! Device parameter tables
//!
//! Sections, effect types and per-parameter ranges for the Valvetronix
//! VT-X family. Every supported model is described by static data tables
//! selected at runtime; there is no per-model type hierarchy.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Functional section of the device, used as the first address byte of a
/// parameter change message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionId {
    ProgramName,
    NoiseGate,
    EffectStatus,
    EffectModel,
    Amp,
    Pedal1,
    Pedal2,
    Reverb,
}

impl SectionId {
    pub fn as_byte(self) -> u8 {
        match self {
            SectionId::ProgramName => 0x00,
            SectionId::NoiseGate => 0x01,
            SectionId::EffectStatus => 0x02,
            SectionId::EffectModel => 0x03,
            SectionId::Amp => 0x04,
            SectionId::Pedal1 => 0x05,
            SectionId::Pedal2 => 0x06,
            SectionId::Reverb => 0x08,
        }
    }

    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x00 => Some(SectionId::ProgramName),
            0x01 => Some(SectionId::NoiseGate),
            0x02 => Some(SectionId::EffectStatus),
            0x03 => Some(SectionId::EffectModel),
            0x04 => Some(SectionId::Amp),
            0x05 => Some(SectionId::Pedal1),
            0x06 => Some(SectionId::Pedal2),
            0x08 => Some(SectionId::Reverb),
            _ => None,
        }
    }
}

impl fmt::Display for SectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SectionId::ProgramName => "program name",
            SectionId::NoiseGate => "noise gate",
            SectionId::EffectStatus => "effect status",
            SectionId::EffectModel => "effect model",
            SectionId::Amp => "amplifier",
            SectionId::Pedal1 => "pedal 1",
            SectionId::Pedal2 => "pedal 2",
            SectionId::Reverb => "reverb",
        };
        write!(f, "{}", name)
    }
}

/// Effect slot addressed by the effect-model and effect-status sections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EffectSlot {
    Amp,
    Pedal1,
    Pedal2,
    Reverb,
}

impl EffectSlot {
    pub fn as_byte(self) -> u8 {
        match self {
            EffectSlot::Amp => 0,
            EffectSlot::Pedal1 => 1,
            EffectSlot::Pedal2 => 2,
            EffectSlot::Reverb => 3,
        }
    }

    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(EffectSlot::Amp),
            1 => Some(EffectSlot::Pedal1),
            2 => Some(EffectSlot::Pedal2),
            3 => Some(EffectSlot::Reverb),
            _ => None,
        }
    }
}

/// Device mode as reported by mode data / mode change messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoxMode {
    /// Factory preset banks
    Preset,
    /// The eight user banks
    User,
    /// Knobs are live, no bank selected
    Manual,
}

impl VoxMode {
    pub fn as_byte(self) -> u8 {
        match self {
            VoxMode::Preset => 0,
            VoxMode::User => 1,
            VoxMode::Manual => 2,
        }
    }

    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(VoxMode::Preset),
            1 => Some(VoxMode::User),
            2 => Some(VoxMode::Manual),
            _ => None,
        }
    }
}

/// Legal range and display info for one device parameter.
///
/// `min`/`max` are device integer units; `unit` is the displayed unit
/// suffix, empty for plain numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParamSpec {
    pub name: &'static str,
    pub min: u16,
    pub max: u16,
    pub unit: &'static str,
}

impl ParamSpec {
    const fn new(name: &'static str, min: u16, max: u16, unit: &'static str) -> Self {
        Self {
            name,
            min,
            max,
            unit,
        }
    }

    /// Whether `value` lies inside the legal range.
    pub fn contains(&self, value: u16) -> bool {
        (self.min..=self.max).contains(&value)
    }

    /// Rail `value` into the legal range.
    pub fn clamp(&self, value: u16) -> u16 {
        value.clamp(self.min, self.max)
    }
}

/// Amplifier knob indices, in device addressing order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AmpParam {
    Gain,
    Treble,
    Middle,
    Bass,
    Volume,
    Tone,
    Resonance,
    BrightCap,
    LowCut,
    MidBoost,
    BiasShift,
    Class,
}

impl AmpParam {
    pub const COUNT: usize = 12;

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(index: usize) -> Option<Self> {
        AMP_PARAM_ORDER.get(index).copied()
    }
}

const AMP_PARAM_ORDER: [AmpParam; AmpParam::COUNT] = [
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
    AmpParam::BiasShift,
    AmpParam::Class,
];

/// Amplifier parameter specs, indexed by [`AmpParam`].
pub const AMP_PARAMS: [ParamSpec; AmpParam::COUNT] = [
    ParamSpec::new("gain", 0, 100, ""),
    ParamSpec::new("treble", 0, 100, ""),
    ParamSpec::new("middle", 0, 100, ""),
    ParamSpec::new("bass", 0, 100, ""),
    ParamSpec::new("volume", 0, 100, ""),
    ParamSpec::new("tone", 0, 100, ""),
    ParamSpec::new("resonance", 0, 100, ""),
    ParamSpec::new("bright cap", 0, 1, ""),
    ParamSpec::new("low cut", 0, 1, ""),
    ParamSpec::new("mid boost", 0, 1, ""),
    ParamSpec::new("bias shift", 0, 2, ""),
    ParamSpec::new("class", 0, 1, ""),
];

/// Noise gate sensitivity, addressed as (NoiseGate, 0).
pub const NOISE_GATE_SENS: ParamSpec = ParamSpec::new("noise gate sens", 0, 100, "");

/// The twenty amplifier models of the VT-X series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AmpModel {
    DeluxeClVibrato,
    DeluxeClNormal,
    Tweed4x10Bright,
    Tweed4x10Normal,
    BoutiqueCl,
    BoutiqueOd,
    VoxAc30,
    VoxAc30Tb,
    Brit1959Treble,
    Brit1959Normal,
    Brit800,
    BritVm,
    SlOd,
    DoubleRec,
    CaliElation,
    EruptIiiCh2,
    EruptIiiCh3,
    BoutiqueMetal,
    BritOrMkii,
    OriginalCl,
}

impl AmpModel {
    pub const COUNT: usize = 20;

    pub fn as_byte(self) -> u8 {
        self as u8
    }

    pub fn from_byte(byte: u8) -> Option<Self> {
        AMP_MODELS.get(byte as usize).copied()
    }

    /// On the AC30 models the "tone" knob drives presence instead.
    pub fn presence_is_tone(self) -> bool {
        matches!(self, AmpModel::VoxAc30 | AmpModel::VoxAc30Tb)
    }

    pub fn has_bright_cap(self) -> bool {
        !matches!(
            self,
            AmpModel::DeluxeClNormal
                | AmpModel::Tweed4x10Normal
                | AmpModel::Brit1959Normal
                | AmpModel::EruptIiiCh2
                | AmpModel::BoutiqueMetal
        )
    }
}

const AMP_MODELS: [AmpModel; AmpModel::COUNT] = [
    AmpModel::DeluxeClVibrato,
    AmpModel::DeluxeClNormal,
    AmpModel::Tweed4x10Bright,
    AmpModel::Tweed4x10Normal,
    AmpModel::BoutiqueCl,
    AmpModel::BoutiqueOd,
    AmpModel::VoxAc30,
    AmpModel::VoxAc30Tb,
    AmpModel::Brit1959Treble,
    AmpModel::Brit1959Normal,
    AmpModel::Brit800,
    AmpModel::BritVm,
    AmpModel::SlOd,
    AmpModel::DoubleRec,
    AmpModel::CaliElation,
    AmpModel::EruptIiiCh2,
    AmpModel::EruptIiiCh3,
    AmpModel::BoutiqueMetal,
    AmpModel::BritOrMkii,
    AmpModel::OriginalCl,
];

/// Pedal 1 effect types (compressor, chorus, drives).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Pedal1Type {
    Comp,
    Chorus,
    TubeOd,
    GoldDrive,
    TrebleBoost,
    RcTurbo,
    OrangeDist,
    FatDist,
    BritLead,
    Fuzz,
}

const PEDAL1_TYPES: [Pedal1Type; 10] = [
    Pedal1Type::Comp,
    Pedal1Type::Chorus,
    Pedal1Type::TubeOd,
    Pedal1Type::GoldDrive,
    Pedal1Type::TrebleBoost,
    Pedal1Type::RcTurbo,
    Pedal1Type::OrangeDist,
    Pedal1Type::FatDist,
    Pedal1Type::BritLead,
    Pedal1Type::Fuzz,
];

const COMP_PARAMS: [ParamSpec; 4] = [
    ParamSpec::new("sens", 0, 100, ""),
    ParamSpec::new("level", 0, 100, ""),
    ParamSpec::new("attack", 0, 100, ""),
    ParamSpec::new("voice", 0, 2, ""),
];

const CHORUS_PARAMS: [ParamSpec; 6] = [
    ParamSpec::new("speed", 100, 10000, "Hz/100"),
    ParamSpec::new("depth", 0, 100, ""),
    ParamSpec::new("manual", 0, 100, ""),
    ParamSpec::new("mix", 0, 100, ""),
    ParamSpec::new("low cut", 0, 1, ""),
    ParamSpec::new("high cut", 0, 1, ""),
];

const DRIVE_PARAMS: [ParamSpec; 6] = [
    ParamSpec::new("drive", 0, 100, ""),
    ParamSpec::new("tone", 0, 100, ""),
    ParamSpec::new("level", 0, 100, ""),
    ParamSpec::new("treble", 0, 100, ""),
    ParamSpec::new("middle", 0, 100, ""),
    ParamSpec::new("bass", 0, 100, ""),
];

impl Pedal1Type {
    pub fn as_byte(self) -> u8 {
        self as u8
    }

    pub fn from_byte(byte: u8) -> Option<Self> {
        PEDAL1_TYPES.get(byte as usize).copied()
    }

    /// Parameter table for this pedal type. Indices past the table length
    /// are invalid for the type even though the wire format always carries
    /// six value slots.
    pub fn params(self) -> &'static [ParamSpec] {
        match self {
            Pedal1Type::Comp => &COMP_PARAMS,
            Pedal1Type::Chorus => &CHORUS_PARAMS,
            _ => &DRIVE_PARAMS,
        }
    }

    /// Whether the first parameter is a 14-bit value on the wire.
    pub fn wide_first(self) -> bool {
        self == Pedal1Type::Chorus
    }

    pub fn is_overdrive(self) -> bool {
        matches!(
            self,
            Pedal1Type::TubeOd | Pedal1Type::GoldDrive | Pedal1Type::TrebleBoost | Pedal1Type::RcTurbo
        )
    }

    pub fn is_distortion(self) -> bool {
        matches!(
            self,
            Pedal1Type::OrangeDist | Pedal1Type::FatDist | Pedal1Type::BritLead | Pedal1Type::Fuzz
        )
    }
}

/// Pedal 2 effect types (modulation and delay).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Pedal2Type {
    Flanger,
    Phaser,
    Tremolo,
    TapeEcho,
    AnalogDelay,
    DigitalDelay,
}

const PEDAL2_TYPES: [Pedal2Type; 6] = [
    Pedal2Type::Flanger,
    Pedal2Type::Phaser,
    Pedal2Type::Tremolo,
    Pedal2Type::TapeEcho,
    Pedal2Type::AnalogDelay,
    Pedal2Type::DigitalDelay,
];

const FLANGER_PARAMS: [ParamSpec; 6] = [
    ParamSpec::new("speed", 100, 10000, "Hz/100"),
    ParamSpec::new("depth", 0, 100, ""),
    ParamSpec::new("manual", 0, 100, ""),
    ParamSpec::new("low cut", 0, 1, ""),
    ParamSpec::new("high cut", 0, 1, ""),
    ParamSpec::new("resonance", 0, 100, ""),
];

const PHASER_PARAMS: [ParamSpec; 4] = [
    ParamSpec::new("speed", 100, 10000, "Hz/100"),
    ParamSpec::new("depth", 0, 100, ""),
    ParamSpec::new("resonance", 0, 100, ""),
    ParamSpec::new("manual", 0, 100, ""),
];

const TREMOLO_PARAMS: [ParamSpec; 4] = [
    ParamSpec::new("speed", 165, 10000, "Hz/100"),
    ParamSpec::new("depth", 0, 100, ""),
    ParamSpec::new("duty", 0, 100, ""),
    ParamSpec::new("shape", 0, 100, ""),
];

const DELAY_PARAMS: [ParamSpec; 5] = [
    ParamSpec::new("time", 30, 1200, "ms"),
    ParamSpec::new("level", 0, 100, ""),
    ParamSpec::new("feedback", 0, 100, ""),
    ParamSpec::new("tone", 0, 100, ""),
    ParamSpec::new("mod speed", 0, 100, ""),
];

impl Pedal2Type {
    pub fn as_byte(self) -> u8 {
        self as u8
    }

    pub fn from_byte(byte: u8) -> Option<Self> {
        PEDAL2_TYPES.get(byte as usize).copied()
    }

    pub fn params(self) -> &'static [ParamSpec] {
        match self {
            Pedal2Type::Flanger => &FLANGER_PARAMS,
            Pedal2Type::Phaser => &PHASER_PARAMS,
            Pedal2Type::Tremolo => &TREMOLO_PARAMS,
            _ => &DELAY_PARAMS,
        }
    }

    /// The speed/time parameter exceeds 7 bits for every pedal 2 type.
    pub fn wide_first(self) -> bool {
        true
    }
}

/// Reverb algorithm types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReverbType {
    Room,
    Spring,
    Hall,
    Plate,
}

const REVERB_TYPES: [ReverbType; 4] = [
    ReverbType::Room,
    ReverbType::Spring,
    ReverbType::Hall,
    ReverbType::Plate,
];

/// Reverb parameter specs, identical for every algorithm.
pub const REVERB_PARAMS: [ParamSpec; 5] = [
    ParamSpec::new("mix", 0, 100, ""),
    ParamSpec::new("time", 0, 100, ""),
    ParamSpec::new("pre delay", 0, 70, "ms"),
    ParamSpec::new("low damp", 0, 100, ""),
    ParamSpec::new("high damp", 0, 100, ""),
];

impl ReverbType {
    pub fn as_byte(self) -> u8 {
        self as u8
    }

    pub fn from_byte(byte: u8) -> Option<Self> {
        REVERB_TYPES.get(byte as usize).copied()
    }

    pub fn params(self) -> &'static [ParamSpec] {
        &REVERB_PARAMS
    }
}

/// Effect enable bits carried in the program dump status byte.
pub mod effect_bits {
    pub const PEDAL1_ON: u8 = 0x02;
    pub const PEDAL2_ON: u8 = 0x04;
    pub const REVERB_ON: u8 = 0x10;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn section_byte_round_trip() {
        for section in [
            SectionId::ProgramName,
            SectionId::NoiseGate,
            SectionId::EffectStatus,
            SectionId::EffectModel,
            SectionId::Amp,
            SectionId::Pedal1,
            SectionId::Pedal2,
            SectionId::Reverb,
        ] {
            assert_eq!(SectionId::from_byte(section.as_byte()), Some(section));
        }
        assert_eq!(SectionId::from_byte(0x07), None);
    }

    #[test]
    fn amp_model_table_is_exhaustive() {
        for byte in 0..AmpModel::COUNT as u8 {
            let model = AmpModel::from_byte(byte).unwrap();
            assert_eq!(model.as_byte(), byte);
        }
        assert_eq!(AmpModel::from_byte(20), None);
    }

    #[test]
    fn pedal_param_tables() {
        assert_eq!(Pedal1Type::Comp.params().len(), 4);
        assert_eq!(Pedal1Type::Chorus.params().len(), 6);
        assert!(Pedal1Type::Fuzz.is_distortion());
        assert!(Pedal1Type::TubeOd.is_overdrive());
        assert!(!Pedal1Type::Comp.wide_first());
        assert!(Pedal1Type::Chorus.wide_first());
        assert!(Pedal2Type::TapeEcho.wide_first());
        assert_eq!(Pedal2Type::Phaser.params().len(), 4);
    }

    #[test]
    fn spec_clamps() {
        let spec = ParamSpec::new("speed", 100, 10000, "Hz/100");
        assert_eq!(spec.clamp(50), 100);
        assert_eq!(spec.clamp(20000), 10000);
        assert!(spec.contains(100));
        assert!(!spec.contains(99));
    }

    #[test]
    fn bright_cap_capability() {
        assert!(AmpModel::VoxAc30.has_bright_cap());
        assert!(!AmpModel::BoutiqueMetal.has_bright_cap());
        assert!(AmpModel::VoxAc30Tb.presence_is_tone());
    }
}
