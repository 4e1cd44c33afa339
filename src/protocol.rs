//! SysEx codec for the VT-X wire protocol
//!
//! Frames look like `F0 42 30 00 01 34 <function> <payload...> <checksum>
//! F7`. The checksum is the 7-bit two's complement of the byte sum over
//! function byte and payload, so that the masked sum of function, payload
//! and checksum is zero. Every data byte inside the frame must be 7-bit
//! clean; wide values travel as low/high pairs.
//!
//! Both directions share one [`VtxMessage`] enum, so
//! `decode(&encode(msg)) == msg` holds for every message kind.

use thiserror::Error;

use crate::params::{SectionId, VoxMode};
use crate::program::{AmpFx, Program, ProgramCodecError, AMPFX_DUMP_LEN, PROGRAM_DUMP_LEN};

/// Frame prefix: SysEx status, Korg manufacturer id, channel, VT-X model id.
pub const SYSEX_HEADER: [u8; 6] = [0xF0, 0x42, 0x30, 0x00, 0x01, 0x34];

/// End-of-exclusive byte.
pub const SYSEX_END: u8 = 0xF7;

/// Function codes of the VT-X protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FunctionCode {
    ModeRequest = 0x12,
    CurrentProgramDumpRequest = 0x10,
    ProgramDumpRequest = 0x1C,
    AmpFxDumpRequest = 0x31,
    ProgramWriteRequest = 0x11,
    ModeData = 0x42,
    CurrentProgramDump = 0x40,
    ProgramDump = 0x4C,
    AmpFxDump = 0x65,
    ModeChange = 0x4E,
    ParameterChange = 0x41,
    DataFormatError = 0x26,
    DataLoadCompleted = 0x23,
    DataLoadError = 0x24,
    WriteCompleted = 0x21,
    WriteError = 0x22,
}

impl FunctionCode {
    pub fn from_byte(byte: u8) -> Option<Self> {
        use FunctionCode::*;
        Some(match byte {
            0x12 => ModeRequest,
            0x10 => CurrentProgramDumpRequest,
            0x1C => ProgramDumpRequest,
            0x31 => AmpFxDumpRequest,
            0x11 => ProgramWriteRequest,
            0x42 => ModeData,
            0x40 => CurrentProgramDump,
            0x4C => ProgramDump,
            0x65 => AmpFxDump,
            0x4E => ModeChange,
            0x41 => ParameterChange,
            0x26 => DataFormatError,
            0x23 => DataLoadCompleted,
            0x24 => DataLoadError,
            0x21 => WriteCompleted,
            0x22 => WriteError,
            _ => return None,
        })
    }
}

/// A decoded protocol message, either direction.
#[derive(Debug, Clone, PartialEq)]
pub enum VtxMessage {
    /// Ask the device for its mode and selected slot
    ModeRequest,
    /// Ask for the current (edit buffer) program
    CurrentProgramRequest,
    /// Ask for a bank-resident program
    ProgramRequest { mode: VoxMode, slot: u8 },
    /// Ask for a custom AmpFx slot
    AmpFxRequest { slot: u8 },
    /// Ask the device to store its current program at a user bank slot
    ProgramWriteRequest { slot: u8 },
    /// One parameter changed, device- or application-initiated
    ParameterChange {
        section: SectionId,
        index: u8,
        value: u16,
    },
    /// Switch device mode / select a slot
    ModeChange { mode: VoxMode, slot: u8 },
    /// Response to [`VtxMessage::ModeRequest`]
    ModeData { mode: VoxMode, slot: u8 },
    /// Full snapshot of the edit buffer (response or upload)
    CurrentProgramDump(Program),
    /// Full snapshot of a bank slot (response or upload)
    ProgramDump {
        mode: VoxMode,
        slot: u8,
        program: Program,
    },
    /// Full snapshot of an AmpFx slot (response or upload)
    AmpFxDump { slot: u8, ampfx: AmpFx },
    /// Device stored its current program at a user bank slot
    WriteCompleted { slot: u8 },
    /// Device accepted an uploaded dump
    DataLoadCompleted,
    /// Device rejected a program write
    WriteError,
    /// Device rejected an uploaded dump
    DataLoadError,
    /// Device could not parse the last message
    DataFormatError,
}

/// Frame-level decode failures. A frame that fails here is dropped without
/// touching any model state.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("frame too short ({0} bytes)")]
    TooShort(usize),
    #[error("not a VT-X frame")]
    ForeignHeader,
    #[error("unterminated sysex frame")]
    Unterminated,
    #[error("data byte out of 7-bit range")]
    WideDataByte,
    #[error("corrupt message: checksum mismatch (expected {expected:#04X}, got {got:#04X})")]
    BadChecksum { expected: u8, got: u8 },
    #[error("unknown function code {0:#04X}")]
    UnknownFunction(u8),
    #[error("unknown mode byte {0:#04X}")]
    UnknownMode(u8),
    #[error("unknown section byte {0:#04X}")]
    UnknownSection(u8),
    #[error("truncated {0:?} payload")]
    Truncated(FunctionCode),
    #[error("bad dump payload: {0}")]
    BadDump(#[from] ProgramCodecError),
}

impl ProtocolError {
    /// Foreign frames are other gear on the bus, not corruption; they
    /// never escalate the synchronizer toward the error state.
    pub fn is_foreign(&self) -> bool {
        matches!(self, ProtocolError::ForeignHeader)
    }
}

/// 7-bit two's-complement checksum over `bytes`.
pub fn checksum(bytes: &[u8]) -> u8 {
    let sum: u32 = bytes.iter().map(|&b| b as u32).sum();
    ((0x80 - (sum & 0x7F)) & 0x7F) as u8
}

fn split7(value: u16) -> (u8, u8) {
    ((value & 0x7F) as u8, ((value >> 7) & 0x7F) as u8)
}

impl VtxMessage {
    pub fn function_code(&self) -> FunctionCode {
        use VtxMessage::*;
        match self {
            ModeRequest => FunctionCode::ModeRequest,
            CurrentProgramRequest => FunctionCode::CurrentProgramDumpRequest,
            ProgramRequest { .. } => FunctionCode::ProgramDumpRequest,
            AmpFxRequest { .. } => FunctionCode::AmpFxDumpRequest,
            ProgramWriteRequest { .. } => FunctionCode::ProgramWriteRequest,
            ParameterChange { .. } => FunctionCode::ParameterChange,
            ModeChange { .. } => FunctionCode::ModeChange,
            ModeData { .. } => FunctionCode::ModeData,
            CurrentProgramDump(_) => FunctionCode::CurrentProgramDump,
            ProgramDump { .. } => FunctionCode::ProgramDump,
            AmpFxDump { .. } => FunctionCode::AmpFxDump,
            WriteCompleted { .. } => FunctionCode::WriteCompleted,
            DataLoadCompleted => FunctionCode::DataLoadCompleted,
            WriteError => FunctionCode::WriteError,
            DataLoadError => FunctionCode::DataLoadError,
            DataFormatError => FunctionCode::DataFormatError,
        }
    }

    /// Encode into a complete framed byte sequence.
    pub fn encode(&self) -> Vec<u8> {
        let mut body = vec![self.function_code() as u8];
        self.write_payload(&mut body);

        let mut frame = Vec::with_capacity(SYSEX_HEADER.len() + body.len() + 2);
        frame.extend_from_slice(&SYSEX_HEADER);
        frame.extend_from_slice(&body);
        frame.push(checksum(&body));
        frame.push(SYSEX_END);
        frame
    }

    fn write_payload(&self, out: &mut Vec<u8>) {
        use VtxMessage::*;
        match self {
            ModeRequest | CurrentProgramRequest | DataLoadCompleted | WriteError
            | DataLoadError | DataFormatError => {}
            ProgramRequest { mode, slot } => {
                out.push(mode.as_byte());
                out.push(slot & 0x7F);
            }
            AmpFxRequest { slot } => {
                out.push(0);
                out.push(slot & 0x7F);
            }
            ProgramWriteRequest { slot } => {
                out.push(0);
                out.push(slot & 0x7F);
            }
            ParameterChange {
                section,
                index,
                value,
            } => {
                let (lo, hi) = split7(*value);
                out.push(section.as_byte());
                out.push(index & 0x7F);
                out.push(lo);
                out.push(hi);
            }
            ModeChange { mode, slot } | ModeData { mode, slot } => {
                out.push(mode.as_byte());
                out.push(slot & 0x7F);
            }
            CurrentProgramDump(program) => {
                out.extend_from_slice(&program.encode_dump());
            }
            ProgramDump {
                mode,
                slot,
                program,
            } => {
                out.push(mode.as_byte());
                out.push(slot & 0x7F);
                out.extend_from_slice(&program.encode_dump());
            }
            AmpFxDump { slot, ampfx } => {
                out.push(0);
                out.push(slot & 0x7F);
                out.extend_from_slice(&ampfx.encode_dump());
            }
            WriteCompleted { slot } => {
                out.push(0);
                out.push(slot & 0x7F);
            }
        }
    }

    /// Decode a raw framed byte sequence.
    pub fn decode(raw: &[u8]) -> Result<Self, ProtocolError> {
        if raw.len() < SYSEX_HEADER.len() + 3 {
            return Err(ProtocolError::TooShort(raw.len()));
        }
        if raw[..SYSEX_HEADER.len()] != SYSEX_HEADER {
            return Err(ProtocolError::ForeignHeader);
        }
        if raw[raw.len() - 1] != SYSEX_END {
            return Err(ProtocolError::Unterminated);
        }

        let body = &raw[SYSEX_HEADER.len()..raw.len() - 2];
        let got = raw[raw.len() - 2];
        if body.iter().any(|&b| b >= 0x80) || got >= 0x80 {
            return Err(ProtocolError::WideDataByte);
        }
        let expected = checksum(body);
        if expected != got {
            return Err(ProtocolError::BadChecksum { expected, got });
        }

        let function = FunctionCode::from_byte(body[0])
            .ok_or(ProtocolError::UnknownFunction(body[0]))?;
        let payload = &body[1..];
        Self::parse_payload(function, payload)
    }

    fn parse_payload(function: FunctionCode, payload: &[u8]) -> Result<Self, ProtocolError> {
        use FunctionCode as F;

        let need = |n: usize| {
            if payload.len() < n {
                Err(ProtocolError::Truncated(function))
            } else {
                Ok(())
            }
        };
        let mode_at = |i: usize| {
            VoxMode::from_byte(payload[i]).ok_or(ProtocolError::UnknownMode(payload[i]))
        };

        Ok(match function {
            F::ModeRequest => VtxMessage::ModeRequest,
            F::CurrentProgramDumpRequest => VtxMessage::CurrentProgramRequest,
            F::ProgramDumpRequest => {
                need(2)?;
                VtxMessage::ProgramRequest {
                    mode: mode_at(0)?,
                    slot: payload[1],
                }
            }
            F::AmpFxDumpRequest => {
                need(2)?;
                VtxMessage::AmpFxRequest { slot: payload[1] }
            }
            F::ProgramWriteRequest => {
                need(2)?;
                VtxMessage::ProgramWriteRequest { slot: payload[1] }
            }
            F::ParameterChange => {
                need(4)?;
                let section = SectionId::from_byte(payload[0])
                    .ok_or(ProtocolError::UnknownSection(payload[0]))?;
                VtxMessage::ParameterChange {
                    section,
                    index: payload[1],
                    value: (payload[2] as u16) | ((payload[3] as u16) << 7),
                }
            }
            F::ModeChange => {
                need(2)?;
                VtxMessage::ModeChange {
                    mode: mode_at(0)?,
                    slot: payload[1],
                }
            }
            F::ModeData => {
                need(2)?;
                VtxMessage::ModeData {
                    mode: mode_at(0)?,
                    slot: payload[1],
                }
            }
            F::CurrentProgramDump => {
                need(PROGRAM_DUMP_LEN)?;
                VtxMessage::CurrentProgramDump(Program::decode_dump(payload)?)
            }
            F::ProgramDump => {
                need(2 + PROGRAM_DUMP_LEN)?;
                VtxMessage::ProgramDump {
                    mode: mode_at(0)?,
                    slot: payload[1],
                    program: Program::decode_dump(&payload[2..])?,
                }
            }
            F::AmpFxDump => {
                need(2 + AMPFX_DUMP_LEN)?;
                VtxMessage::AmpFxDump {
                    slot: payload[1],
                    ampfx: AmpFx::decode_dump(&payload[2..])?,
                }
            }
            F::WriteCompleted => {
                need(2)?;
                VtxMessage::WriteCompleted { slot: payload[1] }
            }
            F::DataLoadCompleted => VtxMessage::DataLoadCompleted,
            F::WriteError => VtxMessage::WriteError,
            F::DataLoadError => VtxMessage::DataLoadError,
            F::DataFormatError => VtxMessage::DataFormatError,
        })
    }
}

/// Quick check whether raw bytes begin a SysEx frame at all.
pub fn is_sysex(raw: &[u8]) -> bool {
    raw.first() == Some(&0xF0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::{AmpModel, Pedal1Type};
    use proptest::prelude::*;

    fn sample_program() -> Program {
        let mut prog = Program {
            name: "Crunch 5".to_string(),
            noise_gate_sens: 31,
            pedal1_on: true,
            amp_model: AmpModel::Brit800,
            pedal1_type: Pedal1Type::TubeOd,
            ..Program::default()
        };
        prog.amp_values = [75, 40, 52, 61, 88, 50, 20, 1, 0, 0, 1, 0];
        prog.pedal1_values = [66, 50, 70, 10, 20, 30];
        prog.pedal2_values = [860, 0, 45, 0, 0, 0];
        prog.reverb_values = [25, 40, 12, 0, 80];
        prog
    }

    fn all_message_kinds() -> Vec<VtxMessage> {
        vec![
            VtxMessage::ModeRequest,
            VtxMessage::CurrentProgramRequest,
            VtxMessage::ProgramRequest {
                mode: VoxMode::User,
                slot: 3,
            },
            VtxMessage::AmpFxRequest { slot: 2 },
            VtxMessage::ProgramWriteRequest { slot: 6 },
            VtxMessage::ParameterChange {
                section: SectionId::Pedal2,
                index: 0,
                value: 9999,
            },
            VtxMessage::ModeChange {
                mode: VoxMode::Manual,
                slot: 0,
            },
            VtxMessage::ModeData {
                mode: VoxMode::Preset,
                slot: 41,
            },
            VtxMessage::CurrentProgramDump(sample_program()),
            VtxMessage::ProgramDump {
                mode: VoxMode::User,
                slot: 7,
                program: sample_program(),
            },
            VtxMessage::AmpFxDump {
                slot: 1,
                ampfx: sample_program().to_ampfx(),
            },
            VtxMessage::WriteCompleted { slot: 4 },
            VtxMessage::DataLoadCompleted,
            VtxMessage::WriteError,
            VtxMessage::DataLoadError,
            VtxMessage::DataFormatError,
        ]
    }

    #[test]
    fn every_message_kind_round_trips() {
        for msg in all_message_kinds() {
            let frame = msg.encode();
            assert_eq!(frame[..6], SYSEX_HEADER, "{msg:?}");
            assert_eq!(*frame.last().unwrap(), SYSEX_END);
            let decoded = VtxMessage::decode(&frame).unwrap_or_else(|e| {
                panic!("failed to decode {msg:?}: {e}");
            });
            assert_eq!(decoded, msg);
        }
    }

    #[test]
    fn checksum_sums_to_zero() {
        let body = [0x41, 0x04, 0x00, 0x3A, 0x00];
        let cks = checksum(&body);
        let total: u32 = body.iter().map(|&b| b as u32).sum::<u32>() + cks as u32;
        assert_eq!(total & 0x7F, 0);
    }

    #[test]
    fn foreign_header_is_not_corruption() {
        let mut frame = VtxMessage::ModeRequest.encode();
        frame[1] = 0x43; // some other manufacturer
        let err = VtxMessage::decode(&frame).unwrap_err();
        assert_eq!(err, ProtocolError::ForeignHeader);
        assert!(err.is_foreign());
        assert!(!ProtocolError::WideDataByte.is_foreign());
    }

    #[test]
    fn missing_terminator_is_rejected() {
        let mut frame = VtxMessage::ModeRequest.encode();
        frame.pop();
        frame.push(0x00);
        assert_eq!(
            VtxMessage::decode(&frame).unwrap_err(),
            ProtocolError::Unterminated
        );
    }

    #[test]
    fn unknown_function_code_is_rejected() {
        let body = [0x7E_u8];
        let mut frame = SYSEX_HEADER.to_vec();
        frame.extend_from_slice(&body);
        frame.push(checksum(&body));
        frame.push(SYSEX_END);
        assert_eq!(
            VtxMessage::decode(&frame).unwrap_err(),
            ProtocolError::UnknownFunction(0x7E)
        );
    }

    proptest! {
        /// Flipping any bits of any single byte between the header and the
        /// terminator makes decoding fail; corruption can never pass as a
        /// valid message.
        #[test]
        fn corrupting_one_byte_always_fails(
            msg_idx in 0usize..16,
            offset in 0usize..1024,
            mask in 1u8..=0xFF,
        ) {
            let msg = all_message_kinds().swap_remove(msg_idx);
            let mut frame = msg.encode();
            let corruptible = frame.len() - 1 - SYSEX_HEADER.len();
            let at = SYSEX_HEADER.len() + offset % corruptible;
            frame[at] ^= mask;
            prop_assert!(VtxMessage::decode(&frame).is_err());
        }
    }
}
