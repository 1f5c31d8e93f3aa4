/*
    Copyright (C) 2020-2022  Rafal Michalski

    This file is part of SPECTAPE, a Rust library of ZX Spectrum tape formats.

    For the full copyright notice, see the lib.rs file.
*/
use core::fmt;
use core::hash::{Hash, Hasher};
use core::convert::TryFrom;

#[cfg(feature = "snapshot")]
use serde::{Serialize, Deserialize};

use crate::tap::TapChunkInfo;
use super::pulse::consts::*;

/// The kind of a [TapeBlock]. The discriminants are the block ids of the *TZX* format.
#[cfg_attr(feature = "snapshot", derive(Serialize, Deserialize))]
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum BlockKind {
    Rom            = 0x10,
    Turbo          = 0x11,
    PureTone       = 0x12,
    Pulses         = 0x13,
    PureData       = 0x14,
    RawData        = 0x15,
    Pause          = 0x20,
    GroupStart     = 0x21,
    GroupEnd       = 0x22,
    Jump           = 0x23,
    LoopStart      = 0x24,
    LoopEnd        = 0x25,
    CallSequence   = 0x26,
    Return         = 0x27,
    Select         = 0x28,
    StopIf48k      = 0x2A,
    SetSignalLevel = 0x2B,
    Comment        = 0x30,
    Message        = 0x31,
    ArchiveInfo    = 0x32,
    Hardware       = 0x33,
    Custom         = 0x35,
    /// Any other block preserved as raw bytes.
    Unsupported    = 0xFF
}

/// A text of a tape block.
///
/// Tape texts are 8-bit ISO 8859-1 strings. Lines are separated with `'\r'`.
#[cfg_attr(feature = "snapshot", derive(Serialize, Deserialize))]
#[derive(Clone, Default, PartialEq, Eq, Hash)]
pub struct TapeText(Box<[u8]>);

/// One of the entries of the *select* block.
#[cfg_attr(feature = "snapshot", derive(Serialize, Deserialize))]
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SelectItem {
    /// A block offset relative to the select block.
    pub offset: i16,
    pub description: TapeText
}

/// One of the entries of the *archive info* block.
#[cfg_attr(feature = "snapshot", derive(Serialize, Deserialize))]
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ArchiveItem {
    /// The kind of information: 0x00 is a title, 0x01 a publisher, 0x02 an author, etc.
    pub id: u8,
    pub text: TapeText
}

/// One of the entries of the *hardware info* block.
#[cfg_attr(feature = "snapshot", derive(Serialize, Deserialize))]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct HardwareInfo {
    pub hw_type: u8,
    pub hw_id: u8,
    /// 0: runs, 1: uses special features, 2: runs without special features, 3: does not run.
    pub value: u8
}

/// The playback phase of the timed data blocks.
#[cfg_attr(feature = "snapshot", derive(Serialize, Deserialize))]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DataPhase {
    Pilot,
    Sync1,
    Sync2,
    Data1,
    Data2,
    Pause
}

/// The playback state of the timed data blocks.
#[cfg_attr(feature = "snapshot", derive(Serialize, Deserialize))]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct DataState {
    pub phase: DataPhase,
    /// The remaining number of pilot pulses.
    pub edge_count: u16,
    /// The index of the next byte to load.
    pub bytes_through_block: usize,
    /// The number of bits left in `current_byte`.
    pub bits_left: u8,
    /// The remaining bits of the current byte, MSB first.
    pub current_byte: u8,
    /// The length of both pulses of the current bit.
    pub bit_tstates: u16
}

/// The playback phase of the raw data block.
#[cfg_attr(feature = "snapshot", derive(Serialize, Deserialize))]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RawPhase {
    Data,
    Pause
}

/// The playback state of the raw data block.
#[cfg_attr(feature = "snapshot", derive(Serialize, Deserialize))]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RawState {
    pub phase: RawPhase,
    pub bytes_through_block: usize,
    pub bits_through_byte: u8,
    /// The signal level of the current run of samples.
    pub last_bit: bool,
    pub bit_tstates: u32
}

/// A block encoded with the ROM timings.
#[cfg_attr(feature = "snapshot", derive(Serialize, Deserialize))]
#[derive(Clone, Debug)]
pub struct RomBlock {
    /// The pause after this block in milliseconds.
    pub pause: u16,
    pub data: Box<[u8]>,
    pub(crate) state: DataState
}

/// A block encoded with custom timings.
#[cfg_attr(feature = "snapshot", derive(Serialize, Deserialize))]
#[derive(Clone, Debug)]
pub struct TurboBlock {
    pub pilot_length: u16,
    pub sync1_length: u16,
    pub sync2_length: u16,
    pub bit0_length: u16,
    pub bit1_length: u16,
    pub pilot_pulses: u16,
    /// The number of used bits of the last byte, counted from the MSB.
    pub bits_in_last_byte: u8,
    pub pause: u16,
    pub data: Box<[u8]>,
    pub(crate) state: DataState
}

/// A single tone of `pulses` pulses of the same length.
#[cfg_attr(feature = "snapshot", derive(Serialize, Deserialize))]
#[derive(Clone, Debug)]
pub struct PureToneBlock {
    pub length: u16,
    pub pulses: u16,
    pub(crate) remaining: u16
}

/// A sequence of pulses of different lengths.
#[cfg_attr(feature = "snapshot", derive(Serialize, Deserialize))]
#[derive(Clone, Debug)]
pub struct PulsesBlock {
    pub lengths: Box<[u16]>,
    pub(crate) index: usize
}

/// Data pulses without the pilot and sync pulses.
#[cfg_attr(feature = "snapshot", derive(Serialize, Deserialize))]
#[derive(Clone, Debug)]
pub struct PureDataBlock {
    pub bit0_length: u16,
    pub bit1_length: u16,
    pub bits_in_last_byte: u8,
    pub pause: u16,
    pub data: Box<[u8]>,
    pub(crate) state: DataState
}

/// A sampled signal, each bit is the signal level of one sample.
#[cfg_attr(feature = "snapshot", derive(Serialize, Deserialize))]
#[derive(Clone, Debug)]
pub struct RawDataBlock {
    /// T-states per sample.
    pub bit_length: u16,
    pub pause: u16,
    pub bits_in_last_byte: u8,
    pub data: Box<[u8]>,
    pub(crate) state: RawState
}

// Equality and hashing of the timed blocks ignore their playback state.
macro_rules! impl_eq_without_state {
    ($name:ident { $($field:ident),* }) => {
        impl PartialEq for $name {
            fn eq(&self, other: &Self) -> bool {
                $(self.$field == other.$field)&&*
            }
        }

        impl Eq for $name {}

        impl Hash for $name {
            fn hash<H: Hasher>(&self, state: &mut H) {
                $(self.$field.hash(state);)*
            }
        }
    };
}

impl_eq_without_state!(RomBlock { pause, data });
impl_eq_without_state!(TurboBlock {
    pilot_length, sync1_length, sync2_length, bit0_length, bit1_length,
    pilot_pulses, bits_in_last_byte, pause, data
});
impl_eq_without_state!(PureToneBlock { length, pulses });
impl_eq_without_state!(PulsesBlock { lengths });
impl_eq_without_state!(PureDataBlock { bit0_length, bit1_length, bits_in_last_byte, pause, data });
impl_eq_without_state!(RawDataBlock { bit_length, pause, bits_in_last_byte, data });

/// A single block of the tape.
///
/// Timed blocks carry their own playback state which is re-initialized each time
/// the block becomes the current block of a [Tape][super::Tape].
#[cfg_attr(feature = "snapshot", derive(Serialize, Deserialize))]
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum TapeBlock {
    Rom(RomBlock),
    Turbo(TurboBlock),
    PureTone(PureToneBlock),
    Pulses(PulsesBlock),
    PureData(PureDataBlock),
    RawData(RawDataBlock),
    /// A pause in milliseconds. A pause of 0 stops the tape.
    Pause(u16),
    GroupStart(TapeText),
    GroupEnd,
    /// A jump relative to this block.
    Jump(i16),
    /// The number of repetitions of the blocks up to the next [TapeBlock::LoopEnd].
    LoopStart(u16),
    LoopEnd,
    /// Offsets of the blocks to be called, relative to this block.
    CallSequence(Box<[i16]>),
    Return,
    Select(Box<[SelectItem]>),
    StopIf48k,
    /// `true` sets the signal level high.
    SetSignalLevel(bool),
    Comment(TapeText),
    Message {
        /// Seconds to display the message.
        time: u8,
        text: TapeText
    },
    ArchiveInfo(Box<[ArchiveItem]>),
    Hardware(Box<[HardwareInfo]>),
    Custom {
        description: [u8;16],
        data: Box<[u8]>
    },
    /// A block of another kind that is preserved but not played.
    Unsupported {
        id: u8,
        /// The whole block body following the id byte.
        body: Box<[u8]>
    }
}

impl TapeText {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
    pub fn len(&self) -> usize {
        self.0.len()
    }
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
    /// Converts the text to a string, translating `'\r'` to `'\n'`.
    pub fn to_string_lossy(&self) -> String {
        self.0.iter().map(|&c| match c {
            b'\r' => '\n',
            c => char::from(c)
        }).collect()
    }
}

impl From<&[u8]> for TapeText {
    fn from(bytes: &[u8]) -> Self {
        TapeText(bytes.into())
    }
}

impl From<Vec<u8>> for TapeText {
    fn from(bytes: Vec<u8>) -> Self {
        TapeText(bytes.into())
    }
}

/// Characters outside of ISO 8859-1 are replaced with `'?'`.
impl From<&str> for TapeText {
    fn from(text: &str) -> Self {
        TapeText(text.chars().map(|c| u8::try_from(u32::from(c)).unwrap_or(b'?')).collect())
    }
}

impl fmt::Display for TapeText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_string_lossy())
    }
}

impl fmt::Debug for TapeText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.to_string_lossy(), f)
    }
}

impl Default for DataState {
    fn default() -> Self {
        DataState {
            phase: DataPhase::Pilot,
            edge_count: 0,
            bytes_through_block: 0,
            bits_left: 0,
            current_byte: 0,
            bit_tstates: 0
        }
    }
}

impl Default for RawState {
    fn default() -> Self {
        RawState {
            phase: RawPhase::Data,
            bytes_through_block: 0,
            bits_through_byte: 0,
            last_bit: false,
            bit_tstates: 0
        }
    }
}

impl RomBlock {
    /// The number of pilot pulses depends on the flag byte: header blocks have a longer pilot.
    pub fn pilot_pulses(&self) -> u16 {
        match self.data.first() {
            Some(flag) if flag & 0x80 != 0 => LEAD_PULSES_DATA,
            _ => LEAD_PULSES_HEAD
        }
    }
}

impl TapeBlock {
    /// Creates a ROM timed block with the standard pause of 1000 ms.
    pub fn rom<D: Into<Box<[u8]>>>(data: D) -> Self {
        TapeBlock::rom_with_pause(data, 1000)
    }

    pub fn rom_with_pause<D: Into<Box<[u8]>>>(data: D, pause: u16) -> Self {
        TapeBlock::Rom(RomBlock { pause, data: data.into(), state: DataState::default() })
    }

    #[allow(clippy::too_many_arguments)]
    pub fn turbo<D: Into<Box<[u8]>>>(
            pilot_length: u16,
            sync1_length: u16,
            sync2_length: u16,
            bit0_length: u16,
            bit1_length: u16,
            pilot_pulses: u16,
            bits_in_last_byte: u8,
            pause: u16,
            data: D
        ) -> Self
    {
        TapeBlock::Turbo(TurboBlock {
            pilot_length, sync1_length, sync2_length,
            bit0_length, bit1_length, pilot_pulses,
            bits_in_last_byte, pause,
            data: data.into(),
            state: DataState::default()
        })
    }

    pub fn pure_tone(length: u16, pulses: u16) -> Self {
        TapeBlock::PureTone(PureToneBlock { length, pulses, remaining: pulses })
    }

    pub fn pulses<L: Into<Box<[u16]>>>(lengths: L) -> Self {
        TapeBlock::Pulses(PulsesBlock { lengths: lengths.into(), index: 0 })
    }

    pub fn pure_data<D: Into<Box<[u8]>>>(
            bit0_length: u16,
            bit1_length: u16,
            bits_in_last_byte: u8,
            pause: u16,
            data: D
        ) -> Self
    {
        TapeBlock::PureData(PureDataBlock {
            bit0_length, bit1_length, bits_in_last_byte, pause,
            data: data.into(),
            state: DataState::default()
        })
    }

    pub fn raw_data<D: Into<Box<[u8]>>>(
            bit_length: u16,
            bits_in_last_byte: u8,
            pause: u16,
            data: D
        ) -> Self
    {
        TapeBlock::RawData(RawDataBlock {
            bit_length, pause, bits_in_last_byte,
            data: data.into(),
            state: RawState::default()
        })
    }

    pub fn comment<T: Into<TapeText>>(text: T) -> Self {
        TapeBlock::Comment(text.into())
    }

    pub fn group_start<T: Into<TapeText>>(name: T) -> Self {
        TapeBlock::GroupStart(name.into())
    }

    pub fn message<T: Into<TapeText>>(time: u8, text: T) -> Self {
        TapeBlock::Message { time, text: text.into() }
    }

    /// Returns the kind of this block.
    pub fn kind(&self) -> BlockKind {
        match self {
            TapeBlock::Rom(..) => BlockKind::Rom,
            TapeBlock::Turbo(..) => BlockKind::Turbo,
            TapeBlock::PureTone(..) => BlockKind::PureTone,
            TapeBlock::Pulses(..) => BlockKind::Pulses,
            TapeBlock::PureData(..) => BlockKind::PureData,
            TapeBlock::RawData(..) => BlockKind::RawData,
            TapeBlock::Pause(..) => BlockKind::Pause,
            TapeBlock::GroupStart(..) => BlockKind::GroupStart,
            TapeBlock::GroupEnd => BlockKind::GroupEnd,
            TapeBlock::Jump(..) => BlockKind::Jump,
            TapeBlock::LoopStart(..) => BlockKind::LoopStart,
            TapeBlock::LoopEnd => BlockKind::LoopEnd,
            TapeBlock::CallSequence(..) => BlockKind::CallSequence,
            TapeBlock::Return => BlockKind::Return,
            TapeBlock::Select(..) => BlockKind::Select,
            TapeBlock::StopIf48k => BlockKind::StopIf48k,
            TapeBlock::SetSignalLevel(..) => BlockKind::SetSignalLevel,
            TapeBlock::Comment(..) => BlockKind::Comment,
            TapeBlock::Message {..} => BlockKind::Message,
            TapeBlock::ArchiveInfo(..) => BlockKind::ArchiveInfo,
            TapeBlock::Hardware(..) => BlockKind::Hardware,
            TapeBlock::Custom {..} => BlockKind::Custom,
            TapeBlock::Unsupported {..} => BlockKind::Unsupported,
        }
    }

    /// Returns the data bytes of the blocks that carry the encoded data.
    pub fn data(&self) -> Option<&[u8]> {
        match self {
            TapeBlock::Rom(RomBlock { data, .. })|
            TapeBlock::Turbo(TurboBlock { data, .. })|
            TapeBlock::PureData(PureDataBlock { data, .. })|
            TapeBlock::RawData(RawDataBlock { data, .. }) => Some(data),
            _ => None
        }
    }

    /// Returns `true` if the block produces signal edges.
    pub fn is_timed(&self) -> bool {
        matches!(self, TapeBlock::Rom(..)|TapeBlock::Turbo(..)|TapeBlock::PureTone(..)|
                       TapeBlock::Pulses(..)|TapeBlock::PureData(..)|TapeBlock::RawData(..)|
                       TapeBlock::Pause(..))
    }

    /// Returns the pause following the block in milliseconds if the block has one.
    pub fn pause(&self) -> Option<u16> {
        match *self {
            TapeBlock::Rom(RomBlock { pause, .. })|
            TapeBlock::Turbo(TurboBlock { pause, .. })|
            TapeBlock::PureData(PureDataBlock { pause, .. })|
            TapeBlock::RawData(RawDataBlock { pause, .. })|
            TapeBlock::Pause(pause) => Some(pause),
            _ => None
        }
    }
}

impl fmt::Display for BlockKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BlockKind::Rom => "Standard Speed Data",
            BlockKind::Turbo => "Turbo Speed Data",
            BlockKind::PureTone => "Pure Tone",
            BlockKind::Pulses => "Pulse Sequence",
            BlockKind::PureData => "Pure Data",
            BlockKind::RawData => "Direct Recording",
            BlockKind::Pause => "Pause",
            BlockKind::GroupStart => "Group Start",
            BlockKind::GroupEnd => "Group End",
            BlockKind::Jump => "Jump",
            BlockKind::LoopStart => "Loop Start",
            BlockKind::LoopEnd => "Loop End",
            BlockKind::CallSequence => "Call Sequence",
            BlockKind::Return => "Return",
            BlockKind::Select => "Select",
            BlockKind::StopIf48k => "Stop If 48K",
            BlockKind::SetSignalLevel => "Set Signal Level",
            BlockKind::Comment => "Text Description",
            BlockKind::Message => "Message",
            BlockKind::ArchiveInfo => "Archive Info",
            BlockKind::Hardware => "Hardware Type",
            BlockKind::Custom => "Custom Info",
            BlockKind::Unsupported => "Unsupported",
        })
    }
}

impl fmt::Display for TapeBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind())?;
        match self {
            TapeBlock::Rom(RomBlock { data, .. }) => {
                match TapChunkInfo::try_from(&data[..]) {
                    Ok(info) => write!(f, ": {}", info),
                    Err(_) => write!(f, ": {} bytes", data.len())
                }
            }
            TapeBlock::Turbo(TurboBlock { data, .. })|
            TapeBlock::PureData(PureDataBlock { data, .. })|
            TapeBlock::RawData(RawDataBlock { data, .. }) => write!(f, ": {} bytes", data.len()),
            TapeBlock::PureTone(PureToneBlock { length, pulses, .. }) => {
                write!(f, ": {} x {}", pulses, length)
            }
            TapeBlock::Pulses(PulsesBlock { lengths, .. }) => write!(f, ": {} pulses", lengths.len()),
            TapeBlock::Pause(0) => write!(f, ": stop the tape"),
            TapeBlock::Pause(ms) => write!(f, ": {} ms", ms),
            TapeBlock::GroupStart(text)|
            TapeBlock::Comment(text)|
            TapeBlock::Message { text, .. } => write!(f, ": {:?}", text),
            TapeBlock::Jump(offset) => write!(f, ": {:+}", offset),
            TapeBlock::LoopStart(count) => write!(f, ": {} times", count),
            TapeBlock::CallSequence(calls) => write!(f, ": {} calls", calls.len()),
            TapeBlock::Select(items) => write!(f, ": {} options", items.len()),
            TapeBlock::SetSignalLevel(high) => f.write_str(if *high { ": high" } else { ": low" }),
            TapeBlock::ArchiveInfo(items) => {
                match items.iter().find(|item| item.id == 0) {
                    Some(title) => write!(f, ": {:?}", title.text),
                    None => Ok(())
                }
            }
            TapeBlock::Custom { description, data } => {
                write!(f, ": {:?} {} bytes", TapeText::from(&description[..]).to_string_lossy().trim_end(),
                                             data.len())
            }
            TapeBlock::Unsupported { id, body } => write!(f, " 0x{:02x}: {} bytes", id, body.len()),
            _ => Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tape_text_works() {
        let text = TapeText::from("Zażółć\nok");
        assert_eq!(b"Za?\xf3??\nok", text.as_bytes());
        assert_eq!("line1\nline2", TapeText::from(&b"line1\rline2"[..]).to_string());
        assert_eq!("\"\u{a3}1\"", format!("{:?}", TapeText::from(&b"\xa31"[..])));
        assert!(TapeText::default().is_empty());
    }

    #[test]
    fn tape_block_works() {
        let block = TapeBlock::rom(vec![0xFF, 1, 2, 3]);
        assert_eq!(BlockKind::Rom, block.kind());
        assert_eq!(Some(&[0xFF, 1, 2, 3][..]), block.data());
        assert_eq!(Some(1000), block.pause());
        assert!(block.is_timed());
        assert_eq!("Standard Speed Data: (data 2)", block.to_string());
        if let TapeBlock::Rom(rom) = &block {
            assert_eq!(LEAD_PULSES_DATA, rom.pilot_pulses());
        }
        let block = TapeBlock::rom_with_pause(Vec::new(), 0);
        if let TapeBlock::Rom(rom) = &block {
            assert_eq!(LEAD_PULSES_HEAD, rom.pilot_pulses());
        }
        assert_eq!("Pause: stop the tape", TapeBlock::Pause(0).to_string());
        assert_eq!("Jump: -2", TapeBlock::Jump(-2).to_string());
        assert_eq!("Text Description: \"hello\"", TapeBlock::comment("hello").to_string());
        assert_eq!(0x2A, BlockKind::StopIf48k as u8);
        assert!(!TapeBlock::LoopEnd.is_timed());
        assert_eq!(None, TapeBlock::LoopEnd.data());
    }

    fn hash_of(block: &TapeBlock) -> u64 {
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        block.hash(&mut hasher);
        hasher.finish()
    }

    #[test]
    fn tape_block_equality_ignores_playback_state() {
        let blocks = vec![
            TapeBlock::rom(vec![0xFF, 1, 2]),
            TapeBlock::turbo(2000, 600, 600, 800, 1600, 100, 8, 0, vec![0xFF, 0xAA]),
            TapeBlock::pure_tone(2168, 3),
            TapeBlock::pulses(vec![667, 735]),
            TapeBlock::pure_data(800, 1600, 8, 0, vec![0x55]),
            TapeBlock::raw_data(79, 8, 0, vec![0xF0])];
        let mut tape = super::super::Tape::new();
        tape.extend(blocks.clone());
        for _ in 0..5000 {
            tape.next_edge().unwrap();
            let index = tape.current_index().unwrap();
            assert_eq!(&blocks[index], &tape.blocks()[index]);
            assert_eq!(hash_of(&blocks[index]), hash_of(&tape.blocks()[index]));
        }
        assert_eq!(&blocks[..], tape.blocks());
        assert_ne!(TapeBlock::rom(vec![0xFF, 1]), TapeBlock::rom(vec![0xFF, 1, 2]));
        assert_ne!(TapeBlock::pure_tone(2168, 3), TapeBlock::pure_tone(2168, 4));
    }
}
