/*
    Copyright (C) 2020-2022  Rafal Michalski

    This file is part of SPECTAPE, a Rust library of ZX Spectrum tape formats.

    For the full copyright notice, see the lib.rs file.
*/
/*! **RZX** input recording container.

An input recording consists of *frames*, each holding the number of instructions executed by the
emulated CPU until the next interrupt and the bytes read from the I/O ports during that time.
Recordings may embed snapshots of the emulated machine and may be signed.

```
use spectape_formats::rzx::{self, Rzx, FrameStep, WriteOptions};

let mut rec = Rzx::new();
rec.start_input(0);
rec.store_frame(1000, &[0xBF, 0xFF])?;
rec.store_frame(1010, &[0xBF, 0xFF])?;
rec.stop_input();

let file = rzx::write(&rec, &WriteOptions::default())?;
let mut rzx = rzx::read(&file)?;
assert!(rzx.start_playback(false)?.is_none());
assert_eq!(Some(1000), rzx.instructions());
assert_eq!(0xBF, rzx.playback()?);
assert_eq!(0xFF, rzx.playback()?);
assert!(matches!(rzx.playback_frame()?, FrameStep::Next));
assert_eq!(Some(1010), rzx.instructions());
assert_eq!(0xBF, rzx.playback()?);
assert_eq!(0xFF, rzx.playback()?);
assert!(matches!(rzx.playback_frame()?, FrameStep::Finished));
# Ok::<(), spectape_formats::Error>(())
```
*/
use core::convert::TryFrom;
use core::fmt;

#[cfg(feature = "snapshot")]
use serde::{Serialize, Deserialize};

use crate::{Error, Result};

mod playback;
mod read;
mod write;

pub use playback::*;
pub use read::*;
pub use write::*;

/// The signature of the *RZX* file.
pub const SIGNATURE: &[u8;4] = b"RZX!";
/// The supported major version.
pub const MAJOR_VERSION: u8 = 0;
/// The minor version of the written files.
pub const MINOR_VERSION: u8 = 13;
/// The header flag of signed files.
pub const FLAG_SIGNED: u32 = 1;
/// The size of the block ID and the block length.
pub const BLOCK_HEADER_SIZE: usize = 5;
/// The frame input count marking a frame which repeats the input of the previous frame.
pub const REPEAT_LAST: u16 = 0xFFFF;

pub(crate) const CREATOR_BLOCK: u8    = 0x10;
pub(crate) const SIGN_START_BLOCK: u8 = 0x20;
pub(crate) const SIGN_END_BLOCK: u8   = 0x21;
pub(crate) const SNAPSHOT_BLOCK: u8   = 0x30;
pub(crate) const INPUT_BLOCK: u8      = 0x80;

pub(crate) const SNAPSHOT_EXTERNAL: u32   = 0b01;
pub(crate) const SNAPSHOT_COMPRESSED: u32 = 0b10;
pub(crate) const INPUT_COMPRESSED: u32    = 0b10;

/// The program which created the recording.
#[cfg_attr(feature = "snapshot", derive(Serialize, Deserialize))]
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Creator {
    /// Up to 20 ASCII characters.
    pub name: String,
    pub major: u16,
    pub minor: u16,
    pub custom: Box<[u8]>
}

/// A single frame of the recorded input.
#[cfg_attr(feature = "snapshot", derive(Serialize, Deserialize))]
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Frame {
    /// The number of instructions executed in this frame.
    pub instructions: u16,
    /// The number of input bytes read in this frame.
    pub count: u16,
    /// The input is the same as the input of the previous frame.
    pub repeat_last: bool,
    /// The input bytes, empty if `repeat_last` is set.
    pub input: Box<[u8]>
}

/// A block of frames.
#[cfg_attr(feature = "snapshot", derive(Serialize, Deserialize))]
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct InputBlock {
    /// The T-state counter at the beginning of the block.
    pub tstates: u32,
    pub frames: Vec<Frame>
}

/// A snapshot of the emulated machine.
#[cfg_attr(feature = "snapshot", derive(Serialize, Deserialize))]
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Snapshot {
    /// The file extension identifying the snapshot format, e.g. `"z80"` or `"szx"`.
    pub extension: String,
    /// `data` is a descriptor of an external snapshot file instead of the snapshot itself.
    pub external: bool,
    pub data: Box<[u8]>
}

/// The signature of a recording as read from the file.
#[cfg_attr(feature = "snapshot", derive(Serialize, Deserialize))]
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct SignInfo {
    pub key_id: u32,
    /// The week of the signing, counted from the UNIX epoch.
    pub week: u32,
    /// The serialized DSA signature.
    pub signature: Box<[u8]>,
    /// The length of the signed part of the file, from its beginning.
    pub signed_len: usize
}

/// A block of the recording.
#[cfg_attr(feature = "snapshot", derive(Serialize, Deserialize))]
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum RzxBlock {
    Input(InputBlock),
    Snapshot(Snapshot),
    Sign(SignInfo)
}

/// The position of the playback.
#[cfg_attr(feature = "snapshot", derive(Serialize, Deserialize))]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct PlaybackCursor {
    /// The index of the current block.
    pub block: usize,
    /// The index of the current frame.
    pub frame: usize,
    /// The number of the input bytes read from the current frame.
    pub in_count: usize,
    /// The index of the frame providing the input of the current frame.
    pub data_frame: usize
}

/// An input recording.
#[cfg_attr(feature = "snapshot", derive(Serialize, Deserialize))]
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Rzx {
    pub creator: Creator,
    blocks: Vec<RzxBlock>,
    tstates: u32,
    recording: Option<usize>,
    cursor: Option<PlaybackCursor>
}

impl Default for Creator {
    fn default() -> Self {
        Creator {
            name: "SPECTAPE".into(),
            major: 0,
            minor: 1,
            custom: Box::default()
        }
    }
}

impl fmt::Display for Creator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}.{}", self.name, self.major, self.minor)
    }
}

impl Frame {
    /// Creates a frame with the given input bytes.
    ///
    /// # Errors
    /// Returns [Error::Corrupt] if there are 0xFFFF or more input bytes.
    pub fn new<D: Into<Box<[u8]>>>(instructions: u16, input: D) -> Result<Self> {
        let input = input.into();
        let count = u16::try_from(input.len()).ok().filter(|&n| n != REPEAT_LAST)
                    .ok_or_else(|| Error::corrupt(format_args!(
                        "too many input bytes in a frame: {}", input.len())))?;
        Ok(Frame { instructions, count, repeat_last: false, input })
    }

    pub fn repeat(instructions: u16, count: u16) -> Self {
        Frame { instructions, count, repeat_last: true, input: Box::default() }
    }
}

impl Snapshot {
    pub fn new<S: Into<String>, D: Into<Box<[u8]>>>(extension: S, data: D) -> Self {
        Snapshot { extension: extension.into(), external: false, data: data.into() }
    }
}

impl InputBlock {
    /// Returns the frame providing the input for a repeated frame appended to this block.
    fn last_data_frame(&self) -> Option<&Frame> {
        self.frames.iter().rev().find(|frame| !frame.repeat_last)
    }
}

impl Rzx {
    pub fn new() -> Self {
        Rzx::default()
    }

    pub fn with_creator(creator: Creator) -> Self {
        Rzx { creator, ..Rzx::default() }
    }

    pub fn blocks(&self) -> &[RzxBlock] {
        &self.blocks
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
    /// Removes all blocks and stops recording and playback.
    pub fn clear(&mut self) {
        self.blocks.clear();
        self.tstates = 0;
        self.recording = None;
        self.cursor = None;
    }
    /// Returns the T-state counter of the current input block.
    pub fn tstates(&self) -> u32 {
        self.tstates
    }

    pub fn increment_tstates(&mut self, delta: u32) {
        self.tstates = self.tstates.wrapping_add(delta);
    }
    /// Returns the key ID of the signature if the recording is signed.
    pub fn signed_by(&self) -> Option<u32> {
        self.blocks.iter().find_map(|block| match block {
            RzxBlock::Sign(info) => Some(info.key_id),
            _ => None
        })
    }
    /// Returns the signature info if the recording is signed.
    pub fn sign_info(&self) -> Option<&SignInfo> {
        self.blocks.iter().find_map(|block| match block {
            RzxBlock::Sign(info) => Some(info),
            _ => None
        })
    }
    /// Returns the total number of frames in all input blocks.
    pub fn frames_count(&self) -> usize {
        self.blocks.iter().map(|block| match block {
            RzxBlock::Input(input) => input.frames.len(),
            _ => 0
        }).sum()
    }
    /// Starts a new input block.
    pub fn start_input(&mut self, tstates: u32) {
        self.blocks.push(RzxBlock::Input(InputBlock { tstates, frames: Vec::new() }));
        self.recording = Some(self.blocks.len() - 1);
        self.tstates = tstates;
    }
    /// Returns `true` if an input block is being recorded.
    pub fn is_recording(&self) -> bool {
        self.recording.is_some()
    }
    /// Appends a frame to the input block started with [Rzx::start_input].
    ///
    /// If the `input` is the same as the input of the last frame, the frame is stored
    /// as a repeat of the last frame.
    ///
    /// # Errors
    /// Returns [Error::Logic] if no input block is being recorded and [Error::Corrupt]
    /// if there are too many input bytes.
    pub fn store_frame(&mut self, instructions: u16, input: &[u8]) -> Result<()> {
        let block = match self.recording.and_then(|index| self.blocks.get_mut(index)) {
            Some(RzxBlock::Input(block)) => block,
            _ => return Err(Error::logic("no input block is being recorded"))
        };
        let frame = match block.last_data_frame() {
            Some(last) if &*last.input == input => Frame::repeat(instructions, last.count),
            _ => Frame::new(instructions, input)?
        };
        block.frames.try_reserve(1)?;
        block.frames.push(frame);
        Ok(())
    }
    /// Ends recording of the current input block.
    pub fn stop_input(&mut self) {
        self.recording = None;
    }
    /// Appends a snapshot, ending recording of the current input block.
    pub fn add_snapshot(&mut self, snapshot: Snapshot) {
        self.stop_input();
        self.blocks.push(RzxBlock::Snapshot(snapshot));
    }
    /// Appends a block, ending recording of the current input block.
    pub fn push_block(&mut self, block: RzxBlock) {
        self.stop_input();
        self.blocks.push(block);
    }
}
