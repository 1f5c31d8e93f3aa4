/*
    Copyright (C) 2020-2022  Rafal Michalski

    This file is part of SPECTAPE, a Rust library of ZX Spectrum tape formats.

    For the full copyright notice, see the lib.rs file.
*/
/*! The tape container and its playback engine.

A [Tape] is an ordered sequence of [TapeBlock]s with a cursor pointing to the current block.
The signal is produced with [Tape::next_edge] which returns the number of T-states until the next
edge of the signal together with [EdgeFlags] describing block and tape boundaries.

```
use spectape_formats::tape::{Tape, TapeBlock, EdgeFlags};

let mut tape = Tape::new();
tape.append(TapeBlock::pure_tone(2168, 2));
tape.append(TapeBlock::Pause(0));

let edge = tape.next_edge()?;
assert_eq!(2168, edge.tstates);
let edge = tape.next_edge()?;
assert!(edge.flags.contains(EdgeFlags::BLOCK));
let edge = tape.next_edge()?;
assert!(edge.flags.contains(EdgeFlags::STOP));
assert_eq!(Some(0), tape.current_index());
# Ok::<(), spectape_formats::Error>(())
```
*/
use core::slice;

#[allow(unused_imports)]
use log::{debug, warn};

#[cfg(feature = "snapshot")]
use serde::{Serialize, Deserialize};

use spectape_core::clock::PlaybackConfig;
use crate::identify::{self, FileType};
use crate::{Error, Result};

mod block;
mod playback;
pub mod pulse;
pub mod record;

pub use block::*;
pub use playback::*;

/// The state of a *call sequence* in progress.
#[cfg_attr(feature = "snapshot", derive(Serialize, Deserialize))]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CallState {
    /// The index of the call sequence block.
    pub block: usize,
    /// The index of the next call offset.
    pub next: usize
}

/// An ordered sequence of tape blocks with a playback cursor.
#[cfg_attr(feature = "snapshot", derive(Serialize, Deserialize))]
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Tape {
    blocks: Vec<TapeBlock>,
    current: Option<usize>,
    loop_block: Option<usize>,
    loop_count: u16,
    call: Option<CallState>,
    config: PlaybackConfig
}

impl Tape {
    pub fn new() -> Self {
        Tape::default()
    }

    pub fn with_config(config: PlaybackConfig) -> Self {
        Tape { config, ..Tape::default() }
    }
    /// Reads the tape from the content of a TAP or TZX file, possibly compressed.
    ///
    /// See [read].
    pub fn read_from(data: &[u8], filename: Option<&str>) -> Result<Self> {
        read(data, filename)
    }

    pub fn config(&self) -> &PlaybackConfig {
        &self.config
    }

    pub fn set_config(&mut self, config: PlaybackConfig) {
        self.config = config;
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn blocks(&self) -> &[TapeBlock] {
        &self.blocks
    }

    pub fn iter(&self) -> slice::Iter<'_, TapeBlock> {
        self.blocks.iter()
    }
    /// Returns the block at the given position.
    pub fn block(&self, index: usize) -> Option<&TapeBlock> {
        self.blocks.get(index)
    }
    /// Returns the position of the current block or `None` if the tape is empty.
    pub fn current_index(&self) -> Option<usize> {
        self.current
    }

    pub fn current_block(&self) -> Option<&TapeBlock> {
        self.current.and_then(|index| self.blocks.get(index))
    }
    /// Returns the number of remaining loop iterations.
    pub fn loop_count(&self) -> u16 {
        self.loop_count
    }
    /// Appends a block at the end of the tape.
    ///
    /// If the tape was empty the new block becomes the current block.
    pub fn append(&mut self, block: TapeBlock) {
        self.blocks.push(block);
        if self.current.is_none() {
            self.current = Some(0);
            self.init_block(0);
        }
    }
    /// Inserts a block at the given position, shifting the following blocks.
    ///
    /// A loop or a call sequence in progress is abandoned.
    pub fn insert(&mut self, index: usize, block: TapeBlock) -> Result<()> {
        if index > self.blocks.len() {
            return Err(out_of_range(index, self.blocks.len()))
        }
        self.blocks.insert(index, block);
        self.reset_control();
        match self.current {
            None => {
                self.current = Some(0);
                self.init_block(0);
            }
            Some(current) if current >= index => {
                self.current = Some(current + 1);
            }
            _ => {}
        }
        Ok(())
    }
    /// Removes a block from the given position and returns it.
    ///
    /// If the current block is removed, the following block becomes the current one.
    pub fn remove(&mut self, index: usize) -> Result<TapeBlock> {
        if index >= self.blocks.len() {
            return Err(out_of_range(index, self.blocks.len()))
        }
        let block = self.blocks.remove(index);
        self.reset_control();
        match self.current {
            _ if self.blocks.is_empty() => {
                self.current = None;
            }
            Some(current) if current > index => {
                self.current = Some(current - 1);
            }
            Some(current) if current == index => {
                let current = if current == self.blocks.len() { 0 } else { current };
                self.current = Some(current);
                self.init_block(current);
            }
            _ => {}
        }
        Ok(block)
    }
    /// Removes all blocks.
    pub fn clear(&mut self) {
        self.blocks.clear();
        self.current = None;
        self.reset_control();
    }
    /// Makes the block at the given position the current one, e.g. as a response to
    /// the user choice of the *select* block.
    pub fn select(&mut self, index: usize) -> Result<()> {
        if index >= self.blocks.len() {
            return Err(out_of_range(index, self.blocks.len()))
        }
        self.current = Some(index);
        self.init_block(index);
        Ok(())
    }
    /// Moves the cursor back to the first block.
    pub fn rewind(&mut self) {
        self.reset_control();
        if !self.blocks.is_empty() {
            self.current = Some(0);
            self.init_block(0);
        }
    }

    fn reset_control(&mut self) {
        self.loop_block = None;
        self.loop_count = 0;
        self.call = None;
    }
}

fn out_of_range(index: usize, len: usize) -> Error {
    Error::corrupt(format_args!("block index {} out of range of {} blocks", index, len))
}

impl<'a> IntoIterator for &'a Tape {
    type Item = &'a TapeBlock;
    type IntoIter = slice::Iter<'a, TapeBlock>;
    fn into_iter(self) -> Self::IntoIter {
        self.blocks.iter()
    }
}

impl Extend<TapeBlock> for Tape {
    fn extend<I: IntoIterator<Item=TapeBlock>>(&mut self, iter: I) {
        for block in iter {
            self.append(block);
        }
    }
}

/// Identifies the tape file from its content and an optional file name and parses it.
///
/// Compressed files are decompressed first.
pub fn read(data: &[u8], filename: Option<&str>) -> Result<Tape> {
    let ident = identify::identify_deep(data, filename)?;
    let data = ident.data.as_deref().unwrap_or(data);
    debug!("tape file identified as {:?}", ident.file_type);
    match ident.file_type {
        FileType::Tap => crate::tap::read(data),
        FileType::Tzx => crate::tzx::read(data),
        file_type => Err(Error::unknown(format_args!("{:?} is not a supported tape format", file_type)))
    }
}
