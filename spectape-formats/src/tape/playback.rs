/*
    Copyright (C) 2020-2022  Rafal Michalski

    This file is part of SPECTAPE, a Rust library of ZX Spectrum tape formats.

    For the full copyright notice, see the lib.rs file.
*/
use bitflags::bitflags;
#[allow(unused_imports)]
use log::{debug, trace, warn};

#[cfg(feature = "snapshot")]
use serde::{Serialize, Deserialize};

use spectape_core::clock::PlaybackConfig;
use crate::{Error, Result};
use super::*;
use super::pulse::consts::*;

bitflags! {
    /// Flags describing the edge returned from [Tape::next_edge].
    #[cfg_attr(feature = "snapshot", derive(Serialize, Deserialize))]
    #[cfg_attr(feature = "snapshot", serde(try_from = "u8", into = "u8"))]
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct EdgeFlags: u8 {
        /// The signal level doesn't change at the end of the interval.
        const NO_EDGE    = 0b0000_0001;
        /// The tape should be stopped.
        const STOP       = 0b0000_0010;
        /// The signal level should be set low.
        const LEVEL_LOW  = 0b0000_0100;
        /// The signal level should be set high.
        const LEVEL_HIGH = 0b0000_1000;
        /// The current block has ended.
        const BLOCK      = 0b0001_0000;
        /// The tape should be stopped if emulating a 48k machine.
        const STOP48     = 0b0010_0000;
        /// The end of the tape was reached and the cursor went back to the first block.
        const TAPE       = 0b0100_0000;
    }
}

impl From<EdgeFlags> for u8 {
    fn from(flags: EdgeFlags) -> u8 {
        flags.bits()
    }
}

impl core::convert::TryFrom<u8> for EdgeFlags {
    type Error = &'static str;
    fn try_from(bits: u8) -> core::result::Result<Self, Self::Error> {
        EdgeFlags::from_bits(bits).ok_or("unrecognized edge flags")
    }
}

/// The interval to the next signal edge.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Edge {
    /// T-states to the next edge.
    pub tstates: u32,
    pub flags: EdgeFlags
}

impl Edge {
    pub fn is_edge(&self) -> bool {
        !self.flags.contains(EdgeFlags::NO_EDGE)
    }
}

/// The outcome of a single step of a block.
#[derive(Clone, Copy, Debug)]
struct Step {
    tstates: u32,
    flags: EdgeFlags,
    end: bool
}

impl Step {
    #[inline]
    fn edge(tstates: u16) -> Self {
        Step { tstates: tstates.into(), flags: EdgeFlags::empty(), end: false }
    }

    #[inline]
    fn last_edge(tstates: u16) -> Self {
        Step { tstates: tstates.into(), flags: EdgeFlags::empty(), end: true }
    }

    #[inline]
    fn control(flags: EdgeFlags) -> Self {
        Step { tstates: 0, flags: flags | EdgeFlags::NO_EDGE, end: true }
    }

    fn pause(ms: u16, config: &PlaybackConfig) -> Self {
        if ms == 0 {
            Step::control(EdgeFlags::empty())
        }
        else {
            Step { tstates: config.pause_tstates(ms), flags: EdgeFlags::empty(), end: true }
        }
    }
}

/// The number of bits of the last byte, values outside `1..=8` mean the whole byte.
#[inline]
fn last_byte_bits(bits_in_last_byte: u8) -> u8 {
    match bits_in_last_byte {
        1..=8 => bits_in_last_byte,
        _ => 8
    }
}

struct DataTiming<'a> {
    pilot: u16,
    sync1: u16,
    sync2: u16,
    bit0: u16,
    bit1: u16,
    pilot_pulses: u16,
    bits_in_last_byte: u8,
    pause: u16,
    data: &'a [u8]
}

impl RomBlock {
    fn timing(&self) -> DataTiming<'_> {
        DataTiming {
            pilot: LEAD_PULSE_LENGTH.get() as u16,
            sync1: SYNC_PULSE1_LENGTH.get() as u16,
            sync2: SYNC_PULSE2_LENGTH.get() as u16,
            bit0: ZERO_PULSE_LENGTH.get() as u16,
            bit1: ONE_PULSE_LENGTH.get() as u16,
            pilot_pulses: self.pilot_pulses(),
            bits_in_last_byte: 8,
            pause: self.pause,
            data: &self.data
        }
    }
}

impl TurboBlock {
    fn timing(&self) -> DataTiming<'_> {
        DataTiming {
            pilot: self.pilot_length,
            sync1: self.sync1_length,
            sync2: self.sync2_length,
            bit0: self.bit0_length,
            bit1: self.bit1_length,
            pilot_pulses: self.pilot_pulses,
            bits_in_last_byte: self.bits_in_last_byte,
            pause: self.pause,
            data: &self.data
        }
    }
}

impl PureDataBlock {
    fn timing(&self) -> DataTiming<'_> {
        DataTiming {
            pilot: 0,
            sync1: 0,
            sync2: 0,
            bit0: self.bit0_length,
            bit1: self.bit1_length,
            pilot_pulses: 0,
            bits_in_last_byte: self.bits_in_last_byte,
            pause: self.pause,
            data: &self.data
        }
    }
}

impl DataState {
    fn start(timing: &DataTiming<'_>) -> Self {
        let mut state = DataState::default();
        if timing.pilot_pulses == 0 {
            state.phase = DataPhase::Sync1;
        }
        else {
            state.edge_count = timing.pilot_pulses;
        }
        state
    }

    fn start_data(timing: &DataTiming<'_>) -> Self {
        let mut state = DataState::default();
        state.next_bit(timing);
        state
    }

    fn next_bit(&mut self, timing: &DataTiming<'_>) {
        if self.bits_left == 0 {
            match timing.data.get(self.bytes_through_block) {
                Some(&byte) => {
                    self.current_byte = byte;
                    self.bytes_through_block += 1;
                    self.bits_left = if self.bytes_through_block == timing.data.len() {
                        last_byte_bits(timing.bits_in_last_byte)
                    }
                    else {
                        8
                    };
                }
                None => {
                    self.phase = DataPhase::Pause;
                    return
                }
            }
        }
        self.bit_tstates = if self.current_byte & 0x80 != 0 {
            timing.bit1
        }
        else {
            timing.bit0
        };
        self.current_byte <<= 1;
        self.bits_left -= 1;
        self.phase = DataPhase::Data1;
    }

    fn next_step(&mut self, timing: &DataTiming<'_>, config: &PlaybackConfig) -> Step {
        match self.phase {
            DataPhase::Pilot => {
                self.edge_count = self.edge_count.saturating_sub(1);
                if self.edge_count == 0 {
                    self.phase = DataPhase::Sync1;
                }
                Step::edge(timing.pilot)
            }
            DataPhase::Sync1 => {
                self.phase = DataPhase::Sync2;
                Step::edge(timing.sync1)
            }
            DataPhase::Sync2 => {
                self.next_bit(timing);
                Step::edge(timing.sync2)
            }
            DataPhase::Data1 => {
                self.phase = DataPhase::Data2;
                Step::edge(self.bit_tstates)
            }
            DataPhase::Data2 => {
                let tstates = self.bit_tstates;
                self.next_bit(timing);
                Step::edge(tstates)
            }
            DataPhase::Pause => Step::pause(timing.pause, config)
        }
    }
}

impl RawDataBlock {
    #[inline]
    fn bits_in_byte(&self, index: usize) -> u8 {
        if index + 1 == self.data.len() {
            last_byte_bits(self.bits_in_last_byte)
        }
        else {
            8
        }
    }

    #[inline]
    fn bit_at(&self, index: usize, bit: u8) -> bool {
        self.data[index] & (0x80 >> bit) != 0
    }

    fn start(&mut self) {
        self.state = RawState::default();
        match self.data.first() {
            Some(&byte) => {
                self.state.last_bit = byte & 0x80 != 0;
                self.next_run();
            }
            None => self.state.phase = RawPhase::Pause
        }
    }
    /// Counts the samples of the same level as the current one.
    fn next_run(&mut self) {
        let len = self.data.len();
        if self.state.bytes_through_block >= len {
            self.state.phase = RawPhase::Pause;
            return
        }
        let mut run: u32 = 0;
        loop {
            run += 1;
            let RawState { mut bytes_through_block, mut bits_through_byte, .. } = self.state;
            bits_through_byte += 1;
            if bits_through_byte >= self.bits_in_byte(bytes_through_block) {
                bytes_through_block += 1;
                bits_through_byte = 0;
            }
            self.state.bytes_through_block = bytes_through_block;
            self.state.bits_through_byte = bits_through_byte;
            if bytes_through_block == len ||
               self.bit_at(bytes_through_block, bits_through_byte) != self.state.last_bit {
                break
            }
        }
        self.state.bit_tstates = run.saturating_mul(self.bit_length.into());
        self.state.last_bit = !self.state.last_bit;
        self.state.phase = RawPhase::Data;
    }

    fn next_step(&mut self, config: &PlaybackConfig) -> Step {
        match self.state.phase {
            RawPhase::Data => {
                let tstates = self.state.bit_tstates;
                self.next_run();
                Step { tstates, flags: EdgeFlags::empty(), end: false }
            }
            RawPhase::Pause => Step::pause(self.pause, config)
        }
    }
}

impl PureToneBlock {
    fn next_step(&mut self) -> Step {
        match self.remaining {
            0 => Step::control(EdgeFlags::empty()),
            1 => {
                self.remaining = 0;
                Step::last_edge(self.length)
            }
            _ => {
                self.remaining -= 1;
                Step::edge(self.length)
            }
        }
    }
}

impl PulsesBlock {
    fn next_step(&mut self) -> Step {
        match self.lengths.get(self.index) {
            Some(&length) => {
                self.index += 1;
                if self.index == self.lengths.len() {
                    Step::last_edge(length)
                }
                else {
                    Step::edge(length)
                }
            }
            None => Step::control(EdgeFlags::empty())
        }
    }
}

impl TapeBlock {
    /// Prepares the block for playback from its beginning.
    pub(crate) fn init_playback(&mut self) {
        match self {
            TapeBlock::Rom(block) => block.state = DataState::start(&block.timing()),
            TapeBlock::Turbo(block) => block.state = DataState::start(&block.timing()),
            TapeBlock::PureData(block) => block.state = DataState::start_data(&block.timing()),
            TapeBlock::RawData(block) => block.start(),
            TapeBlock::PureTone(block) => block.remaining = block.pulses,
            TapeBlock::Pulses(block) => block.index = 0,
            _ => {}
        }
    }
}

impl Tape {
    pub(super) fn init_block(&mut self, index: usize) {
        if let Some(block) = self.blocks.get_mut(index) {
            block.init_playback();
        }
    }
    /// Makes the block at `index` the current one, moving back to the first block if past the end.
    fn advance_to(&mut self, index: usize, flags: &mut EdgeFlags) {
        let index = if index >= self.blocks.len() {
            debug!("end of tape");
            *flags |= EdgeFlags::STOP|EdgeFlags::TAPE;
            self.reset_control();
            0
        }
        else {
            index
        };
        self.current = Some(index);
        self.init_block(index);
    }

    fn jump_target(&self, index: usize, offset: i16) -> Result<usize> {
        let target = index as isize + isize::from(offset);
        if target < 0 || target as usize >= self.blocks.len() {
            return Err(Error::corrupt(format_args!(
                "block {} jumps by {} outside of the tape of {} blocks",
                index, offset, self.blocks.len())))
        }
        Ok(target as usize)
    }
    /// Returns the interval to the next edge of the tape signal and advances the tape.
    ///
    /// An empty tape returns an interval of 0 T-states with [EdgeFlags::STOP] and [EdgeFlags::TAPE] set.
    ///
    /// # Errors
    /// Returns [Error::Corrupt] if a jump or a call refers to a block outside of the tape.
    pub fn next_edge(&mut self) -> Result<Edge> {
        let index = match self.current {
            Some(index) if index < self.blocks.len() => index,
            Some(index) => {
                return Err(Error::logic(format_args!(
                    "current block {} outside of the tape of {} blocks", index, self.blocks.len())))
            }
            None => return Ok(Edge {
                tstates: 0,
                flags: EdgeFlags::STOP|EdgeFlags::TAPE|EdgeFlags::NO_EDGE
            })
        };
        let config = self.config;
        let mut target: Option<usize> = None;
        let step = match &mut self.blocks[index] {
            TapeBlock::Rom(block) => {
                let timing = block.timing();
                let mut state = block.state;
                let step = state.next_step(&timing, &config);
                block.state = state;
                step
            }
            TapeBlock::Turbo(block) => {
                let timing = block.timing();
                let mut state = block.state;
                let step = state.next_step(&timing, &config);
                block.state = state;
                step
            }
            TapeBlock::PureData(block) => {
                let timing = block.timing();
                let mut state = block.state;
                let step = state.next_step(&timing, &config);
                block.state = state;
                step
            }
            TapeBlock::RawData(block) => block.next_step(&config),
            TapeBlock::PureTone(block) => block.next_step(),
            TapeBlock::Pulses(block) => block.next_step(),
            TapeBlock::Pause(0) => Step::control(EdgeFlags::STOP),
            &mut TapeBlock::Pause(ms) => Step {
                tstates: config.pause_tstates(ms),
                flags: EdgeFlags::LEVEL_LOW,
                end: true
            },
            &mut TapeBlock::Jump(offset) => {
                let block = self.jump_target(index, offset)?;
                debug!("jump from block {} to {}", index, block);
                target = Some(block);
                Step::control(EdgeFlags::empty())
            }
            &mut TapeBlock::LoopStart(count) => {
                debug!("loop of {} iterations at block {}", count, index);
                self.loop_block = Some(index + 1);
                self.loop_count = count;
                Step::control(EdgeFlags::empty())
            }
            TapeBlock::LoopEnd => {
                match self.loop_block {
                    Some(block) if self.loop_count > 1 => {
                        self.loop_count -= 1;
                        trace!("loop back to block {}, {} iterations left", block, self.loop_count);
                        target = Some(block);
                    }
                    Some(..) => {
                        self.loop_block = None;
                        self.loop_count = 0;
                    }
                    None => warn!("loop end without a loop start at block {}", index)
                }
                Step::control(EdgeFlags::empty())
            }
            TapeBlock::CallSequence(calls) => {
                if let Some(&offset) = calls.first() {
                    let block = self.jump_target(index, offset)?;
                    debug!("call from block {} to {}", index, block);
                    self.call = Some(CallState { block: index, next: 1 });
                    target = Some(block);
                }
                Step::control(EdgeFlags::empty())
            }
            TapeBlock::Return => {
                if let Some(CallState { block, next }) = self.call {
                    let offset = match self.blocks.get(block) {
                        Some(TapeBlock::CallSequence(calls)) => calls.get(next).copied(),
                        _ => return Err(Error::logic("call state without a call sequence block"))
                    };
                    match offset {
                        Some(offset) => {
                            let call = self.jump_target(block, offset)?;
                            debug!("call from block {} to {}", block, call);
                            self.call = Some(CallState { block, next: next + 1 });
                            target = Some(call);
                        }
                        None => {
                            debug!("return to block {}", block + 1);
                            self.call = None;
                            let mut flags = EdgeFlags::BLOCK;
                            self.advance_to(block + 1, &mut flags);
                            return Ok(Edge { tstates: 0, flags: flags|EdgeFlags::NO_EDGE })
                        }
                    }
                }
                else {
                    warn!("return without a call at block {}", index);
                }
                Step::control(EdgeFlags::empty())
            }
            TapeBlock::StopIf48k => Step::control(EdgeFlags::STOP48),
            &mut TapeBlock::SetSignalLevel(high) => Step::control(
                if high { EdgeFlags::LEVEL_HIGH } else { EdgeFlags::LEVEL_LOW }),
            TapeBlock::GroupStart(..)|TapeBlock::GroupEnd|TapeBlock::Select(..)|
            TapeBlock::Comment(..)|TapeBlock::Message {..}|TapeBlock::ArchiveInfo(..)|
            TapeBlock::Hardware(..)|TapeBlock::Custom {..}|TapeBlock::Unsupported {..} => {
                Step::control(EdgeFlags::empty())
            }
        };

        let mut flags = step.flags;
        if step.end {
            flags |= EdgeFlags::BLOCK;
            match target {
                Some(block) => {
                    self.current = Some(block);
                    self.init_block(block);
                }
                None => self.advance_to(index + 1, &mut flags)
            }
        }
        trace!("edge: {} {:?}", step.tstates, flags);
        Ok(Edge { tstates: step.tstates, flags })
    }
}
