/*
    Copyright (C) 2020-2022  Rafal Michalski

    This file is part of SPECTAPE, a Rust library of ZX Spectrum tape formats.

    For the full copyright notice, see the lib.rs file.
*/
//! Recording of the MIC output signal as tape blocks.
use core::iter::Peekable;
use core::num::NonZeroU32;

#[allow(unused_imports)]
use log::{debug, trace};

#[cfg(feature = "snapshot")]
use serde::{Serialize, Deserialize};

use crate::tap::ROM_PAUSE;
use super::{Tape, TapeBlock};
use super::pulse::consts::*;

const SYNC_PULSE_TOLERANCE: u32 = (SYNC_PULSE2_LENGTH.get() - SYNC_PULSE1_LENGTH.get())/2;
const SYNC_PULSE1_MIN: u32 = SYNC_PULSE1_LENGTH.get() - SYNC_PULSE_TOLERANCE;
const SYNC_PULSE1_MAX: u32 = SYNC_PULSE1_LENGTH.get() + SYNC_PULSE_TOLERANCE - 1;
const SYNC_PULSE2_MIN: u32 = SYNC_PULSE2_LENGTH.get() - SYNC_PULSE_TOLERANCE;
const SYNC_PULSE2_MAX: u32 = SYNC_PULSE2_LENGTH.get() + SYNC_PULSE_TOLERANCE - 1;
const LEAD_PULSE_TOLERANCE: u32 = 250;
const LEAD_PULSE_MIN: u32 = LEAD_PULSE_LENGTH.get() - LEAD_PULSE_TOLERANCE;
const LEAD_PULSE_MAX: u32 = LEAD_PULSE_LENGTH.get() + LEAD_PULSE_TOLERANCE - 1;
const DATA_PULSE_TOLERANCE: u32 = 250;
const DATA_PULSE_MIN: u32 = ZERO_PULSE_LENGTH.get() - DATA_PULSE_TOLERANCE;
const DATA_PULSE_MAX: u32 = ONE_PULSE_LENGTH.get() + DATA_PULSE_TOLERANCE - 1;
const DATA_PULSE_THRESHOLD: u32 = (ZERO_PULSE_LENGTH.get() + ONE_PULSE_LENGTH.get())/2;
const MIN_LEAD_COUNT: u32 = 16;

/// The current state of the [TapeRecorder].
#[cfg_attr(feature = "snapshot", derive(Serialize, Deserialize))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RecordState {
    /// Waiting for lead pulses.
    Idle,
    /// Receiving lead pulses.
    Lead {
        counter: u32
    },
    /// Received the 1st sync pulse.
    Sync1,
    /// Received the 2nd sync pulse.
    Sync2,
    /// Receiving data pulses.
    Data {
        /// The bits of the byte being received.
        current: u8,
        /// The number of pulses of the current byte received so far.
        pulse: u8
    }
}

/// Decodes MIC output pulse intervals with the ROM timings into [TapeBlock::Rom] blocks.
///
/// A transfer consists of lead pulses, two synchronization pulses and data pulses, two pulses
/// per bit. A pulse that doesn't fit the data timings ends the transfer and the received bytes
/// become a new block.
#[cfg_attr(feature = "snapshot", derive(Serialize, Deserialize))]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TapeRecorder {
    state: RecordState,
    data: Vec<u8>,
    pause: u16
}

impl Default for TapeRecorder {
    fn default() -> Self {
        TapeRecorder::new()
    }
}

impl RecordState {
    pub fn is_idle(&self) -> bool {
        matches!(self, RecordState::Idle)
    }

    pub fn is_lead(&self) -> bool {
        matches!(self, RecordState::Lead {..})
    }

    pub fn is_data(&self) -> bool {
        matches!(self, RecordState::Data {..})
    }
}

impl TapeRecorder {
    pub fn new() -> Self {
        TapeRecorder { state: RecordState::Idle, data: Vec::new(), pause: ROM_PAUSE }
    }
    /// Sets the pause in milliseconds of the recorded blocks.
    pub fn with_pause(mut self, pause: u16) -> Self {
        self.pause = pause;
        self
    }

    pub fn state(&self) -> RecordState {
        self.state
    }

    pub fn is_idle(&self) -> bool {
        self.state.is_idle()
    }
    /// Returns the number of complete bytes received in the current transfer.
    pub fn data_size(&self) -> usize {
        self.data.len()
    }
    /// Discards the transfer in progress.
    pub fn reset(&mut self) {
        self.state = RecordState::Idle;
        self.data.clear();
    }
    /// Ends the current transfer, completing a partially received byte with zero bits.
    ///
    /// Returns the received block, or `None` if no data has been received.
    pub fn end(&mut self) -> Option<TapeBlock> {
        if let RecordState::Data { mut current, pulse } = self.state {
            if pulse > 1 {
                if pulse & 1 == 1 {
                    current &= !1;
                }
                current <<= (16 - (pulse & 15)) >> 1;
                self.data.push(current);
            }
        }
        self.state = RecordState::Idle;
        if self.data.is_empty() {
            None
        }
        else {
            let data = core::mem::take(&mut self.data);
            debug!("recorded block of {} bytes", data.len());
            Some(TapeBlock::rom_with_pause(data, self.pause))
        }
    }
    /// Interprets pulse intervals until a transfer ends or the pulses run out.
    ///
    /// Returns the received block when a transfer ends. There may be some pulses
    /// left in the iterator in this instance.
    pub fn decode_pulses<I>(&mut self, iter: &mut Peekable<I>) -> Option<TapeBlock>
        where I: Iterator<Item=NonZeroU32>
    {
        for delta in iter {
            let delta = delta.get();
            self.state = match self.state {
                RecordState::Idle => match delta {
                    LEAD_PULSE_MIN..=LEAD_PULSE_MAX => RecordState::Lead { counter: 1 },
                    _ => RecordState::Idle
                }
                RecordState::Lead { counter } => match delta {
                    SYNC_PULSE1_MIN..=SYNC_PULSE1_MAX if counter >= MIN_LEAD_COUNT => RecordState::Sync1,
                    LEAD_PULSE_MIN..=LEAD_PULSE_MAX => RecordState::Lead { counter: counter.saturating_add(1) },
                    _ => RecordState::Idle
                }
                RecordState::Sync1 => match delta {
                    SYNC_PULSE2_MIN..=SYNC_PULSE2_MAX => RecordState::Sync2,
                    _ => RecordState::Idle
                }
                RecordState::Sync2 => match delta {
                    DATA_PULSE_MIN..=DATA_PULSE_MAX => {
                        trace!("receiving data");
                        self.data.clear();
                        RecordState::Data { current: (delta > DATA_PULSE_THRESHOLD) as u8, pulse: 1 }
                    }
                    _ => RecordState::Idle
                }
                RecordState::Data { current, pulse } => match delta {
                    DATA_PULSE_MIN..=DATA_PULSE_MAX => {
                        let bit = (delta > DATA_PULSE_THRESHOLD) as u8;
                        if pulse & 1 == 1 {
                            // both pulses of a bit must have the same length
                            if (current ^ bit) & 1 == 1 {
                                return self.end()
                            }
                            if pulse == 15 {
                                self.data.push(current);
                                RecordState::Data { current: 0, pulse: 0 }
                            }
                            else {
                                RecordState::Data { current, pulse: pulse + 1 }
                            }
                        }
                        else {
                            RecordState::Data { current: (current << 1) | bit, pulse: pulse + 1 }
                        }
                    }
                    _ => return self.end()
                }
            };
        }
        None
    }
    /// Decodes pulse intervals, appending each received block to the `tape`.
    ///
    /// An empty iterator ends the transfer in progress, if there is any.
    ///
    /// Returns the number of appended blocks.
    pub fn record_pulses<I>(&mut self, tape: &mut Tape, iter: I) -> usize
        where I: IntoIterator<Item=NonZeroU32>
    {
        let mut iter = iter.into_iter().peekable();
        if iter.peek().is_none() {
            return match self.end() {
                Some(block) => {
                    tape.append(block);
                    1
                }
                None => 0
            }
        }
        let mut count = 0;
        while let Some(block) = self.decode_pulses(&mut iter) {
            tape.append(block);
            count += 1;
        }
        count
    }
}
