/*
    Copyright (C) 2020-2022  Rafal Michalski

    This file is part of SPECTAPE, a Rust library of ZX Spectrum tape formats.

    For the full copyright notice, see the lib.rs file.
*/
//! **TAPE** signal as T-state pulse intervals.
use core::mem;
use core::num::NonZeroU32;

use spectape_core::clock::PlaybackConfig;
use crate::{Error, Result};
use super::{Tape, TapeBlock, EdgeFlags};

pub mod consts {
    use core::num::NonZeroU32;
    /// Length of the lead pulse in T-states.
    pub const LEAD_PULSE_LENGTH : NonZeroU32 = unsafe { NonZeroU32::new_unchecked(2168) };
    /// Length of the 1st sync pulse in T-states.
    pub const SYNC_PULSE1_LENGTH: NonZeroU32 = unsafe { NonZeroU32::new_unchecked(667)  };
    /// Length of the 2nd sync pulse in T-states.
    pub const SYNC_PULSE2_LENGTH: NonZeroU32 = unsafe { NonZeroU32::new_unchecked(735)  };
    /// Length of the bit value 0 pulse in T-states.
    pub const ZERO_PULSE_LENGTH : NonZeroU32 = unsafe { NonZeroU32::new_unchecked(855)  };
    /// Length of the bit value 1 pulse in T-states.
    pub const ONE_PULSE_LENGTH  : NonZeroU32 = unsafe { NonZeroU32::new_unchecked(1710) };
    /// Length of the 1 second pause between blocks in T-states, at the 48k frame rate.
    pub const PAUSE_PULSE_LENGTH: NonZeroU32 = unsafe { NonZeroU32::new_unchecked(3_494_400) };

    /// The number of LEAD pulses for the header block.
    pub const LEAD_PULSES_HEAD: u16 = 8063;
    /// The number of LEAD pulses for the data block.
    pub const LEAD_PULSES_DATA: u16 = 3223;
}

/// An iterator of T-state pulse intervals of the [Tape] signal.
///
/// Starts at the current position of the tape and ends when the tape signals a stop.
/// Intervals without a signal edge are merged with the following ones.
///
/// If the tape playback fails, the iterator ends and the error can be retrieved
/// with [TapePulseIter::take_error].
pub struct TapePulseIter<'a> {
    tape: &'a mut Tape,
    pending: u32,
    stop48: bool,
    done: bool,
    error: Option<Error>
}

impl Tape {
    /// Returns an iterator of pulse intervals from the current position up to the next stop.
    pub fn pulse_iter(&mut self) -> TapePulseIter<'_> {
        TapePulseIter { tape: self, pending: 0, stop48: false, done: false, error: None }
    }
}

impl<'a> TapePulseIter<'a> {
    /// Makes the iterator also end on blocks requesting a stop on a 48k machine.
    pub fn stop_on_48k(mut self, stop48: bool) -> Self {
        self.stop48 = stop48;
        self
    }
    /// Returns `true` if the iterator has finished.
    pub fn is_done(&self) -> bool {
        self.done
    }
    /// Returns the playback error that ended the iteration, if any.
    pub fn take_error(&mut self) -> Option<Error> {
        self.error.take()
    }

    pub fn tape(&self) -> &Tape {
        self.tape
    }
}

impl Iterator for TapePulseIter<'_> {
    type Item = NonZeroU32;

    fn next(&mut self) -> Option<NonZeroU32> {
        while !self.done {
            let edge = match self.tape.next_edge() {
                Ok(edge) => edge,
                Err(err) => {
                    self.error = Some(err);
                    self.done = true;
                    break
                }
            };
            self.pending = self.pending.saturating_add(edge.tstates);
            if edge.flags.contains(EdgeFlags::STOP) ||
               (self.stop48 && edge.flags.contains(EdgeFlags::STOP48)) {
                self.done = true;
            }
            if edge.is_edge() {
                if let Some(delta) = NonZeroU32::new(mem::take(&mut self.pending)) {
                    return Some(delta)
                }
            }
        }
        NonZeroU32::new(mem::take(&mut self.pending))
    }
}

/// Returns the total duration of the block played from its beginning in T-states.
///
/// Control blocks have no duration.
pub fn block_tstates(block: &TapeBlock, config: &PlaybackConfig) -> Result<u64> {
    if !block.is_timed() {
        return Ok(0)
    }
    let mut tape = Tape::with_config(*config);
    tape.append(block.clone());
    let mut total = 0u64;
    loop {
        let edge = tape.next_edge()?;
        total += u64::from(edge.tstates);
        if edge.flags.contains(EdgeFlags::BLOCK) {
            return Ok(total)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::consts::*;

    #[test]
    fn tape_pulse_iter_works() -> Result<()> {
        let mut tape = Tape::new();
        tape.append(TapeBlock::pure_tone(100, 2));
        tape.append(TapeBlock::comment("merged"));
        tape.append(TapeBlock::pulses(vec![0, 50]));
        tape.append(TapeBlock::StopIf48k);
        tape.append(TapeBlock::Pause(1));
        let pulses: Vec<u32> = tape.pulse_iter().map(NonZeroU32::get).collect();
        assert_eq!(vec![100, 100, 50, 3494], pulses);
        assert_eq!(Some(0), tape.current_index());
        let mut iter = tape.pulse_iter().stop_on_48k(true);
        assert_eq!(vec![100, 100, 50], iter.by_ref().map(NonZeroU32::get).collect::<Vec<_>>());
        assert!(iter.is_done());
        assert!(iter.take_error().is_none());
        assert_eq!(Some(4), tape.current_index());
        Ok(())
    }

    #[test]
    fn tape_pulse_iter_reports_errors() {
        let mut tape = Tape::new();
        tape.append(TapeBlock::pure_tone(100, 1));
        tape.append(TapeBlock::Jump(5));
        let mut iter = tape.pulse_iter();
        assert_eq!(NonZeroU32::new(100), iter.next());
        assert_eq!(None, iter.next());
        assert!(iter.take_error().unwrap().is_corrupt());
        let mut empty = Tape::new();
        assert_eq!(0, empty.pulse_iter().count());
    }

    #[test]
    fn block_tstates_works() -> Result<()> {
        let config = PlaybackConfig::default();
        let block = TapeBlock::rom(vec![0xFF, 0x00]);
        let expected = u64::from(LEAD_PULSES_DATA) * u64::from(LEAD_PULSE_LENGTH.get())
                     + u64::from(SYNC_PULSE1_LENGTH.get() + SYNC_PULSE2_LENGTH.get())
                     + 16 * u64::from(ONE_PULSE_LENGTH.get())
                     + 16 * u64::from(ZERO_PULSE_LENGTH.get())
                     + u64::from(PAUSE_PULSE_LENGTH.get());
        assert_eq!(expected, block_tstates(&block, &config)?);
        assert_eq!(1000, block_tstates(&TapeBlock::pulses(vec![300, 700]), &config)?);
        assert_eq!(0, block_tstates(&TapeBlock::LoopEnd, &config)?);
        assert_eq!(0, block_tstates(&TapeBlock::Pause(0), &config)?);
        Ok(())
    }
}
