/*
    Copyright (C) 2020-2022  Rafal Michalski

    This file is part of SPECTAPE, a Rust library of ZX Spectrum tape formats.

    For the full copyright notice, see the lib.rs file.
*/
//! A tape recorder emulation for sweetening the handling of [Tape]s in emulators.
use core::num::NonZeroU32;

#[allow(unused_imports)]
use log::{debug, trace};

#[cfg(feature = "snapshot")]
use serde::{Serialize, Deserialize};

use spectape_formats::Result;
use spectape_formats::tape::Tape;
use spectape_formats::tape::record::TapeRecorder;

#[cfg_attr(feature = "snapshot", derive(Serialize, Deserialize))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeckState {
    Idle,
    Playing,
    Recording
}

/// An inserted tape, either for reading or for writing.
#[cfg_attr(feature = "snapshot", derive(Serialize, Deserialize))]
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Cassette {
    Reader(Tape),
    Writer {
        tape: Tape,
        recorder: TapeRecorder
    }
}

/// The struct that emulates a simple tape recorder.
#[cfg_attr(feature = "snapshot", derive(Serialize, Deserialize))]
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TapeDeck {
    /// `true` if the tape is playing or recording, depending on the [Cassette] variant.
    /// `false` then the tape has stopped.
    pub running: bool,
    /// `Some(cassette)` indicates the tape is inserted, `None` - there is no tape.
    pub cassette: Option<Cassette>,
    /// Stop the tape on blocks requesting a stop on a 48k machine.
    pub stop_on_48k: bool,
    /// T-states of the last played pulse extending past the previous frame.
    overshoot: u32
}

impl Cassette {
    pub fn new_reader(tape: Tape) -> Self {
        Cassette::Reader(tape)
    }

    pub fn new_writer(tape: Tape) -> Self {
        Cassette::Writer { tape, recorder: TapeRecorder::new() }
    }

    pub fn is_reader(&self) -> bool {
        matches!(self, Cassette::Reader(..))
    }

    pub fn is_writer(&self) -> bool {
        matches!(self, Cassette::Writer { .. })
    }

    pub fn tape(&self) -> &Tape {
        match self {
            Cassette::Reader(tape)|Cassette::Writer { tape, .. } => tape
        }
    }
    /// Returns the tape, appending the block being currently recorded, if any.
    pub fn into_tape(self) -> Tape {
        match self {
            Cassette::Reader(tape) => tape,
            Cassette::Writer { mut tape, mut recorder } => {
                if let Some(block) = recorder.end() {
                    debug!("deck: committing a block of {} bytes", block.data().map_or(0, |data| data.len()));
                    tape.append(block);
                }
                tape
            }
        }
    }
    /// Transforms the cassette into a [Cassette::Reader] rewound to the beginning of the tape.
    pub fn into_reader(self) -> Self {
        let mut tape = self.into_tape();
        tape.rewind();
        Cassette::Reader(tape)
    }
    /// Transforms the cassette into a [Cassette::Writer] appending to the end of the tape.
    pub fn into_writer(self) -> Self {
        match self {
            Cassette::Reader(tape) => Cassette::new_writer(tape),
            writer => writer
        }
    }
}

impl TapeDeck {
    pub fn new() -> Self {
        TapeDeck::default()
    }
    /// Returns a new deck with the `tape` inserted for reading.
    pub fn new_with_tape(tape: Tape) -> Self {
        TapeDeck { cassette: Some(Cassette::Reader(tape)), ..TapeDeck::default() }
    }
    /// Inserts the `tape` for reading. Returns the previously inserted tape.
    pub fn insert(&mut self, tape: Tape) -> Option<Tape> {
        self.overshoot = 0;
        self.cassette.replace(Cassette::new_reader(tape)).map(Cassette::into_tape)
    }
    /// Inserts the `tape` for writing. Returns the previously inserted tape.
    pub fn insert_as_writer(&mut self, tape: Tape) -> Option<Tape> {
        self.overshoot = 0;
        self.cassette.replace(Cassette::new_writer(tape)).map(Cassette::into_tape)
    }
    /// Stops the deck and returns the previously inserted tape.
    pub fn eject(&mut self) -> Option<Tape> {
        self.running = false;
        self.overshoot = 0;
        self.cassette.take().map(Cassette::into_tape)
    }

    pub fn is_inserted(&self) -> bool {
        self.cassette.is_some()
    }

    pub fn is_ejected(&self) -> bool {
        self.cassette.is_none()
    }

    pub fn tape(&self) -> Option<&Tape> {
        self.cassette.as_ref().map(Cassette::tape)
    }
    /// Returns `true` if there is a tape inserted and [TapeDeck::running] is `true`.
    pub fn is_running(&self) -> bool {
        self.running && self.cassette.is_some()
    }

    pub fn is_idle(&self) -> bool {
        !self.is_running()
    }

    pub fn state(&self) -> DeckState {
        if self.running {
            return match self.cassette.as_ref() {
                Some(Cassette::Reader(..)) => DeckState::Playing,
                Some(Cassette::Writer { .. }) => DeckState::Recording,
                None => DeckState::Idle
            }
        }
        DeckState::Idle
    }

    pub fn is_playing(&self) -> bool {
        self.state() == DeckState::Playing
    }

    pub fn is_recording(&self) -> bool {
        self.state() == DeckState::Recording
    }
    /// Sets [TapeDeck::running] to `true` and ensures the inserted cassette is a [Cassette::Reader].
    ///
    /// Returns `true` if the state of `self` changes.
    pub fn play(&mut self) -> bool {
        let running = self.running;
        self.running = true;
        let changed = match self.cassette.take() {
            Some(cassette) if cassette.is_writer() => {
                self.cassette = Some(cassette.into_reader());
                self.overshoot = 0;
                true
            }
            cassette => {
                self.cassette = cassette;
                false
            }
        };
        changed || !running
    }
    /// Sets [TapeDeck::running] to `true` and ensures the inserted cassette is a [Cassette::Writer].
    ///
    /// Returns `true` if the state of `self` changes.
    pub fn record(&mut self) -> bool {
        let running = self.running;
        self.running = true;
        let changed = match self.cassette.take() {
            Some(cassette) if cassette.is_reader() => {
                self.cassette = Some(cassette.into_writer());
                true
            }
            cassette => {
                self.cassette = cassette;
                false
            }
        };
        changed || !running
    }

    pub fn stop(&mut self) {
        self.running = false;
    }
    /// Rewinds the tape if it's inserted as a [Cassette::Reader]. In this instance returns `true`.
    pub fn rewind(&mut self) -> bool {
        match self.cassette.as_mut() {
            Some(Cassette::Reader(tape)) => {
                tape.rewind();
                self.overshoot = 0;
                true
            }
            _ => false
        }
    }
    /// Returns the EAR input pulse intervals of the next emulated frame lasting `budget` T-states.
    ///
    /// Pulses are returned until their total exceeds the frame, the last pulse may extend
    /// into the next frame. The deck stops when the tape signals a stop.
    ///
    /// Returns an empty list if the deck is not playing.
    pub fn ear_pulses(&mut self, budget: u32) -> Result<Vec<NonZeroU32>> {
        let mut pulses = Vec::new();
        if !self.is_playing() {
            return Ok(pulses)
        }
        if self.overshoot >= budget {
            self.overshoot -= budget;
            return Ok(pulses)
        }
        let tape = match self.cassette.as_mut() {
            Some(Cassette::Reader(tape)) => tape,
            _ => return Ok(pulses)
        };
        let mut elapsed = self.overshoot;
        let mut iter = tape.pulse_iter().stop_on_48k(self.stop_on_48k);
        while elapsed < budget {
            match iter.next() {
                Some(pulse) => {
                    elapsed = elapsed.saturating_add(pulse.get());
                    pulses.push(pulse);
                }
                None => break
            }
        }
        let stopped = iter.is_done();
        let error = iter.take_error();
        self.overshoot = elapsed.saturating_sub(budget);
        if stopped {
            debug!("deck: the tape has stopped");
            self.running = false;
            self.overshoot = 0;
        }
        match error {
            Some(err) => Err(err),
            None => Ok(pulses)
        }
    }
    /// Decodes the MIC output pulse intervals and appends the received blocks to the tape.
    ///
    /// An empty iterator ends the transfer in progress. Returns the number of appended blocks.
    ///
    /// Does nothing and returns 0 if the deck is not recording.
    pub fn record_mic_pulses<I>(&mut self, iter: I) -> usize
        where I: IntoIterator<Item=NonZeroU32>
    {
        if !self.running {
            return 0
        }
        match self.cassette.as_mut() {
            Some(Cassette::Writer { tape, recorder }) => recorder.record_pulses(tape, iter),
            _ => 0
        }
    }
}
