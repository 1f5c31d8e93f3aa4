/*
    Copyright (C) 2020-2022  Rafal Michalski

    This file is part of SPECTAPE, a Rust library of ZX Spectrum tape formats.

    For the full copyright notice, see the lib.rs file.
*/
//! T-state counters and the timing configuration of the tape playback.
#[cfg(feature = "snapshot")]
use serde::{Serialize, Deserialize};

/// A linear T-state timestamp type.
pub type FTs = i32;
/// A T-state duration type.
pub type Ts = u32;

/// The number of T-states in a single frame of the 48k ZX Spectrum.
pub const FRAME_TSTATES_48K: Ts = 69_888;
/// The number of T-states in a single frame of the 128k ZX Spectrum.
pub const FRAME_TSTATES_128K: Ts = 70_908;
/// The number of frames per second the pause durations are calculated with.
pub const FRAMES_PER_SECOND: u32 = 50;

/// Timing parameters of the tape playback.
#[cfg_attr(feature = "snapshot", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "snapshot", serde(default, rename_all = "camelCase"))]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PlaybackConfig {
    /// The number of T-states per video frame of the emulated machine.
    pub frame_tstates: Ts,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        PlaybackConfig { frame_tstates: FRAME_TSTATES_48K }
    }
}

impl PlaybackConfig {
    pub fn new(frame_tstates: Ts) -> Self {
        PlaybackConfig { frame_tstates }
    }
    /// Converts a pause given in milliseconds to T-states.
    ///
    /// The pause is measured in 20 ms frames regardless of the actual frame rate
    /// of the emulated machine.
    pub fn pause_tstates(&self, ms: u16) -> Ts {
        let ts = ms as u64 * self.frame_tstates as u64 / (1000 / FRAMES_PER_SECOND) as u64;
        ts.min(Ts::MAX as u64) as Ts
    }
}
