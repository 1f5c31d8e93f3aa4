/*
    Copyright (C) 2020-2022  Rafal Michalski

    This file is part of SPECTAPE, a Rust library of ZX Spectrum tape formats.

    For the full copyright notice, see the lib.rs file.
*/
#[allow(unused_imports)]
use log::{debug, trace};

use crate::{Error, Result};
use super::*;

/// The result of [Rzx::playback_frame].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameStep<'a> {
    /// The next frame is ready.
    Next,
    /// The next frame is ready and the snapshot preceding it should be loaded first.
    Snapshot(&'a Snapshot),
    /// There are no more frames.
    Finished
}

impl Rzx {
    /// Returns the index of the first input block with any frames, starting at `start`,
    /// and the index of the first snapshot found on the way.
    fn next_input(&self, start: usize) -> (Option<usize>, Option<usize>) {
        let mut snapshot = None;
        for (index, block) in self.blocks.iter().enumerate().skip(start) {
            match block {
                RzxBlock::Input(input) if !input.frames.is_empty() => return (Some(index), snapshot),
                RzxBlock::Snapshot(..) if snapshot.is_none() => snapshot = Some(index),
                _ => {}
            }
        }
        (None, snapshot)
    }

    fn snapshot_at(&self, index: usize) -> Option<&Snapshot> {
        match self.blocks.get(index) {
            Some(RzxBlock::Snapshot(snapshot)) => Some(snapshot),
            _ => None
        }
    }

    fn input_at(&self, index: usize) -> Result<&InputBlock> {
        match self.blocks.get(index) {
            Some(RzxBlock::Input(input)) => Ok(input),
            _ => Err(Error::logic("RZX: the playback cursor is not at an input block"))
        }
    }

    fn cursor(&self) -> Result<PlaybackCursor> {
        self.cursor.ok_or_else(|| Error::logic("RZX: playback has not been started"))
    }
    /// Positions the playback cursor at the first frame of the block at `index`.
    fn enter_input(&mut self, index: usize) -> Result<()> {
        if self.input_at(index)?.frames.first().map_or(false, |frame| frame.repeat_last) {
            return Err(Error::corrupt("RZX: the first frame of an input block repeats the last frame"))
        }
        debug!("RZX: playing the input block {}", index);
        self.cursor = Some(PlaybackCursor { block: index, frame: 0, in_count: 0, data_frame: 0 });
        Ok(())
    }
    /// Starts the playback from the first frame.
    ///
    /// If `autoload` is `true` returns the first snapshot preceding the first input block.
    ///
    /// # Errors
    /// Returns [Error::Corrupt] if there are no frames to play.
    pub fn start_playback(&mut self, autoload: bool) -> Result<Option<&Snapshot>> {
        self.recording = None;
        self.cursor = None;
        let (input, snapshot) = self.next_input(0);
        let input = input.ok_or_else(|| Error::corrupt("RZX: no input recording blocks"))?;
        self.enter_input(input)?;
        Ok(match snapshot {
            Some(index) if autoload => self.snapshot_at(index),
            _ => None
        })
    }
    /// Returns `true` if the playback is in progress.
    pub fn is_playing(&self) -> bool {
        self.cursor.is_some()
    }
    /// Returns the current position of the playback.
    pub fn playback_cursor(&self) -> Option<PlaybackCursor> {
        self.cursor
    }
    /// Advances the playback to the next frame.
    ///
    /// # Errors
    /// Returns [Error::Corrupt] if the number of the bytes read with [Rzx::playback] during the
    /// current frame is different from the number of the recorded bytes.
    pub fn playback_frame(&mut self) -> Result<FrameStep<'_>> {
        let mut cursor = self.cursor()?;
        let input = self.input_at(cursor.block)?;
        let count = input.frames.get(cursor.frame).map_or(0, |frame| frame.count);
        if cursor.in_count != count as usize {
            return Err(Error::corrupt(format_args!(
                "RZX: {} input bytes were read while {} were recorded in the frame {}",
                cursor.in_count, count, cursor.frame)))
        }
        cursor.frame += 1;
        cursor.in_count = 0;
        if let Some(frame) = input.frames.get(cursor.frame) {
            if !frame.repeat_last {
                cursor.data_frame = cursor.frame;
            }
            trace!("RZX: frame {} instructions: {}", cursor.frame, frame.instructions);
            self.cursor = Some(cursor);
            return Ok(FrameStep::Next)
        }
        match self.next_input(cursor.block + 1) {
            (Some(index), snapshot) => {
                self.enter_input(index)?;
                let snapshot = match snapshot {
                    Some(index) => self.snapshot_at(index),
                    None => None
                };
                Ok(match snapshot {
                    Some(snapshot) => FrameStep::Snapshot(snapshot),
                    None => FrameStep::Next
                })
            }
            (None, _) => {
                debug!("RZX: playback finished");
                self.cursor = None;
                Ok(FrameStep::Finished)
            }
        }
    }
    /// Returns the next recorded input byte of the current frame.
    ///
    /// # Errors
    /// Returns [Error::Corrupt] if all of the recorded bytes have been already read.
    pub fn playback(&mut self) -> Result<u8> {
        let cursor = self.cursor()?;
        let input = self.input_at(cursor.block)?;
        let count = input.frames.get(cursor.frame).map_or(0, |frame| frame.count);
        if cursor.in_count >= count as usize {
            return Err(Error::corrupt(format_args!(
                "RZX: more than {} input bytes were read in the frame {}", count, cursor.frame)))
        }
        let byte = input.frames.get(cursor.data_frame)
                               .and_then(|frame| frame.input.get(cursor.in_count))
                               .copied()
                               .ok_or_else(|| Error::corrupt("RZX: missing input data"))?;
        if let Some(cursor) = self.cursor.as_mut() {
            cursor.in_count += 1;
        }
        Ok(byte)
    }
    /// Returns the number of instructions of the current frame.
    pub fn instructions(&self) -> Option<u16> {
        let cursor = self.cursor?;
        match self.blocks.get(cursor.block) {
            Some(RzxBlock::Input(input)) => input.frames.get(cursor.frame).map(|frame| frame.instructions),
            _ => None
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::ErrorKind;
    use super::super::tests::test_recording;
    use super::*;

    fn play_frame(rzx: &mut Rzx) -> Result<(u16, Vec<u8>)> {
        let instructions = rzx.instructions().unwrap();
        let cursor = rzx.playback_cursor().unwrap();
        let count = match &rzx.blocks()[cursor.block] {
            RzxBlock::Input(input) => input.frames[cursor.frame].count,
            _ => unreachable!()
        };
        let input = (0..count).map(|_| rzx.playback()).collect::<Result<Vec<_>>>()?;
        Ok((instructions, input))
    }

    #[test]
    fn rzx_playback_works() -> Result<()> {
        let mut rzx = test_recording();
        assert_eq!(None, rzx.instructions());
        assert_eq!(ErrorKind::Logic, rzx.playback().unwrap_err().kind());
        let snapshot = rzx.start_playback(true)?.unwrap();
        assert_eq!("z80", snapshot.extension);
        assert_eq!(1000, snapshot.data.len());
        assert!(rzx.start_playback(false)?.is_none());
        let mut frames = Vec::new();
        let mut snapshots = Vec::new();
        loop {
            frames.push(play_frame(&mut rzx)?);
            match rzx.playback_frame()? {
                FrameStep::Next => {}
                FrameStep::Snapshot(snap) => snapshots.push(snap.extension.clone()),
                FrameStep::Finished => break
            }
        }
        assert!(!rzx.is_playing());
        assert_eq!(vec!["szx".to_string()], snapshots);
        assert_eq!(55, frames.len());
        assert_eq!(&frames[..5], &[(100, vec![1, 2, 3]),
                                   (101, vec![1, 2, 3]),
                                   (102, vec![]),
                                   (103, vec![]),
                                   (104, vec![4])]);
        for (i, (instructions, input)) in frames[5..].iter().enumerate() {
            assert_eq!(1000 + i as u16, *instructions);
            assert_eq!(&vec![0xBF; 10], input);
        }
        assert_eq!(ErrorKind::Logic, rzx.playback_frame().unwrap_err().kind());
        Ok(())
    }

    #[test]
    fn rzx_playback_checks_input_count() -> Result<()> {
        let mut rzx = test_recording();
        rzx.start_playback(false)?;
        assert_eq!(1, rzx.playback()?);
        assert!(rzx.playback_frame().unwrap_err().is_corrupt());
        assert_eq!(2, rzx.playback()?);
        assert_eq!(3, rzx.playback()?);
        assert!(rzx.playback().unwrap_err().is_corrupt());
        assert_eq!(FrameStep::Next, rzx.playback_frame()?);
        assert_eq!(Some(PlaybackCursor { block: 1, frame: 1, in_count: 0, data_frame: 0 }),
                   rzx.playback_cursor());
        assert_eq!(1, rzx.playback()?);
        Ok(())
    }

    #[test]
    fn rzx_playback_edge_cases() -> Result<()> {
        let mut rzx = Rzx::new();
        assert!(rzx.start_playback(true).unwrap_err().is_corrupt());
        rzx.add_snapshot(Snapshot::new("sna", vec![0; 10]));
        rzx.start_input(0);
        rzx.stop_input();
        assert!(rzx.start_playback(true).unwrap_err().is_corrupt());
        rzx.push_block(RzxBlock::Input(InputBlock { tstates: 0, frames: vec![Frame::repeat(1, 0)] }));
        assert!(rzx.start_playback(true).unwrap_err().is_corrupt());
        rzx.clear();
        rzx.start_input(0);
        rzx.store_frame(7, &[])?;
        assert!(rzx.start_playback(false)?.is_none());
        assert!(!rzx.is_recording());
        assert_eq!(Some(7), rzx.instructions());
        assert!(rzx.playback().unwrap_err().is_corrupt());
        assert_eq!(FrameStep::Finished, rzx.playback_frame()?);
        Ok(())
    }
}
