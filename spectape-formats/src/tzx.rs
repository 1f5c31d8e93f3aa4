/*
    Copyright (C) 2020-2022  Rafal Michalski

    This file is part of SPECTAPE, a Rust library of ZX Spectrum tape formats.

    For the full copyright notice, see the lib.rs file.
*/
/*! **TZX** file format utilities.

A *TZX* file consists of a 10 byte header followed by blocks, each starting with a block ID.

```
use spectape_formats::{tzx, tape::{Tape, TapeBlock}};

let mut tape = Tape::new();
tape.append(TapeBlock::comment("hello"));
tape.append(TapeBlock::rom(vec![0xFF, 0x01, 0xFE]));
let file = tzx::write(&tape)?;
assert_eq!(b"ZXTape!\x1a\x01\x14", &file[..10]);
assert_eq!(tape, tzx::read(&file)?);
# Ok::<(), spectape_formats::Error>(())
```
*/
use core::convert::TryFrom;

mod read;
mod write;

pub use read::*;
pub use write::*;

/// The signature of the *TZX* file.
pub const SIGNATURE: &[u8;8] = b"ZXTape!\x1a";
/// The supported major version.
pub const MAJOR_VERSION: u8 = 1;
/// The minor version of the written files.
pub const MINOR_VERSION: u8 = 20;

macro_rules! tzx_id {
    ($($id:ident = $n:literal),*) => {
        /// The block IDs of the *TZX* format.
        #[repr(u8)]
        #[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub enum TzxId {
            $($id = $n),*
        }

        impl TryFrom<u8> for TzxId {
            type Error = u8;
            fn try_from(id: u8) -> Result<Self, Self::Error> {
                match id {
                    $($n => Ok(TzxId::$id),)*
                    id => Err(id)
                }
            }
        }
    };
}

tzx_id! {
    StandardSpeed    = 0x10,
    TurboSpeed       = 0x11,
    PureTone         = 0x12,
    SeqOfPulses      = 0x13,
    PureData         = 0x14,
    DirectRec        = 0x15,
    C64Rom           = 0x16,
    C64Turbo         = 0x17,
    CswRecording     = 0x18,
    Generalized      = 0x19,
    Pause            = 0x20,
    GroupStart       = 0x21,
    GroupEnd         = 0x22,
    Jump             = 0x23,
    LoopStart        = 0x24,
    LoopEnd          = 0x25,
    CallSeq          = 0x26,
    Return           = 0x27,
    Select           = 0x28,
    StopIn48k        = 0x2A,
    SetLevel         = 0x2B,
    Text             = 0x30,
    Message          = 0x31,
    Archive          = 0x32,
    Hardware         = 0x33,
    EmulationInfo    = 0x34,
    Custom           = 0x35,
    Snapshot         = 0x40,
    Glue             = 0x5A
}

impl From<TzxId> for u8 {
    fn from(id: TzxId) -> u8 {
        id as u8
    }
}

#[cfg(test)]
mod tests {
    use crate::tape::{Tape, TapeBlock, SelectItem, ArchiveItem, HardwareInfo};
    use crate::{ErrorKind, Result};
    use super::*;

    fn every_block() -> Vec<TapeBlock> {
        vec![
            TapeBlock::rom_with_pause(vec![0x00, 1, 2, 3], 954),
            TapeBlock::turbo(2000, 600, 700, 800, 1600, 3000, 5, 100, vec![0xFF, 0xAA, 0xF0]),
            TapeBlock::pure_tone(2168, 300),
            TapeBlock::pulses(vec![667, 735, 1]),
            TapeBlock::pure_data(855, 1710, 8, 0, vec![0x5A; 300]),
            TapeBlock::raw_data(79, 3, 20, vec![0xF0, 0x0F, 0xE0]),
            TapeBlock::Pause(0),
            TapeBlock::Pause(2000),
            TapeBlock::group_start("Side A"),
            TapeBlock::GroupEnd,
            TapeBlock::Jump(-3),
            TapeBlock::LoopStart(5),
            TapeBlock::LoopEnd,
            TapeBlock::CallSequence(vec![2, -1, 300].into()),
            TapeBlock::Return,
            TapeBlock::Select(vec![
                SelectItem { offset: 1, description: "Part 1".into() },
                SelectItem { offset: -7, description: "Part 2".into() }
            ].into()),
            TapeBlock::StopIf48k,
            TapeBlock::SetSignalLevel(true),
            TapeBlock::SetSignalLevel(false),
            TapeBlock::comment("A comment"),
            TapeBlock::message(5, "Press play"),
            TapeBlock::ArchiveInfo(vec![
                ArchiveItem { id: 0, text: "Title".into() },
                ArchiveItem { id: 2, text: "Author".into() }
            ].into()),
            TapeBlock::Hardware(vec![HardwareInfo { hw_type: 0, hw_id: 1, value: 3 }].into()),
            TapeBlock::Custom { description: *b"POKEs           ", data: vec![1, 2, 3].into() },
            TapeBlock::Unsupported { id: 0x18, body: vec![2, 0, 0, 0, 0xAB, 0xCD].into() },
            TapeBlock::Unsupported { id: 0x34, body: vec![1, 2, 3, 4, 5, 6, 7, 8].into() },
            TapeBlock::Unsupported { id: 0x40, body: vec![0, 1, 0, 0, 0x99].into() },
            TapeBlock::Unsupported { id: 0x7F, body: vec![0, 0, 0, 0].into() },
        ]
    }

    #[test]
    fn tzx_round_trip_works() -> Result<()> {
        let mut tape = Tape::new();
        tape.extend(every_block());
        let file = write(&tape)?;
        let tape2 = read(&file)?;
        assert_eq!(tape.len(), tape2.len());
        for (a, b) in tape.iter().zip(tape2.iter()) {
            assert_eq!(a, b);
        }
        assert_eq!(file, write(&tape2)?);
        Ok(())
    }

    #[test]
    fn tzx_truncated_block_is_corrupt() -> Result<()> {
        for block in every_block() {
            let kind = block.kind();
            let mut tape = Tape::new();
            tape.append(block);
            let file = write(&tape)?;
            for len in 11..file.len() {
                let err = read(&file[..len]).unwrap_err();
                assert!(err.is_corrupt(), "{:?} truncated to {}: {}", kind, len, err);
            }
            // an empty tape is fine
            assert!(read(&file[..10])?.is_empty());
        }
        Ok(())
    }

    #[test]
    fn tzx_header_checks() {
        assert!(read(b"ZXTape!").unwrap_err().is_corrupt());
        assert!(read(b"ZXTape?\x1a\x01\x14").unwrap_err().is_corrupt());
        assert_eq!(ErrorKind::Unknown, read(b"ZXTape!\x1a\x02\x00").unwrap_err().kind());
        assert!(read(b"ZXTape!\x1a\x01\x0d").unwrap().is_empty());
    }

    #[test]
    fn tzx_glue_and_unknown_blocks() -> Result<()> {
        let mut file = b"ZXTape!\x1a\x01\x0d".to_vec();
        file.extend_from_slice(b"\x20\x0a\x00");
        file.extend_from_slice(b"\x5aXTape!\x1a\x01\x14");
        file.extend_from_slice(b"\x99\x02\x00\x00\x00\xaa\xbb");
        let tape = read(&file)?;
        assert_eq!(vec![TapeBlock::Pause(10),
                        TapeBlock::Unsupported { id: 0x99, body: vec![2, 0, 0, 0, 0xAA, 0xBB].into() }],
                   tape.blocks().to_vec());
        let out = write(&tape)?;
        assert_eq!(b"\x20\x0a\x00\x99\x02\x00\x00\x00\xaa\xbb", &out[10..]);
        Ok(())
    }

    #[test]
    fn tzx_texts_use_carriage_returns() -> Result<()> {
        let mut tape = Tape::new();
        tape.append(TapeBlock::comment("line 1\nline 2"));
        let file = write(&tape)?;
        assert_eq!(b"\x30\x0dline 1\rline 2", &file[10..]);
        let tape = read(&file)?;
        assert_eq!(Some(&TapeBlock::comment("line 1\rline 2")), tape.block(0));
        assert_eq!("Text Description: \"line 1\\nline 2\"", tape.block(0).unwrap().to_string());
        let mut tape = Tape::new();
        tape.append(TapeBlock::comment("x".repeat(256).as_str()));
        assert!(write(&tape).unwrap_err().is_corrupt());
        Ok(())
    }

    #[test]
    fn tzx_id_works() {
        assert_eq!(Ok(TzxId::Glue), TzxId::try_from(0x5A));
        assert_eq!(Err(0x99), TzxId::try_from(0x99));
        assert_eq!(0x2B, u8::from(TzxId::SetLevel));
    }
}
