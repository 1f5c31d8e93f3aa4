/*
    Copyright (C) 2020-2022  Rafal Michalski

    This file is part of SPECTAPE, a Rust library of ZX Spectrum tape formats.

    For the full copyright notice, see the lib.rs file.
*/
/*! **TAP** file format codec.

# TAP format

A **TAP** file consists of blocks of data each prepended by a 2 byte (LSB) block length indicator.
Those blocks will be referenced here as *TAP chunks*.

The standard Spectrum's ROM *TAPE* routine produces 2 kinds of blocks:

* a [header][Header] block
* a data block

This is determined by the first byte of each block, here called a `flag` byte.

A flag byte is `0x00` for header blocks and `0xff` for data blocks.
After the flag byte, the actual data follows, after which a checksum byte, calculated such that
XORing all the data bytes together (including the flag byte) produces `0`.

The structure of the 17 byte header is as follows.

| offset | size | description                      |
|--------|------|----------------------------------|
|    0   |    1 | type (0,1,2,3)                   |
|    1   |   10 | filename (padded with space)     |
|   11   |    2 | length of data block (LSB first) |
|   13   |    2 | parameter 1 (LSB first)          |
|   15   |    2 | parameter 2 (LSB first)          |

The above text uses material from the ["TAP format"](https://sinclair.wiki.zxnet.co.uk/wiki/TAP_format) article
on the [Sinclair FAQ wiki](https://sinclair.wiki.zxnet.co.uk/) and is released under the
[Creative Commons Attribution-Share Alike License](https://creativecommons.org/licenses/by-sa/3.0/).

# Tape blocks

Each *TAP chunk* is read as a [TapeBlock::Rom] with a pause of [ROM_PAUSE] milliseconds.
When writing, only the blocks carrying encoded bytes can be represented: [TapeBlock::Rom],
[TapeBlock::Turbo] and [TapeBlock::PureData]. Their timing parameters are lost.
Other blocks are skipped.

```
use spectape_formats::{tap, tape::{Tape, TapeBlock}};

let mut tape = Tape::new();
tape.append(TapeBlock::rom(vec![0xFF, 201, 0x36]));
let bytes = tap::write(&tape)?;
assert_eq!(&bytes, &[3, 0, 0xFF, 201, 0x36]);
let tape = tap::read(&bytes)?;
assert_eq!(1, tape.len());
# Ok::<(), spectape_formats::Error>(())
```
*/
use core::borrow::Borrow;
use core::convert::TryFrom;
use core::fmt;
use std::borrow::Cow;

#[allow(unused_imports)]
use log::{debug, warn};
use nom::error::context;
use nom::number::complete::le_u16;

use spectape_core::buffer::Buffer;
use crate::parse::{self, sized, PResult};
use crate::tape::{Tape, TapeBlock};
use crate::{Error, Result};

const HEAD_BLOCK_FLAG: u8 = 0x00;
const DATA_BLOCK_FLAG: u8 = 0xFF;
/// The size of the header chunk including the flag and checksum bytes.
pub const HEADER_SIZE: usize = 19;
/// The pause in milliseconds following each block read from a *TAP* file.
pub const ROM_PAUSE: u16 = 1000;

/// Calculates bit toggle checksum from the given iterator of `u8`.
pub fn checksum<I: IntoIterator<Item=B>, B: Borrow<u8>>(iter: I) -> u8 {
    iter.into_iter().fold(0, |acc, x| acc ^ x.borrow())
}

/// The *TAP* block type of the next chunk following a [Header].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum BlockType {
    Program     = 0,
    NumberArray = 1,
    CharArray   = 2,
    Code        = 3
}

/// Represents the *TAP* header block.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Header {
    /// Length of the data block excluding a block flag and checksum byte.
    pub length: u16,
    /// The type of the file this header represents.
    pub block_type: BlockType,
    /// A name of the file.
    pub name: [u8;10],
    /// Additional header data.
    pub par1: [u8;2],
    /// Additional header data.
    pub par2: [u8;2]
}

/// The *TAP* chunk meta-data.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TapChunkInfo {
    /// Represents a proper header block.
    Head(Header),
    /// Represents a data block.
    Data {
        /// The length of data excluding a block flag and checksum byte.
        length: u16,
        /// Checksum of the data, should be 0. Otherwise this block won't load properly.
        checksum: u8
    },
    /// Represents an unknown block.
    Unknown {
        /// The size of the whole block including the block flag.
        size: u16,
        /// The first byte of the block (a block flag).
        flag: u8
    },
    /// Represents an empty block.
    Empty
}

#[inline(always)]
fn array_name(c: u8) -> char {
    (c & 0b0001_1111 | 0b0100_0000).into()
}

impl fmt::Display for BlockType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}",
            match self {
                BlockType::Program => "Program",
                BlockType::NumberArray => "Number array",
                BlockType::CharArray => "Character array",
                BlockType::Code => "Bytes",
            })
    }
}

impl fmt::Display for Header {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: \"{}\"", self.block_type, self.name_str().trim_end())?;
        match self.block_type {
            BlockType::Program => {
                if self.start() < 10000 {
                    write!(f, " LINE {}", self.start())?;
                }
                if self.vars() != self.length {
                    write!(f, " PROG {} VARS {}",
                        self.vars(), self.length.wrapping_sub(self.vars()))?;
                }
                Ok(())
            }
            BlockType::NumberArray => {
                write!(f, " DATA {}()", self.array_name())
            }
            BlockType::CharArray => {
                write!(f, " DATA {}$()", self.array_name())
            }
            BlockType::Code => {
                write!(f, " CODE {},{}", self.start(), self.length)
            }
        }
    }
}

impl fmt::Display for TapChunkInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TapChunkInfo::Head(header) => header.fmt(f),
            TapChunkInfo::Data {length, ..} => {
                write!(f, "(data {})", length)
            }
            TapChunkInfo::Unknown {size, ..} => {
                write!(f, "(unknown {})", size)
            }
            TapChunkInfo::Empty => {
                write!(f, "(empty)")
            }
        }
    }
}

impl TryFrom<u8> for BlockType {
    type Error = Error;

    #[inline]
    fn try_from(block_type: u8) -> Result<Self> {
        match block_type {
            0 => Ok(BlockType::Program),
            1 => Ok(BlockType::NumberArray),
            2 => Ok(BlockType::CharArray),
            3 => Ok(BlockType::Code),
            _ => Err(Error::corrupt("unknown TAP header type"))
        }
    }
}

impl Header {
    /// Returns a header name as a string.
    #[inline]
    pub fn name_str(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.name)
    }
    /// Returns a starting address of [BlockType::Code] or a starting line of [BlockType::Program].
    #[inline]
    pub fn start(&self) -> u16 {
        u16::from_le_bytes(self.par1)
    }
    /// Returns an offset to `VARS`. Only valid for headers with [BlockType::Program].
    #[inline]
    pub fn vars(&self) -> u16 {
        u16::from_le_bytes(self.par2)
    }
    /// Returns an array variable name.
    #[inline]
    pub fn array_name(&self) -> char {
        array_name(self.par1[1])
    }
}

impl TryFrom<&'_[u8]> for Header {
    type Error = Error;
    fn try_from(header: &[u8]) -> Result<Self> {
        if header.len() != HEADER_SIZE - 2 {
            return Err(Error::corrupt("not a proper TAP header: invalid length"));
        }
        let block_type = BlockType::try_from(header[0])?;
        let mut name: [u8; 10] = Default::default();
        name.copy_from_slice(&header[1..11]);
        let length = u16::from_le_bytes([header[11], header[12]]);
        let par1 = [header[13], header[14]];
        let par2 = [header[15], header[16]];
        Ok(Header { length, block_type, name, par1, par2 })
    }
}

impl TryFrom<&'_[u8]> for TapChunkInfo {
    type Error = Error;

    fn try_from(bytes: &[u8]) -> Result<Self> {
        let size = match bytes.len() {
            0 => {
                return Ok(TapChunkInfo::Empty);
            }
            1 => {
                return Ok(TapChunkInfo::Unknown { size: 1, flag: bytes[0] })
            }
            size if size > u16::max_value().into() => {
                return Err(Error::corrupt("not a proper TAP chunk: too large"));
            }
            size => size
        };
        match bytes[0] {
            HEAD_BLOCK_FLAG if size == HEADER_SIZE && checksum(bytes) == 0 => {
                Header::try_from(&bytes[1..HEADER_SIZE-1])
                .map(TapChunkInfo::Head)
                .or(Ok(TapChunkInfo::Unknown { size: size as u16, flag: HEAD_BLOCK_FLAG }))
            }
            DATA_BLOCK_FLAG => {
                let checksum = checksum(bytes);
                Ok(TapChunkInfo::Data{ length: size as u16 - 2, checksum })
            }
            flag => {
                Ok(TapChunkInfo::Unknown { size: size as u16, flag })
            }
        }
    }
}

fn tap_chunk(inp: &[u8]) -> PResult<'_, &[u8]> {
    context("TAP chunk exceeding file size", sized(le_u16))(inp)
}

/// Parses *TAP* file data, creating a [Tape] of [TapeBlock::Rom] blocks.
pub fn read(data: &[u8]) -> Result<Tape> {
    let mut tape = Tape::new();
    let mut inp = data;
    while !inp.is_empty() {
        let (rest, chunk) = tap_chunk(inp).map_err(|e| parse::corrupt("TAP", data, e))?;
        debug!("TAP chunk: {} bytes", chunk.len());
        match TapChunkInfo::try_from(chunk) {
            Ok(TapChunkInfo::Unknown { flag, .. }) => {
                warn!("TAP: chunk of {} bytes with an unexpected flag: 0x{:02x}", chunk.len(), flag);
            }
            Ok(TapChunkInfo::Data { checksum, .. }) if checksum != 0 => {
                warn!("TAP: data chunk of {} bytes with a checksum mismatch", chunk.len());
            }
            _ => {}
        }
        tape.append(TapeBlock::rom_with_pause(chunk, ROM_PAUSE));
        inp = rest;
    }
    Ok(tape)
}

/// Serializes the data blocks of the `tape` in the *TAP* format.
pub fn write(tape: &Tape) -> Result<Vec<u8>> {
    let mut buf = Buffer::new();
    for block in tape.blocks() {
        let data = match block {
            TapeBlock::Rom(..)|TapeBlock::Turbo(..)|TapeBlock::PureData(..) => block.data().unwrap_or(&[]),
            TapeBlock::RawData(..) => {
                warn!("TAP: raw data blocks can not be represented, skipping");
                continue
            }
            block if block.is_timed() => {
                warn!("TAP: skipping {} block", block.kind());
                continue
            }
            _ => continue
        };
        let len = u16::try_from(data.len()).map_err(|_|
            Error::corrupt(format_args!("TAP chunk of {} bytes is too large", data.len()))
        )?;
        buf.write_u16_le(len)?;
        buf.write_bytes(data)?;
    }
    Ok(buf.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    const PROGRAM: &[u8] = &[0x00,
        0x00, b'H', b'e', b'l', b'l', b'o', b' ', b' ', b' ', b' ', b' ',
        0x0A, 0x00, 0x0A, 0x00, 0x0A, 0x00,
        0x68];

    #[test]
    fn tap_header_works() {
        assert_eq!(0, checksum(PROGRAM));
        let header = Header::try_from(&PROGRAM[1..18]).unwrap();
        assert_eq!(BlockType::Program, header.block_type);
        assert_eq!(10, header.start());
        assert_eq!("Program: \"Hello\" LINE 10", header.to_string());
        let info = TapChunkInfo::try_from(PROGRAM).unwrap();
        assert_eq!(TapChunkInfo::Head(header), info);
        let code = Header::try_from(&b"\x03screen    \x00\x1b\x00\x40\x00\x80"[..]).unwrap();
        assert_eq!("Bytes: \"screen\" CODE 16384,6912", code.to_string());
        assert_eq!(TapChunkInfo::Data { length: 1, checksum: 0 },
                   TapChunkInfo::try_from(&[0xFF, 0x11, 0xEE][..]).unwrap());
        assert_eq!(TapChunkInfo::Empty, TapChunkInfo::try_from(&[][..]).unwrap());
        assert_eq!("(unknown 2)", TapChunkInfo::try_from(&[0x7F, 0][..]).unwrap().to_string());
        assert!(Header::try_from(&PROGRAM[..5]).unwrap_err().is_corrupt());
    }

    #[test]
    fn tap_read_keeps_suspicious_chunks() -> Result<()> {
        let data = [3, 0, 0x7F, 1, 2, 3, 0, 0xFF, 1, 2];
        let tape = read(&data)?;
        assert_eq!(2, tape.len());
        assert_eq!(Some(&[0x7F, 1, 2][..]), tape.block(0).and_then(|b| b.data()));
        assert_eq!(Some(&[0xFF, 1, 2][..]), tape.block(1).and_then(|b| b.data()));
        assert_eq!(&data[..], &write(&tape)?[..]);
        Ok(())
    }

    #[test]
    fn tap_read_write_works() -> Result<()> {
        let mut data = vec![HEADER_SIZE as u8, 0];
        data.extend_from_slice(PROGRAM);
        data.extend_from_slice(&[4, 0, 0xFF, 1, 2, 0xFC]);
        data.extend_from_slice(&[0, 0]);
        let tape = read(&data)?;
        assert_eq!(3, tape.len());
        assert_eq!(Some(PROGRAM), tape.block(0).and_then(|b| b.data()));
        assert_eq!(Some(ROM_PAUSE), tape.block(1).and_then(|b| b.pause()));
        assert_eq!(Some(&[][..]), tape.block(2).and_then(|b| b.data()));
        assert_eq!(data, write(&tape)?);
        for len in 0..data.len() {
            if len == 0 || len == 21 || len == 27 {
                continue
            }
            assert!(read(&data[..len]).unwrap_err().is_corrupt(), "len: {}", len);
        }
        Ok(())
    }

    #[test]
    fn tap_write_skips_other_blocks() -> Result<()> {
        let mut tape = Tape::new();
        tape.append(TapeBlock::comment("no way"));
        tape.append(TapeBlock::pure_tone(2168, 100));
        tape.append(TapeBlock::turbo(2000, 600, 600, 800, 1600, 100, 8, 0, vec![0xFF, 0xAA]));
        tape.append(TapeBlock::Pause(100));
        tape.append(TapeBlock::pure_data(800, 1600, 8, 0, vec![0x55]));
        assert_eq!(vec![2, 0, 0xFF, 0xAA, 1, 0, 0x55], write(&tape)?);
        let mut tape = Tape::new();
        tape.append(TapeBlock::rom(vec![0; 0x10000]));
        assert!(write(&tape).unwrap_err().is_corrupt());
        Ok(())
    }
}
