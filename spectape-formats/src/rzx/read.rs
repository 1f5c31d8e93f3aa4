/*
    Copyright (C) 2020-2022  Rafal Michalski

    This file is part of SPECTAPE, a Rust library of ZX Spectrum tape formats.

    For the full copyright notice, see the lib.rs file.
*/
#[allow(unused_imports)]
use log::{debug, warn};
use nom::bytes::complete::{tag, take};
use nom::combinator::{map, rest};
use nom::error::context;
use nom::number::complete::{le_u8, le_u16, le_u32};
use nom::sequence::tuple;

use spectape_core::compress;
use spectape_core::sign::{self, PublicKey};
use crate::parse::{self, PResult};
use crate::{Error, Result};
use super::*;

fn header(inp: &[u8]) -> PResult<'_, (u8, u8, u32)> {
    let (inp, _) = context("RZX signature", tag(&SIGNATURE[..]))(inp)?;
    context("RZX version and flags", tuple((le_u8, le_u8, le_u32)))(inp)
}
/// Returns the block ID and the block body.
fn block(inp: &[u8]) -> PResult<'_, (u8, &[u8])> {
    let (rest, (id, len)) = context("block header", tuple((le_u8, le_u32)))(inp)?;
    let len = len as usize;
    if len < BLOCK_HEADER_SIZE {
        return parse::fail(inp, "block length too small")
    }
    let (rest, body) = context("block length exceeding file size", take(len - BLOCK_HEADER_SIZE))(rest)?;
    Ok((rest, (id, body)))
}

fn fixed_str(bytes: &[u8]) -> String {
    let len = memchr::memchr(0, bytes).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..len]).into_owned()
}

fn creator(inp: &[u8]) -> PResult<'_, Creator> {
    map(tuple((take(20usize), le_u16, le_u16, rest)), |(name, major, minor, custom): (&[u8], _, _, &[u8])| {
        Creator { name: fixed_str(name), major, minor, custom: custom.into() }
    })(inp)
}

fn snapshot_header(inp: &[u8]) -> PResult<'_, (u32, &[u8], u32, &[u8])> {
    tuple((le_u32, take(4usize), le_u32, rest))(inp)
}

fn input_header(inp: &[u8]) -> PResult<'_, (u32, u8, u32, u32, &[u8])> {
    tuple((le_u32, le_u8, le_u32, le_u32, rest))(inp)
}
/// Returns the number of instructions, the input count and the input bytes of a single frame.
fn frame(inp: &[u8]) -> PResult<'_, (u16, u16, &[u8])> {
    let (inp, (instructions, count)) = tuple((le_u16, le_u16))(inp)?;
    if count == REPEAT_LAST {
        return Ok((inp, (instructions, count, &[][..])))
    }
    let (inp, input) = context("frame input", take(count))(inp)?;
    Ok((inp, (instructions, count, input)))
}

fn corrupt_block<'a>(what: &str, body: &'a [u8]) -> impl FnOnce(nom::Err<parse::VerboseBytesError<'a>>) -> Error + 'a {
    let what = format!("RZX {} block", what);
    move |e| parse::corrupt(&what, body, e)
}

fn read_snapshot(body: &[u8]) -> Result<Snapshot> {
    let (_, (flags, extension, length, payload)) = snapshot_header(body)
                                                   .map_err(corrupt_block("snapshot", body))?;
    let extension = fixed_str(extension);
    let external = flags & SNAPSHOT_EXTERNAL != 0;
    let data: Box<[u8]> = if flags & SNAPSHOT_COMPRESSED != 0 {
        compress::zlib_inflate(payload, Some(length as usize))?.into()
    }
    else if !external && payload.len() != length as usize {
        return Err(Error::corrupt(format_args!(
            "RZX snapshot: {} bytes while {} bytes were declared", payload.len(), length)))
    }
    else {
        payload.into()
    };
    debug!("RZX snapshot: {:?} {} bytes{}", extension, data.len(), if external { " external" } else { "" });
    Ok(Snapshot { extension, external, data })
}

fn read_input(body: &[u8]) -> Result<InputBlock> {
    let (_, (num_frames, _, tstates, flags, payload)) = input_header(body)
                                                        .map_err(corrupt_block("input recording", body))?;
    let inflated;
    let frames_data = if flags & INPUT_COMPRESSED != 0 {
        inflated = compress::zlib_inflate(payload, None)?;
        &inflated[..]
    }
    else {
        payload
    };
    let mut inp = frames_data;
    debug!("RZX input: {} frames, T-states: {}", num_frames, tstates);
    let mut frames: Vec<Frame> = Vec::new();
    let mut last_count = None;
    for index in 0..num_frames {
        let (rest, (instructions, count, input)) = frame(inp)
                                                   .map_err(corrupt_block("input recording", frames_data))?;
        let item = if count == REPEAT_LAST {
            match last_count {
                Some(count) => Frame::repeat(instructions, count),
                None => return Err(Error::corrupt(format_args!(
                            "RZX input: the frame {} repeats a non-existent frame", index)))
            }
        }
        else {
            last_count = Some(count);
            Frame::new(instructions, input)?
        };
        frames.try_reserve(1)?;
        frames.push(item);
        inp = rest;
    }
    if !inp.is_empty() {
        warn!("RZX input: {} bytes of junk after the last frame", inp.len());
    }
    Ok(InputBlock { tstates, frames })
}

/// Parses *RZX* file data into an [Rzx] recording.
///
/// The signature, if present, is not verified. Use [read_verified] for that.
///
/// # Errors
/// Returns [Error::Unknown] if the major version of the file is not supported
/// and [Error::Corrupt] if the data is malformed.
pub fn read(data: &[u8]) -> Result<Rzx> {
    let (mut inp, (major, minor, flags)) = header(data).map_err(|e| parse::corrupt("RZX header", data, e))?;
    if major > MAJOR_VERSION {
        return Err(Error::unknown(format_args!("RZX version {}.{} is not supported", major, minor)))
    }
    debug!("RZX version {}.{} flags: {:x}", major, minor, flags);
    let mut rzx = Rzx::new();
    let mut sign_start: Option<(u32, u32)> = None;
    while !inp.is_empty() {
        let offset = data.len() - inp.len();
        let (rest, (id, body)) = block(inp).map_err(|e| parse::corrupt("RZX", data, e))?;
        match id {
            CREATOR_BLOCK => {
                let (_, creator) = creator(body).map_err(corrupt_block("creator", body))?;
                debug!("RZX creator: {}", creator);
                rzx.creator = creator;
            }
            SIGN_START_BLOCK => {
                let (_, (key_id, week)) = tuple((le_u32, le_u32))(body)
                                          .map_err(corrupt_block("signature start", body))?;
                sign_start = Some((key_id, week));
            }
            SIGN_END_BLOCK => {
                let (key_id, week) = sign_start.take().ok_or_else(||
                    Error::corrupt("RZX: signature end block without a signature start block"))?;
                rzx.push_block(RzxBlock::Sign(SignInfo {
                    key_id, week, signature: body.into(), signed_len: offset
                }));
            }
            SNAPSHOT_BLOCK => rzx.push_block(RzxBlock::Snapshot(read_snapshot(body)?)),
            INPUT_BLOCK => rzx.push_block(RzxBlock::Input(read_input(body)?)),
            id => warn!("RZX: skipping unknown block 0x{:02x} of {} bytes", id, body.len())
        }
        inp = rest;
    }
    if sign_start.is_some() {
        return Err(Error::corrupt("RZX: signature start block without a signature end block"))
    }
    if flags & FLAG_SIGNED != 0 && rzx.signed_by().is_none() {
        warn!("RZX: the file is marked as signed but has no signature");
    }
    Ok(rzx)
}

/// Parses *RZX* file data and verifies its signature with the given `key` if the file is signed.
///
/// # Errors
/// Returns [Error::Signature] if the signature does not match or if the file is marked as signed
/// but carries no signature, otherwise the same errors as [read].
pub fn read_verified(data: &[u8], key: &PublicKey) -> Result<Rzx> {
    let rzx = read(data)?;
    match rzx.sign_info() {
        Some(info) => {
            debug!("RZX: verifying the signature of the key {:08x}", info.key_id);
            sign::verify(&info.signature, &data[..info.signed_len], key)?;
        }
        None => {
            let (_, (_, _, flags)) = header(data).map_err(|e| parse::corrupt("RZX header", data, e))?;
            if flags & FLAG_SIGNED != 0 {
                return Err(Error::Signature)
            }
        }
    }
    Ok(rzx)
}
