/*
    Copyright (C) 2020-2022  Rafal Michalski

    This file is part of SPECTAPE, a Rust library of ZX Spectrum tape formats.

    For the full copyright notice, see the lib.rs file.
*/
use core::convert::TryFrom;

#[allow(unused_imports)]
use log::{debug, warn};
use nom::bytes::complete::{tag, take};
use nom::combinator::{flat_map, map, map_parser, recognize};
use nom::error::context;
use nom::multi::count;
use nom::number::complete::{le_i16, le_u8, le_u16, le_u24, le_u32};
use nom::sequence::tuple;

use crate::parse::{self, sized, PResult};
use crate::tape::{Tape, TapeBlock, TapeText, SelectItem, ArchiveItem, HardwareInfo};
use crate::{Error, Result};
use super::{TzxId, SIGNATURE, MAJOR_VERSION};

fn header(inp: &[u8]) -> PResult<'_, (u8, u8)> {
    let (inp, _) = context("TZX signature", tag(&SIGNATURE[..]))(inp)?;
    context("TZX version", tuple((le_u8, le_u8)))(inp)
}

fn text8(inp: &[u8]) -> PResult<'_, TapeText> {
    map(sized(le_u8), |text: &[u8]| TapeText::from(text))(inp)
}

fn select_item(inp: &[u8]) -> PResult<'_, SelectItem> {
    map(tuple((le_i16, text8)), |(offset, description)| SelectItem { offset, description })(inp)
}

fn archive_item(inp: &[u8]) -> PResult<'_, ArchiveItem> {
    map(tuple((le_u8, text8)), |(id, text)| ArchiveItem { id, text })(inp)
}

fn hardware_info(inp: &[u8]) -> PResult<'_, HardwareInfo> {
    map(tuple((le_u8, le_u8, le_u8)), |(hw_type, hw_id, value)| HardwareInfo { hw_type, hw_id, value })(inp)
}

fn unsupported<'a, F>(id: u8, body: F) -> impl FnMut(&'a [u8]) -> PResult<'a, Option<TapeBlock>>
    where F: FnMut(&'a [u8]) -> PResult<'a, &'a [u8]>
{
    map(recognize(body), move |body: &[u8]| Some(TapeBlock::Unsupported { id, body: body.into() }))
}

fn tzx_block(inp: &[u8]) -> PResult<'_, Option<TapeBlock>> {
    let (inp, id) = context("block ID", le_u8)(inp)?;
    let tzx_id = match TzxId::try_from(id) {
        Ok(tzx_id) => tzx_id,
        Err(id) => {
            warn!("TZX: unknown block 0x{:02x}", id);
            return context("unknown block", unsupported(id, sized(le_u32)))(inp)
        }
    };
    debug!("TZX: {:?} block", tzx_id);
    match tzx_id {
        TzxId::StandardSpeed => context("standard speed data block",
            map(tuple((le_u16, sized(le_u16))),
                |(pause, data)| Some(TapeBlock::rom_with_pause(data, pause))))(inp),
        TzxId::TurboSpeed => context("turbo speed data block",
            map(tuple((le_u16, le_u16, le_u16, le_u16, le_u16, le_u16, le_u8, le_u16, sized(le_u24))),
                |(pilot, sync1, sync2, bit0, bit1, pilot_pulses, bits_in_last_byte, pause, data)| {
                    Some(TapeBlock::turbo(pilot, sync1, sync2, bit0, bit1, pilot_pulses,
                                          bits_in_last_byte, pause, data))
                }))(inp),
        TzxId::PureTone => context("pure tone block",
            map(tuple((le_u16, le_u16)),
                |(length, pulses)| Some(TapeBlock::pure_tone(length, pulses))))(inp),
        TzxId::SeqOfPulses => context("sequence of pulses block",
            map(flat_map(le_u8, |n| count(le_u16, n.into())),
                |lengths| Some(TapeBlock::pulses(lengths))))(inp),
        TzxId::PureData => context("pure data block",
            map(tuple((le_u16, le_u16, le_u8, le_u16, sized(le_u24))),
                |(bit0, bit1, bits_in_last_byte, pause, data)| {
                    Some(TapeBlock::pure_data(bit0, bit1, bits_in_last_byte, pause, data))
                }))(inp),
        TzxId::DirectRec => context("direct recording block",
            map(tuple((le_u16, le_u16, le_u8, sized(le_u24))),
                |(bit_length, pause, bits_in_last_byte, data)| {
                    Some(TapeBlock::raw_data(bit_length, bits_in_last_byte, pause, data))
                }))(inp),
        TzxId::C64Rom|TzxId::C64Turbo|TzxId::CswRecording|TzxId::Generalized => {
            context("block length exceeding file size", unsupported(id, sized(le_u32)))(inp)
        }
        TzxId::EmulationInfo => context("emulation info block", unsupported(id, take(8usize)))(inp),
        TzxId::Snapshot => {
            context("snapshot block", unsupported(id, recognize(tuple((le_u8, sized(le_u24))))))(inp)
        }
        TzxId::Pause => context("pause block",
            map(le_u16, |pause| Some(TapeBlock::Pause(pause))))(inp),
        TzxId::GroupStart => context("group start block",
            map(text8, |name| Some(TapeBlock::GroupStart(name))))(inp),
        TzxId::GroupEnd => Ok((inp, Some(TapeBlock::GroupEnd))),
        TzxId::Jump => context("jump block",
            map(le_i16, |offset| Some(TapeBlock::Jump(offset))))(inp),
        TzxId::LoopStart => context("loop start block",
            map(le_u16, |count| Some(TapeBlock::LoopStart(count))))(inp),
        TzxId::LoopEnd => Ok((inp, Some(TapeBlock::LoopEnd))),
        TzxId::CallSeq => context("call sequence block",
            map(flat_map(le_u16, |n| count(le_i16, n.into())),
                |calls| Some(TapeBlock::CallSequence(calls.into()))))(inp),
        TzxId::Return => Ok((inp, Some(TapeBlock::Return))),
        TzxId::Select => context("select block",
            map(map_parser(sized(le_u16), flat_map(le_u8, |n| count(select_item, n.into()))),
                |items| Some(TapeBlock::Select(items.into()))))(inp),
        TzxId::StopIn48k => context("stop the tape if in 48k mode block",
            map(sized(le_u32), |_| Some(TapeBlock::StopIf48k)))(inp),
        TzxId::SetLevel => context("set signal level block",
            map(map_parser(sized(le_u32), le_u8),
                |level| Some(TapeBlock::SetSignalLevel(level != 0))))(inp),
        TzxId::Text => context("text description block",
            map(text8, |text| Some(TapeBlock::Comment(text))))(inp),
        TzxId::Message => context("message block",
            map(tuple((le_u8, text8)), |(time, text)| Some(TapeBlock::Message { time, text })))(inp),
        TzxId::Archive => context("archive info block",
            map(map_parser(sized(le_u16), flat_map(le_u8, |n| count(archive_item, n.into()))),
                |items| Some(TapeBlock::ArchiveInfo(items.into()))))(inp),
        TzxId::Hardware => context("hardware type block",
            map(flat_map(le_u8, |n| count(hardware_info, n.into())),
                |items| Some(TapeBlock::Hardware(items.into()))))(inp),
        TzxId::Custom => context("custom info block",
            map(tuple((take(16usize), sized(le_u32))), |(id, data): (&[u8], &[u8])| {
                let mut description = [0u8;16];
                description.copy_from_slice(id);
                Some(TapeBlock::Custom { description, data: data.into() })
            }))(inp),
        TzxId::Glue => {
            warn!("TZX: skipping a glue block");
            context("glue block", map(take(9usize), |_| None))(inp)
        }
    }
}

/// Parses *TZX* file data into a [Tape].
///
/// # Errors
/// Returns [Error::Unknown] if the major version of the file is not supported
/// and [Error::Corrupt] if the data is malformed.
pub fn read(data: &[u8]) -> Result<Tape> {
    let (mut inp, (major, minor)) = header(data).map_err(|e| parse::corrupt("TZX header", data, e))?;
    if major != MAJOR_VERSION {
        return Err(Error::unknown(format_args!("TZX version {}.{} is not supported", major, minor)))
    }
    debug!("TZX version {}.{}", major, minor);
    let mut tape = Tape::new();
    while !inp.is_empty() {
        let (rest, block) = tzx_block(inp).map_err(|e| parse::corrupt("TZX", data, e))?;
        if let Some(block) = block {
            tape.append(block);
        }
        inp = rest;
    }
    Ok(tape)
}
