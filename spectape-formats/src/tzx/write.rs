/*
    Copyright (C) 2020-2022  Rafal Michalski

    This file is part of SPECTAPE, a Rust library of ZX Spectrum tape formats.

    For the full copyright notice, see the lib.rs file.
*/
use core::convert::TryFrom;

use spectape_core::buffer::Buffer;
use crate::tape::*;
use crate::{Error, Result};
use super::{TzxId, SIGNATURE, MAJOR_VERSION, MINOR_VERSION};

fn length<T: TryFrom<usize>>(len: usize, what: &str) -> Result<T> {
    T::try_from(len).map_err(|_| Error::corrupt(format_args!("TZX: {} too long: {}", what, len)))
}

fn write_u24_len(buf: &mut Buffer, len: usize, what: &str) -> Result<()> {
    if len > 0xFF_FFFF {
        return Err(Error::corrupt(format_args!("TZX: {} too long: {}", what, len)))
    }
    buf.write_u24_le(len as u32)
}

fn write_id(buf: &mut Buffer, id: TzxId) -> Result<()> {
    buf.write_u8(id.into())
}
/// Writes a text prefixed with its length as a single byte. Line feeds become carriage returns.
fn write_text8(buf: &mut Buffer, text: &TapeText, what: &str) -> Result<()> {
    buf.write_u8(length(text.len(), what)?)?;
    for &ch in text.as_bytes() {
        buf.write_u8(if ch == b'\n' { b'\r' } else { ch })?;
    }
    Ok(())
}
/// Writes a body of nested items prefixed with its u16 length.
fn write_u16_body<F>(buf: &mut Buffer, what: &str, f: F) -> Result<()>
    where F: FnOnce(&mut Buffer) -> Result<()>
{
    let mut body = Buffer::new();
    f(&mut body)?;
    buf.write_u16_le(length(body.len(), what)?)?;
    buf.write_bytes(body.as_slice())
}

fn write_block(buf: &mut Buffer, block: &TapeBlock) -> Result<()> {
    match block {
        TapeBlock::Rom(RomBlock { pause, data, .. }) => {
            write_id(buf, TzxId::StandardSpeed)?;
            buf.write_u16_le(*pause)?;
            buf.write_u16_le(length(data.len(), "standard speed data")?)?;
            buf.write_bytes(data)
        }
        TapeBlock::Turbo(block) => {
            write_id(buf, TzxId::TurboSpeed)?;
            for &len in [block.pilot_length, block.sync1_length, block.sync2_length,
                         block.bit0_length, block.bit1_length, block.pilot_pulses].iter() {
                buf.write_u16_le(len)?;
            }
            buf.write_u8(block.bits_in_last_byte)?;
            buf.write_u16_le(block.pause)?;
            write_u24_len(buf, block.data.len(), "turbo speed data")?;
            buf.write_bytes(&block.data)
        }
        TapeBlock::PureTone(PureToneBlock { length, pulses, .. }) => {
            write_id(buf, TzxId::PureTone)?;
            buf.write_u16_le(*length)?;
            buf.write_u16_le(*pulses)
        }
        TapeBlock::Pulses(PulsesBlock { lengths, .. }) => {
            write_id(buf, TzxId::SeqOfPulses)?;
            buf.write_u8(length(lengths.len(), "sequence of pulses")?)?;
            lengths.iter().try_for_each(|&len| buf.write_u16_le(len))
        }
        TapeBlock::PureData(block) => {
            write_id(buf, TzxId::PureData)?;
            buf.write_u16_le(block.bit0_length)?;
            buf.write_u16_le(block.bit1_length)?;
            buf.write_u8(block.bits_in_last_byte)?;
            buf.write_u16_le(block.pause)?;
            write_u24_len(buf, block.data.len(), "pure data")?;
            buf.write_bytes(&block.data)
        }
        TapeBlock::RawData(block) => {
            write_id(buf, TzxId::DirectRec)?;
            buf.write_u16_le(block.bit_length)?;
            buf.write_u16_le(block.pause)?;
            buf.write_u8(block.bits_in_last_byte)?;
            write_u24_len(buf, block.data.len(), "direct recording")?;
            buf.write_bytes(&block.data)
        }
        TapeBlock::Pause(pause) => {
            write_id(buf, TzxId::Pause)?;
            buf.write_u16_le(*pause)
        }
        TapeBlock::GroupStart(name) => {
            write_id(buf, TzxId::GroupStart)?;
            write_text8(buf, name, "group name")
        }
        TapeBlock::GroupEnd => write_id(buf, TzxId::GroupEnd),
        TapeBlock::Jump(offset) => {
            write_id(buf, TzxId::Jump)?;
            buf.write_u16_le(*offset as u16)
        }
        TapeBlock::LoopStart(count) => {
            write_id(buf, TzxId::LoopStart)?;
            buf.write_u16_le(*count)
        }
        TapeBlock::LoopEnd => write_id(buf, TzxId::LoopEnd),
        TapeBlock::CallSequence(calls) => {
            write_id(buf, TzxId::CallSeq)?;
            buf.write_u16_le(length(calls.len(), "call sequence")?)?;
            calls.iter().try_for_each(|&offset| buf.write_u16_le(offset as u16))
        }
        TapeBlock::Return => write_id(buf, TzxId::Return),
        TapeBlock::Select(items) => {
            write_id(buf, TzxId::Select)?;
            write_u16_body(buf, "select block", |body| {
                body.write_u8(length(items.len(), "select block")?)?;
                items.iter().try_for_each(|item| {
                    body.write_u16_le(item.offset as u16)?;
                    write_text8(body, &item.description, "select description")
                })
            })
        }
        TapeBlock::StopIf48k => {
            write_id(buf, TzxId::StopIn48k)?;
            buf.write_u32_le(0)
        }
        TapeBlock::SetSignalLevel(high) => {
            write_id(buf, TzxId::SetLevel)?;
            buf.write_u32_le(1)?;
            buf.write_u8(*high as u8)
        }
        TapeBlock::Comment(text) => {
            write_id(buf, TzxId::Text)?;
            write_text8(buf, text, "text description")
        }
        TapeBlock::Message { time, text } => {
            write_id(buf, TzxId::Message)?;
            buf.write_u8(*time)?;
            write_text8(buf, text, "message")
        }
        TapeBlock::ArchiveInfo(items) => {
            write_id(buf, TzxId::Archive)?;
            write_u16_body(buf, "archive info", |body| {
                body.write_u8(length(items.len(), "archive info")?)?;
                items.iter().try_for_each(|item| {
                    body.write_u8(item.id)?;
                    write_text8(body, &item.text, "archive info text")
                })
            })
        }
        TapeBlock::Hardware(items) => {
            write_id(buf, TzxId::Hardware)?;
            buf.write_u8(length(items.len(), "hardware type")?)?;
            items.iter().try_for_each(|info| {
                buf.write_u8(info.hw_type)?;
                buf.write_u8(info.hw_id)?;
                buf.write_u8(info.value)
            })
        }
        TapeBlock::Custom { description, data } => {
            write_id(buf, TzxId::Custom)?;
            buf.write_bytes(description)?;
            buf.write_u32_le(length(data.len(), "custom info")?)?;
            buf.write_bytes(data)
        }
        TapeBlock::Unsupported { id, body } => {
            buf.write_u8(*id)?;
            buf.write_bytes(body)
        }
    }
}

/// Serializes the `tape` in the *TZX* format.
///
/// # Errors
/// Returns [Error::Corrupt] if any of the block's fields can't be represented.
pub fn write(tape: &Tape) -> Result<Vec<u8>> {
    let mut buf = Buffer::new();
    buf.write_bytes(SIGNATURE)?;
    buf.write_u8(MAJOR_VERSION)?;
    buf.write_u8(MINOR_VERSION)?;
    for block in tape {
        write_block(&mut buf, block)?;
    }
    Ok(buf.into_inner())
}
