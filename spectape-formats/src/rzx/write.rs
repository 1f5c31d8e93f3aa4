/*
    Copyright (C) 2020-2022  Rafal Michalski

    This file is part of SPECTAPE, a Rust library of ZX Spectrum tape formats.

    For the full copyright notice, see the lib.rs file.
*/
use core::convert::TryFrom;
use std::time::{SystemTime, UNIX_EPOCH};

#[allow(unused_imports)]
use log::{debug, warn};

use spectape_core::buffer::Buffer;
use spectape_core::compress;
use spectape_core::sign::{self, PrivateKey};
use crate::{Error, Result};
use super::*;

const SECONDS_PER_WEEK: u64 = 7 * 24 * 60 * 60;

/// Options of [write].
#[derive(Clone, Copy, Debug)]
pub struct WriteOptions<'a> {
    /// Compress snapshots and input blocks if that makes them smaller.
    pub compress: bool,
    /// Sign the file with the given key ID and private key.
    pub sign: Option<(u32, &'a PrivateKey)>,
    /// Overrides the creator of the recording.
    pub creator: Option<&'a Creator>
}

impl Default for WriteOptions<'_> {
    fn default() -> Self {
        WriteOptions { compress: compress::is_available(), sign: None, creator: None }
    }
}

impl<'a> WriteOptions<'a> {
    pub fn uncompressed() -> Self {
        WriteOptions { compress: false, ..WriteOptions::default() }
    }

    pub fn signed(key_id: u32, key: &'a PrivateKey) -> Self {
        WriteOptions { sign: Some((key_id, key)), ..WriteOptions::default() }
    }
}

/// Writes a block with its length patched after the body is written by `f`.
fn write_block<F>(buf: &mut Buffer, id: u8, f: F) -> Result<()>
    where F: FnOnce(&mut Buffer) -> Result<()>
{
    let start = buf.len();
    buf.write_u8(id)?;
    buf.write_u32_le(0)?;
    f(buf)?;
    let len = u32::try_from(buf.len() - start)
                  .map_err(|_| Error::corrupt(format_args!("RZX: block 0x{:02x} too long", id)))?;
    buf.patch_u32_le(start + 1, len);
    Ok(())
}

fn write_fixed_str(buf: &mut Buffer, text: &str, size: usize) -> Result<()> {
    let bytes = text.as_bytes();
    let len = bytes.len().min(size);
    if len < bytes.len() {
        warn!("RZX: {:?} truncated to {} bytes", text, size);
    }
    buf.write_bytes(&bytes[..len])?;
    (len..size).try_for_each(|_| buf.write_u8(0))
}
/// Returns the compressed `data` if compression was requested and made it smaller.
fn maybe_compress(data: &[u8], pack: bool) -> Result<Option<Vec<u8>>> {
    if !pack {
        return Ok(None)
    }
    if !compress::is_available() {
        warn!("RZX: compression is not available, writing uncompressed data");
        return Ok(None)
    }
    let packed = compress::zlib_deflate(data)?;
    Ok(if packed.len() < data.len() { Some(packed) } else { None })
}

fn write_creator(buf: &mut Buffer, creator: &Creator) -> Result<()> {
    write_block(buf, CREATOR_BLOCK, |buf| {
        write_fixed_str(buf, &creator.name, 20)?;
        buf.write_u16_le(creator.major)?;
        buf.write_u16_le(creator.minor)?;
        buf.write_bytes(&creator.custom)
    })
}

fn write_snapshot(buf: &mut Buffer, snapshot: &Snapshot, pack: bool) -> Result<()> {
    let packed = if snapshot.external { None } else { maybe_compress(&snapshot.data, pack)? };
    let length = u32::try_from(snapshot.data.len())
                     .map_err(|_| Error::corrupt("RZX: snapshot too large"))?;
    write_block(buf, SNAPSHOT_BLOCK, |buf| {
        let mut flags = 0;
        if snapshot.external {
            flags |= SNAPSHOT_EXTERNAL;
        }
        if packed.is_some() {
            flags |= SNAPSHOT_COMPRESSED;
        }
        buf.write_u32_le(flags)?;
        write_fixed_str(buf, &snapshot.extension, 4)?;
        buf.write_u32_le(length)?;
        buf.write_bytes(packed.as_deref().unwrap_or(&snapshot.data[..]))
    })
}

fn write_frames(buf: &mut Buffer, frames: &[Frame]) -> Result<()> {
    for frame in frames {
        buf.write_u16_le(frame.instructions)?;
        if frame.repeat_last {
            buf.write_u16_le(REPEAT_LAST)?;
        }
        else {
            let count = u16::try_from(frame.input.len()).ok().filter(|&n| n != REPEAT_LAST)
                        .ok_or_else(|| Error::corrupt(format_args!(
                            "RZX: too many input bytes in a frame: {}", frame.input.len())))?;
            buf.write_u16_le(count)?;
            buf.write_bytes(&frame.input)?;
        }
    }
    Ok(())
}

fn write_input(buf: &mut Buffer, input: &InputBlock, pack: bool) -> Result<()> {
    let mut frames = Buffer::new();
    write_frames(&mut frames, &input.frames)?;
    let packed = maybe_compress(frames.as_slice(), pack)?;
    let num_frames = u32::try_from(input.frames.len())
                         .map_err(|_| Error::corrupt("RZX: too many frames"))?;
    write_block(buf, INPUT_BLOCK, |buf| {
        buf.write_u32_le(num_frames)?;
        buf.write_u8(0)?;
        buf.write_u32_le(input.tstates)?;
        buf.write_u32_le(if packed.is_some() { INPUT_COMPRESSED } else { 0 })?;
        buf.write_bytes(packed.as_deref().unwrap_or(frames.as_slice()))
    })
}

fn current_week() -> u32 {
    SystemTime::now().duration_since(UNIX_EPOCH)
                     .map(|d| (d.as_secs() / SECONDS_PER_WEEK) as u32)
                     .unwrap_or(0)
}

/// Serializes the recording in the *RZX* format.
///
/// Signature blocks of the recording are not written. A new signature is created instead
/// if [WriteOptions::sign] is given.
///
/// # Errors
/// Returns [Error::Corrupt] if any of the block's fields can't be represented.
pub fn write(rzx: &Rzx, options: &WriteOptions<'_>) -> Result<Vec<u8>> {
    let mut buf = Buffer::new();
    buf.write_bytes(SIGNATURE)?;
    buf.write_u8(MAJOR_VERSION)?;
    buf.write_u8(MINOR_VERSION)?;
    buf.write_u32_le(if options.sign.is_some() { FLAG_SIGNED } else { 0 })?;
    write_creator(&mut buf, options.creator.unwrap_or(&rzx.creator))?;
    if let Some((key_id, _)) = options.sign {
        write_block(&mut buf, SIGN_START_BLOCK, |buf| {
            buf.write_u32_le(key_id)?;
            buf.write_u32_le(current_week())
        })?;
    }
    for block in rzx.blocks() {
        match block {
            RzxBlock::Input(input) => write_input(&mut buf, input, options.compress)?,
            RzxBlock::Snapshot(snapshot) => write_snapshot(&mut buf, snapshot, options.compress)?,
            RzxBlock::Sign(..) => debug!("RZX: skipping the old signature")
        }
    }
    if let Some((key_id, key)) = options.sign {
        debug!("RZX: signing {} bytes with the key {:08x}", buf.len(), key_id);
        let signature = sign::sign(buf.as_slice(), key)?;
        write_block(&mut buf, SIGN_END_BLOCK, |buf| buf.write_bytes(&signature))?;
    }
    Ok(buf.into_inner())
}

#[cfg(test)]
mod tests {
    use spectape_core::sign::test_keys::test_private_key;
    use crate::ErrorKind;
    use super::super::tests::test_recording;
    use super::*;

    #[test]
    fn rzx_write_read_works() -> Result<()> {
        let rzx = test_recording();
        for &pack in [false, true].iter() {
            let options = WriteOptions { compress: pack && compress::is_available(), ..WriteOptions::default() };
            let file = write(&rzx, &options)?;
            assert_eq!(b"RZX!\x00\x0d\x00\x00\x00\x00", &file[..10]);
            assert_eq!(CREATOR_BLOCK, file[10]);
            assert_eq!(b"SPECTAPE\0\0\0\0\0\0\0\0\0\0\0\0\x00\x00\x01\x00", &file[15..39]);
            let rzx2 = read(&file)?;
            assert_eq!(rzx.creator, rzx2.creator);
            assert_eq!(rzx.blocks(), rzx2.blocks());
            assert_eq!(None, rzx2.signed_by());
            if options.compress {
                assert!(file.len() < 1000);
            }
            else {
                assert!(file.len() > 1000);
            }
        }
        Ok(())
    }

    #[test]
    fn rzx_write_options_work() -> Result<()> {
        let mut rzx = Rzx::new();
        rzx.add_snapshot(Snapshot { extension: "z80".into(), external: true, data: vec![7; 100].into() });
        rzx.start_input(3);
        rzx.store_frame(1, &[1])?;
        let creator = Creator { name: "A very long creator name".into(), major: 1, minor: 2,
                                custom: vec![9, 9].into() };
        let options = WriteOptions { creator: Some(&creator), ..WriteOptions::default() };
        let rzx2 = read(&write(&rzx, &options)?)?;
        assert_eq!("A very long creator ", rzx2.creator.name);
        assert_eq!((1, 2), (rzx2.creator.major, rzx2.creator.minor));
        assert_eq!(&[9, 9], &*rzx2.creator.custom);
        assert_eq!(rzx.blocks(), rzx2.blocks());
        let rzx3 = read(&write(&rzx2, &WriteOptions::uncompressed())?)?;
        assert_eq!(rzx2, rzx3);
        Ok(())
    }

    #[test]
    fn rzx_read_errors() -> Result<()> {
        let file = write(&test_recording(), &WriteOptions::uncompressed())?;
        let mut boundaries = vec![10];
        let mut offset = 10;
        while offset < file.len() {
            offset += u32::from_le_bytes([file[offset + 1], file[offset + 2],
                                          file[offset + 3], file[offset + 4]]) as usize;
            boundaries.push(offset);
        }
        assert_eq!(Some(&file.len()), boundaries.last());
        for len in 0..file.len() {
            match read(&file[..len]) {
                Ok(..) => assert!(boundaries.contains(&len), "truncated at {}", len),
                Err(e) => {
                    assert!(!boundaries.contains(&len), "truncated at {}: {}", len, e);
                    assert!(e.is_corrupt(), "truncated at {}: {}", len, e);
                }
            }
        }
        assert!(read(b"RZY!\x00\x0d\x00\x00\x00\x00").unwrap_err().is_corrupt());
        assert_eq!(ErrorKind::Unknown, read(b"RZX!\x01\x00\x00\x00\x00\x00").unwrap_err().kind());
        assert!(read(b"RZX!\x00\x0d\x00\x00\x00\x00\x10\x04\x00\x00\x00").unwrap_err().is_corrupt());
        // unknown blocks are skipped
        let rzx = read(b"RZX!\x00\x0d\x00\x00\x00\x00\x77\x07\x00\x00\x00\xaa\xbb")?;
        assert!(rzx.is_empty());
        // repeat on the first frame
        let mut file = b"RZX!\x00\x0d\x00\x00\x00\x00".to_vec();
        file.extend_from_slice(b"\x80\x16\x00\x00\x00\x01\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x01\x00\xff\xff");
        assert!(read(&file).unwrap_err().is_corrupt());
        // snapshot length mismatch
        let mut file = b"RZX!\x00\x0d\x00\x00\x00\x00".to_vec();
        file.extend_from_slice(b"\x30\x13\x00\x00\x00\x00\x00\x00\x00sna\x00\x03\x00\x00\x00\x01\x02");
        assert!(read(&file).unwrap_err().is_corrupt());
        Ok(())
    }

    #[test]
    fn rzx_signatures_work() -> Result<()> {
        let key = test_private_key()?;
        let public = key.public_key();
        let rzx = test_recording();
        let file = write(&rzx, &WriteOptions::signed(0x1234_5678, &key))?;
        assert_eq!(FLAG_SIGNED, u32::from_le_bytes([file[6], file[7], file[8], file[9]]));
        let rzx2 = read_verified(&file, &public)?;
        assert_eq!(Some(0x1234_5678), rzx2.signed_by());
        let info = rzx2.sign_info().unwrap();
        assert_eq!(SIGN_END_BLOCK, file[info.signed_len]);
        assert!(info.week > 2500);
        // re-signing replaces the old signature
        let file2 = write(&rzx2, &WriteOptions::signed(0xABCD, &key))?;
        assert_eq!(Some(0xABCD), read_verified(&file2, &public)?.signed_by());
        // an unsigned file passes
        read_verified(&write(&rzx2, &WriteOptions::default())?, &public)?;
        for pos in [0, 5, 10, 40, 100, info.signed_len - 1].iter().copied() {
            let mut tampered = file.clone();
            tampered[pos] ^= 0x01;
            match read_verified(&tampered, &public) {
                Err(e) => assert!(e.is_signature() || e.is_corrupt(), "at {}: {}", pos, e),
                Ok(..) => panic!("tampering at {} went unnoticed", pos)
            }
        }
        let mut tampered = file.clone();
        let last = tampered.len() - 1;
        tampered[last] ^= 0x01;
        assert!(read_verified(&tampered, &public).unwrap_err().is_signature());
        Ok(())
    }

    #[test]
    fn rzx_stripped_signature_fails_verification() -> Result<()> {
        let key = test_private_key()?;
        let public = key.public_key();
        let options = WriteOptions { compress: false, ..WriteOptions::signed(7, &key) };
        let file = write(&test_recording(), &options)?;
        let mut stripped = file[..10].to_vec();
        let mut offset = 10;
        while offset < file.len() {
            let len = u32::from_le_bytes([file[offset + 1], file[offset + 2],
                                          file[offset + 3], file[offset + 4]]) as usize;
            if file[offset] != SIGN_START_BLOCK && file[offset] != SIGN_END_BLOCK {
                stripped.extend_from_slice(&file[offset..offset + len]);
            }
            offset += len;
        }
        assert!(stripped.len() < file.len());
        assert_eq!(FLAG_SIGNED, u32::from_le_bytes([stripped[6], stripped[7], stripped[8], stripped[9]]));
        let rzx = read(&stripped)?;
        assert_eq!(None, rzx.signed_by());
        assert_eq!(test_recording().blocks(), rzx.blocks());
        assert!(read_verified(&stripped, &public).unwrap_err().is_signature());
        Ok(())
    }

    #[test]
    fn rzx_compressed_input_reads_back() -> Result<()> {
        if !compress::is_available() {
            return Ok(())
        }
        let mut rzx = Rzx::new();
        rzx.start_input(0);
        for i in 0..200u16 {
            rzx.store_frame(i, &[(i & 1) as u8; 40])?;
        }
        rzx.stop_input();
        let file = write(&rzx, &WriteOptions::default())?;
        let flags_at = 10 + u32::from_le_bytes([file[11], file[12], file[13], file[14]]) as usize + 14;
        assert_eq!(INPUT_BLOCK, file[flags_at - 14]);
        assert_eq!(INPUT_COMPRESSED, u32::from_le_bytes([file[flags_at], file[flags_at + 1],
                                                         file[flags_at + 2], file[flags_at + 3]]));
        assert!(file.len() < 200 * 40 / 4);
        assert_eq!(rzx.blocks(), read(&file)?.blocks());
        Ok(())
    }
}
