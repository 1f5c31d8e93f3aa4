/*
    Copyright (C) 2020-2022  Rafal Michalski

    This file is part of SPECTAPE, a Rust library of ZX Spectrum tape formats.

    For the full copyright notice, see the lib.rs file.
*/
//! Glue for the black-box compression codecs.
//!
//! Without the `compression` feature each function returns [Error::Unknown].
#[allow(unused_imports)]
use crate::error::{Error, Result};

#[cfg(feature = "compression")]
mod imp {
    use std::io::{Read, Write};
    use flate2::{Compression, Decompress, FlushDecompress, Status};
    use flate2::read::GzDecoder;
    use flate2::write::{GzEncoder, ZlibEncoder};
    use super::*;

    /// The limit of the output buffer reserved before inflating.
    const MAX_RESERVE: usize = 1 << 20;

    pub fn zlib_inflate(data: &[u8], expected: Option<usize>) -> Result<Vec<u8>> {
        let mut dec = Decompress::new(true);
        let mut out = Vec::new();
        let reserve = expected.unwrap_or(data.len() * 2).min(MAX_RESERVE).max(64);
        out.try_reserve_exact(reserve)?;
        loop {
            if out.len() == out.capacity() {
                out.try_reserve(out.capacity())?;
            }
            let (total_in, total_out) = (dec.total_in(), dec.total_out());
            let input = &data[total_in as usize..];
            let status = dec.decompress_vec(input, &mut out, FlushDecompress::None)
                            .map_err(|e| Error::corrupt(format_args!("zlib stream: {}", e)))?;
            if let Status::StreamEnd = status {
                break
            }
            if dec.total_in() == total_in && dec.total_out() == total_out {
                return Err(Error::corrupt("zlib stream: unexpected end of data"))
            }
            match expected {
                Some(size) if out.len() > size => return Err(Error::corrupt(format_args!(
                    "zlib stream: more than {} bytes were declared", size))),
                _ => {}
            }
        }
        Ok(out)
    }

    pub fn zlib_deflate(data: &[u8]) -> Result<Vec<u8>> {
        let mut enc = ZlibEncoder::new(Vec::new(), Compression::best());
        enc.write_all(data)?;
        Ok(enc.finish()?)
    }

    pub fn gzip_inflate(data: &[u8]) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        GzDecoder::new(data).read_to_end(&mut out)
                            .map_err(|e| Error::corrupt(format_args!("gzip stream: {}", e)))?;
        Ok(out)
    }

    pub fn gzip_deflate(data: &[u8]) -> Result<Vec<u8>> {
        let mut enc = GzEncoder::new(Vec::new(), Compression::default());
        enc.write_all(data)?;
        Ok(enc.finish()?)
    }
}

#[cfg(not(feature = "compression"))]
mod imp {
    use super::*;

    fn disabled() -> Error {
        Error::unknown("compression support disabled")
    }

    pub fn zlib_inflate(_data: &[u8], _expected: Option<usize>) -> Result<Vec<u8>> {
        Err(disabled())
    }

    pub fn zlib_deflate(_data: &[u8]) -> Result<Vec<u8>> {
        Err(disabled())
    }

    pub fn gzip_inflate(_data: &[u8]) -> Result<Vec<u8>> {
        Err(disabled())
    }

    pub fn gzip_deflate(_data: &[u8]) -> Result<Vec<u8>> {
        Err(disabled())
    }
}

/// Decompresses a zlib stream.
///
/// If `expected` is given, exactly that number of bytes must be produced,
/// otherwise [Error::Corrupt] is returned.
pub fn zlib_inflate(data: &[u8], expected: Option<usize>) -> Result<Vec<u8>> {
    let out = imp::zlib_inflate(data, expected)?;
    match expected {
        Some(size) if size != out.len() => Err(Error::corrupt(format_args!(
            "decompressed {} bytes while {} bytes were declared", out.len(), size))),
        _ => Ok(out)
    }
}

/// Compresses data as a zlib stream.
pub fn zlib_deflate(data: &[u8]) -> Result<Vec<u8>> {
    imp::zlib_deflate(data)
}

/// Decompresses a gzip file.
pub fn gzip_inflate(data: &[u8]) -> Result<Vec<u8>> {
    imp::gzip_inflate(data)
}

/// Compresses data as a gzip file.
pub fn gzip_deflate(data: &[u8]) -> Result<Vec<u8>> {
    imp::gzip_deflate(data)
}

/// Returns `true` if the library was built with the compression codecs.
pub const fn is_available() -> bool {
    cfg!(feature = "compression")
}

#[cfg(all(test, feature = "compression"))]
mod tests {
    use super::*;

    #[test]
    fn zlib_works() -> Result<()> {
        let data: Vec<u8> = (0..1000u32).map(|x| (x % 7) as u8).collect();
        let packed = zlib_deflate(&data)?;
        assert!(packed.len() < data.len());
        assert_eq!(data, zlib_inflate(&packed, Some(1000))?);
        assert_eq!(data, zlib_inflate(&packed, None)?);
        let packed = zlib_deflate(&[0x5A;1000])?;
        assert!(packed.len() * 2 < 1000);
        assert_eq!(vec![0x5A;1000], zlib_inflate(&packed, None)?);
        assert_eq!(vec![0x5A;1000], zlib_inflate(&packed, Some(1000))?);
        assert!(zlib_inflate(&packed, Some(100)).unwrap_err().is_corrupt());
        let large = zlib_deflate(&vec![0;3 << 20])?;
        assert_eq!(3 << 20, zlib_inflate(&large, None)?.len());
        assert_eq!(3 << 20, zlib_inflate(&large, Some(3 << 20))?.len());
        let packed = zlib_deflate(&data)?;
        assert!(zlib_inflate(&packed, Some(999)).unwrap_err().is_corrupt());
        assert!(zlib_inflate(&packed[..packed.len() - 6], None).unwrap_err().is_corrupt());
        assert!(zlib_inflate(b"not zlib", None).unwrap_err().is_corrupt());
        Ok(())
    }

    #[test]
    fn gzip_works() -> Result<()> {
        let packed = gzip_deflate(b"ZXTape!\x1a\x01\x14")?;
        assert_eq!(b"\x1f\x8b", &packed[..2]);
        assert_eq!(b"ZXTape!\x1a\x01\x14", &gzip_inflate(&packed)?[..]);
        assert!(gzip_inflate(b"\x1f\x8bjunk").unwrap_err().is_corrupt());
        Ok(())
    }
}
