/*
    Copyright (C) 2020-2022  Rafal Michalski

    This file is part of SPECTAPE, a Rust library of ZX Spectrum tape formats.

    For the full copyright notice, see the lib.rs file.
*/
/*! File type identification by the file name extension and the content signature.

```
use spectape_formats::identify::{identify, identify_class, FileType, FileClass};

assert_eq!(FileType::Tzx, identify(b"ZXTape!\x1a\x01\x14", None)?);
assert_eq!((FileType::Rzx, FileClass::Recording), identify_class(b"RZX!\x00\x0d", Some("demo.rzx"))?);
// the signature matches both the TAP and LTP files
assert_eq!(FileType::Unknown, identify(b"\x13\x00\x00", None)?);
# Ok::<(), spectape_formats::Error>(())
```
*/
use core::fmt;

#[allow(unused_imports)]
use log::debug;

use spectape_core::compress;
use crate::{Error, Result};

/// The identified type of a file.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FileType {
    Unknown,
    Rzx,
    Sna,
    Snp,
    Sp,
    Szx,
    Z80,
    Zxs,
    Slt,
    Dck,
    If2Rom,
    Mdr,
    Tap,
    Spc,
    Sta,
    Ltp,
    Tzx,
    WarajevoTap,
    Dsk,
    Scl,
    Trd,
    Bz2,
    Gz,
    Csw
}

/// The broad category of a [FileType].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FileClass {
    Unknown,
    Tape,
    Snapshot,
    Disk,
    Recording,
    Compressed,
    Cartridge,
    Microdrive
}

/// The result of [identify_deep].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Identified {
    pub file_type: FileType,
    pub class: FileClass,
    /// The decompressed content if the file was compressed.
    pub data: Option<Vec<u8>>
}

struct Signature {
    bytes: &'static [u8],
    offset: usize,
    score: u32
}

struct Entry {
    file_type: FileType,
    extension: &'static str,
    ext_score: u32,
    signature: Option<Signature>
}

macro_rules! entry {
    ($file_type:ident, $ext:literal, $es:literal) => {
        Entry { file_type: FileType::$file_type, extension: $ext, ext_score: $es, signature: None }
    };
    ($file_type:ident, $ext:literal, $es:literal, $sig:literal @ $offset:literal, $ss:literal) => {
        Entry {
            file_type: FileType::$file_type, extension: $ext, ext_score: $es,
            signature: Some(Signature { bytes: $sig, offset: $offset, score: $ss })
        }
    };
}

const TYPES: &[Entry] = &[
    entry!(Rzx,         "rzx", 3, b"RZX!" @ 0, 4),
    entry!(Sna,         "sna", 3),
    entry!(Snp,         "snp", 3),
    entry!(Sp,          "sp",  3, b"SP\0" @ 0, 1),
    entry!(Szx,         "szx", 3, b"ZXST" @ 0, 4),
    entry!(Z80,         "z80", 3, b"\0\0" @ 6, 1),
    entry!(Zxs,         "zxs", 3, b"SNAP" @ 8, 4),
    entry!(Slt,         "slt", 3, b"\0\0" @ 6, 1),
    entry!(Dck,         "dck", 3),
    entry!(If2Rom,      "rom", 3),
    entry!(Mdr,         "mdr", 3),
    entry!(Tap,         "tap", 3, b"\x13\0\0" @ 0, 1),
    entry!(Spc,         "spc", 3, b"\x11\0\0" @ 0, 1),
    entry!(Sta,         "sta", 3, b"\x11\0\0" @ 0, 1),
    entry!(Ltp,         "ltp", 3, b"\x13\0\0" @ 0, 1),
    entry!(Tzx,         "tzx", 3, b"ZXTape!\x1a" @ 0, 4),
    entry!(WarajevoTap, "tap", 2, b"\xff\xff\xff\xff" @ 8, 2),
    entry!(Dsk,         "dsk", 3, b"MV - CPC" @ 0, 4),
    entry!(Dsk,         "dsk", 3, b"EXTENDED" @ 0, 4),
    entry!(Scl,         "scl", 3, b"SINCLAIR" @ 0, 4),
    entry!(Trd,         "trd", 3),
    entry!(Bz2,         "bz2", 3, b"BZh" @ 0, 4),
    entry!(Gz,          "gz",  3, b"\x1f\x8b" @ 0, 4),
    entry!(Csw,         "csw", 2, b"Compressed Square Wave\x1a" @ 0, 4),
];

impl FileType {
    pub fn class(self) -> FileClass {
        use FileType::*;
        match self {
            Unknown => FileClass::Unknown,
            Rzx => FileClass::Recording,
            Sna|Snp|Sp|Szx|Z80|Zxs|Slt => FileClass::Snapshot,
            Dck|If2Rom => FileClass::Cartridge,
            Mdr => FileClass::Microdrive,
            Tap|Spc|Sta|Ltp|Tzx|WarajevoTap|Csw => FileClass::Tape,
            Dsk|Scl|Trd => FileClass::Disk,
            Bz2|Gz => FileClass::Compressed
        }
    }
}

impl fmt::Display for FileClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Returns the extension of the file name, lowercased.
fn extension(filename: &str) -> Option<String> {
    let name = filename.rsplit(|c| c == '/' || c == '\\').next().unwrap_or(filename);
    name.rfind('.').map(|pos| name[pos + 1..].to_ascii_lowercase())
}

fn strip_extension(filename: &str) -> &str {
    let start = filename.rfind(|c| c == '/' || c == '\\').map(|pos| pos + 1).unwrap_or(0);
    match filename[start..].rfind('.') {
        Some(pos) => &filename[..start + pos],
        None => filename
    }
}

/// Identifies the type of the file from its content and an optional file name.
///
/// Each known type scores points for a matching file name extension and a matching signature.
/// Returns [FileType::Unknown] if no type scores or more than one type scores the best.
pub fn identify(data: &[u8], filename: Option<&str>) -> Result<FileType> {
    let ext = filename.and_then(extension);
    let mut best = FileType::Unknown;
    let mut best_score = 0;
    let mut tie = false;
    for entry in TYPES {
        let mut score = 0;
        if ext.as_deref() == Some(entry.extension) {
            score += entry.ext_score;
        }
        if let Some(Signature { bytes, offset, score: sig_score }) = entry.signature {
            if data.get(offset..offset + bytes.len()) == Some(bytes) {
                score += sig_score;
            }
        }
        if score > best_score {
            best = entry.file_type;
            best_score = score;
            tie = false;
        }
        else if score == best_score && score != 0 && entry.file_type != best {
            tie = true;
        }
    }
    Ok(if tie { FileType::Unknown } else { best })
}

/// Identifies the type and the class of the file.
pub fn identify_class(data: &[u8], filename: Option<&str>) -> Result<(FileType, FileClass)> {
    let file_type = identify(data, filename)?;
    Ok((file_type, file_type.class()))
}

/// Identifies the file, decompressing compressed files until the content is not compressed.
///
/// For each decompression the last extension of the `filename` is dropped, so `game.tzx.gz` is
/// identified as `game.tzx` after decompression.
///
/// # Errors
/// Returns an error if the decompression fails or is not supported.
pub fn identify_deep(data: &[u8], filename: Option<&str>) -> Result<Identified> {
    let mut name = filename.map(str::to_owned);
    let mut unpacked: Option<Vec<u8>> = None;
    loop {
        let content = unpacked.as_deref().unwrap_or(data);
        let (file_type, class) = identify_class(content, name.as_deref())?;
        let inflated = match file_type {
            FileType::Gz => compress::gzip_inflate(content)?,
            FileType::Bz2 => return Err(Error::unknown("bzip2 decompression unsupported")),
            _ => return Ok(Identified { file_type, class, data: unpacked })
        };
        debug!("decompressed {:?} file: {} bytes", file_type, inflated.len());
        name = name.as_deref().map(|name| strip_extension(name).to_owned());
        unpacked = Some(inflated);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identify_by_signature_works() -> Result<()> {
        assert_eq!(FileType::Rzx, identify(b"RZX!\x00\x0d\x00\x00\x00\x00", None)?);
        assert_eq!(FileClass::Recording, identify_class(b"RZX!", None)?.1);
        assert_eq!(FileType::Szx, identify(b"ZXST\x01\x04", None)?);
        assert_eq!(FileType::Zxs, identify(b"FORM\0\0\0\0SNAP", None)?);
        assert_eq!(FileType::Dsk, identify(b"EXTENDED CPC DSK File", None)?);
        assert_eq!(FileType::Dsk, identify(b"MV - CPCEMU Disk-File", None)?);
        assert_eq!(FileType::Csw, identify(b"Compressed Square Wave\x1a\x02\x00", None)?);
        assert_eq!((FileType::Gz, FileClass::Compressed), identify_class(b"\x1f\x8b\x08", None)?);
        // too short for the signature
        assert_eq!(FileType::Unknown, identify(b"ZXTape!", None)?);
        assert_eq!(FileType::Unknown, identify(b"", None)?);
        Ok(())
    }

    #[test]
    fn identify_by_extension_works() -> Result<()> {
        assert_eq!(FileType::Sna, identify(&[0; 100], Some("game.sna"))?);
        assert_eq!(FileType::Tzx, identify(b"garbage", Some("/path.to/GAME.TZX"))?);
        assert_eq!(FileType::If2Rom, identify(b"", Some("cart.Rom"))?);
        assert_eq!(FileType::Unknown, identify(b"", Some("noext"))?);
        assert_eq!(FileType::Unknown, identify(b"", Some("dir.tap/noext"))?);
        assert_eq!((FileType::Mdr, FileClass::Microdrive), identify_class(b"", Some("a.mdr"))?);
        Ok(())
    }

    #[test]
    fn identify_ties_are_unknown() -> Result<()> {
        let tap = b"\x13\x00\x00\x03HELLO     \x1b\x00\x00\x80\x1b\x00\xed";
        assert_eq!(FileType::Unknown, identify(tap, None)?);
        assert_eq!(FileType::Tap, identify(tap, Some("hello.tap"))?);
        assert_eq!(FileType::Ltp, identify(tap, Some("hello.ltp"))?);
        assert_eq!(FileType::Unknown, identify(b"\x11\x00\x00", None)?);
        assert_eq!(FileType::Sta, identify(b"\x11\x00\x00", Some("x.sta"))?);
        // the signature of a z80 snapshot and a slt file are the same
        assert_eq!(FileType::Unknown, identify(&[0; 30], None)?);
        let warajevo = b"\x00\x00\x00\x00\x00\x00\x00\x00\xff\xff\xff\xff";
        assert_eq!(FileType::WarajevoTap, identify(warajevo, Some("w.tap"))?);
        Ok(())
    }

    #[test]
    fn strip_extension_works() {
        assert_eq!("game.tzx", strip_extension("game.tzx.gz"));
        assert_eq!("dir.x/game", strip_extension("dir.x/game"));
        assert_eq!("c:\\a.b\\game", strip_extension("c:\\a.b\\game.gz"));
        assert_eq!(Some("gz".to_string()), extension("A.GZ"));
        assert_eq!(None, extension("a.b/c"));
    }

    #[cfg(feature = "compression")]
    #[test]
    fn identify_deep_works() -> Result<()> {
        let tzx = b"ZXTape!\x1a\x01\x14";
        let packed = compress::gzip_deflate(tzx)?;
        let ident = identify_deep(&packed, Some("game.tzx.gz"))?;
        assert_eq!(FileType::Tzx, ident.file_type);
        assert_eq!(FileClass::Tape, ident.class);
        assert_eq!(Some(&tzx[..]), ident.data.as_deref());
        let twice = compress::gzip_deflate(&packed)?;
        let ident = identify_deep(&twice, None)?;
        assert_eq!(FileType::Tzx, ident.file_type);
        // the extension of the inner file tips the scales
        let packed = compress::gzip_deflate(b"\x13\x00\x00")?;
        assert_eq!(FileType::Ltp, identify_deep(&packed, Some("x.ltp.gz"))?.file_type);
        let ident = identify_deep(tzx, None)?;
        assert_eq!(None, ident.data);
        assert!(identify_deep(b"\x1f\x8bjunk", None).unwrap_err().is_corrupt());
        Ok(())
    }

    #[test]
    fn identify_deep_bzip2_is_unknown() {
        let err = identify_deep(b"BZh91AY&SY", None).unwrap_err();
        assert_eq!(crate::ErrorKind::Unknown, err.kind());
    }
}
