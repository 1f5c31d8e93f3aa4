/*
    Copyright (C) 2020-2022  Rafal Michalski

    This file is part of SPECTAPE, a Rust library of ZX Spectrum tape formats.

    SPECTAPE is free software: you can redistribute it and/or modify it under
    the terms of the GNU Lesser General Public License (LGPL) as published
    by the Free Software Foundation, either version 3 of the License, or
    (at your option) any later version.

    SPECTAPE is distributed in the hope that it will be useful,
    but WITHOUT ANY WARRANTY; without even the implied warranty of
    MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
    GNU Lesser General Public License for more details.

    You should have received a copy of the GNU Lesser General Public License
    along with this program.  If not, see <https://www.gnu.org/licenses/>.

    Author contact information: see Cargo.toml file, section [package.authors].
*/
/*! # SPECTAPE

A library of ZX Spectrum tape and input recording formats.

* [formats]: **TAP**, **TZX** and **RZX** codecs, the tape block model with a cycle accurate
  playback engine and file type identification.
* [utils]: a tape recorder emulation.
* The core components: [error]s, [compress]ion glue, [sign]atures, playback [clock]
  configuration and the output [buffer].

```
use spectape::formats::{tap, tape::{Tape, TapeBlock, EdgeFlags}};

let mut tape = Tape::new();
tape.append(TapeBlock::rom(vec![0xFF, 0x01, 0xFE]));
let file = tap::write(&tape)?;
let mut tape = spectape::formats::tape::read(&file, Some("game.tap"))?;
let mut tstates = 0u64;
loop {
    let edge = tape.next_edge()?;
    tstates += u64::from(edge.tstates);
    if edge.flags.contains(EdgeFlags::STOP) {
        break
    }
}
assert!(tstates > 3500000);
# Ok::<(), spectape::Error>(())
```
*/
pub use spectape_core::{buffer, clock, compress, error, sign};
pub use spectape_core::{Error, ErrorKind, ReportPolicy, Result};

#[cfg(feature = "formats")]
pub use spectape_formats as formats;

#[cfg(feature = "utils")]
pub use spectape_utils as utils;

/// The version of this library.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
