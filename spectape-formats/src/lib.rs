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
//! ZX Spectrum tape and input recording file formats.
// http://www.worldofspectrum.org/faq/reference/formats.htm
// http://www.worldofspectrum.org/TZXformat.html
// https://worldofspectrum.net/RZXformat.html
pub mod identify;
pub mod rzx;
pub mod tap;
pub mod tape;
pub mod tzx;

mod parse;

pub use spectape_core::error::{Error, ErrorKind, Result};
