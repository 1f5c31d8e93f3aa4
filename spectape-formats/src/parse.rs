/*
    Copyright (C) 2020-2022  Rafal Michalski

    This file is part of SPECTAPE, a Rust library of ZX Spectrum tape formats.

    For the full copyright notice, see the lib.rs file.
*/
//! Shared bits of the binary parsers.
use core::fmt::Write;

use nom::bytes::complete::take;
use nom::combinator::flat_map;
use nom::error::{ContextError, ErrorKind, ParseError};
use nom::{Err, IResult, Offset, Parser, ToUsize};

use spectape_core::error::Error;

/****************************************************************************/
/*                        OM NOM NOM NOM NOM NOM NOM                        */
/****************************************************************************/
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct VerboseBytesError<'a> {
    errors: Vec<(&'a [u8], VerboseBytesErrorKind)>,
}

#[derive(Clone, Debug, PartialEq)]
/// error context for `VerboseBytesError`
enum VerboseBytesErrorKind {
    /// static string added by the `context` function
    Context(&'static str),
    /// error kind given by various nom parsers
    Nom(ErrorKind),
}

pub(crate) type PResult<'a, O> = IResult<&'a [u8], O, VerboseBytesError<'a>>;

impl<'a> VerboseBytesError<'a> {
    /// Renders the error trace with offsets relative to `input`.
    pub fn describe(&self, input: &'a [u8]) -> String {
        let mut res = String::new();
        for (i, (subs, kind)) in self.errors.iter().enumerate() {
            let offset = input.offset(subs);
            let _ = match kind {
                VerboseBytesErrorKind::Context(s) => writeln!(&mut res,
                    "{i}: at byte {offset} of {len}, {context}",
                    i = i,
                    context = s,
                    len = input.len(),
                    offset = offset
                ),
                VerboseBytesErrorKind::Nom(e) => writeln!(&mut res,
                    "{i}: at byte {offset} of {len}, in {nom_err:?}",
                    i = i,
                    len = input.len(),
                    offset = offset,
                    nom_err = e
                ),
            };
        }
        res.truncate(res.trim_end().len());
        res
    }
}

impl<'a> ParseError<&'a [u8]> for VerboseBytesError<'a> {
    fn from_error_kind(input: &'a [u8], kind: ErrorKind) -> Self {
        VerboseBytesError {
            errors: vec![(input, VerboseBytesErrorKind::Nom(kind))],
        }
    }

    fn append(input: &'a [u8], kind: ErrorKind, mut other: Self) -> Self {
        other.errors.push((input, VerboseBytesErrorKind::Nom(kind)));
        other
    }
}

impl<'a> ContextError<&'a [u8]> for VerboseBytesError<'a> {
    fn add_context(input: &'a [u8], ctx: &'static str, mut other: Self) -> Self {
        other.errors.push((input, VerboseBytesErrorKind::Context(ctx)));
        other
    }
}

/// Converts a parser error into [Error::Corrupt] describing where parsing of `input` failed.
pub(crate) fn corrupt<'a>(what: &str, input: &'a [u8], err: Err<VerboseBytesError<'a>>) -> Error {
    match err {
        Err::Error(e)|Err::Failure(e) => {
            Error::corrupt(format_args!("{}:\n{}", what, e.describe(input)))
        }
        Err::Incomplete(..) => Error::corrupt(format_args!("{}: unexpected end of data", what))
    }
}

/// Creates a failure with the context message at the given position.
pub(crate) fn fail<'a, O>(input: &'a [u8], ctx: &'static str) -> PResult<'a, O> {
    Err(Err::Failure(VerboseBytesError::add_context(input, ctx,
        VerboseBytesError::from_error_kind(input, ErrorKind::Verify))))
}

/// Takes as many bytes as the number parsed by `len` says.
pub(crate) fn sized<'a, N, F>(len: F) -> impl FnMut(&'a [u8]) -> PResult<'a, &'a [u8]>
    where N: ToUsize, F: Parser<&'a [u8], N, VerboseBytesError<'a>>
{
    flat_map(len, take)
}

#[cfg(test)]
mod tests {
    use nom::error::context;
    use nom::number::complete::le_u16;
    use super::*;

    #[test]
    fn sized_and_describe_works() {
        let data = [3u8, 0, b'a', b'b'];
        let res: PResult<&[u8]> = context("payload", sized(le_u16))(&data);
        let err = corrupt("test block", &data, res.unwrap_err());
        assert!(err.is_corrupt());
        assert_eq!("corrupt data: test block:\n0: at byte 2 of 4, in Eof\n1: at byte 0 of 4, payload",
                   err.to_string());
        let data = [2u8, 0, b'a', b'b', 1];
        let res: PResult<&[u8]> = sized(le_u16)(&data);
        assert_eq!(Ok((&[1u8][..], &b"ab"[..])), res);
    }
}
