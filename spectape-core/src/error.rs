/*
    Copyright (C) 2020-2022  Rafal Michalski

    This file is part of SPECTAPE, a Rust library of ZX Spectrum tape formats.

    For the full copyright notice, see the lib.rs file.
*/
//! Error types shared by all SPECTAPE crates.
use core::fmt;
use std::io;

use log::error;
use thiserror::Error;

/// The type of the error returned by codecs, containers and utilities of this library.
#[derive(Error, Debug)]
pub enum Error {
    /// Memory could not be allocated.
    #[error("out of memory")]
    OutOfMemory,
    /// The data does not conform to the expected structure.
    #[error("corrupt data: {0}")]
    Corrupt(String),
    /// The cryptographic signature did not match the data.
    #[error("signature does not match")]
    Signature,
    /// An unrecognized format variant or a missing codec.
    #[error("unknown or unsupported: {0}")]
    Unknown(String),
    /// An internal invariant was broken.
    #[error("logic error: {0}")]
    Logic(String),
    /// An error from an underlying reader or writer.
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// The class of an [Error].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    OutOfMemory,
    Corrupt,
    Signature,
    Unknown,
    Logic,
    Io
}

pub type Result<T> = core::result::Result<T, Error>;

impl Error {
    /// Creates a [Error::Corrupt] from anything that displays.
    pub fn corrupt<S: fmt::Display>(msg: S) -> Self {
        Error::Corrupt(msg.to_string())
    }
    /// Creates a [Error::Unknown] from anything that displays.
    pub fn unknown<S: fmt::Display>(msg: S) -> Self {
        Error::Unknown(msg.to_string())
    }
    /// Creates a [Error::Logic] from anything that displays.
    pub fn logic<S: fmt::Display>(msg: S) -> Self {
        Error::Logic(msg.to_string())
    }
    /// Returns the class of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::OutOfMemory => ErrorKind::OutOfMemory,
            Error::Corrupt(..) => ErrorKind::Corrupt,
            Error::Signature => ErrorKind::Signature,
            Error::Unknown(..) => ErrorKind::Unknown,
            Error::Logic(..) => ErrorKind::Logic,
            Error::Io(..) => ErrorKind::Io,
        }
    }
    /// Returns `true` if the error indicates malformed data.
    pub fn is_corrupt(&self) -> bool {
        matches!(self, Error::Corrupt(..))
    }
    /// Returns `true` if the error is a signature mismatch.
    pub fn is_signature(&self) -> bool {
        matches!(self, Error::Signature)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ErrorKind::OutOfMemory => "out of memory",
            ErrorKind::Corrupt => "corrupt",
            ErrorKind::Signature => "signature",
            ErrorKind::Unknown => "unknown",
            ErrorKind::Logic => "logic",
            ErrorKind::Io => "i/o",
        })
    }
}

impl From<std::collections::TryReserveError> for Error {
    fn from(_: std::collections::TryReserveError) -> Self {
        Error::OutOfMemory
    }
}

impl From<Error> for io::Error {
    fn from(err: Error) -> Self {
        match err {
            Error::Io(err) => err,
            e @ Error::OutOfMemory => io::Error::new(io::ErrorKind::OutOfMemory, e),
            e @ Error::Unknown(..) => io::Error::new(io::ErrorKind::Unsupported, e),
            e @ Error::Logic(..) => io::Error::new(io::ErrorKind::Other, e),
            e => io::Error::new(io::ErrorKind::InvalidData, e)
        }
    }
}

/// Decides what happens with errors passed through [ReportPolicy::report].
///
/// Errors are always logged with [log::error!]. If `abort_on_logic` is `true`,
/// errors of the [ErrorKind::Logic] class panic instead of being returned.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReportPolicy {
    pub abort_on_logic: bool
}

impl ReportPolicy {
    /// A policy that panics on logic errors.
    pub const STRICT: ReportPolicy = ReportPolicy { abort_on_logic: true };

    /// Logs the error and returns it back to the caller, or panics on a logic error
    /// when the policy demands it.
    pub fn report(&self, err: Error) -> Error {
        error!("{}", err);
        if self.abort_on_logic && err.kind() == ErrorKind::Logic {
            panic!("{}", err);
        }
        err
    }
    /// Reports the error of a `Result` if there is one.
    pub fn check<T>(&self, res: Result<T>) -> Result<T> {
        res.map_err(|e| self.report(e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_kinds_work() {
        assert_eq!(ErrorKind::Corrupt, Error::corrupt("bad").kind());
        assert_eq!("corrupt data: bad", Error::corrupt("bad").to_string());
        assert_eq!(ErrorKind::Signature, Error::Signature.kind());
        assert!(Error::Signature.is_signature());
        assert!(!Error::Signature.is_corrupt());
        let err: io::Error = Error::unknown("zip").into();
        assert_eq!(io::ErrorKind::Unsupported, err.kind());
        let err: io::Error = Error::corrupt("x").into();
        assert_eq!(io::ErrorKind::InvalidData, err.kind());
        let err: Error = io::Error::new(io::ErrorKind::UnexpectedEof, "eof").into();
        assert_eq!(ErrorKind::Io, err.kind());
    }

    #[test]
    fn report_policy_works() {
        let policy = ReportPolicy::default();
        let err = policy.report(Error::logic("unreachable"));
        assert_eq!(ErrorKind::Logic, err.kind());
        assert!(policy.check::<()>(Err(Error::OutOfMemory)).is_err());
        assert_eq!(1, ReportPolicy::STRICT.check(Ok(1)).unwrap());
        let err = ReportPolicy::STRICT.report(Error::corrupt("not a logic error"));
        assert!(err.is_corrupt());
    }

    #[test]
    #[should_panic]
    fn report_policy_aborts_on_logic() {
        ReportPolicy::STRICT.report(Error::logic("broken"));
    }
}
