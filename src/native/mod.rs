//! Abstraction layer for Native functions and types
//!
//! This module interacts with the Windows native functions and should abstract all `unsafe` calls.
//! Only [`time`] and the error type are available on every target.
use std::fmt;

#[cfg(windows)]
pub mod etw_types;
#[cfg(windows)]
pub mod evntrace;
#[cfg(windows)]
pub mod instance_mutex;
pub mod time;
#[cfg(windows)]
pub mod tracer_dll;

/// Errors reported by the native collector, the converter or the OS trace API
#[derive(Debug)]
pub enum NativeError {
    /// The tracer library could not be loaded
    LibraryUnavailable(String),
    /// The tracer library does not export an expected entry point
    EntryPointMissing(&'static str),
    /// A native call returned a non-zero status
    Status { call: &'static str, code: i32 },
    /// A delegate panicked while being called
    Panicked(String),
    /// Represents an standard IO Error
    IoError(std::io::Error),
}

impl From<std::io::Error> for NativeError {
    fn from(err: std::io::Error) -> Self {
        NativeError::IoError(err)
    }
}

impl fmt::Display for NativeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NativeError::LibraryUnavailable(lib) => write!(f, "unable to load {}", lib),
            NativeError::EntryPointMissing(name) => write!(f, "entry point {} is missing", name),
            NativeError::Status { call, code } => write!(f, "{} returned {}", call, code),
            NativeError::Panicked(msg) => write!(f, "native delegate panicked: {}", msg),
            NativeError::IoError(err) => write!(f, "{}", err),
        }
    }
}

impl std::error::Error for NativeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            NativeError::IoError(err) => Some(err),
            _ => None,
        }
    }
}

pub type NativeResult<T> = Result<T, NativeError>;

/// Maps a tracer status code (`0` meaning success) to a [`NativeResult`]
pub(crate) fn check_status(call: &'static str, code: i32) -> NativeResult<()> {
    match code {
        0 => Ok(()),
        code => Err(NativeError::Status { call, code }),
    }
}

/// Extracts a readable message out of a `catch_unwind` payload
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        String::from("<non-string panic payload>")
    }
}
