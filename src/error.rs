//! Error definitions shared across library modules.
//! Each type models a specific failure scenario (payload encoding,
//! payload decoding, flash programming, etc.).
use thiserror_no_std::Error;

#[derive(Error, Debug, PartialEq, Eq)]
/// Errors that can occur while serializing a message payload.
pub enum EncodeError {
    /// Provided buffer is too small for the payload.
    #[error("Buffer too small")]
    BufferTooSmall,
    /// A variable-length field exceeds its wire capacity.
    #[error("Field {field} exceeds its wire capacity")]
    Oversize { field: &'static str },
}

#[derive(Error, Debug, PartialEq, Eq)]
/// Errors raised while decoding a received payload into a message.
pub enum DecodeError {
    /// Payload is shorter than the fixed leading fields.
    #[error("Payload truncated")]
    Truncated,
    /// A variable-length field overruns the payload or its capacity.
    #[error("Invalid variable field length")]
    BadLength,
}

#[derive(Error, Debug)]
/// Outcome of appending a chunk to flash through the sequential writer.
///
/// `Erase` and `Write` carry the device error and are transient: the
/// caller must retry the same chunk without advancing the commit
/// cursor. `ImageTooBig` is fatal.
pub enum AppendError<E: core::fmt::Debug> {
    /// The image overruns the end of flash.
    #[error("Image overruns the end of flash")]
    ImageTooBig,
    /// A sector erase failed.
    #[error("Flash erase error: {0:?}")]
    Erase(E),
    /// The word write failed.
    #[error("Flash write error: {0:?}")]
    Write(E),
}
