//! Error types for the LZSS simulator.
//!
//! All operations return structured errors rather than panicking. The
//! variants follow the propagation policy of the simulator:
//! - configuration errors are fatal before any stream is processed
//! - I/O errors abort only the stream that hit them
//! - divergences are counted by the comparator and only surface here once
//!   they pass the configured limit
//! - malformed code streams report what was decoded before the fault

use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for all operations in the system.
#[derive(Debug, Error)]
pub enum Error {
    /// Window parameters or a codec width failed validation
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// An input symbol does not fit in the configured data width
    #[error("symbol {value:#x} does not fit in {width} bits")]
    SymbolOutOfRange { value: u32, width: u32 },

    /// Bit I/O operation failed (e.g., reading past end of buffer)
    #[error("bit I/O error: {0}")]
    BitIo(#[from] BitIoError),

    /// Truncated or malformed code stream
    #[error("format error after {} symbols: {reason}", .recovered.len())]
    Format {
        reason: String,
        /// Symbols reconstructed before the fault was detected
        recovered: Vec<u32>,
    },

    /// An external source or sink could not be opened, read or written
    #[error("I/O unavailable for {}: {source}", .path.display())]
    IoUnavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Too many reference/streaming mismatches to keep going
    #[error("divergence limit reached: {count} mismatches (max {max})")]
    DivergenceLimit { count: u64, max: u64 },

    /// The pipeline watchdog saw no forward progress
    #[error("pipeline stalled: no progress for {stalled_ms}ms")]
    Timeout { stalled_ms: u64 },

    /// A pipeline stage observed the abort signal and stopped
    #[error("pipeline aborted")]
    Aborted,

    /// Channel communication error
    #[error("channel error: {0}")]
    Channel(String),

    /// A pipeline stage thread could not be started
    #[error("failed to start stage {stage}: {source}")]
    Spawn {
        stage: &'static str,
        #[source]
        source: std::io::Error,
    },
}

impl Error {
    /// Build a format error that carries the partially decoded output.
    pub fn format(reason: impl Into<String>, recovered: Vec<u32>) -> Self {
        Error::Format {
            reason: reason.into(),
            recovered,
        }
    }

    /// Whether this error ends the whole run rather than a single stream.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::InvalidConfiguration(_)
                | Error::DivergenceLimit { .. }
                | Error::Timeout { .. }
                | Error::Aborted
                | Error::Spawn { .. }
        )
    }
}

/// Bit-level I/O errors.
#[derive(Debug, Error)]
pub enum BitIoError {
    /// Attempted to read past the end of the buffer
    #[error("unexpected end of bit stream")]
    UnexpectedEof,

    /// Invalid bit count (more than 32 bits in one call)
    #[error("invalid bit count: {0}")]
    InvalidBitCount(usize),
}

/// Reasons a raw code word cannot be interpreted under a window configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodeError {
    /// Bits set above `code_width`
    #[error("code {raw:#x} is wider than {width} bits")]
    TooWide { raw: u32, width: u32 },

    /// Match offset outside the `R`-slot history
    #[error("match offset {offset} outside history of {reference_size} symbols")]
    OffsetOutOfRange { offset: usize, reference_size: usize },

    /// Match length beyond the lookahead the encoder can produce
    #[error("match length {length} exceeds coding size {coding_size}")]
    LengthOutOfRange { length: usize, coding_size: usize },

    /// Literal payload with bits above `data_width`
    #[error("literal {value:#x} is wider than {width} bits")]
    LiteralTooWide { value: u32, width: u32 },
}

/// Type alias for Result with our Error type
pub type Result<T> = std::result::Result<T, Error>;
