//! lzss-sim-core: LZSS reference codec, fixed-latency streaming codec, and
//! the harness that proves them bit-identical.
//!
//! This library provides:
//! - A reference encoder/decoder with unconstrained buffering
//! - A streaming encoder/decoder with a fixed `R + C` slot window and one
//!   match-table refresh per code
//! - A comparator that checks both forms code for code and symbol for symbol
//! - Batch and pipelined conformance runs with backpressure and a watchdog
//!
//! # Architecture
//!
//! - `bitio`: MSB-first bit packing of fixed-width words
//! - `window`: window parameters, code format, shared window state
//! - `codec`: `Encoder` / `Decoder` traits and their batch entry points
//! - `reference`: reference codec
//! - `streaming`: fixed-latency codec
//! - `compare`: divergence detection
//! - `pipeline`: batch and concurrent runs
//! - `metrics`: observable run behavior
//!
//! # Example
//!
//! ```
//! use lzss_sim_core::{Decoder, Encoder, ReferenceEncoder, StreamingDecoder, StreamingEncoder, WindowConfig};
//!
//! let config = WindowConfig::new(4, 3, 2).unwrap();
//! let input = [0, 1, 0, 1, 0, 1, 0];
//!
//! let codes = ReferenceEncoder::new(config).encode(&input).unwrap();
//! assert_eq!(codes, StreamingEncoder::new(config).encode(&input).unwrap());
//! assert_eq!(StreamingDecoder::new(config).decode(&codes).unwrap(), input);
//! ```
//!
//! # Design Principles
//!
//! - **No panics**: All errors are structured and recoverable
//! - **Bounded memory**: Windows and queues have fixed limits
//! - **Bit-exact**: Both forms share one tie-break rule and one code format

pub mod bitio;
pub mod codec;
pub mod compare;
pub mod error;
pub mod metrics;
pub mod pipeline;
pub mod reference;
pub mod streaming;
pub mod window;

// Re-export commonly used types
pub use codec::{Decoder, Encoder};
pub use compare::{Comparator, ComparisonReport, Verdict};
pub use error::{Error, Result};
pub use pipeline::{run_batch, Pipeline, PipelineConfig, PipelineReport};
pub use reference::{ReferenceDecoder, ReferenceEncoder};
pub use streaming::{StreamingDecoder, StreamingEncoder};
pub use window::{Code, Packet, WindowConfig};
