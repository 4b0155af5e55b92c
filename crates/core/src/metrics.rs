//! Metrics collection and reporting for conformance runs.
//!
//! This module provides observable insights into codec behavior:
//! - Symbols in and out, codes emitted (literal vs match)
//! - Compression ratio of the packed code stream
//! - Stream outcomes (verified, failed) and divergence counts
//! - Timing and throughput
//!
//! # Thread Safety
//!
//! `Metrics` is updated by the driver after each stream or run, never from
//! inside pipeline stages. Stages report through their own
//! [`ComparisonReport`], which is folded in with [`Metrics::record_comparison`].

use crate::compare::ComparisonReport;
use crate::window::WindowConfig;
use std::time::{Duration, Instant};

/// Counters for one invocation of the simulator.
#[derive(Debug, Clone)]
pub struct Metrics {
    // === Timing ===
    /// When the run started
    pub start_time: Instant,

    /// When the run ended (set on completion)
    pub end_time: Option<Instant>,

    // === Input/Output ===
    /// Symbols read from all stimuli
    pub input_symbols: u64,

    /// Bytes the input occupies packed at `data_width` bits
    pub input_bytes: u64,

    /// Symbols reconstructed by the decoders
    pub output_symbols: u64,

    // === Encoding ===
    /// Code words emitted by the reference encoder
    pub codes_emitted: u64,

    /// Of those, literal codes
    pub literal_codes: u64,

    /// Of those, match codes
    pub match_codes: u64,

    /// Bytes of packed code stream
    pub code_bytes: u64,

    // === Conformance ===
    /// Streams processed
    pub streams: u64,

    /// Streams whose decoded output matched the input exactly
    pub streams_verified: u64,

    /// Streams that errored or did not round-trip
    pub streams_failed: u64,

    /// Code mismatches between the two encoders
    pub code_divergences: u64,

    /// Symbol mismatches between the two decoders
    pub symbol_divergences: u64,
}

impl Metrics {
    /// Create new metrics with start time set to now.
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            end_time: None,
            input_symbols: 0,
            input_bytes: 0,
            output_symbols: 0,
            codes_emitted: 0,
            literal_codes: 0,
            match_codes: 0,
            code_bytes: 0,
            streams: 0,
            streams_verified: 0,
            streams_failed: 0,
            code_divergences: 0,
            symbol_divergences: 0,
        }
    }

    /// Mark the run as complete.
    pub fn complete(&mut self) {
        self.end_time = Some(Instant::now());
    }

    /// Get total duration (or current elapsed if not complete).
    pub fn duration(&self) -> Duration {
        match self.end_time {
            Some(end) => end.duration_since(self.start_time),
            None => self.start_time.elapsed(),
        }
    }

    /// Account for one stream: its input, the codes produced for it and the
    /// symbols decoded back.
    pub fn record_stream(
        &mut self,
        config: &WindowConfig,
        symbols: &[u32],
        codes: &[u32],
        decoded: &[u32],
    ) {
        self.streams += 1;
        self.input_symbols += symbols.len() as u64;
        self.input_bytes += packed_bytes(symbols.len(), config.data_width());
        self.output_symbols += decoded.len() as u64;

        let flag = 1u32 << (config.code_width() - 1);
        let matches = codes.iter().filter(|&&c| c & flag != 0).count() as u64;
        self.codes_emitted += codes.len() as u64;
        self.match_codes += matches;
        self.literal_codes += codes.len() as u64 - matches;
        self.code_bytes += packed_bytes(codes.len(), config.code_width());

        if symbols == decoded {
            self.streams_verified += 1;
        } else {
            self.streams_failed += 1;
        }
    }

    /// Count a stream that could not be processed at all.
    pub fn record_failure(&mut self) {
        self.streams += 1;
        self.streams_failed += 1;
    }

    pub fn record_comparison(&mut self, report: &ComparisonReport) {
        self.code_divergences += report.code_divergences;
        self.symbol_divergences += report.symbol_divergences;
    }

    pub fn divergences(&self) -> u64 {
        self.code_divergences + self.symbol_divergences
    }

    /// Compute compression ratio (packed codes / packed input).
    ///
    /// Returns 0.0 if no data was encoded.
    pub fn compression_ratio(&self) -> f64 {
        if self.input_bytes == 0 {
            0.0
        } else {
            self.code_bytes as f64 / self.input_bytes as f64
        }
    }

    /// Fraction of emitted codes that are matches.
    pub fn match_rate(&self) -> f64 {
        if self.codes_emitted == 0 {
            0.0
        } else {
            self.match_codes as f64 / self.codes_emitted as f64
        }
    }

    /// Compute throughput in input symbols per second.
    pub fn throughput_sps(&self) -> f64 {
        let duration_secs = self.duration().as_secs_f64();
        if duration_secs == 0.0 {
            0.0
        } else {
            self.input_symbols as f64 / duration_secs
        }
    }

    pub fn passed(&self) -> bool {
        self.streams_failed == 0 && self.divergences() == 0
    }

    /// Print a human-readable summary to stdout.
    pub fn print_summary(&self) {
        println!("\n=== Conformance Summary ===");
        println!("Duration: {} ms", self.duration().as_millis());
        println!();

        println!("Input:  {} symbols ({} bytes packed)", self.input_symbols, self.input_bytes);
        println!("Output: {} symbols", self.output_symbols);
        println!();

        println!("=== Encoding ===");
        println!("Codes: {}", self.codes_emitted);
        println!("Literals: {}", self.literal_codes);
        println!("Matches: {} ({:.1}%)", self.match_codes, self.match_rate() * 100.0);
        println!("Packed: {} bytes", self.code_bytes);
        println!("Ratio: {:.1}%", self.compression_ratio() * 100.0);
        println!();

        println!("=== Conformance ===");
        println!("Streams: {}", self.streams);
        println!("Verified: {}", self.streams_verified);
        println!("Failed: {}", self.streams_failed);
        println!("Code divergences: {}", self.code_divergences);
        println!("Symbol divergences: {}", self.symbol_divergences);
        println!();

        println!("=== Performance ===");
        println!("Throughput: {:.2} Msym/s", self.throughput_sps() / 1_000_000.0);
        println!();
    }

    /// Print just the final result (pass/fail).
    pub fn print_result(&self) {
        if self.passed() {
            println!("✓ All streams conform");
            println!(
                "  {} streams, {} symbols in {} ms",
                self.streams,
                self.input_symbols,
                self.duration().as_millis()
            );
        } else if self.divergences() > 0 {
            println!(
                "✗ Conformance failed: {} divergences ({} code, {} symbol)",
                self.divergences(),
                self.code_divergences,
                self.symbol_divergences
            );
        } else {
            println!(
                "✗ Conformance failed: {} of {} streams failed",
                self.streams_failed, self.streams
            );
        }
    }

    /// Export metrics as a simple text format (for parsing/testing).
    pub fn export_text(&self) -> String {
        format!(
            "duration_ms={}\n\
             streams={}\n\
             streams_verified={}\n\
             streams_failed={}\n\
             input_symbols={}\n\
             output_symbols={}\n\
             codes_emitted={}\n\
             match_codes={}\n\
             code_bytes={}\n\
             compression_ratio={:.4}\n\
             code_divergences={}\n\
             symbol_divergences={}\n",
            self.duration().as_millis(),
            self.streams,
            self.streams_verified,
            self.streams_failed,
            self.input_symbols,
            self.output_symbols,
            self.codes_emitted,
            self.match_codes,
            self.code_bytes,
            self.compression_ratio(),
            self.code_divergences,
            self.symbol_divergences,
        )
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

fn packed_bytes(count: usize, width: u32) -> u64 {
    (count as u64 * u64::from(width)).div_ceil(8)
}
