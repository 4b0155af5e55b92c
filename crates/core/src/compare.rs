//! Symbol-by-symbol conformance checking between the two codec forms.
//!
//! The comparator is fed pairs: one reference code with the streaming code
//! at the same position, or one reference-decoded symbol with the streaming
//! one. A mismatch is logged and counted, and execution continues; only once
//! the count passes `max_divergences` does it become a fatal error, so a
//! broken implementation cannot be waved through on thousands of mismatches.

use crate::error::{Error, Result};
use crate::window::Packet;
use std::fmt;
use tracing::{debug, error};

/// Which stream a comparison belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Code,
    Symbol,
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Channel::Code => write!(f, "code"),
            Channel::Symbol => write!(f, "symbol"),
        }
    }
}

/// Outcome of one pairwise comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Both sides agree
    Match,
    /// Both sides agree and both carry the end marker
    StreamComplete,
    /// The sides disagree; recorded and counted
    Diverged,
}

/// One recorded mismatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Divergence {
    pub channel: Channel,
    /// Stream index (0-based) the mismatch occurred in
    pub stream: u64,
    /// Position within that stream
    pub position: u64,
    pub reference: Packet,
    pub streaming: Packet,
}

impl fmt::Display for Divergence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} mismatch in stream {} at {}: reference {{{}}} streaming {{{}}}",
            self.channel, self.stream, self.position, self.reference, self.streaming
        )
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct Lane {
    compared: u64,
    diverged: u64,
    streams_completed: u64,
    position: u64,
}

/// Pairwise comparator for the code and decoded-symbol streams.
#[derive(Debug, Clone)]
pub struct Comparator {
    max_divergences: u64,
    codes: Lane,
    symbols: Lane,
    /// First few mismatches kept for reporting
    samples: Vec<Divergence>,
}

/// Mismatches retained in the report; the rest are only counted.
const SAMPLE_LIMIT: usize = 16;

impl Comparator {
    /// `max_divergences` mismatches are tolerated; one more is fatal.
    pub fn new(max_divergences: u64) -> Self {
        Self {
            max_divergences,
            codes: Lane::default(),
            symbols: Lane::default(),
            samples: Vec::new(),
        }
    }

    /// Compare one code from each encoder.
    ///
    /// # Errors
    /// `Error::DivergenceLimit` once mismatches exceed the limit.
    pub fn compare_code(&mut self, reference: Packet, streaming: Packet) -> Result<Verdict> {
        self.compare(Channel::Code, reference, streaming)
    }

    /// Compare one decoded symbol from each decoder.
    ///
    /// # Errors
    /// `Error::DivergenceLimit` once mismatches exceed the limit.
    pub fn compare_symbol(&mut self, reference: Packet, streaming: Packet) -> Result<Verdict> {
        self.compare(Channel::Symbol, reference, streaming)
    }

    /// Record that one side produced an element the other never matched
    /// (e.g. one stream ended early).
    ///
    /// # Errors
    /// `Error::DivergenceLimit` once mismatches exceed the limit.
    pub fn record_unpaired(&mut self, channel: Channel, reference: Option<Packet>, streaming: Option<Packet>) -> Result<()> {
        let lane = self.lane(channel);
        let divergence = Divergence {
            channel,
            stream: lane.streams_completed,
            position: lane.position,
            reference: reference.unwrap_or_default(),
            streaming: streaming.unwrap_or_default(),
        };
        error!(
            %divergence,
            reference_missing = reference.is_none(),
            streaming_missing = streaming.is_none(),
            "unpaired element"
        );
        self.record(divergence)
    }

    pub fn report(&self) -> ComparisonReport {
        ComparisonReport {
            codes_compared: self.codes.compared,
            symbols_compared: self.symbols.compared,
            code_divergences: self.codes.diverged,
            symbol_divergences: self.symbols.diverged,
            code_streams: self.codes.streams_completed,
            symbol_streams: self.symbols.streams_completed,
            samples: self.samples.clone(),
        }
    }

    pub fn total_divergences(&self) -> u64 {
        self.codes.diverged + self.symbols.diverged
    }

    fn lane(&mut self, channel: Channel) -> &mut Lane {
        match channel {
            Channel::Code => &mut self.codes,
            Channel::Symbol => &mut self.symbols,
        }
    }

    fn compare(&mut self, channel: Channel, reference: Packet, streaming: Packet) -> Result<Verdict> {
        let lane = self.lane(channel);
        lane.compared += 1;
        let position = lane.position;
        let stream = lane.streams_completed;

        // A marker on either side closes the stream for position bookkeeping.
        if reference.last || streaming.last {
            lane.position = 0;
            lane.streams_completed += 1;
        } else {
            lane.position += 1;
        }

        if reference == streaming {
            if reference.last {
                debug!(%channel, stream, length = position + 1, "stream complete");
                return Ok(Verdict::StreamComplete);
            }
            return Ok(Verdict::Match);
        }

        let divergence = Divergence {
            channel,
            stream,
            position,
            reference,
            streaming,
        };
        error!(%divergence, "divergence");
        self.record(divergence)?;
        Ok(Verdict::Diverged)
    }

    fn record(&mut self, divergence: Divergence) -> Result<()> {
        self.lane(divergence.channel).diverged += 1;
        if self.samples.len() < SAMPLE_LIMIT {
            self.samples.push(divergence);
        }

        let count = self.total_divergences();
        if count > self.max_divergences {
            return Err(Error::DivergenceLimit {
                count,
                max: self.max_divergences,
            });
        }
        Ok(())
    }
}

impl Default for Comparator {
    fn default() -> Self {
        Self::new(100)
    }
}

/// Summary of a comparison run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ComparisonReport {
    pub codes_compared: u64,
    pub symbols_compared: u64,
    pub code_divergences: u64,
    pub symbol_divergences: u64,
    /// End markers seen on the code channel
    pub code_streams: u64,
    /// End markers seen on the symbol channel
    pub symbol_streams: u64,
    pub samples: Vec<Divergence>,
}

impl ComparisonReport {
    /// Streams that reached the end marker on both channels.
    pub fn streams_completed(&self) -> u64 {
        self.code_streams.min(self.symbol_streams)
    }

    /// Fold in the report of another comparator, e.g. when codes and symbols
    /// are checked by separate pipeline stages.
    pub fn merge(&mut self, other: &ComparisonReport) {
        self.codes_compared += other.codes_compared;
        self.symbols_compared += other.symbols_compared;
        self.code_divergences += other.code_divergences;
        self.symbol_divergences += other.symbol_divergences;
        self.code_streams += other.code_streams;
        self.symbol_streams += other.symbol_streams;
        let room = SAMPLE_LIMIT.saturating_sub(self.samples.len());
        self.samples.extend(other.samples.iter().take(room).copied());
    }

    pub fn divergences(&self) -> u64 {
        self.code_divergences + self.symbol_divergences
    }

    pub fn is_clean(&self) -> bool {
        self.divergences() == 0
    }
}
