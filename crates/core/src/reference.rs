//! Reference LZSS codec with unconstrained buffering.
//!
//! The encoder keeps a growable buffer of history plus pending lookahead and
//! searches every history position each time a code is due. It is the
//! behavioral model the streaming codec in [`crate::streaming`] has to match
//! code for code.
//!
//! # Encoder State
//!
//! ```text
//!   buffer: [ history (ref_size <= R) | lookahead (<= C, more may be queued) ]
//!                                      ^ ref_size = current position
//! ```
//!
//! A code is produced as soon as `C` lookahead symbols are buffered, or, once
//! the end marker has arrived, while any lookahead is left.

use crate::codec::{Decoder, Encoder};
use crate::error::{Error, Result};
use crate::window::{select_longest, Code, Packet, WindowConfig};
use std::collections::VecDeque;
use tracing::debug;

/// Reference encoder.
#[derive(Debug, Clone)]
pub struct ReferenceEncoder {
    config: WindowConfig,
    buffer: VecDeque<u32>,
    /// Valid history length, also the index of the current position
    ref_size: usize,
    /// End marker seen; drain the lookahead without waiting for more input
    input_done: bool,
    consumed: u64,
}

impl ReferenceEncoder {
    pub fn new(config: WindowConfig) -> Self {
        Self {
            config,
            buffer: VecDeque::with_capacity(config.window_size() + 1),
            ref_size: 0,
            input_done: false,
            consumed: 0,
        }
    }

    fn lookahead(&self) -> usize {
        self.buffer.len() - self.ref_size
    }

    fn ready(&self) -> bool {
        let pending = self.lookahead();
        pending >= self.config.coding_size() || (self.input_done && pending > 0)
    }

    /// Longest match for the current position, or a literal.
    fn next_code(&self) -> Code {
        let span = self.lookahead().min(self.config.coding_size());
        let skew = self.config.reference_size() - self.ref_size;

        let best = select_longest(
            (0..self.ref_size).map(|start| (skew + start, self.run_length(start, span))),
        );

        match best {
            Some((offset, length)) if length > 1 => Code::Match { offset, length },
            _ => Code::Literal(self.buffer[self.ref_size]),
        }
    }

    /// Run length between history at `start` and the lookahead, overlap allowed.
    fn run_length(&self, start: usize, span: usize) -> usize {
        (0..span)
            .take_while(|&i| self.buffer[start + i] == self.buffer[self.ref_size + i])
            .count()
    }

    /// Advance past `count` encoded symbols. Returns true when the stream is
    /// fully encoded.
    fn consume(&mut self, count: usize) -> bool {
        self.ref_size += count;
        self.consumed += count as u64;
        while self.ref_size > self.config.reference_size() {
            self.buffer.pop_front();
            self.ref_size -= 1;
        }
        self.input_done && self.lookahead() == 0
    }
}

impl Encoder for ReferenceEncoder {
    fn config(&self) -> &WindowConfig {
        &self.config
    }

    fn accept(&mut self, input: Packet, out: &mut Vec<Packet>) -> Result<()> {
        self.config.check_symbol(input.value)?;
        self.buffer.push_back(input.value);
        if input.last {
            self.input_done = true;
        }

        while self.ready() {
            let code = self.next_code();
            let stream_end = self.consume(code.span());
            out.push(Packet::new(self.config.to_word(code), stream_end));
            if stream_end {
                debug!(symbols = self.consumed, "reference encoder finished stream");
                self.clear();
            }
        }
        Ok(())
    }

    fn clear(&mut self) {
        self.buffer.clear();
        self.ref_size = 0;
        self.input_done = false;
        self.consumed = 0;
    }
}

/// Reference decoder.
#[derive(Debug, Clone)]
pub struct ReferenceDecoder {
    config: WindowConfig,
    buffer: Vec<u32>,
}

impl ReferenceDecoder {
    pub fn new(config: WindowConfig) -> Self {
        Self {
            config,
            buffer: vec![0; config.reference_size()],
        }
    }
}

impl Decoder for ReferenceDecoder {
    fn config(&self) -> &WindowConfig {
        &self.config
    }

    fn decode_code(&mut self, code: Packet, out: &mut Vec<Packet>) -> Result<()> {
        let start = out.len();
        match self.config.parse_word(code.value) {
            Ok(Code::Literal(value)) => {
                out.push(Packet::data(value));
                self.buffer.push(value);
            }
            Ok(Code::Match { offset, length }) => {
                // Reads may land on symbols appended earlier in this same loop.
                for i in 0..length {
                    let value = self.buffer[offset + i];
                    out.push(Packet::data(value));
                    self.buffer.push(value);
                }
            }
            Err(e) => return Err(Error::format(e.to_string(), Vec::new())),
        }

        let excess = self.buffer.len() - self.config.reference_size();
        self.buffer.drain(..excess);

        if code.last {
            if let Some(p) = out[start..].last_mut() {
                p.last = true;
            }
            self.clear();
        }
        Ok(())
    }

    /// Reset the history to `R` zero symbols.
    fn clear(&mut self) {
        self.buffer.clear();
        self.buffer.resize(self.config.reference_size(), 0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small() -> WindowConfig {
        WindowConfig::new(4, 3, 2).unwrap()
    }

    #[test]
    fn test_concrete_scenario() {
        let mut encoder = ReferenceEncoder::new(small());
        let codes = encoder.encode(&[0, 1, 0, 1, 0, 1, 0]).unwrap();
        assert_eq!(codes, vec![0, 1, 13, 12]);

        let mut decoder = ReferenceDecoder::new(small());
        assert_eq!(decoder.decode(&codes).unwrap(), vec![0, 1, 0, 1, 0, 1, 0]);
    }

    #[test]
    fn test_end_marker_on_final_code() {
        let mut encoder = ReferenceEncoder::new(small());
        let mut out = Vec::new();
        for packet in Packet::stream(&[0, 1, 0, 1, 0, 1, 0]) {
            encoder.accept(packet, &mut out).unwrap();
        }
        let markers: Vec<bool> = out.iter().map(|p| p.last).collect();
        assert_eq!(markers, vec![false, false, false, true]);
    }

    #[test]
    fn test_codes_held_until_lookahead_full() {
        let mut encoder = ReferenceEncoder::new(small());
        let mut out = Vec::new();
        encoder.accept(Packet::data(0), &mut out).unwrap();
        encoder.accept(Packet::data(1), &mut out).unwrap();
        assert!(out.is_empty());
        encoder.accept(Packet::data(0), &mut out).unwrap();
        assert_eq!(out, vec![Packet::data(0)]);
    }

    #[test]
    fn test_single_symbol_stream() {
        let mut encoder = ReferenceEncoder::new(WindowConfig::default());
        assert_eq!(encoder.encode(&[0x41]).unwrap(), vec![0x41]);
    }

    #[test]
    fn test_run_uses_overlapping_match() {
        let config = WindowConfig::new(8, 5, 4).unwrap();
        let input = [9; 12];
        let codes = ReferenceEncoder::new(config).encode(&input).unwrap();

        // literal, then matches back one slot (offset R - 1)
        assert_eq!(config.parse_word(codes[0]).unwrap(), Code::Literal(9));
        assert_eq!(
            config.parse_word(codes[1]).unwrap(),
            Code::Match { offset: 7, length: 5 }
        );

        let decoded = ReferenceDecoder::new(config).decode(&codes).unwrap();
        assert_eq!(decoded, input);
    }

    #[test]
    fn test_symbol_out_of_range() {
        let mut encoder = ReferenceEncoder::new(small());
        let err = encoder.encode(&[0, 4]).unwrap_err();
        assert!(matches!(err, Error::SymbolOutOfRange { value: 4, width: 2 }));
    }

    #[test]
    fn test_decoder_resets_on_end_marker() {
        let config = small();
        let mut decoder = ReferenceDecoder::new(config);
        let mut out = Vec::new();
        decoder.decode_code(Packet::data(3), &mut out).unwrap();
        decoder.decode_code(Packet::end(3), &mut out).unwrap();
        assert_eq!(out, vec![Packet::data(3), Packet::end(3)]);

        // After reset the history is zeros again: a match at slot 3 copies 0s.
        out.clear();
        let word = config.to_word(Code::Match { offset: 3, length: 2 });
        decoder.decode_code(Packet::end(word), &mut out).unwrap();
        assert_eq!(out, vec![Packet::data(0), Packet::end(0)]);
    }

    #[test]
    fn test_missing_end_marker_reports_partial_output() {
        let mut decoder = ReferenceDecoder::new(small());
        let codes = [Packet::data(1), Packet::data(2)];
        match decoder.decode_stream(&codes) {
            Err(Error::Format { recovered, .. }) => assert_eq!(recovered, vec![1, 2]),
            other => panic!("expected format error, got {other:?}"),
        }
    }

    #[test]
    fn test_malformed_word_reports_partial_output() {
        let mut decoder = ReferenceDecoder::new(small());
        match decoder.decode(&[1, 2, 0b0100]) {
            Err(Error::Format { recovered, .. }) => assert_eq!(recovered, vec![1, 2]),
            other => panic!("expected format error, got {other:?}"),
        }
    }

    #[test]
    fn test_reset_idempotence() {
        // 5 + 3 + 1 = 9 bit codes, wide enough for 8 bit literals
        let config = WindowConfig::new(32, 9, 8).unwrap();
        let first: Vec<u32> = b"abcabcabcabd".iter().map(|&b| b.into()).collect();
        let second: Vec<u32> = b"xyzxyzabcabc".iter().map(|&b| b.into()).collect();

        let mut shared = ReferenceEncoder::new(config);
        let a = shared.encode(&first).unwrap();
        let b = shared.encode(&second).unwrap();

        // "abc" in the second stream must not match the first stream's history
        let is_match = |w: &u32| config.parse_word(*w).unwrap().is_match();
        assert!(a.iter().any(is_match));
        assert_eq!(config.parse_word(b[4]).unwrap(), Code::Literal(u32::from(b'a')));

        assert_eq!(a, ReferenceEncoder::new(config).encode(&first).unwrap());
        assert_eq!(b, ReferenceEncoder::new(config).encode(&second).unwrap());
    }
}
