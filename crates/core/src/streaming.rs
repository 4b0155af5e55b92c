//! Fixed-latency streaming LZSS codec.
//!
//! The encoder models a hardware pipeline: a shift register of `R + C`
//! slots and an `R`-entry match-length table. Input is taken one symbol per
//! step and the table is rebuilt once per emitted code, on the last step
//! before that code goes out. The per-code cost is `O(R * C)` comparisons
//! regardless of how much input is queued upstream.
//!
//! # Window Layout
//!
//! ```text
//!  index: 0 ............. R-1 | R ............ R+C-1
//!         [ history (R slots) | lookahead (C slots) ]
//! ```
//!
//! The table is refreshed before the final shift of a step, so entry `o`
//! compares `slots[o..o+C)` with `slots[R..R+C)` while the symbol about to be
//! encoded still sits at `R`. After the shift that symbol is at `R - 1`, which
//! is where literals are taken from.
//!
//! # Cadence
//!
//! A fresh stream needs `C + 1` steps before the first code. Afterwards each
//! code is followed by as many steps as symbols it consumed (1 for a literal,
//! the match length for a match), so the table is always current when read.

use crate::codec::{Decoder, Encoder};
use crate::error::{Error, Result};
use crate::window::{select_longest, Code, Packet, Slot, SlotWindow, WindowConfig};
use std::collections::VecDeque;
use tracing::{debug, trace};

/// Fixed-latency encoder.
#[derive(Debug, Clone)]
pub struct StreamingEncoder {
    config: WindowConfig,
    window: SlotWindow,
    /// Match length per history offset, refreshed once per code
    lengths: Vec<usize>,
    /// Steps left before the next table refresh and code
    shift: usize,
    input_done: bool,
    refreshes: u64,
}

impl StreamingEncoder {
    pub fn new(config: WindowConfig) -> Self {
        Self {
            config,
            window: SlotWindow::new(config.window_size()),
            lengths: vec![0; config.reference_size()],
            shift: config.coding_size() + 1,
            input_done: false,
            refreshes: 0,
        }
    }

    /// Table refreshes since the last clear; one per emitted code.
    pub fn refreshes(&self) -> u64 {
        self.refreshes
    }

    /// One pipeline step: shift in `input` (or padding once input is done)
    /// and, at the end of a step sequence, emit one code.
    fn step(&mut self, input: Option<Packet>, out: &mut Vec<Packet>) {
        self.shift -= 1;
        let emit = self.shift == 0;
        if emit {
            self.refresh_lengths();
        }

        let slot = match input {
            Some(packet) => {
                if packet.last {
                    self.input_done = true;
                }
                Slot::filled(packet.value)
            }
            None => Slot::default(),
        };
        self.window.shift_in(slot);

        if emit {
            self.emit(out);
        }
    }

    fn refresh_lengths(&mut self) {
        let base = self.config.reference_size();
        let span = self.config.coding_size();
        for (offset, length) in self.lengths.iter_mut().enumerate() {
            *length = self.window.run_length(offset, base, span);
        }
        self.refreshes += 1;
    }

    fn emit(&mut self, out: &mut Vec<Packet>) {
        let current = self.config.reference_size() - 1;
        let code = match select_longest(self.lengths.iter().copied().enumerate()) {
            Some((offset, length)) if length > 1 => Code::Match { offset, length },
            _ => Code::Literal(self.window.get(current).value),
        };
        self.shift = code.span();

        let last = self.input_done && !self.window.get(current + code.span()).valid;
        trace!(?code, last, "streaming encoder emit");
        out.push(Packet::new(self.config.to_word(code), last));

        if last {
            debug!(refreshes = self.refreshes, "streaming encoder finished stream");
            self.clear();
        }
    }
}

impl Encoder for StreamingEncoder {
    fn config(&self) -> &WindowConfig {
        &self.config
    }

    fn accept(&mut self, input: Packet, out: &mut Vec<Packet>) -> Result<()> {
        self.config.check_symbol(input.value)?;
        self.step(Some(input), out);

        // Past the end marker no more input is read; pad until the stream's
        // final code has gone out and the encoder has reset itself.
        while self.input_done {
            self.step(None, out);
        }
        Ok(())
    }

    fn clear(&mut self) {
        self.window.clear();
        self.lengths.iter_mut().for_each(|l| *l = 0);
        self.shift = self.config.coding_size() + 1;
        self.input_done = false;
        self.refreshes = 0;
    }
}

/// Streaming decoder: a fixed `R`-slot history driven one code at a time.
#[derive(Debug, Clone)]
pub struct StreamingDecoder {
    config: WindowConfig,
    history: VecDeque<u32>,
}

impl StreamingDecoder {
    pub fn new(config: WindowConfig) -> Self {
        Self {
            config,
            history: std::iter::repeat(0).take(config.reference_size()).collect(),
        }
    }

    /// Emit `value` and shift it into the history.
    fn produce(&mut self, value: u32, out: &mut Vec<Packet>) {
        out.push(Packet::data(value));
        self.history.pop_front();
        self.history.push_back(value);
    }
}

impl Decoder for StreamingDecoder {
    fn config(&self) -> &WindowConfig {
        &self.config
    }

    fn decode_code(&mut self, code: Packet, out: &mut Vec<Packet>) -> Result<()> {
        let start = out.len();
        match self.config.parse_word(code.value) {
            Ok(Code::Literal(value)) => self.produce(value, out),
            Ok(Code::Match { offset, length }) => {
                // The history shifts by one after each symbol, so the next
                // symbol of the copy is always found at `offset` again.
                for _ in 0..length {
                    let value = self.history[offset];
                    self.produce(value, out);
                }
            }
            Err(e) => return Err(Error::format(e.to_string(), Vec::new())),
        }

        if code.last {
            if let Some(p) = out[start..].last_mut() {
                p.last = true;
            }
            self.clear();
        }
        Ok(())
    }

    fn clear(&mut self) {
        self.history.iter_mut().for_each(|v| *v = 0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reference::ReferenceEncoder;

    fn small() -> WindowConfig {
        WindowConfig::new(4, 3, 2).unwrap()
    }

    #[test]
    fn test_concrete_scenario() {
        let mut encoder = StreamingEncoder::new(small());
        let mut out = Vec::new();
        for packet in Packet::stream(&[0, 1, 0, 1, 0, 1, 0]) {
            encoder.accept(packet, &mut out).unwrap();
        }
        assert_eq!(
            out,
            vec![Packet::data(0), Packet::data(1), Packet::data(13), Packet::end(12)]
        );

        let mut decoder = StreamingDecoder::new(small());
        let decoded = decoder.decode_stream(&out).unwrap();
        assert_eq!(decoded, vec![0, 1, 0, 1, 0, 1, 0]);
    }

    #[test]
    fn test_first_code_after_c_plus_one_symbols() {
        let mut encoder = StreamingEncoder::new(small());
        let mut out = Vec::new();
        for v in [0, 1, 0] {
            encoder.accept(Packet::data(v), &mut out).unwrap();
        }
        assert!(out.is_empty());
        encoder.accept(Packet::data(1), &mut out).unwrap();
        assert_eq!(out, vec![Packet::data(0)]);
        assert_eq!(encoder.refreshes(), 1);
    }

    #[test]
    fn test_one_refresh_per_code() {
        let config = WindowConfig::new(32, 9, 8).unwrap();
        let input: Vec<u32> = b"abababababcdcdcdcdcd".iter().map(|&b| b.into()).collect();

        let mut encoder = StreamingEncoder::new(config);
        let mut out = Vec::new();
        for &v in &input {
            encoder.accept(Packet::data(v), &mut out).unwrap();
            assert_eq!(encoder.refreshes(), out.len() as u64);
        }
        // Literals and multi-symbol matches each cost exactly one refresh.
        let codes: Vec<Code> = out.iter().map(|p| config.parse_word(p.value).unwrap()).collect();
        assert!(codes.iter().any(|c| !c.is_match()));
        assert!(codes.iter().any(|c| c.is_match() && c.span() > 2));

        // The end marker flushes the stream and resets the counter.
        encoder.accept(Packet::end(u32::from(b'e')), &mut out).unwrap();
        assert!(out.last().unwrap().last);
        assert_eq!(encoder.refreshes(), 0);
    }

    #[test]
    fn test_single_symbol_stream() {
        let mut encoder = StreamingEncoder::new(WindowConfig::default());
        let mut out = Vec::new();
        encoder.accept(Packet::end(0x7f), &mut out).unwrap();
        assert_eq!(out, vec![Packet::end(0x7f)]);
    }

    #[test]
    fn test_short_repeat_uses_partial_lookahead() {
        // The final match can only see the valid part of the lookahead.
        let config = WindowConfig::new(4, 3, 3).unwrap();
        let codes = StreamingEncoder::new(config).encode(&[5, 5, 5]).unwrap();
        assert_eq!(
            codes,
            vec![
                config.to_word(Code::Literal(5)),
                config.to_word(Code::Match { offset: 3, length: 2 }),
            ]
        );
        assert_eq!(codes, ReferenceEncoder::new(config).encode(&[5, 5, 5]).unwrap());
    }

    #[test]
    fn test_encoder_resets_after_stream() {
        let config = WindowConfig::new(8, 5, 4).unwrap();
        let mut shared = StreamingEncoder::new(config);
        let a = shared.encode(&[1, 2, 3, 1, 2, 3, 1, 2, 3]).unwrap();
        let b = shared.encode(&[3, 2, 1, 3, 2, 1]).unwrap();

        let fresh = || StreamingEncoder::new(config);
        assert_eq!(a, fresh().encode(&[1, 2, 3, 1, 2, 3, 1, 2, 3]).unwrap());
        assert_eq!(b, fresh().encode(&[3, 2, 1, 3, 2, 1]).unwrap());
    }

    #[test]
    fn test_back_to_back_streams_without_clear() {
        // The end marker alone must reset state between streams.
        let config = WindowConfig::new(8, 5, 4).unwrap();
        let mut encoder = StreamingEncoder::new(config);
        let mut out = Vec::new();
        for packet in Packet::stream(&[7, 7, 7, 7]) {
            encoder.accept(packet, &mut out).unwrap();
        }
        let split = out.len();
        for packet in Packet::stream(&[7, 7, 7, 7]) {
            encoder.accept(packet, &mut out).unwrap();
        }
        assert_eq!(out[..split], out[split..]);
    }

    #[test]
    fn test_decoder_overlapping_copy() {
        let config = WindowConfig::new(8, 5, 4).unwrap();
        let mut decoder = StreamingDecoder::new(config);
        let mut out = Vec::new();
        decoder.decode_code(Packet::data(3), &mut out).unwrap();
        decoder.decode_code(Packet::data(4), &mut out).unwrap();
        let word = config.to_word(Code::Match { offset: 6, length: 5 });
        decoder.decode_code(Packet::end(word), &mut out).unwrap();
        assert_eq!(Packet::values(&out), vec![3, 4, 3, 4, 3, 4, 3]);
        assert!(out.last().unwrap().last);
    }

    #[test]
    fn test_decode_packed_rejects_truncation() {
        let config = small();
        let bytes = crate::bitio::pack(&[0, 1, 13, 12], config.code_width()).unwrap();
        let mut decoder = StreamingDecoder::new(config);
        assert_eq!(decoder.decode_packed(&bytes, 7).unwrap(), vec![0, 1, 0, 1, 0, 1, 0]);

        match decoder.decode_packed(&bytes[..1], 7) {
            Err(Error::Format { recovered, .. }) => assert_eq!(recovered, vec![0, 1]),
            other => panic!("expected format error, got {other:?}"),
        }
    }

    #[test]
    fn test_decode_packed_rejects_overrun() {
        let config = small();
        let bytes = crate::bitio::pack(&[0, 1, 13, 12], config.code_width()).unwrap();
        let mut decoder = StreamingDecoder::new(config);
        assert!(matches!(
            decoder.decode_packed(&bytes, 6),
            Err(Error::Format { .. })
        ));
    }
}
