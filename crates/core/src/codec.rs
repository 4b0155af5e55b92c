//! Encoder and decoder interfaces shared by the reference and streaming forms.
//!
//! Implementors only provide the per-packet step (`accept` / `decode_code`)
//! and `clear`; the batch, marked-stream and packed-byte entry points are
//! built on top of those so both forms expose identical behavior at the
//! boundary.

use crate::bitio::BitReader;
use crate::error::{Error, Result};
use crate::window::{Packet, WindowConfig};

/// Symbol stream in, code stream out.
pub trait Encoder {
    fn config(&self) -> &WindowConfig;

    /// Feed one input packet, appending any codes that became ready to `out`.
    ///
    /// After a packet carrying the end marker the encoder flushes every
    /// remaining code, marks the final one, and clears itself.
    fn accept(&mut self, input: Packet, out: &mut Vec<Packet>) -> Result<()>;

    /// Return to the initial state, discarding any partial stream.
    fn clear(&mut self);

    /// Encode one complete stream into raw code words.
    ///
    /// Starts from a cleared state and leaves the encoder cleared. An empty
    /// input has no packet to carry the end marker and yields no codes.
    fn encode(&mut self, symbols: &[u32]) -> Result<Vec<u32>> {
        self.clear();
        let mut codes = Vec::with_capacity(symbols.len());
        for packet in Packet::stream(symbols) {
            if let Err(e) = self.accept(packet, &mut codes) {
                self.clear();
                return Err(e);
            }
        }
        Ok(Packet::values(&codes))
    }

    /// Encode and pack at `code_width` bits per code.
    fn encode_packed(&mut self, symbols: &[u32]) -> Result<Vec<u8>> {
        let width = self.config().code_width();
        let codes = self.encode(symbols)?;
        crate::bitio::pack(&codes, width)
    }
}

/// Code stream in, symbol stream out.
pub trait Decoder {
    fn config(&self) -> &WindowConfig;

    /// Decode one code word into `out`. The last symbol produced inherits the
    /// code's end marker, after which the history is reset.
    ///
    /// # Errors
    /// `Error::Format` if the word is malformed; `recovered` is left empty
    /// for the caller to fill.
    fn decode_code(&mut self, code: Packet, out: &mut Vec<Packet>) -> Result<()>;

    /// Reset the history to its initial state.
    fn clear(&mut self);

    /// Decode a bare sequence of code words (no end markers), then clear.
    ///
    /// # Errors
    /// `Error::Format` carrying everything decoded before the bad word.
    fn decode(&mut self, codes: &[u32]) -> Result<Vec<u32>> {
        let packets: Vec<Packet> = codes.iter().map(|&c| Packet::data(c)).collect();
        let result = decode_all(self, &packets);
        self.clear();
        result
    }

    /// Decode one marked stream; the final code must carry the end marker.
    ///
    /// # Errors
    /// `Error::Format` for a malformed word or a missing end marker, with the
    /// symbols reconstructed so far.
    fn decode_stream(&mut self, codes: &[Packet]) -> Result<Vec<u32>> {
        let symbols = decode_all(self, codes)?;
        if !codes.last().is_some_and(|c| c.last) {
            self.clear();
            return Err(Error::format("code stream ended without end marker", symbols));
        }
        Ok(symbols)
    }

    /// Decode a packed code stream that should expand to `symbol_count`
    /// symbols. The configuration travels out of band, so the count is the
    /// only way to tell padding from a trailing zero code.
    ///
    /// # Errors
    /// `Error::Format` if the bytes run out early (trailing partial code), a
    /// match overruns `symbol_count`, or non-zero bits follow the last code.
    fn decode_packed(&mut self, bytes: &[u8], symbol_count: usize) -> Result<Vec<u32>> {
        let width = self.config().code_width();
        let mut reader = BitReader::new(bytes);
        let mut out = Vec::with_capacity(symbol_count);

        while out.len() < symbol_count {
            let word = match reader.read_bits(width) {
                Ok(word) => word,
                Err(_) => {
                    self.clear();
                    return Err(Error::format(
                        format!(
                            "code stream truncated at bit {} ({} bits left, code is {width})",
                            reader.position(),
                            reader.bits_remaining()
                        ),
                        Packet::values(&out),
                    ));
                }
            };
            if let Err(e) = self.decode_code(Packet::data(word), &mut out) {
                self.clear();
                return Err(with_recovered(e, &out));
            }
        }
        self.clear();

        let symbols = Packet::values(&out);
        if symbols.len() > symbol_count {
            return Err(Error::format(
                format!("final match overruns {symbol_count} symbols"),
                symbols,
            ));
        }
        if reader.bits_remaining() >= 8 || !reader.rest_is_zero() {
            return Err(Error::format(
                format!("{} unexpected bits after last code", reader.bits_remaining()),
                symbols,
            ));
        }
        Ok(symbols)
    }
}

fn decode_all<D: Decoder + ?Sized>(decoder: &mut D, codes: &[Packet]) -> Result<Vec<u32>> {
    let mut out = Vec::with_capacity(codes.len() * 2);
    for &code in codes {
        if let Err(e) = decoder.decode_code(code, &mut out) {
            decoder.clear();
            return Err(with_recovered(e, &out));
        }
    }
    Ok(Packet::values(&out))
}

fn with_recovered(err: Error, out: &[Packet]) -> Error {
    match err {
        Error::Format { reason, .. } => Error::format(reason, Packet::values(out)),
        other => other,
    }
}
