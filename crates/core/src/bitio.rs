//! Bitstream codec: packs fixed-width values into bytes and back.
//!
//! Both the code stream (at `code_width` bits) and raw symbol files (at
//! `data_width` bits) go through this module, so there is exactly one place
//! that knows how values are laid out in bytes.
//!
//! # Layout
//! - Values are written most-significant bit first, back to back, with no
//!   padding between them.
//! - A partially filled final byte is padded with zero bits in its low-order
//!   positions.
//! - Unpacking yields `floor(8 * bytes.len() / width)` values. Pad bits are
//!   indistinguishable from a final zero value, so the consumer must know how
//!   many values it expects.
//!
//! # Example
//! ```
//! use lzss_sim_core::bitio::{pack, unpack};
//!
//! // Three 4-bit codes: 0b0000, 0b1101, 0b1100 -> 0000_1101 1100_0000
//! let bytes = pack(&[0, 13, 12], 4).unwrap();
//! assert_eq!(bytes, vec![0b0000_1101, 0b1100_0000]);
//! assert_eq!(unpack(&bytes, 4).unwrap(), vec![0, 13, 12, 0]);
//! ```

use crate::error::{BitIoError, Error, Result};

/// Widest value the packer accepts, matching the `u32` code/symbol carrier.
pub const MAX_WIDTH: u32 = 32;

/// Writes bits MSB-first into a byte buffer.
///
/// # Invariants
/// - `pending` never holds 8 or more bits between calls
#[derive(Debug, Clone, Default)]
pub struct BitWriter {
    bytes: Vec<u8>,
    /// Not-yet-flushed bits, right-aligned
    acc: u64,
    pending: u32,
}

impl BitWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a writer sized for roughly `bits` bits of output.
    pub fn with_capacity_bits(bits: usize) -> Self {
        Self {
            bytes: Vec::with_capacity(bits.div_ceil(8)),
            ..Self::default()
        }
    }

    /// Append the low `count` bits of `value`, most significant first.
    ///
    /// # Errors
    /// `BitIoError::InvalidBitCount` if `count > 32`.
    pub fn write_bits(&mut self, value: u32, count: u32) -> Result<()> {
        if count > MAX_WIDTH {
            return Err(BitIoError::InvalidBitCount(count as usize).into());
        }
        if count == 0 {
            return Ok(());
        }

        let masked = u64::from(value) & low_mask(count);
        self.acc = (self.acc << count) | masked;
        self.pending += count;

        while self.pending >= 8 {
            self.pending -= 8;
            self.bytes.push((self.acc >> self.pending) as u8);
        }
        self.acc &= low_mask(self.pending);
        Ok(())
    }

    /// Flush the final partial byte (zero padded) and return the output.
    pub fn finish(mut self) -> Vec<u8> {
        if self.pending > 0 {
            self.bytes.push((self.acc << (8 - self.pending)) as u8);
        }
        self.bytes
    }
}

/// Reads bits MSB-first from a byte buffer.
#[derive(Debug, Clone)]
pub struct BitReader<'a> {
    data: &'a [u8],
    /// Absolute bit position, 0 = MSB of the first byte
    position: usize,
}

impl<'a> BitReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, position: 0 }
    }

    /// Read `count` bits (at most 32) as an unsigned value.
    ///
    /// # Errors
    /// - `BitIoError::InvalidBitCount` if `count > 32`
    /// - `BitIoError::UnexpectedEof` if fewer than `count` bits remain
    pub fn read_bits(&mut self, count: u32) -> Result<u32> {
        if count > MAX_WIDTH {
            return Err(BitIoError::InvalidBitCount(count as usize).into());
        }
        if count as usize > self.bits_remaining() {
            return Err(BitIoError::UnexpectedEof.into());
        }

        let mut value = 0u64;
        let mut remaining = count;
        while remaining > 0 {
            let byte = self.data[self.position / 8];
            let used = (self.position % 8) as u32;
            let take = remaining.min(8 - used);
            let bits = (byte >> (8 - used - take)) & (low_mask(take) as u8);

            value = (value << take) | u64::from(bits);
            self.position += take as usize;
            remaining -= take;
        }
        Ok(value as u32)
    }

    pub fn bits_remaining(&self) -> usize {
        self.data.len() * 8 - self.position
    }

    pub fn position(&self) -> usize {
        self.position
    }

    /// True when every remaining bit is zero (i.e. only padding is left).
    pub fn rest_is_zero(&self) -> bool {
        let mut probe = self.clone();
        while probe.bits_remaining() > 0 {
            let take = probe.bits_remaining().min(MAX_WIDTH as usize) as u32;
            match probe.read_bits(take) {
                Ok(0) => {}
                _ => return false,
            }
        }
        true
    }
}

/// Pack `values` at `width` bits each into MSB-first bytes.
///
/// # Errors
/// `Error::InvalidConfiguration` if `width` is 0 or larger than 32.
pub fn pack(values: &[u32], width: u32) -> Result<Vec<u8>> {
    check_width(width)?;
    let mut writer = BitWriter::with_capacity_bits(values.len() * width as usize);
    for &value in values {
        writer.write_bits(value, width)?;
    }
    Ok(writer.finish())
}

/// Unpack `width`-bit values from MSB-first bytes, dropping trailing pad bits.
///
/// # Errors
/// `Error::InvalidConfiguration` if `width` is 0 or larger than 32.
pub fn unpack(bytes: &[u8], width: u32) -> Result<Vec<u32>> {
    check_width(width)?;
    let mut reader = BitReader::new(bytes);
    let count = reader.bits_remaining() / width as usize;
    let mut values = Vec::with_capacity(count);
    for _ in 0..count {
        values.push(reader.read_bits(width)?);
    }
    Ok(values)
}

fn check_width(width: u32) -> Result<()> {
    if width == 0 || width > MAX_WIDTH {
        return Err(Error::InvalidConfiguration(format!(
            "bit width must be in 1..={MAX_WIDTH}, got {width}"
        )));
    }
    Ok(())
}

#[inline]
fn low_mask(bits: u32) -> u64 {
    (1u64 << bits) - 1
}
