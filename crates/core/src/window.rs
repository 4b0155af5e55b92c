//! Window configuration, code format, and the state shared by both codec forms.
//!
//! # Code Format
//!
//! ```text
//!  code_width-1   code_width-2 .. length_width   length_width-1 .. 0
//! +------------+----------------------------+-----------------------+
//! | flag = 1   | offset (offset_width bits) | length - 2            |   match
//! +------------+----------------------------+-----------------------+
//! | flag = 0   | literal symbol (low data_width bits)               |   literal
//! +------------+----------------------------------------------------+
//! ```
//!
//! `offset` addresses the decoder's `R`-slot history, slot `R - 1` holding the
//! most recently produced symbol. A match copies between 2 and `C` symbols.
//!
//! The literal/match split only works when `code_width > data_width`;
//! [`WindowConfig::new`] refuses configurations where a literal could set the
//! flag bit.

use crate::error::{CodeError, Error, Result};
use std::collections::VecDeque;
use std::fmt;

/// Immutable window parameters for one codec session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowConfig {
    reference_size: usize,
    coding_size: usize,
    data_width: u32,
    offset_width: u32,
    length_width: u32,
}

impl WindowConfig {
    /// Validate and build a configuration.
    ///
    /// # Errors
    /// `Error::InvalidConfiguration` when any size is out of range, the code
    /// would not fit in 32 bits, or `code_width <= data_width`.
    pub fn new(reference_size: usize, coding_size: usize, data_width: u32) -> Result<Self> {
        if reference_size == 0 {
            return Err(Error::InvalidConfiguration(
                "reference_size must be at least 1".into(),
            ));
        }
        if coding_size < 2 {
            return Err(Error::InvalidConfiguration(format!(
                "coding_size must be at least 2, got {coding_size}"
            )));
        }
        if data_width == 0 || data_width > 31 {
            return Err(Error::InvalidConfiguration(format!(
                "data_width must be in 1..=31, got {data_width}"
            )));
        }

        let offset_width = ceil_log2(reference_size);
        let length_width = ceil_log2(coding_size - 1);
        let code_width = offset_width + length_width + 1;

        if code_width > 32 {
            return Err(Error::InvalidConfiguration(format!(
                "code width {code_width} exceeds 32 bits (R={reference_size}, C={coding_size})"
            )));
        }
        if code_width <= data_width {
            return Err(Error::InvalidConfiguration(format!(
                "code width {code_width} must exceed data width {data_width} \
                 (R={reference_size}, C={coding_size}); literals would alias match codes"
            )));
        }

        Ok(Self {
            reference_size,
            coding_size,
            data_width,
            offset_width,
            length_width,
        })
    }

    /// Maximum back-reference distance (R).
    pub fn reference_size(&self) -> usize {
        self.reference_size
    }

    /// Lookahead length (C), also the longest match.
    pub fn coding_size(&self) -> usize {
        self.coding_size
    }

    pub fn data_width(&self) -> u32 {
        self.data_width
    }

    pub fn offset_width(&self) -> u32 {
        self.offset_width
    }

    pub fn length_width(&self) -> u32 {
        self.length_width
    }

    pub fn code_width(&self) -> u32 {
        self.offset_width + self.length_width + 1
    }

    /// History plus lookahead slots held by the streaming encoder (R + C).
    pub fn window_size(&self) -> usize {
        self.reference_size + self.coding_size
    }

    /// Largest symbol value representable in `data_width` bits.
    pub fn max_symbol(&self) -> u32 {
        ((1u64 << self.data_width) - 1) as u32
    }

    /// Reject input symbols wider than `data_width`.
    pub fn check_symbol(&self, value: u32) -> Result<()> {
        if value > self.max_symbol() {
            return Err(Error::SymbolOutOfRange {
                value,
                width: self.data_width,
            });
        }
        Ok(())
    }

    /// Serialize a code into its `code_width`-bit word.
    pub fn to_word(&self, code: Code) -> u32 {
        match code {
            Code::Literal(value) => value & self.max_symbol(),
            Code::Match { offset, length } => {
                debug_assert!(offset < self.reference_size);
                debug_assert!((2..=self.coding_size).contains(&length));
                (1 << (self.code_width() - 1))
                    | ((offset as u32) << self.length_width)
                    | (length - 2) as u32
            }
        }
    }

    /// Interpret a `code_width`-bit word.
    pub fn parse_word(&self, raw: u32) -> std::result::Result<Code, CodeError> {
        let width = self.code_width();
        if width < 32 && raw >> width != 0 {
            return Err(CodeError::TooWide { raw, width });
        }

        let flag = (raw >> (width - 1)) & 1 == 1;
        if !flag {
            if raw > self.max_symbol() {
                return Err(CodeError::LiteralTooWide {
                    value: raw,
                    width: self.data_width,
                });
            }
            return Ok(Code::Literal(raw));
        }

        let offset = ((raw >> self.length_width) & field_mask(self.offset_width)) as usize;
        let length = (raw & field_mask(self.length_width)) as usize + 2;
        if offset >= self.reference_size {
            return Err(CodeError::OffsetOutOfRange {
                offset,
                reference_size: self.reference_size,
            });
        }
        if length > self.coding_size {
            return Err(CodeError::LengthOutOfRange {
                length,
                coding_size: self.coding_size,
            });
        }
        Ok(Code::Match { offset, length })
    }
}

impl Default for WindowConfig {
    /// R = 32, C = 9, 8-bit symbols: 9-bit codes.
    fn default() -> Self {
        Self {
            reference_size: 32,
            coding_size: 9,
            data_width: 8,
            offset_width: 5,
            length_width: 3,
        }
    }
}

impl fmt::Display for WindowConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "R={} C={} W_d={} (offset {} + length {} + flag = {} bit codes)",
            self.reference_size,
            self.coding_size,
            self.data_width,
            self.offset_width,
            self.length_width,
            self.code_width()
        )
    }
}

/// `ceil(log2(n))`, with 0 for `n <= 1`.
pub fn ceil_log2(n: usize) -> u32 {
    if n <= 1 {
        0
    } else {
        usize::BITS - (n - 1).leading_zeros()
    }
}

fn field_mask(bits: u32) -> u32 {
    ((1u64 << bits) - 1) as u32
}

/// One logical code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Code {
    /// A raw symbol
    Literal(u32),
    /// Copy `length` symbols starting at history slot `offset`
    Match { offset: usize, length: usize },
}

impl Code {
    /// Number of symbols this code stands for.
    pub fn span(&self) -> usize {
        match self {
            Code::Literal(_) => 1,
            Code::Match { length, .. } => *length,
        }
    }

    pub fn is_match(&self) -> bool {
        matches!(self, Code::Match { .. })
    }
}

/// A symbol or code word travelling through a stream, with its end marker.
///
/// The marker rides on the final element of every stream so it stays in
/// order with the data no matter how the stream is buffered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Packet {
    pub value: u32,
    pub last: bool,
}

impl Packet {
    pub fn new(value: u32, last: bool) -> Self {
        Self { value, last }
    }

    /// A packet in the middle of a stream.
    pub fn data(value: u32) -> Self {
        Self { value, last: false }
    }

    /// The final packet of a stream.
    pub fn end(value: u32) -> Self {
        Self { value, last: true }
    }

    /// Wrap a finite stream, marking its final element.
    pub fn stream(values: &[u32]) -> Vec<Packet> {
        let n = values.len();
        values
            .iter()
            .enumerate()
            .map(|(i, &value)| Packet::new(value, i + 1 == n))
            .collect()
    }

    /// Strip the markers from a stream.
    pub fn values(packets: &[Packet]) -> Vec<u32> {
        packets.iter().map(|p| p.value).collect()
    }
}

impl fmt::Display for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "value: {:#06x} last: {}", self.value, u8::from(self.last))
    }
}

/// Pick the longest candidate; on equal length the later (greater) offset wins.
///
/// Candidates must arrive in increasing offset order. Both encoders route
/// their search through here so that they agree on every tie.
pub fn select_longest<I>(candidates: I) -> Option<(usize, usize)>
where
    I: IntoIterator<Item = (usize, usize)>,
{
    let mut best: Option<(usize, usize)> = None;
    for (offset, length) in candidates {
        match best {
            Some((_, best_length)) if length < best_length => {}
            _ => best = Some((offset, length)),
        }
    }
    best
}

/// A window slot that may be empty (before stream start or past its end).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Slot {
    pub value: u32,
    pub valid: bool,
}

impl Slot {
    pub fn filled(value: u32) -> Self {
        Self { value, valid: true }
    }

    /// Two slots match only if both hold data and the data agree.
    pub fn matches(&self, other: &Slot) -> bool {
        self.valid && other.valid && self.value == other.value
    }
}

/// Fixed-length shift register of [`Slot`]s.
#[derive(Debug, Clone)]
pub struct SlotWindow {
    slots: VecDeque<Slot>,
}

impl SlotWindow {
    /// A window of `len` invalid slots.
    pub fn new(len: usize) -> Self {
        Self {
            slots: std::iter::repeat(Slot::default()).take(len).collect(),
        }
    }

    pub fn get(&self, index: usize) -> Slot {
        self.slots[index]
    }

    /// Drop the oldest slot and append `slot`.
    pub fn shift_in(&mut self, slot: Slot) {
        self.slots.pop_front();
        self.slots.push_back(slot);
    }

    /// Length of the run where `slots[from + i]` matches `slots[base + i]`,
    /// for `i < span`.
    pub fn run_length(&self, from: usize, base: usize, span: usize) -> usize {
        (0..span)
            .take_while(|&i| self.slots[from + i].matches(&self.slots[base + i]))
            .count()
    }

    /// Invalidate every slot.
    pub fn clear(&mut self) {
        self.slots.iter_mut().for_each(|s| *s = Slot::default());
    }
}
