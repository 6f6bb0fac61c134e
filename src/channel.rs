//! Alignment-aware primitives on top of the bit buffer.
//!
//! - n-bit unsigned integer: bit-packed `n` Bits, byte-aligned `⌈n/8⌉` Bytes
//!   (niedrigstwertiges Byte zuerst)
//! - boolean: 1 Bit bzw. 1 Byte
//! - unsigned integer: 7-Bit-Gruppen, Bit 8 = weitere Gruppe folgt
//! - string: Länge (unsigned integer) + Code Points (je unsigned integer)

use crate::bit_width;
use crate::bitstream::{BitReader, BitWriter};
use crate::options::Alignment;
use crate::{Error, Result};

/// Writes event codes and values.
#[derive(Debug)]
pub struct ChannelWriter {
    bits: BitWriter,
    alignment: Alignment,
}

impl ChannelWriter {
    /// Creates an empty channel.
    pub fn new(alignment: Alignment) -> Self {
        Self { bits: BitWriter::new(), alignment }
    }

    /// Alignment of this channel.
    pub fn alignment(&self) -> Alignment {
        self.alignment
    }

    /// n-bit unsigned integer.
    pub fn write_nbit(&mut self, value: u64, bits: u8) {
        match self.alignment {
            Alignment::BitPacked => self.bits.write_bits(value, bits),
            Alignment::ByteAligned => {
                for i in 0..bit_width::bytes_for_bits(bits) {
                    self.bits.write_bits((value >> (8 * u32::from(i))) & 0xFF, 8);
                }
            }
        }
    }

    /// Boolean.
    pub fn write_bool(&mut self, value: bool) {
        match self.alignment {
            Alignment::BitPacked => self.bits.write_bit(value),
            Alignment::ByteAligned => self.bits.write_bits(u64::from(value), 8),
        }
    }

    /// Unsigned integer in 7-bit groups, least significant group first.
    pub fn write_uint(&mut self, mut value: u64) {
        loop {
            let mut octet = (value & 0x7F) as u8;
            value >>= 7;
            if value != 0 {
                octet |= 0x80;
            }
            self.bits.write_bits(u64::from(octet), 8);
            if value == 0 {
                break;
            }
        }
    }

    /// String literal: code point count followed by the code points.
    pub fn write_string(&mut self, s: &str) {
        self.write_uint(s.chars().count() as u64);
        self.write_chars(s);
    }

    /// Code points only (length written by the caller).
    pub fn write_chars(&mut self, s: &str) {
        for c in s.chars() {
            self.write_uint(u64::from(c));
        }
    }

    /// Raw bytes (header cookie).
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.bits.write_bytes(bytes);
    }

    /// Direct access for header bits.
    pub(crate) fn bits_mut(&mut self) -> &mut BitWriter {
        &mut self.bits
    }

    /// Bits written so far.
    pub fn bit_position(&self) -> usize {
        self.bits.bit_position()
    }

    /// Pads and returns the stream bytes.
    pub fn into_vec(self) -> Vec<u8> {
        self.bits.into_vec()
    }
}

/// Reads event codes and values.
#[derive(Debug, Clone)]
pub struct ChannelReader<'a> {
    bits: BitReader<'a>,
    alignment: Alignment,
}

impl<'a> ChannelReader<'a> {
    /// Reader at the start of `data`.
    pub fn new(data: &'a [u8], alignment: Alignment) -> Self {
        Self { bits: BitReader::new(data), alignment }
    }

    /// Alignment of this channel.
    pub fn alignment(&self) -> Alignment {
        self.alignment
    }

    /// n-bit unsigned integer.
    pub fn read_nbit(&mut self, bits: u8) -> Result<u64> {
        match self.alignment {
            Alignment::BitPacked => self.bits.read_bits(bits),
            Alignment::ByteAligned => {
                let mut value = 0u64;
                for i in 0..bit_width::bytes_for_bits(bits) {
                    value |= self.bits.read_bits(8)? << (8 * u32::from(i));
                }
                Ok(value)
            }
        }
    }

    /// Boolean.
    pub fn read_bool(&mut self) -> Result<bool> {
        match self.alignment {
            Alignment::BitPacked => self.bits.read_bit(),
            Alignment::ByteAligned => Ok(self.bits.read_bits(8)? != 0),
        }
    }

    /// Unsigned integer in 7-bit groups.
    pub fn read_uint(&mut self) -> Result<u64> {
        let mut value = 0u64;
        let mut shift = 0u32;
        loop {
            let octet = self.bits.read_bits(8)?;
            let group = octet & 0x7F;
            if shift >= 64 || (shift > 57 && group >> (64 - shift) != 0) {
                return Err(Error::IntegerOverflow);
            }
            value |= group << shift;
            if octet & 0x80 == 0 {
                return Ok(value);
            }
            shift += 7;
        }
    }

    /// String literal (length + code points).
    pub fn read_string(&mut self) -> Result<String> {
        let len = self.read_uint()?;
        self.read_chars(len)
    }

    /// `len` code points.
    pub fn read_chars(&mut self, len: u64) -> Result<String> {
        // Jeder Code Point braucht mindestens 8 Bits; größere Längen sind
        // im verbleibenden Stream unmöglich.
        if len > (self.bits.remaining_bits() / 8) as u64 {
            return Err(Error::PrematureEndOfStream);
        }
        let mut s = String::with_capacity(len as usize);
        for _ in 0..len {
            let cp = self.read_uint()?;
            let c = u32::try_from(cp)
                .ok()
                .and_then(char::from_u32)
                .ok_or(Error::InvalidCodePoint(cp))?;
            s.push(c);
        }
        Ok(s)
    }

    /// Direct access for header bits.
    pub(crate) fn bits_mut(&mut self) -> &mut BitReader<'a> {
        &mut self.bits
    }

    /// Unread bits.
    pub fn remaining_bits(&self) -> usize {
        self.bits.remaining_bits()
    }
}
