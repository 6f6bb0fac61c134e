//! MSB-first bit buffer.
//!
//! Bits werden innerhalb eines Bytes von Bit 7 abwärts belegt. Der Writer
//! sammelt in einem u64-Akkumulator und schreibt nur volle Bytes in den
//! Buffer; der Reader lädt umgekehrt byteweise nach.

use crate::{Error, Result};

/// Appends bits to a growable byte buffer.
#[derive(Debug, Default)]
pub struct BitWriter {
    buf: Vec<u8>,
    /// Noch nicht geschriebene Bits, rechtsbündig.
    pending: u64,
    /// Anzahl gültiger Bits in `pending` (immer < 8 nach `spill`).
    pending_bits: u8,
}

impl BitWriter {
    /// Creates an empty writer.
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    fn spill(&mut self) {
        while self.pending_bits >= 8 {
            self.pending_bits -= 8;
            self.buf.push((self.pending >> self.pending_bits) as u8);
        }
        self.pending &= (1u64 << self.pending_bits) - 1;
    }

    /// Writes one bit.
    #[inline]
    pub fn write_bit(&mut self, bit: bool) {
        self.write_bits(u64::from(bit), 1);
    }

    /// Writes the low `n` bits of `value`, most significant first.
    /// `n == 0` writes nothing.
    pub fn write_bits(&mut self, value: u64, n: u8) {
        debug_assert!(n <= 64, "write_bits: n={n} > 64");
        if n == 0 {
            return;
        }
        // In 8-Bit-Häppchen, damit der Akkumulator nie überläuft.
        let mut remaining = n;
        while remaining > 0 {
            let take = remaining.min(8);
            remaining -= take;
            let chunk = (value >> remaining) & ((1u64 << take) - 1);
            self.pending = (self.pending << take) | chunk;
            self.pending_bits += take;
            self.spill();
        }
    }

    /// Pads with zero bits up to the next byte boundary.
    pub fn align_to_byte(&mut self) {
        if self.pending_bits > 0 {
            let pad = 8 - self.pending_bits;
            self.write_bits(0, pad);
        }
    }

    /// Writes whole bytes (unaligned positions are handled bitwise).
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        if self.pending_bits == 0 {
            self.buf.extend_from_slice(bytes);
        } else {
            for &b in bytes {
                self.write_bits(u64::from(b), 8);
            }
        }
    }

    /// Number of bits written so far.
    pub fn bit_position(&self) -> usize {
        self.buf.len() * 8 + self.pending_bits as usize
    }

    /// Pads the last byte and returns the buffer.
    pub fn into_vec(mut self) -> Vec<u8> {
        self.align_to_byte();
        self.buf
    }
}

/// Reads bits from a byte slice, most significant first.
#[derive(Debug, Clone)]
pub struct BitReader<'a> {
    data: &'a [u8],
    /// Position des nächsten ungelesenen Bits.
    bit_pos: usize,
}

impl<'a> BitReader<'a> {
    /// Creates a reader at bit 0 of `data`.
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, bit_pos: 0 }
    }

    /// Reads one bit.
    #[inline]
    pub fn read_bit(&mut self) -> Result<bool> {
        Ok(self.read_bits(1)? == 1)
    }

    /// Reads `n` bits into the low bits of the result. `n == 0` returns 0.
    pub fn read_bits(&mut self, n: u8) -> Result<u64> {
        debug_assert!(n <= 64, "read_bits: n={n} > 64");
        if n as usize > self.remaining_bits() {
            return Err(Error::PrematureEndOfStream);
        }
        let mut value = 0u64;
        let mut remaining = n;
        while remaining > 0 {
            let byte = self.data[self.bit_pos / 8];
            let offset = (self.bit_pos % 8) as u8;
            let available = 8 - offset;
            let take = remaining.min(available);
            let shift = available - take;
            let chunk = (u64::from(byte) >> shift) & ((1u64 << take) - 1);
            value = (value << take) | chunk;
            remaining -= take;
            self.bit_pos += take as usize;
        }
        Ok(value)
    }

    /// Skips to the next byte boundary.
    pub fn align_to_byte(&mut self) {
        self.bit_pos = self.bit_pos.div_ceil(8) * 8;
    }

    /// Reads `n` whole bytes.
    pub fn read_bytes(&mut self, n: usize) -> Result<Vec<u8>> {
        if n.saturating_mul(8) > self.remaining_bits() {
            return Err(Error::PrematureEndOfStream);
        }
        let mut out = Vec::with_capacity(n);
        for _ in 0..n {
            out.push(self.read_bits(8)? as u8);
        }
        Ok(out)
    }

    /// Peeks at the next `n` bytes when byte-aligned, without consuming.
    pub fn peek_bytes(&self, n: usize) -> Option<&'a [u8]> {
        if self.bit_pos % 8 != 0 {
            return None;
        }
        let start = self.bit_pos / 8;
        self.data.get(start..start + n)
    }

    /// Current bit position.
    pub fn bit_position(&self) -> usize {
        self.bit_pos
    }

    /// Unread bits.
    pub fn remaining_bits(&self) -> usize {
        self.data.len() * 8 - self.bit_pos
    }
}
