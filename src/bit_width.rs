//! Bitbreiten für n-bit Codes: `⌈log₂(n)⌉`.
//!
//! Gemeinsame Grundlage für Event-Code-Teile, Enumerationen und die
//! Compact-IDs der String Tables.

/// Anzahl Bits, um `n` verschiedene Werte zu unterscheiden.
///
/// `0` und `1` brauchen kein Bit; der Code-Teil entfällt dann im Stream.
#[inline]
pub fn for_count(n: usize) -> u8 {
    match n {
        0 | 1 => 0,
        _ => (usize::BITS - (n - 1).leading_zeros()) as u8,
    }
}

/// Anzahl Bytes für einen n-bit Wert im byte-aligned Modus.
#[inline]
pub fn bytes_for_bits(bits: u8) -> u8 {
    bits.div_ceil(8)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grenzen() {
        let cases = [(0, 0), (1, 0), (2, 1), (3, 2), (4, 2), (5, 3), (8, 3), (9, 4), (256, 8), (257, 9)];
        for (n, bits) in cases {
            assert_eq!(for_count(n), bits, "n={n}");
        }
    }

    #[test]
    fn bytes() {
        assert_eq!(bytes_for_bits(0), 0);
        assert_eq!(bytes_for_bits(1), 1);
        assert_eq!(bytes_for_bits(8), 1);
        assert_eq!(bytes_for_bits(9), 2);
    }
}
