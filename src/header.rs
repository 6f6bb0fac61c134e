//! Stream header.
//!
//! Aufbau:
//! - `$EXI` Cookie (optional, 4 ASCII-Bytes)
//! - Distinguishing Bits `10`
//! - Presence Bit für Options (hier immer 0, Options laufen out-of-band)
//! - Version: Preview-Bit + 4-Bit-Chunks von `version - 1`, 15 = Fortsetzung
//! - Padding bis zur Bytegrenze bei byte-alignment
//!
//! # Beispiel
//!
//! ```
//! use exigram::header;
//! use exigram::channel::{ChannelReader, ChannelWriter};
//! use exigram::options::CodecConfig;
//!
//! let config = CodecConfig { include_cookie: true, ..CodecConfig::default() };
//! let mut w = ChannelWriter::new(config.alignment);
//! header::encode(&mut w, &config);
//! let data = w.into_vec();
//! assert_eq!(&data[..4], b"$EXI");
//!
//! let mut r = ChannelReader::new(&data, config.alignment);
//! assert!(header::decode(&mut r).unwrap());
//! ```

use crate::channel::{ChannelReader, ChannelWriter};
use crate::options::{Alignment, CodecConfig};
use crate::{Error, Result};

/// `$EXI`
const EXI_COOKIE: [u8; 4] = *b"$EXI";

/// Distinguishing Bits: `10`
const DISTINGUISHING_BITS: u8 = 0b10;

/// Versions-Chunk, der eine Fortsetzung ankündigt.
const VERSION_CONTINUATION: u64 = 15;

/// Writes the header for final version 1.
pub fn encode(out: &mut ChannelWriter, config: &CodecConfig) {
    let alignment = out.alignment();
    let bits = out.bits_mut();
    if config.include_cookie {
        bits.write_bytes(&EXI_COOKIE);
    }
    bits.write_bits(u64::from(DISTINGUISHING_BITS), 2);
    // Options presence
    bits.write_bit(false);
    // Preview-Bit, dann version - 1 = 0
    bits.write_bit(false);
    bits.write_bits(0, 4);
    if alignment == Alignment::ByteAligned {
        bits.align_to_byte();
    }
}

/// Reads and validates the header. Returns whether a cookie was present.
///
/// # Errors
///
/// - [`Error::InvalidDistinguishingBits`] wenn die Bits nicht `10` sind
/// - [`Error::MalformedHeader`] wenn Options im Header stehen
/// - [`Error::UnsupportedVersion`] für Preview- oder andere Versionen als 1
/// - [`Error::PrematureEndOfStream`] bei zu kurzem Stream
pub fn decode(input: &mut ChannelReader<'_>) -> Result<bool> {
    let alignment = input.alignment();
    let bits = input.bits_mut();
    let cookie = bits.peek_bytes(EXI_COOKIE.len()) == Some(&EXI_COOKIE[..]);
    if cookie {
        bits.read_bytes(EXI_COOKIE.len())?;
    }

    let distinguishing = bits.read_bits(2)? as u8;
    if distinguishing != DISTINGUISHING_BITS {
        return Err(Error::InvalidDistinguishingBits(distinguishing));
    }
    if bits.read_bit()? {
        return Err(Error::MalformedHeader);
    }

    let preview = bits.read_bit()?;
    let mut version = 1u64;
    loop {
        let chunk = bits.read_bits(4)?;
        version = version.saturating_add(chunk);
        if chunk != VERSION_CONTINUATION {
            break;
        }
    }
    if preview || version != 1 {
        return Err(Error::UnsupportedVersion);
    }

    if alignment == Alignment::ByteAligned {
        bits.align_to_byte();
    }
    Ok(cookie)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header_bytes(config: &CodecConfig) -> Vec<u8> {
        let mut w = ChannelWriter::new(config.alignment);
        encode(&mut w, config);
        w.into_vec()
    }

    #[test]
    fn minimaler_header() {
        // 10 0 0 0000 + Padding
        assert_eq!(header_bytes(&CodecConfig::default()), vec![0b1000_0000]);
    }

    #[test]
    fn cookie_und_byte_alignment() {
        let config = CodecConfig { include_cookie: true, ..CodecConfig::byte_aligned() };
        let data = header_bytes(&config);
        assert_eq!(data, vec![b'$', b'E', b'X', b'I', 0b1000_0000]);
        let mut r = ChannelReader::new(&data, config.alignment);
        assert!(decode(&mut r).unwrap());
        assert_eq!(r.remaining_bits(), 0);
    }

    #[test]
    fn falsche_distinguishing_bits() {
        let mut r = ChannelReader::new(&[0b0100_0000], Alignment::BitPacked);
        assert_eq!(decode(&mut r), Err(Error::InvalidDistinguishingBits(0b01)));
    }

    #[test]
    fn options_im_header_abgelehnt() {
        let mut r = ChannelReader::new(&[0b1010_0000], Alignment::BitPacked);
        assert_eq!(decode(&mut r), Err(Error::MalformedHeader));
    }

    #[test]
    fn preview_und_version_zwei_abgelehnt() {
        let mut preview = ChannelReader::new(&[0b1001_0000], Alignment::BitPacked);
        assert_eq!(decode(&mut preview), Err(Error::UnsupportedVersion));
        // version - 1 = 1
        let mut v2 = ChannelReader::new(&[0b1000_0001], Alignment::BitPacked);
        assert_eq!(decode(&mut v2), Err(Error::UnsupportedVersion));
    }

    #[test]
    fn leerer_stream() {
        let mut r = ChannelReader::new(&[], Alignment::BitPacked);
        assert_eq!(decode(&mut r), Err(Error::PrematureEndOfStream));
    }
}
