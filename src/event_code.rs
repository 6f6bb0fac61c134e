//! Event codes: 1 bis 3 Teile, jeder Teil als n-bit unsigned integer.
//!
//! Die Bitbreite eines Teils hängt nur von seinen Geschwistern ab, d.h. von
//! den Codes, die in allen vorherigen Teilen übereinstimmen. Eine Event Type
//! List hat höchstens eine Gruppe pro Ebene (die letzte Position der vorigen
//! Ebene), daher genügen drei Zähler.

use std::fmt;

use crate::bit_width;
use crate::channel::{ChannelReader, ChannelWriter};
use crate::Result;

/// An event code of length 1, 2 or 3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EventCode {
    part1: u32,
    part2: Option<u32>,
    part3: Option<u32>,
}

impl EventCode {
    /// Code of length 1.
    pub fn one(part1: u32) -> Self {
        Self { part1, part2: None, part3: None }
    }

    /// Code of length 2.
    pub fn two(part1: u32, part2: u32) -> Self {
        Self { part1, part2: Some(part2), part3: None }
    }

    /// Code of length 3.
    pub fn three(part1: u32, part2: u32, part3: u32) -> Self {
        Self { part1, part2: Some(part2), part3: Some(part3) }
    }

    /// Number of parts.
    pub fn len(&self) -> usize {
        1 + usize::from(self.part2.is_some()) + usize::from(self.part3.is_some())
    }

    /// Erster Teil.
    pub fn part1(&self) -> u32 {
        self.part1
    }

    /// Zweiter Teil.
    pub fn part2(&self) -> Option<u32> {
        self.part2
    }

    /// Dritter Teil.
    pub fn part3(&self) -> Option<u32> {
        self.part3
    }
}

/// Punkt-Notation wie in den Grammatik-Tabellen: `0`, `2.1`, `3.1.0`.
impl fmt::Display for EventCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.part1)?;
        if let Some(p2) = self.part2 {
            write!(f, ".{p2}")?;
        }
        if let Some(p3) = self.part3 {
            write!(f, ".{p3}")?;
        }
        Ok(())
    }
}

/// Distinct values per part of one event type list.
///
/// `part2` zählt die Geschwister unter dem letzten Part1-Wert, `part3` die
/// unter dem letzten Part2-Wert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CodeWidths {
    /// Werte im ersten Teil.
    pub part1: u32,
    /// Werte im zweiten Teil.
    pub part2: u32,
    /// Werte im dritten Teil.
    pub part3: u32,
}

impl CodeWidths {
    /// Bits per part: `⌈log₂(n)⌉`.
    pub fn bits(&self) -> [u8; 3] {
        [
            bit_width::for_count(self.part1 as usize),
            bit_width::for_count(self.part2 as usize),
            bit_width::for_count(self.part3 as usize),
        ]
    }

    /// Writes `code` with these widths.
    pub fn write(&self, code: &EventCode, out: &mut ChannelWriter) {
        let [b1, b2, b3] = self.bits();
        out.write_nbit(u64::from(code.part1), b1);
        if let Some(p2) = code.part2 {
            out.write_nbit(u64::from(p2), b2);
        }
        if let Some(p3) = code.part3 {
            out.write_nbit(u64::from(p3), b3);
        }
    }

    /// Reads the parts of a code. `first_level` is the number of 1-part codes,
    /// `second_level` the number of 2-part codes; a part equal to the count
    /// escapes to the next level.
    pub fn read(
        &self,
        first_level: u32,
        second_level: u32,
        input: &mut ChannelReader<'_>,
    ) -> Result<EventCode> {
        let [b1, b2, b3] = self.bits();
        let p1 = input.read_nbit(b1)? as u32;
        if p1 < first_level {
            return Ok(EventCode::one(p1));
        }
        let p2 = input.read_nbit(b2)? as u32;
        if p2 < second_level {
            return Ok(EventCode::two(p1, p2));
        }
        let p3 = input.read_nbit(b3)? as u32;
        Ok(EventCode::three(p1, p2, p3))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::Alignment;

    #[test]
    fn punkt_notation() {
        assert_eq!(EventCode::one(4).to_string(), "4");
        assert_eq!(EventCode::two(1, 3).to_string(), "1.3");
        assert_eq!(EventCode::three(2, 1, 0).to_string(), "2.1.0");
        assert_eq!(EventCode::three(2, 1, 0).len(), 3);
    }

    #[test]
    fn einzelner_wert_braucht_keine_bits() {
        let widths = CodeWidths { part1: 1, part2: 0, part3: 0 };
        let mut w = ChannelWriter::new(Alignment::BitPacked);
        widths.write(&EventCode::one(0), &mut w);
        assert_eq!(w.bit_position(), 0);
    }

    #[test]
    fn drei_ebenen_lesen() {
        // DocEnd-artig: ED 0, CM 1.0, PI 1.1 ; plus dritte Ebene unter 1.2
        let widths = CodeWidths { part1: 2, part2: 3, part3: 2 };
        let codes = [EventCode::one(0), EventCode::two(1, 1), EventCode::three(1, 2, 1)];
        for alignment in [Alignment::BitPacked, Alignment::ByteAligned] {
            let mut w = ChannelWriter::new(alignment);
            for code in &codes {
                widths.write(code, &mut w);
            }
            let data = w.into_vec();
            let mut r = ChannelReader::new(&data, alignment);
            for code in &codes {
                assert_eq!(widths.read(1, 2, &mut r).unwrap(), *code);
            }
        }
    }

    #[test]
    fn bitbreiten() {
        let widths = CodeWidths { part1: 5, part2: 9, part3: 2 };
        assert_eq!(widths.bits(), [3, 4, 1]);
    }
}
