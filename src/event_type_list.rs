//! Event type lists and their code assignment.
//!
//! Eine Liste besteht aus drei Ebenen: Einträge der ersten Ebene erhalten
//! 1-teilige Codes, die der zweiten Ebene teilen sich den letzten Part1-Wert,
//! die der dritten den letzten Part2-Wert. Gleiche Eingaben ergeben immer
//! dieselbe Codezuordnung.

use crate::channel::{ChannelReader, ChannelWriter};
use crate::event_code::{CodeWidths, EventCode};
use crate::event_type::{EventKind, EventType};
use crate::{Error, Result};

/// Ordered candidates of one grammar position; insertion order = code order.
#[derive(Debug, Clone, PartialEq)]
pub struct EventTypeList {
    items: Vec<EventType>,
    first_level: u32,
    second_level: u32,
    widths: CodeWidths,
    end_element: Option<usize>,
    characters: Option<usize>,
}

impl EventTypeList {
    /// Number of event types.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Ob die Liste leer ist.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Event type at `index`.
    pub fn item(&self, index: usize) -> Option<&EventType> {
        self.items.get(index)
    }

    /// Alle Einträge in Code-Reihenfolge.
    pub fn iter(&self) -> impl Iterator<Item = &EventType> {
        self.items.iter()
    }

    /// Code widths per part.
    pub fn widths(&self) -> CodeWidths {
        self.widths
    }

    /// Index of the first EE, if any.
    pub fn end_element(&self) -> Option<usize> {
        self.end_element
    }

    /// Index of the first CH (typed or untyped), if any.
    pub fn characters(&self) -> Option<usize> {
        self.characters
    }

    /// Whether an EE is present.
    pub fn has_end_element(&self) -> bool {
        self.end_element.is_some()
    }

    /// Whether a CH is present.
    pub fn has_characters(&self) -> bool {
        self.characters.is_some()
    }

    /// Index of the first entry satisfying `pred`.
    pub fn position(&self, pred: impl FnMut(&EventType) -> bool) -> Option<usize> {
        self.items.iter().position(pred)
    }

    /// Writes the code of the entry at `index`.
    pub(crate) fn write_code(&self, index: usize, out: &mut ChannelWriter) -> Result<()> {
        let item = self.items.get(index).ok_or_else(|| Error::InvalidEventCode {
            event_code: index.to_string(),
            list_len: self.items.len(),
        })?;
        self.widths.write(&item.code(), out);
        Ok(())
    }

    /// Reads a code and returns the index of its entry.
    pub(crate) fn read_code(&self, input: &mut ChannelReader<'_>) -> Result<usize> {
        let code = self.widths.read(self.first_level, self.second_level, input)?;
        self.index_of(code).ok_or_else(|| Error::InvalidEventCode {
            event_code: code.to_string(),
            list_len: self.items.len(),
        })
    }

    /// Entry index of `code`.
    pub fn index_of(&self, code: EventCode) -> Option<usize> {
        let k = self.first_level as usize;
        let m = self.second_level as usize;
        let index = match (code.part2(), code.part3()) {
            (None, _) => code.part1() as usize,
            (Some(p2), None) => k + p2 as usize,
            (Some(_), Some(p3)) => k + m + p3 as usize,
        };
        self.items.get(index).filter(|item| item.code() == code).map(|_| index)
    }
}

/// Collects entries per level and assigns codes.
#[derive(Debug, Default)]
pub(crate) struct ListBuilder {
    first: Vec<EventType>,
    second: Vec<EventType>,
    third: Vec<EventType>,
}

impl ListBuilder {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn first(&mut self, et: EventType) -> &mut Self {
        self.first.push(et);
        self
    }

    pub(crate) fn second(&mut self, et: EventType) -> &mut Self {
        self.second.push(et);
        self
    }

    #[cfg(test)]
    pub(crate) fn third(&mut self, et: EventType) -> &mut Self {
        self.third.push(et);
        self
    }

    /// Zweite Ebene, nur falls `enabled`.
    pub(crate) fn second_if(&mut self, enabled: bool, kind: EventKind) -> &mut Self {
        if enabled {
            self.second.push(EventType::new(kind));
        }
        self
    }

    /// Dritte Ebene, nur falls `enabled`.
    pub(crate) fn third_if(&mut self, enabled: bool, kind: EventKind) -> &mut Self {
        if enabled {
            self.third.push(EventType::new(kind));
        }
        self
    }

    pub(crate) fn build(self) -> EventTypeList {
        let k = self.first.len() as u32;
        let m = self.second.len() as u32;
        let l = self.third.len() as u32;
        let widths = CodeWidths {
            part1: k + u32::from(m + l > 0),
            part2: m + u32::from(l > 0),
            part3: l,
        };

        let mut items = Vec::with_capacity((k + m + l) as usize);
        for (i, mut et) in self.first.into_iter().enumerate() {
            et.set_code(EventCode::one(i as u32));
            items.push(et);
        }
        for (j, mut et) in self.second.into_iter().enumerate() {
            et.set_code(EventCode::two(k, j as u32));
            items.push(et);
        }
        for (n, mut et) in self.third.into_iter().enumerate() {
            et.set_code(EventCode::three(k, m, n as u32));
            items.push(et);
        }

        let end_element = items.iter().position(|et| et.kind() == EventKind::EndElement);
        let characters = items
            .iter()
            .position(|et| matches!(et.kind(), EventKind::Characters | EventKind::CharactersSchema));
        EventTypeList { items, first_level: k, second_level: m, widths, end_element, characters }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::Alignment;
    use crate::qname::QName;

    fn start_tag_like() -> EventTypeList {
        let mut b = ListBuilder::new();
        b.first(EventType::new(EventKind::StartElement).with_name(QName::new("", "a")))
            .second(EventType::new(EventKind::EndElement))
            .second(EventType::new(EventKind::AttributeAnyUntyped))
            .second(EventType::new(EventKind::StartElementAny))
            .second(EventType::new(EventKind::Characters))
            .third(EventType::new(EventKind::Comment))
            .third(EventType::new(EventKind::ProcessingInstruction));
        b.build()
    }

    #[test]
    fn codes_pro_ebene() {
        let list = start_tag_like();
        let codes: Vec<String> = list.iter().map(|et| et.code().to_string()).collect();
        assert_eq!(codes, ["0", "1.0", "1.1", "1.2", "1.3", "1.4.0", "1.4.1"]);
        assert_eq!(list.widths(), CodeWidths { part1: 2, part2: 5, part3: 2 });
        assert_eq!(list.end_element(), Some(1));
        assert_eq!(list.characters(), Some(4));
    }

    #[test]
    fn nur_erste_ebene() {
        let mut b = ListBuilder::new();
        b.first(EventType::new(EventKind::EndDocument));
        let list = b.build();
        assert_eq!(list.widths(), CodeWidths { part1: 1, part2: 0, part3: 0 });
        assert!(!list.has_characters());
    }

    #[test]
    fn dritte_ebene_ohne_zweite() {
        let mut b = ListBuilder::new();
        b.first(EventType::new(EventKind::StartElementAny)).third_if(true, EventKind::Comment);
        let list = b.build();
        assert_eq!(list.item(1).unwrap().code(), EventCode::three(1, 0, 0));
        assert_eq!(list.widths().bits(), [1, 0, 0]);
    }

    #[test]
    fn codes_lesen_und_schreiben() {
        let list = start_tag_like();
        for alignment in [Alignment::BitPacked, Alignment::ByteAligned] {
            let mut w = ChannelWriter::new(alignment);
            for i in (0..list.len()).rev() {
                list.write_code(i, &mut w).unwrap();
            }
            let data = w.into_vec();
            let mut r = ChannelReader::new(&data, alignment);
            for i in (0..list.len()).rev() {
                assert_eq!(list.read_code(&mut r).unwrap(), i);
            }
        }
    }

    #[test]
    fn ungueltiger_code() {
        // 3 Einträge erster Ebene → 2 Bits, Wert 3 existiert nicht
        let mut b = ListBuilder::new();
        for _ in 0..3 {
            b.first(EventType::new(EventKind::EndElement));
        }
        let list = b.build();
        let data = [0b1100_0000];
        let mut r = ChannelReader::new(&data, Alignment::BitPacked);
        assert!(matches!(list.read_code(&mut r), Err(Error::InvalidEventCode { list_len: 3, .. })));
    }
}
