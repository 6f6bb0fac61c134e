//! Push-based encoder.

use std::borrow::Cow;
use std::sync::Arc;

use log::warn;

use crate::cache::GrammarCache;
use crate::channel::ChannelWriter;
use crate::datatype::{Datatype, Value};
use crate::event::{AtContent, ExiEvent};
use crate::event_type::{EventKind, EventType};
use crate::event_type_list::EventTypeList;
use crate::header;
use crate::options::CodecConfig;
use crate::qname::QName;
use crate::{Error, Result};

use super::{codec_datatype, Core};

/// Encodes one document event by event.
///
/// # Beispiel
///
/// ```
/// use exigram::{CodecConfig, Encoder, ExiEvent, GrammarCache, GrammarOptions, QName};
///
/// let cache = GrammarCache::compile(None, GrammarOptions::default()).unwrap();
/// let mut enc = Encoder::new(&cache, CodecConfig::default());
/// enc.feed(&ExiEvent::StartDocument).unwrap();
/// enc.feed(&ExiEvent::start(QName::new("", "a"))).unwrap();
/// enc.feed(&ExiEvent::EndElement).unwrap();
/// enc.feed(&ExiEvent::EndDocument).unwrap();
/// let bytes = enc.finish().unwrap();
/// assert!(!bytes.is_empty());
/// ```
#[derive(Debug)]
pub struct Encoder<'c> {
    core: Core<'c>,
    out: ChannelWriter,
}

impl<'c> Encoder<'c> {
    /// Starts a document and writes the header.
    pub fn new(cache: &'c GrammarCache, config: CodecConfig) -> Self {
        let mut out = ChannelWriter::new(config.alignment);
        header::encode(&mut out, &config);
        Self { core: Core::new(cache), out }
    }

    /// Encodes the next event.
    ///
    /// # Errors
    ///
    /// [`Error::GrammarViolation`] if no production accepts the event,
    /// [`Error::InvalidDatatypeValue`] for a typed value without untyped
    /// fallback. After any error the encoder returns
    /// [`Error::DocumentAborted`].
    pub fn feed(&mut self, event: &ExiEvent) -> Result<()> {
        if self.core.aborted {
            return Err(Error::DocumentAborted);
        }
        let result = self.encode_event(event);
        if result.is_err() {
            self.core.aborted = true;
        }
        result
    }

    /// Finishes the document and returns the stream.
    pub fn finish(self) -> Result<Vec<u8>> {
        if self.core.aborted {
            return Err(Error::DocumentAborted);
        }
        if !self.core.finished {
            return Err(Error::grammar_violation("end of input", self.core.position()));
        }
        Ok(self.out.into_vec())
    }

    /// List and index used for the previous event.
    pub fn last_match(&self) -> Option<(&EventTypeList, usize)> {
        self.core.last_match()
    }

    /// Learned productions in this session's store (shared or per document).
    pub fn learned_count(&mut self) -> Result<usize> {
        self.core.learned_count()
    }

    fn encode_event(&mut self, event: &ExiEvent) -> Result<()> {
        if self.core.finished {
            return Err(Error::grammar_violation(event.to_string(), "after end of document"));
        }
        let event = self.normalize(event)?;
        let list = self.core.current_list()?;
        let index = self.find(&list, &event)?;
        let et = list.item(index).ok_or_else(|| Error::grammar_violation(event.to_string(), self.core.position()))?;
        list.write_code(index, &mut self.out)?;
        self.write_content(et, &event)?;
        self.core.commit(Arc::clone(&list), index, et, &event)
    }

    /// xsi:nil arrives as attribute from some sources; xsi:type must be a
    /// [`ExiEvent::TypeCast`].
    fn normalize<'e>(&self, event: &'e ExiEvent) -> Result<Cow<'e, ExiEvent>> {
        match event {
            ExiEvent::Attribute(at) if at.qname.is_xsi_type() => Err(Error::grammar_violation(
                "AT(xsi:type) with literal value, expected a type cast",
                self.core.position(),
            )),
            ExiEvent::Attribute(at) if at.qname.is_xsi_nil() => {
                match self.core.cache.codec().canonicalize(&at.value, &Datatype::Boolean) {
                    Ok(Value::Boolean(nil)) => Ok(Cow::Owned(ExiEvent::Nil(nil))),
                    _ => Err(Error::invalid_datatype_value("boolean", at.value.to_string())),
                }
            }
            other => Ok(Cow::Borrowed(other)),
        }
    }

    fn lexical(&self) -> bool {
        self.core.cache.options().preserve().lexical_values
    }

    /// Index of the entry that codes `event`; the first match in list order wins.
    fn find(&self, list: &EventTypeList, event: &ExiEvent) -> Result<usize> {
        let kind_of = |kind: EventKind| list.position(|et| et.kind() == kind);
        let found = match event {
            ExiEvent::StartDocument => kind_of(EventKind::StartDocument),
            ExiEvent::EndDocument => kind_of(EventKind::EndDocument),
            ExiEvent::EndElement => list.end_element(),
            ExiEvent::StartElement(q) => list.position(|et| match et.kind() {
                EventKind::StartElement => et.name() == Some(q),
                EventKind::StartElementNs => et.namespace() == Some(&q.uri),
                EventKind::StartElementAny => true,
                _ => false,
            }),
            ExiEvent::Attribute(at) => return self.find_attribute(list, at, event),
            ExiEvent::TypeCast(_) => kind_of(EventKind::TypeCast).or_else(|| self.xsi_fallback(list)),
            ExiEvent::Nil(_) => kind_of(EventKind::Nil).or_else(|| self.xsi_fallback(list)),
            ExiEvent::Characters(ch) => return self.find_characters(list, &ch.value, event),
            ExiEvent::NamespaceDeclaration(_) => kind_of(EventKind::NamespaceDeclaration),
            ExiEvent::Comment(_) => kind_of(EventKind::Comment),
            ExiEvent::ProcessingInstruction(_) => kind_of(EventKind::ProcessingInstruction),
            ExiEvent::DocType(_) => kind_of(EventKind::DocType),
            ExiEvent::EntityReference(_) => kind_of(EventKind::EntityReference),
        };
        found.ok_or_else(|| self.violation(event))
    }

    /// xsi:type and xsi:nil may travel as AT(*) of a built-in grammar.
    fn xsi_fallback(&self, list: &EventTypeList) -> Option<usize> {
        if self.core.in_built_in() {
            list.position(|et| et.kind() == EventKind::AttributeAnyUntyped)
        } else {
            None
        }
    }

    fn find_attribute(&self, list: &EventTypeList, at: &AtContent, event: &ExiEvent) -> Result<usize> {
        let candidate = list.position(|et| match et.kind() {
            EventKind::Attribute => et.name() == Some(&at.qname),
            EventKind::AttributeNs => et.namespace() == Some(&at.qname.uri),
            EventKind::AttributeAny | EventKind::AttributeAnyUntyped => true,
            _ => false,
        });
        let index = candidate.ok_or_else(|| self.violation(event))?;
        let untyped = |et: &EventType| et.kind() == EventKind::AttributeUntyped && et.name() == Some(&at.qname);
        self.check_typed(list, index, &at.value, untyped)
    }

    fn find_characters(&self, list: &EventTypeList, value: &str, event: &ExiEvent) -> Result<usize> {
        let index = list.characters().ok_or_else(|| self.violation(event))?;
        self.check_typed(list, index, value, |et| et.kind() == EventKind::Characters)
    }

    /// Keeps `index` if its value is valid. Under lexical preservation an
    /// invalid value moves to the untyped entry picked by `fallback`, which
    /// leads to the same state as the typed one.
    fn check_typed(
        &self,
        list: &EventTypeList,
        index: usize,
        value: &str,
        fallback: impl FnMut(&EventType) -> bool,
    ) -> Result<usize> {
        let Some(et) = list.item(index) else {
            return Ok(index);
        };
        let Some(datatype) = et.datatype().filter(|_| et.is_typed()) else {
            return Ok(index);
        };
        match self.core.cache.codec().canonicalize(value, datatype) {
            Ok(_) => Ok(index),
            Err(err) if self.lexical() => match list.position(fallback) {
                Some(untyped) => {
                    warn!(
                        "value '{value}' is not a valid {}, coded as untyped {}",
                        datatype.name(),
                        et.kind().short_name()
                    );
                    Ok(untyped)
                }
                None => Err(err),
            },
            Err(err) => Err(err),
        }
    }

    fn violation(&self, event: &ExiEvent) -> Error {
        Error::grammar_violation(event.to_string(), self.core.position())
    }

    fn write_content(&mut self, et: &EventType, event: &ExiEvent) -> Result<()> {
        let untyped_xsi = et.kind() == EventKind::AttributeAnyUntyped;
        match event {
            ExiEvent::StartDocument | ExiEvent::EndDocument | ExiEvent::EndElement => {}
            ExiEvent::StartElement(q) => self.write_name(et, q),
            ExiEvent::Attribute(at) => {
                self.write_name(et, &at.qname);
                self.write_value(et, &at.qname, &at.value)?;
            }
            ExiEvent::TypeCast(q) => {
                if untyped_xsi {
                    self.core.strings.write_qname(&QName::xsi_type(), &mut self.out);
                }
                self.core.strings.write_qname(q, &mut self.out);
            }
            ExiEvent::Nil(nil) => {
                if untyped_xsi {
                    self.core.strings.write_qname(&QName::xsi_nil(), &mut self.out);
                }
                self.out.write_bool(*nil);
            }
            ExiEvent::Characters(ch) => {
                let key = self.core.characters_key();
                self.write_value(et, &key, &ch.value)?;
            }
            ExiEvent::NamespaceDeclaration(ns) => {
                self.core.strings.write_uri(&ns.uri, &mut self.out);
                self.out.write_string(&ns.prefix);
                self.out.write_bool(ns.local_element_ns);
            }
            ExiEvent::Comment(cm) => self.out.write_string(&cm.text),
            ExiEvent::ProcessingInstruction(pi) => {
                self.out.write_string(&pi.name);
                self.out.write_string(&pi.text);
            }
            ExiEvent::DocType(dt) => {
                for part in [&dt.name, &dt.public, &dt.system, &dt.text] {
                    self.out.write_string(part);
                }
            }
            ExiEvent::EntityReference(er) => self.out.write_string(&er.name),
        }
        Ok(())
    }

    /// Name part of wildcard matches; concrete entries carry the name in the code.
    fn write_name(&mut self, et: &EventType, q: &QName) {
        match et.kind() {
            EventKind::StartElementNs | EventKind::AttributeNs => {
                let uri_id = self.core.strings.intern_uri(&q.uri);
                self.core.strings.write_local_name(uri_id, &q.local_name, &mut self.out);
            }
            EventKind::StartElementAny | EventKind::AttributeAny | EventKind::AttributeAnyUntyped => {
                self.core.strings.write_qname(q, &mut self.out);
            }
            _ => {}
        }
    }

    fn write_value(&mut self, et: &EventType, key: &QName, value: &str) -> Result<()> {
        match codec_datatype(et, self.lexical()) {
            Some(datatype) => {
                let codec = self.core.cache.codec();
                let canonical = codec.canonicalize(value, datatype)?;
                codec.write(&canonical, datatype, &mut self.out)
            }
            None => {
                self.core.strings.write_value(key, value, &mut self.out);
                Ok(())
            }
        }
    }
}

/// Encodes a complete event sequence.
pub fn encode(cache: &GrammarCache, events: &[ExiEvent], config: CodecConfig) -> Result<Vec<u8>> {
    let mut encoder = Encoder::new(cache, config);
    for event in events {
        encoder.feed(event)?;
    }
    encoder.finish()
}
