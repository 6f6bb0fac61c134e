//! Pull-based decoder.

use std::sync::Arc;

use crate::cache::GrammarCache;
use crate::channel::ChannelReader;
use crate::event::{AtContent, ChContent, CmContent, DtContent, ErContent, ExiEvent, NsContent, PiContent};
use crate::event_type::{EventKind, EventType};
use crate::event_type_list::EventTypeList;
use crate::header;
use crate::options::CodecConfig;
use crate::qname::QName;
use crate::{Error, Result};

use super::{codec_datatype, Core};

/// Decodes one document event by event.
///
/// Implements [`Iterator`] over `Result<ExiEvent>`; after the first error the
/// iterator ends.
#[derive(Debug)]
pub struct Decoder<'c, 'd> {
    core: Core<'c>,
    input: ChannelReader<'d>,
}

impl<'c, 'd> Decoder<'c, 'd> {
    /// Reads the header. Alignment is passed out-of-band in `config`; a
    /// cookie is accepted whether or not `config` announces one.
    pub fn new(cache: &'c GrammarCache, data: &'d [u8], config: CodecConfig) -> Result<Self> {
        let mut input = ChannelReader::new(data, config.alignment);
        header::decode(&mut input)?;
        Ok(Self { core: Core::new(cache), input })
    }

    /// Next event, `None` after ED.
    ///
    /// # Errors
    ///
    /// Stream errors ([`Error::InvalidEventCode`],
    /// [`Error::PrematureEndOfStream`], ...) and grammar errors. After any
    /// error the decoder returns [`Error::DocumentAborted`].
    pub fn next_event(&mut self) -> Result<Option<ExiEvent>> {
        if self.core.aborted {
            return Err(Error::DocumentAborted);
        }
        if self.core.finished {
            return Ok(None);
        }
        let result = self.decode_event();
        if result.is_err() {
            self.core.aborted = true;
        }
        result.map(Some)
    }

    /// List and index used for the previous event.
    pub fn last_match(&self) -> Option<(&EventTypeList, usize)> {
        self.core.last_match()
    }

    /// Learned productions in this session's store (shared or per document).
    pub fn learned_count(&mut self) -> Result<usize> {
        self.core.learned_count()
    }

    fn decode_event(&mut self) -> Result<ExiEvent> {
        let list = self.core.current_list()?;
        let index = list.read_code(&mut self.input)?;
        let et = list.item(index).ok_or_else(|| Error::InvalidEventCode {
            event_code: index.to_string(),
            list_len: list.len(),
        })?;
        let event = self.read_content(et)?;
        self.core.commit(Arc::clone(&list), index, et, &event)?;
        Ok(event)
    }

    fn lexical(&self) -> bool {
        self.core.cache.options().preserve().lexical_values
    }

    fn read_content(&mut self, et: &EventType) -> Result<ExiEvent> {
        Ok(match et.kind() {
            EventKind::StartDocument => ExiEvent::StartDocument,
            EventKind::EndDocument => ExiEvent::EndDocument,
            EventKind::EndElement => ExiEvent::EndElement,
            EventKind::StartElement | EventKind::StartElementNs | EventKind::StartElementAny => {
                ExiEvent::StartElement(self.read_name(et)?)
            }
            EventKind::Attribute | EventKind::AttributeUntyped | EventKind::AttributeNs | EventKind::AttributeAny => {
                let qname = self.read_name(et)?;
                let value = self.read_value(et, &qname)?;
                ExiEvent::Attribute(AtContent { qname, value })
            }
            EventKind::AttributeAnyUntyped => {
                let qname = self.read_name(et)?;
                if qname.is_xsi_type() && self.core.in_built_in() {
                    ExiEvent::TypeCast(self.core.strings.read_qname(&mut self.input)?)
                } else if qname.is_xsi_nil() && self.core.in_built_in() {
                    ExiEvent::Nil(self.input.read_bool()?)
                } else {
                    let value = self.read_value(et, &qname)?;
                    ExiEvent::Attribute(AtContent { qname, value })
                }
            }
            EventKind::TypeCast => ExiEvent::TypeCast(self.core.strings.read_qname(&mut self.input)?),
            EventKind::Nil => ExiEvent::Nil(self.input.read_bool()?),
            EventKind::Characters | EventKind::CharactersSchema => {
                let key = self.core.characters_key();
                ExiEvent::Characters(ChContent { value: self.read_value(et, &key)? })
            }
            EventKind::NamespaceDeclaration => {
                let uri_id = self.core.strings.read_uri(&mut self.input)?;
                let uri = self.core.strings.uri(uri_id)?;
                let prefix = self.read_text()?;
                let local_element_ns = self.input.read_bool()?;
                ExiEvent::NamespaceDeclaration(NsContent { uri, prefix, local_element_ns })
            }
            EventKind::Comment => ExiEvent::Comment(CmContent { text: self.read_text()? }),
            EventKind::ProcessingInstruction => {
                let name = self.read_text()?;
                let text = self.read_text()?;
                ExiEvent::ProcessingInstruction(PiContent { name, text })
            }
            EventKind::DocType => {
                let name = self.read_text()?;
                let public = self.read_text()?;
                let system = self.read_text()?;
                let text = self.read_text()?;
                ExiEvent::DocType(DtContent { name, public, system, text })
            }
            EventKind::EntityReference => ExiEvent::EntityReference(ErContent { name: self.read_text()? }),
        })
    }

    fn read_text(&mut self) -> Result<Arc<str>> {
        Ok(self.input.read_string()?.into())
    }

    /// Name of an SE/AT: from the entry itself, or from the stream for wildcards.
    fn read_name(&mut self, et: &EventType) -> Result<QName> {
        match (et.kind(), et.name(), et.namespace()) {
            (EventKind::StartElement | EventKind::Attribute | EventKind::AttributeUntyped, Some(name), _) => {
                Ok(name.clone())
            }
            (EventKind::StartElementNs | EventKind::AttributeNs, _, Some(uri)) => {
                let uri_id = self.core.strings.intern_uri(uri);
                let local_name = self.core.strings.read_local_name(uri_id, &mut self.input)?;
                Ok(QName::new(Arc::clone(uri), local_name))
            }
            (EventKind::StartElementAny | EventKind::AttributeAny | EventKind::AttributeAnyUntyped, _, _) => {
                self.core.strings.read_qname(&mut self.input)
            }
            _ => Err(Error::grammar_violation(format!("{et} without name"), self.core.position())),
        }
    }

    fn read_value(&mut self, et: &EventType, key: &QName) -> Result<Arc<str>> {
        match codec_datatype(et, self.lexical()) {
            Some(datatype) => {
                let codec = self.core.cache.codec();
                let value = codec.read(datatype, &mut self.input)?;
                Ok(codec.to_lexical(&value, datatype).into())
            }
            None => self.core.strings.read_value(key, &mut self.input),
        }
    }
}

impl Iterator for Decoder<'_, '_> {
    type Item = Result<ExiEvent>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.core.aborted {
            return None;
        }
        self.next_event().transpose()
    }
}

/// Decodes a complete document.
pub fn decode(cache: &GrammarCache, data: &[u8], config: CodecConfig) -> Result<Vec<ExiEvent>> {
    Decoder::new(cache, data, config)?.collect()
}
