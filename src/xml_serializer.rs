//! Event sequence → XML.
//!
//! Gegenstück zu [`crate::xml::parse_events`]. NS-Events werden als
//! `xmlns`-Attribute geschrieben; fehlende Bindungen (Dekodierung ohne
//! erhaltene Prefixe) werden als `ns0`, `ns1`, ... synthetisiert.
//! [`ExiEvent::TypeCast`] und [`ExiEvent::Nil`] erscheinen wieder als
//! `xsi:type` bzw. `xsi:nil`.

use std::io::Write;
use std::sync::Arc;

use crate::event::{AtContent, NsContent};
use crate::qname::{QName, URI_XML, URI_XSI};
use crate::{Error, ExiEvent, Result};

/// Serializes `events` into an XML string.
///
/// # Errors
///
/// [`Error::XmlParseError`] for sequences that have no XML form (unbalanced
/// EE, `--` in a comment, `?>` in a PI, attributes outside a start tag).
pub fn events_to_xml(events: &[ExiEvent]) -> Result<String> {
    let mut buf = Vec::new();
    events_to_xml_writer(events, &mut buf)?;
    String::from_utf8(buf).map_err(|_| Error::XmlParseError("output is not valid UTF-8".into()))
}

/// Streams `events` as XML into `writer`.
pub fn events_to_xml_writer(events: &[ExiEvent], writer: impl Write) -> Result<()> {
    let mut ser = Serializer::new(writer);
    for event in events {
        ser.process(event)?;
    }
    ser.finish()
}

/// Offener Start-Tag, bis das erste Nicht-NS/AT-Event kommt.
#[derive(Debug)]
struct PendingStart {
    qname: QName,
    namespaces: Vec<NsContent>,
    type_cast: Option<QName>,
    nil: Option<bool>,
    attributes: Vec<AtContent>,
}

#[derive(Debug)]
struct Serializer<W: Write> {
    writer: W,
    /// Geschriebene Element-Namen (mit Prefix) und ihre Bindungen.
    stack: Vec<(String, Vec<(Arc<str>, Arc<str>)>)>,
    pending: Option<PendingStart>,
    synthetic: usize,
}

impl<W: Write> Serializer<W> {
    fn new(writer: W) -> Self {
        Self { writer, stack: Vec::new(), pending: None, synthetic: 0 }
    }

    fn process(&mut self, event: &ExiEvent) -> Result<()> {
        match event {
            ExiEvent::StartDocument => {}
            ExiEvent::EndDocument => self.flush_start(false)?,
            ExiEvent::StartElement(qname) => {
                self.flush_start(false)?;
                self.pending = Some(PendingStart {
                    qname: qname.clone(),
                    namespaces: Vec::new(),
                    type_cast: None,
                    nil: None,
                    attributes: Vec::new(),
                });
            }
            ExiEvent::NamespaceDeclaration(ns) => self.pending_start("NS")?.namespaces.push(ns.clone()),
            ExiEvent::TypeCast(qname) => self.pending_start("xsi:type")?.type_cast = Some(qname.clone()),
            ExiEvent::Nil(nil) => self.pending_start("xsi:nil")?.nil = Some(*nil),
            ExiEvent::Attribute(at) => self.pending_start("AT")?.attributes.push(at.clone()),
            ExiEvent::EndElement => {
                if self.pending.is_some() {
                    self.flush_start(true)?;
                } else {
                    let (name, _) = self
                        .stack
                        .pop()
                        .ok_or_else(|| Error::XmlParseError("EE without open element".into()))?;
                    write!(self.writer, "</{name}>")?;
                }
            }
            ExiEvent::Characters(ch) => {
                self.flush_start(false)?;
                write_escaped(&mut self.writer, &ch.value, false)?;
            }
            ExiEvent::Comment(cm) => {
                self.flush_start(false)?;
                if cm.text.contains("--") || cm.text.ends_with('-') {
                    return Err(Error::XmlParseError("comment contains '--' or ends with '-'".into()));
                }
                write!(self.writer, "<!--{}-->", cm.text)?;
            }
            ExiEvent::ProcessingInstruction(pi) => {
                self.flush_start(false)?;
                if pi.text.contains("?>") {
                    return Err(Error::XmlParseError("PI data contains '?>'".into()));
                }
                if pi.text.is_empty() {
                    write!(self.writer, "<?{}?>", pi.name)?;
                } else {
                    write!(self.writer, "<?{} {}?>", pi.name, pi.text)?;
                }
            }
            ExiEvent::DocType(dt) => {
                self.flush_start(false)?;
                write!(self.writer, "<!DOCTYPE {}", dt.name)?;
                if !dt.public.is_empty() {
                    write!(self.writer, " PUBLIC \"{}\" \"{}\"", dt.public, dt.system)?;
                } else if !dt.system.is_empty() {
                    write!(self.writer, " SYSTEM \"{}\"", dt.system)?;
                }
                if !dt.text.is_empty() {
                    write!(self.writer, " [{}]", dt.text)?;
                }
                self.writer.write_all(b">")?;
            }
            ExiEvent::EntityReference(er) => {
                self.flush_start(false)?;
                write!(self.writer, "&{};", er.name)?;
            }
        }
        Ok(())
    }

    fn finish(mut self) -> Result<()> {
        self.flush_start(false)?;
        if !self.stack.is_empty() {
            return Err(Error::XmlParseError(format!("{} element(s) left open", self.stack.len())));
        }
        self.writer.flush()?;
        Ok(())
    }

    fn pending_start(&mut self, what: &str) -> Result<&mut PendingStart> {
        self.pending
            .as_mut()
            .ok_or_else(|| Error::XmlParseError(format!("{what} outside a start tag")))
    }

    /// In-scope URI of `prefix`, innermost binding first.
    fn uri_of(&self, bindings: &[(Arc<str>, Arc<str>)], prefix: &str) -> Option<Arc<str>> {
        if prefix == "xml" {
            return Some(URI_XML.into());
        }
        bindings
            .iter()
            .rev()
            .chain(self.stack.iter().rev().flat_map(|(_, b)| b.iter().rev()))
            .find(|(p, _)| &**p == prefix)
            .map(|(_, u)| Arc::clone(u))
    }

    /// A prefix bound to `uri` that is not shadowed.
    fn prefix_of(&self, bindings: &[(Arc<str>, Arc<str>)], uri: &str, allow_default: bool) -> Option<Arc<str>> {
        if uri == URI_XML {
            return Some("xml".into());
        }
        bindings
            .iter()
            .rev()
            .chain(self.stack.iter().rev().flat_map(|(_, b)| b.iter().rev()))
            .filter(|(p, u)| &**u == uri && (allow_default || !p.is_empty()))
            .find(|(p, _)| self.uri_of(bindings, p).as_deref() == Some(uri))
            .map(|(p, _)| Arc::clone(p))
    }

    /// Prefix for `qname`, declaring a binding in `bindings` where needed.
    fn bind(&mut self, bindings: &mut Vec<(Arc<str>, Arc<str>)>, qname: &QName, element: bool) -> Arc<str> {
        if qname.uri.is_empty() {
            if element && self.uri_of(bindings, "").is_some_and(|u| !u.is_empty()) {
                bindings.push(("".into(), "".into()));
            }
            return "".into();
        }
        if let Some(prefix) = qname.prefix.as_ref().filter(|p| !p.is_empty() || element) {
            if self.uri_of(bindings, prefix).as_deref() != Some(&*qname.uri) {
                bindings.push((Arc::clone(prefix), Arc::clone(&qname.uri)));
            }
            return Arc::clone(prefix);
        }
        if let Some(prefix) = self.prefix_of(bindings, &qname.uri, element) {
            return prefix;
        }
        let prefix: Arc<str> = loop {
            let candidate = format!("ns{}", self.synthetic);
            self.synthetic += 1;
            if self.uri_of(bindings, &candidate).is_none() {
                break candidate.into();
            }
        };
        bindings.push((Arc::clone(&prefix), Arc::clone(&qname.uri)));
        prefix
    }

    fn flush_start(&mut self, empty: bool) -> Result<()> {
        let Some(start) = self.pending.take() else {
            return Ok(());
        };
        let mut bindings: Vec<(Arc<str>, Arc<str>)> =
            start.namespaces.iter().map(|ns| (Arc::clone(&ns.prefix), Arc::clone(&ns.uri))).collect();

        let name = prefixed(&self.bind(&mut bindings, &start.qname, true), &start.qname.local_name);
        let mut attributes = Vec::with_capacity(start.attributes.len() + 2);
        if let Some(type_name) = &start.type_cast {
            let xsi = self.bind(&mut bindings, &QName::with_prefix(URI_XSI, "type", "xsi"), false);
            let value = prefixed(&self.bind(&mut bindings, type_name, false), &type_name.local_name);
            attributes.push((prefixed(&xsi, "type"), value));
        }
        if let Some(nil) = start.nil {
            let xsi = self.bind(&mut bindings, &QName::with_prefix(URI_XSI, "nil", "xsi"), false);
            attributes.push((prefixed(&xsi, "nil"), nil.to_string()));
        }
        for at in &start.attributes {
            let prefix = self.bind(&mut bindings, &at.qname, false);
            attributes.push((prefixed(&prefix, &at.qname.local_name), at.value.to_string()));
        }

        write!(self.writer, "<{name}")?;
        for (prefix, uri) in &bindings {
            if prefix.is_empty() {
                self.writer.write_all(b" xmlns=\"")?;
            } else {
                write!(self.writer, " xmlns:{prefix}=\"")?;
            }
            write_escaped(&mut self.writer, uri, true)?;
            self.writer.write_all(b"\"")?;
        }
        for (name, value) in &attributes {
            write!(self.writer, " {name}=\"")?;
            write_escaped(&mut self.writer, value, true)?;
            self.writer.write_all(b"\"")?;
        }
        if empty {
            self.writer.write_all(b"/>")?;
        } else {
            self.writer.write_all(b">")?;
            self.stack.push((name, bindings));
        }
        Ok(())
    }
}

fn prefixed(prefix: &str, local_name: &str) -> String {
    if prefix.is_empty() {
        local_name.to_string()
    } else {
        format!("{prefix}:{local_name}")
    }
}

/// Escapes markup characters; in attribute values also quotes and
/// whitespace that attribute normalization would otherwise change.
fn write_escaped(writer: &mut impl Write, s: &str, attribute: bool) -> Result<()> {
    let mut start = 0;
    for (pos, ch) in s.char_indices() {
        let replacement = match ch {
            '&' => "&amp;",
            '<' => "&lt;",
            '>' if !attribute => "&gt;",
            '"' if attribute => "&quot;",
            '\n' if attribute => "&#xA;",
            '\t' if attribute => "&#x9;",
            '\r' => "&#xD;",
            _ => continue,
        };
        writer.write_all(&s.as_bytes()[start..pos])?;
        writer.write_all(replacement.as_bytes())?;
        start = pos + ch.len_utf8();
    }
    writer.write_all(&s.as_bytes()[start..])?;
    Ok(())
}
