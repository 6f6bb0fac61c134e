//! XML → event sequence.
//!
//! Liest ein XML-Dokument mit `quick_xml::NsReader`, löst Namespaces auf und
//! liefert die Event-Folge, die [`crate::Encoder`] erwartet:
//!
//! - `xsi:type` wird zu [`ExiEvent::TypeCast`] (Prefix im Wert aufgelöst),
//!   `xsi:nil` mit boolschem Wert zu [`ExiEvent::Nil`].
//! - Nach SE folgen NS (nur mit `preserve.prefixes`), TP, NIL und die übrigen
//!   Attribute sortiert nach local-name, dann URI.
//! - Benachbarte Textstücke (Text, CDATA, Zeichen- und Entity-Referenzen)
//!   werden zu einem CH zusammengefasst.
//! - Reiner Whitespace direkt vor einem Element oder nach einem Kind-Element
//!   gilt als Einrückung und entfällt.
//!
//! # Beispiel
//!
//! ```
//! use exigram::{xml, ExiEvent, GrammarOptions, QName};
//!
//! let events = xml::parse_events(r#"<a x="1">hi</a>"#, &GrammarOptions::default()).unwrap();
//! assert_eq!(events[1], ExiEvent::start(QName::new("", "a")));
//! assert_eq!(events[2], ExiEvent::attribute(QName::new("", "x"), "1"));
//! assert_eq!(events[3], ExiEvent::characters("hi"));
//! ```

use std::borrow::Cow;

use memchr::memchr;
use quick_xml::escape::resolve_predefined_entity;
use quick_xml::events::{BytesStart, Event};
use quick_xml::name::{QName as XmlQName, ResolveResult};
use quick_xml::reader::NsReader;

use crate::event::{AtContent, DtContent, ErContent, NsContent, PiContent};
use crate::options::{GrammarOptions, Preserve};
use crate::qname::{QName, URI_XML};
use crate::{Error, ExiEvent, FastHashMap, Result};

/// Parses `xml` into the event sequence of one document (SD … ED).
///
/// # Errors
///
/// [`Error::XmlParseError`] for malformed XML, unbound prefixes, character
/// data outside the root element and undeclared entities (unless
/// `preserve.dtd` keeps them as ER events).
pub fn parse_events(xml: &str, options: &GrammarOptions) -> Result<Vec<ExiEvent>> {
    let mut parser = Parser::new(*options.preserve());
    let mut reader = NsReader::from_str(xml);
    reader.config_mut().trim_text(false);

    parser.out.push(ExiEvent::StartDocument);
    loop {
        let event = reader
            .read_event()
            .map_err(|e| Error::XmlParseError(format!("at {}: {e}", reader.buffer_position())))?;
        match event {
            Event::Start(e) => {
                parser.start(&reader, &e)?;
                parser.open.push(false);
            }
            Event::Empty(e) => {
                parser.start(&reader, &e)?;
                parser.out.push(ExiEvent::EndElement);
            }
            Event::End(_) => {
                parser.flush_text(Boundary::End)?;
                parser.open.pop().ok_or_else(|| Error::XmlParseError("end tag without start tag".into()))?;
                parser.out.push(ExiEvent::EndElement);
            }
            Event::Text(e) => {
                let raw = utf8(&e)?;
                let text = quick_xml::escape::unescape(raw).map_err(|e| Error::XmlParseError(e.to_string()))?;
                parser.text(&normalize_line_endings(&text))?;
            }
            Event::CData(e) => {
                let raw = utf8(&e)?;
                parser.text(&normalize_line_endings(raw))?;
            }
            Event::GeneralRef(e) => parser.reference(utf8(&e)?)?,
            Event::Comment(e) => {
                if parser.preserve.comments {
                    parser.flush_text(Boundary::Other)?;
                    parser.out.push(ExiEvent::comment(&normalize_line_endings(utf8(&e)?)));
                }
            }
            Event::PI(e) => {
                if parser.preserve.pis {
                    parser.flush_text(Boundary::Other)?;
                    let name = utf8(e.target())?;
                    // Der Trenner zwischen Target und Daten gehört nicht zu den Daten
                    let text = normalize_line_endings(utf8(e.content())?.trim_start());
                    parser.out.push(ExiEvent::ProcessingInstruction(PiContent {
                        name: name.into(),
                        text: text.as_ref().into(),
                    }));
                }
            }
            Event::DocType(e) => {
                let doctype = parse_doctype(utf8(&e)?);
                parser.entities.extend(internal_entities(&doctype.text));
                if parser.preserve.dtd {
                    parser.out.push(ExiEvent::DocType(doctype));
                }
            }
            Event::Decl(_) => {}
            Event::Eof => break,
        }
    }
    if !parser.open.is_empty() {
        return Err(Error::XmlParseError(format!("{} unclosed element(s)", parser.open.len())));
    }
    if !parser.saw_root {
        return Err(Error::XmlParseError("no root element".into()));
    }
    parser.out.push(ExiEvent::EndDocument);
    Ok(parser.out)
}

/// What ends a pending text run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Boundary {
    Start,
    End,
    Other,
}

#[derive(Debug)]
struct Parser {
    preserve: Preserve,
    out: Vec<ExiEvent>,
    /// Pro offenem Element: ob schon ein Kind-Element gesehen wurde.
    open: Vec<bool>,
    pending: Option<String>,
    entities: FastHashMap<String, String>,
    saw_root: bool,
}

impl Parser {
    fn new(preserve: Preserve) -> Self {
        Self {
            preserve,
            out: Vec::new(),
            open: Vec::new(),
            pending: None,
            entities: FastHashMap::default(),
            saw_root: false,
        }
    }

    fn mark_child(&mut self) {
        if let Some(flag) = self.open.last_mut() {
            *flag = true;
        }
    }

    fn text(&mut self, value: &str) -> Result<()> {
        if value.is_empty() {
            return Ok(());
        }
        if self.open.is_empty() {
            if value.trim().is_empty() {
                return Ok(());
            }
            return Err(Error::XmlParseError("character data outside the root element".into()));
        }
        self.pending.get_or_insert_with(String::new).push_str(value);
        Ok(())
    }

    fn flush_text(&mut self, boundary: Boundary) -> Result<()> {
        let Some(text) = self.pending.take() else {
            return Ok(());
        };
        let indentation = text.chars().all(|c| matches!(c, ' ' | '\t' | '\n' | '\r'))
            && match boundary {
                Boundary::Start => true,
                Boundary::End => self.open.last() == Some(&true),
                Boundary::Other => false,
            };
        if !indentation {
            self.out.push(ExiEvent::characters(&text));
        }
        Ok(())
    }

    fn reference(&mut self, name: &str) -> Result<()> {
        if let Some(code) = name.strip_prefix('#') {
            let ch = resolve_char_reference(code)
                .ok_or_else(|| Error::XmlParseError(format!("invalid character reference &{name};")))?;
            return self.text(ch.encode_utf8(&mut [0; 4]));
        }
        if let Some(value) = resolve_predefined_entity(name) {
            return self.text(value);
        }
        if self.preserve.dtd {
            if self.open.is_empty() {
                return Err(Error::XmlParseError(format!("entity reference &{name}; outside the root element")));
            }
            self.flush_text(Boundary::Other)?;
            self.out.push(ExiEvent::EntityReference(ErContent { name: name.into() }));
            return Ok(());
        }
        match self.entities.get(name).cloned() {
            Some(value) => self.text(&value),
            None => Err(Error::XmlParseError(format!("undeclared entity &{name};"))),
        }
    }

    fn start(&mut self, reader: &NsReader<&[u8]>, e: &BytesStart<'_>) -> Result<()> {
        if self.open.is_empty() {
            if self.saw_root {
                return Err(Error::XmlParseError("more than one root element".into()));
            }
            self.saw_root = true;
        }
        self.flush_text(Boundary::Start)?;
        self.mark_child();

        let (uri, local_name) = resolve(reader.resolver().resolve_element(e.name()))?;
        let name = e.name();
        let prefix = split_prefix(name.as_ref());
        let element = match (self.preserve.prefixes, prefix) {
            (true, Some(p)) => QName::with_prefix(uri, local_name, utf8(p)?),
            _ => QName::new(uri, local_name),
        };
        self.out.push(ExiEvent::StartElement(element.clone()));

        let mut namespaces = Vec::new();
        let mut type_cast = None;
        let mut nil = None;
        let mut attributes: Vec<AtContent> = Vec::new();
        for attr in e.attributes() {
            let attr = attr.map_err(|er| Error::XmlParseError(er.to_string()))?;
            let key = attr.key.as_ref();
            let value = self.attribute_value(utf8(&attr.value)?)?;

            if key == b"xmlns" || key.starts_with(b"xmlns:") {
                let prefix = utf8(key.get(6..).unwrap_or_default())?;
                let local_element_ns = element.prefix.as_deref().unwrap_or("") == prefix && *element.uri == *value;
                namespaces.push(NsContent { uri: value.as_str().into(), prefix: prefix.into(), local_element_ns });
                continue;
            }

            let (uri, local_name) = match split_prefix(key) {
                Some(b"xml") => (URI_XML.to_string(), utf8(&key[4..])?.to_string()),
                _ => resolve(reader.resolver().resolve_attribute(attr.key))?,
            };
            let qname = match (self.preserve.prefixes, split_prefix(key)) {
                (true, Some(p)) => QName::with_prefix(uri, local_name, utf8(p)?),
                _ => QName::new(uri, local_name),
            };
            if qname.is_xsi_type() {
                let (uri, local_name) = resolve(reader.resolver().resolve_element(XmlQName(value.trim().as_bytes())))?;
                type_cast = Some(QName::new(uri, local_name));
            } else if qname.is_xsi_nil() && parse_xsd_boolean(&value).is_some() {
                nil = parse_xsd_boolean(&value);
            } else {
                attributes.push(AtContent { qname, value: value.as_str().into() });
            }
        }
        attributes.sort_by(|a, b| a.qname.cmp(&b.qname));

        if self.preserve.prefixes {
            self.out.extend(namespaces.into_iter().map(ExiEvent::NamespaceDeclaration));
        }
        self.out.extend(type_cast.map(ExiEvent::TypeCast));
        self.out.extend(nil.map(ExiEvent::Nil));
        self.out.extend(attributes.into_iter().map(ExiEvent::Attribute));
        Ok(())
    }

    /// Attribute value with references resolved and line ends normalized.
    fn attribute_value(&self, raw: &str) -> Result<String> {
        let unescaped = unescape_with_entities(raw, &self.entities)?;
        Ok(normalize_line_endings(&unescaped).into_owned())
    }
}

fn utf8(bytes: &[u8]) -> Result<&str> {
    std::str::from_utf8(bytes).map_err(|e| Error::XmlParseError(e.to_string()))
}

fn resolve<'a>((ns, local): (ResolveResult<'a>, quick_xml::name::LocalName<'a>)) -> Result<(String, String)> {
    let uri = match ns {
        ResolveResult::Bound(ns) => utf8(ns.as_ref())?.to_string(),
        ResolveResult::Unbound => String::new(),
        ResolveResult::Unknown(prefix) => {
            return Err(Error::XmlParseError(format!("unbound prefix '{}'", String::from_utf8_lossy(&prefix))));
        }
    };
    Ok((uri, utf8(local.as_ref())?.to_string()))
}

fn split_prefix(name: &[u8]) -> Option<&[u8]> {
    let pos = memchr(b':', name)?;
    Some(&name[..pos])
}

fn parse_xsd_boolean(value: &str) -> Option<bool> {
    match value.trim() {
        "true" | "1" => Some(true),
        "false" | "0" => Some(false),
        _ => None,
    }
}

/// Löst Zeichenreferenzen, vordefinierte und interne Entities in einem
/// Attributwert auf.
fn unescape_with_entities<'a>(raw: &'a str, entities: &FastHashMap<String, String>) -> Result<Cow<'a, str>> {
    if memchr(b'&', raw.as_bytes()).is_none() {
        return Ok(Cow::Borrowed(raw));
    }
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let after = &rest[amp + 1..];
        let semi = after
            .find(';')
            .ok_or_else(|| Error::XmlParseError(format!("unterminated reference in '{raw}'")))?;
        let name = &after[..semi];
        if let Some(code) = name.strip_prefix('#') {
            let ch = resolve_char_reference(code)
                .ok_or_else(|| Error::XmlParseError(format!("invalid character reference &{name};")))?;
            out.push(ch);
        } else if let Some(value) = resolve_predefined_entity(name) {
            out.push_str(value);
        } else if let Some(value) = entities.get(name) {
            out.push_str(value);
        } else {
            return Err(Error::XmlParseError(format!("undeclared entity &{name};")));
        }
        rest = &after[semi + 1..];
    }
    out.push_str(rest);
    Ok(Cow::Owned(out))
}

/// `49` (dezimal) oder `x31` (hex), ohne `&#` und `;`.
fn resolve_char_reference(code: &str) -> Option<char> {
    let value = match code.strip_prefix('x') {
        Some(hex) => u32::from_str_radix(hex, 16).ok()?,
        None => code.parse::<u32>().ok()?,
    };
    char::from_u32(value)
}

/// XML 1.0 §2.11: `\r\n` und einzelnes `\r` werden zu `\n`.
fn normalize_line_endings(s: &str) -> Cow<'_, str> {
    if memchr(b'\r', s.as_bytes()).is_none() {
        return Cow::Borrowed(s);
    }
    Cow::Owned(s.replace("\r\n", "\n").replace('\r', "\n"))
}

/// Zerlegt den Inhalt von `<!DOCTYPE ...>` in Name, Public-/System-Id und
/// internes Subset.
fn parse_doctype(raw: &str) -> DtContent {
    let trimmed = raw.trim();
    let name_end = trimmed.find(|c: char| c.is_whitespace() || c == '[').unwrap_or(trimmed.len());
    let (name, rest) = trimmed.split_at(name_end);
    let mut rest = rest.trim_start();

    let mut public = "";
    let mut system = "";
    if let Some(after) = rest.strip_prefix("SYSTEM") {
        (system, rest) = quoted(after.trim_start());
    } else if let Some(after) = rest.strip_prefix("PUBLIC") {
        (public, rest) = quoted(after.trim_start());
        (system, rest) = quoted(rest.trim_start());
    }

    let text = rest
        .find('[')
        .and_then(|open| rest[open + 1..].rfind(']').map(|close| &rest[open + 1..open + 1 + close]))
        .unwrap_or("");

    DtContent { name: name.into(), public: public.into(), system: system.into(), text: text.into() }
}

fn quoted(s: &str) -> (&str, &str) {
    let Some(quote) = s.chars().next().filter(|c| *c == '"' || *c == '\'') else {
        return ("", s);
    };
    match s[1..].find(quote) {
        Some(end) => (&s[1..1 + end], &s[end + 2..]),
        None => ("", s),
    }
}

/// Interne `<!ENTITY name "value">`-Deklarationen; externe und
/// Parameter-Entities werden übergangen.
fn internal_entities(subset: &str) -> FastHashMap<String, String> {
    let mut entities = FastHashMap::default();
    let mut rest = subset;
    while let Some(start) = rest.find("<!ENTITY") {
        let decl = rest[start + "<!ENTITY".len()..].trim_start();
        rest = decl;
        if decl.starts_with('%') {
            continue;
        }
        let name_end = decl.find(char::is_whitespace).unwrap_or(decl.len());
        let (name, after) = decl.split_at(name_end);
        let (value, remaining) = quoted(after.trim_start());
        if !name.is_empty() && remaining.len() < after.trim_start().len() {
            entities.insert(name.to_string(), value.to_string());
        }
        rest = remaining;
    }
    entities
}
