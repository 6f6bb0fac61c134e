//! Infoset event model fed to the encoder and produced by the decoder.
//!
//! xsi:type und xsi:nil sind eigene Events ([`ExiEvent::TypeCast`],
//! [`ExiEvent::Nil`]), weil sie die Grammatik des offenen Elements umbinden.

use std::fmt;
use std::sync::Arc;

use crate::qname::QName;

/// Content of a namespace declaration (NS).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NsContent {
    /// The declared namespace URI.
    pub uri: Arc<str>,
    /// The bound prefix, empty for the default namespace.
    pub prefix: Arc<str>,
    /// True if this declaration names the namespace of the enclosing element.
    pub local_element_ns: bool,
}

/// Content of an attribute (AT).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AtContent {
    /// Attribute name.
    pub qname: QName,
    /// Lexical value.
    pub value: Arc<str>,
}

/// Content of character data (CH).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChContent {
    /// Lexical value.
    pub value: Arc<str>,
}

/// Content of a comment (CM).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CmContent {
    /// Comment text.
    pub text: Arc<str>,
}

/// Content of a processing instruction (PI).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PiContent {
    /// PI target.
    pub name: Arc<str>,
    /// PI data.
    pub text: Arc<str>,
}

/// Content of a document type declaration (DT).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DtContent {
    /// Document type name.
    pub name: Arc<str>,
    /// Public identifier, empty if absent.
    pub public: Arc<str>,
    /// System identifier, empty if absent.
    pub system: Arc<str>,
    /// Internal subset, empty if absent.
    pub text: Arc<str>,
}

/// Content of an entity reference (ER).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErContent {
    /// Entity name.
    pub name: Arc<str>,
}

/// One infoset event in document order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExiEvent {
    /// SD
    StartDocument,
    /// ED
    EndDocument,
    /// SE
    StartElement(QName),
    /// EE
    EndElement,
    /// AT (any attribute except xsi:type; xsi:nil with a boolean value is
    /// normalized to [`ExiEvent::Nil`] by the encoder).
    Attribute(AtContent),
    /// xsi:type: rebinds the open element to the named type.
    TypeCast(QName),
    /// xsi:nil
    Nil(bool),
    /// CH
    Characters(ChContent),
    /// NS
    NamespaceDeclaration(NsContent),
    /// CM
    Comment(CmContent),
    /// PI
    ProcessingInstruction(PiContent),
    /// DT
    DocType(DtContent),
    /// ER
    EntityReference(ErContent),
}

impl ExiEvent {
    /// Kurzform für `StartElement`.
    pub fn start(qname: QName) -> Self {
        Self::StartElement(qname)
    }

    /// Kurzform für ein Attribut.
    pub fn attribute(qname: QName, value: &str) -> Self {
        Self::Attribute(AtContent { qname, value: value.into() })
    }

    /// Kurzform für Zeichendaten.
    pub fn characters(value: &str) -> Self {
        Self::Characters(ChContent { value: value.into() })
    }

    /// Kurzform für einen Kommentar.
    pub fn comment(text: &str) -> Self {
        Self::Comment(CmContent { text: text.into() })
    }
}

/// Kompakte Notation für Fehlermeldungen und Logs (`SE(a)`, `AT(b)`, `TP`, ...).
impl fmt::Display for ExiEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StartDocument => write!(f, "SD"),
            Self::EndDocument => write!(f, "ED"),
            Self::StartElement(q) => write!(f, "SE({q})"),
            Self::EndElement => write!(f, "EE"),
            Self::Attribute(at) => write!(f, "AT({})", at.qname),
            Self::TypeCast(q) => write!(f, "TP({q})"),
            Self::Nil(v) => write!(f, "NIL({v})"),
            Self::Characters(_) => write!(f, "CH"),
            Self::NamespaceDeclaration(ns) => write!(f, "NS({}={})", ns.prefix, ns.uri),
            Self::Comment(_) => write!(f, "CM"),
            Self::ProcessingInstruction(pi) => write!(f, "PI({})", pi.name),
            Self::DocType(dt) => write!(f, "DT({})", dt.name),
            Self::EntityReference(er) => write!(f, "ER({})", er.name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_kurzformen() {
        assert_eq!(ExiEvent::start(QName::new("urn:a", "x")).to_string(), "SE({urn:a}x)");
        assert_eq!(ExiEvent::TypeCast(QName::xsd("int")).to_string(), format!("TP({{{}}}int)", crate::qname::URI_XSD));
        assert_eq!(ExiEvent::Nil(true).to_string(), "NIL(true)");
        assert_eq!(ExiEvent::characters("x").to_string(), "CH");
    }

    #[test]
    fn attribut_gleichheit_ignoriert_prefix() {
        let a = ExiEvent::attribute(QName::with_prefix("urn:a", "x", "p"), "1");
        let b = ExiEvent::attribute(QName::new("urn:a", "x"), "1");
        assert_eq!(a, b);
    }
}
