//! Event types: the candidate events of one grammar position.

use std::fmt;
use std::sync::Arc;

use crate::datatype::Datatype;
use crate::event_code::EventCode;
use crate::qname::QName;
use crate::schema::TypeId;

/// Kind of an event type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// SD
    StartDocument,
    /// ED
    EndDocument,
    /// SE(qname)
    StartElement,
    /// SE(uri:*)
    StartElementNs,
    /// SE(*)
    StartElementAny,
    /// EE
    EndElement,
    /// AT(qname), typed when a datatype is bound.
    Attribute,
    /// AT(uri:*) from a declared attribute wildcard.
    AttributeNs,
    /// AT(*) from a declared attribute wildcard.
    AttributeAny,
    /// AT(*) with untyped value (built-in and undeclared productions).
    AttributeAnyUntyped,
    /// AT(qname) with untyped value: fallback of a typed declared attribute.
    AttributeUntyped,
    /// CH with untyped value.
    Characters,
    /// CH bound to a schema datatype.
    CharactersSchema,
    /// NS
    NamespaceDeclaration,
    /// CM
    Comment,
    /// PI
    ProcessingInstruction,
    /// ER
    EntityReference,
    /// DT
    DocType,
    /// AT(xsi:type)
    TypeCast,
    /// AT(xsi:nil)
    Nil,
}

impl EventKind {
    /// Kurzform wie in den Grammatik-Tabellen.
    pub fn short_name(self) -> &'static str {
        match self {
            Self::StartDocument => "SD",
            Self::EndDocument => "ED",
            Self::StartElement | Self::StartElementNs | Self::StartElementAny => "SE",
            Self::EndElement => "EE",
            Self::Attribute
            | Self::AttributeNs
            | Self::AttributeAny
            | Self::AttributeAnyUntyped
            | Self::AttributeUntyped => "AT",
            Self::Characters | Self::CharactersSchema => "CH",
            Self::NamespaceDeclaration => "NS",
            Self::Comment => "CM",
            Self::ProcessingInstruction => "PI",
            Self::EntityReference => "ER",
            Self::DocType => "DT",
            Self::TypeCast => "AT(xsi:type)",
            Self::Nil => "AT(xsi:nil)",
        }
    }

    /// SE in any form.
    pub fn is_start_element(self) -> bool {
        matches!(self, Self::StartElement | Self::StartElementNs | Self::StartElementAny)
    }

    /// AT in any form, including xsi:type and xsi:nil.
    pub fn is_attribute(self) -> bool {
        matches!(
            self,
            Self::Attribute
                | Self::AttributeNs
                | Self::AttributeAny
                | Self::AttributeAnyUntyped
                | Self::AttributeUntyped
                | Self::TypeCast
                | Self::Nil
        )
    }

    /// Wildcard forms whose match carries the concrete name in the stream.
    pub fn is_wildcard(self) -> bool {
        matches!(
            self,
            Self::StartElementNs
                | Self::StartElementAny
                | Self::AttributeNs
                | Self::AttributeAny
                | Self::AttributeAnyUntyped
        )
    }
}

/// One candidate event at a grammar position. Immutable once its list is built.
#[derive(Debug, Clone, PartialEq)]
pub struct EventType {
    kind: EventKind,
    name: Option<QName>,
    namespace: Option<Arc<str>>,
    datatype: Option<Datatype>,
    code: EventCode,
    /// Declared target state of a schema grammar; `None` = SINK, undeclared
    /// or built-in (the transition then follows from the kind).
    pub(crate) next: Option<u32>,
    /// Type and nillable flag of a declared SE(qname).
    pub(crate) element: Option<(TypeId, bool)>,
}

impl EventType {
    /// New event type of `kind`; the code is assigned by the list builder.
    pub fn new(kind: EventKind) -> Self {
        Self { kind, name: None, namespace: None, datatype: None, code: EventCode::one(0), next: None, element: None }
    }

    /// Bindet einen Namen.
    pub fn with_name(mut self, name: QName) -> Self {
        self.name = Some(name);
        self
    }

    /// Bindet den Namespace eines `uri:*` Wildcards.
    pub fn with_namespace(mut self, uri: Arc<str>) -> Self {
        self.namespace = Some(uri);
        self
    }

    /// Bindet einen Datentyp.
    pub fn with_datatype(mut self, datatype: Datatype) -> Self {
        self.datatype = Some(datatype);
        self
    }

    pub(crate) fn with_next(mut self, next: Option<u32>) -> Self {
        self.next = next;
        self
    }

    pub(crate) fn with_element(mut self, type_id: TypeId, nillable: bool) -> Self {
        self.element = Some((type_id, nillable));
        self
    }

    pub(crate) fn set_code(&mut self, code: EventCode) {
        self.code = code;
    }

    /// Kind.
    pub fn kind(&self) -> EventKind {
        self.kind
    }

    /// Concrete name (SE(qname), AT(qname), TypeCast, Nil).
    pub fn name(&self) -> Option<&QName> {
        self.name.as_ref()
    }

    /// Namespace of a `uri:*` wildcard.
    pub fn namespace(&self) -> Option<&Arc<str>> {
        self.namespace.as_ref()
    }

    /// Bound datatype.
    pub fn datatype(&self) -> Option<&Datatype> {
        self.datatype.as_ref()
    }

    /// Event code within the owning list.
    pub fn code(&self) -> EventCode {
        self.code
    }

    /// Whether the value of this event type is bound to a schema datatype.
    pub fn is_typed(&self) -> bool {
        matches!(self.kind, EventKind::CharactersSchema)
            || (matches!(self.kind, EventKind::Attribute) && self.datatype.is_some())
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.kind, &self.name, &self.namespace) {
            (EventKind::StartElement | EventKind::Attribute, Some(q), _) => {
                write!(f, "{}({q})", self.kind.short_name())?
            }
            (EventKind::StartElementNs | EventKind::AttributeNs, _, Some(uri)) => {
                write!(f, "{}({{{uri}}}*)", self.kind.short_name())?
            }
            (EventKind::StartElementAny | EventKind::AttributeAny, _, _) => {
                write!(f, "{}(*)", self.kind.short_name())?
            }
            (EventKind::AttributeAnyUntyped, _, _) => write!(f, "AT(*)[untyped]")?,
            (EventKind::AttributeUntyped, Some(q), _) => write!(f, "AT({q})[untyped]")?,
            (EventKind::CharactersSchema, _, _) => write!(f, "CH[schema]")?,
            (kind, _, _) => write!(f, "{}", kind.short_name())?,
        }
        write!(f, " {}", self.code)
    }
}
