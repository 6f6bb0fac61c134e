//! Pre-compiled schema tables.
//!
//! XSD-Parsing gehört nicht zu dieser Crate: Schemas werden über den
//! [`SchemaBuilder`] als Typ- und Deklarationstabellen aufgebaut. Der Builder
//! registriert die 46 built-in Typen des XSD-Namespace (inklusive
//! `xsd:anyType` als ur-type) samt Ableitungsketten.
//!
//! # Beispiel
//!
//! ```
//! use exigram::schema::{ComplexType, ContentType, MaxOccurs, Particle, Schema, Term};
//! use exigram::QName;
//!
//! let mut b = Schema::builder();
//! let int = b.builtin("int").unwrap();
//! let price = b.element(QName::new("urn:shop", "price"), int, false);
//! let item = b.complex_type(
//!     Some(QName::new("urn:shop", "Item")),
//!     None,
//!     ComplexType::elements(Particle::once(Term::Element(price)), false),
//! );
//! b.global_element(QName::new("urn:shop", "item"), item, false);
//! let schema = b.build().unwrap();
//! assert_eq!(schema.global_elements().count(), 1);
//! ```

use std::sync::Arc;

use crate::datatype::{Datatype, EnumerationFacet};
use crate::qname::{QName, URI_XSD};
use crate::{Error, FastIndexMap, Result};

/// Index of a type definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeId(pub(crate) u32);

/// Index of an element declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ElementId(pub(crate) u32);

impl TypeId {
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

impl ElementId {
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

/// Upper bound of a particle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaxOccurs {
    /// Endliche Obergrenze.
    Bounded(u32),
    /// `unbounded`
    Unbounded,
}

/// Namespace constraint of a wildcard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Wildcard {
    /// `##any`
    Any,
    /// Explicit namespace list (`""` for absent namespace).
    Namespaces(Vec<Arc<str>>),
}

/// Term of a particle.
#[derive(Debug, Clone, PartialEq)]
pub enum Term {
    /// Element declaration.
    Element(ElementId),
    /// Element wildcard.
    Wildcard(Wildcard),
    /// Sequence model group.
    Sequence(Vec<Particle>),
    /// Choice model group.
    Choice(Vec<Particle>),
}

/// A term with occurrence bounds.
#[derive(Debug, Clone, PartialEq)]
pub struct Particle {
    /// minOccurs
    pub min_occurs: u32,
    /// maxOccurs
    pub max_occurs: MaxOccurs,
    /// Term
    pub term: Term,
}

impl Particle {
    /// `minOccurs=1 maxOccurs=1`
    pub fn once(term: Term) -> Self {
        Self { min_occurs: 1, max_occurs: MaxOccurs::Bounded(1), term }
    }

    /// `minOccurs=0 maxOccurs=1`
    pub fn optional(term: Term) -> Self {
        Self { min_occurs: 0, max_occurs: MaxOccurs::Bounded(1), term }
    }

    /// `minOccurs=min maxOccurs=unbounded`
    pub fn repeated(min_occurs: u32, term: Term) -> Self {
        Self { min_occurs, max_occurs: MaxOccurs::Unbounded, term }
    }

    /// Beliebige Grenzen.
    pub fn new(min_occurs: u32, max_occurs: MaxOccurs, term: Term) -> Self {
        Self { min_occurs, max_occurs, term }
    }
}

/// Attribute use of a complex type.
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeUse {
    /// Attribute name.
    pub name: QName,
    /// Simple type of the value.
    pub type_id: TypeId,
    /// `use="required"`
    pub required: bool,
}

/// Content type of a complex type.
#[derive(Debug, Clone, PartialEq)]
pub enum ContentType {
    /// No children, no character data.
    Empty,
    /// Character data of the given simple type.
    Simple(TypeId),
    /// Element content, optionally mixed with character data.
    Elements {
        /// Content model.
        particle: Particle,
        /// Mixed content.
        mixed: bool,
    },
}

/// Complex type definition.
#[derive(Debug, Clone, PartialEq)]
pub struct ComplexType {
    /// Attribute uses (order irrelevant; grammars sort them).
    pub attributes: Vec<AttributeUse>,
    /// Attribute wildcard.
    pub attribute_wildcard: Option<Wildcard>,
    /// Content type.
    pub content: ContentType,
}

impl ComplexType {
    /// Complex type with element content and no attributes.
    pub fn elements(particle: Particle, mixed: bool) -> Self {
        Self { attributes: Vec::new(), attribute_wildcard: None, content: ContentType::Elements { particle, mixed } }
    }

    /// Complex type with simple content.
    pub fn simple_content(type_id: TypeId) -> Self {
        Self { attributes: Vec::new(), attribute_wildcard: None, content: ContentType::Simple(type_id) }
    }

    /// Empty complex type.
    pub fn empty() -> Self {
        Self { attributes: Vec::new(), attribute_wildcard: None, content: ContentType::Empty }
    }

    /// Fügt eine Attribut-Verwendung hinzu.
    pub fn with_attribute(mut self, name: QName, type_id: TypeId, required: bool) -> Self {
        self.attributes.push(AttributeUse { name, type_id, required });
        self
    }

    /// Setzt die Attribut-Wildcard.
    pub fn with_attribute_wildcard(mut self, wildcard: Wildcard) -> Self {
        self.attribute_wildcard = Some(wildcard);
        self
    }
}

/// Simple or complex.
#[derive(Debug, Clone, PartialEq)]
pub enum TypeKind {
    /// Simple type with its value datatype.
    Simple(Datatype),
    /// Complex type.
    Complex(ComplexType),
}

/// A type definition.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeDefinition {
    /// Name; anonymous types have none.
    pub name: Option<QName>,
    /// Base type in the derivation chain.
    pub base: Option<TypeId>,
    /// Definition.
    pub kind: TypeKind,
}

/// An element declaration (global or local).
#[derive(Debug, Clone, PartialEq)]
pub struct ElementDeclaration {
    /// Element name.
    pub name: QName,
    /// Type.
    pub type_id: TypeId,
    /// `nillable="true"`
    pub nillable: bool,
}

/// Built-in XSD Typen: (local-name, Basistyp, Datentyp). Reihenfolge =
/// Registrierungsreihenfolge; Basistypen stehen immer vor ihren Ableitungen.
const BUILTIN_SIMPLE_TYPES: &[(&str, &str, Datatype)] = &[
    ("anySimpleType", "anyType", Datatype::String),
    ("string", "anySimpleType", Datatype::String),
    ("normalizedString", "string", Datatype::String),
    ("token", "normalizedString", Datatype::String),
    ("language", "token", Datatype::String),
    ("Name", "token", Datatype::String),
    ("NCName", "Name", Datatype::String),
    ("ID", "NCName", Datatype::String),
    ("IDREF", "NCName", Datatype::String),
    ("ENTITY", "NCName", Datatype::String),
    ("NMTOKEN", "token", Datatype::String),
    ("IDREFS", "anySimpleType", Datatype::String),
    ("ENTITIES", "anySimpleType", Datatype::String),
    ("NMTOKENS", "anySimpleType", Datatype::String),
    ("anyURI", "anySimpleType", Datatype::String),
    ("QName", "anySimpleType", Datatype::String),
    ("NOTATION", "anySimpleType", Datatype::String),
    ("boolean", "anySimpleType", Datatype::Boolean),
    ("decimal", "anySimpleType", Datatype::Decimal),
    ("integer", "decimal", Datatype::Integer),
    ("nonPositiveInteger", "integer", Datatype::Integer),
    ("negativeInteger", "nonPositiveInteger", Datatype::Integer),
    ("long", "integer", Datatype::Integer),
    ("int", "long", Datatype::Integer),
    ("short", "int", Datatype::Integer),
    ("byte", "short", Datatype::Integer),
    ("nonNegativeInteger", "integer", Datatype::UnsignedInteger),
    ("positiveInteger", "nonNegativeInteger", Datatype::UnsignedInteger),
    ("unsignedLong", "nonNegativeInteger", Datatype::UnsignedInteger),
    ("unsignedInt", "unsignedLong", Datatype::UnsignedInteger),
    ("unsignedShort", "unsignedInt", Datatype::UnsignedInteger),
    ("unsignedByte", "unsignedShort", Datatype::UnsignedInteger),
    ("float", "anySimpleType", Datatype::Float),
    ("double", "anySimpleType", Datatype::Float),
    ("duration", "anySimpleType", Datatype::String),
    ("dateTime", "anySimpleType", Datatype::String),
    ("time", "anySimpleType", Datatype::String),
    ("date", "anySimpleType", Datatype::String),
    ("gYearMonth", "anySimpleType", Datatype::String),
    ("gYear", "anySimpleType", Datatype::String),
    ("gMonthDay", "anySimpleType", Datatype::String),
    ("gDay", "anySimpleType", Datatype::String),
    ("gMonth", "anySimpleType", Datatype::String),
    ("hexBinary", "anySimpleType", Datatype::String),
    ("base64Binary", "anySimpleType", Datatype::String),
];

/// Immutable schema tables consumed by `GrammarCache::compile`.
#[derive(Debug, Clone, PartialEq)]
pub struct Schema {
    pub(crate) types: Vec<TypeDefinition>,
    pub(crate) elements: Vec<ElementDeclaration>,
    pub(crate) type_names: FastIndexMap<QName, TypeId>,
    pub(crate) global_elements: FastIndexMap<QName, ElementId>,
}

impl Schema {
    /// Starts a builder pre-populated with the XSD built-in types.
    pub fn builder() -> SchemaBuilder {
        SchemaBuilder::new()
    }

    /// Type definition by id.
    pub fn type_definition(&self, id: TypeId) -> Option<&TypeDefinition> {
        self.types.get(id.index())
    }

    /// Element declaration by id.
    pub fn element(&self, id: ElementId) -> Option<&ElementDeclaration> {
        self.elements.get(id.index())
    }

    /// Named type lookup.
    pub fn type_by_name(&self, name: &QName) -> Option<TypeId> {
        self.type_names.get(name).copied()
    }

    /// Global element lookup.
    pub fn global_element(&self, name: &QName) -> Option<ElementId> {
        self.global_elements.get(name).copied()
    }

    /// Global element declarations in registration order.
    pub fn global_elements(&self) -> impl Iterator<Item = (&QName, ElementId)> {
        self.global_elements.iter().map(|(q, id)| (q, *id))
    }

    /// Number of type definitions.
    pub fn type_count(&self) -> usize {
        self.types.len()
    }

    /// `xsd:anyType`
    pub fn any_type(&self) -> TypeId {
        TypeId(0)
    }

    /// Whether `derived` has `base` in its derivation chain (reflexive).
    pub fn derives_from(&self, derived: TypeId, base: TypeId) -> bool {
        let mut current = Some(derived);
        // Zyklen werden von compile() abgelehnt; die Schranke schützt nur
        // vor Endlosschleifen bei ungeprüften Tabellen.
        for _ in 0..=self.types.len() {
            match current {
                Some(t) if t == base => return true,
                Some(t) => current = self.types.get(t.index()).and_then(|d| d.base),
                None => return false,
            }
        }
        false
    }

    /// Whether a named type other than `type_id` derives from it. Decides
    /// whether xsi:type is admissible under strict options.
    pub fn has_named_subtypes(&self, type_id: TypeId) -> bool {
        self.type_names.values().any(|&t| t != type_id && self.derives_from(t, type_id))
    }

    /// Datatype of a simple type, or of the simple content of a complex type.
    pub fn datatype_of(&self, type_id: TypeId) -> Option<&Datatype> {
        match &self.types.get(type_id.index())?.kind {
            TypeKind::Simple(dt) => Some(dt),
            TypeKind::Complex(_) => None,
        }
    }

    /// Alle Namespaces, die im Schema vorkommen (sortiert, ohne Duplikate).
    pub(crate) fn namespaces(&self) -> Vec<Arc<str>> {
        let mut uris: Vec<Arc<str>> = Vec::new();
        let mut add = |uri: &Arc<str>| {
            if !uris.iter().any(|u| u == uri) {
                uris.push(uri.clone());
            }
        };
        for name in self.type_names.keys() {
            add(&name.uri);
        }
        for decl in &self.elements {
            add(&decl.name.uri);
        }
        for def in &self.types {
            if let TypeKind::Complex(ct) = &def.kind {
                for at in &ct.attributes {
                    add(&at.name.uri);
                }
            }
        }
        uris.sort();
        uris
    }

    /// Alle local-names pro Namespace (sortiert, ohne Duplikate).
    pub(crate) fn local_names(&self) -> Vec<(Arc<str>, Vec<Arc<str>>)> {
        let mut by_uri: FastIndexMap<Arc<str>, Vec<Arc<str>>> = FastIndexMap::default();
        let mut add = |q: &QName| {
            let names = by_uri.entry(q.uri.clone()).or_default();
            if !names.iter().any(|n| *n == q.local_name) {
                names.push(q.local_name.clone());
            }
        };
        for name in self.type_names.keys() {
            add(name);
        }
        for decl in &self.elements {
            add(&decl.name);
        }
        for def in &self.types {
            if let TypeKind::Complex(ct) = &def.kind {
                for at in &ct.attributes {
                    add(&at.name);
                }
            }
        }
        let mut out: Vec<(Arc<str>, Vec<Arc<str>>)> = by_uri.into_iter().collect();
        for (_, names) in &mut out {
            names.sort();
        }
        out.sort_by(|a, b| a.0.cmp(&b.0));
        out
    }
}

/// Incremental construction of [`Schema`] tables.
#[derive(Debug, Clone)]
pub struct SchemaBuilder {
    types: Vec<TypeDefinition>,
    elements: Vec<ElementDeclaration>,
    type_names: FastIndexMap<QName, TypeId>,
    global_elements: FastIndexMap<QName, ElementId>,
    errors: Vec<String>,
}

impl SchemaBuilder {
    fn new() -> Self {
        let mut b = Self {
            types: Vec::new(),
            elements: Vec::new(),
            type_names: FastIndexMap::default(),
            global_elements: FastIndexMap::default(),
            errors: Vec::new(),
        };
        // ur-type: Attribut-Wildcard, mixed, beliebige Kindelemente
        let ur_type = ComplexType {
            attributes: Vec::new(),
            attribute_wildcard: Some(Wildcard::Any),
            content: ContentType::Elements {
                particle: Particle::repeated(0, Term::Wildcard(Wildcard::Any)),
                mixed: true,
            },
        };
        b.push_type(Some(QName::xsd("anyType")), None, TypeKind::Complex(ur_type));
        for (local, base, datatype) in BUILTIN_SIMPLE_TYPES {
            let base = b.builtin(base);
            b.push_type(Some(QName::xsd(local)), base, TypeKind::Simple(datatype.clone()));
        }
        b
    }

    fn push_type(&mut self, name: Option<QName>, base: Option<TypeId>, kind: TypeKind) -> TypeId {
        let id = TypeId(self.types.len() as u32);
        if let Some(n) = &name
            && self.type_names.insert(n.clone(), id).is_some()
        {
            self.errors.push(format!("duplicate type name {n}"));
        }
        self.types.push(TypeDefinition { name, base, kind });
        id
    }

    /// Built-in XSD type by local name (`"int"`, `"anyType"`, ...).
    pub fn builtin(&self, local_name: &str) -> Option<TypeId> {
        self.type_names.get(&QName::new(URI_XSD, local_name)).copied()
    }

    /// Simple type restricting `base` without facets.
    pub fn simple_type(&mut self, name: Option<QName>, base: TypeId) -> TypeId {
        let datatype = match self.types.get(base.index()).map(|t| &t.kind) {
            Some(TypeKind::Simple(dt)) => dt.clone(),
            _ => {
                self.errors.push(format!("simple type base {base:?} is not a simple type"));
                Datatype::String
            }
        };
        self.push_type(name, Some(base), TypeKind::Simple(datatype))
    }

    /// Simple type with an enumeration facet over `base`.
    pub fn enumeration(&mut self, name: Option<QName>, base: TypeId, values: &[&str]) -> TypeId {
        let base_datatype = match self.types.get(base.index()).map(|t| &t.kind) {
            Some(TypeKind::Simple(dt)) => dt.clone(),
            _ => {
                self.errors.push(format!("enumeration base {base:?} is not a simple type"));
                Datatype::String
            }
        };
        let datatype = match EnumerationFacet::new(base_datatype, values) {
            Ok(facet) => Datatype::Enumeration(Arc::new(facet)),
            Err(e) => {
                self.errors.push(format!("enumeration value rejected: {e}"));
                Datatype::String
            }
        };
        self.push_type(name, Some(base), TypeKind::Simple(datatype))
    }

    /// Complex type, optionally derived from `base`.
    pub fn complex_type(&mut self, name: Option<QName>, base: Option<TypeId>, def: ComplexType) -> TypeId {
        let base = base.or(Some(TypeId(0)));
        self.push_type(name, base, TypeKind::Complex(def))
    }

    /// Local element declaration.
    pub fn element(&mut self, name: QName, type_id: TypeId, nillable: bool) -> ElementId {
        let id = ElementId(self.elements.len() as u32);
        self.elements.push(ElementDeclaration { name, type_id, nillable });
        id
    }

    /// Global element declaration.
    pub fn global_element(&mut self, name: QName, type_id: TypeId, nillable: bool) -> ElementId {
        let id = self.element(name.clone(), type_id, nillable);
        if self.global_elements.insert(name.clone(), id).is_some() {
            self.errors.push(format!("duplicate global element {name}"));
        }
        id
    }

    /// Finishes the tables. Deferred builder errors surface here.
    pub fn build(self) -> Result<Schema> {
        if let Some(first) = self.errors.into_iter().next() {
            return Err(Error::misconfiguration(first));
        }
        Ok(Schema {
            types: self.types,
            elements: self.elements,
            type_names: self.type_names,
            global_elements: self.global_elements,
        })
    }
}
