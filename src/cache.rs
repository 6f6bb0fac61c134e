//! Compiled grammar cache.
//!
//! Der Cache ist nach [`GrammarCache::compile`] unveränderlich und kann von
//! beliebig vielen Sessions parallel gelesen werden. Einzige Ausnahme ist der
//! geteilte Lern-Store bei [`LearningScope::Shared`], der hinter einem Mutex
//! liegt.
//!
//! # Beispiel
//!
//! ```
//! use exigram::{GrammarCache, GrammarOptions, QName};
//! use exigram::grammar::Grammar;
//!
//! let cache = GrammarCache::compile(None, GrammarOptions::default()).unwrap();
//! let g = cache.element_grammar(&QName::new("", "note"));
//! assert!(matches!(g, Grammar::BuiltIn(_)));
//! let list = g.event_types(&cache).unwrap();
//! assert_eq!(list.len(), 4);
//! ```

use std::sync::{Arc, Mutex};

use log::debug;

use crate::datatype::{DatatypeCodec, XsdCodec};
use crate::event_type_list::EventTypeList;
use crate::grammar::builtin::{BuiltInStore, LearningStore};
use crate::grammar::document::DocumentLists;
use crate::grammar::schema::{compile_type, CompiledType, TypeGrammar};
use crate::grammar::{BuiltInCursor, DocumentPhase, Grammar, SchemaCursor};
use crate::options::{GrammarOptions, LearningScope};
use crate::qname::QName;
use crate::schema::{Schema, TypeId};
use crate::string_table::StringTable;
use crate::{Error, Result};

/// Immutable grammars compiled from an optional schema and grammar options.
#[derive(Debug, Clone)]
pub struct GrammarCache {
    options: GrammarOptions,
    schema: Option<Arc<Schema>>,
    /// Typ-Grammatiken, Index = TypeId.
    types: Vec<CompiledType>,
    document: DocumentLists,
    built_in: BuiltInStore,
    shared: Option<Arc<Mutex<BuiltInStore>>>,
    strings: StringTable,
    codec: Arc<dyn DatatypeCodec>,
}

impl GrammarCache {
    /// Compiles all grammars. Deterministic: identical inputs yield caches
    /// that assign identical codes.
    ///
    /// # Errors
    ///
    /// [`Error::CacheMisconfiguration`] for options that contradict the
    /// schema (strict without schema, strict with preserved comments, PIs,
    /// DTD or prefixes) and for structurally invalid schema tables.
    pub fn compile(schema: Option<&Schema>, options: GrammarOptions) -> Result<Self> {
        check_options(schema, &options)?;
        let mut types = Vec::new();
        if let Some(schema) = schema {
            check_schema(schema)?;
            types.reserve(schema.type_count());
            for index in 0..schema.type_count() {
                types.push(compile_type(schema, TypeId(index as u32), &options)?);
            }
            debug!(
                "compiled {} type grammars, {} states",
                types.len(),
                types.iter().map(|t| t.normal.state_count() + t.empty.state_count()).sum::<usize>()
            );
        }
        let document = DocumentLists::build(schema, &options)?;
        let built_in = BuiltInStore::new(*options.preserve(), *options.profile());
        let shared = match options.learning() {
            LearningScope::PerDocument => None,
            LearningScope::Shared => Some(Arc::new(Mutex::new(built_in.clone()))),
        };
        let strings = schema.map_or_else(StringTable::new, StringTable::for_schema);
        Ok(Self {
            options,
            schema: schema.map(|s| Arc::new(s.clone())),
            types,
            document,
            built_in,
            shared,
            strings,
            codec: Arc::new(XsdCodec),
        })
    }

    /// Replaces the bundled [`XsdCodec`].
    pub fn with_codec(mut self, codec: Arc<dyn DatatypeCodec>) -> Self {
        self.codec = codec;
        self
    }

    /// Grammar of a root or wildcard-matched element: the declared type if a
    /// global element of that name exists, else its built-in grammar.
    pub fn element_grammar(&self, qname: &QName) -> Grammar {
        let declared = self
            .schema
            .as_deref()
            .and_then(|s| s.global_element(qname).and_then(|id| s.element(id)));
        match declared {
            Some(decl) => Grammar::Schema(SchemaCursor::start(decl.type_id, decl.nillable)),
            None => Grammar::BuiltIn(BuiltInCursor::start(Some(qname.clone()))),
        }
    }

    /// Grammar before SD.
    pub fn document_grammar(&self) -> Grammar {
        Grammar::Document(DocumentPhase::Start)
    }

    /// Options the cache was compiled with.
    pub fn options(&self) -> &GrammarOptions {
        &self.options
    }

    /// Schema the cache was compiled from.
    pub fn schema(&self) -> Option<&Schema> {
        self.schema.as_deref()
    }

    /// Learned productions of the shared store; `None` for per-document
    /// learning.
    pub fn shared_learned_count(&self) -> Result<Option<usize>> {
        match &self.shared {
            None => Ok(None),
            Some(shared) => {
                let store = shared.lock().map_err(|_| Error::LearningStorePoisoned)?;
                Ok(Some(store.learned_count()))
            }
        }
    }

    pub(crate) fn type_grammar(&self, type_id: TypeId, empty: bool) -> Result<&TypeGrammar> {
        let compiled = self
            .types
            .get(type_id.index())
            .ok_or_else(|| Error::misconfiguration(format!("no grammar for {type_id:?}")))?;
        Ok(if empty { &compiled.empty } else { &compiled.normal })
    }

    pub(crate) fn schema_list(&self, cursor: &SchemaCursor) -> Result<Arc<EventTypeList>> {
        self.type_grammar(cursor.type_id, cursor.empty)?
            .list(cursor.state, cursor.phase, cursor.nillable)
            .ok_or_else(|| {
                Error::misconfiguration(format!("{:?} has no state {}", cursor.type_id, cursor.state))
            })
    }

    pub(crate) fn document_list(&self, phase: DocumentPhase) -> Arc<EventTypeList> {
        self.document.get(phase)
    }

    /// Store for one session: a fresh copy of the prototype, or a handle to
    /// the shared store.
    pub(crate) fn learning_store(&self) -> LearningStore {
        match &self.shared {
            Some(shared) => LearningStore::Shared(Arc::clone(shared)),
            None => LearningStore::Session(Box::new(self.built_in.clone())),
        }
    }

    /// Initial string tables of a session.
    pub(crate) fn string_table(&self) -> StringTable {
        self.strings.clone()
    }

    pub(crate) fn codec(&self) -> &dyn DatatypeCodec {
        self.codec.as_ref()
    }
}

fn check_options(schema: Option<&Schema>, options: &GrammarOptions) -> Result<()> {
    if !options.strict() {
        return Ok(());
    }
    if schema.is_none() {
        return Err(Error::misconfiguration("strict requires a schema"));
    }
    let preserve = options.preserve();
    let conflicting = [
        (preserve.comments, "comments"),
        (preserve.pis, "processing instructions"),
        (preserve.dtd, "DTD"),
        (preserve.prefixes, "prefixes"),
    ];
    if let Some((_, what)) = conflicting.iter().find(|(on, _)| *on) {
        return Err(Error::misconfiguration(format!("strict cannot preserve {what}")));
    }
    Ok(())
}

fn check_schema(schema: &Schema) -> Result<()> {
    let count = schema.type_count();
    for index in 0..count {
        let id = TypeId(index as u32);
        // Basiskette muss nach höchstens `count` Schritten enden
        let mut current = schema.type_definition(id).and_then(|d| d.base);
        let mut steps = 0;
        while let Some(base) = current {
            if base.index() >= count {
                return Err(Error::misconfiguration(format!("{id:?} has dangling base {base:?}")));
            }
            steps += 1;
            if steps > count {
                return Err(Error::misconfiguration(format!("derivation cycle through {id:?}")));
            }
            current = schema.type_definition(base).and_then(|d| d.base);
        }
    }
    for decl in &schema.elements {
        if decl.type_id.index() >= count {
            return Err(Error::misconfiguration(format!(
                "element {} refers to dangling type {:?}",
                decl.name, decl.type_id
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::Preserve;
    use crate::schema::{ComplexType, ElementId, Particle, Term};

    #[test]
    fn strict_ohne_schema() {
        let err = GrammarCache::compile(None, GrammarOptions::default().with_strict(true)).unwrap_err();
        assert!(matches!(err, Error::CacheMisconfiguration(_)));
    }

    #[test]
    fn strict_mit_kommentaren() {
        let schema = Schema::builder().build().unwrap();
        let opts = GrammarOptions::default()
            .with_strict(true)
            .with_preserve(Preserve { comments: true, ..Preserve::default() });
        assert!(GrammarCache::compile(Some(&schema), opts).is_err());
    }

    #[test]
    fn ableitungszyklus() {
        let mut schema = Schema::builder().build().unwrap();
        let string = schema.type_by_name(&QName::xsd("string")).unwrap();
        let token = schema.type_by_name(&QName::xsd("token")).unwrap();
        schema.types[string.index()].base = Some(token);
        assert!(matches!(
            GrammarCache::compile(Some(&schema), GrammarOptions::default()),
            Err(Error::CacheMisconfiguration(_))
        ));
    }

    #[test]
    fn haengende_element_referenz() {
        let mut b = Schema::builder();
        let t = b.complex_type(None, None, ComplexType::elements(Particle::once(Term::Element(ElementId(99))), false));
        b.global_element(QName::new("", "r"), t, false);
        let schema = b.build().unwrap();
        assert!(GrammarCache::compile(Some(&schema), GrammarOptions::default()).is_err());
    }

    #[test]
    fn globales_element_ist_schema_grammatik() {
        let mut b = Schema::builder();
        let int = b.builtin("int").unwrap();
        b.global_element(QName::new("urn:a", "n"), int, true);
        let schema = b.build().unwrap();
        let cache = GrammarCache::compile(Some(&schema), GrammarOptions::default()).unwrap();
        assert_eq!(
            cache.element_grammar(&QName::new("urn:a", "n")),
            Grammar::Schema(SchemaCursor::start(int, true))
        );
        assert!(matches!(cache.element_grammar(&QName::new("urn:a", "m")), Grammar::BuiltIn(_)));
    }

    #[test]
    fn deterministische_codes() {
        let build = || {
            let mut b = Schema::builder();
            let int = b.builtin("int").unwrap();
            let x = b.element(QName::new("", "x"), int, false);
            let t = b.complex_type(None, None, ComplexType::elements(Particle::repeated(1, Term::Element(x)), false));
            b.global_element(QName::new("", "r"), t, false);
            b.build().unwrap()
        };
        let a = GrammarCache::compile(Some(&build()), GrammarOptions::default()).unwrap();
        let b = GrammarCache::compile(Some(&build()), GrammarOptions::default()).unwrap();
        let g = a.element_grammar(&QName::new("", "r"));
        assert_eq!(g.event_types(&a).unwrap(), g.event_types(&b).unwrap());
    }

    #[test]
    fn geteilter_store() {
        let cache = GrammarCache::compile(None, GrammarOptions::default()).unwrap();
        assert_eq!(cache.shared_learned_count().unwrap(), Some(0));
        let per_doc =
            GrammarCache::compile(None, GrammarOptions::default().with_learning(LearningScope::PerDocument)).unwrap();
        assert_eq!(per_doc.shared_learned_count().unwrap(), None);
    }

    #[test]
    fn cache_ist_send_und_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<GrammarCache>();
    }
}
