//! Grammar cursors and transitions.
//!
//! Ein [`Grammar`] ist eine leichte Position: Dokument-Phase, Zustand einer
//! kompilierten Typ-Grammatik oder Phase einer built-in Elementgrammatik. Die
//! eigentlichen Listen liegen im [`GrammarCache`] (schema-informed, immutable)
//! bzw. im Lern-Store (built-in, mutierbar). Encoder und Decoder benutzen
//! dieselbe Übergangsfunktion; sie unterscheiden sich nur darin, wie der
//! passende Eintrag gefunden wird.

pub(crate) mod builtin;
pub(crate) mod document;
pub(crate) mod schema;

use std::fmt;
use std::sync::Arc;

use log::trace;

use crate::cache::GrammarCache;
use crate::event::ExiEvent;
use crate::event_type::{EventKind, EventType};
use crate::event_type_list::EventTypeList;
use crate::qname::QName;
use crate::schema::TypeId;
use crate::{Error, Result};

use builtin::{Learned, LearningStore};

/// Sub-state of an element grammar: attributes may still follow (`StartTag`)
/// or the start tag is closed (`Content`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    /// StartTagContent
    StartTag = 0,
    /// ElementContent
    Content = 1,
}

/// Position within the document grammar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DocumentPhase {
    /// Vor SD.
    Start,
    /// Vor dem Wurzelelement.
    Content,
    /// Nach dem Wurzelelement.
    End,
}

/// Position within a compiled type grammar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SchemaCursor {
    pub(crate) type_id: TypeId,
    /// Leere Variante nach `xsi:nil="true"`.
    pub(crate) empty: bool,
    pub(crate) state: u32,
    pub(crate) phase: Phase,
    pub(crate) nillable: bool,
}

impl SchemaCursor {
    pub(crate) fn start(type_id: TypeId, nillable: bool) -> Self {
        Self { type_id, empty: false, state: 0, phase: Phase::StartTag, nillable }
    }

    /// Type of the grammar.
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// DFA state.
    pub fn state(&self) -> u32 {
        self.state
    }

    /// Sub-state.
    pub fn phase(&self) -> Phase {
        self.phase
    }
}

/// Position within a built-in element grammar.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BuiltInCursor {
    /// Elementname; `None` ist die any-type Grammatik.
    pub(crate) element: Option<QName>,
    pub(crate) phase: Phase,
}

impl BuiltInCursor {
    pub(crate) fn start(element: Option<QName>) -> Self {
        Self { element, phase: Phase::StartTag }
    }

    /// Element name; `None` for the any-type grammar.
    pub fn element(&self) -> Option<&QName> {
        self.element.as_ref()
    }

    /// Sub-state.
    pub fn phase(&self) -> Phase {
        self.phase
    }
}

/// A grammar position. Cheap to clone; the event type lists behind it are
/// resolved through the [`GrammarCache`] and the learning store.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Grammar {
    /// Document grammar.
    Document(DocumentPhase),
    /// Schema-informed type grammar.
    Schema(SchemaCursor),
    /// Built-in element grammar.
    BuiltIn(BuiltInCursor),
    /// Built-in element after `xsi:nil="true"`.
    BuiltInNil,
}

impl fmt::Display for Grammar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Document(phase) => write!(f, "Document({phase:?})"),
            Self::Schema(c) => {
                let nil = if c.empty { ", nil" } else { "" };
                write!(f, "Schema({:?}, state {}, {:?}{nil})", c.type_id, c.state, c.phase)
            }
            Self::BuiltIn(BuiltInCursor { element: Some(q), phase }) => write!(f, "BuiltIn({q}, {phase:?})"),
            Self::BuiltIn(BuiltInCursor { element: None, phase }) => write!(f, "BuiltIn(any-type, {phase:?})"),
            Self::BuiltInNil => write!(f, "BuiltIn(nil)"),
        }
    }
}

/// What the scanner does after a matched event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// Replace the grammar of the current frame.
    Move(Grammar),
    /// Open a child element: the current frame continues with `then` once
    /// the child frame is popped.
    Push {
        /// Grammar of the child element.
        child: Grammar,
        /// Grammar of the current frame after the child.
        then: Grammar,
    },
    /// Close the current element.
    Pop,
    /// End of document.
    End,
    /// xsi:type: rebind the current frame to the named type.
    Rebind(QName),
    /// xsi:nil
    Nil(bool),
}

/// Outcome of [`Grammar::transition`]. The learning mutation is only carried
/// out by the scanner once the event is fully coded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    step: Step,
    pub(crate) learn: Option<(Option<QName>, Phase, Learned)>,
}

impl Transition {
    fn step(step: Step) -> Self {
        Self { step, learn: None }
    }

    fn learning(step: Step, element: &Option<QName>, phase: Phase, production: Learned) -> Self {
        Self { step, learn: Some((element.clone(), phase, production)) }
    }

    /// Step to apply.
    pub fn next(&self) -> &Step {
        &self.step
    }

    /// Whether this transition adds a production to a built-in grammar.
    pub fn learns(&self) -> bool {
        self.learn.is_some()
    }

    pub(crate) fn into_parts(self) -> (Step, Option<(Option<QName>, Phase, Learned)>) {
        (self.step, self.learn)
    }
}

/// Name carried by an event, if any.
fn event_name(event: &ExiEvent) -> Option<&QName> {
    match event {
        ExiEvent::StartElement(q) | ExiEvent::TypeCast(q) => Some(q),
        ExiEvent::Attribute(at) => Some(&at.qname),
        _ => None,
    }
}

fn missing_name(et: &EventType, grammar: &Grammar) -> Error {
    Error::grammar_violation(format!("{} without name", et.kind().short_name()), grammar.to_string())
}

impl Grammar {
    /// Current event type list, read from the cache's learning prototype (or
    /// its shared store). Scanners use their own session store instead.
    pub fn event_types(&self, cache: &GrammarCache) -> Result<Arc<EventTypeList>> {
        let mut store = cache.learning_store();
        self.list_with(cache, &mut store)
    }

    pub(crate) fn list_with(&self, cache: &GrammarCache, store: &mut LearningStore) -> Result<Arc<EventTypeList>> {
        match self {
            Self::Document(phase) => Ok(cache.document_list(*phase)),
            Self::Schema(c) => cache.schema_list(c),
            Self::BuiltIn(c) => store.with(|s| s.list(c.element.as_ref(), c.phase)),
            Self::BuiltInNil => store.with(|s| s.nil_list()),
        }
    }

    /// Transition for `event` matched by `et` in this grammar's current list.
    pub fn transition(&self, cache: &GrammarCache, et: &EventType, event: &ExiEvent) -> Result<Transition> {
        match self {
            Self::Document(phase) => self.document_transition(cache, *phase, et, event),
            Self::Schema(c) => self.schema_transition(cache, c, et, event),
            Self::BuiltIn(c) => self.built_in_transition(cache, c, et, event),
            Self::BuiltInNil => match et.kind() {
                EventKind::EndElement => Ok(Transition::step(Step::Pop)),
                EventKind::AttributeAnyUntyped
                | EventKind::NamespaceDeclaration
                | EventKind::Comment
                | EventKind::ProcessingInstruction => Ok(Transition::step(Step::Move(self.clone()))),
                _ => Err(Error::grammar_violation(event.to_string(), self.to_string())),
            },
        }
    }

    /// Grammar of a child element opened by `et`.
    fn child(&self, cache: &GrammarCache, et: &EventType, event: &ExiEvent) -> Result<Grammar> {
        if let Some((type_id, nillable)) = et.element {
            return Ok(Grammar::Schema(SchemaCursor::start(type_id, nillable)));
        }
        let name = event_name(event).ok_or_else(|| missing_name(et, self))?;
        Ok(cache.element_grammar(name))
    }

    fn document_transition(
        &self,
        cache: &GrammarCache,
        phase: DocumentPhase,
        et: &EventType,
        event: &ExiEvent,
    ) -> Result<Transition> {
        let step = match (phase, et.kind()) {
            (DocumentPhase::Start, EventKind::StartDocument) => Step::Move(Grammar::Document(DocumentPhase::Content)),
            (DocumentPhase::Content, kind) if kind.is_start_element() => Step::Push {
                child: self.child(cache, et, event)?,
                then: Grammar::Document(DocumentPhase::End),
            },
            (
                DocumentPhase::Content,
                EventKind::DocType | EventKind::Comment | EventKind::ProcessingInstruction,
            )
            | (DocumentPhase::End, EventKind::Comment | EventKind::ProcessingInstruction) => Step::Move(self.clone()),
            (DocumentPhase::End, EventKind::EndDocument) => Step::End,
            _ => return Err(Error::grammar_violation(event.to_string(), self.to_string())),
        };
        Ok(Transition::step(step))
    }

    fn schema_transition(
        &self,
        cache: &GrammarCache,
        c: &SchemaCursor,
        et: &EventType,
        event: &ExiEvent,
    ) -> Result<Transition> {
        let content = cache.type_grammar(c.type_id, c.empty)?.content();
        let at = |state: u32, phase: Phase| Grammar::Schema(SchemaCursor { state, phase, ..*c });
        let after = |state: u32| at(state, if state <= content { Phase::StartTag } else { Phase::Content });
        // undeklarierte SE/CH/ER schließen den Start-Tag
        let undeclared_content = || if c.state <= content { at(content, Phase::Content) } else { at(c.state, Phase::Content) };

        let step = match (et.kind(), et.next) {
            (kind, Some(next)) if kind.is_start_element() => {
                Step::Push { child: self.child(cache, et, event)?, then: after(next) }
            }
            (_, Some(next)) => Step::Move(after(next)),
            (EventKind::EndElement, None) => Step::Pop,
            (kind, None) if kind.is_start_element() => {
                Step::Push { child: self.child(cache, et, event)?, then: undeclared_content() }
            }
            (EventKind::Characters | EventKind::CharactersSchema | EventKind::EntityReference, None) => {
                Step::Move(undeclared_content())
            }
            (
                EventKind::AttributeAnyUntyped
                | EventKind::NamespaceDeclaration
                | EventKind::Comment
                | EventKind::ProcessingInstruction,
                None,
            ) => Step::Move(self.clone()),
            (EventKind::TypeCast, None) => match event {
                ExiEvent::TypeCast(q) => Step::Rebind(q.clone()),
                _ => return Err(missing_name(et, self)),
            },
            (EventKind::Nil, None) => match event {
                ExiEvent::Nil(nil) => Step::Nil(*nil),
                _ => return Err(Error::grammar_violation(event.to_string(), self.to_string())),
            },
            _ => return Err(Error::grammar_violation(event.to_string(), self.to_string())),
        };
        Ok(Transition::step(step))
    }

    fn built_in_transition(
        &self,
        cache: &GrammarCache,
        c: &BuiltInCursor,
        et: &EventType,
        event: &ExiEvent,
    ) -> Result<Transition> {
        let content = Grammar::BuiltIn(BuiltInCursor { element: c.element.clone(), phase: Phase::Content });
        let second_level = et.code().part2().is_some();
        let transition = match (c.phase, et.kind()) {
            (_, EventKind::StartElement | EventKind::StartElementNs | EventKind::StartElementAny) => {
                let step = Step::Push { child: self.child(cache, et, event)?, then: content };
                match (et.kind(), event) {
                    (EventKind::StartElementAny, ExiEvent::StartElement(q)) => {
                        Transition::learning(step, &c.element, c.phase, Learned::Element(q.clone()))
                    }
                    _ => Transition::step(step),
                }
            }
            (Phase::StartTag, EventKind::EndElement) if second_level => {
                Transition::learning(Step::Pop, &c.element, c.phase, Learned::EndElement)
            }
            (_, EventKind::EndElement) => Transition::step(Step::Pop),
            (Phase::StartTag, EventKind::AttributeAnyUntyped) => match event {
                ExiEvent::Attribute(at) => Transition::learning(
                    Step::Move(self.clone()),
                    &c.element,
                    c.phase,
                    Learned::Attribute(at.qname.clone()),
                ),
                ExiEvent::TypeCast(q) => {
                    Transition::learning(Step::Rebind(q.clone()), &c.element, c.phase, Learned::TypeCast)
                }
                ExiEvent::Nil(nil) => Transition::learning(Step::Nil(*nil), &c.element, c.phase, Learned::Nil),
                _ => return Err(Error::grammar_violation(event.to_string(), self.to_string())),
            },
            (Phase::StartTag, EventKind::Attribute) => Transition::step(Step::Move(self.clone())),
            (Phase::StartTag, EventKind::TypeCast) => match event {
                ExiEvent::TypeCast(q) => Transition::step(Step::Rebind(q.clone())),
                _ => return Err(missing_name(et, self)),
            },
            (Phase::StartTag, EventKind::Nil) => match event {
                ExiEvent::Nil(nil) => Transition::step(Step::Nil(*nil)),
                _ => return Err(Error::grammar_violation(event.to_string(), self.to_string())),
            },
            (_, EventKind::Characters) if second_level => {
                Transition::learning(Step::Move(content), &c.element, c.phase, Learned::Characters)
            }
            (_, EventKind::Characters | EventKind::EntityReference) => Transition::step(Step::Move(content)),
            (Phase::StartTag, EventKind::NamespaceDeclaration)
            | (_, EventKind::Comment | EventKind::ProcessingInstruction) => Transition::step(Step::Move(self.clone())),
            _ => return Err(Error::grammar_violation(event.to_string(), self.to_string())),
        };
        Ok(transition)
    }

    /// Grammar after `xsi:type` names `type_name`.
    pub(crate) fn rebind(&self, cache: &GrammarCache, type_name: &QName) -> Result<Grammar> {
        let nillable = match self {
            Self::Schema(c) => c.nillable,
            _ => false,
        };
        let target = match cache.schema().and_then(|s| s.type_by_name(type_name)) {
            Some(type_id) => Grammar::Schema(SchemaCursor::start(type_id, nillable)),
            None if cache.options().strict() => return Err(Error::XsiTypeNotFound(type_name.to_string())),
            None => Grammar::BuiltIn(BuiltInCursor::start(None)),
        };
        trace!("xsi:type {type_name} rebinds {self} to {target}");
        Ok(target)
    }

    /// Grammar after `xsi:nil`.
    pub(crate) fn nil(&self, nil: bool) -> Grammar {
        match (self, nil) {
            (Self::Schema(c), true) => Grammar::Schema(SchemaCursor { empty: true, state: 0, phase: Phase::StartTag, ..*c }),
            (Self::BuiltIn(_), true) => Grammar::BuiltInNil,
            _ => self.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::GrammarOptions;
    use crate::schema::{ComplexType, Particle, Schema, Term};

    fn schema_less() -> GrammarCache {
        GrammarCache::compile(None, GrammarOptions::default()).unwrap()
    }

    fn matched(grammar: &Grammar, cache: &GrammarCache, pred: impl Fn(&EventType) -> bool) -> EventType {
        let list = grammar.event_types(cache).unwrap();
        list.iter().find(|et| pred(et)).cloned().unwrap()
    }

    #[test]
    fn dokument_ablauf() {
        let cache = schema_less();
        let start = cache.document_grammar();
        let sd = matched(&start, &cache, |et| et.kind() == EventKind::StartDocument);
        let t = start.transition(&cache, &sd, &ExiEvent::StartDocument).unwrap();
        assert_eq!(*t.next(), Step::Move(Grammar::Document(DocumentPhase::Content)));

        let doc = Grammar::Document(DocumentPhase::Content);
        let se = matched(&doc, &cache, |et| et.kind() == EventKind::StartElementAny);
        let root = QName::new("", "root");
        let t = doc.transition(&cache, &se, &ExiEvent::StartElement(root.clone())).unwrap();
        assert_eq!(
            *t.next(),
            Step::Push {
                child: Grammar::BuiltIn(BuiltInCursor::start(Some(root))),
                then: Grammar::Document(DocumentPhase::End)
            }
        );
        assert!(!t.learns());
    }

    #[test]
    fn built_in_lernt_wildcard_treffer() {
        let cache = schema_less();
        let g = Grammar::BuiltIn(BuiltInCursor::start(Some(QName::new("", "a"))));
        let at = matched(&g, &cache, |et| et.kind() == EventKind::AttributeAnyUntyped);
        let t = g.transition(&cache, &at, &ExiEvent::attribute(QName::new("", "id"), "1")).unwrap();
        assert_eq!(*t.next(), Step::Move(g.clone()));
        assert_eq!(t.learn.as_ref().map(|l| &l.2), Some(&Learned::Attribute(QName::new("", "id"))));

        let ch = matched(&g, &cache, |et| et.kind() == EventKind::Characters);
        let t = g.transition(&cache, &ch, &ExiEvent::characters("x")).unwrap();
        assert!(matches!(t.next(), Step::Move(Grammar::BuiltIn(BuiltInCursor { phase: Phase::Content, .. }))));
        assert!(t.learns());
    }

    #[test]
    fn built_in_xsi_ueber_at_wildcard() {
        let cache = schema_less();
        let g = Grammar::BuiltIn(BuiltInCursor::start(Some(QName::new("", "a"))));
        let at = matched(&g, &cache, |et| et.kind() == EventKind::AttributeAnyUntyped);
        let t = g.transition(&cache, &at, &ExiEvent::TypeCast(QName::xsd("anyType"))).unwrap();
        assert_eq!(*t.next(), Step::Rebind(QName::xsd("anyType")));
        assert_eq!(t.learn.map(|l| l.2), Some(Learned::TypeCast));
        assert_eq!(g.nil(true), Grammar::BuiltInNil);
        assert_eq!(g.nil(false), g);
    }

    #[test]
    fn rebind_ohne_schema_auf_any_type() {
        let cache = schema_less();
        let g = Grammar::BuiltIn(BuiltInCursor::start(Some(QName::new("", "a"))));
        let target = g.rebind(&cache, &QName::xsd("anyType")).unwrap();
        assert_eq!(target, Grammar::BuiltIn(BuiltInCursor::start(None)));
    }

    #[test]
    fn rebind_strikt_unbekannter_typ() {
        let schema = Schema::builder().build().unwrap();
        let cache = GrammarCache::compile(Some(&schema), GrammarOptions::default().with_strict(true)).unwrap();
        let int = schema.type_by_name(&QName::xsd("int")).unwrap();
        let g = Grammar::Schema(SchemaCursor::start(schema.any_type(), true));
        assert_eq!(
            g.rebind(&cache, &QName::xsd("int")).unwrap(),
            Grammar::Schema(SchemaCursor::start(int, true))
        );
        assert!(matches!(g.rebind(&cache, &QName::new("urn:x", "Nope")), Err(Error::XsiTypeNotFound(_))));
    }

    #[test]
    fn schema_nil_wechselt_in_leere_variante() {
        let schema = Schema::builder().build().unwrap();
        let g = Grammar::Schema(SchemaCursor { state: 1, ..SchemaCursor::start(schema.any_type(), true) });
        match g.nil(true) {
            Grammar::Schema(c) => {
                assert!(c.empty);
                assert_eq!(c.state, 0);
            }
            other => panic!("unerwartet: {other}"),
        }
    }

    #[test]
    fn undeklariertes_se_schliesst_start_tag() {
        let mut b = Schema::builder();
        let string = b.builtin("string").unwrap();
        let a = b.element(QName::new("", "a"), string, false);
        let t = b.complex_type(None, None, ComplexType::elements(Particle::once(Term::Element(a)), false));
        b.global_element(QName::new("", "r"), t, false);
        let schema = b.build().unwrap();
        let cache = GrammarCache::compile(Some(&schema), GrammarOptions::default()).unwrap();

        let g = cache.element_grammar(&QName::new("", "r"));
        let wildcard = matched(&g, &cache, |et| et.kind() == EventKind::StartElementAny);
        let t = g.transition(&cache, &wildcard, &ExiEvent::StartElement(QName::new("", "x"))).unwrap();
        match t.next() {
            Step::Push { child, then: Grammar::Schema(c) } => {
                assert_eq!(*child, Grammar::BuiltIn(BuiltInCursor::start(Some(QName::new("", "x")))));
                assert_eq!(c.phase, Phase::Content);
            }
            other => panic!("unerwartet: {other:?}"),
        }
        assert!(!t.learns());
    }
}
