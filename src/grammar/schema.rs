//! Schema-informed type grammars.
//!
//! Pro Typ wird ein NFA aufgebaut (sortierte Attribut-Verwendungen, dann das
//! Inhaltsmodell), per Teilmengenkonstruktion determinisiert und jeder
//! DFA-Zustand in Event Type Lists übersetzt. Zustände werden in BFS-Reihenfolge
//! entlang der Listenreihenfolge nummeriert, damit identische Schemas
//! identische Codes ergeben.
//!
//! Zusätzlich entsteht eine leere Variante (nur Attribute + EE) für
//! `xsi:nil="true"`.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::Arc;

use crate::datatype::Datatype;
use crate::event_type::{EventKind, EventType};
use crate::event_type_list::{EventTypeList, ListBuilder};
use crate::options::GrammarOptions;
use crate::qname::QName;
use crate::schema::{ContentType, MaxOccurs, Particle, Schema, Term, TypeId, TypeKind, Wildcard};
use crate::{Error, FastHashMap, Result};

use super::Phase;

/// Obergrenze für DFA-Zustände eines Typs.
const MAX_STATES: usize = 1 << 16;

/// Input symbol of the automaton. The derived order is the code order of
/// declared event types within a state.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum Symbol {
    Attribute(QName),
    AttributeNs(Arc<str>),
    AttributeAny,
    Element(QName),
    ElementNs(Arc<str>),
    ElementAny,
    EndElement,
    CharactersTyped,
    CharactersUntyped,
}

impl Symbol {
    fn is_attribute(&self) -> bool {
        matches!(self, Self::Attribute(_) | Self::AttributeNs(_) | Self::AttributeAny)
    }
}

/// NFA under construction plus the side tables of its symbols.
#[derive(Debug, Default)]
struct Nfa {
    edges: Vec<Vec<(Symbol, usize)>>,
    eps: Vec<Vec<usize>>,
    attribute_types: FastHashMap<QName, Datatype>,
    elements: FastHashMap<QName, (TypeId, bool)>,
    characters: Option<Datatype>,
}

impl Nfa {
    fn node(&mut self) -> usize {
        self.edges.push(Vec::new());
        self.eps.push(Vec::new());
        self.edges.len() - 1
    }

    fn edge(&mut self, from: usize, symbol: Symbol, to: usize) {
        self.edges[from].push((symbol, to));
    }

    fn epsilon(&mut self, from: usize, to: usize) {
        self.eps[from].push(to);
    }

    fn closure(&self, nodes: impl IntoIterator<Item = usize>) -> BTreeSet<usize> {
        let mut set = BTreeSet::new();
        let mut stack: Vec<usize> = nodes.into_iter().collect();
        while let Some(n) = stack.pop() {
            if set.insert(n) {
                stack.extend(self.eps[n].iter().copied());
            }
        }
        set
    }
}

/// Builds the NFA of one type.
struct NfaBuilder<'s> {
    schema: &'s Schema,
    nfa: Nfa,
}

impl<'s> NfaBuilder<'s> {
    fn wildcard_uris(wildcard: &Wildcard) -> Result<Option<&[Arc<str>]>> {
        match wildcard {
            Wildcard::Any => Ok(None),
            Wildcard::Namespaces(uris) if uris.is_empty() => {
                Err(Error::misconfiguration("wildcard with an empty namespace list"))
            }
            Wildcard::Namespaces(uris) => Ok(Some(uris)),
        }
    }

    fn attribute_wildcard(&mut self, node: usize, wildcard: &Wildcard) -> Result<()> {
        match Self::wildcard_uris(wildcard)? {
            None => self.nfa.edge(node, Symbol::AttributeAny, node),
            Some(uris) => {
                for uri in uris {
                    self.nfa.edge(node, Symbol::AttributeNs(Arc::clone(uri)), node);
                }
            }
        }
        Ok(())
    }

    fn simple_datatype(&self, type_id: TypeId, what: &str) -> Result<Datatype> {
        self.schema
            .datatype_of(type_id)
            .cloned()
            .ok_or_else(|| Error::misconfiguration(format!("{what} refers to {type_id:?}, which is not a simple type")))
    }

    /// Returns the start node; the end node carries the EE edge.
    fn build(mut self, type_id: TypeId, empty: bool) -> Result<Nfa> {
        let definition = self
            .schema
            .type_definition(type_id)
            .ok_or_else(|| Error::misconfiguration(format!("dangling type id {type_id:?}")))?;
        let start = self.nfa.node();
        let end = match &definition.kind {
            TypeKind::Simple(datatype) => {
                if empty {
                    start
                } else {
                    let after = self.nfa.node();
                    self.nfa.characters = Some(datatype.clone());
                    self.nfa.edge(start, Symbol::CharactersTyped, after);
                    after
                }
            }
            TypeKind::Complex(complex) => {
                let mut attributes = complex.attributes.clone();
                attributes.sort_by(|a, b| a.name.cmp(&b.name));
                let mut node = start;
                for window in attributes.windows(2) {
                    if window[0].name == window[1].name {
                        return Err(Error::misconfiguration(format!(
                            "duplicate attribute use {}",
                            window[0].name
                        )));
                    }
                }
                for use_ in &attributes {
                    if let Some(wildcard) = &complex.attribute_wildcard {
                        self.attribute_wildcard(node, wildcard)?;
                    }
                    let datatype = self.simple_datatype(use_.type_id, "attribute use")?;
                    self.nfa.attribute_types.insert(use_.name.clone(), datatype);
                    let next = self.nfa.node();
                    self.nfa.edge(node, Symbol::Attribute(use_.name.clone()), next);
                    if !use_.required {
                        self.nfa.epsilon(node, next);
                    }
                    node = next;
                }
                if let Some(wildcard) = &complex.attribute_wildcard {
                    self.attribute_wildcard(node, wildcard)?;
                }

                let content_start = self.nfa.node();
                self.nfa.epsilon(node, content_start);
                if empty {
                    content_start
                } else {
                    match &complex.content {
                        ContentType::Empty => content_start,
                        ContentType::Simple(simple) => {
                            let datatype = self.simple_datatype(*simple, "simple content")?;
                            self.nfa.characters = Some(datatype);
                            let after = self.nfa.node();
                            self.nfa.edge(content_start, Symbol::CharactersTyped, after);
                            after
                        }
                        ContentType::Elements { particle, mixed } => {
                            let end = self.particle(particle, content_start)?;
                            if *mixed {
                                for n in content_start..self.nfa.edges.len() {
                                    self.nfa.edge(n, Symbol::CharactersUntyped, n);
                                }
                            }
                            end
                        }
                    }
                }
            }
        };
        self.nfa.edge(end, Symbol::EndElement, end);
        Ok(self.nfa)
    }

    fn particle(&mut self, particle: &Particle, from: usize) -> Result<usize> {
        let mut node = from;
        for _ in 0..particle.min_occurs {
            node = self.term(&particle.term, node)?;
        }
        match particle.max_occurs {
            MaxOccurs::Bounded(max) if max < particle.min_occurs => Err(Error::misconfiguration(format!(
                "maxOccurs {max} below minOccurs {}",
                particle.min_occurs
            ))),
            MaxOccurs::Bounded(max) => {
                for _ in particle.min_occurs..max {
                    let after = self.term(&particle.term, node)?;
                    self.nfa.epsilon(node, after);
                    node = after;
                }
                Ok(node)
            }
            MaxOccurs::Unbounded => {
                // eigener Schleifenknoten, damit Choice-Zweige nicht
                // wieder betreten werden
                let hub = self.nfa.node();
                self.nfa.epsilon(node, hub);
                let after = self.term(&particle.term, hub)?;
                self.nfa.epsilon(after, hub);
                Ok(hub)
            }
        }
    }

    fn term(&mut self, term: &Term, from: usize) -> Result<usize> {
        match term {
            Term::Element(id) => {
                let decl = self
                    .schema
                    .element(*id)
                    .ok_or_else(|| Error::misconfiguration(format!("dangling element id {id:?}")))?;
                if self.schema.type_definition(decl.type_id).is_none() {
                    return Err(Error::misconfiguration(format!(
                        "element {} refers to dangling type {:?}",
                        decl.name, decl.type_id
                    )));
                }
                let binding = (decl.type_id, decl.nillable);
                match self.nfa.elements.get(&decl.name) {
                    Some(existing) if *existing != binding => {
                        return Err(Error::misconfiguration(format!(
                            "element {} declared with different types in one content model",
                            decl.name
                        )));
                    }
                    Some(_) => {}
                    None => {
                        self.nfa.elements.insert(decl.name.clone(), binding);
                    }
                }
                let to = self.nfa.node();
                self.nfa.edge(from, Symbol::Element(decl.name.clone()), to);
                Ok(to)
            }
            Term::Wildcard(wildcard) => {
                let to = self.nfa.node();
                match Self::wildcard_uris(wildcard)? {
                    None => self.nfa.edge(from, Symbol::ElementAny, to),
                    Some(uris) => {
                        for uri in uris {
                            self.nfa.edge(from, Symbol::ElementNs(Arc::clone(uri)), to);
                        }
                    }
                }
                Ok(to)
            }
            Term::Sequence(particles) => {
                let mut node = from;
                for p in particles {
                    node = self.particle(p, node)?;
                }
                Ok(node)
            }
            Term::Choice(particles) => {
                let join = self.nfa.node();
                if particles.is_empty() {
                    self.nfa.epsilon(from, join);
                }
                for p in particles {
                    let end = self.particle(p, from)?;
                    self.nfa.epsilon(end, join);
                }
                Ok(join)
            }
        }
    }
}

/// Deterministic automaton: per state the sorted symbols and their targets
/// (`None` for EE).
#[derive(Debug)]
struct Dfa {
    states: Vec<Vec<(Symbol, Option<u32>)>>,
}

impl Dfa {
    fn from_nfa(nfa: &Nfa) -> Result<Self> {
        let start = nfa.closure([0]);
        let mut ids: BTreeMap<BTreeSet<usize>, u32> = BTreeMap::new();
        let mut subsets = vec![start.clone()];
        ids.insert(start, 0);
        let mut states = Vec::new();
        let mut queue = VecDeque::from([0usize]);

        while let Some(current) = queue.pop_front() {
            let mut moves: BTreeMap<Symbol, BTreeSet<usize>> = BTreeMap::new();
            for &n in &subsets[current] {
                for (symbol, to) in &nfa.edges[n] {
                    moves.entry(symbol.clone()).or_default().insert(*to);
                }
            }
            let mut transitions = Vec::with_capacity(moves.len());
            for (symbol, targets) in moves {
                if symbol == Symbol::EndElement {
                    transitions.push((symbol, None));
                    continue;
                }
                let target = nfa.closure(targets);
                let id = match ids.get(&target) {
                    Some(&id) => id,
                    None => {
                        if subsets.len() >= MAX_STATES {
                            return Err(Error::misconfiguration("content model too large"));
                        }
                        let id = subsets.len() as u32;
                        ids.insert(target.clone(), id);
                        subsets.push(target);
                        queue.push_back(id as usize);
                        id
                    }
                };
                transitions.push((symbol, Some(id)));
            }
            states.push(transitions);
        }
        Ok(Self { states })
    }

    /// First state without attribute symbols; the last state if every state
    /// accepts attributes. Content-phase lists drop attribute symbols either way.
    fn content(&self) -> u32 {
        self.states
            .iter()
            .position(|t| !t.iter().any(|(s, _)| s.is_attribute()))
            .unwrap_or(self.states.len().saturating_sub(1)) as u32
    }
}

/// Lists of one DFA state.
#[derive(Debug, Clone)]
pub(crate) struct StateLists {
    start_tag: Option<Arc<EventTypeList>>,
    /// Nur im strict-Modus für Zustand 0 nillabler Elemente.
    start_tag_nillable: Option<Arc<EventTypeList>>,
    content: Arc<EventTypeList>,
}

/// Compiled grammar of one type variant.
#[derive(Debug, Clone)]
pub(crate) struct TypeGrammar {
    content: u32,
    states: Vec<StateLists>,
}

impl TypeGrammar {
    /// Index of the first content state.
    pub(crate) fn content(&self) -> u32 {
        self.content
    }

    /// Number of states.
    pub(crate) fn state_count(&self) -> usize {
        self.states.len()
    }

    /// List of `state` in `phase`.
    pub(crate) fn list(&self, state: u32, phase: Phase, nillable: bool) -> Option<Arc<EventTypeList>> {
        let lists = self.states.get(state as usize)?;
        match phase {
            Phase::StartTag => {
                let tag = if nillable {
                    lists.start_tag_nillable.as_ref().or(lists.start_tag.as_ref())
                } else {
                    lists.start_tag.as_ref()
                };
                Some(Arc::clone(tag.unwrap_or(&lists.content)))
            }
            Phase::Content => Some(Arc::clone(&lists.content)),
        }
    }
}

/// Normal and nil grammar of a type.
#[derive(Debug, Clone)]
pub(crate) struct CompiledType {
    pub(crate) normal: TypeGrammar,
    pub(crate) empty: TypeGrammar,
}

/// Which variant a list belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Variant {
    Normal { named_subtypes: bool },
    Empty,
}

pub(crate) fn compile_type(schema: &Schema, type_id: TypeId, options: &GrammarOptions) -> Result<CompiledType> {
    let named_subtypes = schema.has_named_subtypes(type_id);
    let normal = compile_variant(schema, type_id, options, Variant::Normal { named_subtypes })?;
    let empty = compile_variant(schema, type_id, options, Variant::Empty)?;
    Ok(CompiledType { normal, empty })
}

fn compile_variant(schema: &Schema, type_id: TypeId, options: &GrammarOptions, variant: Variant) -> Result<TypeGrammar> {
    let nfa = NfaBuilder { schema, nfa: Nfa::default() }.build(type_id, variant == Variant::Empty)?;
    let dfa = Dfa::from_nfa(&nfa)?;
    let content = dfa.content();

    let mut states = Vec::with_capacity(dfa.states.len());
    for (j, transitions) in dfa.states.iter().enumerate() {
        let j = j as u32;
        let declared: Vec<EventType> = transitions.iter().map(|(s, t)| declared_event_type(&nfa, s, *t)).collect();
        let has_ee = transitions.iter().any(|(s, _)| *s == Symbol::EndElement);
        let ctx = ListContext { options, variant, has_ee, first: j == 0 };

        let (start_tag, start_tag_nillable) = if j <= content {
            let tag = Arc::new(ctx.list(&declared, Phase::StartTag, false));
            let nillable = (options.strict() && j == 0 && matches!(variant, Variant::Normal { .. }))
                .then(|| Arc::new(ctx.list(&declared, Phase::StartTag, true)));
            (Some(tag), nillable)
        } else {
            (None, None)
        };
        let content_list = Arc::new(ctx.list(&declared, Phase::Content, false));
        states.push(StateLists { start_tag, start_tag_nillable, content: content_list });
    }
    Ok(TypeGrammar { content, states })
}

fn declared_event_type(nfa: &Nfa, symbol: &Symbol, next: Option<u32>) -> EventType {
    let et = match symbol {
        Symbol::Attribute(q) => {
            let et = EventType::new(EventKind::Attribute).with_name(q.clone());
            match nfa.attribute_types.get(q) {
                Some(dt) => et.with_datatype(dt.clone()),
                None => et,
            }
        }
        Symbol::AttributeNs(uri) => EventType::new(EventKind::AttributeNs).with_namespace(Arc::clone(uri)),
        Symbol::AttributeAny => EventType::new(EventKind::AttributeAny),
        Symbol::Element(q) => {
            let et = EventType::new(EventKind::StartElement).with_name(q.clone());
            match nfa.elements.get(q) {
                Some(&(type_id, nillable)) => et.with_element(type_id, nillable),
                None => et,
            }
        }
        Symbol::ElementNs(uri) => EventType::new(EventKind::StartElementNs).with_namespace(Arc::clone(uri)),
        Symbol::ElementAny => EventType::new(EventKind::StartElementAny),
        Symbol::EndElement => EventType::new(EventKind::EndElement),
        Symbol::CharactersTyped => {
            let et = EventType::new(EventKind::CharactersSchema);
            match &nfa.characters {
                Some(dt) => et.with_datatype(dt.clone()),
                None => et,
            }
        }
        Symbol::CharactersUntyped => EventType::new(EventKind::Characters),
    };
    et.with_next(next)
}

struct ListContext<'o> {
    options: &'o GrammarOptions,
    variant: Variant,
    has_ee: bool,
    first: bool,
}

impl ListContext<'_> {
    fn list(&self, declared: &[EventType], phase: Phase, nillable: bool) -> EventTypeList {
        let mut b = ListBuilder::new();
        // nach geschlossenem Start-Tag keine Attribute mehr
        for et in declared.iter().filter(|et| phase == Phase::StartTag || !et.kind().is_attribute()) {
            b.first(et.clone());
        }
        let preserve = self.options.preserve();
        let xsi = self.first && phase == Phase::StartTag;

        if self.options.strict() {
            if let (true, Variant::Normal { named_subtypes }) = (xsi, self.variant) {
                if named_subtypes {
                    b.second(EventType::new(EventKind::TypeCast).with_name(QName::xsi_type()));
                }
                if nillable {
                    b.second(EventType::new(EventKind::Nil).with_name(QName::xsi_nil()));
                }
            }
            return b.build();
        }

        b.second_if(!self.has_ee, EventKind::EndElement);
        if phase == Phase::StartTag {
            if xsi && matches!(self.variant, Variant::Normal { .. }) {
                b.second(EventType::new(EventKind::TypeCast).with_name(QName::xsi_type()))
                    .second(EventType::new(EventKind::Nil).with_name(QName::xsi_nil()));
            }
            b.second(EventType::new(EventKind::AttributeAnyUntyped));
            // untypisierte Gegenstücke behalten den deklarierten Folgezustand
            for et in declared.iter().filter(|et| et.kind() == EventKind::Attribute && et.is_typed()) {
                if let Some(name) = et.name() {
                    b.second(EventType::new(EventKind::AttributeUntyped).with_name(name.clone()).with_next(et.next));
                }
            }
            b.second_if(self.first && preserve.prefixes, EventKind::NamespaceDeclaration);
        }
        let typed_characters = declared.iter().find(|et| et.kind() == EventKind::CharactersSchema);
        b.second(EventType::new(EventKind::StartElementAny))
            .second(EventType::new(EventKind::Characters).with_next(typed_characters.and_then(|et| et.next)))
            .second_if(preserve.dtd, EventKind::EntityReference)
            .third_if(preserve.comments, EventKind::Comment)
            .third_if(preserve.pis, EventKind::ProcessingInstruction);
        b.build()
    }
}
