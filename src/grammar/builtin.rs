//! Built-in element grammars and learning.
//!
//! Jeder undeklarierte Elementname besitzt einen eigenen Grammatik-Slot mit
//! zwei Zuständen (StartTagContent, ElementContent). Slot 0 ist die
//! any-type Grammatik: xsi:type auf einen unbekannten Typ und umgeleitete
//! Namen (Profil-Grenze erreicht) landen dort.
//!
//! Gelernte Produktionen stehen in der ersten Ebene, die neueste vorn.
//! Einträge derselben Klasse (SE bzw. AT inkl. xsi:type/xsi:nil) mit gleichem
//! local-name bleiben nach URI sortiert.

use std::sync::{Arc, Mutex};

use log::{debug, trace};

use crate::event_type::{EventKind, EventType};
use crate::event_type_list::{EventTypeList, ListBuilder};
use crate::options::{Preserve, ProfileLimits};
use crate::qname::QName;
use crate::{Error, FastHashMap, Result};

use super::Phase;

/// A production learned by a built-in grammar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Learned {
    /// SE(qname)
    Element(QName),
    /// AT(qname), untyped
    Attribute(QName),
    /// AT(xsi:type)
    TypeCast,
    /// AT(xsi:nil)
    Nil,
    /// EE
    EndElement,
    /// CH, untyped
    Characters,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NameClass {
    Element,
    Attribute,
}

impl Learned {
    fn event_type(&self) -> EventType {
        match self {
            Self::Element(q) => EventType::new(EventKind::StartElement).with_name(q.clone()),
            Self::Attribute(q) => EventType::new(EventKind::Attribute).with_name(q.clone()),
            Self::TypeCast => EventType::new(EventKind::TypeCast).with_name(QName::xsi_type()),
            Self::Nil => EventType::new(EventKind::Nil).with_name(QName::xsi_nil()),
            Self::EndElement => EventType::new(EventKind::EndElement),
            Self::Characters => EventType::new(EventKind::Characters),
        }
    }

    /// Sortierschlüssel; EE und CH haben keinen.
    fn key(&self) -> Option<(NameClass, QName)> {
        match self {
            Self::Element(q) => Some((NameClass::Element, q.clone())),
            Self::Attribute(q) => Some((NameClass::Attribute, q.clone())),
            Self::TypeCast => Some((NameClass::Attribute, QName::xsi_type())),
            Self::Nil => Some((NameClass::Attribute, QName::xsi_nil())),
            Self::EndElement | Self::Characters => None,
        }
    }
}

/// Insert position for `new`: before the first same-class entry with the
/// same local name and a greater URI, else right after the last such entry,
/// else at the front.
fn insert_position(entries: &[Learned], new: &Learned) -> usize {
    let Some((class, name)) = new.key() else {
        return 0;
    };
    let mut last_same = None;
    for (i, entry) in entries.iter().enumerate() {
        if let Some((c, n)) = entry.key()
            && c == class
            && n.local_name == name.local_name
        {
            if n.uri > name.uri {
                return i;
            }
            last_same = Some(i);
        }
    }
    last_same.map_or(0, |i| i + 1)
}

#[derive(Debug, Clone, Default)]
struct BuiltInGrammar {
    start_tag: Vec<Learned>,
    content: Vec<Learned>,
    /// Lazily rebuilt lists, `None` after a mutation.
    lists: [Option<Arc<EventTypeList>>; 2],
}

impl BuiltInGrammar {
    /// Distinct learned names (SE and AT); EE and CH carry none.
    fn names(&self) -> usize {
        self.start_tag.iter().chain(&self.content).filter(|p| p.key().is_some()).count()
    }

    fn entries(&self, phase: Phase) -> &[Learned] {
        match phase {
            Phase::StartTag => &self.start_tag,
            Phase::Content => &self.content,
        }
    }

    fn entries_mut(&mut self, phase: Phase) -> &mut Vec<Learned> {
        match phase {
            Phase::StartTag => &mut self.start_tag,
            Phase::Content => &mut self.content,
        }
    }

    fn list(&mut self, phase: Phase, preserve: &Preserve) -> Arc<EventTypeList> {
        let slot = phase as usize;
        if let Some(list) = &self.lists[slot] {
            return Arc::clone(list);
        }
        let list = Arc::new(build_list(self.entries(phase), phase, preserve));
        self.lists[slot] = Some(Arc::clone(&list));
        list
    }
}

fn build_list(learned: &[Learned], phase: Phase, preserve: &Preserve) -> EventTypeList {
    let mut b = ListBuilder::new();
    for entry in learned {
        b.first(entry.event_type());
    }
    match phase {
        Phase::StartTag => {
            b.second(EventType::new(EventKind::EndElement))
                .second(EventType::new(EventKind::AttributeAnyUntyped))
                .second_if(preserve.prefixes, EventKind::NamespaceDeclaration)
                .second(EventType::new(EventKind::StartElementAny))
                .second(EventType::new(EventKind::Characters))
                .second_if(preserve.dtd, EventKind::EntityReference);
        }
        Phase::Content => {
            b.first(EventType::new(EventKind::EndElement))
                .second(EventType::new(EventKind::StartElementAny))
                .second(EventType::new(EventKind::Characters))
                .second_if(preserve.dtd, EventKind::EntityReference);
        }
    }
    b.third_if(preserve.comments, EventKind::Comment)
        .third_if(preserve.pis, EventKind::ProcessingInstruction);
    b.build()
}

/// List after `xsi:nil="true"` on a built-in grammar.
fn build_nil_list(preserve: &Preserve) -> EventTypeList {
    let mut b = ListBuilder::new();
    b.first(EventType::new(EventKind::EndElement))
        .second(EventType::new(EventKind::AttributeAnyUntyped))
        .second_if(preserve.prefixes, EventKind::NamespaceDeclaration)
        .third_if(preserve.comments, EventKind::Comment)
        .third_if(preserve.pis, EventKind::ProcessingInstruction);
    b.build()
}

/// Where the grammar of an element name lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    AnyType,
    Element(usize),
    /// Noch nicht angelegt; liest die leeren Listen.
    Fresh,
}

/// All built-in grammars of one learning scope.
#[derive(Debug, Clone)]
pub(crate) struct BuiltInStore {
    preserve: Preserve,
    profile: ProfileLimits,
    any_type: BuiltInGrammar,
    grammars: Vec<BuiltInGrammar>,
    slots: FastHashMap<QName, usize>,
    productions: usize,
    fresh: [Arc<EventTypeList>; 2],
    nil: Arc<EventTypeList>,
}

impl BuiltInStore {
    pub(crate) fn new(preserve: Preserve, profile: ProfileLimits) -> Self {
        Self {
            fresh: [
                Arc::new(build_list(&[], Phase::StartTag, &preserve)),
                Arc::new(build_list(&[], Phase::Content, &preserve)),
            ],
            nil: Arc::new(build_nil_list(&preserve)),
            preserve,
            profile,
            any_type: BuiltInGrammar::default(),
            grammars: Vec::new(),
            slots: FastHashMap::default(),
            productions: 0,
        }
    }

    fn grammar_cap_reached(&self) -> bool {
        self.profile
            .max_built_in_element_grammars
            .is_some_and(|max| self.grammars.len() >= max)
    }

    fn slot(&self, element: Option<&QName>) -> Slot {
        let Some(qname) = element else {
            return Slot::AnyType;
        };
        match self.slots.get(qname) {
            Some(&i) => Slot::Element(i),
            None if self.grammar_cap_reached() => Slot::AnyType,
            None => Slot::Fresh,
        }
    }

    /// Current list of the grammar of `element` (`None` = any-type).
    pub(crate) fn list(&mut self, element: Option<&QName>, phase: Phase) -> Arc<EventTypeList> {
        let preserve = self.preserve;
        match self.slot(element) {
            Slot::AnyType => self.any_type.list(phase, &preserve),
            Slot::Element(i) => match self.grammars.get_mut(i) {
                Some(grammar) => grammar.list(phase, &preserve),
                None => Arc::clone(&self.fresh[phase as usize]),
            },
            Slot::Fresh => Arc::clone(&self.fresh[phase as usize]),
        }
    }

    /// List after a true xsi:nil.
    pub(crate) fn nil_list(&self) -> Arc<EventTypeList> {
        Arc::clone(&self.nil)
    }

    /// Adds `production` to the grammar of `element` unless it is known or
    /// a profile limit is reached. The per-grammar limit counts names only.
    /// Returns whether the grammar changed.
    pub(crate) fn learn(&mut self, element: Option<&QName>, phase: Phase, production: Learned) -> bool {
        if let Some(max) = self.profile.max_built_in_productions
            && self.productions >= max
        {
            debug!("learning cap of {max} built-in productions reached, {production:?} not learned");
            return false;
        }

        let slot = self.slot(element);
        if slot == Slot::AnyType
            && let Some(qname) = element
        {
            debug!("built-in grammar cap reached, {qname} uses the any-type grammar");
        }
        let per_grammar = self.profile.max_learned_per_grammar.filter(|_| production.key().is_some());
        let index = match slot {
            Slot::AnyType => None,
            Slot::Element(i) => Some(i),
            Slot::Fresh => {
                if per_grammar == Some(0) {
                    debug!("learning cap of 0 names per grammar, {production:?} not learned");
                    return false;
                }
                let Some(qname) = element else {
                    return false;
                };
                let i = self.grammars.len();
                self.grammars.push(BuiltInGrammar::default());
                self.slots.insert(qname.clone(), i);
                Some(i)
            }
        };
        let grammar = match index {
            None => &mut self.any_type,
            Some(i) => match self.grammars.get_mut(i) {
                Some(g) => g,
                None => return false,
            },
        };

        if let Some(max) = per_grammar
            && grammar.names() >= max
        {
            debug!("learning cap of {max} names per grammar reached, {production:?} not learned");
            return false;
        }
        let entries = grammar.entries_mut(phase);
        if entries.contains(&production) {
            return false;
        }
        let position = insert_position(entries, &production);
        trace!("learned {production:?} at {position} ({phase:?}) for {}", DisplaySlot(element));
        entries.insert(position, production);
        grammar.lists[phase as usize] = None;
        self.productions += 1;
        true
    }

    /// Learned productions across all grammars.
    pub(crate) fn learned_count(&self) -> usize {
        self.productions
    }

    /// Number of element grammars (without the any-type grammar).
    #[cfg(test)]
    fn grammar_count(&self) -> usize {
        self.grammars.len()
    }
}

struct DisplaySlot<'a>(Option<&'a QName>);

impl std::fmt::Display for DisplaySlot<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.0 {
            Some(q) => write!(f, "{q}"),
            None => write!(f, "any-type"),
        }
    }
}

/// Session-local or cache-global access to a [`BuiltInStore`].
#[derive(Debug, Clone)]
pub(crate) enum LearningStore {
    /// Eigene Kopie pro Dokument.
    Session(Box<BuiltInStore>),
    /// Ein Store für alle Sessions eines Caches.
    Shared(Arc<Mutex<BuiltInStore>>),
}

impl LearningStore {
    /// Runs `f` with exclusive access to the store.
    pub(crate) fn with<R>(&mut self, f: impl FnOnce(&mut BuiltInStore) -> R) -> Result<R> {
        match self {
            Self::Session(store) => Ok(f(store)),
            Self::Shared(shared) => {
                let mut guard = shared.lock().map_err(|_| Error::LearningStorePoisoned)?;
                Ok(f(&mut guard))
            }
        }
    }
}
