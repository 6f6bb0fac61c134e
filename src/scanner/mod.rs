//! Scanner: the per-document state machine shared by encoder and decoder.
//!
//! Beide Richtungen führen denselben Kern aus: aktuelle Liste bestimmen,
//! Eintrag finden (Encoder: per Event, Decoder: per Code), Inhalt codieren,
//! dann `commit`. Der Frame-Stack ist ein expliziter `Vec`, damit die
//! Tiefe nicht am Aufrufstack hängt.

mod decoder;
mod encoder;

pub use decoder::{decode, Decoder};
pub use encoder::{encode, Encoder};

use std::sync::Arc;

use crate::cache::GrammarCache;
use crate::datatype::Datatype;
use crate::event::ExiEvent;
use crate::event_type::EventType;
use crate::event_type_list::EventTypeList;
use crate::grammar::builtin::LearningStore;
use crate::grammar::{Grammar, Step};
use crate::qname::QName;
use crate::string_table::StringTable;
use crate::{Error, Result};

/// One open element (or the document itself at the bottom).
#[derive(Debug, Clone)]
struct Frame {
    grammar: Grammar,
    /// Name des offenen Elements; Schlüssel der lokalen Value-Partition.
    element: Option<QName>,
}

/// Grammar state of one document session.
#[derive(Debug)]
struct Core<'c> {
    cache: &'c GrammarCache,
    store: LearningStore,
    strings: StringTable,
    stack: Vec<Frame>,
    finished: bool,
    aborted: bool,
    last: Option<(Arc<EventTypeList>, usize)>,
}

impl<'c> Core<'c> {
    fn new(cache: &'c GrammarCache) -> Self {
        Self {
            cache,
            store: cache.learning_store(),
            strings: cache.string_table(),
            stack: vec![Frame { grammar: cache.document_grammar(), element: None }],
            finished: false,
            aborted: false,
            last: None,
        }
    }

    fn top(&self) -> Result<&Frame> {
        self.stack.last().ok_or_else(|| Error::grammar_violation("event", "after end of document"))
    }

    fn grammar(&self) -> Result<&Grammar> {
        self.top().map(|f| &f.grammar)
    }

    /// Event type list of the current position.
    fn current_list(&mut self) -> Result<Arc<EventTypeList>> {
        let grammar = self.grammar()?.clone();
        grammar.list_with(self.cache, &mut self.store)
    }

    /// Key of the local value partition for character data.
    fn characters_key(&self) -> QName {
        self.stack
            .last()
            .and_then(|f| f.element.clone())
            .unwrap_or_else(|| QName::new("", ""))
    }

    fn in_built_in(&self) -> bool {
        matches!(self.stack.last().map(|f| &f.grammar), Some(Grammar::BuiltIn(_)))
    }

    /// Applies the transition of `event` matched by `et`. Learning happens
    /// only after the transition and any xsi:type lookup have succeeded.
    fn commit(&mut self, list: Arc<EventTypeList>, index: usize, et: &EventType, event: &ExiEvent) -> Result<()> {
        let grammar = self.grammar()?.clone();
        let (step, learn) = grammar.transition(self.cache, et, event)?.into_parts();
        let step = match step {
            Step::Rebind(type_name) => Step::Move(grammar.rebind(self.cache, &type_name)?),
            Step::Nil(nil) => Step::Move(grammar.nil(nil)),
            other => other,
        };
        if let Some((element, phase, production)) = learn {
            self.store.with(|s| s.learn(element.as_ref(), phase, production))?;
        }
        match step {
            Step::Move(next) => self.set_top(next)?,
            Step::Push { child, then } => {
                self.set_top(then)?;
                let element = match event {
                    ExiEvent::StartElement(q) => Some(q.clone()),
                    _ => None,
                };
                self.stack.push(Frame { grammar: child, element });
            }
            Step::Pop => {
                self.stack.pop();
            }
            Step::End => {
                self.stack.clear();
                self.finished = true;
            }
            Step::Rebind(_) | Step::Nil(_) => {}
        }
        self.last = Some((list, index));
        Ok(())
    }

    fn set_top(&mut self, grammar: Grammar) -> Result<()> {
        let frame = self
            .stack
            .last_mut()
            .ok_or_else(|| Error::grammar_violation("event", "after end of document"))?;
        frame.grammar = grammar;
        Ok(())
    }

    fn last_match(&self) -> Option<(&EventTypeList, usize)> {
        self.last.as_ref().map(|(list, index)| (list.as_ref(), *index))
    }

    fn learned_count(&mut self) -> Result<usize> {
        self.store.with(|s| s.learned_count())
    }

    fn position(&self) -> String {
        self.stack.last().map_or_else(|| "end of document".to_string(), |f| f.grammar.to_string())
    }
}

/// Datatype whose codec carries the value of `et`. `None` routes the value
/// through the string table: untyped entries, string datatypes and lexical
/// preservation.
fn codec_datatype(et: &EventType, lexical: bool) -> Option<&Datatype> {
    et.datatype().filter(|dt| et.is_typed() && !lexical && !dt.is_string())
}
