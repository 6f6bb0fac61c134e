//! Document grammar lists (Document, DocContent, DocEnd).

use std::sync::Arc;

use crate::event_type::{EventKind, EventType};
use crate::event_type_list::{EventTypeList, ListBuilder};
use crate::options::GrammarOptions;
use crate::qname::QName;
use crate::schema::Schema;
use crate::{Error, Result};

use super::DocumentPhase;

/// Lists of the three document positions, indexed by [`DocumentPhase`].
#[derive(Debug, Clone)]
pub(crate) struct DocumentLists {
    start: Arc<EventTypeList>,
    content: Arc<EventTypeList>,
    end: Arc<EventTypeList>,
}

impl DocumentLists {
    pub(crate) fn build(schema: Option<&Schema>, options: &GrammarOptions) -> Result<Self> {
        let preserve = options.preserve();

        let mut start = ListBuilder::new();
        start.first(EventType::new(EventKind::StartDocument));

        let mut content = ListBuilder::new();
        if let Some(schema) = schema {
            let mut globals: Vec<(&QName, _)> = schema.global_elements().collect();
            globals.sort_by(|a, b| a.0.cmp(b.0));
            for (name, id) in globals {
                let decl = schema
                    .element(id)
                    .ok_or_else(|| Error::misconfiguration(format!("dangling element id {id:?}")))?;
                if schema.type_definition(decl.type_id).is_none() {
                    return Err(Error::misconfiguration(format!(
                        "global element {name} refers to dangling type {:?}",
                        decl.type_id
                    )));
                }
                content.first(
                    EventType::new(EventKind::StartElement)
                        .with_name(name.clone())
                        .with_element(decl.type_id, decl.nillable),
                );
            }
        }
        content
            .first(EventType::new(EventKind::StartElementAny))
            .second_if(preserve.dtd, EventKind::DocType)
            .third_if(preserve.comments, EventKind::Comment)
            .third_if(preserve.pis, EventKind::ProcessingInstruction);

        let mut end = ListBuilder::new();
        end.first(EventType::new(EventKind::EndDocument))
            .second_if(preserve.comments, EventKind::Comment)
            .second_if(preserve.pis, EventKind::ProcessingInstruction);

        Ok(Self { start: Arc::new(start.build()), content: Arc::new(content.build()), end: Arc::new(end.build()) })
    }

    pub(crate) fn get(&self, phase: DocumentPhase) -> Arc<EventTypeList> {
        match phase {
            DocumentPhase::Start => Arc::clone(&self.start),
            DocumentPhase::Content => Arc::clone(&self.content),
            DocumentPhase::End => Arc::clone(&self.end),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::Preserve;

    fn names(list: &EventTypeList) -> Vec<String> {
        list.iter().map(|et| et.to_string()).collect()
    }

    #[test]
    fn ohne_schema_nur_wildcard() {
        let lists = DocumentLists::build(None, &GrammarOptions::default()).unwrap();
        assert_eq!(names(&lists.get(DocumentPhase::Start)), ["SD 0"]);
        assert_eq!(names(&lists.get(DocumentPhase::Content)), ["SE(*) 0"]);
        assert_eq!(names(&lists.get(DocumentPhase::End)), ["ED 0"]);
    }

    #[test]
    fn globale_elemente_sortiert_mit_extras() {
        let mut b = Schema::builder();
        let s = b.builtin("string").unwrap();
        b.global_element(QName::new("urn:b", "x"), s, false);
        b.global_element(QName::new("urn:a", "y"), s, true);
        b.global_element(QName::new("urn:a", "x"), s, false);
        let schema = b.build().unwrap();
        let opts = GrammarOptions::default().with_preserve(Preserve {
            comments: true,
            pis: true,
            dtd: true,
            ..Preserve::default()
        });
        let lists = DocumentLists::build(Some(&schema), &opts).unwrap();
        assert_eq!(
            names(&lists.get(DocumentPhase::Content)),
            ["SE({urn:a}x) 0", "SE({urn:b}x) 1", "SE({urn:a}y) 2", "SE(*) 3", "DT 4.0", "CM 4.1.0", "PI 4.1.1"]
        );
        assert_eq!(names(&lists.get(DocumentPhase::End)), ["ED 0", "CM 1.0", "PI 1.1"]);
        let y = lists.get(DocumentPhase::Content).item(2).cloned().unwrap();
        assert_eq!(y.element, Some((s, true)));
    }
}
