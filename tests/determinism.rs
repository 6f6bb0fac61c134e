//! Eigenschaftstests über zufällige schemalose Dokumente.

use std::collections::BTreeMap;

use exigram::{decode, encode, CodecConfig, ExiEvent, GrammarCache, GrammarOptions, QName};
use proptest::prelude::*;

#[derive(Debug, Clone)]
enum Node {
    Text(String),
    Element { name: String, attrs: BTreeMap<String, String>, children: Vec<Node> },
}

impl Node {
    fn push_events(&self, out: &mut Vec<ExiEvent>) {
        match self {
            Node::Text(text) => out.push(ExiEvent::characters(text)),
            Node::Element { name, attrs, children } => {
                out.push(ExiEvent::start(QName::new("", name.as_str())));
                for (k, v) in attrs {
                    out.push(ExiEvent::attribute(QName::new("", k.as_str()), v));
                }
                for child in children {
                    child.push_events(out);
                }
                out.push(ExiEvent::EndElement);
            }
        }
    }
}

fn document(root: &Node) -> Vec<ExiEvent> {
    let mut events = vec![ExiEvent::StartDocument];
    root.push_events(&mut events);
    events.push(ExiEvent::EndDocument);
    events
}

fn name() -> impl Strategy<Value = String> {
    prop::sample::select(vec!["a", "b", "c", "item"]).prop_map(String::from)
}

fn attrs() -> impl Strategy<Value = BTreeMap<String, String>> {
    prop::collection::btree_map(
        prop::sample::select(vec!["id", "x", "y"]).prop_map(String::from),
        "[0-9a-z]{0,4}",
        0..3,
    )
}

fn node() -> impl Strategy<Value = Node> {
    let leaf = prop_oneof![
        "[a-z ]{0,8}".prop_map(Node::Text),
        (name(), attrs()).prop_map(|(name, attrs)| Node::Element { name, attrs, children: Vec::new() }),
    ];
    leaf.prop_recursive(4, 32, 4, |inner| {
        (name(), attrs(), prop::collection::vec(inner, 0..4))
            .prop_map(|(name, attrs, children)| Node::Element { name, attrs, children })
    })
}

fn root() -> impl Strategy<Value = Node> {
    (name(), attrs(), prop::collection::vec(node(), 0..5))
        .prop_map(|(name, attrs, children)| Node::Element { name, attrs, children })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn gleiche_eingabe_gleiche_bytes(root in root()) {
        let events = document(&root);
        for config in [CodecConfig::default(), CodecConfig::byte_aligned()] {
            let compile = || GrammarCache::compile(None, GrammarOptions::default()).unwrap();
            let a = encode(&compile(), &events, config).unwrap();
            let b = encode(&compile(), &events, config).unwrap();
            prop_assert_eq!(&a, &b);
            prop_assert_eq!(decode(&compile(), &a, config).unwrap(), events.clone());
        }
    }

    #[test]
    fn geteilter_store_in_reihenfolge(first in root(), second in root()) {
        let encoder_cache = GrammarCache::compile(None, GrammarOptions::default()).unwrap();
        let decoder_cache = GrammarCache::compile(None, GrammarOptions::default()).unwrap();
        let docs = [document(&first), document(&second)];
        let streams: Vec<Vec<u8>> = docs
            .iter()
            .map(|events| encode(&encoder_cache, events, CodecConfig::default()).unwrap())
            .collect();
        for (events, bytes) in docs.iter().zip(&streams) {
            prop_assert_eq!(&decode(&decoder_cache, bytes, CodecConfig::default()).unwrap(), events);
        }
        prop_assert_eq!(
            encoder_cache.shared_learned_count().unwrap(),
            decoder_cache.shared_learned_count().unwrap()
        );
    }
}
