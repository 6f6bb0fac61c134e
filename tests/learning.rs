//! Lernen der built-in Grammatiken: Codes nach dem ersten Auftreten,
//! Scope pro Dokument bzw. geteilt.

use exigram::{
    decode, encode, CodecConfig, Decoder, Encoder, EventKind, ExiEvent, GrammarCache, GrammarOptions,
    LearningScope, QName,
};

fn q(local: &str) -> QName {
    QName::new("", local)
}

fn per_document() -> GrammarOptions {
    GrammarOptions::default().with_learning(LearningScope::PerDocument)
}

fn doc(body: Vec<ExiEvent>) -> Vec<ExiEvent> {
    let mut events = vec![ExiEvent::StartDocument];
    events.extend(body);
    events.push(ExiEvent::EndDocument);
    events
}

/// Feeds `events` and records (kind, second-level?) of every matched entry.
fn matches(cache: &GrammarCache, events: &[ExiEvent]) -> Vec<(EventKind, bool)> {
    let mut enc = Encoder::new(cache, CodecConfig::default());
    events
        .iter()
        .map(|event| {
            enc.feed(event).unwrap();
            let (list, index) = enc.last_match().unwrap();
            let et = list.item(index).unwrap();
            (et.kind(), et.code().part2().is_some())
        })
        .collect()
}

#[test]
fn zweites_element_nutzt_gelernten_code() {
    let cache = GrammarCache::compile(None, per_document()).unwrap();
    let events = doc(vec![
        ExiEvent::start(q("r")),
        ExiEvent::start(q("a")),
        ExiEvent::EndElement,
        ExiEvent::start(q("a")),
        ExiEvent::EndElement,
        ExiEvent::EndElement,
    ]);
    let m = matches(&cache, &events);
    // SE(a) im StartTag von r über SE(*), danach im Content von r erneut über SE(*)
    assert_eq!(m[2], (EventKind::StartElementAny, true));
    assert_eq!(m[4], (EventKind::StartElementAny, true));
    // EE von a: erst zweite Ebene, dann gelernt auf erster Ebene
    assert_eq!(m[3], (EventKind::EndElement, true));
    assert_eq!(m[5], (EventKind::EndElement, false));
}

#[test]
fn gelernte_attribute_und_zeichen() {
    let cache = GrammarCache::compile(None, per_document()).unwrap();
    let item = |v: &str| {
        vec![
            ExiEvent::start(q("item")),
            ExiEvent::attribute(q("id"), v),
            ExiEvent::characters(v),
            ExiEvent::EndElement,
        ]
    };
    let mut body = vec![ExiEvent::start(q("list"))];
    body.extend(item("1"));
    body.extend(item("2"));
    body.push(ExiEvent::EndElement);
    let events = doc(body);
    let m = matches(&cache, &events);
    assert_eq!(m[3], (EventKind::AttributeAnyUntyped, true));
    assert_eq!(m[4], (EventKind::Characters, true));
    assert_eq!(m[7], (EventKind::Attribute, false));
    assert_eq!(m[8], (EventKind::Characters, false));
    assert_eq!(decode(&cache, &encode(&cache, &events, CodecConfig::default()).unwrap(), CodecConfig::default()).unwrap(), events);
}

#[test]
fn lernzaehler_pro_session() {
    let cache = GrammarCache::compile(None, per_document()).unwrap();
    let events = doc(vec![ExiEvent::start(q("r")), ExiEvent::start(q("a")), ExiEvent::EndElement, ExiEvent::EndElement]);
    let mut enc = Encoder::new(&cache, CodecConfig::default());
    for event in &events {
        enc.feed(event).unwrap();
    }
    // SE(a) in r, EE in a
    assert_eq!(enc.learned_count().unwrap(), 2);
    let bytes = enc.finish().unwrap();

    let mut dec = Decoder::new(&cache, &bytes, CodecConfig::default()).unwrap();
    while dec.next_event().unwrap().is_some() {}
    assert_eq!(dec.learned_count().unwrap(), 2);
    assert_eq!(cache.shared_learned_count().unwrap(), None);
}

#[test]
fn encoder_und_decoder_sehen_dieselben_listen() {
    let cache = GrammarCache::compile(None, per_document()).unwrap();
    let events = exigram::parse_events(
        r#"<r><a x="1">t</a><b/><a x="2">u</a><b><a/></b></r>"#,
        cache.options(),
    )
    .unwrap();
    let mut enc = Encoder::new(&cache, CodecConfig::default());
    let mut seen = Vec::new();
    for event in &events {
        enc.feed(event).unwrap();
        let (list, index) = enc.last_match().unwrap();
        seen.push((list.iter().map(ToString::to_string).collect::<Vec<_>>(), index));
    }
    let bytes = enc.finish().unwrap();

    let mut dec = Decoder::new(&cache, &bytes, CodecConfig::default()).unwrap();
    for (expected_event, (expected_list, expected_index)) in events.iter().zip(&seen) {
        let event = dec.next_event().unwrap().unwrap();
        assert_eq!(&event, expected_event);
        let (list, index) = dec.last_match().unwrap();
        assert_eq!(&list.iter().map(ToString::to_string).collect::<Vec<_>>(), expected_list);
        assert_eq!(index, *expected_index);
    }
    assert_eq!(dec.next_event().unwrap(), None);
}

#[test]
fn pro_dokument_beginnt_jedes_dokument_neu() {
    let cache = GrammarCache::compile(None, per_document()).unwrap();
    let events = doc(vec![ExiEvent::start(q("r")), ExiEvent::start(q("a")), ExiEvent::EndElement, ExiEvent::EndElement]);
    let first = encode(&cache, &events, CodecConfig::default()).unwrap();
    let second = encode(&cache, &events, CodecConfig::default()).unwrap();
    assert_eq!(first, second);
    assert_eq!(matches(&cache, &events)[2], (EventKind::StartElementAny, true));
}

#[test]
fn geteilter_store_lernt_ueber_dokumente() {
    let options = GrammarOptions::default().with_learning(LearningScope::Shared);
    let encoder_cache = GrammarCache::compile(None, options).unwrap();
    let events = doc(vec![ExiEvent::start(q("r")), ExiEvent::start(q("a")), ExiEvent::EndElement, ExiEvent::EndElement]);

    let first = encode(&encoder_cache, &events, CodecConfig::default()).unwrap();
    assert_eq!(encoder_cache.shared_learned_count().unwrap(), Some(2));
    assert_eq!(matches(&encoder_cache, &events)[2], (EventKind::StartElement, false));
    let second = encode(&encoder_cache, &events, CodecConfig::default()).unwrap();

    // Dekodieren in Codier-Reihenfolge mit eigenem geteilten Store
    let decoder_cache = GrammarCache::compile(None, options).unwrap();
    assert_eq!(decode(&decoder_cache, &first, CodecConfig::default()).unwrap(), events);
    assert_eq!(decode(&decoder_cache, &second, CodecConfig::default()).unwrap(), events);

    // Außer der Reihe passen die gelernten Codes nicht
    let fresh = GrammarCache::compile(None, options).unwrap();
    assert_ne!(decode(&fresh, &second, CodecConfig::default()).ok(), Some(events));
}
