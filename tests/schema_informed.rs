//! Schema-informed Codierung: deklarierte Events, strikte und nicht-strikte
//! Abweichungen, typisierte Werte.

use exigram::schema::{ComplexType, Particle, Term};
use exigram::{
    decode, encode, parse_events, CodecConfig, Encoder, Error, EventKind, ExiEvent, GrammarCache, GrammarOptions,
    LearningScope, Preserve, QName, Schema,
};

fn q(local: &str) -> QName {
    QName::new("", local)
}

/// Jeder Encoder und Decoder beginnt mit frischen built-in Grammatiken.
fn options() -> GrammarOptions {
    GrammarOptions::default().with_learning(LearningScope::PerDocument)
}

/// `order(@id:int, @note?) > item+(@sku) > qty:int, price:decimal?, kind:enum(decimal)?`
fn schema() -> Schema {
    let mut b = Schema::builder();
    let int = b.builtin("int").unwrap();
    let decimal = b.builtin("decimal").unwrap();
    let string = b.builtin("string").unwrap();
    let kind = b.enumeration(None, decimal, &["1.5", "103.25", "7"]);
    let qty = b.element(q("qty"), int, false);
    let price = b.element(q("price"), decimal, false);
    let kind_el = b.element(q("kind"), kind, false);
    let item_type = b.complex_type(
        None,
        None,
        ComplexType::elements(
            Particle::once(Term::Sequence(vec![
                Particle::once(Term::Element(qty)),
                Particle::optional(Term::Element(price)),
                Particle::optional(Term::Element(kind_el)),
            ])),
            false,
        )
        .with_attribute(q("sku"), string, true),
    );
    let item = b.element(q("item"), item_type, false);
    let order_type = b.complex_type(
        None,
        None,
        ComplexType::elements(Particle::repeated(1, Term::Element(item)), false)
            .with_attribute(q("id"), int, true)
            .with_attribute(q("note"), string, false),
    );
    b.global_element(q("order"), order_type, false);
    b.build().unwrap()
}

fn lexical() -> Preserve {
    Preserve { lexical_values: true, ..Preserve::default() }
}

fn simple(name: &str, value: &str) -> Vec<ExiEvent> {
    vec![ExiEvent::start(q(name)), ExiEvent::characters(value), ExiEvent::EndElement]
}

/// Ein Auftrag mit einem Posten; `kind` wird nur gesetzt, wenn angegeben.
fn order(id: &str, kind: Option<&str>) -> Vec<ExiEvent> {
    let mut events = vec![
        ExiEvent::StartDocument,
        ExiEvent::start(q("order")),
        ExiEvent::attribute(q("id"), id),
        ExiEvent::attribute(q("note"), "eilig"),
        ExiEvent::start(q("item")),
        ExiEvent::attribute(q("sku"), "a-1"),
    ];
    events.extend(simple("qty", "3"));
    events.extend(simple("price", "2.5"));
    if let Some(kind) = kind {
        events.extend(simple("kind", kind));
    }
    events.extend([ExiEvent::EndElement, ExiEvent::EndElement, ExiEvent::EndDocument]);
    events
}

fn round_trip(cache: &GrammarCache, events: &[ExiEvent]) {
    for config in [CodecConfig::default(), CodecConfig::byte_aligned()] {
        let bytes = encode(cache, events, config).unwrap();
        assert_eq!(decode(cache, &bytes, config).unwrap(), events, "{config:?}");
    }
}

#[test]
fn deklarierte_struktur_strikt() {
    let schema = schema();
    let cache = GrammarCache::compile(Some(&schema), options().with_strict(true)).unwrap();
    let events = order("17", Some("103.25"));
    round_trip(&cache, &events);

    // Deklarierte Events liegen auf der ersten Ebene
    let mut enc = Encoder::new(&cache, CodecConfig::default());
    for event in &events {
        enc.feed(event).unwrap();
        let (list, index) = enc.last_match().unwrap();
        let et = list.item(index).unwrap();
        assert_eq!(et.code().part2(), None, "{event} als {et}");
    }
}

#[test]
fn deklarierte_struktur_nicht_strikt() {
    let schema = schema();
    let cache = GrammarCache::compile(Some(&schema), options()).unwrap();
    round_trip(&cache, &order("-4", None));
}

#[test]
fn xml_mit_schema() {
    let schema = schema();
    let strict = options().with_strict(true);
    let cache = GrammarCache::compile(Some(&schema), strict).unwrap();
    let xml = r#"<order note="x" id="1">
        <item sku="s"><qty>3</qty><kind>7</kind></item>
        <item sku="t"><qty>4</qty></item>
    </order>"#;
    let events = parse_events(xml, &strict).unwrap();
    let bytes = encode(&cache, &events, CodecConfig::default()).unwrap();
    let decoded = decode(&cache, &bytes, CodecConfig::default()).unwrap();
    // Decimal kommt kanonisch zurück
    assert!(decoded.contains(&ExiEvent::characters("7.0")));
    assert_eq!(decoded.len(), events.len());
}

#[test]
fn strikt_lehnt_undeklariertes_ab() {
    let schema = schema();
    let cache = GrammarCache::compile(Some(&schema), options().with_strict(true)).unwrap();

    let mut extra_element = order("1", None);
    extra_element.insert(extra_element.len() - 2, ExiEvent::start(q("extra")));
    let err = encode(&cache, &extra_element, CodecConfig::default()).unwrap_err();
    assert!(matches!(err, Error::GrammarViolation { .. }), "{err:?}");

    let mut extra_attribute = order("1", None);
    extra_attribute.insert(4, ExiEvent::attribute(q("zzz"), "1"));
    let err = encode(&cache, &extra_attribute, CodecConfig::default()).unwrap_err();
    assert!(matches!(err, Error::GrammarViolation { .. }), "{err:?}");

    // item ist Pflicht
    let empty = vec![
        ExiEvent::StartDocument,
        ExiEvent::start(q("order")),
        ExiEvent::attribute(q("id"), "1"),
        ExiEvent::EndElement,
    ];
    let err = encode(&cache, &empty, CodecConfig::default()).unwrap_err();
    assert!(matches!(err, Error::GrammarViolation { .. }), "{err:?}");
}

#[test]
fn nicht_strikt_akzeptiert_undeklariertes() {
    let schema = schema();
    let cache = GrammarCache::compile(Some(&schema), options()).unwrap();

    let mut events = order("1", None);
    let end_of_order = events.len() - 2;
    events.splice(
        end_of_order..end_of_order,
        [ExiEvent::start(q("extra")), ExiEvent::characters("frei"), ExiEvent::EndElement],
    );
    events.insert(4, ExiEvent::attribute(q("zzz"), "1"));
    round_trip(&cache, &events);

    let mut enc = Encoder::new(&cache, CodecConfig::default());
    for event in &events[..5] {
        enc.feed(event).unwrap();
    }
    let (list, index) = enc.last_match().unwrap();
    assert_eq!(list.item(index).unwrap().kind(), EventKind::AttributeAnyUntyped);
}

#[test]
fn ungueltiger_int_wert() {
    let schema = schema();
    for strict in [false, true] {
        let cache = GrammarCache::compile(Some(&schema), options().with_strict(strict)).unwrap();
        let err = encode(&cache, &order("zwoelf", None), CodecConfig::default()).unwrap_err();
        assert!(matches!(err, Error::InvalidDatatypeValue { .. }), "{err:?}");
    }
}

/// Matched entry per event, as `"AT(id) 0"`.
fn matched(cache: &GrammarCache, events: &[ExiEvent]) -> Vec<String> {
    let mut enc = Encoder::new(cache, CodecConfig::default());
    events
        .iter()
        .map(|event| {
            enc.feed(event).unwrap();
            let (list, index) = enc.last_match().unwrap();
            list.item(index).unwrap().to_string()
        })
        .collect()
}

#[test]
fn lexikalisch_faellt_auf_untypisiert_zurueck() {
    let schema = schema();
    let cache = GrammarCache::compile(Some(&schema), options().with_preserve(lexical())).unwrap();
    let events = order("zwoelf", None);
    round_trip(&cache, &events);

    let valid = matched(&cache, &order("12", None));
    let fallback = matched(&cache, &events);
    assert!(fallback[2].starts_with("AT(id)[untyped] "), "{fallback:?}");
    // nur der Wert wechselt den Kanal, der Rest bleibt deklariert
    for (i, (a, b)) in valid.iter().zip(&fallback).enumerate() {
        if i != 2 {
            assert_eq!(a, b);
        }
    }
    assert_eq!(&fallback[3..7], ["AT(note) 0", "SE(item) 0", "AT(sku) 0", "SE(qty) 0"]);
}

#[test]
fn lexikalisch_untypisierte_zeichen_bleiben_im_schema() {
    let schema = schema();
    let cache = GrammarCache::compile(Some(&schema), options().with_preserve(lexical())).unwrap();
    let mut events = order("1", None);
    let qty = events.iter().position(|e| *e == ExiEvent::characters("3")).unwrap();
    events[qty] = ExiEvent::characters("drei");
    round_trip(&cache, &events);

    let valid = matched(&cache, &order("1", None));
    let seen = matched(&cache, &events);
    assert!(valid[qty].starts_with("CH[schema] "), "{valid:?}");
    assert!(seen[qty].starts_with("CH "), "{seen:?}");
    // EE von qty und SE(price) wie bei gültigem Wert
    assert_eq!(seen[qty + 1], "EE 0");
    assert_eq!(seen[qty + 1..], valid[qty + 1..]);
}

#[test]
fn lexikalisch_behaelt_schreibweise() {
    let schema = schema();
    let cache = GrammarCache::compile(Some(&schema), options().with_preserve(lexical())).unwrap();
    let events = order(" 017 ", Some("103.250"));
    round_trip(&cache, &events);
}

#[test]
fn enumeration_ueber_decimal_mit_fremdwert() {
    let schema = schema();
    let events = order("1", Some("103.abcdefg"));

    for options in [
        options().with_strict(true),
        options().with_strict(true).with_preserve(lexical()),
        options(),
    ] {
        let cache = GrammarCache::compile(Some(&schema), options).unwrap();
        let err = encode(&cache, &events, CodecConfig::default()).unwrap_err();
        assert!(matches!(err, Error::InvalidDatatypeValue { .. }), "{options:?}: {err:?}");
    }

    let cache = GrammarCache::compile(Some(&schema), options().with_preserve(lexical())).unwrap();
    round_trip(&cache, &events);
    let mut enc = Encoder::new(&cache, CodecConfig::default());
    let kind_ch = events.iter().position(|e| *e == ExiEvent::characters("103.abcdefg")).unwrap();
    for event in &events[..=kind_ch] {
        enc.feed(event).unwrap();
    }
    let (list, index) = enc.last_match().unwrap();
    assert_eq!(list.item(index).unwrap().kind(), EventKind::Characters);
}

#[test]
fn gleiche_schemas_gleiche_bytes() {
    let events = order("5", Some("1.5"));
    let a = GrammarCache::compile(Some(&schema()), options()).unwrap();
    let b = GrammarCache::compile(Some(&schema()), options()).unwrap();
    assert_eq!(
        encode(&a, &events, CodecConfig::default()).unwrap(),
        encode(&b, &events, CodecConfig::default()).unwrap()
    );
}
