//! exigram – grammar-driven EXI event coding
//!
//! Kompiliert aus einem optionalen Schema und [`GrammarOptions`] einen
//! unveränderlichen [`GrammarCache`]. Pro Dokument codiert ein [`Encoder`]
//! Events zu Event Codes (plus Inhalt), ein [`Decoder`] liest sie zurück.
//! Built-in Grammatiken lernen neue Produktionen, standardmäßig über alle
//! Dokumente eines Caches hinweg.
//!
//! # Beispiel
//!
//! ```
//! use exigram::{decode, encode, CodecConfig, ExiEvent, GrammarCache, GrammarOptions, QName};
//!
//! // Sender und Empfänger kompilieren je einen Cache aus denselben Eingaben
//! let sender = GrammarCache::compile(None, GrammarOptions::default()).unwrap();
//! let receiver = GrammarCache::compile(None, GrammarOptions::default()).unwrap();
//! let events = vec![
//!     ExiEvent::StartDocument,
//!     ExiEvent::start(QName::new("", "greeting")),
//!     ExiEvent::characters("Hello"),
//!     ExiEvent::EndElement,
//!     ExiEvent::EndDocument,
//! ];
//! let bytes = encode(&sender, &events, CodecConfig::default()).unwrap();
//! let decoded = decode(&receiver, &bytes, CodecConfig::default()).unwrap();
//! assert_eq!(decoded, events);
//! ```

pub mod bit_width;
pub mod bitstream;
pub mod cache;
pub mod channel;
pub mod datatype;
pub mod error;
pub mod event;
pub mod event_code;
pub mod event_type;
pub mod event_type_list;
pub mod grammar;
pub mod header;
pub mod options;
pub mod qname;
pub mod scanner;
pub mod schema;
pub mod string_table;
pub mod xml;
pub mod xml_serializer;

pub use error::{Error, Result};

/// HashMap mit ahash (schnell, nicht DoS-resistent; nur für interne Datenstrukturen).
pub(crate) type FastHashMap<K, V> = hashbrown::HashMap<K, V, ahash::RandomState>;

/// IndexMap mit ahash (deterministische Iteration + schnelles Hashing).
pub(crate) type FastIndexMap<K, V> = indexmap::IndexMap<K, V, ahash::RandomState>;

// Public API: Events
pub use event::{AtContent, ChContent, CmContent, DtContent, ErContent, ExiEvent, NsContent, PiContent};

// Public API: Options
pub use options::{Alignment, CodecConfig, GrammarOptions, LearningScope, Preserve, ProfileLimits};

// Public API: Grammars
pub use cache::GrammarCache;
pub use event_code::EventCode;
pub use event_type::{EventKind, EventType};
pub use event_type_list::EventTypeList;
pub use grammar::Grammar;

// Public API: Encoder/Decoder
pub use scanner::{decode, encode, Decoder, Encoder};

// Public API: Types
pub use datatype::{Datatype, DatatypeCodec, XsdCodec};
pub use qname::QName;
pub use schema::{Schema, SchemaBuilder};

// Public API: XML
pub use xml::parse_events;
pub use xml_serializer::events_to_xml;
