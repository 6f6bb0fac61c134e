//! Central error type of the grammar engine.
//!
//! Jeder Fehler ist fatal für das aktuelle Dokument: Encoder und Decoder
//! lehnen nach einem Fehler jede weitere Arbeit mit [`Error::DocumentAborted`] ab.

use core::fmt;
use std::borrow::Cow;

/// All errors surfaced by cache compilation, encoding and decoding.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    /// The event matches no production of the current event type list and no
    /// applicable wildcard exists.
    GrammarViolation {
        /// Das abgelehnte Event (Kurzform, z.B. `SE({urn:a}x)`).
        event: Cow<'static, str>,
        /// Grammatik-Position in der der Fehler auftrat.
        state: Cow<'static, str>,
    },
    /// A value bound to a schema datatype failed canonicalization and no
    /// untyped fallback channel was available.
    InvalidDatatypeValue {
        /// Name des Datentyps.
        datatype: Cow<'static, str>,
        /// Der lexikalische Wert.
        value: String,
    },
    /// Options are inconsistent with the schema, or the schema tables are
    /// structurally invalid. Raised by `GrammarCache::compile` only.
    CacheMisconfiguration(Cow<'static, str>),
    /// xsi:type names a type the schema does not define (strict mode).
    XsiTypeNotFound(String),
    /// The stream ended before a complete structure was decoded.
    PrematureEndOfStream,
    /// EXI header is malformed.
    MalformedHeader,
    /// EXI version is not supported (only final version 1).
    UnsupportedVersion,
    /// The distinguishing bits are not `10`.
    InvalidDistinguishingBits(u8),
    /// A decoded event code addresses no entry of the current list.
    InvalidEventCode {
        /// Der decodierte Code (Punkt-Notation).
        event_code: String,
        /// Länge der aktuellen Event Type List.
        list_len: usize,
    },
    /// A compact identifier of a string table partition is out of range.
    InvalidCompactId(usize),
    /// A decoded code point is a surrogate or above U+10FFFF.
    InvalidCodePoint(u64),
    /// An unsigned integer exceeds 64 bits.
    IntegerOverflow,
    /// A decoded value is structurally invalid.
    InvalidValue(String),
    /// XML input could not be parsed.
    XmlParseError(String),
    /// The shared learning store was poisoned by a panicking session.
    LearningStorePoisoned,
    /// The session already failed; the document cannot be continued.
    DocumentAborted,
    /// IO-Fehler (CLI, Writer).
    Io(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::GrammarViolation { event, state } => {
                if state.is_empty() {
                    write!(f, "grammar violation: no production for {event}")
                } else {
                    write!(f, "grammar violation: no production for {event} in {state}")
                }
            }
            Self::InvalidDatatypeValue { datatype, value } => {
                write!(f, "invalid value '{value}' for datatype {datatype}")
            }
            Self::CacheMisconfiguration(msg) => write!(f, "grammar cache misconfiguration: {msg}"),
            Self::XsiTypeNotFound(name) => write!(f, "xsi:type '{name}' not found in schema"),
            Self::PrematureEndOfStream => write!(f, "premature end of EXI stream"),
            Self::MalformedHeader => write!(f, "malformed EXI header"),
            Self::UnsupportedVersion => write!(f, "unsupported EXI version"),
            Self::InvalidDistinguishingBits(bits) => {
                write!(f, "invalid distinguishing bits {bits:02b}, expected 10")
            }
            Self::InvalidEventCode { event_code, list_len } => {
                write!(f, "invalid event code {event_code} for list of {list_len} event types")
            }
            Self::InvalidCompactId(id) => write!(f, "invalid compact identifier {id}"),
            Self::InvalidCodePoint(cp) => write!(f, "invalid Unicode code point U+{cp:X}"),
            Self::IntegerOverflow => write!(f, "integer overflow"),
            Self::InvalidValue(msg) => write!(f, "invalid value: {msg}"),
            Self::XmlParseError(msg) => write!(f, "XML parse error: {msg}"),
            Self::LearningStorePoisoned => write!(f, "shared learning store poisoned"),
            Self::DocumentAborted => write!(f, "document aborted after a previous error"),
            Self::Io(msg) => write!(f, "IO error: {msg}"),
        }
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}

impl Error {
    /// Erzeugt eine `GrammarViolation` mit Event- und Zustandsbeschreibung.
    pub fn grammar_violation(
        event: impl Into<Cow<'static, str>>,
        state: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self::GrammarViolation { event: event.into(), state: state.into() }
    }

    /// Erzeugt einen `InvalidDatatypeValue`.
    pub fn invalid_datatype_value(
        datatype: impl Into<Cow<'static, str>>,
        value: impl Into<String>,
    ) -> Self {
        Self::InvalidDatatypeValue { datatype: datatype.into(), value: value.into() }
    }

    /// Erzeugt eine `CacheMisconfiguration`.
    pub fn misconfiguration(msg: impl Into<Cow<'static, str>>) -> Self {
        Self::CacheMisconfiguration(msg.into())
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;
