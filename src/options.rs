//! Grammar and codec options.
//!
//! # Beispiel
//!
//! ```
//! use exigram::options::{GrammarOptions, LearningScope, Preserve, ProfileLimits};
//!
//! let opts = GrammarOptions::default()
//!     .with_preserve(Preserve { comments: true, ..Preserve::default() })
//!     .with_learning(LearningScope::Shared)
//!     .with_profile(ProfileLimits { max_learned_per_grammar: Some(8), ..ProfileLimits::default() });
//!
//! assert!(opts.preserve().comments);
//! assert_eq!(opts.learning(), LearningScope::Shared);
//! assert_eq!(opts.profile().max_learned_per_grammar, Some(8));
//! ```

/// Alignment of event codes and content items.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Alignment {
    /// Bits are packed without padding (default).
    #[default]
    BitPacked,
    /// Every event code part and value occupies whole bytes.
    ByteAligned,
}

/// Fidelity options. Each flag keeps the corresponding productions in the
/// grammars; a cleared flag prunes them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Preserve {
    /// CM productions.
    pub comments: bool,
    /// PI productions.
    pub pis: bool,
    /// DT and ER productions.
    pub dtd: bool,
    /// NS productions.
    pub prefixes: bool,
    /// Values travel in their lexical form; invalid typed values fall back
    /// to the untyped channel where one exists.
    pub lexical_values: bool,
}

/// Scope of built-in grammar learning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LearningScope {
    /// Each document starts from the cache's empty built-in prototype.
    PerDocument,
    /// All sessions of one cache learn into one shared store (default).
    /// Streams are only decodable by a separate cache that decodes them in
    /// encoding order.
    #[default]
    Shared,
}

/// Capacity bounds for built-in grammar learning. Reaching a bound is not an
/// error: unseen names keep using the wildcard code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProfileLimits {
    /// Distinct names (SE and AT) learned per built-in element grammar.
    pub max_learned_per_grammar: Option<usize>,
    /// Learned productions across all built-in grammars of a store.
    pub max_built_in_productions: Option<usize>,
    /// Built-in element grammars per store; further undeclared element names
    /// share the any-type built-in grammar.
    pub max_built_in_element_grammars: Option<usize>,
}

/// Options that shape the compiled grammars.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GrammarOptions {
    pub(crate) strict: bool,
    pub(crate) preserve: Preserve,
    pub(crate) learning: LearningScope,
    pub(crate) profile: ProfileLimits,
}

impl GrammarOptions {
    // --- Getter ---

    /// Strict schema conformance (no undeclared productions).
    pub fn strict(&self) -> bool { self.strict }
    /// Fidelity options.
    pub fn preserve(&self) -> &Preserve { &self.preserve }
    /// Learning scope of built-in grammars.
    pub fn learning(&self) -> LearningScope { self.learning }
    /// Learning capacity bounds.
    pub fn profile(&self) -> &ProfileLimits { &self.profile }

    // --- Builder ---

    /// Setzt strict.
    pub fn with_strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// Setzt die Preserve-Flags.
    pub fn with_preserve(mut self, preserve: Preserve) -> Self {
        self.preserve = preserve;
        self
    }

    /// Setzt den Lern-Scope.
    pub fn with_learning(mut self, learning: LearningScope) -> Self {
        self.learning = learning;
        self
    }

    /// Setzt die Profil-Grenzen.
    pub fn with_profile(mut self, profile: ProfileLimits) -> Self {
        self.profile = profile;
        self
    }
}

/// Stream framing, passed out-of-band to encoder and decoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CodecConfig {
    /// Bit packing or byte alignment.
    pub alignment: Alignment,
    /// Prefix the stream with the `$EXI` cookie.
    pub include_cookie: bool,
}

impl CodecConfig {
    /// Byte-aligned framing without cookie.
    pub fn byte_aligned() -> Self {
        Self { alignment: Alignment::ByteAligned, include_cookie: false }
    }
}
