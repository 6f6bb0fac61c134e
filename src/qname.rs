//! Qualified names.
//!
//! Zwei QNames sind gleich, wenn URI und local-name übereinstimmen; der
//! Prefix ist reine Präsentation. Die Ordnung (local-name, dann URI) ist die
//! Sortierordnung aller benannten Einträge einer Event Type List.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Namespace der `xml:`-Attribute.
pub const URI_XML: &str = "http://www.w3.org/XML/1998/namespace";
/// XML Schema instance namespace (xsi:type, xsi:nil).
pub const URI_XSI: &str = "http://www.w3.org/2001/XMLSchema-instance";
/// XML Schema namespace (built-in datatypes).
pub const URI_XSD: &str = "http://www.w3.org/2001/XMLSchema";

/// A namespace-qualified name.
#[derive(Clone)]
pub struct QName {
    /// Namespace URI, empty for no namespace.
    pub uri: Arc<str>,
    /// Local name.
    pub local_name: Arc<str>,
    /// Optional prefix (not part of the identity).
    pub prefix: Option<Arc<str>>,
}

impl QName {
    /// Creates a QName without prefix.
    pub fn new(uri: impl Into<Arc<str>>, local_name: impl Into<Arc<str>>) -> Self {
        Self { uri: uri.into(), local_name: local_name.into(), prefix: None }
    }

    /// Creates a QName carrying a prefix.
    pub fn with_prefix(
        uri: impl Into<Arc<str>>,
        local_name: impl Into<Arc<str>>,
        prefix: impl Into<Arc<str>>,
    ) -> Self {
        Self { uri: uri.into(), local_name: local_name.into(), prefix: Some(prefix.into()) }
    }

    /// `{http://www.w3.org/2001/XMLSchema-instance}type`
    pub fn xsi_type() -> Self {
        Self::with_prefix(URI_XSI, "type", "xsi")
    }

    /// `{http://www.w3.org/2001/XMLSchema-instance}nil`
    pub fn xsi_nil() -> Self {
        Self::with_prefix(URI_XSI, "nil", "xsi")
    }

    /// Name eines XSD built-in Typs, z.B. `QName::xsd("anyType")`.
    pub fn xsd(local_name: &str) -> Self {
        Self::with_prefix(URI_XSD, local_name, "xsd")
    }

    /// Ob dies `xsi:type` ist.
    pub fn is_xsi_type(&self) -> bool {
        &*self.uri == URI_XSI && &*self.local_name == "type"
    }

    /// Ob dies `xsi:nil` ist.
    pub fn is_xsi_nil(&self) -> bool {
        &*self.uri == URI_XSI && &*self.local_name == "nil"
    }

    /// Parst Clark-Notation `{uri}local` oder einen unqualifizierten Namen.
    pub fn from_clark(s: &str) -> Self {
        if let Some(rest) = s.strip_prefix('{')
            && let Some(end) = rest.find('}')
        {
            return Self::new(&rest[..end], &rest[end + 1..]);
        }
        Self::new("", s)
    }
}

impl PartialEq for QName {
    fn eq(&self, other: &Self) -> bool {
        self.local_name == other.local_name && self.uri == other.uri
    }
}

impl Eq for QName {}

impl Hash for QName {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.uri.hash(state);
        self.local_name.hash(state);
    }
}

/// Sortierung: erst local-name, dann URI; Prefix ignoriert.
impl Ord for QName {
    fn cmp(&self, other: &Self) -> Ordering {
        self.local_name
            .cmp(&other.local_name)
            .then_with(|| self.uri.cmp(&other.uri))
    }
}

impl PartialOrd for QName {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Debug for QName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "QName({self})")
    }
}

/// Clark-Notation; ohne Namespace nur der local-name.
impl fmt::Display for QName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.uri.is_empty() {
            write!(f, "{}", self.local_name)
        } else {
            write!(f, "{{{}}}{}", self.uri, self.local_name)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::hash_map::DefaultHasher;

    fn hash_of(q: &QName) -> u64 {
        let mut h = DefaultHasher::new();
        q.hash(&mut h);
        h.finish()
    }

    #[test]
    fn prefix_ignoriert() {
        let a = QName::with_prefix("urn:x", "a", "p");
        let b = QName::with_prefix("urn:x", "a", "q");
        assert_eq!(a, b);
        assert_eq!(hash_of(&a), hash_of(&b));
    }

    #[test]
    fn ordnung_local_name_vor_uri() {
        let mut names = vec![
            QName::new("urn:b", "x"),
            QName::new("urn:a", "y"),
            QName::new("urn:a", "x"),
            QName::new("", "x"),
        ];
        names.sort();
        let rendered: Vec<String> = names.iter().map(ToString::to_string).collect();
        assert_eq!(rendered, ["x", "{urn:a}x", "{urn:b}x", "{urn:a}y"]);
    }

    #[test]
    fn xsi_namen() {
        assert!(QName::xsi_type().is_xsi_type());
        assert!(QName::xsi_nil().is_xsi_nil());
        assert!(!QName::new(URI_XSI, "other").is_xsi_nil());
    }

    #[test]
    fn clark_parsen() {
        assert_eq!(QName::from_clark("{urn:a}b"), QName::new("urn:a", "b"));
        assert_eq!(QName::from_clark("plain"), QName::new("", "plain"));
    }
}
