//! String tables: URI, local-name and value partitions.
//!
//! Compact identifiers ersetzen wiederholte Strings. Die Tabellen sind pro
//! Dokument; der Cache hält nur den vorbefüllten Prototyp.
//!
//! Codierung:
//! - URI: n-bit `id + 1` (Breite aus `len + 1`), `0` = Miss + String-Literal
//! - local-name: uint `0` + n-bit `id` bei Treffer, sonst uint `len + 1` + Zeichen
//! - Wert: uint `0` + lokaler Treffer, uint `1` + globaler Treffer,
//!   sonst uint `len + 2` + Zeichen

use std::sync::Arc;

use crate::bit_width;
use crate::channel::{ChannelReader, ChannelWriter};
use crate::qname::{QName, URI_XML, URI_XSI};
use crate::schema::Schema;
use crate::{Error, FastHashMap, Result};

/// Ab dieser Größe sucht eine Partition über eine HashMap statt linear.
const PARTITION_LINEAR_THRESHOLD: usize = 64;

/// Initiale local-names des `xml`-Namespace.
const XML_LOCAL_NAMES: &[&str] = &["base", "id", "lang", "space"];
/// Initiale local-names des `xsi`-Namespace.
const XSI_LOCAL_NAMES: &[&str] = &["nil", "type"];

/// String → compact id, append-only.
#[derive(Debug, Clone, Default)]
struct Partition {
    entries: Vec<Arc<str>>,
    lookup: Option<FastHashMap<Arc<str>, usize>>,
}

impl Partition {
    fn with_entries(values: &[&str]) -> Self {
        let mut partition = Self::default();
        for value in values {
            partition.add(Arc::from(*value));
        }
        partition
    }

    #[inline]
    fn find(&self, value: &str) -> Option<usize> {
        match &self.lookup {
            Some(map) => map.get(value).copied(),
            None => self.entries.iter().position(|e| &**e == value),
        }
    }

    /// Idempotent.
    fn add(&mut self, value: Arc<str>) -> usize {
        if let Some(existing) = self.find(&value) {
            return existing;
        }
        let id = self.entries.len();
        self.entries.push(value.clone());
        if let Some(map) = &mut self.lookup {
            map.insert(value, id);
        } else if self.entries.len() > PARTITION_LINEAR_THRESHOLD {
            self.lookup = Some(self.entries.iter().cloned().enumerate().map(|(i, e)| (e, i)).collect());
        }
        id
    }

    fn get(&self, id: usize) -> Option<&Arc<str>> {
        self.entries.get(id)
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Per-document string tables.
#[derive(Debug, Clone)]
pub struct StringTable {
    uris: Partition,
    /// local-names je URI-id
    local_names: Vec<Partition>,
    global_values: Partition,
    local_values: FastHashMap<QName, Partition>,
}

impl Default for StringTable {
    fn default() -> Self {
        Self::new()
    }
}

impl StringTable {
    /// Schema-less initial state: `""`, `xml` and `xsi` namespaces.
    pub fn new() -> Self {
        Self {
            uris: Partition::with_entries(&["", URI_XML, URI_XSI]),
            local_names: vec![
                Partition::default(),
                Partition::with_entries(XML_LOCAL_NAMES),
                Partition::with_entries(XSI_LOCAL_NAMES),
            ],
            global_values: Partition::default(),
            local_values: FastHashMap::default(),
        }
    }

    /// Initial state for a schema: schema namespaces (XSD first, then the
    /// remaining URIs sorted) with their sorted local names appended.
    pub fn for_schema(schema: &Schema) -> Self {
        let mut table = Self::new();
        table.add_uri(Arc::from(crate::qname::URI_XSD));
        for uri in schema.namespaces() {
            table.add_uri(uri);
        }
        for (uri, names) in schema.local_names() {
            let uri_id = table.add_uri(uri);
            for name in names {
                table.local_names[uri_id].add(name);
            }
        }
        table
    }

    fn add_uri(&mut self, uri: Arc<str>) -> usize {
        let id = self.uris.add(uri);
        if id == self.local_names.len() {
            self.local_names.push(Partition::default());
        }
        id
    }

    /// Id of `uri`, added without coding when missing. Used for the URI of an
    /// `uri:*` wildcard, which the event code already determines.
    pub(crate) fn intern_uri(&mut self, uri: &Arc<str>) -> usize {
        match self.uris.find(uri) {
            Some(id) => id,
            None => self.add_uri(Arc::clone(uri)),
        }
    }

    /// Number of URI entries.
    pub fn uri_count(&self) -> usize {
        self.uris.len()
    }

    /// Number of local names under `uri`.
    pub fn local_name_count(&self, uri: &str) -> usize {
        self.uris.find(uri).map_or(0, |id| self.local_names[id].len())
    }

    /// Number of global value entries.
    pub fn global_value_count(&self) -> usize {
        self.global_values.len()
    }

    // --- URI ---

    /// Writes a URI and returns its id.
    pub fn write_uri(&mut self, uri: &Arc<str>, out: &mut ChannelWriter) -> usize {
        let bits = bit_width::for_count(self.uris.len() + 1);
        match self.uris.find(uri) {
            Some(id) => {
                out.write_nbit(id as u64 + 1, bits);
                id
            }
            None => {
                out.write_nbit(0, bits);
                out.write_string(uri);
                self.add_uri(Arc::clone(uri))
            }
        }
    }

    /// Reads a URI and returns its id.
    pub fn read_uri(&mut self, input: &mut ChannelReader<'_>) -> Result<usize> {
        let bits = bit_width::for_count(self.uris.len() + 1);
        let hit = input.read_nbit(bits)? as usize;
        if hit == 0 {
            let uri = input.read_string()?;
            return Ok(self.add_uri(uri.into()));
        }
        let id = hit - 1;
        if id >= self.uris.len() {
            return Err(Error::InvalidCompactId(hit));
        }
        Ok(id)
    }

    /// URI by id.
    pub fn uri(&self, id: usize) -> Result<Arc<str>> {
        self.uris.get(id).cloned().ok_or(Error::InvalidCompactId(id))
    }

    // --- local-name ---

    /// Writes a local name within the partition of `uri_id`.
    pub fn write_local_name(&mut self, uri_id: usize, local_name: &Arc<str>, out: &mut ChannelWriter) {
        let partition = &mut self.local_names[uri_id];
        match partition.find(local_name) {
            Some(id) => {
                out.write_uint(0);
                out.write_nbit(id as u64, bit_width::for_count(partition.len()));
            }
            None => {
                out.write_uint(local_name.chars().count() as u64 + 1);
                out.write_chars(local_name);
                partition.add(Arc::clone(local_name));
            }
        }
    }

    /// Reads a local name within the partition of `uri_id`.
    pub fn read_local_name(&mut self, uri_id: usize, input: &mut ChannelReader<'_>) -> Result<Arc<str>> {
        let partition = self.local_names.get_mut(uri_id).ok_or(Error::InvalidCompactId(uri_id))?;
        let len = input.read_uint()?;
        if len == 0 {
            let id = input.read_nbit(bit_width::for_count(partition.len()))? as usize;
            return partition.get(id).cloned().ok_or(Error::InvalidCompactId(id));
        }
        let name: Arc<str> = input.read_chars(len - 1)?.into();
        partition.add(Arc::clone(&name));
        Ok(name)
    }

    // --- QName ---

    /// Writes URI and local name of `qname` (the prefix is not coded).
    pub fn write_qname(&mut self, qname: &QName, out: &mut ChannelWriter) {
        let uri_id = self.write_uri(&qname.uri, out);
        self.write_local_name(uri_id, &qname.local_name, out);
    }

    /// Reads a QName.
    pub fn read_qname(&mut self, input: &mut ChannelReader<'_>) -> Result<QName> {
        let uri_id = self.read_uri(input)?;
        let local_name = self.read_local_name(uri_id, input)?;
        Ok(QName::new(self.uri(uri_id)?, local_name))
    }

    // --- Werte ---

    /// Writes a string value in the context of `key` (attribute or element name).
    pub fn write_value(&mut self, key: &QName, value: &str, out: &mut ChannelWriter) {
        if let Some(local) = self.local_values.get(key)
            && let Some(id) = local.find(value)
        {
            out.write_uint(0);
            out.write_nbit(id as u64, bit_width::for_count(local.len()));
            return;
        }
        if let Some(id) = self.global_values.find(value) {
            out.write_uint(1);
            out.write_nbit(id as u64, bit_width::for_count(self.global_values.len()));
            return;
        }
        out.write_uint(value.chars().count() as u64 + 2);
        out.write_chars(value);
        self.add_value(key, value.into());
    }

    /// Reads a string value in the context of `key`.
    pub fn read_value(&mut self, key: &QName, input: &mut ChannelReader<'_>) -> Result<Arc<str>> {
        match input.read_uint()? {
            0 => {
                let local = self.local_values.get(key).ok_or(Error::InvalidCompactId(0))?;
                let id = input.read_nbit(bit_width::for_count(local.len()))? as usize;
                local.get(id).cloned().ok_or(Error::InvalidCompactId(id))
            }
            1 => {
                let id = input.read_nbit(bit_width::for_count(self.global_values.len()))? as usize;
                self.global_values.get(id).cloned().ok_or(Error::InvalidCompactId(id))
            }
            len => {
                let value: Arc<str> = input.read_chars(len - 2)?.into();
                self.add_value(key, Arc::clone(&value));
                Ok(value)
            }
        }
    }

    fn add_value(&mut self, key: &QName, value: Arc<str>) {
        // Leere Strings werden nie aufgenommen
        if value.is_empty() {
            return;
        }
        self.local_values.entry(key.clone()).or_default().add(Arc::clone(&value));
        self.global_values.add(value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::Alignment;

    fn roundtrip<W, R, T>(write: W, read: R) -> T
    where
        W: FnOnce(&mut StringTable, &mut ChannelWriter),
        R: FnOnce(&mut StringTable, &mut ChannelReader<'_>) -> T,
    {
        let mut w = ChannelWriter::new(Alignment::BitPacked);
        write(&mut StringTable::new(), &mut w);
        let data = w.into_vec();
        let mut r = ChannelReader::new(&data, Alignment::BitPacked);
        read(&mut StringTable::new(), &mut r)
    }

    #[test]
    fn initiale_partitionen() {
        let t = StringTable::new();
        assert_eq!(t.uri_count(), 3);
        assert_eq!(t.local_name_count(URI_XML), 4);
        assert_eq!(t.local_name_count(URI_XSI), 2);
        assert_eq!(t.local_name_count(""), 0);
    }

    #[test]
    fn xsi_type_ist_treffer() {
        let mut t = StringTable::new();
        let mut w = ChannelWriter::new(Alignment::BitPacked);
        t.write_qname(&QName::xsi_type(), &mut w);
        // URI: 2 Bit (id+1 = 3), local: uint 0 (8 Bit) + 1 Bit (id 1)
        assert_eq!(w.bit_position(), 2 + 8 + 1);
    }

    #[test]
    fn qname_miss_dann_treffer() {
        let q = QName::new("urn:x", "item");
        let got = roundtrip(
            |t, w| {
                t.write_qname(&q, w);
                t.write_qname(&q, w);
            },
            |t, r| (t.read_qname(r).unwrap(), t.read_qname(r).unwrap(), t.uri_count()),
        );
        assert_eq!(got.0, q);
        assert_eq!(got.1, q);
        assert_eq!(got.2, 4);
    }

    #[test]
    fn werte_lokal_und_global() {
        let a = QName::new("", "a");
        let b = QName::new("", "b");
        let values = roundtrip(
            |t, w| {
                t.write_value(&a, "x", w);
                t.write_value(&a, "x", w);
                t.write_value(&b, "x", w);
                t.write_value(&b, "", w);
            },
            |t, r| {
                let v: Vec<_> = (0..3).map(|i| t.read_value(if i < 2 { &a } else { &b }, r).unwrap()).collect();
                let empty = t.read_value(&b, r).unwrap();
                (v, empty, t.global_value_count())
            },
        );
        assert_eq!(values.0.iter().map(|v| &**v).collect::<Vec<_>>(), ["x", "x", "x"]);
        assert_eq!(&*values.1, "");
        assert_eq!(values.2, 1);
    }

    #[test]
    fn local_name_id_ausserhalb() {
        // URI-Treffer "" (01), local-name uint 0, leere Partition → id 0 ungültig
        let mut t = StringTable::new();
        let data = [0b0100_0000, 0b0000_0000];
        let mut r = ChannelReader::new(&data, Alignment::BitPacked);
        assert_eq!(t.read_qname(&mut r), Err(Error::InvalidCompactId(0)));
    }

    #[test]
    fn schema_partitionen_sortiert() {
        let mut b = Schema::builder();
        let s = b.builtin("string").unwrap();
        b.global_element(QName::new("urn:b", "z"), s, false);
        b.global_element(QName::new("urn:a", "y"), s, false);
        let schema = b.build().unwrap();
        let t = StringTable::for_schema(&schema);
        assert_eq!(t.uri(3).unwrap().as_ref(), crate::qname::URI_XSD);
        assert_eq!(t.uri(4).unwrap().as_ref(), "urn:a");
        assert_eq!(t.uri(5).unwrap().as_ref(), "urn:b");
        assert_eq!(t.local_name_count(crate::qname::URI_XSD), 46);
    }
}
