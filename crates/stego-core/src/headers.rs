//! An ordered, case-insensitive header map as a concrete type — the
//! systems-language replacement for the source's duck-typed `email.Message`
//! header objects (see SPEC_FULL.md §9, "Duck-typed header objects").

use std::fmt;

/// HTTP headers, preserving insertion order and original casing, with
/// case-insensitive lookup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderMap {
    entries: Vec<(String, String)>,
}

/// The hop-by-hop headers stripped before re-emission in either direction
/// (RFC 2616 §13.5.1).
pub const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailers",
    "transfer-encoding",
    "upgrade",
];

impl HeaderMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(cap: usize) -> Self {
        Self {
            entries: Vec::with_capacity(cap),
        }
    }

    /// Appends a header, preserving the caller's casing. Does not replace an
    /// existing header with the same name — mirrors how repeated headers
    /// (e.g. `Set-Cookie`) are represented on the wire.
    pub fn append(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.entries.push((name.into(), value.into()));
    }

    /// Replaces all existing occurrences of `name` with a single value,
    /// appending it if absent.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        self.remove(&name);
        self.append(name, value);
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn get_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> {
        self.entries
            .iter()
            .filter(move |(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|(k, _)| k.eq_ignore_ascii_case(name))
    }

    pub fn remove(&mut self, name: &str) {
        self.entries.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Removes every hop-by-hop header (RFC 2616 §13.5.1). Idempotent:
    /// calling this twice in a row is equivalent to calling it once, since
    /// the first call already removes every matching entry.
    pub fn strip_hop_by_hop(&mut self) {
        for name in HOP_BY_HOP {
            self.remove(name);
        }
    }

    /// Serializes as "Name: Value\r\n" pairs, in insertion order, with no
    /// trailing blank line (callers append the CRLF block terminator).
    pub fn to_wire_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        for (name, value) in &self.entries {
            out.extend_from_slice(name.as_bytes());
            out.extend_from_slice(b": ");
            out.extend_from_slice(value.as_bytes());
            out.extend_from_slice(b"\r\n");
        }
        out
    }

    pub fn content_length(&self) -> Option<usize> {
        self.get("content-length").and_then(|v| v.trim().parse().ok())
    }

    pub fn is_chunked(&self) -> bool {
        self.get("transfer-encoding")
            .is_some_and(|v| v.eq_ignore_ascii_case("chunked"))
    }
}

impl fmt::Display for HeaderMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (name, value) in &self.entries {
            writeln!(f, "{name}: {value}")?;
        }
        Ok(())
    }
}

impl<'a> IntoIterator for &'a HeaderMap {
    type Item = (&'a str, &'a str);
    type IntoIter = Box<dyn Iterator<Item = (&'a str, &'a str)> + 'a>;

    fn into_iter(self) -> Self::IntoIter {
        Box::new(self.iter())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_is_case_insensitive() {
        let mut h = HeaderMap::new();
        h.append("Content-Length", "5");
        assert_eq!(h.get("content-length"), Some("5"));
        assert_eq!(h.get("Content-Length"), Some("5"));
        assert_eq!(h.get("CONTENT-LENGTH"), Some("5"));
    }

    #[test]
    fn serialization_preserves_original_casing_and_order() {
        let mut h = HeaderMap::new();
        h.append("Host", "example.test");
        h.append("X-Custom", "1");
        let wire = String::from_utf8(h.to_wire_bytes()).unwrap();
        assert_eq!(wire, "Host: example.test\r\nX-Custom: 1\r\n");
    }

    #[test]
    fn strip_hop_by_hop_is_idempotent() {
        let mut h = HeaderMap::new();
        h.append("Connection", "keep-alive");
        h.append("Content-Length", "3");
        h.strip_hop_by_hop();
        let once = h.clone();
        h.strip_hop_by_hop();
        assert_eq!(h, once);
        assert!(!h.contains("connection"));
        assert!(h.contains("content-length"));
    }
}
