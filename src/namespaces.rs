/*!
# Namespace scopes

An [`XmlNamespaces`] is the ordered list of prefix/URI bindings declared on
one element (or held by a stream as its current snapshot). The empty prefix
stands for the default namespace.

A process-wide set of *reserved* URIs protects well-known bindings: once a
prefix is bound to a reserved URI in a scope, [`XmlNamespaces::add`] refuses
to rebind it.
*/
use std::collections::HashSet;
use std::fmt;
use std::io;
use std::sync::{OnceLock, RwLock};

use crate::error::NamespaceError;
use crate::token::{Name, Triple};
use crate::writer::OutputStream;

/// XML core namespace URI (for the `xml:` prefix)
pub const XMLNS_XML: &'static str = "http://www.w3.org/XML/1998/namespace";
/// XMLNS namespace URI (for the `xmlns:` prefix)
pub const XMLNS_XMLNS: &'static str = "http://www.w3.org/2000/xmlns/";
/// XML Schema instance namespace URI
pub const XMLNS_XSI: &'static str = "http://www.w3.org/2001/XMLSchema-instance";

pub const PREFIX_XML: &'static str = "xml";
pub const PREFIX_XMLNS: &'static str = "xmlns";

static RESERVED: OnceLock<RwLock<HashSet<String>>> = OnceLock::new();

fn reserved() -> &'static RwLock<HashSet<String>> {
	RESERVED.get_or_init(|| {
		let mut set = HashSet::new();
		set.insert(XMLNS_XML.to_string());
		RwLock::new(set)
	})
}

/// Protect `uri` from being rebound in any scope of this process.
///
/// Meant to be called during startup, once per host schema.
pub fn add_reserved_uri<S: Into<String>>(uri: S) {
	let uri = uri.into();
	tracing::debug!(%uri, "reserving namespace uri");
	let mut set = reserved().write().unwrap_or_else(|e| e.into_inner());
	set.insert(uri);
}

/// Whether `uri` is part of the process-wide reserved set.
pub fn is_uri_reserved(uri: &str) -> bool {
	let set = reserved().read().unwrap_or_else(|e| e.into_inner());
	set.contains(uri)
}

/// Ordered prefix to URI bindings.
///
/// Prefixes are unique within one scope. Lookups are linear scans which
/// return the first match; absent entries yield an empty string.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct XmlNamespaces {
	bindings: Vec<(Name, String)>,
}

impl XmlNamespaces {
	pub fn new() -> Self {
		Self::default()
	}

	/// Build a scope from a flat `prefix, uri, prefix, uri, ...` array.
	///
	/// Bindings are added in order, so a later duplicate prefix replaces an
	/// earlier one. A trailing unpaired entry is ignored.
	pub fn from_raw(raw: &[&str]) -> Self {
		let mut result = Self {
			bindings: Vec::with_capacity(raw.len() / 2),
		};
		for pair in raw.chunks_exact(2) {
			// rejections only happen on reserved rebinds, which the scope
			// reports by keeping the earlier binding
			let _ = result.add(pair[1], pair[0]);
		}
		result
	}

	/// Bind `prefix` to `uri`.
	///
	/// An existing binding of the same prefix is replaced (the new pair is
	/// appended at the end), unless it points to a reserved URI, in which
	/// case nothing changes and [`NamespaceError::ReservedUri`] is returned.
	pub fn add(&mut self, uri: &str, prefix: &str) -> Result<(), NamespaceError> {
		let bound = self.get_uri(prefix);
		if !bound.is_empty() && is_uri_reserved(bound) {
			tracing::debug!(prefix, uri, bound, "refusing to rebind reserved namespace");
			return Err(NamespaceError::ReservedUri);
		}
		if prefix.is_empty() {
			self.remove_default();
		} else if let Some(index) = self.get_index_by_prefix(prefix) {
			self.bindings.remove(index);
		}
		self.bindings.push((prefix.into(), uri.to_string()));
		Ok(())
	}

	pub fn remove(&mut self, index: usize) -> Result<(), NamespaceError> {
		if index >= self.bindings.len() {
			return Err(NamespaceError::IndexOutOfRange);
		}
		self.bindings.remove(index);
		Ok(())
	}

	pub fn remove_prefix(&mut self, prefix: &str) -> Result<(), NamespaceError> {
		match self.get_index_by_prefix(prefix) {
			Some(index) => self.remove(index),
			None => Err(NamespaceError::IndexOutOfRange),
		}
	}

	fn remove_default(&mut self) {
		self.bindings.retain(|(prefix, _)| !prefix.is_empty());
	}

	pub fn clear(&mut self) {
		self.bindings.clear();
	}

	pub fn len(&self) -> usize {
		self.bindings.len()
	}

	pub fn is_empty(&self) -> bool {
		self.bindings.is_empty()
	}

	/// Index of the first binding of `uri`.
	pub fn get_index(&self, uri: &str) -> Option<usize> {
		self.bindings.iter().position(|(_, u)| u == uri)
	}

	pub fn get_index_by_prefix(&self, prefix: &str) -> Option<usize> {
		self.bindings.iter().position(|(p, _)| p == prefix)
	}

	/// URI bound to `prefix`, or `""`.
	pub fn get_uri(&self, prefix: &str) -> &str {
		match self.get_index_by_prefix(prefix) {
			Some(index) => &self.bindings[index].1,
			None => "",
		}
	}

	/// First prefix bound to `uri`, or `""`.
	pub fn get_prefix(&self, uri: &str) -> &str {
		match self.get_index(uri) {
			Some(index) => &self.bindings[index].0,
			None => "",
		}
	}

	pub fn get_uri_at(&self, index: usize) -> &str {
		self.bindings.get(index).map(|(_, u)| u.as_str()).unwrap_or("")
	}

	pub fn get_prefix_at(&self, index: usize) -> &str {
		self.bindings.get(index).map(|(p, _)| p.as_str()).unwrap_or("")
	}

	pub fn has_uri(&self, uri: &str) -> bool {
		self.get_index(uri).is_some()
	}

	pub fn has_prefix(&self, prefix: &str) -> bool {
		self.get_index_by_prefix(prefix).is_some()
	}

	/// Whether exactly the pair (`prefix`, `uri`) is bound.
	pub fn has_ns(&self, uri: &str, prefix: &str) -> bool {
		self.bindings.iter().any(|(p, u)| p == prefix && u == uri)
	}

	pub fn contains_uri(&self, uri: &str) -> bool {
		self.has_uri(uri)
	}

	/// Whether both scopes bind the same set of URIs, ignoring prefixes.
	pub fn contain_identical_set(&self, other: &XmlNamespaces) -> bool {
		if self.len() != other.len() {
			return false;
		}
		self.bindings.iter().all(|(_, uri)| other.has_uri(uri))
	}

	pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> + '_ {
		self.bindings.iter().map(|(p, u)| (p.as_str(), u.as_str()))
	}

	/// Emit the bindings as `xmlns` attributes of the currently open start
	/// tag of `out`.
	pub fn write<W: io::Write>(&self, out: &mut OutputStream<W>) {
		for (prefix, uri) in self.iter() {
			if prefix.is_empty() {
				out.write_attribute(PREFIX_XMLNS, uri);
			} else {
				out.write_attribute_triple(&Triple::new(prefix, "", PREFIX_XMLNS), uri);
			}
		}
	}
}

impl fmt::Display for XmlNamespaces {
	fn fmt<'f>(&self, f: &'f mut fmt::Formatter) -> fmt::Result {
		for (i, (prefix, uri)) in self.iter().enumerate() {
			if i > 0 {
				f.write_str(" ")?;
			}
			if prefix.is_empty() {
				write!(f, "xmlns=\"{}\"", uri)?;
			} else {
				write!(f, "xmlns:{}=\"{}\"", prefix, uri)?;
			}
		}
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn add_rebinding_is_last_write_wins() {
		let mut ns = XmlNamespaces::new();
		ns.add("urn:a", "p").unwrap();
		ns.add("urn:b", "p").unwrap();
		assert_eq!(ns.get_uri("p"), "urn:b");
		assert_eq!(ns.len(), 1);
	}

	#[test]
	fn add_refuses_to_rebind_reserved() {
		add_reserved_uri("urn:test:reserved-rebind");
		let mut ns = XmlNamespaces::new();
		ns.add("urn:test:reserved-rebind", "p").unwrap();
		assert_eq!(
			ns.add("urn:b", "p"),
			Err(NamespaceError::ReservedUri)
		);
		assert_eq!(ns.get_uri("p"), "urn:test:reserved-rebind");
		assert_eq!(ns.len(), 1);
	}

	#[test]
	fn xml_core_namespace_is_reserved_from_start() {
		assert!(is_uri_reserved(XMLNS_XML));
		assert!(!is_uri_reserved("urn:not-reserved"));
	}

	#[test]
	fn default_namespace_replaces_previous_default() {
		let mut ns = XmlNamespaces::new();
		ns.add("urn:one", "").unwrap();
		ns.add("urn:x", "x").unwrap();
		ns.add("urn:two", "").unwrap();
		assert_eq!(ns.len(), 2);
		assert_eq!(ns.get_uri(""), "urn:two");
		assert_eq!(ns.get_prefix_at(0), "x");
		assert_eq!(ns.get_prefix_at(1), "");
	}

	#[test]
	fn insertion_order_is_preserved() {
		let mut ns = XmlNamespaces::new();
		ns.add("urn:z", "z").unwrap();
		ns.add("urn:a", "a").unwrap();
		ns.add("urn:m", "m").unwrap();
		let prefixes: Vec<_> = ns.iter().map(|(p, _)| p.to_string()).collect();
		assert_eq!(prefixes, vec!["z", "a", "m"]);
	}

	#[test]
	fn remove_absent_is_index_error() {
		let mut ns = XmlNamespaces::new();
		ns.add("urn:a", "a").unwrap();
		assert_eq!(ns.remove(1), Err(NamespaceError::IndexOutOfRange));
		assert_eq!(ns.remove_prefix("b"), Err(NamespaceError::IndexOutOfRange));
		assert_eq!(ns.len(), 1);
		ns.remove_prefix("a").unwrap();
		assert!(ns.is_empty());
	}

	#[test]
	fn length_counts_successful_mutations() {
		add_reserved_uri("urn:test:reserved-length");
		let mut ns = XmlNamespaces::new();
		let mut expected = 0usize;
		for (uri, prefix) in [("urn:a", "a"), ("urn:b", "b"), ("urn:test:reserved-length", "r")] {
			if ns.add(uri, prefix).is_ok() {
				expected += 1;
			}
		}
		assert!(ns.add("urn:other", "r").is_err());
		if ns.remove(0).is_ok() {
			expected -= 1;
		}
		assert!(ns.remove(17).is_err());
		assert_eq!(ns.len(), expected);
	}

	#[test]
	fn lookups_return_empty_when_absent() {
		let mut ns = XmlNamespaces::new();
		ns.add("urn:a", "a").unwrap();
		assert_eq!(ns.get_uri("b"), "");
		assert_eq!(ns.get_prefix("urn:b"), "");
		assert_eq!(ns.get_uri_at(5), "");
		assert_eq!(ns.get_prefix("urn:a"), "a");
		assert_eq!(ns.get_index("urn:a"), Some(0));
		assert!(ns.has_ns("urn:a", "a"));
		assert!(!ns.has_ns("urn:a", "b"));
	}

	#[test]
	fn identical_set_ignores_prefixes() {
		let mut a = XmlNamespaces::new();
		a.add("urn:1", "x").unwrap();
		a.add("urn:2", "").unwrap();
		let mut b = XmlNamespaces::new();
		b.add("urn:2", "y").unwrap();
		b.add("urn:1", "z").unwrap();
		assert!(a.contain_identical_set(&b));
		b.add("urn:3", "w").unwrap();
		assert!(!a.contain_identical_set(&b));
	}

	#[test]
	fn from_raw_adds_pairs_in_order() {
		let ns = XmlNamespaces::from_raw(&["", "urn:default", "p", "urn:p", "dangling"]);
		assert_eq!(ns.len(), 2);
		assert_eq!(ns.get_uri(""), "urn:default");
		assert_eq!(ns.get_uri("p"), "urn:p");
	}

	#[test]
	fn display_renders_declarations() {
		let ns = XmlNamespaces::from_raw(&["", "urn:d", "p", "urn:p"]);
		assert_eq!(ns.to_string(), "xmlns=\"urn:d\" xmlns:p=\"urn:p\"");
	}
}
