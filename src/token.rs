/*!
# Tokens and their parts

A [`Token`] is one lexical XML event as seen by consumers of an
[`InputStream`](crate::InputStream): a start tag with its [`Attributes`] and
namespace declarations, an end tag, a run of text, or the end-of-stream
sentinel.

Backends describe start tags in a *raw* form: a qualified name encoded as
`uri SEP local SEP prefix`, a flat `name, value, name, value, ...` attribute
array using the same encoding for names, and a flat `prefix, uri, ...`
declaration array. [`Token::start_from_raw`] turns that into the structured
form.
*/
use std::fmt;
use std::hash::{Hash, Hasher};

use smartstring::alias::String as SmartString;

use crate::error::{ErrorCode, ErrorLog, XmlError};
use crate::namespaces::XmlNamespaces;

/// Owned local name or prefix.
pub type Name = SmartString;

/// Separator used in raw qualified names handed over by the backends.
///
/// U+001F cannot occur in well-formed XML, so it never collides with a name
/// or a namespace URI.
pub const NS_SEPARATOR: char = '\u{1f}';

/**
# Qualified name

A local name with its namespace URI and the prefix it was written with.
Two triples are equal if their names and URIs are equal; the prefix is only
used for presentation.
*/
#[derive(Debug, Clone, Default)]
pub struct Triple {
	pub name: Name,
	pub uri: String,
	pub prefix: Name,
}

impl Triple {
	pub fn new(name: &str, uri: &str, prefix: &str) -> Self {
		Self {
			name: name.into(),
			uri: uri.to_string(),
			prefix: prefix.into(),
		}
	}

	/// Unqualified local name without namespace.
	pub fn local(name: &str) -> Self {
		Self::new(name, "", "")
	}

	/// Decode a raw `uri SEP local [SEP prefix]` name.
	///
	/// A raw name without separator is taken as unqualified local name.
	pub fn from_separated(raw: &str, sep: char) -> Self {
		let mut parts = raw.splitn(3, sep);
		let first = parts.next().unwrap_or("");
		match parts.next() {
			None => Self::local(first),
			Some(name) => Self::new(name, first, parts.next().unwrap_or("")),
		}
	}

	/// Encode into the raw form understood by [`Triple::from_separated`].
	pub fn to_separated(&self, sep: char) -> String {
		if self.uri.is_empty() && self.prefix.is_empty() {
			return self.name.to_string();
		}
		let mut result = String::with_capacity(self.uri.len() + self.name.len() + self.prefix.len() + 2);
		result.push_str(&self.uri);
		result.push(sep);
		result.push_str(&self.name);
		if !self.prefix.is_empty() {
			result.push(sep);
			result.push_str(&self.prefix);
		}
		result
	}

	/// `prefix:name`, or just `name` if there is no prefix.
	pub fn prefixed_name(&self) -> String {
		if self.prefix.is_empty() {
			self.name.to_string()
		} else {
			format!("{}:{}", self.prefix, self.name)
		}
	}

	pub fn is_empty(&self) -> bool {
		self.name.is_empty() && self.uri.is_empty() && self.prefix.is_empty()
	}
}

impl PartialEq for Triple {
	fn eq(&self, other: &Triple) -> bool {
		self.name == other.name && self.uri == other.uri
	}
}

impl Eq for Triple {}

impl Hash for Triple {
	fn hash<H: Hasher>(&self, state: &mut H) {
		self.name.hash(state);
		self.uri.hash(state);
	}
}

impl fmt::Display for Triple {
	fn fmt<'f>(&self, f: &'f mut fmt::Formatter) -> fmt::Result {
		if !self.prefix.is_empty() {
			write!(f, "{}:", self.prefix)?;
		}
		f.write_str(&self.name)
	}
}

/**
# Attributes of a start tag

Ordered (triple, value) pairs. The order is the order in which the backend
reported them. Attributes handed over by a backend are not deduplicated.
*/
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Attributes {
	pairs: Vec<(Triple, String)>,
}

fn parse_bool(value: &str) -> Option<bool> {
	match value.trim() {
		"true" | "1" => Some(true),
		"false" | "0" => Some(false),
		_ => None,
	}
}

fn parse_f64(value: &str) -> Option<f64> {
	match value.trim() {
		"INF" | "+INF" => Some(f64::INFINITY),
		"-INF" => Some(f64::NEG_INFINITY),
		"NaN" => Some(f64::NAN),
		// rust accepts "inf" and "nan" spellings which xml schema does not
		other if other.bytes().any(|b| b.is_ascii_alphabetic() && b != b'e' && b != b'E') => None,
		other => other.parse().ok(),
	}
}

impl Attributes {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn with_capacity(capacity: usize) -> Self {
		Self {
			pairs: Vec::with_capacity(capacity),
		}
	}

	/// Build from a flat `name, value, name, value, ...` array.
	///
	/// Names use the raw encoding of [`Triple::from_separated`] with `sep`.
	/// A trailing unpaired entry is ignored.
	pub fn from_raw(raw: &[&str], sep: char) -> Self {
		let mut result = Self::with_capacity(raw.len() / 2);
		for pair in raw.chunks_exact(2) {
			if pair[0].is_empty() {
				continue;
			}
			result.push(Triple::from_separated(pair[0], sep), pair[1]);
		}
		result
	}

	/// Append without looking for an existing attribute of the same name.
	pub fn push(&mut self, triple: Triple, value: &str) {
		self.pairs.push((triple, value.to_string()));
	}

	/// Set the value of the attribute with the same name and URI as
	/// `triple`, or append a new one.
	pub fn add(&mut self, triple: Triple, value: &str) {
		match self.get_index_triple(&triple) {
			Some(index) => {
				let pair = &mut self.pairs[index];
				pair.0.prefix = triple.prefix;
				pair.1 = value.to_string();
			}
			None => self.push(triple, value),
		}
	}

	pub fn remove(&mut self, index: usize) -> Option<(Triple, String)> {
		if index < self.pairs.len() {
			Some(self.pairs.remove(index))
		} else {
			None
		}
	}

	pub fn remove_triple(&mut self, triple: &Triple) -> Option<(Triple, String)> {
		let index = self.get_index_triple(triple)?;
		self.remove(index)
	}

	pub fn clear(&mut self) {
		self.pairs.clear();
	}

	pub fn len(&self) -> usize {
		self.pairs.len()
	}

	pub fn is_empty(&self) -> bool {
		self.pairs.is_empty()
	}

	/// Index of the first attribute with the local name `name`, regardless
	/// of its namespace.
	pub fn get_index(&self, name: &str) -> Option<usize> {
		self.pairs.iter().position(|(t, _)| t.name.as_str() == name)
	}

	pub fn get_index_triple(&self, triple: &Triple) -> Option<usize> {
		self.pairs.iter().position(|(t, _)| t == triple)
	}

	pub fn get(&self, index: usize) -> Option<(&Triple, &str)> {
		self.pairs.get(index).map(|(t, v)| (t, v.as_str()))
	}

	pub fn get_name(&self, index: usize) -> &str {
		self.pairs.get(index).map(|(t, _)| t.name.as_str()).unwrap_or("")
	}

	pub fn get_prefix(&self, index: usize) -> &str {
		self.pairs.get(index).map(|(t, _)| t.prefix.as_str()).unwrap_or("")
	}

	pub fn get_uri(&self, index: usize) -> &str {
		self.pairs.get(index).map(|(t, _)| t.uri.as_str()).unwrap_or("")
	}

	pub fn get_value(&self, index: usize) -> &str {
		self.pairs.get(index).map(|(_, v)| v.as_str()).unwrap_or("")
	}

	/// Value of the first attribute with local name `name`.
	pub fn value(&self, name: &str) -> Option<&str> {
		self.get_index(name).map(|i| self.pairs[i].1.as_str())
	}

	pub fn value_triple(&self, triple: &Triple) -> Option<&str> {
		self.get_index_triple(triple).map(|i| self.pairs[i].1.as_str())
	}

	pub fn has_attribute(&self, name: &str) -> bool {
		self.get_index(name).is_some()
	}

	pub fn iter(&self) -> impl Iterator<Item = (&Triple, &str)> + '_ {
		self.pairs.iter().map(|(t, v)| (t, v.as_str()))
	}

	fn read_with<T, F: Fn(&str) -> Option<T>>(
		&self,
		name: &str,
		kind: &str,
		log: &mut ErrorLog,
		parse: F,
	) -> Option<T> {
		let raw = self.value(name)?;
		match parse(raw) {
			Some(v) => Some(v),
			None => {
				log.add(XmlError::new(
					ErrorCode::XmlAttributeTypeMismatch,
					format!("attribute {:?} must be of type {}, got {:?}", name, kind, raw),
					0,
					0,
				));
				None
			}
		}
	}

	/// Read attribute `name` as boolean (`true`, `false`, `1`, `0`).
	///
	/// Absent attributes return `None`. Present but malformed values also
	/// return `None` and append a type mismatch record to `log`.
	pub fn read_bool(&self, name: &str, log: &mut ErrorLog) -> Option<bool> {
		self.read_with(name, "boolean", log, parse_bool)
	}

	/// Read attribute `name` as double. `INF`, `-INF` and `NaN` are
	/// accepted.
	pub fn read_f64(&self, name: &str, log: &mut ErrorLog) -> Option<f64> {
		self.read_with(name, "double", log, parse_f64)
	}

	pub fn read_i64(&self, name: &str, log: &mut ErrorLog) -> Option<i64> {
		self.read_with(name, "integer", log, |v| v.trim().parse().ok())
	}

	pub fn read_u32(&self, name: &str, log: &mut ErrorLog) -> Option<u32> {
		self.read_with(name, "unsigned integer", log, |v| v.trim().parse().ok())
	}
}

impl fmt::Display for Attributes {
	fn fmt<'f>(&self, f: &'f mut fmt::Formatter) -> fmt::Result {
		for (i, (triple, value)) in self.iter().enumerate() {
			if i > 0 {
				f.write_str(" ")?;
			}
			write!(f, "{}=\"{}\"", triple, value)?;
		}
		Ok(())
	}
}

/// 1-based source position of a token (0 if unknown).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TokenPosition {
	pub line: u64,
	pub column: u64,
}

impl TokenPosition {
	pub fn new(line: u64, column: u64) -> Self {
		Self { line, column }
	}
}

/**
# One lexical XML event
*/
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
	/// Start of an element, with its attributes and the namespaces declared
	/// on it.
	StartElement(TokenPosition, Triple, Attributes, XmlNamespaces),

	/// End of an element.
	///
	/// Empty elements (`<x/>`) are reported as a start immediately followed
	/// by an end.
	EndElement(TokenPosition, Triple),

	/// Character data, with references expanded and line endings
	/// normalized.
	Text(TokenPosition, String),

	/// End of the stream.
	Eof,
}

impl Token {
	/// Build a start tag from the raw backend representation.
	///
	/// `namespaces` is processed first, so the declarations of the element
	/// itself are known before any name is looked at.
	pub fn start_from_raw(
		position: TokenPosition,
		name: &str,
		attributes: &[&str],
		namespaces: &[&str],
		sep: char,
	) -> Token {
		let namespaces = XmlNamespaces::from_raw(namespaces);
		let triple = Triple::from_separated(name, sep);
		let attributes = Attributes::from_raw(attributes, sep);
		Token::StartElement(position, triple, attributes, namespaces)
	}

	pub fn is_start(&self) -> bool {
		matches!(self, Self::StartElement(..))
	}

	pub fn is_end(&self) -> bool {
		matches!(self, Self::EndElement(..))
	}

	pub fn is_element(&self) -> bool {
		self.is_start() || self.is_end()
	}

	pub fn is_text(&self) -> bool {
		matches!(self, Self::Text(..))
	}

	pub fn is_eof(&self) -> bool {
		matches!(self, Self::Eof)
	}

	/// Whether this is the end tag matching the start tag `start`.
	pub fn is_end_for(&self, start: &Token) -> bool {
		match (self, start.triple()) {
			(Self::EndElement(_, triple), Some(other)) => triple == other,
			_ => false,
		}
	}

	pub fn triple(&self) -> Option<&Triple> {
		match self {
			Self::StartElement(_, triple, ..) | Self::EndElement(_, triple) => Some(triple),
			_ => None,
		}
	}

	/// Local name of an element token, or `""`.
	pub fn name(&self) -> &str {
		self.triple().map(|t| t.name.as_str()).unwrap_or("")
	}

	pub fn prefix(&self) -> &str {
		self.triple().map(|t| t.prefix.as_str()).unwrap_or("")
	}

	pub fn uri(&self) -> &str {
		self.triple().map(|t| t.uri.as_str()).unwrap_or("")
	}

	pub fn attributes(&self) -> Option<&Attributes> {
		match self {
			Self::StartElement(_, _, attrs, _) => Some(attrs),
			_ => None,
		}
	}

	pub fn namespaces(&self) -> Option<&XmlNamespaces> {
		match self {
			Self::StartElement(_, _, _, ns) => Some(ns),
			_ => None,
		}
	}

	/// Character payload of a text token, or `""`.
	pub fn chars(&self) -> &str {
		match self {
			Self::Text(_, chars) => chars,
			_ => "",
		}
	}

	pub fn attr_value(&self, name: &str) -> Option<&str> {
		self.attributes()?.value(name)
	}

	pub fn has_attr(&self, name: &str) -> bool {
		self.attr_value(name).is_some()
	}

	pub fn position(&self) -> TokenPosition {
		match self {
			Self::StartElement(pos, ..) | Self::EndElement(pos, _) | Self::Text(pos, _) => *pos,
			Self::Eof => TokenPosition::default(),
		}
	}

	pub fn line(&self) -> u64 {
		self.position().line
	}

	pub fn column(&self) -> u64 {
		self.position().column
	}
}

impl fmt::Display for Token {
	fn fmt<'f>(&self, f: &'f mut fmt::Formatter) -> fmt::Result {
		match self {
			Self::StartElement(_, triple, attrs, ns) => {
				write!(f, "<{}", triple)?;
				if !ns.is_empty() {
					write!(f, " {}", ns)?;
				}
				if !attrs.is_empty() {
					write!(f, " {}", attrs)?;
				}
				f.write_str(">")
			}
			Self::EndElement(_, triple) => write!(f, "</{}>", triple),
			Self::Text(_, chars) => f.write_str(chars),
			Self::Eof => Ok(()),
		}
	}
}
