/*!
# Namespace resolution for event-based backends

Event-based engines report element and attribute names as written
(`prefix:local`). The [`NamespaceResolver`] collects the pieces of one start
tag, processes its `xmlns` declarations first, pushes them onto its scope
stack and only then resolves the element and attribute names. The result is
a [`RawStart`], the flat representation from which tokens are built.
*/
use crate::error::ErrorCode;
use crate::namespaces::{XmlNamespaces, PREFIX_XML, PREFIX_XMLNS, XMLNS_XML, XMLNS_XMLNS};
use crate::token::{Token, TokenPosition, Triple, NS_SEPARATOR};

use super::Fault;

/// A resolved start tag in raw form.
///
/// Names are encoded as `uri SEP local SEP prefix` with
/// [`NS_SEPARATOR`](crate::token::NS_SEPARATOR).
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct RawStart {
	pub name: String,
	/// Alternating encoded name and value.
	pub attributes: Vec<String>,
	/// Alternating prefix and URI.
	pub namespaces: Vec<String>,
}

impl RawStart {
	pub fn into_token(self, position: TokenPosition) -> Token {
		let attributes: Vec<&str> = self.attributes.iter().map(|s| s.as_str()).collect();
		let namespaces: Vec<&str> = self.namespaces.iter().map(|s| s.as_str()).collect();
		Token::start_from_raw(position, &self.name, &attributes, &namespaces, NS_SEPARATOR)
	}
}

struct ElementScratchpad {
	qname: String,
	attributes: Vec<(String, String)>,
	nsdecl: XmlNamespaces,
}

/// Split `prefix:local`.
pub(crate) fn split_qname(qname: &str) -> Result<(&str, &str), Fault> {
	match qname.find(':') {
		None => Ok(("", qname)),
		Some(i) => {
			let (prefix, local) = (&qname[..i], &qname[i + 1..]);
			if prefix.is_empty() || local.is_empty() || local.contains(':') {
				return Err(Fault::new(
					ErrorCode::BadXmlPrefix,
					format!("malformed qualified name {:?}", qname),
				));
			}
			Ok((prefix, local))
		}
	}
}

pub(crate) struct NamespaceResolver {
	namespace_stack: Vec<XmlNamespaces>,
	open: Vec<(String, Triple)>,
	scratchpad: Option<ElementScratchpad>,
}

impl NamespaceResolver {
	pub fn new() -> Self {
		Self {
			namespace_stack: Vec::new(),
			open: Vec::new(),
			scratchpad: None,
		}
	}

	pub fn clear(&mut self) {
		self.namespace_stack.clear();
		self.open.clear();
		self.scratchpad = None;
	}

	/// Number of currently open elements.
	pub fn depth(&self) -> usize {
		self.open.len()
	}

	/// Name of the innermost open element, as written.
	pub fn innermost(&self) -> Option<&str> {
		self.open.last().map(|(qname, _)| qname.as_str())
	}

	pub fn start_element(&mut self, qname: &str) {
		self.scratchpad = Some(ElementScratchpad {
			qname: qname.to_string(),
			attributes: Vec::new(),
			nsdecl: XmlNamespaces::new(),
		});
	}

	pub fn push_attribute(&mut self, qname: &str, value: &str) -> Result<(), Fault> {
		let scratchpad = match self.scratchpad.as_mut() {
			Some(s) => s,
			None => {
				return Err(Fault::new(
					ErrorCode::InternalParserError,
					"attribute outside of start tag",
				))
			}
		};
		let (prefix, local) = split_qname(qname)?;
		let declared = if prefix == PREFIX_XMLNS {
			Some(local)
		} else if prefix.is_empty() && local == PREFIX_XMLNS {
			Some("")
		} else {
			None
		};
		let declared = match declared {
			Some(p) => p,
			None => {
				scratchpad.attributes.push((qname.to_string(), value.to_string()));
				return Ok(());
			}
		};

		// Namespaces in XML 1.0
		// Namespace constraint: Reserved Prefixes and Namespace Names
		if declared == PREFIX_XMLNS
			|| (declared == PREFIX_XML) != (value == XMLNS_XML)
			|| value == XMLNS_XMLNS
		{
			return Err(Fault::new(
				ErrorCode::BadXmlPrefixValue,
				format!("invalid binding of prefix {:?} to {:?}", declared, value),
			));
		}
		if !declared.is_empty() && value.is_empty() {
			return Err(Fault::new(
				ErrorCode::BadXmlPrefixValue,
				format!("prefix {:?} bound to empty namespace name", declared),
			));
		}
		if scratchpad.nsdecl.has_prefix(declared) {
			return Err(Fault::new(
				ErrorCode::DuplicateXmlAttribute,
				format!("namespace prefix {:?} declared twice", declared),
			));
		}
		scratchpad
			.nsdecl
			.add(value, declared)
			.map_err(|e| Fault::new(ErrorCode::BadXmlPrefixValue, e.to_string()))
	}

	fn lookup_prefix(&self, prefix: &str) -> Result<&str, Fault> {
		if prefix.is_empty() {
			for scope in self.namespace_stack.iter().rev() {
				if scope.has_prefix("") {
					return Ok(scope.get_uri(""));
				}
			}
			return Ok("");
		}
		if prefix == PREFIX_XML {
			return Ok(XMLNS_XML);
		}
		for scope in self.namespace_stack.iter().rev() {
			if scope.has_prefix(prefix) {
				return Ok(scope.get_uri(prefix));
			}
		}
		// Namespaces in XML 1.0
		// Namespace constraint: Prefix Declared
		Err(Fault::new(
			ErrorCode::BadXmlPrefix,
			format!("use of undeclared namespace prefix {:?}", prefix),
		))
	}

	/// Close the start tag: push its scope, then resolve all names.
	pub fn finish_element(&mut self) -> Result<RawStart, Fault> {
		let ElementScratchpad {
			qname,
			attributes,
			nsdecl,
		} = match self.scratchpad.take() {
			Some(s) => s,
			None => {
				return Err(Fault::new(
					ErrorCode::InternalParserError,
					"no start tag to finish",
				))
			}
		};

		let mut namespaces = Vec::with_capacity(nsdecl.len() * 2);
		for (prefix, uri) in nsdecl.iter() {
			namespaces.push(prefix.to_string());
			namespaces.push(uri.to_string());
		}
		self.namespace_stack.push(nsdecl);

		let triple = match self.resolve(&qname, true) {
			Ok(t) => t,
			Err(e) => {
				self.namespace_stack.pop();
				return Err(e);
			}
		};

		let mut raw_attributes = Vec::with_capacity(attributes.len() * 2);
		let mut seen: Vec<Triple> = Vec::with_capacity(attributes.len());
		for (attr_qname, value) in attributes {
			let attr = match self.resolve(&attr_qname, false) {
				Ok(t) => t,
				Err(e) => {
					self.namespace_stack.pop();
					return Err(e);
				}
			};
			// XML 1.0
			// Well-formedness constraint: Unique Att Spec
			// Namespaces in XML 1.0
			// Namespace constraint: Attributes Unique
			if seen.contains(&attr) {
				self.namespace_stack.pop();
				return Err(Fault::new(
					ErrorCode::DuplicateXmlAttribute,
					format!("duplicate attribute {:?}", attr_qname),
				));
			}
			raw_attributes.push(attr.to_separated(NS_SEPARATOR));
			raw_attributes.push(value);
			seen.push(attr);
		}

		let name = triple.to_separated(NS_SEPARATOR);
		self.open.push((qname, triple));
		Ok(RawStart {
			name,
			attributes: raw_attributes,
			namespaces,
		})
	}

	fn resolve(&self, qname: &str, is_element: bool) -> Result<Triple, Fault> {
		let (prefix, local) = split_qname(qname)?;
		// unprefixed attributes are never in a namespace
		let uri = if prefix.is_empty() && !is_element {
			""
		} else {
			self.lookup_prefix(prefix)?
		};
		Ok(Triple::new(local, uri, prefix))
	}

	/// Close the innermost element, which must be named `qname`.
	pub fn end_element(&mut self, qname: &str) -> Result<Triple, Fault> {
		match self.open.last() {
			Some((open, _)) if open == qname => (),
			Some((open, _)) => {
				return Err(Fault::new(
					ErrorCode::XmlTagMismatch,
					format!("expected </{}>, found </{}>", open, qname),
				))
			}
			None => {
				return Err(Fault::new(
					ErrorCode::XmlTagMismatch,
					format!("end tag </{}> without start tag", qname),
				))
			}
		}
		self.namespace_stack.pop();
		match self.open.pop() {
			Some((_, triple)) => Ok(triple),
			None => Err(Fault::new(ErrorCode::InternalParserError, "element stack underflow")),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn start(r: &mut NamespaceResolver, qname: &str, attrs: &[(&str, &str)]) -> Result<Token, Fault> {
		r.start_element(qname);
		for (k, v) in attrs {
			r.push_attribute(k, v)?;
		}
		Ok(r.finish_element()?.into_token(TokenPosition::default()))
	}

	#[test]
	fn resolves_default_namespace_on_element() {
		let mut r = NamespaceResolver::new();
		let tok = start(&mut r, "root", &[("xmlns", "urn:d"), ("a", "1")]).unwrap();
		match tok {
			Token::StartElement(_, triple, attrs, ns) => {
				assert_eq!(triple, Triple::new("root", "urn:d", ""));
				assert_eq!(attrs.get_uri(0), "");
				assert_eq!(ns.get_uri(""), "urn:d");
				assert_eq!(ns.len(), 1);
			}
			other => panic!("unexpected token: {:?}", other),
		}
	}

	#[test]
	fn attribute_prefix_may_use_declaration_on_same_tag() {
		let mut r = NamespaceResolver::new();
		let tok = start(&mut r, "p:root", &[("p:attr", "v"), ("xmlns:p", "urn:p")]).unwrap();
		match tok {
			Token::StartElement(_, triple, attrs, _) => {
				assert_eq!(triple, Triple::new("root", "urn:p", "p"));
				assert_eq!(triple.prefix.as_str(), "p");
				assert_eq!(attrs.get_uri(0), "urn:p");
				assert_eq!(attrs.get_prefix(0), "p");
				assert_eq!(attrs.get_value(0), "v");
			}
			other => panic!("unexpected token: {:?}", other),
		}
	}

	#[test]
	fn nested_scopes_shadow_and_unwind() {
		let mut r = NamespaceResolver::new();
		start(&mut r, "a", &[("xmlns:p", "urn:outer")]).unwrap();
		let inner = start(&mut r, "p:b", &[("xmlns:p", "urn:inner")]).unwrap();
		assert_eq!(inner.uri(), "urn:inner");
		assert_eq!(r.end_element("p:b").unwrap().uri, "urn:inner");
		let sibling = start(&mut r, "p:c", &[]).unwrap();
		assert_eq!(sibling.uri(), "urn:outer");
		r.end_element("p:c").unwrap();
		r.end_element("a").unwrap();
		assert_eq!(r.depth(), 0);
	}

	#[test]
	fn rejects_undeclared_prefix() {
		let mut r = NamespaceResolver::new();
		let err = start(&mut r, "q:root", &[]).unwrap_err();
		assert_eq!(err.code, ErrorCode::BadXmlPrefix);
		assert_eq!(r.depth(), 0);
		let err = start(&mut r, "root", &[("q:x", "1")]).unwrap_err();
		assert_eq!(err.code, ErrorCode::BadXmlPrefix);
	}

	#[test]
	fn xml_prefix_is_always_bound() {
		let mut r = NamespaceResolver::new();
		let tok = start(&mut r, "root", &[("xml:lang", "en")]).unwrap();
		assert_eq!(tok.attributes().unwrap().get_uri(0), XMLNS_XML);
	}

	#[test]
	fn rejects_duplicate_attribute_after_resolution() {
		let mut r = NamespaceResolver::new();
		let err = start(
			&mut r,
			"root",
			&[("xmlns:a", "urn:x"), ("xmlns:b", "urn:x"), ("a:y", "1"), ("b:y", "2")],
		)
		.unwrap_err();
		assert_eq!(err.code, ErrorCode::DuplicateXmlAttribute);
	}

	#[test]
	fn rejects_rebinding_xml_prefixes() {
		let mut r = NamespaceResolver::new();
		let err = start(&mut r, "root", &[("xmlns:xml", "urn:x")]).unwrap_err();
		assert_eq!(err.code, ErrorCode::BadXmlPrefixValue);
		let err = start(&mut r, "root", &[("xmlns:xmlns", "urn:x")]).unwrap_err();
		assert_eq!(err.code, ErrorCode::BadXmlPrefixValue);
		let err = start(&mut r, "root", &[("xmlns:p", XMLNS_XML)]).unwrap_err();
		assert_eq!(err.code, ErrorCode::BadXmlPrefixValue);
		start(&mut r, "root", &[("xmlns:xml", XMLNS_XML)]).unwrap();
	}

	#[test]
	fn end_tag_mismatch() {
		let mut r = NamespaceResolver::new();
		start(&mut r, "a", &[]).unwrap();
		let err = r.end_element("b").unwrap_err();
		assert_eq!(err.code, ErrorCode::XmlTagMismatch);
		assert_eq!(r.innermost(), Some("a"));
	}

	#[test]
	fn split_qname_rejects_malformed() {
		assert_eq!(split_qname("a:b").unwrap(), ("a", "b"));
		assert_eq!(split_qname("b").unwrap(), ("", "b"));
		assert!(split_qname(":b").is_err());
		assert!(split_qname("a:").is_err());
		assert!(split_qname("a:b:c").is_err());
	}
}
