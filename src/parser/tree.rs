/*!
# Tree-based backend on top of roxmltree

roxmltree parses a complete document at once. The tree is flattened into
tokens during [`Backend::parse_first`]; every following chunk releases the
pending tokens up to and including the next start tag.
*/
use std::collections::VecDeque;

use roxmltree::{Document, Node, ParsingOptions};

use crate::error::{ErrorCode, ErrorLog, Result};
use crate::namespaces::{PREFIX_XML, PREFIX_XMLNS, XMLNS_XML};
use crate::token::{Token, TokenPosition, Triple, NS_SEPARATOR};
use crate::tokenizer::Tokenizer;

use super::{utf8, Backend, Fault, Source, BACKEND_TREE};

fn position_of(doc: &Document, pos: usize) -> TokenPosition {
	let tp = doc.text_pos_at(pos);
	TokenPosition::new(tp.row as u64, tp.col as u64)
}

fn pseudo_attr<'d>(decl: &'d str, name: &str) -> Option<&'d str> {
	let at = decl.find(name)?;
	let rest = decl[at + name.len()..].trim_start().strip_prefix('=')?.trim_start();
	let quote = rest.chars().next()?;
	if quote != '"' && quote != '\'' {
		return None;
	}
	let rest = &rest[1..];
	let end = rest.find(quote)?;
	Some(&rest[..end])
}

/// Pull `version` and `encoding` out of the XML declaration, if any.
fn sniff_declaration(text: &str) -> (Option<&str>, Option<&str>) {
	let text = text.trim_start_matches('\u{feff}');
	if !text.starts_with("<?xml") {
		return (None, None);
	}
	match text.find("?>") {
		Some(end) => {
			let decl = &text[..end];
			(pseudo_attr(decl, "version"), pseudo_attr(decl, "encoding"))
		}
		None => (None, None),
	}
}

/// Prefix of an element as written in the source.
fn element_prefix<'a>(text: &'a str, node: &Node) -> &'a str {
	let tag = match text.get(node.range().start..) {
		Some(t) => t.trim_start_matches('<'),
		None => return "",
	};
	let end = tag
		.find(|c: char| c.is_whitespace() || c == '/' || c == '>')
		.unwrap_or(tag.len());
	match tag[..end].find(':') {
		Some(i) => &tag[..i],
		None => "",
	}
}

/// Prefix bound to `uri` on `node`, for a namespaced attribute.
fn attribute_prefix(node: &Node, uri: &str) -> String {
	if uri == XMLNS_XML {
		return PREFIX_XML.to_string();
	}
	node.namespaces()
		.find(|ns| ns.name().is_some() && ns.uri() == uri)
		.and_then(|ns| ns.name())
		.unwrap_or("")
		.to_string()
}

/// Prefixes declared by `xmlns` attributes in the start tag of `node`, in
/// source order. The default namespace is reported as `""`.
fn declared_prefixes<'a>(text: &'a str, node: &Node) -> Vec<&'a str> {
	let mut result = Vec::new();
	let mut rest = match text.get(node.range().start..) {
		Some(t) => t.trim_start_matches('<'),
		None => return result,
	};
	let end = rest
		.find(|c: char| c.is_whitespace() || c == '/' || c == '>')
		.unwrap_or(rest.len());
	rest = &rest[end..];
	loop {
		rest = rest.trim_start();
		if rest.is_empty() || rest.starts_with('/') || rest.starts_with('>') {
			break;
		}
		let end = rest
			.find(|c: char| c.is_whitespace() || c == '=')
			.unwrap_or(rest.len());
		let name = &rest[..end];
		if name == PREFIX_XMLNS {
			result.push("");
		} else if let Some(prefix) = name.strip_prefix("xmlns:") {
			result.push(prefix);
		}
		rest = match rest[end..].trim_start().strip_prefix('=') {
			Some(r) => r.trim_start(),
			None => break,
		};
		let quote = match rest.chars().next() {
			Some(q @ ('"' | '\'')) => q,
			_ => break,
		};
		rest = match rest[1..].find(quote) {
			Some(close) => &rest[close + 2..],
			None => break,
		};
	}
	result
}

fn start_token(doc: &Document, text: &str, node: &Node) -> Token {
	let mut raw_ns = Vec::new();
	for prefix in declared_prefixes(text, node) {
		let wanted = if prefix.is_empty() { None } else { Some(prefix) };
		// an undeclared default namespace has no entry in the tree
		let uri = node
			.namespaces()
			.find(|ns| ns.name() == wanted)
			.map(|ns| ns.uri())
			.unwrap_or("");
		raw_ns.push(prefix);
		raw_ns.push(uri);
	}

	let tag = node.tag_name();
	let name = Triple::new(
		tag.name(),
		tag.namespace().unwrap_or(""),
		element_prefix(text, node),
	)
	.to_separated(NS_SEPARATOR);

	let mut raw_attrs = Vec::new();
	for attr in node.attributes() {
		let uri = attr.namespace().unwrap_or("");
		let prefix = if uri.is_empty() {
			String::new()
		} else {
			attribute_prefix(node, uri)
		};
		raw_attrs.push(Triple::new(attr.name(), uri, &prefix).to_separated(NS_SEPARATOR));
		raw_attrs.push(attr.value().to_string());
	}
	let raw_attrs: Vec<&str> = raw_attrs.iter().map(|s| s.as_str()).collect();

	Token::start_from_raw(
		position_of(doc, node.range().start),
		&name,
		&raw_attrs,
		&raw_ns,
		NS_SEPARATOR,
	)
}

fn flatten(doc: &Document, text: &str, node: Node, out: &mut VecDeque<Token>) {
	for child in node.children() {
		if child.is_element() {
			out.push_back(start_token(doc, text, &child));
			flatten(doc, text, child, out);
			let tag = child.tag_name();
			let triple = Triple::new(
				tag.name(),
				tag.namespace().unwrap_or(""),
				element_prefix(text, &child),
			);
			let pos = position_of(doc, child.range().end);
			out.push_back(Token::EndElement(pos, triple));
		} else if let (true, true, Some(chars)) = (child.is_text(), node.is_element(), child.text()) {
			let pos = position_of(doc, child.range().start);
			// entities and CDATA sections split the text into several nodes
			match out.back_mut() {
				Some(Token::Text(_, prev)) => prev.push_str(chars),
				_ => out.push_back(Token::Text(pos, chars.to_string())),
			}
		}
	}
}

/**
# Backend using [`roxmltree::Document`]

The whole source is read and checked on the first call, so malformed input
anywhere in the document is reported before the first token is handed out.
*/
pub struct TreeBackend {
	pending: VecDeque<Token>,
	last: TokenPosition,
	loaded: bool,
	failed: bool,
}

impl TreeBackend {
	pub fn new() -> Self {
		Self {
			pending: VecDeque::new(),
			last: TokenPosition::default(),
			loaded: false,
			failed: false,
		}
	}

	fn load(&mut self, data: &[u8], tokens: &mut Tokenizer, log: &mut ErrorLog) -> bool {
		let text = match utf8(data) {
			Ok(t) => t,
			Err(fault) => {
				fault.report(log, TokenPosition::default());
				return false;
			}
		};
		let (version, encoding) = sniff_declaration(text);
		if let Some(v) = version {
			tokens.set_version(v);
		}
		if let Some(e) = encoding {
			tokens.set_encoding(e);
		}

		let options = ParsingOptions {
			allow_dtd: true,
			..ParsingOptions::default()
		};
		let doc = match Document::parse_with_options(text, options) {
			Ok(doc) => doc,
			Err(e) => {
				let pos = e.pos();
				let fault = Fault::new(classify(&e), e.to_string());
				self.last = TokenPosition::new(pos.row as u64, pos.col as u64);
				fault.report(log, self.last);
				return false;
			}
		};
		flatten(&doc, text, doc.root(), &mut self.pending);
		tracing::debug!(
			backend = BACKEND_TREE,
			tokens = self.pending.len(),
			"document loaded"
		);
		true
	}
}

fn classify(e: &roxmltree::Error) -> ErrorCode {
	use roxmltree::Error as E;
	match e {
		E::UnexpectedCloseTag(..) => ErrorCode::XmlTagMismatch,
		E::UnknownEntityReference(..) => ErrorCode::UndefinedXmlEntity,
		E::UnknownNamespace(..) => ErrorCode::BadXmlPrefix,
		E::DuplicatedAttribute(..) => ErrorCode::DuplicateXmlAttribute,
		E::UnexpectedEndOfStream => ErrorCode::XmlUnexpectedEof,
		E::NoRootNode | E::UnclosedRootNode => ErrorCode::XmlUnexpectedEof,
		E::NonXmlChar(..) => ErrorCode::InvalidCharInXml,
		E::DtdDetected => ErrorCode::BadXmlDoctype,
		_ => ErrorCode::BadlyFormedXml,
	}
}

impl Backend for TreeBackend {
	fn name(&self) -> &'static str {
		BACKEND_TREE
	}

	fn parse_first(
		&mut self,
		source: Source,
		tokens: &mut Tokenizer,
		log: &mut ErrorLog,
	) -> Result<bool> {
		self.parse_reset();
		tracing::debug!(backend = BACKEND_TREE, %source, "opening document");
		let data = source.read_all()?;
		self.loaded = true;
		if !self.load(&data, tokens, log) {
			self.failed = true;
			return Ok(false);
		}
		self.parse_next(tokens, log);
		Ok(true)
	}

	fn parse_next(&mut self, tokens: &mut Tokenizer, _log: &mut ErrorLog) -> bool {
		if self.failed || !self.loaded {
			return false;
		}
		if self.pending.is_empty() {
			tokens.set_eof();
			return false;
		}
		while let Some(token) = self.pending.pop_front() {
			let is_start = token.is_start();
			self.last = token.position();
			tokens.push(token);
			if is_start {
				break;
			}
		}
		true
	}

	fn parse_reset(&mut self) {
		self.pending.clear();
		self.last = TokenPosition::default();
		self.loaded = false;
		self.failed = false;
	}

	fn line(&self) -> u64 {
		self.last.line
	}

	fn column(&self) -> u64 {
		self.last.column
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn run(doc: &[u8]) -> (Vec<Token>, Tokenizer, ErrorLog, bool) {
		let mut backend = TreeBackend::new();
		let mut tokens = Tokenizer::new();
		let mut log = ErrorLog::new();
		let mut ok = backend
			.parse_first(Source::Memory(doc.to_vec()), &mut tokens, &mut log)
			.unwrap();
		let mut out = Vec::new();
		while ok {
			while let Some(tok) = tokens.next() {
				out.push(tok);
			}
			ok = backend.parse_next(&mut tokens, &mut log);
		}
		let clean = tokens.eof_seen() && log.is_empty();
		(out, tokens, log, clean)
	}

	#[test]
	fn sniffs_declaration() {
		assert_eq!(
			sniff_declaration("<?xml version=\"1.0\" encoding='UTF-8'?><a/>"),
			(Some("1.0"), Some("UTF-8"))
		);
		assert_eq!(
			sniff_declaration("<?xml version = '1.1'?><a/>"),
			(Some("1.1"), None)
		);
		assert_eq!(sniff_declaration("<a/>"), (None, None));
	}

	#[test]
	fn flattens_document_with_prefixes() {
		let (toks, tokens, _, clean) = run(
			b"<?xml version=\"1.0\"?>\n<p:root xmlns:p=\"urn:p\" p:a=\"1\" b=\"2\"><p:child>t&amp;t</p:child><e/></p:root>",
		);
		assert!(clean);
		assert_eq!(tokens.version(), "1.0");
		assert_eq!(toks.len(), 7);
		match &toks[0] {
			Token::StartElement(pos, triple, attrs, ns) => {
				assert_eq!(*triple, Triple::new("root", "urn:p", "p"));
				assert_eq!(triple.prefix.as_str(), "p");
				assert_eq!(pos.line, 2);
				assert_eq!(attrs.len(), 2);
				assert_eq!(attrs.get_prefix(0), "p");
				assert_eq!(attrs.get_uri(0), "urn:p");
				assert_eq!(attrs.get_uri(1), "");
				assert_eq!(ns.len(), 1);
				assert_eq!(ns.get_uri("p"), "urn:p");
			}
			other => panic!("unexpected token: {:?}", other),
		}
		match &toks[1] {
			Token::StartElement(_, triple, _, ns) => {
				assert_eq!(triple.prefix.as_str(), "p");
				assert!(ns.is_empty());
			}
			other => panic!("unexpected token: {:?}", other),
		}
		assert_eq!(toks[2].chars(), "t&t");
		assert!(toks[3].is_end_for(&toks[1]));
		assert_eq!(toks[4].name(), "e");
		assert!(toks[6].is_end_for(&toks[0]));
	}

	#[test]
	fn keeps_declarations_written_on_the_tag() {
		let (toks, _, _, clean) = run(
			b"<a xmlns:p=\"urn:p\" xmlns=\"urn:x\"><p:b xmlns:p=\"urn:p\"/><c xmlns=\"\" q='x>y' xmlns:r=\"urn:r\"/></a>",
		);
		assert!(clean);
		match &toks[0] {
			Token::StartElement(_, _, _, ns) => {
				assert_eq!(ns.len(), 2);
				assert_eq!(ns.get_uri("p"), "urn:p");
				assert_eq!(ns.get_uri(""), "urn:x");
			}
			other => panic!("unexpected token: {:?}", other),
		}
		match &toks[1] {
			Token::StartElement(_, triple, _, ns) => {
				assert_eq!(*triple, Triple::new("b", "urn:p", "p"));
				assert_eq!(ns.len(), 1);
				assert!(ns.has_ns("urn:p", "p"));
			}
			other => panic!("unexpected token: {:?}", other),
		}
		match &toks[3] {
			Token::StartElement(_, triple, attrs, ns) => {
				assert_eq!(*triple, Triple::local("c"));
				assert_eq!(attrs.len(), 1);
				assert_eq!(ns.len(), 2);
				assert!(ns.has_ns("", ""));
				assert_eq!(ns.get_uri("r"), "urn:r");
			}
			other => panic!("unexpected token: {:?}", other),
		}
	}

	#[test]
	fn merges_text_split_by_cdata() {
		let (toks, _, _, clean) = run(b"<a>x<![CDATA[<y>]]>z<b/></a>");
		assert!(clean);
		assert_eq!(toks.len(), 5);
		assert_eq!(toks[1].chars(), "x<y>z");
	}

	#[test]
	fn chunks_end_at_start_tags() {
		let mut backend = TreeBackend::new();
		let mut tokens = Tokenizer::new();
		let mut log = ErrorLog::new();
		assert!(backend
			.parse_first(Source::Memory(b"<a><b/><c/></a>".to_vec()), &mut tokens, &mut log)
			.unwrap());
		assert_eq!(tokens.len(), 1);
		assert!(backend.parse_next(&mut tokens, &mut log));
		assert_eq!(tokens.len(), 2);
		assert!(backend.parse_next(&mut tokens, &mut log));
		assert_eq!(tokens.len(), 4);
		assert!(backend.parse_next(&mut tokens, &mut log));
		assert_eq!(tokens.len(), 6);
		assert!(!backend.parse_next(&mut tokens, &mut log));
		assert!(tokens.eof_seen());
	}

	#[test]
	fn malformed_document_fails_first_chunk() {
		let (toks, tokens, log, _) = run(b"<a><b></a>");
		assert!(toks.is_empty());
		assert!(!tokens.eof_seen());
		assert!(log.contains(ErrorCode::XmlTagMismatch));
	}

	#[test]
	fn unterminated_document_is_logged() {
		let (_, _, log, _) = run(b"<a><b/>");
		assert_eq!(log.len(), 1);
	}
}
