/*!
# Event-based backend on top of quick-xml

quick-xml is a pull parser; its events are fed through the
[`NamespaceResolver`] one at a time. Each [`Backend::parse_next`] call reads
events until at least one token was produced.
*/
use std::io;

use quick_xml::events::attributes::AttrError;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::error::{ErrorCode, ErrorLog, Result};
use crate::token::{Token, TokenPosition};
use crate::tokenizer::Tokenizer;

use super::{
	is_whitespace, normalize_attribute_value, normalize_line_endings, utf8, Backend, Fault,
	NamespaceResolver, PositionReader, Source, BACKEND_QUICK,
};

type SourceReader = Reader<PositionReader<Box<dyn io::BufRead>>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
	Progress,
	Eof,
	Failed,
}

/// Document-level state, separate from the reader so that events borrowed
/// from the read buffer can be handled while it is alive.
struct DocumentState {
	resolver: NamespaceResolver,
	root_seen: bool,
	done: Option<Step>,
}

impl DocumentState {
	fn new() -> Self {
		Self {
			resolver: NamespaceResolver::new(),
			root_seen: false,
			done: None,
		}
	}

	fn root_closed(&self) -> bool {
		self.root_seen && self.resolver.depth() == 0
	}

	fn start(
		&mut self,
		e: &BytesStart,
		pos: TokenPosition,
		tokens: &mut Tokenizer,
	) -> std::result::Result<(), Fault> {
		if self.root_closed() {
			return Err(Fault::new(
				ErrorCode::InvalidAfterXmlContent,
				"element after the root element",
			));
		}
		let name = e.name();
		let qname = utf8(name.as_ref())?;
		self.resolver.start_element(qname);
		for attr in e.attributes() {
			let attr = attr.map_err(|e| match e {
				AttrError::Duplicated(..) => {
					Fault::new(ErrorCode::DuplicateXmlAttribute, e.to_string())
				}
				other => Fault::new(ErrorCode::BadXmlAttributeValue, other.to_string()),
			})?;
			let key = utf8(attr.key.as_ref())?;
			let raw = utf8(&attr.value)?;
			let raw = normalize_attribute_value(raw);
			let value = quick_xml::escape::unescape(&raw)
				.map_err(|e| Fault::new(ErrorCode::UndefinedXmlEntity, e.to_string()))?;
			self.resolver.push_attribute(key, &value)?;
		}
		let raw = self.resolver.finish_element()?;
		self.root_seen = true;
		tokens.push(raw.into_token(pos));
		Ok(())
	}

	fn end(
		&mut self,
		qname: &[u8],
		pos: TokenPosition,
		tokens: &mut Tokenizer,
	) -> std::result::Result<(), Fault> {
		let qname = utf8(qname)?;
		let triple = self.resolver.end_element(qname)?;
		tokens.push(Token::EndElement(pos, triple));
		Ok(())
	}

	fn text(
		&mut self,
		raw: &[u8],
		escaped: bool,
		pos: TokenPosition,
		tokens: &mut Tokenizer,
	) -> std::result::Result<(), Fault> {
		let raw = utf8(raw)?;
		if self.resolver.depth() == 0 {
			if is_whitespace(raw) {
				return Ok(());
			}
			let code = if self.root_seen {
				ErrorCode::InvalidAfterXmlContent
			} else {
				ErrorCode::BadlyFormedXml
			};
			return Err(Fault::new(code, "text outside of the root element"));
		}
		let raw = normalize_line_endings(raw);
		if escaped {
			let text = quick_xml::escape::unescape(&raw)
				.map_err(|e| Fault::new(ErrorCode::UndefinedXmlEntity, e.to_string()))?;
			tokens.push_text(pos, &text);
		} else {
			tokens.push_text(pos, &raw);
		}
		Ok(())
	}

	fn eof(&mut self, tokens: &mut Tokenizer) -> std::result::Result<(), Fault> {
		if let Some(open) = self.resolver.innermost() {
			return Err(Fault::new(
				ErrorCode::XmlUnexpectedEof,
				format!("end of input inside <{}>", open),
			));
		}
		if !self.root_seen {
			return Err(Fault::new(ErrorCode::XmlUnexpectedEof, "no root element"));
		}
		tokens.set_eof();
		Ok(())
	}

	fn handle(
		&mut self,
		event: Event,
		pos: TokenPosition,
		tokens: &mut Tokenizer,
	) -> std::result::Result<bool, Fault> {
		match event {
			Event::Decl(d) => {
				if let Ok(version) = d.version() {
					tokens.set_version(utf8(&version)?);
				}
				if let Some(Ok(encoding)) = d.encoding() {
					tokens.set_encoding(utf8(&encoding)?);
				}
			}
			Event::Start(e) => self.start(&e, pos, tokens)?,
			Event::Empty(e) => {
				self.start(&e, pos, tokens)?;
				self.end(e.name().as_ref(), pos, tokens)?;
			}
			Event::End(e) => self.end(e.name().as_ref(), pos, tokens)?,
			Event::Text(e) => self.text(&e, true, pos, tokens)?,
			Event::CData(e) => self.text(&e.into_inner(), false, pos, tokens)?,
			Event::Eof => {
				self.eof(tokens)?;
				return Ok(true);
			}
			// comments, processing instructions and the doctype carry no
			// tokens
			_ => (),
		}
		Ok(false)
	}
}

fn classify(e: &quick_xml::Error) -> ErrorCode {
	use quick_xml::errors::IllFormedError;
	match e {
		quick_xml::Error::Io(_) => ErrorCode::FileUnreadable,
		quick_xml::Error::IllFormed(IllFormedError::MismatchedEndTag { .. }) => {
			ErrorCode::XmlTagMismatch
		}
		quick_xml::Error::IllFormed(IllFormedError::UnmatchedEndTag(_)) => {
			ErrorCode::XmlTagMismatch
		}
		quick_xml::Error::IllFormed(IllFormedError::MissingEndTag(_)) => {
			ErrorCode::XmlUnexpectedEof
		}
		quick_xml::Error::Syntax(_) => ErrorCode::UnclosedXmlToken,
		quick_xml::Error::InvalidAttr(AttrError::Duplicated(..)) => {
			ErrorCode::DuplicateXmlAttribute
		}
		quick_xml::Error::InvalidAttr(_) => ErrorCode::BadXmlAttributeValue,
		quick_xml::Error::Escape(_) => ErrorCode::UndefinedXmlEntity,
		_ => ErrorCode::BadlyFormedXml,
	}
}

/**
# Backend using [`quick_xml::Reader`]

Empty elements are reported as a start token directly followed by an end
token. CDATA sections are reported as text. Adjacent text runs are merged
by the [`Tokenizer`].
*/
pub struct QuickBackend {
	reader: Option<SourceReader>,
	buf: Vec<u8>,
	state: DocumentState,
}

impl QuickBackend {
	pub fn new() -> Self {
		Self {
			reader: None,
			buf: Vec::new(),
			state: DocumentState::new(),
		}
	}

	fn position(&self) -> TokenPosition {
		match self.reader.as_ref() {
			Some(r) => TokenPosition::new(r.get_ref().line(), r.get_ref().column()),
			None => TokenPosition::default(),
		}
	}

	fn step(&mut self, tokens: &mut Tokenizer, log: &mut ErrorLog) -> Step {
		if let Some(done) = self.state.done {
			return done;
		}
		let initial = tokens.len();
		loop {
			let pos = self.position();
			let reader = match self.reader.as_mut() {
				Some(r) => r,
				None => return Step::Failed,
			};
			self.buf.clear();
			let result = match reader.read_event_into(&mut self.buf) {
				Ok(event) => self.state.handle(event, pos, tokens),
				Err(e) => Err(Fault::new(classify(&e), e.to_string())),
			};
			match result {
				Ok(true) => {
					tracing::debug!(backend = BACKEND_QUICK, "end of document");
					self.state.done = Some(Step::Eof);
					return Step::Eof;
				}
				Ok(false) => (),
				Err(fault) => {
					let pos = self.position();
					fault.report(log, pos);
					self.state.done = Some(Step::Failed);
					return Step::Failed;
				}
			}
			if tokens.len() > initial {
				return Step::Progress;
			}
		}
	}
}

impl Backend for QuickBackend {
	fn name(&self) -> &'static str {
		BACKEND_QUICK
	}

	fn parse_first(
		&mut self,
		source: Source,
		tokens: &mut Tokenizer,
		log: &mut ErrorLog,
	) -> Result<bool> {
		self.parse_reset();
		tracing::debug!(backend = BACKEND_QUICK, %source, "opening document");
		let input = source.open()?;
		// trim_text and the end name checks keep their defaults: text is
		// reported unchanged and end tags are matched by the resolver
		let reader = Reader::from_reader(PositionReader::new(input));
		self.reader = Some(reader);
		Ok(self.step(tokens, log) != Step::Failed)
	}

	fn parse_next(&mut self, tokens: &mut Tokenizer, log: &mut ErrorLog) -> bool {
		self.step(tokens, log) == Step::Progress
	}

	fn parse_reset(&mut self) {
		self.reader = None;
		self.buf.clear();
		self.state = DocumentState::new();
	}

	fn line(&self) -> u64 {
		self.position().line
	}

	fn column(&self) -> u64 {
		self.position().column
	}
}
