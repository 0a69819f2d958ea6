/*!
# Token input stream

[`InputStream`] drives a parser [`Backend`] chunk by chunk and hands out the
resulting [`Token`]s. Tokens are only parsed as far as needed: [`next`] and
[`peek`] pull one more chunk whenever the queue runs dry, and the lookahead
helpers pull further chunks until they can answer.

The stream is in one of three states:

* *good*: tokens can be read,
* *EOF*: the document ended and every token was consumed,
* *error*: the backend reported a problem (see the [`ErrorLog`]).

Once not good, [`next`] and [`peek`] return [`Token::Eof`].

   [`next`]: InputStream::next
   [`peek`]: InputStream::peek
*/
use std::fmt;

use crate::error::{ErrorLog, Result, SharedErrorLog, XmlError};
use crate::namespaces::XmlNamespaces;
use crate::parser::{create_backend, Backend, Source};
use crate::token::Token;
use crate::tokenizer::{Lookahead, Tokenizer};

static EOF_TOKEN: Token = Token::Eof;

/**
# Lookahead-capable stream of XML tokens

Created from a document in memory or a file name and the name of a
backend. The stream owns its backend; it is deliberately not `Clone`, as a
backend session cannot be duplicated.

The [`ErrorLog`] is shared: the creator may keep a handle and inspect it
while or after reading. Dropping the stream detaches it from the log before
the backend is released.
*/
pub struct InputStream {
	backend: Box<dyn Backend>,
	tokenizer: Tokenizer,
	log: SharedErrorLog,
	error: bool,
	namespaces: Option<XmlNamespaces>,
}

impl InputStream {
	/// Open `content` (a file name if `is_file`, the document otherwise)
	/// with the backend called `backend` (empty for the default).
	///
	/// Fails if the backend is unknown or the file cannot be opened.
	/// Malformed XML does not fail construction; the stream is then in its
	/// error state.
	pub fn new(content: &[u8], is_file: bool, backend: &str) -> Result<InputStream> {
		Self::with_error_log(content, is_file, backend, ErrorLog::shared())
	}

	/// Like [`InputStream::new`], reporting into an existing log.
	pub fn with_error_log(
		content: &[u8],
		is_file: bool,
		backend: &str,
		log: SharedErrorLog,
	) -> Result<InputStream> {
		let source = Source::from_content(content, is_file)?;
		Self::from_source(source, backend, log)
	}

	pub fn from_source(source: Source, backend: &str, log: SharedErrorLog) -> Result<InputStream> {
		let mut backend = create_backend(backend)?;
		let mut tokenizer = Tokenizer::new();
		let description = format!("{} reading {}", backend.name(), source);
		tracing::debug!(stream = description.as_str(), "creating input stream");
		let first = {
			let mut l = log.borrow_mut();
			l.attach(description);
			backend.parse_first(source, &mut tokenizer, &mut l)
		};
		let ok = match first {
			Ok(ok) => ok,
			Err(e) => {
				let mut l = log.borrow_mut();
				l.add(XmlError::new(e.code(), e.to_string(), 0, 0));
				l.detach();
				drop(l);
				backend.parse_reset();
				return Err(e);
			}
		};
		let mut result = InputStream {
			backend,
			tokenizer,
			log,
			error: false,
			namespaces: None,
		};
		if !ok {
			result.fail();
		}
		Ok(result)
	}

	fn fail(&mut self) {
		if !self.error {
			tracing::debug!(
				line = self.backend.line(),
				column = self.backend.column(),
				"input stream entered error state"
			);
		}
		self.error = true;
	}

	/// True while tokens can be read.
	pub fn is_good(&self) -> bool {
		!self.is_error() && !self.is_eof()
	}

	/// True once the document ended and every token was consumed.
	pub fn is_eof(&self) -> bool {
		self.tokenizer.is_eof()
	}

	/// True if the backend reported a problem.
	pub fn is_error(&self) -> bool {
		self.error
	}

	fn parse_next(&mut self) -> bool {
		let mut log = self.log.borrow_mut();
		self.backend.parse_next(&mut self.tokenizer, &mut log)
	}

	// pull chunks until a token is available or the backend stops
	fn queue_token(&mut self) {
		if !self.is_good() {
			return;
		}
		while !self.tokenizer.has_next() {
			if !self.parse_next() {
				if self.tokenizer.eof_seen() {
					tracing::debug!("input stream reached end of document");
				} else {
					self.fail();
				}
				return;
			}
		}
	}

	// pull exactly one more chunk for a lookahead query
	fn requeue_token(&mut self) -> bool {
		if !self.is_good() || self.tokenizer.eof_seen() {
			return false;
		}
		let ok = self.parse_next();
		if !ok && !self.tokenizer.eof_seen() {
			self.fail();
		}
		tracing::trace!(queued = self.tokenizer.len(), ok, "requeued");
		ok
	}

	/// Consume and return the next token, or [`Token::Eof`] if the stream
	/// is not good.
	pub fn next(&mut self) -> Token {
		self.queue_token();
		if self.error {
			return Token::Eof;
		}
		self.tokenizer.next().unwrap_or(Token::Eof)
	}

	/// The next token, without consuming it.
	pub fn peek(&mut self) -> &Token {
		self.queue_token();
		if self.error {
			return &EOF_TOKEN;
		}
		match self.tokenizer.peek() {
			Some(token) => token,
			None => &EOF_TOKEN,
		}
	}

	/// Consume everything up to and including the end tag matching
	/// `element`, which must be the start tag consumed last. Nested
	/// elements with the same name are skipped as a whole.
	///
	/// Does nothing if `element` is not a start tag.
	pub fn skip_past_end(&mut self, element: &Token) {
		let triple = match element {
			Token::StartElement(_, triple, ..) => triple,
			_ => return,
		};
		let mut depth = 0usize;
		while self.is_good() {
			let token = self.next();
			match &token {
				Token::StartElement(_, t, ..) if t == triple => depth += 1,
				Token::EndElement(_, t) if t == triple => {
					if depth == 0 {
						return;
					}
					depth -= 1;
				}
				Token::Eof => return,
				_ => (),
			}
		}
	}

	/// Consume text tokens up to the next element tag.
	pub fn skip_text(&mut self) {
		while self.is_good() && self.peek().is_text() {
			self.next();
		}
	}

	fn lookahead<F: Fn(&Tokenizer) -> Lookahead>(&mut self, query: F) -> u32 {
		self.queue_token();
		let mut result = query(&self.tokenizer);
		while !result.complete && self.requeue_token() {
			result = query(&self.tokenizer);
		}
		result.count
	}

	/// Number of child elements of `container` (the next start tag if
	/// empty), without consuming anything.
	///
	/// If the stream ends or fails before `container` is closed, the number
	/// of children seen so far is returned.
	pub fn determine_number_children(&mut self, container: &str) -> u32 {
		self.lookahead(|t| t.determine_number_children(container))
	}

	/// Number of child elements named `child` of `container`, without
	/// consuming anything.
	pub fn determine_num_specific_children(&mut self, child: &str, container: &str) -> u32 {
		self.lookahead(|t| t.determine_num_specific_children(child, container))
	}

	/// Whether `container` has a child element named `child`.
	pub fn contains_child(&mut self, child: &str, container: &str) -> bool {
		self.lookahead(|t| t.contains_child(child, container)) > 0
	}

	/// Iterate over the remaining tokens, until [`Token::Eof`].
	pub fn tokens(&mut self) -> Tokens<'_> {
		Tokens { stream: self }
	}

	/// Encoding named in the XML declaration, empty if none.
	pub fn encoding(&self) -> &str {
		self.tokenizer.encoding()
	}

	/// Version named in the XML declaration, empty if none.
	pub fn version(&self) -> &str {
		self.tokenizer.version()
	}

	/// Handle to the log this stream reports into.
	pub fn error_log(&self) -> SharedErrorLog {
		self.log.clone()
	}

	/// Report into `log` from now on.
	pub fn set_error_log(&mut self, log: SharedErrorLog) {
		let description = self.log.borrow().attached().map(str::to_string);
		self.log.borrow_mut().detach();
		if let Some(description) = description {
			log.borrow_mut().attach(description);
		}
		self.log = log;
	}

	/// Namespace snapshot held by this stream, if any.
	pub fn namespaces(&self) -> Option<&XmlNamespaces> {
		self.namespaces.as_ref()
	}

	/// Replace the namespace snapshot with a copy of `namespaces`.
	pub fn set_namespaces(&mut self, namespaces: Option<&XmlNamespaces>) {
		self.namespaces = namespaces.cloned();
	}

	/// Name of the backend in use.
	pub fn backend_name(&self) -> &'static str {
		self.backend.name()
	}

	/// 1-based line the backend has reached.
	pub fn line(&self) -> u64 {
		self.backend.line()
	}

	/// 1-based column the backend has reached.
	pub fn column(&self) -> u64 {
		self.backend.column()
	}
}

/// Lists the queued, not yet consumed tokens.
impl fmt::Display for InputStream {
	fn fmt<'f>(&self, f: &'f mut fmt::Formatter) -> fmt::Result {
		fmt::Display::fmt(&self.tokenizer, f)
	}
}

impl fmt::Debug for InputStream {
	fn fmt<'f>(&self, f: &'f mut fmt::Formatter) -> fmt::Result {
		f.debug_struct("InputStream")
			.field("backend", &self.backend.name())
			.field("queued", &self.tokenizer.len())
			.field("eof", &self.is_eof())
			.field("error", &self.error)
			.finish()
	}
}

impl Drop for InputStream {
	fn drop(&mut self) {
		if let Ok(mut log) = self.log.try_borrow_mut() {
			log.detach();
		}
		self.backend.parse_reset();
		tracing::debug!("released input stream");
	}
}

/// Iterator returned by [`InputStream::tokens`].
pub struct Tokens<'x> {
	stream: &'x mut InputStream,
}

impl<'x> Iterator for Tokens<'x> {
	type Item = Token;

	fn next(&mut self) -> Option<Token> {
		match self.stream.next() {
			Token::Eof => None,
			token => Some(token),
		}
	}
}
