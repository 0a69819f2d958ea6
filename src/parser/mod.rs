/*!
# Parser backends

A [`Backend`] wraps one concrete XML engine and turns what it reports into
[`Token`](crate::Token)s in a [`Tokenizer`]. Backends are driven
incrementally by the [`InputStream`](crate::InputStream):
[`Backend::parse_first`] opens the source and produces the first chunk,
every [`Backend::parse_next`] call produces one more.

Two backends are available, each behind a cargo feature:

* `quick-xml` (feature `quick`): event-based. Each chunk is one event of
  the underlying reader which produced at least one token.
* `roxmltree` (feature `tree`): tree-based. The document is parsed as a
  whole on the first call; each chunk then releases the tokens up to and
  including the next start tag.
*/
use std::borrow::Cow;
use std::fmt;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use memchr::memchr;

use crate::error::{Error, ErrorCode, ErrorLog, Result, XmlError};
use crate::token::TokenPosition;
use crate::tokenizer::Tokenizer;

mod position;
mod resolve;
#[cfg(feature = "quick")]
mod quick;
#[cfg(feature = "tree")]
mod tree;

pub use position::PositionReader;
pub(crate) use resolve::NamespaceResolver;
#[cfg(feature = "quick")]
pub use quick::QuickBackend;
#[cfg(feature = "tree")]
pub use tree::TreeBackend;

/// Name of the event-based backend.
pub const BACKEND_QUICK: &'static str = "quick-xml";
/// Name of the tree-based backend.
pub const BACKEND_TREE: &'static str = "roxmltree";

/// Backend chosen when an empty name is passed to [`create_backend`].
#[cfg(feature = "quick")]
pub const DEFAULT_BACKEND: &'static str = BACKEND_QUICK;
/// Backend chosen when an empty name is passed to [`create_backend`].
#[cfg(all(not(feature = "quick"), feature = "tree"))]
pub const DEFAULT_BACKEND: &'static str = BACKEND_TREE;
/// Backend chosen when an empty name is passed to [`create_backend`].
#[cfg(all(not(feature = "quick"), not(feature = "tree")))]
pub const DEFAULT_BACKEND: &'static str = BACKEND_QUICK;

/// Where a backend reads its document from.
#[derive(Debug, Clone, PartialEq)]
pub enum Source {
	File(PathBuf),
	Memory(Vec<u8>),
}

impl Source {
	/// Interpret `content` as file name (if `is_file`) or as the document
	/// itself.
	pub fn from_content(content: &[u8], is_file: bool) -> Result<Source> {
		if is_file {
			let path = std::str::from_utf8(content).map_err(|_| Error::InvalidPath)?;
			if path.is_empty() {
				return Err(Error::InvalidPath);
			}
			Ok(Source::File(PathBuf::from(path)))
		} else {
			Ok(Source::Memory(content.to_vec()))
		}
	}

	pub fn file<P: AsRef<Path>>(path: P) -> Source {
		Source::File(path.as_ref().to_path_buf())
	}

	/// Open the source for buffered reading.
	pub fn open(self) -> Result<Box<dyn io::BufRead>> {
		match self {
			Source::File(path) => {
				let f = File::open(&path)?;
				Ok(Box::new(io::BufReader::new(f)))
			}
			Source::Memory(data) => Ok(Box::new(io::Cursor::new(data))),
		}
	}

	/// Read the whole source into memory.
	pub fn read_all(self) -> Result<Vec<u8>> {
		match self {
			Source::File(path) => Ok(std::fs::read(&path)?),
			Source::Memory(data) => Ok(data),
		}
	}
}

impl fmt::Display for Source {
	fn fmt<'f>(&self, f: &'f mut fmt::Formatter) -> fmt::Result {
		match self {
			Source::File(path) => write!(f, "file {}", path.display()),
			Source::Memory(data) => write!(f, "{} bytes in memory", data.len()),
		}
	}
}

/**
# Incremental parser backend

Implementations report problems with the document into the [`ErrorLog`]
and never return them as Rust errors. Only failures to set up the source at
all are returned from [`Backend::parse_first`].
*/
pub trait Backend {
	/// Registry name of the backend.
	fn name(&self) -> &'static str;

	/// Open `source` and parse the first chunk into `tokens`.
	///
	/// Returns `Ok(false)` if the document is found to be malformed within
	/// the first chunk.
	fn parse_first(
		&mut self,
		source: Source,
		tokens: &mut Tokenizer,
		log: &mut ErrorLog,
	) -> Result<bool>;

	/// Parse the next chunk into `tokens`.
	///
	/// Returns false at the clean end of the document (after marking the
	/// tokenizer EOF) and on errors (after logging them). Once false was
	/// returned, further calls keep returning false.
	fn parse_next(&mut self, tokens: &mut Tokenizer, log: &mut ErrorLog) -> bool;

	/// Release the source and all per-document state.
	fn parse_reset(&mut self);

	/// 1-based line the backend has reached.
	fn line(&self) -> u64;

	/// 1-based column the backend has reached.
	fn column(&self) -> u64;
}

/// Names of the backends compiled into this build.
pub fn available_backends() -> Vec<&'static str> {
	let mut result = Vec::new();
	#[cfg(feature = "quick")]
	result.push(BACKEND_QUICK);
	#[cfg(feature = "tree")]
	result.push(BACKEND_TREE);
	result
}

#[cfg(feature = "quick")]
fn new_quick() -> Result<Box<dyn Backend>> {
	Ok(Box::new(QuickBackend::new()))
}

#[cfg(not(feature = "quick"))]
fn new_quick() -> Result<Box<dyn Backend>> {
	Err(Error::BackendUnavailable(BACKEND_QUICK))
}

#[cfg(feature = "tree")]
fn new_tree() -> Result<Box<dyn Backend>> {
	Ok(Box::new(TreeBackend::new()))
}

#[cfg(not(feature = "tree"))]
fn new_tree() -> Result<Box<dyn Backend>> {
	Err(Error::BackendUnavailable(BACKEND_TREE))
}

/// Create the backend registered under `name`.
///
/// An empty name selects [`DEFAULT_BACKEND`].
pub fn create_backend(name: &str) -> Result<Box<dyn Backend>> {
	let name = if name.is_empty() { DEFAULT_BACKEND } else { name };
	let backend = match name {
		BACKEND_QUICK | "quick" => new_quick(),
		BACKEND_TREE | "tree" => new_tree(),
		other => Err(Error::UnknownBackend(other.to_string())),
	}?;
	tracing::debug!(backend = backend.name(), "created parser backend");
	Ok(backend)
}

/// A problem found by a backend, before a position is attached.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Fault {
	pub code: ErrorCode,
	pub message: String,
}

impl Fault {
	pub fn new<S: Into<String>>(code: ErrorCode, message: S) -> Fault {
		Fault {
			code,
			message: message.into(),
		}
	}

	pub fn report(self, log: &mut ErrorLog, pos: TokenPosition) {
		log.add(XmlError::new(self.code, self.message, pos.line, pos.column));
	}
}

/// Decode a UTF-8 slice coming out of a backend.
pub(crate) fn utf8(data: &[u8]) -> std::result::Result<&str, Fault> {
	std::str::from_utf8(data)
		.map_err(|e| Fault::new(ErrorCode::XmlBadUtf8Content, e.to_string()))
}

/// XML 1.0 section 2.11: translate `\r\n` and lone `\r` into `\n`.
pub(crate) fn normalize_line_endings<'a>(s: &'a str) -> Cow<'a, str> {
	if memchr(b'\r', s.as_bytes()).is_none() {
		return Cow::Borrowed(s);
	}
	let mut out = String::with_capacity(s.len());
	let mut chars = s.chars().peekable();
	while let Some(ch) = chars.next() {
		if ch == '\r' {
			if matches!(chars.peek(), Some('\n')) {
				chars.next();
			}
			out.push('\n');
		} else {
			out.push(ch);
		}
	}
	Cow::Owned(out)
}

/// XML 1.0 section 3.3.3: literal whitespace in attribute values becomes
/// a space. Must run before references are expanded.
pub(crate) fn normalize_attribute_value<'a>(s: &'a str) -> Cow<'a, str> {
	let s = normalize_line_endings(s);
	if !s.bytes().any(|b| b == b'\n' || b == b'\t') {
		return s;
	}
	Cow::Owned(
		s.chars()
			.map(|ch| match ch {
				'\n' | '\t' => ' ',
				other => other,
			})
			.collect(),
	)
}

/// Whether `s` consists of XML whitespace only.
pub(crate) fn is_whitespace(s: &str) -> bool {
	s.bytes().all(|b| matches!(b, b' ' | b'\t' | b'\n' | b'\r'))
}
