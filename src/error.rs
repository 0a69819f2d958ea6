/*!
# Error types

This module holds the error types of this crate. There are two families:

* [`Error`] is returned synchronously when a stream cannot be set up at all
  (unknown backend, unreadable file, ...).
* [`XmlError`] records describe problems with the XML itself. They are never
  returned as Rust errors; backends append them to an [`ErrorLog`] and the
  input stream switches into its error state.
*/
use std::cell::RefCell;
use std::error;
use std::fmt;
use std::io;
use std::ops::Deref;
use std::rc::Rc;
use std::result::Result as StdResult;
use std::sync::Arc;

/// Severity classification of an [`XmlError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
	/// The document is usable, but something is off.
	Warning,
	/// The document violates a rule; processing may continue.
	Error,
	/// The parse cannot continue.
	Fatal,
}

impl fmt::Display for Severity {
	fn fmt<'f>(&self, f: &'f mut fmt::Formatter) -> fmt::Result {
		f.write_str(match self {
			Self::Warning => "warning",
			Self::Error => "error",
			Self::Fatal => "fatal",
		})
	}
}

/// Numeric classification of XML-level problems.
///
/// The discriminants are stable and may be persisted or compared against
/// codes emitted by other tools of the same family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ErrorCode {
	UnknownError = 0,
	OutOfMemory = 1,
	FileUnreadable = 2,
	FileUnwritable = 3,
	FileOperationError = 4,
	InternalParserError = 101,
	UnrecognizedParserCode = 102,
	TranscoderError = 103,
	MissingXmlDecl = 1001,
	BadXmlDecl = 1003,
	BadXmlDoctype = 1004,
	InvalidCharInXml = 1005,
	BadlyFormedXml = 1006,
	UnclosedXmlToken = 1007,
	InvalidXmlConstruct = 1008,
	XmlTagMismatch = 1009,
	DuplicateXmlAttribute = 1010,
	UndefinedXmlEntity = 1011,
	BadProcessingInstruction = 1012,
	BadXmlPrefix = 1013,
	BadXmlPrefixValue = 1014,
	XmlAttributeTypeMismatch = 1016,
	XmlBadUtf8Content = 1017,
	BadXmlAttributeValue = 1019,
	BadXmlComment = 1022,
	XmlUnexpectedEof = 1024,
	InvalidAfterXmlContent = 1029,
	XmlBadNumber = 1032,
}

impl ErrorCode {
	/// Numeric value of the code.
	pub fn code(self) -> u32 {
		self as u32
	}

	/// Severity used when a record is created without an explicit one.
	pub fn default_severity(self) -> Severity {
		match self {
			Self::MissingXmlDecl => Severity::Warning,
			Self::XmlAttributeTypeMismatch | Self::XmlBadNumber | Self::BadXmlAttributeValue => {
				Severity::Error
			}
			_ => Severity::Fatal,
		}
	}

	/// Short, generic description of the code.
	pub fn description(self) -> &'static str {
		match self {
			Self::UnknownError => "unknown error",
			Self::OutOfMemory => "out of memory",
			Self::FileUnreadable => "file could not be read",
			Self::FileUnwritable => "file could not be written",
			Self::FileOperationError => "file operation failed",
			Self::InternalParserError => "internal XML parser error",
			Self::UnrecognizedParserCode => "unrecognized XML parser error code",
			Self::TranscoderError => "character transcoding failed",
			Self::MissingXmlDecl => "missing XML declaration",
			Self::BadXmlDecl => "invalid XML declaration",
			Self::BadXmlDoctype => "invalid document type declaration",
			Self::InvalidCharInXml => "invalid character in XML content",
			Self::BadlyFormedXml => "badly formed XML",
			Self::UnclosedXmlToken => "unclosed XML token",
			Self::InvalidXmlConstruct => "invalid XML construct",
			Self::XmlTagMismatch => "XML start and end tags do not match",
			Self::DuplicateXmlAttribute => "duplicate XML attribute",
			Self::UndefinedXmlEntity => "undefined XML entity",
			Self::BadProcessingInstruction => "invalid processing instruction",
			Self::BadXmlPrefix => "invalid or undeclared XML namespace prefix",
			Self::BadXmlPrefixValue => "invalid XML namespace prefix value",
			Self::XmlAttributeTypeMismatch => "attribute value has the wrong type",
			Self::XmlBadUtf8Content => "invalid UTF-8 content",
			Self::BadXmlAttributeValue => "invalid attribute value",
			Self::BadXmlComment => "invalid XML comment",
			Self::XmlUnexpectedEof => "unexpected end of input",
			Self::InvalidAfterXmlContent => "invalid content after the root element",
			Self::XmlBadNumber => "invalid number",
		}
	}
}

impl fmt::Display for ErrorCode {
	fn fmt<'f>(&self, f: &'f mut fmt::Formatter) -> fmt::Result {
		f.write_str(self.description())
	}
}

/// A single problem found while reading or writing XML.
#[derive(Debug, Clone, PartialEq)]
pub struct XmlError {
	pub code: ErrorCode,
	pub severity: Severity,
	pub message: String,
	/// 1-based line, or 0 if unknown.
	pub line: u64,
	/// 1-based column, or 0 if unknown.
	pub column: u64,
}

impl XmlError {
	/// Create a record with the default severity of `code`.
	pub fn new<S: Into<String>>(code: ErrorCode, message: S, line: u64, column: u64) -> Self {
		Self {
			code,
			severity: code.default_severity(),
			message: message.into(),
			line,
			column,
		}
	}

	pub fn with_severity(mut self, severity: Severity) -> Self {
		self.severity = severity;
		self
	}
}

impl fmt::Display for XmlError {
	fn fmt<'f>(&self, f: &'f mut fmt::Formatter) -> fmt::Result {
		write!(
			f,
			"{}:{}: ({}) {}: ",
			self.line,
			self.column,
			self.code.code(),
			self.severity
		)?;
		if self.message.is_empty() {
			f.write_str(self.code.description())
		} else {
			f.write_str(&self.message)
		}
	}
}

impl error::Error for XmlError {}

/**
# Ordered sink for [`XmlError`] records

A log is append-only while a parse or write session is running. It may be
shared between a stream and the code which created it (see
[`SharedErrorLog`]); the stream which currently feeds the log registers
itself via [`ErrorLog::attach`] and deregisters on drop.
*/
#[derive(Debug, Clone, Default)]
pub struct ErrorLog {
	records: Vec<XmlError>,
	attached: Option<String>,
}

/// Error log handle shared between a stream and its owner.
pub type SharedErrorLog = Rc<RefCell<ErrorLog>>;

impl ErrorLog {
	pub fn new() -> Self {
		Self::default()
	}

	/// Create a new, empty log behind a shared handle.
	pub fn shared() -> SharedErrorLog {
		Rc::new(RefCell::new(Self::new()))
	}

	pub fn add(&mut self, err: XmlError) {
		if err.severity >= Severity::Error {
			tracing::warn!(
				code = err.code.code(),
				line = err.line,
				column = err.column,
				"{}",
				err
			);
		} else {
			tracing::debug!(code = err.code.code(), "{}", err);
		}
		self.records.push(err);
	}

	pub fn len(&self) -> usize {
		self.records.len()
	}

	pub fn is_empty(&self) -> bool {
		self.records.is_empty()
	}

	pub fn get(&self, index: usize) -> Option<&XmlError> {
		self.records.get(index)
	}

	pub fn iter(&self) -> std::slice::Iter<'_, XmlError> {
		self.records.iter()
	}

	pub fn clear(&mut self) {
		self.records.clear();
	}

	pub fn contains(&self, code: ErrorCode) -> bool {
		self.records.iter().any(|r| r.code == code)
	}

	pub fn count_severity(&self, severity: Severity) -> usize {
		self.records.iter().filter(|r| r.severity == severity).count()
	}

	/// Whether any record is of severity [`Severity::Error`] or worse.
	pub fn has_fatal_or_error(&self) -> bool {
		self.records.iter().any(|r| r.severity >= Severity::Error)
	}

	/// Register the stream currently feeding this log.
	pub fn attach<S: Into<String>>(&mut self, description: S) {
		self.attached = Some(description.into());
	}

	/// Drop the back-reference to the feeding stream.
	pub fn detach(&mut self) {
		self.attached = None;
	}

	/// Description of the stream currently feeding this log, if any.
	pub fn attached(&self) -> Option<&str> {
		self.attached.as_deref()
	}
}

impl fmt::Display for ErrorLog {
	fn fmt<'f>(&self, f: &'f mut fmt::Formatter) -> fmt::Result {
		for record in self.records.iter() {
			writeln!(f, "{}", record)?;
		}
		Ok(())
	}
}

impl<'x> IntoIterator for &'x ErrorLog {
	type Item = &'x XmlError;
	type IntoIter = std::slice::Iter<'x, XmlError>;

	fn into_iter(self) -> Self::IntoIter {
		self.records.iter()
	}
}

/// Result of a rejected mutation of a [`crate::XmlNamespaces`].
///
/// The scope is left unchanged whenever one of these is returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NamespaceError {
	/// The prefix is bound to a reserved URI and cannot be rebound.
	ReservedUri,
	/// The index or prefix to remove does not exist.
	IndexOutOfRange,
}

impl fmt::Display for NamespaceError {
	fn fmt<'f>(&self, f: &'f mut fmt::Formatter) -> fmt::Result {
		match self {
			Self::ReservedUri => f.write_str("prefix is bound to a reserved namespace URI"),
			Self::IndexOutOfRange => f.write_str("namespace index out of range"),
		}
	}
}

impl error::Error for NamespaceError {}

/// [`std::sync::Arc`]-based around [`std::io::Error`] to allow cloning.
#[derive(Clone)]
pub struct IOErrorWrapper(Arc<io::Error>);

impl IOErrorWrapper {
	fn wrap(e: io::Error) -> IOErrorWrapper {
		IOErrorWrapper(Arc::new(e))
	}
}

impl fmt::Debug for IOErrorWrapper {
	fn fmt<'f>(&self, f: &'f mut fmt::Formatter) -> fmt::Result {
		fmt::Debug::fmt(&**self, f)
	}
}

impl fmt::Display for IOErrorWrapper {
	fn fmt<'f>(&self, f: &'f mut fmt::Formatter) -> fmt::Result {
		fmt::Display::fmt(&**self, f)
	}
}

impl PartialEq for IOErrorWrapper {
	fn eq(&self, other: &Self) -> bool {
		Arc::ptr_eq(&self.0, &other.0)
	}
}

impl Deref for IOErrorWrapper {
	type Target = io::Error;

	fn deref(&self) -> &io::Error {
		&*self.0
	}
}

/// Failures which prevent a stream from being constructed.
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
	/// The source or sink could not be opened, read or written.
	IO(IOErrorWrapper),
	/// No backend with the given name exists.
	UnknownBackend(String),
	/// The backend exists but was not compiled in.
	BackendUnavailable(&'static str),
	/// A path could not be interpreted.
	InvalidPath,
}

pub type Result<T> = StdResult<T, Error>;

impl Error {
	pub fn io(e: io::Error) -> Error {
		Error::IO(IOErrorWrapper::wrap(e))
	}

	/// The [`ErrorCode`] under which this failure is logged.
	pub fn code(&self) -> ErrorCode {
		match self {
			Self::IO(e) if e.kind() == io::ErrorKind::NotFound => ErrorCode::FileUnreadable,
			Self::IO(_) => ErrorCode::FileOperationError,
			Self::UnknownBackend(_) | Self::BackendUnavailable(_) => {
				ErrorCode::UnrecognizedParserCode
			}
			Self::InvalidPath => ErrorCode::FileUnreadable,
		}
	}
}

impl From<io::Error> for Error {
	fn from(e: io::Error) -> Error {
		Error::io(e)
	}
}

impl fmt::Display for Error {
	fn fmt<'f>(&self, f: &'f mut fmt::Formatter) -> fmt::Result {
		match self {
			Error::IO(e) => write!(f, "I/O error: {}", e),
			Error::UnknownBackend(name) => write!(f, "unknown XML backend: {:?}", name),
			Error::BackendUnavailable(name) => {
				write!(f, "XML backend {:?} is not compiled in", name)
			}
			Error::InvalidPath => f.write_str("invalid path"),
		}
	}
}

impl error::Error for Error {
	fn source(&self) -> Option<&(dyn error::Error + 'static)> {
		match self {
			Error::IO(e) => Some(&**e),
			Error::UnknownBackend(_) | Error::BackendUnavailable(_) | Error::InvalidPath => None,
		}
	}
}
