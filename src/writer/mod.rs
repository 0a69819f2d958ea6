/*!
# Escaping XML serializer

[`OutputStream`] is a push-style writer: callers open and close elements,
write attributes into the currently open start tag and write character
data. The stream tracks whether a start tag is still open and closes it
(`>` or `/>`) as needed.

Output is staged in a [`BytesMut`] and handed to the sink in chunks. I/O
errors do not interrupt writing; the first one is kept and reported by the
next [`OutputStream::flush`] or [`OutputStream::finish`].

## Escaping

Text and attribute values escape `&`, `'`, `<`, `>` and `"`. An `&` which
already starts a character reference (`&#38;`, `&#x26;`) or one of the
predefined entities is written as is, so already escaped content is never
escaped twice.
*/
use std::borrow::Cow;
use std::fmt;
use std::fs::File;
use std::io;
use std::path::Path;

use bytes::{BufMut, BytesMut};

use crate::error::{Error, Result};
use crate::namespaces::{XmlNamespaces, PREFIX_XMLNS};
use crate::token::{Attributes, Token, Triple};

mod config;

pub use config::{format_timestamp, timestamp_now, WriterConfig, LIBRARY_NAME, LIBRARY_VERSION};

/// Staged output is handed to the sink once it grows past this size.
const FLUSH_THRESHOLD: usize = 8192;

const TEXT_SPECIALS: &'static [u8] = &[b'&', b'\'', b'<', b'>', b'"', b'\r'];
// whitespace other than space is normalized away when attributes are read
const ATTR_SPECIALS: &'static [u8] = &[b'&', b'\'', b'<', b'>', b'"', b'\r', b'\n', b'\t'];

const PREDEFINED_ENTITIES: &'static [&'static [u8]] =
	&[b"&amp;", b"&apos;", b"&lt;", b"&gt;", b"&quot;"];

// whether data (starting with '&') begins with a character reference
fn is_char_reference(data: &[u8]) -> bool {
	let (digits, is_digit): (&[u8], fn(&u8) -> bool) = match data {
		[b'&', b'#', b'x', rest @ ..] => (rest, u8::is_ascii_hexdigit),
		[b'&', b'#', rest @ ..] => (rest, u8::is_ascii_digit),
		_ => return false,
	};
	let n = digits.iter().take_while(|b| is_digit(*b)).count();
	n > 0 && digits.get(n) == Some(&b';')
}

fn is_reference(data: &[u8]) -> bool {
	is_char_reference(data) || PREDEFINED_ENTITIES.iter().any(|e| data.starts_with(e))
}

fn escape<'a, B: BufMut>(out: &'a mut B, data: &'a [u8], specials: &'static [u8]) {
	let mut last_index = 0;
	for i in 0..data.len() {
		let ch = data[i];
		if !specials.contains(&ch) {
			continue;
		}
		if ch == b'&' && is_reference(&data[i..]) {
			continue;
		}
		if i > last_index {
			out.put_slice(&data[last_index..i]);
		}
		match ch {
			b'&' => out.put_slice(b"&amp;"),
			b'\'' => out.put_slice(b"&apos;"),
			b'<' => out.put_slice(b"&lt;"),
			b'>' => out.put_slice(b"&gt;"),
			b'"' => out.put_slice(b"&quot;"),
			b'\r' => out.put_slice(b"&#xd;"),
			b'\n' => out.put_slice(b"&#xa;"),
			b'\t' => out.put_slice(b"&#x9;"),
			_ => unreachable!(),
		}
		last_index = i + 1;
	}
	out.put_slice(&data[last_index..data.len()]);
}

fn strip_fraction_zeros(s: &str) -> &str {
	if s.contains('.') {
		s.trim_end_matches('0').trim_end_matches('.')
	} else {
		s
	}
}

/// Format a double the way attribute values and text carry it: `NaN`,
/// `INF`, `-INF`, or 15 significant digits in the shorter of fixed and
/// exponent notation (`0.1`, `1e+20`, `1.5e-07`).
pub fn format_f64(value: f64) -> String {
	if value.is_nan() {
		return "NaN".to_string();
	}
	if value.is_infinite() {
		return if value > 0.0 { "INF" } else { "-INF" }.to_string();
	}
	let sci = format!("{:.14e}", value);
	let (mantissa, exp) = match sci.split_once('e') {
		Some((m, e)) => (m, e.parse::<i32>().unwrap_or(0)),
		None => (sci.as_str(), 0),
	};
	if exp < -4 || exp >= 15 {
		let sign = if exp < 0 { '-' } else { '+' };
		format!("{}e{}{:02}", strip_fraction_zeros(mantissa), sign, exp.abs())
	} else {
		let fixed = format!("{:.*}", (14 - exp) as usize, value);
		strip_fraction_zeros(&fixed).to_string()
	}
}

/**
# Value which can be written as an attribute

Implemented for strings, `bool` and the numeric types used by document
models. String values which are empty count as *unset*: the name-based
attribute writers omit them.
*/
pub trait AttributeValue {
	/// Textual form of the value, before escaping.
	fn to_attribute_text(&self) -> Cow<'_, str>;

	/// Whether name-based writers skip this value entirely.
	fn is_unset(&self) -> bool {
		false
	}
}

impl AttributeValue for &str {
	fn to_attribute_text(&self) -> Cow<'_, str> {
		Cow::Borrowed(*self)
	}

	fn is_unset(&self) -> bool {
		self.is_empty()
	}
}

impl AttributeValue for String {
	fn to_attribute_text(&self) -> Cow<'_, str> {
		Cow::Borrowed(self.as_str())
	}

	fn is_unset(&self) -> bool {
		self.is_empty()
	}
}

impl AttributeValue for &String {
	fn to_attribute_text(&self) -> Cow<'_, str> {
		Cow::Borrowed(self.as_str())
	}

	fn is_unset(&self) -> bool {
		self.is_empty()
	}
}

impl AttributeValue for bool {
	fn to_attribute_text(&self) -> Cow<'_, str> {
		Cow::Borrowed(if *self { "true" } else { "false" })
	}
}

impl AttributeValue for f64 {
	fn to_attribute_text(&self) -> Cow<'_, str> {
		Cow::Owned(format_f64(*self))
	}
}

impl AttributeValue for i32 {
	fn to_attribute_text(&self) -> Cow<'_, str> {
		Cow::Owned(self.to_string())
	}
}

impl AttributeValue for i64 {
	fn to_attribute_text(&self) -> Cow<'_, str> {
		Cow::Owned(self.to_string())
	}
}

impl AttributeValue for u32 {
	fn to_attribute_text(&self) -> Cow<'_, str> {
		Cow::Owned(self.to_string())
	}
}

/// Per-stream settings for [`OutputStream::new`].
#[derive(Debug, Clone, PartialEq)]
pub struct StreamOptions {
	/// Encoding named in the XML declaration. Empty omits the attribute.
	pub encoding: String,
	/// Whether to start with an XML declaration.
	pub write_declaration: bool,
	/// Program named in the generator comment. Empty omits the comment.
	pub program_name: String,
	pub program_version: String,
	/// Whether nested elements are put on lines of their own.
	pub auto_indent: bool,
	pub config: WriterConfig,
}

impl Default for StreamOptions {
	fn default() -> Self {
		Self {
			encoding: "UTF-8".to_string(),
			write_declaration: true,
			program_name: String::new(),
			program_version: String::new(),
			auto_indent: true,
			config: WriterConfig::default(),
		}
	}
}

impl StreamOptions {
	/// Options producing nothing but the elements themselves: no
	/// declaration, no comment, no indentation.
	pub fn bare() -> Self {
		Self {
			write_declaration: false,
			auto_indent: false,
			config: WriterConfig::default().with_comment(false),
			..Self::default()
		}
	}
}

/**
# XML serializer over an [`io::Write`] sink

Nesting state is one of *outside a tag*, *in a start tag* (attributes may
be written) and *in text*. Indentation adds two spaces per level and is
suppressed after character data, so text content is never altered.

The stream owns its sink; [`OutputStream::finish`] hands it back. Dropping
an unfinished stream flushes whatever is staged.
*/
pub struct OutputStream<W: io::Write> {
	sink: Option<W>,
	buf: BytesMut,
	encoding: String,
	in_start: bool,
	in_text: bool,
	skip_next_indent: bool,
	do_indent: bool,
	indent: u32,
	namespaces: Option<XmlNamespaces>,
	config: WriterConfig,
	io_error: Option<io::Error>,
}

/// Output stream collecting into memory.
pub type StringOutputStream = OutputStream<Vec<u8>>;

/// Output stream writing to an owned file.
pub type FileOutputStream = OutputStream<io::BufWriter<File>>;

impl<W: io::Write> OutputStream<W> {
	/// Wrap `sink`, writing the XML declaration and the generator comment
	/// as configured in `options`.
	pub fn new(sink: W, options: StreamOptions) -> Self {
		let mut result = Self {
			sink: Some(sink),
			buf: BytesMut::with_capacity(FLUSH_THRESHOLD),
			encoding: options.encoding,
			in_start: false,
			in_text: false,
			skip_next_indent: false,
			do_indent: options.auto_indent,
			indent: 0,
			namespaces: None,
			config: options.config,
			io_error: None,
		};
		tracing::debug!(
			encoding = result.encoding.as_str(),
			declaration = options.write_declaration,
			"created output stream"
		);
		if options.write_declaration {
			result.write_xml_decl();
		}
		if result.config.write_comment {
			result.write_comment(&options.program_name, &options.program_version);
		}
		result
	}

	/// Encoding named in the declaration.
	pub fn encoding(&self) -> &str {
		&self.encoding
	}

	/// Configuration this stream was created with.
	pub fn config(&self) -> &WriterConfig {
		&self.config
	}

	/// Write `<?xml version="1.0" encoding="..."?>` and a newline.
	pub fn write_xml_decl(&mut self) {
		self.buf.put_slice(b"<?xml version=\"1.0\"");
		if !self.encoding.is_empty() {
			let encoding = std::mem::take(&mut self.encoding);
			self.put_attribute(None, "encoding", &encoding);
			self.encoding = encoding;
		}
		self.buf.put_slice(b"?>\n");
		self.maybe_flush();
	}

	/// Write the generator comment naming `program_name`, and the library
	/// and time of writing as configured. Nothing is written without a
	/// program name.
	pub fn write_comment(&mut self, program_name: &str, program_version: &str) {
		if program_name.is_empty() {
			return;
		}
		let mut comment = format!("<!-- Created by {}", program_name);
		if !program_version.is_empty() {
			comment.push_str(" version ");
			comment.push_str(program_version);
		}
		if self.config.write_timestamp {
			comment.push_str(" on ");
			comment.push_str(&timestamp_now());
		}
		if !self.config.library_name.is_empty() {
			comment.push_str(" with ");
			comment.push_str(&self.config.library_name);
			if !self.config.library_version.is_empty() {
				comment.push_str(" version ");
				comment.push_str(&self.config.library_version);
			}
		}
		comment.push_str(". -->\n");
		self.buf.put_slice(comment.as_bytes());
		self.maybe_flush();
	}

	fn write_indent(&mut self, is_end: bool) {
		if !self.do_indent {
			return;
		}
		if self.indent > 0 || is_end {
			self.buf.put_u8(b'\n');
		}
		for _ in 0..self.indent {
			self.buf.put_slice(b"  ");
		}
	}

	fn put_name(&mut self, prefix: Option<&str>, name: &str) {
		if let Some(prefix) = prefix.filter(|p| !p.is_empty()) {
			escape(&mut self.buf, prefix.as_bytes(), TEXT_SPECIALS);
			self.buf.put_u8(b':');
		}
		escape(&mut self.buf, name.as_bytes(), TEXT_SPECIALS);
	}

	fn put_attribute(&mut self, prefix: Option<&str>, name: &str, value: &str) {
		self.buf.put_u8(b' ');
		self.put_name(prefix, name);
		self.buf.put_slice(b"=\"");
		escape(&mut self.buf, value.as_bytes(), ATTR_SPECIALS);
		self.buf.put_u8(b'"');
	}

	fn open_tag(&mut self, prefix: Option<&str>, name: &str) {
		if self.in_start {
			self.buf.put_u8(b'>');
			self.up_indent();
		}
		self.in_start = true;
		if self.in_text && self.skip_next_indent {
			self.skip_next_indent = false;
		} else {
			self.write_indent(false);
		}
		self.buf.put_u8(b'<');
		self.put_name(prefix, name);
	}

	fn close_tag(&mut self, prefix: Option<&str>, name: &str) {
		if self.in_start {
			self.buf.put_slice(b"/>");
			self.in_start = false;
		} else {
			if self.in_text {
				self.in_text = false;
				self.skip_next_indent = false;
			} else {
				self.down_indent();
				self.write_indent(true);
			}
			self.buf.put_slice(b"</");
			self.put_name(prefix, name);
			self.buf.put_u8(b'>');
		}
		self.maybe_flush();
	}

	fn empty_tag(&mut self, prefix: Option<&str>, name: &str) {
		if self.in_start {
			self.buf.put_u8(b'>');
			self.up_indent();
		}
		self.skip_next_indent = false;
		self.in_start = false;
		self.write_indent(false);
		self.buf.put_u8(b'<');
		self.put_name(prefix, name);
		self.buf.put_slice(b"/>");
		self.maybe_flush();
	}

	/// Open `<name`. Attributes may follow until the next element or text.
	pub fn start_element(&mut self, name: &str) {
		self.open_tag(None, name);
	}

	/// Open `<prefix:name`.
	pub fn start_element_prefixed(&mut self, name: &str, prefix: &str) {
		self.open_tag(Some(prefix), name);
	}

	pub fn start_element_triple(&mut self, triple: &Triple) {
		self.open_tag(Some(triple.prefix.as_str()), triple.name.as_str());
	}

	/// Close the element `name`: `/>` if its start tag is still open,
	/// `</name>` otherwise.
	pub fn end_element(&mut self, name: &str) {
		self.close_tag(None, name);
	}

	pub fn end_element_prefixed(&mut self, name: &str, prefix: &str) {
		self.close_tag(Some(prefix), name);
	}

	pub fn end_element_triple(&mut self, triple: &Triple) {
		self.close_tag(Some(triple.prefix.as_str()), triple.name.as_str());
	}

	/// Write a childless element without attributes, `<name/>`.
	pub fn start_end_element(&mut self, name: &str) {
		self.empty_tag(None, name);
	}

	pub fn start_end_element_prefixed(&mut self, name: &str, prefix: &str) {
		self.empty_tag(Some(prefix), name);
	}

	pub fn start_end_element_triple(&mut self, triple: &Triple) {
		self.empty_tag(Some(triple.prefix.as_str()), triple.name.as_str());
	}

	fn attribute_allowed(&self, name: &str) -> bool {
		if !self.in_start {
			tracing::warn!(attribute = name, "attribute written outside of a start tag, dropped");
		}
		self.in_start
	}

	/// Write ` name="value"` into the open start tag.
	///
	/// Empty string values are omitted; `bool` and numbers are always
	/// written.
	pub fn write_attribute<V: AttributeValue>(&mut self, name: &str, value: V) {
		if value.is_unset() || !self.attribute_allowed(name) {
			return;
		}
		self.put_attribute(None, name, &value.to_attribute_text());
	}

	/// Write ` prefix:name="value"` into the open start tag, omitting empty
	/// string values like [`OutputStream::write_attribute`].
	pub fn write_attribute_prefixed<V: AttributeValue>(&mut self, name: &str, prefix: &str, value: V) {
		if value.is_unset() || !self.attribute_allowed(name) {
			return;
		}
		self.put_attribute(Some(prefix), name, &value.to_attribute_text());
	}

	/// Write the attribute named by `triple`. Empty values are written, so
	/// parsed attributes survive re-serialization unchanged.
	pub fn write_attribute_triple<V: AttributeValue>(&mut self, triple: &Triple, value: V) {
		if !self.attribute_allowed(triple.name.as_str()) {
			return;
		}
		self.put_attribute(
			Some(triple.prefix.as_str()),
			triple.name.as_str(),
			&value.to_attribute_text(),
		);
	}

	/// Write all attributes of `attributes`, in order.
	pub fn write_attributes(&mut self, attributes: &Attributes) {
		for (triple, value) in attributes.iter() {
			self.write_attribute_triple(triple, value);
		}
	}

	/// Write the bindings of `namespaces` as `xmlns` attributes.
	pub fn write_namespaces(&mut self, namespaces: &XmlNamespaces) {
		namespaces.write(self);
	}

	fn begin_text(&mut self) {
		if self.in_start {
			self.in_start = false;
			self.buf.put_u8(b'>');
		}
	}

	/// Write character data, closing an open start tag first.
	pub fn write_chars(&mut self, chars: &str) {
		self.begin_text();
		escape(&mut self.buf, chars.as_bytes(), TEXT_SPECIALS);
		self.in_text = true;
		self.skip_next_indent = true;
		self.maybe_flush();
	}

	/// Write a double as character data, formatted like attribute values.
	pub fn write_f64(&mut self, value: f64) {
		self.begin_text();
		self.buf.put_slice(format_f64(value).as_bytes());
		self.maybe_flush();
	}

	/// Write an integer as character data.
	pub fn write_i64(&mut self, value: i64) {
		self.begin_text();
		self.buf.put_slice(value.to_string().as_bytes());
		self.maybe_flush();
	}

	/// Re-serialize a parsed token.
	pub fn write_token(&mut self, token: &Token) {
		match token {
			Token::StartElement(_, triple, attributes, namespaces) => {
				self.start_element_triple(triple);
				// a parsed scope may undeclare the default namespace with xmlns=""
				for (prefix, uri) in namespaces.iter() {
					let name = if prefix.is_empty() {
						Triple::local(PREFIX_XMLNS)
					} else {
						Triple::new(prefix, "", PREFIX_XMLNS)
					};
					self.write_attribute_triple(&name, uri);
				}
				self.write_attributes(attributes);
			}
			Token::EndElement(_, triple) => self.end_element_triple(triple),
			Token::Text(_, chars) => self.write_chars(chars),
			Token::Eof => (),
		}
	}

	/// Enable or disable indentation.
	pub fn set_auto_indent(&mut self, indent: bool) {
		self.do_indent = indent;
	}

	pub fn auto_indent(&self) -> bool {
		self.do_indent
	}

	/// Increase the indentation level, if indenting.
	pub fn up_indent(&mut self) {
		if self.do_indent {
			self.indent += 1;
		}
	}

	/// Decrease the indentation level, if indenting and above zero.
	pub fn down_indent(&mut self) {
		if self.do_indent && self.indent > 0 {
			self.indent -= 1;
		}
	}

	pub fn indent(&self) -> u32 {
		self.indent
	}

	pub fn set_indent(&mut self, indent: u32) {
		self.indent = indent;
	}

	/// Namespace snapshot held by this stream, if any.
	pub fn namespaces(&self) -> Option<&XmlNamespaces> {
		self.namespaces.as_ref()
	}

	/// Replace the namespace snapshot with a copy of `namespaces`.
	pub fn set_namespaces(&mut self, namespaces: Option<&XmlNamespaces>) {
		self.namespaces = namespaces.cloned();
	}

	fn maybe_flush(&mut self) {
		if self.buf.len() > FLUSH_THRESHOLD {
			self.drain_buffer();
		}
	}

	// hand staged bytes to the sink, keeping the first error
	fn drain_buffer(&mut self) {
		if self.buf.is_empty() {
			return;
		}
		if let Some(sink) = self.sink.as_mut() {
			if self.io_error.is_none() {
				if let Err(e) = sink.write_all(&self.buf) {
					self.io_error = Some(e);
				}
			}
		}
		self.buf.clear();
	}

	/// Write everything staged to the sink and flush the sink.
	///
	/// Reports the first I/O error which occurred since the last call.
	pub fn flush(&mut self) -> io::Result<()> {
		self.drain_buffer();
		if let Some(e) = self.io_error.take() {
			return Err(e);
		}
		match self.sink.as_mut() {
			Some(sink) => sink.flush(),
			None => Ok(()),
		}
	}

	/// Flush and hand back the sink.
	pub fn finish(mut self) -> io::Result<W> {
		self.flush()?;
		tracing::debug!("finished output stream");
		match self.sink.take() {
			Some(sink) => Ok(sink),
			None => Err(io::Error::new(io::ErrorKind::Other, "output stream has no sink")),
		}
	}
}

impl OutputStream<Vec<u8>> {
	/// Create a stream collecting into memory.
	pub fn in_memory(options: StreamOptions) -> Self {
		Self::new(Vec::new(), options)
	}

	/// Everything written so far.
	pub fn as_string(&mut self) -> String {
		self.drain_buffer();
		match self.sink.as_ref() {
			Some(data) => String::from_utf8_lossy(data).into_owned(),
			None => String::new(),
		}
	}

	/// Finish the stream and return its contents.
	pub fn into_string(mut self) -> String {
		let data = self.as_string();
		self.sink = None;
		data
	}
}

impl OutputStream<io::BufWriter<File>> {
	/// Create (or truncate) the file at `path` and write to it.
	pub fn create_file<P: AsRef<Path>>(path: P, options: StreamOptions) -> Result<Self> {
		let f = File::create(path.as_ref()).map_err(Error::io)?;
		tracing::debug!(path = %path.as_ref().display(), "opened output file");
		Ok(Self::new(io::BufWriter::new(f), options))
	}
}

impl<W: io::Write> fmt::Debug for OutputStream<W> {
	fn fmt<'f>(&self, f: &'f mut fmt::Formatter) -> fmt::Result {
		f.debug_struct("OutputStream")
			.field("encoding", &self.encoding)
			.field("in_start", &self.in_start)
			.field("in_text", &self.in_text)
			.field("indent", &self.indent)
			.field("staged", &self.buf.len())
			.finish()
	}
}

impl<W: io::Write> Drop for OutputStream<W> {
	fn drop(&mut self) {
		if self.sink.is_none() {
			return;
		}
		if let Err(e) = self.flush() {
			tracing::warn!(error = %e, "failed to flush output stream on drop");
		}
	}
}
