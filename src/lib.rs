/*!
# XML abstraction layer

This crate turns XML documents into a uniform stream of [`Token`]s,
independent of the XML engine which does the actual parsing, and
serializes documents back into well-formed, correctly escaped XML.

## Features

* Pluggable parser backends, selected by name at runtime:
  [quick-xml](https://docs.rs/quick-xml) (event-based, feature `quick`)
  and [roxmltree](https://docs.rs/roxmltree) (tree-based, feature `tree`)
* Incremental parsing: backends are driven one chunk at a time
* Lookahead: count the children of the next element without consuming
  anything
* Namespace scopes with protected (*reserved*) URIs
* An escaping serializer which never escapes already escaped content
* Problems with the XML are collected in a shared [`ErrorLog`] instead of
  being returned as errors

## Example

```
use lx_xml::{create_input_stream, OutputStream, StreamOptions};

let mut input = create_input_stream(b"<a><b x=\"1\"/><c>text</c></a>", false, "").unwrap();
assert_eq!(input.determine_number_children("a"), 2);

let mut output = OutputStream::in_memory(StreamOptions::bare());
for token in input.tokens() {
	output.write_token(&token);
}
assert!(input.is_eof());
assert_eq!(output.into_string(), "<a><b x=\"1\"/><c>text</c></a>");
```

## Reading

[`create_input_stream`] (or [`InputStream::new`]) opens a document from
memory or from a file. Construction only fails if the stream cannot be set
up at all, for instance for an unknown backend or a missing file. Malformed
XML is reported into the stream's [`ErrorLog`] and puts the stream into its
error state, from which only [`Token::Eof`] is returned.

## Writing

[`OutputStream`] writes to any [`std::io::Write`]. [`StringOutputStream`]
and [`FileOutputStream`] are shorthands for in-memory and file output.
*/
use std::io;

pub mod error;
pub mod input;
pub mod namespaces;
pub mod parser;
pub mod token;
pub mod tokenizer;
pub mod writer;

pub use error::{Error, ErrorCode, ErrorLog, NamespaceError, Result, Severity, SharedErrorLog, XmlError};
pub use input::{InputStream, Tokens};
pub use namespaces::{add_reserved_uri, is_uri_reserved, XmlNamespaces};
pub use parser::{available_backends, Backend, Source, BACKEND_QUICK, BACKEND_TREE, DEFAULT_BACKEND};
pub use token::{Attributes, Token, TokenPosition, Triple};
pub use tokenizer::{Lookahead, Tokenizer};
pub use writer::{
	AttributeValue, FileOutputStream, OutputStream, StreamOptions, StringOutputStream, WriterConfig,
};

/// Version of this crate.
pub const VERSION: &'static str = env!("CARGO_PKG_VERSION");

/// Open an input stream over `content`, which is a file name if `is_file`
/// and the document itself otherwise. `backend` names the parser backend;
/// empty selects [`DEFAULT_BACKEND`].
pub fn create_input_stream(content: &[u8], is_file: bool, backend: &str) -> Result<InputStream> {
	InputStream::new(content, is_file, backend)
}

/// Open an output stream over `sink`.
///
/// The generator comment is written only if `program_name` is not empty
/// and the process-wide [`WriterConfig`] enables it.
pub fn create_output_stream<W: io::Write>(
	sink: W,
	encoding: &str,
	write_declaration: bool,
	program_name: &str,
	program_version: &str,
) -> OutputStream<W> {
	OutputStream::new(
		sink,
		StreamOptions {
			encoding: encoding.to_string(),
			write_declaration,
			program_name: program_name.to_string(),
			program_version: program_version.to_string(),
			..StreamOptions::default()
		},
	)
}

#[cfg(test)]
mod tests;
