use std::io::{self, Read};
use std::process::ExitCode;

use lx_xml::{create_input_stream, create_output_stream};

/// Read a document from stdin and write it to stdout, re-indented.
///
/// The backend may be given as the first argument.
fn main() -> ExitCode {
	let backend = std::env::args().nth(1).unwrap_or_default();
	let mut doc = Vec::new();
	if let Err(e) = io::stdin().read_to_end(&mut doc) {
		eprintln!("failed to read stdin: {}", e);
		return ExitCode::FAILURE;
	}

	let mut input = match create_input_stream(&doc, false, &backend) {
		Ok(s) => s,
		Err(e) => {
			eprintln!("{}", e);
			return ExitCode::FAILURE;
		}
	};
	let encoding = if input.encoding().is_empty() {
		"UTF-8".to_string()
	} else {
		input.encoding().to_string()
	};

	let mut output = create_output_stream(io::stdout().lock(), &encoding, true, "pipe", lx_xml::VERSION);
	for token in input.tokens() {
		if token.is_text() && token.chars().trim().is_empty() {
			continue;
		}
		output.write_token(&token);
	}
	if let Err(e) = output.finish() {
		eprintln!("failed to write stdout: {}", e);
		return ExitCode::FAILURE;
	}
	println!();

	if input.is_error() {
		eprint!("{}", input.error_log().borrow());
		return ExitCode::FAILURE;
	}
	ExitCode::SUCCESS
}
