#[macro_use]
extern crate afl;
extern crate lx_xml;

use lx_xml::{available_backends, InputStream, OutputStream, StreamOptions};

fn main() {
	fuzz!(|data: &[u8]| {
		for backend in available_backends() {
			let mut stream = match InputStream::new(data, false, backend) {
				Ok(s) => s,
				Err(_) => return,
			};
			stream.determine_number_children("");
			stream.contains_child("a", "");

			let mut out = OutputStream::in_memory(StreamOptions::bare());
			let mut depth = 0usize;
			for token in stream.tokens() {
				if token.is_start() {
					depth += 1;
				} else if token.is_end() {
					depth = depth.saturating_sub(1);
				}
				out.write_token(&token);
			}
			assert!(stream.is_eof() || stream.is_error());
			if stream.is_eof() {
				assert_eq!(depth, 0);
				// references passed through by the writer may not parse
				// again, so only the absence of panics is checked here
				let written = out.into_string();
				if let Ok(mut again) = InputStream::new(written.as_bytes(), false, backend) {
					while again.is_good() {
						again.next();
					}
				}
			}
		}
	});
}
