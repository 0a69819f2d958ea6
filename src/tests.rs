use super::*;

// smoke tests across reader and writer; the components are tested in
// their modules

#[derive(Debug, PartialEq)]
enum Shape {
	Start(String, String, String, Vec<(String, String, String)>, Vec<(String, String)>),
	End(String, String),
	Text(String),
}

fn shapes(doc: &[u8], backend: &str) -> Vec<Shape> {
	let mut input = create_input_stream(doc, false, backend).unwrap();
	let result = input
		.tokens()
		.map(|t| match t {
			Token::StartElement(_, triple, attrs, ns) => {
				// declaration order is not significant
				let mut ns: Vec<_> = ns.iter().map(|(p, u)| (p.to_string(), u.to_string())).collect();
				ns.sort();
				Shape::Start(
					triple.name.to_string(),
					triple.uri,
					triple.prefix.to_string(),
					attrs
						.iter()
						.map(|(t, v)| (t.name.to_string(), t.uri.clone(), v.to_string()))
						.collect(),
					ns,
				)
			}
			Token::EndElement(_, triple) => Shape::End(triple.name.to_string(), triple.uri),
			Token::Text(_, chars) => Shape::Text(chars),
			other => panic!("unexpected token: {:?}", other),
		})
		.collect();
	assert!(input.is_eof(), "{} failed: {}", backend, input.error_log().borrow());
	result
}

fn reserialize(doc: &[u8], backend: &str) -> String {
	let mut input = create_input_stream(doc, false, backend).unwrap();
	let mut output = OutputStream::in_memory(StreamOptions::bare());
	for token in input.tokens() {
		output.write_token(&token);
	}
	assert!(input.is_eof());
	output.into_string()
}

#[test]
fn reserialization_is_byte_identical() {
	let doc = "<a><b x=\"1\"/><c>text</c></a>";
	for backend in available_backends() {
		assert_eq!(reserialize(doc.as_bytes(), backend), doc, "backend {}", backend);
	}
}

#[test]
fn read_write_read_round_trip() {
	let docs: &[&str] = &[
		"<a><b x=\"1\"/><c>text</c></a>",
		"<?xml version=\"1.0\"?>\n<root xmlns=\"urn:r\" xmlns:p=\"urn:p\" p:attr=\"v\" plain=\"\"><p:child>a &lt; b &amp; c</p:child><child/></root>",
		"<doc>\n  <item n=\"1\">one</item>\n  <item n=\"2\">&#233;t&#xE9;</item>\n</doc>",
		"<x q='single \"quoted\"'>it's</x>",
		"<m xmlns:a=\"urn:a\"><a:n xmlns:a=\"urn:other\" a:k=\"v\"/><a:n/></m>",
		"<a xmlns=\"urn:x\"><b xmlns=\"\"/></a>",
		"<a v=\"x&#10;y\" w=\"&#9;t&#13;\">p&#13;q</a>",
	];
	for backend in available_backends() {
		for doc in docs {
			let first = shapes(doc.as_bytes(), backend);
			let written = reserialize(doc.as_bytes(), backend);
			let second = shapes(written.as_bytes(), backend);
			assert_eq!(first, second, "backend {} document {} written as {}", backend, doc, written);
		}
	}
}

#[test]
fn backends_agree() {
	let docs: &[&[u8]] = &[
		b"<root xmlns=\"urn:r\" xmlns:p=\"urn:p\" p:attr=\"v\"><p:child>a &lt; b</p:child>tail<e/></root>",
		b"<a xmlns:p=\"urn:p\"><p:b xmlns:p=\"urn:p\"/><c xmlns=\"\"/></a>",
	];
	let backends = available_backends();
	for doc in docs {
		let reference = shapes(doc, backends[0]);
		for backend in &backends[1..] {
			assert_eq!(shapes(doc, backend), reference, "backend {}", backend);
		}
	}
}

#[test]
fn whitespace_survives_reserialization() {
	for backend in available_backends() {
		let written = reserialize(b"<a v=\"x&#10;y\">p&#13;q</a>", backend);
		assert_eq!(written, "<a v=\"x&#xa;y\">p&#xd;q</a>");
		let mut input = create_input_stream(written.as_bytes(), false, backend).unwrap();
		let a = input.next();
		assert_eq!(a.attr_value("v"), Some("x\ny"), "backend {}", backend);
		assert_eq!(input.next().chars(), "p\rq");
	}
}

#[test]
fn undeclared_default_namespace_survives_reserialization() {
	for backend in available_backends() {
		let written = reserialize(b"<a xmlns=\"urn:x\"><b xmlns=\"\"/></a>", backend);
		assert_eq!(written, "<a xmlns=\"urn:x\"><b xmlns=\"\"/></a>", "backend {}", backend);
		let mut input = create_input_stream(written.as_bytes(), false, backend).unwrap();
		assert_eq!(input.next().uri(), "urn:x");
		assert_eq!(input.next().uri(), "");
	}
}

#[test]
fn indented_output_of_parsed_document() {
	let mut input = create_input_stream(b"<a><b><c/></b><d>x</d></a>", false, "").unwrap();
	let mut output = create_output_stream(Vec::new(), "UTF-8", true, "", "");
	for token in input.tokens() {
		output.write_token(&token);
	}
	let data = output.finish().unwrap();
	assert_eq!(
		String::from_utf8(data).unwrap(),
		"<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<a>\n  <b>\n    <c/>\n  </b>\n  <d>x</d>\n</a>"
	);
}

#[test]
fn skip_unknown_subtree_then_continue() {
	for backend in available_backends() {
		let mut input = create_input_stream(
			b"<model><unknown><deep><deep/></deep></unknown><known k=\"1\"/></model>",
			false,
			backend,
		)
		.unwrap();
		assert_eq!(input.next().name(), "model");
		let unknown = input.next();
		input.skip_past_end(&unknown);
		let known = input.next();
		assert_eq!(known.name(), "known");
		assert_eq!(known.attr_value("k"), Some("1"));
	}
}

#[test]
fn reserved_prefix_binding_survives_rebind() {
	add_reserved_uri("urn:lx-xml:tests:reserved");
	let mut ns = XmlNamespaces::new();
	ns.add("urn:lx-xml:tests:reserved", "core").unwrap();
	assert_eq!(ns.add("urn:elsewhere", "core"), Err(NamespaceError::ReservedUri));
	assert_eq!(ns.get_uri("core"), "urn:lx-xml:tests:reserved");
	assert_eq!(ns.len(), 1);
}

#[test]
fn version_is_exposed() {
	assert_eq!(VERSION, env!("CARGO_PKG_VERSION"));
}
