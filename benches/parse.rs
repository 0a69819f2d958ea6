use criterion::{black_box, criterion_group, criterion_main, Criterion};

use lx_xml::{available_backends, InputStream, OutputStream, StreamOptions, Token};

static SHORT_DOCUMENT: &'static [u8] = b"<?xml version='1.0'?>\n<root xmlns='urn:uuid:fab98e86-7c09-477c-889c-0313d9877bb4' a=\"foo\" b='bar'><child>with some text</child></root>";

fn large_document() -> Vec<u8> {
	let mut doc = String::from(
		"<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<model xmlns=\"urn:lx:model\" xmlns:n=\"urn:lx:notes\" id=\"m\">\n  <listOfSpecies>\n",
	);
	for i in 0..2000 {
		doc.push_str(&format!(
			"    <species id=\"s{}\" compartment=\"c\" initialAmount=\"{}\" constant=\"false\"><n:note>species &amp; amount {}</n:note></species>\n",
			i,
			i as f64 * 0.25,
			i
		));
	}
	doc.push_str("  </listOfSpecies>\n</model>\n");
	doc.into_bytes()
}

fn read_all(doc: &[u8], backend: &str) -> Vec<Token> {
	let mut stream = InputStream::new(doc, false, backend).unwrap();
	let tokens: Vec<Token> = stream.tokens().collect();
	assert!(stream.is_eof());
	tokens
}

fn short_document(c: &mut Criterion) {
	let mut group = c.benchmark_group("short_document");
	for backend in available_backends() {
		group.bench_function(backend, |b| {
			b.iter(|| read_all(black_box(SHORT_DOCUMENT), backend));
		});
	}
}

fn huge_document(c: &mut Criterion) {
	let doc = large_document();
	let mut group = c.benchmark_group("huge_document");
	for backend in available_backends() {
		group.bench_function(format!("read_{}", backend), |b| {
			b.iter(|| read_all(black_box(&doc), backend));
		});

		group.bench_function(format!("lookahead_{}", backend), |b| {
			b.iter(|| {
				let mut stream = InputStream::new(&doc, false, backend).unwrap();
				stream.next();
				assert_eq!(stream.determine_number_children("listOfSpecies"), 2000);
			});
		});
	}

	let tokens = read_all(&doc, "");
	group.bench_function("write", |b| {
		b.iter(|| {
			let mut out = OutputStream::in_memory(StreamOptions::bare());
			for token in tokens.iter() {
				out.write_token(black_box(token));
			}
			out.into_string()
		});
	});
}

criterion_group! {
	name = benches;
	config = Criterion::default().sample_size(50);
	targets = short_document, huge_document
}
criterion_main!(benches);
