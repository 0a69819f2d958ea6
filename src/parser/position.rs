use std::io;

/**
# Buffered reader which tracks line and column

Wraps an [`io::BufRead`] and counts lines and columns of everything which
has been consumed through it. Columns count characters, not bytes: UTF-8
continuation bytes do not advance the column.
*/
pub struct PositionReader<R> {
	inner: R,
	pos: Position,
	offset: u64,
}

struct Position {
	line: u64,
	column: u64,
}

impl Position {
	fn advance(&mut self, data: &[u8]) {
		for b in data.iter() {
			match *b {
				b'\n' => {
					self.line += 1;
					self.column = 1;
				}
				// continuation bytes belong to the previous character
				b if b & 0xc0 == 0x80 => (),
				_ => self.column += 1,
			}
		}
	}
}

impl<R: io::BufRead> PositionReader<R> {
	pub fn new(inner: R) -> Self {
		Self {
			inner,
			pos: Position { line: 1, column: 1 },
			offset: 0,
		}
	}

	/// 1-based line of the next unconsumed byte.
	pub fn line(&self) -> u64 {
		self.pos.line
	}

	/// 1-based column of the next unconsumed byte.
	pub fn column(&self) -> u64 {
		self.pos.column
	}

	/// Number of bytes consumed so far.
	pub fn offset(&self) -> u64 {
		self.offset
	}

	pub fn into_inner(self) -> R {
		self.inner
	}
}

impl<R: io::BufRead> io::Read for PositionReader<R> {
	fn read(&mut self, dst: &mut [u8]) -> io::Result<usize> {
		let read = {
			let src = self.inner.fill_buf()?;
			let to_read = std::cmp::min(dst.len(), src.len());
			dst[..to_read].copy_from_slice(&src[..to_read]);
			to_read
		};
		self.pos.advance(&dst[..read]);
		self.offset += read as u64;
		self.inner.consume(read);
		Ok(read)
	}
}

impl<R: io::BufRead> io::BufRead for PositionReader<R> {
	fn fill_buf(&mut self) -> io::Result<&[u8]> {
		self.inner.fill_buf()
	}

	fn consume(&mut self, amt: usize) {
		if let Ok(buf) = self.inner.fill_buf() {
			let seen = std::cmp::min(amt, buf.len());
			self.pos.advance(&buf[..seen]);
		}
		self.offset += amt as u64;
		self.inner.consume(amt);
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::io::{BufRead, Read};

	#[test]
	fn tracks_lines_and_columns_on_consume() {
		let mut r = PositionReader::new(io::Cursor::new(b"ab\ncd\n\nef".to_vec()));
		assert_eq!((r.line(), r.column()), (1, 1));
		r.consume(2);
		assert_eq!((r.line(), r.column()), (1, 3));
		r.consume(3);
		assert_eq!((r.line(), r.column()), (2, 3));
		r.consume(2);
		assert_eq!((r.line(), r.column()), (4, 1));
		assert_eq!(r.offset(), 7);
	}

	#[test]
	fn tracks_on_read() {
		let mut r = PositionReader::new(io::Cursor::new(b"x\ny".to_vec()));
		let mut buf = Vec::new();
		r.read_to_end(&mut buf).unwrap();
		assert_eq!(buf, b"x\ny");
		assert_eq!((r.line(), r.column()), (2, 2));
	}

	#[test]
	fn multibyte_characters_count_once() {
		let mut r = PositionReader::new(io::Cursor::new("äöü".as_bytes().to_vec()));
		r.consume(6);
		assert_eq!(r.column(), 4);
	}
}
