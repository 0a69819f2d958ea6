/*!
# Lookahead token queue

The [`Tokenizer`] sits between a parser backend and the
[`InputStream`](crate::InputStream). Backends append tokens; the stream pops
them from the front. Since tokens stay in the queue until they are consumed,
the lookahead helpers can inspect what lies ahead without losing anything.
*/
use std::collections::VecDeque;
use std::fmt;

use crate::token::{Token, TokenPosition};

/// Answer of a lookahead query.
///
/// `complete` is false if the queue ended before the containing element was
/// closed; `count` is then the number of matches seen so far.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Lookahead {
	pub count: u32,
	pub complete: bool,
}

#[derive(Debug, Default)]
pub struct Tokenizer {
	tokens: VecDeque<Token>,
	eof_seen: bool,
	encoding: String,
	version: String,
}

impl Tokenizer {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn push(&mut self, token: Token) {
		tracing::trace!(token = %token, "queued");
		self.tokens.push_back(token);
	}

	/// Append character data, merging it into a directly preceding text
	/// token.
	pub fn push_text(&mut self, position: TokenPosition, chars: &str) {
		if chars.is_empty() {
			return;
		}
		if let Some(Token::Text(_, prev)) = self.tokens.back_mut() {
			prev.push_str(chars);
			return;
		}
		self.push(Token::Text(position, chars.to_string()));
	}

	/// Record that the backend reached the end of its input.
	pub fn set_eof(&mut self) {
		self.eof_seen = true;
	}

	pub fn eof_seen(&self) -> bool {
		self.eof_seen
	}

	/// True once the end of input was seen and everything was consumed.
	pub fn is_eof(&self) -> bool {
		self.eof_seen && self.tokens.is_empty()
	}

	pub fn has_next(&self) -> bool {
		!self.tokens.is_empty()
	}

	pub fn len(&self) -> usize {
		self.tokens.len()
	}

	pub fn next(&mut self) -> Option<Token> {
		self.tokens.pop_front()
	}

	pub fn peek(&self) -> Option<&Token> {
		self.tokens.front()
	}

	pub fn clear(&mut self) {
		self.tokens.clear();
		self.eof_seen = false;
		self.encoding.clear();
		self.version.clear();
	}

	pub fn encoding(&self) -> &str {
		&self.encoding
	}

	pub fn version(&self) -> &str {
		&self.version
	}

	pub fn set_encoding(&mut self, encoding: &str) {
		self.encoding = encoding.to_string();
	}

	pub fn set_version(&mut self, version: &str) {
		self.version = version.to_string();
	}

	/// Walk the children of the element at the head of the queue.
	///
	/// Leading text is skipped. If the first element token is the start tag
	/// of `container` (or `container` is empty and it is any start tag), the
	/// walk begins inside that element. Otherwise the queue is assumed to be
	/// positioned inside `container` already. `visit` is called for every
	/// direct child start tag.
	fn walk_children<F: FnMut(&Token) -> bool>(&self, container: &str, mut visit: F) -> Lookahead {
		let mut iter = self.tokens.iter().peekable();
		while let Some(Token::Text(..)) = iter.peek() {
			iter.next();
		}
		if let Some(head) = iter.peek() {
			if head.is_start() && (container.is_empty() || head.name() == container) {
				iter.next();
			}
		}

		let mut depth = 0usize;
		let mut count = 0u32;
		for token in iter {
			match token {
				Token::StartElement(..) => {
					if depth == 0 && visit(token) {
						count += 1;
					}
					depth += 1;
				}
				Token::EndElement(..) => {
					if depth == 0 {
						return Lookahead {
							count,
							complete: true,
						};
					}
					depth -= 1;
				}
				Token::Text(..) => (),
				Token::Eof => break,
			}
		}
		Lookahead {
			count,
			complete: false,
		}
	}

	/// Number of direct child elements of `container`.
	pub fn determine_number_children(&self, container: &str) -> Lookahead {
		self.walk_children(container, |_| true)
	}

	/// Number of direct child elements of `container` named `child`.
	pub fn determine_num_specific_children(&self, child: &str, container: &str) -> Lookahead {
		self.walk_children(container, |tok| tok.name() == child)
	}

	/// Whether `container` has a direct child named `child`.
	///
	/// The answer is complete as soon as a match is found.
	pub fn contains_child(&self, child: &str, container: &str) -> Lookahead {
		let result = self.determine_num_specific_children(child, container);
		if result.count > 0 {
			Lookahead {
				count: 1,
				complete: true,
			}
		} else {
			result
		}
	}
}

impl fmt::Display for Tokenizer {
	fn fmt<'f>(&self, f: &'f mut fmt::Formatter) -> fmt::Result {
		for token in self.tokens.iter() {
			fmt::Display::fmt(token, f)?;
		}
		Ok(())
	}
}
