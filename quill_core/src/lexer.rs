use logos::Logos;

use crate::Point;
use crate::Position;
use crate::QuillError;
use crate::QuillResult;
use crate::tokens::SpannedToken;
use crate::tokens::Token;

/// Raw tokens produced by logos for flat tokenization of template source.
#[derive(Logos, Debug, Clone, Copy, PartialEq)]
enum RawToken {
	#[token("{{")]
	OutputOpen,
	#[token("}}")]
	OutputClose,
	#[token("{%")]
	TagOpen,
	#[token("%}")]
	TagClose,
	#[token("{#")]
	CommentOpen,
	#[token("#}")]
	CommentClose,
	/// A lone marker character that does not start or end a marker.
	#[token("{")]
	#[token("}")]
	#[token("%")]
	#[token("#")]
	Punct,
	#[regex(r"[^{}%#]+")]
	Text,
}

/// Context states for the state machine that drives context-dependent token
/// processing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LexerContext {
	/// The lexer is currently outside of any marker.
	Outside,
	/// The lexer is currently inside `{{ … }}`.
	Output,
	/// The lexer is currently inside `{% … %}`.
	Tag,
	/// The lexer is currently inside `{# … #}`.
	Comment,
}

impl LexerContext {
	fn opening_marker(self) -> &'static str {
		match self {
			Self::Outside => "",
			Self::Output => "{{",
			Self::Tag => "{%",
			Self::Comment => "{#",
		}
	}
}

/// Walks the logos token stream with context-dependent rules, building
/// positioned markup tokens.
struct TokenWalker<'a> {
	/// The template source.
	source: &'a str,
	/// The collected raw tokens and their byte spans.
	raw_tokens: Vec<(Result<RawToken, ()>, std::ops::Range<usize>)>,
	/// Current index into `raw_tokens`.
	cursor: usize,
	/// Position of the start of the current raw token.
	point: Point,
	context: LexerContext,
	/// Text or code collected since the last emitted token.
	buffer: String,
	/// Where `buffer` starts.
	buffer_start: Point,
	/// Where the currently open marker starts.
	marker_start: Point,
	/// The delimiter of the string literal the walker is inside, if any.
	quote: Option<char>,
	/// Whether the previous code character was an unescaped backslash.
	escaped: bool,
	tokens: Vec<SpannedToken>,
}

impl<'a> TokenWalker<'a> {
	fn new(source: &'a str) -> Self {
		let raw_tokens: Vec<_> = RawToken::lexer(source).spanned().collect();

		Self {
			source,
			raw_tokens,
			cursor: 0,
			point: Point::default(),
			context: LexerContext::Outside,
			buffer: String::new(),
			buffer_start: Point::default(),
			marker_start: Point::default(),
			quote: None,
			escaped: false,
			tokens: vec![],
		}
	}

	/// Get the text slice for the current raw token.
	fn current_slice(&self) -> &'a str {
		let (_, span) = &self.raw_tokens[self.cursor];
		&self.source[span.clone()]
	}

	/// Advance the position tracker past the current raw token and move the
	/// cursor forward.
	fn advance_cursor(&mut self) {
		let slice = self.current_slice();
		self.point.advance_str(slice);
		self.cursor += 1;
	}

	/// Append the current slice to the buffer, then advance.
	fn buffer_current(&mut self) {
		if self.buffer.is_empty() {
			self.buffer_start = self.point;
		}

		let slice = self.current_slice();
		if self.context != LexerContext::Outside {
			self.track_quotes(slice);
		}
		self.buffer.push_str(slice);
		self.advance_cursor();
	}

	/// Keep track of string literals inside a marker so that a closing marker
	/// within quotes does not end the marker.
	fn track_quotes(&mut self, slice: &str) {
		for ch in slice.chars() {
			if self.escaped {
				self.escaped = false;
				continue;
			}

			match (self.quote, ch) {
				(Some(_), '\\') => self.escaped = true,
				(Some(quote), ch) if ch == quote => self.quote = None,
				(None, '"' | '\'') => self.quote = Some(ch),
				_ => {}
			}
		}
	}

	/// Emit the buffered text as a [`Token::Text`], if there is any.
	fn flush_text(&mut self) {
		if self.buffer.is_empty() {
			return;
		}

		let text = std::mem::take(&mut self.buffer);
		let position = Position::spanning(self.buffer_start, &text);
		self.tokens.push(SpannedToken::new(Token::Text(text), position));
	}

	/// Emit a marker token for the current raw token, then advance.
	fn push_marker(&mut self, token: Token) {
		let position = Position::spanning(self.point, self.current_slice());
		self.tokens.push(SpannedToken::new(token, position));
		self.advance_cursor();
	}

	fn open(&mut self, context: LexerContext, token: Option<Token>) {
		self.flush_text();
		self.context = context;
		self.marker_start = self.point;
		self.quote = None;
		self.escaped = false;

		match token {
			Some(token) => self.push_marker(token),
			None => self.advance_cursor(),
		}

		self.buffer_start = self.point;
	}

	/// Close the current output or tag marker, emitting its raw code.
	fn close(&mut self, token: Token) {
		let code = std::mem::take(&mut self.buffer);
		let position = Position::spanning(self.buffer_start, &code);
		self.tokens.push(SpannedToken::new(Token::Code(code), position));
		self.push_marker(token);
		self.context = LexerContext::Outside;
	}

	/// Main processing loop.
	fn process(&mut self) -> QuillResult<()> {
		while self.cursor < self.raw_tokens.len() {
			let (result, _) = &self.raw_tokens[self.cursor];
			let raw = result.as_ref().ok().copied();

			match self.context {
				LexerContext::Outside => {
					match raw {
						Some(RawToken::OutputOpen) => {
							self.open(LexerContext::Output, Some(Token::OutputOpen));
						}
						Some(RawToken::TagOpen) => {
							self.open(LexerContext::Tag, Some(Token::TagOpen));
						}
						Some(RawToken::CommentOpen) => self.open(LexerContext::Comment, None),
						_ => self.buffer_current(),
					}
				}
				LexerContext::Output => {
					match raw {
						Some(RawToken::OutputClose) if self.quote.is_none() => {
							self.close(Token::OutputClose);
						}
						_ => self.buffer_current(),
					}
				}
				LexerContext::Tag => {
					match raw {
						Some(RawToken::TagClose) if self.quote.is_none() => {
							self.close(Token::TagClose);
						}
						_ => self.buffer_current(),
					}
				}
				LexerContext::Comment => {
					if raw == Some(RawToken::CommentClose) {
						self.context = LexerContext::Outside;
					}
					self.advance_cursor();
				}
			}
		}

		if self.context != LexerContext::Outside {
			return Err(QuillError::UnclosedMarker {
				marker: self.context.opening_marker(),
				line: self.marker_start.line,
				column: self.marker_start.column,
			});
		}

		self.flush_text();

		Ok(())
	}
}

/// Split template source into literal text runs and output/tag markers.
///
/// The tokens cover the whole input except for `{# … #}` comments, which
/// are dropped. An output or tag marker is always emitted as the triple
/// open, [`Token::Code`], close.
pub fn tokenize(source: &str) -> QuillResult<Vec<SpannedToken>> {
	let mut walker = TokenWalker::new(source);
	walker.process()?;

	Ok(walker.tokens)
}
