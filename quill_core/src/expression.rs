//! Expressions used inside `{{ … }}` markers and tag arguments.
//!
//! ```text
//! expression := primary ( "|" IDENT ( "(" primary ( "," primary )* ")" )? )*
//! primary    := STRING | NUMBER | "true" | "false" | "null" | path
//! path       := IDENT ( "." IDENT | "[" primary "]" )*
//! ```

use std::iter::Peekable;

use logos::Logos;
use serde_json::Map;
use serde_json::Number;
use serde_json::Value;
use snailquote::unescape;

#[derive(Logos, Debug, Clone, Copy, PartialEq)]
#[logos(skip r"[ \t\r\n]+")]
enum ExprToken {
	#[regex(r"[a-zA-Z_$][a-zA-Z0-9_$]*")]
	Ident,
	#[regex(r"-?[0-9]+(\.[0-9]+)?([eE][+-]?[0-9]+)?")]
	Number,
	#[regex(r#""([^"\\]|\\.)*""#)]
	DoubleQuotedString,
	#[regex(r"'([^'\\]|\\.)*'")]
	SingleQuotedString,
	#[token(".")]
	Dot,
	#[token("|")]
	Pipe,
	#[token("(")]
	ParenOpen,
	#[token(")")]
	ParenClose,
	#[token("[")]
	BracketOpen,
	#[token("]")]
	BracketClose,
	#[token(",")]
	Comma,
}

/// A value-producing expression without filters.
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum Expr {
	/// A string, number, boolean or null literal.
	Literal(Value),
	/// A top-level name looked up in the render scope.
	Variable(String),
	/// `base.name`
	Attribute(Box<Expr>, String),
	/// `base[key]`
	Index(Box<Expr>, Box<Expr>),
}

/// A filter invocation in a filter chain, e.g. `replace("a", "b")`.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterCall {
	pub name: String,
	pub arguments: Vec<Expr>,
}

/// An expression followed by its ordered filter chain.
#[derive(Debug, Clone, PartialEq)]
pub struct Expression {
	pub base: Expr,
	pub filters: Vec<FilterCall>,
}

impl Expression {
	/// Parse an expression with an optional filter chain.
	///
	/// The error is a human-readable reason; callers attach the source
	/// position.
	pub fn parse(source: &str) -> Result<Self, String> {
		let mut parser = ExprParser::new(source)?;
		let base = parser.primary()?;
		let mut filters = vec![];

		while let Some(token) = parser.next() {
			if token != ExprToken::Pipe {
				return Err(format!("unexpected `{}`", parser.slice()));
			}

			filters.push(parser.filter_call()?);
		}

		Ok(Self { base, filters })
	}

	/// Parse a bare filter chain such as `upper | replace("a", "b")`.
	pub fn parse_filter_chain(source: &str) -> Result<Vec<FilterCall>, String> {
		let mut parser = ExprParser::new(source)?;
		let mut filters = vec![parser.filter_call()?];

		while let Some(token) = parser.next() {
			if token != ExprToken::Pipe {
				return Err(format!("unexpected `{}`", parser.slice()));
			}

			filters.push(parser.filter_call()?);
		}

		Ok(filters)
	}

	/// The literal value of this expression when it is a bare literal.
	pub fn as_literal(&self) -> Option<&Value> {
		match (&self.base, self.filters.is_empty()) {
			(Expr::Literal(value), true) => Some(value),
			_ => None,
		}
	}
}

impl Expr {
	/// Evaluate against a scope. Missing names and keys evaluate to null.
	pub fn evaluate(&self, scope: &Map<String, Value>) -> Value {
		match self {
			Expr::Literal(value) => value.clone(),
			Expr::Variable(name) => scope.get(name).cloned().unwrap_or(Value::Null),
			Expr::Attribute(base, name) => {
				let base = base.evaluate(scope);
				lookup(&base, &Value::String(name.clone()))
			}
			Expr::Index(base, key) => {
				let base = base.evaluate(scope);
				let key = key.evaluate(scope);
				lookup(&base, &key)
			}
		}
	}
}

fn lookup(base: &Value, key: &Value) -> Value {
	let found = match (base, key) {
		(Value::Object(map), Value::String(key)) => map.get(key),
		(Value::Object(map), Value::Number(key)) => map.get(&key.to_string()),
		(Value::Array(items), Value::Number(index)) => {
			index
				.as_u64()
				.and_then(|index| usize::try_from(index).ok())
				.and_then(|index| items.get(index))
		}
		(Value::Array(items), Value::String(index)) => {
			index
				.parse::<usize>()
				.ok()
				.and_then(|index| items.get(index))
		}
		_ => None,
	};

	found.cloned().unwrap_or(Value::Null)
}

struct ExprParser<'a> {
	source: &'a str,
	tokens: Peekable<std::vec::IntoIter<(ExprToken, std::ops::Range<usize>)>>,
	span: std::ops::Range<usize>,
}

impl<'a> ExprParser<'a> {
	fn new(source: &'a str) -> Result<Self, String> {
		let mut tokens = vec![];

		for (result, span) in ExprToken::lexer(source).spanned() {
			let Ok(token) = result else {
				return Err(format!("unexpected character `{}`", &source[span]));
			};
			tokens.push((token, span));
		}

		Ok(Self {
			source,
			tokens: tokens.into_iter().peekable(),
			span: 0..0,
		})
	}

	/// The source text of the most recently consumed token.
	fn slice(&self) -> &'a str {
		&self.source[self.span.clone()]
	}

	fn next(&mut self) -> Option<ExprToken> {
		let (token, span) = self.tokens.next()?;
		self.span = span;
		Some(token)
	}

	fn peek(&mut self) -> Option<ExprToken> {
		self.tokens.peek().map(|(token, _)| *token)
	}

	fn expect_any(&mut self, expected: &str) -> Result<ExprToken, String> {
		self.next()
			.ok_or_else(|| format!("expected {expected}, found end of expression"))
	}

	fn primary(&mut self) -> Result<Expr, String> {
		let token = self.expect_any("a value")?;
		let slice = self.slice();

		let mut expr = match token {
			ExprToken::DoubleQuotedString => Expr::Literal(Value::String(unquote(slice, '"')?)),
			ExprToken::SingleQuotedString => Expr::Literal(Value::String(unquote(slice, '\'')?)),
			ExprToken::Number => Expr::Literal(parse_number(slice)?),
			ExprToken::Ident => {
				match slice {
					"true" => return Ok(Expr::Literal(Value::Bool(true))),
					"false" => return Ok(Expr::Literal(Value::Bool(false))),
					"null" | "none" => return Ok(Expr::Literal(Value::Null)),
					name => Expr::Variable(name.to_string()),
				}
			}
			_ => return Err(format!("unexpected `{slice}`")),
		};

		if !matches!(expr, Expr::Variable(_)) {
			return Ok(expr);
		}

		loop {
			match self.peek() {
				Some(ExprToken::Dot) => {
					self.next();
					if self.expect_any("an attribute name")? != ExprToken::Ident {
						return Err(format!(
							"expected an attribute name, found `{}`",
							self.slice()
						));
					}
					expr = Expr::Attribute(Box::new(expr), self.slice().to_string());
				}
				Some(ExprToken::BracketOpen) => {
					self.next();
					let key = self.primary()?;
					if self.expect_any("`]`")? != ExprToken::BracketClose {
						return Err(format!("expected `]`, found `{}`", self.slice()));
					}
					expr = Expr::Index(Box::new(expr), Box::new(key));
				}
				_ => return Ok(expr),
			}
		}
	}

	fn filter_call(&mut self) -> Result<FilterCall, String> {
		if self.expect_any("a filter name")? != ExprToken::Ident {
			return Err(format!("expected a filter name, found `{}`", self.slice()));
		}

		let name = self.slice().to_string();
		let mut arguments = vec![];

		if self.peek() == Some(ExprToken::ParenOpen) {
			self.next();

			if self.peek() == Some(ExprToken::ParenClose) {
				self.next();
			} else {
				loop {
					arguments.push(self.primary()?);

					match self.expect_any("`,` or `)`")? {
						ExprToken::Comma => {}
						ExprToken::ParenClose => break,
						_ => return Err(format!("expected `,` or `)`, found `{}`", self.slice())),
					}
				}
			}
		}

		Ok(FilterCall { name, arguments })
	}
}

fn parse_number(slice: &str) -> Result<Value, String> {
	if let Ok(integer) = slice.parse::<i64>() {
		return Ok(Value::Number(integer.into()));
	}

	slice
		.parse::<f64>()
		.ok()
		.and_then(Number::from_f64)
		.map(Value::Number)
		.ok_or_else(|| format!("invalid number `{slice}`"))
}

/// Strip the quotes from a string literal and resolve its escapes.
fn unquote(slice: &str, delimiter: char) -> Result<String, String> {
	let inner = &slice[1..slice.len() - 1];

	if !inner.contains('\\') {
		return Ok(inner.to_string());
	}

	let quoted = if delimiter == '"' {
		slice.to_string()
	} else {
		let normalized = inner
			.replace("\\'", "'")
			.replace("\\\"", "\"")
			.replace('"', "\\\"");
		format!("\"{normalized}\"")
	};

	unescape(&quoted).map_err(|e| format!("invalid string literal {slice}: {e}"))
}
