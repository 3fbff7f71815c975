use std::fmt::Display;

use crate::Position;

/// Markup-level tokens. The content between an open and a close marker is
/// kept raw in a [`Token::Code`] and only tokenized further by the
/// expression parser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
	/// Literal text between markers, preserved verbatim.
	Text(String),
	/// `{{`
	OutputOpen,
	/// `}}`
	OutputClose,
	/// `{%`
	TagOpen,
	/// `%}`
	TagClose,
	/// Raw content between an open and a close marker.
	Code(String),
}

impl Token {
	/// The text carried by [`Token::Text`] and [`Token::Code`], empty for
	/// markers.
	pub fn text(&self) -> &str {
		match self {
			Token::Text(text) | Token::Code(text) => text,
			_ => "",
		}
	}
}

impl Display for Token {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			Token::Text(text) | Token::Code(text) => write!(f, "{text}"),
			Token::OutputOpen => write!(f, "{{{{"),
			Token::OutputClose => write!(f, "}}}}"),
			Token::TagOpen => write!(f, "{{%"),
			Token::TagClose => write!(f, "%}}"),
		}
	}
}

/// A token together with the range of source it was produced from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpannedToken {
	pub token: Token,
	pub position: Position,
}

impl SpannedToken {
	pub fn new(token: Token, position: Position) -> Self {
		Self { token, position }
	}

	pub fn text(&self) -> &str {
		self.token.text()
	}
}
