use serde_json::Value;

use crate::Expression;
use crate::Position;
use crate::QuillError;
use crate::QuillResult;
use crate::Registry;
use crate::TagKind;
use crate::lexer::tokenize;
use crate::tokens::SpannedToken;
use crate::tokens::Token;

/// A node of the parsed template tree.
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum Node {
	/// Literal text, emitted unchanged.
	Text(String),
	/// `{{ expression | filter … }}`
	Output(OutputNode),
	/// `{% name arguments %}`, with its children when it is a block tag.
	Tag(TagNode),
}

#[derive(Debug, Clone, PartialEq)]
pub struct OutputNode {
	pub expression: Expression,
	pub position: Position,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TagNode {
	pub name: String,
	/// Everything after the tag name, trimmed.
	pub raw_arguments: String,
	/// `raw_arguments` split on whitespace outside quotes and brackets.
	pub arguments: Vec<String>,
	/// Nodes between the opening tag and its `end<name>` tag.
	pub children: Vec<Node>,
	pub is_block: bool,
	/// From the opening marker to the end marker for block tags.
	pub position: Position,
}

impl TagNode {
	/// The single argument of the tag when it is a string literal, e.g. the
	/// identifier in `{% include "header.html" %}`.
	pub fn literal_argument(&self) -> Option<String> {
		let expression = Expression::parse(&self.raw_arguments).ok()?;

		match expression.as_literal() {
			Some(Value::String(literal)) => Some(literal.clone()),
			_ => None,
		}
	}
}

/// Parse template source into its node tree.
///
/// Tags are classified as standalone or block with the registry, so unknown
/// tag names fail here. Filter names are only checked when compiling.
pub fn parse(source: impl AsRef<str>, registry: &Registry) -> QuillResult<Vec<Node>> {
	let tokens = tokenize(source.as_ref())?;
	build_nodes(&tokens, registry)
}

/// Build the node tree from already tokenized source.
pub(crate) fn build_nodes(tokens: &[SpannedToken], registry: &Registry) -> QuillResult<Vec<Node>> {
	let mut root: Vec<Node> = vec![];
	let mut pending: Vec<TagNode> = vec![];
	let mut index = 0;

	while index < tokens.len() {
		let opening = &tokens[index];

		let (code, closing) = match &opening.token {
			Token::Text(text) => {
				push_node(&mut root, &mut pending, Node::Text(text.clone()));
				index += 1;
				continue;
			}
			Token::OutputOpen | Token::TagOpen => marker_body(tokens, index)?,
			_ => return Err(QuillError::InvalidTokenSequence(index)),
		};

		index += 3;
		let position = opening.position.to(closing.position);

		if opening.token == Token::OutputOpen {
			let expression = Expression::parse(code.text()).map_err(|message| {
				QuillError::InvalidExpression {
					message,
					line: code.position.start.line,
					column: code.position.start.column,
				}
			})?;

			push_node(
				&mut root,
				&mut pending,
				Node::Output(OutputNode {
					expression,
					position,
				}),
			);
			continue;
		}

		let content = code.text().trim();
		let (name, raw_arguments) = content
			.split_once(char::is_whitespace)
			.map_or((content, ""), |(name, rest)| (name, rest.trim()));

		if name.is_empty() {
			return Err(QuillError::EmptyTag {
				line: position.start.line,
				column: position.start.column,
			});
		}

		if let Some(kind) = registry.tag_kind(name) {
			let node = TagNode {
				name: name.to_string(),
				raw_arguments: raw_arguments.to_string(),
				arguments: split_arguments(raw_arguments),
				children: vec![],
				is_block: kind == TagKind::Block,
				position,
			};

			if node.is_block {
				pending.push(node);
			} else {
				push_node(&mut root, &mut pending, Node::Tag(node));
			}

			continue;
		}

		let Some(closed) = name.strip_prefix("end") else {
			return Err(QuillError::UnknownTag {
				name: name.to_string(),
				line: position.start.line,
				column: position.start.column,
			});
		};

		let Some(mut node) = pending.pop() else {
			return Err(QuillError::UnexpectedEndTag {
				name: name.to_string(),
				line: position.start.line,
				column: position.start.column,
			});
		};

		if node.name != closed {
			return Err(QuillError::MismatchedEndTag {
				expected: node.name,
				found: name.to_string(),
				line: position.start.line,
				column: position.start.column,
			});
		}

		node.position = node.position.to(position);
		push_node(&mut root, &mut pending, Node::Tag(node));
	}

	if let Some(node) = pending.pop() {
		return Err(QuillError::MissingEndTag {
			name: node.name,
			line: node.position.start.line,
			column: node.position.start.column,
		});
	}

	Ok(root)
}

/// The code and closing tokens that must follow the opening marker at
/// `index`.
fn marker_body(tokens: &[SpannedToken], index: usize) -> QuillResult<(&SpannedToken, &SpannedToken)> {
	let expected_close = match tokens[index].token {
		Token::OutputOpen => Token::OutputClose,
		_ => Token::TagClose,
	};

	match (tokens.get(index + 1), tokens.get(index + 2)) {
		(Some(code), Some(closing))
			if matches!(code.token, Token::Code(_)) && closing.token == expected_close =>
		{
			Ok((code, closing))
		}
		_ => Err(QuillError::InvalidTokenSequence(index)),
	}
}

fn push_node(root: &mut Vec<Node>, pending: &mut [TagNode], node: Node) {
	match pending.last_mut() {
		Some(parent) => parent.children.push(node),
		None => root.push(node),
	}
}

/// Split tag arguments on whitespace that is outside string literals,
/// brackets and parentheses.
///
/// `foo = bar|replace("a b", "c")` splits into `foo`, `=` and
/// `bar|replace("a b", "c")`.
pub fn split_arguments(raw: &str) -> Vec<String> {
	let mut arguments = vec![];
	let mut current = String::new();
	let mut quote: Option<char> = None;
	let mut escaped = false;
	let mut depth = 0usize;

	for ch in raw.chars() {
		if let Some(delimiter) = quote {
			current.push(ch);

			if escaped {
				escaped = false;
			} else if ch == '\\' {
				escaped = true;
			} else if ch == delimiter {
				quote = None;
			}

			continue;
		}

		match ch {
			'"' | '\'' => {
				quote = Some(ch);
				current.push(ch);
			}
			'(' | '[' => {
				depth += 1;
				current.push(ch);
			}
			')' | ']' => {
				depth = depth.saturating_sub(1);
				current.push(ch);
			}
			ch if ch.is_whitespace() && depth == 0 => {
				if !current.is_empty() {
					arguments.push(std::mem::take(&mut current));
				}
			}
			ch => current.push(ch),
		}
	}

	if !current.is_empty() {
		arguments.push(current);
	}

	arguments
}
