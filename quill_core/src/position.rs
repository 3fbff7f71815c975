use serde::Deserialize;
use serde::Serialize;

/// A single location in template source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Point {
	/// 1-indexed line number.
	pub line: usize,
	/// 1-indexed column number, counted in characters.
	pub column: usize,
	/// 0-indexed byte offset.
	pub offset: usize,
}

impl Default for Point {
	fn default() -> Self {
		Self {
			line: 1,
			column: 1,
			offset: 0,
		}
	}
}

impl Point {
	pub fn new(line: usize, column: usize, offset: usize) -> Self {
		Self {
			line,
			column,
			offset,
		}
	}

	/// Move this point past every character of `text`.
	pub fn advance_str(&mut self, text: &str) {
		for ch in text.chars() {
			self.offset += ch.len_utf8();

			if ch == '\n' {
				self.line += 1;
				self.column = 1;
			} else {
				self.column += 1;
			}
		}
	}
}

/// A range in template source, from `start` (inclusive) to `end` (exclusive).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
	pub start: Point,
	pub end: Point,
}

impl Position {
	pub fn new(
		start_line: usize,
		start_column: usize,
		start_offset: usize,
		end_line: usize,
		end_column: usize,
		end_offset: usize,
	) -> Self {
		Self {
			start: Point::new(start_line, start_column, start_offset),
			end: Point::new(end_line, end_column, end_offset),
		}
	}

	/// A position covering `text` when it starts at `start`.
	pub fn spanning(start: Point, text: &str) -> Self {
		let mut end = start;
		end.advance_str(text);

		Self { start, end }
	}

	/// Extend this position so it also covers `other`.
	#[must_use]
	pub fn to(self, other: Position) -> Self {
		Self {
			start: self.start,
			end: other.end,
		}
	}
}
