use std::fmt;
use std::sync::Arc;

use serde_json::Map;
use serde_json::Value;

use crate::CompiledExpr;
use crate::Instruction;
use crate::QuillResult;
use crate::escape_html;
use crate::stringify;

type FragmentFn = dyn Fn(&mut RenderState) -> QuillResult<()> + Send + Sync;

/// Render logic produced by a raw tag at compile time.
#[derive(Clone)]
pub struct Fragment(Arc<FragmentFn>);

impl Fragment {
	pub fn new<F>(fragment: F) -> Self
	where
		F: Fn(&mut RenderState) -> QuillResult<()> + Send + Sync + 'static,
	{
		Self(Arc::new(fragment))
	}

	/// A fragment that renders nothing.
	pub fn empty() -> Self {
		Self::new(|_| Ok(()))
	}

	pub fn run(&self, state: &mut RenderState) -> QuillResult<()> {
		(self.0)(state)
	}
}

impl fmt::Debug for Fragment {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Fragment").finish_non_exhaustive()
	}
}

/// A compiled sequence of instructions, shared between every template and
/// fragment that renders it.
#[derive(Debug, Clone, Default)]
pub struct Body(Arc<[Instruction]>);

impl Body {
	pub fn new(instructions: Vec<Instruction>) -> Self {
		Self(instructions.into())
	}

	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}

	pub fn instructions(&self) -> &[Instruction] {
		&self.0
	}

	/// Run every instruction in order against `state`.
	pub fn execute(&self, state: &mut RenderState) -> QuillResult<()> {
		for instruction in self.0.iter() {
			match instruction {
				Instruction::Text(text) => state.write(text),
				Instruction::Output(expression) => state.write_expression(expression)?,
				Instruction::SimpleTag {
					tag,
					arguments,
					body,
				} => {
					let arguments = arguments
						.iter()
						.map(|argument| state.evaluate(argument))
						.collect::<QuillResult<Vec<_>>>()?;

					match (tag.call(&arguments), body) {
						(Some(output), _) => state.write(&output),
						(None, Some(body)) => body.execute(state)?,
						(None, None) => {}
					}
				}
				Instruction::Fragment(fragment) => fragment.run(state)?,
				Instruction::Include(template) => template.body().execute(state)?,
			}
		}

		Ok(())
	}
}

/// The mutable state of a single render pass.
///
/// Bindings made with [`RenderState::set`] are visible to everything that
/// renders after them, in source order, for the rest of the pass.
#[derive(Debug)]
pub struct RenderState {
	scope: Map<String, Value>,
	output: String,
	autoescape: bool,
}

impl RenderState {
	pub fn new(scope: Map<String, Value>, autoescape: bool) -> Self {
		Self {
			scope,
			output: String::new(),
			autoescape,
		}
	}

	pub fn get(&self, name: &str) -> Option<&Value> {
		self.scope.get(name)
	}

	pub fn set(&mut self, name: impl Into<String>, value: Value) {
		self.scope.insert(name.into(), value);
	}

	pub fn scope(&self) -> &Map<String, Value> {
		&self.scope
	}

	pub fn write(&mut self, text: &str) {
		self.output.push_str(text);
	}

	pub fn evaluate(&self, expression: &CompiledExpr) -> QuillResult<Value> {
		expression.evaluate(&self.scope)
	}

	/// Evaluate `expression` and write it, escaped when autoescaping is on
	/// and the filter chain has not marked it safe.
	pub fn write_expression(&mut self, expression: &CompiledExpr) -> QuillResult<()> {
		let value = self.evaluate(expression)?;
		let text = stringify(&value);

		if self.autoescape && !expression.is_safe() {
			self.output.push_str(&escape_html(&text));
		} else {
			self.output.push_str(&text);
		}

		Ok(())
	}

	/// Render `body` into this state's output.
	pub fn write_body(&mut self, body: &Body) -> QuillResult<()> {
		body.execute(self)
	}

	/// Render `body` and return its output instead of writing it. Bindings
	/// made inside the body stay visible afterwards.
	pub fn render_body(&mut self, body: &Body) -> QuillResult<String> {
		let outer = std::mem::take(&mut self.output);
		let result = body.execute(self);
		let captured = std::mem::replace(&mut self.output, outer);

		result.map(|()| captured)
	}

	pub fn autoescape(&self) -> bool {
		self.autoescape
	}

	pub fn set_autoescape(&mut self, autoescape: bool) {
		self.autoescape = autoescape;
	}

	pub fn into_output(self) -> String {
		self.output
	}
}
