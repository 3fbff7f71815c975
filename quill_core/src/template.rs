use std::sync::Arc;

use derive_more::Deref;
use derive_more::DerefMut;
use serde::Serialize;
use serde_json::Map;
use serde_json::Value;
use tracing::warn;

use crate::Body;
use crate::ErrorPolicy;
use crate::Instruction;
use crate::QuillError;
use crate::QuillResult;
use crate::Registry;
use crate::RenderState;
use crate::TemplateIdentity;
use crate::escape_html;

/// The data a template is rendered with.
#[derive(Debug, Clone, Default, PartialEq, Deref, DerefMut)]
pub struct Context(Map<String, Value>);

impl Context {
	pub fn new() -> Self {
		Self::default()
	}

	/// Build a context from anything that serializes to a JSON object.
	pub fn from_serialize(value: &impl Serialize) -> QuillResult<Self> {
		let value =
			serde_json::to_value(value).map_err(|e| QuillError::InvalidContext(e.to_string()))?;
		Self::try_from(value)
	}

	#[must_use]
	pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
		self.0.insert(name.into(), value.into());
		self
	}

	pub fn into_inner(self) -> Map<String, Value> {
		self.0
	}
}

impl From<Map<String, Value>> for Context {
	fn from(map: Map<String, Value>) -> Self {
		Self(map)
	}
}

impl TryFrom<Value> for Context {
	type Error = QuillError;

	/// Objects become the context and null becomes an empty one.
	fn try_from(value: Value) -> Result<Self, Self::Error> {
		match value {
			Value::Object(map) => Ok(Self(map)),
			Value::Null => Ok(Self::default()),
			Value::Bool(_) => Err(QuillError::InvalidContext("a boolean".into())),
			Value::Number(_) => Err(QuillError::InvalidContext("a number".into())),
			Value::String(_) => Err(QuillError::InvalidContext("a string".into())),
			Value::Array(_) => Err(QuillError::InvalidContext("an array".into())),
		}
	}
}

/// A template ready to render.
///
/// It keeps the registry snapshot it was compiled against, so initializing
/// the engine again never changes how an existing template renders. Rendering
/// only reads shared data, which makes a template safe to render from many
/// threads at once.
#[derive(Debug)]
pub struct CompiledTemplate {
	identity: TemplateIdentity,
	policy: ErrorPolicy,
	registry: Arc<Registry>,
	body: Body,
}

impl CompiledTemplate {
	pub fn new(
		identity: TemplateIdentity,
		registry: Arc<Registry>,
		instructions: Vec<Instruction>,
	) -> Self {
		Self {
			identity,
			policy: registry.policy(),
			registry,
			body: Body::new(instructions),
		}
	}

	/// A template that renders the description of `error`.
	pub fn fallback(identity: TemplateIdentity, registry: Arc<Registry>, error: &QuillError) -> Self {
		Self::new(identity, registry, vec![Instruction::Text(error_block(error))])
	}

	pub fn identity(&self) -> &TemplateIdentity {
		&self.identity
	}

	/// The policy of the registry this template was compiled with.
	pub fn policy(&self) -> ErrorPolicy {
		self.policy
	}

	pub fn registry(&self) -> &Arc<Registry> {
		&self.registry
	}

	pub fn body(&self) -> &Body {
		&self.body
	}

	/// Render with `context`.
	///
	/// Under [`ErrorPolicy::Lenient`] a failing filter or tag produces the
	/// error block instead of an error, so this never returns `Err`.
	pub fn render(&self, context: &Context) -> QuillResult<String> {
		let mut state = RenderState::new(context.0.clone(), self.registry.autoescape());

		match self.body.execute(&mut state) {
			Ok(()) => Ok(state.into_output()),
			Err(error) if !self.policy.is_strict() => {
				warn!(identity = %self.identity, %error, "rendering failed, emitting error block");
				Ok(error_block(&error))
			}
			Err(error) => Err(error),
		}
	}

	/// Render without data, as if given an empty context.
	pub fn render_empty(&self) -> QuillResult<String> {
		self.render(&Context::new())
	}
}

/// The block rendered in place of a template that failed under the lenient
/// policy.
pub fn error_block(error: &QuillError) -> String {
	format!("<pre>Error: {}</pre>", escape_html(&error.to_string()))
}
