use std::sync::Arc;

use serde_json::Map;
use serde_json::Value;
use tracing::trace;

use crate::Body;
use crate::CompiledTemplate;
use crate::Expr;
use crate::Expression;
use crate::Extension;
use crate::Filter;
use crate::FilterCall;
use crate::Fragment;
use crate::Node;
use crate::Position;
use crate::QuillError;
use crate::QuillResult;
use crate::Registry;
use crate::SimpleTag;
use crate::TagEntry;
use crate::TagNode;
use crate::TemplateIdentity;

/// Filters that mark their output as already safe for HTML.
const SAFE_FILTERS: [&str; 4] = ["safe", "raw", "escape", "e"];

/// One step of a compiled template.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum Instruction {
	Text(String),
	Output(CompiledExpr),
	/// A simple tag invoked with its evaluated arguments. The body of a block
	/// tag only renders when the handler returns nothing.
	SimpleTag {
		tag: SimpleTag,
		arguments: Vec<CompiledExpr>,
		body: Option<Body>,
	},
	/// Logic produced by a raw tag.
	Fragment(Fragment),
	/// An included template rendered with the including template's scope.
	Include(Arc<CompiledTemplate>),
}

/// A filter resolved to its handler with its argument expressions.
#[derive(Debug, Clone)]
struct BoundFilter {
	name: String,
	filter: Filter,
	arguments: Vec<Expr>,
}

/// Filters resolved against a registry, applied left to right.
#[derive(Debug, Clone, Default)]
pub struct FilterChain(Vec<BoundFilter>);

impl FilterChain {
	/// Resolve every call in `calls`. Unknown filter names are reported at
	/// `position`.
	pub fn compile(
		calls: Vec<FilterCall>,
		registry: &Registry,
		position: Position,
	) -> QuillResult<Self> {
		let mut filters = Vec::with_capacity(calls.len());

		for call in calls {
			let Some(filter) = registry.filter(&call.name) else {
				return Err(QuillError::UnknownFilter {
					name: call.name,
					line: position.start.line,
					column: position.start.column,
				});
			};

			filters.push(BoundFilter {
				name: call.name,
				filter: filter.clone(),
				arguments: call.arguments,
			});
		}

		Ok(Self(filters))
	}

	/// Feed `value` through every filter, each output becoming the next
	/// input.
	pub fn apply(&self, mut value: Value, scope: &Map<String, Value>) -> QuillResult<Value> {
		for bound in &self.0 {
			let arguments: Vec<Value> = bound
				.arguments
				.iter()
				.map(|argument| argument.evaluate(scope))
				.collect();
			trace!(filter = %bound.name, "applying filter");
			value = bound.filter.apply(&value, &arguments)?;
		}

		Ok(value)
	}

	/// Whether any filter marks its output as safe for HTML.
	pub fn is_safe(&self) -> bool {
		self.0
			.iter()
			.any(|bound| SAFE_FILTERS.contains(&bound.name.as_str()))
	}

	pub fn len(&self) -> usize {
		self.0.len()
	}

	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}
}

/// An expression whose filter chain was resolved against a registry.
#[derive(Debug, Clone)]
pub struct CompiledExpr {
	base: Expr,
	filters: FilterChain,
}

impl CompiledExpr {
	pub fn compile(
		expression: Expression,
		registry: &Registry,
		position: Position,
	) -> QuillResult<Self> {
		Ok(Self {
			base: expression.base,
			filters: FilterChain::compile(expression.filters, registry, position)?,
		})
	}

	pub fn evaluate(&self, scope: &Map<String, Value>) -> QuillResult<Value> {
		self.filters.apply(self.base.evaluate(scope), scope)
	}

	/// Whether the output of this expression must not be escaped again.
	pub fn is_safe(&self) -> bool {
		self.filters.is_safe()
	}
}

/// Compiles and caches the templates referenced by `include`.
pub trait TemplateLoader {
	fn load(
		&self,
		identifier: &str,
		stack: &mut IncludeStack,
	) -> QuillResult<Arc<CompiledTemplate>>;
}

/// The chain of templates currently being compiled through includes.
#[derive(Debug, Default)]
pub struct IncludeStack(Vec<TemplateIdentity>);

impl IncludeStack {
	pub fn new() -> Self {
		Self::default()
	}

	/// Push `identity`, failing when it is already being compiled.
	pub fn enter(&mut self, identity: TemplateIdentity) -> QuillResult<()> {
		if self.0.contains(&identity) {
			return Err(QuillError::CircularInclude {
				identifier: identity.to_string(),
			});
		}

		self.0.push(identity);
		Ok(())
	}

	pub fn leave(&mut self) {
		self.0.pop();
	}

	pub fn depth(&self) -> usize {
		self.0.len()
	}
}

/// What a raw tag receives while its template is compiled.
#[derive(Debug)]
pub struct RawTagInput<'a> {
	name: &'a str,
	raw_arguments: &'a str,
	arguments: &'a [String],
	body: Option<Body>,
	position: Position,
	registry: &'a Registry,
}

impl<'a> RawTagInput<'a> {
	pub fn name(&self) -> &'a str {
		self.name
	}

	/// The arguments split on whitespace outside quotes and brackets.
	pub fn arguments(&self) -> &'a [String] {
		self.arguments
	}

	pub fn raw_arguments(&self) -> &'a str {
		self.raw_arguments
	}

	/// The compiled body of a block tag. Standalone tags have none.
	pub fn body(&self) -> Option<&Body> {
		self.body.as_ref()
	}

	pub fn position(&self) -> Position {
		self.position
	}

	/// Resolve an extension once, at compile time.
	pub fn extension(&self, name: &str) -> QuillResult<Extension> {
		self.registry
			.extension(name)
			.cloned()
			.ok_or_else(|| QuillError::UnknownExtension(name.to_string()))
	}

	pub fn filter(&self, name: &str) -> QuillResult<Filter> {
		self.registry
			.filter(name)
			.cloned()
			.ok_or_else(|| QuillError::UnknownFilter {
				name: name.to_string(),
				line: self.position.start.line,
				column: self.position.start.column,
			})
	}

	/// Compile an expression written in this tag's arguments.
	pub fn compile_expression(&self, source: &str) -> QuillResult<CompiledExpr> {
		compile_expression(source, self.registry, self.position)
	}

	/// Compile a bare filter chain such as `upper | replace("a", "b")`.
	pub fn compile_filter_chain(&self, source: &str) -> QuillResult<FilterChain> {
		let calls = Expression::parse_filter_chain(source).map_err(|message| {
			QuillError::InvalidExpression {
				message,
				line: self.position.start.line,
				column: self.position.start.column,
			}
		})?;

		FilterChain::compile(calls, self.registry, self.position)
	}

	/// An error pointing at this tag.
	pub fn invalid_arguments(&self, reason: impl Into<String>) -> QuillError {
		QuillError::InvalidTagArguments {
			name: self.name.to_string(),
			reason: reason.into(),
			line: self.position.start.line,
			column: self.position.start.column,
		}
	}
}

fn compile_expression(
	source: &str,
	registry: &Registry,
	position: Position,
) -> QuillResult<CompiledExpr> {
	let expression = Expression::parse(source).map_err(|message| {
		QuillError::InvalidExpression {
			message,
			line: position.start.line,
			column: position.start.column,
		}
	})?;

	CompiledExpr::compile(expression, registry, position)
}

/// Turns a parsed node tree into instructions using one registry snapshot.
pub struct Compiler<'a> {
	registry: &'a Registry,
	loader: &'a dyn TemplateLoader,
	stack: &'a mut IncludeStack,
}

impl<'a> Compiler<'a> {
	pub fn new(
		registry: &'a Registry,
		loader: &'a dyn TemplateLoader,
		stack: &'a mut IncludeStack,
	) -> Self {
		Self {
			registry,
			loader,
			stack,
		}
	}

	pub fn compile(&mut self, nodes: &[Node]) -> QuillResult<Vec<Instruction>> {
		let mut instructions = Vec::with_capacity(nodes.len());

		for node in nodes {
			let instruction = match node {
				Node::Text(text) => Instruction::Text(text.clone()),
				Node::Output(output) => {
					Instruction::Output(CompiledExpr::compile(
						output.expression.clone(),
						self.registry,
						output.position,
					)?)
				}
				Node::Tag(tag) => self.compile_tag(tag)?,
			};

			instructions.push(instruction);
		}

		Ok(instructions)
	}

	fn compile_tag(&mut self, node: &TagNode) -> QuillResult<Instruction> {
		let Some(entry) = self.registry.tag(&node.name) else {
			return Err(QuillError::UnknownTag {
				name: node.name.clone(),
				line: node.position.start.line,
				column: node.position.start.column,
			});
		};

		match entry {
			TagEntry::Simple(tag) => {
				let arguments = node
					.arguments
					.iter()
					.map(|argument| compile_expression(argument, self.registry, node.position))
					.collect::<QuillResult<Vec<_>>>()?;

				let body = if node.is_block {
					Some(Body::new(self.compile(&node.children)?))
				} else {
					None
				};

				Ok(Instruction::SimpleTag {
					tag: tag.clone(),
					arguments,
					body,
				})
			}
			TagEntry::Raw(tag) => {
				let body = if node.is_block {
					Some(Body::new(self.compile(&node.children)?))
				} else {
					None
				};

				let input = RawTagInput {
					name: &node.name,
					raw_arguments: &node.raw_arguments,
					arguments: &node.arguments,
					body,
					position: node.position,
					registry: self.registry,
				};

				Ok(Instruction::Fragment(tag.compile(&input)?))
			}
			TagEntry::Include => {
				let Some(identifier) = node.literal_argument() else {
					return Err(QuillError::InvalidTagArguments {
						name: node.name.clone(),
						reason: "expected a quoted template identifier".into(),
						line: node.position.start.line,
						column: node.position.start.column,
					});
				};

				let template = self.loader.load(&identifier, self.stack)?;
				Ok(Instruction::Include(template))
			}
		}
	}
}
