use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use serde_json::Value;

use crate::ErrorPolicy;
use crate::FileAccess;
use crate::Options;
use crate::QuillResult;
use crate::compiler::RawTagInput;
use crate::filters::builtin_filters;
use crate::render::Fragment;
use crate::tags::builtin_tags;

/// Name of the compiler built-in that compiles another template in place.
pub const INCLUDE_TAG: &str = "include";

/// Whether a tag stands alone or delimits a body closed by `end<name>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagKind {
	/// `{% name args %}`
	Standalone,
	/// `{% name args %} … {% endname %}`
	Block,
}

type FilterFn = dyn Fn(&Value, &[Value]) -> QuillResult<Value> + Send + Sync;
type ExtensionFn = dyn Fn(&[Value]) -> Value + Send + Sync;
type SimpleTagFn = dyn Fn(&[Value]) -> Option<String> + Send + Sync;
type RawTagFn = dyn Fn(&RawTagInput<'_>) -> QuillResult<Fragment> + Send + Sync;

/// A named transform applied through `{{ value | name(args) }}`.
#[derive(Clone)]
pub struct Filter(Arc<FilterFn>);

impl Filter {
	pub fn new<F>(filter: F) -> Self
	where
		F: Fn(&Value, &[Value]) -> QuillResult<Value> + Send + Sync + 'static,
	{
		Self(Arc::new(filter))
	}

	pub fn apply(&self, value: &Value, arguments: &[Value]) -> QuillResult<Value> {
		(self.0)(value, arguments)
	}
}

impl fmt::Debug for Filter {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Filter").finish_non_exhaustive()
	}
}

/// A named callable that raw tag fragments invoke while rendering.
#[derive(Clone)]
pub struct Extension(Arc<ExtensionFn>);

impl Extension {
	pub fn new<F>(extension: F) -> Self
	where
		F: Fn(&[Value]) -> Value + Send + Sync + 'static,
	{
		Self(Arc::new(extension))
	}

	pub fn call(&self, arguments: &[Value]) -> Value {
		(self.0)(arguments)
	}
}

impl fmt::Debug for Extension {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Extension").finish_non_exhaustive()
	}
}

/// A tag whose handler runs while rendering. It receives the evaluated tag
/// arguments and a returned string is the whole output of the tag. When the
/// handler returns `None` a block tag renders its body as default content
/// and a standalone tag renders nothing.
#[derive(Clone)]
pub struct SimpleTag {
	kind: TagKind,
	handler: Arc<SimpleTagFn>,
}

impl SimpleTag {
	pub fn new<F>(kind: TagKind, handler: F) -> Self
	where
		F: Fn(&[Value]) -> Option<String> + Send + Sync + 'static,
	{
		Self {
			kind,
			handler: Arc::new(handler),
		}
	}

	pub fn standalone<F>(handler: F) -> Self
	where
		F: Fn(&[Value]) -> Option<String> + Send + Sync + 'static,
	{
		Self::new(TagKind::Standalone, handler)
	}

	pub fn block<F>(handler: F) -> Self
	where
		F: Fn(&[Value]) -> Option<String> + Send + Sync + 'static,
	{
		Self::new(TagKind::Block, handler)
	}

	pub fn kind(&self) -> TagKind {
		self.kind
	}

	pub fn call(&self, arguments: &[Value]) -> Option<String> {
		(self.handler)(arguments)
	}
}

impl fmt::Debug for SimpleTag {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("SimpleTag")
			.field("kind", &self.kind)
			.finish_non_exhaustive()
	}
}

/// A tag with full control over its output. The handler runs once at compile
/// time and returns the [`Fragment`] executed on every render. Anything it
/// needs from the registry (extensions, filters, expressions) is resolved
/// through the [`RawTagInput`] while compiling.
#[derive(Clone)]
pub struct RawTag {
	kind: TagKind,
	handler: Arc<RawTagFn>,
}

impl RawTag {
	pub fn new<F>(kind: TagKind, handler: F) -> Self
	where
		F: Fn(&RawTagInput<'_>) -> QuillResult<Fragment> + Send + Sync + 'static,
	{
		Self {
			kind,
			handler: Arc::new(handler),
		}
	}

	pub fn standalone<F>(handler: F) -> Self
	where
		F: Fn(&RawTagInput<'_>) -> QuillResult<Fragment> + Send + Sync + 'static,
	{
		Self::new(TagKind::Standalone, handler)
	}

	pub fn block<F>(handler: F) -> Self
	where
		F: Fn(&RawTagInput<'_>) -> QuillResult<Fragment> + Send + Sync + 'static,
	{
		Self::new(TagKind::Block, handler)
	}

	pub fn kind(&self) -> TagKind {
		self.kind
	}

	pub fn compile(&self, input: &RawTagInput<'_>) -> QuillResult<Fragment> {
		(self.handler)(input)
	}
}

impl fmt::Debug for RawTag {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("RawTag")
			.field("kind", &self.kind)
			.finish_non_exhaustive()
	}
}

/// What a tag name resolves to.
#[derive(Debug, Clone, Copy)]
pub enum TagEntry<'a> {
	Simple(&'a SimpleTag),
	Raw(&'a RawTag),
	Include,
}

impl TagEntry<'_> {
	pub fn kind(&self) -> TagKind {
		match self {
			Self::Simple(tag) => tag.kind(),
			Self::Raw(tag) => tag.kind(),
			Self::Include => TagKind::Standalone,
		}
	}
}

/// The configuration snapshot that templates are compiled against.
///
/// A registry is built from [`Options`] on top of the built-in filters and
/// tags. It is never modified afterwards: re-initializing builds a new one,
/// and every compiled template keeps the snapshot it was compiled with.
#[derive(Debug)]
pub struct Registry {
	filters: HashMap<String, Filter>,
	raw_tags: HashMap<String, RawTag>,
	simple_tags: HashMap<String, SimpleTag>,
	extensions: HashMap<String, Extension>,
	roots: Vec<PathBuf>,
	policy: ErrorPolicy,
	autoescape: bool,
	cache: bool,
	file_access: FileAccess,
}

impl Default for Registry {
	fn default() -> Self {
		Self::new(Options::default())
	}
}

impl Registry {
	pub fn new(options: Options) -> Self {
		let mut filters: HashMap<String, Filter> = builtin_filters()
			.into_iter()
			.map(|(name, filter)| (name.to_string(), filter))
			.collect();
		filters.extend(options.filters);

		let mut raw_tags: HashMap<String, RawTag> = builtin_tags()
			.into_iter()
			.map(|(name, tag)| (name.to_string(), tag))
			.collect();
		raw_tags.extend(options.tags);

		Self {
			filters,
			raw_tags,
			simple_tags: options.simple_tags,
			extensions: options.extensions,
			roots: options.root.candidates(),
			policy: options.policy,
			autoescape: options.autoescape,
			cache: options.cache,
			file_access: options.file_access,
		}
	}

	pub fn filter(&self, name: &str) -> Option<&Filter> {
		self.filters.get(name)
	}

	pub fn extension(&self, name: &str) -> Option<&Extension> {
		self.extensions.get(name)
	}

	/// Look up a tag: simple tags first, then raw tags, then `include`.
	pub fn tag(&self, name: &str) -> Option<TagEntry<'_>> {
		if let Some(tag) = self.simple_tags.get(name) {
			return Some(TagEntry::Simple(tag));
		}

		if let Some(tag) = self.raw_tags.get(name) {
			return Some(TagEntry::Raw(tag));
		}

		(name == INCLUDE_TAG).then_some(TagEntry::Include)
	}

	pub fn tag_kind(&self, name: &str) -> Option<TagKind> {
		self.tag(name).map(|entry| entry.kind())
	}

	/// Candidate directories for relative template identifiers, in order.
	pub fn roots(&self) -> &[PathBuf] {
		&self.roots
	}

	pub fn policy(&self) -> ErrorPolicy {
		self.policy
	}

	pub fn autoescape(&self) -> bool {
		self.autoescape
	}

	pub fn cache_enabled(&self) -> bool {
		self.cache
	}

	pub fn file_access(&self) -> FileAccess {
		self.file_access
	}
}
