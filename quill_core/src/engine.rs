use std::sync::Arc;
use std::sync::LazyLock;
use std::sync::PoisonError;
use std::sync::RwLock;

use tracing::debug;
use tracing::warn;

use crate::CacheStats;
use crate::CompiledTemplate;
use crate::Compiler;
use crate::ErrorKind;
use crate::IncludeStack;
use crate::Options;
use crate::QuillResult;
use crate::Registry;
use crate::TemplateCache;
use crate::TemplateIdentity;
use crate::TemplateLoader;
use crate::parse;
use crate::resolve;

/// A registry snapshot together with the templates compiled against it.
///
/// ```
/// use quill_core::Context;
/// use quill_core::Engine;
/// use quill_core::Options;
///
/// let engine = Engine::new(Options::new().allow_errors(true));
/// let template = engine.compile("Hello {{ name|upper }}").unwrap();
/// let context = Context::new().with("name", "quill");
///
/// assert_eq!(template.render(&context).unwrap(), "Hello QUILL");
/// ```
#[derive(Debug)]
pub struct Engine {
	registry: Arc<Registry>,
	cache: TemplateCache,
}

impl Default for Engine {
	fn default() -> Self {
		Self::new(Options::default())
	}
}

impl Engine {
	pub fn new(options: Options) -> Self {
		let registry = Arc::new(Registry::new(options));
		let cache = TemplateCache::new(registry.cache_enabled());

		Self { registry, cache }
	}

	/// Replace the whole configuration and drop every cached template.
	/// Templates compiled before keep rendering with the old configuration.
	pub fn init(&mut self, options: Options) {
		debug!(cached = self.cache.len(), "reinitializing engine");
		*self = Self::new(options);
	}

	pub fn registry(&self) -> &Arc<Registry> {
		&self.registry
	}

	pub fn cache_stats(&self) -> CacheStats {
		self.cache.stats()
	}

	/// Compile template source text.
	///
	/// Under the lenient policy a failure produces a template that renders
	/// the error instead.
	pub fn compile(&self, source: &str) -> QuillResult<Arc<CompiledTemplate>> {
		let identity = TemplateIdentity::from_source(source);
		let result = self.compile_with(identity.clone(), &mut IncludeStack::new(), || {
			Ok(source.to_owned())
		});

		self.apply_policy(identity, result)
	}

	/// Resolve `identifier` against the configured roots (or use it directly
	/// when absolute) and compile the file.
	///
	/// Without file-system access this always fails, whatever the policy.
	pub fn compile_file(&self, identifier: &str) -> QuillResult<Arc<CompiledTemplate>> {
		let result = self.load(identifier, &mut IncludeStack::new());
		self.apply_policy(TemplateIdentity::Unresolved(identifier.to_string()), result)
	}

	/// Return the cached template for `identity`, or read and compile it.
	fn compile_with(
		&self,
		identity: TemplateIdentity,
		stack: &mut IncludeStack,
		read: impl FnOnce() -> QuillResult<String>,
	) -> QuillResult<Arc<CompiledTemplate>> {
		if let Some(template) = self.cache.get(&identity) {
			debug!(%identity, "template cache hit");
			return Ok(template);
		}

		debug!(%identity, depth = stack.depth(), "compiling template");
		stack.enter(identity.clone())?;
		let result = read().and_then(|source| self.build(&source, identity, stack));
		stack.leave();

		result.map(|template| self.cache.insert(Arc::new(template)))
	}

	fn build(
		&self,
		source: &str,
		identity: TemplateIdentity,
		stack: &mut IncludeStack,
	) -> QuillResult<CompiledTemplate> {
		let nodes = parse(source, &self.registry)?;
		let instructions = Compiler::new(&self.registry, self, stack).compile(&nodes)?;

		Ok(CompiledTemplate::new(
			identity,
			Arc::clone(&self.registry),
			instructions,
		))
	}

	fn apply_policy(
		&self,
		identity: TemplateIdentity,
		result: QuillResult<Arc<CompiledTemplate>>,
	) -> QuillResult<Arc<CompiledTemplate>> {
		let error = match result {
			Ok(template) => return Ok(template),
			Err(error) => error,
		};

		if self.registry.policy().is_strict() || error.kind() == ErrorKind::EnvironmentUnsupported {
			return Err(error);
		}

		warn!(%identity, %error, "compilation failed, rendering the error instead");
		Ok(Arc::new(CompiledTemplate::fallback(
			identity,
			Arc::clone(&self.registry),
			&error,
		)))
	}
}

impl TemplateLoader for Engine {
	fn load(
		&self,
		identifier: &str,
		stack: &mut IncludeStack,
	) -> QuillResult<Arc<CompiledTemplate>> {
		self.registry.file_access().ensure()?;

		let path = resolve(identifier, self.registry.roots())?;
		let identity = TemplateIdentity::File(path.clone());

		self.compile_with(identity, stack, || Ok(std::fs::read_to_string(&path)?))
	}
}

static ENGINE: LazyLock<RwLock<Engine>> = LazyLock::new(|| RwLock::new(Engine::default()));

/// Replace the process-wide configuration. The last call wins.
pub fn init(options: Options) {
	ENGINE
		.write()
		.unwrap_or_else(PoisonError::into_inner)
		.init(options);
}

/// Compile source text with the process-wide engine.
pub fn compile(source: &str) -> QuillResult<Arc<CompiledTemplate>> {
	ENGINE
		.read()
		.unwrap_or_else(PoisonError::into_inner)
		.compile(source)
}

/// Compile a template file with the process-wide engine.
pub fn compile_file(identifier: &str) -> QuillResult<Arc<CompiledTemplate>> {
	ENGINE
		.read()
		.unwrap_or_else(PoisonError::into_inner)
		.compile_file(identifier)
}

/// Cache statistics of the process-wide engine.
pub fn cache_stats() -> CacheStats {
	ENGINE
		.read()
		.unwrap_or_else(PoisonError::into_inner)
		.cache_stats()
}
