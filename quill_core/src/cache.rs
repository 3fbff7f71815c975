use std::collections::HashMap;
use std::fmt;
use std::hash::DefaultHasher;
use std::hash::Hash;
use std::hash::Hasher;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::PoisonError;

use serde::Deserialize;
use serde::Serialize;

use crate::CompiledTemplate;

/// What a compiled template is cached under.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TemplateIdentity {
	/// Literal source text, identified by its hash.
	Source(u64),
	/// A template file, identified by its resolved path.
	File(PathBuf),
	/// A file identifier that could not be resolved. Only used for fallback
	/// templates, which are never cached.
	Unresolved(String),
}

impl TemplateIdentity {
	pub fn from_source(source: &str) -> Self {
		let mut hasher = DefaultHasher::new();
		source.hash(&mut hasher);
		Self::Source(hasher.finish())
	}
}

impl fmt::Display for TemplateIdentity {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Source(hash) => write!(f, "<source {hash:016x}>"),
			Self::File(path) => write!(f, "{}", path.display()),
			Self::Unresolved(identifier) => write!(f, "{identifier}"),
		}
	}
}

/// Hit and miss counters for a [`TemplateCache`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
	pub hits: u64,
	pub misses: u64,
	pub entries: usize,
}

#[derive(Debug, Default)]
struct CacheInner {
	templates: HashMap<TemplateIdentity, Arc<CompiledTemplate>>,
	hits: u64,
	misses: u64,
}

/// Compiled templates by identity. Entries are only ever added, or dropped
/// all at once by [`TemplateCache::clear`].
#[derive(Debug)]
pub struct TemplateCache {
	enabled: bool,
	inner: Mutex<CacheInner>,
}

impl Default for TemplateCache {
	fn default() -> Self {
		Self::new(true)
	}
}

impl TemplateCache {
	pub fn new(enabled: bool) -> Self {
		Self {
			enabled,
			inner: Mutex::new(CacheInner::default()),
		}
	}

	pub fn is_enabled(&self) -> bool {
		self.enabled
	}

	/// Look up a template, counting the hit or miss.
	pub fn get(&self, identity: &TemplateIdentity) -> Option<Arc<CompiledTemplate>> {
		if !self.enabled {
			return None;
		}

		let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
		let found = inner.templates.get(identity).cloned();

		if found.is_some() {
			inner.hits = inner.hits.saturating_add(1);
		} else {
			inner.misses = inner.misses.saturating_add(1);
		}

		found
	}

	/// Store `template` unless an entry for its identity already exists, and
	/// return the stored entry.
	pub fn insert(&self, template: Arc<CompiledTemplate>) -> Arc<CompiledTemplate> {
		if !self.enabled {
			return template;
		}

		let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
		inner
			.templates
			.entry(template.identity().clone())
			.or_insert(template)
			.clone()
	}

	pub fn clear(&self) {
		let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
		*inner = CacheInner::default();
	}

	pub fn len(&self) -> usize {
		let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
		inner.templates.len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	pub fn stats(&self) -> CacheStats {
		let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);

		CacheStats {
			hits: inner.hits,
			misses: inner.misses,
			entries: inner.templates.len(),
		}
	}
}
