use std::collections::HashMap;
use std::path::Path;
use std::path::PathBuf;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::Extension;
use crate::Filter;
use crate::QuillError;
use crate::QuillResult;
use crate::RawTag;
use crate::SimpleTag;

/// Supported config file locations in discovery order (highest precedence
/// first).
pub const CONFIG_FILE_CANDIDATES: [&str; 3] = ["quill.toml", ".quill.toml", ".config/quill.toml"];

/// Where relative template identifiers are looked up.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Root {
	/// No root configured. The current working directory is the only
	/// candidate.
	#[default]
	Default,
	Single(PathBuf),
	/// Candidates tried in order; the first existing match wins.
	Many(Vec<PathBuf>),
}

impl Root {
	/// The ordered candidate directories. An empty list behaves as an omitted
	/// root.
	pub fn candidates(&self) -> Vec<PathBuf> {
		match self {
			Self::Single(path) => vec![path.clone()],
			Self::Many(paths) if !paths.is_empty() => paths.clone(),
			Self::Default | Self::Many(_) => {
				vec![std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))]
			}
		}
	}
}

impl From<PathBuf> for Root {
	fn from(path: PathBuf) -> Self {
		Self::Single(path)
	}
}

impl From<&Path> for Root {
	fn from(path: &Path) -> Self {
		Self::Single(path.to_path_buf())
	}
}

impl From<&str> for Root {
	fn from(path: &str) -> Self {
		Self::Single(PathBuf::from(path))
	}
}

impl From<String> for Root {
	fn from(path: String) -> Self {
		Self::Single(PathBuf::from(path))
	}
}

impl<P: Into<PathBuf>> From<Vec<P>> for Root {
	fn from(paths: Vec<P>) -> Self {
		Self::Many(paths.into_iter().map(Into::into).collect())
	}
}

impl<P: Into<PathBuf>, const N: usize> From<[P; N]> for Root {
	fn from(paths: [P; N]) -> Self {
		Self::Many(paths.into_iter().map(Into::into).collect())
	}
}

/// How compile, resolve and render failures reach the caller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorPolicy {
	/// Failures are returned as errors and no template is produced.
	Strict,
	/// Failures become a template that renders a `<pre>Error: …</pre>` block.
	#[default]
	Lenient,
}

impl ErrorPolicy {
	/// `allow_errors = true` lets errors propagate to the caller.
	pub fn from_allow_errors(allow_errors: bool) -> Self {
		if allow_errors { Self::Strict } else { Self::Lenient }
	}

	pub fn is_strict(self) -> bool {
		self == Self::Strict
	}
}

/// Whether the execution context can reach a file system.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileAccess {
	Enabled,
	Disabled,
}

impl Default for FileAccess {
	fn default() -> Self {
		Self::detect()
	}
}

impl FileAccess {
	/// Bare `wasm32` targets have no file system; everything else does.
	pub fn detect() -> Self {
		if cfg!(all(target_arch = "wasm32", not(target_os = "wasi"))) {
			Self::Disabled
		} else {
			Self::Enabled
		}
	}

	pub fn ensure(self) -> QuillResult<()> {
		match self {
			Self::Enabled => Ok(()),
			Self::Disabled => Err(QuillError::EnvironmentUnsupported),
		}
	}
}

/// The configuration passed to `init`.
///
/// Every `init` replaces the previous configuration as a whole: anything not
/// set here is absent afterwards, apart from the built-in filters and tags.
///
/// ```
/// use quill_core::Options;
/// use quill_core::SimpleTag;
///
/// let options = Options::new()
/// 	.filter("shout", |value, _| {
/// 		Ok(serde_json::Value::String(format!("{}!", quill_core::stringify(value))))
/// 	})
/// 	.simple_tag("greet", SimpleTag::standalone(|_| Some("hi".into())))
/// 	.root(["templates", "shared"])
/// 	.allow_errors(true);
/// ```
#[derive(Debug, Clone)]
pub struct Options {
	pub(crate) filters: HashMap<String, Filter>,
	pub(crate) tags: HashMap<String, RawTag>,
	pub(crate) simple_tags: HashMap<String, SimpleTag>,
	pub(crate) extensions: HashMap<String, Extension>,
	pub(crate) root: Root,
	pub(crate) policy: ErrorPolicy,
	pub(crate) autoescape: bool,
	pub(crate) cache: bool,
	pub(crate) file_access: FileAccess,
}

impl Default for Options {
	fn default() -> Self {
		Self {
			filters: HashMap::new(),
			tags: HashMap::new(),
			simple_tags: HashMap::new(),
			extensions: HashMap::new(),
			root: Root::Default,
			policy: ErrorPolicy::default(),
			autoescape: true,
			cache: true,
			file_access: FileAccess::detect(),
		}
	}
}

impl Options {
	pub fn new() -> Self {
		Self::default()
	}

	#[must_use]
	pub fn filter<F>(mut self, name: impl Into<String>, filter: F) -> Self
	where
		F: Fn(&Value, &[Value]) -> QuillResult<Value> + Send + Sync + 'static,
	{
		self.filters.insert(name.into(), Filter::new(filter));
		self
	}

	#[must_use]
	pub fn tag(mut self, name: impl Into<String>, tag: RawTag) -> Self {
		self.tags.insert(name.into(), tag);
		self
	}

	#[must_use]
	pub fn simple_tag(mut self, name: impl Into<String>, tag: SimpleTag) -> Self {
		self.simple_tags.insert(name.into(), tag);
		self
	}

	#[must_use]
	pub fn extension<F>(mut self, name: impl Into<String>, extension: F) -> Self
	where
		F: Fn(&[Value]) -> Value + Send + Sync + 'static,
	{
		self.extensions
			.insert(name.into(), Extension::new(extension));
		self
	}

	#[must_use]
	pub fn root(mut self, root: impl Into<Root>) -> Self {
		self.root = root.into();
		self
	}

	/// `true` selects [`ErrorPolicy::Strict`], `false` selects
	/// [`ErrorPolicy::Lenient`].
	#[must_use]
	pub fn allow_errors(self, allow_errors: bool) -> Self {
		self.policy(ErrorPolicy::from_allow_errors(allow_errors))
	}

	#[must_use]
	pub fn policy(mut self, policy: ErrorPolicy) -> Self {
		self.policy = policy;
		self
	}

	#[must_use]
	pub fn autoescape(mut self, autoescape: bool) -> Self {
		self.autoescape = autoescape;
		self
	}

	#[must_use]
	pub fn cache(mut self, cache: bool) -> Self {
		self.cache = cache;
		self
	}

	#[must_use]
	pub fn file_access(mut self, file_access: FileAccess) -> Self {
		self.file_access = file_access;
		self
	}

	/// Load the config file in `dir`, if there is one, and start from its
	/// settings.
	pub fn from_dir(dir: &Path) -> QuillResult<Self> {
		let options = QuillConfig::load(dir)?
			.map_or_else(Self::new, |config| Self::from_config(&config, dir));

		Ok(options)
	}

	/// Start from the settings of a loaded config file. `config_dir` is the
	/// directory relative roots are resolved against.
	pub fn from_config(config: &QuillConfig, config_dir: &Path) -> Self {
		let mut options = Self::new();

		if let Some(root) = &config.root {
			options = options.root(root.resolve(config_dir));
		}

		if let Some(allow_errors) = config.allow_errors {
			options = options.allow_errors(allow_errors);
		}

		if let Some(autoescape) = config.autoescape {
			options = options.autoescape(autoescape);
		}

		if let Some(cache) = config.cache {
			options = options.cache(cache);
		}

		options
	}
}

/// The `root` entry of a config file: a path or an ordered list of paths.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RootSetting {
	Single(PathBuf),
	Many(Vec<PathBuf>),
}

impl RootSetting {
	fn resolve(&self, base: &Path) -> Root {
		match self {
			Self::Single(path) => Root::Single(base.join(path)),
			Self::Many(paths) => Root::Many(paths.iter().map(|path| base.join(path)).collect()),
		}
	}
}

/// Configuration loaded from a `quill.toml` file.
///
/// ```toml
/// root = ["templates", "shared/templates"]
/// allow_errors = true
/// autoescape = false
/// cache = true
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct QuillConfig {
	/// Template root(s), relative to the config file's directory.
	#[serde(default)]
	pub root: Option<RootSetting>,
	#[serde(default)]
	pub allow_errors: Option<bool>,
	#[serde(default)]
	pub autoescape: Option<bool>,
	#[serde(default)]
	pub cache: Option<bool>,
}

impl QuillConfig {
	/// Resolve the first config file path that exists in `dir`, following
	/// [`CONFIG_FILE_CANDIDATES`] order.
	pub fn resolve_path(dir: &Path) -> Option<PathBuf> {
		CONFIG_FILE_CANDIDATES
			.iter()
			.map(|candidate| dir.join(candidate))
			.find(|candidate| candidate.is_file())
	}

	/// Load the config from `dir`. Returns `None` if no config file exists.
	pub fn load(dir: &Path) -> QuillResult<Option<QuillConfig>> {
		let Some(config_path) = Self::resolve_path(dir) else {
			return Ok(None);
		};

		let content = std::fs::read_to_string(&config_path)?;
		let config: QuillConfig =
			toml::from_str(&content).map_err(|e| QuillError::ConfigParse(e.to_string()))?;

		Ok(Some(config))
	}
}
