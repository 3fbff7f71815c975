use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Diagnostic, Error)]
#[non_exhaustive]
pub enum QuillError {
	#[error(transparent)]
	#[diagnostic(code(quill::io_error))]
	Io(#[from] std::io::Error),

	#[error("unclosed `{marker}` opened at {line}:{column}")]
	#[diagnostic(
		code(quill::unclosed_marker),
		help("every `{{{{`, `{{%` and `{{#` needs a matching `}}}}`, `%}}` or `#}}`")
	)]
	UnclosedMarker {
		marker: &'static str,
		line: usize,
		column: usize,
	},

	#[error("invalid token sequence")]
	#[diagnostic(code(quill::invalid_token_sequence))]
	InvalidTokenSequence(usize),

	#[error("invalid expression at {line}:{column}: {message}")]
	#[diagnostic(code(quill::invalid_expression))]
	InvalidExpression {
		message: String,
		line: usize,
		column: usize,
	},

	#[error("empty tag at {line}:{column}")]
	#[diagnostic(code(quill::empty_tag))]
	EmptyTag { line: usize, column: usize },

	#[error("unknown tag `{name}` at {line}:{column}")]
	#[diagnostic(
		code(quill::unknown_tag),
		help("register the tag with `Options::tag` or `Options::simple_tag` before compiling")
	)]
	UnknownTag {
		name: String,
		line: usize,
		column: usize,
	},

	#[error("unexpected end tag `{name}` at {line}:{column}")]
	#[diagnostic(code(quill::unexpected_end_tag))]
	UnexpectedEndTag {
		name: String,
		line: usize,
		column: usize,
	},

	#[error("expected `end{expected}` but found `{found}` at {line}:{column}")]
	#[diagnostic(code(quill::mismatched_end_tag))]
	MismatchedEndTag {
		expected: String,
		found: String,
		line: usize,
		column: usize,
	},

	#[error("missing end tag for block `{name}` opened at {line}:{column}")]
	#[diagnostic(
		code(quill::missing_end_tag),
		help("add `{{% end{name} %}}` to close this block")
	)]
	MissingEndTag {
		name: String,
		line: usize,
		column: usize,
	},

	#[error("invalid arguments for tag `{name}` at {line}:{column}: {reason}")]
	#[diagnostic(code(quill::invalid_tag_arguments))]
	InvalidTagArguments {
		name: String,
		reason: String,
		line: usize,
		column: usize,
	},

	#[error("circular include of `{identifier}`")]
	#[diagnostic(
		code(quill::circular_include),
		help("a template cannot include itself, directly or through other includes")
	)]
	CircularInclude { identifier: String },

	#[error("unknown filter `{name}` at {line}:{column}")]
	#[diagnostic(
		code(quill::unknown_filter),
		help("register the filter with `Options::filter` before compiling")
	)]
	UnknownFilter {
		name: String,
		line: usize,
		column: usize,
	},

	#[error("unknown extension `{0}`")]
	#[diagnostic(
		code(quill::unknown_extension),
		help("register the extension with `Options::extension` before compiling")
	)]
	UnknownExtension(String),

	#[error("template `{identifier}` not found after {attempts} attempt(s): {source}")]
	#[diagnostic(
		code(quill::not_found),
		help("check the configured root(s) or pass an absolute path")
	)]
	NotFound {
		identifier: String,
		attempts: usize,
		source: std::io::Error,
	},

	#[error("file-based compilation is not available in this execution context")]
	#[diagnostic(
		code(quill::environment_unsupported),
		help("compile template source with `compile` instead of `compile_file`")
	)]
	EnvironmentUnsupported,

	#[error("filter `{name}` failed: {reason}")]
	#[diagnostic(code(quill::filter))]
	Filter { name: String, reason: String },

	#[error("render failed: {0}")]
	#[diagnostic(code(quill::render))]
	Render(String),

	#[error("context must be a mapping, got {0}")]
	#[diagnostic(code(quill::invalid_context))]
	InvalidContext(String),

	#[error("failed to parse config file: {0}")]
	#[diagnostic(
		code(quill::config_parse),
		help("check that quill.toml is valid TOML with `root`, `allow_errors`, `autoescape` or `cache` keys")
	)]
	ConfigParse(String),
}

/// The failure classes a [`QuillError`] belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ErrorKind {
	/// Malformed markers, expressions, tag arguments or block nesting.
	Syntax,
	/// A filter, tag or extension name that is not registered.
	Reference,
	/// A template or include absent from every configured root.
	NotFound,
	/// File-based compilation attempted without file-system access.
	EnvironmentUnsupported,
	/// A filter or tag fragment failed while rendering.
	Render,
	/// Reading an already resolved file failed.
	Io,
	/// The configuration file could not be parsed.
	Config,
}

impl QuillError {
	pub fn kind(&self) -> ErrorKind {
		match self {
			Self::Io(_) => ErrorKind::Io,
			Self::UnclosedMarker { .. }
			| Self::InvalidTokenSequence(_)
			| Self::InvalidExpression { .. }
			| Self::EmptyTag { .. }
			| Self::UnknownTag { .. }
			| Self::UnexpectedEndTag { .. }
			| Self::MismatchedEndTag { .. }
			| Self::MissingEndTag { .. }
			| Self::InvalidTagArguments { .. }
			| Self::CircularInclude { .. } => ErrorKind::Syntax,
			Self::UnknownFilter { .. } | Self::UnknownExtension(_) => ErrorKind::Reference,
			Self::NotFound { .. } => ErrorKind::NotFound,
			Self::EnvironmentUnsupported => ErrorKind::EnvironmentUnsupported,
			Self::Filter { .. } | Self::Render(_) | Self::InvalidContext(_) => ErrorKind::Render,
			Self::ConfigParse(_) => ErrorKind::Config,
		}
	}

	/// Build the error a filter returns when it cannot process its input.
	pub fn filter(name: impl Into<String>, reason: impl Into<String>) -> Self {
		Self::Filter {
			name: name.into(),
			reason: reason.into(),
		}
	}
}

pub type QuillResult<T> = Result<T, QuillError>;
pub type AnyError = Box<dyn std::error::Error>;
pub type AnyEmptyResult = Result<(), AnyError>;
pub type AnyResult<T> = Result<T, AnyError>;
