//! `quill_core` compiles text templates into reusable render procedures.
//! Templates mix literal markup with `{{ output }}` markers, `{% tag %}`
//! markers and `{# comments #}`.
//!
//! ## Processing Pipeline
//!
//! ```text
//! Template source (literal text or a file found through the roots)
//!   → Lexer (splits text runs from output and tag markers)
//!   → Parser (builds the node tree, matches block tags to `end<name>`)
//!   → Compiler (resolves filters, tags and extensions against the Registry)
//!   → Cache (keyed by source hash or resolved path)
//!   → CompiledTemplate::render(context)
//! ```
//!
//! ## Extension Points
//!
//! - [`Filter`]: `{{ value | name(args) }}` transforms, applied left to right.
//! - [`SimpleTag`]: called while rendering with the evaluated arguments. Its
//!   return value is the whole output of the tag. A block tag returning
//!   `None` renders its body instead.
//! - [`RawTag`]: called once while compiling. It returns a [`Fragment`] that
//!   runs on every render and may call [`Extension`]s resolved at compile
//!   time.
//!
//! Every tag is registered as [`TagKind::Standalone`] or [`TagKind::Block`].
//!
//! ## Error Policy
//!
//! With [`ErrorPolicy::Strict`] (`allow_errors(true)`) compile and render
//! failures are returned to the caller. With [`ErrorPolicy::Lenient`], the
//! default, they become a template that renders `<pre>Error: …</pre>`.
//! Compiling files where no file system exists always fails.
//!
//! ## Quick Start
//!
//! ```rust
//! use quill_core::Context;
//! use quill_core::Options;
//! use quill_core::SimpleTag;
//!
//! quill_core::init(
//! 	Options::new()
//! 		.filter("shout", |value, _| {
//! 			Ok(format!("{}!", quill_core::stringify(value)).into())
//! 		})
//! 		.simple_tag("year", SimpleTag::standalone(|_| Some("2024".into())))
//! 		.allow_errors(true),
//! );
//!
//! let template = quill_core::compile("{{ name|shout }} {% year %}").unwrap();
//! let output = template
//! 	.render(&Context::new().with("name", "hello"))
//! 	.unwrap();
//!
//! assert_eq!(output, "hello! 2024");
//! ```

pub use cache::*;
pub use compiler::*;
pub use config::*;
pub use engine::*;
pub use error::*;
pub use expression::*;
pub use parser::*;
pub use position::*;
pub use registry::*;
pub use render::*;
pub use resolver::*;
pub use template::*;
pub use value::*;

mod cache;
mod compiler;
pub mod config;
mod engine;
#[allow(unused_assignments)]
mod error;
mod expression;
mod filters;
pub(crate) mod lexer;
mod parser;
mod position;
mod registry;
mod render;
mod resolver;
mod tags;
mod template;
pub(crate) mod tokens;
mod value;

#[cfg(test)]
mod __fixtures;
#[cfg(test)]
mod __tests;
