use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;

use serde_json::Value;

use crate::Context;
use crate::Engine;
use crate::Fragment;
use crate::Options;
use crate::QuillResult;
use crate::RawTag;
use crate::stringify;

/// Options that return every failure to the caller.
pub fn strict() -> Options {
	Options::new().allow_errors(true)
}

pub fn strict_engine() -> Engine {
	Engine::new(strict())
}

pub fn lenient_engine() -> Engine {
	Engine::new(Options::new().allow_errors(false))
}

/// Build a context from a JSON object literal.
pub fn context(value: Value) -> Context {
	Context::try_from(value).unwrap_or_else(|e| panic!("context: {e}"))
}

/// Compile and render `source` with `engine`.
pub fn render_with(engine: &Engine, source: &str, data: Value) -> QuillResult<String> {
	engine.compile(source)?.render(&context(data))
}

/// Compile and render `source` with a strict engine and the default options.
pub fn render(source: &str, data: Value) -> QuillResult<String> {
	render_with(&strict_engine(), source, data)
}

pub fn write_template(dir: &Path, name: &str, content: &str) -> PathBuf {
	let path = dir.join(name);

	if let Some(parent) = path.parent() {
		std::fs::create_dir_all(parent).unwrap_or_else(|e| panic!("create dir: {e}"));
	}

	std::fs::write(&path, content).unwrap_or_else(|e| panic!("write: {e}"));
	path
}

/// A raw tag that calls the `name` extension on every render and writes its
/// result.
pub fn extension_tag(name: &'static str) -> RawTag {
	RawTag::standalone(move |input| {
		let extension = input.extension(name)?;

		Ok(Fragment::new(move |state| {
			let value = extension.call(&[]);
			state.write(&stringify(&value));
			Ok(())
		}))
	})
}

/// An extension that counts its calls.
pub fn counting_extension(
	counter: &Arc<AtomicUsize>,
) -> impl Fn(&[Value]) -> Value + Send + Sync + 'static {
	let counter = Arc::clone(counter);

	move |_| {
		counter.fetch_add(1, Ordering::SeqCst);
		Value::Null
	}
}
