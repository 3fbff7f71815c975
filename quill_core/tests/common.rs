use std::path::PathBuf;

use quill_core::Context;
use serde_json::Value;

/// The directory holding the template fixtures.
pub fn templates_dir() -> PathBuf {
	PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/templates")
}

pub fn context(value: Value) -> Context {
	Context::try_from(value).unwrap_or_else(|e| panic!("context: {e}"))
}
