use std::io;
use std::path::Path;
use std::path::PathBuf;

use tracing::trace;

use crate::QuillError;
use crate::QuillResult;

/// Find the file for a template identifier.
///
/// An absolute identifier is used as is. A relative one is joined onto each
/// root in order and the first existing file wins. Every root is tried
/// exactly once, so a missing template fails after `roots.len()` attempts.
pub fn resolve(identifier: &str, roots: &[PathBuf]) -> QuillResult<PathBuf> {
	let path = Path::new(identifier);

	if path.is_absolute() {
		trace!(candidate = %path.display(), "resolving absolute template path");
		return match std::fs::metadata(path) {
			Ok(metadata) if metadata.is_file() => Ok(path.to_path_buf()),
			Ok(_) => Err(not_found(identifier, 1, not_a_file())),
			Err(error) => Err(not_found(identifier, 1, error)),
		};
	}

	let mut last_error = None;

	for root in roots {
		let candidate = root.join(path);
		trace!(candidate = %candidate.display(), "trying template candidate");

		match std::fs::metadata(&candidate) {
			Ok(metadata) if metadata.is_file() => return Ok(candidate),
			Ok(_) => last_error = Some(not_a_file()),
			Err(error) => last_error = Some(error),
		}
	}

	let error = last_error.unwrap_or_else(|| io::Error::from(io::ErrorKind::NotFound));
	Err(not_found(identifier, roots.len(), error))
}

fn not_a_file() -> io::Error {
	io::Error::other("not a file")
}

fn not_found(identifier: &str, attempts: usize, source: io::Error) -> QuillError {
	QuillError::NotFound {
		identifier: identifier.to_string(),
		attempts,
		source,
	}
}
