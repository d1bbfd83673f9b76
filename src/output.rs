//! Output files and their default locations.

use crate::error::{CitedupError, Result};
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Write `bytes` to a temporary file next to `path`, then rename it into
/// place. A failed write never leaves a partial file at `path`.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let fail = |source| CitedupError::Write {
        path: path.to_path_buf(),
        source,
    };
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };

    let mut tmp = NamedTempFile::new_in(dir).map_err(fail)?;
    tmp.write_all(bytes).map_err(fail)?;
    tmp.as_file().sync_all().map_err(fail)?;
    tmp.persist(path).map_err(|e| fail(e.error))?;
    Ok(())
}

/// `<dir>/<stem><suffix>.<ext>` for the given input.
pub fn sibling_path(input: &Path, suffix: &str, extension: &str) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "document".to_string());
    input.with_file_name(format!("{}{}.{}", stem, suffix, extension))
}

/// Refuse to write over the input document.
pub fn ensure_distinct(input: &Path, output: &Path) -> Result<()> {
    if same_file(input, output) {
        return Err(CitedupError::SameAsInput(output.to_path_buf()));
    }
    Ok(())
}

/// Refuse a report path that is also the annotated copy's path.
pub fn ensure_separate_outputs(report: &Path, out: &Path) -> Result<()> {
    if same_file(report, out) {
        return Err(CitedupError::OutputClash(out.to_path_buf()));
    }
    Ok(())
}

// Neither path may exist yet, so compare their parents when canonicalizing
// the paths themselves fails.
fn same_file(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => return a == b,
        (Ok(_), Err(_)) | (Err(_), Ok(_)) => return false,
        _ => {}
    }
    let parent = |p: &Path| match p.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.canonicalize().ok(),
        _ => Path::new(".").canonicalize().ok(),
    };
    match (parent(a), parent(b)) {
        (Some(da), Some(db)) => da == db && a.file_name() == b.file_name(),
        _ => a == b,
    }
}
