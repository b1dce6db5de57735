use std::path::Path;

use crate::foundation::error::{IoResultExt as _, SeqError, SeqResult};

/// Ensure the parent directory of `path` exists.
pub fn ensure_parent_dir(path: &Path) -> SeqResult<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent).at_path(parent)?;
    }
    Ok(())
}

/// Make room for a freshly written output at `path`.
///
/// An existing file is removed when `overwrite` is set and rejected otherwise, so a writer never
/// appends to or silently replaces a stale artifact.
pub fn prepare_destination(path: &Path, overwrite: bool) -> SeqResult<()> {
    ensure_parent_dir(path)?;
    if path.exists() {
        if !overwrite {
            return Err(SeqError::validation(format!(
                "output file '{}' already exists",
                path.display()
            )));
        }
        tracing::debug!(path = %path.display(), "removing existing output");
        std::fs::remove_file(path).at_path(path)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn existing_output_needs_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("out.bnr");

        prepare_destination(&path, false).unwrap();
        std::fs::write(&path, b"stale").unwrap();

        let err = prepare_destination(&path, false).unwrap_err();
        assert!(err.to_string().contains("already exists"));
        assert!(path.exists());

        prepare_destination(&path, true).unwrap();
        assert!(!path.exists());
    }
}
