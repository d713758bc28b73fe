use std::fs;
use std::io::{BufWriter, Write};
use std::path::Path;

use tempfile::NamedTempFile;

use crate::error::LoaderError;

pub fn ensure_parent_dir(path: &Path) -> Result<(), LoaderError> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|err| {
            LoaderError::Filesystem(format!("create {}: {err}", parent.display()))
        })?;
    }
    Ok(())
}

/// Writes new content for `path` into a sibling temp file and moves it over
/// the original only once `write` succeeded.
pub fn replace_file<F>(path: &Path, write: F) -> Result<(), LoaderError>
where
    F: FnOnce(&mut dyn Write) -> Result<(), LoaderError>,
{
    let dir = match path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        Some(parent) => parent,
        None => Path::new("."),
    };
    let temp = NamedTempFile::new_in(dir)
        .map_err(|err| LoaderError::Filesystem(format!("temp file in {}: {err}", dir.display())))?;
    {
        let mut writer = BufWriter::new(temp.as_file());
        write(&mut writer)?;
        writer
            .flush()
            .map_err(|err| LoaderError::Filesystem(err.to_string()))?;
    }
    temp.persist(path)
        .map_err(|err| LoaderError::Filesystem(format!("replace {}: {err}", path.display())))?;
    Ok(())
}
