//! Blocking zip inspection. Callers run these on the blocking pool.

use std::io::{Read, Seek};

use zip::ZipArchive;
use zip::result::ZipError;

use crate::error::ApiError;

/// Read one entry of a published archive.
pub fn read_entry<R: Read + Seek>(reader: R, name: &str) -> Result<Vec<u8>, ApiError> {
    let mut archive = ZipArchive::new(reader)
        .map_err(|e| ApiError::Internal(anyhow::anyhow!("unreadable archive: {e}")))?;
    let mut entry = match archive.by_name(name) {
        Ok(entry) => entry,
        Err(ZipError::FileNotFound) => return Err(ApiError::NotFound(format!("entry {name}"))),
        Err(e) => {
            return Err(ApiError::Internal(anyhow::anyhow!(
                "failed to open entry {name}: {e}"
            )));
        }
    };
    let mut buf = Vec::with_capacity(usize::try_from(entry.size()).unwrap_or(0));
    entry
        .read_to_end(&mut buf)
        .map_err(|e| ApiError::Internal(anyhow::anyhow!("failed to read entry {name}: {e}")))?;
    Ok(buf)
}

/// Check that every entry of an uploaded archive lives under `prefix`.
///
/// Returns the number of entries.
pub fn verify_entry_prefix<R: Read + Seek>(reader: R, prefix: &str) -> Result<usize, ApiError> {
    let archive = ZipArchive::new(reader)
        .map_err(|e| ApiError::BadRequest(format!("upload is not a zip archive: {e}")))?;
    if archive.is_empty() {
        return Err(ApiError::BadRequest("zip archive is empty".into()));
    }
    if let Some(bad) = archive.file_names().find(|name| !name.starts_with(prefix)) {
        return Err(ApiError::BadRequest(format!(
            "zip contains file with bad name: {bad:?} (expected prefix {prefix:?})"
        )));
    }
    Ok(archive.len())
}
