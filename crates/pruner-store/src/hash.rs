use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::Path;

use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;

use crate::error::{CatalogError, CatalogResult};

/// Lowercase hex SHA-256 of an in-memory buffer.
pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Lowercase hex SHA-256 of a file, streamed in fixed-size chunks.
pub fn compute_sha256(path: &Path) -> std::io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 32 * 1024];
    loop {
        let read = file.read(&mut buf)?;
        if read == 0 {
            break;
        }
        hasher.update(&buf[..read]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Replaces `dest` with `bytes` so readers see either the old or the new file.
///
/// The data is written to a uniquely named sibling and renamed over `dest`.
pub fn atomic_write(dest: &Path, bytes: &[u8]) -> CatalogResult<()> {
    let parent = dest.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent).map_err(|err| CatalogError::io(parent, err))?;
    let mut tmp = tempfile::Builder::new()
        .prefix(".pruner-")
        .suffix(".tmp")
        .tempfile_in(parent)
        .map_err(|err| CatalogError::io(parent, err))?;
    write_and_sync(&mut tmp, bytes).map_err(|err| CatalogError::io(tmp.path().to_path_buf(), err))?;
    tmp.persist(dest)
        .map_err(|err| CatalogError::io(dest, err.error))?;
    tracing::debug!(path = %dest.display(), bytes = bytes.len(), "atomic write");
    Ok(())
}

fn write_and_sync(tmp: &mut NamedTempFile, bytes: &[u8]) -> std::io::Result<()> {
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()
}
