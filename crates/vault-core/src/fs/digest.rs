//! Content digests for change detection.

use std::fs::File;
use std::io;
use std::path::Path;

/// Compute the blake3 digest of a file as a hex string.
///
/// The file is streamed, so large archives are not loaded in memory.
pub fn hash_file(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = blake3::Hasher::new();
    io::copy(&mut file, &mut hasher)?;
    Ok(hasher.finalize().to_hex().to_string())
}
