//! Content digest of completed files.
//!
//! MD5 over the full file, stored as lowercase hex. Computed once at
//! completion (off the streaming path) and re-checked during recovery.

use anyhow::{Context, Result};
use md5::{Digest, Md5};
use std::fs::File;
use std::io::Read;
use std::path::Path;

const BUF_SIZE: usize = 64 * 1024;

/// MD5 of the empty input; zero-byte jobs complete with this digest.
pub const EMPTY_DIGEST: &str = "d41d8cd98f00b204e9800998ecf8427e";

/// Compute MD5 of a file and return the digest as lowercase hex.
/// Reads in chunks to keep memory use bounded; suitable for large files.
pub fn md5_path(path: &Path) -> Result<String> {
    let mut f = File::open(path).with_context(|| format!("open {}", path.display()))?;
    let mut hasher = Md5::new();
    let mut buf = [0u8; BUF_SIZE];
    loop {
        let n = f
            .read(&mut buf)
            .with_context(|| format!("read {}", path.display()))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    let digest = hasher.finalize();
    Ok(hex::encode(digest))
}
