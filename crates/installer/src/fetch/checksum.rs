//! Download integrity checks
//!
//! Checksums use xxHash64 encoded as base64 of the little-endian digest bytes.

use std::path::Path;

use base64::Engine;
use tokio::fs;
use tokio::io::AsyncReadExt;
use xxhash_rust::xxh64::Xxh64;

const READ_BUFFER: usize = 64 * 1024;

/// Hash a file with xxHash64 and return the base64 digest
pub async fn xxhash64_base64(path: &Path) -> std::io::Result<String> {
    let mut file = fs::File::open(path).await?;
    let mut hasher = Xxh64::new(0);
    let mut buffer = vec![0u8; READ_BUFFER];

    loop {
        let read = file.read(&mut buffer).await?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }

    Ok(encode_digest(hasher.digest()))
}

/// Hash an in-memory buffer the same way as [`xxhash64_base64`]
pub fn xxhash64_base64_bytes(data: &[u8]) -> String {
    encode_digest(xxhash_rust::xxh64::xxh64(data, 0))
}

fn encode_digest(digest: u64) -> String {
    base64::engine::general_purpose::STANDARD.encode(digest.to_le_bytes())
}
