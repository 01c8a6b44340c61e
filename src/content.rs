//! Content addressing
//!
//! SHA-1 over the raw bytes, fed in fixed-size chunks, rendered as 40
//! lowercase hex characters. The digest is both a job's identity and the key
//! its outputs are stored under, so identical outputs land on the same key.

use sha1::{Digest, Sha1};
use std::io::{ErrorKind, Read, Result as IoResult};

/// Bytes fed to the hasher per update
pub const CHUNK_SIZE: usize = 4096;

/// Length of a rendered content hash
pub const HASH_HEX_LEN: usize = 40;

/// Hash an in-memory payload
pub fn content_hash(content: &[u8]) -> String {
    let mut hasher = Sha1::new();
    for chunk in content.chunks(CHUNK_SIZE) {
        hasher.update(chunk);
    }
    format!("{:x}", hasher.finalize())
}

/// Hash everything a reader yields
pub fn hash_reader<R: Read>(mut reader: R) -> IoResult<String> {
    let mut hasher = Sha1::new();
    let mut buffer = [0u8; CHUNK_SIZE];
    loop {
        match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => hasher.update(&buffer[..n]),
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(format!("{:x}", hasher.finalize()))
}

/// True if `s` looks like a rendered content hash
pub fn is_content_hash(s: &str) -> bool {
    s.len() == HASH_HEX_LEN && s.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}
