//! Content addressing: digests, extension normalization, and the sharded
//! `X/YY/<digest>.<ext>` path layout.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::defaults::{CANONICAL_PATH_LEN, DEFAULT_EXTENSION, DIGEST_LEN};
use crate::error::{Error, Result};

/// Deterministic identity of stored bytes: hex digest plus normalized extension.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentFingerprint {
    digest: String,
    extension: String,
}

impl ContentFingerprint {
    /// Build a fingerprint from an already computed digest.
    ///
    /// The digest must be 32 lowercase hex characters.
    pub fn new(digest: impl Into<String>, extension: &str) -> Result<Self> {
        let digest = digest.into();
        if digest.len() != DIGEST_LEN || !digest.bytes().all(is_lower_hex) {
            return Err(Error::InvalidInput(format!("malformed digest: {digest}")));
        }
        Ok(Self {
            digest,
            extension: normalize_extension(extension),
        })
    }

    pub fn digest(&self) -> &str {
        &self.digest
    }

    pub fn extension(&self) -> &str {
        &self.extension
    }

    /// `X/YY` shard directory.
    pub fn shard_dir(&self) -> String {
        shard_dir(&self.digest)
    }

    /// `X/YY/<digest>.<ext>` relative to the namespace directory.
    pub fn rel_path(&self) -> String {
        format!("{}.{}", shard_path(&self.digest), self.extension)
    }
}

impl fmt::Display for ContentFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.digest, self.extension)
    }
}

/// Incremental md5 digest, fed while bytes are copied elsewhere.
pub struct DigestWriter {
    ctx: md5::Context,
    written: u64,
}

impl DigestWriter {
    pub fn new() -> Self {
        Self {
            ctx: md5::Context::new(),
            written: 0,
        }
    }

    pub fn update(&mut self, chunk: &[u8]) {
        self.ctx.consume(chunk);
        self.written += chunk.len() as u64;
    }

    pub fn written(&self) -> u64 {
        self.written
    }

    /// Lowercase hex digest and total byte count.
    pub fn finish(self) -> (String, u64) {
        (format!("{:x}", self.ctx.compute()), self.written)
    }
}

impl Default for DigestWriter {
    fn default() -> Self {
        Self::new()
    }
}

/// Digest of an in-memory buffer.
pub fn digest_bytes(data: &[u8]) -> String {
    format!("{:x}", md5::compute(data))
}

/// `jpeg` and the empty extension both become `jpg`.
pub fn normalize_extension(ext: &str) -> String {
    let ext = ext.trim().trim_start_matches('.').to_ascii_lowercase();
    if ext.is_empty() || ext == "jpeg" {
        DEFAULT_EXTENSION.to_string()
    } else {
        ext
    }
}

/// `X/YY` for a digest. Digests shorter than three characters are returned as-is.
pub fn shard_dir(digest: &str) -> String {
    match (digest.get(0..1), digest.get(1..3)) {
        (Some(a), Some(b)) => format!("{a}/{b}"),
        _ => digest.to_string(),
    }
}

/// `X/YY/<digest>` without extension.
pub fn shard_path(digest: &str) -> String {
    if digest.len() < 3 {
        return digest.to_string();
    }
    format!("{}/{}", shard_dir(digest), digest)
}

/// Strip the extension of the final path element, if any.
pub fn strip_extension(path: &str) -> &str {
    let name_start = path.rfind('/').map(|i| i + 1).unwrap_or(0);
    match path[name_start..].rfind('.') {
        Some(dot) => &path[..name_start + dot],
        None => path,
    }
}

/// Extension of the final path element without the dot.
pub fn extension_of(path: &str) -> &str {
    let name_start = path.rfind('/').map(|i| i + 1).unwrap_or(0);
    match path[name_start..].rfind('.') {
        Some(dot) => &path[name_start + dot + 1..],
        None => "",
    }
}

/// Whether `path` (relative to the storage root, `/`-separated) is exactly a
/// managed object: optional `ns/` prefix, then `X/YY/<32 hex>` plus an
/// optional extension, with `X` and `YY` equal to the digest's own leading
/// characters.
pub fn is_canonical_hash_path(ns: &str, path: &str) -> bool {
    let mut rel = path;
    if !ns.is_empty() && rel.len() > ns.len() {
        rel = rel.get(ns.len() + 1..).unwrap_or("");
    }
    let rel = strip_extension(rel).as_bytes();

    if rel.len() != CANONICAL_PATH_LEN {
        return false;
    }
    if rel[1] != b'/' || rel[4] != b'/' {
        return false;
    }
    if rel[0] != rel[5] || rel[2..4] != rel[6..8] {
        return false;
    }
    rel[5..].iter().copied().all(is_lower_hex)
}

/// First configured non-empty namespace that prefixes `path`, else the
/// public namespace.
pub fn namespace_for_path<'a, S: AsRef<str>>(namespaces: &'a [S], path: &str) -> &'a str {
    namespaces
        .iter()
        .map(AsRef::as_ref)
        .find(|ns| !ns.is_empty() && path.starts_with(ns))
        .unwrap_or("")
}

fn is_lower_hex(c: u8) -> bool {
    c.is_ascii_digit() || (b'a'..=b'f').contains(&c)
}
