use anyhow::{bail, Result};
use std::path::{Path, PathBuf};

const MAX_KEY_LEN: usize = 1024;

/// Reject keys that could escape the bucket directory: absolute keys,
/// dot / dot-dot components, empty components, control bytes.
pub(crate) fn ensure_key_safe(key: &str) -> Result<()> {
    if key.is_empty() || key.len() > MAX_KEY_LEN {
        bail!("invalid object key");
    }
    if key.starts_with('/')
        || key
            .split('/')
            .any(|part| part.is_empty() || part == "." || part == "..")
    {
        bail!("invalid object key `{key}`");
    }
    if key
        .bytes()
        .any(|b| b.is_ascii_control() || b == b'\\' || b == b'\0')
    {
        bail!("invalid object key `{key}`");
    }
    Ok(())
}

/// Physical path of a key beneath its bucket directory.
pub(crate) fn key_to_path(bucket_root: &Path, key: &str) -> PathBuf {
    let mut path = bucket_root.to_path_buf();
    for part in key.split('/') {
        path.push(part);
    }
    path
}

/// Key of a physical path, forward-slash form.
pub(crate) fn path_to_key(bucket_root: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(bucket_root).ok()?;
    Some(rel.to_string_lossy().replace('\\', "/"))
}
