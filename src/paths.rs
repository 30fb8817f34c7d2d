//! Cache Filename Resolution
//!
//! String helpers that turn a relative shader filename plus an ordered list of
//! permutation defines into the cache filename of that permutation:
//!
//! ```text
//! shaders/  +  lighting/foo.hlsl  +  ["ALPHA", "FOG"]
//!   => shaders/lighting/foo_ALPHA_FOG.hlsl
//! ```
//!
//! Defines are appended in call order. `["FOG", "ALPHA"]` names a different
//! cache entry than `["ALPHA", "FOG"]`.

use std::path::{Path, PathBuf};

/// Byte offset of the extension dot within `filename`, ignoring dots that
/// belong to directory components.
fn extension_dot(filename: &str) -> Option<usize> {
    let name_start = filename.rfind(['/', '\\']).map_or(0, |i| i + 1);
    filename[name_start..]
        .rfind('.')
        .filter(|&i| i > 0)
        .map(|i| name_start + i)
}

/// Extension without the dot, or `""`.
#[must_use]
pub fn extension(filename: &str) -> &str {
    extension_dot(filename).map_or("", |dot| &filename[dot + 1..])
}

/// `filename` with its extension (and dot) removed.
#[must_use]
pub fn remove_extension(filename: &str) -> &str {
    extension_dot(filename).map_or(filename, |dot| &filename[..dot])
}

/// `filename` with its extension replaced by `ext`.
#[must_use]
pub fn replace_extension(filename: &str, ext: &str) -> String {
    format!("{}.{ext}", remove_extension(filename))
}

/// Directory part of `filename` including the trailing separator, or `""`.
#[must_use]
pub fn directory(filename: &str) -> &str {
    filename
        .rfind(['/', '\\'])
        .map_or("", |i| &filename[..=i])
}

/// Joins a directory prefix and a relative filename with exactly one `/`.
#[must_use]
pub fn join(dir: &str, filename: &str) -> String {
    if dir.is_empty() || dir.ends_with('/') || dir.ends_with('\\') {
        format!("{dir}{filename}")
    } else {
        format!("{dir}/{filename}")
    }
}

/// Resolves the cache filename for one permutation of a shader.
///
/// Pure and deterministic: the same `(shader_path, filename, defines)` always
/// yields the same string. An empty define list only prefixes the directory.
#[must_use]
pub fn resolve_cache_filename<S: AsRef<str>>(
    shader_path: &str,
    filename: &str,
    defines: &[S],
) -> String {
    let full = join(shader_path, filename);
    if defines.is_empty() {
        return full;
    }

    let ext = extension(&full);
    let mut resolved = remove_extension(&full).to_string();
    for define in defines {
        resolved.push('_');
        resolved.push_str(define.as_ref());
    }
    if !ext.is_empty() {
        resolved.push('.');
        resolved.push_str(ext);
    }
    resolved
}

/// Makes `path` absolute against the current directory without touching the
/// filesystem. Falls back to the input if the current directory is unknown.
#[must_use]
pub fn make_absolute(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}
