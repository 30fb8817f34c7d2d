//! Cache Writer
//!
//! Persists compiled bytecode next to a JSON sidecar describing the files it
//! was built from:
//!
//! ```text
//! shaders/spirv/foo_ALPHA.cso              ← bytecode
//! shaders/spirv/foo_ALPHA.cso.shadermeta   ← ShaderMetadata (JSON)
//! ```
//!
//! Both files are written to a temporary file in the destination directory
//! and renamed into place, so concurrent readers see either the old contents
//! or the new contents and never a partial write.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use serde::{Deserialize, Serialize};
use xxhash_rust::xxh3::xxh3_128;

use crate::compiler::CompilerOutput;
use crate::errors::{Result, ShaderError};
use crate::types::ShaderFormat;

/// Appended to the cache filename to name the sidecar.
pub const METADATA_EXTENSION: &str = "shadermeta";

/// Bumped whenever the sidecar layout changes.
pub const METADATA_VERSION: u32 = 1;

/// Sidecar path for a cache filename.
#[must_use]
pub fn metadata_path(cache_filename: &str) -> PathBuf {
    PathBuf::from(format!("{cache_filename}.{METADATA_EXTENSION}"))
}

// ─── Metadata ────────────────────────────────────────────────────────────────

/// Recorded state of one file that influenced a compile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyRecord {
    pub path: PathBuf,
    pub size: u64,
    /// Modification time in nanoseconds since the Unix epoch.
    pub modified_ns: u64,
    /// xxh3-128 of the contents, lowercase hex.
    pub hash: String,
}

fn modified_ns(meta: &fs::Metadata) -> u64 {
    meta.modified()
        .ok()
        .and_then(|time| time.duration_since(UNIX_EPOCH).ok())
        .map_or(0, |since| since.as_nanos() as u64)
}

fn hex_hash(bytes: &[u8]) -> String {
    format!("{:032x}", xxh3_128(bytes))
}

impl DependencyRecord {
    /// Snapshots the current on-disk state of `path`.
    pub fn capture(path: &Path) -> Result<Self> {
        let meta = fs::metadata(path)?;
        let contents = fs::read(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            size: meta.len(),
            modified_ns: modified_ns(&meta),
            hash: hex_hash(&contents),
        })
    }

    /// Whether the file changed since it was captured.
    ///
    /// Cheap checks first: a missing file or a size change is decisive. A
    /// differing timestamp alone is not, since checkouts and copies touch
    /// mtimes without changing contents; the hash settles it.
    #[must_use]
    pub fn is_modified(&self) -> bool {
        let Ok(meta) = fs::metadata(&self.path) else {
            return true;
        };
        if meta.len() != self.size {
            return true;
        }
        if modified_ns(&meta) == self.modified_ns {
            return false;
        }
        match fs::read(&self.path) {
            Ok(contents) => hex_hash(&contents) != self.hash,
            Err(_) => true,
        }
    }
}

/// Contents of a `.shadermeta` sidecar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShaderMetadata {
    pub version: u32,
    pub format: ShaderFormat,
    /// xxh3-128 of the bytecode, lowercase hex.
    pub hash: String,
    pub dependencies: Vec<DependencyRecord>,
}

impl ShaderMetadata {
    /// Builds metadata for a valid compile output.
    pub fn from_output(format: ShaderFormat, output: &CompilerOutput) -> Result<Self> {
        let dependencies = output
            .dependencies
            .iter()
            .map(|path| DependencyRecord::capture(path))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            version: METADATA_VERSION,
            format,
            hash: format!("{:032x}", output.hash),
            dependencies,
        })
    }

    /// Whether `bytecode` is the binary this sidecar was written for.
    #[must_use]
    pub fn matches_binary(&self, bytecode: &[u8]) -> bool {
        hex_hash(bytecode) == self.hash
    }

    /// First dependency that changed since the compile, if any.
    #[must_use]
    pub fn first_modified_dependency(&self) -> Option<&Path> {
        self.dependencies
            .iter()
            .find(|dep| dep.is_modified())
            .map(|dep| dep.path.as_path())
    }
}

/// Reads the sidecar of `cache_filename`.
///
/// `Ok(None)` when no sidecar exists. A sidecar that fails to parse or was
/// written by another layout version is an error.
pub fn read_metadata(cache_filename: &str) -> Result<Option<ShaderMetadata>> {
    let path = metadata_path(cache_filename);
    let text = match fs::read_to_string(&path) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let metadata: ShaderMetadata = serde_json::from_str(&text)?;
    if metadata.version != METADATA_VERSION {
        return Err(ShaderError::MetadataVersion {
            found: metadata.version,
            expected: METADATA_VERSION,
        });
    }
    Ok(Some(metadata))
}

// ─── Writing ─────────────────────────────────────────────────────────────────

/// Writes `bytes` to `path` through a temporary sibling file and a rename.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent)?;

    let mut tmp = tempfile::Builder::new()
        .prefix(".shader-cache-")
        .suffix(".tmp")
        .tempfile_in(parent)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| ShaderError::IoError(e.error))?;
    Ok(())
}

/// Persists the bytecode of a valid `output` to `cache_filename` and its
/// dependency metadata to the sidecar.
///
/// The sidecar is written first. A crash in between leaves a sidecar whose
/// hash does not match the binary on disk, which the tracker reports as
/// outdated.
pub fn save_shader_and_metadata(
    cache_filename: &str,
    format: ShaderFormat,
    output: &CompilerOutput,
) -> Result<()> {
    if !output.is_valid() {
        return Err(ShaderError::MissingBinary(cache_filename.to_string()));
    }

    let metadata = ShaderMetadata::from_output(format, output)?;
    let json = serde_json::to_vec_pretty(&metadata)?;

    write_atomic(&metadata_path(cache_filename), &json)?;
    write_atomic(Path::new(cache_filename), output.shader_data())?;

    log::debug!(
        "saved {} ({} bytes, {} dependencies)",
        cache_filename,
        output.shader_size(),
        metadata.dependencies.len()
    );
    Ok(())
}
