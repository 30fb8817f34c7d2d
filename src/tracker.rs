//! Outdated-Shader Tracker
//!
//! Knows which cache filenames the process has asked for and decides whether
//! each cached binary still matches its sources. The dependency state itself
//! lives in the sidecar written by [`save_shader_and_metadata`], so the
//! tracker stays a plain set of names and survives restarts for free.
//!
//! [`save_shader_and_metadata`]: crate::cache::save_shader_and_metadata

use std::fs;

use parking_lot::RwLock;
use rustc_hash::FxHashSet;

use crate::cache::read_metadata;
use crate::types::ShaderFormat;

/// Registry of cache filenames with staleness checks.
///
/// Shared between loaders and tooling through an `Arc`.
#[derive(Debug, Default)]
pub struct OutdatedTracker {
    registered: RwLock<FxHashSet<String>>,
}

impl OutdatedTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `filename` to the tracked set. Returns `false` if it was already
    /// tracked, in which case nothing changes.
    pub fn register_shader(&self, filename: &str) -> bool {
        if self.registered.read().contains(filename) {
            return false;
        }
        self.registered.write().insert(filename.to_string())
    }

    #[must_use]
    pub fn is_registered(&self, filename: &str) -> bool {
        self.registered.read().contains(filename)
    }

    #[must_use]
    pub fn registered_shader_count(&self) -> usize {
        self.registered.read().len()
    }

    /// Whether the cache entry for `filename` must be rebuilt.
    ///
    /// True when the name was never registered, the binary is missing, the
    /// sidecar is unreadable, the binary no longer matches the hash in the
    /// sidecar, or any recorded dependency changed. A binary without a sidecar
    /// is trusted as is.
    #[must_use]
    pub fn is_shader_outdated(&self, filename: &str) -> bool {
        self.check_outdated(filename, None)
    }

    /// Like [`is_shader_outdated`](Self::is_shader_outdated), and also true
    /// when the sidecar says the binary was built for another format.
    #[must_use]
    pub fn is_shader_outdated_for(&self, filename: &str, format: ShaderFormat) -> bool {
        self.check_outdated(filename, Some(format))
    }

    /// True if any registered shader is outdated.
    #[must_use]
    pub fn check_registered_shaders_outdated(&self) -> bool {
        self.snapshot()
            .iter()
            .any(|filename| self.is_shader_outdated(filename))
    }

    /// Registered shaders that are currently outdated, sorted by name.
    #[must_use]
    pub fn outdated_shaders(&self) -> Vec<String> {
        let mut outdated: Vec<String> = self
            .snapshot()
            .into_iter()
            .filter(|filename| self.is_shader_outdated(filename))
            .collect();
        outdated.sort_unstable();
        outdated
    }

    fn check_outdated(&self, filename: &str, format: Option<ShaderFormat>) -> bool {
        if !self.is_registered(filename) {
            return true;
        }
        let binary = match fs::read(filename) {
            Ok(binary) => binary,
            Err(_) => return true,
        };

        let metadata = match read_metadata(filename) {
            Ok(Some(metadata)) => metadata,
            Ok(None) => return false,
            Err(e) => {
                log::warn!("shader metadata unreadable for {filename}: {e}");
                return true;
            }
        };
        if let Some(format) = format
            && metadata.format != format
        {
            log::info!(
                "shader outdated: {filename} (built for {}, need {format})",
                metadata.format
            );
            return true;
        }
        if !metadata.matches_binary(&binary) {
            log::info!("shader outdated: {filename} (binary does not match its metadata)");
            return true;
        }
        if let Some(dep) = metadata.first_modified_dependency() {
            log::info!("shader outdated: {filename} ({} changed)", dep.display());
            return true;
        }
        false
    }

    // File checks run without holding the lock.
    fn snapshot(&self) -> Vec<String> {
        self.registered.read().iter().cloned().collect()
    }
}
