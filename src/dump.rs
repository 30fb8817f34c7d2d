//! Shader Dump
//!
//! A read-only `cache filename → bytecode` map consulted before anything
//! touches the disk. Shipped builds embed their precompiled shaders with
//! `rust-embed` and hand the resulting dump to the loader:
//!
//! ```rust,ignore
//! #[derive(rust_embed::RustEmbed)]
//! #[folder = "shaders/dump/"]
//! struct Dump;
//!
//! let dump = ShaderDump::from_embedded::<Dump>("shaders/spirv/");
//! let loader = ShaderLoader::new(device, settings).with_dump(Arc::new(dump));
//! ```
//!
//! Keys always use `/` separators, matching the strings produced by
//! [`resolve_cache_filename`](crate::paths::resolve_cache_filename).

use std::borrow::Cow;
use std::fs;
use std::path::Path;

use rust_embed::RustEmbed;
use rustc_hash::FxHashMap;

use crate::errors::Result;
use crate::paths;

fn normalize(key: &str) -> Cow<'_, str> {
    if key.contains('\\') {
        Cow::Owned(key.replace('\\', "/"))
    } else {
        Cow::Borrowed(key)
    }
}

/// Immutable set of precompiled shader binaries.
#[derive(Debug, Default, Clone)]
pub struct ShaderDump {
    entries: FxHashMap<String, Cow<'static, [u8]>>,
}

impl ShaderDump {
    #[must_use]
    pub fn from_entries<K, V>(entries: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: AsRef<str>,
        V: Into<Cow<'static, [u8]>>,
    {
        Self {
            entries: entries
                .into_iter()
                .map(|(key, data)| (normalize(key.as_ref()).into_owned(), data.into()))
                .collect(),
        }
    }

    /// Loads every file below `root`. Keys are `prefix` joined with the
    /// root-relative path.
    pub fn from_dir(root: &Path, prefix: &str) -> Result<Self> {
        let mut entries = FxHashMap::default();
        let mut pending = vec![root.to_path_buf()];

        while let Some(dir) = pending.pop() {
            for entry in fs::read_dir(&dir)? {
                let path = entry?.path();
                if path.is_dir() {
                    pending.push(path);
                    continue;
                }
                let Ok(relative) = path.strip_prefix(root) else {
                    continue;
                };
                let key = paths::join(prefix, &normalize(&relative.to_string_lossy()));
                entries.insert(key, Cow::Owned(fs::read(&path)?));
            }
        }

        log::info!(
            "loaded shader dump from {}: {} entries",
            root.display(),
            entries.len()
        );
        Ok(Self { entries })
    }

    /// Builds a dump from a `rust-embed` folder. Keys are `prefix` joined with
    /// the embedded file names.
    #[must_use]
    pub fn from_embedded<E: RustEmbed>(prefix: &str) -> Self {
        let entries: FxHashMap<_, _> = E::iter()
            .filter_map(|name| {
                let file = E::get(&name)?;
                Some((paths::join(prefix, &normalize(&name)), file.data))
            })
            .collect();
        Self { entries }
    }

    /// Bytecode stored under `cache_filename`.
    #[must_use]
    pub fn get(&self, cache_filename: &str) -> Option<&[u8]> {
        self.entries
            .get(normalize(cache_filename).as_ref())
            .map(AsRef::as_ref)
    }

    #[must_use]
    pub fn contains(&self, cache_filename: &str) -> bool {
        self.entries.contains_key(normalize(cache_filename).as_ref())
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
