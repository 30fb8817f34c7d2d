//! Shader Load Orchestrator
//!
//! [`ShaderLoader::load_shader`] turns `(stage, filename, min model, defines)`
//! into a device [`Shader`]. Sources are tried in order and the first success
//! wins:
//!
//! | Step | Source          | On failure                                        |
//! |------|-----------------|---------------------------------------------------|
//! | 1    | shader dump     | logged, fall through                              |
//! | 2    | freshness check | up to date → step 4                               |
//! | 3    | compile         | error count +1, fall through (or `Err` if strict) |
//! | 4    | cached binary   | missing count +1, `Err(MissingBinary)`            |
//!
//! A freshly compiled binary is persisted with its dependency metadata, so the
//! next load of the same permutation short-circuits at step 2.
//!
//! # Threading
//!
//! The loader performs no threading of its own but is `Send + Sync`; a job
//! system may call [`load_shader`](ShaderLoader::load_shader) concurrently.
//! Counters are atomics and the tracker serializes its own updates.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::cache::{read_metadata, save_shader_and_metadata};
use crate::compiler::{CompilerInput, CompilerRegistry};
use crate::device::{GraphicsDevice, Shader};
use crate::dump::ShaderDump;
use crate::errors::{Result, ShaderError};
use crate::paths;
use crate::settings::ShaderLoaderSettings;
use crate::tracker::OutdatedTracker;
use crate::types::{ShaderFormat, ShaderModel, ShaderStage};

/// Used when no backend is registered for the device format, so that the
/// error message still names a plausible source file.
const FALLBACK_SOURCE_EXTENSION: &str = "hlsl";

// ─── Counters ────────────────────────────────────────────────────────────────

/// Failure counters of one loader.
#[derive(Debug, Default)]
pub struct ShaderStats {
    errors: AtomicUsize,
    missing: AtomicUsize,
}

impl ShaderStats {
    /// Compiles that produced no valid output.
    #[inline]
    #[must_use]
    pub fn errors(&self) -> usize {
        self.errors.load(Ordering::Relaxed)
    }

    /// Loads that found no binary to fall back to.
    #[inline]
    #[must_use]
    pub fn missing(&self) -> usize {
        self.missing.load(Ordering::Relaxed)
    }

    /// Zeroes both counters.
    pub fn reset(&self) {
        self.errors.store(0, Ordering::Relaxed);
        self.missing.store(0, Ordering::Relaxed);
    }

    fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    fn record_missing(&self) {
        self.missing.fetch_add(1, Ordering::Relaxed);
    }
}

// ─── Loader ──────────────────────────────────────────────────────────────────

pub struct ShaderLoader {
    device: Arc<dyn GraphicsDevice>,
    compilers: CompilerRegistry,
    tracker: Arc<OutdatedTracker>,
    dump: Option<Arc<ShaderDump>>,
    settings: ShaderLoaderSettings,
    stats: ShaderStats,
}

impl ShaderLoader {
    /// A loader with the default compiler backends and a private tracker.
    #[must_use]
    pub fn new(device: Arc<dyn GraphicsDevice>, settings: ShaderLoaderSettings) -> Self {
        Self {
            device,
            compilers: CompilerRegistry::with_defaults(),
            tracker: Arc::new(OutdatedTracker::new()),
            dump: None,
            settings,
            stats: ShaderStats::default(),
        }
    }

    /// Replaces the compiler backends.
    #[must_use]
    pub fn with_compilers(mut self, compilers: CompilerRegistry) -> Self {
        self.compilers = compilers;
        self
    }

    /// Consults `dump` before anything else.
    #[must_use]
    pub fn with_dump(mut self, dump: Arc<ShaderDump>) -> Self {
        self.dump = Some(dump);
        self
    }

    /// Shares a tracker with other loaders or tooling.
    #[must_use]
    pub fn with_tracker(mut self, tracker: Arc<OutdatedTracker>) -> Self {
        self.tracker = tracker;
        self
    }

    /// Loads one permutation of a shader.
    ///
    /// `filename` is relative to both the binary and source directories; its
    /// extension names the binary (`"objectPS.cso"`) and is swapped for the
    /// backend's source extension when compiling.
    pub fn load_shader<S: AsRef<str>>(
        &self,
        stage: ShaderStage,
        filename: &str,
        min_shader_model: ShaderModel,
        permutation_defines: &[S],
    ) -> Result<Shader> {
        let cache_filename = self.resolve_cache_filename(filename, permutation_defines);

        if let Some(dump) = &self.dump {
            if let Some(bytecode) = dump.get(&cache_filename) {
                return self.create_shader(stage, bytecode, &cache_filename);
            }
            log::info!("shader dump doesn't contain shader: {cache_filename}");
        }

        self.tracker.register_shader(&cache_filename);

        let format = self.device.shader_format();
        if self.tracker.is_shader_outdated_for(&cache_filename, format) {
            let input = self.compiler_input(stage, filename, min_shader_model, permutation_defines);
            log::debug!(
                "compiling shader: {cache_filename} from {}",
                input.source_filename.display()
            );
            let output = self.compilers.compile(&input);

            if output.is_valid() {
                if let Err(e) =
                    save_shader_and_metadata(&cache_filename, input.format, &output)
                {
                    log::error!("failed to save shader {cache_filename}: {e}");
                }
                if !output.error_message.is_empty() {
                    log::warn!("{cache_filename}: {}", output.error_message);
                }
                log::info!("shader compiled: {cache_filename}");
                return self.create_shader(stage, output.shader_data(), &cache_filename);
            }

            log::error!(
                "shader compile FAILED: {cache_filename}\n{}",
                output.error_message
            );
            self.stats.record_error();

            if self.settings.strict {
                return Err(ShaderError::CompileFailed {
                    filename: cache_filename,
                    message: output.error_message,
                });
            }
        }

        match Self::read_cached_binary(&cache_filename, format) {
            Ok(bytecode) => self.create_shader(stage, &bytecode, &cache_filename),
            Err(reason) => {
                log::error!("shader binary missing: {cache_filename} ({reason})");
                self.stats.record_missing();
                Err(ShaderError::MissingBinary(cache_filename))
            }
        }
    }

    /// Reads a cached binary, refusing one whose sidecar names another format.
    fn read_cached_binary(
        cache_filename: &str,
        format: ShaderFormat,
    ) -> std::result::Result<Vec<u8>, String> {
        if let Ok(Some(metadata)) = read_metadata(cache_filename)
            && metadata.format != format
        {
            return Err(format!("built for {}, need {format}", metadata.format));
        }
        std::fs::read(cache_filename).map_err(|e| e.to_string())
    }

    fn create_shader(&self, stage: ShaderStage, bytecode: &[u8], name: &str) -> Result<Shader> {
        let mut shader = self.device.create_shader(stage, bytecode)?;
        self.device.set_name(&mut shader, name);
        Ok(shader)
    }

    fn compiler_input<S: AsRef<str>>(
        &self,
        stage: ShaderStage,
        filename: &str,
        min_shader_model: ShaderModel,
        permutation_defines: &[S],
    ) -> CompilerInput {
        let format = self.device.shader_format();
        let extension = self
            .compilers
            .get(format)
            .map_or(FALLBACK_SOURCE_EXTENSION, |compiler| compiler.source_extension());

        let source_dir = paths::make_absolute(Path::new(&self.settings.shader_source_path));
        let filename_dir = paths::directory(filename);
        let mut include_directories = vec![source_dir.clone()];
        if !filename_dir.is_empty() {
            include_directories.push(source_dir.join(filename_dir));
        }

        CompilerInput {
            flags: self.settings.compiler_flags,
            format,
            stage,
            min_shader_model,
            source_filename: source_dir.join(paths::replace_extension(filename, extension)),
            entry_point: self.settings.entry_point.clone(),
            include_directories,
            defines: permutation_defines
                .iter()
                .map(|define| define.as_ref().to_string())
                .collect(),
        }
    }

    // ─── Introspection ──────────────────────────────────────────────────

    /// Cache filename a permutation resolves to under the current settings.
    #[must_use]
    pub fn resolve_cache_filename<S: AsRef<str>>(
        &self,
        filename: &str,
        permutation_defines: &[S],
    ) -> String {
        paths::resolve_cache_filename(&self.settings.shader_path, filename, permutation_defines)
    }

    #[must_use]
    pub fn shader_error_count(&self) -> usize {
        self.stats.errors()
    }

    #[must_use]
    pub fn shader_missing_count(&self) -> usize {
        self.stats.missing()
    }

    /// Resets both the error and the missing counter.
    pub fn reset_shader_error_count(&self) {
        self.stats.reset();
    }

    #[must_use]
    pub fn stats(&self) -> &ShaderStats {
        &self.stats
    }

    /// Number of entries in the attached dump, zero without one.
    #[must_use]
    pub fn shader_dump_count(&self) -> usize {
        self.dump.as_ref().map_or(0, |dump| dump.len())
    }

    #[must_use]
    pub fn tracker(&self) -> &Arc<OutdatedTracker> {
        &self.tracker
    }

    #[must_use]
    pub fn device(&self) -> &Arc<dyn GraphicsDevice> {
        &self.device
    }

    #[must_use]
    pub fn settings(&self) -> &ShaderLoaderSettings {
        &self.settings
    }

    // ─── Paths ──────────────────────────────────────────────────────────

    #[must_use]
    pub fn shader_path(&self) -> &str {
        &self.settings.shader_path
    }

    pub fn set_shader_path(&mut self, path: impl Into<String>) {
        self.settings.shader_path = path.into();
    }

    #[must_use]
    pub fn shader_source_path(&self) -> &str {
        &self.settings.shader_source_path
    }

    pub fn set_shader_source_path(&mut self, path: impl Into<String>) {
        self.settings.shader_source_path = path.into();
    }

    /// Absolute source directory compiles resolve against.
    #[must_use]
    pub fn absolute_shader_source_path(&self) -> PathBuf {
        paths::make_absolute(Path::new(&self.settings.shader_source_path))
    }
}
