//! Compiler Invocation Layer
//!
//! A uniform contract over per-format shader compilers:
//!
//! | Format  | Default backend             | Source dialect |
//! |---------|-----------------------------|----------------|
//! | `spirv` | [`NagaCompiler`]            | WGSL           |
//! | `metal` | [`NagaCompiler`]            | WGSL           |
//! | `wgsl`  | [`NagaCompiler`]            | WGSL           |
//! | `hlsl6` | [`DxcCompiler`]             | HLSL           |
//!
//! Every backend fills a [`CompilerOutput`]. On success the output owns the
//! bytecode and lists every file that influenced it; on failure it carries a
//! human-readable diagnostic. A valid output may still carry warnings in
//! `error_message`.

pub mod dxc;
pub mod naga;
pub mod preprocess;

pub use self::dxc::DxcCompiler;
pub use self::naga::NagaCompiler;

use std::path::PathBuf;
use std::sync::Arc;

use bitflags::bitflags;
use rustc_hash::FxHashMap;
use xxhash_rust::xxh3::xxh3_128;

use crate::types::{ShaderFormat, ShaderModel, ShaderStage};

bitflags! {
    /// Per-compile switches.
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
    pub struct CompilerFlags: u32 {
        const DISABLE_OPTIMIZATION = 1 << 0;
        const STRIP_REFLECTION = 1 << 1;
    }
}

// ─── Input / Output ──────────────────────────────────────────────────────────

/// Fully resolved compile request.
#[derive(Debug, Clone)]
pub struct CompilerInput {
    pub flags: CompilerFlags,
    pub format: ShaderFormat,
    pub stage: ShaderStage,
    pub min_shader_model: ShaderModel,
    /// Absolute path of the source file.
    pub source_filename: PathBuf,
    pub entry_point: String,
    /// Searched in order when resolving includes.
    pub include_directories: Vec<PathBuf>,
    /// `NAME` or `NAME=VALUE`, in permutation order.
    pub defines: Vec<String>,
}

impl Default for CompilerInput {
    fn default() -> Self {
        Self {
            flags: CompilerFlags::empty(),
            format: ShaderFormat::None,
            stage: ShaderStage::Vertex,
            min_shader_model: ShaderModel::default(),
            source_filename: PathBuf::new(),
            entry_point: "main".to_string(),
            include_directories: Vec::new(),
            defines: Vec::new(),
        }
    }
}

/// Splits a define into its name and value (`"1"` when none is given).
#[must_use]
pub fn split_define(define: &str) -> (&str, &str) {
    match define.split_once('=') {
        Some((name, value)) => (name.trim(), value.trim()),
        None => (define.trim(), "1"),
    }
}

/// Result of a single compilation.
#[derive(Debug, Clone, Default)]
pub struct CompilerOutput {
    /// Backend-produced blob. `None` means the compile failed.
    blob: Option<Vec<u8>>,
    /// xxh3-128 of the bytecode; zero when invalid.
    pub hash: u128,
    /// Source file plus every resolved include.
    pub dependencies: Vec<PathBuf>,
    /// Failure diagnostic, or warnings on success.
    pub error_message: String,
}

impl CompilerOutput {
    #[must_use]
    pub fn success(bytecode: Vec<u8>, dependencies: Vec<PathBuf>, warnings: String) -> Self {
        Self {
            hash: xxh3_128(&bytecode),
            blob: Some(bytecode),
            dependencies,
            error_message: warnings,
        }
    }

    #[must_use]
    pub fn failure(error_message: impl Into<String>, dependencies: Vec<PathBuf>) -> Self {
        Self {
            blob: None,
            hash: 0,
            dependencies,
            error_message: error_message.into(),
        }
    }

    #[inline]
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.blob.is_some()
    }

    /// Borrowed bytecode. Empty when the output is invalid.
    #[inline]
    #[must_use]
    pub fn shader_data(&self) -> &[u8] {
        self.blob.as_deref().unwrap_or_default()
    }

    #[inline]
    #[must_use]
    pub fn shader_size(&self) -> usize {
        self.shader_data().len()
    }
}

// ─── Backend Trait ───────────────────────────────────────────────────────────

/// One implementation per target bytecode dialect.
pub trait ShaderCompiler: Send + Sync {
    /// Short backend name used in log lines.
    fn name(&self) -> &'static str;

    /// Extension of the source files this backend consumes (`"wgsl"`, `"hlsl"`).
    fn source_extension(&self) -> &'static str;

    fn compile(&self, input: &CompilerInput) -> CompilerOutput;
}

// ─── Registry ────────────────────────────────────────────────────────────────

/// Selects a [`ShaderCompiler`] by [`ShaderFormat`].
#[derive(Clone, Default)]
pub struct CompilerRegistry {
    compilers: FxHashMap<ShaderFormat, Arc<dyn ShaderCompiler>>,
}

impl CompilerRegistry {
    /// An empty registry. Every compile fails until a backend is registered.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// naga for SPIR-V, Metal and WGSL; DXC for HLSL6.
    #[must_use]
    pub fn with_defaults() -> Self {
        let naga: Arc<dyn ShaderCompiler> = Arc::new(NagaCompiler::new());
        let mut registry = Self::new();
        registry.register(ShaderFormat::Spirv, naga.clone());
        registry.register(ShaderFormat::Metal, naga.clone());
        registry.register(ShaderFormat::Wgsl, naga);
        registry.register(ShaderFormat::Hlsl6, Arc::new(DxcCompiler::new()));
        registry
    }

    /// Installs `compiler` for `format`, returning the backend it replaced.
    pub fn register(
        &mut self,
        format: ShaderFormat,
        compiler: Arc<dyn ShaderCompiler>,
    ) -> Option<Arc<dyn ShaderCompiler>> {
        self.compilers.insert(format, compiler)
    }

    #[must_use]
    pub fn get(&self, format: ShaderFormat) -> Option<&Arc<dyn ShaderCompiler>> {
        self.compilers.get(&format)
    }

    /// Dispatches on `input.format`.
    #[must_use]
    pub fn compile(&self, input: &CompilerInput) -> CompilerOutput {
        match self.get(input.format) {
            Some(compiler) => {
                log::debug!(
                    "compiling {} with {} for {}",
                    input.source_filename.display(),
                    compiler.name(),
                    input.format
                );
                compiler.compile(input)
            }
            None => CompilerOutput::failure(
                format!("no shader compiler registered for format {}", input.format),
                Vec::new(),
            ),
        }
    }
}
