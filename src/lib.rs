//! On-demand shader compilation, permutation caching and precompiled dump
//! loading.
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use shader_pipeline::{HeadlessDevice, ShaderFormat, ShaderLoader, ShaderLoaderSettings};
//! use shader_pipeline::{ShaderModel, ShaderStage};
//!
//! let device = Arc::new(HeadlessDevice::new(ShaderFormat::Spirv));
//! let loader = ShaderLoader::new(device, ShaderLoaderSettings::for_format(ShaderFormat::Spirv));
//!
//! let shader = loader.load_shader(ShaderStage::Pixel, "objectPS.cso", ShaderModel::Sm6_0, &["ALPHA"])?;
//! ```

pub mod cache;
pub mod compiler;
pub mod device;
pub mod dump;
pub mod errors;
pub mod loader;
pub mod offline;
pub mod paths;
pub mod settings;
pub mod tracker;
pub mod types;

pub use cache::{ShaderMetadata, metadata_path, save_shader_and_metadata};
pub use compiler::{
    CompilerFlags, CompilerInput, CompilerOutput, CompilerRegistry, DxcCompiler, NagaCompiler,
    ShaderCompiler,
};
pub use device::{GraphicsDevice, HeadlessDevice, Shader};
pub use dump::ShaderDump;
pub use errors::{Result, ShaderError};
pub use loader::{ShaderLoader, ShaderStats};
pub use offline::{CompileReport, OfflineCompiler, OfflineOptions, ShaderManifest, Target};
pub use paths::resolve_cache_filename;
pub use settings::ShaderLoaderSettings;
pub use tracker::OutdatedTracker;
pub use types::{ShaderFormat, ShaderModel, ShaderStage};
