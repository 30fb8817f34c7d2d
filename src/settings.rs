//! Shader Loader Settings
//!
//! Plain configuration for [`ShaderLoader`](crate::loader::ShaderLoader).
//!
//! ```rust,ignore
//! use shader_pipeline::{ShaderLoaderSettings, ShaderFormat};
//!
//! // Defaults: binaries in `shaders/`, sources in `shaders/src/`
//! let settings = ShaderLoaderSettings::default();
//!
//! // CI validation: fail loudly instead of falling back to stale binaries
//! let settings = ShaderLoaderSettings {
//!     strict: true,
//!     ..ShaderLoaderSettings::for_format(ShaderFormat::Spirv)
//! };
//! ```

use crate::compiler::CompilerFlags;
use crate::types::ShaderFormat;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShaderLoaderSettings {
    // === Locations ===
    /// Directory prefix of compiled binaries. Cache filenames are this prefix
    /// plus the requested filename, so dump keys must use the same prefix.
    pub shader_path: String,

    /// Directory holding shader sources. Made absolute before compiling.
    pub shader_source_path: String,

    // === Compilation ===
    /// When `true`, a failed compile is returned as an error immediately and
    /// the previously cached binary is not used.
    pub strict: bool,

    /// Flags passed to every compile.
    pub compiler_flags: CompilerFlags,

    /// Entry point of every shader.
    pub entry_point: String,
}

impl Default for ShaderLoaderSettings {
    fn default() -> Self {
        Self {
            shader_path: "shaders/".to_string(),
            shader_source_path: "shaders/src/".to_string(),
            strict: false,
            compiler_flags: CompilerFlags::empty(),
            entry_point: "main".to_string(),
        }
    }
}

impl ShaderLoaderSettings {
    /// Defaults with binaries under `shaders/<format>/`, the layout the
    /// offline compiler produces.
    #[must_use]
    pub fn for_format(format: ShaderFormat) -> Self {
        Self {
            shader_path: format!("shaders/{format}/"),
            ..Self::default()
        }
    }
}
