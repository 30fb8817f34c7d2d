//! Graphics Device Seam
//!
//! The loader never talks to a GPU API directly. It hands bytecode to a
//! [`GraphicsDevice`] and receives an opaque [`Shader`] back. Backends wrap
//! their native module object inside the shader via [`Shader::new`].

mod headless;

pub use headless::{HeadlessDevice, HeadlessShader};

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::errors::Result;
use crate::types::{ShaderFormat, ShaderStage};

/// Backend-created shader object. Ownership passes to the caller.
#[derive(Clone)]
pub struct Shader {
    stage: ShaderStage,
    internal: Arc<dyn Any + Send + Sync>,
    name: Option<String>,
}

impl Shader {
    #[must_use]
    pub fn new<T: Any + Send + Sync>(stage: ShaderStage, internal: T) -> Self {
        Self {
            stage,
            internal: Arc::new(internal),
            name: None,
        }
    }

    #[inline]
    #[must_use]
    pub fn stage(&self) -> ShaderStage {
        self.stage
    }

    /// Debug name assigned by [`GraphicsDevice::set_name`].
    #[inline]
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Replaces the debug name.
    pub fn set_debug_name(&mut self, name: impl Into<String>) {
        self.name = Some(name.into());
    }

    /// Downcasts the backend object.
    #[must_use]
    pub fn internal<T: Any>(&self) -> Option<&T> {
        self.internal.downcast_ref::<T>()
    }
}

impl fmt::Debug for Shader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Shader")
            .field("stage", &self.stage)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Factory for backend shader objects.
///
/// Implementations must be callable from worker threads; the loader may be
/// shared across a job system.
pub trait GraphicsDevice: Send + Sync {
    /// Bytecode dialect this device consumes.
    fn shader_format(&self) -> ShaderFormat;

    /// Creates a shader object from raw bytecode.
    fn create_shader(&self, stage: ShaderStage, bytecode: &[u8]) -> Result<Shader>;

    /// Attaches a debug name to a shader.
    fn set_name(&self, shader: &mut Shader, name: &str) {
        shader.set_debug_name(name);
    }
}
