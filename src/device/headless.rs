//! Headless device used by tooling and tests. It keeps the bytecode in memory
//! and performs the same sanity checks a real driver would reject on.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use xxhash_rust::xxh3::xxh3_128;

use super::{GraphicsDevice, Shader};
use crate::errors::{Result, ShaderError};
use crate::types::{ShaderFormat, ShaderStage};

const SPIRV_MAGIC: u32 = 0x0723_0203;

/// Backend object stored inside shaders created by [`HeadlessDevice`].
#[derive(Debug, Clone)]
pub struct HeadlessShader {
    pub bytecode: Arc<[u8]>,
    pub hash: u128,
}

/// A [`GraphicsDevice`] without a GPU.
#[derive(Debug)]
pub struct HeadlessDevice {
    format: ShaderFormat,
    created: AtomicUsize,
}

impl HeadlessDevice {
    #[must_use]
    pub fn new(format: ShaderFormat) -> Self {
        Self {
            format,
            created: AtomicUsize::new(0),
        }
    }

    /// Number of shaders successfully created so far.
    #[must_use]
    pub fn created_count(&self) -> usize {
        self.created.load(Ordering::Relaxed)
    }

    fn validate(&self, bytecode: &[u8]) -> Result<()> {
        if bytecode.is_empty() {
            return Err(ShaderError::DeviceError("empty bytecode".to_string()));
        }
        if self.format == ShaderFormat::Spirv {
            let magic = bytecode
                .first_chunk::<4>()
                .map(|word| u32::from_le_bytes(*word));
            if bytecode.len() % 4 != 0 || magic != Some(SPIRV_MAGIC) {
                return Err(ShaderError::DeviceError(
                    "bytecode is not a SPIR-V module".to_string(),
                ));
            }
        }
        Ok(())
    }
}

impl GraphicsDevice for HeadlessDevice {
    fn shader_format(&self) -> ShaderFormat {
        self.format
    }

    fn create_shader(&self, stage: ShaderStage, bytecode: &[u8]) -> Result<Shader> {
        self.validate(bytecode)?;
        self.created.fetch_add(1, Ordering::Relaxed);
        Ok(Shader::new(
            stage,
            HeadlessShader {
                bytecode: Arc::from(bytecode),
                hash: xxh3_128(bytecode),
            },
        ))
    }
}
