//! In-process WGSL backend built on naga.
//!
//! Sources are expanded by the [preprocessor](super::preprocess), parsed,
//! validated, and then written out for the requested format:
//!
//! | Format  | Output                                  |
//! |---------|-----------------------------------------|
//! | `spirv` | SPIR-V words, little-endian bytes       |
//! | `metal` | MSL source text                         |
//! | `wgsl`  | the expanded, validated WGSL text       |

use naga::back::{msl, spv};
use naga::valid::{Capabilities, ValidationFlags, Validator};

use super::preprocess::{PreprocessError, preprocess};
use super::{CompilerFlags, CompilerInput, CompilerOutput, ShaderCompiler};
use crate::types::{ShaderFormat, ShaderStage};

/// naga only models the three classic pipeline stages.
fn naga_stage(stage: ShaderStage) -> Option<naga::ShaderStage> {
    match stage {
        ShaderStage::Vertex => Some(naga::ShaderStage::Vertex),
        ShaderStage::Pixel => Some(naga::ShaderStage::Fragment),
        ShaderStage::Compute => Some(naga::ShaderStage::Compute),
        _ => None,
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NagaCompiler;

impl NagaCompiler {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    fn emit_spirv(
        module: &naga::Module,
        info: &naga::valid::ModuleInfo,
        input: &CompilerInput,
        stage: naga::ShaderStage,
    ) -> Result<Vec<u8>, String> {
        let mut options = spv::Options::default();
        if input.flags.contains(CompilerFlags::STRIP_REFLECTION) {
            options.flags.remove(spv::WriterFlags::DEBUG);
        } else {
            options.flags.insert(spv::WriterFlags::DEBUG);
        }

        let pipeline = spv::PipelineOptions {
            shader_stage: stage,
            entry_point: input.entry_point.clone(),
        };

        let words = spv::write_vec(module, info, &options, Some(&pipeline))
            .map_err(|e| format!("SPIR-V export failed: {e}"))?;
        Ok(bytemuck::cast_slice::<u32, u8>(&words).to_vec())
    }

    fn emit_metal(
        module: &naga::Module,
        info: &naga::valid::ModuleInfo,
    ) -> Result<Vec<u8>, String> {
        let (source, _) = msl::write_string(
            module,
            info,
            &msl::Options::default(),
            &msl::PipelineOptions::default(),
        )
        .map_err(|e| format!("MSL export failed: {e}"))?;
        Ok(source.into_bytes())
    }
}

impl ShaderCompiler for NagaCompiler {
    fn name(&self) -> &'static str {
        "naga"
    }

    fn source_extension(&self) -> &'static str {
        "wgsl"
    }

    fn compile(&self, input: &CompilerInput) -> CompilerOutput {
        let expanded = match preprocess(
            &input.source_filename,
            &input.include_directories,
            &input.defines,
        ) {
            Ok(expanded) => expanded,
            Err(PreprocessError {
                message,
                dependencies,
            }) => return CompilerOutput::failure(message, dependencies),
        };
        let dependencies = expanded.dependencies;
        let source = expanded.source;

        let Some(stage) = naga_stage(input.stage) else {
            return CompilerOutput::failure(
                format!("naga cannot compile {} shaders", input.stage),
                dependencies,
            );
        };

        let module = match naga::front::wgsl::parse_str(&source) {
            Ok(module) => module,
            Err(e) => return CompilerOutput::failure(e.emit_to_string(&source), dependencies),
        };

        let info = match Validator::new(ValidationFlags::all(), Capabilities::all())
            .validate(&module)
        {
            Ok(info) => info,
            Err(e) => return CompilerOutput::failure(e.emit_to_string(&source), dependencies),
        };

        let has_entry = module
            .entry_points
            .iter()
            .any(|ep| ep.name == input.entry_point && ep.stage == stage);
        if !has_entry {
            return CompilerOutput::failure(
                format!(
                    "entry point '{}' for {} stage not found in {}",
                    input.entry_point,
                    input.stage,
                    input.source_filename.display()
                ),
                dependencies,
            );
        }

        let emitted = match input.format {
            ShaderFormat::Spirv => Self::emit_spirv(&module, &info, input, stage),
            ShaderFormat::Metal => Self::emit_metal(&module, &info),
            ShaderFormat::Wgsl => Ok(source.into_bytes()),
            other => Err(format!("naga cannot emit {other}")),
        };

        match emitted {
            Ok(bytecode) => CompilerOutput::success(bytecode, dependencies, String::new()),
            Err(message) => CompilerOutput::failure(message, dependencies),
        }
    }
}
