//! Out-of-process HLSL backend driving the DirectX Shader Compiler.
//!
//! The `dxc` executable is spawned once per compile with its output directed
//! into a temporary file. Include dependencies are discovered by scanning
//! `#include` directives, since the command-line driver does not report them.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Command;

use rustc_hash::FxHashSet;

use super::{CompilerFlags, CompilerInput, CompilerOutput, ShaderCompiler};
use crate::types::{ShaderFormat, ShaderModel, ShaderStage};

/// Register shifts applied when targeting Vulkan so that HLSL `t`, `u` and
/// `s` registers land in disjoint binding ranges.
const VK_REGISTER_SHIFTS: [(&str, &str); 3] = [
    ("-fvk-t-shift", "1000"),
    ("-fvk-u-shift", "2000"),
    ("-fvk-s-shift", "3000"),
];

/// Lowest shader model DXC accepts for `stage`. There are no SM5 profiles,
/// and mesh, amplification and library targets need 6.5 features.
fn lowest_profile_model(stage: ShaderStage) -> ShaderModel {
    match stage {
        ShaderStage::Mesh | ShaderStage::Amplification | ShaderStage::Library => {
            ShaderModel::Sm6_5
        }
        _ => ShaderModel::Sm6_0,
    }
}

#[derive(Debug, Clone)]
pub struct DxcCompiler {
    executable: PathBuf,
}

impl Default for DxcCompiler {
    fn default() -> Self {
        Self::new()
    }
}

impl DxcCompiler {
    /// Uses `dxc` from `PATH`.
    #[must_use]
    pub fn new() -> Self {
        Self::with_executable("dxc")
    }

    #[must_use]
    pub fn with_executable(executable: impl Into<PathBuf>) -> Self {
        Self {
            executable: executable.into(),
        }
    }

    #[must_use]
    pub fn executable(&self) -> &Path {
        &self.executable
    }

    /// Command-line arguments for `input`, writing the object to `output`.
    ///
    /// Returns `None` when the format is not one DXC can target.
    #[must_use]
    pub fn build_arguments(input: &CompilerInput, output: &Path) -> Option<Vec<OsString>> {
        let mut args: Vec<OsString> = vec![
            "-res-may-alias".into(),
            "-flegacy-macro-expansion".into(),
        ];

        match input.format {
            ShaderFormat::Hlsl6 => {
                args.extend(["-D".into(), "HLSL6".into()]);
            }
            ShaderFormat::Spirv => {
                args.extend([
                    "-D".into(),
                    "SPIRV".into(),
                    "-spirv".into(),
                    "-fspv-target-env=vulkan1.2".into(),
                    "-fvk-use-dx-layout".into(),
                ]);
                for (flag, shift) in VK_REGISTER_SHIFTS {
                    args.extend([flag.into(), shift.into(), "0".into()]);
                }
            }
            _ => return None,
        }

        let model = input.min_shader_model.max(lowest_profile_model(input.stage));
        args.push("-T".into());
        args.push(
            format!(
                "{}_{}",
                input.stage.profile_prefix(),
                model.profile_suffix()
            )
            .into(),
        );

        args.push("-E".into());
        args.push(input.entry_point.clone().into());

        for define in &input.defines {
            args.push("-D".into());
            args.push(define.clone().into());
        }
        for dir in &input.include_directories {
            args.push("-I".into());
            args.push(dir.clone().into_os_string());
        }

        if input.flags.contains(CompilerFlags::DISABLE_OPTIMIZATION) {
            args.push("-Od".into());
        }
        if input.flags.contains(CompilerFlags::STRIP_REFLECTION) {
            args.push("-Qstrip_reflect".into());
        }

        args.push("-Fo".into());
        args.push(output.as_os_str().to_owned());
        args.push(input.source_filename.clone().into_os_string());
        Some(args)
    }
}

impl ShaderCompiler for DxcCompiler {
    fn name(&self) -> &'static str {
        "dxc"
    }

    fn source_extension(&self) -> &'static str {
        "hlsl"
    }

    fn compile(&self, input: &CompilerInput) -> CompilerOutput {
        let dependencies = scan_includes(&input.source_filename, &input.include_directories);

        if !input.source_filename.is_file() {
            return CompilerOutput::failure(
                format!(
                    "shader source not found: {}",
                    input.source_filename.display()
                ),
                dependencies,
            );
        }

        let object = match tempfile::Builder::new()
            .prefix("dxc-")
            .suffix(".bin")
            .tempfile()
        {
            Ok(file) => file.into_temp_path(),
            Err(e) => {
                return CompilerOutput::failure(
                    format!("failed to create dxc output file: {e}"),
                    dependencies,
                );
            }
        };

        let Some(args) = Self::build_arguments(input, &object) else {
            return CompilerOutput::failure(
                format!("dxc cannot target {}", input.format),
                dependencies,
            );
        };

        let result = match Command::new(&self.executable).args(&args).output() {
            Ok(result) => result,
            Err(e) => {
                return CompilerOutput::failure(
                    format!("failed to run {}: {e}", self.executable.display()),
                    dependencies,
                );
            }
        };

        let diagnostics = String::from_utf8_lossy(&result.stderr).trim().to_string();
        if !result.status.success() {
            let message = if diagnostics.is_empty() {
                format!("dxc exited with {}", result.status)
            } else {
                diagnostics
            };
            return CompilerOutput::failure(message, dependencies);
        }

        match std::fs::read(&object) {
            Ok(bytecode) if !bytecode.is_empty() => {
                CompilerOutput::success(bytecode, dependencies, diagnostics)
            }
            Ok(_) => CompilerOutput::failure("dxc produced an empty object", dependencies),
            Err(e) => CompilerOutput::failure(
                format!("failed to read dxc output: {e}"),
                dependencies,
            ),
        }
    }
}

// ─── Include Scanning ────────────────────────────────────────────────────────

/// Target of an `#include "x"` or `#include <x>` line.
fn include_target(line: &str) -> Option<&str> {
    let rest = line.trim_start().strip_prefix('#')?.trim_start();
    let rest = rest.strip_prefix("include")?.trim_start();
    let (open, close) = match rest.chars().next()? {
        '"' => ('"', '"'),
        '<' => ('<', '>'),
        _ => return None,
    };
    let inner = rest.strip_prefix(open)?;
    inner.find(close).map(|end| &inner[..end])
}

/// The source file followed by every include reachable from it, depth first.
///
/// Includes resolve against the including file's directory, then each include
/// directory in order. Unresolvable includes are skipped; DXC reports them.
#[must_use]
pub fn scan_includes(source: &Path, include_directories: &[PathBuf]) -> Vec<PathBuf> {
    let mut seen = FxHashSet::default();
    let mut ordered = Vec::new();
    let mut pending = vec![source.to_path_buf()];

    while let Some(path) = pending.pop() {
        if !seen.insert(path.clone()) {
            continue;
        }
        let text = std::fs::read_to_string(&path).unwrap_or_default();
        ordered.push(path.clone());

        let local = path.parent().map(Path::to_path_buf);
        let mut found: Vec<PathBuf> = text
            .lines()
            .filter_map(include_target)
            .filter_map(|target| {
                local
                    .iter()
                    .chain(include_directories)
                    .map(|dir| dir.join(target))
                    .find(|candidate| candidate.is_file())
            })
            .collect();
        // Reverse so the first include is visited first.
        found.reverse();
        pending.extend(found);
    }

    ordered
}
