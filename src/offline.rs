//! Offline Shader Compilation
//!
//! Builds every shader listed in a manifest for one or more target formats
//! ahead of time, the way a build step or CI job would. The manifest is JSON:
//!
//! ```json
//! {
//!   "shaders": {
//!     "vertex":  ["objectVS.wgsl"],
//!     "compute": ["post/blurCS.wgsl"]
//!   },
//!   "min_shader_models": { "post/blurCS.wgsl": "6_5" },
//!   "permutations": { "post/blurCS.wgsl": [["RADIUS=4"], ["RADIUS=8", "HDR"]] }
//! }
//! ```
//!
//! Every shader is built once without defines plus once per listed
//! permutation. Binaries are written to `<target dir>/<name>.cso` using the
//! same cache filename rules as the runtime loader, together with their
//! dependency sidecars, so a runtime [`ShaderLoader`] pointed at the same
//! directory finds them up to date.
//!
//! [`ShaderLoader`]: crate::loader::ShaderLoader

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::cache::{save_shader_and_metadata, write_atomic};
use crate::compiler::{CompilerFlags, CompilerInput, CompilerRegistry};
use crate::errors::Result;
use crate::paths;
use crate::tracker::OutdatedTracker;
use crate::types::{ShaderFormat, ShaderModel, ShaderStage};

/// Extension of offline-built binaries.
pub const BINARY_EXTENSION: &str = "cso";

// ─── Manifest ────────────────────────────────────────────────────────────────

/// The set of shaders to build.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShaderManifest {
    /// Source filenames per stage, relative to the source directory.
    #[serde(default)]
    pub shaders: BTreeMap<ShaderStage, Vec<String>>,

    /// Raised minimum shader models. Unlisted shaders use the default.
    #[serde(default)]
    pub min_shader_models: BTreeMap<String, ShaderModel>,

    /// Extra define lists per shader, in addition to the bare permutation.
    #[serde(default)]
    pub permutations: BTreeMap<String, Vec<Vec<String>>>,
}

impl ShaderManifest {
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn load(path: &Path) -> Result<Self> {
        Self::from_json(&std::fs::read_to_string(path)?)
    }

    /// Define lists built for `shader`, the empty list first.
    #[must_use]
    pub fn permutations_of(&self, shader: &str) -> Vec<Vec<String>> {
        let mut all = vec![Vec::new()];
        if let Some(extra) = self.permutations.get(shader) {
            all.extend(extra.iter().filter(|defines| !defines.is_empty()).cloned());
        }
        all
    }

    #[must_use]
    pub fn min_shader_model(&self, shader: &str) -> ShaderModel {
        self.min_shader_models
            .get(shader)
            .copied()
            .unwrap_or_default()
    }

    /// Total number of listed shaders across stages.
    #[must_use]
    pub fn shader_count(&self) -> usize {
        self.shaders.values().map(Vec::len).sum()
    }
}

// ─── Options ─────────────────────────────────────────────────────────────────

/// One output format and the directory its binaries go to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub format: ShaderFormat,
    pub dir: String,
}

impl Target {
    /// `shaders/<format>/`.
    #[must_use]
    pub fn new(format: ShaderFormat) -> Self {
        Self {
            format,
            dir: format!("shaders/{format}/"),
        }
    }

    #[must_use]
    pub fn with_dir(format: ShaderFormat, dir: impl Into<String>) -> Self {
        Self {
            format,
            dir: dir.into(),
        }
    }
}

/// Targets built when none are requested.
#[must_use]
pub fn default_targets() -> Vec<Target> {
    vec![Target::new(ShaderFormat::Hlsl6), Target::new(ShaderFormat::Spirv)]
}

#[derive(Debug, Clone)]
pub struct OfflineOptions {
    pub source_dir: PathBuf,
    pub targets: Vec<Target>,
    /// Compile even when the binary is up to date.
    pub rebuild: bool,
    /// Also copy every compiled binary below this directory, keyed by cache
    /// filename, for embedding. Implies `rebuild`.
    pub shader_dump: Option<PathBuf>,
    /// Worker threads. Zero uses the available parallelism.
    pub jobs: usize,
    pub flags: CompilerFlags,
}

impl Default for OfflineOptions {
    fn default() -> Self {
        Self {
            source_dir: PathBuf::from("shaders/src/"),
            targets: default_targets(),
            rebuild: false,
            shader_dump: None,
            jobs: 0,
            flags: CompilerFlags::empty(),
        }
    }
}

impl OfflineOptions {
    fn rebuild_all(&self) -> bool {
        self.rebuild || self.shader_dump.is_some()
    }

    fn worker_count(&self) -> usize {
        if self.jobs > 0 {
            self.jobs
        } else {
            std::thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get)
        }
    }
}

// ─── Report ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileFailure {
    pub filename: String,
    pub message: String,
}

/// Outcome of [`OfflineCompiler::compile_all`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompileReport {
    /// Cache filenames written, sorted.
    pub compiled: Vec<String>,
    pub up_to_date: usize,
    /// Stage or shader model not expressible in the target format.
    pub skipped: usize,
    pub failures: Vec<CompileFailure>,
}

impl CompileReport {
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

// ─── Compiler ────────────────────────────────────────────────────────────────

struct Job<'a> {
    target: &'a Target,
    stage: ShaderStage,
    shader: &'a str,
    min_shader_model: ShaderModel,
    defines: Vec<String>,
}

/// Batch compiler over a [`CompilerRegistry`].
pub struct OfflineCompiler {
    compilers: CompilerRegistry,
    tracker: OutdatedTracker,
}

impl Default for OfflineCompiler {
    fn default() -> Self {
        Self::new(CompilerRegistry::with_defaults())
    }
}

impl OfflineCompiler {
    #[must_use]
    pub fn new(compilers: CompilerRegistry) -> Self {
        Self {
            compilers,
            tracker: OutdatedTracker::new(),
        }
    }

    #[must_use]
    pub fn tracker(&self) -> &OutdatedTracker {
        &self.tracker
    }

    /// Builds every (target, stage, shader, permutation) of `manifest`.
    pub fn compile_all(&self, manifest: &ShaderManifest, options: &OfflineOptions) -> CompileReport {
        let started = Instant::now();
        let source_dir = paths::make_absolute(&options.source_dir);
        let report = Mutex::new(CompileReport::default());

        let mut jobs = Vec::new();
        for target in &options.targets {
            for (&stage, shaders) in &manifest.shaders {
                for shader in shaders {
                    let min_shader_model = manifest.min_shader_model(shader);
                    let expressible = target.format.supports_stage(stage)
                        && target.format.supports_shader_model(min_shader_model);
                    for defines in manifest.permutations_of(shader) {
                        if !expressible {
                            report.lock().skipped += 1;
                            continue;
                        }
                        jobs.push(Job {
                            target,
                            stage,
                            shader,
                            min_shader_model,
                            defines,
                        });
                    }
                }
            }
        }

        log::info!(
            "searching {} shader permutations for outdated binaries...",
            jobs.len()
        );

        let next = AtomicUsize::new(0);
        let workers = options.worker_count().min(jobs.len()).max(1);
        std::thread::scope(|scope| {
            for _ in 0..workers {
                scope.spawn(|| {
                    loop {
                        let index = next.fetch_add(1, Ordering::Relaxed);
                        let Some(job) = jobs.get(index) else {
                            break;
                        };
                        self.run_job(job, &source_dir, options, &report);
                    }
                });
            }
        });

        let mut report = report.into_inner();
        report.compiled.sort_unstable();
        report.failures.sort_unstable_by(|a, b| a.filename.cmp(&b.filename));

        log::info!(
            "finished in {:.3}s: {} compiled, {} up to date, {} skipped, {} failed",
            started.elapsed().as_secs_f64(),
            report.compiled.len(),
            report.up_to_date,
            report.skipped,
            report.failures.len()
        );
        report
    }

    fn run_job(
        &self,
        job: &Job<'_>,
        source_dir: &Path,
        options: &OfflineOptions,
        report: &Mutex<CompileReport>,
    ) {
        let binary = paths::replace_extension(job.shader, BINARY_EXTENSION);
        let cache_filename = paths::resolve_cache_filename(&job.target.dir, &binary, &job.defines);

        self.tracker.register_shader(&cache_filename);
        if !options.rebuild_all()
            && !self
                .tracker
                .is_shader_outdated_for(&cache_filename, job.target.format)
        {
            report.lock().up_to_date += 1;
            return;
        }

        let extension = self
            .compilers
            .get(job.target.format)
            .map_or(paths::extension(job.shader), |compiler| {
                compiler.source_extension()
            });
        let shader_dir = paths::directory(job.shader);
        let mut include_directories = vec![source_dir.to_path_buf()];
        if !shader_dir.is_empty() {
            include_directories.push(source_dir.join(shader_dir));
        }

        let input = CompilerInput {
            flags: options.flags,
            format: job.target.format,
            stage: job.stage,
            min_shader_model: job.min_shader_model,
            source_filename: source_dir.join(paths::replace_extension(job.shader, extension)),
            include_directories,
            defines: job.defines.clone(),
            ..CompilerInput::default()
        };

        log::debug!(
            "compiling shader: {cache_filename} from {}",
            input.source_filename.display()
        );
        let output = self.compilers.compile(&input);
        if !output.is_valid() {
            log::error!(
                "shader compile FAILED: {cache_filename}\n{}",
                output.error_message
            );
            report.lock().failures.push(CompileFailure {
                filename: cache_filename,
                message: output.error_message,
            });
            return;
        }

        let saved = save_shader_and_metadata(&cache_filename, job.target.format, &output).and_then(
            |()| match &options.shader_dump {
                Some(dump_dir) => write_atomic(
                    &dump_dir.join(cache_filename.trim_start_matches(['/', '\\'])),
                    output.shader_data(),
                ),
                None => Ok(()),
            },
        );
        if let Err(e) = saved {
            log::error!("failed to save shader {cache_filename}: {e}");
            report.lock().failures.push(CompileFailure {
                filename: cache_filename,
                message: e.to_string(),
            });
            return;
        }

        if !output.error_message.is_empty() {
            log::warn!("{cache_filename}: {}", output.error_message);
        }
        log::info!("shader compiled: {cache_filename}");
        report.lock().compiled.push(cache_filename);
    }
}
