use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use shader_pipeline::offline::{
    OfflineCompiler, OfflineOptions, ShaderManifest, Target, default_targets,
};
use shader_pipeline::{CompilerFlags, CompilerRegistry, DxcCompiler, ShaderFormat, paths};

#[derive(Debug, Parser)]
#[command(name = "offline-shader-compiler")]
#[command(about = "Compile every shader permutation of a manifest ahead of time", long_about = None)]
struct Cli {
    /// Target formats (hlsl5, hlsl6, spirv, metal, wgsl). Defaults to hlsl6 and spirv.
    formats: Vec<ShaderFormat>,

    /// JSON manifest listing shaders per stage.
    #[arg(long, default_value = "shaders/manifest.json")]
    manifest: PathBuf,

    /// Directory holding shader sources.
    #[arg(long, default_value = "shaders/src/")]
    source_dir: PathBuf,

    /// Output root. Each format writes to `<out-dir>/<format>/`.
    #[arg(long, default_value = "shaders/")]
    out_dir: String,

    /// Rebuild every shader, regardless of whether it is outdated.
    #[arg(long)]
    rebuild: bool,

    /// Also copy binaries below this directory for embedding. Implies --rebuild.
    #[arg(long)]
    shader_dump: Option<PathBuf>,

    /// Worker threads (0 = available parallelism).
    #[arg(long, short, default_value_t = 0)]
    jobs: usize,

    /// Compile without optimizations.
    #[arg(long)]
    debug: bool,

    /// Strip reflection data from the binaries.
    #[arg(long)]
    strip_reflection: bool,

    /// Path of the `dxc` executable.
    #[arg(long, env = "DXC_PATH", default_value = "dxc")]
    dxc: PathBuf,
}

fn targets(cli: &Cli) -> Vec<Target> {
    let formats: Vec<ShaderFormat> = if cli.formats.is_empty() {
        log::info!("no shader formats were specified, assuming: hlsl6 spirv");
        default_targets().into_iter().map(|target| target.format).collect()
    } else {
        cli.formats.clone()
    };
    formats
        .into_iter()
        .map(|format| Target::with_dir(format, paths::join(&cli.out_dir, &format!("{format}/"))))
        .collect()
}

fn run(cli: &Cli) -> anyhow::Result<bool> {
    let manifest = ShaderManifest::load(&cli.manifest)
        .with_context(|| format!("read manifest {}", cli.manifest.display()))?;

    let mut flags = CompilerFlags::empty();
    flags.set(CompilerFlags::DISABLE_OPTIMIZATION, cli.debug);
    flags.set(CompilerFlags::STRIP_REFLECTION, cli.strip_reflection);

    let options = OfflineOptions {
        source_dir: cli.source_dir.clone(),
        targets: targets(cli),
        rebuild: cli.rebuild,
        shader_dump: cli.shader_dump.clone(),
        jobs: cli.jobs,
        flags,
    };

    let mut compilers = CompilerRegistry::with_defaults();
    compilers.register(
        ShaderFormat::Hlsl6,
        Arc::new(DxcCompiler::with_executable(&cli.dxc)),
    );

    log::info!(
        "{} shaders, targets: {}",
        manifest.shader_count(),
        options
            .targets
            .iter()
            .map(|target| target.format.name())
            .collect::<Vec<_>>()
            .join(" ")
    );

    let report = OfflineCompiler::new(compilers).compile_all(&manifest, &options);
    for failure in &report.failures {
        eprintln!("shader compile FAILED: {}\n{}", failure.filename, failure.message);
    }
    if let Some(dump) = &options.shader_dump {
        log::info!(
            "shader dump written to {} ({} binaries)",
            dump.display(),
            report.compiled.len()
        );
    }
    Ok(report.is_success())
}

fn main() -> anyhow::Result<ExitCode> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    if run(&cli)? {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::FAILURE)
    }
}
