//! Shader Loader Tests
//!
//! Tests for:
//! - Freshness short-circuit: compile once, load twice
//! - Recompile after a source edit, a format switch, or a damaged binary
//! - Stale-cache fallback on compile failure (and strict mode)
//! - Missing binary accounting
//! - Dump lookup (entries and rust-embed) bypassing compile and cache
//! - Cache write failure still yielding a shader
//! - Concurrent loads from worker threads

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use rust_embed::RustEmbed;
use tempfile::TempDir;

use shader_pipeline::device::HeadlessShader;
use shader_pipeline::{
    CompilerInput, CompilerOutput, CompilerRegistry, GraphicsDevice, HeadlessDevice, NagaCompiler,
    Shader, ShaderCompiler, ShaderDump, ShaderError, ShaderFormat, ShaderLoader,
    ShaderLoaderSettings, ShaderModel, ShaderStage, metadata_path,
};

const BLUR_CS: &str = "\
@group(0) @binding(0) var<storage, read_write> data: array<f32>;

@compute @workgroup_size(64)
fn main(@builtin(global_invocation_id) id: vec3<u32>) {
$$ if ALPHA
    data[id.x] = data[id.x] * 0.5;
$$ else
    data[id.x] = data[id.x] + 1.0;
$$ endif
}
";

const BROKEN: &str = "fn main( {";

// ============================================================================
// Fixtures
// ============================================================================

/// Wraps naga and counts invocations.
#[derive(Default)]
struct CountingCompiler {
    inner: NagaCompiler,
    calls: AtomicUsize,
}

impl CountingCompiler {
    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ShaderCompiler for CountingCompiler {
    fn name(&self) -> &'static str {
        "counting"
    }

    fn source_extension(&self) -> &'static str {
        self.inner.source_extension()
    }

    fn compile(&self, input: &CompilerInput) -> CompilerOutput {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.compile(input)
    }
}

struct Fixture {
    _root: TempDir,
    src: PathBuf,
    bin: PathBuf,
    device: Arc<HeadlessDevice>,
    compiler: Arc<CountingCompiler>,
}

impl Fixture {
    fn new(format: ShaderFormat) -> Self {
        let _ = env_logger::builder().is_test(true).try_init();
        let root = tempfile::tempdir().unwrap();
        let src = root.path().join("src");
        let bin = root.path().join("bin");
        fs::create_dir_all(&src).unwrap();
        Self {
            src,
            bin,
            device: Arc::new(HeadlessDevice::new(format)),
            compiler: Arc::new(CountingCompiler::default()),
            _root: root,
        }
    }

    fn settings(&self) -> ShaderLoaderSettings {
        ShaderLoaderSettings {
            shader_path: format!("{}/", self.bin.display()),
            shader_source_path: format!("{}/", self.src.display()),
            ..ShaderLoaderSettings::default()
        }
    }

    fn loader_with(&self, settings: ShaderLoaderSettings) -> ShaderLoader {
        let mut compilers = CompilerRegistry::new();
        compilers.register(self.device.shader_format(), self.compiler.clone());
        ShaderLoader::new(self.device.clone(), settings).with_compilers(compilers)
    }

    fn loader(&self) -> ShaderLoader {
        self.loader_with(self.settings())
    }

    fn write_source(&self, name: &str, text: &str) {
        let path = self.src.join(name);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, text).unwrap();
    }

    fn cache(&self, name: &str) -> PathBuf {
        self.bin.join(name)
    }
}

fn bytecode_of(shader: &Shader) -> Vec<u8> {
    shader.internal::<HeadlessShader>().unwrap().bytecode.to_vec()
}

// ============================================================================
// Freshness
// ============================================================================

#[test]
fn compile_once_then_load_from_cache() {
    let fx = Fixture::new(ShaderFormat::Spirv);
    fx.write_source("blurCS.wgsl", BLUR_CS);
    let loader = fx.loader();

    let first = loader
        .load_shader(ShaderStage::Compute, "blurCS.cso", ShaderModel::Sm6_0, &["ALPHA", "FOG"])
        .unwrap();
    let second = loader
        .load_shader(ShaderStage::Compute, "blurCS.cso", ShaderModel::Sm6_0, &["ALPHA", "FOG"])
        .unwrap();

    assert_eq!(fx.compiler.calls(), 1);
    assert_eq!(bytecode_of(&first), bytecode_of(&second));

    let cache = fx.cache("blurCS_ALPHA_FOG.cso");
    assert!(cache.is_file());
    assert!(metadata_path(cache.to_str().unwrap()).is_file());
    assert_eq!(second.name(), Some(cache.to_str().unwrap()));
    assert_eq!(loader.shader_error_count(), 0);
    assert_eq!(loader.shader_missing_count(), 0);
    assert_eq!(loader.tracker().registered_shader_count(), 1);
}

#[test]
fn permutations_compile_independently() {
    let fx = Fixture::new(ShaderFormat::Spirv);
    fx.write_source("blurCS.wgsl", BLUR_CS);
    let loader = fx.loader();

    let none: [&str; 0] = [];
    let plain = loader
        .load_shader(ShaderStage::Compute, "blurCS.cso", ShaderModel::Sm6_0, &none)
        .unwrap();
    let alpha = loader
        .load_shader(ShaderStage::Compute, "blurCS.cso", ShaderModel::Sm6_0, &["ALPHA"])
        .unwrap();

    assert_eq!(fx.compiler.calls(), 2);
    assert_ne!(bytecode_of(&plain), bytecode_of(&alpha));
    assert!(fx.cache("blurCS.cso").is_file());
    assert!(fx.cache("blurCS_ALPHA.cso").is_file());
}

#[test]
fn source_edit_triggers_recompile() {
    let fx = Fixture::new(ShaderFormat::Spirv);
    fx.write_source("blurCS.wgsl", BLUR_CS);
    let loader = fx.loader();

    loader
        .load_shader(ShaderStage::Compute, "blurCS.cso", ShaderModel::Sm6_0, &["ALPHA"])
        .unwrap();
    fx.write_source("blurCS.wgsl", &format!("// edited\n{BLUR_CS}"));
    loader
        .load_shader(ShaderStage::Compute, "blurCS.cso", ShaderModel::Sm6_0, &["ALPHA"])
        .unwrap();

    assert_eq!(fx.compiler.calls(), 2);
}

#[test]
fn include_edit_triggers_recompile() {
    let fx = Fixture::new(ShaderFormat::Wgsl);
    fx.write_source("common/scale.wgsl", "const SCALE: f32 = 2.0;\n");
    fx.write_source(
        "post/scaleCS.wgsl",
        "{$ include \"common/scale.wgsl\" $}\n@compute @workgroup_size(1)\nfn main() {\n    let s = SCALE;\n}\n",
    );
    let loader = fx.loader();

    let first = loader
        .load_shader(ShaderStage::Compute, "post/scaleCS.cso", ShaderModel::Sm6_0, &["X"])
        .unwrap();
    fx.write_source("common/scale.wgsl", "const SCALE: f32 = 4.25;\n");
    let second = loader
        .load_shader(ShaderStage::Compute, "post/scaleCS.cso", ShaderModel::Sm6_0, &["X"])
        .unwrap();

    assert_eq!(fx.compiler.calls(), 2);
    assert!(String::from_utf8(bytecode_of(&second)).unwrap().contains("4.25"));
    assert_ne!(bytecode_of(&first), bytecode_of(&second));
    assert!(fx.cache("post/scaleCS_X.cso").is_file());
}

#[test]
fn format_switch_over_shared_cache_recompiles() {
    let fx = Fixture::new(ShaderFormat::Spirv);
    fx.write_source("blurCS.wgsl", BLUR_CS);
    let spirv = fx
        .loader()
        .load_shader(ShaderStage::Compute, "blurCS.cso", ShaderModel::Sm6_0, &["ALPHA"])
        .unwrap();
    assert_eq!(bytecode_of(&spirv)[..4], [0x03, 0x02, 0x23, 0x07]);

    let wgsl_compiler = Arc::new(CountingCompiler::default());
    let mut compilers = CompilerRegistry::new();
    compilers.register(ShaderFormat::Wgsl, wgsl_compiler.clone());
    let wgsl_device = Arc::new(HeadlessDevice::new(ShaderFormat::Wgsl));
    let loader = ShaderLoader::new(wgsl_device, fx.settings()).with_compilers(compilers);

    let wgsl = loader
        .load_shader(ShaderStage::Compute, "blurCS.cso", ShaderModel::Sm6_0, &["ALPHA"])
        .unwrap();
    assert_eq!(wgsl_compiler.calls(), 1);
    assert!(String::from_utf8(bytecode_of(&wgsl)).unwrap().contains("@workgroup_size(64)"));

    // The shared cache entry now holds WGSL, so SPIR-V has to rebuild it.
    fx.loader()
        .load_shader(ShaderStage::Compute, "blurCS.cso", ShaderModel::Sm6_0, &["ALPHA"])
        .unwrap();
    assert_eq!(fx.compiler.calls(), 2);
}

#[test]
fn truncated_binary_is_recompiled() {
    let fx = Fixture::new(ShaderFormat::Spirv);
    fx.write_source("blurCS.wgsl", BLUR_CS);
    let loader = fx.loader();

    let good = loader
        .load_shader(ShaderStage::Compute, "blurCS.cso", ShaderModel::Sm6_0, &["ALPHA"])
        .unwrap();
    let cache = fx.cache("blurCS_ALPHA.cso");
    let bytes = fs::read(&cache).unwrap();
    fs::write(&cache, &bytes[..bytes.len() / 2]).unwrap();

    let again = loader
        .load_shader(ShaderStage::Compute, "blurCS.cso", ShaderModel::Sm6_0, &["ALPHA"])
        .unwrap();
    assert_eq!(fx.compiler.calls(), 2);
    assert_eq!(bytecode_of(&good), bytecode_of(&again));
    assert_eq!(fs::read(&cache).unwrap(), bytes);
}

// ============================================================================
// Failure Handling
// ============================================================================

#[test]
fn failed_compile_falls_back_to_stale_cache() {
    let fx = Fixture::new(ShaderFormat::Spirv);
    fx.write_source("blurCS.wgsl", BLUR_CS);
    let loader = fx.loader();

    let good = loader
        .load_shader(ShaderStage::Compute, "blurCS.cso", ShaderModel::Sm6_0, &["ALPHA"])
        .unwrap();

    fx.write_source("blurCS.wgsl", BROKEN);
    let stale = loader
        .load_shader(ShaderStage::Compute, "blurCS.cso", ShaderModel::Sm6_0, &["ALPHA"])
        .unwrap();

    assert_eq!(bytecode_of(&good), bytecode_of(&stale));
    assert_eq!(loader.shader_error_count(), 1);
    assert_eq!(loader.shader_missing_count(), 0);
}

#[test]
fn failed_compile_without_cache_is_missing() {
    let fx = Fixture::new(ShaderFormat::Spirv);
    fx.write_source("brokenCS.wgsl", BROKEN);
    let loader = fx.loader();

    let err = loader
        .load_shader(ShaderStage::Compute, "brokenCS.cso", ShaderModel::Sm6_0, &["ALPHA"])
        .unwrap_err();

    assert!(matches!(err, ShaderError::MissingBinary(ref name) if name.ends_with("brokenCS_ALPHA.cso")));
    assert_eq!(loader.shader_error_count(), 1);
    assert_eq!(loader.shader_missing_count(), 1);
    assert_eq!(fx.device.created_count(), 0);
    assert!(!fx.cache("brokenCS_ALPHA.cso").is_file());
}

#[test]
fn strict_mode_ignores_stale_cache() {
    let fx = Fixture::new(ShaderFormat::Spirv);
    fx.write_source("blurCS.wgsl", BLUR_CS);
    fx.loader()
        .load_shader(ShaderStage::Compute, "blurCS.cso", ShaderModel::Sm6_0, &["ALPHA"])
        .unwrap();

    fx.write_source("blurCS.wgsl", BROKEN);
    let strict = fx.loader_with(ShaderLoaderSettings {
        strict: true,
        ..fx.settings()
    });
    let err = strict
        .load_shader(ShaderStage::Compute, "blurCS.cso", ShaderModel::Sm6_0, &["ALPHA"])
        .unwrap_err();

    assert!(matches!(err, ShaderError::CompileFailed { .. }));
    assert_eq!(strict.shader_error_count(), 1);
    assert_eq!(strict.shader_missing_count(), 0);
}

#[test]
fn foreign_format_binary_is_not_a_fallback() {
    let fx = Fixture::new(ShaderFormat::Spirv);
    fx.write_source("blurCS.wgsl", BLUR_CS);
    fx.loader()
        .load_shader(ShaderStage::Compute, "blurCS.cso", ShaderModel::Sm6_0, &["ALPHA"])
        .unwrap();

    fx.write_source("blurCS.wgsl", BROKEN);
    let wgsl_device = Arc::new(HeadlessDevice::new(ShaderFormat::Wgsl));
    let mut compilers = CompilerRegistry::new();
    compilers.register(ShaderFormat::Wgsl, Arc::new(NagaCompiler::new()));
    let loader = ShaderLoader::new(wgsl_device.clone(), fx.settings()).with_compilers(compilers);

    let err = loader
        .load_shader(ShaderStage::Compute, "blurCS.cso", ShaderModel::Sm6_0, &["ALPHA"])
        .unwrap_err();
    assert!(matches!(err, ShaderError::MissingBinary(_)));
    assert_eq!(loader.shader_error_count(), 1);
    assert_eq!(loader.shader_missing_count(), 1);
    assert_eq!(wgsl_device.created_count(), 0);
}

#[test]
fn missing_backend_counts_error_and_missing() {
    let fx = Fixture::new(ShaderFormat::Hlsl5);
    let loader = ShaderLoader::new(fx.device.clone(), fx.settings())
        .with_compilers(CompilerRegistry::new());

    let none: [&str; 0] = [];
    assert!(
        loader
            .load_shader(ShaderStage::Pixel, "objectPS.cso", ShaderModel::Sm5_0, &none)
            .is_err()
    );
    assert_eq!(loader.shader_error_count(), 1);
    assert_eq!(loader.shader_missing_count(), 1);

    loader.reset_shader_error_count();
    assert_eq!(loader.shader_error_count(), 0);
    assert_eq!(loader.shader_missing_count(), 0);
}

#[test]
fn unwritable_cache_still_yields_shader() {
    let fx = Fixture::new(ShaderFormat::Spirv);
    fx.write_source("blurCS.wgsl", BLUR_CS);
    // A regular file where the cache directory should be.
    fs::write(&fx.bin, b"not a directory").unwrap();
    let loader = fx.loader();

    let shader = loader
        .load_shader(ShaderStage::Compute, "blurCS.cso", ShaderModel::Sm6_0, &["ALPHA"])
        .unwrap();
    assert!(!bytecode_of(&shader).is_empty());
    assert_eq!(loader.shader_error_count(), 0);
}

#[test]
fn device_rejection_is_an_error() {
    let fx = Fixture::new(ShaderFormat::Spirv);
    fs::create_dir_all(&fx.bin).unwrap();
    // Binary without sidecar is trusted, but it is not SPIR-V.
    fs::write(fx.cache("legacyPS.cso"), b"DXBC").unwrap();
    let loader = fx.loader();

    let none: [&str; 0] = [];
    let err = loader
        .load_shader(ShaderStage::Pixel, "legacyPS.cso", ShaderModel::Sm6_0, &none)
        .unwrap_err();
    assert!(matches!(err, ShaderError::DeviceError(_)));
    assert_eq!(fx.compiler.calls(), 0);
}

// ============================================================================
// Shader Dump
// ============================================================================

#[test]
fn dump_hit_skips_compiler_and_cache() {
    let fx = Fixture::new(ShaderFormat::Metal);
    let loader = fx.loader();
    let key = loader.resolve_cache_filename("objectPS.cso", &["ALPHA"]);
    let dump = ShaderDump::from_entries([(key.clone(), b"fragment float4 main0() {}".to_vec())]);
    let loader = loader.with_dump(Arc::new(dump));

    let shader = loader
        .load_shader(ShaderStage::Pixel, "objectPS.cso", ShaderModel::Sm6_0, &["ALPHA"])
        .unwrap();

    assert_eq!(bytecode_of(&shader), b"fragment float4 main0() {}");
    assert_eq!(fx.compiler.calls(), 0);
    assert!(!Path::new(&key).is_file());
    assert_eq!(loader.tracker().registered_shader_count(), 0);
    assert_eq!(loader.shader_dump_count(), 1);
}

#[test]
fn dump_miss_falls_back_to_compile() {
    let fx = Fixture::new(ShaderFormat::Wgsl);
    fx.write_source("blurCS.wgsl", BLUR_CS);
    let dump = ShaderDump::from_entries([("elsewhere/blurCS.cso", vec![1u8])]);
    let loader = fx.loader().with_dump(Arc::new(dump));

    loader
        .load_shader(ShaderStage::Compute, "blurCS.cso", ShaderModel::Sm6_0, &["ALPHA"])
        .unwrap();
    assert_eq!(fx.compiler.calls(), 1);
    assert_eq!(loader.shader_error_count(), 0);
}

#[derive(RustEmbed)]
#[folder = "tests/fixtures/dump/"]
struct EmbeddedDump;

#[test]
fn embedded_dump_serves_shaders() {
    let dump = ShaderDump::from_embedded::<EmbeddedDump>("shaders/metal/");
    assert!(dump.contains("shaders/metal/blitPS.cso"));
    assert!(dump.contains("shaders/metal/post/tonemapCS_HDR.cso"));

    let fx = Fixture::new(ShaderFormat::Metal);
    let loader = fx
        .loader_with(ShaderLoaderSettings::for_format(ShaderFormat::Metal))
        .with_dump(Arc::new(dump));

    let none: [&str; 0] = [];
    let blit = loader
        .load_shader(ShaderStage::Pixel, "blitPS.cso", ShaderModel::Sm6_0, &none)
        .unwrap();
    let tonemap = loader
        .load_shader(ShaderStage::Compute, "post/tonemapCS.cso", ShaderModel::Sm6_0, &["HDR"])
        .unwrap();

    assert!(String::from_utf8(bytecode_of(&blit)).unwrap().contains("blit"));
    assert_eq!(tonemap.stage(), ShaderStage::Compute);
    assert_eq!(fx.compiler.calls(), 0);
}

// ============================================================================
// Concurrency
// ============================================================================

#[test]
fn concurrent_loads_share_counters() {
    let fx = Fixture::new(ShaderFormat::Spirv);
    fx.write_source("blurCS.wgsl", BLUR_CS);
    fx.write_source("brokenCS.wgsl", BROKEN);
    let loader = Arc::new(fx.loader());

    std::thread::scope(|scope| {
        for i in 0..8 {
            let loader = loader.clone();
            scope.spawn(move || {
                let define = format!("VARIANT={i}");
                loader
                    .load_shader(ShaderStage::Compute, "blurCS.cso", ShaderModel::Sm6_0, &[define.as_str()])
                    .unwrap();
                let _ = loader.load_shader(
                    ShaderStage::Compute,
                    "brokenCS.cso",
                    ShaderModel::Sm6_0,
                    &[define.as_str()],
                );
            });
        }
    });

    assert_eq!(fx.compiler.calls(), 16);
    assert_eq!(loader.shader_error_count(), 8);
    assert_eq!(loader.shader_missing_count(), 8);
    assert_eq!(loader.tracker().registered_shader_count(), 16);
    assert_eq!(fx.device.created_count(), 8);
}
