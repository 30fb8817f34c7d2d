//! Source Preprocessor
//!
//! WGSL has no `#include` or `#ifdef`, so sources fed to the in-process
//! backend go through a minijinja environment first:
//!
//! ```text
//! {$ include "common/lighting.wgsl" $}
//! $$ if ALPHA
//! let alpha = sample_alpha(uv);
//! $$ endif
//! ```
//!
//! Permutation defines become template variables (`NAME` → `VALUE`, or `"1"`).
//! The loader resolves template names against the include directories and
//! records every file it reads, which is how the dependency list of a compile
//! is discovered.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use minijinja::{Environment, Error, ErrorKind, UndefinedBehavior, syntax::SyntaxConfig};
use parking_lot::Mutex;
use rustc_hash::FxHashSet;

use super::split_define;

/// Expanded source plus the files read while expanding it.
#[derive(Debug, Clone)]
pub struct Preprocessed {
    pub source: String,
    pub dependencies: Vec<PathBuf>,
}

/// Failure with whatever dependencies were discovered before it.
#[derive(Debug, Clone)]
pub struct PreprocessError {
    pub message: String,
    pub dependencies: Vec<PathBuf>,
}

#[derive(Default)]
struct DependencyLog {
    seen: FxHashSet<PathBuf>,
    ordered: Vec<PathBuf>,
}

impl DependencyLog {
    fn record(&mut self, path: &Path) {
        if self.seen.insert(path.to_path_buf()) {
            self.ordered.push(path.to_path_buf());
        }
    }
}

fn resolve(name: &str, include_directories: &[PathBuf]) -> Option<PathBuf> {
    let candidate = Path::new(name);
    if candidate.is_absolute() {
        return candidate.is_file().then(|| candidate.to_path_buf());
    }
    include_directories
        .iter()
        .map(|dir| dir.join(candidate))
        .find(|path| path.is_file())
}

fn build_environment(
    include_directories: Vec<PathBuf>,
    log: Arc<Mutex<DependencyLog>>,
) -> Result<Environment<'static>, Error> {
    let mut env = Environment::new();

    let syntax = SyntaxConfig::builder()
        .block_delimiters("{$", "$}")
        .variable_delimiters("{{", "}}")
        .line_statement_prefix("$$")
        .build()?;

    env.set_syntax(syntax);
    env.set_trim_blocks(true);
    env.set_lstrip_blocks(true);
    env.set_keep_trailing_newline(true);
    env.set_undefined_behavior(UndefinedBehavior::SemiStrict);

    env.set_loader(move |name| {
        let Some(path) = resolve(name, &include_directories) else {
            return Ok(None);
        };
        log.lock().record(&path);
        std::fs::read_to_string(&path).map(Some).map_err(|e| {
            Error::new(
                ErrorKind::TemplateNotFound,
                format!("failed to read {}: {e}", path.display()),
            )
        })
    });

    Ok(env)
}

/// Expands `source_filename` with `defines` as template variables.
pub fn preprocess(
    source_filename: &Path,
    include_directories: &[PathBuf],
    defines: &[String],
) -> Result<Preprocessed, PreprocessError> {
    let log = Arc::new(Mutex::new(DependencyLog::default()));
    let fail = |message: String, log: &Mutex<DependencyLog>| PreprocessError {
        message,
        dependencies: log.lock().ordered.clone(),
    };

    if !source_filename.is_file() {
        // Still a dependency: creating it later must invalidate the cache entry.
        log.lock().record(source_filename);
        return Err(fail(
            format!("shader source not found: {}", source_filename.display()),
            &log,
        ));
    }

    let env = build_environment(include_directories.to_vec(), log.clone())
        .map_err(|e| fail(format!("{e:#}"), &log))?;

    let context: std::collections::BTreeMap<&str, &str> =
        defines.iter().map(|define| split_define(define)).collect();

    let root = source_filename.to_string_lossy();
    let rendered = env
        .get_template(&root)
        .and_then(|template| template.render(&context));

    match rendered {
        Ok(source) => Ok(Preprocessed {
            source,
            dependencies: log.lock().ordered.clone(),
        }),
        Err(e) => Err(fail(format!("{e:#}"), &log)),
    }
}
