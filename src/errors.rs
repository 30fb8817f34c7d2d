//! Error Types
//!
//! This module defines the error types used throughout the shader pipeline.
//!
//! # Overview
//!
//! The main error type [`ShaderError`] covers all failure modes including:
//! - Cache and source file I/O
//! - Sidecar metadata encoding/decoding
//! - Backend compiler failures
//! - Graphics device shader creation
//!
//! # Usage
//!
//! All fallible public APIs return [`Result<T>`] which is an alias for
//! `std::result::Result<T, ShaderError>`.
//!
//! ```rust,ignore
//! use shader_pipeline::errors::{ShaderError, Result};
//!
//! fn load() -> Result<()> {
//!     // Operations that may fail return Result
//!     Ok(())
//! }
//! ```

use thiserror::Error;

use crate::types::ShaderFormat;

/// The main error type for the shader pipeline.
///
/// [`ShaderLoader`](crate::loader::ShaderLoader) never escalates these to
/// process-fatal conditions; they surface as the `Err` side of a single load
/// request, while the loader's counters record what happened.
#[derive(Error, Debug)]
pub enum ShaderError {
    // ========================================================================
    // I/O Errors
    // ========================================================================
    /// File I/O error.
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// No cache binary exists and no valid compile output was produced.
    #[error("Shader binary missing: {0}")]
    MissingBinary(String),

    // ========================================================================
    // Metadata Errors
    // ========================================================================
    /// Sidecar metadata could not be encoded or decoded.
    #[error("Shader metadata error: {0}")]
    MetadataError(#[from] serde_json::Error),

    /// Sidecar metadata was written by an incompatible version.
    #[error("Unsupported shader metadata version {found} (expected {expected})")]
    MetadataVersion {
        /// Version found on disk
        found: u32,
        /// Version this build writes
        expected: u32,
    },

    // ========================================================================
    // Compilation Errors
    // ========================================================================
    /// The backend compiler rejected the source.
    #[error("Shader compile failed: {filename}\n{message}")]
    CompileFailed {
        /// Resolved cache filename of the permutation
        filename: String,
        /// Full diagnostic produced by the backend
        message: String,
    },

    /// No compiler backend is registered for the requested format.
    #[error("No shader compiler registered for format {0}")]
    NoCompiler(ShaderFormat),

    /// Unknown shader format name.
    #[error("Unknown shader format: {0}")]
    UnknownFormat(String),

    // ========================================================================
    // Device Errors
    // ========================================================================
    /// The graphics device refused to create the shader object.
    #[error("Device failed to create shader: {0}")]
    DeviceError(String),
}

/// Alias for `Result<T, ShaderError>`.
pub type Result<T> = std::result::Result<T, ShaderError>;
