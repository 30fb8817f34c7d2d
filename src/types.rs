//! Shader Stage / Format / Model
//!
//! Plain enums shared by every layer of the pipeline. They carry no backend
//! state; backends translate them into their own profile strings.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::ShaderError;

// ─── ShaderStage ──────────────────────────────────────────────────────────────

/// Pipeline stage a shader binds to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShaderStage {
    Vertex,
    Pixel,
    Compute,
    Geometry,
    Hull,
    Domain,
    Mesh,
    Amplification,
    Library,
}

impl ShaderStage {
    /// Number of stages.
    pub const COUNT: usize = 9;

    /// Every stage, in declaration order.
    pub const ALL: [ShaderStage; Self::COUNT] = [
        Self::Vertex,
        Self::Pixel,
        Self::Compute,
        Self::Geometry,
        Self::Hull,
        Self::Domain,
        Self::Mesh,
        Self::Amplification,
        Self::Library,
    ];

    /// HLSL target profile prefix (`vs`, `ps`, ...).
    #[inline]
    #[must_use]
    pub fn profile_prefix(self) -> &'static str {
        match self {
            Self::Vertex => "vs",
            Self::Pixel => "ps",
            Self::Compute => "cs",
            Self::Geometry => "gs",
            Self::Hull => "hs",
            Self::Domain => "ds",
            Self::Mesh => "ms",
            Self::Amplification => "as",
            Self::Library => "lib",
        }
    }
}

impl fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Vertex => "vertex",
            Self::Pixel => "pixel",
            Self::Compute => "compute",
            Self::Geometry => "geometry",
            Self::Hull => "hull",
            Self::Domain => "domain",
            Self::Mesh => "mesh",
            Self::Amplification => "amplification",
            Self::Library => "library",
        };
        f.write_str(name)
    }
}

// ─── ShaderModel ──────────────────────────────────────────────────────────────

/// Minimum shader feature level.
///
/// A requested model is a lower bound: a backend is free to target a higher
/// one.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum ShaderModel {
    #[serde(rename = "5_0")]
    Sm5_0,
    #[default]
    #[serde(rename = "6_0")]
    Sm6_0,
    #[serde(rename = "6_1")]
    Sm6_1,
    #[serde(rename = "6_2")]
    Sm6_2,
    #[serde(rename = "6_3")]
    Sm6_3,
    #[serde(rename = "6_4")]
    Sm6_4,
    #[serde(rename = "6_5")]
    Sm6_5,
    #[serde(rename = "6_6")]
    Sm6_6,
    #[serde(rename = "6_7")]
    Sm6_7,
}

impl ShaderModel {
    /// Profile suffix as used in `ps_6_5`.
    #[must_use]
    pub fn profile_suffix(self) -> &'static str {
        match self {
            Self::Sm5_0 => "5_0",
            Self::Sm6_0 => "6_0",
            Self::Sm6_1 => "6_1",
            Self::Sm6_2 => "6_2",
            Self::Sm6_3 => "6_3",
            Self::Sm6_4 => "6_4",
            Self::Sm6_5 => "6_5",
            Self::Sm6_6 => "6_6",
            Self::Sm6_7 => "6_7",
        }
    }
}

// ─── ShaderFormat ─────────────────────────────────────────────────────────────

/// Target bytecode dialect. Selects the compiler backend.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum ShaderFormat {
    #[default]
    None,
    /// DXBC (Direct3D 11)
    Hlsl5,
    /// DXIL (Direct3D 12)
    Hlsl6,
    /// SPIR-V (Vulkan)
    Spirv,
    /// Metal Shading Language
    Metal,
    /// Validated WGSL (WebGPU)
    Wgsl,
}

impl ShaderFormat {
    /// Every concrete format.
    pub const ALL: [ShaderFormat; 5] = [
        Self::Hlsl5,
        Self::Hlsl6,
        Self::Spirv,
        Self::Metal,
        Self::Wgsl,
    ];

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Hlsl5 => "hlsl5",
            Self::Hlsl6 => "hlsl6",
            Self::Spirv => "spirv",
            Self::Metal => "metal",
            Self::Wgsl => "wgsl",
        }
    }

    /// Whether the dialect can express the given stage at all.
    #[must_use]
    pub fn supports_stage(self, stage: ShaderStage) -> bool {
        match self {
            Self::None => false,
            Self::Hlsl5 => !matches!(
                stage,
                ShaderStage::Mesh | ShaderStage::Amplification | ShaderStage::Library
            ),
            Self::Hlsl6 | Self::Spirv | Self::Metal | Self::Wgsl => true,
        }
    }

    /// Whether the dialect can satisfy the given minimum shader model.
    #[must_use]
    pub fn supports_shader_model(self, model: ShaderModel) -> bool {
        match self {
            Self::None => false,
            Self::Hlsl5 => model <= ShaderModel::Sm5_0,
            Self::Hlsl6 | Self::Spirv | Self::Metal | Self::Wgsl => true,
        }
    }
}

impl fmt::Display for ShaderFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ShaderFormat {
    type Err = ShaderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|format| format.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| ShaderError::UnknownFormat(s.to_string()))
    }
}
