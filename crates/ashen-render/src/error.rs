//! Error types for the rendering backend layer.
//!
//! Failures fall into three categories (see [`ErrorCategory`]):
//! - configuration errors, detected at startup and fatal for the renderer
//! - resource-creation errors, fatal for the one resource being built
//! - buffer overflows, rejected per call before any data is copied
//!
//! Nothing in this crate retries. A failed construction yields no handle and
//! a fresh construction is required.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::device::{DeviceError, ShaderFormats};
use crate::render::{BlendMode, RenderStage};

/// Kind of GPU resource, used for diagnostics and allocation probes.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum ResourceKind {
    Buffer,
    TransferBuffer,
    Shader,
    Pipeline,
    Texture,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 5] = [
        ResourceKind::Buffer,
        ResourceKind::TransferBuffer,
        ResourceKind::Shader,
        ResourceKind::Pipeline,
        ResourceKind::Texture,
    ];
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ResourceKind::Buffer => "buffer",
            ResourceKind::TransferBuffer => "transfer buffer",
            ResourceKind::Shader => "shader",
            ResourceKind::Pipeline => "pipeline",
            ResourceKind::Texture => "texture",
        };
        f.write_str(s)
    }
}

/// Coarse failure taxonomy.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum ErrorCategory {
    /// Startup-time and fatal; the renderer must not proceed.
    Configuration,
    /// Load-time and fatal for the specific resource.
    ResourceCreation,
    /// Per-call range violation; nothing was written.
    BufferOverflow,
}

#[derive(Error, Debug)]
pub enum RenderError {
    /// Shader name carries neither a `.vert` nor a `.frag` suffix.
    #[error("invalid shader stage for `{name}`: expected a `.vert` or `.frag` suffix")]
    InvalidStage { name: String },

    /// None of the accepted shader formats is supported by the device.
    #[error("no accepted shader format is supported by the device (device supports {supported:?})")]
    UnsupportedFormat { supported: ShaderFormats },

    #[error("shader file not found: {}", path.display())]
    FileNotFound { path: PathBuf },

    #[error("failed to read shader `{}`: {source}", path.display())]
    ShaderIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The device refused to create a shader object from the loaded bytes.
    #[error("failed to create shader `{name}`: {reason}")]
    CompileError { name: String, reason: String },

    #[error("no pipeline config for render stage {stage:?}")]
    MissingStageConfig { stage: RenderStage },

    #[error("render stage {stage:?} configured more than once")]
    DuplicateStageConfig { stage: RenderStage },

    #[error("blend modes must be a prefix of the blend mode order, got {modes:?}")]
    InvalidBlendModes { modes: Vec<BlendMode> },

    #[error(
        "failed to create graphics pipeline for {stage:?}, blend mode {blend_mode:?}, wireframe {wireframe}: {reason}"
    )]
    PipelineCreation {
        stage: RenderStage,
        blend_mode: BlendMode,
        wireframe: bool,
        reason: String,
    },

    #[error("buffer `{name}` has no vertex, index or indirect usage")]
    InvalidUsage { name: String },

    #[error("failed to create {kind} `{name}`: {reason}")]
    ResourceCreation {
        kind: ResourceKind,
        name: String,
        reason: String,
    },

    /// `start + len` exceeds the buffer capacity (both in elements).
    #[error("update of buffer `{name}` out of range: start {start} + len {len} > capacity {capacity}")]
    BufferOverflow {
        name: String,
        start: usize,
        len: usize,
        capacity: usize,
    },

    #[error(transparent)]
    Device(#[from] DeviceError),
}

impl RenderError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            RenderError::InvalidStage { .. }
            | RenderError::UnsupportedFormat { .. }
            | RenderError::MissingStageConfig { .. }
            | RenderError::DuplicateStageConfig { .. }
            | RenderError::InvalidBlendModes { .. }
            | RenderError::PipelineCreation { .. } => ErrorCategory::Configuration,

            RenderError::FileNotFound { .. }
            | RenderError::ShaderIo { .. }
            | RenderError::CompileError { .. }
            | RenderError::InvalidUsage { .. }
            | RenderError::ResourceCreation { .. }
            | RenderError::Device(_) => ErrorCategory::ResourceCreation,

            RenderError::BufferOverflow { .. } => ErrorCategory::BufferOverflow,
        }
    }

    /// Builds a [`RenderError::ResourceCreation`] and logs it with context.
    pub(crate) fn creation(kind: ResourceKind, name: &str, err: impl fmt::Display) -> Self {
        log::error!("failed to create {kind} `{name}`: {err}");
        RenderError::ResourceCreation {
            kind,
            name: name.to_owned(),
            reason: err.to_string(),
        }
    }
}

/// Alias for `Result<T, RenderError>`.
pub type Result<T> = std::result::Result<T, RenderError>;
