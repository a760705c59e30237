//! Backend-agnostic descriptors and enums.
//!
//! These mirror the subset of native graphics API state this layer needs.
//! Backends translate them into their own types.

use bitflags::bitflags;

use super::{ShaderId, TextureId};

// ── shader formats ────────────────────────────────────────────────────────

bitflags! {
    /// Set of shader binary formats a device can consume.
    #[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
    pub struct ShaderFormats: u32 {
        const SPIRV    = 1 << 0;
        const DXBC     = 1 << 1;
        const DXIL     = 1 << 2;
        const MSL      = 1 << 3;
        const METALLIB = 1 << 4;
    }
}

/// A single shader binary format.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum ShaderFormat {
    Spirv,
    Dxbc,
    Dxil,
    Msl,
    Metallib,
}

impl ShaderFormat {
    /// File extension of precompiled binaries in this format.
    pub const fn extension(self) -> &'static str {
        match self {
            ShaderFormat::Spirv => "spv",
            ShaderFormat::Dxbc => "dxbc",
            ShaderFormat::Dxil => "dxil",
            ShaderFormat::Msl => "msl",
            ShaderFormat::Metallib => "metallib",
        }
    }

    /// Entry-point symbol emitted by the cross-compiler for this format.
    ///
    /// Metal sources get a numbered default (`main0`); the rest keep `main`.
    pub const fn entry_point(self) -> &'static str {
        match self {
            ShaderFormat::Msl | ShaderFormat::Metallib => "main0",
            ShaderFormat::Spirv | ShaderFormat::Dxbc | ShaderFormat::Dxil => "main",
        }
    }

    pub const fn flag(self) -> ShaderFormats {
        match self {
            ShaderFormat::Spirv => ShaderFormats::SPIRV,
            ShaderFormat::Dxbc => ShaderFormats::DXBC,
            ShaderFormat::Dxil => ShaderFormats::DXIL,
            ShaderFormat::Msl => ShaderFormats::MSL,
            ShaderFormat::Metallib => ShaderFormats::METALLIB,
        }
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

/// Number of resources a shader stage declares, per binding kind.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq, Hash)]
pub struct ShaderResourceCounts {
    pub samplers: u32,
    pub uniform_buffers: u32,
    pub storage_buffers: u32,
    pub storage_textures: u32,
}

#[derive(Debug, Clone)]
pub struct ShaderDesc<'a> {
    pub label: &'a str,
    pub code: &'a [u8],
    pub entry_point: &'a str,
    pub format: ShaderFormat,
    pub stage: ShaderStage,
    pub resources: ShaderResourceCounts,
}

// ── buffers ───────────────────────────────────────────────────────────────

bitflags! {
    #[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
    pub struct BufferUsages: u32 {
        const VERTEX   = 1 << 0;
        const INDEX    = 1 << 1;
        const INDIRECT = 1 << 2;
        const STORAGE  = 1 << 3;
    }
}

#[derive(Debug, Clone)]
pub struct BufferDesc<'a> {
    pub label: &'a str,
    pub usage: BufferUsages,
    /// Size in bytes.
    pub size: u64,
}

/// Buffer plus byte offset, as consumed by bind commands.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct BufferBinding {
    pub buffer: super::BufferId,
    pub offset: u64,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum IndexFormat {
    Uint16,
    Uint32,
}

impl IndexFormat {
    pub const fn size(self) -> u64 {
        match self {
            IndexFormat::Uint16 => 2,
            IndexFormat::Uint32 => 4,
        }
    }
}

// ── textures ──────────────────────────────────────────────────────────────

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum TextureFormat {
    R8Unorm,
    Rgba8Unorm,
    Rgba8UnormSrgb,
    Bgra8Unorm,
    Bgra8UnormSrgb,
}

impl TextureFormat {
    pub const fn bytes_per_pixel(self) -> u32 {
        match self {
            TextureFormat::R8Unorm => 1,
            TextureFormat::Rgba8Unorm
            | TextureFormat::Rgba8UnormSrgb
            | TextureFormat::Bgra8Unorm
            | TextureFormat::Bgra8UnormSrgb => 4,
        }
    }
}

bitflags! {
    #[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
    pub struct TextureUsages: u32 {
        const SAMPLER      = 1 << 0;
        const COLOR_TARGET = 1 << 1;
    }
}

#[derive(Debug, Clone)]
pub struct TextureDesc<'a> {
    pub label: &'a str,
    pub width: u32,
    pub height: u32,
    pub format: TextureFormat,
    pub usage: TextureUsages,
}

/// Sampler filter used when a texture is bound for drawing.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq, Hash)]
pub enum TextureFilter {
    #[default]
    Nearest,
    Linear,
}

// ── vertex input ──────────────────────────────────────────────────────────

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum VertexStepMode {
    Vertex,
    Instance,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum VertexFormat {
    Float2,
    Float3,
    Float4,
    Ubyte4Norm,
}

impl VertexFormat {
    pub const fn size(self) -> u32 {
        match self {
            VertexFormat::Float2 => 8,
            VertexFormat::Float3 => 12,
            VertexFormat::Float4 => 16,
            VertexFormat::Ubyte4Norm => 4,
        }
    }
}

/// One vertex buffer slot as seen by a pipeline.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct VertexBufferDesc {
    pub slot: u32,
    /// Bytes between consecutive elements.
    pub stride: u32,
    pub step_mode: VertexStepMode,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct VertexAttribute {
    pub location: u32,
    pub buffer_slot: u32,
    pub format: VertexFormat,
    /// Byte offset within one element.
    pub offset: u32,
}

// ── blend / raster state ──────────────────────────────────────────────────

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum BlendFactor {
    Zero,
    One,
    SrcColor,
    OneMinusSrcColor,
    SrcAlpha,
    OneMinusSrcAlpha,
    DstColor,
    OneMinusDstColor,
    DstAlpha,
    OneMinusDstAlpha,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum BlendOperation {
    Add,
    Subtract,
    ReverseSubtract,
    Min,
    Max,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct BlendComponent {
    pub src_factor: BlendFactor,
    pub dst_factor: BlendFactor,
    pub operation: BlendOperation,
}

impl BlendComponent {
    pub const fn new(src_factor: BlendFactor, dst_factor: BlendFactor, operation: BlendOperation) -> Self {
        Self { src_factor, dst_factor, operation }
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct BlendState {
    pub color: BlendComponent,
    pub alpha: BlendComponent,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct ColorTargetDesc {
    pub format: TextureFormat,
    /// `None` disables blending (source replaces destination).
    pub blend: Option<BlendState>,
}

#[derive(Debug, Copy, Clone, Default, Eq, PartialEq, Hash)]
pub enum FillMode {
    #[default]
    Fill,
    Line,
}

#[derive(Debug, Clone)]
pub struct PipelineDesc<'a> {
    pub label: &'a str,
    pub vertex_shader: ShaderId,
    pub fragment_shader: ShaderId,
    pub vertex_buffers: &'a [VertexBufferDesc],
    pub vertex_attributes: &'a [VertexAttribute],
    pub color_target: ColorTargetDesc,
    pub fill_mode: FillMode,
}

// ── render targets ────────────────────────────────────────────────────────

#[derive(Debug, Copy, Clone, PartialEq)]
pub enum LoadOp {
    Load,
    Clear([f32; 4]),
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct ColorTargetInfo {
    pub texture: TextureId,
    pub load: LoadOp,
}
