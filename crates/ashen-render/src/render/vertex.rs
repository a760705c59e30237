//! Vertex types shared by the built-in render stages.

use bytemuck::{Pod, Zeroable};

use crate::device::{VertexAttribute, VertexBufferDesc, VertexFormat, VertexStepMode};

/// Vertex buffer slots and attributes consumed by one pipeline.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct VertexLayout {
    pub buffers: &'static [VertexBufferDesc],
    pub attributes: &'static [VertexAttribute],
}

impl VertexLayout {
    /// No vertex input; the vertex shader generates its own positions.
    pub const EMPTY: VertexLayout = VertexLayout { buffers: &[], attributes: &[] };
}

const fn per_vertex(stride: usize) -> [VertexBufferDesc; 1] {
    [VertexBufferDesc {
        slot: 0,
        stride: stride as u32,
        step_mode: VertexStepMode::Vertex,
    }]
}

const fn attr(location: u32, format: VertexFormat, offset: u32) -> VertexAttribute {
    VertexAttribute { location, buffer_slot: 0, format, offset }
}

// ── color vertex ──────────────────────────────────────────────────────────

#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Pod, Zeroable)]
pub struct ColorVertex {
    pub position: [f32; 3],
    pub color: [f32; 4],
}

impl ColorVertex {
    const BUFFERS: [VertexBufferDesc; 1] = per_vertex(std::mem::size_of::<ColorVertex>());
    const ATTRS: [VertexAttribute; 2] = [attr(0, VertexFormat::Float3, 0), attr(1, VertexFormat::Float4, 12)];

    pub const fn new(position: [f32; 3], color: [f32; 4]) -> Self {
        Self { position, color }
    }

    pub const fn layout() -> VertexLayout {
        VertexLayout {
            buffers: &Self::BUFFERS,
            attributes: &Self::ATTRS,
        }
    }
}

// ── textured vertex ───────────────────────────────────────────────────────

#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Pod, Zeroable)]
pub struct TexturedVertex {
    pub position: [f32; 3],
    pub uv: [f32; 2],
}

impl TexturedVertex {
    const BUFFERS: [VertexBufferDesc; 1] = per_vertex(std::mem::size_of::<TexturedVertex>());
    const ATTRS: [VertexAttribute; 2] = [attr(0, VertexFormat::Float3, 0), attr(1, VertexFormat::Float2, 12)];

    pub const fn new(position: [f32; 3], uv: [f32; 2]) -> Self {
        Self { position, uv }
    }

    pub const fn layout() -> VertexLayout {
        VertexLayout {
            buffers: &Self::BUFFERS,
            attributes: &Self::ATTRS,
        }
    }
}
