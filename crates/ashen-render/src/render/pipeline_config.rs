//! Static per-stage pipeline descriptions.

use crate::device::{ShaderResourceCounts, VertexAttribute, VertexBufferDesc};
use crate::error::{RenderError, Result};

use super::vertex::{ColorVertex, TexturedVertex, VertexLayout};
use super::{BlendMode, PipelineKeySpace, RenderStage};

/// Everything needed to build the pipelines of one [`RenderStage`].
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    pub stage: RenderStage,

    /// Shader base names including the stage suffix, e.g. `"2dPrimitive.vert"`.
    pub vertex_shader: String,
    pub fragment_shader: String,

    pub vertex_resources: ShaderResourceCounts,
    pub fragment_resources: ShaderResourceCounts,

    pub vertex_buffers: Vec<VertexBufferDesc>,
    pub vertex_attributes: Vec<VertexAttribute>,
}

impl PipelineConfig {
    /// Config with no shader resources and no vertex input.
    pub fn new(stage: RenderStage, vertex_shader: impl Into<String>, fragment_shader: impl Into<String>) -> Self {
        Self {
            stage,
            vertex_shader: vertex_shader.into(),
            fragment_shader: fragment_shader.into(),
            vertex_resources: ShaderResourceCounts::default(),
            fragment_resources: ShaderResourceCounts::default(),
            vertex_buffers: Vec::new(),
            vertex_attributes: Vec::new(),
        }
    }

    pub fn with_layout(mut self, layout: VertexLayout) -> Self {
        self.vertex_buffers = layout.buffers.to_vec();
        self.vertex_attributes = layout.attributes.to_vec();
        self
    }

    pub fn with_vertex_resources(mut self, resources: ShaderResourceCounts) -> Self {
        self.vertex_resources = resources;
        self
    }

    pub fn with_fragment_resources(mut self, resources: ShaderResourceCounts) -> Self {
        self.fragment_resources = resources;
        self
    }
}

/// Read-only table of stage configs and the blend modes to build.
///
/// Configs cover a prefix of [`RenderStage::ALL`] in order and blend modes a
/// prefix of [`BlendMode::ALL`], so every built key has a unique dense slot.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineTable {
    configs: Vec<PipelineConfig>,
    blend_modes: Vec<BlendMode>,
}

impl PipelineTable {
    pub fn new(configs: Vec<PipelineConfig>, blend_modes: Vec<BlendMode>) -> Result<Self> {
        if configs.is_empty() {
            return Err(RenderError::MissingStageConfig { stage: RenderStage::ALL[0] });
        }
        for (i, config) in configs.iter().enumerate() {
            match RenderStage::from_index(i) {
                Some(expected) if expected == config.stage => {}
                Some(expected) if !configs[..i].iter().any(|c| c.stage == config.stage) => {
                    return Err(RenderError::MissingStageConfig { stage: expected });
                }
                _ => return Err(RenderError::DuplicateStageConfig { stage: config.stage }),
            }
        }

        let is_prefix = !blend_modes.is_empty()
            && blend_modes.len() <= BlendMode::COUNT
            && blend_modes.iter().zip(BlendMode::ALL).all(|(a, b)| *a == b);
        if !is_prefix {
            return Err(RenderError::InvalidBlendModes { modes: blend_modes });
        }

        Ok(Self { configs, blend_modes })
    }

    /// Built-in table: every render stage with every blend mode.
    pub fn standard() -> Self {
        let uniform = ShaderResourceCounts {
            uniform_buffers: 1,
            ..Default::default()
        };
        let sampler = ShaderResourceCounts {
            samplers: 1,
            ..Default::default()
        };

        let configs = vec![
            PipelineConfig::new(RenderStage::Primitive2d, "2dPrimitive.vert", "2dPrimitive.frag")
                .with_layout(ColorVertex::layout())
                .with_fragment_resources(uniform),
            PipelineConfig::new(RenderStage::Primitive2dTextured, "TexturedQuad.vert", "TexturedQuad.frag")
                .with_layout(TexturedVertex::layout())
                .with_fragment_resources(sampler),
            PipelineConfig::new(RenderStage::Vignette, "Vignette.vert", "Vignette.frag")
                .with_layout(VertexLayout::EMPTY)
                .with_fragment_resources(ShaderResourceCounts {
                    samplers: 1,
                    uniform_buffers: 1,
                    ..Default::default()
                }),
        ];

        Self {
            configs,
            blend_modes: BlendMode::ALL.to_vec(),
        }
    }

    pub fn configs(&self) -> &[PipelineConfig] {
        &self.configs
    }

    pub fn blend_modes(&self) -> &[BlendMode] {
        &self.blend_modes
    }

    pub fn config(&self, stage: RenderStage) -> Option<&PipelineConfig> {
        self.configs.get(stage.index())
    }

    pub fn key_space(&self) -> PipelineKeySpace {
        PipelineKeySpace::new(self.configs.len(), self.blend_modes.len())
    }
}
