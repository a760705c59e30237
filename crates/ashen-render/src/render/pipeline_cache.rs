//! Eagerly built pipeline set.
//!
//! [`PipelineCache::new`] builds every (stage, blend mode, wireframe) variant
//! of a [`PipelineTable`] up front, so binding at draw time never compiles.
//! Pipelines live in a dense vector indexed by [`PipelineKeySpace::slot`].

use crate::config::SurfaceInfo;
use crate::device::{Device, FillMode, PipelineDesc, PipelineId, RenderPass, ShaderId};
use crate::error::{RenderError, Result};

use super::blend::color_target;
use super::shader::{ShaderFiles, ShaderLoader};
use super::{BlendMode, PipelineConfig, PipelineKey, PipelineKeySpace, PipelineTable, RenderStage};

/// Every pipeline of one [`PipelineTable`], indexed by key slot.
///
/// Must be released with [`PipelineCache::release`]; dropping it leaks the
/// pipelines.
#[derive(Debug)]
pub struct PipelineCache {
    space: PipelineKeySpace,
    /// Indexed by slot.
    pipelines: Vec<PipelineId>,
}

impl PipelineCache {
    /// Builds all `stages * blend_modes * 2` pipelines of `table`.
    ///
    /// On any failure every pipeline built so far is released and the error
    /// is returned; no partial cache is produced.
    pub fn new<D, F>(
        device: &mut D,
        loader: &ShaderLoader<F>,
        surface: SurfaceInfo,
        table: &PipelineTable,
    ) -> Result<Self>
    where
        D: Device + ?Sized,
        F: ShaderFiles,
    {
        let space = table.key_space();
        let mut pipelines = Vec::with_capacity(space.len());

        for config in table.configs() {
            if let Err(e) = build_stage(device, loader, surface, config, table.blend_modes(), &mut pipelines) {
                for id in pipelines {
                    device.release_pipeline(id);
                }
                return Err(e);
            }
        }

        log::info!(
            "pipeline cache ready: {} stages x {} blend modes x 2 = {} pipelines",
            space.stages(),
            space.blend_modes(),
            pipelines.len()
        );

        Ok(Self { space, pipelines })
    }

    /// Binds the pipeline for (`stage`, `blend_mode`, `wireframe`).
    ///
    /// # Panics
    ///
    /// If the key lies outside the built key space. That means the cache was
    /// built from a table missing this stage or blend mode.
    pub fn bind(&self, pass: &mut RenderPass<'_>, stage: RenderStage, blend_mode: BlendMode, wireframe: bool) {
        let key = PipelineKey::new(stage, blend_mode, wireframe);
        match self.pipeline(key) {
            Some(id) => pass.bind_pipeline(id),
            None => panic!("no pipeline built for {key:?} (cache covers {:?})", self.space),
        }
    }

    pub fn pipeline(&self, key: PipelineKey) -> Option<PipelineId> {
        self.space.slot(key).and_then(|slot| self.pipelines.get(slot).copied())
    }

    pub fn key_space(&self) -> PipelineKeySpace {
        self.space
    }

    pub fn len(&self) -> usize {
        self.pipelines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pipelines.is_empty()
    }

    /// Pipelines in slot order.
    pub fn pipelines(&self) -> &[PipelineId] {
        &self.pipelines
    }

    /// Releases every pipeline. Call before the device is destroyed.
    pub fn release<D: Device + ?Sized>(self, device: &mut D) {
        for id in self.pipelines {
            device.release_pipeline(id);
        }
    }
}

/// Loads both shaders of `config` once, builds every variant of the stage in
/// slot order, then releases the shaders.
fn build_stage<D, F>(
    device: &mut D,
    loader: &ShaderLoader<F>,
    surface: SurfaceInfo,
    config: &PipelineConfig,
    blend_modes: &[BlendMode],
    out: &mut Vec<PipelineId>,
) -> Result<()>
where
    D: Device + ?Sized,
    F: ShaderFiles,
{
    let vertex = loader.load(device, &config.vertex_shader, config.vertex_resources)?;
    let fragment = match loader.load(device, &config.fragment_shader, config.fragment_resources) {
        Ok(id) => id,
        Err(e) => {
            device.release_shader(vertex);
            return Err(e);
        }
    };

    let result = build_variants(device, surface, config, blend_modes, (vertex, fragment), out);

    device.release_shader(vertex);
    device.release_shader(fragment);
    result
}

fn build_variants<D: Device + ?Sized>(
    device: &mut D,
    surface: SurfaceInfo,
    config: &PipelineConfig,
    blend_modes: &[BlendMode],
    (vertex, fragment): (ShaderId, ShaderId),
    out: &mut Vec<PipelineId>,
) -> Result<()> {
    for &blend_mode in blend_modes {
        for wireframe in [false, true] {
            let label = format!("{:?}/{blend_mode:?}{}", config.stage, if wireframe { "/wireframe" } else { "" });

            let desc = PipelineDesc {
                label: &label,
                vertex_shader: vertex,
                fragment_shader: fragment,
                vertex_buffers: &config.vertex_buffers,
                vertex_attributes: &config.vertex_attributes,
                color_target: color_target(surface.format, blend_mode),
                fill_mode: if wireframe { FillMode::Line } else { FillMode::Fill },
            };

            let id = device.create_pipeline(&desc).map_err(|e| {
                log::error!("failed to create pipeline `{label}`: {e}");
                RenderError::PipelineCreation {
                    stage: config.stage,
                    blend_mode,
                    wireframe,
                    reason: e.to_string(),
                }
            })?;

            log::debug!("pipeline `{label}` built");
            out.push(id);
        }
    }
    Ok(())
}
