//! GPU resource layer.
//!
//! Turns backend-agnostic draw requests into device objects:
//! - [`ShaderLoader`] picks a precompiled shader binary for the device
//! - [`PipelineCache`] builds every (stage, blend mode, wireframe) pipeline up front
//! - [`GpuBuffer`] and [`Texture`] upload data through copy passes
//!
//! Convention:
//! - Resources borrow the device per call; they never own it.
//! - Every resource is released explicitly, exactly once, before the device.

mod blend;
mod buffer;
mod key;
mod pipeline_cache;
mod pipeline_config;
mod shader;
mod texture;
mod vertex;

pub use blend::{blend_state, color_target};
pub use buffer::GpuBuffer;
pub use key::{BlendMode, PipelineKey, PipelineKeySpace, RenderStage};
pub use pipeline_cache::PipelineCache;
pub use pipeline_config::{PipelineConfig, PipelineTable};
pub use shader::{stage_from_name, MemoryShaderFiles, ShaderDir, ShaderFiles, ShaderLoader};
pub use texture::{DecodedImage, DeferredImage, PixelSource, Texture};
pub use vertex::{ColorVertex, TexturedVertex, VertexLayout};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{RenderConfig, SurfaceInfo};
    use crate::device::{
        BufferUsages, ColorTargetInfo, Device, DeviceError, LoadOp, SoftwareDevice, TextureFilter, TextureFormat,
    };
    use crate::error::ResourceKind;

    const CODE: &[u8] = &[0x03, 0x02, 0x23, 0x07];

    fn standard_setup(config: &RenderConfig) -> (SoftwareDevice, PipelineCache) {
        let table = PipelineTable::standard();
        let mut files = MemoryShaderFiles::new();
        for c in table.configs() {
            files.insert(config.shaders_dir.join(format!("{}.spv", c.vertex_shader)), CODE);
            files.insert(config.shaders_dir.join(format!("{}.spv", c.fragment_shader)), CODE);
        }
        let loader = ShaderLoader::with_files(config.shaders_dir.clone(), files);

        let mut device = SoftwareDevice::default();
        let cache = PipelineCache::new(&mut device, &loader, SurfaceInfo::from(config), &table).unwrap();
        (device, cache)
    }

    // ── frame ─────────────────────────────────────────────────────────────

    #[test]
    fn one_frame_copy_then_render() {
        crate::logging::init_test_logging();

        let config = RenderConfig::default();
        let (mut device, cache) = standard_setup(&config);

        let quad = [
            TexturedVertex::new([0.0, 0.0, 0.0], [0.0, 0.0]),
            TexturedVertex::new([1.0, 0.0, 0.0], [1.0, 0.0]),
            TexturedVertex::new([1.0, 1.0, 0.0], [1.0, 1.0]),
            TexturedVertex::new([0.0, 1.0, 0.0], [0.0, 1.0]),
        ];
        let indices: [u16; 6] = [0, 1, 2, 0, 2, 3];

        let verts = GpuBuffer::<TexturedVertex>::new(&mut device, BufferUsages::VERTEX, 64, "quad verts").unwrap();
        let index = GpuBuffer::<u16>::new(&mut device, BufferUsages::INDEX, 96, "quad indices").unwrap();
        let target = Texture::render_target(&mut device, "frame", 4, 4, config.surface_format).unwrap();
        let mut image = DecodedImage::new(1, 1, TextureFormat::Rgba8Unorm, vec![10, 20, 30, 255]);

        let mut cmd = device.acquire_command_buffer();
        let sprite = {
            let mut copy = cmd.begin_copy_pass();
            verts.update(&mut device, &mut copy, &quad, 0).unwrap();
            index.update(&mut device, &mut copy, &indices, 0).unwrap();
            Texture::new(&mut device, &mut copy, &mut image).unwrap()
        };
        {
            let mut pass = cmd.begin_render_pass(ColorTargetInfo {
                texture: target.id(),
                load: LoadOp::Clear([0.0, 0.0, 1.0, 1.0]),
            });
            cache.bind(&mut pass, RenderStage::Primitive2dTextured, BlendMode::Alpha, false);
            verts.bind(&mut pass, 0);
            index.bind(&mut pass, 0);
            sprite.bind(&mut pass, 0, TextureFilter::Nearest);
            pass.draw_indexed(6, 1, 0, 0, 0);
        }
        device.submit(cmd).unwrap();

        let bound = cache
            .pipeline(PipelineKey::new(RenderStage::Primitive2dTextured, BlendMode::Alpha, false))
            .unwrap();
        assert_eq!(device.drawn_pipelines(), &[bound]);
        assert_eq!(device.texture_contents(sprite.id()).unwrap(), &[10, 20, 30, 255]);
        // Bgra8Unorm stores blue first.
        assert_eq!(&device.texture_contents(target.id()).unwrap()[..4], &[255, 0, 0, 255]);

        sprite.release(&mut device);
        target.release(&mut device);
        verts.release(&mut device);
        index.release(&mut device);
        cache.release(&mut device);
        let cmd = device.acquire_command_buffer();
        device.submit(cmd).unwrap();

        for kind in ResourceKind::ALL {
            assert_eq!(device.live_count(kind), 0, "{kind} leaked");
        }
    }

    #[test]
    fn fast_alpha_primitives_draw_with_pushed_uniform() {
        let config = RenderConfig::default();
        let (mut device, cache) = standard_setup(&config);

        let tri = [
            ColorVertex::new([0.0, 0.0, 0.0], [1.0, 0.0, 0.0, 0.5]),
            ColorVertex::new([1.0, 0.0, 0.0], [0.0, 1.0, 0.0, 0.5]),
            ColorVertex::new([0.0, 1.0, 0.0], [0.0, 0.0, 1.0, 0.5]),
        ];
        let verts = GpuBuffer::<ColorVertex>::new(&mut device, BufferUsages::VERTEX, 3, "tri").unwrap();
        let target = Texture::render_target(&mut device, "frame", 2, 2, config.surface_format).unwrap();
        let is_fast_alpha = 1u32.to_ne_bytes();

        let mut cmd = device.acquire_command_buffer();
        verts.update(&mut device, &mut cmd.begin_copy_pass(), &tri, 0).unwrap();
        {
            let mut pass = cmd.begin_render_pass(ColorTargetInfo { texture: target.id(), load: LoadOp::Load });
            cache.bind(&mut pass, RenderStage::Primitive2d, BlendMode::FastAlpha, false);
            pass.push_fragment_uniform_data(0, &is_fast_alpha);
            verts.bind(&mut pass, 0);
            pass.draw(3, 1, 0, 0);
        }
        device.submit(cmd).unwrap();

        let draw = &device.draws()[0];
        assert_eq!(
            Some(draw.pipeline),
            cache.pipeline(PipelineKey::new(RenderStage::Primitive2d, BlendMode::FastAlpha, false))
        );
        assert_eq!(draw.fragment_uniforms.get(&0).map(Vec::as_slice), Some(&is_fast_alpha[..]));

        // the uniform does not carry into the next pass
        let mut cmd = device.acquire_command_buffer();
        {
            let mut pass = cmd.begin_render_pass(ColorTargetInfo { texture: target.id(), load: LoadOp::Load });
            cache.bind(&mut pass, RenderStage::Primitive2d, BlendMode::FastAlpha, false);
            verts.bind(&mut pass, 0);
            pass.draw(3, 1, 0, 0);
        }
        assert_eq!(
            device.submit(cmd),
            Err(DeviceError::InvalidCommand("draw without fragment uniform data"))
        );
        assert_eq!(device.draws().len(), 1);

        target.release(&mut device);
        verts.release(&mut device);
        cache.release(&mut device);
    }
}
