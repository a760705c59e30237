//! Submit-time command checks shared by every backend.
//!
//! A backend runs [`validate`] over the whole command list before executing
//! any of it, so a rejected submit leaves every resource untouched.

use std::collections::BTreeSet;

use super::command::Command;
use super::types::{BufferUsages, ShaderResourceCounts, TextureFormat, TextureUsages};
use super::{BufferId, DeviceError, PipelineId, TextureId, TransferBufferId};

#[derive(Debug, Copy, Clone)]
pub(crate) struct BufferInfo {
    pub usage: BufferUsages,
    pub size: u64,
}

#[derive(Debug, Copy, Clone)]
pub(crate) struct TextureInfo {
    pub width: u32,
    pub height: u32,
    pub format: TextureFormat,
    pub usage: TextureUsages,
}

impl TextureInfo {
    pub fn byte_len(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height) * u64::from(self.format.bytes_per_pixel())
    }
}

/// Read-only view of a backend's live resources.
pub(crate) trait Resources {
    fn buffer(&self, id: BufferId) -> Option<BufferInfo>;
    fn transfer_len(&self, id: TransferBufferId) -> Option<u64>;
    fn texture(&self, id: TextureId) -> Option<TextureInfo>;
    /// Fragment-stage resource counts of a live pipeline.
    fn pipeline_fragment(&self, id: PipelineId) -> Option<ShaderResourceCounts>;
}

#[derive(Copy, Clone, Eq, PartialEq)]
enum PassState {
    Idle,
    Copy,
    Render,
}

/// Fragment bindings made inside the open render pass.
#[derive(Default)]
struct FragmentBindings {
    pipeline: Option<ShaderResourceCounts>,
    textures: BTreeSet<u32>,
    uniforms: BTreeSet<u32>,
}

impl FragmentBindings {
    fn check_draw(&self) -> Result<(), DeviceError> {
        let Some(counts) = self.pipeline else {
            return Err(DeviceError::InvalidCommand("draw without a bound pipeline"));
        };
        if (0..counts.samplers).any(|slot| !self.textures.contains(&slot)) {
            return Err(DeviceError::InvalidCommand("draw with an unbound fragment texture slot"));
        }
        if (0..counts.uniform_buffers).any(|slot| !self.uniforms.contains(&slot)) {
            return Err(DeviceError::InvalidCommand("draw without fragment uniform data"));
        }
        Ok(())
    }
}

/// Checks pass structure, handles, copy ranges and draw-time bindings.
pub(crate) fn validate(commands: &[Command], res: &impl Resources) -> Result<(), DeviceError> {
    let mut state = PassState::Idle;
    let mut bindings = FragmentBindings::default();

    for cmd in commands {
        match cmd {
            Command::BeginCopyPass => {
                expect_state(state, PassState::Idle, "copy pass opened inside another pass")?;
                state = PassState::Copy;
            }
            Command::EndCopyPass => {
                expect_state(state, PassState::Copy, "copy pass closed while not open")?;
                state = PassState::Idle;
            }
            Command::UploadToBuffer { src, src_offset, dst, dst_offset, size } => {
                expect_state(state, PassState::Copy, "upload outside a copy pass")?;
                let staging = res.transfer_len(*src).ok_or(DeviceError::InvalidHandle("transfer buffer"))?;
                check_range(*src_offset, *size, staging)?;
                let buffer = res.buffer(*dst).ok_or(DeviceError::InvalidHandle("buffer"))?;
                check_range(*dst_offset, *size, buffer.size)?;
            }
            Command::UploadToTexture { src, src_offset, dst, width, height } => {
                expect_state(state, PassState::Copy, "upload outside a copy pass")?;
                let staging = res.transfer_len(*src).ok_or(DeviceError::InvalidHandle("transfer buffer"))?;
                let texture = res.texture(*dst).ok_or(DeviceError::InvalidHandle("texture"))?;
                if *width != texture.width || *height != texture.height {
                    return Err(DeviceError::InvalidCommand("texture upload must cover the whole texture"));
                }
                check_range(*src_offset, texture.byte_len(), staging)?;
            }
            Command::BeginRenderPass(target) => {
                expect_state(state, PassState::Idle, "render pass opened inside another pass")?;
                let texture = res.texture(target.texture).ok_or(DeviceError::InvalidHandle("texture"))?;
                if !texture.usage.contains(TextureUsages::COLOR_TARGET) {
                    return Err(DeviceError::InvalidCommand("render target lacks COLOR_TARGET usage"));
                }
                state = PassState::Render;
                bindings = FragmentBindings::default();
            }
            Command::EndRenderPass => {
                expect_state(state, PassState::Render, "render pass closed while not open")?;
                state = PassState::Idle;
            }
            Command::BindPipeline(id) => {
                expect_state(state, PassState::Render, "pipeline bound outside a render pass")?;
                let counts = res.pipeline_fragment(*id).ok_or(DeviceError::InvalidHandle("pipeline"))?;
                bindings.pipeline = Some(counts);
            }
            Command::BindVertexBuffer { binding, .. } => {
                expect_state(state, PassState::Render, "vertex buffer bound outside a render pass")?;
                check_bindable(res, binding.buffer, binding.offset, BufferUsages::VERTEX)?;
            }
            Command::BindIndexBuffer { binding, .. } => {
                expect_state(state, PassState::Render, "index buffer bound outside a render pass")?;
                check_bindable(res, binding.buffer, binding.offset, BufferUsages::INDEX)?;
            }
            Command::BindFragmentTexture { slot, texture, .. } => {
                expect_state(state, PassState::Render, "texture bound outside a render pass")?;
                let texture = res.texture(*texture).ok_or(DeviceError::InvalidHandle("texture"))?;
                if !texture.usage.contains(TextureUsages::SAMPLER) {
                    return Err(DeviceError::InvalidCommand("texture lacks SAMPLER usage"));
                }
                bindings.textures.insert(*slot);
            }
            Command::PushFragmentUniform { slot, data } => {
                expect_state(state, PassState::Render, "uniform data pushed outside a render pass")?;
                if data.is_empty() {
                    return Err(DeviceError::InvalidCommand("empty uniform data"));
                }
                bindings.uniforms.insert(*slot);
            }
            Command::Draw { .. } | Command::DrawIndexed { .. } => {
                expect_state(state, PassState::Render, "draw outside a render pass")?;
                bindings.check_draw()?;
            }
        }
    }

    expect_state(state, PassState::Idle, "pass left open at submit")
}

fn check_bindable(res: &impl Resources, id: BufferId, offset: u64, usage: BufferUsages) -> Result<(), DeviceError> {
    let buffer = res.buffer(id).ok_or(DeviceError::InvalidHandle("buffer"))?;
    if !buffer.usage.contains(usage) {
        return Err(DeviceError::InvalidCommand("buffer bound with a usage it was not created for"));
    }
    check_range(offset, 0, buffer.size)
}

fn expect_state(actual: PassState, expected: PassState, msg: &'static str) -> Result<(), DeviceError> {
    if actual == expected { Ok(()) } else { Err(DeviceError::InvalidCommand(msg)) }
}

/// Fails unless `offset..offset + len` fits in `size` bytes.
pub(crate) fn check_range(offset: u64, len: u64, size: u64) -> Result<(), DeviceError> {
    let end = offset.saturating_add(len);
    if end > size {
        return Err(DeviceError::OutOfRange { offset, end, size });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use slotmap::SlotMap;

    use super::*;
    use crate::device::command::CommandBuffer;
    use crate::device::types::{BufferBinding, ColorTargetInfo, LoadOp, TextureFilter};

    #[derive(Default)]
    struct Table {
        buffers: SlotMap<BufferId, BufferInfo>,
        transfers: SlotMap<TransferBufferId, u64>,
        textures: SlotMap<TextureId, TextureInfo>,
        pipelines: SlotMap<PipelineId, ()>,
        fragment: HashMap<PipelineId, ShaderResourceCounts>,
    }

    impl Resources for Table {
        fn buffer(&self, id: BufferId) -> Option<BufferInfo> {
            self.buffers.get(id).copied()
        }
        fn transfer_len(&self, id: TransferBufferId) -> Option<u64> {
            self.transfers.get(id).copied()
        }
        fn texture(&self, id: TextureId) -> Option<TextureInfo> {
            self.textures.get(id).copied()
        }
        fn pipeline_fragment(&self, id: PipelineId) -> Option<ShaderResourceCounts> {
            self.pipelines.get(id).map(|_| self.fragment.get(&id).copied().unwrap_or_default())
        }
    }

    impl Table {
        fn target(&mut self) -> TextureId {
            self.textures.insert(TextureInfo {
                width: 2,
                height: 2,
                format: TextureFormat::Rgba8Unorm,
                usage: TextureUsages::COLOR_TARGET,
            })
        }

        fn pipeline(&mut self, fragment: ShaderResourceCounts) -> PipelineId {
            let id = self.pipelines.insert(());
            self.fragment.insert(id, fragment);
            id
        }
    }

    fn uniforms(n: u32) -> ShaderResourceCounts {
        ShaderResourceCounts { uniform_buffers: n, ..Default::default() }
    }

    #[test]
    fn draw_requires_pushed_uniform_data() {
        let mut table = Table::default();
        let texture = table.target();
        let pipeline = table.pipeline(uniforms(1));

        let mut cmd = CommandBuffer::new();
        {
            let mut pass = cmd.begin_render_pass(ColorTargetInfo { texture, load: LoadOp::Load });
            pass.bind_pipeline(pipeline);
            pass.draw(3, 1, 0, 0);
        }
        assert_eq!(
            validate(cmd.commands(), &table),
            Err(DeviceError::InvalidCommand("draw without fragment uniform data"))
        );

        let mut cmd = CommandBuffer::new();
        {
            let mut pass = cmd.begin_render_pass(ColorTargetInfo { texture, load: LoadOp::Load });
            pass.push_fragment_uniform_data(0, &[1, 0, 0, 0]);
            pass.bind_pipeline(pipeline);
            pass.draw(3, 1, 0, 0);
        }
        assert_eq!(validate(cmd.commands(), &table), Ok(()));
    }

    #[test]
    fn uniform_data_does_not_outlive_its_pass() {
        let mut table = Table::default();
        let texture = table.target();
        let pipeline = table.pipeline(uniforms(1));

        let mut cmd = CommandBuffer::new();
        cmd.begin_render_pass(ColorTargetInfo { texture, load: LoadOp::Load })
            .push_fragment_uniform_data(0, &[1, 0, 0, 0]);
        {
            let mut pass = cmd.begin_render_pass(ColorTargetInfo { texture, load: LoadOp::Load });
            pass.bind_pipeline(pipeline);
            pass.draw(3, 1, 0, 0);
        }
        assert!(validate(cmd.commands(), &table).is_err());
    }

    #[test]
    fn unbound_sampler_slot_fails_draw() {
        let mut table = Table::default();
        let target = table.target();
        let pipeline = table.pipeline(ShaderResourceCounts { samplers: 2, ..Default::default() });
        let sprite = table.textures.insert(TextureInfo {
            width: 1,
            height: 1,
            format: TextureFormat::Rgba8Unorm,
            usage: TextureUsages::SAMPLER,
        });

        let mut cmd = CommandBuffer::new();
        {
            let mut pass = cmd.begin_render_pass(ColorTargetInfo { texture: target, load: LoadOp::Load });
            pass.bind_pipeline(pipeline);
            pass.bind_fragment_texture(0, sprite, TextureFilter::Nearest);
            pass.draw(3, 1, 0, 0);
        }
        assert_eq!(
            validate(cmd.commands(), &table),
            Err(DeviceError::InvalidCommand("draw with an unbound fragment texture slot"))
        );
    }

    #[test]
    fn late_bad_command_fails_whole_list() {
        let mut table = Table::default();
        let dst = table.buffers.insert(BufferInfo { usage: BufferUsages::INDEX, size: 6 });
        let src = table.transfers.insert(6);
        let texture = table.target();

        let mut cmd = CommandBuffer::new();
        cmd.begin_copy_pass().upload_to_buffer(src, 0, dst, 0, 6);
        cmd.begin_render_pass(ColorTargetInfo { texture, load: LoadOp::Load })
            .bind_vertex_buffer(0, BufferBinding { buffer: dst, offset: 0 });

        assert!(matches!(validate(cmd.commands(), &table), Err(DeviceError::InvalidCommand(_))));
    }

    #[test]
    fn check_range_saturates() {
        assert_eq!(check_range(4, 4, 8), Ok(()));
        assert_eq!(
            check_range(u64::MAX, 2, 8),
            Err(DeviceError::OutOfRange { offset: u64::MAX, end: u64::MAX, size: 8 })
        );
    }
}
