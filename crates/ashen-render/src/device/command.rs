//! Backend-agnostic command recording.
//!
//! A [`CommandBuffer`] is a plain list of [`Command`]s. Passes are scoped
//! guards that mutably borrow the command buffer, so:
//! - only one pass can be open at a time
//! - a pass is closed (its end marker recorded) when the guard drops
//! - a command buffer cannot be submitted while a pass is still open
//!
//! Backends replay the list in order on [`Device::submit`](super::Device::submit).

use super::types::{BufferBinding, ColorTargetInfo, IndexFormat, TextureFilter};
use super::{BufferId, PipelineId, TextureId, TransferBufferId};

/// One recorded GPU command.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    BeginCopyPass,
    EndCopyPass,

    /// Copies `size` bytes from staging memory into a device buffer.
    UploadToBuffer {
        src: TransferBufferId,
        src_offset: u64,
        dst: BufferId,
        dst_offset: u64,
        size: u64,
    },

    /// Copies tightly packed pixel rows from staging memory into a texture.
    UploadToTexture {
        src: TransferBufferId,
        src_offset: u64,
        dst: TextureId,
        width: u32,
        height: u32,
    },

    BeginRenderPass(ColorTargetInfo),
    EndRenderPass,

    BindPipeline(PipelineId),
    BindVertexBuffer { slot: u32, binding: BufferBinding },
    BindIndexBuffer { binding: BufferBinding, format: IndexFormat },
    BindFragmentTexture { slot: u32, texture: TextureId, filter: TextureFilter },

    /// Uniform bytes for fragment uniform buffer `slot`. Lasts until the pass ends
    /// or the slot is pushed again.
    PushFragmentUniform { slot: u32, data: Vec<u8> },

    Draw {
        vertex_count: u32,
        instance_count: u32,
        first_vertex: u32,
        first_instance: u32,
    },
    DrawIndexed {
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        vertex_offset: i32,
        first_instance: u32,
    },
}

/// Recorded command list for one submission.
#[derive(Debug, Default)]
pub struct CommandBuffer {
    commands: Vec<Command>,
}

impl CommandBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a copy pass. The pass closes when the returned guard drops.
    pub fn begin_copy_pass(&mut self) -> CopyPass<'_> {
        self.commands.push(Command::BeginCopyPass);
        CopyPass { commands: &mut self.commands }
    }

    /// Opens a render pass on `target`. The pass closes when the returned guard drops.
    pub fn begin_render_pass(&mut self, target: ColorTargetInfo) -> RenderPass<'_> {
        self.commands.push(Command::BeginRenderPass(target));
        RenderPass { commands: &mut self.commands }
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub(crate) fn into_commands(self) -> Vec<Command> {
        self.commands
    }
}

/// Open copy pass. Records uploads from staging memory.
pub struct CopyPass<'a> {
    commands: &'a mut Vec<Command>,
}

impl CopyPass<'_> {
    pub fn upload_to_buffer(
        &mut self,
        src: TransferBufferId,
        src_offset: u64,
        dst: BufferId,
        dst_offset: u64,
        size: u64,
    ) {
        self.commands.push(Command::UploadToBuffer {
            src,
            src_offset,
            dst,
            dst_offset,
            size,
        });
    }

    pub fn upload_to_texture(
        &mut self,
        src: TransferBufferId,
        src_offset: u64,
        dst: TextureId,
        width: u32,
        height: u32,
    ) {
        self.commands.push(Command::UploadToTexture {
            src,
            src_offset,
            dst,
            width,
            height,
        });
    }
}

impl Drop for CopyPass<'_> {
    fn drop(&mut self) {
        self.commands.push(Command::EndCopyPass);
    }
}

/// Open render pass. Records binds and draws.
pub struct RenderPass<'a> {
    commands: &'a mut Vec<Command>,
}

impl RenderPass<'_> {
    pub fn bind_pipeline(&mut self, pipeline: PipelineId) {
        self.commands.push(Command::BindPipeline(pipeline));
    }

    pub fn bind_vertex_buffer(&mut self, slot: u32, binding: BufferBinding) {
        self.commands.push(Command::BindVertexBuffer { slot, binding });
    }

    pub fn bind_index_buffer(&mut self, binding: BufferBinding, format: IndexFormat) {
        self.commands.push(Command::BindIndexBuffer { binding, format });
    }

    pub fn bind_fragment_texture(&mut self, slot: u32, texture: TextureId, filter: TextureFilter) {
        self.commands.push(Command::BindFragmentTexture { slot, texture, filter });
    }

    /// Copies `data` into fragment uniform slot `slot` for the following draws.
    pub fn push_fragment_uniform_data(&mut self, slot: u32, data: &[u8]) {
        self.commands.push(Command::PushFragmentUniform { slot, data: data.to_vec() });
    }

    pub fn draw(&mut self, vertex_count: u32, instance_count: u32, first_vertex: u32, first_instance: u32) {
        self.commands.push(Command::Draw {
            vertex_count,
            instance_count,
            first_vertex,
            first_instance,
        });
    }

    pub fn draw_indexed(
        &mut self,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        vertex_offset: i32,
        first_instance: u32,
    ) {
        self.commands.push(Command::DrawIndexed {
            index_count,
            instance_count,
            first_index,
            vertex_offset,
            first_instance,
        });
    }

    /// Pipeline most recently bound in this pass, if any.
    pub fn bound_pipeline(&self) -> Option<PipelineId> {
        for c in self.commands.iter().rev() {
            match c {
                Command::BindPipeline(p) => return Some(*p),
                Command::BeginRenderPass(_) => return None,
                _ => {}
            }
        }
        None
    }
}

impl Drop for RenderPass<'_> {
    fn drop(&mut self) {
        self.commands.push(Command::EndRenderPass);
    }
}
