//! GPU device abstraction.
//!
//! This module is responsible for:
//! - the [`Device`] trait every backend implements
//! - generation-checked resource handles
//! - backend-agnostic descriptors and command recording
//! - the backends themselves: [`SoftwareDevice`] and [`WgpuDevice`]
//!
//! Handles are opaque `slotmap` keys. A released handle never resolves
//! again, even after its slot is reused.

mod command;
mod error;
mod gpu;
mod handle;
mod init;
mod software;
mod types;
mod validate;

pub use command::{Command, CommandBuffer, CopyPass, RenderPass};
pub use error::DeviceError;
pub use gpu::WgpuDevice;
pub use handle::{BufferId, PipelineId, ShaderId, TextureId, TransferBufferId};
pub use init::GpuInit;
pub use software::{DrawRecord, PipelineRecord, ShaderRecord, SoftwareDevice};
pub use types::{
    BlendComponent, BlendFactor, BlendOperation, BlendState, BufferBinding, BufferDesc,
    BufferUsages, ColorTargetDesc, ColorTargetInfo, FillMode, IndexFormat, LoadOp, PipelineDesc,
    ShaderDesc, ShaderFormat, ShaderFormats, ShaderResourceCounts, ShaderStage, TextureDesc,
    TextureFilter, TextureFormat, TextureUsages, VertexAttribute, VertexBufferDesc, VertexFormat,
    VertexStepMode,
};

/// Backend interface consumed by buffers, textures, shaders and the pipeline cache.
///
/// One thread owns the device and issues every call in program order. The
/// device must outlive every handle it hands out; callers release handles
/// explicitly before the device is dropped.
pub trait Device {
    /// Shader binary formats this device can consume.
    fn shader_formats(&self) -> ShaderFormats;

    fn create_buffer(&mut self, desc: &BufferDesc<'_>) -> Result<BufferId, DeviceError>;
    fn release_buffer(&mut self, id: BufferId);

    /// Allocates `size` bytes of host-visible staging memory.
    fn create_transfer_buffer(&mut self, label: &str, size: u64) -> Result<TransferBufferId, DeviceError>;

    /// Maps the staging buffer, copies `data` at `offset`, and unmaps it.
    fn write_transfer_buffer(
        &mut self,
        id: TransferBufferId,
        offset: u64,
        data: &[u8],
    ) -> Result<(), DeviceError>;

    /// Releases staging memory.
    ///
    /// The release takes effect after the next [`submit`](Device::submit), so
    /// uploads already recorded from this buffer stay valid.
    fn release_transfer_buffer(&mut self, id: TransferBufferId);

    fn create_shader(&mut self, desc: &ShaderDesc<'_>) -> Result<ShaderId, DeviceError>;
    fn release_shader(&mut self, id: ShaderId);

    fn create_pipeline(&mut self, desc: &PipelineDesc<'_>) -> Result<PipelineId, DeviceError>;
    fn release_pipeline(&mut self, id: PipelineId);

    fn create_texture(&mut self, desc: &TextureDesc<'_>) -> Result<TextureId, DeviceError>;
    fn release_texture(&mut self, id: TextureId);

    /// Returns an empty command buffer for one frame's passes.
    fn acquire_command_buffer(&mut self) -> CommandBuffer {
        CommandBuffer::new()
    }

    /// Executes recorded commands in order.
    fn submit(&mut self, commands: CommandBuffer) -> Result<(), DeviceError>;
}
