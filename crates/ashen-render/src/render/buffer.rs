//! Typed device buffers with a paired staging buffer.

use std::marker::PhantomData;
use std::mem::size_of;

use bytemuck::Pod;

use crate::device::{
    BufferBinding, BufferDesc, BufferId, BufferUsages, CopyPass, Device, IndexFormat, RenderPass, TransferBufferId,
};
use crate::error::{RenderError, ResourceKind, Result};

/// Fixed-capacity device buffer of `T` elements.
///
/// Owns one device buffer and one staging buffer, both
/// `capacity * size_of::<T>()` bytes. Usage is fixed at construction.
/// Release with [`GpuBuffer::release`] before the device goes away. Dropping
/// without releasing leaks both buffers; `SoftwareDevice` reports such leaks
/// when it is dropped.
#[derive(Debug)]
pub struct GpuBuffer<T> {
    name: String,
    usage: BufferUsages,
    capacity: usize,
    buffer: BufferId,
    transfer: TransferBufferId,
    _marker: PhantomData<T>,
}

impl<T: Pod> GpuBuffer<T> {
    /// Allocates the device and staging buffers.
    ///
    /// `usage` must contain at least one of vertex, index or indirect;
    /// otherwise nothing is allocated.
    pub fn new<D: Device + ?Sized>(device: &mut D, usage: BufferUsages, capacity: usize, name: &str) -> Result<Self> {
        if !usage.intersects(BufferUsages::VERTEX | BufferUsages::INDEX | BufferUsages::INDIRECT) {
            log::error!("buffer `{name}` created with usage {usage:?}");
            return Err(RenderError::InvalidUsage { name: name.to_owned() });
        }

        let size = capacity
            .checked_mul(size_of::<T>())
            .map(|s| s as u64)
            .ok_or_else(|| RenderError::creation(ResourceKind::Buffer, name, "size overflows usize"))?;

        let buffer = device
            .create_buffer(&BufferDesc { label: name, usage, size })
            .map_err(|e| RenderError::creation(ResourceKind::Buffer, name, e))?;

        let transfer = match device.create_transfer_buffer(name, size) {
            Ok(id) => id,
            Err(e) => {
                device.release_buffer(buffer);
                return Err(RenderError::creation(ResourceKind::TransferBuffer, name, e));
            }
        };

        log::debug!("buffer `{name}`: {capacity} x {} bytes", size_of::<T>());

        Ok(Self {
            name: name.to_owned(),
            usage,
            capacity,
            buffer,
            transfer,
            _marker: PhantomData,
        })
    }

    /// Stages `data` and records its upload to elements `start..start + data.len()`.
    ///
    /// Fails with [`RenderError::BufferOverflow`] before touching any memory
    /// if the range exceeds the capacity. The upload lands when the command
    /// buffer is submitted; close the copy pass before a render pass that
    /// reads it.
    pub fn update<D: Device + ?Sized>(
        &self,
        device: &mut D,
        pass: &mut CopyPass<'_>,
        data: &[T],
        start: usize,
    ) -> Result<()> {
        let in_range = start.checked_add(data.len()).is_some_and(|end| end <= self.capacity);
        if !in_range {
            log::warn!(
                "buffer `{}`: update [{start}, +{}) exceeds capacity {}",
                self.name,
                data.len(),
                self.capacity
            );
            return Err(RenderError::BufferOverflow {
                name: self.name.clone(),
                start,
                len: data.len(),
                capacity: self.capacity,
            });
        }
        if data.is_empty() {
            return Ok(());
        }

        let offset = self.byte_offset(start);
        let bytes: &[u8] = bytemuck::cast_slice(data);

        device.write_transfer_buffer(self.transfer, offset, bytes)?;
        pass.upload_to_buffer(self.transfer, offset, self.buffer, offset, bytes.len() as u64);
        Ok(())
    }

    /// Binds the buffer from element `start` according to its usage.
    ///
    /// Vertex buffers bind at slot 0, index buffers as 16-bit indices.
    /// Indirect-only buffers have no bind point and are ignored.
    ///
    /// `start` must not exceed the capacity. Debug builds panic otherwise;
    /// release builds record an offset the device rejects at submit.
    pub fn bind(&self, pass: &mut RenderPass<'_>, start: usize) {
        debug_assert!(
            start <= self.capacity,
            "buffer `{}`: bind start {start} beyond capacity {}",
            self.name,
            self.capacity
        );
        let binding = BufferBinding {
            buffer: self.buffer,
            offset: self.byte_offset(start),
        };

        if self.usage.contains(BufferUsages::VERTEX) {
            pass.bind_vertex_buffer(0, binding);
        } else if self.usage.contains(BufferUsages::INDEX) {
            pass.bind_index_buffer(binding, IndexFormat::Uint16);
        } else {
            log::trace!("buffer `{}`: indirect buffers are not bound", self.name);
        }
    }
}

impl<T> GpuBuffer<T> {
    fn byte_offset(&self, index: usize) -> u64 {
        (index as u64).saturating_mul(size_of::<T>() as u64)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn usage(&self) -> BufferUsages {
        self.usage
    }

    /// Capacity in elements.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn byte_size(&self) -> u64 {
        self.byte_offset(self.capacity)
    }

    pub fn id(&self) -> BufferId {
        self.buffer
    }

    /// Releases both buffers. Staging memory is reclaimed after the next submit.
    pub fn release<D: Device + ?Sized>(self, device: &mut D) {
        device.release_buffer(self.buffer);
        device.release_transfer_buffer(self.transfer);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{Command, SoftwareDevice};
    use crate::error::ErrorCategory;
    use crate::render::vertex::ColorVertex;

    fn vertices(n: usize) -> Vec<ColorVertex> {
        (0..n)
            .map(|i| ColorVertex::new([i as f32, 0.0, 0.0], [1.0, 0.0, 0.0, 1.0]))
            .collect()
    }

    // ── construction ──────────────────────────────────────────────────────

    #[test]
    fn usage_without_bind_point_allocates_nothing() {
        let mut device = SoftwareDevice::default();

        let err = GpuBuffer::<u32>::new(&mut device, BufferUsages::STORAGE, 16, "storage").unwrap_err();

        assert!(matches!(err, RenderError::InvalidUsage { .. }));
        for kind in ResourceKind::ALL {
            assert_eq!(device.allocation_count(kind), 0);
        }
    }

    #[test]
    fn sizes_are_in_elements() {
        let mut device = SoftwareDevice::default();
        let buffer = GpuBuffer::<ColorVertex>::new(&mut device, BufferUsages::VERTEX, 10, "verts").unwrap();

        assert_eq!(buffer.capacity(), 10);
        assert_eq!(buffer.byte_size(), 280);
        assert_eq!(buffer.name(), "verts");
        assert_eq!(device.buffer_contents(buffer.id()).map(<[u8]>::len), Some(280));
    }

    #[test]
    fn staging_failure_releases_device_buffer() {
        let mut device = SoftwareDevice::default();
        device.inject_fault(ResourceKind::TransferBuffer, 0);

        let err = GpuBuffer::<u16>::new(&mut device, BufferUsages::INDEX, 6, "indices").unwrap_err();

        assert!(matches!(
            err,
            RenderError::ResourceCreation { kind: ResourceKind::TransferBuffer, .. }
        ));
        assert_eq!(err.category(), ErrorCategory::ResourceCreation);
        assert_eq!(device.live_count(ResourceKind::Buffer), 0);
        assert_eq!(device.live_count(ResourceKind::TransferBuffer), 0);
    }

    #[test]
    fn device_failure_is_resource_creation() {
        let mut device = SoftwareDevice::default();
        device.inject_fault(ResourceKind::Buffer, 0);

        let err = GpuBuffer::<u16>::new(&mut device, BufferUsages::INDEX, 6, "indices").unwrap_err();
        assert!(matches!(err, RenderError::ResourceCreation { kind: ResourceKind::Buffer, .. }));
        assert_eq!(device.allocation_count(ResourceKind::TransferBuffer), 0);
    }

    // ── update ────────────────────────────────────────────────────────────

    #[test]
    fn update_round_trips_at_offset() {
        let mut device = SoftwareDevice::default();
        let buffer = GpuBuffer::<ColorVertex>::new(&mut device, BufferUsages::VERTEX, 8, "verts").unwrap();
        let data = vertices(3);

        let mut cmd = device.acquire_command_buffer();
        {
            let mut copy = cmd.begin_copy_pass();
            buffer.update(&mut device, &mut copy, &data, 2).unwrap();
        }
        device.submit(cmd).unwrap();

        let contents = device.buffer_contents(buffer.id()).unwrap();
        let expected: &[u8] = bytemuck::cast_slice(&data);
        assert_eq!(&contents[2 * 28..5 * 28], expected);
        assert!(contents[..2 * 28].iter().all(|&b| b == 0));
        assert!(contents[5 * 28..].iter().all(|&b| b == 0));
    }

    #[test]
    fn upload_records_exact_byte_range() {
        let mut device = SoftwareDevice::default();
        let buffer = GpuBuffer::<u16>::new(&mut device, BufferUsages::INDEX, 8, "indices").unwrap();

        let mut cmd = device.acquire_command_buffer();
        {
            let mut copy = cmd.begin_copy_pass();
            buffer.update(&mut device, &mut copy, &[0, 1, 2, 0], 4).unwrap();
        }

        let upload = cmd.commands().iter().find_map(|c| match c {
            Command::UploadToBuffer { src_offset, dst_offset, size, .. } => Some((*src_offset, *dst_offset, *size)),
            _ => None,
        });
        assert_eq!(upload, Some((8, 8, 8)));
    }

    #[test]
    fn overflow_is_rejected_without_writing() {
        let mut device = SoftwareDevice::default();
        let buffer = GpuBuffer::<ColorVertex>::new(&mut device, BufferUsages::VERTEX, 4, "verts").unwrap();

        let mut cmd = device.acquire_command_buffer();
        {
            let mut copy = cmd.begin_copy_pass();
            let err = buffer.update(&mut device, &mut copy, &vertices(3), 2).unwrap_err();
            assert!(matches!(
                err,
                RenderError::BufferOverflow { start: 2, len: 3, capacity: 4, .. }
            ));
            assert_eq!(err.category(), ErrorCategory::BufferOverflow);

            assert!(buffer.update(&mut device, &mut copy, &vertices(1), usize::MAX).is_err());
        }
        assert_eq!(cmd.commands(), &[Command::BeginCopyPass, Command::EndCopyPass]);
        device.submit(cmd).unwrap();

        assert!(device.buffer_contents(buffer.id()).unwrap().iter().all(|&b| b == 0));
    }

    #[test]
    fn update_filling_capacity_exactly_succeeds() {
        let mut device = SoftwareDevice::default();
        let buffer = GpuBuffer::<u32>::new(&mut device, BufferUsages::VERTEX, 4, "words").unwrap();

        let mut cmd = device.acquire_command_buffer();
        {
            let mut copy = cmd.begin_copy_pass();
            buffer.update(&mut device, &mut copy, &[1, 2], 2).unwrap();
            buffer.update(&mut device, &mut copy, &[], 4).unwrap();
        }
        device.submit(cmd).unwrap();

        let contents = device.buffer_contents(buffer.id()).unwrap();
        let words: Vec<u32> = contents
            .chunks_exact(4)
            .map(|c| u32::from_ne_bytes([c[0], c[1], c[2], c[3]]))
            .collect();
        assert_eq!(words, [0, 0, 1, 2]);
    }

    // ── bind ──────────────────────────────────────────────────────────────

    #[test]
    fn bind_follows_usage() {
        use crate::device::{ColorTargetInfo, LoadOp, TextureDesc, TextureFormat, TextureUsages};

        let mut device = SoftwareDevice::default();
        let verts = GpuBuffer::<ColorVertex>::new(&mut device, BufferUsages::VERTEX, 4, "verts").unwrap();
        let indices = GpuBuffer::<u16>::new(&mut device, BufferUsages::INDEX, 6, "indices").unwrap();
        let indirect = GpuBuffer::<u32>::new(&mut device, BufferUsages::INDIRECT, 4, "indirect").unwrap();
        let texture = device
            .create_texture(&TextureDesc {
                label: "target",
                width: 1,
                height: 1,
                format: TextureFormat::Rgba8Unorm,
                usage: TextureUsages::COLOR_TARGET,
            })
            .unwrap();

        let mut cmd = device.acquire_command_buffer();
        {
            let mut pass = cmd.begin_render_pass(ColorTargetInfo { texture, load: LoadOp::Load });
            verts.bind(&mut pass, 1);
            indices.bind(&mut pass, 2);
            indirect.bind(&mut pass, 0);
        }

        assert_eq!(
            &cmd.commands()[1..3],
            &[
                Command::BindVertexBuffer {
                    slot: 0,
                    binding: BufferBinding { buffer: verts.id(), offset: 28 },
                },
                Command::BindIndexBuffer {
                    binding: BufferBinding { buffer: indices.id(), offset: 4 },
                    format: IndexFormat::Uint16,
                },
            ]
        );
        assert_eq!(cmd.commands().len(), 4);
        device.submit(cmd).unwrap();
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "beyond capacity")]
    fn bind_past_capacity_panics() {
        use crate::device::{ColorTargetInfo, LoadOp, TextureDesc, TextureFormat, TextureUsages};

        let mut device = SoftwareDevice::default();
        let words = GpuBuffer::<u32>::new(&mut device, BufferUsages::VERTEX, 4, "words").unwrap();
        let texture = device
            .create_texture(&TextureDesc {
                label: "target",
                width: 1,
                height: 1,
                format: TextureFormat::Rgba8Unorm,
                usage: TextureUsages::COLOR_TARGET,
            })
            .unwrap();

        let mut cmd = device.acquire_command_buffer();
        let mut pass = cmd.begin_render_pass(ColorTargetInfo { texture, load: LoadOp::Load });
        words.bind(&mut pass, usize::MAX / 2);
    }

    #[test]
    fn byte_offset_saturates() {
        let mut device = SoftwareDevice::default();
        let words = GpuBuffer::<u32>::new(&mut device, BufferUsages::VERTEX, 4, "words").unwrap();

        assert_eq!(words.byte_offset(4), 16);
        assert_eq!(words.byte_offset(usize::MAX), u64::MAX);
    }

    #[test]
    fn release_frees_both_buffers_after_submit() {
        let mut device = SoftwareDevice::default();
        let buffer = GpuBuffer::<u16>::new(&mut device, BufferUsages::INDEX, 6, "indices").unwrap();

        buffer.release(&mut device);
        assert_eq!(device.live_count(ResourceKind::Buffer), 0);
        assert_eq!(device.live_count(ResourceKind::TransferBuffer), 1);

        let cmd = device.acquire_command_buffer();
        device.submit(cmd).unwrap();
        assert_eq!(device.live_count(ResourceKind::TransferBuffer), 0);
    }
}
