//! CPU-side conforming backend.
//!
//! `SoftwareDevice` keeps every resource as plain memory and executes copy
//! commands at submit time. It does not rasterize; render passes are
//! validated and their draws logged. Probes expose allocation counts and
//! resource contents so callers can check upload and lifetime behavior
//! without hardware.

use std::collections::{BTreeMap, HashMap};

use slotmap::SlotMap;

use crate::error::ResourceKind;

use super::command::{Command, CommandBuffer};
use super::types::{
    BufferDesc, BufferUsages, ColorTargetDesc, FillMode, LoadOp, PipelineDesc, ShaderDesc,
    ShaderFormat, ShaderFormats, ShaderResourceCounts, ShaderStage, TextureDesc, TextureFormat,
    TextureUsages, VertexAttribute, VertexBufferDesc,
};
use super::validate::{self, check_range, BufferInfo, Resources, TextureInfo};
use super::{BufferId, Device, DeviceError, PipelineId, ShaderId, TextureId, TransferBufferId};

/// Snapshot of a created shader.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct ShaderRecord {
    pub label: String,
    pub stage: ShaderStage,
    pub format: ShaderFormat,
    pub entry_point: String,
    pub resources: ShaderResourceCounts,
    pub code_len: usize,
}

/// Snapshot of a created pipeline, including copies of its shader records.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct PipelineRecord {
    pub label: String,
    pub vertex: ShaderRecord,
    pub fragment: ShaderRecord,
    pub vertex_buffers: Vec<VertexBufferDesc>,
    pub vertex_attributes: Vec<VertexAttribute>,
    pub color_target: ColorTargetDesc,
    pub fill_mode: FillMode,
}

struct SoftBuffer {
    usage: BufferUsages,
    bytes: Vec<u8>,
}

struct SoftTexture {
    width: u32,
    height: u32,
    format: TextureFormat,
    usage: TextureUsages,
    pixels: Vec<u8>,
}

/// One executed draw.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct DrawRecord {
    pub pipeline: PipelineId,
    /// Fragment uniform data in effect, by slot.
    pub fragment_uniforms: BTreeMap<u32, Vec<u8>>,
}

pub struct SoftwareDevice {
    formats: ShaderFormats,

    buffers: SlotMap<BufferId, SoftBuffer>,
    transfers: SlotMap<TransferBufferId, Vec<u8>>,
    shaders: SlotMap<ShaderId, ShaderRecord>,
    pipelines: SlotMap<PipelineId, PipelineRecord>,
    textures: SlotMap<TextureId, SoftTexture>,

    // staging releases wait for the next submit
    deferred_transfers: Vec<TransferBufferId>,

    faults: HashMap<ResourceKind, usize>,
    allocations: HashMap<ResourceKind, usize>,

    submissions: Vec<Vec<Command>>,
    draws: Vec<DrawRecord>,
}

impl Default for SoftwareDevice {
    fn default() -> Self {
        Self::new(ShaderFormats::SPIRV)
    }
}

impl SoftwareDevice {
    /// Creates a device that advertises `formats` as its shader capabilities.
    pub fn new(formats: ShaderFormats) -> Self {
        Self {
            formats,
            buffers: SlotMap::with_key(),
            transfers: SlotMap::with_key(),
            shaders: SlotMap::with_key(),
            pipelines: SlotMap::with_key(),
            textures: SlotMap::with_key(),
            deferred_transfers: Vec::new(),
            faults: HashMap::new(),
            allocations: HashMap::new(),
            submissions: Vec::new(),
            draws: Vec::new(),
        }
    }

    // ── fault injection ───────────────────────────────────────────────────

    /// Makes creation of `kind` fail once, after `after` further successes.
    pub fn inject_fault(&mut self, kind: ResourceKind, after: usize) {
        self.faults.insert(kind, after);
    }

    fn take_fault(&mut self, kind: ResourceKind) -> bool {
        let Some(n) = self.faults.get_mut(&kind) else { return false };
        if *n > 0 {
            *n -= 1;
            return false;
        }
        self.faults.remove(&kind);
        true
    }

    fn begin_create(&mut self, kind: ResourceKind) -> Result<(), DeviceError> {
        if self.take_fault(kind) {
            return Err(match kind {
                ResourceKind::Shader | ResourceKind::Pipeline => {
                    DeviceError::Rejected("injected fault".to_owned())
                }
                _ => DeviceError::OutOfMemory,
            });
        }
        Ok(())
    }

    fn count_allocation(&mut self, kind: ResourceKind) {
        *self.allocations.entry(kind).or_insert(0) += 1;
    }

    // ── probes ────────────────────────────────────────────────────────────

    /// Number of live resources of `kind`.
    ///
    /// Staging buffers released since the last submit still count.
    pub fn live_count(&self, kind: ResourceKind) -> usize {
        match kind {
            ResourceKind::Buffer => self.buffers.len(),
            ResourceKind::TransferBuffer => self.transfers.len(),
            ResourceKind::Shader => self.shaders.len(),
            ResourceKind::Pipeline => self.pipelines.len(),
            ResourceKind::Texture => self.textures.len(),
        }
    }

    /// Live resources the caller still owns, by kind.
    ///
    /// Staging buffers already released but awaiting a submit are not leaks.
    pub fn leaks(&self) -> Vec<(ResourceKind, usize)> {
        ResourceKind::ALL
            .into_iter()
            .map(|kind| {
                let live = self.live_count(kind);
                match kind {
                    ResourceKind::TransferBuffer => (kind, live.saturating_sub(self.deferred_transfers.len())),
                    _ => (kind, live),
                }
            })
            .filter(|&(_, n)| n > 0)
            .collect()
    }

    /// Total successful creations of `kind` over the device lifetime.
    pub fn allocation_count(&self, kind: ResourceKind) -> usize {
        self.allocations.get(&kind).copied().unwrap_or(0)
    }

    pub fn buffer_contents(&self, id: BufferId) -> Option<&[u8]> {
        self.buffers.get(id).map(|b| b.bytes.as_slice())
    }

    pub fn texture_contents(&self, id: TextureId) -> Option<&[u8]> {
        self.textures.get(id).map(|t| t.pixels.as_slice())
    }

    pub fn pipeline(&self, id: PipelineId) -> Option<&PipelineRecord> {
        self.pipelines.get(id)
    }

    pub fn shader(&self, id: ShaderId) -> Option<&ShaderRecord> {
        self.shaders.get(id)
    }

    /// Command lists of every submission, oldest first.
    pub fn submissions(&self) -> &[Vec<Command>] {
        &self.submissions
    }

    /// Every executed draw, oldest first.
    pub fn draws(&self) -> &[DrawRecord] {
        &self.draws
    }

    /// Pipeline bound for each executed draw, oldest first.
    pub fn drawn_pipelines(&self) -> Vec<PipelineId> {
        self.draws.iter().map(|d| d.pipeline).collect()
    }

    pub fn set_shader_formats(&mut self, formats: ShaderFormats) {
        self.formats = formats;
    }

    // ── submission ────────────────────────────────────────────────────────

    fn apply(&mut self, commands: &[Command]) {
        let mut current = None;
        let mut uniforms = BTreeMap::new();

        for cmd in commands {
            match cmd {
                Command::UploadToBuffer { src, src_offset, dst, dst_offset, size } => {
                    let (Some(staging), Some(buffer)) = (self.transfers.get(*src), self.buffers.get_mut(*dst)) else {
                        continue;
                    };
                    let (s, d, n) = (*src_offset as usize, *dst_offset as usize, *size as usize);
                    buffer.bytes[d..d + n].copy_from_slice(&staging[s..s + n]);
                }
                Command::UploadToTexture { src, src_offset, dst, .. } => {
                    let (Some(staging), Some(texture)) = (self.transfers.get(*src), self.textures.get_mut(*dst)) else {
                        continue;
                    };
                    let s = *src_offset as usize;
                    let n = texture.pixels.len();
                    texture.pixels.copy_from_slice(&staging[s..s + n]);
                }
                Command::BeginRenderPass(target) => {
                    current = None;
                    uniforms.clear();
                    if let LoadOp::Clear(color) = target.load {
                        if let Some(texture) = self.textures.get_mut(target.texture) {
                            clear_pixels(texture, color);
                        }
                    }
                }
                Command::BindPipeline(id) => current = Some(*id),
                Command::PushFragmentUniform { slot, data } => {
                    uniforms.insert(*slot, data.clone());
                }
                Command::Draw { .. } | Command::DrawIndexed { .. } => {
                    if let Some(pipeline) = current {
                        self.draws.push(DrawRecord { pipeline, fragment_uniforms: uniforms.clone() });
                    }
                }
                _ => {}
            }
        }
    }
}

fn clear_pixels(texture: &mut SoftTexture, color: [f32; 4]) {
    let to_u8 = |c: f32| (c.clamp(0.0, 1.0) * 255.0).round() as u8;
    let [r, g, b, a] = color.map(to_u8);
    let texel = match texture.format {
        TextureFormat::R8Unorm => vec![r],
        TextureFormat::Rgba8Unorm | TextureFormat::Rgba8UnormSrgb => vec![r, g, b, a],
        TextureFormat::Bgra8Unorm | TextureFormat::Bgra8UnormSrgb => vec![b, g, r, a],
    };
    for px in texture.pixels.chunks_exact_mut(texel.len()) {
        px.copy_from_slice(&texel);
    }
}

impl Drop for SoftwareDevice {
    fn drop(&mut self) {
        for (kind, n) in self.leaks() {
            log::warn!("software device dropped with {n} unreleased {kind} resource(s)");
        }
    }
}

impl Resources for SoftwareDevice {
    fn buffer(&self, id: BufferId) -> Option<BufferInfo> {
        self.buffers.get(id).map(|b| BufferInfo { usage: b.usage, size: b.bytes.len() as u64 })
    }

    fn transfer_len(&self, id: TransferBufferId) -> Option<u64> {
        self.transfers.get(id).map(|t| t.len() as u64)
    }

    fn texture(&self, id: TextureId) -> Option<TextureInfo> {
        self.textures.get(id).map(|t| TextureInfo {
            width: t.width,
            height: t.height,
            format: t.format,
            usage: t.usage,
        })
    }

    fn pipeline_fragment(&self, id: PipelineId) -> Option<ShaderResourceCounts> {
        self.pipelines.get(id).map(|p| p.fragment.resources)
    }
}

impl Device for SoftwareDevice {
    fn shader_formats(&self) -> ShaderFormats {
        self.formats
    }

    fn create_buffer(&mut self, desc: &BufferDesc<'_>) -> Result<BufferId, DeviceError> {
        self.begin_create(ResourceKind::Buffer)?;
        if desc.size == 0 {
            return Err(DeviceError::Rejected("zero-sized buffer".to_owned()));
        }
        let id = self.buffers.insert(SoftBuffer {
            usage: desc.usage,
            bytes: vec![0; desc.size as usize],
        });
        self.count_allocation(ResourceKind::Buffer);
        log::trace!("software: buffer `{}` ({} bytes)", desc.label, desc.size);
        Ok(id)
    }

    fn release_buffer(&mut self, id: BufferId) {
        self.buffers.remove(id);
    }

    fn create_transfer_buffer(&mut self, label: &str, size: u64) -> Result<TransferBufferId, DeviceError> {
        self.begin_create(ResourceKind::TransferBuffer)?;
        if size == 0 {
            return Err(DeviceError::Rejected("zero-sized transfer buffer".to_owned()));
        }
        let id = self.transfers.insert(vec![0; size as usize]);
        self.count_allocation(ResourceKind::TransferBuffer);
        log::trace!("software: transfer buffer `{label}` ({size} bytes)");
        Ok(id)
    }

    fn write_transfer_buffer(
        &mut self,
        id: TransferBufferId,
        offset: u64,
        data: &[u8],
    ) -> Result<(), DeviceError> {
        let staging = self.transfers.get_mut(id).ok_or(DeviceError::InvalidHandle("transfer buffer"))?;
        check_range(offset, data.len() as u64, staging.len() as u64)?;
        let start = offset as usize;
        staging[start..start + data.len()].copy_from_slice(data);
        Ok(())
    }

    fn release_transfer_buffer(&mut self, id: TransferBufferId) {
        if self.transfers.contains_key(id) {
            self.deferred_transfers.push(id);
        }
    }

    fn create_shader(&mut self, desc: &ShaderDesc<'_>) -> Result<ShaderId, DeviceError> {
        self.begin_create(ResourceKind::Shader)?;
        if desc.code.is_empty() {
            return Err(DeviceError::Rejected("empty shader code".to_owned()));
        }
        if !self.formats.contains(desc.format.flag()) {
            return Err(DeviceError::Rejected(format!("shader format {:?} not supported", desc.format)));
        }
        let id = self.shaders.insert(ShaderRecord {
            label: desc.label.to_owned(),
            stage: desc.stage,
            format: desc.format,
            entry_point: desc.entry_point.to_owned(),
            resources: desc.resources,
            code_len: desc.code.len(),
        });
        self.count_allocation(ResourceKind::Shader);
        Ok(id)
    }

    fn release_shader(&mut self, id: ShaderId) {
        self.shaders.remove(id);
    }

    fn create_pipeline(&mut self, desc: &PipelineDesc<'_>) -> Result<PipelineId, DeviceError> {
        self.begin_create(ResourceKind::Pipeline)?;

        let vertex = self.shaders.get(desc.vertex_shader).ok_or(DeviceError::InvalidHandle("shader"))?;
        let fragment = self.shaders.get(desc.fragment_shader).ok_or(DeviceError::InvalidHandle("shader"))?;
        if vertex.stage != ShaderStage::Vertex || fragment.stage != ShaderStage::Fragment {
            return Err(DeviceError::Rejected("shader stages do not match pipeline slots".to_owned()));
        }

        for attr in desc.vertex_attributes {
            let Some(buffer) = desc.vertex_buffers.iter().find(|b| b.slot == attr.buffer_slot) else {
                return Err(DeviceError::Rejected(format!(
                    "attribute {} refers to undeclared buffer slot {}",
                    attr.location, attr.buffer_slot
                )));
            };
            if attr.offset + attr.format.size() > buffer.stride {
                return Err(DeviceError::Rejected(format!(
                    "attribute {} overruns stride {}",
                    attr.location, buffer.stride
                )));
            }
        }

        let record = PipelineRecord {
            label: desc.label.to_owned(),
            vertex: vertex.clone(),
            fragment: fragment.clone(),
            vertex_buffers: desc.vertex_buffers.to_vec(),
            vertex_attributes: desc.vertex_attributes.to_vec(),
            color_target: desc.color_target,
            fill_mode: desc.fill_mode,
        };
        let id = self.pipelines.insert(record);
        self.count_allocation(ResourceKind::Pipeline);
        Ok(id)
    }

    fn release_pipeline(&mut self, id: PipelineId) {
        self.pipelines.remove(id);
    }

    fn create_texture(&mut self, desc: &TextureDesc<'_>) -> Result<TextureId, DeviceError> {
        self.begin_create(ResourceKind::Texture)?;
        if desc.width == 0 || desc.height == 0 {
            return Err(DeviceError::Rejected("zero-sized texture".to_owned()));
        }
        let len = desc.width as usize * desc.height as usize * desc.format.bytes_per_pixel() as usize;
        let id = self.textures.insert(SoftTexture {
            width: desc.width,
            height: desc.height,
            format: desc.format,
            usage: desc.usage,
            pixels: vec![0; len],
        });
        self.count_allocation(ResourceKind::Texture);
        log::trace!("software: texture `{}` ({}x{})", desc.label, desc.width, desc.height);
        Ok(id)
    }

    fn release_texture(&mut self, id: TextureId) {
        self.textures.remove(id);
    }

    fn submit(&mut self, commands: CommandBuffer) -> Result<(), DeviceError> {
        let commands = commands.into_commands();
        let result = validate::validate(&commands, &*self);
        if result.is_ok() {
            self.apply(&commands);
        }
        self.submissions.push(commands);

        for id in std::mem::take(&mut self.deferred_transfers) {
            self.transfers.remove(id);
        }

        result
    }
}
