use std::collections::BTreeMap;

use anyhow::{Context, Result};
use slotmap::SlotMap;
use wgpu::util::DeviceExt;

use super::command::{Command, CommandBuffer};
use super::types::{
    BlendComponent, BlendFactor, BlendOperation, BlendState, BufferDesc, BufferUsages,
    ColorTargetInfo, FillMode, IndexFormat, LoadOp, PipelineDesc, ShaderDesc, ShaderFormat,
    ShaderFormats, ShaderResourceCounts, TextureDesc, TextureFilter, TextureFormat, TextureUsages,
    VertexFormat, VertexStepMode,
};
use super::validate::{self, BufferInfo, Resources, TextureInfo};
use super::{BufferId, Device, DeviceError, GpuInit, PipelineId, ShaderId, TextureId, TransferBufferId};

/// Bind group holding fragment textures.
///
/// Cross-compiled SPIR-V places fragment sampled resources in set 2; texture
/// `slot` lives at binding `2 * slot` and its sampler at `2 * slot + 1`.
const FRAGMENT_TEXTURE_GROUP: u32 = 2;

/// Bind group holding fragment uniform buffers; uniform `slot` is binding `slot`.
const FRAGMENT_UNIFORM_GROUP: u32 = 3;

const UNIFORM_ALIGNMENT: usize = 16;

const SPIRV_MAGIC: u32 = 0x0723_0203;

struct GpuShader {
    module: wgpu::ShaderModule,
    entry_point: String,
    resources: ShaderResourceCounts,
}

struct WgpuBuffer {
    buffer: wgpu::Buffer,
    usage: BufferUsages,
    size: u64,
    /// Host copy of the contents, padded to `COPY_BUFFER_ALIGNMENT`.
    ///
    /// Only uploads write device buffers, so the copy stays exact and
    /// unaligned uploads can be widened to aligned queue writes.
    shadow: Vec<u8>,
}

struct GpuTexture {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    width: u32,
    height: u32,
    format: TextureFormat,
    usage: TextureUsages,
}

struct GpuPipeline {
    pipeline: wgpu::RenderPipeline,
    fragment: ShaderResourceCounts,
    /// Bind group layouts by set index.
    bind_layouts: Vec<wgpu::BindGroupLayout>,
}

/// Hardware backend on wgpu.
///
/// This type is the low-level rendering context:
/// - creates and stores Adapter/Device/Queue
/// - owns every wgpu object behind generation-checked handles
/// - replays recorded command buffers into wgpu encoders
///
/// Staging memory lives on the host. Uploads become queue writes; when an
/// upload follows recorded render work, the pending encoder is submitted
/// first so the render work sees the old contents. A command list is fully
/// validated before the first queue operation.
///
/// Creation calls run inside wgpu error scopes, so invalid shaders and
/// pipelines come back as [`DeviceError`] instead of reaching the
/// uncaptured-error handler.
pub struct WgpuDevice {
    /// Selected adapter.
    adapter: wgpu::Adapter,

    /// Logical device.
    device: wgpu::Device,

    /// Command queue.
    queue: wgpu::Queue,

    /// Adapter supports `PolygonMode::Line`.
    line_mode: bool,

    nearest: wgpu::Sampler,
    linear: wgpu::Sampler,

    // fills the sets a pipeline declares but does not use
    empty_layout: wgpu::BindGroupLayout,
    empty_group: wgpu::BindGroup,

    buffers: SlotMap<BufferId, WgpuBuffer>,
    transfers: SlotMap<TransferBufferId, Vec<u8>>,
    shaders: SlotMap<ShaderId, GpuShader>,
    pipelines: SlotMap<PipelineId, GpuPipeline>,
    textures: SlotMap<TextureId, GpuTexture>,

    deferred_transfers: Vec<TransferBufferId>,
}

impl WgpuDevice {
    /// Creates a headless device.
    ///
    /// Adapter/device acquisition is asynchronous under wgpu.
    pub async fn new(init: GpuInit) -> Result<Self> {
        let GpuInit {
            power_preference,
            force_fallback_adapter,
            mut required_features,
            required_limits,
        } = init;

        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference,
                compatible_surface: None,
                force_fallback_adapter,
            })
            .await
            .context("failed to find a suitable GPU adapter")?;

        let line_mode = adapter.features().contains(wgpu::Features::POLYGON_MODE_LINE);
        if line_mode {
            required_features |= wgpu::Features::POLYGON_MODE_LINE;
        } else {
            log::warn!("adapter lacks POLYGON_MODE_LINE; wireframe pipelines will be filled");
        }

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("ashen-render device"),
                required_features,
                required_limits,
                experimental_features: wgpu::ExperimentalFeatures::disabled(),
                memory_hints: wgpu::MemoryHints::Performance,
                trace: wgpu::Trace::Off,
            })
            .await
            .context("failed to create wgpu device/queue")?;

        let nearest = create_sampler(&device, "ashen nearest sampler", wgpu::FilterMode::Nearest);
        let linear = create_sampler(&device, "ashen linear sampler", wgpu::FilterMode::Linear);

        let empty_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("ashen empty layout"),
            entries: &[],
        });
        let empty_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("ashen empty group"),
            layout: &empty_layout,
            entries: &[],
        });

        log::info!("using adapter {:?}", adapter.get_info().name);

        Ok(Self {
            adapter,
            device,
            queue,
            line_mode,
            nearest,
            linear,
            empty_layout,
            empty_group,
            buffers: SlotMap::with_key(),
            transfers: SlotMap::with_key(),
            shaders: SlotMap::with_key(),
            pipelines: SlotMap::with_key(),
            textures: SlotMap::with_key(),
            deferred_transfers: Vec::new(),
        })
    }

    /// Blocks on [`WgpuDevice::new`].
    pub fn new_blocking(init: GpuInit) -> Result<Self> {
        pollster::block_on(Self::new(init))
    }

    pub fn adapter_info(&self) -> wgpu::AdapterInfo {
        self.adapter.get_info()
    }

    /// Returns a reference to the logical device.
    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    /// Returns a reference to the command queue.
    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    /// Runs `f` inside out-of-memory and validation error scopes.
    fn scoped<T>(&self, f: impl FnOnce() -> T) -> Result<T, DeviceError> {
        let oom = self.device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        let validation = self.device.push_error_scope(wgpu::ErrorFilter::Validation);

        let value = f();

        // scopes pop innermost first
        let invalid = pollster::block_on(validation.pop());
        let out_of_memory = pollster::block_on(oom.pop());

        if out_of_memory.is_some() {
            return Err(DeviceError::OutOfMemory);
        }
        if let Some(err) = invalid {
            log::debug!("wgpu rejected request: {err}");
            return Err(DeviceError::Rejected(err.to_string()));
        }
        Ok(value)
    }

    fn new_encoder(&self) -> wgpu::CommandEncoder {
        self.device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("ashen frame encoder"),
            })
    }

    /// Submits recorded render work so a following upload cannot overtake it.
    fn flush(&self, encoder: &mut wgpu::CommandEncoder, pending_render: &mut bool) {
        if std::mem::take(pending_render) {
            let done = std::mem::replace(encoder, self.new_encoder());
            self.queue.submit(std::iter::once(done.finish()));
        }
    }

    fn replay(&mut self, commands: &[Command]) -> Result<(), DeviceError> {
        validate::validate(commands, &*self)?;

        let mut encoder = self.new_encoder();
        let mut pending_render = false;

        let mut i = 0;
        while i < commands.len() {
            match &commands[i] {
                Command::UploadToBuffer { src, src_offset, dst, dst_offset, size } => {
                    self.flush(&mut encoder, &mut pending_render);
                    self.write_buffer(*src, *src_offset, *dst, *dst_offset, *size)?;
                }
                Command::UploadToTexture { src, src_offset, dst, width, height } => {
                    self.flush(&mut encoder, &mut pending_render);
                    self.write_texture(*src, *src_offset, *dst, *width, *height)?;
                }
                Command::BeginRenderPass(target) => {
                    let end = commands[i..]
                        .iter()
                        .position(|c| matches!(c, Command::EndRenderPass))
                        .map(|p| i + p)
                        .ok_or(DeviceError::InvalidCommand("pass left open at submit"))?;
                    self.encode_render_pass(&mut encoder, target, &commands[i + 1..end])?;
                    pending_render = true;
                    i = end;
                }
                _ => {}
            }
            i += 1;
        }

        self.queue.submit(std::iter::once(encoder.finish()));
        Ok(())
    }

    /// Applies a validated upload to the host copy, then writes the aligned
    /// window covering it.
    fn write_buffer(
        &mut self,
        src: TransferBufferId,
        src_offset: u64,
        dst: BufferId,
        dst_offset: u64,
        size: u64,
    ) -> Result<(), DeviceError> {
        let staging = self.transfers.get(src).ok_or(DeviceError::InvalidHandle("transfer buffer"))?;
        let buffer = self.buffers.get_mut(dst).ok_or(DeviceError::InvalidHandle("buffer"))?;

        let (s, d, n) = (src_offset as usize, dst_offset as usize, size as usize);
        buffer.shadow[d..d + n].copy_from_slice(&staging[s..s + n]);

        let (start, end) = aligned_window(dst_offset, size, buffer.shadow.len() as u64);
        if start < end {
            self.queue.write_buffer(&buffer.buffer, start, &buffer.shadow[start as usize..end as usize]);
        }
        Ok(())
    }

    fn write_texture(
        &self,
        src: TransferBufferId,
        src_offset: u64,
        dst: TextureId,
        width: u32,
        height: u32,
    ) -> Result<(), DeviceError> {
        let staging = self.transfers.get(src).ok_or(DeviceError::InvalidHandle("transfer buffer"))?;
        let texture = self.textures.get(dst).ok_or(DeviceError::InvalidHandle("texture"))?;

        let bytes_per_row = width * texture.format.bytes_per_pixel();
        let len = u64::from(bytes_per_row) * u64::from(height);
        let end = src_offset.saturating_add(len);
        let bytes = staging
            .get(src_offset as usize..end as usize)
            .ok_or(DeviceError::OutOfRange { offset: src_offset, end, size: staging.len() as u64 })?;

        self.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &texture.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            bytes,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(bytes_per_row),
                rows_per_image: Some(height),
            },
            wgpu::Extent3d { width, height, depth_or_array_layers: 1 },
        );
        Ok(())
    }

    fn encode_render_pass(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        target: &ColorTargetInfo,
        commands: &[Command],
    ) -> Result<(), DeviceError> {
        let view = &self
            .textures
            .get(target.texture)
            .ok_or(DeviceError::InvalidHandle("texture"))?
            .view;

        let load = match target.load {
            LoadOp::Load => wgpu::LoadOp::Load,
            LoadOp::Clear([r, g, b, a]) => wgpu::LoadOp::Clear(wgpu::Color {
                r: r as f64,
                g: g as f64,
                b: b as f64,
                a: a as f64,
            }),
        };

        let mut rpass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("ashen render pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load,
                    store: wgpu::StoreOp::Store,
                },
                depth_slice: None,
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
            multiview_mask: None,
        });

        let mut bound: Option<&GpuPipeline> = None;
        let mut textures = BTreeMap::new();
        let mut uniforms = BTreeMap::new();
        // fragment bind groups need rebuilding before the next draw
        let mut dirty = false;

        for cmd in commands {
            match cmd {
                Command::BindPipeline(id) => {
                    let pipeline = self.pipelines.get(*id).ok_or(DeviceError::InvalidHandle("pipeline"))?;
                    rpass.set_pipeline(&pipeline.pipeline);
                    bound = Some(pipeline);
                    dirty = true;
                }
                Command::BindVertexBuffer { slot, binding } => {
                    let buffer = self.buffers.get(binding.buffer).ok_or(DeviceError::InvalidHandle("buffer"))?;
                    rpass.set_vertex_buffer(*slot, buffer.buffer.slice(binding.offset..));
                }
                Command::BindIndexBuffer { binding, format } => {
                    let buffer = self.buffers.get(binding.buffer).ok_or(DeviceError::InvalidHandle("buffer"))?;
                    rpass.set_index_buffer(buffer.buffer.slice(binding.offset..), index_format(*format));
                }
                Command::BindFragmentTexture { slot, texture, filter } => {
                    textures.insert(*slot, (*texture, *filter));
                    dirty = true;
                }
                Command::PushFragmentUniform { slot, data } => {
                    uniforms.insert(*slot, data.as_slice());
                    dirty = true;
                }
                Command::Draw { vertex_count, instance_count, first_vertex, first_instance } => {
                    let pipeline = bound.ok_or(DeviceError::InvalidCommand("draw without a bound pipeline"))?;
                    if std::mem::take(&mut dirty) {
                        self.bind_fragment_resources(&mut rpass, pipeline, &textures, &uniforms)?;
                    }
                    rpass.draw(
                        *first_vertex..first_vertex + vertex_count,
                        *first_instance..first_instance + instance_count,
                    );
                }
                Command::DrawIndexed { index_count, instance_count, first_index, vertex_offset, first_instance } => {
                    let pipeline = bound.ok_or(DeviceError::InvalidCommand("draw without a bound pipeline"))?;
                    if std::mem::take(&mut dirty) {
                        self.bind_fragment_resources(&mut rpass, pipeline, &textures, &uniforms)?;
                    }
                    rpass.draw_indexed(
                        *first_index..first_index + index_count,
                        *vertex_offset,
                        *first_instance..first_instance + instance_count,
                    );
                }
                _ => return Err(DeviceError::InvalidCommand("copy command inside a render pass")),
            }
        }

        Ok(())
    }

    /// Sets every bind group `pipeline` declares from the pass's current bindings.
    fn bind_fragment_resources(
        &self,
        rpass: &mut wgpu::RenderPass<'_>,
        pipeline: &GpuPipeline,
        textures: &BTreeMap<u32, (TextureId, TextureFilter)>,
        uniforms: &BTreeMap<u32, &[u8]>,
    ) -> Result<(), DeviceError> {
        for (index, layout) in pipeline.bind_layouts.iter().enumerate() {
            let group = index as u32;
            let bind_group = match group {
                FRAGMENT_TEXTURE_GROUP if pipeline.fragment.samplers > 0 => {
                    self.texture_group(layout, pipeline.fragment.samplers, textures)?
                }
                FRAGMENT_UNIFORM_GROUP if pipeline.fragment.uniform_buffers > 0 => {
                    self.uniform_group(layout, pipeline.fragment.uniform_buffers, uniforms)?
                }
                _ => self.empty_group.clone(),
            };
            rpass.set_bind_group(group, &bind_group, &[]);
        }
        Ok(())
    }

    fn texture_group(
        &self,
        layout: &wgpu::BindGroupLayout,
        count: u32,
        textures: &BTreeMap<u32, (TextureId, TextureFilter)>,
    ) -> Result<wgpu::BindGroup, DeviceError> {
        let mut entries = Vec::with_capacity(count as usize * 2);
        for slot in 0..count {
            let (id, filter) = textures
                .get(&slot)
                .ok_or(DeviceError::InvalidCommand("draw with an unbound fragment texture slot"))?;
            let texture = self.textures.get(*id).ok_or(DeviceError::InvalidHandle("texture"))?;
            let sampler = match filter {
                TextureFilter::Nearest => &self.nearest,
                TextureFilter::Linear => &self.linear,
            };
            entries.push(wgpu::BindGroupEntry {
                binding: slot * 2,
                resource: wgpu::BindingResource::TextureView(&texture.view),
            });
            entries.push(wgpu::BindGroupEntry {
                binding: slot * 2 + 1,
                resource: wgpu::BindingResource::Sampler(sampler),
            });
        }

        Ok(self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("ashen fragment textures"),
            layout,
            entries: &entries,
        }))
    }

    fn uniform_group(
        &self,
        layout: &wgpu::BindGroupLayout,
        count: u32,
        uniforms: &BTreeMap<u32, &[u8]>,
    ) -> Result<wgpu::BindGroup, DeviceError> {
        let buffers = (0..count)
            .map(|slot| {
                let data = uniforms
                    .get(&slot)
                    .ok_or(DeviceError::InvalidCommand("draw without fragment uniform data"))?;
                Ok(self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some("ashen fragment uniforms"),
                    contents: &pad_uniform(data),
                    usage: wgpu::BufferUsages::UNIFORM,
                }))
            })
            .collect::<Result<Vec<_>, DeviceError>>()?;

        let entries: Vec<wgpu::BindGroupEntry<'_>> = buffers
            .iter()
            .zip(0u32..)
            .map(|(buffer, binding)| wgpu::BindGroupEntry {
                binding,
                resource: buffer.as_entire_binding(),
            })
            .collect();

        Ok(self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("ashen fragment uniforms"),
            layout,
            entries: &entries,
        }))
    }

    /// Layouts for sets `0..=last used`, with unused sets left empty.
    fn fragment_layouts(&self, fragment: ShaderResourceCounts) -> Vec<wgpu::BindGroupLayout> {
        (0..fragment_group_count(fragment))
            .map(|group| match group {
                FRAGMENT_TEXTURE_GROUP if fragment.samplers > 0 => {
                    self.device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                        label: Some("ashen fragment textures"),
                        entries: &texture_layout_entries(fragment.samplers),
                    })
                }
                FRAGMENT_UNIFORM_GROUP if fragment.uniform_buffers > 0 => {
                    self.device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                        label: Some("ashen fragment uniforms"),
                        entries: &uniform_layout_entries(fragment.uniform_buffers),
                    })
                }
                _ => self.empty_layout.clone(),
            })
            .collect()
    }
}

impl Resources for WgpuDevice {
    fn buffer(&self, id: BufferId) -> Option<BufferInfo> {
        self.buffers.get(id).map(|b| BufferInfo { usage: b.usage, size: b.size })
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
        self.pipelines.get(id).map(|p| p.fragment)
    }
}

impl Device for WgpuDevice {
    fn shader_formats(&self) -> ShaderFormats {
        ShaderFormats::SPIRV
    }

    fn create_buffer(&mut self, desc: &BufferDesc<'_>) -> Result<BufferId, DeviceError> {
        if desc.size == 0 {
            return Err(DeviceError::Rejected("zero-sized buffer".to_owned()));
        }
        let padded = desc.size.next_multiple_of(wgpu::COPY_BUFFER_ALIGNMENT);
        let buffer = self.scoped(|| {
            self.device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(desc.label),
                size: padded,
                usage: buffer_usages(desc.usage),
                mapped_at_creation: false,
            })
        })?;
        Ok(self.buffers.insert(WgpuBuffer {
            buffer,
            usage: desc.usage,
            size: desc.size,
            shadow: vec![0; padded as usize],
        }))
    }

    fn release_buffer(&mut self, id: BufferId) {
        if let Some(buffer) = self.buffers.remove(id) {
            buffer.buffer.destroy();
        }
    }

    fn create_transfer_buffer(&mut self, _label: &str, size: u64) -> Result<TransferBufferId, DeviceError> {
        if size == 0 {
            return Err(DeviceError::Rejected("zero-sized transfer buffer".to_owned()));
        }
        Ok(self.transfers.insert(vec![0; size as usize]))
    }

    fn write_transfer_buffer(
        &mut self,
        id: TransferBufferId,
        offset: u64,
        data: &[u8],
    ) -> Result<(), DeviceError> {
        let staging = self.transfers.get_mut(id).ok_or(DeviceError::InvalidHandle("transfer buffer"))?;
        let size = staging.len() as u64;
        let end = offset.saturating_add(data.len() as u64);
        let dst = staging
            .get_mut(offset as usize..end as usize)
            .ok_or(DeviceError::OutOfRange { offset, end, size })?;
        dst.copy_from_slice(data);
        Ok(())
    }

    fn release_transfer_buffer(&mut self, id: TransferBufferId) {
        if self.transfers.contains_key(id) {
            self.deferred_transfers.push(id);
        }
    }

    fn create_shader(&mut self, desc: &ShaderDesc<'_>) -> Result<ShaderId, DeviceError> {
        if desc.format != ShaderFormat::Spirv {
            return Err(DeviceError::Rejected(format!("shader format {:?} not supported", desc.format)));
        }
        if !is_spirv(desc.code) {
            return Err(DeviceError::Rejected("code is not a SPIR-V module".to_owned()));
        }

        let module = self.scoped(|| {
            self.device.create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(desc.label),
                source: wgpu::util::make_spirv(desc.code),
            })
        })?;

        Ok(self.shaders.insert(GpuShader {
            module,
            entry_point: desc.entry_point.to_owned(),
            resources: desc.resources,
        }))
    }

    fn release_shader(&mut self, id: ShaderId) {
        self.shaders.remove(id);
    }

    fn create_pipeline(&mut self, desc: &PipelineDesc<'_>) -> Result<PipelineId, DeviceError> {
        let vs = self.shaders.get(desc.vertex_shader).ok_or(DeviceError::InvalidHandle("shader"))?;
        let fs = self.shaders.get(desc.fragment_shader).ok_or(DeviceError::InvalidHandle("shader"))?;

        if vs.resources != ShaderResourceCounts::default() {
            return Err(DeviceError::Rejected("vertex-stage resources are not supported".to_owned()));
        }
        let fragment = fs.resources;
        if fragment.storage_buffers > 0 || fragment.storage_textures > 0 {
            return Err(DeviceError::Rejected("fragment storage resources are not supported".to_owned()));
        }

        // wgpu addresses vertex buffers by position in the layout list.
        let mut buffers = desc.vertex_buffers.to_vec();
        buffers.sort_by_key(|b| b.slot);
        if buffers.iter().enumerate().any(|(i, b)| b.slot as usize != i) {
            return Err(DeviceError::Rejected("vertex buffer slots must be contiguous from 0".to_owned()));
        }

        let attributes: Vec<Vec<wgpu::VertexAttribute>> = buffers
            .iter()
            .map(|b| {
                desc.vertex_attributes
                    .iter()
                    .filter(|a| a.buffer_slot == b.slot)
                    .map(|a| wgpu::VertexAttribute {
                        format: vertex_format(a.format),
                        offset: u64::from(a.offset),
                        shader_location: a.location,
                    })
                    .collect()
            })
            .collect();

        let layouts: Vec<wgpu::VertexBufferLayout<'_>> = buffers
            .iter()
            .zip(&attributes)
            .map(|(b, attrs)| wgpu::VertexBufferLayout {
                array_stride: u64::from(b.stride),
                step_mode: match b.step_mode {
                    VertexStepMode::Vertex => wgpu::VertexStepMode::Vertex,
                    VertexStepMode::Instance => wgpu::VertexStepMode::Instance,
                },
                attributes: attrs,
            })
            .collect();

        let polygon_mode = match desc.fill_mode {
            FillMode::Fill => wgpu::PolygonMode::Fill,
            FillMode::Line if self.line_mode => wgpu::PolygonMode::Line,
            FillMode::Line => wgpu::PolygonMode::Fill,
        };

        let (pipeline, bind_layouts) = self.scoped(|| {
            let bind_layouts = self.fragment_layouts(fragment);
            let layout_refs: Vec<&wgpu::BindGroupLayout> = bind_layouts.iter().collect();
            let layout = self.device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some(desc.label),
                bind_group_layouts: &layout_refs,
                immediate_size: 0,
            });

            let pipeline = self.device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some(desc.label),
                layout: Some(&layout),

                vertex: wgpu::VertexState {
                    module: &vs.module,
                    entry_point: Some(vs.entry_point.as_str()),
                    compilation_options: Default::default(),
                    buffers: &layouts,
                },

                fragment: Some(wgpu::FragmentState {
                    module: &fs.module,
                    entry_point: Some(fs.entry_point.as_str()),
                    compilation_options: Default::default(),
                    targets: &[Some(wgpu::ColorTargetState {
                        format: texture_format(desc.color_target.format),
                        blend: desc.color_target.blend.map(blend_state),
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                }),

                primitive: wgpu::PrimitiveState {
                    topology: wgpu::PrimitiveTopology::TriangleList,
                    strip_index_format: None,
                    front_face: wgpu::FrontFace::Ccw,
                    cull_mode: None,
                    polygon_mode,
                    unclipped_depth: false,
                    conservative: false,
                },

                depth_stencil: None,
                multisample: wgpu::MultisampleState::default(),
                multiview_mask: None,
                cache: None,
            });

            (pipeline, bind_layouts)
        })?;

        Ok(self.pipelines.insert(GpuPipeline { pipeline, fragment, bind_layouts }))
    }

    fn release_pipeline(&mut self, id: PipelineId) {
        self.pipelines.remove(id);
    }

    fn create_texture(&mut self, desc: &TextureDesc<'_>) -> Result<TextureId, DeviceError> {
        if desc.width == 0 || desc.height == 0 {
            return Err(DeviceError::Rejected("zero-sized texture".to_owned()));
        }

        let mut usage = wgpu::TextureUsages::COPY_DST;
        if desc.usage.contains(TextureUsages::SAMPLER) {
            usage |= wgpu::TextureUsages::TEXTURE_BINDING;
        }
        if desc.usage.contains(TextureUsages::COLOR_TARGET) {
            usage |= wgpu::TextureUsages::RENDER_ATTACHMENT;
        }

        let texture = self.scoped(|| {
            self.device.create_texture(&wgpu::TextureDescriptor {
                label: Some(desc.label),
                size: wgpu::Extent3d {
                    width: desc.width,
                    height: desc.height,
                    depth_or_array_layers: 1,
                },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: texture_format(desc.format),
                usage,
                view_formats: &[],
            })
        })?;
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

        Ok(self.textures.insert(GpuTexture {
            texture,
            view,
            width: desc.width,
            height: desc.height,
            format: desc.format,
            usage: desc.usage,
        }))
    }

    fn release_texture(&mut self, id: TextureId) {
        if let Some(texture) = self.textures.remove(id) {
            texture.texture.destroy();
        }
    }

    fn submit(&mut self, commands: CommandBuffer) -> Result<(), DeviceError> {
        let commands = commands.into_commands();
        let result = self.replay(&commands);

        for id in std::mem::take(&mut self.deferred_transfers) {
            self.transfers.remove(id);
        }

        result
    }
}

// ── bind layouts ──────────────────────────────────────────────────────────

/// Number of bind group sets a pipeline with these fragment resources declares.
fn fragment_group_count(fragment: ShaderResourceCounts) -> u32 {
    if fragment.uniform_buffers > 0 {
        FRAGMENT_UNIFORM_GROUP + 1
    } else if fragment.samplers > 0 {
        FRAGMENT_TEXTURE_GROUP + 1
    } else {
        0
    }
}

fn texture_layout_entries(count: u32) -> Vec<wgpu::BindGroupLayoutEntry> {
    (0..count)
        .flat_map(|slot| {
            [
                wgpu::BindGroupLayoutEntry {
                    binding: slot * 2,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: slot * 2 + 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ]
        })
        .collect()
}

fn uniform_layout_entries(count: u32) -> Vec<wgpu::BindGroupLayoutEntry> {
    (0..count)
        .map(|slot| wgpu::BindGroupLayoutEntry {
            binding: slot,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        })
        .collect()
}

/// Byte range `[start, end)` covering `offset..offset + len`, widened to
/// `COPY_BUFFER_ALIGNMENT` and clamped to `padded_size`.
fn aligned_window(offset: u64, len: u64, padded_size: u64) -> (u64, u64) {
    if len == 0 {
        return (offset, offset);
    }
    let align = wgpu::COPY_BUFFER_ALIGNMENT;
    let start = offset - offset % align;
    let end = offset.saturating_add(len).next_multiple_of(align).min(padded_size);
    (start, end)
}

fn pad_uniform(data: &[u8]) -> Vec<u8> {
    let mut padded = data.to_vec();
    padded.resize(data.len().next_multiple_of(UNIFORM_ALIGNMENT), 0);
    padded
}

// ── conversions ───────────────────────────────────────────────────────────

fn create_sampler(device: &wgpu::Device, label: &str, filter: wgpu::FilterMode) -> wgpu::Sampler {
    device.create_sampler(&wgpu::SamplerDescriptor {
        label: Some(label),
        address_mode_u: wgpu::AddressMode::Repeat,
        address_mode_v: wgpu::AddressMode::Repeat,
        address_mode_w: wgpu::AddressMode::Repeat,
        mag_filter: filter,
        min_filter: filter,
        ..Default::default()
    })
}

fn is_spirv(code: &[u8]) -> bool {
    if code.len() < 4 || code.len() % 4 != 0 {
        return false;
    }
    let magic = [code[0], code[1], code[2], code[3]];
    u32::from_le_bytes(magic) == SPIRV_MAGIC || u32::from_be_bytes(magic) == SPIRV_MAGIC
}

fn buffer_usages(usage: BufferUsages) -> wgpu::BufferUsages {
    let mut out = wgpu::BufferUsages::COPY_DST;
    if usage.contains(BufferUsages::VERTEX) {
        out |= wgpu::BufferUsages::VERTEX;
    }
    if usage.contains(BufferUsages::INDEX) {
        out |= wgpu::BufferUsages::INDEX;
    }
    if usage.contains(BufferUsages::INDIRECT) {
        out |= wgpu::BufferUsages::INDIRECT;
    }
    if usage.contains(BufferUsages::STORAGE) {
        out |= wgpu::BufferUsages::STORAGE;
    }
    out
}

fn texture_format(format: TextureFormat) -> wgpu::TextureFormat {
    match format {
        TextureFormat::R8Unorm => wgpu::TextureFormat::R8Unorm,
        TextureFormat::Rgba8Unorm => wgpu::TextureFormat::Rgba8Unorm,
        TextureFormat::Rgba8UnormSrgb => wgpu::TextureFormat::Rgba8UnormSrgb,
        TextureFormat::Bgra8Unorm => wgpu::TextureFormat::Bgra8Unorm,
        TextureFormat::Bgra8UnormSrgb => wgpu::TextureFormat::Bgra8UnormSrgb,
    }
}

fn vertex_format(format: VertexFormat) -> wgpu::VertexFormat {
    match format {
        VertexFormat::Float2 => wgpu::VertexFormat::Float32x2,
        VertexFormat::Float3 => wgpu::VertexFormat::Float32x3,
        VertexFormat::Float4 => wgpu::VertexFormat::Float32x4,
        VertexFormat::Ubyte4Norm => wgpu::VertexFormat::Unorm8x4,
    }
}

fn index_format(format: IndexFormat) -> wgpu::IndexFormat {
    match format {
        IndexFormat::Uint16 => wgpu::IndexFormat::Uint16,
        IndexFormat::Uint32 => wgpu::IndexFormat::Uint32,
    }
}

fn blend_factor(factor: BlendFactor) -> wgpu::BlendFactor {
    match factor {
        BlendFactor::Zero => wgpu::BlendFactor::Zero,
        BlendFactor::One => wgpu::BlendFactor::One,
        BlendFactor::SrcColor => wgpu::BlendFactor::Src,
        BlendFactor::OneMinusSrcColor => wgpu::BlendFactor::OneMinusSrc,
        BlendFactor::SrcAlpha => wgpu::BlendFactor::SrcAlpha,
        BlendFactor::OneMinusSrcAlpha => wgpu::BlendFactor::OneMinusSrcAlpha,
        BlendFactor::DstColor => wgpu::BlendFactor::Dst,
        BlendFactor::OneMinusDstColor => wgpu::BlendFactor::OneMinusDst,
        BlendFactor::DstAlpha => wgpu::BlendFactor::DstAlpha,
        BlendFactor::OneMinusDstAlpha => wgpu::BlendFactor::OneMinusDstAlpha,
    }
}

fn blend_component(c: BlendComponent) -> wgpu::BlendComponent {
    wgpu::BlendComponent {
        src_factor: blend_factor(c.src_factor),
        dst_factor: blend_factor(c.dst_factor),
        operation: match c.operation {
            BlendOperation::Add => wgpu::BlendOperation::Add,
            BlendOperation::Subtract => wgpu::BlendOperation::Subtract,
            BlendOperation::ReverseSubtract => wgpu::BlendOperation::ReverseSubtract,
            BlendOperation::Min => wgpu::BlendOperation::Min,
            BlendOperation::Max => wgpu::BlendOperation::Max,
        },
    }
}

fn blend_state(b: BlendState) -> wgpu::BlendState {
    wgpu::BlendState {
        color: blend_component(b.color),
        alpha: blend_component(b.alpha),
    }
}
