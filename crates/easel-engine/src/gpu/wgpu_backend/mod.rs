//! Headless wgpu implementation of [`Backend`].
//!
//! Draws are recorded between `begin_frame` and `end_frame`, then replayed in
//! a single render pass into an offscreen `Rgba8Unorm` texture. Per-draw
//! uniforms live in one buffer addressed with dynamic offsets.

mod device;
mod pipeline;
mod readback;

use std::collections::HashMap;

use image::RgbaImage;
use wgpu::util::DeviceExt;

pub use device::GpuInit;

use self::device::HeadlessDevice;
use self::pipeline::{create_pipeline, create_shader, GpuUniforms, Layouts, TARGET_FORMAT};
use super::{
    check_dimensions, check_texture_len, Backend, BackendStats, BufferId, BufferUsage, DrawCall, ProgramId,
    ProgramKind, TextureId,
};
use crate::error::ResourceError;
use crate::paint::Color;

struct GpuTexture {
    // Kept alive for the bind group.
    _texture: wgpu::Texture,
    bind_group: wgpu::BindGroup,
}

struct RenderTarget {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    width: u32,
    height: u32,
}

struct PendingFrame {
    clear: Color,
    calls: Vec<DrawCall>,
}

pub struct WgpuBackend {
    gpu: HeadlessDevice,
    layouts: Layouts,
    shader: wgpu::ShaderModule,
    sampler: wgpu::Sampler,

    target: RenderTarget,

    programs: Vec<(ProgramKind, wgpu::RenderPipeline)>,
    buffers: Vec<wgpu::Buffer>,
    textures: HashMap<u32, GpuTexture>,
    next_texture: u32,
    white: wgpu::BindGroup,

    uniform_stride: u64,
    uniform_capacity: usize,
    uniform_buffer: Option<wgpu::Buffer>,
    uniform_bind_group: Option<wgpu::BindGroup>,

    frame: Option<PendingFrame>,
    stats: BackendStats,
}

impl WgpuBackend {
    /// Creates a device and a `width` x `height` offscreen target.
    pub async fn new(width: u32, height: u32, init: GpuInit) -> anyhow::Result<Self> {
        let gpu = HeadlessDevice::new(&init).await?;
        let layouts = Layouts::new(&gpu.device);
        let shader = create_shader(&gpu.device);

        let sampler = gpu.device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("easel sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::MipmapFilterMode::Nearest,
            ..Default::default()
        });

        let align = u64::from(gpu.device.limits().min_uniform_buffer_offset_alignment);
        let uniform_stride = (std::mem::size_of::<GpuUniforms>() as u64).div_ceil(align) * align;

        check_dimensions("surface", width, height, gpu.device.limits().max_texture_dimension_2d)?;
        let target = create_target(&gpu.device, width, height);
        let (_, white) = create_texture(&gpu, &layouts, &sampler, 1, 1, &[255; 4]);

        Ok(Self {
            gpu,
            layouts,
            shader,
            sampler,
            target,
            programs: Vec::new(),
            buffers: Vec::new(),
            textures: HashMap::new(),
            next_texture: 0,
            white,
            uniform_stride,
            uniform_capacity: 0,
            uniform_buffer: None,
            uniform_bind_group: None,
            frame: None,
            stats: BackendStats::default(),
        })
    }

    /// Blocking variant of [`WgpuBackend::new`].
    pub fn new_blocking(width: u32, height: u32, init: GpuInit) -> anyhow::Result<Self> {
        pollster::block_on(Self::new(width, height, init))
    }

    pub fn adapter_name(&self) -> &str {
        &self.gpu.adapter_name
    }

    fn ensure_uniform_capacity(&mut self, required: usize) {
        if required <= self.uniform_capacity && self.uniform_bind_group.is_some() {
            return;
        }
        let capacity = required.next_power_of_two().max(64);
        let buffer = self.gpu.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("easel uniform buffer"),
            size: self.uniform_stride * capacity as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let bind_group = self.gpu.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("easel uniform bind group"),
            layout: &self.layouts.uniforms,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                    buffer: &buffer,
                    offset: 0,
                    size: pipeline::uniforms_min_binding_size(),
                }),
            }],
        });
        self.uniform_buffer = Some(buffer);
        self.uniform_bind_group = Some(bind_group);
        self.uniform_capacity = capacity;
    }

    fn pipeline(&self, program: ProgramId) -> Option<&wgpu::RenderPipeline> {
        self.programs.get(program.0 as usize).map(|(_, p)| p)
    }

    fn submit(&mut self, frame: PendingFrame) {
        self.ensure_uniform_capacity(frame.calls.len());
        let stride = self.uniform_stride as usize;

        let mut staging = vec![0u8; stride * frame.calls.len()];
        for (i, call) in frame.calls.iter().enumerate() {
            let textured = call.texture.is_some_and(|t| self.textures.contains_key(&t.0));
            let block = GpuUniforms::new(&call.uniforms, textured);
            staging[i * stride..i * stride + std::mem::size_of::<GpuUniforms>()]
                .copy_from_slice(bytemuck::bytes_of(&block));
        }
        if let Some(buffer) = self.uniform_buffer.as_ref() {
            if !staging.is_empty() {
                self.gpu.queue.write_buffer(buffer, 0, &staging);
            }
        }

        let mut encoder = self.gpu.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("easel frame encoder"),
        });

        {
            let mut rpass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("easel frame pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &self.target.view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(frame.clear.to_wgpu()),
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
                multiview_mask: None,
            });

            if let Some(uniforms) = self.uniform_bind_group.as_ref() {
                for (i, call) in frame.calls.iter().enumerate() {
                    let Some(pipeline) = self.pipeline(call.program) else { continue; };
                    let geometry = call.geometry;
                    let (Some(positions), Some(texcoords), Some(indices)) = (
                        self.buffers.get(geometry.positions.0 as usize),
                        self.buffers.get(geometry.texcoords.0 as usize),
                        self.buffers.get(geometry.indices.0 as usize),
                    ) else {
                        continue;
                    };
                    let texture = call
                        .texture
                        .and_then(|t| self.textures.get(&t.0))
                        .map_or(&self.white, |t| &t.bind_group);

                    rpass.set_pipeline(pipeline);
                    rpass.set_bind_group(0, uniforms, &[(i * stride) as u32]);
                    rpass.set_bind_group(1, texture, &[]);
                    rpass.set_vertex_buffer(0, positions.slice(..));
                    rpass.set_vertex_buffer(1, texcoords.slice(..));
                    rpass.set_index_buffer(indices.slice(..), wgpu::IndexFormat::Uint16);
                    rpass.draw_indexed(0..geometry.index_count, 0, 0..1);
                }
            }
        }

        self.gpu.queue.submit(std::iter::once(encoder.finish()));
    }
}

fn create_target(device: &wgpu::Device, width: u32, height: u32) -> RenderTarget {
    let (width, height) = (width.max(1), height.max(1));
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("easel offscreen target"),
        size: wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: TARGET_FORMAT,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
        view_formats: &[],
    });
    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    RenderTarget {
        texture,
        view,
        width,
        height,
    }
}

fn create_texture(
    gpu: &HeadlessDevice,
    layouts: &Layouts,
    sampler: &wgpu::Sampler,
    width: u32,
    height: u32,
    pixels: &[u8],
) -> (wgpu::Texture, wgpu::BindGroup) {
    let texture = gpu.device.create_texture_with_data(
        &gpu.queue,
        &wgpu::TextureDescriptor {
            label: Some("easel texture"),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8Unorm,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        },
        wgpu::util::TextureDataOrder::LayerMajor,
        pixels,
    );
    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    let bind_group = gpu.device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("easel texture bind group"),
        layout: &layouts.texture,
        entries: &[
            wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::TextureView(&view),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: wgpu::BindingResource::Sampler(sampler),
            },
        ],
    });
    (texture, bind_group)
}

impl Backend for WgpuBackend {
    fn label(&self) -> &'static str {
        "wgpu"
    }

    fn compile_program(&mut self, kind: ProgramKind) -> Result<ProgramId, ResourceError> {
        if let Some(i) = self.programs.iter().position(|(k, _)| *k == kind) {
            return Ok(ProgramId(i as u32));
        }
        let pipeline = create_pipeline(&self.gpu.device, &self.layouts, &self.shader, kind);
        self.programs.push((kind, pipeline));
        self.stats.programs_compiled += 1;
        log::debug!("wgpu: compiled {kind:?} pipeline");
        Ok(ProgramId(self.programs.len() as u32 - 1))
    }

    fn create_buffer(&mut self, usage: BufferUsage, contents: &[u8]) -> Result<BufferId, ResourceError> {
        if contents.is_empty() {
            return Err(ResourceError::InvalidBuffer("empty buffer".into()));
        }
        let (label, usage) = match usage {
            BufferUsage::Vertex => ("easel vertex buffer", wgpu::BufferUsages::VERTEX),
            BufferUsage::Index => ("easel index buffer", wgpu::BufferUsages::INDEX),
        };
        // Buffer sizes must be a multiple of COPY_BUFFER_ALIGNMENT.
        let mut padded = contents.to_vec();
        padded.resize(contents.len().next_multiple_of(wgpu::COPY_BUFFER_ALIGNMENT as usize), 0);

        let buffer = self.gpu.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(label),
            contents: &padded,
            usage,
        });
        self.buffers.push(buffer);
        self.stats.buffers_created += 1;
        Ok(BufferId(self.buffers.len() as u32 - 1))
    }

    fn upload_texture(&mut self, width: u32, height: u32, pixels: &[u8]) -> Result<TextureId, ResourceError> {
        check_texture_len(width, height, pixels)?;
        check_dimensions("texture", width, height, self.max_texture_dimension())?;
        let (texture, bind_group) =
            create_texture(&self.gpu, &self.layouts, &self.sampler, width, height, pixels);
        let id = self.next_texture;
        self.next_texture += 1;
        self.textures.insert(
            id,
            GpuTexture {
                _texture: texture,
                bind_group,
            },
        );
        self.stats.textures_uploaded += 1;
        Ok(TextureId(id))
    }

    fn release_texture(&mut self, texture: TextureId) {
        if self.textures.remove(&texture.0).is_some() {
            self.stats.textures_released += 1;
        }
    }

    fn size(&self) -> (u32, u32) {
        (self.target.width, self.target.height)
    }

    fn max_texture_dimension(&self) -> u32 {
        self.gpu.device.limits().max_texture_dimension_2d
    }

    fn resize(&mut self, width: u32, height: u32) -> Result<(), ResourceError> {
        check_dimensions("surface", width, height, self.max_texture_dimension())?;
        if (width.max(1), height.max(1)) == self.size() {
            return Ok(());
        }
        self.target = create_target(&self.gpu.device, width, height);
        Ok(())
    }

    fn begin_frame(&mut self, clear: Color) {
        if self.frame.is_some() {
            log::warn!("wgpu: begin_frame called twice; discarding recorded draws");
        }
        self.frame = Some(PendingFrame {
            clear,
            calls: Vec::new(),
        });
    }

    fn draw_indexed(&mut self, call: &DrawCall) {
        match self.frame.as_mut() {
            Some(frame) => {
                frame.calls.push(*call);
                self.stats.draw_calls += 1;
            }
            None => log::warn!("wgpu: draw issued outside begin_frame/end_frame; ignored"),
        }
    }

    fn end_frame(&mut self) -> Result<(), ResourceError> {
        let Some(frame) = self.frame.take() else {
            return Ok(());
        };
        self.submit(frame);
        self.stats.frames += 1;
        Ok(())
    }

    fn read_pixels(&mut self) -> Result<RgbaImage, ResourceError> {
        let RenderTarget {
            texture,
            width,
            height,
            ..
        } = &self.target;
        let mut data = readback::readback_texture(&self.gpu.device, &self.gpu.queue, texture, *width, *height)?;

        // Target holds premultiplied values.
        for px in data.chunks_exact_mut(4) {
            let c = Color::from_premul(
                f32::from(px[0]) / 255.0,
                f32::from(px[1]) / 255.0,
                f32::from(px[2]) / 255.0,
                f32::from(px[3]) / 255.0,
            );
            px.copy_from_slice(&c.to_rgba8());
        }

        RgbaImage::from_raw(*width, *height, data)
            .ok_or_else(|| ResourceError::Readback("readback size mismatch".into()))
    }

    fn stats(&self) -> BackendStats {
        self.stats
    }
}
