use bytemuck::{Pod, Zeroable};

use crate::gpu::{ProgramKind, Uniforms};

pub(super) const TARGET_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

/// Uniform block layout (176 bytes), mirrored by `Uniforms` in `quad.wgsl`.
///
///  offset   0  projection   mat4x4
///  offset  64  model_view   mat4x4
///  offset 128  color        vec4
///  offset 144  size         vec2
///  offset 152  radius, stroke_width, softness, inset
///  offset 168  use_texture, _pad
#[repr(C)]
#[derive(Debug, Copy, Clone, Pod, Zeroable)]
pub(super) struct GpuUniforms {
    projection: [[f32; 4]; 4],
    model_view: [[f32; 4]; 4],
    color: [f32; 4],
    size: [f32; 2],
    radius: f32,
    stroke_width: f32,
    softness: f32,
    inset: f32,
    use_texture: f32,
    _pad: f32,
}

impl GpuUniforms {
    pub fn new(u: &Uniforms, textured: bool) -> Self {
        Self {
            projection: u.projection.to_cols_array_2d(),
            model_view: u.model_view.to_cols_array_2d(),
            color: u.color,
            size: u.size,
            radius: u.radius,
            stroke_width: u.stroke_width,
            softness: u.softness,
            inset: u.inset,
            use_texture: if textured { 1.0 } else { 0.0 },
            _pad: 0.0,
        }
    }
}

pub(super) fn uniforms_min_binding_size() -> Option<std::num::NonZeroU64> {
    std::num::NonZeroU64::new(std::mem::size_of::<GpuUniforms>() as u64)
}

/// `[f32; 2]` attribute stream at the given shader location.
pub(super) fn vec2_layout(location: u32) -> wgpu::VertexBufferLayout<'static> {
    const POSITION: [wgpu::VertexAttribute; 1] = wgpu::vertex_attr_array![0 => Float32x2];
    const TEXCOORD: [wgpu::VertexAttribute; 1] = wgpu::vertex_attr_array![1 => Float32x2];
    wgpu::VertexBufferLayout {
        array_stride: std::mem::size_of::<[f32; 2]>() as u64,
        step_mode: wgpu::VertexStepMode::Vertex,
        attributes: if location == 0 { &POSITION } else { &TEXCOORD },
    }
}

pub(super) fn premul_alpha_blend() -> wgpu::BlendState {
    let component = wgpu::BlendComponent {
        src_factor: wgpu::BlendFactor::One,
        dst_factor: wgpu::BlendFactor::OneMinusSrcAlpha,
        operation: wgpu::BlendOperation::Add,
    };
    wgpu::BlendState {
        color: component,
        alpha: component,
    }
}

/// Bind group layouts shared by every pipeline.
pub(super) struct Layouts {
    pub uniforms: wgpu::BindGroupLayout,
    pub texture: wgpu::BindGroupLayout,
    pub pipeline: wgpu::PipelineLayout,
}

impl Layouts {
    pub fn new(device: &wgpu::Device) -> Self {
        let uniforms = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("easel uniforms bgl"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: true,
                    min_binding_size: uniforms_min_binding_size(),
                },
                count: None,
            }],
        });

        let texture = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("easel texture bgl"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        let pipeline = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("easel pipeline layout"),
            bind_group_layouts: &[&uniforms, &texture],
            immediate_size: 0,
        });

        Self {
            uniforms,
            texture,
            pipeline,
        }
    }
}

pub(super) fn create_shader(device: &wgpu::Device) -> wgpu::ShaderModule {
    device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some("easel quad shader"),
        source: wgpu::ShaderSource::Wgsl(include_str!("quad.wgsl").into()),
    })
}

pub(super) fn create_pipeline(
    device: &wgpu::Device,
    layouts: &Layouts,
    shader: &wgpu::ShaderModule,
    kind: ProgramKind,
) -> wgpu::RenderPipeline {
    let (label, entry_point) = match kind {
        ProgramKind::Basic => ("easel basic pipeline", "fs_basic"),
        ProgramKind::RoundedCorners => ("easel rounded pipeline", "fs_rounded"),
    };

    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some(label),
        layout: Some(&layouts.pipeline),
        vertex: wgpu::VertexState {
            module: shader,
            entry_point: Some("vs_main"),
            compilation_options: Default::default(),
            buffers: &[vec2_layout(0), vec2_layout(1)],
        },
        fragment: Some(wgpu::FragmentState {
            module: shader,
            entry_point: Some(entry_point),
            compilation_options: Default::default(),
            targets: &[Some(wgpu::ColorTargetState {
                format: TARGET_FORMAT,
                blend: Some(premul_alpha_blend()),
                write_mask: wgpu::ColorWrites::ALL,
            })],
        }),
        primitive: wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleList,
            strip_index_format: None,
            front_face: wgpu::FrontFace::Ccw,
            cull_mode: None,
            polygon_mode: wgpu::PolygonMode::Fill,
            unclipped_depth: false,
            conservative: false,
        },
        depth_stencil: None,
        multisample: wgpu::MultisampleState::default(),
        multiview_mask: None,
        cache: None,
    })
}
