//! Primitive GPU layer consumed by the renderer.
//!
//! [`Backend`] is the seam between scene traversal and an actual device. Two
//! implementations ship with the crate:
//!
//! - [`SoftwareBackend`]: deterministic CPU rasterizer, always available.
//! - [`WgpuBackend`]: headless wgpu device rendering into an offscreen texture.
//!
//! Both consume the same quad geometry and the same two programs (flat /
//! textured, and signed-distance rounded corners), so a scene looks the same
//! on either.

mod primitives;
mod shading;
pub mod software;
pub mod wgpu_backend;

use glam::Mat4;
use image::RgbaImage;

use crate::error::ResourceError;
use crate::paint::Color;

pub use primitives::{orthographic_matrix, transform_matrix, GpuPrimitives, Programs};
pub use software::SoftwareBackend;
pub use wgpu_backend::{GpuInit, WgpuBackend};

/// Handle to a compiled program.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct ProgramId(pub(crate) u32);

/// Handle to an immutable vertex or index buffer.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct BufferId(pub(crate) u32);

/// Handle to an uploaded RGBA texture.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct TextureId(pub(crate) u32);

/// The two shader programs every backend provides.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum ProgramKind {
    /// Flat color, optionally modulating a texture.
    Basic,
    /// Basic plus a rounded-box coverage mask (radius, stroke ring, soft edge).
    RoundedCorners,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum BufferUsage {
    /// Tightly packed `[f32; 2]` attributes.
    Vertex,
    /// `u16` triangle-list indices.
    Index,
}

/// Vertex positions, texture coordinates and indices for one mesh.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct GeometryBuffer {
    pub positions: BufferId,
    pub texcoords: BufferId,
    pub indices: BufferId,
    pub index_count: u32,
}

/// Per-draw parameters shared by both programs.
///
/// Vertex positions are in the unit square; the vertex stage scales them by
/// `size` and applies `projection * model_view`.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Uniforms {
    pub projection: Mat4,
    pub model_view: Mat4,
    /// Premultiplied. Multiplies the texel when a texture is bound.
    pub color: [f32; 4],
    /// Quad size in scene pixels.
    pub size: [f32; 2],
    pub radius: f32,
    /// Ring width for strokes; 0 fills the shape.
    pub stroke_width: f32,
    /// Edge falloff distance for shadows; 0 is a 1px anti-aliased edge.
    pub softness: f32,
    /// Shrinks the shape inside the quad on every side.
    pub inset: f32,
}

impl Uniforms {
    pub fn new(projection: Mat4, model_view: Mat4, size: [f32; 2], color: [f32; 4]) -> Self {
        Self {
            projection,
            model_view,
            color,
            size,
            radius: 0.0,
            stroke_width: 0.0,
            softness: 0.0,
            inset: 0.0,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct DrawCall {
    pub program: ProgramId,
    pub geometry: GeometryBuffer,
    pub uniforms: Uniforms,
    pub texture: Option<TextureId>,
}

/// Lifetime counters, mostly for tests and `--verbose` output.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
pub struct BackendStats {
    pub programs_compiled: u32,
    pub buffers_created: u32,
    pub textures_uploaded: u32,
    pub textures_released: u32,
    pub frames: u64,
    pub draw_calls: u64,
}

/// A device the renderer can draw into and read back from.
///
/// Frames are bracketed by [`begin_frame`](Backend::begin_frame) and
/// [`end_frame`](Backend::end_frame). The drawing surface is sized in
/// physical pixels; the projection passed in [`Uniforms`] maps scene pixels
/// onto it, so resizing the surface rescales the output.
pub trait Backend {
    fn label(&self) -> &'static str;

    /// Compiling the same kind twice returns the same id.
    fn compile_program(&mut self, kind: ProgramKind) -> Result<ProgramId, ResourceError>;

    fn create_buffer(&mut self, usage: BufferUsage, contents: &[u8]) -> Result<BufferId, ResourceError>;

    /// `pixels` is premultiplied RGBA8, row-major, `width * height * 4` bytes.
    fn upload_texture(&mut self, width: u32, height: u32, pixels: &[u8]) -> Result<TextureId, ResourceError>;

    fn release_texture(&mut self, texture: TextureId);

    /// Current surface size in physical pixels.
    fn size(&self) -> (u32, u32);

    /// Largest width or height accepted for the surface and for textures.
    fn max_texture_dimension(&self) -> u32;

    /// Resizes the surface. Contents are undefined until the next frame.
    ///
    /// Sizes beyond [`max_texture_dimension`](Backend::max_texture_dimension)
    /// are rejected and the current surface is kept.
    fn resize(&mut self, width: u32, height: u32) -> Result<(), ResourceError>;

    /// Starts a frame, clearing the whole surface to `clear`.
    fn begin_frame(&mut self, clear: Color);

    fn draw_indexed(&mut self, call: &DrawCall);

    fn end_frame(&mut self) -> Result<(), ResourceError>;

    /// Straight-alpha RGBA8 copy of the last finished frame.
    fn read_pixels(&mut self) -> Result<RgbaImage, ResourceError>;

    fn stats(&self) -> BackendStats;
}

impl<B: Backend + ?Sized> Backend for Box<B> {
    fn label(&self) -> &'static str {
        (**self).label()
    }

    fn compile_program(&mut self, kind: ProgramKind) -> Result<ProgramId, ResourceError> {
        (**self).compile_program(kind)
    }

    fn create_buffer(&mut self, usage: BufferUsage, contents: &[u8]) -> Result<BufferId, ResourceError> {
        (**self).create_buffer(usage, contents)
    }

    fn upload_texture(&mut self, width: u32, height: u32, pixels: &[u8]) -> Result<TextureId, ResourceError> {
        (**self).upload_texture(width, height, pixels)
    }

    fn release_texture(&mut self, texture: TextureId) {
        (**self).release_texture(texture)
    }

    fn size(&self) -> (u32, u32) {
        (**self).size()
    }

    fn max_texture_dimension(&self) -> u32 {
        (**self).max_texture_dimension()
    }

    fn resize(&mut self, width: u32, height: u32) -> Result<(), ResourceError> {
        (**self).resize(width, height)
    }

    fn begin_frame(&mut self, clear: Color) {
        (**self).begin_frame(clear)
    }

    fn draw_indexed(&mut self, call: &DrawCall) {
        (**self).draw_indexed(call)
    }

    fn end_frame(&mut self) -> Result<(), ResourceError> {
        (**self).end_frame()
    }

    fn read_pixels(&mut self) -> Result<RgbaImage, ResourceError> {
        (**self).read_pixels()
    }

    fn stats(&self) -> BackendStats {
        (**self).stats()
    }
}

/// Checks an RGBA8 upload's length against its dimensions.
pub(crate) fn check_texture_len(width: u32, height: u32, pixels: &[u8]) -> Result<(), ResourceError> {
    let expected = width as usize * height as usize * 4;
    if width == 0 || height == 0 || pixels.len() != expected {
        return Err(ResourceError::TextureSize {
            width,
            height,
            len: pixels.len(),
            expected,
        });
    }
    Ok(())
}

pub(crate) fn check_dimensions(what: &'static str, width: u32, height: u32, max: u32) -> Result<(), ResourceError> {
    if width > max || height > max {
        return Err(ResourceError::TooLarge {
            what,
            width,
            height,
            max,
        });
    }
    Ok(())
}
