//! Deterministic CPU implementation of [`Backend`].
//!
//! Rasterizes indexed triangles with edge functions, samples textures with
//! nearest filtering and blends premultiplied source-over into an `f32`
//! framebuffer. The same inputs always produce the same bytes, which makes
//! this backend the reference for tests and for hosts without a GPU.

use std::collections::HashMap;

use glam::Vec4;
use image::RgbaImage;

use super::shading::rounded_coverage;
use super::{
    check_dimensions, check_texture_len, Backend, BackendStats, BufferId, BufferUsage, DrawCall, ProgramId,
    ProgramKind, TextureId,
};
use crate::error::ResourceError;
use crate::paint::Color;

enum Buffer {
    Vertex(Vec<[f32; 2]>),
    Index(Vec<u16>),
}

struct Texture {
    width: u32,
    height: u32,
    /// Premultiplied, normalized.
    texels: Vec<[f32; 4]>,
}

impl Texture {
    fn sample(&self, uv: [f32; 2]) -> [f32; 4] {
        let x = ((uv[0] * self.width as f32).floor() as i64).clamp(0, self.width as i64 - 1);
        let y = ((uv[1] * self.height as f32).floor() as i64).clamp(0, self.height as i64 - 1);
        self.texels[y as usize * self.width as usize + x as usize]
    }
}

/// Screen-space vertex after projection.
#[derive(Copy, Clone)]
struct ScreenVertex {
    x: f32,
    y: f32,
    uv: [f32; 2],
}

pub struct SoftwareBackend {
    width: u32,
    height: u32,
    frame: Vec<[f32; 4]>,
    in_frame: bool,

    programs: Vec<ProgramKind>,
    buffers: Vec<Buffer>,
    textures: HashMap<u32, Texture>,
    next_texture: u32,

    stats: BackendStats,
    warned_outside_frame: bool,
}

impl SoftwareBackend {
    /// Same as the default wgpu `max_texture_dimension_2d`.
    pub const MAX_DIMENSION: u32 = 8192;

    /// Sizes are clamped to `1..=MAX_DIMENSION`.
    pub fn new(width: u32, height: u32) -> Self {
        let clamp = |v: u32| v.clamp(1, Self::MAX_DIMENSION);
        if width > Self::MAX_DIMENSION || height > Self::MAX_DIMENSION {
            log::warn!("software: {width}x{height} surface clamped to {}", Self::MAX_DIMENSION);
        }
        let (width, height) = (clamp(width), clamp(height));
        Self {
            width,
            height,
            frame: vec![[0.0; 4]; width as usize * height as usize],
            in_frame: false,
            programs: Vec::new(),
            buffers: Vec::new(),
            textures: HashMap::new(),
            next_texture: 0,
            stats: BackendStats::default(),
            warned_outside_frame: false,
        }
    }

    /// Number of live textures.
    pub fn texture_count(&self) -> usize {
        self.textures.len()
    }

    fn vertex_buffer(&self, id: BufferId) -> Option<&[[f32; 2]]> {
        match self.buffers.get(id.0 as usize)? {
            Buffer::Vertex(v) => Some(v),
            Buffer::Index(_) => None,
        }
    }

    fn index_buffer(&self, id: BufferId) -> Option<&[u16]> {
        match self.buffers.get(id.0 as usize)? {
            Buffer::Index(i) => Some(i),
            Buffer::Vertex(_) => None,
        }
    }

    fn blend(&mut self, px: u32, py: u32, src: [f32; 4]) {
        let dst = &mut self.frame[py as usize * self.width as usize + px as usize];
        let inv = 1.0 - src[3];
        for c in 0..4 {
            dst[c] = src[c] + dst[c] * inv;
        }
    }

    fn rasterize(&mut self, tri: [ScreenVertex; 3], kind: ProgramKind, call: &DrawCall) {
        let [a, mut b, mut c] = tri;
        let mut area = edge(a, b, c.x, c.y);
        if area == 0.0 || !area.is_finite() {
            return;
        }
        if area < 0.0 {
            std::mem::swap(&mut b, &mut c);
            area = -area;
        }

        let min_x = a.x.min(b.x).min(c.x).floor().max(0.0) as u32;
        let min_y = a.y.min(b.y).min(c.y).floor().max(0.0) as u32;
        let max_x = (a.x.max(b.x).max(c.x).ceil().max(0.0) as u32).min(self.width);
        let max_y = (a.y.max(b.y).max(c.y).ceil().max(0.0) as u32).min(self.height);

        let texture = call.texture.and_then(|t| self.textures.get(&t.0));
        let mut shaded: Vec<(u32, u32, [f32; 4])> = Vec::new();

        for py in min_y..max_y {
            for px in min_x..max_x {
                let (sx, sy) = (px as f32 + 0.5, py as f32 + 0.5);
                let w0 = edge(b, c, sx, sy);
                let w1 = edge(c, a, sx, sy);
                let w2 = edge(a, b, sx, sy);
                if !(covers(w0, b, c) && covers(w1, c, a) && covers(w2, a, b)) {
                    continue;
                }

                let (l0, l1, l2) = (w0 / area, w1 / area, w2 / area);
                let uv = [
                    a.uv[0] * l0 + b.uv[0] * l1 + c.uv[0] * l2,
                    a.uv[1] * l0 + b.uv[1] * l1 + c.uv[1] * l2,
                ];

                let coverage = match kind {
                    ProgramKind::Basic => 1.0,
                    ProgramKind::RoundedCorners => rounded_coverage(uv, &call.uniforms),
                };
                if coverage <= 0.0 {
                    continue;
                }

                let tint = call.uniforms.color;
                let base = match texture {
                    Some(t) => {
                        let texel = t.sample(uv);
                        [texel[0] * tint[0], texel[1] * tint[1], texel[2] * tint[2], texel[3] * tint[3]]
                    }
                    None => tint,
                };
                shaded.push((px, py, base.map(|ch| ch * coverage)));
            }
        }

        for (px, py, src) in shaded {
            self.blend(px, py, src);
        }
    }
}

/// Twice the signed area of `(a, b, p)`.
fn edge(a: ScreenVertex, b: ScreenVertex, px: f32, py: f32) -> f32 {
    (b.x - a.x) * (py - a.y) - (b.y - a.y) * (px - a.x)
}

/// Inside test with a tie-break for pixel centers exactly on an edge: of the
/// two triangles sharing an edge (traversed in opposite directions), exactly
/// one claims the pixel.
fn covers(w: f32, from: ScreenVertex, to: ScreenVertex) -> bool {
    if w != 0.0 {
        return w > 0.0;
    }
    let (dx, dy) = (to.x - from.x, to.y - from.y);
    dy > 0.0 || (dy == 0.0 && dx < 0.0)
}

impl Backend for SoftwareBackend {
    fn label(&self) -> &'static str {
        "software"
    }

    fn compile_program(&mut self, kind: ProgramKind) -> Result<ProgramId, ResourceError> {
        if let Some(i) = self.programs.iter().position(|k| *k == kind) {
            return Ok(ProgramId(i as u32));
        }
        self.programs.push(kind);
        self.stats.programs_compiled += 1;
        log::debug!("software: compiled {kind:?} program");
        Ok(ProgramId(self.programs.len() as u32 - 1))
    }

    fn create_buffer(&mut self, usage: BufferUsage, contents: &[u8]) -> Result<BufferId, ResourceError> {
        let buffer = match usage {
            BufferUsage::Vertex => {
                if contents.len() % 8 != 0 {
                    return Err(ResourceError::InvalidBuffer(format!(
                        "vertex buffer of {} bytes is not a whole number of vec2s",
                        contents.len()
                    )));
                }
                let floats: Vec<f32> = contents
                    .chunks_exact(4)
                    .map(|b| f32::from_ne_bytes([b[0], b[1], b[2], b[3]]))
                    .collect();
                Buffer::Vertex(floats.chunks_exact(2).map(|v| [v[0], v[1]]).collect())
            }
            BufferUsage::Index => {
                if contents.len() % 2 != 0 {
                    return Err(ResourceError::InvalidBuffer(format!(
                        "index buffer of {} bytes is not a whole number of u16s",
                        contents.len()
                    )));
                }
                Buffer::Index(
                    contents
                        .chunks_exact(2)
                        .map(|b| u16::from_ne_bytes([b[0], b[1]]))
                        .collect(),
                )
            }
        };
        self.buffers.push(buffer);
        self.stats.buffers_created += 1;
        Ok(BufferId(self.buffers.len() as u32 - 1))
    }

    fn upload_texture(&mut self, width: u32, height: u32, pixels: &[u8]) -> Result<TextureId, ResourceError> {
        check_texture_len(width, height, pixels)?;
        check_dimensions("texture", width, height, Self::MAX_DIMENSION)?;
        let texels = pixels
            .chunks_exact(4)
            .map(|p| [p[0], p[1], p[2], p[3]].map(|c| f32::from(c) / 255.0))
            .collect();
        let id = self.next_texture;
        self.next_texture += 1;
        self.textures.insert(id, Texture { width, height, texels });
        self.stats.textures_uploaded += 1;
        Ok(TextureId(id))
    }

    fn release_texture(&mut self, texture: TextureId) {
        if self.textures.remove(&texture.0).is_some() {
            self.stats.textures_released += 1;
        }
    }

    fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn max_texture_dimension(&self) -> u32 {
        Self::MAX_DIMENSION
    }

    fn resize(&mut self, width: u32, height: u32) -> Result<(), ResourceError> {
        check_dimensions("surface", width, height, Self::MAX_DIMENSION)?;
        let (width, height) = (width.max(1), height.max(1));
        if (width, height) == (self.width, self.height) {
            return Ok(());
        }
        self.width = width;
        self.height = height;
        self.frame = vec![[0.0; 4]; width as usize * height as usize];
        Ok(())
    }

    fn begin_frame(&mut self, clear: Color) {
        self.frame.fill(clear.to_array());
        self.in_frame = true;
    }

    fn draw_indexed(&mut self, call: &DrawCall) {
        if !self.in_frame {
            if !self.warned_outside_frame {
                log::warn!("software: draw issued outside begin_frame/end_frame; ignored");
                self.warned_outside_frame = true;
            }
            return;
        }

        let Some(&kind) = self.programs.get(call.program.0 as usize) else {
            log::warn!("software: unknown program {:?}", call.program);
            return;
        };
        let geometry = call.geometry;
        let (Some(positions), Some(texcoords), Some(indices)) = (
            self.vertex_buffer(geometry.positions),
            self.vertex_buffer(geometry.texcoords),
            self.index_buffer(geometry.indices),
        ) else {
            log::warn!("software: draw references missing buffers");
            return;
        };

        let mvp = call.uniforms.projection * call.uniforms.model_view;
        let [sw, sh] = call.uniforms.size;
        let (fw, fh) = (self.width as f32, self.height as f32);

        let count = (geometry.index_count as usize).min(indices.len());
        let mut triangles = Vec::with_capacity(count / 3);
        for tri in indices[..count].chunks_exact(3) {
            let mut out = [ScreenVertex { x: 0.0, y: 0.0, uv: [0.0; 2] }; 3];
            for (slot, &i) in out.iter_mut().zip(tri) {
                let (Some(pos), Some(uv)) = (positions.get(i as usize), texcoords.get(i as usize)) else {
                    return;
                };
                let clip = mvp * Vec4::new(pos[0] * sw, pos[1] * sh, 0.0, 1.0);
                let (nx, ny) = (clip.x / clip.w, clip.y / clip.w);
                *slot = ScreenVertex {
                    x: (nx + 1.0) * 0.5 * fw,
                    y: (1.0 - ny) * 0.5 * fh,
                    uv: *uv,
                };
            }
            triangles.push(out);
        }

        self.stats.draw_calls += 1;
        for tri in triangles {
            self.rasterize(tri, kind, call);
        }
    }

    fn end_frame(&mut self) -> Result<(), ResourceError> {
        self.in_frame = false;
        self.stats.frames += 1;
        Ok(())
    }

    fn read_pixels(&mut self) -> Result<RgbaImage, ResourceError> {
        let mut bytes = Vec::with_capacity(self.frame.len() * 4);
        for &[r, g, b, a] in &self.frame {
            bytes.extend_from_slice(&Color::from_premul(r, g, b, a).to_rgba8());
        }
        RgbaImage::from_raw(self.width, self.height, bytes)
            .ok_or_else(|| ResourceError::Readback("framebuffer size mismatch".into()))
    }

    fn stats(&self) -> BackendStats {
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use glam::Mat4;

    use super::*;
    use crate::gpu::{orthographic_matrix, GeometryBuffer, Programs, Uniforms};
    use crate::render::create_rect_geometry;

    fn setup(w: u32, h: u32) -> (SoftwareBackend, Programs, GeometryBuffer) {
        let mut backend = SoftwareBackend::new(w, h);
        let programs = Programs::compile(&mut backend).unwrap();
        let geometry = create_rect_geometry(&mut backend).unwrap();
        (backend, programs, geometry)
    }

    fn quad(program: ProgramId, geometry: GeometryBuffer, x: f32, y: f32, w: f32, h: f32, color: [f32; 4]) -> DrawCall {
        DrawCall {
            program,
            geometry,
            uniforms: Uniforms::new(
                orthographic_matrix(0.0, 10.0, 10.0, 0.0, -1.0, 1.0),
                Mat4::from_translation(glam::Vec3::new(x, y, 0.0)),
                [w, h],
                color,
            ),
            texture: None,
        }
    }

    #[test]
    fn clear_then_read_back() {
        let (mut b, _, _) = setup(4, 3);
        b.begin_frame(Color::from_straight(0.0, 0.0, 1.0, 1.0));
        b.end_frame().unwrap();
        let img = b.read_pixels().unwrap();
        assert_eq!(img.dimensions(), (4, 3));
        assert!(img.pixels().all(|p| p.0 == [0, 0, 255, 255]));
    }

    #[test]
    fn quad_covers_exactly_its_pixels() {
        let (mut b, programs, geometry) = setup(10, 10);
        b.begin_frame(Color::WHITE);
        b.draw_indexed(&quad(programs.basic, geometry, 2.0, 3.0, 4.0, 5.0, [1.0, 0.0, 0.0, 1.0]));
        b.end_frame().unwrap();
        let img = b.read_pixels().unwrap();
        let red = img.pixels().filter(|p| p.0 == [255, 0, 0, 255]).count();
        assert_eq!(red, 20);
        assert_eq!(img.get_pixel(2, 3).0, [255, 0, 0, 255]);
        assert_eq!(img.get_pixel(5, 7).0, [255, 0, 0, 255]);
        assert_eq!(img.get_pixel(6, 7).0, [255, 255, 255, 255]);
        assert_eq!(img.get_pixel(1, 3).0, [255, 255, 255, 255]);
    }

    #[test]
    fn half_transparent_blends_over_white() {
        let (mut b, programs, geometry) = setup(10, 10);
        b.begin_frame(Color::WHITE);
        b.draw_indexed(&quad(programs.basic, geometry, 0.0, 0.0, 10.0, 10.0, [0.0, 0.0, 0.0, 0.5]));
        b.end_frame().unwrap();
        let img = b.read_pixels().unwrap();
        assert_eq!(img.get_pixel(5, 5).0, [128, 128, 128, 255]);
    }

    #[test]
    fn textured_quad_samples_nearest() {
        let (mut b, programs, geometry) = setup(10, 10);
        // 2x1: left red, right green.
        let tex = b
            .upload_texture(2, 1, &[255, 0, 0, 255, 0, 255, 0, 255])
            .unwrap();
        b.begin_frame(Color::TRANSPARENT);
        let mut call = quad(programs.basic, geometry, 0.0, 0.0, 10.0, 10.0, [1.0; 4]);
        call.texture = Some(tex);
        b.draw_indexed(&call);
        b.end_frame().unwrap();
        let img = b.read_pixels().unwrap();
        assert_eq!(img.get_pixel(1, 5).0, [255, 0, 0, 255]);
        assert_eq!(img.get_pixel(8, 5).0, [0, 255, 0, 255]);
    }

    #[test]
    fn programs_are_compiled_once() {
        let mut b = SoftwareBackend::new(1, 1);
        let first = Programs::compile(&mut b).unwrap();
        let second = Programs::compile(&mut b).unwrap();
        assert_eq!(first, second);
        assert_eq!(b.stats().programs_compiled, 2);
    }

    #[test]
    fn bad_uploads_are_rejected() {
        let mut b = SoftwareBackend::new(1, 1);
        assert!(matches!(
            b.upload_texture(2, 2, &[0; 4]),
            Err(ResourceError::TextureSize { expected: 16, .. })
        ));
        assert!(b.create_buffer(BufferUsage::Vertex, &[0; 6]).is_err());
    }

    #[test]
    fn release_frees_texture() {
        let mut b = SoftwareBackend::new(1, 1);
        let t = b.upload_texture(1, 1, &[0; 4]).unwrap();
        assert_eq!(b.texture_count(), 1);
        b.release_texture(t);
        b.release_texture(t);
        assert_eq!(b.texture_count(), 0);
        assert_eq!(b.stats().textures_released, 1);
    }

    #[test]
    fn resize_past_limit_keeps_surface() {
        let mut b = SoftwareBackend::new(4, 3);
        let err = b.resize(SoftwareBackend::MAX_DIMENSION + 1, 3).unwrap_err();
        assert!(matches!(err, ResourceError::TooLarge { what: "surface", .. }));
        assert_eq!(b.size(), (4, 3));

        b.resize(6, 2).unwrap();
        assert_eq!(b.size(), (6, 2));
    }
}
