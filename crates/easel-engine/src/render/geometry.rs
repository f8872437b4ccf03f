//! Shared quad geometry.

use bytemuck::{Pod, Zeroable};

use crate::error::ResourceError;
use crate::gpu::{Backend, BufferUsage, GeometryBuffer};

#[repr(C)]
#[derive(Debug, Copy, Clone, Pod, Zeroable)]
struct QuadVertex {
    pos: [f32; 2], // 0..1
}

const QUAD_VERTICES: [QuadVertex; 4] = [
    QuadVertex { pos: [0.0, 0.0] },
    QuadVertex { pos: [1.0, 0.0] },
    QuadVertex { pos: [1.0, 1.0] },
    QuadVertex { pos: [0.0, 1.0] },
];

// Unit square; texture coordinates coincide with positions.
const QUAD_TEXCOORDS: [QuadVertex; 4] = QUAD_VERTICES;

const QUAD_INDICES: [u16; 6] = [0, 1, 2, 0, 2, 3];

/// Uploads a unit quad (two triangles, six indices).
pub fn create_rect_geometry<B: Backend + ?Sized>(backend: &mut B) -> Result<GeometryBuffer, ResourceError> {
    let positions = backend.create_buffer(BufferUsage::Vertex, bytemuck::cast_slice(&QUAD_VERTICES))?;
    let texcoords = backend.create_buffer(BufferUsage::Vertex, bytemuck::cast_slice(&QUAD_TEXCOORDS))?;
    let indices = backend.create_buffer(BufferUsage::Index, bytemuck::cast_slice(&QUAD_INDICES))?;
    Ok(GeometryBuffer {
        positions,
        texcoords,
        indices,
        index_count: QUAD_INDICES.len() as u32,
    })
}

/// Lazily created geometry, reused for every node of every frame.
#[derive(Debug, Default)]
pub struct GeometryCache {
    rect: Option<GeometryBuffer>,
}

impl GeometryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// The unit quad, created on first use.
    pub fn rect<B: Backend + ?Sized>(&mut self, backend: &mut B) -> Result<GeometryBuffer, ResourceError> {
        if let Some(rect) = self.rect {
            return Ok(rect);
        }
        let rect = create_rect_geometry(backend)?;
        log::debug!("geometry: created rect quad on {}", backend.label());
        self.rect = Some(rect);
        Ok(rect)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::SoftwareBackend;

    #[test]
    fn rect_is_created_once() {
        let mut backend = SoftwareBackend::new(4, 4);
        let mut cache = GeometryCache::new();
        let a = cache.rect(&mut backend).unwrap();
        let b = cache.rect(&mut backend).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.index_count, 6);
        assert_eq!(backend.stats().buffers_created, 3);
    }
}
