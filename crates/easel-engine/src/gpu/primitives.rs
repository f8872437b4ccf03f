use glam::{Mat4, Vec3};

use super::{Backend, ProgramId, ProgramKind};
use crate::error::ResourceError;

/// Program compilation and matrix helpers used by the renderer.
///
/// Every [`Backend`] gets this for free; the trait exists so traversal code
/// reads in terms of "the basic program" rather than backend plumbing.
pub trait GpuPrimitives {
    /// Flat color / textured quad program.
    fn compile_basic_program(&mut self) -> Result<ProgramId, ResourceError>;

    /// Program with a rounded-box coverage mask.
    fn compile_rounded_corners_program(&mut self) -> Result<ProgramId, ResourceError>;

    /// Model matrix placing a unit-scaled quad at `(x, y)` rotated about its center.
    fn create_transform_matrix(&self, x: f32, y: f32, width: f32, height: f32, rotation: f32) -> Mat4 {
        transform_matrix(x, y, width, height, rotation)
    }

    fn create_orthographic_matrix(
        &self,
        left: f32,
        right: f32,
        bottom: f32,
        top: f32,
        near: f32,
        far: f32,
    ) -> Mat4 {
        orthographic_matrix(left, right, bottom, top, near, far)
    }
}

impl<B: Backend + ?Sized> GpuPrimitives for B {
    fn compile_basic_program(&mut self) -> Result<ProgramId, ResourceError> {
        self.compile_program(ProgramKind::Basic)
    }

    fn compile_rounded_corners_program(&mut self) -> Result<ProgramId, ResourceError> {
        self.compile_program(ProgramKind::RoundedCorners)
    }
}

/// Translation to `(x, y)` followed by a rotation of `rotation` radians
/// around the center of a `width` x `height` box.
///
/// Positive angles turn clockwise on screen (y points down).
pub fn transform_matrix(x: f32, y: f32, width: f32, height: f32, rotation: f32) -> Mat4 {
    let translate = Mat4::from_translation(Vec3::new(x, y, 0.0));
    if rotation == 0.0 {
        return translate;
    }
    let pivot = Vec3::new(width * 0.5, height * 0.5, 0.0);
    translate
        * Mat4::from_translation(pivot)
        * Mat4::from_rotation_z(rotation)
        * Mat4::from_translation(-pivot)
}

/// Orthographic projection, OpenGL-style depth range.
///
/// `orthographic_matrix(0, w, h, 0, -1, 1)` maps scene pixels with a
/// top-left origin onto clip space.
pub fn orthographic_matrix(left: f32, right: f32, bottom: f32, top: f32, near: f32, far: f32) -> Mat4 {
    Mat4::orthographic_rh_gl(left, right, bottom, top, near, far)
}

/// Program ids for one backend, compiled once per render context.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct Programs {
    pub basic: ProgramId,
    pub rounded: ProgramId,
}

impl Programs {
    pub fn compile<B: GpuPrimitives + ?Sized>(backend: &mut B) -> Result<Self, ResourceError> {
        Ok(Self {
            basic: backend.compile_basic_program()?,
            rounded: backend.compile_rounded_corners_program()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use glam::Vec4;

    use super::*;

    fn apply(m: Mat4, x: f32, y: f32) -> (f32, f32) {
        let v = m * Vec4::new(x, y, 0.0, 1.0);
        (v.x / v.w, v.y / v.w)
    }

    fn close(a: (f32, f32), b: (f32, f32)) -> bool {
        (a.0 - b.0).abs() < 1e-4 && (a.1 - b.1).abs() < 1e-4
    }

    #[test]
    fn ortho_maps_corners_to_clip_space() {
        let p = orthographic_matrix(0.0, 100.0, 50.0, 0.0, -1.0, 1.0);
        assert!(close(apply(p, 0.0, 0.0), (-1.0, 1.0)));
        assert!(close(apply(p, 100.0, 50.0), (1.0, -1.0)));
        assert!(close(apply(p, 50.0, 25.0), (0.0, 0.0)));
    }

    #[test]
    fn transform_without_rotation_is_translation() {
        let m = transform_matrix(10.0, 20.0, 30.0, 40.0, 0.0);
        assert!(close(apply(m, 0.0, 0.0), (10.0, 20.0)));
        assert!(close(apply(m, 30.0, 40.0), (40.0, 60.0)));
    }

    #[test]
    fn rotation_pivots_on_center() {
        let m = transform_matrix(0.0, 0.0, 10.0, 10.0, std::f32::consts::FRAC_PI_2);
        // Center is fixed.
        assert!(close(apply(m, 5.0, 5.0), (5.0, 5.0)));
        // Clockwise on a y-down screen: top-left corner lands top-right.
        assert!(close(apply(m, 0.0, 0.0), (10.0, 0.0)));
    }
}
