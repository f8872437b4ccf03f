//! CPU mirror of the fragment math in `quad.wgsl`.

use super::Uniforms;

/// Signed distance from `p` to a rounded box centered on the origin.
pub(crate) fn rounded_box_sdf(p: [f32; 2], half: [f32; 2], radius: f32) -> f32 {
    let r = radius.clamp(0.0, half[0].min(half[1]));
    let qx = p[0].abs() - half[0] + r;
    let qy = p[1].abs() - half[1] + r;
    let outside = qx.max(0.0).hypot(qy.max(0.0));
    let inside = qx.max(qy).min(0.0);
    outside + inside - r
}

fn smoothstep(edge0: f32, edge1: f32, x: f32) -> f32 {
    let t = ((x - edge0) / (edge1 - edge0)).clamp(0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}

/// Coverage of the rounded-corners program at texture coordinate `uv`.
pub(crate) fn rounded_coverage(uv: [f32; 2], u: &Uniforms) -> f32 {
    let [w, h] = u.size;
    let local = [uv[0] * w - w * 0.5, uv[1] * h - h * 0.5];
    let half = [(w * 0.5 - u.inset).max(0.0), (h * 0.5 - u.inset).max(0.0)];
    let d = rounded_box_sdf(local, half, u.radius);

    let mut coverage = (0.5 - d).clamp(0.0, 1.0);
    if u.stroke_width > 0.0 {
        coverage *= (0.5 + d + u.stroke_width).clamp(0.0, 1.0);
    }
    if u.softness > 0.0 {
        coverage = 1.0 - smoothstep(-u.softness, u.softness, d);
    }
    coverage
}

#[cfg(test)]
mod tests {
    use glam::Mat4;

    use super::*;

    fn uniforms(size: [f32; 2], radius: f32) -> Uniforms {
        let mut u = Uniforms::new(Mat4::IDENTITY, Mat4::IDENTITY, size, [1.0; 4]);
        u.radius = radius;
        u
    }

    #[test]
    fn sdf_sign() {
        assert!(rounded_box_sdf([0.0, 0.0], [10.0, 10.0], 0.0) < 0.0);
        assert!(rounded_box_sdf([11.0, 0.0], [10.0, 10.0], 0.0) > 0.0);
        assert!((rounded_box_sdf([10.0, 0.0], [10.0, 10.0], 0.0)).abs() < 1e-6);
    }

    #[test]
    fn corner_is_cut_by_radius() {
        let u = uniforms([100.0, 100.0], 20.0);
        // Pixel center nearest the top-left corner.
        assert_eq!(rounded_coverage([0.005, 0.005], &u), 0.0);
        assert_eq!(rounded_coverage([0.5, 0.5], &u), 1.0);
        assert_eq!(rounded_coverage([0.005, 0.5], &u), 1.0);
    }

    #[test]
    fn stroke_leaves_interior_empty() {
        let mut u = uniforms([100.0, 100.0], 0.0);
        u.stroke_width = 4.0;
        assert_eq!(rounded_coverage([0.5, 0.5], &u), 0.0);
        assert_eq!(rounded_coverage([0.015, 0.5], &u), 1.0);
    }

    #[test]
    fn softness_fades_outward() {
        let mut u = uniforms([100.0, 100.0], 0.0);
        u.inset = 10.0;
        u.softness = 10.0;
        let center = rounded_coverage([0.5, 0.5], &u);
        let edge = rounded_coverage([0.1, 0.5], &u);
        let outside = rounded_coverage([0.01, 0.5], &u);
        assert_eq!(center, 1.0);
        assert!((edge - 0.5).abs() < 1e-4);
        assert!(outside < edge);
    }
}
