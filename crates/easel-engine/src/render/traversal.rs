use easel_scene::{Font, NodeKind, NodeStyle, SceneNode, TextAlign};
use glam::{Mat4, Vec2, Vec3};

use super::{FrameReport, ImageState, RenderContext, TextureKey, TransformMode};
use crate::error::ResourceError;
use crate::gpu::{
    check_dimensions, transform_matrix, Backend, DrawCall, GeometryBuffer, Programs, TextureId, Uniforms,
};
use crate::paint::Color;
use crate::text::TextRequest;

const INPUT_PADDING: f32 = 8.0;

/// Mask parameters for the rounded-corners program.
#[derive(Debug, Copy, Clone, Default)]
struct Shape {
    radius: f32,
    stroke_width: f32,
    softness: f32,
    inset: f32,
}

impl Shape {
    fn rounded(radius: f32) -> Self {
        Self {
            radius,
            ..Self::default()
        }
    }

    fn needs_mask(&self) -> bool {
        self.radius > 0.0 || self.stroke_width > 0.0 || self.softness > 0.0 || self.inset > 0.0
    }
}

/// One frame's walk over the scene tree.
///
/// Per node, paint order is: shadow, fill, type-specific content, border,
/// then children in order.
pub(super) struct Painter<'a, B: Backend> {
    ctx: &'a mut RenderContext<B>,
    programs: Programs,
    geometry: GeometryBuffer,
    projection: Mat4,
    /// Physical pixels per scene pixel, used to size label rasters.
    raster_scale: f32,
    report: FrameReport,
}

impl<'a, B: Backend> Painter<'a, B> {
    pub(super) fn new(
        ctx: &'a mut RenderContext<B>,
        programs: Programs,
        geometry: GeometryBuffer,
        projection: Mat4,
        raster_scale: f32,
    ) -> Self {
        Self {
            ctx,
            programs,
            geometry,
            projection,
            raster_scale,
            report: FrameReport::default(),
        }
    }

    pub(super) fn paint(&mut self, root: &SceneNode) {
        self.paint_node(root, Mat4::IDENTITY, 1.0);
    }

    pub(super) fn finish(self) -> FrameReport {
        self.report
    }

    fn paint_node(&mut self, node: &SceneNode, parent: Mat4, parent_opacity: f32) {
        let g = &node.geometry;
        let opacity = parent_opacity * g.opacity;
        if !g.visible || opacity <= 0.0 {
            self.report.subtrees_skipped += 1;
            return;
        }

        let local = transform_matrix(g.x, g.y, g.width, g.height, g.rotation_radians());
        let model = match self.ctx.config.transform_mode {
            TransformMode::Absolute => local,
            TransformMode::Relative => parent * local,
        };
        let size = [g.width.max(0.0), g.height.max(0.0)];
        let style = &node.style;

        self.report.nodes_painted += 1;

        if style.gradient.is_some() {
            self.ctx.warn_once("gradient", || {
                "gradient fills are not supported; using the solid background".to_owned()
            });
        }

        self.shadow(model, size, style, opacity);
        self.fill(model, size, style, opacity);

        match &node.kind {
            NodeKind::Container | NodeKind::Rect => {}
            NodeKind::Text(text) => {
                self.label(model, size, &text.text, &text.font, text.color, text.align, 0.0, opacity);
            }
            NodeKind::Button(button) => {
                self.label(
                    model,
                    size,
                    &button.label,
                    &button.font,
                    button.text_color,
                    TextAlign::Center,
                    0.0,
                    opacity,
                );
            }
            NodeKind::Image(image) => self.image(model, size, &image.src, style.border_radius, opacity),
            NodeKind::Input(input) => {
                let (text, color) = if input.value.is_empty() {
                    (&input.placeholder, input.placeholder_color)
                } else {
                    (&input.value, input.text_color)
                };
                self.label(model, size, text, &input.font, color, TextAlign::Left, INPUT_PADDING, opacity);
            }
        }

        self.border(model, size, style, opacity);

        for child in &node.children {
            self.paint_node(child, model, opacity);
        }
    }

    fn draw(&mut self, model: Mat4, size: [f32; 2], color: Color, shape: Shape, texture: Option<TextureId>) {
        if size[0] <= 0.0 || size[1] <= 0.0 || color.is_transparent() {
            return;
        }
        let program = if shape.needs_mask() {
            self.programs.rounded
        } else {
            self.programs.basic
        };
        let mut uniforms = Uniforms::new(self.projection, model, size, color.to_array());
        uniforms.radius = shape.radius;
        uniforms.stroke_width = shape.stroke_width;
        uniforms.softness = shape.softness;
        uniforms.inset = shape.inset;

        self.ctx.backend.draw_indexed(&DrawCall {
            program,
            geometry: self.geometry,
            uniforms,
            texture,
        });
        self.report.draw_calls += 1;
    }

    fn fill(&mut self, model: Mat4, size: [f32; 2], style: &NodeStyle, opacity: f32) {
        let Some(background) = style.background else { return };
        if background.is_transparent() {
            return;
        }
        let color = Color::from(background).with_opacity(opacity);
        self.draw(model, size, color, Shape::rounded(style.border_radius), None);
    }

    fn border(&mut self, model: Mat4, size: [f32; 2], style: &NodeStyle, opacity: f32) {
        let Some(border) = style.border else { return };
        if border.width <= 0.0 {
            return;
        }
        let shape = Shape {
            radius: style.border_radius,
            stroke_width: border.width,
            ..Shape::default()
        };
        self.draw(model, size, Color::from(border.color).with_opacity(opacity), shape, None);
    }

    /// Soft silhouette drawn on a quad grown by the blur radius.
    fn shadow(&mut self, model: Mat4, size: [f32; 2], style: &NodeStyle, opacity: f32) {
        let Some(shadow) = style.shadow else { return };
        let blur = shadow.blur.max(0.0);
        let offset = Mat4::from_translation(Vec3::new(shadow.offset_x - blur, shadow.offset_y - blur, 0.0));
        let shape = Shape {
            radius: style.border_radius,
            softness: blur,
            inset: blur,
            ..Shape::default()
        };
        let grown = [size[0] + 2.0 * blur, size[1] + 2.0 * blur];
        self.draw(model * offset, grown, Color::from(shadow.color).with_opacity(opacity), shape, None);
    }

    fn image(&mut self, model: Mat4, size: [f32; 2], src: &str, radius: f32, opacity: f32) {
        if src.is_empty() {
            return;
        }
        let key = TextureKey::Image(src.to_owned());
        if let Some(handle) = self.ctx.textures.get(&key) {
            self.draw(model, size, Color::WHITE.with_opacity(opacity), Shape::rounded(radius), Some(handle.texture));
            return;
        }

        // Placeholder: nothing is drawn until the texture is resident.
        match self.ctx.image_states.get(src) {
            Some(ImageState::Failed) => self.report.resource_errors += 1,
            Some(ImageState::Pending) => self.report.pending_textures += 1,
            None => {
                log::debug!("images: queued `{}`", super::images::truncate_url(src));
                self.ctx.image_states.insert(src.to_owned(), ImageState::Pending);
                self.report.pending_textures += 1;
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn label(
        &mut self,
        model: Mat4,
        size: [f32; 2],
        text: &str,
        font: &Font,
        color: easel_scene::Color,
        align: TextAlign,
        padding: f32,
        opacity: f32,
    ) {
        let box_width = size[0] - 2.0 * padding;
        if text.trim().is_empty() || color.is_transparent() || box_width <= 0.0 || size[1] <= 0.0 {
            return;
        }

        let scale = self.raster_scale;
        let inner = model * Mat4::from_translation(Vec3::new(padding, 0.0, 0.0));
        let label_box = [box_width, size[1]];
        let max = self.ctx.backend.max_texture_dimension();
        let window = match raster_window(self.projection * inner, label_box, scale, max) {
            Ok(Some(window)) => window,
            Ok(None) => return,
            Err(e) => {
                // Placeholder: the label is skipped, the node's box still paints.
                self.report.resource_errors += 1;
                self.ctx.report_error(e);
                return;
            }
        };

        let request = TextRequest {
            text,
            family: &font.family,
            size: font.size * scale,
            weight: font.weight,
            color: [color.r, color.g, color.b, color.a],
            layout: label_box.map(|v| v * scale),
            origin: window.origin,
            width: window.width,
            height: window.height,
            align,
        };

        match self.ctx.create_text_texture(&request) {
            Ok(handle) => {
                let [ox, oy] = window.origin.map(|v| v as f32 / scale);
                self.draw(
                    inner * Mat4::from_translation(Vec3::new(ox, oy, 0.0)),
                    [window.width as f32 / scale, window.height as f32 / scale],
                    Color::WHITE.with_opacity(opacity),
                    Shape::default(),
                    Some(handle.texture),
                );
            }
            Err(e) => {
                self.report.resource_errors += 1;
                self.ctx.report_error(e);
            }
        }
    }
}

/// Physical-pixel window of a label raster.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
struct RasterWindow {
    origin: [u32; 2],
    width: u32,
    height: u32,
}

/// The part of a local `[0, size]` box that can reach the surface, in
/// physical pixels at `scale`.
///
/// The clip-space square is mapped back into the box's local space and its
/// bounds intersected with the box. Rotated boxes keep the axis-aligned
/// bounds of their visible part. Returns `None` when nothing is visible and
/// an error when the window is still wider or taller than `max`.
fn raster_window(
    clip_from_local: Mat4,
    size: [f32; 2],
    scale: f32,
    max: u32,
) -> Result<Option<RasterWindow>, ResourceError> {
    let local_from_clip = clip_from_local.inverse();
    if !local_from_clip.is_finite() {
        return Ok(None);
    }

    let mut lo = Vec2::splat(f32::INFINITY);
    let mut hi = Vec2::splat(f32::NEG_INFINITY);
    for corner in [[-1.0, -1.0], [1.0, -1.0], [1.0, 1.0], [-1.0, 1.0]] {
        let p = local_from_clip
            .project_point3(Vec3::new(corner[0], corner[1], 0.0))
            .truncate();
        lo = lo.min(p);
        hi = hi.max(p);
    }
    // Snap away inverse rounding so a box edge on a pixel edge stays put.
    const SNAP: f32 = 1e-3;
    let full = Vec2::from(size) * scale;
    let lo = (lo.max(Vec2::ZERO) * scale + SNAP).floor();
    let hi = (hi * scale - SNAP).ceil().min(full.ceil());
    if lo.x >= hi.x || lo.y >= hi.y {
        return Ok(None);
    }

    let (width, height) = ((hi.x - lo.x) as u32, (hi.y - lo.y) as u32);
    check_dimensions("label", width, height, max)?;
    Ok(Some(RasterWindow {
        origin: [lo.x as u32, lo.y as u32],
        width,
        height,
    }))
}

#[cfg(test)]
mod tests {
    use easel_scene::{
        Border, Geometry, ImageStyle, NodeStyle, SceneGraph, SceneNode, Shadow, TextStyle,
    };

    use super::*;
    use crate::gpu::SoftwareBackend;
    use crate::render::RenderConfig;

    fn node(id: &str, x: f32, y: f32, w: f32, h: f32, bg: Option<easel_scene::Color>) -> SceneNode {
        SceneNode {
            id: id.to_owned(),
            geometry: Geometry {
                x,
                y,
                width: w,
                height: h,
                rotation: 0.0,
                opacity: 1.0,
                visible: true,
            },
            style: NodeStyle {
                background: bg,
                ..NodeStyle::default()
            },
            kind: NodeKind::Container,
            children: Vec::new(),
        }
    }

    const RED: easel_scene::Color = easel_scene::Color::rgb(1.0, 0.0, 0.0);
    const BLUE: easel_scene::Color = easel_scene::Color::rgb(0.0, 0.0, 1.0);

    fn scene(root: SceneNode, w: u32, h: u32) -> SceneGraph {
        SceneGraph { root, width: w, height: h }
    }

    fn ctx(w: u32, h: u32) -> RenderContext<SoftwareBackend> {
        RenderContext::new(SoftwareBackend::new(w, h))
    }

    #[test]
    fn paint_order_children_over_parent() {
        let mut root = node("root", 0.0, 0.0, 20.0, 20.0, Some(RED));
        root.children.push(node("child", 5.0, 5.0, 10.0, 10.0, Some(BLUE)));
        let mut ctx = ctx(20, 20);
        let report = ctx.render(&scene(root, 20, 20)).unwrap();
        assert_eq!(report.draw_calls, 2);
        assert_eq!(report.nodes_painted, 2);
        let img = ctx.read_pixels().unwrap();
        assert_eq!(img.get_pixel(1, 1).0, [255, 0, 0, 255]);
        assert_eq!(img.get_pixel(10, 10).0, [0, 0, 255, 255]);
    }

    #[test]
    fn later_siblings_paint_over_earlier() {
        let mut root = node("root", 0.0, 0.0, 10.0, 10.0, None);
        root.children.push(node("a", 0.0, 0.0, 10.0, 10.0, Some(RED)));
        root.children.push(node("b", 0.0, 0.0, 10.0, 10.0, Some(BLUE)));
        let mut ctx = ctx(10, 10);
        ctx.render(&scene(root, 10, 10)).unwrap();
        assert_eq!(ctx.read_pixels().unwrap().get_pixel(5, 5).0, [0, 0, 255, 255]);
    }

    #[test]
    fn invisible_subtree_is_skipped() {
        let mut hidden = node("hidden", 0.0, 0.0, 10.0, 10.0, Some(RED));
        hidden.geometry.visible = false;
        hidden.children.push(node("inner", 0.0, 0.0, 10.0, 10.0, Some(BLUE)));
        let mut root = node("root", 0.0, 0.0, 10.0, 10.0, None);
        root.children.push(hidden);

        let mut ctx = ctx(10, 10);
        let report = ctx.render(&scene(root, 10, 10)).unwrap();
        assert_eq!(report.draw_calls, 0);
        assert_eq!(report.subtrees_skipped, 1);
        assert!(ctx.read_pixels().unwrap().pixels().all(|p| p.0 == [255; 4]));
    }

    #[test]
    fn opacity_multiplies_down_the_tree() {
        let mut root = node("root", 0.0, 0.0, 10.0, 10.0, None);
        root.geometry.opacity = 0.5;
        let mut child = node("child", 0.0, 0.0, 10.0, 10.0, Some(easel_scene::Color::black()));
        child.geometry.opacity = 0.5;
        root.children.push(child);

        let mut ctx = ctx(10, 10);
        ctx.render(&scene(root, 10, 10)).unwrap();
        // Black at 25% over white.
        assert_eq!(ctx.read_pixels().unwrap().get_pixel(5, 5).0, [191, 191, 191, 255]);
    }

    #[test]
    fn relative_mode_offsets_children_by_parent() {
        let mut parent = node("parent", 10.0, 10.0, 20.0, 20.0, None);
        parent.children.push(node("child", 5.0, 5.0, 5.0, 5.0, Some(RED)));
        let config = RenderConfig {
            transform_mode: TransformMode::Relative,
            ..RenderConfig::default()
        };
        let mut ctx = RenderContext::with_config(SoftwareBackend::new(40, 40), config);
        ctx.render(&scene(parent, 40, 40)).unwrap();
        let img = ctx.read_pixels().unwrap();
        assert_eq!(img.get_pixel(16, 16).0, [255, 0, 0, 255]);
        assert_eq!(img.get_pixel(6, 6).0, [255, 255, 255, 255]);
    }

    #[test]
    fn border_is_a_ring() {
        let mut root = node("root", 0.0, 0.0, 20.0, 20.0, None);
        root.style.border = Some(Border {
            width: 2.0,
            color: RED,
        });
        let mut ctx = ctx(20, 20);
        let report = ctx.render(&scene(root, 20, 20)).unwrap();
        assert_eq!(report.draw_calls, 1);
        let img = ctx.read_pixels().unwrap();
        assert_eq!(img.get_pixel(0, 10).0, [255, 0, 0, 255]);
        assert_eq!(img.get_pixel(10, 10).0, [255, 255, 255, 255]);
    }

    #[test]
    fn shadow_paints_under_fill() {
        let mut root = node("root", 0.0, 0.0, 40.0, 40.0, None);
        let mut card = node("card", 10.0, 10.0, 10.0, 10.0, Some(BLUE));
        card.style.shadow = Some(Shadow {
            color: easel_scene::Color::black(),
            blur: 0.0,
            offset_x: 5.0,
            offset_y: 5.0,
        });
        root.children.push(card);
        let mut ctx = ctx(40, 40);
        let report = ctx.render(&scene(root, 40, 40)).unwrap();
        assert_eq!(report.draw_calls, 2);
        let img = ctx.read_pixels().unwrap();
        assert_eq!(img.get_pixel(12, 12).0, [0, 0, 255, 255]);
        assert_eq!(img.get_pixel(22, 22).0, [0, 0, 0, 255]);
    }

    #[test]
    fn missing_font_is_reported_not_fatal() {
        let mut root = node("root", 0.0, 0.0, 40.0, 20.0, None);
        root.kind = NodeKind::Text(TextStyle {
            text: "hello".into(),
            font: Font {
                family: "sans-serif".into(),
                size: 16.0,
                weight: 400,
            },
            color: easel_scene::Color::black(),
            align: TextAlign::Left,
        });
        let errors = std::rc::Rc::new(std::cell::Cell::new(0));
        let seen = errors.clone();
        let mut ctx = ctx(40, 20);
        ctx.on_resource_error(move |_| seen.set(seen.get() + 1));
        let report = ctx.render(&scene(root, 40, 20)).unwrap();
        assert_eq!(report.resource_errors, 1);
        assert_eq!(errors.get(), 1);
    }

    #[test]
    fn image_is_queued_until_loaded() {
        let mut root = node("root", 0.0, 0.0, 10.0, 10.0, None);
        root.kind = NodeKind::Image(ImageStyle {
            src: "missing/image.png".into(),
        });
        let mut ctx = ctx(10, 10);
        let graph = scene(root, 10, 10);
        let report = ctx.render(&graph).unwrap();
        assert_eq!(report.pending_textures, 1);
        assert_eq!(ctx.pending_images().collect::<Vec<_>>(), ["missing/image.png"]);

        // The fetch fails; the node stays a placeholder and is no longer pending.
        assert_eq!(pollster::block_on(ctx.load_pending_textures()), 0);
        let report = ctx.render(&graph).unwrap();
        assert_eq!(report.pending_textures, 0);
        assert_eq!(report.resource_errors, 1);
    }

    fn clip(w: f32, h: f32) -> Mat4 {
        crate::gpu::orthographic_matrix(0.0, w, h, 0.0, -1.0, 1.0)
    }

    #[test]
    fn visible_label_rasters_whole_box() {
        let window = raster_window(clip(40.0, 20.0), [40.0, 20.0], 2.0, 8192).unwrap().unwrap();
        assert_eq!(
            window,
            RasterWindow {
                origin: [0, 0],
                width: 80,
                height: 40
            }
        );
    }

    #[test]
    fn oversized_label_rasters_only_the_surface() {
        let window = raster_window(clip(10.0, 10.0), [6000.0, 6000.0], 1.0, 8192).unwrap().unwrap();
        assert_eq!((window.origin, window.width, window.height), ([0, 0], 10, 10));
    }

    #[test]
    fn label_past_the_left_edge_starts_inside() {
        let model = Mat4::from_translation(Vec3::new(-5.0, 0.0, 0.0));
        let window = raster_window(clip(10.0, 10.0) * model, [10.0, 10.0], 1.0, 8192).unwrap().unwrap();
        assert!((4..=5).contains(&window.origin[0]), "{window:?}");
        assert!((5..=6).contains(&window.width), "{window:?}");
        assert_eq!(window.height, 10);
    }

    #[test]
    fn label_off_surface_has_no_window() {
        let model = Mat4::from_translation(Vec3::new(50.0, 0.0, 0.0));
        assert_eq!(raster_window(clip(10.0, 10.0) * model, [10.0, 10.0], 1.0, 8192), Ok(None));
    }

    #[test]
    fn label_window_past_texture_limit_is_refused() {
        let err = raster_window(clip(10_000.0, 100.0), [10_000.0, 100.0], 1.0, 8192).unwrap_err();
        assert!(matches!(err, ResourceError::TooLarge { what: "label", max: 8192, .. }), "{err}");
    }
}
