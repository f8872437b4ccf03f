use std::collections::HashSet;

use serde::Deserialize;
use serde_json::Value;

use crate::node::{
    Border, ButtonStyle, Font, Geometry, Gradient, GradientKind, GradientStop, ImageStyle,
    InputStyle, NodeKind, NodeStyle, NodeType, SceneGraph, SceneNode, Shadow, TextAlign,
    TextStyle,
};
use crate::{Color, SceneDefaults, ValidationError};

const SCENE_PATH: &str = "scene";

/// Builds a [`SceneGraph`] from a decoded JSON scene description using
/// [`SceneDefaults::default`].
///
/// The input must be an object with `root`, `width` and `height`.
pub fn create_scene(data: &Value) -> Result<SceneGraph, ValidationError> {
    create_scene_with(data, &SceneDefaults::default())
}

/// Like [`create_scene`] with explicit defaults for omitted node fields.
pub fn create_scene_with(
    data: &Value,
    defaults: &SceneDefaults,
) -> Result<SceneGraph, ValidationError> {
    let obj = data.as_object().ok_or_else(|| ValidationError::Malformed {
        path: SCENE_PATH.to_owned(),
        message: "expected a JSON object".to_owned(),
    })?;

    let width = viewport_dimension(obj.get("width"), "width")?;
    let height = viewport_dimension(obj.get("height"), "height")?;
    let root = obj.get("root").ok_or(ValidationError::MissingField {
        path: SCENE_PATH.to_owned(),
        field: "root",
    })?;

    let mut builder = Builder { defaults, ids: HashSet::new() };
    let root = builder.node(root, "root")?;
    if defaults.require_container_root && root.node_type() != NodeType::Container {
        return Err(ValidationError::RootNotContainer {
            type_name: root.node_type().as_str(),
        });
    }

    log::debug!("scene built: {}x{}, {} nodes", width, height, builder.ids.len());
    Ok(SceneGraph { root, width, height })
}

/// Parses a JSON string and builds the scene from it.
pub fn parse_scene(json: &str) -> Result<SceneGraph, ValidationError> {
    let value: Value = serde_json::from_str(json).map_err(|e| ValidationError::Malformed {
        path: SCENE_PATH.to_owned(),
        message: e.to_string(),
    })?;
    create_scene(&value)
}

fn viewport_dimension(value: Option<&Value>, field: &'static str) -> Result<u32, ValidationError> {
    let value = value.ok_or(ValidationError::MissingField {
        path: SCENE_PATH.to_owned(),
        field,
    })?;
    let n = value.as_f64().ok_or_else(|| ValidationError::Malformed {
        path: SCENE_PATH.to_owned(),
        message: format!("`{field}` must be a number, got {value}"),
    })?;
    if n <= 0.0 || n.fract() != 0.0 || n > u32::MAX as f64 {
        return Err(ValidationError::InvalidViewport { field, value: n });
    }
    Ok(n as u32)
}

// ── raw document shapes ───────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawNode {
    id: Option<String>,
    #[serde(rename = "type")]
    node_type: Option<String>,

    x: Option<f32>,
    y: Option<f32>,
    width: Option<f32>,
    height: Option<f32>,
    rotation: Option<f32>,
    opacity: Option<f32>,
    visible: Option<bool>,
    children: Option<Vec<Value>>,

    background_color: Option<RawColor>,
    border_radius: Option<f32>,
    border_width: Option<f32>,
    border_color: Option<RawColor>,
    shadow_color: Option<RawColor>,
    shadow_blur: Option<f32>,
    shadow_offset_x: Option<f32>,
    shadow_offset_y: Option<f32>,
    gradient: Option<RawGradient>,

    // rect
    fill: Option<RawColor>,
    stroke: Option<RawColor>,
    stroke_width: Option<f32>,
    radius: Option<f32>,

    // text / button / input
    #[serde(alias = "content", alias = "label")]
    text: Option<String>,
    font_family: Option<String>,
    font_size: Option<f32>,
    font_weight: Option<RawWeight>,
    color: Option<RawColor>,
    #[serde(alias = "textAlign")]
    align: Option<String>,
    text_color: Option<RawColor>,

    // image
    #[serde(alias = "url")]
    src: Option<String>,

    // input
    placeholder: Option<String>,
    value: Option<String>,
    placeholder_color: Option<RawColor>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawColor {
    Hex(String),
    Rgba {
        r: f32,
        g: f32,
        b: f32,
        #[serde(default = "opaque")]
        a: f32,
    },
}

fn opaque() -> f32 {
    1.0
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawWeight {
    Numeric(f64),
    Named(String),
}

#[derive(Debug, Deserialize)]
struct RawGradient {
    #[serde(rename = "type")]
    kind: Option<String>,
    angle: Option<f32>,
    #[serde(default)]
    stops: Vec<RawStop>,
}

#[derive(Debug, Deserialize)]
struct RawStop {
    offset: f32,
    color: RawColor,
}

// ── conversion ────────────────────────────────────────────────────────────

struct Builder<'d> {
    defaults: &'d SceneDefaults,
    ids: HashSet<String>,
}

impl Builder<'_> {
    fn node(&mut self, value: &Value, path: &str) -> Result<SceneNode, ValidationError> {
        let mut raw = RawNode::deserialize(value).map_err(|e| ValidationError::Malformed {
            path: path.to_owned(),
            message: e.to_string(),
        })?;

        let id = raw
            .id
            .clone()
            .filter(|id| !id.is_empty())
            .ok_or_else(|| missing(path, "id"))?;

        let tag = raw.node_type.as_deref().ok_or_else(|| missing(path, "type"))?;
        let node_type = NodeType::parse(tag).ok_or_else(|| ValidationError::UnknownNodeType {
            path: path.to_owned(),
            type_name: tag.to_owned(),
        })?;

        if !self.ids.insert(id.clone()) {
            return Err(ValidationError::DuplicateId { path: path.to_owned(), id });
        }

        let geometry = self.geometry(&raw, path)?;
        let children_values = raw.children.take().unwrap_or_default();

        let (style, kind) = self.style_and_kind(raw, node_type, path)?;

        let mut children = Vec::with_capacity(children_values.len());
        for (i, child) in children_values.iter().enumerate() {
            children.push(self.node(child, &format!("{path}.children[{i}]"))?);
        }

        Ok(SceneNode { id, geometry, style, kind, children })
    }

    fn geometry(&self, raw: &RawNode, path: &str) -> Result<Geometry, ValidationError> {
        let d = self.defaults;
        let size = |v: Option<f32>, field: &'static str, default: f32| match v {
            Some(v) => non_negative(path, field, v),
            None if d.require_size => Err(missing(path, field)),
            None => Ok(default),
        };

        let opacity = raw.opacity.unwrap_or(d.opacity);
        if !(0.0..=1.0).contains(&opacity) {
            return Err(out_of_range(path, "opacity", opacity));
        }

        Ok(Geometry {
            x: finite(path, "x", raw.x.unwrap_or(0.0))?,
            y: finite(path, "y", raw.y.unwrap_or(0.0))?,
            width: size(raw.width, "width", d.width)?,
            height: size(raw.height, "height", d.height)?,
            rotation: finite(path, "rotation", raw.rotation.unwrap_or(d.rotation))?,
            opacity,
            visible: raw.visible.unwrap_or(d.visible),
        })
    }

    fn style_and_kind(
        &self,
        raw: RawNode,
        node_type: NodeType,
        path: &str,
    ) -> Result<(NodeStyle, NodeKind), ValidationError> {
        let background = match node_type {
            NodeType::Rect => raw.fill.or(raw.background_color),
            _ => raw.background_color.or(raw.fill),
        };
        let radius = match node_type {
            NodeType::Rect => raw.radius.or(raw.border_radius),
            _ => raw.border_radius.or(raw.radius),
        };

        let border = border(
            raw.border_color.or(raw.stroke),
            raw.border_width.or(raw.stroke_width),
            path,
        )?;

        let shadow = if raw.shadow_color.is_some()
            || raw.shadow_blur.is_some()
            || raw.shadow_offset_x.is_some()
            || raw.shadow_offset_y.is_some()
        {
            Some(Shadow {
                color: opt_color(raw.shadow_color, path)?.unwrap_or(Color::new(0.0, 0.0, 0.0, 0.5)),
                blur: non_negative(path, "shadowBlur", raw.shadow_blur.unwrap_or(0.0))?,
                offset_x: finite(path, "shadowOffsetX", raw.shadow_offset_x.unwrap_or(0.0))?,
                offset_y: finite(path, "shadowOffsetY", raw.shadow_offset_y.unwrap_or(0.0))?,
            })
        } else {
            None
        };

        let style = NodeStyle {
            background: opt_color(background, path)?,
            border_radius: non_negative(path, "borderRadius", radius.unwrap_or(0.0))?,
            border,
            shadow,
            gradient: raw.gradient.map(|g| gradient(g, path)).transpose()?,
        };

        let font = || -> Result<Font, ValidationError> {
            let size = raw.font_size.unwrap_or(self.defaults.font_size);
            if !(size > 0.0 && size.is_finite()) {
                return Err(out_of_range(path, "fontSize", size));
            }
            Ok(Font {
                family: raw
                    .font_family
                    .clone()
                    .unwrap_or_else(|| self.defaults.font_family.clone()),
                size,
                weight: weight(raw.font_weight.as_ref(), self.defaults.font_weight, path)?,
            })
        };

        let kind = match node_type {
            NodeType::Container => NodeKind::Container,
            NodeType::Rect => NodeKind::Rect,
            NodeType::Text => NodeKind::Text(TextStyle {
                font: font()?,
                text: raw.text.unwrap_or_default(),
                color: opt_color(raw.color, path)?.unwrap_or(Color::black()),
                align: align(raw.align.as_deref(), path)?,
            }),
            NodeType::Button => NodeKind::Button(ButtonStyle {
                font: font()?,
                label: raw.text.unwrap_or_default(),
                text_color: opt_color(raw.text_color.or(raw.color), path)?
                    .unwrap_or(Color::black()),
            }),
            NodeType::Image => NodeKind::Image(ImageStyle {
                src: raw.src.filter(|s| !s.is_empty()).ok_or_else(|| missing(path, "src"))?,
            }),
            NodeType::Input => NodeKind::Input(InputStyle {
                font: font()?,
                placeholder: raw.placeholder.unwrap_or_default(),
                value: raw.value.or(raw.text).unwrap_or_default(),
                text_color: opt_color(raw.text_color.or(raw.color), path)?
                    .unwrap_or(Color::black()),
                placeholder_color: opt_color(raw.placeholder_color, path)?
                    .unwrap_or(Color::rgb(0.6, 0.6, 0.6)),
            }),
        };

        Ok((style, kind))
    }
}

fn border(
    color: Option<RawColor>,
    width: Option<f32>,
    path: &str,
) -> Result<Option<Border>, ValidationError> {
    if color.is_none() && width.is_none() {
        return Ok(None);
    }
    let width = non_negative(path, "borderWidth", width.unwrap_or(1.0))?;
    if width == 0.0 {
        return Ok(None);
    }
    let color = opt_color(color, path)?.unwrap_or(Color::black());
    Ok(Some(Border { width, color }))
}

fn gradient(raw: RawGradient, path: &str) -> Result<Gradient, ValidationError> {
    let kind = match raw.kind.as_deref().unwrap_or("linear") {
        "linear" => GradientKind::Linear { angle: raw.angle.unwrap_or(180.0) },
        "radial" => GradientKind::Radial,
        other => {
            return Err(ValidationError::Malformed {
                path: path.to_owned(),
                message: format!("unknown gradient type `{other}`"),
            });
        }
    };
    let stops = raw
        .stops
        .into_iter()
        .map(|s| Ok(GradientStop { offset: s.offset, color: color(s.color, path)? }))
        .collect::<Result<Vec<_>, ValidationError>>()?;
    Ok(Gradient { kind, stops })
}

fn color(raw: RawColor, path: &str) -> Result<Color, ValidationError> {
    let c = match raw {
        RawColor::Hex(s) => Color::from_hex(&s).ok_or_else(|| ValidationError::InvalidColor {
            path: path.to_owned(),
            value: s.clone(),
        })?,
        RawColor::Rgba { r, g, b, a } => Color::new(r, g, b, a),
    };
    if !c.is_normalized() {
        return Err(ValidationError::InvalidColor {
            path: path.to_owned(),
            value: format!("{{r: {}, g: {}, b: {}, a: {}}}", c.r, c.g, c.b, c.a),
        });
    }
    Ok(c)
}

fn opt_color(raw: Option<RawColor>, path: &str) -> Result<Option<Color>, ValidationError> {
    raw.map(|c| color(c, path)).transpose()
}

fn weight(raw: Option<&RawWeight>, default: u16, path: &str) -> Result<u16, ValidationError> {
    let numeric = |w: f64| {
        if (1.0..=1000.0).contains(&w) {
            Ok(w.round() as u16)
        } else {
            Err(ValidationError::OutOfRange {
                path: path.to_owned(),
                field: "fontWeight",
                value: w,
            })
        }
    };
    match raw {
        None => Ok(default),
        Some(RawWeight::Numeric(w)) => numeric(*w),
        Some(RawWeight::Named(name)) => match name.trim() {
            "normal" | "regular" => Ok(400),
            "bold" => Ok(700),
            "light" | "lighter" => Ok(300),
            "bolder" => Ok(800),
            other => match other.parse::<f64>() {
                Ok(w) => numeric(w),
                Err(_) => Err(ValidationError::Malformed {
                    path: path.to_owned(),
                    message: format!("unknown font weight `{other}`"),
                }),
            },
        },
    }
}

fn align(raw: Option<&str>, path: &str) -> Result<TextAlign, ValidationError> {
    match raw {
        None | Some("left") | Some("start") => Ok(TextAlign::Left),
        Some("center") => Ok(TextAlign::Center),
        Some("right") | Some("end") => Ok(TextAlign::Right),
        Some(other) => Err(ValidationError::Malformed {
            path: path.to_owned(),
            message: format!("unknown text alignment `{other}`"),
        }),
    }
}

fn missing(path: &str, field: &'static str) -> ValidationError {
    ValidationError::MissingField { path: path.to_owned(), field }
}

fn out_of_range(path: &str, field: &'static str, value: f32) -> ValidationError {
    ValidationError::OutOfRange { path: path.to_owned(), field, value: value as f64 }
}

fn finite(path: &str, field: &'static str, v: f32) -> Result<f32, ValidationError> {
    if v.is_finite() { Ok(v) } else { Err(out_of_range(path, field, v)) }
}

fn non_negative(path: &str, field: &'static str, v: f32) -> Result<f32, ValidationError> {
    if v.is_finite() && v >= 0.0 { Ok(v) } else { Err(out_of_range(path, field, v)) }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn red_scene() -> Value {
        json!({
            "root": {
                "id": "r", "type": "container",
                "x": 0, "y": 0, "width": 100, "height": 100,
                "backgroundColor": { "r": 1, "g": 0, "b": 0, "a": 1 },
                "children": []
            },
            "width": 100,
            "height": 100
        })
    }

    fn err(v: Value) -> ValidationError {
        create_scene(&v).unwrap_err()
    }

    #[test]
    fn builds_minimal_scene() {
        let scene = create_scene(&red_scene()).unwrap();
        assert_eq!((scene.width, scene.height), (100, 100));
        assert_eq!(scene.root.id, "r");
        assert_eq!(scene.root.node_type(), NodeType::Container);
        assert_eq!(scene.root.style.background, Some(Color::rgb(1.0, 0.0, 0.0)));
        assert!(scene.root.children.is_empty());
    }

    #[test]
    fn missing_top_level_fields() {
        for field in ["root", "width", "height"] {
            let mut v = red_scene();
            v.as_object_mut().unwrap().remove(field);
            match err(v) {
                ValidationError::MissingField { field: f, .. } => assert_eq!(f, field),
                other => panic!("unexpected error {other:?}"),
            }
        }
    }

    #[test]
    fn viewport_must_be_positive_integer() {
        for bad in [json!(0), json!(-5), json!(10.5)] {
            let mut v = red_scene();
            v["width"] = bad;
            assert!(matches!(err(v), ValidationError::InvalidViewport { field: "width", .. }));
        }
        let mut v = red_scene();
        v["height"] = json!("tall");
        assert!(matches!(err(v), ValidationError::Malformed { .. }));
    }

    #[test]
    fn unknown_type_is_rejected_with_path() {
        let v = json!({
            "width": 10, "height": 10,
            "root": { "id": "a", "type": "container", "children": [
                { "id": "b", "type": "rect" },
                { "id": "c", "type": "video" }
            ]}
        });
        assert_eq!(
            err(v),
            ValidationError::UnknownNodeType {
                path: "root.children[1]".to_owned(),
                type_name: "video".to_owned(),
            }
        );
    }

    #[test]
    fn missing_id_and_type() {
        let v = json!({ "width": 10, "height": 10, "root": { "type": "container" } });
        assert!(matches!(err(v), ValidationError::MissingField { field: "id", .. }));

        let v = json!({ "width": 10, "height": 10, "root": { "id": "a" } });
        assert!(matches!(err(v), ValidationError::MissingField { field: "type", .. }));
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let v = json!({
            "width": 10, "height": 10,
            "root": { "id": "a", "type": "container", "children": [
                { "id": "a", "type": "rect" }
            ]}
        });
        assert!(matches!(err(v), ValidationError::DuplicateId { .. }));
    }

    #[test]
    fn omitted_geometry_uses_defaults() {
        let v = json!({ "width": 10, "height": 10, "root": { "id": "a", "type": "rect" } });
        let g = create_scene(&v).unwrap().root.geometry;
        assert_eq!((g.x, g.y, g.width, g.height), (0.0, 0.0, 100.0, 100.0));
        assert_eq!(g.rotation, 0.0);
        assert_eq!(g.opacity, 1.0);
        assert!(g.visible);
    }

    #[test]
    fn strict_defaults_require_size() {
        let v = json!({ "width": 10, "height": 10, "root": { "id": "a", "type": "rect", "width": 5 } });
        let e = create_scene_with(&v, &SceneDefaults::strict()).unwrap_err();
        assert!(matches!(e, ValidationError::MissingField { field: "height", .. }));
    }

    #[test]
    fn strict_defaults_require_a_container_root() {
        let v = json!({ "width": 10, "height": 10,
                        "root": { "id": "t", "type": "text", "width": 10, "height": 10, "text": "hi" } });
        assert!(create_scene(&v).is_ok());
        let e = create_scene_with(&v, &SceneDefaults::strict()).unwrap_err();
        assert_eq!(e, ValidationError::RootNotContainer { type_name: "text" });

        let v = json!({ "width": 10, "height": 10,
                        "root": { "id": "c", "type": "container", "width": 10, "height": 10 } });
        assert!(create_scene_with(&v, &SceneDefaults::strict()).is_ok());
    }

    #[test]
    fn preserves_node_count_and_child_order() {
        let v = json!({
            "width": 200, "height": 200,
            "root": { "id": "root", "type": "container", "children": [
                { "id": "a", "type": "rect", "children": [
                    { "id": "a1", "type": "text", "text": "hi" },
                    { "id": "a2", "type": "button", "text": "ok" }
                ]},
                { "id": "b", "type": "image", "src": "data:," },
                { "id": "c", "type": "input", "placeholder": "name" }
            ]}
        });
        let scene = create_scene(&v).unwrap();
        assert_eq!(scene.node_count(), 6);
        let ids: Vec<_> = scene.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, ["root", "a", "a1", "a2", "b", "c"]);
    }

    #[test]
    fn opacity_out_of_range() {
        let v = json!({ "width": 10, "height": 10, "root": { "id": "a", "type": "rect", "opacity": 1.5 } });
        assert!(matches!(err(v), ValidationError::OutOfRange { field: "opacity", .. }));
    }

    #[test]
    fn negative_size_is_rejected() {
        let v = json!({ "width": 10, "height": 10, "root": { "id": "a", "type": "rect", "width": -1 } });
        assert!(matches!(err(v), ValidationError::OutOfRange { field: "width", .. }));
    }

    #[test]
    fn colors_accept_hex_and_reject_out_of_range() {
        let v = json!({ "width": 10, "height": 10, "root": { "id": "a", "type": "rect", "fill": "#00ff00" } });
        let scene = create_scene(&v).unwrap();
        assert_eq!(scene.root.style.background, Some(Color::rgb(0.0, 1.0, 0.0)));

        let v = json!({ "width": 10, "height": 10, "root": { "id": "a", "type": "rect", "fill": { "r": 2, "g": 0, "b": 0 } } });
        assert!(matches!(err(v), ValidationError::InvalidColor { .. }));
    }

    #[test]
    fn rect_fill_stroke_radius_map_to_style() {
        let v = json!({
            "width": 10, "height": 10,
            "root": { "id": "a", "type": "rect", "fill": "#ff0000", "stroke": "#0000ff", "strokeWidth": 2, "radius": 4 }
        });
        let style = create_scene(&v).unwrap().root.style;
        assert_eq!(style.background, Some(Color::rgb(1.0, 0.0, 0.0)));
        assert_eq!(style.border_radius, 4.0);
        assert_eq!(style.border, Some(Border { width: 2.0, color: Color::rgb(0.0, 0.0, 1.0) }));
    }

    #[test]
    fn text_fields_parse() {
        let v = json!({
            "width": 10, "height": 10,
            "root": { "id": "t", "type": "text", "content": "Hello", "fontWeight": "bold",
                      "fontSize": 20, "align": "center", "color": "#333" }
        });
        let NodeKind::Text(text) = create_scene(&v).unwrap().root.kind else {
            panic!("expected text node");
        };
        assert_eq!(text.text, "Hello");
        assert_eq!(text.font.weight, 700);
        assert_eq!(text.font.size, 20.0);
        assert_eq!(text.font.family, "sans-serif");
        assert_eq!(text.align, TextAlign::Center);
    }

    #[test]
    fn image_requires_src() {
        let v = json!({ "width": 10, "height": 10, "root": { "id": "i", "type": "image" } });
        assert!(matches!(err(v), ValidationError::MissingField { field: "src", .. }));
    }

    #[test]
    fn shadow_and_gradient_are_carried() {
        let v = json!({
            "width": 10, "height": 10,
            "root": { "id": "a", "type": "container",
                      "shadowColor": "#00000080", "shadowBlur": 4, "shadowOffsetY": 2,
                      "gradient": { "type": "radial", "stops": [
                          { "offset": 0, "color": "#fff" }, { "offset": 1, "color": "#000" }
                      ]}}
        });
        let style = create_scene(&v).unwrap().root.style;
        let shadow = style.shadow.unwrap();
        assert_eq!((shadow.blur, shadow.offset_x, shadow.offset_y), (4.0, 0.0, 2.0));
        let gradient = style.gradient.unwrap();
        assert_eq!(gradient.kind, GradientKind::Radial);
        assert_eq!(gradient.stops.len(), 2);
    }

    #[test]
    fn parse_scene_reports_syntax_errors() {
        assert!(matches!(parse_scene("{ nope"), Err(ValidationError::Malformed { .. })));
        assert!(parse_scene(&red_scene().to_string()).is_ok());
    }
}
