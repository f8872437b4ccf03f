use std::fmt;

use crate::Color;

/// A validated scene: a root container plus the viewport it is authored for.
///
/// The tree is exclusively owned: every node is owned by its parent and the
/// root by the graph. Children are stored in paint order (back-to-front).
#[derive(Debug, Clone, PartialEq)]
pub struct SceneGraph {
    pub root: SceneNode,
    /// Viewport width in pixels (always > 0).
    pub width: u32,
    /// Viewport height in pixels (always > 0).
    pub height: u32,
}

impl SceneGraph {
    /// Iterates every node in depth-first pre-order (the paint order).
    pub fn iter(&self) -> Nodes<'_> {
        Nodes { stack: vec![&self.root] }
    }

    /// Total number of nodes reachable from the root, including the root.
    pub fn node_count(&self) -> usize {
        self.iter().count()
    }

    pub fn find(&self, id: &str) -> Option<&SceneNode> {
        self.iter().find(|n| n.id == id)
    }
}

/// Depth-first pre-order iterator over a scene tree.
pub struct Nodes<'a> {
    stack: Vec<&'a SceneNode>,
}

impl<'a> Iterator for Nodes<'a> {
    type Item = &'a SceneNode;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.stack.pop()?;
        self.stack.extend(node.children.iter().rev());
        Some(node)
    }
}

/// Resolved geometry of a node, in scene pixels.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Geometry {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    /// Clockwise rotation in degrees around the node's center.
    pub rotation: f32,
    /// In `[0, 1]`.
    pub opacity: f32,
    pub visible: bool,
}

impl Geometry {
    #[inline]
    pub fn rotation_radians(&self) -> f32 {
        self.rotation.to_radians()
    }
}

/// Stroke drawn inside the node's edge.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Border {
    pub width: f32,
    pub color: Color,
}

/// Blurred, offset copy of the node's silhouette painted beneath it.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Shadow {
    pub color: Color,
    pub blur: f32,
    pub offset_x: f32,
    pub offset_y: f32,
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub enum GradientKind {
    /// Angle in degrees, CSS convention (0 = bottom-to-top).
    Linear { angle: f32 },
    Radial,
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct GradientStop {
    pub offset: f32,
    pub color: Color,
}

/// Gradient fill description.
///
/// Carried on the node so documents round-trip, but not consumed by the
/// renderer yet: nodes with a gradient fall back to their solid background.
#[derive(Debug, Clone, PartialEq)]
pub struct Gradient {
    pub kind: GradientKind,
    pub stops: Vec<GradientStop>,
}

/// Box decoration shared by every node type.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeStyle {
    /// Background / fill. `None` paints nothing.
    pub background: Option<Color>,
    pub border_radius: f32,
    pub border: Option<Border>,
    pub shadow: Option<Shadow>,
    pub gradient: Option<Gradient>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Font {
    pub family: String,
    /// Size in scene pixels.
    pub size: f32,
    /// CSS numeric weight (100..=900).
    pub weight: u16,
}

#[derive(Debug, Copy, Clone, Default, Eq, PartialEq, Hash)]
pub enum TextAlign {
    #[default]
    Left,
    Center,
    Right,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TextStyle {
    pub text: String,
    pub font: Font,
    pub color: Color,
    pub align: TextAlign,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ButtonStyle {
    pub label: String,
    pub font: Font,
    pub text_color: Color,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImageStyle {
    /// Image URL (`data:` URL, file path or anything the host's image source resolves).
    pub src: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InputStyle {
    pub placeholder: String,
    pub value: String,
    pub font: Font,
    pub text_color: Color,
    pub placeholder_color: Color,
}

/// Type-specific payload. Renderers dispatch on this enum.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Container,
    /// Fill, stroke and radius live in [`NodeStyle`].
    Rect,
    Text(TextStyle),
    Button(ButtonStyle),
    Image(ImageStyle),
    Input(InputStyle),
}

impl NodeKind {
    pub fn node_type(&self) -> NodeType {
        match self {
            NodeKind::Container => NodeType::Container,
            NodeKind::Rect => NodeType::Rect,
            NodeKind::Text(_) => NodeType::Text,
            NodeKind::Button(_) => NodeType::Button,
            NodeKind::Image(_) => NodeType::Image,
            NodeKind::Input(_) => NodeType::Input,
        }
    }
}

/// The `type` tag of a node.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum NodeType {
    Container,
    Rect,
    Text,
    Button,
    Image,
    Input,
}

impl NodeType {
    pub const ALL: [NodeType; 6] = [
        NodeType::Container,
        NodeType::Rect,
        NodeType::Text,
        NodeType::Button,
        NodeType::Image,
        NodeType::Input,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            NodeType::Container => "container",
            NodeType::Rect => "rect",
            NodeType::Text => "text",
            NodeType::Button => "button",
            NodeType::Image => "image",
            NodeType::Input => "input",
        }
    }

    pub fn parse(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == tag)
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SceneNode {
    pub id: String,
    pub geometry: Geometry,
    pub style: NodeStyle,
    pub kind: NodeKind,
    /// Paint order: first child is painted first (furthest back).
    pub children: Vec<SceneNode>,
}

impl SceneNode {
    #[inline]
    pub fn node_type(&self) -> NodeType {
        self.kind.node_type()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: &str, children: Vec<SceneNode>) -> SceneNode {
        SceneNode {
            id: id.to_owned(),
            geometry: Geometry {
                x: 0.0,
                y: 0.0,
                width: 10.0,
                height: 10.0,
                rotation: 0.0,
                opacity: 1.0,
                visible: true,
            },
            style: NodeStyle::default(),
            kind: NodeKind::Container,
            children,
        }
    }

    #[test]
    fn iter_is_preorder() {
        let graph = SceneGraph {
            root: node("a", vec![node("b", vec![node("c", vec![])]), node("d", vec![])]),
            width: 10,
            height: 10,
        };
        let ids: Vec<_> = graph.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, ["a", "b", "c", "d"]);
        assert_eq!(graph.node_count(), 4);
        assert!(graph.find("c").is_some());
        assert!(graph.find("z").is_none());
    }

    #[test]
    fn node_type_tags_round_trip() {
        for t in NodeType::ALL {
            assert_eq!(NodeType::parse(t.as_str()), Some(t));
        }
        assert_eq!(NodeType::parse("Container"), None);
    }
}
