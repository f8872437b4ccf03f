/// Values used for node fields a scene document leaves out.
///
/// `create_scene` uses [`SceneDefaults::default`]. Hosts that prefer explicit
/// documents set `require_size` so a node without `width`/`height` is rejected
/// instead of silently becoming 100×100.
///
/// The default accepts any node type as the root, so a single `rect` or
/// `text` document renders on its own. `require_container_root` restores the
/// rule that a scene root is a container.
#[derive(Debug, Clone, PartialEq)]
pub struct SceneDefaults {
    pub width: f32,
    pub height: f32,
    /// Degrees.
    pub rotation: f32,
    pub opacity: f32,
    pub visible: bool,
    pub font_family: String,
    pub font_size: f32,
    pub font_weight: u16,
    /// Reject nodes that omit `width` or `height`.
    pub require_size: bool,
    /// Reject documents whose root is not a `container`.
    pub require_container_root: bool,
}

impl Default for SceneDefaults {
    fn default() -> Self {
        Self {
            width: 100.0,
            height: 100.0,
            rotation: 0.0,
            opacity: 1.0,
            visible: true,
            font_family: "sans-serif".to_owned(),
            font_size: 16.0,
            font_weight: 400,
            require_size: false,
            require_container_root: false,
        }
    }
}

impl SceneDefaults {
    /// Defaults with `require_size` and `require_container_root` enabled.
    pub fn strict() -> Self {
        Self {
            require_size: true,
            require_container_root: true,
            ..Self::default()
        }
    }
}
