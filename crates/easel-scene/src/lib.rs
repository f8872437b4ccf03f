//! Node model and JSON deserializer for **easel** scenes.
//!
//! A scene is a tree of typed UI elements (container, rect, text, button,
//! image, input) whose geometry is already resolved. This crate validates a
//! decoded JSON description and builds the owned tree; rendering lives in
//! `easel-engine`.
//!
//! # Structure
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`node`] | `SceneGraph`, `SceneNode`, `NodeKind`, per-type styles |
//! | [`color`] | `Color` (straight alpha, normalized) |
//! | [`defaults`] | `SceneDefaults` for omitted fields |
//! | [`error`] | `ValidationError` |
//!
//! # Quick start
//!
//! ```rust
//! use easel_scene::parse_scene;
//!
//! let scene = parse_scene(r#"{
//!     "width": 100, "height": 100,
//!     "root": { "id": "r", "type": "container", "width": 100, "height": 100,
//!               "backgroundColor": { "r": 1, "g": 0, "b": 0, "a": 1 } }
//! }"#).unwrap();
//! assert_eq!(scene.node_count(), 1);
//! ```

pub mod color;
pub mod defaults;
pub mod error;
pub mod node;

mod de;

pub use color::Color;
pub use de::{create_scene, create_scene_with, parse_scene};
pub use defaults::SceneDefaults;
pub use error::ValidationError;
pub use node::{
    Border, ButtonStyle, Font, Geometry, Gradient, GradientKind, GradientStop, ImageStyle,
    InputStyle, NodeKind, NodeStyle, NodeType, SceneGraph, SceneNode, Shadow, TextAlign,
    TextStyle,
};
