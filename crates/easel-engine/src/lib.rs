//! Easel engine crate.
//!
//! Renders [`easel_scene::SceneGraph`] trees through a small GPU primitive
//! layer and captures the result as PNG.
//!
//! - [`gpu`]: the [`gpu::Backend`] seam with a deterministic CPU backend and a
//!   headless wgpu backend
//! - [`render`]: [`render::RenderContext`], traversal, geometry and texture caches
//! - [`capture`]: data URIs, regions, blobs, high-resolution captures, effects

pub mod capture;
pub mod coords;
pub mod error;
pub mod gpu;
pub mod logging;
pub mod paint;
pub mod render;
pub mod text;

pub use error::{CaptureError, EncodingError, ResourceError};
pub use gpu::{Backend, SoftwareBackend, WgpuBackend};
pub use render::{FrameReport, RenderConfig, RenderContext, TransformMode};
