//! Font registry and label rasterization (fontdue).

mod font_system;

pub use font_system::{FontSystem, TextRequest};
