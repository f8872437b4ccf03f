//! Draw-time color representation.

mod color;

pub use color::Color;
