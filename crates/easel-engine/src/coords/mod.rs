//! Integer pixel-space geometry used by capture and readback.

mod rect;

pub use rect::PixelRect;
