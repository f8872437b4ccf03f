//! Frame capture: PNG data URIs, regions, binary blobs, high-resolution
//! re-renders and post-processing effects.
//!
//! Everything here works against [`CaptureSurface`], implemented by
//! [`RenderContext`] for any backend and by [`RgbaImage`] for already
//! captured frames.

mod effects;
mod encode;

use std::ops::{Deref, DerefMut};

use image::RgbaImage;

use crate::coords::PixelRect;
use crate::error::{CaptureError, EncodingError, ResourceError};
use crate::gpu::Backend;
use crate::render::RenderContext;

pub use effects::{apply_effect, ImageEffect, UnknownEffect};
pub use encode::{encode_png, png_data_uri, PNG_MIME};

/// A drawing surface whose last frame can be read back.
pub trait CaptureSurface {
    /// Size in physical pixels.
    fn surface_size(&self) -> (u32, u32);

    /// Resizes the backing store. Contents are undefined until redrawn.
    fn resize_surface(&mut self, width: u32, height: u32) -> Result<(), ResourceError>;

    /// Straight-alpha RGBA8 copy of the current contents.
    fn read_surface(&mut self) -> Result<RgbaImage, ResourceError>;

    fn device_pixel_ratio(&self) -> f32 {
        1.0
    }
}

impl<B: Backend> CaptureSurface for RenderContext<B> {
    fn surface_size(&self) -> (u32, u32) {
        self.size()
    }

    fn resize_surface(&mut self, width: u32, height: u32) -> Result<(), ResourceError> {
        self.resize(width, height)
    }

    fn read_surface(&mut self) -> Result<RgbaImage, ResourceError> {
        self.read_pixels()
    }

    fn device_pixel_ratio(&self) -> f32 {
        self.config().device_pixel_ratio
    }
}

impl CaptureSurface for RgbaImage {
    fn surface_size(&self) -> (u32, u32) {
        self.dimensions()
    }

    fn resize_surface(&mut self, width: u32, height: u32) -> Result<(), ResourceError> {
        if self.dimensions() != (width, height) {
            *self = RgbaImage::new(width, height);
        }
        Ok(())
    }

    fn read_surface(&mut self) -> Result<RgbaImage, ResourceError> {
        Ok(self.clone())
    }
}

/// Encoded image bytes plus their MIME type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Blob {
    pub mime: &'static str,
    pub bytes: Vec<u8>,
}

/// Encodes the surface's current contents as a PNG data URI.
pub fn convert_scene_to_image<S: CaptureSurface + ?Sized>(surface: &mut S) -> Result<String, EncodingError> {
    let image = surface.read_surface()?;
    encode::image_to_data_uri(&image)
}

/// Copies a `width` x `height` region starting at `(x, y)`.
///
/// The result always has the requested size. Parts of the region outside
/// the surface are transparent black.
pub fn capture_region_image<S: CaptureSurface + ?Sized>(
    surface: &mut S,
    x: i64,
    y: i64,
    width: u32,
    height: u32,
) -> Result<RgbaImage, EncodingError> {
    if width == 0 || height == 0 {
        return Err(EncodingError::EmptyImage { width, height });
    }
    let source = surface.read_surface()?;
    let mut out = RgbaImage::new(width, height);

    let requested = PixelRect::new(x, y, width, height);
    let available = PixelRect::of_size(source.width(), source.height());
    let Some(overlap) = requested.intersect(available) else {
        return Ok(out);
    };

    for sy in overlap.y..overlap.bottom() {
        for sx in overlap.x..overlap.right() {
            let px = *source.get_pixel(sx as u32, sy as u32);
            out.put_pixel((sx - x) as u32, (sy - y) as u32, px);
        }
    }
    Ok(out)
}

/// PNG data URI of a region; see [`capture_region_image`].
pub fn capture_region<S: CaptureSurface + ?Sized>(
    surface: &mut S,
    x: i64,
    y: i64,
    width: u32,
    height: u32,
) -> Result<String, EncodingError> {
    let region = capture_region_image(surface, x, y, width, height)?;
    encode::image_to_data_uri(&region)
}

/// Encodes the surface's current contents as a PNG blob.
///
/// Pixels are read synchronously; the encode runs when the future is polled.
pub async fn canvas_to_blob<S: CaptureSurface + ?Sized>(surface: &mut S) -> Result<Blob, EncodingError> {
    let image = surface.read_surface()?;
    let bytes = futures::future::lazy(move |_| encode_png(&image)).await?;
    Ok(Blob {
        mime: PNG_MIME,
        bytes,
    })
}

/// Restores a surface's size when dropped, including during unwinding.
struct RestoreSize<'a, S: CaptureSurface + ?Sized> {
    surface: &'a mut S,
    width: u32,
    height: u32,
}

impl<'a, S: CaptureSurface + ?Sized> RestoreSize<'a, S> {
    fn new(surface: &'a mut S) -> Self {
        let (width, height) = surface.surface_size();
        Self {
            surface,
            width,
            height,
        }
    }
}

impl<S: CaptureSurface + ?Sized> Deref for RestoreSize<'_, S> {
    type Target = S;

    fn deref(&self) -> &S {
        &*self.surface
    }
}

impl<S: CaptureSurface + ?Sized> DerefMut for RestoreSize<'_, S> {
    fn deref_mut(&mut self) -> &mut S {
        &mut *self.surface
    }
}

impl<S: CaptureSurface + ?Sized> Drop for RestoreSize<'_, S> {
    fn drop(&mut self) {
        if self.surface.surface_size() != (self.width, self.height) {
            if let Err(e) = self.surface.resize_surface(self.width, self.height) {
                log::error!("capture: failed to restore {}x{} surface: {e}", self.width, self.height);
            }
        }
    }
}

/// Scale used by [`create_high_resolution_image`]: twice the device pixel ratio.
pub fn high_resolution_scale(device_pixel_ratio: f32) -> f32 {
    let dpr = if device_pixel_ratio.is_finite() && device_pixel_ratio > 0.0 {
        device_pixel_ratio
    } else {
        1.0
    };
    2.0 * dpr
}

/// Re-renders at `2 x device_pixel_ratio` resolution and encodes the result.
///
/// `rerender` is called with the surface and the size it should draw at,
/// first at the enlarged size and then, after the surface is restored, at
/// the original size so the visible frame is intact. The original size is
/// restored even if `rerender` fails or panics. A surface that cannot grow
/// to the enlarged size fails with [`CaptureError::Resize`] without calling
/// `rerender`.
pub fn create_high_resolution_image<S, F>(surface: &mut S, mut rerender: F) -> Result<String, CaptureError>
where
    S: CaptureSurface + ?Sized,
    F: FnMut(&mut S, u32, u32) -> anyhow::Result<()>,
{
    let (width, height) = surface.surface_size();
    let scale = high_resolution_scale(surface.device_pixel_ratio());
    let hi_width = ((width as f32 * scale).round() as u32).max(1);
    let hi_height = ((height as f32 * scale).round() as u32).max(1);
    log::debug!("capture: high-resolution {width}x{height} -> {hi_width}x{hi_height}");

    let encoded = {
        let mut guard = RestoreSize::new(surface);
        if let Err(source) = guard.resize_surface(hi_width, hi_height) {
            return Err(CaptureError::Resize {
                width: hi_width,
                height: hi_height,
                source,
            });
        }
        match rerender(&mut *guard, hi_width, hi_height) {
            Ok(()) => convert_scene_to_image(&mut *guard).map_err(CaptureError::from),
            Err(source) => Err(CaptureError::Rerender {
                width: hi_width,
                height: hi_height,
                source,
            }),
        }
    };

    let restored = rerender(surface, width, height);
    let data_uri = encoded?;
    restored.map_err(|source| CaptureError::Rerender { width, height, source })?;
    Ok(data_uri)
}

/// Applies `effect` to the surface's current contents and encodes the result.
pub fn apply_image_effect<S: CaptureSurface + ?Sized>(
    surface: &mut S,
    effect: ImageEffect,
) -> Result<String, EncodingError> {
    let image = surface.read_surface()?;
    encode::image_to_data_uri(&apply_effect(&image, effect))
}
