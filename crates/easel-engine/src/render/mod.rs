//! Scene rendering.
//!
//! [`RenderContext`] owns a [`Backend`] together with everything that must
//! outlive a single frame: compiled programs, the shared quad geometry, the
//! texture cache, registered fonts and the image source. [`RenderContext::render`]
//! walks a [`SceneGraph`] and issues one or more draws per node.
//!
//! Rendering never blocks on I/O. An image that is not resident yet is
//! painted as a transparent placeholder and queued; the host drives the
//! queue with [`RenderContext::load_pending_textures`] and renders again, or
//! calls [`RenderContext::render_settled`] to do both.

mod geometry;
mod images;
mod texture_cache;
mod traversal;

use std::collections::hash_map::DefaultHasher;
use std::collections::{HashMap, HashSet};
use std::hash::{Hash, Hasher};

use easel_scene::SceneGraph;
use image::RgbaImage;

use crate::error::ResourceError;
use crate::gpu::{orthographic_matrix, Backend, Programs};
use crate::paint::Color;
use crate::text::{FontSystem, TextRequest};

pub use geometry::{create_rect_geometry, GeometryCache};
pub use images::{decode_data_url, ImageSource, LocalImageSource};
pub use texture_cache::{CacheStats, TextKey, TextureCache, TextureHandle, TextureKey};

use traversal::Painter;

/// How a node's `x`/`y` relate to its parent.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
pub enum TransformMode {
    /// Coordinates are already resolved to scene space.
    #[default]
    Absolute,
    /// Coordinates are relative to the parent's transform (including its rotation).
    Relative,
}

#[derive(Debug, Clone)]
pub struct RenderConfig {
    /// Surface clear color; the area no node covers.
    pub clear_color: Color,
    pub transform_mode: TransformMode,
    /// Resident texture bytes kept between frames.
    pub texture_budget_bytes: usize,
    /// Physical pixels per scene pixel on the host display.
    pub device_pixel_ratio: f32,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            clear_color: Color::WHITE,
            transform_mode: TransformMode::Absolute,
            texture_budget_bytes: 64 * 1024 * 1024,
            device_pixel_ratio: 1.0,
        }
    }
}

/// What happened during one [`RenderContext::render`] call.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
pub struct FrameReport {
    pub draw_calls: u32,
    pub nodes_painted: u32,
    /// Subtrees skipped because their root was invisible or fully transparent.
    pub subtrees_skipped: u32,
    /// Image nodes painted as placeholders while their texture loads.
    pub pending_textures: u32,
    /// Nodes painted as placeholders after a resource failure.
    pub resource_errors: u32,
}

impl FrameReport {
    /// Rendering again after loading pending textures would change the output.
    pub fn needs_rerender(&self) -> bool {
        self.pending_textures > 0
    }
}

#[derive(Debug, Clone, PartialEq)]
enum ImageState {
    Pending,
    Failed,
}

type ErrorHandler = Box<dyn FnMut(&ResourceError)>;

// Guards `render_settled` against a source that keeps succeeding without the
// frame ever settling.
const MAX_SETTLE_PASSES: usize = 8;

// Distinct warnings remembered for deduplication. Past this, new warnings
// are logged at debug level only.
const MAX_WARNED: usize = 1024;

pub struct RenderContext<B: Backend> {
    backend: B,
    config: RenderConfig,
    programs: Option<Programs>,
    geometry: GeometryCache,
    textures: TextureCache,
    fonts: FontSystem,
    images: Box<dyn ImageSource>,
    image_states: HashMap<String, ImageState>,
    error_handler: Option<ErrorHandler>,
    /// Hashes of warnings already logged.
    warned: HashSet<u64>,
}

impl<B: Backend> RenderContext<B> {
    pub fn new(backend: B) -> Self {
        Self::with_config(backend, RenderConfig::default())
    }

    pub fn with_config(backend: B, config: RenderConfig) -> Self {
        Self {
            backend,
            textures: TextureCache::new(config.texture_budget_bytes),
            config,
            programs: None,
            geometry: GeometryCache::new(),
            fonts: FontSystem::new(),
            images: Box::new(LocalImageSource::new()),
            image_states: HashMap::new(),
            error_handler: None,
            warned: HashSet::new(),
        }
    }

    pub fn with_image_source(mut self, source: impl ImageSource + 'static) -> Self {
        self.images = Box::new(source);
        self
    }

    /// Installs a callback invoked for every recoverable resource failure.
    pub fn on_resource_error(&mut self, handler: impl FnMut(&ResourceError) + 'static) {
        self.error_handler = Some(Box::new(handler));
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn config(&self) -> &RenderConfig {
        &self.config
    }

    pub fn fonts(&self) -> &FontSystem {
        &self.fonts
    }

    pub fn fonts_mut(&mut self) -> &mut FontSystem {
        &mut self.fonts
    }

    pub fn texture_stats(&self) -> CacheStats {
        self.textures.stats()
    }

    /// Surface size in physical pixels.
    pub fn size(&self) -> (u32, u32) {
        self.backend.size()
    }

    /// Resizes the surface; oversized requests fail and keep the current size.
    pub fn resize(&mut self, width: u32, height: u32) -> Result<(), ResourceError> {
        self.backend.resize(width, height)
    }

    /// URLs of images queued for loading.
    pub fn pending_images(&self) -> impl Iterator<Item = &str> {
        self.image_states
            .iter()
            .filter(|(_, s)| **s == ImageState::Pending)
            .map(|(url, _)| url.as_str())
    }

    /// Renders one frame of `scene` into the backend's surface.
    ///
    /// Scene pixels are mapped onto the whole surface, so a surface larger
    /// than the scene renders it at a higher resolution. Resource failures
    /// inside the tree are reported and painted as placeholders; only
    /// backend failures abort the frame.
    pub fn render(&mut self, scene: &SceneGraph) -> Result<FrameReport, ResourceError> {
        let programs = match self.programs {
            Some(programs) => programs,
            None => {
                let programs = Programs::compile(&mut self.backend)?;
                self.programs = Some(programs);
                programs
            }
        };
        let geometry = self.geometry.rect(&mut self.backend)?;

        let (width, height) = self.backend.size();
        let projection = orthographic_matrix(0.0, scene.width as f32, scene.height as f32, 0.0, -1.0, 1.0);
        let raster_scale = width as f32 / scene.width as f32;
        log::trace!(
            "render: scene {}x{} onto {width}x{height} ({})",
            scene.width,
            scene.height,
            self.backend.label()
        );

        self.textures.begin_frame();
        self.backend.begin_frame(self.config.clear_color);

        let mut painter = Painter::new(self, programs, geometry, projection, raster_scale);
        painter.paint(&scene.root);
        let report = painter.finish();

        self.backend.end_frame()?;

        for handle in self.textures.evict_to_budget() {
            self.backend.release_texture(handle.texture);
        }

        Ok(report)
    }

    /// Renders, loads whatever images the frame queued, and re-renders until
    /// no node is waiting on a texture.
    pub fn render_settled(&mut self, scene: &SceneGraph) -> Result<FrameReport, ResourceError> {
        let mut report = self.render(scene)?;
        for _ in 0..MAX_SETTLE_PASSES {
            if !report.needs_rerender() {
                break;
            }
            pollster::block_on(self.load_pending_textures());
            report = self.render(scene)?;
        }
        Ok(report)
    }

    /// Fetches, decodes and uploads the image at `url`.
    ///
    /// Resident textures are returned without touching the image source.
    /// A failure marks the URL as failed so traversal stops queueing it.
    pub async fn load_image_texture(&mut self, url: &str) -> Result<TextureHandle, ResourceError> {
        let key = TextureKey::Image(url.to_owned());
        if let Some(handle) = self.textures.get(&key) {
            return Ok(handle);
        }

        let result = self.fetch_and_upload(url, key).await;
        match &result {
            Ok(handle) => {
                self.image_states.remove(url);
                log::debug!(
                    "images: loaded `{}` ({}x{})",
                    images::truncate_url(url),
                    handle.width,
                    handle.height
                );
            }
            Err(_) => {
                self.image_states.insert(url.to_owned(), ImageState::Failed);
            }
        }
        result
    }

    async fn fetch_and_upload(&mut self, url: &str, key: TextureKey) -> Result<TextureHandle, ResourceError> {
        let bytes = self.images.fetch(url).await?;
        let image = images::decode_premultiplied(&bytes, url)?;
        let (width, height) = image.dimensions();
        let texture = self.backend.upload_texture(width, height, image.as_raw())?;
        let handle = TextureHandle {
            texture,
            width,
            height,
        };
        if let Some(old) = self.textures.insert(key, handle) {
            self.backend.release_texture(old.texture);
        }
        Ok(handle)
    }

    /// Loads every queued image. Failures go to the error handler.
    ///
    /// Returns the number of textures that became resident.
    pub async fn load_pending_textures(&mut self) -> usize {
        let pending: Vec<String> = self.pending_images().map(str::to_owned).collect();
        let mut loaded = 0;
        for url in pending {
            match self.load_image_texture(&url).await {
                Ok(_) => loaded += 1,
                Err(e) => self.report_error(e),
            }
        }
        loaded
    }

    /// Rasterizes a label into a cached texture.
    pub fn create_text_texture(&mut self, request: &TextRequest<'_>) -> Result<TextureHandle, ResourceError> {
        let key = TextureKey::Text(TextKey {
            text: request.text.to_owned(),
            family: request.family.to_owned(),
            size_bits: request.size.to_bits(),
            weight: request.weight,
            color_bits: request.color.map(f32::to_bits),
            layout_bits: request.layout.map(f32::to_bits),
            origin: request.origin,
            width: request.width,
            height: request.height,
            align: request.align,
        });
        if let Some(handle) = self.textures.get(&key) {
            return Ok(handle);
        }

        let image = self.fonts.rasterize(request)?;
        let (width, height) = image.dimensions();
        let texture = self.backend.upload_texture(width, height, image.as_raw())?;
        let handle = TextureHandle {
            texture,
            width,
            height,
        };
        if let Some(old) = self.textures.insert(key, handle) {
            self.backend.release_texture(old.texture);
        }
        Ok(handle)
    }

    /// Drops every cached texture.
    pub fn clear_textures(&mut self) {
        for handle in self.textures.clear() {
            self.backend.release_texture(handle.texture);
        }
        self.image_states.clear();
    }

    /// Straight-alpha copy of the last rendered frame.
    pub fn read_pixels(&mut self) -> Result<RgbaImage, ResourceError> {
        self.backend.read_pixels()
    }

    pub(crate) fn report_error(&mut self, err: ResourceError) {
        let message = err.to_string();
        if self.first_warning(&message) {
            log::warn!("{message}");
        } else {
            log::debug!("{message}");
        }
        if let Some(handler) = self.error_handler.as_mut() {
            handler(&err);
        }
    }

    /// Logs `message` the first time `key` is seen.
    pub(crate) fn warn_once(&mut self, key: &str, message: impl FnOnce() -> String) {
        if self.first_warning(key) {
            log::warn!("{}", message());
        }
    }

    fn first_warning(&mut self, key: &str) -> bool {
        if self.warned.len() >= MAX_WARNED {
            return false;
        }
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        self.warned.insert(hasher.finish())
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::rc::Rc;

    use super::*;
    use crate::gpu::SoftwareBackend;

    #[test]
    fn repeated_errors_are_remembered_once() {
        let mut ctx = RenderContext::new(SoftwareBackend::new(2, 2));
        let calls = Rc::new(Cell::new(0));
        let seen = Rc::clone(&calls);
        ctx.on_resource_error(move |_| seen.set(seen.get() + 1));

        for _ in 0..3 {
            ctx.report_error(ResourceError::UnsupportedUrl { url: "ftp://a".into() });
        }
        assert_eq!(ctx.warned.len(), 1);
        assert_eq!(calls.get(), 3);
    }

    #[test]
    fn warning_memory_is_bounded() {
        let mut ctx = RenderContext::new(SoftwareBackend::new(2, 2));
        let calls = Rc::new(Cell::new(0));
        let seen = Rc::clone(&calls);
        ctx.on_resource_error(move |_| seen.set(seen.get() + 1));

        for i in 0..MAX_WARNED + 500 {
            ctx.report_error(ResourceError::UnsupportedUrl {
                url: format!("ftp://host/{i}"),
            });
        }
        assert_eq!(ctx.warned.len(), MAX_WARNED);
        assert_eq!(calls.get(), MAX_WARNED + 500);
    }
}
