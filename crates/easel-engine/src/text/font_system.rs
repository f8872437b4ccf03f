use std::collections::HashMap;
use std::path::Path;

use easel_scene::TextAlign;
use fontdue::layout::{
    CoordinateSystem, HorizontalAlign, Layout, LayoutSettings, TextStyle, VerticalAlign,
};
use image::RgbaImage;

use crate::error::ResourceError;

/// A label to rasterize into its own texture.
///
/// Text is laid out in the `layout` box but only the `width` x `height`
/// window starting at `origin` is rasterized, so a label much larger than
/// the surface costs no more than its visible part. All sizes are in
/// physical pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextRequest<'a> {
    pub text: &'a str,
    /// CSS-style family list, e.g. `"Inter, sans-serif"`.
    pub family: &'a str,
    pub size: f32,
    pub weight: u16,
    /// Straight alpha.
    pub color: [f32; 4],
    pub layout: [f32; 2],
    pub origin: [u32; 2],
    pub width: u32,
    pub height: u32,
    pub align: TextAlign,
}

struct LoadedFont {
    weight: u16,
    font: fontdue::Font,
}

/// Fonts registered by family name and weight.
///
/// Lookup walks the requested family list, picks the closest registered
/// weight in the first family that exists and otherwise falls back to the
/// first family that was loaded.
#[derive(Default)]
pub struct FontSystem {
    families: HashMap<String, Vec<LoadedFont>>,
    fallback: Option<String>,
}

fn family_key(name: &str) -> String {
    name.trim().trim_matches(|c| c == '"' || c == '\'').to_ascii_lowercase()
}

impl FontSystem {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses and registers a TrueType or OpenType font.
    pub fn load_font(&mut self, family: &str, weight: u16, bytes: &[u8]) -> Result<(), ResourceError> {
        let font = fontdue::Font::from_bytes(bytes, fontdue::FontSettings::default()).map_err(|e| {
            ResourceError::InvalidFont {
                family: family.to_owned(),
                reason: e.to_string(),
            }
        })?;

        let key = family_key(family);
        let faces = self.families.entry(key.clone()).or_default();
        faces.retain(|f| f.weight != weight);
        faces.push(LoadedFont { weight, font });
        self.fallback.get_or_insert(key);

        log::debug!("fonts: registered `{family}` weight {weight}");
        Ok(())
    }

    pub fn load_font_file(
        &mut self,
        family: &str,
        weight: u16,
        path: impl AsRef<Path>,
    ) -> Result<(), ResourceError> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|e| ResourceError::InvalidFont {
            family: family.to_owned(),
            reason: format!("{}: {e}", path.display()),
        })?;
        self.load_font(family, weight, &bytes)
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.families.is_empty()
    }

    #[cfg(test)]
    pub fn has_family(&self, family: &str) -> bool {
        self.families.contains_key(&family_key(family))
    }

    fn resolve(&self, family: &str, weight: u16) -> Option<&fontdue::Font> {
        let faces = family
            .split(',')
            .map(family_key)
            .find_map(|k| self.families.get(&k))
            .or_else(|| self.fallback.as_ref().and_then(|k| self.families.get(k)))?;

        faces
            .iter()
            .min_by_key(|f| f.weight.abs_diff(weight))
            .map(|f| &f.font)
    }

    /// Lays out and rasterizes a label into premultiplied RGBA8.
    ///
    /// Text wraps at the layout width, is vertically centered and aligned per
    /// `request.align`. Glyphs falling outside the window are clipped.
    pub fn rasterize(&self, request: &TextRequest<'_>) -> Result<RgbaImage, ResourceError> {
        let font = self
            .resolve(request.family, request.weight)
            .ok_or_else(|| ResourceError::FontUnavailable {
                family: request.family.to_owned(),
            })?;

        let (w, h) = (request.width.max(1), request.height.max(1));
        let [ox, oy] = request.origin.map(i64::from);
        let mut layout: Layout<()> = Layout::new(CoordinateSystem::PositiveYDown);
        layout.reset(&LayoutSettings {
            max_width: Some(request.layout[0].max(1.0)),
            max_height: Some(request.layout[1].max(1.0)),
            horizontal_align: match request.align {
                TextAlign::Left => HorizontalAlign::Left,
                TextAlign::Center => HorizontalAlign::Center,
                TextAlign::Right => HorizontalAlign::Right,
            },
            vertical_align: VerticalAlign::Middle,
            ..LayoutSettings::default()
        });
        layout.append(&[font], &TextStyle::new(request.text, request.size.max(1.0), 0));

        let [r, g, b, a] = request.color.map(|c| c.clamp(0.0, 1.0));
        let mut image = RgbaImage::new(w, h);

        for glyph in layout.glyphs() {
            if !glyph.char_data.rasterize() || glyph.width == 0 || glyph.height == 0 {
                continue;
            }
            let (metrics, bitmap) = font.rasterize_config(glyph.key);
            let (gx, gy) = (glyph.x.round() as i64 - ox, glyph.y.round() as i64 - oy);

            for row in 0..metrics.height {
                let py = gy + row as i64;
                if py < 0 || py >= i64::from(h) {
                    continue;
                }
                for col in 0..metrics.width {
                    let px = gx + col as i64;
                    if px < 0 || px >= i64::from(w) {
                        continue;
                    }
                    let coverage = f32::from(bitmap[row * metrics.width + col]) / 255.0;
                    if coverage <= 0.0 {
                        continue;
                    }
                    let sa = a * coverage;
                    let src = [r * sa, g * sa, b * sa, sa];
                    let dst = image.get_pixel_mut(px as u32, py as u32);
                    for c in 0..4 {
                        let d = f32::from(dst[c]) / 255.0;
                        dst[c] = ((src[c] + d * (1.0 - sa)) * 255.0).round().clamp(0.0, 255.0) as u8;
                    }
                }
            }
        }

        Ok(image)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(text: &str) -> TextRequest<'_> {
        TextRequest {
            text,
            family: "Inter, sans-serif",
            size: 16.0,
            weight: 400,
            color: [0.0, 0.0, 0.0, 1.0],
            layout: [40.0, 20.0],
            origin: [0, 0],
            width: 40,
            height: 20,
            align: TextAlign::Left,
        }
    }

    #[test]
    fn empty_system_reports_unavailable_font() {
        let fonts = FontSystem::new();
        assert!(fonts.is_empty());
        let err = fonts.rasterize(&request("hi")).unwrap_err();
        assert_eq!(
            err,
            ResourceError::FontUnavailable {
                family: "Inter, sans-serif".into()
            }
        );
    }

    #[test]
    fn invalid_font_bytes_are_rejected() {
        let mut fonts = FontSystem::new();
        let err = fonts.load_font("Bad", 400, b"not a font").unwrap_err();
        assert!(matches!(err, ResourceError::InvalidFont { .. }));
        assert!(!fonts.has_family("bad"));
    }

    #[test]
    fn family_keys_ignore_case_and_quotes() {
        assert_eq!(family_key(" \"Inter\" "), "inter");
        assert_eq!(family_key("'Open Sans'"), "open sans");
    }
}
