//! Image fetching and decoding.

use std::path::{Path, PathBuf};

use base64::{engine::general_purpose, Engine as _};
use futures::future::{self, LocalBoxFuture};
use image::RgbaImage;

use crate::error::ResourceError;

/// Resolves an image URL to encoded bytes.
///
/// The renderer calls this off the paint path: a node whose image is not yet
/// resident is painted as a placeholder and the fetch is driven later by
/// [`RenderContext::load_pending_textures`](super::RenderContext::load_pending_textures).
pub trait ImageSource {
    fn fetch<'a>(&'a self, url: &'a str) -> LocalBoxFuture<'a, Result<Vec<u8>, ResourceError>>;
}

/// Serves `data:` URLs, `file://` URLs and plain paths.
///
/// Relative paths resolve against `base_dir` when one is set. Network URLs
/// are rejected with [`ResourceError::UnsupportedUrl`].
#[derive(Debug, Clone, Default)]
pub struct LocalImageSource {
    base_dir: Option<PathBuf>,
}

impl LocalImageSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_base_dir(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: Some(base_dir.into()),
        }
    }

    fn read(&self, url: &str) -> Result<Vec<u8>, ResourceError> {
        if url.starts_with("data:") {
            return decode_data_url(url);
        }

        let path = match url.strip_prefix("file://") {
            Some(path) => PathBuf::from(path),
            None if url.contains("://") => {
                return Err(ResourceError::UnsupportedUrl { url: truncate_url(url) });
            }
            None => self.resolve(Path::new(url)),
        };

        std::fs::read(&path).map_err(|e| ResourceError::Fetch {
            url: truncate_url(url),
            reason: e.to_string(),
        })
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        match &self.base_dir {
            Some(base) if path.is_relative() => base.join(path),
            _ => path.to_path_buf(),
        }
    }
}

impl ImageSource for LocalImageSource {
    fn fetch<'a>(&'a self, url: &'a str) -> LocalBoxFuture<'a, Result<Vec<u8>, ResourceError>> {
        Box::pin(future::ready(self.read(url)))
    }
}

fn percent_decode(s: &str) -> Option<Vec<u8>> {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = s.get(i + 1..i + 3)?;
            out.push(u8::from_str_radix(hex, 16).ok()?);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    Some(out)
}

/// Decodes the payload of a `data:` URL (base64 or percent-encoded).
pub fn decode_data_url(url: &str) -> Result<Vec<u8>, ResourceError> {
    let fail = |reason: &str| ResourceError::Decode {
        url: truncate_url(url),
        reason: reason.to_owned(),
    };

    let rest = url
        .trim()
        .strip_prefix("data:")
        .ok_or_else(|| fail("not a data URL"))?;
    let (meta, data) = rest.split_once(',').ok_or_else(|| fail("missing comma"))?;

    let is_base64 = meta
        .split(';')
        .any(|t| t.trim().eq_ignore_ascii_case("base64"));

    if is_base64 {
        // Some producers emit URL-safe base64.
        general_purpose::STANDARD
            .decode(data.trim())
            .or_else(|_| general_purpose::URL_SAFE.decode(data.trim()))
            .map_err(|e| fail(&format!("invalid base64: {e}")))
    } else {
        percent_decode(data).ok_or_else(|| fail("invalid percent-encoding"))
    }
}

/// Decodes PNG/JPEG/GIF/WebP bytes into premultiplied RGBA8.
pub(crate) fn decode_premultiplied(bytes: &[u8], url: &str) -> Result<RgbaImage, ResourceError> {
    let mut image = image::load_from_memory(bytes)
        .map_err(|e| ResourceError::Decode {
            url: truncate_url(url),
            reason: e.to_string(),
        })?
        .to_rgba8();
    premultiply(&mut image);
    Ok(image)
}

pub(crate) fn premultiply(image: &mut RgbaImage) {
    for px in image.pixels_mut() {
        let a = u16::from(px[3]);
        for c in &mut px.0[..3] {
            *c = ((u16::from(*c) * a + 127) / 255) as u8;
        }
    }
}

/// Data URLs can be megabytes long; keep log lines readable.
pub(crate) fn truncate_url(url: &str) -> String {
    const MAX: usize = 64;
    match url.char_indices().nth(MAX) {
        Some((cut, _)) => format!("{}...", &url[..cut]),
        None => url.to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base64_data_url() {
        let bytes = decode_data_url("data:text/plain;base64,aGVsbG8=").unwrap();
        assert_eq!(bytes, b"hello");
    }

    #[test]
    fn percent_encoded_data_url() {
        let bytes = decode_data_url("data:text/plain,a%20b").unwrap();
        assert_eq!(bytes, b"a b");
        assert!(decode_data_url("data:text/plain,%zz").is_err());
        assert!(decode_data_url("data:text/plain,%2").is_err());
    }

    #[test]
    fn malformed_data_url() {
        assert!(decode_data_url("data:image/png;base64").is_err());
        assert!(decode_data_url("data:image/png;base64,!!!").is_err());
    }

    #[test]
    fn network_urls_are_unsupported() {
        let source = LocalImageSource::new();
        let err = pollster::block_on(source.fetch("https://example.com/a.png")).unwrap_err();
        assert!(matches!(err, ResourceError::UnsupportedUrl { .. }));

        let long = format!("https://example.com/{}", "a".repeat(4096));
        let err = pollster::block_on(source.fetch(&long)).unwrap_err();
        assert!(err.to_string().len() < 120, "{err}");
    }

    #[test]
    fn missing_file_is_a_fetch_error() {
        let source = LocalImageSource::with_base_dir("/nonexistent-easel-dir");
        let err = pollster::block_on(source.fetch("a.png")).unwrap_err();
        assert!(matches!(err, ResourceError::Fetch { .. }));
    }

    #[test]
    fn premultiply_scales_color() {
        let mut img = RgbaImage::from_raw(1, 1, vec![255, 128, 0, 128]).unwrap();
        premultiply(&mut img);
        assert_eq!(img.get_pixel(0, 0).0, [128, 64, 0, 128]);
    }

    #[test]
    fn long_urls_are_truncated() {
        let url = format!("data:image/png;base64,{}", "A".repeat(500));
        assert!(truncate_url(&url).len() < 80);
        assert_eq!(truncate_url("a.png"), "a.png");
    }

    #[test]
    fn undecodable_bytes_are_reported() {
        let err = decode_premultiplied(b"not an image", "x.png").unwrap_err();
        assert!(matches!(err, ResourceError::Decode { .. }));
    }
}
