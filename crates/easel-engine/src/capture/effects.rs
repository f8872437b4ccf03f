use std::fmt;
use std::str::FromStr;

use image::RgbaImage;

/// Post-processing filter applied to a captured frame.
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum ImageEffect {
    Grayscale,
    Sepia,
    Invert,
    /// Gaussian blur with the given standard deviation in pixels.
    Blur { sigma: f32 },
    /// Accepted but not implemented; the frame passes through unchanged.
    Sharpen,
}

impl ImageEffect {
    pub const DEFAULT_BLUR_SIGMA: f32 = 2.0;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownEffect(pub String);

impl fmt::Display for UnknownEffect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "unknown effect `{}` (expected grayscale, sepia, invert, blur[:sigma] or sharpen)",
            self.0
        )
    }
}

impl std::error::Error for UnknownEffect {}

impl FromStr for ImageEffect {
    type Err = UnknownEffect;

    /// Parses `grayscale`, `sepia`, `invert`, `sharpen`, `blur` or `blur:<sigma>`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let unknown = || UnknownEffect(s.to_owned());
        let lower = s.trim().to_ascii_lowercase();
        let (name, arg) = match lower.split_once(':') {
            Some((name, arg)) => (name, Some(arg)),
            None => (lower.as_str(), None),
        };
        match (name, arg) {
            ("grayscale" | "greyscale", None) => Ok(ImageEffect::Grayscale),
            ("sepia", None) => Ok(ImageEffect::Sepia),
            ("invert", None) => Ok(ImageEffect::Invert),
            ("sharpen", None) => Ok(ImageEffect::Sharpen),
            ("blur", None) => Ok(ImageEffect::Blur {
                sigma: ImageEffect::DEFAULT_BLUR_SIGMA,
            }),
            ("blur", Some(arg)) => match arg.parse::<f32>() {
                Ok(sigma) if sigma.is_finite() && sigma > 0.0 => Ok(ImageEffect::Blur { sigma }),
                _ => Err(unknown()),
            },
            _ => Err(unknown()),
        }
    }
}

fn luma(r: f32, g: f32, b: f32) -> f32 {
    0.299 * r + 0.587 * g + 0.114 * b
}

fn to_u8(v: f32) -> u8 {
    v.round().clamp(0.0, 255.0) as u8
}

/// Applies `effect`, leaving alpha untouched for the per-pixel filters.
pub fn apply_effect(image: &RgbaImage, effect: ImageEffect) -> RgbaImage {
    match effect {
        ImageEffect::Grayscale => map_rgb(image, |r, g, b| {
            let y = luma(r, g, b);
            [y, y, y]
        }),
        ImageEffect::Sepia => map_rgb(image, |r, g, b| {
            [
                0.393 * r + 0.769 * g + 0.189 * b,
                0.349 * r + 0.686 * g + 0.168 * b,
                0.272 * r + 0.534 * g + 0.131 * b,
            ]
        }),
        ImageEffect::Invert => map_rgb(image, |r, g, b| [255.0 - r, 255.0 - g, 255.0 - b]),
        ImageEffect::Blur { sigma } => image::imageops::blur(image, sigma),
        ImageEffect::Sharpen => {
            log::warn!("sharpen effect is not implemented; returning the frame unchanged");
            image.clone()
        }
    }
}

fn map_rgb(image: &RgbaImage, f: impl Fn(f32, f32, f32) -> [f32; 3]) -> RgbaImage {
    let mut out = image.clone();
    for px in out.pixels_mut() {
        let [r, g, b] = f(f32::from(px[0]), f32::from(px[1]), f32::from(px[2]));
        px[0] = to_u8(r);
        px[1] = to_u8(g);
        px[2] = to_u8(b);
    }
    out
}
