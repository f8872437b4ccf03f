use base64::{engine::general_purpose, Engine as _};
use image::codecs::png::PngEncoder;
use image::{ExtendedColorType, ImageEncoder, RgbaImage};

use crate::error::EncodingError;

pub const PNG_MIME: &str = "image/png";

/// Encodes straight-alpha RGBA8 pixels as PNG.
pub fn encode_png(image: &RgbaImage) -> Result<Vec<u8>, EncodingError> {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return Err(EncodingError::EmptyImage { width, height });
    }

    let mut bytes = Vec::new();
    PngEncoder::new(&mut bytes).write_image(image.as_raw(), width, height, ExtendedColorType::Rgba8)?;
    if bytes.is_empty() {
        return Err(EncodingError::NoData);
    }
    Ok(bytes)
}

/// `data:image/png;base64,...` for already encoded PNG bytes.
pub fn png_data_uri(png: &[u8]) -> String {
    format!("data:{PNG_MIME};base64,{}", general_purpose::STANDARD.encode(png))
}

pub(crate) fn image_to_data_uri(image: &RgbaImage) -> Result<String, EncodingError> {
    Ok(png_data_uri(&encode_png(image)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn png_round_trips_through_data_uri() {
        let img = RgbaImage::from_pixel(3, 2, image::Rgba([10, 20, 30, 255]));
        let uri = image_to_data_uri(&img).unwrap();
        let payload = uri.strip_prefix("data:image/png;base64,").unwrap();
        let bytes = general_purpose::STANDARD.decode(payload).unwrap();
        let decoded = image::load_from_memory(&bytes).unwrap().to_rgba8();
        assert_eq!(decoded, img);
    }

    #[test]
    fn empty_image_is_an_error() {
        let err = encode_png(&RgbaImage::new(0, 5)).unwrap_err();
        assert!(matches!(err, EncodingError::EmptyImage { width: 0, height: 5 }));
    }
}
