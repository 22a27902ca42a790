//! Frame decoding for images submitted by clients.
//!
//! Browsers post frames as `data:image/jpeg;base64,...` URLs, other callers
//! send raw JPEG/PNG bytes or bare base64 text. All three are accepted.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use image::imageops::FilterType;
use image::RgbImage;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("frame is empty")]
    Empty,
    #[error("malformed data URL")]
    InvalidDataUrl,
    #[error("invalid base64 payload: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("image decode failed: {0}")]
    Image(#[from] image::ImageError),
}

fn payload(bytes: &[u8]) -> Result<Vec<u8>, DecodeError> {
    if image::guess_format(bytes).is_ok() {
        return Ok(bytes.to_vec());
    }
    let text = std::str::from_utf8(bytes).map_err(|_| DecodeError::InvalidDataUrl)?.trim();
    let encoded = if let Some(rest) = text.strip_prefix("data:") {
        let (meta, data) = rest.split_once(',').ok_or(DecodeError::InvalidDataUrl)?;
        if !meta.ends_with(";base64") {
            return Err(DecodeError::InvalidDataUrl);
        }
        data
    } else {
        text
    };
    Ok(STANDARD.decode(encoded.trim())?)
}

/// Decode a submitted frame to RGB. When `width` and `height` are non-zero
/// the image is resized to exactly that size.
pub fn decode_frame(bytes: &[u8], width: u32, height: u32) -> Result<RgbImage, DecodeError> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Err(DecodeError::Empty);
    }
    let raw = payload(bytes)?;
    let image = image::load_from_memory(&raw)?.to_rgb8();
    if width == 0 || height == 0 || (image.width() == width && image.height() == height) {
        return Ok(image);
    }
    Ok(image::imageops::resize(&image, width, height, FilterType::Triangle))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn png_bytes(w: u32, h: u32) -> Vec<u8> {
        let img = RgbImage::from_fn(w, h, |x, y| image::Rgb([(x * 10) as u8, (y * 10) as u8, 128]));
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, image::ImageFormat::Png).unwrap();
        out.into_inner()
    }

    #[test]
    fn test_raw_png() {
        let img = decode_frame(&png_bytes(8, 6), 0, 0).unwrap();
        assert_eq!(img.dimensions(), (8, 6));
        assert_eq!(img.get_pixel(1, 2).0, [10, 20, 128]);
    }

    #[test]
    fn test_data_url_and_resize() {
        let url = format!("data:image/png;base64,{}", STANDARD.encode(png_bytes(8, 6)));
        let img = decode_frame(url.as_bytes(), 640, 480).unwrap();
        assert_eq!(img.dimensions(), (640, 480));
    }

    #[test]
    fn test_bare_base64() {
        let text = STANDARD.encode(png_bytes(4, 4));
        let img = decode_frame(text.as_bytes(), 0, 0).unwrap();
        assert_eq!(img.dimensions(), (4, 4));
    }

    #[test]
    fn test_rejects_garbage() {
        assert!(matches!(decode_frame(b"", 0, 0), Err(DecodeError::Empty)));
        assert!(matches!(
            decode_frame(b"data:image/png,abc", 0, 0),
            Err(DecodeError::InvalidDataUrl)
        ));
        assert!(matches!(decode_frame(b"not base64 !!", 0, 0), Err(DecodeError::Base64(_))));
        let corrupt = STANDARD.encode(b"definitely not an image");
        assert!(matches!(decode_frame(corrupt.as_bytes(), 0, 0), Err(DecodeError::Image(_))));
    }
}
