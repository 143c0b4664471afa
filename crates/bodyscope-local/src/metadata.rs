//! Header-only image metadata.
//!
//! Only the format header is decoded (dimensions + color type); the pixel buffer is never
//! allocated, so multi-megabyte images cost about as much as a small one.

use crate::classify::image_format_from_magic;
use bodyscope_core::ImageMetadata;
use image::{ColorType, ImageDecoder, ImageFormat, ImageReader};
use std::io::Cursor;

fn format_tag(format: ImageFormat) -> String {
    match format {
        ImageFormat::Png => "PNG".to_string(),
        ImageFormat::Jpeg => "JPEG".to_string(),
        ImageFormat::Gif => "GIF".to_string(),
        ImageFormat::WebP => "WEBP".to_string(),
        ImageFormat::Bmp => "BMP".to_string(),
        ImageFormat::Ico => "ICO".to_string(),
        other => format!("{other:?}").to_ascii_uppercase(),
    }
}

/// Formats that can carry an alpha channel. A heuristic: a PNG may still be fully opaque.
fn format_supports_alpha(tag: &str) -> bool {
    matches!(tag, "PNG" | "WEBP")
}

fn color_depth_label(color: ColorType) -> String {
    let channels = u16::from(color.channel_count()).max(1);
    let bits = color.bits_per_pixel() / channels;
    let layout = match (channels, color.has_alpha()) {
        (1, _) => "Gray",
        (2, _) => "GrayA",
        (3, _) => "RGB",
        (_, true) => "RGBA",
        _ => "RGB",
    };
    format!("{bits}-bit {layout}")
}

/// Read width/height/format without decoding pixels.
///
/// Returns `None` for anything the header decoder rejects; corrupt images are not an error.
pub fn extract_image_metadata(bytes: &[u8]) -> Option<ImageMetadata> {
    let reader = match ImageReader::new(Cursor::new(bytes)).with_guessed_format() {
        Ok(r) => r,
        Err(e) => {
            tracing::debug!(error = %e, "image format guess failed");
            return None;
        }
    };
    let tag = reader
        .format()
        .map(format_tag)
        .or_else(|| image_format_from_magic(bytes).map(str::to_string))?;
    let decoder = match reader.into_decoder() {
        Ok(d) => d,
        Err(e) => {
            tracing::debug!(format = %tag, error = %e, "image header decode failed");
            return None;
        }
    };
    let (width, height) = decoder.dimensions();
    if width == 0 || height == 0 {
        return None;
    }
    Some(ImageMetadata {
        width,
        height,
        has_alpha: format_supports_alpha(&tag),
        color_depth: color_depth_label(decoder.color_type()),
        format: tag,
        file_size: bytes.len() as u64,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, RgbImage, RgbaImage};

    fn encode(img: DynamicImage, format: ImageFormat) -> Vec<u8> {
        let mut buf = Cursor::new(Vec::new());
        img.write_to(&mut buf, format).unwrap();
        buf.into_inner()
    }

    #[test]
    fn png_dimensions_and_alpha_capability() {
        let bytes = encode(
            DynamicImage::ImageRgba8(RgbaImage::new(3, 2)),
            ImageFormat::Png,
        );
        let m = extract_image_metadata(&bytes).expect("png metadata");
        assert_eq!((m.width, m.height), (3, 2));
        assert_eq!(m.format, "PNG");
        assert!(m.has_alpha);
        assert_eq!(m.color_depth, "8-bit RGBA");
        assert_eq!(m.file_size, bytes.len() as u64);
    }

    #[test]
    fn jpeg_is_never_alpha_capable() {
        let bytes = encode(
            DynamicImage::ImageRgb8(RgbImage::new(4, 5)),
            ImageFormat::Jpeg,
        );
        let m = extract_image_metadata(&bytes).expect("jpeg metadata");
        assert_eq!((m.width, m.height), (4, 5));
        assert_eq!(m.format, "JPEG");
        assert!(!m.has_alpha);
    }

    #[test]
    fn bmp_and_gif_headers_are_read() {
        let bmp = encode(DynamicImage::ImageRgb8(RgbImage::new(7, 1)), ImageFormat::Bmp);
        let m = extract_image_metadata(&bmp).expect("bmp metadata");
        assert_eq!((m.width, m.height, m.format.as_str()), (7, 1, "BMP"));

        let gif = encode(
            DynamicImage::ImageRgba8(RgbaImage::new(2, 9)),
            ImageFormat::Gif,
        );
        let m = extract_image_metadata(&gif).expect("gif metadata");
        assert_eq!((m.width, m.height, m.format.as_str()), (2, 9, "GIF"));
        assert!(!m.has_alpha);
    }

    #[test]
    fn corrupt_or_non_image_bytes_yield_none() {
        assert!(extract_image_metadata(b"\x89PNG\r\n\x1a\nnot really a png").is_none());
        assert!(extract_image_metadata(b"hello").is_none());
        assert!(extract_image_metadata(b"").is_none());
    }
}
