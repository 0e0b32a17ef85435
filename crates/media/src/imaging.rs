//! Pure image operations. Nothing in here touches storage or the network.

use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{ExtendedColorType, ImageEncoder, ImageReader};
use std::io::Cursor;

/// Width and height of an encoded image, read from its header.
///
/// A zero width or height is an error, never a dimension.
pub fn measure(bytes: &[u8], name: &str) -> Result<(u32, u32)> {
    let failed = || ErrorKind::UnableToGetImageSize(name.to_string());
    let (width, height) = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .or_raise(failed)?
        .into_dimensions()
        .or_raise(failed)?;
    if width == 0 || height == 0 {
        exn::bail!(failed());
    }
    Ok((width, height))
}

/// Target height for `target_width`, keeping the original's aspect ratio.
pub fn target_height(target_width: u32, width: u32, height: u32) -> u32 {
    let aspect_ratio = f64::from(width) / f64::from(height);
    (f64::from(target_width) / aspect_ratio).round().max(1.0) as u32
}

/// Decode, resize to exactly `width`×`height` and encode as JPEG.
///
/// CPU-bound: call from a blocking task.
pub fn resize_jpeg(bytes: &[u8], width: u32, height: u32, quality: u8, name: &str) -> Result<Vec<u8>> {
    let failed = || ErrorKind::UnableToResizeImage(name.to_string());
    let decoded = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .or_raise(failed)?
        .decode()
        .or_raise(failed)?;
    // JPEG has no alpha channel.
    let resized = decoded.resize_exact(width, height, FilterType::Lanczos3).to_rgb8();
    let mut encoded = Vec::new();
    JpegEncoder::new_with_quality(&mut encoded, quality)
        .write_image(resized.as_raw(), resized.width(), resized.height(), ExtendedColorType::Rgb8)
        .or_raise(failed)?;
    Ok(encoded)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use image::{DynamicImage, ImageFormat, RgbImage};
    use rstest::rstest;

    pub(crate) fn png(width: u32, height: u32) -> Vec<u8> {
        let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, image::Rgb([200, 80, 20])));
        let mut bytes = Cursor::new(Vec::new());
        image.write_to(&mut bytes, ImageFormat::Png).unwrap();
        bytes.into_inner()
    }

    #[rstest]
    #[case(800, 600)]
    #[case(600, 800)]
    #[case(500, 500)]
    fn test_measure(#[case] width: u32, #[case] height: u32) {
        assert_eq!(measure(&png(width, height), "test.png").unwrap(), (width, height));
    }

    #[test]
    fn test_measure_rejects_garbage() {
        let err = measure(b"definitely not an image", "test.png").unwrap_err();
        assert!(matches!(&*err, ErrorKind::UnableToGetImageSize(_)));
    }

    #[rstest]
    #[case(400, 800, 600, 300)]
    #[case(400, 600, 800, 533)]
    #[case(400, 500, 500, 400)]
    #[case(1000, 3000, 1, 1)]
    #[case(2000, 1000, 1500, 3000)]
    fn test_target_height(#[case] target: u32, #[case] width: u32, #[case] height: u32, #[case] expected: u32) {
        assert_eq!(target_height(target, width, height), expected);
    }

    #[test]
    fn test_resize_produces_jpeg_of_requested_size() {
        let resized = resize_jpeg(&png(800, 600), 400, 300, 80, "test.png").unwrap();
        assert_eq!(image::guess_format(&resized).unwrap(), ImageFormat::Jpeg);
        assert_eq!(measure(&resized, "resized.jpg").unwrap(), (400, 300));
    }

    #[test]
    fn test_resize_rejects_garbage() {
        let err = resize_jpeg(b"nope", 10, 10, 80, "test.png").unwrap_err();
        assert!(matches!(&*err, ErrorKind::UnableToResizeImage(_)));
    }
}
