//! Image encoding: arbitrary raster bytes → baseline JPEG for PDF embedding.
//!
//! PDF readers decode `DCTDecode` streams natively, so every photo and chart
//! is normalised to an RGB JPEG before it is written as an image XObject.
//! Transparent pixels are flattened onto white, and very large photos are
//! downscaled so one phone picture does not dominate the output size.

use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, Rgb, RgbImage};
use tracing::debug;

/// Longest edge, in pixels, of an embedded image.
pub const MAX_EMBED_EDGE: u32 = 1600;

const JPEG_QUALITY: u8 = 85;

/// A JPEG ready to be wrapped in an image XObject.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedImage {
    pub jpeg: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl EncodedImage {
    pub fn aspect_ratio(&self) -> f32 {
        self.width as f32 / self.height.max(1) as f32
    }
}

/// Decode `bytes` (any format the `image` crate was built with) and
/// re-encode as JPEG.
pub fn encode_for_pdf(bytes: &[u8]) -> Result<EncodedImage, image::ImageError> {
    let img = image::load_from_memory(bytes)?;
    encode_image(&img)
}

pub fn encode_image(img: &DynamicImage) -> Result<EncodedImage, image::ImageError> {
    let img = if img.width() > MAX_EMBED_EDGE || img.height() > MAX_EMBED_EDGE {
        img.thumbnail(MAX_EMBED_EDGE, MAX_EMBED_EDGE)
    } else {
        img.clone()
    };
    let rgb = flatten_on_white(&img);

    let mut jpeg = Vec::new();
    rgb.write_with_encoder(JpegEncoder::new_with_quality(&mut jpeg, JPEG_QUALITY))?;
    debug!(
        "Encoded {}x{} image → {} bytes JPEG",
        rgb.width(),
        rgb.height(),
        jpeg.len()
    );

    Ok(EncodedImage {
        jpeg,
        width: rgb.width(),
        height: rgb.height(),
    })
}

fn flatten_on_white(img: &DynamicImage) -> RgbImage {
    if !img.color().has_alpha() {
        return img.to_rgb8();
    }
    let rgba = img.to_rgba8();
    RgbImage::from_fn(rgba.width(), rgba.height(), |x, y| {
        let [r, g, b, a] = rgba.get_pixel(x, y).0;
        let blend = |c: u8| -> u8 {
            let a = a as u16;
            ((c as u16 * a + 255 * (255 - a)) / 255) as u8
        };
        Rgb([blend(r), blend(g), blend(b)])
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};
    use std::io::Cursor;

    fn png(img: RgbaImage) -> Vec<u8> {
        let mut buf = Vec::new();
        DynamicImage::ImageRgba8(img)
            .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
            .unwrap();
        buf
    }

    #[test]
    fn png_becomes_jpeg() {
        let bytes = png(RgbaImage::from_pixel(10, 6, Rgba([255, 0, 0, 255])));
        let encoded = encode_for_pdf(&bytes).unwrap();
        assert_eq!((encoded.width, encoded.height), (10, 6));
        assert_eq!(&encoded.jpeg[..2], &[0xFF, 0xD8]);
    }

    #[test]
    fn large_images_are_downscaled_keeping_aspect() {
        let img = DynamicImage::ImageRgba8(RgbaImage::new(3200, 1600));
        let encoded = encode_image(&img).unwrap();
        assert_eq!(encoded.width, MAX_EMBED_EDGE);
        assert_eq!(encoded.height, 800);
        assert!((encoded.aspect_ratio() - 2.0).abs() < 0.01);
    }

    #[test]
    fn transparency_flattens_to_white() {
        let rgba = RgbaImage::from_pixel(1, 1, Rgba([0, 0, 0, 0]));
        let rgb = flatten_on_white(&DynamicImage::ImageRgba8(rgba));
        assert_eq!(rgb.get_pixel(0, 0).0, [255, 255, 255]);
    }

    #[test]
    fn garbage_fails_to_decode() {
        assert!(encode_for_pdf(b"definitely not an image").is_err());
    }
}
