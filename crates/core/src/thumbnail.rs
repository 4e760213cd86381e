use fast_image_resize::{self as fir, images::Image as FirImage};
use image::ImageEncoder;

use crate::error::{Error, Result};

/// Bounding-box edge for generated thumbnails.
pub const THUMBNAIL_EDGE: u32 = 256;

const JPEG_QUALITY: u8 = 85;

/// A generated thumbnail plus the source dimensions observed while decoding,
/// so the pipeline does not need a second decode to learn them.
#[derive(Debug, Clone)]
pub struct GeneratedThumbnail {
    pub bytes: Vec<u8>,
    pub source_width: u32,
    pub source_height: u32,
}

/// Generate a fixed-size JPEG thumbnail from source image bytes.
///
/// Decode via the `image` crate, SIMD resize to fit a 256px bounding box
/// (aspect preserved, never upscaled), encode JPEG.
pub fn generate(bytes: &[u8]) -> Result<GeneratedThumbnail> {
    let img = image::load_from_memory(bytes)?;
    let rgb = img.to_rgb8();
    let (w, h) = (rgb.width(), rgb.height());
    let (tw, th) = fit_within(w, h, THUMBNAIL_EDGE);

    let src = FirImage::from_vec_u8(w, h, rgb.into_raw(), fir::PixelType::U8x3)
        .map_err(|e| Error::Thumbnail(e.to_string()))?;
    let mut dst = FirImage::new(tw, th, fir::PixelType::U8x3);
    fir::Resizer::new()
        .resize(&src, &mut dst, None)
        .map_err(|e| Error::Thumbnail(e.to_string()))?;

    let mut out = Vec::new();
    let encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut out, JPEG_QUALITY);
    encoder.write_image(dst.buffer(), tw, th, image::ExtendedColorType::Rgb8)?;
    Ok(GeneratedThumbnail {
        bytes: out,
        source_width: w,
        source_height: h,
    })
}

/// Scale (w, h) down to fit within an `edge` square, preserving aspect ratio.
/// Images already inside the box keep their dimensions.
fn fit_within(w: u32, h: u32, edge: u32) -> (u32, u32) {
    if w <= edge && h <= edge {
        return (w, h);
    }
    if w >= h {
        let th = ((h as u64 * edge as u64) / w as u64).max(1) as u32;
        (edge, th)
    } else {
        let tw = ((w as u64 * edge as u64) / h as u64).max(1) as u32;
        (tw, edge)
    }
}
