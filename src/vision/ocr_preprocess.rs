//! Image preprocessing filters for OCR optimization
//!
//! Optional enhancements applied to the copy of a frame sent to the OCR
//! engine, useful for faint or low-contrast stamped codes.

use image::{imageops, DynamicImage, GrayImage, Luma, RgbImage};
use tracing::debug;

use crate::config::OcrPreprocessing;

/// Result of preprocessing, with the upscale factor applied
pub struct PreprocessResult {
    /// Processed image
    pub image: RgbImage,
    /// Integer factor the image was enlarged by (1 = original size)
    pub scale: u32,
}

/// Apply preprocessing filters to an RGB image based on settings.
///
/// Order: upscale, contrast, sharpen, grayscale/binarize, invert.
pub fn apply_preprocessing(image: &RgbImage, settings: &OcrPreprocessing) -> PreprocessResult {
    if !settings.enabled {
        debug!("OCR preprocessing disabled");
        return PreprocessResult {
            image: image.clone(),
            scale: 1,
        };
    }

    debug!(
        "OCR preprocessing enabled: scale={}, contrast={}, sharpen={}, grayscale={}, binarize={}, invert={}",
        settings.scale, settings.contrast, settings.sharpen, settings.grayscale, settings.binarize, settings.invert
    );

    let scale = settings.scale.max(1);
    let mut result = if scale > 1 {
        apply_upscale(image, scale)
    } else {
        image.clone()
    };

    if (settings.contrast - 1.0).abs() > 0.01 {
        apply_contrast(&mut result, settings.contrast);
    }

    if settings.sharpen > 0.01 {
        result = apply_sharpen(&result, settings.sharpen);
    }

    if settings.binarize {
        result = gray_to_rgb(apply_binarize(&imageops::grayscale(&result)));
    } else if settings.grayscale {
        result = gray_to_rgb(imageops::grayscale(&result));
    }

    if settings.invert {
        imageops::invert(&mut result);
    }

    PreprocessResult {
        image: result,
        scale,
    }
}

/// Contrast around mid-gray; factor > 1.0 increases contrast
fn apply_contrast(image: &mut RgbImage, factor: f32) {
    for pixel in image.pixels_mut() {
        for channel in pixel.0.iter_mut() {
            let adjusted = ((*channel as f32 - 128.0) * factor + 128.0).clamp(0.0, 255.0);
            *channel = adjusted as u8;
        }
    }
}

/// 3x3 sharpen: center weight 1 + 4*strength, cross neighbors -strength.
/// Border pixels are left unchanged.
fn apply_sharpen(image: &RgbImage, strength: f32) -> RgbImage {
    let (w, h) = image.dimensions();
    let mut result = image.clone();
    if w < 3 || h < 3 {
        return result;
    }

    let center_weight = 1.0 + 4.0 * strength;

    for y in 1..h - 1 {
        for x in 1..w - 1 {
            let center = image.get_pixel(x, y).0;
            let top = image.get_pixel(x, y - 1).0;
            let bottom = image.get_pixel(x, y + 1).0;
            let left = image.get_pixel(x - 1, y).0;
            let right = image.get_pixel(x + 1, y).0;

            let out = result.get_pixel_mut(x, y);
            for c in 0..3 {
                let neighbors = top[c] as f32 + bottom[c] as f32 + left[c] as f32 + right[c] as f32;
                let sharpened = center[c] as f32 * center_weight - neighbors * strength;
                out.0[c] = sharpened.clamp(0.0, 255.0) as u8;
            }
        }
    }

    result
}

/// Otsu threshold into pure black and white
fn apply_binarize(gray: &GrayImage) -> GrayImage {
    let level = imageproc::contrast::otsu_level(gray);
    let mut out = gray.clone();
    for pixel in out.pixels_mut() {
        *pixel = if pixel.0[0] > level { Luma([255]) } else { Luma([0]) };
    }
    out
}

/// Bilinear upscale by an integer factor
fn apply_upscale(image: &RgbImage, scale: u32) -> RgbImage {
    let (w, h) = image.dimensions();
    imageops::resize(image, w * scale, h * scale, imageops::FilterType::Triangle)
}

fn gray_to_rgb(gray: GrayImage) -> RgbImage {
    DynamicImage::ImageLuma8(gray).to_rgb8()
}
