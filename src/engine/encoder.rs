// src/engine/encoder.rs
//
// The encode capability: decode a source item, fit it to the configured
// dimensions, and re-encode it in the target format.

use crate::engine::common::run_with_panic_policy;
use crate::engine::io::SourceItem;
use crate::engine::{MAX_DIMENSION, MAX_PIXELS};
use crate::error::{ImgBatchError, Result};
use crate::ops::{ConversionConfig, SupportedFormat};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, ImageFormat, RgbImage};
use std::borrow::Cow;
use std::io::Cursor;

/// Output of one successful encode.
#[derive(Clone, Debug)]
pub struct EncodedImage {
    pub bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

/// The pluggable re-encoding capability.
///
/// The scheduler drives every item through this trait; [`CodecEncoder`] is
/// the built-in implementation, and tests substitute their own to control
/// timing and failures.
pub trait Encode: Send + Sync {
    fn encode(&self, item: &SourceItem, config: &ConversionConfig) -> Result<EncodedImage>;
}

/// Default encoder backed by the image and webp codec crates.
#[derive(Clone, Copy, Debug, Default)]
pub struct CodecEncoder;

impl Encode for CodecEncoder {
    fn encode(&self, item: &SourceItem, config: &ConversionConfig) -> Result<EncodedImage> {
        let bytes = item.source.load()?;
        let img = image::load_from_memory(&bytes)
            .map_err(|e| ImgBatchError::decode_failed(e.to_string()))?;

        let (w, h) = img.dimensions();
        check_dimensions(w, h)?;

        let (target_w, target_h) =
            calc_dimensions(w, h, config.width, config.height, config.maintain_aspect_ratio);
        let img = if (target_w, target_h) != (w, h) {
            img.resize_exact(target_w, target_h, FilterType::Lanczos3)
        } else {
            img
        };

        let quality = config.quality_percent();
        let out = match config.output_format {
            SupportedFormat::Jpeg => encode_jpeg(&img, quality)?,
            SupportedFormat::Png => encode_png(&img)?,
            SupportedFormat::WebP => encode_webp(&img, quality)?,
            SupportedFormat::Gif => encode_gif(&img)?,
            SupportedFormat::Bmp => encode_bmp(&img)?,
        };

        Ok(EncodedImage {
            bytes: out,
            width: target_w,
            height: target_h,
        })
    }
}

/// Reject decompression bombs before allocating pixel buffers.
pub fn check_dimensions(width: u32, height: u32) -> Result<()> {
    if width > MAX_DIMENSION || height > MAX_DIMENSION {
        return Err(ImgBatchError::dimension_exceeds_limit(
            width.max(height),
            MAX_DIMENSION,
        ));
    }
    let pixels = width as u64 * height as u64;
    if pixels > MAX_PIXELS {
        return Err(ImgBatchError::pixel_count_exceeds_limit(pixels, MAX_PIXELS));
    }
    Ok(())
}

/// Fit the source dimensions to the configured targets.
///
/// With `maintain_aspect_ratio`, a single target dimension scales the other
/// proportionally; when both are given the result is the largest size that
/// fits inside both while keeping the source ratio. Without it, missing
/// targets fall back to the source dimension. Results are floored at 1px.
pub fn calc_dimensions(
    original_width: u32,
    original_height: u32,
    target_width: Option<u32>,
    target_height: Option<u32>,
    maintain_aspect_ratio: bool,
) -> (u32, u32) {
    if target_width.is_none() && target_height.is_none() {
        return (original_width, original_height);
    }

    if !maintain_aspect_ratio {
        return (
            target_width.unwrap_or(original_width).max(1),
            target_height.unwrap_or(original_height).max(1),
        );
    }

    let aspect = original_width as f64 / original_height as f64;

    let (w, h) = match (target_width, target_height) {
        (Some(tw), Some(th)) => {
            let width_based_height = tw as f64 / aspect;
            if width_based_height <= th as f64 {
                (tw as f64, width_based_height)
            } else {
                (th as f64 * aspect, th as f64)
            }
        }
        (Some(tw), None) => (tw as f64, tw as f64 / aspect),
        (None, Some(th)) => (th as f64 * aspect, th as f64),
        (None, None) => unreachable!(),
    };

    ((w.round() as u32).max(1), (h.round() as u32).max(1))
}

/// Composite transparency onto an opaque white background.
/// Targets without alpha support must not fail on transparent sources.
fn flatten_onto_white(img: &DynamicImage) -> DynamicImage {
    let rgba = img.to_rgba8();
    let mut rgb = RgbImage::new(rgba.width(), rgba.height());
    for (src, dst) in rgba.pixels().zip(rgb.pixels_mut()) {
        let a = src[3] as u32;
        for c in 0..3 {
            dst[c] = ((src[c] as u32 * a + 255 * (255 - a)) / 255) as u8;
        }
    }
    DynamicImage::ImageRgb8(rgb)
}

pub fn encode_jpeg(img: &DynamicImage, quality: u8) -> Result<Vec<u8>> {
    run_with_panic_policy("encode:jpeg", || {
        let flat = flatten_onto_white(img);
        let mut buf = Vec::new();
        let encoder = JpegEncoder::new_with_quality(&mut buf, quality.min(100));
        flat.write_with_encoder(encoder)
            .map_err(|e| ImgBatchError::encode_failed("jpeg", e.to_string()))?;
        Ok(buf)
    })
}

pub fn encode_png(img: &DynamicImage) -> Result<Vec<u8>> {
    run_with_panic_policy("encode:png", || {
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
            .map_err(|e| ImgBatchError::encode_failed("png", e.to_string()))?;
        Ok(buf)
    })
}

pub fn encode_webp(img: &DynamicImage, quality: u8) -> Result<Vec<u8>> {
    run_with_panic_policy("encode:webp", || {
        // libwebp only accepts RGB8/RGBA8 input
        let src: Cow<'_, DynamicImage> = match img {
            DynamicImage::ImageRgb8(_) | DynamicImage::ImageRgba8(_) => Cow::Borrowed(img),
            _ => Cow::Owned(DynamicImage::ImageRgba8(img.to_rgba8())),
        };
        let encoder = webp::Encoder::from_image(&src)
            .map_err(|e| ImgBatchError::encode_failed("webp", e.to_string()))?;
        let mem = encoder.encode(quality.min(100) as f32);
        Ok(mem.to_vec())
    })
}

pub fn encode_gif(img: &DynamicImage) -> Result<Vec<u8>> {
    run_with_panic_policy("encode:gif", || {
        let rgba = DynamicImage::ImageRgba8(img.to_rgba8());
        let mut buf = Vec::new();
        rgba.write_to(&mut Cursor::new(&mut buf), ImageFormat::Gif)
            .map_err(|e| ImgBatchError::encode_failed("gif", e.to_string()))?;
        Ok(buf)
    })
}

pub fn encode_bmp(img: &DynamicImage) -> Result<Vec<u8>> {
    run_with_panic_policy("encode:bmp", || {
        let flat = flatten_onto_white(img);
        let mut buf = Vec::new();
        flat.write_to(&mut Cursor::new(&mut buf), ImageFormat::Bmp)
            .map_err(|e| ImgBatchError::encode_failed("bmp", e.to_string()))?;
        Ok(buf)
    })
}
