// src/ops.rs
//
// Conversion settings: supported formats and the shared batch configuration.
// These are cheap to create and store - the expensive work happens in the engine.

use crate::error::{ImgBatchError, Result};
use std::fmt;

/// Default lossy quality factor for formats that support one.
pub const DEFAULT_QUALITY: f32 = 0.9;

/// Lower bound for the quality factor. Values below this produce
/// unusable output, so out-of-range input is clamped here.
pub const MIN_QUALITY: f32 = 0.1;

/// Image formats the engine converts between.
///
/// The same enum describes both the detected input format of a source item
/// and the target output format of a batch.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SupportedFormat {
    Jpeg,
    Png,
    WebP,
    Gif,
    Bmp,
}

impl SupportedFormat {
    pub fn from_name(name: &str) -> Result<Self> {
        match name.to_lowercase().as_str() {
            "jpeg" | "jpg" => Ok(Self::Jpeg),
            "png" => Ok(Self::Png),
            "webp" => Ok(Self::WebP),
            "gif" => Ok(Self::Gif),
            "bmp" => Ok(Self::Bmp),
            other => Err(ImgBatchError::unsupported_format(other.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Jpeg => "jpeg",
            Self::Png => "png",
            Self::WebP => "webp",
            Self::Gif => "gif",
            Self::Bmp => "bmp",
        }
    }

    pub fn mime(&self) -> &'static str {
        match self {
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
            Self::WebP => "image/webp",
            Self::Gif => "image/gif",
            Self::Bmp => "image/bmp",
        }
    }

    /// File extension used for generated download names (leading dot included).
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Jpeg => ".jpg",
            Self::Png => ".png",
            Self::WebP => ".webp",
            Self::Gif => ".gif",
            Self::Bmp => ".bmp",
        }
    }

    /// Whether the encoder honors a lossy quality factor for this format.
    pub fn supports_quality(&self) -> bool {
        matches!(self, Self::Jpeg | Self::WebP)
    }

    /// Whether the format carries an alpha channel. Targets without alpha
    /// get their transparency composited onto an opaque background.
    pub fn supports_alpha(&self) -> bool {
        matches!(self, Self::Png | Self::WebP | Self::Gif)
    }

    pub(crate) fn from_image_format(format: image::ImageFormat) -> Option<Self> {
        match format {
            image::ImageFormat::Jpeg => Some(Self::Jpeg),
            image::ImageFormat::Png => Some(Self::Png),
            image::ImageFormat::WebP => Some(Self::WebP),
            image::ImageFormat::Gif => Some(Self::Gif),
            image::ImageFormat::Bmp => Some(Self::Bmp),
            _ => None,
        }
    }
}

impl fmt::Display for SupportedFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Shared settings for one conversion batch.
///
/// A batch snapshots this at start; later updates through
/// [`ConfigUpdate`] only affect batches started afterward.
#[derive(Clone, Debug, PartialEq)]
pub struct ConversionConfig {
    pub output_format: SupportedFormat,
    /// Lossy quality factor in (0, 1]. Ignored by formats without
    /// quality support. Clamped into range by [`normalized`](Self::normalized).
    pub quality: f32,
    /// Target width in pixels. `None` keeps the source width (subject to
    /// aspect-ratio fitting when only the height is set).
    pub width: Option<u32>,
    /// Target height in pixels.
    pub height: Option<u32>,
    pub maintain_aspect_ratio: bool,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            output_format: SupportedFormat::WebP,
            quality: DEFAULT_QUALITY,
            width: None,
            height: None,
            maintain_aspect_ratio: true,
        }
    }
}

impl ConversionConfig {
    /// Returns a copy with the quality factor forced into [MIN_QUALITY, 1.0].
    /// Non-finite values fall back to the default quality.
    pub fn normalized(mut self) -> Self {
        self.quality = if self.quality.is_finite() {
            self.quality.clamp(MIN_QUALITY, 1.0)
        } else {
            DEFAULT_QUALITY
        };
        self
    }

    /// Quality as the 0-100 integer scale the codecs expect.
    pub fn quality_percent(&self) -> u8 {
        (self.quality.clamp(MIN_QUALITY, 1.0) * 100.0).round() as u8
    }

    /// Partial merge: only the fields present in `update` change.
    pub fn merge(&mut self, update: ConfigUpdate) {
        if let Some(format) = update.output_format {
            self.output_format = format;
        }
        if let Some(quality) = update.quality {
            self.quality = quality;
        }
        if let Some(width) = update.width {
            self.width = width;
        }
        if let Some(height) = update.height {
            self.height = height;
        }
        if let Some(maintain) = update.maintain_aspect_ratio {
            self.maintain_aspect_ratio = maintain;
        }
    }
}

/// Partial configuration update.
///
/// `width`/`height` are doubly optional: `None` leaves the current value,
/// `Some(None)` clears a previously set target dimension.
#[derive(Clone, Debug, Default)]
pub struct ConfigUpdate {
    pub output_format: Option<SupportedFormat>,
    pub quality: Option<f32>,
    pub width: Option<Option<u32>>,
    pub height: Option<Option<u32>>,
    pub maintain_aspect_ratio: Option<bool>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_parsing_accepts_aliases() {
        assert_eq!(SupportedFormat::from_name("jpg").unwrap(), SupportedFormat::Jpeg);
        assert_eq!(SupportedFormat::from_name("JPEG").unwrap(), SupportedFormat::Jpeg);
        assert_eq!(SupportedFormat::from_name("webp").unwrap(), SupportedFormat::WebP);
        assert!(SupportedFormat::from_name("tiff").is_err());
    }

    #[test]
    fn mime_and_extension_match_format() {
        assert_eq!(SupportedFormat::Jpeg.mime(), "image/jpeg");
        assert_eq!(SupportedFormat::Jpeg.extension(), ".jpg");
        assert_eq!(SupportedFormat::Png.mime(), "image/png");
        assert_eq!(SupportedFormat::WebP.mime(), "image/webp");
        assert_eq!(SupportedFormat::Gif.mime(), "image/gif");
        assert_eq!(SupportedFormat::Bmp.mime(), "image/bmp");
        assert_eq!(SupportedFormat::Bmp.extension(), ".bmp");
    }

    #[test]
    fn quality_support_matches_format() {
        assert!(SupportedFormat::Jpeg.supports_quality());
        assert!(SupportedFormat::WebP.supports_quality());
        assert!(!SupportedFormat::Png.supports_quality());
        assert!(!SupportedFormat::Gif.supports_quality());
        assert!(!SupportedFormat::Bmp.supports_quality());
    }

    #[test]
    fn alpha_support_matches_format() {
        assert!(SupportedFormat::Png.supports_alpha());
        assert!(!SupportedFormat::Jpeg.supports_alpha());
        assert!(!SupportedFormat::Bmp.supports_alpha());
    }

    #[test]
    fn normalized_clamps_quality() {
        let config = ConversionConfig {
            quality: 7.0,
            ..Default::default()
        };
        assert_eq!(config.normalized().quality, 1.0);

        let config = ConversionConfig {
            quality: -3.0,
            ..Default::default()
        };
        assert_eq!(config.normalized().quality, MIN_QUALITY);

        let config = ConversionConfig {
            quality: f32::NAN,
            ..Default::default()
        };
        assert_eq!(config.normalized().quality, DEFAULT_QUALITY);
    }

    #[test]
    fn quality_percent_rounds() {
        let config = ConversionConfig {
            quality: 0.8,
            ..Default::default()
        };
        assert_eq!(config.quality_percent(), 80);

        let config = ConversionConfig {
            quality: 1.0,
            ..Default::default()
        };
        assert_eq!(config.quality_percent(), 100);
    }

    #[test]
    fn merge_applies_only_present_fields() {
        let mut config = ConversionConfig::default();
        config.merge(ConfigUpdate {
            output_format: Some(SupportedFormat::Png),
            width: Some(Some(640)),
            ..Default::default()
        });
        assert_eq!(config.output_format, SupportedFormat::Png);
        assert_eq!(config.width, Some(640));
        // untouched fields keep their defaults
        assert_eq!(config.quality, DEFAULT_QUALITY);
        assert!(config.maintain_aspect_ratio);

        // Some(None) clears a previously set dimension
        config.merge(ConfigUpdate {
            width: Some(None),
            ..Default::default()
        });
        assert_eq!(config.width, None);
    }
}
