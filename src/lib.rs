// lib.rs
//
// imgbatch: a batch image conversion engine
//
// Design goals:
// - Concurrent batch conversion with per-item progress tracking
// - Cooperative cancellation that never strands items mid-state
// - Result aggregation (counts, progress, savings statistics)
// - Bulk export, either file-by-file or as a single deflate archive

pub mod engine;
pub mod error;
pub mod export;
pub mod ops;

pub use engine::{
    BatchScheduler, BatchState, BatchStatistics, CodecEncoder, ConversionResult, ConversionStatus,
    Encode, EncodedImage, ItemId, ProgressRecord, Source, SourceItem, StatusCounts,
};
pub use error::{ErrorCategory, ImgBatchError, Result};
pub use export::{
    export_all, export_all_with, Archiver, DeliverySink, DirectorySink, ExportMode,
    ExportOptions, ZipArchiver,
};
pub use ops::{ConfigUpdate, ConversionConfig, SupportedFormat};

/// Input formats the decoder accepts.
pub fn supported_input_formats() -> Vec<SupportedFormat> {
    vec![
        SupportedFormat::Jpeg,
        SupportedFormat::Png,
        SupportedFormat::WebP,
        SupportedFormat::Gif,
        SupportedFormat::Bmp,
    ]
}

/// Output formats the encoder can produce. Same set as the inputs.
pub fn supported_output_formats() -> Vec<SupportedFormat> {
    supported_input_formats()
}

/// Crate version string.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_lists_are_consistent() {
        let inputs = supported_input_formats();
        assert_eq!(inputs.len(), 5);
        assert_eq!(inputs, supported_output_formats());
        for format in inputs {
            assert_eq!(SupportedFormat::from_name(format.as_str()).unwrap(), format);
        }
    }

    #[test]
    fn version_matches_manifest() {
        assert_eq!(version(), env!("CARGO_PKG_VERSION"));
    }
}
