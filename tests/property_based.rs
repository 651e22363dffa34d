// tests/property_based.rs
//
// Property-based tests for the pure computation layers: dimension
// calculation, ratio math, aggregation, and filename handling.

use imgbatch::engine::encoder::calc_dimensions;
use imgbatch::engine::{compression_ratio, statistics};
use imgbatch::export::{download_filename, format_file_size, sanitize_filename};
use imgbatch::{ConversionConfig, SupportedFormat};
use proptest::prelude::*;

proptest! {
    #[test]
    fn calc_dimensions_never_produces_zero(
        ow in 1u32..=4096,
        oh in 1u32..=4096,
        tw in proptest::option::of(1u32..=4096),
        th in proptest::option::of(1u32..=4096),
        maintain in any::<bool>(),
    ) {
        let (w, h) = calc_dimensions(ow, oh, tw, th, maintain);
        prop_assert!(w >= 1);
        prop_assert!(h >= 1);
    }

    #[test]
    fn calc_dimensions_without_targets_is_identity(
        ow in 1u32..=4096,
        oh in 1u32..=4096,
        maintain in any::<bool>(),
    ) {
        prop_assert_eq!(calc_dimensions(ow, oh, None, None, maintain), (ow, oh));
    }

    #[test]
    fn calc_dimensions_fits_inside_both_targets_when_maintaining(
        ow in 1u32..=4096,
        oh in 1u32..=4096,
        tw in 1u32..=4096,
        th in 1u32..=4096,
    ) {
        let (w, h) = calc_dimensions(ow, oh, Some(tw), Some(th), true);
        // rounding can overshoot by at most one pixel
        prop_assert!(w <= tw + 1);
        prop_assert!(h <= th + 1);
    }

    #[test]
    fn calc_dimensions_ignores_ratio_when_not_maintaining(
        ow in 1u32..=4096,
        oh in 1u32..=4096,
        tw in 1u32..=4096,
        th in 1u32..=4096,
    ) {
        prop_assert_eq!(
            calc_dimensions(ow, oh, Some(tw), Some(th), false),
            (tw, th)
        );
    }

    #[test]
    fn compression_ratio_sign_tracks_size_change(
        original in 1u64..=u32::MAX as u64,
        converted in 0u64..=u32::MAX as u64,
    ) {
        let ratio = compression_ratio(original, converted);
        prop_assert!(ratio.is_finite());
        prop_assert!(ratio <= 100.0);
        if converted < original {
            prop_assert!(ratio > 0.0);
        } else if converted > original {
            prop_assert!(ratio < 0.0);
        } else {
            prop_assert_eq!(ratio, 0.0);
        }
    }

    #[test]
    fn quality_normalization_stays_in_bounds(quality in any::<f32>()) {
        let config = ConversionConfig { quality, ..Default::default() }.normalized();
        prop_assert!(config.quality >= 0.1);
        prop_assert!(config.quality <= 1.0);
        let percent = config.quality_percent();
        prop_assert!((10..=100).contains(&percent));
    }

    #[test]
    fn sanitize_filename_output_is_clean_and_idempotent(name in ".{0,64}") {
        let once = sanitize_filename(&name);
        let clean = !once.contains(|c: char| {
            matches!(c, '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*') || c.is_whitespace()
        });
        prop_assert!(clean);
        prop_assert!(!once.contains("__"));
        prop_assert!(!once.starts_with('_'));
        prop_assert!(!once.ends_with('_'));
        prop_assert_eq!(sanitize_filename(&once), once);
    }

    #[test]
    fn download_filename_always_carries_the_marker(
        name in "[a-zA-Z0-9 ._-]{1,32}",
        format_index in 0usize..5,
    ) {
        let formats = [
            SupportedFormat::Jpeg,
            SupportedFormat::Png,
            SupportedFormat::WebP,
            SupportedFormat::Gif,
            SupportedFormat::Bmp,
        ];
        let format = formats[format_index];
        let out = download_filename(&name, format);
        prop_assert!(out.contains("_converted"));
        prop_assert!(out.ends_with(format.extension()));
    }

    #[test]
    fn format_file_size_is_nonempty_with_a_unit(bytes in any::<u64>()) {
        let text = format_file_size(bytes);
        prop_assert!(
            text.ends_with("Bytes")
                || text.ends_with("KB")
                || text.ends_with("MB")
                || text.ends_with("GB")
        );
        let number = text.split_whitespace().next().unwrap();
        prop_assert!(number.parse::<f64>().is_ok());
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn statistics_totals_are_consistent(
        sizes in proptest::collection::vec((1u64..=10_000_000, 0u64..=10_000_000), 0..20),
    ) {
        use imgbatch::{EncodedImage, ItemId, Source, SourceItem};
        use std::sync::Arc;

        let results: Vec<_> = sizes
            .iter()
            .map(|&(original, converted)| {
                let item = SourceItem {
                    id: ItemId::next(),
                    name: "x.png".to_string(),
                    size: original,
                    format: SupportedFormat::Png,
                    source: Source::Memory(Arc::new(Vec::new())),
                    dimensions: None,
                };
                let encoded = EncodedImage {
                    bytes: vec![0u8; converted as usize % 64],
                    width: 1,
                    height: 1,
                };
                let mut result = imgbatch::ConversionResult::new(
                    &item,
                    encoded,
                    SupportedFormat::WebP,
                    0.0,
                );
                result.converted_size = converted;
                result.compression_ratio = compression_ratio(original, converted);
                result
            })
            .collect();

        let stats = statistics(&results);
        prop_assert_eq!(stats.total_files, sizes.len());
        prop_assert_eq!(
            stats.total_original_size,
            sizes.iter().map(|&(o, _)| o).sum::<u64>()
        );
        prop_assert_eq!(
            stats.total_converted_size,
            sizes.iter().map(|&(_, c)| c).sum::<u64>()
        );
        prop_assert_eq!(
            stats.total_savings,
            stats.total_original_size as i64 - stats.total_converted_size as i64
        );
        prop_assert!(stats.average_compression_ratio.is_finite());
        if sizes.is_empty() {
            prop_assert_eq!(stats.average_compression_ratio, 0.0);
        }
    }
}
