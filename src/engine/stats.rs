// src/engine/stats.rs
//
// Read-only aggregation over batch state. Everything here is recomputed
// on each call from the current snapshot, never cached.

use crate::engine::state::{BatchState, ConversionResult, ConversionStatus};

/// Number of items in each status bucket.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StatusCounts {
    pub pending: usize,
    pub processing: usize,
    pub completed: usize,
    pub error: usize,
}

/// Byte totals and averages over the completed results of a batch.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct BatchStatistics {
    pub total_files: usize,
    pub total_original_size: u64,
    pub total_converted_size: u64,
    /// `original - converted` summed over all results; negative when the
    /// batch grew overall.
    pub total_savings: i64,
    /// Mean of per-result compression ratios; 0 over an empty result set.
    pub average_compression_ratio: f64,
}

impl BatchState {
    pub fn status_counts(&self) -> StatusCounts {
        let mut counts = StatusCounts::default();
        for record in self.progress.values() {
            match record.status {
                ConversionStatus::Pending => counts.pending += 1,
                ConversionStatus::Processing => counts.processing += 1,
                ConversionStatus::Completed => counts.completed += 1,
                ConversionStatus::Error => counts.error += 1,
            }
        }
        counts
    }

    /// Completed fraction of the batch as a percentage; 0 for an empty batch.
    pub fn overall_progress(&self) -> f64 {
        if self.total_count == 0 {
            return 0.0;
        }
        self.completed_count as f64 / self.total_count as f64 * 100.0
    }

    /// Derived whole-batch status.
    ///
    /// Error only when every settled item errored and nothing completed or
    /// remains in flight; a mixed batch is never reported as a whole-batch
    /// error.
    pub fn overall_status(&self) -> ConversionStatus {
        let counts = self.status_counts();
        if counts.error > 0
            && counts.completed == 0
            && counts.processing == 0
            && counts.pending == 0
        {
            ConversionStatus::Error
        } else if self.total_count > 0 && self.completed_count == self.total_count {
            ConversionStatus::Completed
        } else if counts.processing > 0 {
            ConversionStatus::Processing
        } else {
            ConversionStatus::Pending
        }
    }

    pub fn statistics(&self) -> BatchStatistics {
        statistics(&self.results)
    }
}

/// Compute statistics over an arbitrary result slice (the export pipeline
/// uses this for its report as well).
pub fn statistics(results: &[ConversionResult]) -> BatchStatistics {
    let total_files = results.len();
    let total_original_size: u64 = results.iter().map(|r| r.original_size).sum();
    let total_converted_size: u64 = results.iter().map(|r| r.converted_size).sum();
    let average_compression_ratio = if total_files == 0 {
        0.0
    } else {
        results.iter().map(|r| r.compression_ratio).sum::<f64>() / total_files as f64
    };

    BatchStatistics {
        total_files,
        total_original_size,
        total_converted_size,
        total_savings: total_original_size as i64 - total_converted_size as i64,
        average_compression_ratio,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::encoder::EncodedImage;
    use crate::engine::io::SourceItem;
    use crate::engine::state::ProgressRecord;
    use crate::ops::SupportedFormat;
    use image::{ImageBuffer, Rgba};

    fn png_item(name: &str) -> SourceItem {
        let img: ImageBuffer<Rgba<u8>, Vec<u8>> =
            ImageBuffer::from_pixel(2, 2, Rgba([1, 2, 3, 255]));
        let mut bytes = Vec::new();
        img.write_to(&mut std::io::Cursor::new(&mut bytes), image::ImageFormat::Png)
            .unwrap();
        SourceItem::from_bytes(name, bytes).unwrap()
    }

    fn result_with_sizes(name: &str, original: u64, converted: u64) -> ConversionResult {
        let mut item = png_item(name);
        item.size = original;
        ConversionResult::new(
            &item,
            EncodedImage {
                bytes: vec![0u8; converted as usize],
                width: 2,
                height: 2,
            },
            SupportedFormat::WebP,
            12.0,
        )
    }

    #[test]
    fn statistics_over_empty_results_is_zeroed() {
        let stats = statistics(&[]);
        assert_eq!(stats.total_files, 0);
        assert_eq!(stats.average_compression_ratio, 0.0);
        assert!(!stats.average_compression_ratio.is_nan());
    }

    #[test]
    fn statistics_sums_and_averages() {
        let results = vec![
            result_with_sizes("a.png", 1000, 500),
            result_with_sizes("b.png", 2000, 1800),
        ];
        let stats = statistics(&results);
        assert_eq!(stats.total_files, 2);
        assert_eq!(stats.total_original_size, 3000);
        assert_eq!(stats.total_converted_size, 2300);
        assert_eq!(stats.total_savings, 700);
        // ratios: 50.0 and 10.0
        assert!((stats.average_compression_ratio - 30.0).abs() < 1e-9);
    }

    #[test]
    fn statistics_savings_can_go_negative() {
        let results = vec![result_with_sizes("a.png", 100, 400)];
        let stats = statistics(&results);
        assert_eq!(stats.total_savings, -300);
        assert_eq!(results[0].compression_ratio, -300.0);
    }

    #[test]
    fn overall_progress_handles_empty_batch() {
        let state = BatchState::default();
        assert_eq!(state.overall_progress(), 0.0);
    }

    #[test]
    fn overall_progress_is_complete_fraction() {
        let mut state = BatchState::default();
        state.total_count = 4;
        state.completed_count = 1;
        assert_eq!(state.overall_progress(), 25.0);
        state.completed_count = 4;
        assert_eq!(state.overall_progress(), 100.0);
    }

    #[test]
    fn overall_status_error_only_when_everything_failed() {
        let mut state = BatchState::default();
        let id = crate::engine::io::ItemId::next();
        let mut record = ProgressRecord::pending(id);
        record.status = ConversionStatus::Error;
        state.progress.insert(id, record);
        state.total_count = 1;
        assert_eq!(state.overall_status(), ConversionStatus::Error);

        // add a completed sibling: no longer a whole-batch error
        let id2 = crate::engine::io::ItemId::next();
        let mut record2 = ProgressRecord::pending(id2);
        record2.status = ConversionStatus::Completed;
        state.progress.insert(id2, record2);
        state.total_count = 2;
        state.completed_count = 1;
        assert_ne!(state.overall_status(), ConversionStatus::Error);
        assert_ne!(state.overall_status(), ConversionStatus::Completed);
    }

    #[test]
    fn overall_status_completed_requires_full_batch() {
        let mut state = BatchState::default();
        let id = crate::engine::io::ItemId::next();
        let mut record = ProgressRecord::pending(id);
        record.status = ConversionStatus::Completed;
        state.progress.insert(id, record);
        state.total_count = 1;
        state.completed_count = 1;
        assert_eq!(state.overall_status(), ConversionStatus::Completed);
    }

    #[test]
    fn overall_status_processing_when_any_in_flight() {
        let mut state = BatchState::default();
        let id = crate::engine::io::ItemId::next();
        let mut record = ProgressRecord::pending(id);
        record.status = ConversionStatus::Processing;
        state.progress.insert(id, record);
        state.total_count = 1;
        assert_eq!(state.overall_status(), ConversionStatus::Processing);
    }
}
