// src/engine/state.rs
//
// Batch state: per-item progress records, conversion results, and the
// aggregate root the scheduler owns. All mutation happens under the
// scheduler's lock; everything here is plain data.

use crate::engine::encoder::EncodedImage;
use crate::engine::io::{ItemId, SourceItem};
use crate::ops::{ConversionConfig, SupportedFormat};
use std::collections::HashMap;

/// Lifecycle of one item inside a batch.
///
/// Transitions are monotonic: Pending -> Processing -> (Completed | Error).
/// A terminal state is only left by a full batch reset.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ConversionStatus {
    Pending,
    Processing,
    Completed,
    Error,
}

/// Progress tracking for one item during an active or completed batch.
#[derive(Clone, Debug)]
pub struct ProgressRecord {
    pub id: ItemId,
    pub status: ConversionStatus,
    /// 0-100. Stays 0 until completion; errors reset it to 0.
    pub progress: u8,
    pub error: Option<String>,
    /// Epoch milliseconds when processing started.
    pub started_at: Option<u64>,
    /// Epoch milliseconds when the item settled.
    pub finished_at: Option<u64>,
}

impl ProgressRecord {
    pub fn pending(id: ItemId) -> Self {
        Self {
            id,
            status: ConversionStatus::Pending,
            progress: 0,
            error: None,
            started_at: None,
            finished_at: None,
        }
    }
}

/// Output of one successful per-item conversion. Never mutated.
#[derive(Clone, Debug)]
pub struct ConversionResult {
    /// The originating item, kept whole so exports can reach the
    /// original bytes.
    pub original: SourceItem,
    pub output: Vec<u8>,
    pub output_format: SupportedFormat,
    pub original_size: u64,
    pub converted_size: u64,
    /// `(original - converted) / original * 100`. Negative when the output
    /// grew; preserved as-is, never clamped.
    pub compression_ratio: f64,
    pub processing_ms: f64,
}

impl ConversionResult {
    pub fn new(
        item: &SourceItem,
        encoded: EncodedImage,
        output_format: SupportedFormat,
        processing_ms: f64,
    ) -> Self {
        let converted_size = encoded.bytes.len() as u64;
        let compression_ratio = compression_ratio(item.size, converted_size);
        Self {
            original: item.clone(),
            output: encoded.bytes,
            output_format,
            original_size: item.size,
            converted_size,
            compression_ratio,
            processing_ms,
        }
    }

    pub fn id(&self) -> ItemId {
        self.original.id
    }
}

/// Size reduction as a percentage of the original. 0 for empty originals
/// to keep the value finite.
pub fn compression_ratio(original_size: u64, converted_size: u64) -> f64 {
    if original_size == 0 {
        return 0.0;
    }
    (original_size as f64 - converted_size as f64) / original_size as f64 * 100.0
}

/// The full mutable state of one conversion run.
#[derive(Clone, Debug, Default)]
pub struct BatchState {
    pub items: Vec<SourceItem>,
    pub results: Vec<ConversionResult>,
    pub progress: HashMap<ItemId, ProgressRecord>,
    /// Configuration snapshot taken when the batch started.
    pub config: ConversionConfig,
    pub is_processing: bool,
    pub completed_count: usize,
    pub total_count: usize,
}

impl BatchState {
    /// Initialize for a new batch: item snapshot, empty results, one
    /// pending record per item.
    pub(crate) fn begin(&mut self, items: Vec<SourceItem>, config: ConversionConfig) {
        self.progress = items
            .iter()
            .map(|item| (item.id, ProgressRecord::pending(item.id)))
            .collect();
        self.total_count = items.len();
        self.completed_count = 0;
        self.results = Vec::new();
        self.items = items;
        self.config = config;
        self.is_processing = true;
    }

    /// Drop one item and everything derived from it. Counter updates only
    /// happen when the id was actually tracked.
    pub(crate) fn remove(&mut self, id: ItemId) {
        let had_item = self.items.iter().any(|item| item.id == id);
        let had_progress = self.progress.remove(&id).is_some();
        if !had_item && !had_progress {
            return;
        }
        self.items.retain(|item| item.id != id);
        self.results.retain(|result| result.id() != id);
        self.total_count = self.total_count.saturating_sub(1);
        self.completed_count = self.results.len();
    }

    /// Empty everything except `is_processing` and the live config.
    /// Intended for the idle state only.
    pub(crate) fn reset(&mut self) {
        self.items.clear();
        self.results.clear();
        self.progress.clear();
        self.completed_count = 0;
        self.total_count = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compression_ratio_exact_values() {
        assert_eq!(compression_ratio(1000, 600), 40.0);
        assert_eq!(compression_ratio(1000, 1200), -20.0);
        assert_eq!(compression_ratio(0, 500), 0.0);
    }

    #[test]
    fn pending_record_starts_clean() {
        let id = ItemId::next();
        let record = ProgressRecord::pending(id);
        assert_eq!(record.status, ConversionStatus::Pending);
        assert_eq!(record.progress, 0);
        assert!(record.error.is_none());
        assert!(record.started_at.is_none());
    }
}
