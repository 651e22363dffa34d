// src/engine/scheduler.rs
//
// The batch scheduler: drives a set of source items through concurrent
// conversion, tracks per-item progress, and owns all batch state.
//
// Concurrency model: items are partitioned into sequential groups of the
// effective concurrency; a group's items run in parallel on the scheduler's
// pool, and the next group starts only after every task in the current one
// has settled. Cancellation is cooperative and checked at group boundaries
// only, so records never get stuck in Processing.
//
// Every state mutation goes through the single parking_lot mutex; task
// completions racing on the result list or the counters is impossible by
// construction.

use crate::engine::common::{epoch_millis, run_with_panic_policy};
use crate::engine::encoder::Encode;
use crate::engine::io::{ItemId, SourceItem};
use crate::engine::pool::{build_pool, effective_concurrency};
use crate::engine::state::{BatchState, ConversionResult, ConversionStatus};
use crate::error::{ImgBatchError, Result};
use crate::ops::{ConfigUpdate, ConversionConfig};
use parking_lot::Mutex;
use rayon::prelude::*;
use rayon::ThreadPool;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

/// Clears `is_processing` on every exit path out of a batch, including
/// unwinds.
struct ProcessingGuard {
    state: Arc<Mutex<BatchState>>,
}

impl Drop for ProcessingGuard {
    fn drop(&mut self) {
        self.state.lock().is_processing = false;
    }
}

/// Drives batches of image conversions through an [`Encode`] capability.
///
/// `start_batch` runs on the calling thread and returns when the batch has
/// settled. Callers that need a non-blocking start wrap the scheduler in an
/// `Arc` and spawn a thread; `cancel`, `remove_item`, `snapshot` and the
/// config operations are safe to call concurrently from other threads.
pub struct BatchScheduler<E: Encode> {
    encoder: E,
    state: Arc<Mutex<BatchState>>,
    options: Mutex<ConversionConfig>,
    cancelled: AtomicBool,
    pool: ThreadPool,
    concurrency: usize,
}

impl<E: Encode> BatchScheduler<E> {
    /// Create a scheduler. `max_concurrency` overrides the detected
    /// parallelism (it is still clamped to the engine's bounds); pass
    /// `None` for the platform default.
    pub fn new(encoder: E, max_concurrency: Option<usize>) -> Self {
        let concurrency = effective_concurrency(max_concurrency);
        Self {
            encoder,
            state: Arc::new(Mutex::new(BatchState::default())),
            options: Mutex::new(ConversionConfig::default()),
            cancelled: AtomicBool::new(false),
            pool: build_pool(concurrency),
            concurrency,
        }
    }

    /// Group size used for concurrent dispatch.
    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Convert a batch using the current live configuration.
    pub fn start_batch(&self, items: Vec<SourceItem>) -> Result<()> {
        let config = self.options.lock().clone();
        self.start_batch_with(items, config)
    }

    /// Convert a batch with an explicit configuration snapshot.
    ///
    /// Fails with [`ImgBatchError::BatchInProgress`] (leaving existing
    /// state untouched) when a batch is already running.
    pub fn start_batch_with(
        &self,
        items: Vec<SourceItem>,
        config: ConversionConfig,
    ) -> Result<()> {
        let config = config.normalized();
        {
            let mut state = self.state.lock();
            if state.is_processing {
                return Err(ImgBatchError::batch_in_progress());
            }
            state.begin(items.clone(), config.clone());
            self.cancelled.store(false, Ordering::SeqCst);
        }
        debug!(
            total = items.len(),
            concurrency = self.concurrency,
            format = %config.output_format,
            "batch started"
        );

        let _guard = ProcessingGuard {
            state: Arc::clone(&self.state),
        };

        for group in items.chunks(self.concurrency) {
            if self.cancelled.load(Ordering::SeqCst) {
                debug!("cancellation requested; no further groups dispatched");
                break;
            }
            self.pool.install(|| {
                group
                    .par_iter()
                    .for_each(|item| self.convert_one(item, &config));
            });
        }

        debug!("batch settled");
        Ok(())
    }

    /// Convenience path for converting one item through the same runner.
    pub fn convert_single(&self, item: SourceItem, config: ConversionConfig) -> Result<()> {
        self.start_batch_with(vec![item], config)
    }

    /// Request cooperative cancellation. The group currently in flight
    /// drains naturally; no further groups are dispatched.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        debug!("cancel requested");
    }

    /// Remove an item and any progress record or result it produced.
    ///
    /// Legal during an active batch: an in-flight task for the id is not
    /// aborted, but its eventual completion is discarded because the id is
    /// no longer tracked.
    pub fn remove_item(&self, id: ItemId) {
        self.state.lock().remove(id);
    }

    /// Reset items, results, progress and counters. Intended for the idle
    /// state; `is_processing` and the live configuration are untouched.
    pub fn clear_all(&self) {
        self.state.lock().reset();
    }

    /// Merge a partial update into the live configuration. Only batches
    /// started afterward observe the change.
    pub fn update_config(&self, update: ConfigUpdate) {
        self.options.lock().merge(update);
    }

    /// Current live configuration.
    pub fn config(&self) -> ConversionConfig {
        self.options.lock().clone()
    }

    /// Whether a batch is currently running (or draining after a cancel).
    pub fn is_processing(&self) -> bool {
        self.state.lock().is_processing
    }

    /// Read-only copy of the current batch state.
    pub fn snapshot(&self) -> BatchState {
        self.state.lock().clone()
    }

    // ------------------------------------------------------------------
    // Task runner
    // ------------------------------------------------------------------

    /// Convert one item: Processing -> encode -> Completed/Error. Panics in
    /// the encoder are converted into that item's error record.
    fn convert_one(&self, item: &SourceItem, config: &ConversionConfig) {
        if !self.mark_processing(item.id) {
            // Removed before its group started; nothing to do.
            return;
        }

        let start = Instant::now();
        let outcome = run_with_panic_policy("convert", || self.encoder.encode(item, config));
        let processing_ms = start.elapsed().as_secs_f64() * 1000.0;

        match outcome {
            Ok(encoded) => {
                let result =
                    ConversionResult::new(item, encoded, config.output_format, processing_ms);
                self.complete(item.id, result);
            }
            Err(err) => {
                warn!(id = %item.id, name = %item.name, error = %err, "conversion failed");
                self.fail(item.id, err.to_string());
            }
        }
    }

    /// Pending -> Processing. Returns false when the id is no longer
    /// tracked or the record already left Pending.
    fn mark_processing(&self, id: ItemId) -> bool {
        let mut state = self.state.lock();
        match state.progress.get_mut(&id) {
            Some(record) if record.status == ConversionStatus::Pending => {
                record.status = ConversionStatus::Processing;
                record.started_at = Some(epoch_millis());
                true
            }
            _ => false,
        }
    }

    /// Processing -> Completed plus result append and counter bump, all in
    /// one lock scope so concurrent sibling completions never lose updates.
    fn complete(&self, id: ItemId, result: ConversionResult) {
        let mut state = self.state.lock();
        match state.progress.get_mut(&id) {
            Some(record) if record.status == ConversionStatus::Processing => {
                record.status = ConversionStatus::Completed;
                record.progress = 100;
                record.finished_at = Some(epoch_millis());
                state.results.push(result);
                state.completed_count = state.results.len();
            }
            // Removed mid-flight: the result is dropped on the floor.
            _ => debug!(id = %id, "discarding result for untracked item"),
        }
    }

    /// Processing -> Error with the failure message.
    fn fail(&self, id: ItemId, message: String) {
        let mut state = self.state.lock();
        if let Some(record) = state.progress.get_mut(&id) {
            if record.status == ConversionStatus::Processing {
                record.status = ConversionStatus::Error;
                record.progress = 0;
                record.error = Some(message);
                record.finished_at = Some(epoch_millis());
            }
        }
    }
}
