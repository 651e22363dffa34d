// src/engine.rs
//
// Conversion engine facade. The submodules split the engine into the
// capabilities a batch run needs: sources and ids (io), the codec layer
// (encoder), batch bookkeeping (state), aggregation (stats), thread-pool
// sizing (pool) and the scheduler that ties them together.

pub(crate) mod common;
pub mod encoder;
pub mod io;
pub mod pool;
pub mod scheduler;
pub mod state;
pub mod stats;

/// Largest accepted width or height for a decoded image.
pub const MAX_DIMENSION: u32 = 32768;

/// Largest accepted pixel count (width * height) for a decoded image.
pub const MAX_PIXELS: u64 = 100_000_000;

pub use encoder::{CodecEncoder, Encode, EncodedImage};
pub use io::{detect_format, ItemId, Source, SourceItem};
pub use pool::{effective_concurrency, MAX_GROUP_CONCURRENCY, MIN_GROUP_CONCURRENCY};
pub use scheduler::BatchScheduler;
pub use state::{
    compression_ratio, BatchState, ConversionResult, ConversionStatus, ProgressRecord,
};
pub use stats::{statistics, BatchStatistics, StatusCounts};
