// src/engine/io.rs
//
// I/O: the Source byte handle and the SourceItem queued for conversion.

use crate::error::{ImgBatchError, Result};
use crate::ops::SupportedFormat;
use memmap2::Mmap;
use std::fmt;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Image source bytes - in-memory data, a memory-mapped file, or a
/// path for lazy loading.
#[derive(Clone, Debug)]
pub enum Source {
    /// In-memory image data
    Memory(Arc<Vec<u8>>),
    /// Memory-mapped file (zero-copy access)
    Mapped(Arc<Mmap>),
    /// File path for lazy loading (data is read only when needed)
    Path(PathBuf),
}

impl Source {
    /// Load the actual bytes from the source.
    /// For Memory and Mapped sources this is cheap; Path sources hit the filesystem.
    pub fn load(&self) -> Result<Arc<Vec<u8>>> {
        match self {
            Source::Memory(data) => Ok(data.clone()),
            Source::Mapped(mmap) => Ok(Arc::new(mmap.as_ref().to_vec())),
            Source::Path(path) => {
                let data = std::fs::read(path).map_err(|e| {
                    ImgBatchError::file_read_failed(path.to_string_lossy().to_string(), e)
                })?;
                Ok(Arc::new(data))
            }
        }
    }

    /// Get the bytes directly - works for Memory and Mapped sources.
    /// Returns None for Path sources (which need to be loaded first).
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Source::Memory(data) => Some(data.as_slice()),
            Source::Mapped(mmap) => Some(mmap.as_ref()),
            Source::Path(_) => None,
        }
    }

    /// Length of the source data, 0 for unloaded Path sources.
    pub fn len(&self) -> usize {
        match self {
            Source::Memory(data) => data.len(),
            Source::Mapped(mmap) => mmap.len(),
            Source::Path(_) => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

static NEXT_ITEM_ID: AtomicU64 = AtomicU64::new(1);

/// Opaque identifier for a [`SourceItem`], stable for the item's lifetime.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ItemId(u64);

impl ItemId {
    /// Allocate the next unique id from a process-wide counter.
    pub fn next() -> Self {
        Self(NEXT_ITEM_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One validated image queued for conversion. Immutable once created.
#[derive(Clone, Debug)]
pub struct SourceItem {
    pub id: ItemId,
    /// Display name, usually the original file name.
    pub name: String,
    /// Byte size of the source data.
    pub size: u64,
    /// Detected input format.
    pub format: SupportedFormat,
    pub source: Source,
    /// Pixel dimensions when known (informational only).
    pub dimensions: Option<(u32, u32)>,
}

impl SourceItem {
    /// Build an item from in-memory bytes, detecting the format from the
    /// image header.
    pub fn from_bytes(name: impl Into<String>, bytes: Vec<u8>) -> Result<Self> {
        let format = detect_format(&bytes)?;
        let size = bytes.len() as u64;
        Ok(Self {
            id: ItemId::next(),
            name: name.into(),
            size,
            format,
            source: Source::Memory(Arc::new(bytes)),
            dimensions: None,
        })
    }

    /// Build an item from a file, memory-mapping it for zero-copy access.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ImgBatchError::file_not_found(path.to_string_lossy().to_string())
            } else {
                ImgBatchError::file_read_failed(path.to_string_lossy().to_string(), e)
            }
        })?;

        // Safety: the file must not be modified externally while mapped.
        // If it is, decoding may fail or produce corrupted output.
        let mmap = unsafe {
            Mmap::map(&file)
                .map_err(|e| ImgBatchError::mmap_failed(path.to_string_lossy().to_string(), e))?
        };
        let format = detect_format(&mmap)?;
        let size = mmap.len() as u64;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path.to_string_lossy().to_string());

        Ok(Self {
            id: ItemId::next(),
            name,
            size,
            format,
            source: Source::Mapped(Arc::new(mmap)),
            dimensions: None,
        })
    }

    pub fn with_dimensions(mut self, width: u32, height: u32) -> Self {
        self.dimensions = Some((width, height));
        self
    }
}

/// Detect the image format from magic bytes, rejecting anything outside
/// the supported set.
pub fn detect_format(bytes: &[u8]) -> Result<SupportedFormat> {
    let guessed = image::guess_format(bytes)
        .map_err(|e| ImgBatchError::decode_failed(format!("unrecognized image header: {e}")))?;
    SupportedFormat::from_image_format(guessed)
        .ok_or_else(|| ImgBatchError::unsupported_format(format!("{guessed:?}").to_lowercase()))
}
