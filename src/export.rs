// src/export.rs
//
// Bulk export pipeline. Converted results leave the engine one of two
// ways: delivered file by file through a DeliverySink, or bundled into a
// single deflate ZIP archive. Archive construction is all-or-nothing; a
// failure mid-build discards the partial archive and the sink never sees
// it.

use crate::engine::state::ConversionResult;
use crate::engine::stats;
use crate::error::{ImgBatchError, Result};
use crate::ops::SupportedFormat;
use std::io::{Cursor, Write};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, warn};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Deflate level used for archive entries.
pub const DEFAULT_COMPRESSION_LEVEL: i64 = 6;

/// Pause between individual deliveries so downstream consumers are not
/// flooded.
pub const DEFAULT_DELIVERY_DELAY: Duration = Duration::from_millis(200);

/// Fraction of deflate applied to raw image bytes, used when estimating
/// archive sizes up front.
const ZIP_SIZE_FACTOR: f64 = 0.85;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExportMode {
    /// Deliver each result as its own file, paced by the delivery delay.
    Individual,
    /// Bundle every result into one ZIP archive.
    Archive,
}

#[derive(Clone, Debug)]
pub struct ExportOptions {
    pub mode: ExportMode,
    /// Archive filename override. Defaults to a timestamped name.
    pub filename: Option<String>,
    /// Also pack the original bytes of each item, prefixed `original_`.
    pub include_original: bool,
    pub compression_level: i64,
    pub delivery_delay: Duration,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            mode: ExportMode::Archive,
            filename: None,
            include_original: false,
            compression_level: DEFAULT_COMPRESSION_LEVEL,
            delivery_delay: DEFAULT_DELIVERY_DELAY,
        }
    }
}

/// Destination for exported files.
pub trait DeliverySink {
    fn deliver(&mut self, filename: &str, bytes: &[u8]) -> Result<()>;
}

/// Sink that writes each delivered file into a directory. Writes go
/// through a temp file in the same directory and are persisted atomically.
pub struct DirectorySink {
    dir: PathBuf,
}

impl DirectorySink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl DeliverySink for DirectorySink {
    fn deliver(&mut self, filename: &str, bytes: &[u8]) -> Result<()> {
        let target = self.dir.join(filename);
        let display = target.to_string_lossy().to_string();
        let mut tmp = tempfile::NamedTempFile::new_in(&self.dir)
            .map_err(|e| ImgBatchError::file_write_failed(display.clone(), e))?;
        tmp.write_all(bytes)
            .map_err(|e| ImgBatchError::file_write_failed(display.clone(), e))?;
        tmp.as_file()
            .sync_all()
            .map_err(|e| ImgBatchError::file_write_failed(display.clone(), e))?;
        tmp.persist(&target)
            .map_err(|e| ImgBatchError::file_write_failed(display, e.error))?;
        Ok(())
    }
}

/// Archive builder behind the export pipeline. Entries are staged with
/// `add_entry`; `finalize` produces the archive bytes and reports build
/// progress as a 0..=100 percentage.
pub trait Archiver {
    fn add_entry(&mut self, name: &str, bytes: Vec<u8>);
    fn finalize(
        self: Box<Self>,
        compression_level: i64,
        on_progress: &mut dyn FnMut(u8),
    ) -> Result<Vec<u8>>;
}

/// Deflate ZIP archiver.
#[derive(Default)]
pub struct ZipArchiver {
    entries: Vec<(String, Vec<u8>)>,
}

impl ZipArchiver {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Archiver for ZipArchiver {
    fn add_entry(&mut self, name: &str, bytes: Vec<u8>) {
        self.entries.push((name.to_string(), bytes));
    }

    fn finalize(
        self: Box<Self>,
        compression_level: i64,
        on_progress: &mut dyn FnMut(u8),
    ) -> Result<Vec<u8>> {
        let total = self.entries.len();
        let options = SimpleFileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .compression_level(Some(compression_level));

        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        for (index, (name, bytes)) in self.entries.into_iter().enumerate() {
            writer
                .start_file(&name, options)
                .map_err(|e| ImgBatchError::archive_failed(e.to_string()))?;
            writer
                .write_all(&bytes)
                .map_err(|e| ImgBatchError::archive_failed(e.to_string()))?;
            on_progress(((index + 1) as f64 / total as f64 * 100.0).round() as u8);
        }

        let cursor = writer
            .finish()
            .map_err(|e| ImgBatchError::archive_failed(e.to_string()))?;
        Ok(cursor.into_inner())
    }
}

/// Export results through `sink` according to `options`.
///
/// `on_progress` receives `(done, total)` pairs. In individual mode they
/// count delivered files; in archive mode `total` is fixed at 100 and
/// `done` is a percentage, split evenly between entry staging and
/// compression.
pub fn export_all(
    results: &[ConversionResult],
    options: &ExportOptions,
    sink: &mut dyn DeliverySink,
    on_progress: &mut dyn FnMut(u64, u64),
) -> Result<()> {
    export_all_with(results, options, sink, Box::new(ZipArchiver::new()), on_progress)
}

/// `export_all` with an injected archive builder.
pub fn export_all_with(
    results: &[ConversionResult],
    options: &ExportOptions,
    sink: &mut dyn DeliverySink,
    archiver: Box<dyn Archiver>,
    on_progress: &mut dyn FnMut(u64, u64),
) -> Result<()> {
    if results.is_empty() {
        return Err(ImgBatchError::nothing_to_export());
    }
    match options.mode {
        ExportMode::Individual => export_individual(results, options, sink, on_progress),
        ExportMode::Archive => export_archive(results, options, sink, archiver, on_progress),
    }
}

fn export_individual(
    results: &[ConversionResult],
    options: &ExportOptions,
    sink: &mut dyn DeliverySink,
    on_progress: &mut dyn FnMut(u64, u64),
) -> Result<()> {
    let total = results.len() as u64;
    for (index, result) in results.iter().enumerate() {
        let filename =
            sanitize_filename(&download_filename(&result.original.name, result.output_format));
        sink.deliver(&filename, &result.output)?;
        on_progress(index as u64 + 1, total);
        if index + 1 < results.len() && !options.delivery_delay.is_zero() {
            std::thread::sleep(options.delivery_delay);
        }
    }
    debug!(total, "individual export finished");
    Ok(())
}

fn export_archive(
    results: &[ConversionResult],
    options: &ExportOptions,
    sink: &mut dyn DeliverySink,
    mut archiver: Box<dyn Archiver>,
    on_progress: &mut dyn FnMut(u64, u64),
) -> Result<()> {
    let per_result = if options.include_original { 2 } else { 1 };
    let total_entries = results.len() * per_result;
    let mut staged = 0usize;

    // First half of the progress range covers entry staging.
    for result in results {
        let name =
            sanitize_filename(&download_filename(&result.original.name, result.output_format));
        archiver.add_entry(&name, result.output.clone());
        staged += 1;
        on_progress((staged as f64 / total_entries as f64 * 50.0).round() as u64, 100);

        if options.include_original {
            match result.original.source.load() {
                Ok(bytes) => {
                    let original_name =
                        format!("original_{}", sanitize_filename(&result.original.name));
                    archiver.add_entry(&original_name, bytes.as_ref().clone());
                }
                Err(err) => {
                    warn!(name = %result.original.name, error = %err,
                        "skipping original entry; source no longer readable");
                }
            }
            staged += 1;
            on_progress((staged as f64 / total_entries as f64 * 50.0).round() as u64, 100);
        }
    }

    // Second half covers compression.
    let archive = archiver.finalize(options.compression_level, &mut |pct| {
        on_progress(50 + (f64::from(pct) * 0.5).round() as u64, 100);
    })?;

    let filename = options
        .filename
        .clone()
        .unwrap_or_else(|| format!("converted_images_{}.zip", crate::engine::common::epoch_millis()));
    sink.deliver(&filename, &archive)?;
    debug!(entries = total_entries, bytes = archive.len(), "archive export finished");
    Ok(())
}

/// Replace filesystem-hostile characters and whitespace with underscores,
/// collapsing runs and trimming the ends.
pub fn sanitize_filename(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut last_was_underscore = false;
    for ch in name.chars() {
        let collapse = matches!(ch, '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' | '_')
            || ch.is_whitespace();
        if collapse {
            if !last_was_underscore {
                out.push('_');
                last_was_underscore = true;
            }
        } else {
            out.push(ch);
            last_was_underscore = false;
        }
    }
    out.trim_matches('_').to_string()
}

/// Derive the delivered filename: the stem plus `_converted` plus the
/// output format's extension.
pub fn download_filename(original_name: &str, format: SupportedFormat) -> String {
    let stem = match original_name.rfind('.') {
        // A leading dot is a hidden-file prefix, not an extension.
        Some(i) if i > 0 => &original_name[..i],
        _ => original_name,
    };
    format!("{stem}_converted{}", format.extension())
}

/// Rough pre-compression estimate of the archive size for `results`.
/// Counts the original bytes as well when they would be packed alongside.
pub fn estimate_zip_size(results: &[ConversionResult], include_original: bool) -> u64 {
    let raw: u64 = results
        .iter()
        .map(|r| {
            if include_original {
                r.converted_size + r.original_size
            } else {
                r.converted_size
            }
        })
        .sum();
    (raw as f64 * ZIP_SIZE_FACTOR).round() as u64
}

/// Human-readable size with binary units.
pub fn format_file_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["Bytes", "KB", "MB", "GB"];
    if bytes == 0 {
        return "0 Bytes".to_string();
    }
    let exponent = ((bytes as f64).ln() / 1024f64.ln()).floor() as usize;
    let exponent = exponent.min(UNITS.len() - 1);
    let value = bytes as f64 / 1024f64.powi(exponent as i32);
    let rounded = (value * 100.0).round() / 100.0;
    // Trailing zeros are dropped so whole numbers read cleanly.
    let mut text = format!("{rounded:.2}");
    while text.ends_with('0') {
        text.pop();
    }
    if text.ends_with('.') {
        text.pop();
    }
    format!("{text} {}", UNITS[exponent])
}

/// Plain-text summary of a finished export, suitable for logging or a
/// report file alongside the archive.
pub fn export_report(results: &[ConversionResult]) -> String {
    let stats = stats::statistics(results);
    let mut report = String::new();
    report.push_str("Conversion Report\n");
    report.push_str("=================\n\n");
    report.push_str(&format!("Files converted: {}\n", stats.total_files));
    report.push_str(&format!(
        "Total original size: {}\n",
        format_file_size(stats.total_original_size)
    ));
    report.push_str(&format!(
        "Total converted size: {}\n",
        format_file_size(stats.total_converted_size)
    ));
    let savings = if stats.total_savings >= 0 {
        format_file_size(stats.total_savings as u64)
    } else {
        format!("-{}", format_file_size(stats.total_savings.unsigned_abs()))
    };
    report.push_str(&format!("Space saved: {savings}\n"));
    report.push_str(&format!(
        "Average compression: {:.1}%\n\n",
        stats.average_compression_ratio
    ));
    for result in results {
        report.push_str(&format!(
            "{} -> {} ({} -> {}, {:.1}%)\n",
            result.original.name,
            download_filename(&result.original.name, result.output_format),
            format_file_size(result.original_size),
            format_file_size(result.converted_size),
            result.compression_ratio
        ));
    }
    report
}
