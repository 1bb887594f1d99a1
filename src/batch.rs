//! Bulk import of existing image files into the upload queue.

use crate::constants::{
    LARGE_IMAGE_THRESHOLD_MIB, MAX_BATCH_FILES, MAX_BATCH_MEMORY_MIB, MAX_CONCURRENT_LARGE_IMAGES,
    MIN_AVAILABLE_MEMORY_MIB,
};
use crate::error::{CompressionError, ImportError, Result};
use crate::processing::{compress, load_image_file, CompressedImage};
use crate::profile::CompressionProfile;
use crate::queue::UploadQueue;
use crate::task::{derive_filename, TaskId, TaskMetadata};
use crate::utils::{calculate_compression_ratio, create_progress_bar, is_image_file};
use chrono::Utc;
use glob::glob;
use rayon::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use sysinfo::{MemoryRefreshKind, RefreshKind, System};
use walkdir::WalkDir;

#[derive(Debug, Clone)]
pub struct ImportOptions {
    pub profile: CompressionProfile,
    pub recursive: bool,
    /// Copied onto every imported task, next to `source_file`.
    pub metadata: TaskMetadata,
    pub quiet: bool,
}

#[derive(Debug, Default)]
pub struct ImportReport {
    pub enqueued: Vec<(PathBuf, TaskId)>,
    pub failed: Vec<(PathBuf, String)>,
    pub bytes_before: u64,
    pub bytes_after: u64,
}

impl ImportReport {
    pub fn compression_ratio(&self) -> f64 {
        calculate_compression_ratio(self.bytes_before, self.bytes_after)
    }
}

/// Estimates decoded memory for an image file without loading it.
fn estimate_image_memory_usage(file_path: &Path) -> Result<f64> {
    let metadata = fs::metadata(file_path)?;
    let file_size_mib = metadata.len() as f64 / (1024.0 * 1024.0);

    // Decoded size relative to file size, by container.
    let multiplier = match file_path.extension().and_then(|s| s.to_str()) {
        Some(ext) => match ext.to_lowercase().as_str() {
            "jpg" | "jpeg" => 4.0,
            "png" => 3.0,
            "webp" => 3.5,
            "bmp" | "tiff" => 1.2,
            "gif" => 2.0,
            _ => 3.0,
        },
        None => 3.0,
    };

    Ok(file_size_mib * multiplier)
}

/// Checks the batch against file-count, memory and host-memory limits.
///
/// # Returns
/// * `Ok((total_memory_mib, large_image_count))`
/// * `Err(CompressionError)` - If a limit would be exceeded
fn validate_batch_memory_limits(image_files: &[PathBuf]) -> Result<(f64, usize)> {
    if image_files.len() > MAX_BATCH_FILES {
        return Err(CompressionError::BatchFileLimitExceeded(
            image_files.len(),
            MAX_BATCH_FILES,
        ));
    }

    let mut total_memory_mib = 0.0;
    let mut large_image_count = 0;
    for file_path in image_files {
        let memory_estimate = estimate_image_memory_usage(file_path)?;
        total_memory_mib += memory_estimate;
        if memory_estimate > LARGE_IMAGE_THRESHOLD_MIB {
            large_image_count += 1;
        }
    }

    let total_memory_mib_u64 = total_memory_mib.ceil() as u64;
    if total_memory_mib_u64 > MAX_BATCH_MEMORY_MIB {
        return Err(CompressionError::BatchMemoryLimitExceeded(
            total_memory_mib_u64,
            MAX_BATCH_MEMORY_MIB,
        ));
    }

    let available_mem_mib = available_memory_mib();
    if total_memory_mib_u64 + MIN_AVAILABLE_MEMORY_MIB > available_mem_mib {
        return Err(CompressionError::InsufficientMemory(
            total_memory_mib_u64,
            available_mem_mib,
        ));
    }

    Ok((total_memory_mib, large_image_count))
}

fn available_memory_mib() -> u64 {
    let mut sys =
        System::new_with_specifics(RefreshKind::new().with_memory(MemoryRefreshKind::new()));
    sys.refresh_memory();
    sys.available_memory() / (1024 * 1024)
}

/// Worker count for a batch: bounded by cores, by large images and by how
/// many average-sized decodes fit in available memory.
fn plan_parallelism(
    total_files: usize,
    estimated_memory_mib: f64,
    large_image_count: usize,
    available_mem_mib: u64,
) -> usize {
    let baseline = rayon::current_num_threads().min(total_files).max(1);
    let large_cap = if large_image_count >= MAX_CONCURRENT_LARGE_IMAGES {
        MAX_CONCURRENT_LARGE_IMAGES
    } else {
        baseline
    };
    let avg_per_file_mib =
        ((estimated_memory_mib / total_files.max(1) as f64).ceil() as u64).max(1);
    let mem_cap = (available_mem_mib.saturating_sub(MIN_AVAILABLE_MEMORY_MIB) / avg_per_file_mib)
        .clamp(1, baseline as u64) as usize;
    large_cap.min(mem_cap).max(1)
}

/// Compresses every image under `input` and enqueues the results.
///
/// Files are compressed in parallel on a bounded rayon pool, then enqueued
/// one by one. A file that fails to load or compress is reported and
/// skipped; a queue failure aborts the import.
pub async fn import_images(
    queue: &UploadQueue,
    input: &str,
    options: &ImportOptions,
) -> std::result::Result<ImportReport, ImportError> {
    let image_files = collect_image_files(input, options.recursive)?;
    if image_files.is_empty() {
        return Err(CompressionError::NoImageFilesFound(input.to_string()).into());
    }

    let (estimated_memory_mib, large_image_count) = validate_batch_memory_limits(&image_files)?;
    let threads = plan_parallelism(
        image_files.len(),
        estimated_memory_mib,
        large_image_count,
        available_memory_mib(),
    );
    log::info!(
        "Importing {} image(s), ~{:.1} MiB decoded, {} large, {} worker(s)",
        image_files.len(),
        estimated_memory_mib,
        large_image_count,
        threads
    );

    let profile = options.profile;
    let quiet = options.quiet;
    let compressed = tokio::task::spawn_blocking(move || {
        compress_files(image_files, &profile, threads, large_image_count, quiet)
    })
    .await
    .map_err(|e| CompressionError::Worker(e.to_string()))??;

    let mut report = ImportReport::default();
    let started = Utc::now();
    for (index, (path, result)) in compressed.into_iter().enumerate() {
        let (original_size, image) = match result {
            Ok(ok) => ok,
            Err(e) => {
                log::warn!("Skipping {}: {}", path.display(), e);
                report.failed.push((path, e.to_string()));
                continue;
            }
        };

        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let filename = derive_filename(
            &stem,
            started + chrono::Duration::milliseconds(index as i64),
            image.format,
        );
        let mut metadata = options.metadata.clone();
        metadata.insert(
            "source_file".into(),
            path.file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
        );

        report.bytes_before += original_size;
        report.bytes_after += image.size_bytes;
        let task_id = queue.enqueue(image.blob, filename, metadata).await?;
        report.enqueued.push((path, task_id));
    }

    Ok(report)
}

type CompressedFile = (PathBuf, Result<(u64, CompressedImage)>);

fn compress_files(
    image_files: Vec<PathBuf>,
    profile: &CompressionProfile,
    threads: usize,
    large_image_count: usize,
    quiet: bool,
) -> Result<Vec<CompressedFile>> {
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build()
        .map_err(|e| CompressionError::Worker(e.to_string()))?;
    let progress = create_progress_bar(image_files.len() as u64, quiet);

    let compress_one = |path: &PathBuf| -> CompressedFile {
        let result = load_image_file(path).and_then(|raw| {
            let original_size = raw.len() as u64;
            compress(&raw, profile).map(|image| (original_size, image))
        });
        progress.inc(1);
        (path.clone(), result)
    };

    let results = pool.install(|| {
        if large_image_count > MAX_CONCURRENT_LARGE_IMAGES {
            // Many large images: bound peak memory by working in small chunks.
            image_files
                .chunks(MAX_CONCURRENT_LARGE_IMAGES.max(1))
                .flat_map(|chunk| chunk.par_iter().map(&compress_one).collect::<Vec<_>>())
                .collect()
        } else {
            image_files.par_iter().map(&compress_one).collect()
        }
    });

    progress.finish_and_clear();
    Ok(results)
}

/// Expands a file, directory or glob pattern into image file paths.
pub fn collect_image_files(input: &str, recursive: bool) -> Result<Vec<PathBuf>> {
    let mut image_files = Vec::new();

    let input_path = Path::new(input);
    let canonical_input = if input_path.exists() {
        input_path
            .canonicalize()
            .map_err(|_| CompressionError::NoImageFilesFound(input.to_string()))?
    } else {
        // Glob patterns are validated per match below.
        input_path.to_path_buf()
    };

    if canonical_input.is_file() {
        image_files.push(canonical_input);
    } else if canonical_input.is_dir() {
        let walker = if recursive {
            WalkDir::new(&canonical_input)
        } else {
            WalkDir::new(&canonical_input).max_depth(1)
        };

        for entry in walker
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !e.file_name().to_string_lossy().starts_with('.'))
        {
            let entry = entry?;
            let path = entry.path();
            if path.is_file() && is_image_file(path) {
                if let Ok(canonical_path) = path.canonicalize() {
                    image_files.push(canonical_path);
                }
            }
        }
    } else if let Ok(glob_pattern) = glob(input) {
        for entry in glob_pattern.flatten() {
            if entry.is_file() && is_image_file(&entry) {
                if let Ok(canonical_path) = entry.canonicalize() {
                    image_files.push(canonical_path);
                }
            }
        }
    } else {
        return Err(CompressionError::NoImageFilesFound(input.to_string()));
    }

    image_files.sort();
    Ok(image_files)
}
