/// Helpers shared by the capture, queue and reporting modules.
use crate::constants::{PROGRESS_BAR_TEMPLATE, SUPPORTED_IMAGE_EXTENSIONS, WALRUS_BLOB_PATH};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;

/// Check if a file path represents a supported image file
///
/// # Returns
/// * `true` if the file has a supported image extension, `false` otherwise
pub fn is_image_file(path: &Path) -> bool {
    path.extension()
        .and_then(|s| s.to_str())
        .map(|ext| {
            let ext_lower = ext.to_lowercase();
            SUPPORTED_IMAGE_EXTENSIONS.contains(&ext_lower.as_str())
        })
        .unwrap_or(false)
}

/// Create a progress bar with consistent styling. Hidden when `quiet` is set.
pub fn create_progress_bar(len: u64, quiet: bool) -> ProgressBar {
    if quiet {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new(len);
    if let Ok(style) = ProgressStyle::default_bar().template(PROGRESS_BAR_TEMPLATE) {
        pb.set_style(style.progress_chars("#>-"));
    }
    pb
}

/// Build a Walrus blob access URL from aggregator URL and blob ID
pub fn build_walrus_access_url(aggregator_url: &str, blob_id: &str) -> String {
    format!(
        "{}{}{}",
        aggregator_url.trim_end_matches('/'),
        WALRUS_BLOB_PATH,
        blob_id
    )
}

/// Encode bytes as a base64 `data:` URI.
pub fn to_data_uri(mime_type: &str, bytes: &[u8]) -> String {
    format!("data:{};base64,{}", mime_type, STANDARD.encode(bytes))
}

/// Format file size in human-readable format
///
/// # Returns
/// * Human-readable size string (e.g., "1.2 MB", "512 B")
pub fn format_file_size(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    const THRESHOLD: f64 = 1024.0;

    if bytes == 0 {
        return "0 B".to_string();
    }

    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= THRESHOLD && unit_index < UNITS.len() - 1 {
        size /= THRESHOLD;
        unit_index += 1;
    }

    if unit_index == 0 {
        format!("{} {}", bytes, UNITS[unit_index])
    } else {
        format!("{:.1} {}", size, UNITS[unit_index])
    }
}

/// Calculate compression ratio as a percentage
///
/// # Returns
/// * Compression ratio as percentage (positive means reduction, negative means increase)
pub fn calculate_compression_ratio(original_size: u64, compressed_size: u64) -> f64 {
    if original_size == 0 {
        return 0.0;
    }
    ((original_size as f64 - compressed_size as f64) / original_size as f64) * 100.0
}
