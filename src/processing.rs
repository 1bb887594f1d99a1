use crate::constants::{
    LIBDEFLATER_HIGH_LEVEL, LIBDEFLATER_LOW_LEVEL, MAX_IMAGE_DIMENSION,
    PREVIEW_MAX_DIMENSION, PREVIEW_QUALITY, ZOPFLI_ITERATIONS,
};
use crate::error::{CompressionError, Result};
use crate::formats::TargetFormat;
use crate::profile::CompressionProfile;
use crate::utils::to_data_uri;
use crate::validation::validate_input_path;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, ExtendedColorType, GenericImageView, ImageFormat, RgbaImage};
use oxipng::{Deflaters, Options};
use std::fs;
use std::io::Cursor;
use std::num::NonZeroU8;
use std::path::Path;

/// Image data as it comes off the capture device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawImage {
    /// An encoded still (JPEG, PNG, ...) as produced by a camera or a file.
    Encoded(Vec<u8>),
    /// A decoded RGBA8 frame grabbed from a preview stream.
    Rgba {
        width: u32,
        height: u32,
        pixels: Vec<u8>,
    },
}

impl RawImage {
    pub fn len(&self) -> usize {
        match self {
            RawImage::Encoded(bytes) => bytes.len(),
            RawImage::Rgba { pixels, .. } => pixels.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Output of [`compress`]: the upload payload plus an optimistic preview.
#[derive(Debug, Clone)]
pub struct CompressedImage {
    pub blob: Vec<u8>,
    /// Small JPEG thumbnail as a `data:` URI, shown until the remote URL is known.
    pub preview_data_uri: String,
    pub size_bytes: u64,
    pub width: u32,
    pub height: u32,
    pub format: TargetFormat,
}

/// Compresses a captured image according to `profile`.
///
/// The longer edge is scaled down to `profile.max_dimension_px` (never up),
/// preserving aspect ratio, then encoded at the profile quality. All decoder
/// and encoder buffers are owned by this call and released when it returns.
///
/// # Returns
/// * `Ok(CompressedImage)` - Payload, preview and encoded size
/// * `Err(CompressionError)` - Empty, corrupt or oversized source, or an encoder failure
pub fn compress(raw: &RawImage, profile: &CompressionProfile) -> Result<CompressedImage> {
    if !profile.quality_factor.is_finite() || !(0.0..=1.0).contains(&profile.quality_factor) {
        return Err(CompressionError::InvalidQuality(profile.quality_factor));
    }

    let img = decode(raw)?;
    let img = resize_to_fit(img, profile.max_dimension_px);
    let blob = encode(&img, profile.target_format, profile.encoder_quality())?;
    let preview_data_uri = preview_data_uri(&img)?;

    Ok(CompressedImage {
        size_bytes: blob.len() as u64,
        width: img.width(),
        height: img.height(),
        format: profile.target_format,
        blob,
        preview_data_uri,
    })
}

/// Runs [`compress`] on the blocking pool so the caller's runtime stays responsive.
pub async fn compress_async(raw: RawImage, profile: CompressionProfile) -> Result<CompressedImage> {
    tokio::task::spawn_blocking(move || compress(&raw, &profile))
        .await
        .map_err(|e| CompressionError::Worker(e.to_string()))?
}

/// Decodes raw capture data, rejecting empty, corrupt and oversized sources.
pub fn decode(raw: &RawImage) -> Result<DynamicImage> {
    let img = match raw {
        RawImage::Encoded(bytes) => {
            if bytes.is_empty() {
                return Err(CompressionError::EmptySource);
            }
            image::load_from_memory(bytes)
                .map_err(|e| CompressionError::CorruptSource(e.to_string()))?
        }
        RawImage::Rgba {
            width,
            height,
            pixels,
        } => {
            if pixels.is_empty() || *width == 0 || *height == 0 {
                return Err(CompressionError::EmptySource);
            }
            let expected = u64::from(*width) * u64::from(*height) * 4;
            let buffer = RgbaImage::from_raw(*width, *height, pixels.clone()).ok_or_else(|| {
                CompressionError::CorruptSource(format!(
                    "expected {} bytes for a {}x{} RGBA frame, got {}",
                    expected,
                    width,
                    height,
                    pixels.len()
                ))
            })?;
            DynamicImage::ImageRgba8(buffer)
        }
    };

    let (width, height) = img.dimensions();
    if width == 0 || height == 0 {
        return Err(CompressionError::EmptySource);
    }
    if width > MAX_IMAGE_DIMENSION || height > MAX_IMAGE_DIMENSION {
        return Err(CompressionError::InvalidDimensions(
            width,
            height,
            MAX_IMAGE_DIMENSION,
        ));
    }

    Ok(img)
}

/// Scales the image so its longer edge is at most `max_dimension`. Smaller images are untouched.
pub fn resize_to_fit(img: DynamicImage, max_dimension: u32) -> DynamicImage {
    let (width, height) = img.dimensions();
    let longest = width.max(height);
    if max_dimension == 0 || longest <= max_dimension {
        return img;
    }

    let scale = f64::from(max_dimension) / f64::from(longest);
    let new_width = ((f64::from(width) * scale).round() as u32).clamp(1, max_dimension);
    let new_height = ((f64::from(height) * scale).round() as u32).clamp(1, max_dimension);
    log::debug!(
        "Resizing {}x{} -> {}x{}",
        width,
        height,
        new_width,
        new_height
    );
    img.resize_exact(new_width, new_height, FilterType::Triangle)
}

/// Encodes an image in the target format. `quality` is on the 1-100 scale.
pub fn encode(img: &DynamicImage, format: TargetFormat, quality: u8) -> Result<Vec<u8>> {
    let mut output = Vec::new();

    match format {
        TargetFormat::Jpeg => {
            let rgb = img.to_rgb8();
            let mut encoder = JpegEncoder::new_with_quality(&mut output, quality.clamp(1, 100));
            encoder.encode(rgb.as_raw(), rgb.width(), rgb.height(), ExtendedColorType::Rgb8)?;
        }
        TargetFormat::Png => {
            img.write_to(&mut Cursor::new(&mut output), ImageFormat::Png)?;
            output = optimize_png(&output, quality)?;
        }
        TargetFormat::WebP => {
            // The WebP encoder only accepts 8-bit RGB(A).
            let rgba = DynamicImage::ImageRgba8(img.to_rgba8());
            rgba.write_to(&mut Cursor::new(&mut output), ImageFormat::WebP)?;
        }
    }

    Ok(output)
}

fn optimize_png(data: &[u8], quality: u8) -> Result<Vec<u8>> {
    let mut options = Options::from_preset(2);
    options.deflate = if quality >= 90 {
        Deflaters::Zopfli {
            iterations: NonZeroU8::new(ZOPFLI_ITERATIONS).unwrap_or(NonZeroU8::MIN),
        }
    } else if quality >= 70 {
        Deflaters::Libdeflater {
            compression: LIBDEFLATER_HIGH_LEVEL,
        }
    } else {
        Deflaters::Libdeflater {
            compression: LIBDEFLATER_LOW_LEVEL,
        }
    };

    oxipng::optimize_from_memory(data, &options)
        .map_err(|e| CompressionError::PngOptimization(e.to_string()))
}

/// Thumbnail for optimistic UI, as a JPEG `data:` URI.
pub fn preview_data_uri(img: &DynamicImage) -> Result<String> {
    let (width, height) = img.dimensions();
    let bytes = if width.max(height) > PREVIEW_MAX_DIMENSION {
        let thumb = img.thumbnail(PREVIEW_MAX_DIMENSION, PREVIEW_MAX_DIMENSION);
        encode(&thumb, TargetFormat::Jpeg, PREVIEW_QUALITY)?
    } else {
        encode(img, TargetFormat::Jpeg, PREVIEW_QUALITY)?
    };
    Ok(to_data_uri(TargetFormat::Jpeg.mime_type(), &bytes))
}

/// Reads an image file from disk as raw capture data.
///
/// # Security
/// - Validates file existence before reading
/// - Enforces the maximum file size before loading the file into memory
pub fn load_image_file(path: &Path) -> Result<RawImage> {
    validate_input_path(path)?;
    Ok(RawImage::Encoded(fs::read(path)?))
}
