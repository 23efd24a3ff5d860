//! Pure Rust image processing backend with no system library dependencies.
//!
//! Everything is statically linked into the binary.
//!
//! ## Crate mapping
//!
//! | Operation | Crate / function |
//! |---|---|
//! | Decode (JPEG, PNG, TIFF, WebP, BMP, GIF) | `image::ImageReader` with content sniffing |
//! | Resize | `DynamicImage::resize` with `Lanczos3` filter |
//! | Encode → JPEG | `image::codecs::jpeg::JpegEncoder` (quality-aware) |
//! | Encode → AVIF | `image::codecs::avif::AvifEncoder` (rav1e, speed 6, quality-aware) |
//! | Encode → PNG, WebP, TIFF, BMP, GIF | `DynamicImage::write_to` |
//!
//! Decoding goes by file *content*, not extension, so a mislabelled upload
//! still converts and a corrupt one fails cleanly. Only pixels are carried
//! over: EXIF, ICC and other metadata blocks are never copied into the
//! re-encoded artifact.

use super::backend::{BackendError, Dimensions, ImageBackend};
use super::calculations::fit_within;
use super::params::{Quality, TranscodeParams};
use crate::format::ImageKind;
use image::codecs::avif::AvifEncoder;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, ImageReader};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Pure Rust backend using the `image` crate ecosystem.
///
/// See the [module docs](self) for the crate-to-operation mapping.
pub struct RustBackend;

impl RustBackend {
    pub fn new() -> Self {
        Self
    }
}

impl Default for RustBackend {
    fn default() -> Self {
        Self::new()
    }
}

/// Load and decode an image from disk. The file is opened read-only.
fn load_image(path: &Path) -> Result<DynamicImage, BackendError> {
    let decode_err = |reason: String| BackendError::Decode {
        path: path.display().to_string(),
        reason,
    };
    ImageReader::open(path)
        .map_err(BackendError::Io)?
        .with_guessed_format()
        .map_err(BackendError::Io)?
        .decode()
        .map_err(|e| decode_err(e.to_string()))
}

/// Shrink to fit the requested bounds, if any.
fn apply_resize(img: DynamicImage, params: &TranscodeParams) -> DynamicImage {
    let Some(resize) = params.resize else {
        return img;
    };
    let (w, h) = fit_within(
        (img.width(), img.height()),
        (resize.max_width, resize.max_height),
    );
    if (w, h) == (img.width(), img.height()) {
        img
    } else {
        img.resize_exact(w, h, FilterType::Lanczos3)
    }
}

/// Convert the pixel layout to one the target encoder accepts.
///
/// JPEG has no alpha channel; WebP, AVIF, GIF and BMP only take 8-bit input.
/// The TIFF encoder has no gray+alpha layouts, and neither PNG nor TIFF store
/// float samples, so those are widened or narrowed to 8/16-bit RGB(A).
fn prepare_for(img: DynamicImage, target: ImageKind) -> DynamicImage {
    match target {
        ImageKind::Jpeg => DynamicImage::ImageRgb8(img.to_rgb8()),
        ImageKind::Webp | ImageKind::Avif | ImageKind::Gif | ImageKind::Bmp => {
            if img.color().has_alpha() {
                DynamicImage::ImageRgba8(img.to_rgba8())
            } else {
                DynamicImage::ImageRgb8(img.to_rgb8())
            }
        }
        ImageKind::Tiff => match img {
            DynamicImage::ImageLumaA8(_) => DynamicImage::ImageRgba8(img.to_rgba8()),
            DynamicImage::ImageLumaA16(_) => DynamicImage::ImageRgba16(img.to_rgba16()),
            other => without_float_samples(other),
        },
        _ => without_float_samples(img),
    }
}

fn without_float_samples(img: DynamicImage) -> DynamicImage {
    match img {
        DynamicImage::ImageRgb32F(_) => DynamicImage::ImageRgb16(img.to_rgb16()),
        DynamicImage::ImageRgba32F(_) => DynamicImage::ImageRgba16(img.to_rgba16()),
        other => other,
    }
}

/// Encode `img` as `target` into `out`.
fn encode(
    img: &DynamicImage,
    target: ImageKind,
    quality: Quality,
    out: &mut File,
) -> Result<(), BackendError> {
    let encode_err = |e: image::ImageError| BackendError::Encode {
        target,
        reason: e.to_string(),
    };
    let mut writer = BufWriter::new(out);

    match target {
        ImageKind::Jpeg => {
            let encoder = JpegEncoder::new_with_quality(&mut writer, quality.as_u8());
            img.write_with_encoder(encoder).map_err(encode_err)?;
        }
        ImageKind::Avif => {
            let encoder = AvifEncoder::new_with_speed_quality(&mut writer, 6, quality.as_u8());
            img.write_with_encoder(encoder).map_err(encode_err)?;
        }
        other => {
            let format = other
                .image_format()
                .filter(|f| f.writing_enabled())
                .ok_or(BackendError::UnsupportedTarget(other))?;
            img.write_to(&mut writer, format).map_err(encode_err)?;
        }
    }

    writer.flush()?;
    Ok(())
}

impl ImageBackend for RustBackend {
    fn identify(&self, path: &Path) -> Result<Dimensions, BackendError> {
        let reader = ImageReader::open(path)?.with_guessed_format()?;
        let (width, height) = reader.into_dimensions().map_err(|e| BackendError::Decode {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Ok(Dimensions { width, height })
    }

    fn transcode(&self, params: &TranscodeParams, out: &mut File) -> Result<(), BackendError> {
        if !params.target.has_encoder() {
            return Err(BackendError::UnsupportedTarget(params.target));
        }
        let img = load_image(&params.source)?;
        let img = apply_resize(img, params);
        let img = prepare_for(img, params.target);
        encode(&img, params.target, params.quality, out)
    }
}
