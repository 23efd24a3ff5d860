//! Shared test utilities.
//!
//! Synthetic image writers for backend and pipeline tests, and zip readers
//! that return archive contents in entry order.
//!
//! # Usage
//!
//! ```rust,ignore
//! use crate::test_helpers::*;
//!
//! let tmp = TempDir::new().unwrap();
//! create_test_png(&tmp.path().join("a.png"), 64, 48);
//! write_corrupt_file(&tmp.path().join("b.png"));
//!
//! assert_eq!(zip_entry_names(&archive), vec!["a.jpg"]);
//! ```

use image::codecs::jpeg::JpegEncoder;
use image::{ImageBuffer, ImageFormat, LumaA, Rgb, RgbImage};
use std::fs::File;
use std::io::{BufWriter, Read};
use std::path::Path;

// =========================================================================
// Synthetic images
// =========================================================================

fn gradient(width: u32, height: u32) -> RgbImage {
    RgbImage::from_fn(width, height, |x, y| {
        Rgb([
            (x * 255 / width.max(1)) as u8,
            (y * 255 / height.max(1)) as u8,
            128,
        ])
    })
}

/// Write a PNG with a simple gradient.
pub fn create_test_png(path: &Path, width: u32, height: u32) {
    gradient(width, height)
        .save_with_format(path, ImageFormat::Png)
        .unwrap();
}

/// Write a JPEG, regardless of the extension `path` carries.
pub fn create_test_jpeg(path: &Path, width: u32, height: u32) {
    let mut out = BufWriter::new(File::create(path).unwrap());
    JpegEncoder::new_with_quality(&mut out, 90)
        .encode_image(&gradient(width, height))
        .unwrap();
}

/// Write an 8-bit gray+alpha PNG with a horizontal alpha ramp.
pub fn create_test_luma_alpha_png(path: &Path, width: u32, height: u32) {
    ImageBuffer::<LumaA<u8>, Vec<u8>>::from_fn(width, height, |x, y| {
        LumaA([(y * 255 / height.max(1)) as u8, (x * 255 / width.max(1)) as u8])
    })
    .save_with_format(path, ImageFormat::Png)
    .unwrap();
}

/// Write bytes that carry a PNG signature but cannot be decoded.
pub fn write_corrupt_file(path: &Path) {
    let mut bytes = b"\x89PNG\r\n\x1a\n".to_vec();
    bytes.extend_from_slice(b"definitely not an IHDR chunk");
    std::fs::write(path, bytes).unwrap();
}

// =========================================================================
// Archive inspection
// =========================================================================

/// Every entry of a zip archive as `(name, content)`, in archive order.
pub fn zip_entries(path: &Path) -> Vec<(String, Vec<u8>)> {
    let mut archive = zip::ZipArchive::new(File::open(path).unwrap()).unwrap();
    (0..archive.len())
        .map(|i| {
            let mut entry = archive.by_index(i).unwrap();
            let mut content = Vec::new();
            entry.read_to_end(&mut content).unwrap();
            (entry.name().to_string(), content)
        })
        .collect()
}

/// Entry names of a zip archive, in archive order.
pub fn zip_entry_names(path: &Path) -> Vec<String> {
    zip_entries(path).into_iter().map(|(name, _)| name).collect()
}
