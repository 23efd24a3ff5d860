//! Image format identifiers.
//!
//! [`ImageKind`] is the closed set of formats the converter knows about. It is
//! used both as the *target* of a conversion (looked up in the
//! [`StrategyRegistry`](crate::registry::StrategyRegistry)) and as the
//! *declared source* of a request, which is checked against the sniffed
//! header of each upload.
//!
//! | Kind | Canonical extension | Accepted identifiers | Encoder |
//! |------|---------------------|----------------------|---------|
//! | PNG  | `png`  | `png` | yes |
//! | JPEG | `jpg`  | `jpeg`, `jpg` | yes |
//! | WebP | `webp` | `webp` | yes (lossless) |
//! | TIFF | `tiff` | `tiff`, `tif` | yes |
//! | BMP  | `bmp`  | `bmp` | yes |
//! | GIF  | `gif`  | `gif` | yes |
//! | AVIF | `avif` | `avif` | yes (encode only) |
//! | HEIC | `heic` | `heic`, `heif` | no |
//!
//! HEIC is recognised so that requests for it fail with a typed
//! [`UnsupportedFormat`] instead of a parse error: there is no pure-Rust HEIC
//! encoder in the stack.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::Read;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

/// The requested format has no registered strategy, or is not a format
/// identifier at all.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unsupported format: {0}")]
pub struct UnsupportedFormat(pub String);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageKind {
    Png,
    #[serde(alias = "jpg")]
    Jpeg,
    Webp,
    #[serde(alias = "tif")]
    Tiff,
    Bmp,
    Gif,
    Avif,
    #[serde(alias = "heif")]
    Heic,
}

impl ImageKind {
    pub const COUNT: usize = 8;

    pub const ALL: [ImageKind; Self::COUNT] = [
        ImageKind::Png,
        ImageKind::Jpeg,
        ImageKind::Webp,
        ImageKind::Tiff,
        ImageKind::Bmp,
        ImageKind::Gif,
        ImageKind::Avif,
        ImageKind::Heic,
    ];

    /// Dense index used by the registry's slot table.
    pub fn index(self) -> usize {
        self as usize
    }

    /// Extension given to converted artifacts.
    pub fn extension(self) -> &'static str {
        match self {
            ImageKind::Png => "png",
            ImageKind::Jpeg => "jpg",
            ImageKind::Webp => "webp",
            ImageKind::Tiff => "tiff",
            ImageKind::Bmp => "bmp",
            ImageKind::Gif => "gif",
            ImageKind::Avif => "avif",
            ImageKind::Heic => "heic",
        }
    }

    pub fn mime_type(self) -> &'static str {
        match self {
            ImageKind::Png => "image/png",
            ImageKind::Jpeg => "image/jpeg",
            ImageKind::Webp => "image/webp",
            ImageKind::Tiff => "image/tiff",
            ImageKind::Bmp => "image/bmp",
            ImageKind::Gif => "image/gif",
            ImageKind::Avif => "image/avif",
            ImageKind::Heic => "image/heic",
        }
    }

    /// The `image` crate format backing this kind, if the codec is compiled in.
    pub fn image_format(self) -> Option<image::ImageFormat> {
        match self {
            ImageKind::Png => Some(image::ImageFormat::Png),
            ImageKind::Jpeg => Some(image::ImageFormat::Jpeg),
            ImageKind::Webp => Some(image::ImageFormat::WebP),
            ImageKind::Tiff => Some(image::ImageFormat::Tiff),
            ImageKind::Bmp => Some(image::ImageFormat::Bmp),
            ImageKind::Gif => Some(image::ImageFormat::Gif),
            ImageKind::Avif => Some(image::ImageFormat::Avif),
            ImageKind::Heic => None,
        }
    }

    /// Whether the pure-Rust stack can write this format.
    pub fn has_encoder(self) -> bool {
        self.image_format().is_some_and(|f| f.writing_enabled())
    }

    fn from_image_format(format: image::ImageFormat) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.image_format() == Some(format))
    }

    /// Identify a format from the leading bytes of a file.
    ///
    /// ISO-BMFF containers are checked by `ftyp` brands first so HEIC files are
    /// told apart from AVIF; everything else goes through `image::guess_format`.
    /// Both families share the generic `mif1`/`msf1` brands, so an AVIF brand
    /// anywhere in the list wins over them.
    pub fn sniff(header: &[u8]) -> Option<Self> {
        if header.len() >= 12 && &header[4..8] == b"ftyp" {
            let brands = ftyp_brands(header);
            if brands.iter().any(|&b| matches!(b, b"avif" | b"avis")) {
                return Some(ImageKind::Avif);
            }
            if brands.iter().any(|&b| {
                matches!(
                    b,
                    b"heic" | b"heix" | b"hevc" | b"hevx" | b"heim" | b"heis" | b"mif1" | b"msf1"
                )
            }) {
                return Some(ImageKind::Heic);
            }
        }
        image::guess_format(header)
            .ok()
            .and_then(Self::from_image_format)
    }

    /// Read the first bytes of `path` and [`sniff`](Self::sniff) them.
    pub fn sniff_file(path: &Path) -> std::io::Result<Option<Self>> {
        let mut header = Vec::with_capacity(64);
        std::fs::File::open(path)?
            .take(64)
            .read_to_end(&mut header)?;
        Ok(Self::sniff(&header))
    }
}

/// Major brand followed by the compatible brands of a leading `ftyp` box,
/// limited to what `header` holds.
fn ftyp_brands(header: &[u8]) -> Vec<&[u8]> {
    let declared = u32::from_be_bytes([header[0], header[1], header[2], header[3]]) as usize;
    // Sizes 0 and 1 mean "to end of file" and "64-bit size follows".
    let end = if declared < 16 {
        header.len()
    } else {
        declared.min(header.len())
    };
    let mut brands = vec![&header[8..12]];
    if end > 16 {
        brands.extend(header[16..end].chunks_exact(4));
    }
    brands
}

impl fmt::Display for ImageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ImageKind::Png => "png",
            ImageKind::Jpeg => "jpeg",
            ImageKind::Webp => "webp",
            ImageKind::Tiff => "tiff",
            ImageKind::Bmp => "bmp",
            ImageKind::Gif => "gif",
            ImageKind::Avif => "avif",
            ImageKind::Heic => "heic",
        };
        f.write_str(name)
    }
}

impl FromStr for ImageKind {
    type Err = UnsupportedFormat;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "png" => Ok(ImageKind::Png),
            "jpeg" | "jpg" => Ok(ImageKind::Jpeg),
            "webp" => Ok(ImageKind::Webp),
            "tiff" | "tif" => Ok(ImageKind::Tiff),
            "bmp" => Ok(ImageKind::Bmp),
            "gif" => Ok(ImageKind::Gif),
            "avif" => Ok(ImageKind::Avif),
            "heic" | "heif" => Ok(ImageKind::Heic),
            _ => Err(UnsupportedFormat(s.to_string())),
        }
    }
}
