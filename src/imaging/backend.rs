//! Image processing backend trait and shared types.
//!
//! The [`ImageBackend`] trait is the codec boundary: everything on the other
//! side of it is pixel work (decode, resample, encode). Strategies and the
//! orchestrator only ever talk to this trait, so tests can swap in a recording
//! mock and exercise the pipeline without encoding real images.
//!
//! The production implementation is
//! [`RustBackend`](super::rust_backend::RustBackend), pure Rust and built on the
//! `image` crate.

use super::params::TranscodeParams;
use crate::format::ImageKind;
use std::fs::File;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to decode {path}: {reason}")]
    Decode { path: String, reason: String },
    #[error("Failed to encode {target}: {reason}")]
    Encode { target: ImageKind, reason: String },
    #[error("No encoder for {0}")]
    UnsupportedTarget(ImageKind),
}

/// Result of an identify operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

/// Trait for image processing backends.
///
/// `transcode` writes the encoded image into `out`, which the caller owns.
/// Backends never choose output paths themselves; that is how strategies keep
/// partially-written files away from the final artifact location.
pub trait ImageBackend: Send + Sync {
    /// Get image dimensions.
    fn identify(&self, path: &Path) -> Result<Dimensions, BackendError>;

    /// Decode `params.source`, apply the requested resize and encode it as
    /// `params.target` into `out`.
    fn transcode(&self, params: &TranscodeParams, out: &mut File) -> Result<(), BackendError>;
}
