//! Parameter types for image operations.
//!
//! These structs describe *what* to do, not *how* to do it. They are the
//! interface between a [`FormatStrategy`](crate::strategy::FormatStrategy)
//! (which decides which file becomes what) and the
//! [`backend`](super::backend) (which does the actual pixel work).
//!
//! ## Types
//!
//! - [`Quality`]: Lossy encoding quality (1–100, default 90). Clamped on construction.
//! - [`Resize`]: Bounding box an image is shrunk to fit into.
//! - [`ConversionOptions`]: Per-request knobs shared by every file in a batch.
//! - [`TranscodeParams`]: Full specification for one decode → re-encode.

use crate::format::ImageKind;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;

/// Quality setting for lossy image encoding, always within 1-100.
///
/// Deserializing rejects out-of-range values instead of clamping them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct Quality(u32);

impl Quality {
    pub const MIN: u32 = 1;
    pub const MAX: u32 = 100;

    pub fn new(value: u32) -> Self {
        Self(value.clamp(Self::MIN, Self::MAX))
    }

    pub fn value(self) -> u32 {
        self.0
    }

    /// The value as the `u8` the JPEG and AVIF encoders take.
    pub fn as_u8(self) -> u8 {
        u8::try_from(self.0).unwrap_or(u8::MAX)
    }
}

impl Default for Quality {
    fn default() -> Self {
        Self(90)
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
#[error("invalid quality {0}: expected 1-100")]
pub struct InvalidQuality(pub u32);

impl TryFrom<u32> for Quality {
    type Error = InvalidQuality;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        if (Self::MIN..=Self::MAX).contains(&value) {
            Ok(Self(value))
        } else {
            Err(InvalidQuality(value))
        }
    }
}

impl From<Quality> for u32 {
    fn from(quality: Quality) -> Self {
        quality.0
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
#[error("invalid resize '{0}': expected WIDTHxHEIGHT with non-zero values")]
pub struct ParseResizeError(String);

/// Maximum output dimensions. The image keeps its aspect ratio and is never
/// upscaled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resize {
    pub max_width: u32,
    pub max_height: u32,
}

impl FromStr for Resize {
    type Err = ParseResizeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseResizeError(s.to_string());
        let (w, h) = s
            .trim()
            .split_once(['x', 'X'])
            .ok_or_else(err)?;
        let max_width: u32 = w.trim().parse().map_err(|_| err())?;
        let max_height: u32 = h.trim().parse().map_err(|_| err())?;
        if max_width == 0 || max_height == 0 {
            return Err(err());
        }
        Ok(Self {
            max_width,
            max_height,
        })
    }
}

impl fmt::Display for Resize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.max_width, self.max_height)
    }
}

/// Options applied to every file of a conversion request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionOptions {
    pub quality: Quality,
    pub resize: Option<Resize>,
}

/// Parameters for a single transcode: decode `source`, optionally shrink,
/// encode as `target`.
#[derive(Debug, Clone, PartialEq)]
pub struct TranscodeParams {
    pub source: PathBuf,
    pub target: ImageKind,
    pub quality: Quality,
    pub resize: Option<Resize>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quality_clamps_to_valid_range() {
        assert_eq!(Quality::new(0).value(), 1);
        assert_eq!(Quality::new(50).value(), 50);
        assert_eq!(Quality::new(150).value(), 100);
    }

    #[test]
    fn quality_deserialize_rejects_out_of_range() {
        assert_eq!(serde_json::from_str::<Quality>("75").unwrap().value(), 75);
        assert!(serde_json::from_str::<Quality>("0").is_err());
        assert!(serde_json::from_str::<Quality>("300").is_err());

        let options: Result<ConversionOptions, _> =
            serde_json::from_str(r#"{"quality": 300, "resize": null}"#);
        assert!(options.is_err());
    }

    #[test]
    fn quality_serializes_as_plain_number() {
        assert_eq!(serde_json::to_string(&Quality::new(42)).unwrap(), "42");
        assert_eq!(Quality::new(100).as_u8(), 100);
        assert_eq!(Quality::new(1).as_u8(), 1);
    }

    #[test]
    fn quality_reaches_encoders_without_wrapping() {
        assert_eq!(Quality::new(100).as_u8(), 100);
        assert_eq!(Quality::new(300).as_u8(), 100);
        assert_eq!(Quality::new(0).as_u8(), 1);
    }

    #[test]
    fn quality_default_is_90() {
        assert_eq!(Quality::default().value(), 90);
    }

    #[test]
    fn resize_parses_width_by_height() {
        let r: Resize = "800x600".parse().unwrap();
        assert_eq!(
            r,
            Resize {
                max_width: 800,
                max_height: 600
            }
        );
        assert_eq!("1024X768".parse::<Resize>().unwrap().max_height, 768);
        assert_eq!(r.to_string(), "800x600");
    }

    #[test]
    fn resize_rejects_malformed_input() {
        assert!("800".parse::<Resize>().is_err());
        assert!("0x600".parse::<Resize>().is_err());
        assert!("axb".parse::<Resize>().is_err());
        assert!("800x".parse::<Resize>().is_err());
    }
}
