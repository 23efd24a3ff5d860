//! Image processing in pure Rust.
//!
//! | Operation | Crate / function |
//! |---|---|
//! | **Identify** | `ImageReader::into_dimensions` |
//! | **Decode** | `image` crate, format sniffed from content |
//! | **Resize** | Lanczos3, fit-within, never upscaled |
//! | **Encode** | `image` crate encoders (JPEG/AVIF quality-aware) |
//!
//! The module is split into:
//! - **Calculations**: Pure functions for dimension math (unit testable)
//! - **Parameters**: Data structures describing image operations
//! - **Backend**: [`ImageBackend`] trait + [`RustBackend`]

pub mod backend;
mod calculations;
mod params;
pub mod rust_backend;

pub use backend::{BackendError, Dimensions, ImageBackend};
pub use calculations::fit_within;
pub use params::{
    ConversionOptions, InvalidQuality, ParseResizeError, Quality, Resize, TranscodeParams,
};
pub use rust_backend::RustBackend;
