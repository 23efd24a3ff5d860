//! # batch-convert
//!
//! Session-scoped batch image conversion. Clients upload images into a
//! session, ask for them to be converted to a target format, and download a
//! single zip archive holding every artifact that converted successfully.
//!
//! # Architecture
//!
//! ```text
//! upload     files        →  <root>/<session>/uploads/
//! convert    uploads      →  <root>/<session>/converted/   (one artifact per file, in parallel)
//! archive    artifacts    →  <root>/<session>/<session>.zip
//! download   archive      →  client
//! ```
//!
//! A request is dispatched by target format to a [`strategy::FormatStrategy`]
//! looked up in the [`registry::StrategyRegistry`]. The
//! [`orchestrator::ConversionOrchestrator`] resolves the strategy, fans the
//! files out over a bounded worker pool, collects one outcome per file and
//! hands the successes to the [`archive::ArchiveBuilder`].
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`format`] | Supported image formats, name parsing, header sniffing |
//! | [`imaging`] | Pure-Rust decode/resize/encode behind the `ImageBackend` trait |
//! | [`strategy`] | Per-format conversion of one file, atomically written |
//! | [`registry`] | Fixed target-format → strategy table |
//! | [`session`] | Session ids and the on-disk session layout |
//! | [`naming`] | Upload name sanitizing and collision-free artifact names |
//! | [`archive`] | Zip packaging of a session's artifacts |
//! | [`orchestrator`] | Request validation, parallel fan-out, partial-failure reporting |
//! | [`config`] | `config.toml` loading, merging over stock defaults, validation |
//! | [`output`] | CLI output formatting |
//!
//! # Design Decisions
//!
//! ## Partial Success
//!
//! One bad file never sinks a batch. Every requested file gets an outcome,
//! the archive holds whatever converted, and the report names each failure
//! together with its source. A request only fails as a whole when the
//! target format is unsupported, the archive cannot be written, or nothing
//! converted.
//!
//! ## Write Then Rename
//!
//! Uploads, artifacts and archives are all written to a temp file beside
//! their destination and renamed into place. Readers never observe a
//! half-written file, and a failed write leaves the previous file intact.
//!
//! ## Pure-Rust Imaging
//!
//! Decoding and encoding use the `image` crate only, so the binary has no
//! system library dependencies. HEIC uploads are recognized by their header
//! but cannot be decoded or produced.

pub mod archive;
pub mod config;
pub mod format;
pub mod imaging;
pub mod naming;
pub mod orchestrator;
pub mod output;
pub mod registry;
pub mod session;
pub mod strategy;

#[cfg(test)]
pub(crate) mod test_helpers;
