//! CLI output formatting.
//!
//! Output leads with what happened to each file, with paths shown as
//! indented context lines.
//!
//! # Output Format
//!
//! ## Upload
//!
//! ```text
//! Session abc123
//! 001 a.png
//!     Stored: uploads/abc123/uploads/a.png
//! ```
//!
//! ## Convert
//!
//! ```text
//! Converting 2 files to jpeg (session abc123)
//!     001 a.png → a.jpg
//!     002 b.png: failed
//!         Reason: conversion of .../b.png failed: ...
//! Archive: uploads/abc123/abc123.zip (1 file)
//!
//! Converted 1 of 2 files
//! ```
//!
//! ## List
//!
//! ```text
//! Session abc123
//! 001 a.png (png, 640x480, 12.3 KB)
//! 002 notes.txt (unrecognized, 120 B)
//! Archive: uploads/abc123/abc123.zip
//! ```
//!
//! # Architecture
//!
//! Each command has a `format_*` function (returns `Vec<String>`) for
//! testability and a `print_*` wrapper that writes to stdout. Format functions
//! are pure: no I/O, no side effects.

use crate::format::ImageKind;
use crate::imaging::Dimensions;
use crate::orchestrator::{ConversionEvent, ConversionReport, OutcomeStatus};
use crate::registry::StrategyRegistry;
use crate::session::SessionId;
use std::path::{Path, PathBuf};

// ============================================================================
// Shared helpers
// ============================================================================

/// Format a 1-based positional index as 3-digit zero-padded.
fn format_index(pos: usize) -> String {
    format!("{:0>3}", pos)
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|f| f.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn plural(n: usize, word: &str) -> String {
    if n == 1 {
        format!("{n} {word}")
    } else {
        format!("{n} {word}s")
    }
}

/// Human-readable byte size.
///
/// ```text
/// 512 B
/// 12.3 KB
/// 4.0 MB
/// ```
fn format_size(bytes: u64) -> String {
    const KB: f64 = 1024.0;
    const MB: f64 = KB * 1024.0;
    let b = bytes as f64;
    if b < KB {
        format!("{bytes} B")
    } else if b < MB {
        format!("{:.1} KB", b / KB)
    } else {
        format!("{:.1} MB", b / MB)
    }
}

// ============================================================================
// Upload
// ============================================================================

pub fn format_upload(session: &SessionId, stored: &[PathBuf]) -> Vec<String> {
    let mut lines = vec![format!("Session {session}")];
    for (i, path) in stored.iter().enumerate() {
        lines.push(format!("{} {}", format_index(i + 1), file_name(path)));
        lines.push(format!("    Stored: {}", path.display()));
    }
    lines
}

pub fn print_upload(session: &SessionId, stored: &[PathBuf]) {
    for line in format_upload(session, stored) {
        println!("{}", line);
    }
}

// ============================================================================
// Convert
// ============================================================================

/// Format a single conversion progress event as display lines.
pub fn format_event(event: &ConversionEvent) -> Vec<String> {
    match event {
        ConversionEvent::BatchStarted {
            session_id,
            target,
            file_count,
        } => vec![format!(
            "Converting {} to {target} (session {session_id})",
            plural(*file_count, "file")
        )],
        ConversionEvent::FileConverted {
            index,
            source,
            artifact,
        } => vec![format!(
            "    {} {} \u{2192} {}",
            format_index(index + 1),
            source.display(),
            file_name(artifact)
        )],
        ConversionEvent::FileFailed {
            index,
            source,
            reason,
        } => vec![
            format!(
                "    {} {}: failed",
                format_index(index + 1),
                source.display()
            ),
            format!("        Reason: {reason}"),
        ],
        ConversionEvent::ArchiveWritten { path, entries } => vec![format!(
            "Archive: {} ({})",
            path.display(),
            plural(*entries, "file")
        )],
    }
}

/// Summary printed once the request completes.
pub fn format_report(report: &ConversionReport) -> Vec<String> {
    let total = report.outcomes.len();
    if total == 0 {
        return vec![format!("Nothing to convert in session {}", report.session_id)];
    }
    let converted = report.converted().count();
    let mut lines = vec![
        String::new(),
        format!("Converted {converted} of {}", plural(total, "file")),
    ];
    let failures: Vec<_> = report.failures().collect();
    if !failures.is_empty() {
        lines.push("Failed:".to_string());
        for outcome in failures {
            if let OutcomeStatus::Failed { reason, .. } = &outcome.status {
                lines.push(format!("    {}: {reason}", outcome.source.display()));
            }
        }
    }
    lines
}

pub fn print_report(report: &ConversionReport) {
    for line in format_report(report) {
        println!("{}", line);
    }
}

// ============================================================================
// Formats
// ============================================================================

/// Every known format with its extension, MIME type and availability.
pub fn format_formats(registry: &StrategyRegistry) -> Vec<String> {
    let mut lines = vec!["Formats".to_string()];
    for kind in ImageKind::ALL {
        let status = if registry.supports(kind) {
            ""
        } else if kind.has_encoder() {
            " (disabled)"
        } else {
            " (source only)"
        };
        lines.push(format!(
            "    {:<5} .{:<5} {}{}",
            kind.to_string(),
            kind.extension(),
            kind.mime_type(),
            status
        ));
    }
    lines
}

pub fn print_formats(registry: &StrategyRegistry) {
    for line in format_formats(registry) {
        println!("{}", line);
    }
}

// ============================================================================
// List
// ============================================================================

/// What `list` knows about one uploaded file.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadEntry {
    pub path: PathBuf,
    pub size: u64,
    pub kind: Option<ImageKind>,
    pub dimensions: Option<Dimensions>,
}

pub fn format_session_files(
    session: &SessionId,
    uploads: &[UploadEntry],
    archive: Option<&Path>,
) -> Vec<String> {
    let mut lines = vec![format!("Session {session}")];
    if uploads.is_empty() {
        lines.push("    (no uploads)".to_string());
    }
    for (i, entry) in uploads.iter().enumerate() {
        let mut details = vec![
            entry
                .kind
                .map(|k| k.to_string())
                .unwrap_or_else(|| "unrecognized".to_string()),
        ];
        if let Some(d) = entry.dimensions {
            details.push(format!("{}x{}", d.width, d.height));
        }
        details.push(format_size(entry.size));
        lines.push(format!(
            "{} {} ({})",
            format_index(i + 1),
            file_name(&entry.path),
            details.join(", ")
        ));
    }
    match archive {
        Some(path) => lines.push(format!("Archive: {}", path.display())),
        None => lines.push("Archive: none".to_string()),
    }
    lines
}

pub fn print_session_files(session: &SessionId, uploads: &[UploadEntry], archive: Option<&Path>) {
    for line in format_session_files(session, uploads, archive) {
        println!("{}", line);
    }
}

// ============================================================================
// Retention
// ============================================================================

pub fn format_sweep(removed: &[SessionId]) -> Vec<String> {
    let mut lines = vec![format!("Removed {}", plural(removed.len(), "session"))];
    lines.extend(removed.iter().map(|id| format!("    {id}")));
    lines
}

pub fn print_sweep(removed: &[SessionId]) {
    for line in format_sweep(removed) {
        println!("{}", line);
    }
}
