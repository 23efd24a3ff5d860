//! Centralized file naming for uploads, artifacts and archive entries.
//!
//! Three places need to turn a path into a name:
//!
//! - **Uploads** keep only the base name the client sent (`../../etc/x.png`
//!   becomes `x.png`), see [`upload_file_name`].
//! - **Artifacts** swap the source extension for the target's canonical one
//!   (`a.png` → `a.jpg`), see [`artifact_file_name`].
//! - **Archive entries** use the artifact's base name.
//!
//! Artifacts and archive entries must be unique within one request. Two
//! sources can map to the same artifact name (`a.png` and `a.gif` both become
//! `a.jpg`), so names go through [`NameAllocator`], which renames collisions by
//! appending a counter before the extension:
//!
//! - `a.jpg` → `a.jpg`
//! - `a.jpg` → `a-1.jpg`
//! - `a.jpg` → `a-2.jpg`

use std::collections::HashSet;
use std::path::Path;

/// Reduce a client-supplied name to a safe single path component.
///
/// Returns `None` for names without a usable base component (`""`, `"."`,
/// `".."`, `"dir/"`) and for hidden names, which would clash with the
/// temp files used for atomic writes.
pub fn upload_file_name(name: &str) -> Option<String> {
    // Clients on Windows send backslash-separated paths
    let normalized = name.replace('\\', "/");
    let base = normalized.rsplit('/').next()?.trim();
    if base.is_empty() || base == "." || base == ".." || base.starts_with('.') {
        return None;
    }
    Some(base.to_string())
}

/// Name of the artifact produced from `source` with the given extension.
///
/// ```
/// # use batch_convert::naming::artifact_file_name;
/// # use std::path::Path;
/// assert_eq!(artifact_file_name(Path::new("/up/a.png"), "jpg"), "a.jpg");
/// assert_eq!(artifact_file_name(Path::new("photo.final.PNG"), "webp"), "photo.final.webp");
/// assert_eq!(artifact_file_name(Path::new("noext"), "png"), "noext.png");
/// ```
pub fn artifact_file_name(source: &Path, extension: &str) -> String {
    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "image".to_string());
    format!("{stem}.{extension}")
}

/// Hands out unique file names, renaming collisions with a numeric suffix.
#[derive(Debug, Default)]
pub struct NameAllocator {
    taken: HashSet<String>,
}

impl NameAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve `name`, or the first free `stem-N.ext` variant of it.
    pub fn allocate(&mut self, name: &str) -> String {
        if self.taken.insert(name.to_string()) {
            return name.to_string();
        }
        let (stem, ext) = match name.rsplit_once('.') {
            Some((stem, ext)) if !stem.is_empty() => (stem, Some(ext)),
            _ => (name, None),
        };
        let mut counter = 1;
        loop {
            let candidate = match ext {
                Some(ext) => format!("{stem}-{counter}.{ext}"),
                None => format!("{stem}-{counter}"),
            };
            if self.taken.insert(candidate.clone()) {
                return candidate;
            }
            counter += 1;
        }
    }
}
