//! Zip packaging of converted artifacts.
//!
//! [`ArchiveBuilder::build`] writes `<session>/<session>.zip` from a list of
//! artifact paths. Entries are written one after another in the given order,
//! each under its base file name; colliding base names are renamed
//! (`a.jpg`, `a-1.jpg`, ...) rather than overwritten or rejected.
//!
//! The archive is assembled in a temp file inside the session directory and
//! renamed over the previous archive only once it is complete, so rebuilding
//! replaces the old archive wholesale and a failed build leaves the previous
//! one untouched.

use crate::naming::NameAllocator;
use crate::session::{SessionFileStore, SessionId, StoreError};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("IO error writing archive {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("zip error writing archive {path}: {source}")]
    Zip {
        path: PathBuf,
        #[source]
        source: zip::result::ZipError,
    },
    #[error("artifact has no file name: {0}")]
    UnnamedArtifact(PathBuf),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// How entries are stored in the archive.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArchiveCompression {
    #[default]
    Deflated,
    Stored,
}

impl ArchiveCompression {
    fn method(self) -> CompressionMethod {
        match self {
            ArchiveCompression::Deflated => CompressionMethod::Deflated,
            ArchiveCompression::Stored => CompressionMethod::Stored,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ArchiveBuilder {
    store: SessionFileStore,
    compression: ArchiveCompression,
}

impl ArchiveBuilder {
    pub fn new(store: SessionFileStore, compression: ArchiveCompression) -> Self {
        Self { store, compression }
    }

    /// Package `artifacts` into the session's archive, replacing any previous
    /// one. Returns the archive path.
    pub fn build(&self, session: &SessionId, artifacts: &[PathBuf]) -> Result<PathBuf, ArchiveError> {
        let dir = self.store.root_for(session)?;
        let archive_path = self.store.archive_location(session);
        let io_err = |source: io::Error| ArchiveError::Io {
            path: archive_path.clone(),
            source,
        };
        let zip_err = |source: zip::result::ZipError| ArchiveError::Zip {
            path: archive_path.clone(),
            source,
        };

        let mut partial = tempfile::Builder::new()
            .prefix(".archive-")
            .suffix(".zip")
            .tempfile_in(&dir)
            .map_err(io_err)?;

        let options = SimpleFileOptions::default()
            .compression_method(self.compression.method())
            .unix_permissions(0o644);
        let mut names = NameAllocator::new();

        {
            let mut zip = ZipWriter::new(partial.as_file_mut());
            for artifact in artifacts {
                let base = entry_base_name(artifact)?;
                let entry = names.allocate(&base);
                if entry != base {
                    log::warn!("archive entry {base} already taken, storing as {entry}");
                }
                zip.start_file(entry.as_str(), options.clone())
                    .map_err(zip_err)?;
                let mut input = File::open(artifact).map_err(io_err)?;
                io::copy(&mut input, &mut zip).map_err(io_err)?;
            }
            zip.finish().map_err(zip_err)?;
        }

        partial.persist(&archive_path).map_err(|e| io_err(e.error))?;
        log::info!(
            "wrote archive {} ({} entries)",
            archive_path.display(),
            artifacts.len()
        );
        Ok(archive_path)
    }
}

fn entry_base_name(artifact: &Path) -> Result<String, ArchiveError> {
    artifact
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| ArchiveError::UnnamedArtifact(artifact.to_path_buf()))
}
