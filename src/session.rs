//! Session-scoped file storage.
//!
//! Every session owns one directory under a single storage root:
//!
//! ```text
//! <storage_root>/
//! └── abc123/
//!     ├── uploads/        # originals, as uploaded
//!     │   ├── a.png
//!     │   └── b.png
//!     ├── converted/      # artifacts of the latest conversions
//!     │   ├── a.jpg
//!     │   └── b.jpg
//!     └── abc123.zip      # archive of the latest conversion
//! ```
//!
//! The store is the only component that knows this layout. Directories are
//! created lazily and idempotently on first write. Nothing expires on its own:
//! [`SessionFileStore::cleanup`] and [`SessionFileStore::sweep`] are explicit
//! operations for an external retention policy to call.

use crate::naming::upload_file_name;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::{Duration, SystemTime};
use thiserror::Error;
use walkdir::WalkDir;

const UPLOADS_DIR: &str = "uploads";
const CONVERTED_DIR: &str = "converted";
const MAX_SESSION_ID_LEN: usize = 128;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("invalid session id '{0}': use 1-128 ASCII letters, digits, '-' or '_'")]
    InvalidSessionId(String),
    #[error("invalid upload file name '{0}'")]
    InvalidFileName(String),
}

/// Opaque session identifier, guaranteed to be a single safe path component.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SessionId(String);

impl SessionId {
    pub fn parse(raw: &str) -> Result<Self, StoreError> {
        let valid = !raw.is_empty()
            && raw.len() <= MAX_SESSION_ID_LEN
            && raw
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_');
        if valid {
            Ok(Self(raw.to_string()))
        } else {
            Err(StoreError::InvalidSessionId(raw.to_string()))
        }
    }

    /// A fresh server-side id (UUID v4).
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for SessionId {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for SessionId {
    type Error = StoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<SessionId> for String {
    fn from(id: SessionId) -> Self {
        id.0
    }
}

/// A file received from a client: the name it was sent under and its bytes.
#[derive(Debug, Clone)]
pub struct IncomingFile {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl IncomingFile {
    pub fn new(name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            bytes: bytes.into(),
        }
    }
}

/// Age-based retention rule used by [`SessionFileStore::sweep`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    /// Sessions with no file touched for longer than this are removed.
    pub max_age: Duration,
}

#[derive(Debug, Clone)]
pub struct SessionFileStore {
    root: PathBuf,
}

impl SessionFileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn storage_root(&self) -> &Path {
        &self.root
    }

    /// The session's directory, without touching the filesystem.
    pub fn session_dir(&self, id: &SessionId) -> PathBuf {
        self.root.join(id.as_str())
    }

    /// The session's directory, created if it does not exist yet.
    pub fn root_for(&self, id: &SessionId) -> Result<PathBuf, StoreError> {
        let dir = self.session_dir(id);
        fs::create_dir_all(&dir)?;
        Ok(dir)
    }

    pub fn uploads_dir(&self, id: &SessionId) -> PathBuf {
        self.session_dir(id).join(UPLOADS_DIR)
    }

    /// Directory for converted artifacts, created on demand.
    pub fn converted_dir(&self, id: &SessionId) -> Result<PathBuf, StoreError> {
        let dir = self.session_dir(id).join(CONVERTED_DIR);
        fs::create_dir_all(&dir)?;
        Ok(dir)
    }

    /// Where the session's archive lives (whether or not it exists yet).
    pub fn archive_location(&self, id: &SessionId) -> PathBuf {
        self.session_dir(id).join(format!("{id}.zip"))
    }

    /// The session's archive, if one has been built.
    pub fn archive_path(&self, id: &SessionId) -> Option<PathBuf> {
        let path = self.archive_location(id);
        path.is_file().then_some(path)
    }

    /// Delete the session's archive if present. Returns whether one existed.
    pub fn remove_archive(&self, id: &SessionId) -> Result<bool, StoreError> {
        match fs::remove_file(self.archive_location(id)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Persist uploaded files under the session, returning their stored paths
    /// in input order.
    ///
    /// Names are reduced to their base component. Uploading a name that
    /// already exists replaces the earlier file. Each file is written to a temp
    /// file first and renamed into place, so a failed upload never leaves a
    /// truncated source behind.
    pub fn save(
        &self,
        id: &SessionId,
        files: impl IntoIterator<Item = IncomingFile>,
    ) -> Result<Vec<PathBuf>, StoreError> {
        let files: Vec<IncomingFile> = files.into_iter().collect();
        let names = files
            .iter()
            .map(|f| upload_file_name(&f.name).ok_or_else(|| StoreError::InvalidFileName(f.name.clone())))
            .collect::<Result<Vec<_>, _>>()?;

        let uploads = self.uploads_dir(id);
        fs::create_dir_all(&uploads)?;

        let mut stored = Vec::with_capacity(files.len());
        for (file, name) in files.iter().zip(names) {
            let dest = uploads.join(&name);
            let mut partial = tempfile::Builder::new()
                .prefix(".upload-")
                .tempfile_in(&uploads)?;
            partial.write_all(&file.bytes)?;
            partial.persist(&dest).map_err(|e| e.error)?;
            log::debug!("stored upload {} for session {id}", dest.display());
            stored.push(dest);
        }
        Ok(stored)
    }

    /// Copy files from local paths into the session's uploads.
    pub fn save_paths(&self, id: &SessionId, paths: &[PathBuf]) -> Result<Vec<PathBuf>, StoreError> {
        let incoming = paths
            .iter()
            .map(|path| {
                let bytes = fs::read(path)?;
                let name = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                Ok(IncomingFile { name, bytes })
            })
            .collect::<Result<Vec<_>, StoreError>>()?;
        self.save(id, incoming)
    }

    /// Every uploaded file of the session, sorted by name.
    ///
    /// An unknown session resolves to an empty list.
    pub fn resolve_source_files(&self, id: &SessionId) -> Result<Vec<PathBuf>, StoreError> {
        let uploads = self.uploads_dir(id);
        let entries = match fs::read_dir(&uploads) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut files = Vec::new();
        for entry in entries {
            let entry = entry?;
            let hidden = entry.file_name().to_string_lossy().starts_with('.');
            if entry.file_type()?.is_file() && !hidden {
                files.push(entry.path());
            }
        }
        files.sort();
        Ok(files)
    }

    /// Ids of all sessions currently on disk, sorted.
    pub fn list_sessions(&self) -> Result<Vec<SessionId>, StoreError> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut ids = Vec::new();
        for entry in entries {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            // Foreign directories under the root are not sessions
            if let Ok(id) = SessionId::parse(&entry.file_name().to_string_lossy()) {
                ids.push(id);
            }
        }
        ids.sort();
        Ok(ids)
    }

    /// Remove a session and everything it owns. Returns whether it existed.
    pub fn cleanup(&self, id: &SessionId) -> Result<bool, StoreError> {
        match fs::remove_dir_all(self.session_dir(id)) {
            Ok(()) => {
                log::info!("removed session {id}");
                Ok(true)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Most recent modification time of anything inside the session.
    pub fn last_activity(&self, id: &SessionId) -> Result<Option<SystemTime>, StoreError> {
        let dir = self.session_dir(id);
        if !dir.exists() {
            return Ok(None);
        }
        let mut latest: Option<SystemTime> = None;
        for entry in WalkDir::new(&dir) {
            let entry = entry.map_err(io::Error::from)?;
            let modified = entry.metadata().map_err(io::Error::from)?.modified()?;
            latest = Some(latest.map_or(modified, |l| l.max(modified)));
        }
        Ok(latest)
    }

    /// Remove every session idle for longer than `policy.max_age`, as of `now`.
    /// Returns the removed ids.
    pub fn sweep_at(
        &self,
        policy: &RetentionPolicy,
        now: SystemTime,
    ) -> Result<Vec<SessionId>, StoreError> {
        let mut removed = Vec::new();
        for id in self.list_sessions()? {
            let Some(last) = self.last_activity(&id)? else {
                continue;
            };
            // Clock skew puts `last` in the future; treat as fresh
            let idle = now.duration_since(last).unwrap_or_default();
            if idle > policy.max_age && self.cleanup(&id)? {
                removed.push(id);
            }
        }
        Ok(removed)
    }

    pub fn sweep(&self, policy: &RetentionPolicy) -> Result<Vec<SessionId>, StoreError> {
        self.sweep_at(policy, SystemTime::now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn id(raw: &str) -> SessionId {
        SessionId::parse(raw).unwrap()
    }

    #[test]
    fn session_id_accepts_safe_identifiers() {
        assert!(SessionId::parse("abc123").is_ok());
        assert!(SessionId::parse("a-b_C-9").is_ok());
        assert!(SessionId::parse(&"x".repeat(128)).is_ok());
    }

    #[test]
    fn session_id_rejects_path_tricks() {
        for raw in ["", ".", "..", "a/b", "a\\b", "../etc", "with space", "é"] {
            assert!(
                matches!(SessionId::parse(raw), Err(StoreError::InvalidSessionId(_))),
                "{raw:?} should be rejected"
            );
        }
        assert!(SessionId::parse(&"x".repeat(129)).is_err());
    }

    #[test]
    fn generated_ids_are_valid_and_distinct() {
        let a = SessionId::generate();
        let b = SessionId::generate();
        assert_ne!(a, b);
        assert!(SessionId::parse(a.as_str()).is_ok());
    }

    #[test]
    fn session_id_serde_validates() {
        let ok: SessionId = serde_json::from_str("\"abc123\"").unwrap();
        assert_eq!(ok.as_str(), "abc123");
        assert!(serde_json::from_str::<SessionId>("\"../x\"").is_err());
    }

    #[test]
    fn unknown_session_resolves_to_empty_list() {
        let tmp = TempDir::new().unwrap();
        let store = SessionFileStore::new(tmp.path());
        assert!(store.resolve_source_files(&id("nobody")).unwrap().is_empty());
        assert!(!store.session_dir(&id("nobody")).exists());
    }

    #[test]
    fn root_for_is_idempotent() {
        let tmp = TempDir::new().unwrap();
        let store = SessionFileStore::new(tmp.path());
        let first = store.root_for(&id("abc")).unwrap();
        let second = store.root_for(&id("abc")).unwrap();
        assert_eq!(first, second);
        assert!(first.is_dir());
    }

    #[test]
    fn save_then_resolve_lists_uploads_sorted() {
        let tmp = TempDir::new().unwrap();
        let store = SessionFileStore::new(tmp.path());
        let session = id("abc123");

        let stored = store
            .save(
                &session,
                vec![
                    IncomingFile::new("b.png", b"bbb".to_vec()),
                    IncomingFile::new("a.png", b"aaa".to_vec()),
                ],
            )
            .unwrap();
        assert_eq!(stored[0].file_name().unwrap(), "b.png");
        assert_eq!(stored[1].file_name().unwrap(), "a.png");

        let resolved = store.resolve_source_files(&session).unwrap();
        let names: Vec<_> = resolved
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["a.png", "b.png"]);
    }

    #[test]
    fn subsequent_uploads_append_and_same_name_replaces() {
        let tmp = TempDir::new().unwrap();
        let store = SessionFileStore::new(tmp.path());
        let session = id("abc");

        store
            .save(&session, vec![IncomingFile::new("a.png", b"v1".to_vec())])
            .unwrap();
        store
            .save(
                &session,
                vec![
                    IncomingFile::new("a.png", b"v2".to_vec()),
                    IncomingFile::new("c.png", b"c".to_vec()),
                ],
            )
            .unwrap();

        let resolved = store.resolve_source_files(&session).unwrap();
        assert_eq!(resolved.len(), 2);
        assert_eq!(fs::read(&resolved[0]).unwrap(), b"v2");
    }

    #[test]
    fn save_strips_client_directories() {
        let tmp = TempDir::new().unwrap();
        let store = SessionFileStore::new(tmp.path());
        let session = id("abc");

        let stored = store
            .save(&session, vec![IncomingFile::new("../../evil.png", b"x".to_vec())])
            .unwrap();
        assert_eq!(stored[0], store.uploads_dir(&session).join("evil.png"));
    }

    #[test]
    fn save_rejects_unusable_names_before_writing() {
        let tmp = TempDir::new().unwrap();
        let store = SessionFileStore::new(tmp.path());
        let session = id("abc");

        let result = store.save(
            &session,
            vec![
                IncomingFile::new("ok.png", b"x".to_vec()),
                IncomingFile::new("..", b"x".to_vec()),
            ],
        );
        assert!(matches!(result, Err(StoreError::InvalidFileName(_))));
        assert!(store.resolve_source_files(&session).unwrap().is_empty());
    }

    #[test]
    fn save_paths_copies_local_files() {
        let tmp = TempDir::new().unwrap();
        let local = tmp.path().join("local.png");
        fs::write(&local, b"pixels").unwrap();
        let store = SessionFileStore::new(tmp.path().join("store"));
        let session = id("abc");

        store.save_paths(&session, &[local.clone()]).unwrap();
        let resolved = store.resolve_source_files(&session).unwrap();
        assert_eq!(fs::read(&resolved[0]).unwrap(), b"pixels");
        assert!(local.exists());
    }

    #[test]
    fn archive_location_is_named_after_session() {
        let tmp = TempDir::new().unwrap();
        let store = SessionFileStore::new(tmp.path());
        let session = id("abc123");
        assert_eq!(
            store.archive_location(&session),
            tmp.path().join("abc123").join("abc123.zip")
        );
        assert_eq!(store.archive_path(&session), None);
        assert!(!store.remove_archive(&session).unwrap());
    }

    #[test]
    fn cleanup_removes_session_and_is_idempotent() {
        let tmp = TempDir::new().unwrap();
        let store = SessionFileStore::new(tmp.path());
        let session = id("abc");
        store
            .save(&session, vec![IncomingFile::new("a.png", b"x".to_vec())])
            .unwrap();

        assert!(store.cleanup(&session).unwrap());
        assert!(!store.session_dir(&session).exists());
        assert!(!store.cleanup(&session).unwrap());
    }

    #[test]
    fn list_sessions_ignores_files_and_foreign_dirs() {
        let tmp = TempDir::new().unwrap();
        let store = SessionFileStore::new(tmp.path());
        store.root_for(&id("b")).unwrap();
        store.root_for(&id("a")).unwrap();
        fs::write(tmp.path().join("stray.txt"), b"x").unwrap();
        fs::create_dir(tmp.path().join("not a session")).unwrap();

        assert_eq!(store.list_sessions().unwrap(), vec![id("a"), id("b")]);
    }

    #[test]
    fn sweep_removes_only_idle_sessions() {
        let tmp = TempDir::new().unwrap();
        let store = SessionFileStore::new(tmp.path());
        store
            .save(&id("old"), vec![IncomingFile::new("a.png", b"x".to_vec())])
            .unwrap();

        let policy = RetentionPolicy {
            max_age: Duration::from_secs(3600),
        };

        // Nothing is idle yet
        assert!(store.sweep(&policy).unwrap().is_empty());

        // Two hours later the session is past its max age
        let later = SystemTime::now() + Duration::from_secs(7200);
        let removed = store.sweep_at(&policy, later).unwrap();
        assert_eq!(removed, vec![id("old")]);
        assert!(store.list_sessions().unwrap().is_empty());
    }

    #[test]
    fn sweep_on_missing_root_is_noop() {
        let tmp = TempDir::new().unwrap();
        let store = SessionFileStore::new(tmp.path().join("never-created"));
        let policy = RetentionPolicy {
            max_age: Duration::ZERO,
        };
        assert!(store.sweep(&policy).unwrap().is_empty());
    }
}
