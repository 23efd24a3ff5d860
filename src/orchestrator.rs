//! Batch conversion: fan out per file, fan in, archive.
//!
//! [`ConversionOrchestrator::convert`] is the single entry point an outer
//! layer (CLI, HTTP handler) calls. For a [`ConversionRequest`] it:
//!
//! 1. resolves the target's strategy, failing fast with
//!    [`ConvertError::UnsupportedFormat`] before touching storage;
//! 2. matches every requested file against the session's uploads, turning
//!    unknown references into per-file `source_not_found` outcomes;
//! 3. checks the declared source format, if any, against each file's header;
//! 4. plans one distinct artifact path per file under `converted/`;
//! 5. runs all conversions on a bounded rayon pool and waits for every one;
//! 6. builds the session archive from the successes.
//!
//! ## Partial failure
//!
//! Per-file problems never abort the batch. The [`ConversionReport`] lists an
//! outcome for every requested file, in request order, so each failure stays
//! attributable to its source. Besides an unsupported target, the whole
//! request fails only when the archive cannot be written or when nothing
//! converted at all. In the latter case any stale archive for the session is
//! removed so it cannot be downloaded by mistake.
//!
//! An empty file list is not an error: no strategy runs, no archive is
//! produced and any archive left by an earlier request is removed.
//!
//! ## Progress
//!
//! With [`with_events`](ConversionOrchestrator::with_events) set, a
//! [`ConversionEvent`] goes out for every file as soon as its outcome is
//! known, from whichever worker finished it. Per-file events therefore arrive
//! in completion order; their `index` ties each one back to the request.

use crate::archive::{ArchiveBuilder, ArchiveError};
use crate::config::{AppConfig, effective_threads};
use crate::format::{ImageKind, UnsupportedFormat};
use crate::imaging::{ConversionOptions, RustBackend};
use crate::naming::{NameAllocator, artifact_file_name};
use crate::registry::StrategyRegistry;
use crate::session::{SessionFileStore, SessionId, StoreError};
use crate::strategy::{ConversionJob, StrategyError};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::mpsc::Sender;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConvertError {
    #[error(transparent)]
    UnsupportedFormat(#[from] UnsupportedFormat),
    #[error("storage error: {0}")]
    Storage(#[from] StoreError),
    #[error("archive write failed: {0}")]
    ArchiveWriteFailure(#[from] ArchiveError),
    #[error("none of the {} requested files could be converted", .failures.len())]
    NothingConverted { failures: Vec<FileOutcome> },
    #[error("could not start worker pool: {0}")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),
}

/// A conversion request. Built once, never modified after dispatch.
#[derive(Debug, Clone)]
pub struct ConversionRequest {
    pub session_id: SessionId,
    /// Files to convert: upload names (`a.png`) or paths inside the session's
    /// uploads directory.
    pub files: Vec<PathBuf>,
    /// When set, every source must actually be of this format.
    pub source_format: Option<ImageKind>,
    pub target: ImageKind,
    pub options: ConversionOptions,
}

impl ConversionRequest {
    pub fn new(session_id: SessionId, files: Vec<PathBuf>, target: ImageKind) -> Self {
        Self {
            session_id,
            files,
            source_format: None,
            target,
            options: ConversionOptions::default(),
        }
    }

    pub fn with_source_format(mut self, source: ImageKind) -> Self {
        self.source_format = Some(source);
        self
    }

    pub fn with_options(mut self, options: ConversionOptions) -> Self {
        self.options = options;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    SourceNotFound,
    ConversionFailure,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum OutcomeStatus {
    Converted { artifact: PathBuf },
    Failed { kind: FailureKind, reason: String },
}

/// What happened to one requested file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileOutcome {
    /// The reference exactly as it appeared in the request.
    pub source: PathBuf,
    #[serde(flatten)]
    pub status: OutcomeStatus,
}

impl FileOutcome {
    fn converted(source: PathBuf, artifact: PathBuf) -> Self {
        Self {
            source,
            status: OutcomeStatus::Converted { artifact },
        }
    }

    fn failed(source: PathBuf, kind: FailureKind, reason: impl Into<String>) -> Self {
        Self {
            source,
            status: OutcomeStatus::Failed {
                kind,
                reason: reason.into(),
            },
        }
    }

    pub fn artifact(&self) -> Option<&Path> {
        match &self.status {
            OutcomeStatus::Converted { artifact } => Some(artifact),
            OutcomeStatus::Failed { .. } => None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.artifact().is_some()
    }
}

/// Result of a conversion request.
#[derive(Debug, Clone, Serialize)]
pub struct ConversionReport {
    pub session_id: SessionId,
    pub target: ImageKind,
    /// `None` when the request had no files.
    pub archive: Option<PathBuf>,
    /// One entry per requested file, in request order.
    pub outcomes: Vec<FileOutcome>,
}

impl ConversionReport {
    pub fn converted(&self) -> impl Iterator<Item = &FileOutcome> {
        self.outcomes.iter().filter(|o| o.is_success())
    }

    pub fn failures(&self) -> impl Iterator<Item = &FileOutcome> {
        self.outcomes.iter().filter(|o| !o.is_success())
    }

    pub fn is_complete(&self) -> bool {
        self.outcomes.iter().all(FileOutcome::is_success)
    }
}

/// Progress notifications. `BatchStarted` comes first and `ArchiveWritten`
/// last; per-file events arrive as each file finishes.
#[derive(Debug, Clone, PartialEq)]
pub enum ConversionEvent {
    BatchStarted {
        session_id: SessionId,
        target: ImageKind,
        file_count: usize,
    },
    FileConverted {
        index: usize,
        source: PathBuf,
        artifact: PathBuf,
    },
    FileFailed {
        index: usize,
        source: PathBuf,
        reason: String,
    },
    ArchiveWritten {
        path: PathBuf,
        entries: usize,
    },
}

pub struct ConversionOrchestrator {
    registry: StrategyRegistry,
    store: SessionFileStore,
    archiver: ArchiveBuilder,
    pool: rayon::ThreadPool,
    events: Option<Sender<ConversionEvent>>,
}

impl ConversionOrchestrator {
    /// `workers` bounds how many files convert at the same time.
    pub fn new(
        registry: StrategyRegistry,
        store: SessionFileStore,
        archiver: ArchiveBuilder,
        workers: usize,
    ) -> Result<Self, ConvertError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers.max(1))
            .thread_name(|i| format!("convert-{i}"))
            .build()?;
        Ok(Self {
            registry,
            store,
            archiver,
            pool,
            events: None,
        })
    }

    /// Wire up the standard backend, storage and archive settings from config.
    pub fn from_config(config: &AppConfig) -> Result<Self, ConvertError> {
        let store = SessionFileStore::new(&config.storage_root);
        let registry =
            StrategyRegistry::with_backend(Arc::new(RustBackend::new()), &config.formats.enabled);
        let archiver = ArchiveBuilder::new(store.clone(), config.output.compression);
        Self::new(
            registry,
            store,
            archiver,
            effective_threads(&config.processing),
        )
    }

    /// Send progress events to `tx` from now on.
    pub fn with_events(mut self, tx: Sender<ConversionEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    pub fn registry(&self) -> &StrategyRegistry {
        &self.registry
    }

    pub fn store(&self) -> &SessionFileStore {
        &self.store
    }

    fn emit(&self, event: ConversionEvent) {
        if let Some(tx) = &self.events {
            // A dropped receiver only means nobody is listening
            let _ = tx.send(event);
        }
    }

    pub fn convert(&self, request: &ConversionRequest) -> Result<ConversionReport, ConvertError> {
        let strategy = self.registry.get(request.target)?;
        let session = &request.session_id;

        if request.files.is_empty() {
            log::info!("session {session}: nothing to convert");
            if self.store.remove_archive(session)? {
                log::info!("session {session}: removed stale archive");
            }
            return Ok(ConversionReport {
                session_id: session.clone(),
                target: request.target,
                archive: None,
                outcomes: Vec::new(),
            });
        }

        log::info!(
            "session {session}: converting {} files to {}",
            request.files.len(),
            request.target
        );
        self.emit(ConversionEvent::BatchStarted {
            session_id: session.clone(),
            target: request.target,
            file_count: request.files.len(),
        });

        let uploads = self.store.resolve_source_files(session)?;
        let converted_dir = self.store.converted_dir(session)?;

        let mut slots: Vec<Option<FileOutcome>> = vec![None; request.files.len()];
        let mut jobs = Vec::new();
        let mut job_slots = Vec::new();
        let mut names = NameAllocator::new();

        for (index, reference) in request.files.iter().enumerate() {
            let Some(source) = resolve_reference(reference, &uploads) else {
                let outcome = FileOutcome::failed(
                    reference.clone(),
                    FailureKind::SourceNotFound,
                    format!("{} is not part of session {session}", reference.display()),
                );
                self.notify(session, index, &outcome);
                slots[index] = Some(outcome);
                continue;
            };

            if let Some(expected) = request.source_format
                && let Err(reason) = check_source_format(&source, expected)
            {
                let outcome =
                    FileOutcome::failed(reference.clone(), FailureKind::ConversionFailure, reason);
                self.notify(session, index, &outcome);
                slots[index] = Some(outcome);
                continue;
            }

            let name = names.allocate(&artifact_file_name(&source, strategy.extension()));
            jobs.push(ConversionJob {
                source,
                output: converted_dir.join(name),
            });
            job_slots.push(index);
        }

        let on_done = |job: usize, result: &Result<PathBuf, StrategyError>| {
            let index = job_slots[job];
            self.notify(session, index, &job_outcome(&request.files[index], result));
        };
        let results = self
            .pool
            .install(|| strategy.convert_all_with(&jobs, &request.options, &on_done));

        for (&index, result) in job_slots.iter().zip(&results) {
            slots[index] = Some(job_outcome(&request.files[index], result));
        }

        let outcomes: Vec<FileOutcome> = slots.into_iter().flatten().collect();

        let artifacts: Vec<PathBuf> = outcomes
            .iter()
            .filter_map(|o| o.artifact().map(Path::to_path_buf))
            .collect();

        if artifacts.is_empty() {
            if self.store.remove_archive(session)? {
                log::info!("session {session}: removed stale archive");
            }
            return Err(ConvertError::NothingConverted { failures: outcomes });
        }

        let archive = self.archiver.build(session, &artifacts)?;
        self.emit(ConversionEvent::ArchiveWritten {
            path: archive.clone(),
            entries: artifacts.len(),
        });

        Ok(ConversionReport {
            session_id: session.clone(),
            target: request.target,
            archive: Some(archive),
            outcomes,
        })
    }

    /// Log a failed file and send the event for `outcome`.
    fn notify(&self, session: &SessionId, index: usize, outcome: &FileOutcome) {
        let event = match &outcome.status {
            OutcomeStatus::Converted { artifact } => ConversionEvent::FileConverted {
                index,
                source: outcome.source.clone(),
                artifact: artifact.clone(),
            },
            OutcomeStatus::Failed { reason, .. } => {
                log::warn!(
                    "session {session}: {} failed: {reason}",
                    outcome.source.display()
                );
                ConversionEvent::FileFailed {
                    index,
                    source: outcome.source.clone(),
                    reason: reason.clone(),
                }
            }
        };
        self.emit(event);
    }

    /// Convert every file the session currently holds.
    pub fn convert_session(
        &self,
        session: &SessionId,
        target: ImageKind,
        options: ConversionOptions,
    ) -> Result<ConversionReport, ConvertError> {
        // Resolve the strategy first so an unsupported target never reads storage
        self.registry.get(target)?;
        let files = self.store.resolve_source_files(session)?;
        let request = ConversionRequest::new(session.clone(), files, target).with_options(options);
        self.convert(&request)
    }
}

/// Find the upload a request reference points at.
///
/// A bare name matches by file name; a path must equal an upload's path.
fn resolve_reference(reference: &Path, uploads: &[PathBuf]) -> Option<PathBuf> {
    let is_bare_name = reference.components().count() == 1 && reference.file_name().is_some();
    uploads
        .iter()
        .find(|upload| {
            if is_bare_name {
                upload.file_name() == reference.file_name()
            } else {
                upload.as_path() == reference
            }
        })
        .cloned()
}

fn job_outcome(reference: &Path, result: &Result<PathBuf, StrategyError>) -> FileOutcome {
    match result {
        Ok(artifact) => FileOutcome::converted(reference.to_path_buf(), artifact.clone()),
        Err(e) => {
            let kind = match e {
                StrategyError::SourceNotFound(_) => FailureKind::SourceNotFound,
                _ => FailureKind::ConversionFailure,
            };
            FileOutcome::failed(reference.to_path_buf(), kind, e.to_string())
        }
    }
}

fn check_source_format(source: &Path, expected: ImageKind) -> Result<(), String> {
    match ImageKind::sniff_file(source) {
        Ok(Some(found)) if found == expected => Ok(()),
        Ok(Some(found)) => Err(format!("expected a {expected} source, found {found}")),
        Ok(None) => Err(format!("expected a {expected} source, found unrecognized data")),
        Err(e) => Err(format!("could not read source header: {e}")),
    }
}
