//! Per-format conversion strategies.
//!
//! A [`FormatStrategy`] turns one source file into one artifact of a fixed
//! target format. The provided [`convert_all`](FormatStrategy::convert_all)
//! fans `convert_one` out with rayon's `par_iter`, so it runs on whichever
//! thread pool the caller installed; the orchestrator uses a bounded one and
//! hooks [`convert_all_with`](FormatStrategy::convert_all_with) to report
//! each file as soon as it is done.
//!
//! ## Write discipline
//!
//! [`EncoderStrategy`] never writes to the artifact path directly:
//!
//! 1. a temp file is created *next to* the destination (same filesystem),
//! 2. the backend encodes into the temp file,
//! 3. the temp file is atomically renamed over the destination.
//!
//! A failure at any step drops the temp file, which deletes it, so a
//! destination path either holds a complete artifact or is left as it was.
//! The source is only ever opened for reading.

use crate::format::ImageKind;
use crate::imaging::{BackendError, ConversionOptions, ImageBackend, TranscodeParams};
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StrategyError {
    #[error("source not found: {0}")]
    SourceNotFound(PathBuf),
    #[error("refusing to overwrite source file {0}")]
    WouldOverwriteSource(PathBuf),
    #[error("conversion of {path} failed: {source}")]
    Conversion {
        path: PathBuf,
        #[source]
        source: BackendError,
    },
    #[error("could not write artifact {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// One unit of work: convert `source` into an artifact at `output`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionJob {
    pub source: PathBuf,
    pub output: PathBuf,
}

pub trait FormatStrategy: Send + Sync {
    /// The format every artifact of this strategy is encoded in.
    fn target(&self) -> ImageKind;

    /// Extension given to artifacts.
    fn extension(&self) -> &'static str {
        self.target().extension()
    }

    /// Convert a single file, returning the artifact path.
    fn convert_one(
        &self,
        job: &ConversionJob,
        options: &ConversionOptions,
    ) -> Result<PathBuf, StrategyError>;

    /// Convert every job concurrently. Results line up with `jobs` by index;
    /// one failing job never affects the others.
    fn convert_all(
        &self,
        jobs: &[ConversionJob],
        options: &ConversionOptions,
    ) -> Vec<Result<PathBuf, StrategyError>> {
        self.convert_all_with(jobs, options, &|_, _| {})
    }

    /// [`convert_all`](Self::convert_all), calling `on_done` with the job
    /// index and result from the worker thread that finished it.
    fn convert_all_with(
        &self,
        jobs: &[ConversionJob],
        options: &ConversionOptions,
        on_done: &(dyn Fn(usize, &Result<PathBuf, StrategyError>) + Sync),
    ) -> Vec<Result<PathBuf, StrategyError>> {
        jobs.par_iter()
            .enumerate()
            .map(|(index, job)| {
                let result = self.convert_one(job, options);
                on_done(index, &result);
                result
            })
            .collect()
    }
}

/// Strategy that delegates pixel work to an [`ImageBackend`] and pins one
/// target format.
pub struct EncoderStrategy {
    target: ImageKind,
    backend: Arc<dyn ImageBackend>,
}

impl EncoderStrategy {
    pub fn new(target: ImageKind, backend: Arc<dyn ImageBackend>) -> Self {
        Self { target, backend }
    }
}

impl FormatStrategy for EncoderStrategy {
    fn target(&self) -> ImageKind {
        self.target
    }

    fn convert_one(
        &self,
        job: &ConversionJob,
        options: &ConversionOptions,
    ) -> Result<PathBuf, StrategyError> {
        if !job.source.is_file() {
            return Err(StrategyError::SourceNotFound(job.source.clone()));
        }
        if same_file(&job.source, &job.output) {
            return Err(StrategyError::WouldOverwriteSource(job.source.clone()));
        }

        let write_err = |source: std::io::Error| StrategyError::Write {
            path: job.output.clone(),
            source,
        };
        let dir = job.output.parent().unwrap_or(Path::new("."));
        let mut partial = tempfile::Builder::new()
            .prefix(".partial-")
            .suffix(&format!(".{}", self.extension()))
            .tempfile_in(dir)
            .map_err(write_err)?;

        let params = TranscodeParams {
            source: job.source.clone(),
            target: self.target,
            quality: options.quality,
            resize: options.resize,
        };
        self.backend
            .transcode(&params, partial.as_file_mut())
            .map_err(|source| StrategyError::Conversion {
                path: job.source.clone(),
                source,
            })?;

        partial
            .persist(&job.output)
            .map_err(|e| write_err(e.error))?;
        log::debug!(
            "converted {} -> {}",
            job.source.display(),
            job.output.display()
        );
        Ok(job.output.clone())
    }
}

fn same_file(a: &Path, b: &Path) -> bool {
    if a == b {
        return true;
    }
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imaging::backend::tests::MockBackend;
    use std::time::{Duration, Instant};
    use tempfile::TempDir;

    fn strategy(backend: Arc<MockBackend>, target: ImageKind) -> EncoderStrategy {
        EncoderStrategy::new(target, backend)
    }

    fn leftover_partials(dir: &Path) -> Vec<String> {
        std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .filter(|n| n.starts_with(".partial-"))
            .collect()
    }

    #[test]
    fn convert_one_writes_artifact_at_output() {
        let tmp = TempDir::new().unwrap();
        let source = tmp.path().join("a.png");
        std::fs::write(&source, b"png bytes").unwrap();
        let output = tmp.path().join("a.jpg");

        let backend = Arc::new(MockBackend::new());
        let s = strategy(backend.clone(), ImageKind::Jpeg);
        let job = ConversionJob {
            source: source.clone(),
            output: output.clone(),
        };

        let artifact = s.convert_one(&job, &ConversionOptions::default()).unwrap();
        assert_eq!(artifact, output);
        assert_eq!(std::fs::read_to_string(&output).unwrap(), "MOCK:jpeg");
        assert_eq!(std::fs::read(&source).unwrap(), b"png bytes");
        assert!(leftover_partials(tmp.path()).is_empty());
    }

    #[test]
    fn failed_conversion_leaves_no_artifact() {
        let tmp = TempDir::new().unwrap();
        let source = tmp.path().join("bad.png");
        std::fs::write(&source, b"garbage").unwrap();
        let output = tmp.path().join("bad.jpg");

        let backend = Arc::new(MockBackend::failing_on(&["bad.png"]));
        let s = strategy(backend, ImageKind::Jpeg);
        let result = s.convert_one(
            &ConversionJob {
                source,
                output: output.clone(),
            },
            &ConversionOptions::default(),
        );

        assert!(matches!(result, Err(StrategyError::Conversion { .. })));
        assert!(!output.exists());
        assert!(leftover_partials(tmp.path()).is_empty());
    }

    #[test]
    fn failed_conversion_keeps_previous_artifact_intact() {
        let tmp = TempDir::new().unwrap();
        let source = tmp.path().join("bad.png");
        std::fs::write(&source, b"garbage").unwrap();
        let output = tmp.path().join("bad.jpg");
        std::fs::write(&output, b"previous run").unwrap();

        let s = strategy(Arc::new(MockBackend::failing_on(&["bad.png"])), ImageKind::Jpeg);
        let _ = s.convert_one(
            &ConversionJob {
                source,
                output: output.clone(),
            },
            &ConversionOptions::default(),
        );
        assert_eq!(std::fs::read(&output).unwrap(), b"previous run");
    }

    #[test]
    fn missing_source_is_reported_without_calling_backend() {
        let tmp = TempDir::new().unwrap();
        let backend = Arc::new(MockBackend::new());
        let s = strategy(backend.clone(), ImageKind::Png);

        let result = s.convert_one(
            &ConversionJob {
                source: tmp.path().join("missing.png"),
                output: tmp.path().join("missing-out.png"),
            },
            &ConversionOptions::default(),
        );
        assert!(matches!(result, Err(StrategyError::SourceNotFound(_))));
        assert_eq!(backend.transcode_count(), 0);
    }

    #[test]
    fn output_equal_to_source_is_refused() {
        let tmp = TempDir::new().unwrap();
        let source = tmp.path().join("a.png");
        std::fs::write(&source, b"keep me").unwrap();

        let s = strategy(Arc::new(MockBackend::new()), ImageKind::Png);
        let result = s.convert_one(
            &ConversionJob {
                source: source.clone(),
                output: source.clone(),
            },
            &ConversionOptions::default(),
        );
        assert!(matches!(result, Err(StrategyError::WouldOverwriteSource(_))));
        assert_eq!(std::fs::read(&source).unwrap(), b"keep me");
    }

    #[test]
    fn convert_all_keeps_job_order_and_isolates_failures() {
        let tmp = TempDir::new().unwrap();
        let mut jobs = Vec::new();
        for name in ["a", "b", "c"] {
            let source = tmp.path().join(format!("{name}.png"));
            std::fs::write(&source, name).unwrap();
            jobs.push(ConversionJob {
                source,
                output: tmp.path().join(format!("{name}.webp")),
            });
        }

        let s = strategy(Arc::new(MockBackend::failing_on(&["b.png"])), ImageKind::Webp);
        let results = s.convert_all(&jobs, &ConversionOptions::default());

        assert_eq!(results.len(), 3);
        assert_eq!(results[0].as_ref().unwrap(), &tmp.path().join("a.webp"));
        assert!(results[1].is_err());
        assert_eq!(results[2].as_ref().unwrap(), &tmp.path().join("c.webp"));
    }

    #[test]
    fn convert_all_runs_jobs_in_parallel() {
        let tmp = TempDir::new().unwrap();
        let jobs: Vec<ConversionJob> = (0..4)
            .map(|i| {
                let source = tmp.path().join(format!("{i}.png"));
                std::fs::write(&source, b"x").unwrap();
                ConversionJob {
                    source,
                    output: tmp.path().join(format!("{i}.gif")),
                }
            })
            .collect();

        let backend = Arc::new(MockBackend::with_delay(Duration::from_millis(200)));
        let s = strategy(backend, ImageKind::Gif);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(4)
            .build()
            .unwrap();

        let start = Instant::now();
        let results = pool.install(|| s.convert_all(&jobs, &ConversionOptions::default()));
        let elapsed = start.elapsed();

        assert!(results.iter().all(|r| r.is_ok()));
        // Sequential would take 800ms
        assert!(elapsed < Duration::from_millis(700), "took {elapsed:?}");
    }

    #[test]
    fn convert_all_with_reports_each_job_once() {
        let tmp = TempDir::new().unwrap();
        let jobs: Vec<ConversionJob> = ["a", "b", "c", "d"]
            .iter()
            .map(|name| {
                let source = tmp.path().join(format!("{name}.png"));
                std::fs::write(&source, name).unwrap();
                ConversionJob {
                    source,
                    output: tmp.path().join(format!("{name}.jpg")),
                }
            })
            .collect();

        let s = strategy(Arc::new(MockBackend::failing_on(&["c.png"])), ImageKind::Jpeg);
        let seen = std::sync::Mutex::new(Vec::new());
        let results = s.convert_all_with(&jobs, &ConversionOptions::default(), &|i, r| {
            seen.lock().unwrap().push((i, r.is_ok()));
        });

        let mut seen = seen.into_inner().unwrap();
        seen.sort();
        assert_eq!(seen, vec![(0, true), (1, true), (2, false), (3, true)]);
        assert_eq!(results.len(), 4);
        assert!(results[2].is_err());
    }

    #[test]
    fn convert_all_with_reports_before_the_batch_ends() {
        let tmp = TempDir::new().unwrap();
        let jobs: Vec<ConversionJob> = (0..2)
            .map(|i| {
                let source = tmp.path().join(format!("{i}.png"));
                std::fs::write(&source, b"x").unwrap();
                ConversionJob {
                    source,
                    output: tmp.path().join(format!("{i}.png.out")),
                }
            })
            .collect();

        let s = strategy(
            Arc::new(MockBackend::with_delay(Duration::from_millis(50))),
            ImageKind::Png,
        );
        let (tx, rx) = std::sync::mpsc::channel();
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(1)
            .build()
            .unwrap();
        pool.install(|| {
            s.convert_all_with(&jobs, &ConversionOptions::default(), &|i, _| {
                tx.send((i, Instant::now())).unwrap();
            })
        });
        let finished = Instant::now();
        drop(tx);

        let stamps: Vec<_> = rx.iter().collect();
        assert_eq!(stamps.len(), 2);
        // On one worker the first report precedes the second job's encode
        let first = stamps.iter().map(|(_, t)| *t).min().unwrap();
        assert!(finished - first >= Duration::from_millis(40));
    }
}
