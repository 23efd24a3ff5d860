use batch_convert::config::{self, AppConfig};
use batch_convert::format::ImageKind;
use batch_convert::imaging::{
    ConversionOptions, Dimensions, ImageBackend, Quality, Resize, RustBackend,
};
use batch_convert::orchestrator::{ConversionOrchestrator, ConversionRequest, ConvertError};
use batch_convert::output::{self, UploadEntry};
use batch_convert::registry::StrategyRegistry;
use batch_convert::session::{RetentionPolicy, SessionFileStore, SessionId};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Parser)]
#[command(name = "batch-convert")]
#[command(about = "Batch image conversion into downloadable zip archives")]
#[command(long_about = "\
Batch image conversion into downloadable zip archives

Files are uploaded into a session, converted to a target format in parallel,
and packaged into one zip archive per session.

Storage layout:

  <storage_root>/
  └── <session>/
      ├── uploads/          # originals
      ├── converted/        # artifacts of the latest conversions
      └── <session>.zip     # archive of the latest conversion

A failing file never aborts the batch: it is reported and left out of the
archive while every other file converts.

Run 'batch-convert gen-config' to generate a documented config.toml.")]
#[command(version)]
struct Cli {
    /// Config file (defaults to ./config.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Override the storage root from config
    #[arg(long, global = true)]
    storage_root: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

/// Identifies the session a command works on.
#[derive(clap::Args, Clone)]
struct SessionArgs {
    /// Session identifier
    #[arg(long)]
    session: SessionId,
}

#[derive(Subcommand)]
enum Command {
    /// Copy local files into a session (creates a new session if none given)
    Upload {
        /// Existing session to add files to
        #[arg(long)]
        session: Option<SessionId>,
        /// Files to upload
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Convert a session's uploads and build its archive
    Convert {
        #[command(flatten)]
        session: SessionArgs,
        /// Target format (png, jpeg, webp, tiff, bmp, gif, avif)
        #[arg(long)]
        to: ImageKind,
        /// Require every source to be of this format
        #[arg(long)]
        from: Option<ImageKind>,
        /// Lossy encoder quality, 1-100 (defaults to config)
        #[arg(long, value_parser = clap::value_parser!(u32).range(1..=100))]
        quality: Option<u32>,
        /// Shrink to fit within WIDTHxHEIGHT, keeping aspect ratio
        #[arg(long)]
        resize: Option<Resize>,
        /// Print the report as JSON instead of progress lines
        #[arg(long)]
        json: bool,
        /// Upload names to convert (all uploads when omitted)
        files: Vec<PathBuf>,
    },
    /// Copy a session's archive to a local path
    Download {
        #[command(flatten)]
        session: SessionArgs,
        /// Destination file
        #[arg(long)]
        dest: PathBuf,
    },
    /// Show a session's uploads and archive
    List {
        #[command(flatten)]
        session: SessionArgs,
    },
    /// Delete a session and everything it holds
    Cleanup {
        #[command(flatten)]
        session: SessionArgs,
    },
    /// Delete every session idle for longer than the given age
    Sweep {
        #[arg(long)]
        max_age_hours: u64,
    },
    /// List formats and whether they can be converted to
    Formats,
    /// Print a stock config.toml with all options documented
    GenConfig,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();

    if let Command::GenConfig = cli.command {
        print!("{}", config::stock_config_toml());
        return Ok(());
    }

    let mut app_config = config::load_config(cli.config.as_deref())?;
    if let Some(root) = cli.storage_root {
        app_config.storage_root = root;
    }
    let store = SessionFileStore::new(&app_config.storage_root);

    match cli.command {
        Command::Upload { session, files } => {
            let session = session.unwrap_or_else(SessionId::generate);
            let stored = store.save_paths(&session, &files)?;
            output::print_upload(&session, &stored);
        }
        Command::Convert {
            session,
            to,
            from,
            quality,
            resize,
            json,
            files,
        } => {
            let mut options = app_config.conversion_options();
            if let Some(q) = quality {
                options.quality = Quality::new(q);
            }
            options.resize = resize;
            run_convert(&app_config, session.session, to, from, options, json, files)?;
        }
        Command::Download { session, dest } => {
            let archive = store
                .archive_path(&session.session)
                .ok_or_else(|| format!("no archive for session {}", session.session))?;
            std::fs::copy(&archive, &dest)?;
            println!("{} \u{2192} {}", archive.display(), dest.display());
        }
        Command::List { session } => {
            let entries = describe_uploads(&store.resolve_source_files(&session.session)?)?;
            let archive = store.archive_path(&session.session);
            output::print_session_files(&session.session, &entries, archive.as_deref());
        }
        Command::Cleanup { session } => {
            if store.cleanup(&session.session)? {
                println!("Removed session {}", session.session);
            } else {
                println!("No session {}", session.session);
            }
        }
        Command::Sweep { max_age_hours } => {
            let policy = RetentionPolicy {
                max_age: Duration::from_secs(max_age_hours.saturating_mul(3600)),
            };
            output::print_sweep(&store.sweep(&policy)?);
        }
        Command::Formats => {
            let registry = StrategyRegistry::with_backend(
                std::sync::Arc::new(RustBackend::new()),
                &app_config.formats.enabled,
            );
            output::print_formats(&registry);
        }
        // Printed before any config is loaded
        Command::GenConfig => {}
    }

    Ok(())
}

fn run_convert(
    app_config: &AppConfig,
    session: SessionId,
    target: ImageKind,
    source_format: Option<ImageKind>,
    options: ConversionOptions,
    json: bool,
    files: Vec<PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    let orchestrator = ConversionOrchestrator::from_config(app_config)?;
    let files = if files.is_empty() {
        orchestrator.store().resolve_source_files(&session)?
    } else {
        files
    };
    let mut request = ConversionRequest::new(session, files, target).with_options(options);
    request.source_format = source_format;

    let (orchestrator, printer) = if json {
        (orchestrator, None)
    } else {
        let (tx, rx) = std::sync::mpsc::channel();
        let printer = std::thread::spawn(move || {
            for event in rx {
                for line in output::format_event(&event) {
                    println!("{}", line);
                }
            }
        });
        (orchestrator.with_events(tx), Some(printer))
    };

    let result = orchestrator.convert(&request);
    // Dropping the orchestrator closes the event channel so the printer exits
    drop(orchestrator);
    if let Some(printer) = printer {
        printer.join().map_err(|_| "output thread panicked")?;
    }

    match result {
        Ok(report) if json => println!("{}", serde_json::to_string_pretty(&report)?),
        Ok(report) => output::print_report(&report),
        Err(ConvertError::NothingConverted { failures }) => {
            if json {
                println!("{}", serde_json::to_string_pretty(&failures)?);
            }
            return Err(format!(
                "none of the {} requested files could be converted",
                failures.len()
            )
            .into());
        }
        Err(e) => return Err(e.into()),
    }
    Ok(())
}

/// Gather size, sniffed format and dimensions for each upload.
fn describe_uploads(paths: &[PathBuf]) -> Result<Vec<UploadEntry>, std::io::Error> {
    let backend = RustBackend::new();
    paths
        .iter()
        .map(|path| {
            let size = std::fs::metadata(path)?.len();
            let kind = ImageKind::sniff_file(path)?;
            Ok(UploadEntry {
                path: path.clone(),
                size,
                kind,
                dimensions: identify(&backend, path, kind),
            })
        })
        .collect()
}

fn identify(backend: &RustBackend, path: &Path, kind: Option<ImageKind>) -> Option<Dimensions> {
    // HEIC is recognized but not decodable
    kind.filter(|k| k.image_format().is_some())
        .and_then(|_| backend.identify(path).ok())
}
