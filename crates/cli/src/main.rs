use anyhow::{Context, Result};
use clap::Parser;
use chapters::{
    config::ChapterConfig,
    dispatch::dispatch,
    finalize::{self, PromptConfirm},
    job,
    progress::{self, MarkerExtractor},
    workspace::WorkspaceHandle,
};
use std::fs;
use std::path::{Path, PathBuf};
use chrono::Utc;
use log::info;

/// Split a video by chapter and encode every chapter in parallel
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Input media file with chapter markers
    input: Option<PathBuf>,

    /// SVT-AV1 tuning string (colon-separated key=value pairs)
    #[arg(long)]
    svt_av1_params: Option<String>,

    /// Encoder preset
    #[arg(long)]
    preset: Option<String>,

    /// Constant rate factor
    #[arg(long)]
    crf: Option<String>,

    /// Show progress of the dispatched chapter jobs
    #[arg(long, visible_alias = "status")]
    info: bool,

    /// Concatenate finished chapters, run the VMAF check and clean up
    #[arg(long, visible_alias = "finalize")]
    complete: bool,

    /// Path to configuration file (JSON or TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Working directory for logs, chapter outputs and the job ledger
    #[arg(short, long)]
    work_dir: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Dispatch,
    Status,
    Finalize,
}

impl Args {
    fn mode(&self) -> Mode {
        if self.complete {
            Mode::Finalize
        } else if self.info {
            Mode::Status
        } else {
            Mode::Dispatch
        }
    }

    fn require_input(&self) -> Result<&Path> {
        self.input
            .as_deref()
            .context("An input file is required (usage: ffchapter <INPUT>)")
    }
}

/// Command-line flags win over the config file
fn apply_overrides(cfg: &mut ChapterConfig, args: &Args) {
    if let Some(params) = &args.svt_av1_params {
        cfg.encoder.svtav1_params = params.clone();
    }
    if let Some(preset) = &args.preset {
        cfg.encoder.preset = preset.clone();
    }
    if let Some(crf) = &args.crf {
        cfg.encoder.crf = crf.clone();
    }
    if let Some(dir) = &args.work_dir {
        cfg.work_dir = dir.clone();
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();

    // RUST_LOG wins; otherwise info, or debug with -v
    let default_level = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .format_timestamp_secs()
        .init();

    let mut cfg = ChapterConfig::load_config(args.config.as_deref())
        .context("Failed to load configuration")?;
    apply_overrides(&mut cfg, &args);

    match args.mode() {
        Mode::Finalize => {
            let ws = WorkspaceHandle::open(&cfg.work_dir)?;
            run_finalize(&cfg, &ws, args.require_input()?).await
        }
        Mode::Status => run_status(&cfg.work_dir),
        Mode::Dispatch => {
            let ws = WorkspaceHandle::open(&cfg.work_dir)?;
            dispatch(&cfg, &ws, args.require_input()?).await?;
            info!("Check progress with: ffchapter --info");
            Ok(())
        }
    }
}

/// Read-only: a mistyped work dir is reported, never created
fn run_status(work_dir: &Path) -> Result<()> {
    let ws = WorkspaceHandle::open_existing(work_dir)?;
    let ledger = job::load_ledger(&ws)
        .context("Failed to load job ledger")?;
    let batch = progress::report(&ws, &ledger, &MarkerExtractor::default(), Utc::now())?;
    println!("{}", batch);
    Ok(())
}

async fn run_finalize(cfg: &ChapterConfig, ws: &WorkspaceHandle, input: &Path) -> Result<()> {
    let source = fs::canonicalize(input)
        .with_context(|| format!("Failed to resolve source file: {}", input.display()))?;

    let mut confirm = PromptConfirm::stdio();
    let report = finalize::finalize(cfg, ws, &source, &mut confirm).await?;

    info!(
        "🎉 Finalized {} (VMAF {:.4}, cleanup {})",
        report.output.display(),
        report.vmaf_score,
        if report.cleaned { "done" } else { "skipped" }
    );
    Ok(())
}
