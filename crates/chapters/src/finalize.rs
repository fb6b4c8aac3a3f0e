use std::collections::HashSet;
use std::fs;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use anyhow::{Context, Result};
use log::{debug, info, warn};
use walkdir::WalkDir;
use crate::command::CommandBuilder;
use crate::config::ChapterConfig;
use crate::error::ChapterError;
use crate::ffmpeg::run_tool;
use crate::job::load_ledger;
use crate::quality::run_vmaf;
use crate::workspace::WorkspaceHandle;

pub const CLEANUP_PROMPT: &str = "Proceed with cleanup? (yes/no): ";

/// Result of a finalize run
#[derive(Debug, Clone, PartialEq)]
pub struct FinalizeReport {
    pub output: PathBuf,
    pub vmaf_score: f64,
    /// Whether the intermediate files were removed
    pub cleaned: bool,
}

/// Asks the operator a yes/no question
pub trait Confirm {
    fn confirm(&mut self, prompt: &str) -> Result<bool>;
}

/// Line-based prompt over any reader/writer pair
pub struct PromptConfirm<R, W> {
    input: R,
    output: W,
}

impl<R: BufRead, W: Write> PromptConfirm<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }
}

impl PromptConfirm<io::StdinLock<'static>, io::Stdout> {
    pub fn stdio() -> Self {
        Self::new(io::stdin().lock(), io::stdout())
    }
}

impl<R: BufRead, W: Write> Confirm for PromptConfirm<R, W> {
    fn confirm(&mut self, prompt: &str) -> Result<bool> {
        write!(self.output, "{}", prompt).context("Failed to write prompt")?;
        self.output.flush().context("Failed to flush prompt")?;

        let mut answer = String::new();
        self.input
            .read_line(&mut answer)
            .context("Failed to read answer")?;
        Ok(is_affirmative(&answer))
    }
}

/// `y` or `yes`, any case; everything else (including EOF) is a no
pub fn is_affirmative(answer: &str) -> bool {
    matches!(answer.trim().to_lowercase().as_str(), "y" | "yes")
}

/// List `tmp/*.<ext>` in filename order
pub fn collect_chapter_outputs(ws: &WorkspaceHandle, ext: &str) -> Result<Vec<PathBuf>> {
    let tmp_dir = ws.tmp_dir();
    let mut outputs = Vec::new();

    if tmp_dir.is_dir() {
        let walker = WalkDir::new(&tmp_dir)
            .min_depth(1)
            .max_depth(1)
            .follow_links(false)
            .sort_by_file_name();

        for entry in walker {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    warn!("Error reading directory entry: {}", e);
                    continue;
                }
            };

            let path = entry.path();
            if !entry.file_type().is_file() {
                continue;
            }
            if path.extension().and_then(|s| s.to_str()) == Some(ext) {
                debug!("Found chapter output: {}", path.display());
                outputs.push(path.to_path_buf());
            }
        }
    }

    if outputs.is_empty() {
        return Err(ChapterError::NoChapterOutputs(tmp_dir).into());
    }

    info!("Found {} chapter outputs to concatenate.", outputs.len());
    Ok(outputs)
}

/// Quote a path for the concat demuxer
fn quote_for_manifest(path: &Path) -> String {
    format!("'{}'", path.to_string_lossy().replace('\'', "'\\''"))
}

/// Write the concat demuxer manifest listing `outputs` in order
pub fn write_concat_manifest(ws: &WorkspaceHandle, outputs: &[PathBuf]) -> Result<PathBuf> {
    let manifest = ws.concat_manifest_path();
    let body: String = outputs
        .iter()
        .map(|p| format!("file {}\n", quote_for_manifest(p)))
        .collect();

    fs::write(&manifest, body)
        .with_context(|| format!("Failed to write concat manifest: {}", manifest.display()))?;
    Ok(manifest)
}

/// True when the dispatch order of `planned` agrees with `outputs` for
/// every file the two have in common
pub fn ledger_order_matches(planned: &[PathBuf], outputs: &[PathBuf]) -> bool {
    let on_disk: HashSet<&PathBuf> = outputs.iter().collect();
    let in_ledger: HashSet<&PathBuf> = planned.iter().collect();

    // Duplicate titles share an output; only the first mention counts
    let mut seen = HashSet::new();
    let ledger_seq: Vec<&PathBuf> = planned
        .iter()
        .filter(|p| on_disk.contains(p) && seen.insert(*p))
        .collect();
    let disk_seq: Vec<&PathBuf> = outputs.iter().filter(|p| in_ledger.contains(p)).collect();

    ledger_seq == disk_seq
}

fn warn_on_order_mismatch(ws: &WorkspaceHandle, outputs: &[PathBuf]) {
    match load_ledger(ws) {
        Ok(ledger) => {
            let planned: Vec<PathBuf> = ledger.items.iter().map(|i| i.output.clone()).collect();
            if !ledger_order_matches(&planned, outputs) {
                warn!("⚠️  Filename order of chapter outputs differs from chapter order; concatenating in filename order");
            }
        }
        Err(e) => debug!("Skipping chapter order check: {:#}", e),
    }
}

/// Stream-copy the outputs, in the order given, into the final artifact
pub async fn concatenate(
    cfg: &ChapterConfig,
    ws: &WorkspaceHandle,
    builder: &CommandBuilder,
    outputs: &[PathBuf],
) -> Result<PathBuf> {
    let manifest = write_concat_manifest(ws, outputs)?;
    let output = ws.final_output_path(&cfg.output_name);

    info!("Concatenating {} chapters into {}", outputs.len(), output.display());
    let argv = builder.build_concat_command(&manifest, &output);
    run_tool(&argv, Some(ws.root()))
        .await
        .context("Concatenation failed")?;

    info!("✅ Concatenation completed. Output: {}", output.display());
    Ok(output)
}

/// Remove logs, chapter outputs, the ledger and the VMAF log. The final
/// artifact lives in the root and is left alone.
pub fn cleanup(ws: &WorkspaceHandle) -> Result<()> {
    for dir in [ws.log_dir(), ws.tmp_dir()] {
        if dir.exists() {
            fs::remove_dir_all(&dir)
                .with_context(|| format!("Failed to remove directory: {}", dir.display()))?;
        }
    }
    for file in [ws.ledger_path(), ws.vmaf_log_path()] {
        if file.exists() {
            fs::remove_file(&file)
                .with_context(|| format!("Failed to remove file: {}", file.display()))?;
        }
    }

    info!("🧹 Cleanup completed.");
    Ok(())
}

/// Concatenate finished chapters, score the result and optionally clean up
pub async fn finalize(
    cfg: &ChapterConfig,
    ws: &WorkspaceHandle,
    source: &Path,
    confirm: &mut dyn Confirm,
) -> Result<FinalizeReport> {
    let outputs = collect_chapter_outputs(ws, &cfg.encoder.container)?;
    warn_on_order_mismatch(ws, &outputs);

    let builder = CommandBuilder::from_config(cfg);
    let output = concatenate(cfg, ws, &builder, &outputs).await?;
    let vmaf_score = run_vmaf(cfg, ws, &builder, source, &output).await?;

    let cleaned = if confirm.confirm(CLEANUP_PROMPT)? {
        cleanup(ws)?;
        true
    } else {
        info!("Cleanup aborted by user.");
        false
    };

    Ok(FinalizeReport {
        output,
        vmaf_score,
        cleaned,
    })
}
