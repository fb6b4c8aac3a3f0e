use std::fs;
use std::path::Path;
use anyhow::{Context, Result};
use log::info;
use serde_json::Value;
use crate::command::CommandBuilder;
use crate::config::ChapterConfig;
use crate::error::ChapterError;
use crate::ffmpeg::run_tool;
use crate::workspace::WorkspaceHandle;

/// Run libvmaf over the first `vmaf_window_secs` of `encoded` against
/// `source` and return the pooled score.
pub async fn run_vmaf(
    cfg: &ChapterConfig,
    ws: &WorkspaceHandle,
    builder: &CommandBuilder,
    source: &Path,
    encoded: &Path,
) -> Result<f64> {
    info!("Running VMAF test on the first {} seconds of video...", cfg.vmaf_window_secs);

    let log_path = ws.vmaf_log_path();
    let log_name = log_path
        .file_name()
        .and_then(|n| n.to_str())
        .context("VMAF log path has no file name")?;

    // Stale scores from an earlier run must not be mistaken for this one
    if log_path.exists() {
        fs::remove_file(&log_path)
            .with_context(|| format!("Failed to remove stale VMAF log: {}", log_path.display()))?;
    }

    // The filter graph gets a bare file name, so run from the workspace root
    let argv = builder.build_quality_command(encoded, source, &cfg.vmaf_model_path, log_name, cfg.vmaf_window_secs);
    run_tool(&argv, Some(ws.root()))
        .await
        .context("VMAF test failed")?;

    let content = fs::read_to_string(&log_path)
        .with_context(|| format!("Failed to read VMAF log: {}", log_path.display()))?;
    let score = parse_vmaf_score(&content)?;

    info!("🎯 VMAF score for the first {} seconds: {:.4}", cfg.vmaf_window_secs, score);
    Ok(score)
}

/// Extract the pooled score from a libvmaf JSON log.
///
/// Accepts both the legacy `VMAF_score` key and the libvmaf 2.x layout
/// (`pooled_metrics.vmaf.mean`).
pub fn parse_vmaf_score(json: &str) -> Result<f64> {
    let value: Value = serde_json::from_str(json)
        .map_err(|e| ChapterError::malformed("libvmaf", e.to_string()))?;

    value
        .get("VMAF_score")
        .or_else(|| value.pointer("/pooled_metrics/vmaf/mean"))
        .and_then(Value::as_f64)
        .filter(|score| score.is_finite())
        .ok_or_else(|| ChapterError::malformed("libvmaf", "no numeric VMAF score in log").into())
}
