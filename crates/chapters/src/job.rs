use std::fs;
use std::path::{Path, PathBuf};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use log::info;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use crate::error::ChapterError;
use crate::workspace::WorkspaceHandle;

/// One chapter's transcode job. Immutable once planned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkItem {
    /// Filesystem-safe chapter title; names the log and the output file
    pub title: String,
    pub start: f64,
    pub end: f64,
    #[serde(rename = "length_in_seconds")]
    pub length_seconds: f64,
    pub output: PathBuf,
    /// Full argv of the transcode, program first
    pub command: Vec<String>,
}

/// Durable record of one dispatched batch.
///
/// Written once, right after every launch attempt, and read-only afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobLedger {
    pub batch_id: Uuid,
    pub source: PathBuf,
    #[serde(rename = "chapters")]
    pub items: Vec<WorkItem>,
    /// Titles whose process could not be started
    #[serde(default)]
    pub failed_launches: Vec<String>,
    /// Source duration from container metadata, not the sum of chapters
    #[serde(rename = "total_length_in_seconds")]
    pub total_length_seconds: f64,
    #[serde(rename = "executed_datetime")]
    pub dispatched_at: DateTime<Utc>,
}

impl JobLedger {
    pub fn new(source: PathBuf, items: Vec<WorkItem>, failed_launches: Vec<String>, total_length_seconds: f64) -> Self {
        Self {
            batch_id: Uuid::new_v4(),
            source,
            items,
            failed_launches,
            total_length_seconds,
            dispatched_at: Utc::now(),
        }
    }

    pub fn launch_failed(&self, title: &str) -> bool {
        self.failed_launches.iter().any(|t| t == title)
    }
}

/// Write the ledger, replacing any previous batch's record
pub fn save_ledger(ws: &WorkspaceHandle, ledger: &JobLedger) -> Result<()> {
    let path = ws.ledger_path();
    let json = serde_json::to_string_pretty(ledger)
        .context("Failed to serialize job ledger")?;

    // Write-then-rename so readers never see a half-written ledger
    let tmp_path = path.with_extension("json.tmp");
    fs::write(&tmp_path, json)
        .with_context(|| format!("Failed to write job ledger: {}", tmp_path.display()))?;
    fs::rename(&tmp_path, &path)
        .with_context(|| format!("Failed to replace job ledger: {}", path.display()))?;

    info!("Saved job information to {}", path.display());
    Ok(())
}

/// Load the ledger of the most recent dispatch
pub fn load_ledger(ws: &WorkspaceHandle) -> Result<JobLedger> {
    read_ledger(&ws.ledger_path())
}

fn read_ledger(path: &Path) -> Result<JobLedger> {
    if !path.exists() {
        return Err(ChapterError::LedgerMissing(path.to_path_buf()).into());
    }

    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read job ledger: {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse job ledger: {}", path.display()))
}
