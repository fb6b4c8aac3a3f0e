use std::path::PathBuf;
use thiserror::Error;

/// Domain failures that callers may want to match on.
///
/// Everything is still surfaced as `anyhow::Error`; use
/// `err.downcast_ref::<ChapterError>()` to inspect the variant.
#[derive(Debug, Error)]
pub enum ChapterError {
    #[error("no chapters found in {}", .0.display())]
    NoChaptersFound(PathBuf),

    #[error("job ledger not found at {} (has a batch been dispatched?)", .0.display())]
    LedgerMissing(PathBuf),

    #[error("no chapter outputs found in {}", .0.display())]
    NoChapterOutputs(PathBuf),

    #[error("progress unavailable for '{title}': unrecognised log line: {line}")]
    ProgressUnavailable { title: String, line: String },

    #[error("{tool} failed (exit code {status}){}", stderr_suffix(.stderr))]
    ToolFailed {
        tool: String,
        status: i32,
        stderr: String,
    },

    #[error("malformed {tool} output: {detail}")]
    MalformedToolOutput { tool: String, detail: String },

    #[error("work item '{0}' has an empty command")]
    EmptyCommand(String),
}

impl ChapterError {
    pub fn tool_failed(tool: impl Into<String>, status: Option<i32>, stderr: &[u8]) -> Self {
        ChapterError::ToolFailed {
            tool: tool.into(),
            status: status.unwrap_or(-1),
            stderr: String::from_utf8_lossy(stderr).trim().to_string(),
        }
    }

    pub fn malformed(tool: impl Into<String>, detail: impl Into<String>) -> Self {
        ChapterError::MalformedToolOutput {
            tool: tool.into(),
            detail: detail.into(),
        }
    }
}

fn stderr_suffix(stderr: &str) -> String {
    if stderr.is_empty() {
        String::new()
    } else {
        format!("\nSTDERR: {}", stderr)
    }
}
