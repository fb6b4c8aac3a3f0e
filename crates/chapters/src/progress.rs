//! Progress reconstruction from job logs.
//!
//! Launched encoders are never contacted; everything here is inferred from
//! the last line of each job's log plus the job ledger, so reporting works
//! the same whether or not the dispatching process is still alive.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use log::debug;
use uuid::Uuid;
use crate::error::ChapterError;
use crate::job::JobLedger;
use crate::workspace::WorkspaceHandle;

/// Speed shown before a job has printed anything
pub const UNKNOWN_SPEED: &str = "N/A";

/// Most recent progress parsed from a job log
#[derive(Debug, Clone, PartialEq)]
pub struct JobLogRecord {
    /// Encoder speed exactly as printed; None when not reported yet
    pub encoding_fps: Option<String>,
    pub time_encoded: Duration,
}

impl JobLogRecord {
    pub fn not_started() -> Self {
        Self {
            encoding_fps: None,
            time_encoded: Duration::ZERO,
        }
    }

    pub fn speed(&self) -> &str {
        self.encoding_fps.as_deref().unwrap_or(UNKNOWN_SPEED)
    }

    pub fn encoded_secs(&self) -> f64 {
        self.time_encoded.as_secs_f64()
    }
}

/// Strategy for turning an encoder's last log line into a record.
///
/// Returns None when the line does not look like a progress line.
pub trait ProgressExtractor {
    fn extract(&self, line: &str) -> Option<JobLogRecord>;
}

/// Extractor keyed by the marker substrings ffmpeg prints on its status line
/// (`frame=  240 fps= 24 q=30.0 size=  1024kB time=00:00:10.00 ...`)
#[derive(Debug, Clone)]
pub struct MarkerExtractor {
    pub speed_marker: String,
    pub time_marker: String,
}

impl Default for MarkerExtractor {
    fn default() -> Self {
        Self {
            speed_marker: "fps=".to_string(),
            time_marker: "time=".to_string(),
        }
    }
}

impl ProgressExtractor for MarkerExtractor {
    fn extract(&self, line: &str) -> Option<JobLogRecord> {
        let fps = token_after(line, &self.speed_marker)?;
        let time = token_after(line, &self.time_marker)?;
        let secs = parse_clock(time)?;

        Some(JobLogRecord {
            encoding_fps: Some(fps.to_string()),
            time_encoded: Duration::try_from_secs_f64(secs).ok()?,
        })
    }
}

/// The whitespace-delimited value following `marker`, skipping padding
fn token_after<'a>(line: &'a str, marker: &str) -> Option<&'a str> {
    let start = line.find(marker)? + marker.len();
    line[start..].split_whitespace().next()
}

/// Parse an `[-][HH:]MM:SS.xx` clock into seconds.
///
/// `N/A` counts as zero, as do the small negative times ffmpeg prints
/// before the first frame.
pub fn parse_clock(raw: &str) -> Option<f64> {
    if raw == "N/A" {
        return Some(0.0);
    }

    let (negative, body) = match raw.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, raw),
    };

    let mut secs = 0.0;
    let mut parts = 0;
    for part in body.split(':') {
        let value: f64 = part.parse().ok()?;
        if !value.is_finite() || value < 0.0 {
            return None;
        }
        secs = secs * 60.0 + value;
        parts += 1;
    }
    if parts > 3 {
        return None;
    }

    Some(if negative { 0.0 } else { secs })
}

/// Last non-empty line of a log. ffmpeg redraws its status line with `\r`,
/// so both `\r` and `\n` end a line.
pub fn last_line(content: &str) -> Option<&str> {
    content
        .split(|c: char| c == '\r' || c == '\n')
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .last()
}

/// Read a job's log and parse its latest progress.
///
/// An empty log means the job has not printed anything yet. A last line
/// without the expected markers is [`ChapterError::ProgressUnavailable`].
pub fn read_job_record(title: &str, log_path: &Path, extractor: &dyn ProgressExtractor) -> Result<JobLogRecord> {
    let bytes = fs::read(log_path)
        .with_context(|| format!("Failed to read job log: {}", log_path.display()))?;
    let content = String::from_utf8_lossy(&bytes);

    match last_line(&content) {
        None => Ok(JobLogRecord::not_started()),
        Some(line) => extractor.extract(line).ok_or_else(|| {
            ChapterError::ProgressUnavailable {
                title: title.to_string(),
                line: line.to_string(),
            }
            .into()
        }),
    }
}

/// Progress of one chapter job
#[derive(Debug, Clone, PartialEq)]
pub struct JobProgress {
    pub title: String,
    pub command: Vec<String>,
    pub log_path: PathBuf,
    pub length_seconds: f64,
    pub record: JobLogRecord,
    pub launch_failed: bool,
}

impl JobProgress {
    pub fn percent(&self) -> Option<f64> {
        if self.length_seconds > 0.0 {
            Some(self.record.encoded_secs() / self.length_seconds * 100.0)
        } else {
            None
        }
    }
}

/// Progress of a whole dispatched batch
#[derive(Debug, Clone, PartialEq)]
pub struct BatchProgress {
    pub batch_id: Uuid,
    pub jobs: Vec<JobProgress>,
    pub total_encoded_secs: f64,
    pub total_length_secs: f64,
    pub elapsed: chrono::Duration,
}

impl BatchProgress {
    /// Encoded time over source duration. Not clamped: chapters that
    /// overshoot the container duration can push this past 100.
    pub fn completion_percent(&self) -> Option<f64> {
        if self.total_length_secs > 0.0 {
            Some(self.total_encoded_secs / self.total_length_secs * 100.0)
        } else {
            None
        }
    }
}

/// Rebuild batch progress from the ledger and the current job logs
pub fn report(
    ws: &WorkspaceHandle,
    ledger: &JobLedger,
    extractor: &dyn ProgressExtractor,
    now: DateTime<Utc>,
) -> Result<BatchProgress> {
    let mut jobs = Vec::with_capacity(ledger.items.len());

    for item in &ledger.items {
        let log_path = ws.log_path(&item.title);
        let launch_failed = ledger.launch_failed(&item.title);

        let record = if launch_failed {
            JobLogRecord::not_started()
        } else {
            read_job_record(&item.title, &log_path, extractor)?
        };
        debug!("{}: fps={} encoded={:.2}s", item.title, record.speed(), record.encoded_secs());

        jobs.push(JobProgress {
            title: item.title.clone(),
            command: item.command.clone(),
            log_path,
            length_seconds: item.length_seconds,
            record,
            launch_failed,
        });
    }

    let total_encoded_secs = jobs.iter().map(|j| j.record.encoded_secs()).sum();

    Ok(BatchProgress {
        batch_id: ledger.batch_id,
        jobs,
        total_encoded_secs,
        total_length_secs: ledger.total_length_seconds,
        elapsed: now - ledger.dispatched_at,
    })
}

/// Whole seconds as `H:MM:SS`
pub fn format_hms(secs: f64) -> String {
    let total = secs.max(0.0) as u64;
    format!("{}:{:02}:{:02}", total / 3600, (total % 3600) / 60, total % 60)
}

/// Encoder-style clock, `HH:MM:SS.xx`
pub fn format_clock(d: Duration) -> String {
    let centis = d.as_millis() / 10;
    let secs = centis / 100;
    format!(
        "{:02}:{:02}:{:02}.{:02}",
        secs / 3600,
        (secs % 3600) / 60,
        secs % 60,
        centis % 100
    )
}

impl fmt::Display for BatchProgress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for job in &self.jobs {
            writeln!(f)?;
            writeln!(f, "Chapter: {}", job.title)?;
            writeln!(f, "Command: {}", job.command.join(" "))?;
            if job.launch_failed {
                writeln!(f, "Status: launch failed")?;
            }
            writeln!(f, "Encoding Speed: {} fps", job.record.speed())?;
            writeln!(f, "Time Encoded: {} (hh:mm:ss)", format_clock(job.record.time_encoded))?;
        }

        writeln!(f)?;
        writeln!(f, "Total Encoded Time: {} (hh:mm:ss)", format_hms(self.total_encoded_secs))?;
        writeln!(f, "Total Video Length: {} (hh:mm:ss)", format_hms(self.total_length_secs))?;
        match self.completion_percent() {
            Some(pct) => writeln!(f, "Completion: {:.2}%", pct)?,
            None => writeln!(f, "Completion: n/a (unknown source length)")?,
        }
        write!(f, "Total Encoding Time: {}", format_hms(self.elapsed.num_seconds() as f64))
    }
}
