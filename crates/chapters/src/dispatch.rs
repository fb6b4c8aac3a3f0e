use std::fs;
use std::path::Path;
use anyhow::{Context, Result};
use log::{info, warn};
use crate::command::CommandBuilder;
use crate::config::ChapterConfig;
use crate::ffprobe::probe_chapters;
use crate::job::{save_ledger, JobLedger};
use crate::launcher::{launch_all, DispatchReport};
use crate::planner::{into_work_items, plan_chapters};
use crate::workspace::WorkspaceHandle;

/// What a dispatch left behind: the persisted ledger and the launch results
#[derive(Debug)]
pub struct DispatchOutcome {
    pub ledger: JobLedger,
    pub report: DispatchReport,
}

/// Probe `input`, launch one detached encode per chapter and record the batch.
///
/// The ledger is written once, after every launch has been attempted, so it
/// always lists the launches that failed.
pub async fn dispatch(cfg: &ChapterConfig, ws: &WorkspaceHandle, input: &Path) -> Result<DispatchOutcome> {
    ws.prepare()?;

    let probe = probe_chapters(cfg, input).await?;
    let source = fs::canonicalize(input)
        .with_context(|| format!("Failed to resolve input file: {}", input.display()))?;

    let planned = plan_chapters(&probe, &source, ws, &cfg.encoder.container)?;
    // Container duration, not the sum of chapter lengths
    let total_length = probe.total_duration_secs()?;

    let builder = CommandBuilder::from_config(cfg);
    let items = into_work_items(planned, &source, &cfg.encoder, &builder);

    let report = launch_all(ws, &items);

    let ledger = JobLedger::new(source, items, report.failed_titles(), total_length);
    save_ledger(ws, &ledger)
        .context("Failed to record dispatched jobs")?;

    if report.failed.is_empty() {
        info!("✅ All {} chapter encodes started (batch {})", report.launched.len(), ledger.batch_id);
    } else {
        warn!(
            "⚠️  {} of {} chapter encodes failed to start: {}",
            report.failed.len(),
            ledger.items.len(),
            report.failed_titles().join(", ")
        );
    }

    Ok(DispatchOutcome { ledger, report })
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use crate::error::ChapterError;
    use crate::job::load_ledger;

    // Chapters sum to 25s while the container reports 26.5s
    const TWO_CHAPTERS: &str = r#"{
        "chapters": [
            {"id": 0, "start_time": "0.000000", "end_time": "10.000000", "tags": {"title": "Part One"}},
            {"id": 1, "start_time": "10.000000", "end_time": "25.000000", "tags": {"title": "Part Two"}}
        ],
        "format": {"format_name": "matroska,webm", "duration": "26.500000"}
    }"#;

    /// A stand-in ffprobe that prints `json` whatever it is asked
    fn fake_ffprobe(dir: &Path, json: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let script = dir.join("fake-ffprobe");
        fs::write(&script, format!("#!/bin/sh\ncat <<'JSON'\n{}\nJSON\n", json)).unwrap();
        fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).unwrap();
        script
    }

    struct Fixture {
        _work: tempfile::TempDir,
        bin: tempfile::TempDir,
        ws: WorkspaceHandle,
        input: PathBuf,
    }

    fn fixture() -> Fixture {
        let work = tempfile::tempdir().unwrap();
        let bin = tempfile::tempdir().unwrap();
        let ws = WorkspaceHandle::open(work.path()).unwrap();
        let input = bin.path().join("movie.mkv");
        fs::write(&input, "not really a video").unwrap();
        Fixture { _work: work, bin, ws, input }
    }

    #[tokio::test]
    async fn test_dispatch_records_batch_with_container_duration() {
        let fx = fixture();
        let mut cfg = ChapterConfig::default();
        cfg.ffprobe_bin = fake_ffprobe(fx.bin.path(), TWO_CHAPTERS);
        cfg.ffmpeg_bin = PathBuf::from("/bin/sh");

        let outcome = dispatch(&cfg, &fx.ws, &fx.input).await.unwrap();
        assert_eq!(outcome.report.launched.len(), 2);
        assert!(outcome.report.failed.is_empty());

        let ledger = load_ledger(&fx.ws).unwrap();
        assert_eq!(ledger, outcome.ledger);
        assert_eq!(ledger.total_length_seconds, 26.5);
        assert_eq!(ledger.source, fs::canonicalize(&fx.input).unwrap());
        assert!(ledger.failed_launches.is_empty());

        let titles: Vec<&str> = ledger.items.iter().map(|i| i.title.as_str()).collect();
        assert_eq!(titles, vec!["Part_One", "Part_Two"]);
        assert_eq!(ledger.items[1].length_seconds, 15.0);
        assert_eq!(ledger.items[0].command[0], "/bin/sh");
        assert!(fx.ws.log_path("Part_Two").exists());
    }

    #[tokio::test]
    async fn test_failed_launches_are_persisted() {
        let fx = fixture();
        let mut cfg = ChapterConfig::default();
        cfg.ffprobe_bin = fake_ffprobe(fx.bin.path(), TWO_CHAPTERS);
        cfg.ffmpeg_bin = fx.bin.path().join("missing-ffmpeg");

        let outcome = dispatch(&cfg, &fx.ws, &fx.input).await.unwrap();
        assert!(outcome.report.launched.is_empty());

        let ledger = load_ledger(&fx.ws).unwrap();
        assert_eq!(ledger.items.len(), 2);
        assert_eq!(ledger.failed_launches, vec!["Part_One".to_string(), "Part_Two".to_string()]);
        assert!(ledger.launch_failed("Part_Two"));
    }

    #[tokio::test]
    async fn test_no_chapters_wins_over_missing_duration() {
        let fx = fixture();
        let mut cfg = ChapterConfig::default();
        cfg.ffprobe_bin = fake_ffprobe(fx.bin.path(), r#"{"format": {}}"#);
        cfg.ffmpeg_bin = PathBuf::from("/bin/sh");

        let err = dispatch(&cfg, &fx.ws, &fx.input).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ChapterError>(),
            Some(ChapterError::NoChaptersFound(_))
        ));
        assert!(!fx.ws.ledger_path().exists());
    }

    #[tokio::test]
    async fn test_missing_duration_is_fatal_before_launch() {
        let fx = fixture();
        let mut cfg = ChapterConfig::default();
        let no_duration = TWO_CHAPTERS.replace(r#""duration": "26.500000""#, r#""size": "1""#);
        cfg.ffprobe_bin = fake_ffprobe(fx.bin.path(), &no_duration);
        cfg.ffmpeg_bin = PathBuf::from("/bin/sh");

        let err = dispatch(&cfg, &fx.ws, &fx.input).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ChapterError>(),
            Some(ChapterError::MalformedToolOutput { .. })
        ));
        assert!(!fx.ws.log_path("Part_One").exists());
        assert!(!fx.ws.ledger_path().exists());
    }
}
