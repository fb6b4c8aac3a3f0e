use std::fs::OpenOptions;
use std::path::PathBuf;
use std::process::Stdio;
use anyhow::{Context, Result};
use log::{error, info};
use tokio::process::Command;
use crate::error::ChapterError;
use crate::job::WorkItem;
use crate::workspace::WorkspaceHandle;

/// A chapter transcode running on its own.
///
/// The process handle is deliberately not kept: the only way to observe the
/// job afterwards is its log file, which `title` and `log_path` identify.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetachedJob {
    pub title: String,
    /// OS process id at launch time, informational only
    pub pid: Option<u32>,
    pub log_path: PathBuf,
}

/// Outcome of launching a whole batch
#[derive(Debug, Default)]
pub struct DispatchReport {
    pub launched: Vec<DetachedJob>,
    /// (title, reason) for every item that could not be started
    pub failed: Vec<(String, String)>,
}

impl DispatchReport {
    pub fn failed_titles(&self) -> Vec<String> {
        self.failed.iter().map(|(title, _)| title.clone()).collect()
    }
}

/// Start one work item's command with output appended to its log.
///
/// Returns as soon as the process has started. Must be called from inside a
/// tokio runtime.
pub fn launch_detached(ws: &WorkspaceHandle, item: &WorkItem) -> Result<DetachedJob> {
    let (program, args) = item
        .command
        .split_first()
        .ok_or_else(|| ChapterError::EmptyCommand(item.title.clone()))?;

    let log_path = ws.log_path(&item.title);
    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .with_context(|| format!("Failed to open job log: {}", log_path.display()))?;
    let log_err = log_file
        .try_clone()
        .with_context(|| format!("Failed to duplicate job log handle: {}", log_path.display()))?;

    let mut cmd = Command::new(program);
    cmd.args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::from(log_file))
        .stderr(Stdio::from(log_err))
        .kill_on_drop(false);

    // Own process group: a Ctrl-C aimed at us must not reach the encoders
    #[cfg(unix)]
    cmd.process_group(0);

    let child = cmd
        .spawn()
        .with_context(|| format!("Failed to start encoding for '{}' ({})", item.title, program))?;

    let job = DetachedJob {
        title: item.title.clone(),
        pid: child.id(),
        log_path,
    };

    // Dropping the handle neither waits for nor kills the process
    drop(child);

    info!(
        "Encoding for '{}' is running in the background (pid {:?}). Log: {}",
        job.title,
        job.pid,
        job.log_path.display()
    );
    Ok(job)
}

/// Launch every item; a failure to start one does not stop the others
pub fn launch_all(ws: &WorkspaceHandle, items: &[WorkItem]) -> DispatchReport {
    let mut report = DispatchReport::default();

    for item in items {
        info!("Generated command for {} encoding", item.title);
        match launch_detached(ws, item) {
            Ok(job) => report.launched.push(job),
            Err(e) => {
                error!("❌ Failed to start encoding for '{}': {:#}", item.title, e);
                report.failed.push((item.title.clone(), format!("{:#}", e)));
            }
        }
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn workspace() -> (tempfile::TempDir, WorkspaceHandle) {
        let dir = tempfile::tempdir().unwrap();
        let ws = WorkspaceHandle::open(dir.path()).unwrap();
        ws.prepare().unwrap();
        (dir, ws)
    }

    fn item(title: &str, command: Vec<&str>) -> WorkItem {
        WorkItem {
            title: title.to_string(),
            start: 0.0,
            end: 1.0,
            length_seconds: 1.0,
            output: PathBuf::from(format!("{}.mkv", title)),
            command: command.into_iter().map(String::from).collect(),
        }
    }

    async fn wait_for_log(path: &std::path::Path, needle: &str) -> String {
        for _ in 0..100 {
            let content = std::fs::read_to_string(path).unwrap_or_default();
            if content.contains(needle) {
                return content;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        panic!("log {} never contained {:?}", path.display(), needle);
    }

    #[tokio::test]
    async fn test_empty_command_is_rejected() {
        let (_dir, ws) = workspace();
        let err = launch_detached(&ws, &item("Empty", vec![])).unwrap_err();
        assert!(matches!(err.downcast_ref::<ChapterError>(), Some(ChapterError::EmptyCommand(_))));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_launch_redirects_both_streams_and_appends() {
        let (_dir, ws) = workspace();
        let log_path = ws.log_path("Part_One");
        std::fs::write(&log_path, "previous run\n").unwrap();

        let job = launch_detached(
            &ws,
            &item("Part_One", vec!["/bin/sh", "-c", "echo to-stdout; echo to-stderr >&2"]),
        )
        .unwrap();
        assert_eq!(job.title, "Part_One");
        assert_eq!(job.log_path, log_path);

        wait_for_log(&log_path, "to-stderr").await;
        let content = wait_for_log(&log_path, "to-stdout").await;
        assert!(content.starts_with("previous run\n"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_launch_does_not_wait_for_exit() {
        let (_dir, ws) = workspace();
        let started = std::time::Instant::now();
        let job = launch_detached(&ws, &item("Slow", vec!["/bin/sh", "-c", "sleep 5"])).unwrap();
        assert!(started.elapsed() < Duration::from_secs(2));
        assert!(job.pid.is_some());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failed_launch_does_not_abort_siblings() {
        let (_dir, ws) = workspace();
        let items = vec![
            item("Missing", vec!["/nonexistent/ffmpeg-binary", "-version"]),
            item("Works", vec!["/bin/sh", "-c", "echo done"]),
        ];

        let report = launch_all(&ws, &items);
        assert_eq!(report.launched.len(), 1);
        assert_eq!(report.launched[0].title, "Works");
        assert_eq!(report.failed_titles(), vec!["Missing".to_string()]);
        assert!(report.failed[0].1.contains("Failed to start encoding for 'Missing'"));

        // The failed job still has a (silent) log, distinguishable from a running one
        assert_eq!(std::fs::read_to_string(ws.log_path("Missing")).unwrap(), "");
        wait_for_log(&ws.log_path("Works"), "done").await;
    }
}
