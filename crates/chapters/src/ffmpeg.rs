use std::path::Path;
use anyhow::{anyhow, Context, Result};
use log::debug;
use tokio::process::Command;
use crate::error::ChapterError;

/// Captured output of a synchronous ffmpeg/ffprobe call
#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Run an external tool to completion and capture its output.
///
/// `argv[0]` is the program. A non-zero exit becomes
/// [`ChapterError::ToolFailed`] carrying the tool's stderr.
pub async fn run_tool(argv: &[String], cwd: Option<&Path>) -> Result<ToolOutput> {
    let (program, args) = argv
        .split_first()
        .ok_or_else(|| anyhow!("Cannot run an empty command"))?;

    debug!("Executing: {}", argv.join(" "));

    let mut cmd = Command::new(program);
    cmd.args(args);
    cmd.stdin(std::process::Stdio::null());
    if let Some(dir) = cwd {
        cmd.current_dir(dir);
    }

    let output = cmd
        .output()
        .await
        .with_context(|| format!("Failed to execute {}. Ensure it is installed and accessible.", program))?;

    if !output.status.success() {
        return Err(ChapterError::tool_failed(tool_name(program), output.status.code(), &output.stderr).into());
    }

    Ok(ToolOutput {
        stdout: String::from_utf8_lossy(&output.stdout).to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).to_string(),
    })
}

/// Short display name for a tool path ("/usr/bin/ffprobe" -> "ffprobe")
pub fn tool_name(program: &str) -> String {
    Path::new(program)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(program)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_name() {
        assert_eq!(tool_name("/usr/local/bin/ffprobe"), "ffprobe");
        assert_eq!(tool_name("ffmpeg"), "ffmpeg");
    }

    #[tokio::test]
    async fn test_empty_command_is_rejected() {
        assert!(run_tool(&[], None).await.is_err());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_captures_stdout_and_cwd() {
        let dir = tempfile::tempdir().unwrap();
        let argv = vec!["/bin/sh".to_string(), "-c".to_string(), "echo hello; pwd".to_string()];
        let out = run_tool(&argv, Some(dir.path())).await.unwrap();
        let mut lines = out.stdout.lines();
        assert_eq!(lines.next(), Some("hello"));
        let cwd = std::fs::canonicalize(lines.next().unwrap()).unwrap();
        assert_eq!(cwd, std::fs::canonicalize(dir.path()).unwrap());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_non_zero_exit_surfaces_stderr() {
        let argv = vec!["/bin/sh".to_string(), "-c".to_string(), "echo boom >&2; exit 3".to_string()];
        let err = run_tool(&argv, None).await.unwrap_err();
        match err.downcast_ref::<ChapterError>() {
            Some(ChapterError::ToolFailed { tool, status, stderr }) => {
                assert_eq!(tool, "sh");
                assert_eq!(*status, 3);
                assert_eq!(stderr, "boom");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_missing_binary_fails_to_execute() {
        let argv = vec!["/nonexistent/ffmpeg-binary".to_string(), "-version".to_string()];
        let err = run_tool(&argv, None).await.unwrap_err();
        assert!(format!("{:#}", err).contains("Failed to execute /nonexistent/ffmpeg-binary"));
    }
}
