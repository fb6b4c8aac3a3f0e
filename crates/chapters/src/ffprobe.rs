use std::path::Path;
use std::collections::HashMap;
use anyhow::{Context, Result};
use log::{debug, info};
use serde::Deserialize;
use crate::config::ChapterConfig;
use crate::error::ChapterError;
use crate::ffmpeg::run_tool;

/// The parts of ffprobe's `-show_chapters -show_format` output we use
#[derive(Debug, Clone, Deserialize)]
pub struct ChapterProbe {
    #[serde(default)]
    pub chapters: Vec<FFProbeChapter>,
    pub format: FFProbeFormat,
}

/// A single chapter entry from ffprobe
#[derive(Debug, Clone, Deserialize)]
pub struct FFProbeChapter {
    pub id: Option<i64>,
    /// Decimal seconds, e.g. "10.000000"
    pub start_time: String,
    pub end_time: String,
    pub tags: Option<HashMap<String, String>>,
}

/// Format-level metadata from ffprobe
#[derive(Debug, Clone, Deserialize)]
pub struct FFProbeFormat {
    pub format_name: Option<String>,
    /// Decimal seconds; absent for some streamed inputs
    pub duration: Option<String>,
}

impl FFProbeChapter {
    pub fn title(&self) -> Option<&str> {
        self.tags.as_ref()?.get("title").map(|t| t.as_str())
    }

    pub fn start_secs(&self) -> Result<f64> {
        parse_seconds("start_time", &self.start_time)
    }

    pub fn end_secs(&self) -> Result<f64> {
        parse_seconds("end_time", &self.end_time)
    }
}

impl ChapterProbe {
    /// Duration of the whole source as reported by the container
    pub fn total_duration_secs(&self) -> Result<f64> {
        let raw = self
            .format
            .duration
            .as_deref()
            .ok_or_else(|| ChapterError::malformed("ffprobe", "format.duration is missing"))?;
        parse_seconds("format.duration", raw)
    }
}

fn parse_seconds(field: &str, raw: &str) -> Result<f64> {
    raw.trim()
        .parse::<f64>()
        .map_err(|_| ChapterError::malformed("ffprobe", format!("{} is not a number: {:?}", field, raw)).into())
}

/// Build the ffprobe invocation that lists chapters and format metadata
pub fn probe_command(cfg: &ChapterConfig, file_path: &Path) -> Vec<String> {
    vec![
        cfg.ffprobe_bin.to_string_lossy().to_string(),
        "-i".to_string(),
        file_path.to_string_lossy().to_string(),
        "-print_format".to_string(),
        "json".to_string(),
        "-show_chapters".to_string(),
        "-show_format".to_string(),
        "-loglevel".to_string(),
        "error".to_string(),
    ]
}

/// Run ffprobe and parse chapter and duration metadata
pub async fn probe_chapters(cfg: &ChapterConfig, file_path: &Path) -> Result<ChapterProbe> {
    // Verify file exists before trying to probe
    if !file_path.exists() {
        anyhow::bail!("File does not exist: {}", file_path.display());
    }

    info!("Running ffprobe for '{}' to extract chapter information...", file_path.display());

    let output = run_tool(&probe_command(cfg, file_path), None)
        .await
        .with_context(|| format!("Failed to probe file: {}", file_path.display()))?;

    let probe = parse_probe_output(&output.stdout)
        .with_context(|| format!("Failed to parse ffprobe JSON for: {}", file_path.display()))?;

    debug!("ffprobe reported {} chapters, duration {:?}", probe.chapters.len(), probe.format.duration);
    info!("Chapter information extracted successfully.");
    Ok(probe)
}

/// Parse raw ffprobe JSON
pub fn parse_probe_output(json: &str) -> Result<ChapterProbe> {
    serde_json::from_str(json).map_err(|e| ChapterError::malformed("ffprobe", e.to_string()).into())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "chapters": [
            {
                "id": 0,
                "time_base": "1/1000",
                "start": 0,
                "start_time": "0.000000",
                "end": 10000,
                "end_time": "10.000000",
                "tags": { "title": "Part One" }
            },
            {
                "id": 1,
                "time_base": "1/1000",
                "start": 10000,
                "start_time": "10.000000",
                "end": 25000,
                "end_time": "25.000000",
                "tags": { "title": "Part Two" }
            }
        ],
        "format": {
            "filename": "movie.mkv",
            "nb_streams": 2,
            "format_name": "matroska,webm",
            "start_time": "0.000000",
            "duration": "25.000000",
            "size": "1048576"
        }
    }"#;

    #[test]
    fn test_parse_sample_output() {
        let probe = parse_probe_output(SAMPLE).unwrap();
        assert_eq!(probe.chapters.len(), 2);
        assert_eq!(probe.chapters[0].title(), Some("Part One"));
        assert_eq!(probe.chapters[1].start_secs().unwrap(), 10.0);
        assert_eq!(probe.chapters[1].end_secs().unwrap(), 25.0);
        assert_eq!(probe.total_duration_secs().unwrap(), 25.0);
        assert_eq!(probe.format.format_name.as_deref(), Some("matroska,webm"));
    }

    #[test]
    fn test_missing_chapters_key_is_empty() {
        let probe = parse_probe_output(r#"{"format": {"duration": "12.5"}}"#).unwrap();
        assert!(probe.chapters.is_empty());
        assert_eq!(probe.total_duration_secs().unwrap(), 12.5);
    }

    #[test]
    fn test_malformed_json() {
        let err = parse_probe_output("not json").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ChapterError>(),
            Some(ChapterError::MalformedToolOutput { .. })
        ));
    }

    #[test]
    fn test_bad_duration_is_malformed() {
        let probe = parse_probe_output(r#"{"format": {"duration": "N/A"}}"#).unwrap();
        assert!(probe.total_duration_secs().is_err());

        let probe = parse_probe_output(r#"{"format": {}}"#).unwrap();
        assert!(probe.total_duration_secs().is_err());
    }

    #[test]
    fn test_probe_command_shape() {
        let cfg = ChapterConfig::default();
        let args = probe_command(&cfg, Path::new("/media/movie.mkv"));
        assert_eq!(args[0], "ffprobe");
        assert!(args.windows(2).any(|w| w[0] == "-i" && w[1] == "/media/movie.mkv"));
        assert!(args.contains(&"-show_chapters".to_string()));
        assert!(args.contains(&"-show_format".to_string()));
    }

    #[tokio::test]
    async fn test_probe_missing_file() {
        let cfg = ChapterConfig::default();
        let err = probe_chapters(&cfg, Path::new("/nonexistent/movie.mkv")).await.unwrap_err();
        assert!(err.to_string().contains("File does not exist"));
    }
}
