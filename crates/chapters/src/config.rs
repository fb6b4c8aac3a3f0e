use std::path::{Path, PathBuf};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Encoder parameter set for a chapter transcode.
///
/// Values are kept as strings and handed to ffmpeg untouched; a bad value
/// shows up as a failure in the job's log, not here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EncoderParams {
    /// ffmpeg video encoder name
    pub video_codec: String,
    /// Speed/quality tradeoff (SVT-AV1: 0-13, lower = slower)
    pub preset: String,
    /// Constant rate factor (quality target)
    pub crf: String,
    /// Colon-separated SVT-AV1 tuning string passed via -svtav1-params
    pub svtav1_params: String,
    pub pixel_format: String,
    /// Keyframe interval in frames (-g)
    pub keyint: String,
    pub audio_codec: String,
    pub audio_channels: String,
    pub audio_bitrate: String,
    /// Opus VBR mode (-vbr:a)
    pub audio_vbr: String,
    /// Drop subtitle streams (-sn)
    pub drop_subtitles: bool,
    /// Reset output timestamps to zero (-reset_timestamps 1)
    pub reset_timestamps: bool,
    /// Container extension for chapter outputs
    pub container: String,
}

impl Default for EncoderParams {
    fn default() -> Self {
        Self {
            video_codec: "libsvtav1".to_string(),
            preset: "1".to_string(),
            crf: "16".to_string(),
            svtav1_params: "tune=0:enable-overlays=1:scm=0:scd=1:lookahead=120:keyint=360:film-grain=3:input-depth=10:irefresh-type=1:lp=4".to_string(),
            pixel_format: "yuv420p10le".to_string(),
            keyint: "360".to_string(),
            audio_codec: "libopus".to_string(),
            audio_channels: "6".to_string(),
            audio_bitrate: "256K".to_string(),
            audio_vbr: "2".to_string(),
            drop_subtitles: true,
            reset_timestamps: true,
            container: "mkv".to_string(),
        }
    }
}

/// Configuration for the chapter encoder
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChapterConfig {
    /// Working area holding log/, tmp/, the job ledger and the final output
    pub work_dir: PathBuf,
    /// Path to ffmpeg binary
    pub ffmpeg_bin: PathBuf,
    /// Path to ffprobe binary
    pub ffprobe_bin: PathBuf,
    /// libvmaf model used by the quality check
    pub vmaf_model_path: PathBuf,
    /// Seconds of video compared by the quality check
    pub vmaf_window_secs: u32,
    /// File name of the concatenated output, created inside work_dir
    pub output_name: String,
    pub encoder: EncoderParams,
}

impl Default for ChapterConfig {
    fn default() -> Self {
        Self::default_config()
    }
}

impl ChapterConfig {
    /// Create a default configuration with sensible values
    pub fn default_config() -> Self {
        Self {
            work_dir: PathBuf::from("."),
            ffmpeg_bin: PathBuf::from("ffmpeg"),
            ffprobe_bin: PathBuf::from("ffprobe"),
            vmaf_model_path: PathBuf::from("/usr/local/share/model/vmaf_v0.6.1.json"),
            vmaf_window_secs: 60,
            output_name: "output.mkv".to_string(),
            encoder: EncoderParams::default(),
        }
    }

    /// Load configuration from a file, or return defaults if path is None or file doesn't exist
    pub fn load_config(path: Option<&Path>) -> Result<Self> {
        let mut config = Self::default_config();

        if let Some(config_path) = path {
            if config_path.exists() {
                let content = std::fs::read_to_string(config_path)
                    .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

                // TOML by extension, JSON otherwise
                if config_path.extension().and_then(|s| s.to_str()) == Some("toml") {
                    config = toml::from_str(&content)
                        .with_context(|| format!("Failed to parse TOML config: {}", config_path.display()))?;
                } else {
                    config = serde_json::from_str(&content)
                        .with_context(|| format!("Failed to parse JSON config: {}", config_path.display()))?;
                }
            } else {
                log::warn!("Config file not found, using defaults: {}", config_path.display());
            }
        }

        Ok(config)
    }
}
