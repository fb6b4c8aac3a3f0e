use std::path::{Path, PathBuf};
use crate::config::{ChapterConfig, EncoderParams};

/// Command builder for generating ffmpeg argument lists.
///
/// Every list starts with the ffmpeg binary so it can be stored in the
/// job ledger and replayed verbatim.
#[derive(Debug, Clone)]
pub struct CommandBuilder {
    ffmpeg_bin: PathBuf,
}

impl CommandBuilder {
    pub fn new(ffmpeg_bin: impl Into<PathBuf>) -> Self {
        CommandBuilder {
            ffmpeg_bin: ffmpeg_bin.into(),
        }
    }

    pub fn from_config(cfg: &ChapterConfig) -> Self {
        Self::new(cfg.ffmpeg_bin.clone())
    }

    fn program(&self) -> String {
        self.ffmpeg_bin.to_string_lossy().to_string()
    }

    /// Build the transcode command for one chapter.
    ///
    /// Trims `[start, end)` out of `input` and encodes it with the given
    /// parameter set into `output`.
    pub fn build_chapter_command(
        &self,
        input: &Path,
        output: &Path,
        start: f64,
        end: f64,
        params: &EncoderParams,
    ) -> Vec<String> {
        let mut args = vec![self.program()];

        // Seek before input for fast trimming
        args.push("-ss".to_string());
        args.push(format_timestamp(start));
        args.push("-to".to_string());
        args.push(format_timestamp(end));

        args.push("-i".to_string());
        args.push(input.to_string_lossy().to_string());

        // Video
        args.push("-c:v".to_string());
        args.push(params.video_codec.clone());
        args.push("-preset".to_string());
        args.push(params.preset.clone());
        args.push("-crf".to_string());
        args.push(params.crf.clone());
        args.push("-g".to_string());
        args.push(params.keyint.clone());
        args.push("-pix_fmt".to_string());
        args.push(params.pixel_format.clone());

        let svt_params = params.svtav1_params.trim();
        if !svt_params.is_empty() {
            args.push("-svtav1-params".to_string());
            args.push(svt_params.to_string());
        }

        // Audio
        args.push("-c:a".to_string());
        args.push(params.audio_codec.clone());
        args.push("-ac".to_string());
        args.push(params.audio_channels.clone());
        args.push("-b:a".to_string());
        args.push(params.audio_bitrate.clone());
        args.push("-vbr:a".to_string());
        args.push(params.audio_vbr.clone());

        if params.drop_subtitles {
            args.push("-sn".to_string());
        }

        if params.reset_timestamps {
            args.push("-reset_timestamps".to_string());
            args.push("1".to_string());
        }

        args.push(output.to_string_lossy().to_string());
        args
    }

    /// Build the stream-copy concatenation of a concat-demuxer manifest
    pub fn build_concat_command(&self, manifest: &Path, output: &Path) -> Vec<String> {
        vec![
            self.program(),
            "-y".to_string(),
            "-f".to_string(),
            "concat".to_string(),
            "-safe".to_string(),
            "0".to_string(),
            "-i".to_string(),
            manifest.to_string_lossy().to_string(),
            "-c".to_string(),
            "copy".to_string(),
            output.to_string_lossy().to_string(),
        ]
    }

    /// Build the libvmaf comparison of `encoded` against `source` over the
    /// first `window_secs` seconds. The JSON score is written to `log_name`,
    /// relative to the process working directory.
    pub fn build_quality_command(
        &self,
        encoded: &Path,
        source: &Path,
        model_path: &Path,
        log_name: &str,
        window_secs: u32,
    ) -> Vec<String> {
        // libvmaf takes the distorted stream first and the reference second
        let filter = format!(
            "[0:v]setpts=PTS-STARTPTS[distorted];[1:v]setpts=PTS-STARTPTS[reference];\
             [distorted][reference]libvmaf=model_path={}:log_path={}:log_fmt=json",
            model_path.display(),
            log_name
        );

        vec![
            self.program(),
            "-i".to_string(),
            encoded.to_string_lossy().to_string(),
            "-i".to_string(),
            source.to_string_lossy().to_string(),
            "-filter_complex".to_string(),
            filter,
            "-t".to_string(),
            window_secs.to_string(),
            "-f".to_string(),
            "null".to_string(),
            "-".to_string(),
        ]
    }
}

/// Render seconds the way ffprobe reports them ("10.000000")
pub fn format_timestamp(secs: f64) -> String {
    format!("{:.6}", secs)
}
