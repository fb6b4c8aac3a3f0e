use std::collections::HashSet;
use std::path::{Path, PathBuf};
use anyhow::Result;
use log::{info, warn};
use crate::command::CommandBuilder;
use crate::config::EncoderParams;
use crate::error::ChapterError;
use crate::ffprobe::ChapterProbe;
use crate::job::WorkItem;
use crate::workspace::WorkspaceHandle;

/// A chapter with normalized title, boundaries and output location
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedChapter {
    pub title: String,
    pub start: f64,
    pub end: f64,
    pub output: PathBuf,
}

impl PlannedChapter {
    pub fn length_seconds(&self) -> f64 {
        self.end - self.start
    }
}

/// Replace whitespace in a chapter title so it can name files
pub fn sanitize_title(raw: &str) -> String {
    raw.chars()
        .map(|c| if c.is_whitespace() { '_' } else { c })
        .collect()
}

/// Turn probe metadata into an ordered chapter plan.
///
/// Fails with [`ChapterError::NoChaptersFound`] when the source has no
/// chapters. Duplicate titles are reported but not renamed.
pub fn plan_chapters(
    probe: &ChapterProbe,
    source: &Path,
    ws: &WorkspaceHandle,
    container: &str,
) -> Result<Vec<PlannedChapter>> {
    if probe.chapters.is_empty() {
        return Err(ChapterError::NoChaptersFound(source.to_path_buf()).into());
    }

    let mut seen = HashSet::new();
    let mut planned = Vec::with_capacity(probe.chapters.len());

    for (index, chapter) in probe.chapters.iter().enumerate() {
        // Blank tags would name a hidden file like `tmp/.mkv`
        let title = match chapter.title().filter(|raw| !raw.trim().is_empty()) {
            Some(raw) => sanitize_title(raw),
            None => format!("Chapter_{:02}", index + 1),
        };

        if !seen.insert(title.clone()) {
            warn!("Duplicate chapter title '{}': its log and output will collide with an earlier chapter", title);
        }

        planned.push(PlannedChapter {
            output: ws.chapter_output_path(&title, container),
            start: chapter.start_secs()?,
            end: chapter.end_secs()?,
            title,
        });
    }

    info!("Found {} chapters.", planned.len());
    Ok(planned)
}

/// Attach the transcode command to each planned chapter
pub fn into_work_items(
    planned: Vec<PlannedChapter>,
    source: &Path,
    params: &EncoderParams,
    builder: &CommandBuilder,
) -> Vec<WorkItem> {
    planned
        .into_iter()
        .map(|chapter| {
            let command = builder.build_chapter_command(source, &chapter.output, chapter.start, chapter.end, params);
            WorkItem {
                length_seconds: chapter.length_seconds(),
                title: chapter.title,
                start: chapter.start,
                end: chapter.end,
                output: chapter.output,
                command,
            }
        })
        .collect()
}
