pub mod config;
pub mod error;
pub mod workspace;
pub mod ffmpeg;
pub mod ffprobe;
pub mod command;
pub mod job;
pub mod planner;
pub mod launcher;
pub mod dispatch;
pub mod progress;
pub mod quality;
pub mod finalize;

pub use config::{ChapterConfig, EncoderParams};
pub use error::ChapterError;
pub use workspace::WorkspaceHandle;
pub use command::CommandBuilder;
pub use ffprobe::{ChapterProbe, FFProbeChapter, FFProbeFormat};
pub use job::{JobLedger, WorkItem};
pub use launcher::{DetachedJob, DispatchReport};
pub use dispatch::DispatchOutcome;
pub use progress::{BatchProgress, JobProgress, MarkerExtractor, ProgressExtractor};
pub use finalize::{Confirm, FinalizeReport, PromptConfirm};
