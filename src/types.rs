use serde::Deserialize;
use std::path::PathBuf;
use thiserror::Error;

use crate::config::Settings;

#[derive(Error, Debug)]
pub enum DownloadError {
    #[error("{tool} not found. Install with: brew install {tool}")]
    ToolNotFound { tool: String },
    #[error("{tool} exited with code {code}: {stderr}")]
    ToolFailed {
        tool: String,
        code: i32,
        stderr: String,
    },
    #[error("Interrupted by user")]
    Interrupted,
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadMode {
    Video,
    Audio,
}

impl DownloadMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            DownloadMode::Video => "video",
            DownloadMode::Audio => "audio",
        }
    }
}

/// One unit of work: a single video or one playlist entry.
#[derive(Debug, Clone)]
pub struct DownloadTask {
    pub url: String,
    pub title: String,
    pub mode: DownloadMode,
    pub dest_dir: PathBuf,
    /// 1-based playlist position, used as an `NN_` filename prefix.
    pub index: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutcomeStatus {
    Succeeded,
    Failed,
    /// The stop signal fired before the task started.
    Skipped,
    /// The stop signal fired mid-task; abandoned after the current attempt.
    Interrupted,
}

#[derive(Debug, Clone)]
pub struct DownloadOutcome {
    pub task: DownloadTask,
    pub status: OutcomeStatus,
    pub output: Option<PathBuf>,
    pub error: Option<String>,
    pub attempts: u32,
}

impl DownloadOutcome {
    pub fn succeeded(task: DownloadTask, output: PathBuf, attempts: u32) -> Self {
        Self {
            task,
            status: OutcomeStatus::Succeeded,
            output: Some(output),
            error: None,
            attempts,
        }
    }

    pub fn failed(task: DownloadTask, error: String, attempts: u32) -> Self {
        Self {
            task,
            status: OutcomeStatus::Failed,
            output: None,
            error: Some(error),
            attempts,
        }
    }

    pub fn skipped(task: DownloadTask) -> Self {
        Self {
            task,
            status: OutcomeStatus::Skipped,
            output: None,
            error: None,
            attempts: 0,
        }
    }

    pub fn interrupted(task: DownloadTask, attempts: u32) -> Self {
        Self {
            task,
            status: OutcomeStatus::Interrupted,
            output: None,
            error: None,
            attempts,
        }
    }
}

/// Every submitted task is represented exactly once, in completion order.
#[derive(Debug, Default)]
pub struct AggregateReport {
    pub outcomes: Vec<DownloadOutcome>,
}

impl AggregateReport {
    pub fn total(&self) -> usize {
        self.outcomes.len()
    }

    pub fn succeeded(&self) -> usize {
        self.count(OutcomeStatus::Succeeded)
    }

    pub fn failed(&self) -> usize {
        self.count(OutcomeStatus::Failed)
    }

    pub fn skipped(&self) -> usize {
        self.count(OutcomeStatus::Skipped) + self.count(OutcomeStatus::Interrupted)
    }

    pub fn failures(&self) -> impl Iterator<Item = &DownloadOutcome> {
        self.outcomes
            .iter()
            .filter(|o| o.status == OutcomeStatus::Failed)
    }

    fn count(&self, status: OutcomeStatus) -> usize {
        self.outcomes.iter().filter(|o| o.status == status).count()
    }
}

/// Metadata returned by `yt-dlp --dump-json`. Unknown fields are ignored.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct VideoInfo {
    #[serde(skip)]
    pub url: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub duration: Option<f64>,
    #[serde(default)]
    pub uploader: Option<String>,
    #[serde(default)]
    pub thumbnail: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

impl VideoInfo {
    pub fn display_title(&self) -> &str {
        self.title.as_deref().unwrap_or("Unknown")
    }
}

/// Everything the wizard decided for one run.
#[derive(Debug, Clone)]
pub struct DownloadPlan {
    pub mode: DownloadMode,
    pub video_quality: String,
    pub audio_quality: String,
    pub audio_format: String,
    pub output_dir: PathBuf,
    pub download_thumbnail: bool,
    pub download_subtitles: bool,
    pub subtitle_lang: String,
    pub playlist_start: usize,
    pub playlist_end: Option<usize>,
}

impl DownloadPlan {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            mode: DownloadMode::Video,
            video_quality: settings.video_quality.clone(),
            audio_quality: settings.audio_quality.clone(),
            audio_format: settings.audio_format.clone(),
            output_dir: crate::config::expand_home(&settings.output_dir_video),
            download_thumbnail: settings.download_thumbnails,
            download_subtitles: settings.download_subtitles,
            subtitle_lang: settings.subtitle_lang.clone(),
            playlist_start: 1,
            playlist_end: None,
        }
    }

    pub fn extension(&self) -> &str {
        match self.mode {
            DownloadMode::Audio => &self.audio_format,
            DownloadMode::Video => "mp4",
        }
    }

    /// yt-dlp `-f` selector for the chosen mode and quality.
    pub fn format_selector(&self) -> String {
        match self.mode {
            DownloadMode::Audio => "bestaudio/best".to_string(),
            DownloadMode::Video => {
                if self.video_quality == "best" {
                    "bestvideo+bestaudio/best".to_string()
                } else {
                    format!(
                        "bestvideo[height<={q}]+bestaudio/best[height<={q}]",
                        q = self.video_quality
                    )
                }
            }
        }
    }
}
