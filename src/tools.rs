use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;

use crate::types::DownloadError;

#[derive(Debug, Clone)]
pub struct ToolPaths {
    pub yt_dlp: PathBuf,
    pub ffmpeg: PathBuf,
}

const YT_DLP_FALLBACKS: &[&str] = &[
    "/opt/homebrew/bin/yt-dlp",
    "/usr/local/bin/yt-dlp",
    "/usr/bin/yt-dlp",
];
const FFMPEG_FALLBACKS: &[&str] = &[
    "/opt/homebrew/bin/ffmpeg",
    "/usr/local/bin/ffmpeg",
    "/usr/bin/ffmpeg",
];

/// Locate and verify both external tools. A missing tool is fatal.
pub async fn resolve() -> Result<ToolPaths, DownloadError> {
    let yt_dlp = locate("yt-dlp", "--version", YT_DLP_FALLBACKS).await?;
    let ffmpeg = locate("ffmpeg", "-version", FFMPEG_FALLBACKS).await?;
    Ok(ToolPaths { yt_dlp, ffmpeg })
}

async fn locate(
    tool: &str,
    version_flag: &str,
    fallbacks: &[&str],
) -> Result<PathBuf, DownloadError> {
    let mut candidates: Vec<PathBuf> = Vec::new();
    if let Ok(found) = which::which(tool) {
        candidates.push(found);
    }
    candidates.extend(fallbacks.iter().map(PathBuf::from));
    for candidate in candidates {
        if runs(&candidate, version_flag).await {
            log::debug!("using {tool} at {}", candidate.display());
            return Ok(candidate);
        }
    }
    Err(DownloadError::ToolNotFound {
        tool: tool.to_string(),
    })
}

async fn runs(program: &Path, version_flag: &str) -> bool {
    Command::new(program)
        .arg(version_flag)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await
        .map(|s| s.success())
        .unwrap_or(false)
}
