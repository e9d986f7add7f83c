use serde::Deserialize;
use std::path::Path;

use crate::exec::ToolRunner;
use crate::types::{DownloadError, VideoInfo};

pub fn is_playlist(url: &str) -> bool {
    url.contains("list=") || url.contains("playlist?")
}

/// One line of `yt-dlp --flat-playlist` output.
#[derive(Debug, Clone, Deserialize)]
pub struct PlaylistEntry {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
}

impl PlaylistEntry {
    /// Absolute watch URL; bare video ids expand to a YouTube watch link.
    pub fn watch_url(&self) -> Option<String> {
        let raw = self.url.clone().or_else(|| self.id.clone())?;
        if raw.starts_with("http") {
            Some(raw)
        } else {
            Some(format!("https://www.youtube.com/watch?v={raw}"))
        }
    }

    pub fn display_title(&self, position: usize) -> String {
        self.title
            .clone()
            .unwrap_or_else(|| format!("Video {position}"))
    }
}

pub async fn video_info(
    runner: &dyn ToolRunner,
    yt_dlp: &Path,
    url: &str,
) -> Result<VideoInfo, DownloadError> {
    let args = vec![
        "--dump-json".to_string(),
        "--no-warnings".to_string(),
        url.to_string(),
    ];
    let out = runner.run("yt-dlp", yt_dlp, &args).await?;
    if out.success() {
        if let Ok(mut info) = serde_json::from_str::<VideoInfo>(&out.stdout) {
            info.url = url.to_string();
            return Ok(info);
        }
    }
    // fall back to just the title
    let title = video_title(runner, yt_dlp, url).await?;
    Ok(VideoInfo {
        url: url.to_string(),
        title: Some(title),
        ..VideoInfo::default()
    })
}

async fn video_title(
    runner: &dyn ToolRunner,
    yt_dlp: &Path,
    url: &str,
) -> Result<String, DownloadError> {
    let args = vec![
        "--get-title".to_string(),
        "--no-warnings".to_string(),
        url.to_string(),
    ];
    let out = runner.run("yt-dlp", yt_dlp, &args).await?;
    if !out.success() {
        return Err(DownloadError::ToolFailed {
            tool: "yt-dlp".to_string(),
            code: out.code,
            stderr: out.error_text(),
        });
    }
    Ok(out.stdout.trim().to_string())
}

pub async fn playlist_entries(
    runner: &dyn ToolRunner,
    yt_dlp: &Path,
    url: &str,
) -> Result<Vec<PlaylistEntry>, DownloadError> {
    let args = vec![
        "--dump-json".to_string(),
        "--flat-playlist".to_string(),
        "--no-warnings".to_string(),
        url.to_string(),
    ];
    let out = runner.run("yt-dlp", yt_dlp, &args).await?;
    if !out.success() {
        return Err(DownloadError::ToolFailed {
            tool: "yt-dlp".to_string(),
            code: out.code,
            stderr: out.error_text(),
        });
    }
    let mut entries = Vec::new();
    for line in out.stdout.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<PlaylistEntry>(line) {
            Ok(entry) => entries.push(entry),
            Err(e) => log::debug!("skipping unparsable playlist line: {e}"),
        }
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::testing::FakeRunner;
    use std::path::PathBuf;

    #[test]
    fn playlist_urls_are_detected() {
        assert!(is_playlist("https://www.youtube.com/watch?v=abc&list=xyz"));
        assert!(is_playlist("https://youtube.com/playlist?list=xyz"));
        assert!(!is_playlist("https://www.youtube.com/watch?v=abc"));
        assert!(!is_playlist("https://youtu.be/abc"));
        assert!(!is_playlist("https://vimeo.com/123456"));
        assert!(!is_playlist(""));
        assert!(!is_playlist("not a url"));
    }

    #[test]
    fn bare_ids_expand_to_watch_urls() {
        let entry = PlaylistEntry {
            id: Some("abc123".to_string()),
            url: None,
            title: None,
        };
        assert_eq!(
            entry.watch_url().unwrap(),
            "https://www.youtube.com/watch?v=abc123"
        );
        let entry = PlaylistEntry {
            id: Some("abc123".to_string()),
            url: Some("https://example.com/v/1".to_string()),
            title: None,
        };
        assert_eq!(entry.watch_url().unwrap(), "https://example.com/v/1");
        assert_eq!(entry.display_title(7), "Video 7");
    }

    #[tokio::test]
    async fn video_info_parses_json_dump() {
        let runner = FakeRunner::ok().with_stdout(
            r#"{"title": "Тестовое видео", "uploader": "someone", "duration": 63.0, "webpage_url": "x"}"#,
        );
        let info = video_info(&runner, &PathBuf::from("yt-dlp"), "https://example.com/v")
            .await
            .unwrap();
        assert_eq!(info.display_title(), "Тестовое видео");
        assert_eq!(info.uploader.as_deref(), Some("someone"));
        assert_eq!(info.url, "https://example.com/v");
    }

    #[tokio::test]
    async fn video_info_falls_back_to_title_lookup() {
        // stdout is not JSON, so the dump parse fails and the title fallback
        // sees the same stdout
        let runner = FakeRunner::ok().with_stdout("Plain Title\n");
        let info = video_info(&runner, &PathBuf::from("yt-dlp"), "https://example.com/v")
            .await
            .unwrap();
        assert_eq!(info.display_title(), "Plain Title");
        assert_eq!(runner.call_count(), 2);
    }

    #[tokio::test]
    async fn playlist_entries_parse_line_by_line() {
        let runner = FakeRunner::ok().with_stdout(concat!(
            "{\"id\": \"a1\", \"title\": \"First\"}\n",
            "\n",
            "not json\n",
            "{\"url\": \"https://example.com/2\", \"title\": \"Second\"}\n",
        ));
        let entries = playlist_entries(&runner, &PathBuf::from("yt-dlp"), "u")
            .await
            .unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].display_title(1), "First");
        assert_eq!(
            entries[1].watch_url().unwrap(),
            "https://example.com/2"
        );
    }

    #[tokio::test]
    async fn probe_failure_surfaces_tool_error() {
        let runner = FakeRunner::failing();
        let err = playlist_entries(&runner, &PathBuf::from("yt-dlp"), "u")
            .await
            .unwrap_err();
        assert!(matches!(err, DownloadError::ToolFailed { .. }));
    }
}
