use anyhow::{anyhow, Result};
use ini::Ini;
use std::path::{Path, PathBuf};

/// Persisted defaults, one INI section at `~/.ytmvrc`.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub output_dir_video: String,
    pub output_dir_audio: String,
    pub video_quality: String,
    pub audio_quality: String,
    pub audio_format: String,
    pub download_thumbnails: bool,
    pub download_subtitles: bool,
    pub subtitle_lang: String,
    pub parallel_downloads: usize,
    pub max_retries: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            output_dir_video: "~/Movies/shorts".to_string(),
            output_dir_audio: "~/Movies/audios".to_string(),
            video_quality: "1080".to_string(),
            audio_quality: "192k".to_string(),
            audio_format: "m4a".to_string(),
            download_thumbnails: false,
            download_subtitles: false,
            subtitle_lang: "ru".to_string(),
            parallel_downloads: 3,
            max_retries: 3,
        }
    }
}

pub fn config_file() -> Result<PathBuf> {
    Ok(home_dir()?.join(".ytmvrc"))
}

pub fn history_file() -> Result<PathBuf> {
    Ok(home_dir()?.join(".ytmv_history"))
}

fn home_dir() -> Result<PathBuf> {
    dirs_next::home_dir().ok_or_else(|| anyhow!("Could not find home directory"))
}

/// Expand a leading `~` to the user's home directory.
pub fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix('~') {
        if let Some(home) = dirs_next::home_dir() {
            return home.join(rest.trim_start_matches('/'));
        }
    }
    PathBuf::from(path)
}

pub fn load_settings(config_file: &Path) -> Settings {
    let conf = Ini::load_from_file(config_file).unwrap_or_default();
    let section = conf.section(Some("settings"));
    let defaults = Settings::default();

    let output_dir_video = section
        .and_then(|s| s.get("output_dir_video"))
        .map(str::to_string)
        .unwrap_or(defaults.output_dir_video);
    let output_dir_audio = section
        .and_then(|s| s.get("output_dir_audio"))
        .map(str::to_string)
        .unwrap_or(defaults.output_dir_audio);
    let video_quality = section
        .and_then(|s| s.get("video_quality"))
        .map(str::to_string)
        .unwrap_or(defaults.video_quality);
    let audio_quality = section
        .and_then(|s| s.get("audio_quality"))
        .map(str::to_string)
        .unwrap_or(defaults.audio_quality);
    let audio_format = section
        .and_then(|s| s.get("audio_format"))
        .map(str::to_string)
        .unwrap_or(defaults.audio_format);
    let download_thumbnails = section
        .and_then(|s| s.get("download_thumbnails"))
        .map(|v| v.eq_ignore_ascii_case("true"))
        .unwrap_or(defaults.download_thumbnails);
    let download_subtitles = section
        .and_then(|s| s.get("download_subtitles"))
        .map(|v| v.eq_ignore_ascii_case("true"))
        .unwrap_or(defaults.download_subtitles);
    let subtitle_lang = section
        .and_then(|s| s.get("subtitle_lang"))
        .map(str::to_string)
        .unwrap_or(defaults.subtitle_lang);
    let parallel_downloads = section
        .and_then(|s| s.get("parallel_downloads"))
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(defaults.parallel_downloads);
    let max_retries = section
        .and_then(|s| s.get("max_retries"))
        .and_then(|v| v.parse::<u32>().ok())
        .unwrap_or(defaults.max_retries);

    Settings {
        output_dir_video,
        output_dir_audio,
        video_quality,
        audio_quality,
        audio_format,
        download_thumbnails,
        download_subtitles,
        subtitle_lang,
        parallel_downloads,
        max_retries,
    }
}

pub fn save_settings(config_file: &Path, settings: &Settings) -> Result<()> {
    let mut conf = Ini::new();
    conf.with_section(Some("settings"))
        .set("output_dir_video", settings.output_dir_video.clone())
        .set("output_dir_audio", settings.output_dir_audio.clone())
        .set("video_quality", settings.video_quality.clone())
        .set("audio_quality", settings.audio_quality.clone())
        .set("audio_format", settings.audio_format.clone())
        .set("download_thumbnails", settings.download_thumbnails.to_string())
        .set("download_subtitles", settings.download_subtitles.to_string())
        .set("subtitle_lang", settings.subtitle_lang.clone())
        .set("parallel_downloads", settings.parallel_downloads.to_string())
        .set("max_retries", settings.max_retries.to_string());
    conf.write_to_file(config_file)?;
    Ok(())
}
