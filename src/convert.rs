use std::path::Path;

use crate::types::{DownloadMode, DownloadPlan, VideoInfo};

fn path_str(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// ffmpeg codec and bitrate argument for an audio container.
fn audio_codec(format: &str, configured_bitrate: &str) -> (&'static str, String) {
    match format {
        "m4a" => ("aac", configured_bitrate.to_string()),
        "mp3" => ("libmp3lame", configured_bitrate.to_string()),
        "flac" => ("flac", "8".to_string()),
        "opus" => ("libopus", "192k".to_string()),
        _ => ("aac", "192k".to_string()),
    }
}

fn metadata_args(args: &mut Vec<String>, info: Option<&VideoInfo>) {
    if let Some(info) = info {
        if let Some(title) = &info.title {
            args.push("-metadata".to_string());
            args.push(format!("title={title}"));
        }
        if let Some(artist) = &info.uploader {
            args.push("-metadata".to_string());
            args.push(format!("artist={artist}"));
        }
    }
}

/// Convert the downloaded temp file into the final container.
pub fn conversion_args(
    plan: &DownloadPlan,
    input: &Path,
    output: &Path,
    info: Option<&VideoInfo>,
) -> Vec<String> {
    let mut args = vec!["-y".to_string(), "-i".to_string(), path_str(input)];
    match plan.mode {
        DownloadMode::Audio => {
            let (codec, bitrate) = audio_codec(&plan.audio_format, &plan.audio_quality);
            args.push("-c:a".to_string());
            args.push(codec.to_string());
            args.push("-b:a".to_string());
            args.push(bitrate);
            metadata_args(&mut args, info);
        }
        DownloadMode::Video => {
            for a in [
                "-c:v", "libx264", "-preset", "fast", "-c:a", "aac", "-b:a", "192k",
                "-movflags", "+faststart",
            ] {
                args.push(a.to_string());
            }
            if plan.video_quality != "best" {
                args.push("-vf".to_string());
                args.push(format!("scale=-2:{}", plan.video_quality));
            }
        }
    }
    args.push(path_str(output));
    args
}

/// Attach cover art to a converted audio file (m4a/mp3 only).
pub fn embed_cover_args(
    input: &Path,
    cover: &Path,
    output: &Path,
    info: Option<&VideoInfo>,
) -> Vec<String> {
    let mut args = vec![
        "-y".to_string(),
        "-i".to_string(),
        path_str(input),
        "-i".to_string(),
        path_str(cover),
        "-map".to_string(),
        "0".to_string(),
        "-map".to_string(),
        "1".to_string(),
        "-c:v".to_string(),
        "mjpeg".to_string(),
        "-disposition:v:0".to_string(),
        "attached_pic".to_string(),
    ];
    metadata_args(&mut args, info);
    args.push(path_str(output));
    args
}

/// Metadata-only rewrite, used when cover embedding fails.
pub fn copy_metadata_args(input: &Path, output: &Path, info: Option<&VideoInfo>) -> Vec<String> {
    let mut args = vec![
        "-y".to_string(),
        "-i".to_string(),
        path_str(input),
        "-c".to_string(),
        "copy".to_string(),
    ];
    metadata_args(&mut args, info);
    args.push(path_str(output));
    args
}
