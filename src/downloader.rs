use std::fs;
use std::path::Path;
use std::sync::Arc;

use crate::convert;
use crate::exec::{ExecResult, RetryExecutor, RetryPolicy, StopSignal, ToolRunner};
use crate::probe;
use crate::sanitize::{resolve_collision, sanitize_title, TempSweep};
use crate::tools::ToolPaths;
use crate::types::{
    DownloadMode, DownloadOutcome, DownloadPlan, DownloadTask, VideoInfo,
};

/// Shared read-only state for one run, threaded through every task.
pub struct DownloadContext {
    pub runner: Arc<dyn ToolRunner>,
    pub tools: ToolPaths,
    pub plan: DownloadPlan,
    pub policy: RetryPolicy,
    pub stop: Arc<StopSignal>,
}

/// Process one task to completion. Every path returns an outcome; nothing
/// escapes across the pool boundary.
pub async fn download_item(ctx: &DownloadContext, task: &DownloadTask) -> DownloadOutcome {
    let safe = sanitize_title(&task.title);
    let stem = match task.index {
        Some(i) => format!("{i:02}_{safe}"),
        None => safe,
    };
    let target = task.dest_dir.join(format!("{stem}.{}", ctx.plan.extension()));
    let output = match resolve_collision(&target) {
        Ok(path) => path,
        Err(e) => return DownloadOutcome::failed(task.clone(), e.to_string(), 0),
    };

    let sweep = TempSweep::new(&task.dest_dir, &stem);
    let exec = RetryExecutor::new(ctx.policy, ctx.stop.clone());

    let dl_args = vec![
        "-f".to_string(),
        ctx.plan.format_selector(),
        "-o".to_string(),
        format!("{}.%(ext)s", sweep.base().display()),
        "--newline".to_string(),
        "--no-playlist".to_string(),
        task.url.clone(),
    ];
    let attempts = match exec
        .run(
            ctx.runner.as_ref(),
            "yt-dlp",
            &ctx.tools.yt_dlp,
            &dl_args,
            Some(&sweep),
        )
        .await
    {
        ExecResult::Success { attempts, .. } => attempts,
        ExecResult::Exhausted { last, attempts } => {
            let _ = sweep.sweep();
            return DownloadOutcome::failed(task.clone(), last.error_text(), attempts);
        }
        ExecResult::Fatal { error, attempts } => {
            let _ = sweep.sweep();
            return DownloadOutcome::failed(task.clone(), error.to_string(), attempts);
        }
        ExecResult::Interrupted { attempts } => {
            let _ = sweep.sweep();
            return DownloadOutcome::interrupted(task.clone(), attempts);
        }
    };

    let temp_file = match sweep.find_downloaded() {
        Ok(Some(path)) => path,
        Ok(None) => {
            return DownloadOutcome::failed(
                task.clone(),
                "downloaded file not found".to_string(),
                attempts,
            )
        }
        Err(e) => return DownloadOutcome::failed(task.clone(), e.to_string(), attempts),
    };

    // tags for the audio container, best effort
    let info = if task.mode == DownloadMode::Audio {
        match probe::video_info(ctx.runner.as_ref(), &ctx.tools.yt_dlp, &task.url).await {
            Ok(info) => Some(info),
            Err(e) => {
                log::debug!("metadata probe failed for {}: {e}", task.url);
                Some(VideoInfo {
                    url: task.url.clone(),
                    title: Some(task.title.clone()),
                    ..VideoInfo::default()
                })
            }
        }
    } else {
        None
    };

    if ctx.plan.download_thumbnail {
        fetch_thumbnail(ctx, &exec, task, &output).await;
    }
    if ctx.plan.download_subtitles && task.mode == DownloadMode::Video {
        fetch_subtitles(ctx, &exec, task, &output).await;
    }

    let conv_args = convert::conversion_args(&ctx.plan, &temp_file, &output, info.as_ref());
    match exec
        .run(
            ctx.runner.as_ref(),
            "ffmpeg",
            &ctx.tools.ffmpeg,
            &conv_args,
            None,
        )
        .await
    {
        ExecResult::Success { .. } => {}
        ExecResult::Exhausted { last, attempts } => {
            discard_partials(&sweep, &output);
            return DownloadOutcome::failed(task.clone(), last.error_text(), attempts);
        }
        ExecResult::Fatal { error, attempts } => {
            discard_partials(&sweep, &output);
            return DownloadOutcome::failed(task.clone(), error.to_string(), attempts);
        }
        ExecResult::Interrupted { attempts } => {
            discard_partials(&sweep, &output);
            return DownloadOutcome::interrupted(task.clone(), attempts);
        }
    }

    if ctx.plan.download_thumbnail
        && task.mode == DownloadMode::Audio
        && matches!(ctx.plan.audio_format.as_str(), "m4a" | "mp3")
    {
        embed_cover(ctx, &exec, &output, info.as_ref()).await;
    }

    let _ = fs::remove_file(&temp_file);
    DownloadOutcome::succeeded(task.clone(), output, attempts)
}

fn discard_partials(sweep: &TempSweep, output: &Path) {
    let _ = sweep.sweep();
    let _ = fs::remove_file(output);
}

/// Pull the thumbnail next to the output and normalize it to `.jpg`.
async fn fetch_thumbnail(
    ctx: &DownloadContext,
    exec: &RetryExecutor,
    task: &DownloadTask,
    output: &Path,
) {
    let base = output.with_extension("");
    let args = vec![
        "--write-thumbnail".to_string(),
        "--skip-download".to_string(),
        "-o".to_string(),
        base.display().to_string(),
        task.url.clone(),
    ];
    let result = exec
        .run(ctx.runner.as_ref(), "yt-dlp", &ctx.tools.yt_dlp, &args, None)
        .await;
    if !matches!(result, ExecResult::Success { .. }) {
        log::debug!("thumbnail fetch failed for {}, skipping", task.url);
        return;
    }
    let thumb = output.with_extension("jpg");
    let Some(stem) = base.file_name().and_then(|s| s.to_str()) else {
        return;
    };
    let Some(dir) = output.parent() else { return };
    let Ok(entries) = fs::read_dir(dir) else { return };
    let prefix = format!("{stem}.");
    for entry in entries.flatten() {
        let name = entry.file_name();
        let name = name.to_string_lossy();
        let is_image = [".jpg", ".jpeg", ".png", ".webp"]
            .iter()
            .any(|e| name.ends_with(e));
        if name.starts_with(&prefix) && is_image && entry.path() != thumb {
            let _ = fs::rename(entry.path(), &thumb);
            break;
        }
    }
}

/// Pull subtitles next to the output, best effort.
async fn fetch_subtitles(
    ctx: &DownloadContext,
    exec: &RetryExecutor,
    task: &DownloadTask,
    output: &Path,
) {
    let auto = ctx.plan.subtitle_lang == "auto";
    let mut args = vec![if auto {
        "--write-auto-subs".to_string()
    } else {
        "--write-subs".to_string()
    }];
    args.push("--sub-lang".to_string());
    args.push(if auto {
        "all".to_string()
    } else {
        ctx.plan.subtitle_lang.clone()
    });
    args.push("--skip-download".to_string());
    args.push("-o".to_string());
    args.push(output.with_extension("").display().to_string());
    args.push(task.url.clone());
    let result = exec
        .run(ctx.runner.as_ref(), "yt-dlp", &ctx.tools.yt_dlp, &args, None)
        .await;
    if !matches!(result, ExecResult::Success { .. }) {
        log::debug!("subtitle fetch failed for {}, skipping", task.url);
    }
}

/// Re-mux the converted audio with the fetched cover attached; falls back to
/// a metadata-only copy when the attachment is rejected.
async fn embed_cover(
    ctx: &DownloadContext,
    exec: &RetryExecutor,
    output: &Path,
    info: Option<&VideoInfo>,
) {
    let cover = output.with_extension("jpg");
    if !cover.exists() {
        return;
    }
    // keep the container extension so ffmpeg picks the right muxer
    let staged = output.with_extension(format!("tagged.{}", ctx.plan.audio_format));
    let args = convert::embed_cover_args(output, &cover, &staged, info);
    let embedded = matches!(
        exec.run(ctx.runner.as_ref(), "ffmpeg", &ctx.tools.ffmpeg, &args, None)
            .await,
        ExecResult::Success { .. }
    );
    if !embedded {
        let fallback = convert::copy_metadata_args(output, &staged, info);
        if !matches!(
            exec.run(
                ctx.runner.as_ref(),
                "ffmpeg",
                &ctx.tools.ffmpeg,
                &fallback,
                None
            )
            .await,
            ExecResult::Success { .. }
        ) {
            let _ = fs::remove_file(&staged);
            return;
        }
    }
    if staged.exists() {
        let _ = fs::rename(&staged, output);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use crate::exec::testing::FakeRunner;
    use std::path::PathBuf;
    use std::time::Duration;
    use tempfile::tempdir;

    fn context(runner: FakeRunner, dir: &Path, mode: DownloadMode) -> DownloadContext {
        let mut plan = DownloadPlan::from_settings(&Settings::default());
        plan.mode = mode;
        plan.output_dir = dir.to_path_buf();
        DownloadContext {
            runner: Arc::new(runner),
            tools: ToolPaths {
                yt_dlp: PathBuf::from("yt-dlp"),
                ffmpeg: PathBuf::from("ffmpeg"),
            },
            plan,
            policy: RetryPolicy {
                max_attempts: 2,
                backoff: Duration::ZERO,
            },
            stop: Arc::new(StopSignal::new()),
        }
    }

    fn task(dir: &Path, title: &str, mode: DownloadMode) -> DownloadTask {
        DownloadTask {
            url: format!("https://example.com/{title}"),
            title: title.to_string(),
            mode,
            dest_dir: dir.to_path_buf(),
            index: None,
        }
    }

    #[tokio::test]
    async fn video_task_produces_converted_file() {
        let dir = tempdir().unwrap();
        let ctx = context(FakeRunner::ok(), dir.path(), DownloadMode::Video);
        let task = task(dir.path(), "Тестовое видео", DownloadMode::Video);

        let outcome = download_item(&ctx, &task).await;
        assert_eq!(outcome.status, crate::types::OutcomeStatus::Succeeded);
        assert_eq!(outcome.attempts, 1);
        let output = outcome.output.unwrap();
        assert_eq!(output, dir.path().join("testovoe_video.mp4"));
        assert!(output.exists());
        // temp download is gone
        assert!(!dir.path().join("testovoe_video.tmp.webm").exists());
    }

    #[tokio::test]
    async fn playlist_index_prefixes_the_filename() {
        let dir = tempdir().unwrap();
        let ctx = context(FakeRunner::ok(), dir.path(), DownloadMode::Video);
        let mut task = task(dir.path(), "эпизод", DownloadMode::Video);
        task.index = Some(7);

        let outcome = download_item(&ctx, &task).await;
        assert_eq!(
            outcome.output.unwrap(),
            dir.path().join("07_epizod.mp4")
        );
    }

    #[tokio::test]
    async fn exhausted_download_fails_with_captured_error() {
        let dir = tempdir().unwrap();
        let ctx = context(FakeRunner::failing(), dir.path(), DownloadMode::Video);
        let task = task(dir.path(), "clip", DownloadMode::Video);

        let outcome = download_item(&ctx, &task).await;
        assert_eq!(outcome.status, crate::types::OutcomeStatus::Failed);
        assert_eq!(outcome.attempts, 2);
        assert_eq!(outcome.error.as_deref(), Some("simulated failure"));
        assert!(outcome.output.is_none());
    }

    #[tokio::test]
    async fn empty_download_is_reported_not_converted() {
        let dir = tempdir().unwrap();
        let runner = FakeRunner::producing_nothing();
        let ctx = context(runner, dir.path(), DownloadMode::Video);
        let task = task(dir.path(), "clip", DownloadMode::Video);

        let outcome = download_item(&ctx, &task).await;
        assert_eq!(outcome.status, crate::types::OutcomeStatus::Failed);
        assert_eq!(outcome.error.as_deref(), Some("downloaded file not found"));
    }

    #[tokio::test]
    async fn existing_file_forces_a_distinct_output() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("clip.mp4"), b"old").unwrap();
        let ctx = context(FakeRunner::ok(), dir.path(), DownloadMode::Video);
        let task = task(dir.path(), "clip", DownloadMode::Video);

        let outcome = download_item(&ctx, &task).await;
        let output = outcome.output.unwrap();
        assert_ne!(output, dir.path().join("clip.mp4"));
        assert!(output.exists());
        assert_eq!(fs::read(dir.path().join("clip.mp4")).unwrap(), b"old");
    }

    #[tokio::test]
    async fn audio_task_converts_to_the_configured_container() {
        let dir = tempdir().unwrap();
        let ctx = context(FakeRunner::ok(), dir.path(), DownloadMode::Audio);
        let task = task(dir.path(), "песня", DownloadMode::Audio);

        let outcome = download_item(&ctx, &task).await;
        assert_eq!(outcome.status, crate::types::OutcomeStatus::Succeeded);
        assert_eq!(outcome.output.unwrap(), dir.path().join("pesnya.m4a"));
    }

    #[tokio::test]
    async fn stop_signal_interrupts_instead_of_failing() {
        let dir = tempdir().unwrap();
        let ctx = context(FakeRunner::ok(), dir.path(), DownloadMode::Video);
        ctx.stop.trigger();
        let task = task(dir.path(), "clip", DownloadMode::Video);

        let outcome = download_item(&ctx, &task).await;
        assert_eq!(outcome.status, crate::types::OutcomeStatus::Interrupted);
        assert!(outcome.output.is_none());
        assert!(outcome.error.is_none());
    }
}
