use anyhow::{anyhow, Result};
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use console::{style, Term};
use dialoguer::{theme::ColorfulTheme, Confirm, Input, Select};
use std::path::Path;
use std::sync::Arc;

use crate::config::{self, Settings};
use crate::exec::ToolRunner;
use crate::probe::{self, PlaylistEntry};
use crate::tools::ToolPaths;
use crate::types::{AggregateReport, DownloadMode, DownloadPlan, VideoInfo};

const VIDEO_QUALITIES: &[(&str, &str)] = &[
    ("4K (2160p)", "2160"),
    ("1080p", "1080"),
    ("720p", "720"),
    ("480p", "480"),
    ("360p", "360"),
    ("Best available", "best"),
];

const AUDIO_QUALITIES: &[(&str, &str)] = &[
    ("320 kbps", "320k"),
    ("256 kbps", "256k"),
    ("192 kbps", "192k"),
    ("128 kbps", "128k"),
];

const AUDIO_FORMATS: &[(&str, &str)] = &[
    ("M4A (AAC)", "m4a"),
    ("MP3", "mp3"),
    ("FLAC", "flac"),
    ("OPUS", "opus"),
];

const SUBTITLE_LANGS: &[(&str, &str)] = &[("Russian", "ru"), ("English", "en"), ("Auto", "auto")];

const BACK: &str = "← Back";

fn custom_theme() -> ColorfulTheme {
    ColorfulTheme {
        defaults_style: console::Style::new().cyan(),
        active_item_style: console::Style::new().cyan(),
        error_style: console::Style::new().red(),
        hint_style: console::Style::new().yellow(),
        values_style: console::Style::new().green(),
        inline_selections: true,
        ..Default::default()
    }
}

fn default_index(options: &[(&str, &str)], value: &str) -> usize {
    options.iter().position(|(_, v)| *v == value).unwrap_or(0)
}

/// What the preview step learned about the URL.
pub enum Source {
    Video(VideoInfo),
    Playlist(Vec<PlaylistEntry>),
}

pub struct WizardOutput {
    pub url: String,
    pub source: Source,
    pub plan: DownloadPlan,
}

enum StepResult {
    Next,
    Back,
    Cancel,
}

/// Walk the prompt sequence. Returns `None` when the user backs out.
pub async fn run_wizard(
    term: &Term,
    settings: &mut Settings,
    runner: Arc<dyn ToolRunner>,
    tools: &ToolPaths,
) -> Result<Option<WizardOutput>> {
    let theme = custom_theme();
    let mut url = String::new();
    let mut source: Option<Source> = None;
    let mut plan = DownloadPlan::from_settings(settings);
    let mut step = 0usize;

    loop {
        let result = match step {
            0 => {
                let entered = prompt_url(term, &theme, &mut url)?;
                match entered {
                    StepResult::Next => show_preview(term, runner.as_ref(), tools, &url, &mut source).await?,
                    other => other,
                }
            }
            1 => prompt_format(term, &theme, settings, &mut plan)?,
            2 => prompt_options(term, &theme, &source, &mut plan)?,
            3 => prompt_output_dir(term, &theme, settings, &mut plan)?,
            _ => confirm(term, &theme, &source, &plan)?,
        };
        match result {
            StepResult::Cancel => return Ok(None),
            StepResult::Back => step = step.saturating_sub(1),
            StepResult::Next => {
                if step >= 4 {
                    let source = source.ok_or_else(|| anyhow!("no source information"))?;
                    return Ok(Some(WizardOutput { url, source, plan }));
                }
                step += 1;
            }
        }
    }
}

fn prompt_url(term: &Term, theme: &ColorfulTheme, url: &mut String) -> Result<StepResult> {
    let input: String = Input::with_theme(theme)
        .with_prompt("Video or playlist URL")
        .with_initial_text(url.clone())
        .validate_with(|v: &String| -> std::result::Result<(), &str> {
            if v.trim().is_empty() {
                Err("Enter a URL")
            } else {
                Ok(())
            }
        })
        .interact_text_on(term)?;
    *url = input.trim().to_string();
    Ok(StepResult::Next)
}

async fn show_preview(
    term: &Term,
    runner: &dyn ToolRunner,
    tools: &ToolPaths,
    url: &str,
    source: &mut Option<Source>,
) -> Result<StepResult> {
    term.write_line(&format!("{}", style("Fetching info...").dim()))?;
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);
    if probe::is_playlist(url) {
        let entries = probe::playlist_entries(runner, &tools.yt_dlp, url).await?;
        table.set_header(vec!["Type", "Tracks"]);
        table.add_row(vec!["Playlist".to_string(), entries.len().to_string()]);
        *source = Some(Source::Playlist(entries));
    } else {
        let info = probe::video_info(runner, &tools.yt_dlp, url).await?;
        table.set_header(vec!["Type", "Title", "Uploader"]);
        table.add_row(vec![
            "Video",
            info.display_title(),
            info.uploader.as_deref().unwrap_or("-"),
        ]);
        *source = Some(Source::Video(info));
    }
    term.write_line(&format!("{table}"))?;
    Ok(StepResult::Next)
}

fn prompt_format(
    term: &Term,
    theme: &ColorfulTheme,
    settings: &Settings,
    plan: &mut DownloadPlan,
) -> Result<StepResult> {
    let modes = ["Video", "Audio", BACK];
    let picked = Select::with_theme(theme)
        .with_prompt("Format")
        .items(&modes)
        .default(0)
        .interact_on(term)?;
    plan.mode = match picked {
        0 => DownloadMode::Video,
        1 => DownloadMode::Audio,
        _ => return Ok(StepResult::Back),
    };

    match plan.mode {
        DownloadMode::Video => {
            let mut items: Vec<&str> = VIDEO_QUALITIES.iter().map(|(label, _)| *label).collect();
            items.push(BACK);
            let picked = Select::with_theme(theme)
                .with_prompt("Video quality")
                .items(&items)
                .default(default_index(VIDEO_QUALITIES, &settings.video_quality))
                .interact_on(term)?;
            if picked >= VIDEO_QUALITIES.len() {
                return Ok(StepResult::Back);
            }
            plan.video_quality = VIDEO_QUALITIES[picked].1.to_string();
        }
        DownloadMode::Audio => {
            let mut items: Vec<&str> = AUDIO_FORMATS.iter().map(|(label, _)| *label).collect();
            items.push(BACK);
            let picked = Select::with_theme(theme)
                .with_prompt("Audio format")
                .items(&items)
                .default(default_index(AUDIO_FORMATS, &settings.audio_format))
                .interact_on(term)?;
            if picked >= AUDIO_FORMATS.len() {
                return Ok(StepResult::Back);
            }
            plan.audio_format = AUDIO_FORMATS[picked].1.to_string();

            let mut items: Vec<&str> = AUDIO_QUALITIES.iter().map(|(label, _)| *label).collect();
            items.push(BACK);
            let picked = Select::with_theme(theme)
                .with_prompt("Audio quality")
                .items(&items)
                .default(default_index(AUDIO_QUALITIES, &settings.audio_quality))
                .interact_on(term)?;
            if picked >= AUDIO_QUALITIES.len() {
                return Ok(StepResult::Back);
            }
            plan.audio_quality = AUDIO_QUALITIES[picked].1.to_string();
        }
    }
    Ok(StepResult::Next)
}

fn prompt_options(
    term: &Term,
    theme: &ColorfulTheme,
    source: &Option<Source>,
    plan: &mut DownloadPlan,
) -> Result<StepResult> {
    plan.download_thumbnail = Confirm::with_theme(theme)
        .with_prompt("Download thumbnail?")
        .default(plan.download_thumbnail)
        .interact_on(term)?;

    if plan.mode == DownloadMode::Video {
        plan.download_subtitles = Confirm::with_theme(theme)
            .with_prompt("Download subtitles?")
            .default(plan.download_subtitles)
            .interact_on(term)?;
        if plan.download_subtitles {
            let items: Vec<&str> = SUBTITLE_LANGS.iter().map(|(label, _)| *label).collect();
            let picked = Select::with_theme(theme)
                .with_prompt("Subtitle language")
                .items(&items)
                .default(default_index(SUBTITLE_LANGS, &plan.subtitle_lang))
                .interact_on(term)?;
            plan.subtitle_lang = SUBTITLE_LANGS[picked].1.to_string();
        }
    }

    if let Some(Source::Playlist(entries)) = source {
        let total = entries.len();
        if total > 0 {
            let use_range = Confirm::with_theme(theme)
                .with_prompt("Download only a range of the playlist?")
                .default(false)
                .interact_on(term)?;
            if use_range {
                let start: usize = Input::with_theme(theme)
                    .with_prompt(format!("First track [1-{total}]"))
                    .default(1)
                    .validate_with(|v: &usize| -> std::result::Result<(), &str> {
                        if (1..=total).contains(v) {
                            Ok(())
                        } else {
                            Err("Track number out of range")
                        }
                    })
                    .interact_text_on(term)?;
                let end: usize = Input::with_theme(theme)
                    .with_prompt(format!("Last track [1-{total}]"))
                    .default(total)
                    .validate_with(|v: &usize| -> std::result::Result<(), &str> {
                        if (1..=total).contains(v) {
                            Ok(())
                        } else {
                            Err("Track number out of range")
                        }
                    })
                    .interact_text_on(term)?;
                plan.playlist_start = start;
                plan.playlist_end = Some(end);
            }
        }
    }
    Ok(StepResult::Next)
}

fn prompt_output_dir(
    term: &Term,
    theme: &ColorfulTheme,
    settings: &mut Settings,
    plan: &mut DownloadPlan,
) -> Result<StepResult> {
    let default_raw = match plan.mode {
        DownloadMode::Audio => settings.output_dir_audio.clone(),
        DownloadMode::Video => settings.output_dir_video.clone(),
    };
    let default_path = config::expand_home(&default_raw);

    let use_default = Confirm::with_theme(theme)
        .with_prompt(format!("Save to the default folder? [{default_raw}]"))
        .default(true)
        .interact_on(term)?;
    if use_default {
        plan.output_dir = default_path;
        return Ok(StepResult::Next);
    }

    let custom: String = Input::with_theme(theme)
        .with_prompt("Folder path")
        .default(default_path.display().to_string())
        .interact_text_on(term)?;
    let custom = custom.trim().to_string();
    plan.output_dir = config::expand_home(&custom);

    let save = Confirm::with_theme(theme)
        .with_prompt("Save this folder as the new default?")
        .default(false)
        .interact_on(term)?;
    if save {
        match plan.mode {
            DownloadMode::Audio => settings.output_dir_audio = custom,
            DownloadMode::Video => settings.output_dir_video = custom,
        }
        config::save_settings(&config::config_file()?, settings)?;
    }
    Ok(StepResult::Next)
}

fn confirm(
    term: &Term,
    theme: &ColorfulTheme,
    source: &Option<Source>,
    plan: &DownloadPlan,
) -> Result<StepResult> {
    let mode_label = match plan.mode {
        DownloadMode::Audio => format!("Audio ({})", plan.audio_format.to_uppercase()),
        DownloadMode::Video => format!("Video ({}p)", plan.video_quality),
    };

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["Ready to download", ""]);
    match source {
        Some(Source::Playlist(entries)) => {
            let total = entries.len();
            let start = plan.playlist_start;
            let end = plan.playlist_end.unwrap_or(total);
            table.add_row(vec!["Type".to_string(), "Playlist".to_string()]);
            if start > 1 || end < total {
                table.add_row(vec![
                    "Tracks".to_string(),
                    format!("{start}-{end} of {total}"),
                ]);
            } else {
                table.add_row(vec!["Tracks".to_string(), total.to_string()]);
            }
        }
        Some(Source::Video(info)) => {
            table.add_row(vec!["Type".to_string(), "Video".to_string()]);
            table.add_row(vec!["Title".to_string(), info.display_title().to_string()]);
        }
        None => {}
    }
    table.add_row(vec!["Format".to_string(), mode_label]);
    table.add_row(vec![
        "Folder".to_string(),
        plan.output_dir.display().to_string(),
    ]);
    let mut extras = Vec::new();
    if plan.download_thumbnail {
        extras.push("thumbnail");
    }
    if plan.download_subtitles {
        extras.push("subtitles");
    }
    if !extras.is_empty() {
        table.add_row(vec!["Extras".to_string(), extras.join(", ")]);
    }
    term.write_line(&format!("{table}"))?;

    let go = Confirm::with_theme(theme)
        .with_prompt("Start download?")
        .default(true)
        .interact_on(term)?;
    Ok(if go { StepResult::Next } else { StepResult::Cancel })
}

/// Post-run summary: counts, then the captured error per failed item.
pub fn print_report(term: &Term, report: &AggregateReport, output_dir: &Path) -> Result<()> {
    term.write_line("")?;
    term.write_line(&format!(
        "{} Downloaded {} of {} file(s) to {}",
        style("Done!").bold().green(),
        report.succeeded(),
        report.total(),
        output_dir.display()
    ))?;
    if report.failed() > 0 {
        term.write_line(&format!(
            "{}",
            style(format!("Failed to download {} item(s):", report.failed())).yellow()
        ))?;
        for outcome in report.failures() {
            let title: String = outcome.task.title.chars().take(50).collect();
            term.write_line(&format!(
                "  {} {}: {}",
                style("✗").red(),
                title,
                outcome.error.as_deref().unwrap_or("unknown error")
            ))?;
        }
    }
    if report.skipped() > 0 {
        term.write_line(&format!(
            "{}",
            style(format!("{} item(s) skipped after interrupt", report.skipped())).yellow()
        ))?;
    }
    Ok(())
}
