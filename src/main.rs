mod config;
mod convert;
mod downloader;
mod exec;
mod history;
mod playlist;
mod probe;
mod sanitize;
mod tools;
mod types;
mod ui;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use console::{style, Term};
use std::fs;
use std::sync::Arc;

use downloader::DownloadContext;
use exec::{RetryPolicy, StopSignal, SystemRunner, ToolRunner};
use probe::PlaylistEntry;
use types::{DownloadPlan, DownloadTask, OutcomeStatus};
use ui::Source;

/// Interactive video/audio downloader wizard for yt-dlp supported sites.
#[derive(Parser)]
#[command(name = "ytmv", version, about)]
struct Cli {
    /// Show download history
    #[arg(long)]
    history: bool,
    /// Show configuration file locations and current settings
    #[arg(short, long)]
    config: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    let term = Term::stdout();

    if cli.history {
        return show_history(&term);
    }
    if cli.config {
        return show_config(&term);
    }

    let mut settings = config::load_settings(&config::config_file()?);

    let stop = Arc::new(StopSignal::new());
    {
        let stop = stop.clone();
        ctrlc::set_handler(move || stop.trigger())
            .context("failed to install interrupt handler")?;
    }

    let tools = tools::resolve().await?;
    let runner: Arc<dyn ToolRunner> = Arc::new(SystemRunner::new(stop.clone()));

    let Some(wizard) = ui::run_wizard(&term, &mut settings, runner.clone(), &tools).await? else {
        term.write_line(&format!("{}", style("Cancelled").yellow()))?;
        return Ok(());
    };

    fs::create_dir_all(&wizard.plan.output_dir)?;
    if let Err(e) = sanitize::sweep_all_temp(&wizard.plan.output_dir) {
        log::warn!("temp cleanup failed: {e}");
    }

    let ctx = Arc::new(DownloadContext {
        runner,
        tools,
        plan: wizard.plan.clone(),
        policy: RetryPolicy::new(settings.max_retries),
        stop: stop.clone(),
    });

    term.write_line("")?;
    match wizard.source {
        Source::Playlist(entries) => {
            let tasks = playlist_tasks(&wizard.plan, entries);
            term.write_line(&format!(
                "{} {} track(s), {} mode, into {}",
                style("Downloading playlist:").bold().cyan(),
                tasks.len(),
                wizard.plan.mode.as_str(),
                wizard.plan.output_dir.display()
            ))?;
            let report = playlist::run(ctx, tasks, settings.parallel_downloads).await;
            ui::print_report(&term, &report, &wizard.plan.output_dir)?;

            let mut entries: Vec<history::HistoryEntry> = report
                .outcomes
                .iter()
                .filter_map(history::HistoryEntry::from_outcome)
                .collect();
            entries.push(history::HistoryEntry::new(
                &wizard.url,
                &format!("Playlist ({} items)", report.total()),
                &wizard.plan.output_dir.display().to_string(),
                &format!("playlist_{}", wizard.plan.mode.as_str()),
            ));
            history::append(&config::history_file()?, entries)?;

            if stop.is_interrupted() {
                std::process::exit(130);
            }
        }
        Source::Video(info) => {
            let task = DownloadTask {
                url: wizard.url.clone(),
                title: info.display_title().to_string(),
                mode: wizard.plan.mode,
                dest_dir: wizard.plan.output_dir.clone(),
                index: None,
            };
            term.write_line(&format!(
                "{} {}",
                style("Downloading:").bold().cyan(),
                task.title
            ))?;
            let outcome = downloader::download_item(&ctx, &task).await;
            match outcome.status {
                OutcomeStatus::Succeeded => {
                    if let Some(entry) = history::HistoryEntry::from_outcome(&outcome) {
                        history::append(&config::history_file()?, vec![entry])?;
                    }
                    let output = outcome
                        .output
                        .ok_or_else(|| anyhow!("missing output path"))?;
                    term.write_line(&format!(
                        "\n{} Saved to {}",
                        style("Done!").bold().green(),
                        output.display()
                    ))?;
                }
                OutcomeStatus::Interrupted | OutcomeStatus::Skipped => {
                    term.write_line(&format!("\n{}", style("Download cancelled").yellow()))?;
                    std::process::exit(130);
                }
                OutcomeStatus::Failed => {
                    return Err(anyhow!(
                        "download failed: {}",
                        outcome.error.unwrap_or_else(|| "unknown error".to_string())
                    ));
                }
            }
        }
    }
    Ok(())
}

/// Apply the range filter and turn playlist entries into tasks. Positions
/// are 1-based within the full playlist so filenames stay stable.
fn playlist_tasks(plan: &DownloadPlan, entries: Vec<PlaylistEntry>) -> Vec<DownloadTask> {
    let total = entries.len();
    let start = plan.playlist_start.max(1);
    let end = plan.playlist_end.unwrap_or(total).min(total);
    let mut tasks = Vec::new();
    for (offset, entry) in entries
        .into_iter()
        .enumerate()
        .skip(start - 1)
        .take(end.saturating_sub(start - 1))
    {
        let position = offset + 1;
        let Some(url) = entry.watch_url() else {
            log::warn!("playlist entry {position} has no usable URL, skipping");
            continue;
        };
        tasks.push(DownloadTask {
            url,
            title: entry.display_title(position),
            mode: plan.mode,
            dest_dir: plan.output_dir.clone(),
            index: Some(position),
        });
    }
    tasks
}

fn show_history(term: &Term) -> Result<()> {
    let entries = history::load(&config::history_file()?);
    if entries.is_empty() {
        term.write_line(&format!("{}", style("History is empty").yellow()))?;
        return Ok(());
    }
    term.write_line(&format!("{}", style("Download history").bold()))?;
    term.write_line(&format!("{}", history::render_table(&entries)))?;
    Ok(())
}

fn show_config(term: &Term) -> Result<()> {
    let config_file = config::config_file()?;
    term.write_line(&format!(
        "{} {}",
        style("Config file:").cyan(),
        config_file.display()
    ))?;
    term.write_line(&format!(
        "{} {}",
        style("History file:").cyan(),
        config::history_file()?.display()
    ))?;
    if config_file.exists() {
        term.write_line(&format!("\n{}", style("Current settings:").green()))?;
        term.write_line(fs::read_to_string(&config_file)?.trim_end())?;
    } else {
        term.write_line(&format!(
            "{}",
            style("No config file yet; it will be created on first save.").yellow()
        ))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use crate::types::DownloadMode;
    use std::path::PathBuf;

    fn entries(n: usize) -> Vec<PlaylistEntry> {
        (1..=n)
            .map(|i| PlaylistEntry {
                id: Some(format!("id{i}")),
                url: None,
                title: Some(format!("Track {i}")),
            })
            .collect()
    }

    fn plan() -> DownloadPlan {
        let mut plan = DownloadPlan::from_settings(&Settings::default());
        plan.output_dir = PathBuf::from("/tmp/out");
        plan
    }

    #[test]
    fn full_playlist_maps_every_entry() {
        let tasks = playlist_tasks(&plan(), entries(4));
        assert_eq!(tasks.len(), 4);
        assert_eq!(tasks[0].index, Some(1));
        assert_eq!(tasks[3].index, Some(4));
        assert_eq!(tasks[0].url, "https://www.youtube.com/watch?v=id1");
        assert_eq!(tasks[0].mode, DownloadMode::Video);
    }

    #[test]
    fn range_filter_keeps_absolute_positions() {
        let mut plan = plan();
        plan.playlist_start = 2;
        plan.playlist_end = Some(3);
        let tasks = playlist_tasks(&plan, entries(5));
        assert_eq!(tasks.len(), 2);
        assert_eq!(tasks[0].index, Some(2));
        assert_eq!(tasks[0].title, "Track 2");
        assert_eq!(tasks[1].index, Some(3));
    }

    #[test]
    fn out_of_bounds_range_is_clamped() {
        let mut plan = plan();
        plan.playlist_start = 4;
        plan.playlist_end = Some(99);
        let tasks = playlist_tasks(&plan, entries(5));
        assert_eq!(tasks.len(), 2);
        assert_eq!(tasks[0].index, Some(4));

        plan.playlist_start = 6;
        plan.playlist_end = Some(2);
        assert!(playlist_tasks(&plan, entries(5)).is_empty());
    }

    #[test]
    fn unusable_entries_are_dropped() {
        let mut list = entries(2);
        list.push(PlaylistEntry {
            id: None,
            url: None,
            title: Some("broken".to_string()),
        });
        let tasks = playlist_tasks(&plan(), list);
        assert_eq!(tasks.len(), 2);
    }
}
