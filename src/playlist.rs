use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::Semaphore;

use crate::downloader::{self, DownloadContext};
use crate::types::{AggregateReport, DownloadOutcome, DownloadTask, OutcomeStatus};

/// Fan tasks out over a bounded worker pool and collect exactly one outcome
/// per task, in completion order. One item's failure never aborts siblings.
pub async fn run(
    ctx: Arc<DownloadContext>,
    tasks: Vec<DownloadTask>,
    pool_size: usize,
) -> AggregateReport {
    let bar = ProgressBar::new(tasks.len() as u64);
    bar.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len}")
            .unwrap()
            .progress_chars("█▓▒░-"),
    );

    let outcomes: Arc<Mutex<Vec<DownloadOutcome>>> =
        Arc::new(Mutex::new(Vec::with_capacity(tasks.len())));
    let semaphore = Arc::new(Semaphore::new(pool_size.max(1)));
    let mut handles = Vec::new();

    for task in tasks {
        let permit = semaphore.clone().acquire_owned().await.unwrap();
        let (ctx, outcomes, bar) = (ctx.clone(), outcomes.clone(), bar.clone());
        let submitted = task.clone();
        handles.push((
            submitted,
            tokio::spawn(async move {
                let outcome = if ctx.stop.is_interrupted() {
                    DownloadOutcome::skipped(task)
                } else {
                    downloader::download_item(&ctx, &task).await
                };
                drop(permit);
                report_line(&bar, &outcome);
                outcomes.lock().push(outcome);
                bar.inc(1);
            }),
        ));
    }

    for (task, handle) in handles {
        if handle.await.is_err() {
            // a panicked worker still owes the report its outcome
            outcomes
                .lock()
                .push(DownloadOutcome::failed(task, "worker panicked".to_string(), 0));
            bar.inc(1);
        }
    }
    bar.finish_and_clear();

    let outcomes = std::mem::take(&mut *outcomes.lock());
    AggregateReport { outcomes }
}

fn report_line(bar: &ProgressBar, outcome: &DownloadOutcome) {
    let title: String = outcome.task.title.chars().take(50).collect();
    match outcome.status {
        OutcomeStatus::Succeeded => bar.println(format!("  {} {}", style("✓").green(), title)),
        OutcomeStatus::Failed => bar.println(format!("  {} {}", style("✗").red(), title)),
        OutcomeStatus::Skipped | OutcomeStatus::Interrupted => {
            bar.println(format!("  {} {}", style("-").yellow(), title))
        }
    }
}
