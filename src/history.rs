use anyhow::Result;
use chrono::{DateTime, Local};
use comfy_table::{presets::UTF8_FULL, Cell, ContentArrangement, Table};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::types::{DownloadOutcome, OutcomeStatus};

const MAX_ENTRIES: usize = 100;
const SHOWN_ENTRIES: usize = 20;

/// Append-only record of completed downloads, newest first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub timestamp: DateTime<Local>,
    pub url: String,
    pub title: String,
    pub output: String,
    pub mode: String,
}

impl HistoryEntry {
    pub fn new(url: &str, title: &str, output: &str, mode: &str) -> Self {
        Self {
            timestamp: Local::now(),
            url: url.to_string(),
            title: title.to_string(),
            output: output.to_string(),
            mode: mode.to_string(),
        }
    }

    pub fn from_outcome(outcome: &DownloadOutcome) -> Option<Self> {
        if outcome.status != OutcomeStatus::Succeeded {
            return None;
        }
        let output = outcome.output.as_ref()?.to_string_lossy().into_owned();
        Some(Self::new(
            &outcome.task.url,
            &outcome.task.title,
            &output,
            outcome.task.mode.as_str(),
        ))
    }
}

/// Missing or corrupt history reads as empty.
pub fn load(path: &Path) -> Vec<HistoryEntry> {
    let Ok(raw) = fs::read_to_string(path) else {
        return Vec::new();
    };
    serde_json::from_str(&raw).unwrap_or_default()
}

/// Prepend entries (given oldest-to-newest) and cap the file.
pub fn append(path: &Path, new_entries: Vec<HistoryEntry>) -> Result<()> {
    let mut combined = new_entries;
    combined.reverse();
    combined.extend(load(path));
    combined.truncate(MAX_ENTRIES);
    fs::write(path, serde_json::to_string_pretty(&combined)?)?;
    Ok(())
}

pub fn render_table(history: &[HistoryEntry]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_header(vec!["Date", "Title", "Mode"])
        .set_content_arrangement(ContentArrangement::Dynamic);
    for entry in history.iter().take(SHOWN_ENTRIES) {
        let title = if entry.title.chars().count() > 40 {
            let short: String = entry.title.chars().take(40).collect();
            format!("{short}...")
        } else {
            entry.title.clone()
        };
        table.add_row(vec![
            Cell::new(entry.timestamp.format("%d.%m %H:%M")),
            Cell::new(title),
            Cell::new(&entry.mode),
        ]);
    }
    table
}
