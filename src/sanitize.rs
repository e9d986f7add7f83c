use chrono::Utc;
use lazy_static::lazy_static;
use regex::Regex;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

lazy_static! {
    static ref DISALLOWED: Regex = Regex::new(r"[^A-Za-z0-9_\s-]").unwrap();
    static ref SEPARATOR_RUNS: Regex = Regex::new(r"[_\s]+").unwrap();
}

const MAX_NAME_LEN: usize = 200;

fn translit(c: char) -> Option<&'static str> {
    Some(match c {
        'а' => "a",
        'б' => "b",
        'в' => "v",
        'г' => "g",
        'д' => "d",
        'е' => "e",
        'ё' => "yo",
        'ж' => "zh",
        'з' => "z",
        'и' => "i",
        'й' => "y",
        'к' => "k",
        'л' => "l",
        'м' => "m",
        'н' => "n",
        'о' => "o",
        'п' => "p",
        'р' => "r",
        'с' => "s",
        'т' => "t",
        'у' => "u",
        'ф' => "f",
        'х' => "kh",
        'ц' => "ts",
        'ч' => "ch",
        'ш' => "sh",
        'щ' => "shch",
        'ъ' => "",
        'ы' => "y",
        'ь' => "",
        'э' => "e",
        'ю' => "yu",
        'я' => "ya",
        'ї' => "yi",
        'і' => "i",
        'ґ' => "g",
        'є' => "ye",
        _ => return None,
    })
}

/// Lowercase and map Cyrillic letters to Latin sequences. Alphanumerics,
/// spaces, `_` and `-` pass through; everything else is dropped.
pub fn transliterate(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.to_lowercase().chars() {
        if let Some(mapped) = translit(ch) {
            out.push_str(mapped);
        } else if ch.is_alphanumeric() || matches!(ch, ' ' | '_' | '-') {
            out.push(ch);
        }
    }
    out
}

/// Turn an arbitrary title into a filesystem-safe stem. Idempotent.
pub fn sanitize_title(title: &str) -> String {
    let latin: String = transliterate(title).chars().filter(char::is_ascii).collect();
    let stripped = DISALLOWED.replace_all(&latin, "");
    let collapsed = SEPARATOR_RUNS.replace_all(&stripped, "_");
    let trimmed = collapsed.trim_matches(|c| c == '_' || c == '-');
    let mut name: String = trimmed.chars().take(MAX_NAME_LEN).collect();
    while name.ends_with('_') || name.ends_with('-') {
        name.pop();
    }
    if name.is_empty() {
        "video".to_string()
    } else {
        name
    }
}

/// If `path` already exists, append a timestamp (and, if needed, a counter)
/// before the extension until the candidate does not exist.
pub fn resolve_collision(path: &Path) -> io::Result<PathBuf> {
    if !path.try_exists()? {
        return Ok(path.to_path_buf());
    }
    let parent = path.parent().unwrap_or_else(|| Path::new("")).to_path_buf();
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("video")
        .to_string();
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| format!(".{e}"))
        .unwrap_or_default();
    let stamp = Utc::now().timestamp();
    let mut candidate = parent.join(format!("{stem}_{stamp}{ext}"));
    let mut n = 2;
    while candidate.try_exists()? {
        candidate = parent.join(format!("{stem}_{stamp}_{n}{ext}"));
        n += 1;
    }
    Ok(candidate)
}

/// Remove orphaned `*.tmp*` files left behind by earlier runs.
pub fn sweep_all_temp(dir: &Path) -> io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_name().to_string_lossy().contains(".tmp") {
            let _ = fs::remove_file(entry.path());
        }
    }
    Ok(())
}

/// Temp-file namespace of one item: `{stem}.tmp.*` in the destination
/// directory. Swept between retry attempts and after terminal failure.
#[derive(Debug, Clone)]
pub struct TempSweep {
    dir: PathBuf,
    stem: String,
}

impl TempSweep {
    pub fn new(dir: &Path, stem: &str) -> Self {
        Self {
            dir: dir.to_path_buf(),
            stem: stem.to_string(),
        }
    }

    /// Base path handed to the downloader's output template (`.%(ext)s` is
    /// appended by the caller).
    pub fn base(&self) -> PathBuf {
        self.dir.join(format!("{}.tmp", self.stem))
    }

    pub fn sweep(&self) -> io::Result<()> {
        let prefix = format!("{}.tmp", self.stem);
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            if entry.file_name().to_string_lossy().starts_with(&prefix) {
                let _ = fs::remove_file(entry.path());
            }
        }
        Ok(())
    }

    /// The file the downloader actually produced, whatever extension it chose.
    pub fn find_downloaded(&self) -> io::Result<Option<PathBuf>> {
        let prefix = format!("{}.tmp.", self.stem);
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            if entry.file_name().to_string_lossy().starts_with(&prefix) {
                return Ok(Some(entry.path()));
            }
        }
        Ok(None)
    }
}
