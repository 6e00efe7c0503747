use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, ErrorKind, Write};
use std::path::{Path, PathBuf};

use crate::error::{DedupError, Result};

pub const HISTORY_FILE: &str = ".history.jsonl";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HistoryAction {
    Deleted,
    Moved,
}

/// One applied cluster: the image kept and the names rejected next to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub timestamp: String,
    pub retained: String,
    pub culled: Vec<String>,
    pub action: HistoryAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_dir: Option<PathBuf>,
}

impl HistoryRecord {
    pub fn new(
        retained: String,
        culled: Vec<String>,
        action: HistoryAction,
        target_dir: Option<PathBuf>,
    ) -> Self {
        Self {
            timestamp: Utc::now().to_rfc3339(),
            retained,
            culled,
            action,
            target_dir,
        }
    }
}

/// Which `moved` records to undo.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selection {
    Latest,
    Index(usize),
    All,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RestoreReport {
    pub restored: Vec<String>,
    pub skipped: Vec<String>,
    pub records_removed: usize,
}

pub fn history_path(folder: &Path) -> PathBuf {
    folder.join(HISTORY_FILE)
}

pub fn append(folder: &Path, records: &[HistoryRecord]) -> Result<()> {
    if records.is_empty() {
        return Ok(());
    }
    let mut out = OpenOptions::new()
        .create(true)
        .append(true)
        .open(history_path(folder))?;
    for record in records {
        writeln!(out, "{}", serde_json::to_string(record)?)?;
    }
    Ok(())
}

/// All well-formed records, oldest first. A missing log reads as empty.
pub fn read_records(folder: &Path) -> Result<Vec<HistoryRecord>> {
    Ok(read_lines(folder)?
        .into_iter()
        .filter_map(|(record, _)| record)
        .collect())
}

fn read_lines(folder: &Path) -> Result<Vec<(Option<HistoryRecord>, String)>> {
    let path = history_path(folder);
    let file = match File::open(&path) {
        Ok(file) => file,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let mut lines = Vec::new();
    for (i, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<HistoryRecord>(&line) {
            Ok(record) => lines.push((Some(record), line)),
            Err(err) => {
                log::warn!("Skipping malformed history entry {}: {}", i, err);
                lines.push((None, line));
            }
        }
    }
    Ok(lines)
}

/// Move files of `moved` records back into `folder` and drop the restored
/// records from the log. Indices count `moved` records only.
pub fn restore(folder: &Path, selection: Selection) -> Result<RestoreReport> {
    let lines = read_lines(folder)?;
    let moved: Vec<usize> = lines
        .iter()
        .enumerate()
        .filter(|(_, (record, _))| {
            matches!(record, Some(r) if r.action == HistoryAction::Moved)
        })
        .map(|(i, _)| i)
        .collect();

    if moved.is_empty() {
        return Err(DedupError::History {
            message: "no 'moved' history records to restore".to_string(),
        });
    }

    let chosen: Vec<usize> = match selection {
        Selection::All => moved.clone(),
        Selection::Latest => vec![moved[moved.len() - 1]],
        Selection::Index(idx) => match moved.get(idx) {
            Some(&line) => vec![line],
            None => {
                return Err(DedupError::History {
                    message: format!(
                        "invalid history index {}; valid range is 0..{}",
                        idx,
                        moved.len() - 1
                    ),
                });
            }
        },
    };

    let mut report = RestoreReport::default();
    for &line_idx in &chosen {
        let Some(record) = &lines[line_idx].0 else {
            continue;
        };
        let target_dir = record
            .target_dir
            .clone()
            .unwrap_or_else(|| folder.join(crate::dedup::DEFAULT_MOVE_DIR));

        for name in &record.culled {
            let src = crate::dedup::move_destination(&target_dir, name);
            let dest = folder.join(name);
            if !src.exists() {
                log::warn!("Source file {} does not exist; skipping", src.display());
                report.skipped.push(name.clone());
                continue;
            }
            if dest.exists() {
                log::warn!("{} already exists; not overwriting", dest.display());
                report.skipped.push(name.clone());
                continue;
            }
            if let Some(parent) = dest.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::rename(&src, &dest)?;
            log::info!("Restored {} -> {}", src.display(), dest.display());
            report.restored.push(name.clone());
        }
    }

    let remaining: Vec<&str> = lines
        .iter()
        .enumerate()
        .filter(|(i, _)| !chosen.contains(i))
        .map(|(_, (_, line))| line.as_str())
        .collect();
    let content = if remaining.is_empty() {
        String::new()
    } else {
        remaining.join("\n") + "\n"
    };
    fs::write(history_path(folder), content)?;
    report.records_removed = chosen.len();

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_append_and_read_skips_malformed() {
        let temp_dir = TempDir::new().unwrap();
        let folder = temp_dir.path();

        append(
            folder,
            &[HistoryRecord::new(
                "a.jpg".into(),
                vec!["b.jpg".into()],
                HistoryAction::Deleted,
                None,
            )],
        )
        .unwrap();
        let mut raw = fs::read_to_string(history_path(folder)).unwrap();
        raw.push_str("not json\n");
        fs::write(history_path(folder), raw).unwrap();

        let records = read_records(folder).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].retained, "a.jpg");
        assert_eq!(records[0].action, HistoryAction::Deleted);
    }

    #[test]
    fn test_missing_log_reads_empty() {
        let temp_dir = TempDir::new().unwrap();
        assert!(read_records(temp_dir.path()).unwrap().is_empty());
    }

    #[test]
    fn test_restore_latest_moved() {
        let temp_dir = TempDir::new().unwrap();
        let folder = temp_dir.path();
        let target = folder.join("duplicates");
        fs::create_dir(&target).unwrap();
        fs::write(target.join("b.jpg"), b"b").unwrap();

        append(
            folder,
            &[
                HistoryRecord::new("x.jpg".into(), vec!["y.jpg".into()], HistoryAction::Deleted, None),
                HistoryRecord::new(
                    "a.jpg".into(),
                    vec!["b.jpg".into(), "gone.jpg".into()],
                    HistoryAction::Moved,
                    Some(target.clone()),
                ),
            ],
        )
        .unwrap();

        let report = restore(folder, Selection::Latest).unwrap();
        assert_eq!(report.restored, vec!["b.jpg".to_string()]);
        assert_eq!(report.skipped, vec!["gone.jpg".to_string()]);
        assert_eq!(report.records_removed, 1);
        assert!(folder.join("b.jpg").exists());

        let left = read_records(folder).unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].action, HistoryAction::Deleted);
    }

    #[test]
    fn test_restore_without_moved_records_fails() {
        let temp_dir = TempDir::new().unwrap();
        assert!(matches!(
            restore(temp_dir.path(), Selection::All),
            Err(DedupError::History { .. })
        ));
    }

    #[test]
    fn test_restore_bad_index() {
        let temp_dir = TempDir::new().unwrap();
        append(
            temp_dir.path(),
            &[HistoryRecord::new("a.jpg".into(), vec![], HistoryAction::Moved, None)],
        )
        .unwrap();
        assert!(restore(temp_dir.path(), Selection::Index(3)).is_err());
    }
}
