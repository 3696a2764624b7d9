//! Per-cell completion checkpoint
//!
//! Keys are `"{row}-{col}"` where `row` is the spreadsheet row number (data
//! index + 2, the header being row 1) and `col` the header index.

use crate::table::SheetTable;
use glossary_common::Result;
use std::collections::BTreeMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub const DEFAULT_CHECKPOINT_FILE: &str = "checkpoint.json";

/// `checkpoint.json` next to the sheet being filled
pub fn default_checkpoint_path(input: &Path) -> PathBuf {
    input
        .parent()
        .map(|dir| dir.join(DEFAULT_CHECKPOINT_FILE))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CHECKPOINT_FILE))
}

pub fn cell_key(row: usize, col: usize) -> String {
    format!("{}-{}", row, col)
}

fn parse_key(key: &str) -> Option<(usize, usize)> {
    let (row, col) = key.split_once('-')?;
    Some((row.parse().ok()?, col.parse().ok()?))
}

#[derive(Debug, Clone)]
pub struct Checkpoint {
    path: PathBuf,
    entries: BTreeMap<String, bool>,
}

impl Checkpoint {
    /// Load from `path`
    ///
    /// A missing file yields an empty checkpoint. A corrupt file is moved
    /// aside to `<file>.corrupted.<unix_ts>` and the run starts fresh.
    pub fn load(path: &Path) -> Result<Self> {
        let mut checkpoint = Self {
            path: path.to_path_buf(),
            entries: BTreeMap::new(),
        };
        if !path.exists() {
            return Ok(checkpoint);
        }

        let content = std::fs::read_to_string(path)?;
        match serde_json::from_str(&content) {
            Ok(entries) => checkpoint.entries = entries,
            Err(e) => {
                let mut backup: OsString = path.as_os_str().to_owned();
                backup.push(format!(".corrupted.{}", chrono::Utc::now().timestamp()));
                warn!(
                    path = %path.display(),
                    error = %e,
                    "Corrupted checkpoint file, starting fresh"
                );
                std::fs::rename(path, PathBuf::from(backup))?;
            }
        }
        Ok(checkpoint)
    }

    /// Delete the checkpoint file, if any
    pub fn reset(path: &Path) -> Result<()> {
        if path.exists() {
            std::fs::remove_file(path)?;
            info!(path = %path.display(), "Checkpoint reset");
        }
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, row: usize, col: usize) -> bool {
        self.entries.contains_key(&cell_key(row, col))
    }

    pub fn mark(&mut self, row: usize, col: usize) {
        self.entries.insert(cell_key(row, col), true);
    }

    /// Write to `<path>.tmp`, then rename
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let mut tmp: OsString = self.path.as_os_str().to_owned();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        std::fs::write(&tmp, serde_json::to_string_pretty(&self.entries)?)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    /// Drop entries whose cell is out of range or still empty, so those
    /// cells are queued again. Unparseable keys are left alone.
    ///
    /// Returns the number of entries removed; saves when non-zero.
    pub fn reconcile(&mut self, table: &SheetTable) -> Result<usize> {
        let stale: Vec<String> = self
            .entries
            .keys()
            .filter(|key| match parse_key(key) {
                None => false,
                Some((row, col)) => {
                    row < 2
                        || row - 2 >= table.row_count()
                        || col >= table.column_count()
                        || table.cell(row - 2, col).is_empty()
                }
            })
            .cloned()
            .collect();

        for key in &stale {
            self.entries.remove(key);
        }
        if !stale.is_empty() {
            self.save()?;
            info!(removed = stale.len(), "Reconciled checkpoint: removed stale entries");
        }
        Ok(stale.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> SheetTable {
        SheetTable::new(
            vec!["Term".into(), "Overview".into()],
            vec![
                vec!["Kernel Trick".into(), "Implicit feature map".into()],
                vec!["Margin".into(), "".into()],
            ],
        )
    }

    #[test]
    fn test_default_path_next_to_input() {
        assert_eq!(
            default_checkpoint_path(Path::new("/data/terms.csv")),
            PathBuf::from("/data/checkpoint.json")
        );
    }

    #[test]
    fn test_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let checkpoint = Checkpoint::load(&dir.path().join("checkpoint.json")).unwrap();
        assert!(checkpoint.is_empty());
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("checkpoint.json");
        let mut checkpoint = Checkpoint::load(&path).unwrap();
        checkpoint.mark(2, 1);
        checkpoint.save().unwrap();

        let reloaded = Checkpoint::load(&path).unwrap();
        assert!(reloaded.contains(2, 1));
        assert!(!reloaded.contains(3, 1));
        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.contains("\"2-1\": true"));
    }

    #[test]
    fn test_corrupt_file_moved_aside() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("checkpoint.json");
        std::fs::write(&path, "{not json").unwrap();

        let checkpoint = Checkpoint::load(&path).unwrap();
        assert!(checkpoint.is_empty());
        assert!(!path.exists());

        let backups: Vec<String> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(backups.len(), 1);
        assert!(backups[0].starts_with("checkpoint.json.corrupted."));
    }

    #[test]
    fn test_reconcile_drops_stale_entries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("checkpoint.json");
        let mut checkpoint = Checkpoint::load(&path).unwrap();
        checkpoint.mark(2, 1); // filled
        checkpoint.mark(3, 1); // still blank
        checkpoint.mark(9, 1); // row out of range
        checkpoint.mark(2, 7); // column out of range
        checkpoint.entries.insert("legacy".into(), true);

        let removed = checkpoint.reconcile(&table()).unwrap();
        assert_eq!(removed, 3);
        assert!(checkpoint.contains(2, 1));
        assert!(checkpoint.entries.contains_key("legacy"));
        assert!(path.exists());
    }
}
