//! Types for the importer module.

use serde::{Deserialize, Serialize};

use crate::library::LibraryFile;

/// What happened to a single file.
#[derive(Debug, Clone)]
pub enum FileOutcome {
    /// Linked or copied into the upload area and recorded.
    Imported(LibraryFile),
    /// Content hash already present in the library.
    Duplicate,
    /// A file with the same name and type is already recorded.
    Skipped,
}

/// Summary of one import run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportReport {
    pub imported: usize,
    pub duplicates: usize,
    pub skipped: usize,
    pub failed: usize,
    /// Folders visited (found or created).
    pub folders: usize,
    /// Files created by this run, in walk order.
    pub file_ids: Vec<i64>,
    /// Stopped before the walk finished.
    pub cancelled: bool,
}

impl ImportReport {
    pub fn record(&mut self, outcome: &FileOutcome) {
        match outcome {
            FileOutcome::Imported(file) => {
                self.imported += 1;
                self.file_ids.push(file.id);
            }
            FileOutcome::Duplicate => self.duplicates += 1,
            FileOutcome::Skipped => self.skipped += 1,
        }
    }

    /// Fold another report into this one.
    pub fn merge(&mut self, other: ImportReport) {
        self.imported += other.imported;
        self.duplicates += other.duplicates;
        self.skipped += other.skipped;
        self.failed += other.failed;
        self.folders += other.folders;
        self.file_ids.extend(other.file_ids);
        self.cancelled |= other.cancelled;
    }
}
