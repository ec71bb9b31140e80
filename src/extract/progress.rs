//! Progress reporting types for the extraction engine.

use std::path::PathBuf;

/// Progress of one target's extraction, sent after every file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractProgress {
    /// Matching files have been counted and copying is about to begin
    Started {
        /// Address of the target being extracted
        address: String,
        /// Folder receiving the copies
        destination: PathBuf,
        /// Number of files that will be processed
        total: u64,
    },

    /// One file has been processed, successfully or not
    FileProcessed {
        /// Files processed so far, including failures
        current: u64,
        /// Fixed total for this target
        total: u64,
        /// Remote path of the file
        file: PathBuf,
        /// Whether the copy succeeded
        copied: bool,
    },

    /// The target's extraction finished
    Completed {
        copied: u64,
        total: u64,
        errors: u64,
    },
}
