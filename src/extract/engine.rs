//! Walk, match and flat-copy implementation.

use std::collections::HashSet;
use std::ffi::OsStr;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, SyncSender};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use chrono::{DateTime, Local};
use filetime::FileTime;
use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::net::Session;
use crate::targets::Target;

use super::filter::ExtractionFilter;
use super::progress::ExtractProgress;
use super::ExtractError;

/// Timestamp layout used in destination folder names.
const FOLDER_TIME_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";

/// Suffix of a copy that hasn't been committed to its final name yet.
const PARTIAL_SUFFIX: &str = ".part";

/// Configuration for the extraction engine.
#[derive(Debug, Clone)]
pub struct ExtractOptions {
    /// Upper bound on a single file copy (None for unbounded)
    pub copy_timeout: Option<Duration>,
    /// Folder name prefix for targets without a station label
    pub station_placeholder: String,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            copy_timeout: Some(Duration::from_secs(120)),
            station_placeholder: "Station".to_string(),
        }
    }
}

#[cfg(test)]
impl ExtractOptions {
    /// Set the per-file copy timeout
    pub fn with_copy_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.copy_timeout = timeout;
        self
    }
}

/// A file that failed to copy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileError {
    pub file: PathBuf,
    pub cause: String,
}

/// Result of extracting one target.
#[derive(Debug, Clone, Serialize)]
pub struct ExtractionJob {
    pub target: Target,
    pub destination: PathBuf,
    pub started_at: DateTime<Local>,
    pub files_total: u64,
    pub files_copied: u64,
    pub errors: Vec<FileError>,
}

impl ExtractionJob {
    /// Every counted file ended as either a copy or an error.
    pub fn is_accounted(&self) -> bool {
        self.files_copied + self.errors.len() as u64 == self.files_total
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}

/// Copies matching files out of an open session's share.
pub struct Extractor {
    options: ExtractOptions,
    progress_tx: Option<SyncSender<ExtractProgress>>,
}

impl Extractor {
    pub fn new(options: ExtractOptions) -> Self {
        Self {
            options,
            progress_tx: None,
        }
    }

    /// Report progress on `tx`. Without a sender progress is not reported.
    pub fn with_progress(mut self, tx: SyncSender<ExtractProgress>) -> Self {
        self.progress_tx = Some(tx);
        self
    }

    /// Extract every file of `session`'s share that `filter` selects.
    ///
    /// Individual copy failures are recorded in the job; only an empty
    /// filter, a closed session or an uncreatable destination fail the call.
    pub fn extract(
        &self,
        session: &Session,
        filter: &ExtractionFilter,
        destination_root: &Path,
    ) -> Result<ExtractionJob, ExtractError> {
        self.extract_with_abort(session, filter, destination_root, &AtomicBool::new(false))
    }

    /// Like [`Extractor::extract`], but once `connection_lost` is set the
    /// remaining files are recorded as failed without being read.
    pub fn extract_with_abort(
        &self,
        session: &Session,
        filter: &ExtractionFilter,
        destination_root: &Path,
        connection_lost: &AtomicBool,
    ) -> Result<ExtractionJob, ExtractError> {
        if !filter.has_extensions() {
            return Err(ExtractError::NoFileTypesSelected);
        }

        let share_root = match session.share_root() {
            Some(root) if session.state().is_open() => root,
            _ => {
                return Err(ExtractError::NotConnected {
                    address: session.address().to_string(),
                })
            }
        };

        let target = session.target().clone();
        let started_at = Local::now();
        let files = matching_files(share_root, filter);

        let folder = destination_folder_name(
            target.label.as_deref(),
            &self.options.station_placeholder,
            &target.address,
            &started_at,
        );
        let destination = create_destination(destination_root, &folder)?;

        info!(
            address = %target.address,
            destination = %destination.display(),
            files = files.len(),
            "extracting"
        );

        let mut job = ExtractionJob {
            target,
            destination,
            started_at,
            files_total: files.len() as u64,
            files_copied: 0,
            errors: Vec::new(),
        };

        self.send(ExtractProgress::Started {
            address: job.target.address.clone(),
            destination: job.destination.clone(),
            total: job.files_total,
        });

        self.copy_into(&files, &mut job, connection_lost);

        self.send(ExtractProgress::Completed {
            copied: job.files_copied,
            total: job.files_total,
            errors: job.errors.len() as u64,
        });

        info!(
            address = %job.target.address,
            copied = job.files_copied,
            total = job.files_total,
            errors = job.errors.len(),
            "extraction finished"
        );

        Ok(job)
    }

    /// Flat-copy `files` into the job's destination, one progress message
    /// per file.
    fn copy_into(&self, files: &[PathBuf], job: &mut ExtractionJob, connection_lost: &AtomicBool) {
        let mut used_names = HashSet::new();

        for (index, file) in files.iter().enumerate() {
            let copied = match file.file_name() {
                _ if connection_lost.load(Ordering::SeqCst) => {
                    job.errors.push(FileError {
                        file: file.clone(),
                        cause: "connection lost".to_string(),
                    });
                    false
                }
                Some(name) => {
                    let dest = job.destination.join(unique_name(name, &mut used_names));
                    match self.copy_file(file, &dest) {
                        Ok(_) => {
                            debug!(from = %file.display(), to = %dest.display(), "copied");
                            true
                        }
                        Err(e) => {
                            warn!(file = %file.display(), error = %e, "copy failed");
                            job.errors.push(FileError {
                                file: file.clone(),
                                cause: e.to_string(),
                            });
                            false
                        }
                    }
                }
                None => {
                    job.errors.push(FileError {
                        file: file.clone(),
                        cause: "path has no file name".to_string(),
                    });
                    false
                }
            };

            if copied {
                job.files_copied += 1;
            }

            self.send(ExtractProgress::FileProcessed {
                current: index as u64 + 1,
                total: job.files_total,
                file: file.clone(),
                copied,
            });
        }
    }

    fn copy_file(&self, from: &Path, to: &Path) -> io::Result<u64> {
        copy_bounded(from, to, self.options.copy_timeout, |from, to| fs::copy(from, to))
    }

    fn send(&self, progress: ExtractProgress) {
        if let Some(tx) = &self.progress_tx {
            let _ = tx.send(progress);
        }
    }
}

/// Files under `root` selected by `filter`, sorted by path.
///
/// Unreadable directories are skipped; an unreadable root gives no files.
fn matching_files(root: &Path, filter: &ExtractionFilter) -> Vec<PathBuf> {
    let entries: Vec<PathBuf> = WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) if entry.file_type().is_file() => Some(entry.into_path()),
            Ok(_) => None,
            Err(err) => {
                warn!(root = %root.display(), error = %err, "skipping unreadable entry");
                None
            }
        })
        .collect();

    let mut matched: Vec<PathBuf> = entries.into_par_iter().filter(|p| filter.matches(p)).collect();
    matched.sort();
    matched
}

/// Copy `from` to `to` through a `.part` file, giving up after `timeout`.
///
/// A copy that outlives the timeout is abandoned: its thread keeps running
/// until the read returns, then deletes the partial file instead of
/// committing it. Exactly one side claims the outcome, so a file reported
/// as timed out never appears under its final name.
fn copy_bounded<F>(from: &Path, to: &Path, timeout: Option<Duration>, copy: F) -> io::Result<u64>
where
    F: FnOnce(&Path, &Path) -> io::Result<u64> + Send + 'static,
{
    let claimed = Arc::new(AtomicBool::new(false));
    let job = {
        let (from, to, claimed) = (from.to_path_buf(), to.to_path_buf(), Arc::clone(&claimed));
        move || stage_copy(&from, &to, &claimed, copy)
    };

    let timeout = match timeout {
        Some(timeout) => timeout,
        None => return job(),
    };

    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let _ = tx.send(job());
    });

    match rx.recv_timeout(timeout) {
        Ok(result) => result,
        Err(RecvTimeoutError::Timeout) if !claimed.swap(true, Ordering::SeqCst) => {
            Err(io::Error::new(
                io::ErrorKind::TimedOut,
                format!("copy did not finish within {:?}", timeout),
            ))
        }
        // Finished at the deadline and is committing
        Err(RecvTimeoutError::Timeout) => rx
            .recv()
            .unwrap_or_else(|_| Err(io::Error::new(io::ErrorKind::Other, "copy thread exited"))),
        Err(RecvTimeoutError::Disconnected) => {
            Err(io::Error::new(io::ErrorKind::Other, "copy thread exited"))
        }
    }
}

fn stage_copy<F>(from: &Path, to: &Path, claimed: &AtomicBool, copy: F) -> io::Result<u64>
where
    F: FnOnce(&Path, &Path) -> io::Result<u64>,
{
    let part = partial_path(to);
    let bytes = match copy(from, &part) {
        Ok(bytes) => bytes,
        Err(e) => {
            let _ = fs::remove_file(&part);
            return Err(e);
        }
    };
    keep_modification_time(from, &part);

    if claimed.swap(true, Ordering::SeqCst) {
        let _ = fs::remove_file(&part);
        return Err(io::Error::new(io::ErrorKind::TimedOut, "copy abandoned after timeout"));
    }

    fs::rename(&part, to).map(|_| bytes).map_err(|e| {
        let _ = fs::remove_file(&part);
        e
    })
}

fn partial_path(to: &Path) -> PathBuf {
    let mut name = to.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(PARTIAL_SUFFIX);
    to.with_file_name(name)
}

/// Capture time lives in the file's mtime, so carry it over.
fn keep_modification_time(from: &Path, to: &Path) {
    let result = fs::metadata(from).and_then(|meta| {
        filetime::set_file_mtime(to, FileTime::from_last_modification_time(&meta))
    });
    if let Err(e) = result {
        warn!(file = %to.display(), error = %e, "could not keep modification time");
    }
}

/// `{label-or-placeholder}-{address}-{YYYY-MM-DD_HH-MM-SS}`, with characters
/// that can't appear in a folder name replaced.
pub fn destination_folder_name(
    label: Option<&str>,
    placeholder: &str,
    address: &str,
    started_at: &DateTime<Local>,
) -> String {
    let label = label.map(str::trim).filter(|l| !l.is_empty()).unwrap_or(placeholder);
    format!(
        "{}-{}-{}",
        sanitize(label),
        sanitize(address),
        started_at.format(FOLDER_TIME_FORMAT)
    )
}

fn sanitize(part: &str) -> String {
    part.chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect()
}

/// Create a new folder `name` under `root`, suffixing `-2`, `-3`, ... when a
/// folder of that name already exists.
fn create_destination(root: &Path, name: &str) -> Result<PathBuf, ExtractError> {
    fs::create_dir_all(root).map_err(|source| ExtractError::Destination {
        path: root.to_path_buf(),
        source,
    })?;

    let mut attempt = 1u32;
    loop {
        let candidate = if attempt == 1 {
            root.join(name)
        } else {
            root.join(format!("{}-{}", name, attempt))
        };

        match fs::create_dir(&candidate) {
            Ok(()) => return Ok(candidate),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => attempt += 1,
            Err(source) => return Err(ExtractError::Destination { path: candidate, source }),
        }
    }
}

/// File name for a flat copy: the base name, or `stem (n).ext` when an
/// earlier file of this job already took it.
fn unique_name(name: &OsStr, used: &mut HashSet<String>) -> PathBuf {
    let base = PathBuf::from(name);
    if used.insert(name.to_string_lossy().to_lowercase()) {
        return base;
    }

    let stem = base
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    let ext = base.extension().map(|e| e.to_string_lossy().to_string());

    let mut n = 2u32;
    loop {
        let candidate = match &ext {
            Some(ext) => format!("{} ({}).{}", stem, n, ext),
            None => format!("{} ({})", stem, n),
        };
        if used.insert(candidate.to_lowercase()) {
            return PathBuf::from(candidate);
        }
        n += 1;
    }
}
