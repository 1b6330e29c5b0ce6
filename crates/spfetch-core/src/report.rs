//! Structured outcome of a fetch run.

use std::fmt;
use std::path::PathBuf;

use serde::Serialize;

/// A file written to the download directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DownloadedFile {
    /// Remote file name, also used as the local file name.
    pub name: String,
    /// Local path the body was written to.
    pub path: PathBuf,
    /// Number of bytes written.
    pub bytes: u64,
}

/// Why a listed entry did not end up on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum SkipReason {
    /// Name does not end in a spreadsheet extension.
    NotASpreadsheet,
    /// Entry is a folder.
    Folder,
    /// The content endpoint answered with a non-200 status.
    HttpStatus(u16),
    /// The content request failed in transport.
    Request(String),
    /// The body could not be written locally.
    Write(String),
}

impl SkipReason {
    /// Whether this skip means an expected file is missing, as opposed to
    /// an entry that was filtered out on purpose.
    #[must_use]
    pub const fn is_failure(&self) -> bool {
        !matches!(self, Self::NotASpreadsheet | Self::Folder)
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotASpreadsheet => write!(f, "not a spreadsheet"),
            Self::Folder => write!(f, "folder"),
            Self::HttpStatus(status) => write!(f, "HTTP {status}"),
            Self::Request(msg) => write!(f, "request failed: {msg}"),
            Self::Write(msg) => write!(f, "write failed: {msg}"),
        }
    }
}

/// A listed entry that was not downloaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedFile {
    /// Remote entry name.
    pub name: String,
    /// Why it was skipped.
    pub reason: SkipReason,
}

/// Result of downloading a single entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadOutcome {
    /// The file was written.
    Downloaded(DownloadedFile),
    /// The file was not written.
    Skipped(SkipReason),
}

/// Everything a run did, so the caller can judge partial success.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    /// Name of the yearly folder that was resolved.
    pub folder_name: String,
    /// Name of the subfolder that was looked up.
    pub subfolder_name: String,
    /// Whether the subfolder existed inside the yearly folder.
    pub subfolder_found: bool,
    /// Local download directory.
    pub download_dir: PathBuf,
    /// Files written, in listing order.
    pub downloaded: Vec<DownloadedFile>,
    /// Entries not written, in listing order.
    pub skipped: Vec<SkippedFile>,
}

impl RunReport {
    /// Start an empty report for the given folder pair.
    #[must_use]
    pub const fn new(folder_name: String, subfolder_name: String, download_dir: PathBuf) -> Self {
        Self {
            folder_name,
            subfolder_name,
            subfolder_found: false,
            download_dir,
            downloaded: Vec::new(),
            skipped: Vec::new(),
        }
    }

    /// Record the outcome for one entry.
    pub fn record(&mut self, name: &str, outcome: DownloadOutcome) {
        match outcome {
            DownloadOutcome::Downloaded(file) => self.downloaded.push(file),
            DownloadOutcome::Skipped(reason) => self.skipped.push(SkippedFile {
                name: name.to_string(),
                reason,
            }),
        }
    }

    /// Skipped entries that represent a failed download.
    pub fn failures(&self) -> impl Iterator<Item = &SkippedFile> {
        self.skipped.iter().filter(|s| s.reason.is_failure())
    }

    /// True when the subfolder was found and every spreadsheet was written.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.subfolder_found && self.failures().next().is_none()
    }

    /// Total bytes written.
    #[must_use]
    pub fn total_bytes(&self) -> u64 {
        self.downloaded.iter().map(|f| f.bytes).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report() -> RunReport {
        RunReport::new(
            "Provozní hodnoty 2024".to_string(),
            "Jednotky".to_string(),
            PathBuf::from("/tmp/data"),
        )
    }

    #[test]
    fn filtered_entries_do_not_make_a_run_incomplete() {
        let mut r = report();
        r.subfolder_found = true;
        r.record(
            "a.xlsx",
            DownloadOutcome::Downloaded(DownloadedFile {
                name: "a.xlsx".to_string(),
                path: PathBuf::from("/tmp/data/a.xlsx"),
                bytes: 12,
            }),
        );
        r.record("b.txt", DownloadOutcome::Skipped(SkipReason::NotASpreadsheet));
        r.record("old", DownloadOutcome::Skipped(SkipReason::Folder));

        assert!(r.is_complete());
        assert_eq!(r.total_bytes(), 12);
        assert_eq!(r.skipped.len(), 2);
    }

    #[test]
    fn failed_download_or_missing_subfolder_is_incomplete() {
        let mut r = report();
        assert!(!r.is_complete(), "subfolder not found");

        r.subfolder_found = true;
        r.record("c.xlsm", DownloadOutcome::Skipped(SkipReason::HttpStatus(500)));
        assert!(!r.is_complete());
        assert_eq!(r.failures().count(), 1);
    }

    #[test]
    fn skip_reason_serializes_with_kind_tag() {
        let json = serde_json::to_value(SkipReason::HttpStatus(404)).expect("serialize");
        assert_eq!(json, serde_json::json!({"kind": "http_status", "detail": 404}));
        let json = serde_json::to_value(SkipReason::NotASpreadsheet).expect("serialize");
        assert_eq!(json, serde_json::json!({"kind": "not_a_spreadsheet"}));
    }
}
