//! Graph drive client: children listings and streamed downloads.
//!
//! Endpoints, relative to the configured base URL:
//! - `sites/{site}/drives/{drive}/root/children/General/children` (root listing)
//! - `sites/{site}/drives/{drive}/items/{id}/children` (folder listing)
//! - `sites/{site}/drives/{drive}/items/{id}/content` (file body)

use std::path::{Path, PathBuf};

use futures_util::StreamExt;
use reqwest::{Client, StatusCode};
use tokio::io::{AsyncWriteExt, BufWriter};

use crate::graph::auth::Credential;
use crate::graph::models::{RemoteEntry, is_spreadsheet, parse_listing};
use crate::report::{DownloadOutcome, DownloadedFile, SkipReason};
use crate::CoreError;

/// Size of the write buffer used when streaming a file body to disk.
pub const DOWNLOAD_CHUNK_SIZE: usize = 8192;

/// Walks a drive with an already acquired credential.
#[derive(Debug)]
pub struct LibraryWalker {
    http_client: Client,
    base_url: String,
    credential: Credential,
}

impl LibraryWalker {
    /// Create a walker for the Graph API at `base_url` (e.g. `https://graph.microsoft.com/v1.0`).
    #[must_use]
    pub fn new(http_client: Client, base_url: impl Into<String>, credential: Credential) -> Self {
        Self {
            http_client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            credential,
        }
    }

    fn drive_url(&self, site_id: &str, drive_id: &str) -> String {
        format!("{}/sites/{site_id}/drives/{drive_id}", self.base_url)
    }

    /// URL of a children listing; the drive's `General` folder when `folder_id` is `None`.
    #[must_use]
    pub fn children_url(&self, site_id: &str, drive_id: &str, folder_id: Option<&str>) -> String {
        let drive = self.drive_url(site_id, drive_id);
        match folder_id {
            Some(id) => format!("{drive}/items/{id}/children"),
            None => format!("{drive}/root/children/General/children"),
        }
    }

    /// URL of a file's content.
    #[must_use]
    pub fn content_url(&self, site_id: &str, drive_id: &str, item_id: &str) -> String {
        format!("{}/items/{item_id}/content", self.drive_url(site_id, drive_id))
    }

    /// List the children of a folder, or of the drive root when `folder_id` is `None`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Auth`] on 401/403, [`CoreError::Api`] on any other
    /// non-success status or transport failure, and [`CoreError::Parse`] if the
    /// body is not JSON or has no `value` array.
    pub async fn list_children(
        &self,
        site_id: &str,
        drive_id: &str,
        folder_id: Option<&str>,
    ) -> Result<Vec<RemoteEntry>, CoreError> {
        let url = self.children_url(site_id, drive_id, folder_id);
        log::debug!("listing {url}");

        let response = self
            .http_client
            .get(&url)
            .bearer_auth(self.credential.secret())
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| CoreError::Api(format!("listing request failed: {e}")))?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            let text = response.text().await.unwrap_or_default();
            return Err(CoreError::Auth(format!(
                "graph refused the credential: {status} - {text}"
            )));
        }
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(CoreError::Api(format!("listing failed: {status} - {text}")));
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| CoreError::Parse(format!("listing body is not JSON: {e}")))?;

        let entries = parse_listing(&body)?;
        log::debug!("{} entries", entries.len());
        Ok(entries)
    }

    /// Download one entry into `target_dir` if it is a spreadsheet file.
    ///
    /// Never fails: non-spreadsheets and folders are skipped without a
    /// request, and HTTP, transport and write failures are logged and
    /// returned as [`DownloadOutcome::Skipped`].
    pub async fn download_file(
        &self,
        site_id: &str,
        drive_id: &str,
        entry: &RemoteEntry,
        target_dir: &Path,
    ) -> DownloadOutcome {
        log::info!("processing file: {}", entry.name);

        if entry.is_folder {
            log::debug!("skipping folder {}", entry.name);
            return DownloadOutcome::Skipped(SkipReason::Folder);
        }
        if !is_spreadsheet(&entry.name) {
            log::debug!("skipping {}: not a spreadsheet", entry.name);
            return DownloadOutcome::Skipped(SkipReason::NotASpreadsheet);
        }

        let Some(path) = local_path(target_dir, &entry.name) else {
            log::warn!("refusing to write {:?} outside {}", entry.name, target_dir.display());
            return DownloadOutcome::Skipped(SkipReason::Write(format!(
                "unsafe file name {:?}",
                entry.name
            )));
        };

        if let Err(e) = tokio::fs::create_dir_all(target_dir).await {
            log::warn!("cannot create {}: {e}", target_dir.display());
            return DownloadOutcome::Skipped(SkipReason::Write(e.to_string()));
        }

        let url = self.content_url(site_id, drive_id, &entry.id);
        let response = match self
            .http_client
            .get(&url)
            .bearer_auth(self.credential.secret())
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                log::warn!("failed to download {}: {e}", entry.name);
                return DownloadOutcome::Skipped(SkipReason::Request(e.to_string()));
            }
        };

        let status = response.status();
        if status != StatusCode::OK {
            log::warn!("failed to download {}: {status}", entry.name);
            return DownloadOutcome::Skipped(SkipReason::HttpStatus(status.as_u16()));
        }

        match write_body(response, &path).await {
            Ok(bytes) => {
                log::info!("downloaded {} ({bytes} bytes) to {}", entry.name, path.display());
                DownloadOutcome::Downloaded(DownloadedFile {
                    name: entry.name.clone(),
                    path,
                    bytes,
                })
            }
            Err(reason) => {
                log::warn!("error writing file {}: {reason}", entry.name);
                if let Err(e) = tokio::fs::remove_file(&path).await {
                    log::debug!("could not remove partial file {}: {e}", path.display());
                }
                DownloadOutcome::Skipped(reason)
            }
        }
    }
}

/// Join a remote name onto the target directory, rejecting anything that is
/// not a single plain path component.
fn local_path(target_dir: &Path, name: &str) -> Option<PathBuf> {
    let candidate = Path::new(name);
    let is_plain = candidate.file_name().is_some_and(|f| f == name);
    is_plain.then(|| target_dir.join(candidate))
}

async fn write_body(response: reqwest::Response, path: &Path) -> Result<u64, SkipReason> {
    let file = tokio::fs::File::create(path)
        .await
        .map_err(|e| SkipReason::Write(e.to_string()))?;
    let mut writer = BufWriter::with_capacity(DOWNLOAD_CHUNK_SIZE, file);
    let mut stream = response.bytes_stream();
    let mut written = 0_u64;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| SkipReason::Request(e.to_string()))?;
        writer
            .write_all(&chunk)
            .await
            .map_err(|e| SkipReason::Write(e.to_string()))?;
        written += chunk.len() as u64;
    }

    writer
        .flush()
        .await
        .map_err(|e| SkipReason::Write(e.to_string()))?;
    Ok(written)
}

/// First entry whose name equals `name`, in listing order.
#[must_use]
pub fn find_by_name<'a>(entries: &'a [RemoteEntry], name: &str) -> Option<&'a str> {
    entries
        .iter()
        .find(|entry| entry.name == name)
        .map(|entry| entry.id.as_str())
}

/// First folder whose name equals `name`. Logs an error when there is none.
#[must_use]
pub fn resolve_subfolder<'a>(entries: &'a [RemoteEntry], name: &str) -> Option<&'a str> {
    let found = entries
        .iter()
        .find(|entry| entry.is_folder && entry.name == name)
        .map(|entry| entry.id.as_str());
    if found.is_none() {
        log::error!("{name} folder not found");
    }
    found
}
