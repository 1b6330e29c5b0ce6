//! The yearly fetch workflow.
//!
//! `run` resolves `<prefix><year>` in the drive root, descends into the
//! configured subfolder and downloads its spreadsheets one after another.
//! Each step hands its result to the next; nothing is kept between runs.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use reqwest::Client;

use crate::config::RunConfig;
use crate::error::{CoreError, Result};
use crate::graph::{LibraryWalker, TokenProvider, find_by_name, resolve_subfolder};
use crate::report::RunReport;

/// A validated, strictly positive year.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Year(u32);

impl Year {
    /// The numeric year.
    #[must_use]
    pub const fn get(self) -> u32 {
        self.0
    }
}

impl TryFrom<i64> for Year {
    type Error = CoreError;

    fn try_from(value: i64) -> Result<Self> {
        u32::try_from(value)
            .ok()
            .filter(|&y| y > 0)
            .map(Self)
            .ok_or_else(|| {
                CoreError::Validation(format!("year must be a positive integer, got {value}"))
            })
    }
}

impl FromStr for Year {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        let value: i64 = s.trim().parse().map_err(|_| {
            CoreError::Validation(format!("year must be a positive integer, got {s:?}"))
        })?;
        Self::try_from(value)
    }
}

impl fmt::Display for Year {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Name of the yearly folder: the prefix followed directly by the year.
#[must_use]
pub fn folder_name_for(prefix: &str, year: Year) -> String {
    format!("{prefix}{year}")
}

/// Runs the fetch workflow for a fixed configuration.
#[derive(Debug)]
pub struct Fetcher {
    config: RunConfig,
}

impl Fetcher {
    /// Create a fetcher for the given configuration.
    #[must_use]
    pub const fn new(config: RunConfig) -> Self {
        Self { config }
    }

    /// The configuration this fetcher runs with.
    #[must_use]
    pub const fn config(&self) -> &RunConfig {
        &self.config
    }

    // Only connection setup is bounded; a slow transfer that keeps sending
    // bytes is allowed to finish.
    fn http_client(&self) -> Result<Client> {
        Client::builder()
            .connect_timeout(self.config.timeout())
            .build()
            .map_err(|e| CoreError::Api(format!("creating HTTP client: {e}")))
    }

    /// Acquire a token with a fresh provider and return a walker bound to it.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Auth`] if no token can be obtained.
    pub async fn connect(&self) -> Result<LibraryWalker> {
        let http_client = self.http_client()?;
        let provider = TokenProvider::new(http_client.clone(), &self.config);
        let credential = provider.get_token().await?;
        Ok(LibraryWalker::new(
            http_client,
            self.config.resource_url_base(),
            credential,
        ))
    }

    /// Validate `year` and run the workflow for it.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Validation`] for a year that is not positive,
    /// before any request is made. See [`Fetcher::run_for`] for the rest.
    pub async fn run(&self, year: i64) -> Result<RunReport> {
        let year = Year::try_from(year)?;
        self.run_for(year).await
    }

    /// Resolve the yearly folder and its subfolder, then download every
    /// spreadsheet in listing order.
    ///
    /// A missing subfolder and failed downloads do not fail the run; they
    /// are logged and recorded in the returned report.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Auth`] if authentication fails,
    /// [`CoreError::NotFound`] if the yearly folder is missing, and any
    /// listing error from [`LibraryWalker::list_children`].
    pub async fn run_for(&self, year: Year) -> Result<RunReport> {
        let cfg = &self.config;
        let (site_id, drive_id) = (cfg.site_id(), cfg.drive_id());
        let folder_name = folder_name_for(cfg.folder_prefix(), year);
        log::info!("fetching '{folder_name}/{}'", cfg.subfolder_name());

        let walker = self.connect().await?;

        let root = walker.list_children(site_id, drive_id, None).await?;
        let folder_id = find_by_name(&root, &folder_name).ok_or_else(|| {
            CoreError::NotFound(format!("folder '{folder_name}' not found in drive root"))
        })?;

        let folder_entries = walker
            .list_children(site_id, drive_id, Some(folder_id))
            .await?;
        let subfolder_id = resolve_subfolder(&folder_entries, cfg.subfolder_name());

        let files = match subfolder_id {
            Some(id) => walker.list_children(site_id, drive_id, Some(id)).await?,
            None => Vec::new(),
        };

        let mut report = RunReport::new(
            folder_name,
            cfg.subfolder_name().to_string(),
            cfg.download_path().to_path_buf(),
        );
        report.subfolder_found = subfolder_id.is_some();

        tokio::fs::create_dir_all(cfg.download_path()).await?;

        for entry in &files {
            let outcome = walker
                .download_file(site_id, drive_id, entry, cfg.download_path())
                .await;
            report.record(&entry.name, outcome);
        }

        log::info!(
            "downloaded {} of {} entries ({} failed) into {}",
            report.downloaded.len(),
            files.len(),
            report.failures().count(),
            cfg.download_path().display()
        );

        Ok(report)
    }

    /// Remove the configured download directory and everything in it.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Cleanup`] if the directory exists but cannot be removed.
    pub async fn drop_data_folder(&self) -> Result<()> {
        drop_data_folder(self.config.download_path()).await
    }
}

/// Recursively delete `path`. A missing directory counts as success.
///
/// # Errors
///
/// Returns [`CoreError::Cleanup`] for any failure other than "not found".
pub async fn drop_data_folder(path: &Path) -> Result<()> {
    match tokio::fs::remove_dir_all(path).await {
        Ok(()) => {
            log::info!("removed {}", path.display());
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            log::debug!("{} does not exist, nothing to remove", path.display());
            Ok(())
        }
        Err(e) => Err(CoreError::Cleanup(format!(
            "removing {}: {e}",
            path.display()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn year_accepts_positive_integers() {
        assert_eq!(Year::try_from(2024_i64).expect("valid").get(), 2024);
        assert_eq!("2024".parse::<Year>().expect("valid").get(), 2024);
        assert_eq!(" 1999 ".parse::<Year>().expect("valid").get(), 1999);
    }

    #[test]
    fn year_rejects_non_positive_and_non_integer_values() {
        for value in [0, -1, i64::from(u32::MAX) + 1] {
            assert!(matches!(Year::try_from(value), Err(CoreError::Validation(_))));
        }
        for text in ["", "twenty", "2024.5", "0"] {
            assert!(matches!(text.parse::<Year>(), Err(CoreError::Validation(_))));
        }
    }

    #[test]
    fn folder_name_concatenates_without_separator() {
        let year = Year::try_from(2024_i64).expect("valid");
        assert_eq!(folder_name_for("Provozní hodnoty ", year), "Provozní hodnoty 2024");
        assert_eq!(folder_name_for("Report", year), "Report2024");
    }

    #[tokio::test]
    async fn drop_data_folder_removes_tree() {
        let dir = tempfile::tempdir().expect("tempdir");
        let data = dir.path().join("dataFiles");
        std::fs::create_dir_all(data.join("nested")).expect("mkdir");
        std::fs::write(data.join("nested").join("a.xlsx"), b"x").expect("write");

        drop_data_folder(&data).await.expect("drop");
        assert!(!data.exists());
    }

    #[tokio::test]
    async fn drop_data_folder_ignores_missing_directory() {
        let dir = tempfile::tempdir().expect("tempdir");
        drop_data_folder(&dir.path().join("never-created"))
            .await
            .expect("missing dir is fine");
    }

    #[tokio::test]
    async fn drop_data_folder_reports_cleanup_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let not_a_dir = dir.path().join("dataFiles");
        std::fs::write(&not_a_dir, b"file").expect("write");

        let err = drop_data_folder(&not_a_dir).await.unwrap_err();
        assert!(matches!(err, CoreError::Cleanup(_)), "{err:?}");
    }
}
