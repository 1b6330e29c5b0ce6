//! Core library for spfetch - pull a year's spreadsheets out of a SharePoint drive.
//!
//! This crate provides:
//! - Configuration loading and management
//! - XDG-compliant path resolution
//! - Schema and example config generation
//! - Client-credentials authentication against Microsoft Entra ID
//! - A Graph drive client for listing folders and streaming downloads
//! - The year-folder fetch workflow and its structured run report

pub mod config;
pub mod error;
pub mod fetch;
pub mod graph;
pub mod paths;
pub mod report;
pub mod schema;

pub use config::{
    AppConfig, GraphConfig, LibraryConfig, LogLevel, LoggingConfig, RunConfig, RuntimeConfig,
    Secret,
};
pub use error::{CoreError, Result};
pub use fetch::{Fetcher, Year, drop_data_folder, folder_name_for};
pub use graph::{
    Credential, LibraryWalker, RemoteEntry, TokenProvider, find_by_name, resolve_subfolder,
};
pub use paths::{AppPaths, default_config_dir};
pub use report::{DownloadOutcome, DownloadedFile, RunReport, SkipReason, SkippedFile};
pub use schema::{generate_example_config, generate_schema, write_generated_files};

/// Application name used for config directories and environment prefix.
pub const APP_NAME: &str = "spfetch";

/// Returns the environment variable prefix for this application.
#[must_use]
pub fn env_prefix() -> String {
    APP_NAME
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect()
}
