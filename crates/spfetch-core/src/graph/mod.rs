//! Microsoft Graph access for SharePoint document libraries.
//!
//! This module provides:
//! - Client-credentials token acquisition with an in-memory cache
//! - Drive listing and streamed file downloads
//! - The listing entry model and name/folder lookups

pub mod auth;
pub mod client;
pub mod models;

pub use auth::{AuthenticationError, Credential, TokenProvider};
pub use client::{LibraryWalker, find_by_name, resolve_subfolder};
pub use models::{RemoteEntry, SPREADSHEET_EXTENSIONS, is_spreadsheet};
