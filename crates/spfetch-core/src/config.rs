//! Configuration types and loading for the application.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Result;
use config::{Config, Environment, File, FileFormat};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::env_prefix;
use crate::error::CoreError;
use crate::paths::{expand_str_path, write_default_config};
use crate::AppPaths;

/// Default Microsoft Entra ID authority host.
pub const DEFAULT_AUTHORITY_HOST: &str = "https://login.microsoftonline.com";
/// Default scope requested for app-only Graph access.
pub const DEFAULT_SCOPE: &str = "https://graph.microsoft.com/.default";
/// Default Graph API base URL.
pub const DEFAULT_RESOURCE_URL_BASE: &str = "https://graph.microsoft.com/v1.0";
/// Default SharePoint site ID.
pub const DEFAULT_SITE_ID: &str = "401afd8d-64ec-4e9d-87ec-1a39fd2a4c58";
/// Default document library drive ID.
pub const DEFAULT_DRIVE_ID: &str =
    "b!jf0aQOxknU6H7Bo5_SpMWMjp5nA7vjNKtxvdrybzT3dEaDML2YwjS7LwfrvufMoA";
/// Prefix of the yearly folder name; the year is appended without a separator.
pub const DEFAULT_FOLDER_PREFIX: &str = "Provozní hodnoty ";
/// Subfolder of the yearly folder that holds the spreadsheets.
pub const DEFAULT_SUBFOLDER_NAME: &str = "Jednotky";
/// Default local download directory.
pub const DEFAULT_DOWNLOAD_PATH: &str = "./dataFiles/";
/// Default HTTP connect timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Main application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
#[schemars(
    title = "Application Configuration",
    description = "Main configuration for the application"
)]
pub struct AppConfig {
    /// JSON Schema reference for editor support.
    #[serde(rename = "$schema", default, skip_serializing_if = "Option::is_none")]
    #[schemars(skip)]
    pub schema: Option<String>,

    /// Logging configuration.
    pub logging: LoggingConfig,

    /// Runtime behavior configuration.
    pub runtime: RuntimeConfig,

    /// Identity provider and Graph drive settings.
    pub graph: GraphConfig,

    /// Folder layout inside the drive and the local download target.
    pub library: LibraryConfig,
}

impl AppConfig {
    /// Load configuration from file and environment, creating defaults if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file cannot be read, parsed, or written.
    pub fn load(paths: &AppPaths, dry_run: bool) -> Result<Self> {
        if !paths.config_file.exists() {
            if dry_run {
                log::info!(
                    "dry-run: would create default config at {}",
                    paths.config_file.display()
                );
            } else {
                write_default_config(&paths.config_file)?;
            }
        }

        Self::load_from_path(&paths.config_file)
    }

    /// Load configuration from a specific path.
    ///
    /// Values are layered: built-in defaults, then the TOML file, then
    /// `SPFETCH__SECTION__KEY` environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file cannot be read or parsed.
    pub fn load_from_path(config_file: &Path) -> Result<Self> {
        let env_prefix = env_prefix();
        let built = Config::builder()
            .set_default("logging.level", "info")?
            .set_default("runtime.timeout", DEFAULT_TIMEOUT_SECS as i64)?
            .set_default("graph.authority_host", DEFAULT_AUTHORITY_HOST)?
            .set_default("graph.scope", DEFAULT_SCOPE)?
            .set_default("graph.resource_url_base", DEFAULT_RESOURCE_URL_BASE)?
            .set_default("graph.site_id", DEFAULT_SITE_ID)?
            .set_default("graph.drive_id", DEFAULT_DRIVE_ID)?
            .set_default("library.folder_prefix", DEFAULT_FOLDER_PREFIX)?
            .set_default("library.subfolder_name", DEFAULT_SUBFOLDER_NAME)?
            .set_default("library.download_path", DEFAULT_DOWNLOAD_PATH)?
            .add_source(
                File::from(config_file)
                    .format(FileFormat::Toml)
                    .required(false),
            )
            .add_source(Environment::with_prefix(env_prefix.as_str()).separator("__"))
            .build()?;

        let mut config: Self = built.try_deserialize()?;

        if let Some(ref file) = config.logging.file {
            let expanded = expand_str_path(file)?;
            config.logging.file = Some(expanded.display().to_string());
        }

        Ok(config)
    }

    /// Build the validated, immutable settings for one fetch run.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Validation`] if a credential or the download path
    /// is missing, or [`CoreError::Path`] if the download path cannot be expanded.
    pub fn run_config(&self) -> crate::Result<RunConfig> {
        let download_path = expand_str_path(&self.library.download_path)
            .map_err(|e| CoreError::Path(format!("{e:#}")))?;

        let mut builder = RunConfig::builder()
            .download_path(download_path)
            .authority_host(&self.graph.authority_host)
            .scope(&self.graph.scope)
            .resource_url_base(&self.graph.resource_url_base)
            .site_id(&self.graph.site_id)
            .drive_id(&self.graph.drive_id)
            .folder_prefix(&self.library.folder_prefix)
            .subfolder_name(&self.library.subfolder_name)
            .timeout(Duration::from_secs(
                self.runtime.timeout.unwrap_or(DEFAULT_TIMEOUT_SECS),
            ));

        if let Some(ref tenant_id) = self.graph.tenant_id {
            builder = builder.tenant_id(tenant_id);
        }
        if let Some(ref client_id) = self.graph.client_id {
            builder = builder.client_id(client_id);
        }
        if let Some(ref secret) = self.graph.client_secret {
            builder = builder.client_secret(secret.clone());
        }

        builder.build()
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
#[schemars(description = "Logging configuration")]
pub struct LoggingConfig {
    /// Log level (error, warn, info, debug, trace).
    pub level: LogLevel,

    /// Optional path for log file output. Supports ~ and environment variables.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
}

/// Log level enumeration for schema validation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Only emit error-level messages.
    Error,
    /// Emit warnings and errors.
    Warn,
    /// Emit informational messages and above (default).
    #[default]
    Info,
    /// Emit debug diagnostics and above.
    Debug,
    /// Emit all messages including fine-grained traces.
    Trace,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Error => write!(f, "error"),
            Self::Warn => write!(f, "warn"),
            Self::Info => write!(f, "info"),
            Self::Debug => write!(f, "debug"),
            Self::Trace => write!(f, "trace"),
        }
    }
}

/// Runtime behavior configuration.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
#[schemars(description = "Runtime behavior configuration")]
pub struct RuntimeConfig {
    /// HTTP connect timeout in seconds (default: 60). Transfers themselves are
    /// not time-limited.
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schemars(range(min = 1))]
    pub timeout: Option<u64>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            timeout: Some(DEFAULT_TIMEOUT_SECS),
        }
    }
}

/// Identity provider and Graph drive settings.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
#[schemars(description = "Identity provider and Graph drive settings")]
pub struct GraphConfig {
    /// Directory (tenant) ID of the app registration.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,

    /// Application (client) ID of the app registration.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,

    /// Client secret. Prefer the `CLIENT_SECRET` environment variable over
    /// storing it here.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<Secret>,

    /// Authority host used for the token endpoint.
    pub authority_host: String,

    /// Scope requested in the client-credentials exchange.
    pub scope: String,

    /// Base URL of the Graph API, including the version segment.
    pub resource_url_base: String,

    /// SharePoint site ID.
    pub site_id: String,

    /// Document library drive ID.
    pub drive_id: String,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            tenant_id: None,
            client_id: None,
            client_secret: None,
            authority_host: DEFAULT_AUTHORITY_HOST.to_string(),
            scope: DEFAULT_SCOPE.to_string(),
            resource_url_base: DEFAULT_RESOURCE_URL_BASE.to_string(),
            site_id: DEFAULT_SITE_ID.to_string(),
            drive_id: DEFAULT_DRIVE_ID.to_string(),
        }
    }
}

/// Folder layout inside the drive and the local download target.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
#[schemars(description = "Folder layout inside the drive and the local download target")]
pub struct LibraryConfig {
    /// Prefix of the yearly folder; the year is appended directly.
    pub folder_prefix: String,

    /// Name of the subfolder inside the yearly folder.
    pub subfolder_name: String,

    /// Local download directory. Supports ~ and environment variables.
    pub download_path: String,
}

impl Default for LibraryConfig {
    fn default() -> Self {
        Self {
            folder_prefix: DEFAULT_FOLDER_PREFIX.to_string(),
            subfolder_name: DEFAULT_SUBFOLDER_NAME.to_string(),
            download_path: DEFAULT_DOWNLOAD_PATH.to_string(),
        }
    }
}

/// A secret string that never shows up in `Debug` output.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    /// Wrap a secret value.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Borrow the raw secret.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(***)")
    }
}

impl From<String> for Secret {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Validated settings for a fetch run.
///
/// Built once per invocation through [`RunConfig::builder`] and never mutated
/// afterwards. Construction fails unless tenant ID, client ID, client secret
/// and download path are all non-empty.
#[derive(Debug, Clone)]
pub struct RunConfig {
    tenant_id: String,
    client_id: String,
    client_secret: Secret,
    download_path: PathBuf,
    site_id: String,
    drive_id: String,
    resource_url_base: String,
    folder_prefix: String,
    subfolder_name: String,
    authority_host: String,
    scope: String,
    timeout: Duration,
}

impl RunConfig {
    /// Start building a run configuration with default drive settings.
    #[must_use]
    pub fn builder() -> RunConfigBuilder {
        RunConfigBuilder::default()
    }

    /// Directory (tenant) ID.
    #[must_use]
    pub fn tenant_id(&self) -> &str {
        &self.tenant_id
    }

    /// Application (client) ID.
    #[must_use]
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Client secret.
    #[must_use]
    pub const fn client_secret(&self) -> &Secret {
        &self.client_secret
    }

    /// Local download directory.
    #[must_use]
    pub fn download_path(&self) -> &Path {
        &self.download_path
    }

    /// SharePoint site ID.
    #[must_use]
    pub fn site_id(&self) -> &str {
        &self.site_id
    }

    /// Drive ID.
    #[must_use]
    pub fn drive_id(&self) -> &str {
        &self.drive_id
    }

    /// Graph base URL without a trailing slash.
    #[must_use]
    pub fn resource_url_base(&self) -> &str {
        &self.resource_url_base
    }

    /// Yearly folder prefix.
    #[must_use]
    pub fn folder_prefix(&self) -> &str {
        &self.folder_prefix
    }

    /// Subfolder name inside the yearly folder.
    #[must_use]
    pub fn subfolder_name(&self) -> &str {
        &self.subfolder_name
    }

    /// Authority host without a trailing slash.
    #[must_use]
    pub fn authority_host(&self) -> &str {
        &self.authority_host
    }

    /// Requested scope.
    #[must_use]
    pub fn scope(&self) -> &str {
        &self.scope
    }

    /// HTTP connect timeout.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Token endpoint for the configured tenant.
    #[must_use]
    pub fn token_url(&self) -> String {
        format!(
            "{}/{}/oauth2/v2.0/token",
            self.authority_host, self.tenant_id
        )
    }
}

/// Builder for [`RunConfig`].
#[derive(Debug, Clone)]
pub struct RunConfigBuilder {
    tenant_id: Option<String>,
    client_id: Option<String>,
    client_secret: Option<Secret>,
    download_path: Option<PathBuf>,
    site_id: String,
    drive_id: String,
    resource_url_base: String,
    folder_prefix: String,
    subfolder_name: String,
    authority_host: String,
    scope: String,
    timeout: Duration,
}

impl Default for RunConfigBuilder {
    fn default() -> Self {
        Self {
            tenant_id: None,
            client_id: None,
            client_secret: None,
            download_path: None,
            site_id: DEFAULT_SITE_ID.to_string(),
            drive_id: DEFAULT_DRIVE_ID.to_string(),
            resource_url_base: DEFAULT_RESOURCE_URL_BASE.to_string(),
            folder_prefix: DEFAULT_FOLDER_PREFIX.to_string(),
            subfolder_name: DEFAULT_SUBFOLDER_NAME.to_string(),
            authority_host: DEFAULT_AUTHORITY_HOST.to_string(),
            scope: DEFAULT_SCOPE.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

impl RunConfigBuilder {
    /// Set the tenant ID.
    #[must_use]
    pub fn tenant_id(mut self, value: impl Into<String>) -> Self {
        self.tenant_id = Some(value.into());
        self
    }

    /// Set the client ID.
    #[must_use]
    pub fn client_id(mut self, value: impl Into<String>) -> Self {
        self.client_id = Some(value.into());
        self
    }

    /// Set the client secret.
    #[must_use]
    pub fn client_secret(mut self, value: impl Into<Secret>) -> Self {
        self.client_secret = Some(value.into());
        self
    }

    /// Set the local download directory.
    #[must_use]
    pub fn download_path(mut self, value: impl Into<PathBuf>) -> Self {
        self.download_path = Some(value.into());
        self
    }

    /// Override the site ID.
    #[must_use]
    pub fn site_id(mut self, value: impl Into<String>) -> Self {
        self.site_id = value.into();
        self
    }

    /// Override the drive ID.
    #[must_use]
    pub fn drive_id(mut self, value: impl Into<String>) -> Self {
        self.drive_id = value.into();
        self
    }

    /// Override the Graph base URL.
    #[must_use]
    pub fn resource_url_base(mut self, value: impl Into<String>) -> Self {
        self.resource_url_base = value.into();
        self
    }

    /// Override the yearly folder prefix.
    #[must_use]
    pub fn folder_prefix(mut self, value: impl Into<String>) -> Self {
        self.folder_prefix = value.into();
        self
    }

    /// Override the subfolder name.
    #[must_use]
    pub fn subfolder_name(mut self, value: impl Into<String>) -> Self {
        self.subfolder_name = value.into();
        self
    }

    /// Override the authority host.
    #[must_use]
    pub fn authority_host(mut self, value: impl Into<String>) -> Self {
        self.authority_host = value.into();
        self
    }

    /// Override the requested scope.
    #[must_use]
    pub fn scope(mut self, value: impl Into<String>) -> Self {
        self.scope = value.into();
        self
    }

    /// Override the HTTP connect timeout.
    #[must_use]
    pub fn timeout(mut self, value: Duration) -> Self {
        self.timeout = value;
        self
    }

    /// Validate and freeze the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Validation`] naming the first missing or empty
    /// required field.
    pub fn build(self) -> crate::Result<RunConfig> {
        let tenant_id = required("tenant_id", self.tenant_id)?;
        let client_id = required("client_id", self.client_id)?;
        let client_secret = self
            .client_secret
            .filter(|s| !s.expose().trim().is_empty())
            .ok_or_else(|| CoreError::Validation("client_secret is required".to_string()))?;
        let download_path = self
            .download_path
            .filter(|p| !p.as_os_str().is_empty())
            .ok_or_else(|| CoreError::Validation("download_path is required".to_string()))?;

        if self.timeout.is_zero() {
            return Err(CoreError::Validation(
                "timeout must be at least one second".to_string(),
            ));
        }

        Ok(RunConfig {
            tenant_id,
            client_id,
            client_secret,
            download_path,
            site_id: self.site_id,
            drive_id: self.drive_id,
            resource_url_base: self.resource_url_base.trim_end_matches('/').to_string(),
            folder_prefix: self.folder_prefix,
            subfolder_name: self.subfolder_name,
            authority_host: self.authority_host.trim_end_matches('/').to_string(),
            scope: self.scope,
            timeout: self.timeout,
        })
    }
}

fn required(field: &str, value: Option<String>) -> crate::Result<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| CoreError::Validation(format!("{field} is required")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn complete_builder() -> RunConfigBuilder {
        RunConfig::builder()
            .tenant_id("tenant")
            .client_id("client")
            .client_secret(Secret::new("s3cret"))
            .download_path("/tmp/spfetch-test")
    }

    #[test]
    fn builder_applies_defaults() {
        let cfg = complete_builder().build().expect("valid config");
        assert_eq!(cfg.site_id(), DEFAULT_SITE_ID);
        assert_eq!(cfg.drive_id(), DEFAULT_DRIVE_ID);
        assert_eq!(cfg.folder_prefix(), "Provozní hodnoty ");
        assert_eq!(cfg.subfolder_name(), "Jednotky");
        assert_eq!(cfg.resource_url_base(), "https://graph.microsoft.com/v1.0");
        assert_eq!(
            cfg.token_url(),
            "https://login.microsoftonline.com/tenant/oauth2/v2.0/token"
        );
    }

    #[test]
    fn builder_rejects_each_missing_required_field() {
        let cases = [
            (
                "tenant_id",
                RunConfig::builder()
                    .client_id("c")
                    .client_secret(Secret::new("s"))
                    .download_path("d"),
            ),
            (
                "client_id",
                RunConfig::builder()
                    .tenant_id("t")
                    .client_secret(Secret::new("s"))
                    .download_path("d"),
            ),
            (
                "client_secret",
                RunConfig::builder()
                    .tenant_id("t")
                    .client_id("c")
                    .download_path("d"),
            ),
            (
                "download_path",
                RunConfig::builder()
                    .tenant_id("t")
                    .client_id("c")
                    .client_secret(Secret::new("s")),
            ),
        ];

        for (field, builder) in cases {
            match builder.build() {
                Err(CoreError::Validation(msg)) => assert!(msg.contains(field), "{msg}"),
                other => panic!("expected validation error for {field}, got {other:?}"),
            }
        }
    }

    #[test]
    fn builder_rejects_blank_values() {
        let err = complete_builder().tenant_id("   ").build().unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));

        let err = complete_builder()
            .client_secret(Secret::new(""))
            .build()
            .unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
    }

    #[test]
    fn builder_trims_trailing_slashes_from_hosts() {
        let cfg = complete_builder()
            .resource_url_base("http://localhost:1234/v1.0/")
            .authority_host("http://localhost:1234/")
            .build()
            .expect("valid config");
        assert_eq!(cfg.resource_url_base(), "http://localhost:1234/v1.0");
        assert_eq!(
            cfg.token_url(),
            "http://localhost:1234/tenant/oauth2/v2.0/token"
        );
    }

    #[test]
    fn secret_is_redacted_in_debug_output() {
        let cfg = complete_builder().build().expect("valid config");
        let rendered = format!("{cfg:?}");
        assert!(!rendered.contains("s3cret"));
        assert!(rendered.contains("Secret(***)"));
    }

    #[test]
    fn load_from_path_layers_file_over_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
[graph]
tenant_id = "tenant-from-file"
client_id = "client-from-file"
client_secret = "secret-from-file"
site_id = "site-from-file"

[library]
download_path = "/tmp/spfetch-downloads"

[runtime]
timeout = 5
"#,
        )
        .expect("write config");

        let cfg = AppConfig::load_from_path(&path).expect("load config");
        assert_eq!(cfg.graph.tenant_id.as_deref(), Some("tenant-from-file"));
        assert_eq!(cfg.graph.site_id, "site-from-file");
        assert_eq!(cfg.graph.drive_id, DEFAULT_DRIVE_ID);
        assert_eq!(cfg.library.subfolder_name, DEFAULT_SUBFOLDER_NAME);

        let run = cfg.run_config().expect("run config");
        assert_eq!(run.client_secret().expose(), "secret-from-file");
        assert_eq!(run.download_path(), Path::new("/tmp/spfetch-downloads"));
        assert_eq!(run.timeout(), Duration::from_secs(5));
    }

    #[test]
    fn default_config_has_no_credentials() {
        let err = AppConfig::default().run_config().unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
    }
}
