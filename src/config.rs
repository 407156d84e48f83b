//! Configuration loading and the per-run transfer context.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::ConfigError;
use crate::filter::SearchFilter;

/// Environment variable consulted when `webdav.password` is left empty.
pub const PASSWORD_ENV: &str = "DAV2S3_WEBDAV_PASSWORD";

/// Default staging directory, relative to the working directory.
pub const DEFAULT_STAGING_DIR: &str = "temp";

/// WebDAV connection settings.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WebDavConfig {
    /// Scheme and host, e.g. `https://instance.example.com`.
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub password: String,
    /// Remote root that `-s` folders are resolved against.
    #[serde(default)]
    pub base_path: String,
}

/// Target bucket settings. Credentials come from the AWS default chain.
#[derive(Debug, Clone, Deserialize)]
pub struct S3Config {
    #[serde(default)]
    pub bucket: String,
    #[serde(default)]
    pub region: Option<String>,
    /// Custom endpoint for S3-compatible stores.
    #[serde(default)]
    pub endpoint_url: Option<String>,
    #[serde(default)]
    pub force_path_style: bool,
    /// Compare the local MD5 with the object's ETag (default: true).
    ///
    /// Disable for buckets using SSE-KMS, whose ETags are not MD5 digests.
    #[serde(default = "default_true")]
    pub verify_checksum: bool,
}

impl Default for S3Config {
    fn default() -> Self {
        Self {
            bucket: String::new(),
            region: None,
            endpoint_url: None,
            force_path_style: false,
            verify_checksum: true,
        }
    }
}

fn default_true() -> bool {
    true
}

/// Configuration file contents, read once at startup.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub webdav: WebDavConfig,
    #[serde(default)]
    pub s3: S3Config,
}

impl Config {
    /// Parses YAML text and validates required fields.
    pub fn from_yaml(text: &str, path: &Path) -> Result<Self, ConfigError> {
        let mut config: Config =
            serde_yaml::from_str(text).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;

        if config.webdav.password.is_empty() {
            if let Ok(password) = std::env::var(PASSWORD_ENV) {
                debug!("Using WebDAV password from {}", PASSWORD_ENV);
                config.webdav.password = password;
            }
        }

        config.validate()?;
        Ok(config)
    }

    /// Fails with `MissingField` on the first required field that is empty.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let required = [
            ("webdav.url", &self.webdav.url),
            ("webdav.user", &self.webdav.user),
            ("webdav.password", &self.webdav.password),
            ("s3.bucket", &self.s3.bucket),
        ];
        for (name, value) in required {
            if value.trim().is_empty() {
                return Err(ConfigError::MissingField(name));
            }
        }

        let url = reqwest::Url::parse(&self.webdav.url).map_err(|e| ConfigError::InvalidUrl {
            url: self.webdav.url.clone(),
            reason: e.to_string(),
        })?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(ConfigError::InvalidUrl {
                url: self.webdav.url.clone(),
                reason: format!("unsupported scheme '{}'", url.scheme()),
            });
        }
        Ok(())
    }
}

/// Loads and validates the YAML configuration file at `path`.
///
/// `DAV2S3_WEBDAV_PASSWORD` replaces `webdav.password` when set.
///
/// # Example
///
/// ```no_run
/// let config = dav2s3::load_config("default.yaml")?;
/// println!("uploading to {}", config.s3.bucket);
/// # Ok::<(), dav2s3::ConfigError>(())
/// ```
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    info!("Loading configuration from {:?}", path);

    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    Config::from_yaml(&text, path)
}

/// Everything a run needs, passed explicitly to every pipeline component.
#[derive(Debug, Clone)]
pub struct TransferContext {
    pub config: Config,
    /// Directory holding in-flight files.
    pub staging_dir: PathBuf,
    /// Folder below `webdav.base_path` to transfer; `None` means the base itself.
    pub source_folder: Option<String>,
    /// Key prefix inside the bucket.
    pub target_prefix: String,
    pub filter: Option<SearchFilter>,
    /// Ask before every deletion.
    pub confirm_deletions: bool,
    /// Stop the batch at the first failed resource.
    pub fail_fast: bool,
    /// Delete WebDAV sources once their upload is verified.
    pub delete_remote: bool,
    pub verbose: bool,
}

impl TransferContext {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            staging_dir: PathBuf::from(DEFAULT_STAGING_DIR),
            source_folder: None,
            target_prefix: String::new(),
            filter: None,
            confirm_deletions: false,
            fail_fast: false,
            delete_remote: false,
            verbose: false,
        }
    }

    /// Remote folder to list, `base_path[/source_folder]`.
    pub fn source_path(&self) -> String {
        let base = self.config.webdav.base_path.trim_end_matches('/');
        match self
            .source_folder
            .as_deref()
            .map(|f| f.trim_matches('/'))
            .filter(|f| !f.is_empty())
        {
            Some(folder) => format!("{}/{}", base, folder),
            None if base.is_empty() => "/".to_string(),
            None => base.to_string(),
        }
    }
}
