//! Error types for transfer operations.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

use crate::types::TransferState;

/// Errors raised while loading configuration or parsing command-line options.
///
/// These are fatal: no transfer starts once one is raised.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("Cannot read config file {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The configuration file is not valid YAML for the expected schema.
    #[error("Invalid config file {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// A required field is absent or empty.
    #[error("Missing required config field `{0}`")]
    MissingField(&'static str),

    /// The WebDAV base URL cannot be parsed.
    #[error("Invalid WebDAV url '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    /// The search filter flags are inconsistent or the value is malformed.
    #[error("Invalid search filter: {0}")]
    InvalidFilter(String),
}

/// Errors from listing or retrieving WebDAV resources.
#[derive(Error, Debug)]
pub enum FetchError {
    /// The server rejected the credentials (401/403).
    #[error("Authentication failed for {url} (HTTP {status})")]
    Unauthorized { url: String, status: u16 },

    /// The resource does not exist (404).
    #[error("Resource not found: {url}")]
    NotFound { url: String },

    /// Any other non-success status.
    #[error("Request to {url} failed: HTTP {status}")]
    Status { url: String, status: u16 },

    /// Transport-level failure.
    #[error(transparent)]
    Request(#[from] reqwest::Error),

    /// Writing the staging file failed.
    #[error(transparent)]
    Io(#[from] io::Error),

    /// The body ended before `Content-Length` bytes were received.
    #[error("Truncated download of {url}: expected {expected} bytes, got {actual} bytes")]
    Truncated {
        url: String,
        expected: u64,
        actual: u64,
    },

    /// The PROPFIND multistatus body could not be parsed.
    #[error("Malformed PROPFIND response: {0}")]
    Listing(String),
}

/// Errors from pushing a staged file to S3.
#[derive(Error, Debug)]
pub enum UploadError {
    #[error("Bucket '{0}' does not exist")]
    BucketNotFound(String),

    #[error("Permission denied uploading to {bucket}/{key}: {message}")]
    PermissionDenied {
        bucket: String,
        key: String,
        message: String,
    },

    #[error("Upload of {key} failed: {message}")]
    Network { key: String, message: String },

    #[error("Cannot read staged file {path:?}: {message}")]
    Io { path: PathBuf, message: String },
}

/// Errors raised when the uploaded object does not match the staged file.
#[derive(Error, Debug)]
pub enum VerificationError {
    #[error("Uploaded object {key} not found in bucket")]
    MissingObject { key: String },

    #[error("Size mismatch for {key}: local={local} bytes, remote={remote} bytes")]
    SizeMismatch { key: String, local: u64, remote: u64 },

    #[error("MD5 mismatch for {key}: local={local}, remote={remote}")]
    ChecksumMismatch {
        key: String,
        local: String,
        remote: String,
    },

    #[error(transparent)]
    Io(#[from] io::Error),

    /// The metadata request itself failed.
    #[error("Cannot look up uploaded object: {0}")]
    Lookup(#[from] UploadError),
}

/// Errors from removing a staged file. Always non-fatal.
#[derive(Error, Debug)]
pub enum CleanupError {
    #[error("Staged file {0:?} is already gone")]
    Missing(PathBuf),

    #[error("Cannot remove staged file {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Umbrella error for the transfer pipeline.
#[derive(Error, Debug)]
pub enum TransferError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Upload(#[from] UploadError),

    #[error(transparent)]
    Verification(#[from] VerificationError),

    #[error(transparent)]
    Cleanup(#[from] CleanupError),

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error(transparent)]
    SerdeJson(#[from] serde_json::Error),

    /// A record was asked to skip a pipeline stage.
    #[error("Invalid transition from {from:?} to {to:?}")]
    InvalidTransition {
        from: TransferState,
        to: TransferState,
    },
}
