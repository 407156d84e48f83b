//! Data structures for transfer operations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::TransferError;

/// A file as reported by a WebDAV `PROPFIND` listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteEntry {
    /// Server-relative href, still percent-encoded.
    pub href: String,
    /// Decoded file name.
    pub name: String,
    pub size: Option<u64>,
    pub last_modified: Option<DateTime<Utc>>,
    pub etag: Option<String>,
}

/// A single file moving through the pipeline.
///
/// Built once from a listing entry (or a local file in upload-only mode) and
/// never changed afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    /// WebDAV href to fetch from. `None` for local files in upload-only mode.
    pub webdav_path: Option<String>,
    /// File name, used for the staging path and the S3 key.
    pub name: String,
    /// Where the file lives locally while in flight.
    pub staged_path: PathBuf,
    /// Target key in the bucket.
    pub s3_key: String,
    /// Size reported by the listing, if any.
    pub size_hint: Option<u64>,
    pub last_modified: Option<DateTime<Utc>>,
}

impl Resource {
    /// Builds a resource for a remote WebDAV entry staged under `staging_dir`.
    pub fn from_remote(entry: &RemoteEntry, staging_dir: &Path, target_prefix: &str) -> Self {
        Self {
            webdav_path: Some(entry.href.clone()),
            name: entry.name.clone(),
            staged_path: staging_dir.join(&entry.name),
            s3_key: object_key(target_prefix, &entry.name),
            size_hint: entry.size,
            last_modified: entry.last_modified,
        }
    }

    /// Builds a resource for a file that already exists locally.
    pub fn from_local(path: &Path, target_prefix: &str) -> Option<Self> {
        let name = path.file_name()?.to_str()?.to_string();
        Some(Self {
            webdav_path: None,
            s3_key: object_key(target_prefix, &name),
            name,
            staged_path: path.to_path_buf(),
            size_hint: None,
            last_modified: None,
        })
    }

    pub fn is_remote(&self) -> bool {
        self.webdav_path.is_some()
    }
}

/// Joins a target prefix and a file name into an S3 key.
///
/// Leading and trailing slashes on the prefix are ignored, so `"/logs/"`,
/// `"logs"` and `"logs/"` all yield `"logs/<name>"`.
pub fn object_key(prefix: &str, name: &str) -> String {
    let prefix = prefix.trim_matches('/');
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", prefix, name)
    }
}

/// Metadata of an uploaded object, as returned by a head request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectMetadata {
    pub size: u64,
    /// ETag with surrounding quotes removed.
    pub etag: Option<String>,
}

/// Result of a successful fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchOutcome {
    pub bytes: u64,
    /// Hex MD5 of the body, computed while streaming.
    pub md5: String,
}

/// Position of a resource in the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransferState {
    Pending,
    Fetched,
    Uploaded,
    Verified,
    Cleaned,
    Failed,
}

/// Per-resource progress, mutated by each pipeline stage in turn.
///
/// All mutation goes through the `mark_*` methods, which refuse to skip a
/// stage: `cleaned ⇒ verified ⇒ uploaded ⇒ fetched` always holds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferRecord {
    pub resource: Resource,
    state: TransferState,
    fetched: bool,
    staged_path: Option<PathBuf>,
    uploaded: bool,
    verified: bool,
    cleaned: bool,
    remote_deleted: bool,
    failure: Option<String>,
    /// Hex MD5 of the staged file, when known.
    md5: Option<String>,
}

impl TransferRecord {
    pub fn new(resource: Resource) -> Self {
        Self {
            resource,
            state: TransferState::Pending,
            fetched: false,
            staged_path: None,
            uploaded: false,
            verified: false,
            cleaned: false,
            remote_deleted: false,
            failure: None,
            md5: None,
        }
    }

    pub fn state(&self) -> TransferState {
        self.state
    }

    pub fn fetched(&self) -> bool {
        self.fetched
    }

    pub fn staged_path(&self) -> Option<&Path> {
        self.staged_path.as_deref()
    }

    pub fn uploaded(&self) -> bool {
        self.uploaded
    }

    pub fn verified(&self) -> bool {
        self.verified
    }

    pub fn cleaned(&self) -> bool {
        self.cleaned
    }

    pub fn remote_deleted(&self) -> bool {
        self.remote_deleted
    }

    pub fn failure(&self) -> Option<&str> {
        self.failure.as_deref()
    }

    pub fn md5(&self) -> Option<&str> {
        self.md5.as_deref()
    }

    fn advance(&mut self, from: TransferState, to: TransferState) -> Result<(), TransferError> {
        if self.state != from {
            return Err(TransferError::InvalidTransition {
                from: self.state,
                to,
            });
        }
        self.state = to;
        Ok(())
    }

    /// `PENDING → FETCHED`. `md5` is `None` when the file was not streamed
    /// through the fetcher (upload-only mode).
    pub fn mark_fetched(
        &mut self,
        staged_path: PathBuf,
        md5: Option<String>,
    ) -> Result<(), TransferError> {
        self.advance(TransferState::Pending, TransferState::Fetched)?;
        self.fetched = true;
        self.staged_path = Some(staged_path);
        self.md5 = md5;
        Ok(())
    }

    /// `FETCHED → UPLOADED`.
    pub fn mark_uploaded(&mut self) -> Result<(), TransferError> {
        self.advance(TransferState::Fetched, TransferState::Uploaded)?;
        self.uploaded = true;
        Ok(())
    }

    /// `UPLOADED → VERIFIED`.
    pub fn mark_verified(&mut self) -> Result<(), TransferError> {
        self.advance(TransferState::Uploaded, TransferState::Verified)?;
        self.verified = true;
        Ok(())
    }

    /// `VERIFIED → CLEANED`.
    pub fn mark_cleaned(&mut self) -> Result<(), TransferError> {
        self.advance(TransferState::Verified, TransferState::Cleaned)?;
        self.cleaned = true;
        Ok(())
    }

    /// Records that the WebDAV source was deleted. Only legal once verified.
    pub fn mark_remote_deleted(&mut self) -> Result<(), TransferError> {
        if !self.verified {
            return Err(TransferError::InvalidTransition {
                from: self.state,
                to: TransferState::Verified,
            });
        }
        self.remote_deleted = true;
        Ok(())
    }

    /// Moves the record to `FAILED` from any state except `CLEANED`.
    pub fn mark_failed(&mut self, reason: impl Into<String>) -> Result<(), TransferError> {
        if self.state == TransferState::Cleaned {
            return Err(TransferError::InvalidTransition {
                from: self.state,
                to: TransferState::Failed,
            });
        }
        self.state = TransferState::Failed;
        self.failure = Some(reason.into());
        Ok(())
    }

    pub fn is_failed(&self) -> bool {
        self.state == TransferState::Failed
    }
}

/// Outcome of a whole run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchReport {
    pub records: Vec<TransferRecord>,
    /// Set when fail-fast stopped the batch early.
    pub aborted: bool,
    #[serde(with = "duration_ms")]
    pub elapsed: Duration,
}

impl BatchReport {
    pub fn count(&self, state: TransferState) -> usize {
        self.records.iter().filter(|r| r.state() == state).count()
    }

    pub fn has_failures(&self) -> bool {
        self.records.iter().any(TransferRecord::is_failed)
    }
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}
