//! dav2s3 - Move files from a WebDAV folder into an S3 bucket
//!
//! This library provides a staged transfer pipeline: files are listed and
//! downloaded from a WebDAV server into a local staging directory, uploaded
//! to S3, verified against the uploaded object, and only then removed
//! locally.
//!
//! # Features
//!
//! - **Verified Uploads**: Size and MD5/ETag checks before any deletion
//! - **Safe Cleanup**: Staged files survive failed verification for inspection
//! - **Confirmation Gate**: Optional interactive approval of every deletion
//! - **Search Filters**: Select files by extension, name fragment, size or date
//! - **Upload-Only Mode**: Push an existing local folder without touching WebDAV
//!
//! # Example
//!
//! ```no_run
//! use dav2s3::{load_config, Pipeline, S3Uploader, StdinConfirm, TransferContext, WebDavFetcher};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let ctx = TransferContext::new(load_config("default.yaml")?);
//! let fetcher = WebDavFetcher::new(&ctx.config.webdav)?;
//! let uploader = S3Uploader::new(&ctx.config.s3).await;
//! let pipeline = Pipeline::new(&ctx, &fetcher, &uploader, &StdinConfirm);
//!
//! let resources = pipeline.discover().await?;
//! let report = pipeline.run(resources).await?;
//! assert!(!report.has_failures());
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod confirm;
pub mod error;
pub mod fetch;
pub mod filter;
pub mod listing;
pub mod orchestrator;
pub mod stage;
pub mod types;
pub mod upload;
pub mod verify;

pub use config::{load_config, Config, S3Config, TransferContext, WebDavConfig};
pub use confirm::{Confirm, StdinConfirm};
pub use error::{
    CleanupError, ConfigError, FetchError, TransferError, UploadError, VerificationError,
};
pub use fetch::{Fetcher, WebDavFetcher};
pub use filter::{SearchFilter, SearchType};
pub use orchestrator::{log_summary, write_report, Pipeline};
pub use stage::Stager;
pub use types::{
    BatchReport, FetchOutcome, ObjectMetadata, RemoteEntry, Resource, TransferRecord,
    TransferState,
};
pub use upload::{S3Uploader, Uploader};
