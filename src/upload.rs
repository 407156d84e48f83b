//! S3 upload and object metadata lookup.

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::http::HttpResponse;
use aws_sdk_s3::config::Region;
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use std::path::Path;
use tracing::{debug, info};

use crate::config::S3Config;
use crate::error::UploadError;
use crate::types::ObjectMetadata;

/// Target side of the pipeline.
#[async_trait]
pub trait Uploader: Send + Sync {
    fn bucket(&self) -> &str;

    /// Puts the file at `path` under `key`. No resume: any error fails the upload.
    async fn upload(&self, path: &Path, key: &str) -> Result<(), UploadError>;

    /// Returns the object's metadata, or `None` if it does not exist.
    async fn head(&self, key: &str) -> Result<Option<ObjectMetadata>, UploadError>;
}

/// `Uploader` backed by the AWS SDK.
pub struct S3Uploader {
    client: Client,
    bucket: String,
}

impl S3Uploader {
    /// Builds a client from the default AWS credential chain, with the
    /// region, endpoint and addressing style overridden from `config`.
    pub async fn new(config: &S3Config) -> Self {
        let mut loader = aws_config::defaults(BehaviorVersion::latest());
        if let Some(region) = config.region.as_deref().filter(|r| !r.is_empty()) {
            loader = loader.region(Region::new(region.to_string()));
        }
        if let Some(endpoint) = config.endpoint_url.as_deref().filter(|e| !e.is_empty()) {
            info!("Using custom S3 endpoint: {}", endpoint);
            loader = loader.endpoint_url(endpoint);
        }
        let sdk_config = loader.load().await;

        let s3_config = aws_sdk_s3::config::Builder::from(&sdk_config)
            .force_path_style(config.force_path_style)
            .build();

        Self::from_client(Client::from_conf(s3_config), config.bucket.clone())
    }

    /// Wraps an already configured client.
    pub fn from_client(client: Client, bucket: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
        }
    }

    fn classify<E>(&self, key: &str, err: SdkError<E, HttpResponse>) -> UploadError
    where
        E: ProvideErrorMetadata + std::error::Error + 'static,
    {
        let code = err
            .as_service_error()
            .and_then(|e| e.code())
            .map(str::to_string);
        let status = err.raw_response().map(|r| r.status().as_u16());
        let message = DisplayErrorContext(&err).to_string();

        match (code.as_deref(), status) {
            (Some("NoSuchBucket"), _) => UploadError::BucketNotFound(self.bucket.clone()),
            (
                Some("AccessDenied")
                | Some("AllAccessDisabled")
                | Some("InvalidAccessKeyId")
                | Some("SignatureDoesNotMatch"),
                _,
            )
            | (_, Some(403)) => UploadError::PermissionDenied {
                bucket: self.bucket.clone(),
                key: key.to_string(),
                message,
            },
            _ => UploadError::Network {
                key: key.to_string(),
                message,
            },
        }
    }
}

#[async_trait]
impl Uploader for S3Uploader {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn upload(&self, path: &Path, key: &str) -> Result<(), UploadError> {
        let body = ByteStream::from_path(path)
            .await
            .map_err(|e| UploadError::Io {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;

        debug!("Uploading {:?} to {}/{}", path, self.bucket, key);
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(body)
            .send()
            .await
            .map_err(|err| self.classify(key, err))?;
        Ok(())
    }

    async fn head(&self, key: &str) -> Result<Option<ObjectMetadata>, UploadError> {
        let result = self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await;

        match result {
            Ok(output) => Ok(Some(ObjectMetadata {
                size: output.content_length().map(|l| l.max(0) as u64).unwrap_or(0),
                etag: output.e_tag().map(|s| s.trim_matches('"').to_string()),
            })),
            Err(err) => {
                if err
                    .as_service_error()
                    .map(|e| e.is_not_found())
                    .unwrap_or(false)
                {
                    Ok(None)
                } else {
                    Err(self.classify(key, err))
                }
            }
        }
    }
}
