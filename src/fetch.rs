//! WebDAV retrieval: folder listing, streaming download and remote delete.

use async_trait::async_trait;
use futures_util::StreamExt;
use md5::{Digest, Md5};
use reqwest::{Method, Response, StatusCode, Url};
use std::path::Path;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, info, warn};

use crate::config::WebDavConfig;
use crate::error::{ConfigError, FetchError};
use crate::listing::{parse_propfind_response, PROPFIND_BODY};
use crate::types::{FetchOutcome, RemoteEntry, Resource};

/// Source side of the pipeline.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Lists the plain files directly inside `folder`.
    async fn list(&self, folder: &str) -> Result<Vec<RemoteEntry>, FetchError>;

    /// Retrieves `resource` into `dest`, creating or overwriting it.
    async fn fetch(&self, resource: &Resource, dest: &Path) -> Result<FetchOutcome, FetchError>;

    /// Removes `resource` from the server.
    async fn delete(&self, resource: &Resource) -> Result<(), FetchError>;
}

/// `Fetcher` backed by a WebDAV server with HTTP basic auth.
pub struct WebDavFetcher {
    client: reqwest::Client,
    base_url: Url,
    user: String,
    password: String,
}

impl WebDavFetcher {
    pub fn new(config: &WebDavConfig) -> Result<Self, ConfigError> {
        let base_url = Url::parse(&config.url).map_err(|e| ConfigError::InvalidUrl {
            url: config.url.clone(),
            reason: e.to_string(),
        })?;
        Ok(Self {
            client: reqwest::Client::new(),
            base_url,
            user: config.user.clone(),
            password: config.password.clone(),
        })
    }

    fn url_for(&self, path: &str) -> Result<Url, FetchError> {
        let path = if path.starts_with('/') {
            path.to_string()
        } else {
            format!("/{}", path)
        };
        self.base_url
            .join(&path)
            .map_err(|e| FetchError::Listing(format!("cannot build url for '{}': {}", path, e)))
    }

    fn request(&self, method: Method, url: Url) -> reqwest::RequestBuilder {
        self.client
            .request(method, url)
            .basic_auth(&self.user, Some(&self.password))
    }
}

/// Maps non-success statuses onto the fetch error taxonomy.
fn check_status(url: &Url, response: Response) -> Result<Response, FetchError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let url = url.to_string();
    Err(match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => FetchError::Unauthorized {
            url,
            status: status.as_u16(),
        },
        StatusCode::NOT_FOUND => FetchError::NotFound { url },
        _ => FetchError::Status {
            url,
            status: status.as_u16(),
        },
    })
}

/// Streams the body into `dest`, returning the byte count and MD5 digest.
async fn stream_to_file(
    response: Response,
    dest: &Path,
    content_length: Option<u64>,
    url: &Url,
) -> Result<(u64, String), FetchError> {
    let truncated = |actual: u64| FetchError::Truncated {
        url: url.to_string(),
        expected: content_length.unwrap_or(actual),
        actual,
    };
    let mut file = BufWriter::new(tokio::fs::File::create(dest).await?);

    // Stream download and compute MD5 simultaneously
    let mut hasher = Md5::new();
    let mut written = 0u64;
    let mut byte_stream = response.bytes_stream();
    while let Some(piece) = byte_stream.next().await {
        let chunk = match piece {
            Ok(chunk) => chunk,
            // The connection closed before Content-Length bytes arrived.
            Err(e) if content_length.is_some() && (e.is_body() || e.is_decode()) => {
                debug!("Body of {} ended early: {}", url, e);
                return Err(truncated(written));
            }
            Err(e) => return Err(e.into()),
        };
        hasher.update(&chunk);
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }
    file.flush().await?;

    match content_length {
        Some(expected) if expected != written => Err(truncated(written)),
        _ => Ok((written, format!("{:x}", hasher.finalize()))),
    }
}

/// Removes a partially written staging file.
async fn discard_partial(dest: &Path) {
    match tokio::fs::remove_file(dest).await {
        Ok(()) => debug!("Removed partial download {:?}", dest),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("Could not remove partial download {:?}: {}", dest, e),
    }
}

#[async_trait]
impl Fetcher for WebDavFetcher {
    async fn list(&self, folder: &str) -> Result<Vec<RemoteEntry>, FetchError> {
        let folder = format!("{}/", folder.trim_end_matches('/'));
        let url = self.url_for(&folder)?;
        info!("Listing {}", url);

        let method = Method::from_bytes(b"PROPFIND")
            .map_err(|e| FetchError::Listing(e.to_string()))?;
        let response = self
            .request(method, url.clone())
            .header("Depth", "1")
            .header("Content-Type", "application/xml")
            .body(PROPFIND_BODY)
            .send()
            .await?;
        let body = check_status(&url, response)?.text().await?;

        let entries = parse_propfind_response(&body)?;
        debug!("{} file(s) listed in {}", entries.len(), folder);
        Ok(entries)
    }

    async fn fetch(&self, resource: &Resource, dest: &Path) -> Result<FetchOutcome, FetchError> {
        let href = resource
            .webdav_path
            .as_deref()
            .ok_or_else(|| FetchError::NotFound {
                url: resource.name.clone(),
            })?;
        let url = self.url_for(href)?;

        let response = self.request(Method::GET, url.clone()).send().await?;
        let response = check_status(&url, response)?;
        let content_length = response.content_length();

        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let streamed = stream_to_file(response, dest, content_length, &url).await;
        let (written, md5) = match streamed {
            Ok(done) => done,
            Err(e) => {
                discard_partial(dest).await;
                return Err(e);
            }
        };

        if content_length.is_none() {
            warn!(
                "Content-Length header was not present for {}. Cannot verify file size.",
                url
            );
        }

        Ok(FetchOutcome { bytes: written, md5 })
    }

    async fn delete(&self, resource: &Resource) -> Result<(), FetchError> {
        let href = resource
            .webdav_path
            .as_deref()
            .ok_or_else(|| FetchError::NotFound {
                url: resource.name.clone(),
            })?;
        let url = self.url_for(href)?;
        let response = self.request(Method::DELETE, url.clone()).send().await?;
        check_status(&url, response)?;
        info!("Deleted {} from WebDAV", url);
        Ok(())
    }
}
