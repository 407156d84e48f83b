//! Post-upload verification (size and MD5/ETag checks).

use std::path::Path;
use tracing::{debug, info};

use crate::error::VerificationError;
use crate::types::ObjectMetadata;

/// Computes the MD5 hash of a local file.
///
/// This function reads the file in chunks to avoid loading large files
/// entirely into memory. It runs in a blocking task to avoid blocking
/// the async runtime.
pub async fn compute_file_md5(path: &Path) -> std::io::Result<String> {
    let path = path.to_path_buf();

    tokio::task::spawn_blocking(move || {
        use md5::{Digest, Md5};
        use std::io::Read;

        let file = std::fs::File::open(&path)?;
        let mut reader = std::io::BufReader::with_capacity(1024 * 1024, file);
        let mut hasher = Md5::new();
        let mut buffer = vec![0u8; 1024 * 1024];

        loop {
            let n = reader.read(&mut buffer)?;
            if n == 0 {
                break;
            }
            hasher.update(&buffer[..n]);
        }

        Ok(format!("{:x}", hasher.finalize()))
    })
    .await
    .map_err(|e| std::io::Error::other(format!("Task join error: {}", e)))?
}

/// Whether an ETag is a plain MD5 digest (single-part upload).
fn is_md5_etag(etag: &str) -> bool {
    etag.len() == 32 && etag.chars().all(|c| c.is_ascii_hexdigit())
}

/// Confirms that the object under `key` matches the staged file at `path`.
///
/// Checks, in order:
/// 1. the object exists
/// 2. its size equals the local file size
/// 3. if `check_md5` is set and the ETag is a plain MD5, it equals the local MD5
///
/// # Arguments
///
/// * `path` - Staged file that was uploaded
/// * `key` - S3 key of the uploaded object
/// * `local_md5` - Digest computed while streaming the download, if any;
///   the file is hashed here when it is `None`
/// * `remote` - Result of the head request on `key`
/// * `check_md5` - Compare the ETag as well as the size
///
/// # Returns
///
/// `Ok(())` when the object matches, or the first check that failed.
///
/// # Example
///
/// ```no_run
/// use dav2s3::verify::verify_upload;
/// use dav2s3::ObjectMetadata;
/// use std::path::Path;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let remote = ObjectMetadata { size: 10, etag: None };
/// verify_upload(Path::new("temp/a.txt"), "logs/a.txt", None, Some(&remote), true).await?;
/// # Ok(())
/// # }
/// ```
pub async fn verify_upload(
    path: &Path,
    key: &str,
    local_md5: Option<&str>,
    remote: Option<&ObjectMetadata>,
    check_md5: bool,
) -> Result<(), VerificationError> {
    let remote = remote.ok_or_else(|| VerificationError::MissingObject {
        key: key.to_string(),
    })?;

    let local_size = tokio::fs::metadata(path).await?.len();
    if local_size != remote.size {
        return Err(VerificationError::SizeMismatch {
            key: key.to_string(),
            local: local_size,
            remote: remote.size,
        });
    }

    let etag = match remote.etag.as_deref() {
        Some(etag) if check_md5 && is_md5_etag(etag) => etag,
        other => {
            if let (true, Some(etag)) = (check_md5, other) {
                // Multipart or encrypted objects carry a non-MD5 ETag.
                debug!("ETag {} of {} is not an MD5 digest, skipping checksum", etag, key);
            }
            info!("✅ {} verified (size match, {} bytes)", key, local_size);
            return Ok(());
        }
    };

    let local_md5 = match local_md5 {
        Some(md5) => md5.to_string(),
        None => compute_file_md5(path).await?,
    };
    if !local_md5.eq_ignore_ascii_case(etag) {
        return Err(VerificationError::ChecksumMismatch {
            key: key.to_string(),
            local: local_md5,
            remote: etag.to_string(),
        });
    }

    info!("✅ {} verified (MD5 match)", key);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    // MD5 of "0123456789"
    const DIGITS_MD5: &str = "781e5e245d69b566979b86e28d23f2c7";

    fn staged(contents: &[u8]) -> tempfile::NamedTempFile {
        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(file.path(), contents).unwrap();
        file
    }

    fn meta(size: u64, etag: Option<&str>) -> ObjectMetadata {
        ObjectMetadata {
            size,
            etag: etag.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn test_compute_file_md5() {
        let file = staged(b"0123456789");
        assert_eq!(compute_file_md5(file.path()).await.unwrap(), DIGITS_MD5);
    }

    #[tokio::test]
    async fn test_size_match_passes() {
        let file = staged(b"0123456789");
        verify_upload(file.path(), "a.txt", None, Some(&meta(10, None)), true)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_size_mismatch_fails() {
        let file = staged(b"0123456789");
        let err = verify_upload(file.path(), "a.txt", None, Some(&meta(8, None)), true)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            VerificationError::SizeMismatch {
                local: 10,
                remote: 8,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_missing_object_fails() {
        let file = staged(b"0123456789");
        let err = verify_upload(file.path(), "a.txt", None, None, true)
            .await
            .unwrap_err();
        assert!(matches!(err, VerificationError::MissingObject { .. }));
    }

    #[tokio::test]
    async fn test_md5_etag_compared() {
        let file = staged(b"0123456789");
        verify_upload(
            file.path(),
            "a.txt",
            None,
            Some(&meta(10, Some(DIGITS_MD5))),
            true,
        )
        .await
        .unwrap();

        let err = verify_upload(
            file.path(),
            "a.txt",
            None,
            Some(&meta(10, Some("00000000000000000000000000000000"))),
            true,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, VerificationError::ChecksumMismatch { .. }));
    }

    #[tokio::test]
    async fn test_precomputed_md5_is_used() {
        let file = staged(b"0123456789");
        let err = verify_upload(
            file.path(),
            "a.txt",
            Some("ffffffffffffffffffffffffffffffff"),
            Some(&meta(10, Some(DIGITS_MD5))),
            true,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, VerificationError::ChecksumMismatch { .. }));
    }

    #[tokio::test]
    async fn test_multipart_etag_and_disabled_checksum_skip_md5() {
        let file = staged(b"0123456789");
        verify_upload(
            file.path(),
            "a.txt",
            None,
            Some(&meta(10, Some("d41d8cd98f00b204e9800998ecf8427e-2"))),
            true,
        )
        .await
        .unwrap();
        verify_upload(
            file.path(),
            "a.txt",
            None,
            Some(&meta(10, Some("00000000000000000000000000000000"))),
            false,
        )
        .await
        .unwrap();
    }
}
