use dav2s3::{FetchError, Fetcher, RemoteEntry, Resource, WebDavConfig, WebDavFetcher};
use std::path::Path;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use wiremock::matchers::{basic_auth, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn fetcher_for(server: &MockServer) -> WebDavFetcher {
    fetcher_at(server.uri())
}

fn fetcher_at(url: String) -> WebDavFetcher {
    let config = WebDavConfig {
        url,
        user: "alice".to_string(),
        password: "hunter2".to_string(),
        base_path: "/webdav/Logs".to_string(),
    };
    WebDavFetcher::new(&config).expect("valid config")
}

fn resource(href: &str, staging: &Path) -> Resource {
    let entry = RemoteEntry {
        href: href.to_string(),
        name: href.rsplit('/').next().unwrap().to_string(),
        size: None,
        last_modified: None,
        etag: None,
    };
    Resource::from_remote(&entry, staging, "")
}

const LISTING: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<d:multistatus xmlns:d="DAV:">
  <d:response>
    <d:href>/webdav/Logs/</d:href>
    <d:propstat>
      <d:prop><d:resourcetype><d:collection/></d:resourcetype></d:prop>
      <d:status>HTTP/1.1 200 OK</d:status>
    </d:propstat>
  </d:response>
  <d:response>
    <d:href>/webdav/Logs/a.txt</d:href>
    <d:propstat>
      <d:prop>
        <d:getcontentlength>10</d:getcontentlength>
        <d:resourcetype/>
      </d:prop>
      <d:status>HTTP/1.1 200 OK</d:status>
    </d:propstat>
  </d:response>
</d:multistatus>"#;

#[tokio::test]
async fn test_list_sends_authenticated_propfind() {
    let server = MockServer::start().await;
    Mock::given(method("PROPFIND"))
        .and(path("/webdav/Logs/"))
        .and(header("depth", "1"))
        .and(basic_auth("alice", "hunter2"))
        .respond_with(ResponseTemplate::new(207).set_body_string(LISTING))
        .expect(1)
        .mount(&server)
        .await;

    let entries = fetcher_for(&server).list("/webdav/Logs").await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].href, "/webdav/Logs/a.txt");
    assert_eq!(entries[0].name, "a.txt");
    assert_eq!(entries[0].size, Some(10));
}

#[tokio::test]
async fn test_fetch_streams_body_to_staging_file() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/webdav/Logs/a.txt"))
        .and(basic_auth("alice", "hunter2"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"0123456789".to_vec()))
        .mount(&server)
        .await;

    let staging = tempfile::tempdir().unwrap();
    let resource = resource("/webdav/Logs/a.txt", &staging.path().join("temp"));
    let outcome = fetcher_for(&server)
        .fetch(&resource, &resource.staged_path)
        .await
        .unwrap();

    assert_eq!(outcome.bytes, 10);
    assert_eq!(outcome.md5, "781e5e245d69b566979b86e28d23f2c7");
    assert_eq!(std::fs::read(&resource.staged_path).unwrap(), b"0123456789");
}

#[tokio::test]
async fn test_fetch_overwrites_existing_staging_file() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/webdav/Logs/a.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"new".to_vec()))
        .mount(&server)
        .await;

    let staging = tempfile::tempdir().unwrap();
    let resource = resource("/webdav/Logs/a.txt", staging.path());
    std::fs::write(&resource.staged_path, b"old contents").unwrap();

    fetcher_for(&server)
        .fetch(&resource, &resource.staged_path)
        .await
        .unwrap();
    assert_eq!(std::fs::read(&resource.staged_path).unwrap(), b"new");
}

#[tokio::test]
async fn test_fetch_maps_unauthorized() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let staging = tempfile::tempdir().unwrap();
    let resource = resource("/webdav/Logs/a.txt", staging.path());
    let err = fetcher_for(&server)
        .fetch(&resource, &resource.staged_path)
        .await
        .unwrap_err();

    assert!(matches!(err, FetchError::Unauthorized { status: 401, .. }));
    assert!(!resource.staged_path.exists());
}

#[tokio::test]
async fn test_fetch_maps_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let staging = tempfile::tempdir().unwrap();
    let resource = resource("/webdav/Logs/missing.txt", staging.path());
    let err = fetcher_for(&server)
        .fetch(&resource, &resource.staged_path)
        .await
        .unwrap_err();
    assert!(matches!(err, FetchError::NotFound { .. }));
}

#[tokio::test]
async fn test_list_maps_server_error() {
    let server = MockServer::start().await;
    Mock::given(method("PROPFIND"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let err = fetcher_for(&server).list("/webdav/Logs").await.unwrap_err();
    assert!(matches!(err, FetchError::Status { status: 500, .. }));
}

#[tokio::test]
async fn test_delete_sends_delete() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/webdav/Logs/a.txt"))
        .and(basic_auth("alice", "hunter2"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let staging = tempfile::tempdir().unwrap();
    let resource = resource("/webdav/Logs/a.txt", staging.path());
    fetcher_for(&server).delete(&resource).await.unwrap();
}

/// Serves one response that promises 100 bytes but sends only 10, then hangs up.
async fn short_body_server() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut request = Vec::new();
        let mut buf = [0u8; 1024];
        while !request.windows(4).any(|w| w == b"\r\n\r\n") {
            let n = socket.read(&mut buf).await.unwrap();
            if n == 0 {
                break;
            }
            request.extend_from_slice(&buf[..n]);
        }
        socket
            .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 100\r\n\r\n0123456789")
            .await
            .unwrap();
        socket.shutdown().await.ok();
    });
    format!("http://{}", addr)
}

#[tokio::test]
async fn test_fetch_short_body_is_truncated_and_removed() {
    let url = short_body_server().await;

    let staging = tempfile::tempdir().unwrap();
    let resource = resource("/webdav/Logs/a.txt", staging.path());
    let err = fetcher_at(url)
        .fetch(&resource, &resource.staged_path)
        .await
        .unwrap_err();

    assert!(
        matches!(err, FetchError::Truncated { expected: 100, .. }),
        "unexpected error: {:?}",
        err
    );
    assert!(!resource.staged_path.exists());
}
