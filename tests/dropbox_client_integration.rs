//! Integration tests for the Dropbox client against a mock HTTP server.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use backup_core::scan::{FilterOptions, default_skip_dirs, scan};
use backup_core::{
    DropboxClient, Engine, EngineConfig, RateLimiter, RemoteError, RemoteSource, RetryPolicy,
    StatsStore, StopSignal,
};
use futures_util::StreamExt;
use serde_json::json;
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const TOKEN: &str = "test-token";

fn client_for(server: &MockServer) -> DropboxClient {
    DropboxClient::new(TOKEN, 30)
        .unwrap()
        .with_base_urls(&server.uri(), &server.uri())
        .unwrap()
}

fn file_entry(path: &str, size: u64) -> serde_json::Value {
    json!({
        ".tag": "file",
        "name": path.rsplit('/').next().unwrap_or(path),
        "path_display": path,
        "path_lower": path.to_lowercase(),
        "size": size,
    })
}

async fn mount_two_page_listing(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/2/files/list_folder"))
        .and(header("Authorization", format!("Bearer {TOKEN}").as_str()))
        .and(body_partial_json(json!({ "path": "/Backup", "recursive": true })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "entries": [
                { ".tag": "folder", "name": "Backup", "path_display": "/Backup" },
                file_entry("/Backup/a.txt", 5),
                file_entry("/Backup/node_modules/pkg/index.js", 7),
            ],
            "cursor": "cursor-1",
            "has_more": true,
        })))
        .expect(1)
        .mount(server)
        .await;

    Mock::given(method("POST"))
        .and(path("/2/files/list_folder/continue"))
        .and(body_partial_json(json!({ "cursor": "cursor-1" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "entries": [
                file_entry("/Backup/photos/b.jpg", 6),
                { ".tag": "deleted", "name": "old", "path_display": "/Backup/old" },
            ],
            "cursor": "cursor-2",
            "has_more": false,
        })))
        .expect(1)
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_list_folder_follows_cursor_and_keeps_files_only() {
    let server = MockServer::start().await;
    mount_two_page_listing(&server).await;
    let client = client_for(&server);

    let first = client.list_folder("/Backup", true).await.unwrap();
    assert!(first.has_more);
    assert_eq!(first.cursor.as_deref(), Some("cursor-1"));
    assert_eq!(first.entries.len(), 2);
    assert_eq!(first.entries[0].path, "/Backup/a.txt");
    assert_eq!(first.entries[0].size, 5);

    let second = client.list_folder_continue("cursor-1").await.unwrap();
    assert!(!second.has_more);
    assert_eq!(second.entries.len(), 1);
    assert_eq!(second.entries[0].path, "/Backup/photos/b.jpg");
}

#[tokio::test]
async fn test_scan_skips_dependency_folders() {
    let server = MockServer::start().await;
    mount_two_page_listing(&server).await;
    let client = client_for(&server);

    let result = scan(&client, "/Backup", &FilterOptions::default(), &default_skip_dirs())
        .await
        .unwrap();

    assert!(!result.truncated);
    assert_eq!(result.summary.scanned, 3);
    assert_eq!(result.summary.skipped_dependency, 1);
    assert_eq!(result.summary.bytes_to_download, 11);
    let paths: Vec<_> = result.files.iter().map(|f| f.path.as_str()).collect();
    assert_eq!(paths, ["/Backup/a.txt", "/Backup/photos/b.jpg"]);
}

#[tokio::test]
async fn test_download_streams_body_with_api_arg_header() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/2/files/download"))
        .and(header("Dropbox-API-Arg", r#"{"path":"/Backup/a.txt"}"#))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"hello".to_vec()))
        .mount(&server)
        .await;
    let client = client_for(&server);

    let mut stream = client.stream_download("/Backup/a.txt").await.unwrap();
    let mut body = Vec::new();
    while let Some(chunk) = stream.next().await {
        body.extend_from_slice(&chunk.unwrap());
    }
    assert_eq!(body, b"hello");
}

#[tokio::test]
async fn test_download_429_is_rate_limited_with_retry_after() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/2/files/download"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "7"))
        .mount(&server)
        .await;
    let client = client_for(&server);

    let err = client.stream_download("/x").await.err().unwrap();
    assert!(err.is_rate_limited());
    assert_eq!(err.retry_after(), Some(Duration::from_secs(7)));
}

#[tokio::test]
async fn test_download_409_too_many_operations_is_rate_limited() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/2/files/download"))
        .respond_with(ResponseTemplate::new(409).set_body_json(json!({
            "error_summary": "too_many_write_operations/..",
        })))
        .mount(&server)
        .await;
    let client = client_for(&server);

    let err = client.stream_download("/x").await.err().unwrap();
    assert!(err.is_rate_limited());
    assert_eq!(err.retry_after(), None);
}

#[tokio::test]
async fn test_status_classes_map_to_error_kinds() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/2/files/download"))
        .and(header("Dropbox-API-Arg", r#"{"path":"/missing"}"#))
        .respond_with(ResponseTemplate::new(409).set_body_json(json!({
            "error_summary": "path/not_found/..",
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/2/files/download"))
        .and(header("Dropbox-API-Arg", r#"{"path":"/flaky"}"#))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;
    let client = client_for(&server);

    let missing = client.stream_download("/missing").await.err().unwrap();
    assert!(matches!(missing, RemoteError::Fatal { .. }));
    assert!(missing.to_string().contains("path/not_found"));

    let flaky = client.stream_download("/flaky").await.err().unwrap();
    assert!(matches!(flaky, RemoteError::Transient { .. }));
}

#[tokio::test]
async fn test_list_folder_unauthorized_is_fatal() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/2/files/list_folder"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "error_summary": "invalid_access_token/...",
        })))
        .mount(&server)
        .await;
    let client = client_for(&server);

    let err = scan(&client, "", &FilterOptions::default(), &HashSet::new())
        .await
        .err()
        .unwrap();
    assert!(matches!(err, RemoteError::Fatal { .. }));
}

#[tokio::test]
async fn test_scan_and_engine_mirror_remote_tree() {
    let server = MockServer::start().await;
    mount_two_page_listing(&server).await;
    Mock::given(method("POST"))
        .and(path("/2/files/download"))
        .and(header("Dropbox-API-Arg", r#"{"path":"/Backup/a.txt"}"#))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"aaaaa".to_vec()))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/2/files/download"))
        .and(header("Dropbox-API-Arg", r#"{"path":"/Backup/photos/b.jpg"}"#))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"bbbbbb".to_vec()))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let result = scan(&client, "/Backup", &FilterOptions::default(), &default_skip_dirs())
        .await
        .unwrap();

    let dest = TempDir::new().unwrap();
    let stats = Arc::new(StatsStore::new());
    stats.record_scan(&result.summary);
    let config = EngineConfig {
        max_concurrent_downloads: 2,
        retry_policy: RetryPolicy::new(2, Duration::ZERO, Duration::ZERO, 2.0),
        ..EngineConfig::new(dest.path())
    };
    let engine = Engine::new(
        config,
        Arc::new(client),
        Arc::new(RateLimiter::new(Duration::ZERO)),
        Arc::clone(&stats),
    )
    .unwrap();

    let report = engine.run(result.files, &StopSignal::new()).await;

    assert_eq!(report.downloaded, 2);
    assert_eq!(
        std::fs::read(dest.path().join("Backup/a.txt")).unwrap(),
        b"aaaaa"
    );
    assert_eq!(
        std::fs::read(dest.path().join("Backup/photos/b.jpg")).unwrap(),
        b"bbbbbb"
    );
    let snapshot = stats.snapshot();
    assert_eq!(snapshot.bytes_downloaded, 11);
    assert_eq!(snapshot.files_skipped_dependency, 1);
}

/// Serves one response of `body_len` bytes, writing a byte every `gap` for
/// the first `steady` bytes and then stalling for `stall`.
async fn trickle_server(body_len: usize, steady: usize, gap: Duration, stall: Duration) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut request = Vec::new();
        let mut buf = [0u8; 1024];
        while !request.windows(4).any(|w| w == b"\r\n\r\n") {
            let n = socket.read(&mut buf).await.unwrap();
            if n == 0 {
                return;
            }
            request.extend_from_slice(&buf[..n]);
        }
        let head = format!("HTTP/1.1 200 OK\r\nContent-Length: {body_len}\r\n\r\n");
        socket.write_all(head.as_bytes()).await.unwrap();
        for _ in 0..steady {
            tokio::time::sleep(gap).await;
            if socket.write_all(b"x").await.is_err() {
                return;
            }
        }
        tokio::time::sleep(stall).await;
        let _ = socket.write_all(&vec![b'x'; body_len - steady]).await;
    });
    format!("http://{addr}")
}

#[tokio::test]
async fn test_slow_steady_download_outlives_read_timeout() {
    let base = trickle_server(10, 10, Duration::from_millis(300), Duration::ZERO).await;
    let client = DropboxClient::new(TOKEN, 1)
        .unwrap()
        .with_base_urls(&base, &base)
        .unwrap();

    let started = std::time::Instant::now();
    let mut stream = client.stream_download("/big.bin").await.unwrap();
    let mut received = 0;
    while let Some(chunk) = stream.next().await {
        received += chunk.unwrap().len();
    }

    assert_eq!(received, 10);
    assert!(started.elapsed() > Duration::from_secs(2));
}

#[tokio::test]
async fn test_stalled_download_times_out_as_transient() {
    let base = trickle_server(10, 2, Duration::from_millis(50), Duration::from_secs(3)).await;
    let client = DropboxClient::new(TOKEN, 1)
        .unwrap()
        .with_base_urls(&base, &base)
        .unwrap();

    let mut stream = client.stream_download("/stuck.bin").await.unwrap();
    let mut failure = None;
    while let Some(chunk) = stream.next().await {
        if let Err(e) = chunk {
            failure = Some(e);
            break;
        }
    }

    assert!(matches!(failure, Some(RemoteError::Transient { .. })));
}
