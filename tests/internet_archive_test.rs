//! Integration tests for the Internet Archive client.

use std::path::PathBuf;

use channel_archiver::config::Config;
use channel_archiver::ia::{ArchivalUploader, ExistingItem, InternetArchiveClient, Metadata, UploadError};
use tempfile::TempDir;
use wiremock::matchers::{body_string, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn create_test_client(server: &MockServer) -> InternetArchiveClient {
    let config = Config {
        ia_s3_url: server.uri(),
        ia_metadata_url: server.uri(),
        ..Config::for_testing()
    };
    InternetArchiveClient::new(&config).expect("Failed to create client")
}

async fn write_artifact(dir: &TempDir) -> PathBuf {
    let file = dir.path().join("2023-01-15__Cafe_Talk.mp4");
    tokio::fs::write(&file, b"video bytes").await.unwrap();
    file
}

fn sample_metadata() -> Metadata {
    let mut metadata = Metadata::new();
    metadata.insert("collection".to_string(), vec!["opensource_movies".to_string()]);
    metadata.insert("mediatype".to_string(), vec!["movies".to_string()]);
    metadata.insert("title".to_string(), vec!["Café Talk!".to_string()]);
    metadata.insert("channel_name".to_string(), vec!["MyChan".to_string()]);
    metadata
}

#[tokio::test]
async fn test_metadata_lookup_missing_item() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/metadata/2023-01-15_MyChan_Cafe_Talk"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
        .mount(&server)
        .await;

    let client = create_test_client(&server);
    let existing = client
        .get_item_metadata("2023-01-15_MyChan_Cafe_Talk")
        .await
        .expect("lookup should succeed");

    assert_eq!(existing, None);
}

#[tokio::test]
async fn test_metadata_lookup_existing_item() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/metadata/taken-id"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "created": 1_700_000_000,
            "metadata": {
                "identifier": "taken-id",
                "uploader": "someone@else.org"
            }
        })))
        .mount(&server)
        .await;

    let client = create_test_client(&server);
    let existing = client.get_item_metadata("taken-id").await.unwrap();

    assert_eq!(
        existing,
        Some(ExistingItem {
            uploader: Some("someone@else.org".to_string())
        })
    );
}

#[tokio::test]
async fn test_metadata_lookup_server_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(502))
        .mount(&server)
        .await;

    let client = create_test_client(&server);
    assert!(client.get_item_metadata("anything").await.is_err());
}

#[tokio::test]
async fn test_upload_sends_file_with_metadata_headers() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/2023-01-15_MyChan_Cafe_Talk/2023-01-15__Cafe_Talk.mp4"))
        .and(header("authorization", "LOW test-access:test-secret"))
        .and(header("x-amz-auto-make-bucket", "1"))
        .and(header("x-archive-meta-collection", "opensource_movies"))
        .and(header("x-archive-meta-mediatype", "movies"))
        .and(header("x-archive-meta-channel--name", "MyChan"))
        .and(header("x-archive-meta-title", "uri(Caf%C3%A9%20Talk%21)"))
        .and(header("content-type", "video/mp4"))
        .and(header("x-archive-size-hint", "11"))
        .and(body_string("video bytes"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let file = write_artifact(&dir).await;
    let client = create_test_client(&server);

    let responses = client
        .upload("2023-01-15_MyChan_Cafe_Talk", &[file], &sample_metadata())
        .await
        .expect("upload should succeed");

    assert_eq!(responses.len(), 1);
    assert_eq!(responses[0].status_code, 200);
    assert_eq!(responses[0].file, "2023-01-15__Cafe_Talk.mp4");
}

#[tokio::test]
async fn test_upload_streams_large_file_intact() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/big-item/big.mp4"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let file = dir.path().join("big.mp4");
    let content: Vec<u8> = (0..3 * 1024 * 1024).map(|i: u32| (i % 251) as u8).collect();
    tokio::fs::write(&file, &content).await.unwrap();
    let client = create_test_client(&server);

    client
        .upload("big-item", &[file], &sample_metadata())
        .await
        .expect("upload should succeed");

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].body, content);
    assert_eq!(
        requests[0]
            .headers
            .get("x-archive-size-hint")
            .and_then(|v| v.to_str().ok()),
        Some("3145728")
    );
}

#[tokio::test]
async fn test_upload_slow_down_is_rate_limited() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(503).set_body_string(
            "<?xml version='1.0' encoding='UTF-8'?><Error><Code>SlowDown</Code><Message>Please reduce your request rate.</Message></Error>",
        ))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let file = write_artifact(&dir).await;
    let client = create_test_client(&server);

    let err = client
        .upload("some-id", &[file], &sample_metadata())
        .await
        .unwrap_err();

    assert!(matches!(err, UploadError::Http { status: 503, .. }));
    assert!(err.is_rate_limited());
}

#[tokio::test]
async fn test_upload_forbidden_is_http_error() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(403).set_body_string("AccessDenied"))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let file = write_artifact(&dir).await;
    let client = create_test_client(&server);

    let err = client
        .upload("some-id", &[file], &sample_metadata())
        .await
        .unwrap_err();

    assert!(matches!(err, UploadError::Http { status: 403, .. }));
    assert!(!err.is_rate_limited());
}

#[tokio::test]
async fn test_upload_missing_file_is_io_error() {
    let server = MockServer::start().await;
    let client = create_test_client(&server);

    let err = client
        .upload(
            "some-id",
            &[PathBuf::from("/nonexistent/file.mp4")],
            &sample_metadata(),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, UploadError::Io { .. }));
}
