//! Integration tests for the hosted JSON blob record store.

use channel_archiver::store::{FieldUpdate, JsonBinStore, RecordStore};
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn sample_bin() -> serde_json::Value {
    serde_json::json!([
        {
            "_id": "v1",
            "url": "https://www.youtube.com/watch?v=v1",
            "title": "Café Talk!",
            "upload_date": "20230115",
            "channel_name": "MyChan",
            "downloaded": false,
            "uploaded": false,
            "duration": 61
        },
        {
            "_id": "v2",
            "url": "https://www.youtube.com/watch?v=v2",
            "title": "Second",
            "upload_date": "20230116",
            "channel_name": "MyChan",
            "downloaded": true,
            "uploaded": true
        }
    ])
}

async fn mount_read(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/b/bin123/latest"))
        .and(header("X-Master-Key", "secret"))
        .and(header("X-Bin-Meta", "false"))
        .respond_with(ResponseTemplate::new(200).set_body_json(sample_bin()))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_list_all_reads_bin() {
    let server = MockServer::start().await;
    mount_read(&server).await;

    let store = JsonBinStore::new(&server.uri(), "secret", "bin123").unwrap();
    let records = store.list_all().await.expect("list should succeed");

    assert_eq!(records.len(), 2);
    assert_eq!(records[0].id, "v1");
    assert_eq!(records[0].extra["duration"], 61);
    assert!(records[1].uploaded);
}

#[tokio::test]
async fn test_update_fields_writes_whole_bin() {
    let server = MockServer::start().await;
    mount_read(&server).await;

    // Only the flag changes; key names and other documents stay verbatim
    let mut expected = sample_bin();
    expected[0]["downloaded"] = serde_json::json!(true);
    Mock::given(method("PUT"))
        .and(path("/b/bin123"))
        .and(header("X-Master-Key", "secret"))
        .and(body_json(expected))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let store = JsonBinStore::new(&server.uri(), "secret", "bin123").unwrap();
    store
        .update_fields("v1", &FieldUpdate::downloaded(true))
        .await
        .expect("update should succeed");
}

#[tokio::test]
async fn test_update_keeps_source_url_key() {
    let server = MockServer::start().await;
    let bin = serde_json::json!([
        {
            "id": "v1",
            "source_url": "https://www.youtube.com/watch?v=v1",
            "title": "First",
            "upload_date": "20230115",
            "channel_name": "MyChan"
        }
    ]);
    Mock::given(method("GET"))
        .and(path("/b/bin123/latest"))
        .respond_with(ResponseTemplate::new(200).set_body_json(bin.clone()))
        .mount(&server)
        .await;

    let mut expected = bin;
    expected[0]["uploaded"] = serde_json::json!(true);
    Mock::given(method("PUT"))
        .and(path("/b/bin123"))
        .and(body_json(expected))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let store = JsonBinStore::new(&server.uri(), "secret", "bin123").unwrap();
    let records = store.list_all().await.unwrap();
    assert_eq!(records[0].url, "https://www.youtube.com/watch?v=v1");

    store
        .update_fields("v1", &FieldUpdate::uploaded(true))
        .await
        .expect("update should succeed");
}

#[tokio::test]
async fn test_update_unknown_record_fails_without_writing() {
    let server = MockServer::start().await;
    mount_read(&server).await;
    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let store = JsonBinStore::new(&server.uri(), "secret", "bin123").unwrap();
    let err = store
        .update_fields("missing", &FieldUpdate::uploaded(true))
        .await
        .unwrap_err();

    assert!(format!("{err:#}").contains("Record not found"));
}

#[tokio::test]
async fn test_read_failure_is_reported() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(401).set_body_string("Invalid X-Master-Key"))
        .mount(&server)
        .await;

    let store = JsonBinStore::new(&server.uri(), "wrong", "bin123").unwrap();
    let err = store.refresh().await.unwrap_err();

    assert!(format!("{err:#}").contains("401"));
}
