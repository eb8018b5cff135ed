use cloudscribe::gcloud::{Credential, Endpoints, GoogleCloudClient, StorageClient};
use cloudscribe::GcpError;
use serde_json::json;
use wiremock::{
    matchers::{body_string, header, method, path, query_param},
    Mock, MockServer, ResponseTemplate,
};

fn storage_for(server: &MockServer) -> StorageClient {
    StorageClient::new(GoogleCloudClient::new(Endpoints::with_base(&server.uri())))
}

async fn request_count(server: &MockServer) -> usize {
    server.received_requests().await.unwrap().len()
}

#[tokio::test]
async fn test_list_skips_folder_placeholders() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/storage/v1/b/bucket/o"))
        .and(query_param("prefix", "audio/"))
        .and(query_param("fields", "items(name,size,contentType)"))
        .and(query_param("key", "test-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [
                {"name": "audio/"},
                {"name": "audio/a.mp3", "size": "2048", "contentType": "audio/mpeg"}
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let items = storage_for(&server)
        .list("bucket", "audio/", &Credential::api_key("test-key"))
        .await
        .unwrap();

    assert_eq!(items.len(), 1);
    assert_eq!(items[0].name, "audio/a.mp3");
    assert_eq!(items[0].uri, "gs://bucket/audio/a.mp3");
    assert_eq!(items[0].size, Some(2048));
    assert_eq!(items[0].content_type.as_deref(), Some("audio/mpeg"));
}

#[tokio::test]
async fn test_list_preserves_backend_order_and_omits_empty_prefix() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/storage/v1/b/bucket/o"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [{"name": "z.txt"}, {"name": "a.txt"}, {"name": "m/"}]
        })))
        .mount(&server)
        .await;

    let items = storage_for(&server)
        .list("bucket", "", &Credential::api_key("k"))
        .await
        .unwrap();

    let names: Vec<_> = items.iter().map(|i| i.name.as_str()).collect();
    assert_eq!(names, vec!["z.txt", "a.txt"]);

    let requests = server.received_requests().await.unwrap();
    assert!(!requests[0].url.query_pairs().any(|(k, _)| k == "prefix"));
}

#[tokio::test]
async fn test_list_with_oauth_sends_bearer_and_quota_project() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/storage/v1/b/bucket/o"))
        .and(header("authorization", "Bearer ya29.token"))
        .and(header("x-goog-user-project", "billing"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;

    let credential = Credential::oauth_token("ya29.token").with_quota_project("billing");
    let items = storage_for(&server)
        .list("bucket", "audio/", &credential)
        .await
        .unwrap();

    assert!(items.is_empty());
    let requests = server.received_requests().await.unwrap();
    assert!(!requests[0].url.query_pairs().any(|(k, _)| k == "key"));
}

#[tokio::test]
async fn test_list_error_uses_envelope_message() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(403).set_body_json(json!({
            "error": {"code": 403, "message": "caller does not have storage.objects.list access"}
        })))
        .mount(&server)
        .await;

    let err = storage_for(&server)
        .list("bucket", "", &Credential::api_key("k"))
        .await
        .unwrap_err();

    match err {
        GcpError::RemoteApi { status, message } => {
            assert_eq!(status, Some(403));
            assert_eq!(message, "caller does not have storage.objects.list access");
        }
        other => panic!("Expected RemoteApi, got {other:?}"),
    }
}

#[tokio::test]
async fn test_list_error_falls_back_to_status_text() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500).set_body_string("<html>oops</html>"))
        .mount(&server)
        .await;

    let err = storage_for(&server)
        .list("bucket", "", &Credential::api_key("k"))
        .await
        .unwrap_err();

    match err {
        GcpError::RemoteApi { status, message } => {
            assert_eq!(status, Some(500));
            assert_eq!(message, "Internal Server Error");
        }
        other => panic!("Expected RemoteApi, got {other:?}"),
    }
}

#[tokio::test]
async fn test_list_unparseable_success_is_protocol_error() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .mount(&server)
        .await;

    let err = storage_for(&server)
        .list("bucket", "", &Credential::api_key("k"))
        .await
        .unwrap_err();

    assert!(matches!(err, GcpError::Protocol(_)));
}

#[tokio::test]
async fn test_read_returns_raw_bytes_for_nested_path() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/storage/v1/b/bucket/o/audio/deep/clip.bin"))
        .and(query_param("alt", "media"))
        .and(query_param("key", "k"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0u8, 159, 146, 150]))
        .expect(1)
        .mount(&server)
        .await;

    let bytes = storage_for(&server)
        .read("gs://bucket/audio/deep/clip.bin", &Credential::api_key("k"))
        .await
        .unwrap();

    assert_eq!(bytes, vec![0u8, 159, 146, 150]);
}

#[tokio::test]
async fn test_read_encodes_special_characters_but_not_separators() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .mount(&server)
        .await;

    storage_for(&server)
        .read("gs://bucket/audio/my clip#1.txt", &Credential::api_key("k"))
        .await
        .unwrap();

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests[0].url.path(), "/storage/v1/b/bucket/o/audio/my%20clip%231.txt");
}

#[tokio::test]
async fn test_read_not_found_with_unparseable_body() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404).set_body_string("No such object"))
        .mount(&server)
        .await;

    let err = storage_for(&server)
        .read("gs://bucket/missing.txt", &Credential::api_key("k"))
        .await
        .unwrap_err();

    match err {
        GcpError::RemoteApi { status, message } => {
            assert_eq!(status, Some(404));
            assert_eq!(message, "Not Found");
        }
        other => panic!("Expected RemoteApi, got {other:?}"),
    }
}

#[tokio::test]
async fn test_read_rejects_malformed_uri_without_request() {
    let server = MockServer::start().await;
    let storage = storage_for(&server);

    for uri in ["bucket/file.txt", "gs://bucket", "gs://bucket/"] {
        let err = storage.read(uri, &Credential::api_key("k")).await.unwrap_err();
        assert!(matches!(err, GcpError::Validation(_)), "{uri}");
    }

    assert_eq!(request_count(&server).await, 0);
}

#[tokio::test]
async fn test_write_uploads_text_and_returns_uri() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/upload/storage/v1/b/out-bucket/o"))
        .and(query_param("uploadType", "media"))
        .and(query_param("name", "output/audio/a.mp3/speech-to-text/text.txt"))
        .and(header("content-type", "text/plain; charset=utf-8"))
        .and(body_string("hello world"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"name": "ignored"})))
        .expect(1)
        .mount(&server)
        .await;

    let uri = storage_for(&server)
        .write(
            "out-bucket",
            "output/audio/a.mp3/speech-to-text/text.txt",
            "hello world",
            &Credential::api_key("k"),
        )
        .await
        .unwrap();

    assert_eq!(uri, "gs://out-bucket/output/audio/a.mp3/speech-to-text/text.txt");
}

#[tokio::test]
async fn test_write_success_ignores_response_body() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json at all"))
        .mount(&server)
        .await;

    let uri = storage_for(&server)
        .write("b", "notes.txt", "x", &Credential::api_key("k"))
        .await
        .unwrap();

    assert_eq!(uri, "gs://b/notes.txt");
}

#[tokio::test]
async fn test_write_error_maps_status() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "error": {"code": 401, "message": "Invalid Credentials"}
        })))
        .mount(&server)
        .await;

    let err = storage_for(&server)
        .write("b", "notes.txt", "x", &Credential::oauth_token("expired"))
        .await
        .unwrap_err();

    assert_eq!(err.status(), Some(401));
    assert_eq!(err.to_string(), "API error (401): Invalid Credentials");
}

#[tokio::test]
async fn test_empty_secret_never_reaches_network() {
    let server = MockServer::start().await;
    let storage = storage_for(&server);

    for credential in [Credential::api_key(""), Credential::oauth_token("")] {
        let list = storage.list("bucket", "audio/", &credential).await;
        assert!(matches!(list, Err(GcpError::Validation(_))));

        let read = storage.read("gs://bucket/a.txt", &credential).await;
        assert!(matches!(read, Err(GcpError::Validation(_))));

        let write = storage.write("bucket", "a.txt", "x", &credential).await;
        assert!(matches!(write, Err(GcpError::Validation(_))));
    }

    assert_eq!(request_count(&server).await, 0);
}

#[tokio::test]
async fn test_transport_failure_is_remote_api_error() {
    // Nothing listens on port 1.
    let storage = StorageClient::new(GoogleCloudClient::new(Endpoints::with_base(
        "http://127.0.0.1:1",
    )));

    let err = storage
        .list("bucket", "", &Credential::api_key("k"))
        .await
        .unwrap_err();

    assert!(matches!(err, GcpError::RemoteApi { status: None, .. }));
}
