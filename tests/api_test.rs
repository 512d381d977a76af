//! Streaming API Client Tests
//!
//! Every endpoint against a mock server: request shape (path, query,
//! X-API-Key header) and response handling.

use mockito::{Matcher, Server};
use subcast::api::{ApiError, ApiHealth, StreamApiClient};
use subcast::models::{ExtractionRequest, KeyStatus, TaskState};

const MAGNET: &str = "magnet:?xt=urn:btih:abc&dn=Movie";

fn client(server: &Server) -> StreamApiClient {
    StreamApiClient::with_base_url(server.url(), Some("test-key".into()))
}

// =============================================================================
// File Listing
// =============================================================================

#[tokio::test]
async fn test_files_parses_listing() {
    let mut server = Server::new_async().await;

    let mock = server
        .mock("GET", Matcher::Regex(r"^/files".into()))
        .match_header("X-API-Key", "test-key")
        .match_query(Matcher::UrlEncoded("url".into(), MAGNET.into()))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            r#"{
                "Files": [
                    {"path": "Movie/Movie.2020.1080p.mkv", "Name": "Movie.2020.1080p.mkv", "size": 2000000000, "originalIndex": 4},
                    {"Name": "Movie.2020.1080p.eng.srt", "size": 50000, "originalIndex": 1},
                    {"Name": null, "originalIndex": 2},
                    {"Name": "no-index.txt", "size": 3}
                ]
            }"#,
        )
        .create_async()
        .await;

    let files = client(&server).files(MAGNET).await.unwrap();

    mock.assert_async().await;
    assert_eq!(files.len(), 2);
    assert_eq!(files[0].name, "Movie/Movie.2020.1080p.mkv");
    assert_eq!(files[0].index, 4);
    assert_eq!(files[0].size, 2_000_000_000);
    assert_eq!(files[1].index, 1);
}

#[tokio::test]
async fn test_files_empty_listing_is_error() {
    let mut server = Server::new_async().await;

    let _mock = server
        .mock("GET", Matcher::Regex(r"^/files".into()))
        .with_status(200)
        .with_body(r#"{"Files": []}"#)
        .create_async()
        .await;

    let err = client(&server).files(MAGNET).await.unwrap_err();
    assert!(matches!(err, ApiError::NoFiles));
}

#[tokio::test]
async fn test_files_http_error() {
    let mut server = Server::new_async().await;

    let _mock = server
        .mock("GET", Matcher::Regex(r"^/files".into()))
        .with_status(500)
        .with_body("torrent engine crashed")
        .create_async()
        .await;

    let err = client(&server).files(MAGNET).await.unwrap_err();
    match err {
        ApiError::Status { status, body } => {
            assert_eq!(status, 500);
            assert!(body.contains("crashed"));
        }
        other => panic!("expected status error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_files_invalid_json() {
    let mut server = Server::new_async().await;

    let _mock = server
        .mock("GET", Matcher::Regex(r"^/files".into()))
        .with_status(200)
        .with_body(r#"{"Files": not json"#)
        .create_async()
        .await;

    let err = client(&server).files(MAGNET).await.unwrap_err();
    assert!(matches!(err, ApiError::Malformed { .. }));
}

#[tokio::test]
async fn test_unreachable_server_is_transport_error() {
    let client = StreamApiClient::with_base_url("http://127.0.0.1:9", Some("k".into()));
    let err = client.files(MAGNET).await.unwrap_err();
    assert!(err.is_transport());
}

#[tokio::test]
async fn test_metadata() {
    let mut server = Server::new_async().await;

    let _mock = server
        .mock("GET", Matcher::Regex(r"^/metadata".into()))
        .with_status(200)
        .with_body(r#"{"name": "Movie (2020)", "fileCount": 3}"#)
        .create_async()
        .await;

    let meta = client(&server).metadata(MAGNET).await.unwrap();
    assert_eq!(meta.name, "Movie (2020)");
    assert_eq!(meta.file_count, 3);
}

// =============================================================================
// Probe & Extraction
// =============================================================================

#[tokio::test]
async fn test_probe() {
    let mut server = Server::new_async().await;

    let mock = server
        .mock("GET", Matcher::Regex(r"^/probe".into()))
        .match_query(Matcher::UrlEncoded("index".into(), "4".into()))
        .with_status(200)
        .with_body(r#"{"hasSubtitles": true, "subtitleTracks": 2}"#)
        .create_async()
        .await;

    let probe = client(&server).probe(MAGNET, 4).await.unwrap();

    mock.assert_async().await;
    assert!(probe.has_subtitles);
    assert_eq!(probe.subtitle_tracks, Some(2));
}

#[tokio::test]
async fn test_extract_subtitle_file_query() {
    let mut server = Server::new_async().await;

    let mock = server
        .mock("GET", Matcher::Regex(r"^/subtitles/extract".into()))
        .match_header("X-API-Key", "test-key")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("url".into(), MAGNET.into()),
            Matcher::UrlEncoded("fileIndex".into(), "1".into()),
            Matcher::UrlEncoded("isSRTFile".into(), "true".into()),
        ]))
        .with_status(200)
        .with_body(r#"{"id": "task-1"}"#)
        .create_async()
        .await;

    let id = client(&server)
        .start_extraction(MAGNET, ExtractionRequest::subtitle_file(1))
        .await
        .unwrap();

    mock.assert_async().await;
    assert_eq!(id, "task-1");
}

#[tokio::test]
async fn test_extract_embedded_query() {
    let mut server = Server::new_async().await;

    let mock = server
        .mock("GET", Matcher::Regex(r"^/subtitles/extract".into()))
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("fileIndex".into(), "4".into()),
            Matcher::UrlEncoded("isSRTFile".into(), "false".into()),
            Matcher::UrlEncoded("subIndex".into(), "0".into()),
        ]))
        .with_status(200)
        .with_body(r#"{"id": "task-2"}"#)
        .create_async()
        .await;

    let id = client(&server)
        .start_extraction(MAGNET, ExtractionRequest::embedded(4, 0))
        .await
        .unwrap();

    mock.assert_async().await;
    assert_eq!(id, "task-2");
}

#[tokio::test]
async fn test_extract_without_id_is_malformed() {
    let mut server = Server::new_async().await;

    let _mock = server
        .mock("GET", Matcher::Regex(r"^/subtitles/extract".into()))
        .with_status(200)
        .with_body(r#"{"status": "queued"}"#)
        .create_async()
        .await;

    let err = client(&server)
        .start_extraction(MAGNET, ExtractionRequest::subtitle_file(1))
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::Malformed { .. }));
}

#[tokio::test]
async fn test_task_status() {
    let mut server = Server::new_async().await;

    let _mock = server
        .mock("GET", Matcher::Regex(r"^/subtitles/status".into()))
        .match_query(Matcher::UrlEncoded("id".into(), "abc".into()))
        .with_status(200)
        .with_body(r#"{"status": "extracting", "progress": 42.26}"#)
        .create_async()
        .await;

    let status = client(&server).task_status("abc").await.unwrap();
    assert_eq!(status.status, TaskState::Extracting);
    assert_eq!(status.progress, Some(42.26));
    assert!(status.error.is_none());
}

#[tokio::test]
async fn test_stream_status() {
    let mut server = Server::new_async().await;

    let _mock = server
        .mock("GET", Matcher::Regex(r"^/status".into()))
        .with_status(200)
        .with_body(
            r#"{"percentageCompleted": 37.5, "downloadSpeedBps": 1048576, "downloadSpeedHuman": "1.0 MB/s"}"#,
        )
        .create_async()
        .await;

    let status = client(&server).stream_status(MAGNET, 4).await.unwrap();
    assert!(!status.is_complete());
    assert!(status.is_downloading());
    assert_eq!(status.to_string(), "Downloading: 37.5% at 1.0 MB/s");
}

// =============================================================================
// Health & Key Status
// =============================================================================

#[tokio::test]
async fn test_health_online_and_offline() {
    let mut server = Server::new_async().await;

    let ok = server
        .mock("GET", "/")
        .with_status(200)
        .create_async()
        .await;
    assert_eq!(client(&server).health().await, ApiHealth::Online);
    ok.remove_async().await;

    let _down = server
        .mock("GET", "/")
        .with_status(503)
        .create_async()
        .await;
    assert_eq!(
        client(&server).health().await,
        ApiHealth::Offline { status: 503 }
    );
}

#[tokio::test]
async fn test_key_status_master() {
    let mut server = Server::new_async().await;

    let _mock = server
        .mock("GET", "/user/api-key-status")
        .match_header("X-API-Key", "test-key")
        .with_status(200)
        .with_body(r#"{"isMasterKey": true}"#)
        .create_async()
        .await;

    let status = client(&server).api_key_status().await.unwrap();
    assert_eq!(status, KeyStatus::Master);
}

#[tokio::test]
async fn test_key_status_rejected() {
    let mut server = Server::new_async().await;

    let _mock = server
        .mock("GET", "/user/api-key-status")
        .with_status(401)
        .with_body(r#"{"error": "Unknown key"}"#)
        .create_async()
        .await;

    let status = client(&server).api_key_status().await.unwrap();
    assert_eq!(
        status,
        KeyStatus::Invalid {
            reason: "Unknown key".into()
        }
    );
}

#[tokio::test]
async fn test_key_status_future_expiry() {
    let mut server = Server::new_async().await;
    let expires = chrono::Utc::now() + chrono::Duration::hours(36);

    let _mock = server
        .mock("GET", "/user/api-key-status")
        .with_status(200)
        .with_body(format!(
            r#"{{"isMasterKey": false, "expiresAt": "{}"}}"#,
            expires.to_rfc3339()
        ))
        .create_async()
        .await;

    let status = client(&server).api_key_status().await.unwrap();
    assert_eq!(status, KeyStatus::Active { days_left: 2 });
}
