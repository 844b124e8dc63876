// Integration tests for the upload API

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use mockito::{Matcher, ServerGuard};
use shelf::api::{create_upload_router, UploadAppState};
use shelf::directory::DirectoryStore;
use shelf::drive::DriveClient;
use shelf::session::Sessions;
use std::sync::Arc;
use tower::ServiceExt;

const BOUNDARY: &str = "shelf-test-boundary";

struct TestApp {
    app: Router,
    directory: Arc<DirectoryStore>,
    sessions: Sessions,
}

fn create_test_app(server: &ServerGuard, body_limit: usize) -> TestApp {
    let key = BASE64.encode([0u8; 32]);
    let directory = Arc::new(DirectoryStore::new(":memory:", &key).unwrap());
    let drive = Arc::new(DriveClient::with_base_url(server.url()));
    let sessions = Sessions::new("test-session-secret", 3600);

    let state = UploadAppState {
        directory: directory.clone(),
        drive,
        sessions: sessions.clone(),
        body_limit_bytes: body_limit,
    };

    TestApp {
        app: create_upload_router(state),
        directory,
        sessions,
    }
}

/// Build a multipart/form-data body with the standard upload fields.
fn upload_body(file: Option<(&str, &str, &[u8])>, path: &str, filename: &str, user_id: &str) -> Vec<u8> {
    let mut body = Vec::new();

    if let Some((name, mime, bytes)) = file {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{name}\"\r\nContent-Type: {mime}\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(bytes);
        body.extend_from_slice(b"\r\n");
    }

    for (field, value) in [("path", path), ("filename", filename), ("userId", user_id)] {
        body.extend_from_slice(
            format!("--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{field}\"\r\n\r\n{value}\r\n")
                .as_bytes(),
        );
    }

    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

fn upload_request(body: Vec<u8>, session_cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/api/upload")
        .header(
            "content-type",
            format!("multipart/form-data; boundary={BOUNDARY}"),
        );

    if let Some(token) = session_cookie {
        builder = builder.header("cookie", format!("shelf_session={token}"));
    }

    builder.body(Body::from(body)).unwrap()
}

async fn response_json(response: axum::response::Response) -> serde_json::Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

#[tokio::test]
async fn test_upload_without_file_is_400_and_never_reaches_provider() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/upload/drive/v3/files")
        .match_query(Matcher::Any)
        .expect(0)
        .create_async()
        .await;

    let test = create_test_app(&server, 1024 * 1024);
    let token = test.sessions.mint("sub-1", "drive-token", None, None).unwrap();

    let body = upload_body(None, "/photos", "a", "sub-1");
    let response = test
        .app
        .oneshot(upload_request(body, Some(&token)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = response_json(response).await;
    assert_eq!(json["error"], "No file uploaded");

    mock.assert_async().await;
}

#[tokio::test]
async fn test_upload_without_session_is_401() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/upload/drive/v3/files")
        .match_query(Matcher::Any)
        .expect(0)
        .create_async()
        .await;

    let test = create_test_app(&server, 1024 * 1024);

    let body = upload_body(Some(("photo.png", "image/png", b"\x89PNG")), "/p", "a", "sub-1");
    let response = test.app.oneshot(upload_request(body, None)).await.unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    mock.assert_async().await;
}

#[tokio::test]
async fn test_successful_upload_records_file() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/upload/drive/v3/files")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("uploadType".into(), "multipart".into()),
            Matcher::UrlEncoded("fields".into(), "id,webViewLink".into()),
        ]))
        .match_header("authorization", "Bearer drive-token")
        .expect(1)
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"id": "file-77", "webViewLink": "https://drive.google.com/file/d/file-77/view"}"#)
        .create_async()
        .await;

    let test = create_test_app(&server, 1024 * 1024);

    // The user has a provisioned root; the upload goes under it
    test.directory.upsert_user("sub-1", None, None).unwrap();
    assert!(test
        .directory
        .claim_drive_root("sub-1", "folder-123", "/Fill Out Later")
        .unwrap());

    let token = test.sessions.mint("sub-1", "drive-token", None, None).unwrap();

    let body = upload_body(
        Some(("photo.png", "image/png", b"\x89PNG...")),
        "/holiday",
        "beach",
        "sub-1",
    );
    let response = test
        .app
        .clone()
        .oneshot(upload_request(body, Some(&token)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = response_json(response).await;
    assert_eq!(json["success"], true);
    assert_eq!(json["id"], "file-77");
    assert_eq!(
        json["webViewLink"],
        "https://drive.google.com/file/d/file-77/view"
    );

    mock.assert_async().await;

    // Exactly one record, matching the provider's response
    let files = test.directory.list_files("sub-1").unwrap();
    assert_eq!(files.len(), 1);
    assert_eq!(files[0].id, "file-77");
    assert_eq!(
        files[0].web_view_link.as_deref(),
        Some("https://drive.google.com/file/d/file-77/view")
    );
    assert_eq!(files[0].path, "/holiday");
    // Requested name gains the original extension
    assert_eq!(files[0].file_name, "beach.png");
}

#[tokio::test]
async fn test_upload_for_unknown_user_is_tolerated() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("POST", "/upload/drive/v3/files")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"id": "file-1", "webViewLink": "https://drive.google.com/file/d/file-1/view"}"#)
        .create_async()
        .await;

    let test = create_test_app(&server, 1024 * 1024);
    let token = test.sessions.mint("sub-x", "drive-token", None, None).unwrap();

    // No user record exists; the file lands without a parent folder
    let body = upload_body(Some(("a.txt", "text/plain", b"hi")), "/", "", "sub-x");
    let response = test
        .app
        .oneshot(upload_request(body, Some(&token)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(test.directory.list_files("sub-x").unwrap().len(), 1);
}

#[tokio::test]
async fn test_provider_response_without_id_is_500_and_writes_nothing() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("POST", "/upload/drive/v3/files")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"webViewLink": "https://drive.google.com/file/d/x/view"}"#)
        .create_async()
        .await;

    let test = create_test_app(&server, 1024 * 1024);
    let token = test.sessions.mint("sub-1", "drive-token", None, None).unwrap();

    let body = upload_body(Some(("a.txt", "text/plain", b"hi")), "/", "", "sub-1");
    let response = test
        .app
        .oneshot(upload_request(body, Some(&token)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(test.directory.list_files("sub-1").unwrap().is_empty());
}

#[tokio::test]
async fn test_upload_body_limit() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/upload/drive/v3/files")
        .match_query(Matcher::Any)
        .expect(0)
        .create_async()
        .await;

    // 1 KiB limit, 4 KiB payload
    let test = create_test_app(&server, 1024);
    let token = test.sessions.mint("sub-1", "drive-token", None, None).unwrap();

    let payload = vec![0u8; 4096];
    let body = upload_body(Some(("big.bin", "application/octet-stream", &payload)), "/", "", "sub-1");
    let response = test
        .app
        .oneshot(upload_request(body, Some(&token)))
        .await
        .unwrap();

    assert!(response.status().is_client_error());
    mock.assert_async().await;
}

#[tokio::test]
async fn test_list_files_requires_session() {
    let server = mockito::Server::new_async().await;
    let test = create_test_app(&server, 1024 * 1024);

    let response = test
        .app
        .oneshot(
            Request::builder()
                .uri("/api/files/sub-1")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_list_files_returns_records() {
    let server = mockito::Server::new_async().await;
    let test = create_test_app(&server, 1024 * 1024);

    test.directory
        .record_file(
            "sub-1",
            &shelf::directory::UploadedFile {
                id: "f1".to_string(),
                web_view_link: Some("https://drive.google.com/file/d/f1/view".to_string()),
                path: "/docs".to_string(),
                file_name: "notes.txt".to_string(),
            },
        )
        .unwrap();

    let token = test.sessions.mint("sub-1", "drive-token", None, None).unwrap();
    let response = test
        .app
        .oneshot(
            Request::builder()
                .uri("/api/files/sub-1")
                .header("authorization", "Bearer ".to_string() + &token)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = response_json(response).await;
    let files = json["files"].as_array().unwrap();
    assert_eq!(files.len(), 1);
    assert_eq!(files[0]["id"], "f1");
    assert_eq!(files[0]["fileName"], "notes.txt");
    assert_eq!(files[0]["path"], "/docs");
}
