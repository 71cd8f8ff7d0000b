mod common;

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use common::*;
use file_share::entities::prelude::*;
use sea_orm::{EntityTrait, PaginatorTrait};
use tower::ServiceExt;

#[tokio::test]
async fn test_upload_flow() {
    let t = setup().await;
    let content = b"Hello, this is a test file content!";

    let json = upload(&t.app, "test.txt", content).await;
    assert_eq!(json["message"], "File uploaded");

    let file = &json["file"];
    assert!(!file["id"].as_str().unwrap().is_empty());
    assert_eq!(file["originalName"], "test.txt");
    assert_eq!(file["size"], content.len() as u64);
    assert!(file["uploadTime"].is_string());

    // Stored key is unique and distinct from the display name
    let stored = file["filename"].as_str().unwrap();
    assert_ne!(stored, "test.txt");
    assert!(stored.ends_with("-test.txt"));

    // Exactly one record and one blob, sizes agree
    assert_eq!(FileRecords::find().count(&t.state.db).await.unwrap(), 1);
    let blob = std::fs::read(t.state.config.upload_dir.join(stored)).unwrap();
    assert_eq!(blob, content);
    assert_eq!(count_files(&t.state.config.upload_dir), 1);
    assert_eq!(count_files(&t.state.config.staging_dir), 0);
}

#[tokio::test]
async fn test_upload_keeps_unsafe_original_name_for_display() {
    let t = setup().await;

    let json = upload(&t.app, "../../etc/passwd", b"nope").await;
    assert_eq!(json["file"]["originalName"], "../../etc/passwd");

    let stored = json["file"]["filename"].as_str().unwrap();
    assert!(stored.ends_with("-passwd"));
    assert!(!stored.contains('/'));
    assert!(t.state.config.upload_dir.join(stored).is_file());
}

#[tokio::test]
async fn test_upload_without_file_is_rejected() {
    let t = setup().await;

    let response = post_multipart(&t.app, &[("note", None, b"just text")]).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert_eq!(json["error"], "No file uploaded");

    assert_eq!(FileRecords::find().count(&t.state.db).await.unwrap(), 0);
    assert_eq!(count_files(&t.state.config.upload_dir), 0);
    assert_eq!(count_files(&t.state.config.staging_dir), 0);
}

#[tokio::test]
async fn test_upload_ignores_extra_fields() {
    let t = setup().await;

    let response = post_multipart(
        &t.app,
        &[
            ("comment", None, b"ignored"),
            ("file", Some("photo.png"), b"\x89PNG"),
        ],
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["file"]["originalName"], "photo.png");
    assert_eq!(json["file"]["size"], 4);
}

#[tokio::test]
async fn test_upload_with_two_files_is_rejected() {
    let t = setup().await;

    let response = post_multipart(
        &t.app,
        &[("file", Some("a.txt"), b"aaa"), ("file", Some("b.txt"), b"bbb")],
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    assert_eq!(FileRecords::find().count(&t.state.db).await.unwrap(), 0);
    assert_eq!(count_files(&t.state.config.upload_dir), 0);
    assert_eq!(count_files(&t.state.config.staging_dir), 0);
}

#[tokio::test]
async fn test_upload_of_empty_file() {
    let t = setup().await;

    let json = upload(&t.app, "empty.dat", b"").await;
    assert_eq!(json["file"]["size"], 0);
    let stored = json["file"]["filename"].as_str().unwrap();
    assert_eq!(
        std::fs::metadata(t.state.config.upload_dir.join(stored))
            .unwrap()
            .len(),
        0
    );
}

#[tokio::test]
async fn test_non_multipart_request_is_rejected() {
    let t = setup().await;

    let response = t
        .app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/files/upload")
                .header("Content-Type", "application/json")
                .body(Body::from(r#"{"file": "nope"}"#))
                .unwrap(),
        )
        .await
        .unwrap();
    assert!(response.status().is_client_error());
    assert_eq!(FileRecords::find().count(&t.state.db).await.unwrap(), 0);
}

#[tokio::test]
async fn test_oversized_upload_is_rejected() {
    // Body limit becomes 10 MB of multipart headroom plus 1 KB
    let t = setup_with(|c| c.max_file_size = 1024).await;
    let content = payload(10 * 1024 * 1024 + 512 * 1024);

    let response = post_multipart(&t.app, &[("file", Some("huge.bin"), &content)]).await;
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);

    assert_eq!(FileRecords::find().count(&t.state.db).await.unwrap(), 0);
    assert_eq!(count_files(&t.state.config.upload_dir), 0);
    assert_eq!(count_files(&t.state.config.staging_dir), 0);
}

#[tokio::test]
async fn test_concurrent_uploads_with_same_name() {
    let t = setup().await;

    let (a, b) = tokio::join!(
        upload(&t.app, "same.txt", b"first copy"),
        upload(&t.app, "same.txt", b"second copy!"),
    );

    assert_ne!(a["file"]["id"], b["file"]["id"]);
    assert_ne!(a["file"]["filename"], b["file"]["filename"]);
    assert_eq!(a["file"]["originalName"], "same.txt");
    assert_eq!(b["file"]["originalName"], "same.txt");

    assert_eq!(FileRecords::find().count(&t.state.db).await.unwrap(), 2);
    assert_eq!(count_files(&t.state.config.upload_dir), 2);

    for json in [&a, &b] {
        let stored = json["file"]["filename"].as_str().unwrap();
        let blob = std::fs::read(t.state.config.upload_dir.join(stored)).unwrap();
        assert_eq!(blob.len() as u64, json["file"]["size"].as_u64().unwrap());
    }
}
