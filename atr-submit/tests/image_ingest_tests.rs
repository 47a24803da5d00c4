//! Image store client tests against a local stand-in upload API

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use atr_common::config::ImageStoreCredentials;
use atr_submit::services::image_ingest::sign_params;
use atr_submit::services::{CloudinaryIngestor, ImageIngestor, IngestError};
use axum::{
    body::Bytes,
    extract::{Multipart, State},
    http::StatusCode,
    routing::post,
    Json, Router,
};
use serde_json::{json, Value};

/// What the stand-in API received
#[derive(Debug, Default, Clone)]
struct Received {
    fields: HashMap<String, String>,
    file_len: usize,
    file_type: Option<String>,
}

#[derive(Clone)]
struct MockStore {
    received: Arc<Mutex<Option<Received>>>,
    reply: Arc<(StatusCode, Value)>,
}

async fn upload(
    State(store): State<MockStore>,
    mut multipart: Multipart,
) -> (StatusCode, Json<Value>) {
    let mut received = Received::default();
    while let Some(field) = multipart.next_field().await.unwrap() {
        let name = field.name().unwrap_or_default().to_string();
        if name == "file" {
            received.file_type = field.content_type().map(str::to_string);
            received.file_len = field.bytes().await.unwrap().len();
        } else {
            received.fields.insert(name, field.text().await.unwrap());
        }
    }
    *store.received.lock().unwrap() = Some(received);

    let (status, body) = store.reply.as_ref().clone();
    (status, Json(body))
}

/// Start the stand-in API; returns its base URL and the capture slot
async fn start_store(status: StatusCode, reply: Value) -> (String, Arc<Mutex<Option<Received>>>) {
    let received = Arc::new(Mutex::new(None));
    let store = MockStore {
        received: received.clone(),
        reply: Arc::new((status, reply)),
    };
    let app = Router::new()
        .route("/demo/image/upload", post(upload))
        .with_state(store);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://{}", addr), received)
}

fn credentials() -> ImageStoreCredentials<'static> {
    ImageStoreCredentials {
        cloud_name: "demo",
        api_key: "key-123",
        api_secret: "secret",
    }
}

#[tokio::test]
async fn test_signed_upload_returns_secure_url() {
    let (base, received) = start_store(
        StatusCode::OK,
        json!({"secure_url": "https://res.example.com/demo/atak_targets/x1.jpg", "public_id": "x1"}),
    )
    .await;
    let ingestor = CloudinaryIngestor::with_api_base(&base, credentials(), "atak_targets").unwrap();

    let url = ingestor
        .upload(Bytes::from(vec![0xFFu8; 4096]), "image/png")
        .await
        .unwrap();

    assert_eq!(url.as_str(), "https://res.example.com/demo/atak_targets/x1.jpg");

    let received = received.lock().unwrap().clone().expect("upload reached the store");
    assert_eq!(received.file_len, 4096);
    assert_eq!(received.file_type.as_deref(), Some("image/png"));
    assert_eq!(received.fields["api_key"], "key-123");
    assert_eq!(received.fields["folder"], "atak_targets");
    assert_eq!(received.fields["format"], "jpg");
    assert_eq!(received.fields["signature_algorithm"], "sha256");

    // The signature must cover exactly the signed parameters that were sent
    let signed: Vec<(&str, String)> = ["folder", "format", "timestamp", "transformation"]
        .iter()
        .map(|k| (*k, received.fields[*k].clone()))
        .collect();
    assert_eq!(received.fields["signature"], sign_params(&signed, "secret"));
}

#[tokio::test]
async fn test_api_error_is_reported_with_status() {
    let (base, _received) = start_store(
        StatusCode::UNAUTHORIZED,
        json!({"error": {"message": "Invalid Signature"}}),
    )
    .await;
    let ingestor = CloudinaryIngestor::with_api_base(&base, credentials(), "atak_targets").unwrap();

    let err = ingestor
        .upload(Bytes::from_static(b"\xff\xd8\xff"), "image/jpeg")
        .await
        .unwrap_err();

    match err {
        IngestError::Api(status, body) => {
            assert_eq!(status, 401);
            assert!(body.contains("Invalid Signature"));
        }
        other => panic!("expected Api error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_relative_url_is_invalid_response() {
    let (base, _received) = start_store(StatusCode::OK, json!({"secure_url": "/local/x1.jpg"})).await;
    let ingestor = CloudinaryIngestor::with_api_base(&base, credentials(), "atak_targets").unwrap();

    let err = ingestor
        .upload(Bytes::from_static(b"\xff\xd8\xff"), "image/jpeg")
        .await
        .unwrap_err();

    assert!(matches!(err, IngestError::InvalidResponse(_)));
}

#[tokio::test]
async fn test_missing_secure_url_is_invalid_response() {
    let (base, _received) = start_store(StatusCode::OK, json!({"public_id": "x1"})).await;
    let ingestor = CloudinaryIngestor::with_api_base(&base, credentials(), "atak_targets").unwrap();

    let err = ingestor
        .upload(Bytes::from_static(b"\xff\xd8\xff"), "image/jpeg")
        .await
        .unwrap_err();

    assert!(matches!(err, IngestError::InvalidResponse(_)));
}

#[tokio::test]
async fn test_unreachable_store_is_network_error() {
    let ingestor =
        CloudinaryIngestor::with_api_base("http://127.0.0.1:1", credentials(), "atak_targets").unwrap();

    let err = ingestor
        .upload(Bytes::from_static(b"\xff\xd8\xff"), "image/jpeg")
        .await
        .unwrap_err();

    assert!(matches!(err, IngestError::Network(_)));
}
