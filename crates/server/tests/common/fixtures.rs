//! Test payloads and request helpers.

use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use serde_json::Value;
use std::io::Cursor;
use tower::ServiceExt;

/// Token whose SHA-256 is configured by `AuthConfig::for_testing`.
#[allow(dead_code)]
pub const TEST_TOKEN: &str = "test-upload-token";

/// Minimal PDF document; sniffs as `application/pdf`.
#[allow(dead_code)]
pub const PDF_BYTES: &[u8] =
    b"%PDF-1.4\n1 0 obj\n<< /Type /Catalog /Pages 2 0 R >>\nendobj\ntrailer\n<< /Root 1 0 R >>\n%%EOF\n";

/// Encode a solid-color RGB PNG.
#[allow(dead_code)]
pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let img = image::RgbImage::from_pixel(width, height, image::Rgb([10, 120, 200]));
    let mut buf = Cursor::new(Vec::new());
    img.write_to(&mut buf, image::ImageFormat::Png).unwrap();
    buf.into_inner()
}

/// Read a response body as JSON, or `Value::Null` when it is empty.
#[allow(dead_code)]
pub async fn body_json(response: axum::response::Response) -> (StatusCode, Value) {
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body).unwrap_or(Value::Null)
    };
    (status, json)
}

/// Send a JSON request.
#[allow(dead_code)]
pub async fn json_request(
    router: &Router,
    method: Method,
    uri: &str,
    body: Option<Value>,
    auth_token: Option<&str>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);

    if let Some(token) = auth_token {
        builder = builder.header("Authorization", format!("Bearer {token}"));
    }

    let request = if let Some(body) = body {
        builder
            .header("Content-Type", "application/json")
            .body(Body::from(serde_json::to_vec(&body).unwrap()))
            .unwrap()
    } else {
        builder.body(Body::empty()).unwrap()
    };

    body_json(router.clone().oneshot(request).await.unwrap()).await
}

/// PUT one chunk with the name and total-size headers.
#[allow(dead_code)]
pub async fn put_chunk(
    router: &Router,
    session_id: &str,
    index: u32,
    data: &[u8],
    name: &str,
    total_size: u64,
) -> (StatusCode, Value) {
    let request = Request::builder()
        .method(Method::PUT)
        .uri(format!("/v1/uploads/{session_id}/chunks/{index}"))
        .header("Authorization", format!("Bearer {TEST_TOKEN}"))
        .header("x-upload-name", name)
        .header("x-upload-total-size", total_size.to_string())
        .header("Content-Type", "application/octet-stream")
        .body(Body::from(data.to_vec()))
        .unwrap();

    body_json(router.clone().oneshot(request).await.unwrap()).await
}

/// Upload `payload` in `chunk_size` pieces, in order.
#[allow(dead_code)]
pub async fn upload_all(
    router: &Router,
    session_id: &str,
    name: &str,
    payload: &[u8],
    chunk_size: usize,
) {
    for (index, chunk) in payload.chunks(chunk_size).enumerate() {
        let (status, body) = put_chunk(
            router,
            session_id,
            index as u32,
            chunk,
            name,
            payload.len() as u64,
        )
        .await;
        assert_eq!(status, StatusCode::OK, "chunk {index} rejected: {body}");
    }
}
