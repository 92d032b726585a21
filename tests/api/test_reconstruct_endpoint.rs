// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! Reconstruct endpoint tests
//!
//! These tests verify that POST /reconstruct/:
//! - Returns the bottleneck tensor and a base64 PNG for a valid upload
//! - Answers 422 when the `file` field is missing or is not a file upload
//! - Answers 500 when no model is loaded
//! - Answers 400 for uploads that are not images
//! - Answers 413 for uploads over the configured limit
//! - Counts outcomes in /metrics

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::ImageFormat;
use image_shifter_node::{
    api::{create_app, AppState},
    autoencoder::NativeBackend,
    nn::SeededSource,
    vision::ReconstructionModelManager,
};
use serde_json::Value;
use std::sync::Arc;
use tower::util::ServiceExt; // for `oneshot`

use crate::common::{
    encode, multipart_body, multipart_content_type, multipart_text_field, noise_image, png_bytes,
};

const MAX_UPLOAD: usize = 10 * 1024 * 1024;

fn loaded_state(max_upload_bytes: usize) -> AppState {
    let backend = NativeBackend::from_source(&SeededSource::new(17), 64).unwrap();
    let manager = ReconstructionModelManager::with_backend(Arc::new(backend));
    AppState::new(manager, max_upload_bytes).unwrap()
}

fn unloaded_state() -> AppState {
    AppState::new(ReconstructionModelManager::unloaded(64), MAX_UPLOAD).unwrap()
}

fn upload_request(uri: &str, body: Vec<u8>) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(header::CONTENT_TYPE, multipart_content_type())
        .body(Body::from(body))
        .unwrap()
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, json)
}

#[cfg(test)]
mod reconstruct_endpoint_tests {
    use super::*;

    /// Test 1: Valid PNG returns latent and reconstruction
    #[tokio::test]
    async fn test_reconstruct_png() {
        let app = create_app(loaded_state(MAX_UPLOAD));
        let body = multipart_body("file", "photo.png", "image/png", &png_bytes(120, 90));

        let (status, json) = send(app, upload_request("/reconstruct/", body)).await;
        assert_eq!(status, StatusCode::OK, "body: {}", json);

        // encoder_output is [1][1024][2][2]
        let latent = json["encoder_output"].as_array().unwrap();
        assert_eq!(latent.len(), 1);
        let channels = latent[0].as_array().unwrap();
        assert_eq!(channels.len(), 1024);
        assert_eq!(channels[0].as_array().unwrap().len(), 2);
        assert_eq!(channels[0][0].as_array().unwrap().len(), 2);
        assert_eq!(json["latent_shape"], serde_json::json!([1, 1024, 2, 2]));
        assert_eq!(json["backend"], "native");

        // reconstructed_image is a 64x64 PNG
        let png = STANDARD
            .decode(json["reconstructed_image"].as_str().unwrap())
            .unwrap();
        let decoded = image::load_from_memory_with_format(&png, ImageFormat::Png).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (64, 64));
    }

    /// Test 2: JPEG upload and the route without trailing slash
    #[tokio::test]
    async fn test_reconstruct_jpeg_without_trailing_slash() {
        let app = create_app(loaded_state(MAX_UPLOAD));
        let jpeg = encode(&noise_image(40, 40), ImageFormat::Jpeg);
        let body = multipart_body("file", "photo.jpg", "image/jpeg", &jpeg);

        let (status, json) = send(app, upload_request("/reconstruct", body)).await;
        assert_eq!(status, StatusCode::OK, "body: {}", json);
        assert!(!json["reconstructed_image"].as_str().unwrap().is_empty());
    }

    /// Test 3: Non-image upload is a 400 with the reason in `detail`
    #[tokio::test]
    async fn test_non_image_upload() {
        let app = create_app(loaded_state(MAX_UPLOAD));
        let body = multipart_body("file", "notes.txt", "text/plain", b"definitely not pixels");

        let (status, json) = send(app, upload_request("/reconstruct/", body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(json["detail"]
            .as_str()
            .unwrap()
            .starts_with("Could not process the image file:"));
        assert_eq!(json["error_type"], "invalid_image");
    }

    /// Test 4: Truncated PNG is a 400
    #[tokio::test]
    async fn test_truncated_png() {
        let app = create_app(loaded_state(MAX_UPLOAD));
        let png = png_bytes(32, 32);
        let body = multipart_body("file", "cut.png", "image/png", &png[..png.len() / 2]);

        let (status, _) = send(app, upload_request("/reconstruct/", body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    /// Test 5: Model not loaded is a 500 with the fixed detail
    #[tokio::test]
    async fn test_model_not_loaded() {
        let app = create_app(unloaded_state());
        let body = multipart_body("file", "photo.png", "image/png", &png_bytes(16, 16));

        let (status, json) = send(app, upload_request("/reconstruct/", body)).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            json["detail"],
            "The model is not loaded. Check the server logs."
        );
    }

    /// Test 6: Missing `file` field is a 422, even without a model
    #[tokio::test]
    async fn test_missing_file_field() {
        for state in [loaded_state(MAX_UPLOAD), unloaded_state()] {
            let app = create_app(state);
            let body = multipart_body("image", "photo.png", "image/png", &png_bytes(16, 16));

            let (status, json) = send(app, upload_request("/reconstruct/", body)).await;
            assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
            assert_eq!(json["field"], "file");
        }
    }

    /// Test 7: `file` sent as a plain text field is a 422, not a decode failure
    #[tokio::test]
    async fn test_file_as_text_field() {
        let app = create_app(loaded_state(MAX_UPLOAD));
        let body = multipart_text_field("file", "not an upload");

        let (status, json) = send(app, upload_request("/reconstruct/", body)).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(json["field"], "file");
        assert_eq!(json["error_type"], "validation_error");
    }

    /// Test 8: Non-multipart body is a 422
    #[tokio::test]
    async fn test_json_body_is_rejected() {
        let app = create_app(loaded_state(MAX_UPLOAD));
        let request = Request::builder()
            .method(Method::POST)
            .uri("/reconstruct/")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(r#"{"file": "abc"}"#))
            .unwrap();

        let (status, json) = send(app, request).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(json["error_type"], "validation_error");
    }

    /// Test 9: Upload above the configured limit is a 413
    #[tokio::test]
    async fn test_upload_over_limit() {
        let png = encode(&noise_image(64, 64), ImageFormat::Png);
        assert!(png.len() > 4096);

        let app = create_app(loaded_state(4096));
        let body = multipart_body("file", "big.png", "image/png", &png);

        let (status, json) = send(app, upload_request("/reconstruct/", body)).await;
        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(json["error_type"], "payload_too_large");
    }

    /// Test 10: Outcomes show up in /metrics
    #[tokio::test]
    async fn test_metrics_count_outcomes() {
        let state = loaded_state(MAX_UPLOAD);

        let ok = multipart_body("file", "a.png", "image/png", &png_bytes(16, 16));
        let (status, _) = send(create_app(state.clone()), upload_request("/reconstruct/", ok)).await;
        assert_eq!(status, StatusCode::OK);

        let bad = multipart_body("file", "a.txt", "text/plain", b"nope");
        let (status, _) = send(create_app(state.clone()), upload_request("/reconstruct/", bad)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let request = Request::builder()
            .uri("/metrics")
            .body(Body::empty())
            .unwrap();
        let response = create_app(state).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let text = String::from_utf8(bytes.to_vec()).unwrap();

        assert!(text.contains("reconstruct_requests_total{outcome=\"success\"} 1"));
        assert!(text.contains("reconstruct_requests_total{outcome=\"invalid_image\"} 1"));
        assert!(text.contains("reconstruct_inference_seconds_count 1"));
    }
}
