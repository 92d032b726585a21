// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Reconstruct endpoint handler

use axum::{body::Bytes, extract::State, http::StatusCode, Json};
use axum_extra::extract::multipart::{Multipart, MultipartError, MultipartRejection};
use tracing::{debug, info, warn};

use super::response::{latent_to_nested, ReconstructResponse};
use crate::api::errors::ApiError;
use crate::api::http_server::AppState;
use crate::monitoring::RequestOutcome;
use crate::vision::{decode_image_bytes, encode_png_base64};

/// Name of the multipart field holding the upload
pub const FILE_FIELD: &str = "file";

fn missing_file() -> ApiError {
    ApiError::ValidationError {
        field: FILE_FIELD.to_string(),
        message: "Field required".to_string(),
    }
}

fn not_a_file() -> ApiError {
    ApiError::ValidationError {
        field: FILE_FIELD.to_string(),
        message: "Expected a file upload, got a plain form field".to_string(),
    }
}

fn multipart_error(err: MultipartError, max_bytes: usize, what: &str) -> ApiError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::PayloadTooLarge { max: max_bytes }
    } else {
        ApiError::InvalidRequest(format!("{}: {}", what, err))
    }
}

/// Pull the `file` field out of a multipart body
///
/// The part must carry a filename; a plain text field of the same name is
/// rejected like a missing one.
async fn read_file_field(multipart: &mut Multipart, max_bytes: usize) -> Result<Bytes, ApiError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error(e, max_bytes, "Malformed multipart body"))?
    {
        if field.name() == Some(FILE_FIELD) {
            if field.file_name().is_none() {
                return Err(not_a_file());
            }
            return field
                .bytes()
                .await
                .map_err(|e| multipart_error(e, max_bytes, "Failed to read upload"));
        }
    }
    Err(missing_file())
}

fn outcome_of(err: &ApiError) -> RequestOutcome {
    match err {
        ApiError::ModelNotLoaded => RequestOutcome::ModelNotLoaded,
        ApiError::InvalidImage(_) => RequestOutcome::InvalidImage,
        ApiError::InternalError(_) => RequestOutcome::InferenceFailed,
        _ => RequestOutcome::InvalidRequest,
    }
}

/// POST /reconstruct/ - Encode and decode an uploaded image
///
/// # Request
/// `multipart/form-data` with a `file` field holding a PNG, JPEG, WebP, GIF,
/// BMP or TIFF image.
///
/// # Response
/// - `encoder_output`: bottleneck tensor as nested lists
/// - `reconstructed_image`: base64 PNG of the decoder output
/// - `latent_shape`, `backend`, `processing_time_ms`
///
/// # Errors
/// - 422: no `file` field
/// - 500: model not loaded, or inference failed
/// - 400: upload is not a decodable image, or the multipart body is malformed
/// - 413: upload over the configured limit
pub async fn reconstruct_handler(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<ReconstructResponse>, ApiError> {
    let result = reconstruct(&state, multipart).await;
    match &result {
        Ok(_) => state.metrics.record_request(RequestOutcome::Success),
        Err(e) => {
            warn!("Reconstruct request failed: {}", e);
            state.metrics.record_request(outcome_of(e));
        }
    }
    result.map(Json)
}

async fn reconstruct(
    state: &AppState,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<ReconstructResponse, ApiError> {
    // 1. Extract the upload; a non-multipart body has no `file` field either
    let mut multipart = multipart.map_err(|rejection| {
        debug!("Multipart rejected: {}", rejection);
        missing_file()
    })?;
    let bytes = read_file_field(&mut multipart, state.max_upload_bytes).await?;

    // 2. Model must be loaded
    if !state.model_manager.is_loaded() {
        return Err(ApiError::ModelNotLoaded);
    }

    // 3. Decode the image
    let (image, info) = decode_image_bytes(&bytes, state.max_upload_bytes)?;
    debug!(
        "Decoded upload: {}x{} {:?}, {} bytes",
        info.width, info.height, info.format, info.size_bytes
    );

    // 4. Forward pass and PNG encoding off the async runtime
    let manager = state.model_manager.clone();
    let (reconstruction, encoded) = tokio::task::spawn_blocking(move || {
        let reconstruction = manager.reconstruct(&image)?;
        let encoded = encode_png_base64(&image::DynamicImage::ImageRgb8(
            reconstruction.image.clone(),
        ))?;
        anyhow::Ok((reconstruction, encoded))
    })
    .await
    .map_err(|e| ApiError::InternalError(format!("Inference task failed: {}", e)))?
    .map_err(|e| ApiError::InternalError(format!("Reconstruction failed: {:#}", e)))?;

    state
        .metrics
        .observe_inference(reconstruction.processing_time_ms as f64 / 1000.0);
    info!(
        "Reconstruction complete: {}x{} -> {:?} latent, {}ms ({})",
        info.width,
        info.height,
        reconstruction.latent.shape(),
        reconstruction.processing_time_ms,
        reconstruction.backend
    );

    Ok(ReconstructResponse {
        encoder_output: latent_to_nested(&reconstruction.latent),
        reconstructed_image: encoded,
        latent_shape: reconstruction.latent.shape().to_vec(),
        backend: reconstruction.backend.to_string(),
        processing_time_ms: reconstruction.processing_time_ms,
    })
}
